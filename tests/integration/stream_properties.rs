#![allow(missing_docs)]

use proptest::prelude::*;
use rowguard::stream::{filter_batches, paginate, stream_batches, stream_query, RunningMean};
use rowguard::testkit::FakeSource;
use rowguard::{CancelToken, DataSource, PageWindow, Query, Row, Value};

fn age(row: &Row) -> i64 {
    match row.get("age") {
        Some(Value::Integer(age)) => *age,
        other => panic!("unexpected age {other:?}"),
    }
}

fn select_all() -> Query {
    Query::new("SELECT * FROM user_data")
}

proptest! {
    #[test]
    fn prop_batches_preserve_order_and_sizes(
        ages in prop::collection::vec(0i64..150, 0..60),
        batch_size in 1usize..10,
    ) {
        let source = FakeSource::with_ages(&ages);
        let batches = stream_query(&source, &select_all(), &CancelToken::new(), |rows| {
            stream_batches(rows, batch_size)?
                .map(|batch| batch.map(|b| b.iter().map(age).collect::<Vec<_>>()))
                .collect::<rowguard::Result<Vec<_>>>()
        }).unwrap();

        prop_assert_eq!(batches.len(), ages.len().div_ceil(batch_size));
        for (idx, batch) in batches.iter().enumerate() {
            if idx + 1 < batches.len() {
                prop_assert_eq!(batch.len(), batch_size);
            } else {
                prop_assert!(!batch.is_empty() && batch.len() <= batch_size);
            }
        }
        let flattened: Vec<i64> = batches.into_iter().flatten().collect();
        prop_assert_eq!(flattened, ages);
    }

    #[test]
    fn prop_filter_matches_plain_filter(
        ages in prop::collection::vec(0i64..150, 0..60),
        batch_size in 1usize..10,
        threshold in 0i64..150,
    ) {
        let source = FakeSource::with_ages(&ages);
        let kept = stream_query(&source, &select_all(), &CancelToken::new(), |rows| {
            filter_batches(stream_batches(rows, batch_size)?, |row| age(row) > threshold)
                .map(|row| row.map(|r| age(&r)))
                .collect::<rowguard::Result<Vec<_>>>()
        }).unwrap();
        let expected: Vec<i64> = ages.iter().copied().filter(|a| *a > threshold).collect();
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn prop_pagination_windows_are_contiguous(
        rows in 0usize..40,
        page_size in 1usize..8,
    ) {
        let ages: Vec<i64> = (0..rows as i64).collect();
        let source = FakeSource::with_ages(&ages);
        let mut conn = source.connect().unwrap();
        let seen: Vec<i64> = paginate(&mut conn, select_all(), page_size)
            .unwrap()
            .map(|row| age(&row.unwrap()))
            .collect();
        prop_assert_eq!(seen, ages);

        let expected: Vec<PageWindow> = (0..=rows / page_size)
            .map(|n| PageWindow { page_size, offset: n * page_size })
            .collect();
        prop_assert_eq!(source.page_windows(), expected);
    }

    #[test]
    fn prop_running_mean_matches_naive_mean(values in prop::collection::vec(-1e6f64..1e6, 1..100)) {
        let mut mean = RunningMean::new();
        mean.extend(values.iter().copied());
        let naive = values.iter().sum::<f64>() / values.len() as f64;
        prop_assert!((mean.finish().unwrap() - naive).abs() < 1e-6);
    }
}
