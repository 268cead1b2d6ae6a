#![allow(missing_docs)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rowguard::access::{fetch_concurrently, with_connection, with_transaction};
use rowguard::testkit::{FakeSource, ObservedEvent, RecordingObserver};
use rowguard::{
    AccessError, CacheOutcome, Connection, NoopObserver, Pipeline, Query, ResultCache,
    RetryPolicy, TxState,
};

fn quick(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::ZERO)
}

#[test]
fn scope_and_transaction_compose() -> rowguard::Result<()> {
    let source = FakeSource::with_ages(&[67, 119]);
    let err = with_connection(&source, |conn| {
        with_transaction(conn, |conn| {
            conn.execute(&Query::new("UPDATE user_data SET age = 0"))?;
            Err::<(), _>(AccessError::Fatal("check constraint failed".into()))
        })
    })
    .expect_err("operation fails");
    assert_eq!(err, AccessError::Fatal("check constraint failed".into()));

    let stats = source.stats();
    assert_eq!((stats.opens, stats.closes), (1, 1));
    assert_eq!((stats.begins, stats.commits, stats.rollbacks), (1, 0, 1));
    Ok(())
}

#[test]
fn retry_exhaustion_reports_every_attempt_once() {
    let source = FakeSource::with_ages(&[1]);
    for n in 1..=3 {
        source.push_statement_failure(AccessError::Transient(format!("timeout {n}")));
    }
    let observer = RecordingObserver::new();
    let err = Pipeline::new(&source)
        .transactional()
        .retry(quick(3))
        .observer(&observer)
        .fetch(&Query::new("SELECT * FROM user_data"))
        .expect_err("every attempt fails");

    assert_eq!(err, AccessError::Transient("timeout 3".into()));
    let attempts: Vec<u32> = observer
        .failed_attempts()
        .into_iter()
        .map(|(attempt, _)| attempt)
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(observer
        .events()
        .contains(&ObservedEvent::TransactionFinished(TxState::RolledBack)));
    let stats = source.stats();
    assert_eq!((stats.opens, stats.closes), (1, 1));
}

#[test]
fn shared_cache_serves_other_pipelines() -> rowguard::Result<()> {
    let first = FakeSource::with_ages(&[10, 20]);
    let second = FakeSource::with_ages(&[30]);
    let cache = ResultCache::new();
    let observer = RecordingObserver::new();
    let query = Query::new("SELECT * FROM user_data");

    let a = Pipeline::new(&first).cache(&cache).fetch(&query)?;
    let b = Pipeline::new(&second)
        .cache(&cache)
        .observer(&observer)
        .fetch(&query)?;

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(observer.cache_outcomes(), vec![CacheOutcome::Hit]);
    assert_eq!(second.stats().cursors_opened, 0);
    Ok(())
}

#[test]
fn cache_is_shared_across_threads() -> rowguard::Result<()> {
    let source = FakeSource::with_ages(&[1, 2, 3]);
    let cache = Arc::new(ResultCache::new());
    let computed = Arc::new(AtomicU32::new(0));
    let query = Query::new("SELECT * FROM user_data");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computed = Arc::clone(&computed);
            let query = query.clone();
            let source = source.clone();
            thread::spawn(move || {
                cache.get_or_compute(&query, &NoopObserver, || {
                    computed.fetch_add(1, Ordering::SeqCst);
                    with_connection(&source, |conn| conn.query_all(&query))
                })
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.join().expect("worker panicked")?);
    }
    assert!(results.iter().all(|rows| Arc::ptr_eq(rows, &results[0])));
    assert!(computed.load(Ordering::SeqCst) >= 1);
    assert_eq!(cache.len(), 1);
    let stats = source.stats();
    assert_eq!(stats.opens, stats.closes);
    Ok(())
}

#[tokio::test]
async fn concurrent_fetch_uses_one_connection_per_query() -> rowguard::Result<()> {
    let source = Arc::new(FakeSource::with_ages(&[67, 119, 10, 42, 5]));
    let queries: Vec<Query> = (0..4)
        .map(|n| Query::with_params("SELECT * FROM user_data WHERE age > ?", [n as i64]))
        .collect();
    let results = fetch_concurrently(Arc::clone(&source), queries).await?;
    assert_eq!(results.len(), 4);
    let stats = source.stats();
    assert_eq!((stats.opens, stats.closes), (4, 4));
    assert_eq!(stats.cursors_opened, stats.cursors_closed);
    Ok(())
}

#[tokio::test]
async fn async_retry_reports_like_blocking_retry() {
    let observer = RecordingObserver::new();
    let calls = AtomicU32::new(0);
    let err = RetryPolicy::new(3, Duration::from_millis(1))
        .run_async(&observer, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AccessError::Transient("busy".into())) }
        })
        .await
        .expect_err("always busy");
    assert_eq!(err, AccessError::Transient("busy".into()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(observer.failed_attempts().len(), 3);
}
