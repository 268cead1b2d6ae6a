#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use rowguard::access::{execute_query, with_connection, with_transaction, Pipeline};
use rowguard::cli::import::{import_csv, ImportConfig};
use rowguard::source::SqliteOptions;
use rowguard::stream::{
    filter_batches, numeric_field, paginate, stream_batches, stream_query, streaming_average,
};
use rowguard::testkit::RecordingObserver;
use rowguard::{
    AccessError, AccessMetrics, CancelToken, Connection, DataSource, ErrorKind, Query,
    ResultCache, RetryPolicy, SqliteSource, Value,
};
use tempfile::TempDir;

const USERS: &str = "\
user_id,name,email,age
u-1,Dan Altenwerth Jr.,Molly59@gmail.com,67
u-2,Glenda Wisozk,Miriam21@gmail.com,119
u-3,Daniel Fahey IV,Delia.Lesch11@hotmail.com,10
u-4,Ronnie Bechtelar,Sandra19@yahoo.com,42
u-5,Alma Bechtelar,Shelly_Balistreri22@hotmail.com,5
";

fn seeded_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("users.db");
    seed(&path).expect("seed users");
    (dir, path)
}

fn seed(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = SqliteSource::new(path);
    let summary = with_connection(&source, |conn| {
        Ok(import_csv(conn, &ImportConfig::new("user_data"), USERS.as_bytes()))
    })??;
    assert_eq!(summary.rows_imported, 5);
    Ok(())
}

fn by_id() -> Query {
    Query::new("SELECT user_id, name, age FROM user_data ORDER BY user_id")
}

#[test]
fn streams_batches_filters_and_averages() -> rowguard::Result<()> {
    let (_dir, path) = seeded_db();
    let source = SqliteSource::new(&path);
    let age = numeric_field("age");

    let names = stream_query(&source, &by_id(), &CancelToken::new(), |rows| {
        rows.map(|row| row.map(|r| r.get("name").cloned()))
            .collect::<rowguard::Result<Vec<_>>>()
    })?;
    assert_eq!(names.len(), 5);
    assert_eq!(names[0], Some(Value::from("Dan Altenwerth Jr.")));

    let adults = stream_query(&source, &by_id(), &CancelToken::new(), |rows| {
        filter_batches(stream_batches(rows, 2)?, |row| {
            age(row).map(|a| a > 25.0).unwrap_or(false)
        })
        .map(|row| row.and_then(|r| age(&r)))
        .collect::<rowguard::Result<Vec<_>>>()
    })?;
    assert_eq!(adults, vec![67.0, 119.0, 42.0]);

    let average = stream_query(
        &source,
        &Query::with_params("SELECT age FROM user_data WHERE age > ?", [25i64]),
        &CancelToken::new(),
        |rows| streaming_average(rows, &age),
    )?;
    assert!((average - 76.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn paginates_with_bound_windows() -> rowguard::Result<()> {
    let (_dir, path) = seeded_db();
    let source = SqliteSource::new(&path);
    let mut conn = source.connect()?;
    let mut pages = paginate(&mut conn, by_id(), 2)?;
    let mut sizes = Vec::new();
    while let Some(page) = pages.next_page()? {
        sizes.push(page.len());
    }
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(pages.windows_issued(), 3);
    Ok(())
}

#[test]
fn failed_transaction_leaves_table_unchanged() -> rowguard::Result<()> {
    let (_dir, path) = seeded_db();
    let source = SqliteSource::new(&path);
    let err = with_connection(&source, |conn| {
        with_transaction(conn, |conn| {
            conn.execute(&Query::with_params(
                "UPDATE user_data SET age = ? WHERE user_id = ?",
                [Value::Integer(1), Value::from("u-1")],
            ))?;
            conn.execute(&Query::with_params(
                "INSERT INTO user_data (user_id, name, email, age) VALUES (?, ?, ?, ?)",
                [
                    Value::from("u-6"),
                    Value::from("Broken"),
                    Value::from("x@y.z"),
                    Value::Integer(30),
                ],
            ))?;
            conn.execute(&Query::new("INSERT INTO missing_table VALUES (1)"))
        })
    })
    .expect_err("missing table");
    assert_eq!(err.kind(), ErrorKind::Fatal);

    let rows = execute_query(
        &source,
        &Query::with_params("SELECT age FROM user_data WHERE user_id = ?", ["u-1"]),
    )?;
    assert_eq!(rows[0].get("age"), Some(&Value::Integer(67)));
    assert_eq!(execute_query(&source, &by_id())?.len(), 5);
    Ok(())
}

#[test]
fn locked_database_is_transient_and_retried() -> rowguard::Result<()> {
    let (_dir, path) = seeded_db();
    let holder = SqliteSource::new(&path);
    let mut writer = holder.connect()?;
    writer.begin()?;
    writer.execute(&Query::new("UPDATE user_data SET age = age + 1"))?;

    let impatient = SqliteSource::with_options(
        &path,
        SqliteOptions {
            busy_timeout: Duration::ZERO,
            ..SqliteOptions::default()
        },
    );
    let observer = RecordingObserver::new();
    let err = Pipeline::new(&impatient)
        .retry(RetryPolicy::new(2, Duration::from_millis(5)))
        .observer(&observer)
        .execute(&Query::new("UPDATE user_data SET age = 0"))
        .expect_err("database is locked");
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(observer.failed_attempts().len(), 2);

    writer.rollback()?;
    writer.close()?;
    Ok(())
}

#[test]
fn pipeline_caches_and_counts() -> rowguard::Result<()> {
    let (_dir, path) = seeded_db();
    let source = SqliteSource::new(&path);
    let cache = ResultCache::new();
    let metrics = AccessMetrics::new();
    let pipeline = Pipeline::new(&source)
        .transactional()
        .retry(RetryPolicy::new(3, Duration::ZERO))
        .cache(&cache)
        .observer(&metrics);

    let query = Query::with_params("SELECT name FROM user_data WHERE age > ?", [25i64]);
    assert_eq!(pipeline.fetch(&query)?.len(), 3);
    assert_eq!(pipeline.fetch(&query)?.len(), 3);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.queries, 1);
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.cache_misses, 1);
    assert_eq!(snapshot.commits, 2);
    Ok(())
}

#[test]
fn missing_database_without_create_is_connection_error() {
    let dir = TempDir::new().expect("tempdir");
    let source = SqliteSource::with_options(
        dir.path().join("absent.db"),
        SqliteOptions {
            create_if_missing: false,
            ..SqliteOptions::default()
        },
    );
    let err = execute_query(&source, &Query::new("SELECT 1")).expect_err("no file");
    assert!(matches!(err, AccessError::Connection(_)));
}
