#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

const USERS: &str = "\
user_id,name,email,age
u-1,Dan Altenwerth Jr.,Molly59@gmail.com,67
u-2,Glenda Wisozk,Miriam21@gmail.com,119
u-3,Daniel Fahey IV,Delia.Lesch11@hotmail.com,10
u-4,Ronnie Bechtelar,Sandra19@yahoo.com,42
u-5,Alma Bechtelar,Shelly_Balistreri22@hotmail.com,5
";

fn imported_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let csv = dir.path().join("user_data.csv");
    fs::write(&csv, USERS).expect("write csv");
    let db = dir.path().join("users.db");
    cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(&db)
        .arg("import")
        .arg(&csv)
        .assert()
        .success();
    (dir, db)
}

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

#[test]
fn import_is_skipped_when_table_has_rows() {
    let (dir, db) = imported_db();
    let output = cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(&db)
        .arg("import")
        .arg(dir.path().join("user_data.csv"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("nothing imported"));
}

#[test]
fn stream_prints_json_lines() {
    let (_dir, db) = imported_db();
    let output = cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(&db)
        .args(["stream", "--limit", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rows = json_lines(&output);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "Dan Altenwerth Jr.");
    assert_eq!(rows[0]["age"], 67);
}

#[test]
fn batches_filter_by_threshold() {
    let (_dir, db) = imported_db();
    let output = cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(&db)
        .args(["batches", "--batch-size", "2", "--greater-than", "25"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let ages: Vec<i64> = json_lines(&output)
        .iter()
        .filter_map(|row| row["age"].as_i64())
        .collect();
    assert_eq!(ages, vec![67, 119, 42]);
}

#[test]
fn paginate_returns_every_row() {
    let (_dir, db) = imported_db();
    let output = cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(&db)
        .args(["paginate", "--page-size", "2"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(json_lines(&output).len(), 5);
}

#[test]
fn average_of_filtered_ages() {
    let (_dir, db) = imported_db();
    let output = cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(&db)
        .args(["average", "--sql", "SELECT age FROM user_data WHERE age > 25"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8_lossy(&output).trim(), "76");
}

#[test]
fn query_and_concurrent_commands() {
    let (_dir, db) = imported_db();
    let output = cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(&db)
        .args(["query", "--transactional", "--sql", "SELECT name FROM user_data"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(json_lines(&output).len(), 5);

    let output = cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(&db)
        .args([
            "concurrent",
            "--sql",
            "SELECT * FROM user_data WHERE age > 100",
            "--sql",
            "SELECT * FROM user_data WHERE age < 20",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(json_lines(&output).len(), 3);
}

#[test]
fn bad_sql_fails_with_message() {
    let (_dir, db) = imported_db();
    let output = cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(&db)
        .args(["query", "--sql", "SELEC nonsense"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("error: query error"));
}

#[test]
fn config_file_supplies_database() {
    let (dir, db) = imported_db();
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        format!(
            "[database]\npath = {:?}\n\n[stream]\npage_size = 3\n",
            db.display().to_string()
        ),
    )
    .expect("write config");
    let output = cargo_bin_cmd!("rowguard")
        .arg("--config")
        .arg(&config)
        .arg("paginate")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(json_lines(&output).len(), 5);
}

#[test]
fn missing_database_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    cargo_bin_cmd!("rowguard")
        .arg("--database")
        .arg(dir.path().join("absent.db"))
        .arg("stream")
        .env_remove("ROWGUARD_CONFIG")
        .assert()
        .failure();
}
