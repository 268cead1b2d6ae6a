use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;
use tracing::{debug, info};

use crate::access::Transaction;
use crate::source::Connection;
use crate::types::{AccessError, Query, Value};

/// Configuration for loading a CSV file into a table.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Destination table. Created from the header row when missing.
    pub table: String,
    /// Field delimiter.
    pub delimiter: u8,
}

impl ImportConfig {
    /// Comma-delimited import into `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            delimiter: b',',
        }
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Rows inserted by this import.
    pub rows_imported: u64,
    /// Rows the table held before the import. A non-zero count means the
    /// import was skipped.
    pub existing_rows: u64,
}

impl ImportSummary {
    /// Whether the table already held data and nothing was inserted.
    pub fn skipped(&self) -> bool {
        self.existing_rows > 0
    }
}

/// Error type for CSV import.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Malformed header or table name, or an unreadable row count.
    #[error("{0}")]
    Message(String),
    /// CSV parsing error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Data-access failure.
    #[error(transparent)]
    Access(#[from] AccessError),
}

/// Loads CSV rows from `reader` into `cfg.table` on `conn`.
///
/// The first record names the columns. The table is created if it does not
/// exist, and left alone if it already holds any rows. All rows are inserted
/// in one transaction, so a malformed record leaves the table empty.
pub fn import_csv<C, R>(conn: &mut C, cfg: &ImportConfig, reader: R) -> Result<ImportSummary, ImportError>
where
    C: Connection,
    R: Read,
{
    validate_identifier(&cfg.table)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(cfg.delimiter)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(ImportError::Message("CSV file has no header row".into()));
    }
    for header in headers.iter() {
        validate_identifier(header)?;
    }

    conn.execute(&Query::new(create_table_sql(&cfg.table, &headers)))?;
    let existing_rows = count_rows(conn, &cfg.table)?;
    if existing_rows > 0 {
        info!(
            table = %cfg.table,
            existing_rows,
            "table already populated; skipping import"
        );
        return Ok(ImportSummary {
            rows_imported: 0,
            existing_rows,
        });
    }

    let insert_sql = insert_sql(&cfg.table, &headers);
    let mut tx = Transaction::begin(conn)?;
    let mut rows_imported = 0u64;
    for result in reader.records() {
        let record = result?;
        let values: Vec<Value> = record.iter().map(parse_value).collect();
        tx.connection()
            .execute(&Query::with_params(insert_sql.as_str(), values))?;
        rows_imported += 1;
    }
    tx.commit()?;
    info!(table = %cfg.table, rows_imported, "import finished");
    Ok(ImportSummary {
        rows_imported,
        existing_rows: 0,
    })
}

fn validate_identifier(name: &str) -> Result<(), ImportError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ImportError::Message(format!("'{name}' is not a valid identifier")))
    }
}

fn create_table_sql(table: &str, headers: &StringRecord) -> String {
    let columns: Vec<String> = headers.iter().map(|h| format!("\"{h}\"")).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" ({})",
        columns.join(", ")
    )
}

fn insert_sql(table: &str, headers: &StringRecord) -> String {
    let columns: Vec<String> = headers.iter().map(|h| format!("\"{h}\"")).collect();
    let placeholders = vec!["?"; headers.len()].join(", ");
    format!(
        "INSERT INTO \"{table}\" ({}) VALUES ({placeholders})",
        columns.join(", ")
    )
}

fn count_rows<C: Connection>(conn: &mut C, table: &str) -> Result<u64, ImportError> {
    let rows = conn.query_all(&Query::new(format!("SELECT COUNT(*) AS n FROM \"{table}\"")))?;
    let count = rows
        .first()
        .and_then(|row| row.get("n"))
        .and_then(Value::as_f64)
        .ok_or_else(|| ImportError::Message(format!("could not count rows of '{table}'")))?;
    debug!(table, count, "existing rows counted");
    Ok(count as u64)
}

fn parse_value(raw: &str) -> Value {
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Integer(int_val);
    }
    if let Ok(float_val) = raw.parse::<f64>() {
        if float_val.is_finite() {
            return Value::Real(float_val);
        }
    }
    Value::Text(raw.to_string())
}
