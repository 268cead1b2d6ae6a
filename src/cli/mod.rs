#![forbid(unsafe_code)]

//! Command-line support: CSV import and row output.

/// CSV import into a SQL table.
pub mod import;

use std::io::Write;

use crate::types::Row;

/// Writes `row` as one JSON object per line.
pub fn write_json_line<W: Write>(out: &mut W, row: &Row) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, row)?;
    out.write_all(b"\n")
}
