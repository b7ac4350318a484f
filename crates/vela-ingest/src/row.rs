//! Row views and row cursors.
//!
//! The ingest executor consumes decoded files through two small contracts:
//!
//! - [`RowData`]: a capability set of typed, name-based readers plus a null
//!   probe. Implementations are a small closed set: CSV rows, Parquet rows,
//!   in-memory [`StaticRow`]s, and the [`TimeProjectedRow`] decorator that
//!   intercepts reads of the reserved `_time_` column.
//! - [`RowCursor`]: a single-pass, non-restartable forward iterator over a
//!   decoded file. A cursor-level decode error fails only that row; the
//!   cursor stays usable.

pub mod csv;
pub mod data;
pub mod parquet;
pub mod project;

use std::path::Path;

use snafu::{Backtrace, prelude::*};

use crate::meta::Settings;
use crate::schema::Schema;

pub use data::{Datum, ListData, MapData, RowData, StaticRow};
pub use project::TimeProjectedRow;

/// Result alias for row-level reads.
pub type RowResult<T> = Result<T, RowError>;

/// Errors raised by row reads and cursor decoding.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RowError {
    /// The row has no field of that name.
    #[snafu(display("Unknown field: {field}"))]
    UnknownField { field: String, backtrace: Backtrace },

    /// A typed read hit a null cell; probe with `is_null` first.
    #[snafu(display("Null value read as {expected} in field {field}"))]
    NullValue {
        field: String,
        expected: &'static str,
    },

    /// The stored value has a different type than the read asked for.
    #[snafu(display("Type mismatch in field {field}: expected {expected}, found {found}"))]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A textual cell could not be parsed as the requested type.
    #[snafu(display("Unparseable cell {value:?} in field {field} (expected {expected})"))]
    Unparseable {
        field: String,
        value: String,
        expected: &'static str,
        backtrace: Backtrace,
    },

    /// The CSV decoder failed to produce a record.
    #[snafu(display("CSV decode error: {source}"))]
    Csv {
        source: ::csv::Error,
        backtrace: Backtrace,
    },

    /// The Parquet decoder failed to produce a record.
    #[snafu(display("Parquet decode error: {source}"))]
    Parquet {
        source: ::parquet::errors::ParquetError,
        backtrace: Backtrace,
    },

    /// The input file could not be opened.
    #[snafu(display("Cannot open {path}: {source}"))]
    Open {
        path: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// No cursor implementation exists for the declared format.
    #[snafu(display("Unsupported file format: {format}"))]
    UnsupportedFormat { format: String, backtrace: Backtrace },
}

/// Single-pass forward iterator of rows over a decoded file.
///
/// `next_row` returns `Ok(None)` on exhaustion. An `Err` reports a decode
/// failure of one record; callers may keep pulling rows afterwards.
pub trait RowCursor {
    fn next_row(&mut self) -> RowResult<Option<&dyn RowData>>;
}

/// Open a row cursor for `format` over a local file.
///
/// `schema` is the table's source schema (before time normalization); it
/// supplies column names and order for headerless formats. Recognized
/// settings: `csv.delimiter` (single character, default tab) and
/// `csv.header` (`"true"` to skip a header record).
pub fn open_cursor(
    format: &str,
    path: &Path,
    schema: &Schema,
    settings: &Settings,
) -> RowResult<Box<dyn RowCursor>> {
    match format {
        "csv" => {
            let delimiter = settings
                .get("csv.delimiter")
                .and_then(|d| d.bytes().next())
                .unwrap_or(b'\t');
            let has_header = settings
                .get("csv.header")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));
            let cursor = csv::CsvCursor::open(path, delimiter, has_header, schema)?;
            Ok(Box::new(cursor))
        }
        "parquet" => {
            let cursor = parquet::ParquetCursor::open(path)?;
            Ok(Box::new(cursor))
        }
        other => UnsupportedFormatSnafu { format: other }.fail(),
    }
}
