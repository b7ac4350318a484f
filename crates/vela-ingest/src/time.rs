//! Time handling for ingestion.
//!
//! Three concerns live here:
//! - [`pattern`]: classify a path template by the macro hierarchy it uses
//!   (DATE / HOUR / MINUTE / SECOND / TIMESTAMP).
//! - [`expand`]: expand a macro template over a time window into concrete
//!   prefixes, one per unit, each carrying the unit start as `mdate`.
//! - [`resolver`]: build the per-row time function a table's [`TimeSpec`]
//!   describes, used to fill the reserved `_time_` column.
//!
//! [`TimeSpec`]: crate::meta::TimeSpec

pub mod expand;
pub mod pattern;
pub mod resolver;

use snafu::{Backtrace, prelude::*};

use crate::meta::TimeType;
use crate::row::RowError;

pub use expand::{expand, ExpandedPrefix};
pub use pattern::PatternMacro;
pub use resolver::{time_func, TimeFunc};

/// Errors raised while resolving row timestamps.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TimeError {
    /// A time column value did not match the configured pattern.
    #[snafu(display("Unparseable time value {value:?} in column {column} for pattern {pattern:?}"))]
    Unparseable {
        column: String,
        value: String,
        pattern: String,
        source: chrono::ParseError,
    },

    /// A pattern-less time column held something that is not unix seconds.
    #[snafu(display("Time column {column} is not integer unix seconds: {value:?}"))]
    NotUnixSeconds {
        column: String,
        value: String,
        backtrace: Backtrace,
    },

    /// Reading the time column from the row failed.
    #[snafu(display("Cannot read time column {column}: {source}"))]
    ColumnRead { column: String, source: RowError },

    /// The time type cannot be resolved in this context (e.g. `Provided`
    /// outside a stream source).
    #[snafu(display("Unsupported time type {kind:?} for this source"))]
    UnsupportedType {
        kind: TimeType,
        backtrace: Backtrace,
    },
}
