//! Per-row time resolution.
//!
//! A [`TimeFunc`] computes the `_time_` value for one source row. It is
//! built once per work unit from the table's [`TimeSpec`], capturing the
//! values it needs (not the spec itself) so the closure carries no borrow
//! of table metadata.

use chrono::{NaiveDateTime, Utc};
use snafu::prelude::*;
use tracing::warn;

use crate::meta::{TimeSpec, TimeType};
use crate::row::RowData;
use crate::time::{
    ColumnReadSnafu, NotUnixSecondsSnafu, TimeError, UnparseableSnafu, UnsupportedTypeSnafu,
};

/// Resolves one row to unix seconds.
pub type TimeFunc = Box<dyn Fn(&dyn RowData) -> Result<i64, TimeError> + Send + Sync>;

/// The macro pattern name whose value is the work unit's resolved date.
const MACRO_DATE: &str = "date";

/// Build the time function for a work unit.
///
/// `mdate` is the macro-resolved date computed at work-unit creation; it
/// is only consulted for [`TimeType::Macro`].
pub fn time_func(spec: &TimeSpec, mdate: Option<i64>) -> Result<TimeFunc, TimeError> {
    match spec.kind {
        TimeType::Static => {
            let value = spec.unix_time;
            Ok(Box::new(move |_| Ok(value)))
        }
        TimeType::Current => Ok(Box::new(|_| Ok(Utc::now().timestamp()))),
        TimeType::Column => {
            let column = spec.column.clone();
            let pattern = spec.pattern.clone();
            Ok(Box::new(move |row| column_time(row, &column, &pattern)))
        }
        TimeType::Macro => {
            if spec.pattern == MACRO_DATE {
                let value = mdate.unwrap_or_default();
                Ok(Box::new(move |_| Ok(value)))
            } else {
                warn!(pattern = %spec.pattern, "unrecognized time macro pattern, emitting 0");
                Ok(Box::new(|_| Ok(0)))
            }
        }
        // Provided is filled out-of-band by stream adapters; a file-based
        // work unit cannot resolve it.
        TimeType::Provided => UnsupportedTypeSnafu { kind: spec.kind }.fail(),
    }
}

fn column_time(row: &dyn RowData, column: &str, pattern: &str) -> Result<i64, TimeError> {
    if pattern.is_empty() {
        // No pattern: the column holds integer unix seconds, either as a
        // numeric column or as an integer-looking string.
        if let Ok(value) = row.read_long(column) {
            return Ok(value);
        }
        let text = row.read_string(column).context(ColumnReadSnafu { column })?;
        return text.trim().parse::<i64>().ok().context(NotUnixSecondsSnafu {
            column,
            value: text.clone(),
        });
    }

    let text = row.read_string(column).context(ColumnReadSnafu { column })?;
    let parsed = NaiveDateTime::parse_from_str(text.trim(), pattern).context(UnparseableSnafu {
        column,
        value: text.clone(),
        pattern,
    })?;
    Ok(parsed.and_utc().timestamp())
}
