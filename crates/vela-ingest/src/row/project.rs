//! Time projection over source rows.

use crate::row::{ListData, MapData, RowData, RowResult};
use crate::schema::TIME_COLUMN;

/// A pure decorator that adds the reserved `_time_` column to a source row.
///
/// The wrapped row keeps answering every read except `_time_`, whose value
/// is resolved once per row by the executor and injected here. `_time_` is
/// never null.
pub struct TimeProjectedRow<'a> {
    inner: &'a dyn RowData,
    time: i64,
}

impl<'a> TimeProjectedRow<'a> {
    pub fn new(inner: &'a dyn RowData, time: i64) -> TimeProjectedRow<'a> {
        TimeProjectedRow { inner, time }
    }
}

impl RowData for TimeProjectedRow<'_> {
    fn is_null(&self, field: &str) -> bool {
        if field == TIME_COLUMN {
            return false;
        }
        self.inner.is_null(field)
    }

    fn read_long(&self, field: &str) -> RowResult<i64> {
        if field == TIME_COLUMN {
            return Ok(self.time);
        }
        self.inner.read_long(field)
    }

    fn read_bool(&self, field: &str) -> RowResult<bool> {
        self.inner.read_bool(field)
    }

    fn read_byte(&self, field: &str) -> RowResult<i8> {
        self.inner.read_byte(field)
    }

    fn read_short(&self, field: &str) -> RowResult<i16> {
        self.inner.read_short(field)
    }

    fn read_int(&self, field: &str) -> RowResult<i32> {
        self.inner.read_int(field)
    }

    fn read_float(&self, field: &str) -> RowResult<f32> {
        self.inner.read_float(field)
    }

    fn read_double(&self, field: &str) -> RowResult<f64> {
        self.inner.read_double(field)
    }

    fn read_string(&self, field: &str) -> RowResult<String> {
        self.inner.read_string(field)
    }

    fn read_list(&self, field: &str) -> RowResult<ListData> {
        self.inner.read_list(field)
    }

    fn read_map(&self, field: &str) -> RowResult<MapData> {
        self.inner.read_map(field)
    }
}
