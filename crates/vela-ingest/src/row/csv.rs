//! CSV row cursor.
//!
//! CSV inputs are headerless by default; columns are bound by position to
//! the table's source schema. Cells are parsed lazily on each typed read,
//! so a malformed cell fails only the read that touches it. Empty cells
//! read as null.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};
use snafu::prelude::*;

use crate::row::{
    CsvSnafu, ListData, MapData, OpenSnafu, RowCursor, RowData, RowResult, TypeMismatchSnafu,
    UnknownFieldSnafu, UnparseableSnafu,
};
use crate::schema::Schema;

/// One CSV record with name-based access through the source schema.
pub struct CsvRow {
    fields: Arc<HashMap<String, usize>>,
    record: StringRecord,
}

impl CsvRow {
    fn cell(&self, field: &str) -> RowResult<&str> {
        let index = *self
            .fields
            .get(field)
            .context(UnknownFieldSnafu { field })?;
        Ok(self.record.get(index).unwrap_or(""))
    }

    fn parse<T: std::str::FromStr>(&self, field: &str, expected: &'static str) -> RowResult<T> {
        let cell = self.cell(field)?;
        cell.trim().parse().ok().context(UnparseableSnafu {
            field,
            value: cell,
            expected,
        })
    }
}

impl RowData for CsvRow {
    fn is_null(&self, field: &str) -> bool {
        self.cell(field).map_or(true, |c| c.is_empty())
    }

    fn read_bool(&self, field: &str) -> RowResult<bool> {
        let cell = self.cell(field)?;
        match cell.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other if other.eq_ignore_ascii_case("true") => Ok(true),
            other if other.eq_ignore_ascii_case("false") => Ok(false),
            _ => UnparseableSnafu {
                field,
                value: cell,
                expected: "bool",
            }
            .fail(),
        }
    }

    fn read_byte(&self, field: &str) -> RowResult<i8> {
        self.parse(field, "byte")
    }

    fn read_short(&self, field: &str) -> RowResult<i16> {
        self.parse(field, "short")
    }

    fn read_int(&self, field: &str) -> RowResult<i32> {
        self.parse(field, "int")
    }

    fn read_long(&self, field: &str) -> RowResult<i64> {
        self.parse(field, "long")
    }

    fn read_float(&self, field: &str) -> RowResult<f32> {
        self.parse(field, "float")
    }

    fn read_double(&self, field: &str) -> RowResult<f64> {
        self.parse(field, "double")
    }

    fn read_string(&self, field: &str) -> RowResult<String> {
        Ok(self.cell(field)?.to_string())
    }

    fn read_list(&self, field: &str) -> RowResult<ListData> {
        TypeMismatchSnafu {
            field,
            expected: "list",
            found: "string",
        }
        .fail()
    }

    fn read_map(&self, field: &str) -> RowResult<MapData> {
        TypeMismatchSnafu {
            field,
            expected: "map",
            found: "string",
        }
        .fail()
    }
}

/// Forward cursor over a local CSV file.
pub struct CsvCursor {
    reader: csv::Reader<File>,
    row: CsvRow,
}

impl CsvCursor {
    /// Open `path` with the given delimiter; column names come from the
    /// source schema in declaration order.
    pub fn open(
        path: &Path,
        delimiter: u8,
        has_header: bool,
        schema: &Schema,
    ) -> RowResult<CsvCursor> {
        let file = File::open(path).context(OpenSnafu {
            path: path.display().to_string(),
        })?;
        let reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(has_header)
            .flexible(true)
            .from_reader(file);

        let fields = Arc::new(
            schema
                .columns()
                .iter()
                .enumerate()
                .map(|(i, c)| (c.name().to_string(), i))
                .collect::<HashMap<_, _>>(),
        );

        Ok(CsvCursor {
            reader,
            row: CsvRow {
                fields,
                record: StringRecord::new(),
            },
        })
    }
}

impl RowCursor for CsvCursor {
    fn next_row(&mut self) -> RowResult<Option<&dyn RowData>> {
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => {
                self.row.record = record;
                Ok(Some(&self.row))
            }
            Ok(false) => Ok(None),
            Err(source) => Err(source).context(CsvSnafu),
        }
    }
}
