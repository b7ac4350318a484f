//! Parquet row cursor.
//!
//! Parquet files are read through the record API; each record is converted
//! into a [`StaticRow`] so the executor sees the same row contract as every
//! other format. Timestamp-typed fields are normalized to unix seconds on
//! conversion.

use std::fs::File;
use std::path::Path;

use parquet::file::reader::SerializedFileReader;
use parquet::record::reader::RowIter;
use parquet::record::{Field, Row};
use snafu::prelude::*;

use crate::row::{
    data::{Datum, ListData, MapData, StaticRow},
    OpenSnafu, ParquetSnafu, RowCursor, RowData, RowResult,
};
use crate::time::pattern::DAY_SECONDS;

fn field_to_datum(field: &Field) -> Datum {
    match field {
        Field::Null => Datum::Null,
        Field::Bool(v) => Datum::Bool(*v),
        Field::Byte(v) => Datum::Byte(*v),
        Field::Short(v) => Datum::Short(*v),
        Field::Int(v) => Datum::Int(*v),
        Field::Long(v) => Datum::Long(*v),
        Field::UByte(v) => Datum::Short(*v as i16),
        Field::UShort(v) => Datum::Int(*v as i32),
        Field::UInt(v) => Datum::Long(*v as i64),
        Field::ULong(v) => Datum::Long(*v as i64),
        Field::Float(v) => Datum::Float(*v),
        Field::Double(v) => Datum::Double(*v),
        Field::Str(v) => Datum::String(v.clone()),
        Field::Bytes(v) => Datum::String(String::from_utf8_lossy(v.data()).into_owned()),
        // Dates are days since epoch; the engine's time unit is seconds.
        Field::Date(days) => Datum::Long(*days as i64 * DAY_SECONDS),
        Field::TimestampMillis(ms) => Datum::Long(*ms / 1_000),
        Field::TimestampMicros(us) => Datum::Long(*us / 1_000_000),
        Field::ListInternal(list) => {
            Datum::List(ListData::new(list.elements().iter().map(field_to_datum).collect()))
        }
        Field::MapInternal(map) => Datum::Map(MapData::new(
            map.entries()
                .iter()
                .map(|(k, v)| (field_to_datum(k), field_to_datum(v)))
                .collect(),
        )),
        // Groups, decimals and other exotic types are not part of the
        // ingestion type model; they read as null.
        _ => Datum::Null,
    }
}

fn convert(row: &Row) -> StaticRow {
    let mut out = StaticRow::new();
    for (name, field) in row.get_column_iter() {
        out.insert(name.clone(), field_to_datum(field));
    }
    out
}

/// Forward cursor over a local Parquet file.
pub struct ParquetCursor {
    iter: RowIter<'static>,
    current: StaticRow,
}

impl std::fmt::Debug for ParquetCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetCursor")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl ParquetCursor {
    pub fn open(path: &Path) -> RowResult<ParquetCursor> {
        let file = File::open(path).context(OpenSnafu {
            path: path.display().to_string(),
        })?;
        let reader = SerializedFileReader::new(file).context(ParquetSnafu)?;
        let iter = RowIter::from_file_into(Box::new(reader));
        Ok(ParquetCursor {
            iter,
            current: StaticRow::new(),
        })
    }
}

impl RowCursor for ParquetCursor {
    fn next_row(&mut self) -> RowResult<Option<&dyn RowData>> {
        match self.iter.next() {
            None => Ok(None),
            Some(Err(source)) => Err(source).context(ParquetSnafu),
            Some(Ok(row)) => {
                self.current = convert(&row);
                Ok(Some(&self.current))
            }
        }
    }
}
