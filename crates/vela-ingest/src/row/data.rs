//! Decoded values and the generic row view.

use std::collections::HashMap;

use snafu::OptionExt;

use crate::row::{NullValueSnafu, RowResult, TypeMismatchSnafu, UnknownFieldSnafu};

/// A single decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    List(ListData),
    Map(MapData),
}

impl Datum {
    /// Name of the stored variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Bool(_) => "bool",
            Datum::Byte(_) => "byte",
            Datum::Short(_) => "short",
            Datum::Int(_) => "int",
            Datum::Long(_) => "long",
            Datum::Float(_) => "float",
            Datum::Double(_) => "double",
            Datum::String(_) => "string",
            Datum::List(_) => "list",
            Datum::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Widening integer view: any integer variant as i64.
    fn as_integer(&self) -> Option<i64> {
        match *self {
            Datum::Byte(v) => Some(v as i64),
            Datum::Short(v) => Some(v as i64),
            Datum::Int(v) => Some(v as i64),
            Datum::Long(v) => Some(v),
            _ => None,
        }
    }
}

/// Items of a decoded list cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListData {
    items: Vec<Datum>,
}

impl ListData {
    pub fn new(items: Vec<Datum>) -> ListData {
        ListData { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.items[index].is_null()
    }

    pub fn item(&self, index: usize) -> &Datum {
        &self.items[index]
    }

    pub fn items(&self) -> &[Datum] {
        &self.items
    }
}

/// Entries of a decoded map cell, in encounter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapData {
    entries: Vec<(Datum, Datum)>,
}

impl MapData {
    pub fn new(entries: Vec<(Datum, Datum)>) -> MapData {
        MapData { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Datum, Datum)] {
        &self.entries
    }
}

macro_rules! coerce {
    ($datum:expr, $field:expr, $expected:literal, $pattern:pat => $value:expr) => {
        match $datum {
            Datum::Null => NullValueSnafu {
                field: $field,
                expected: $expected,
            }
            .fail(),
            $pattern => Ok($value),
            other => TypeMismatchSnafu {
                field: $field,
                expected: $expected,
                found: other.type_name(),
            }
            .fail(),
        }
    };
}

/// Coerce a [`Datum`] into the requested primitive, widening integers and
/// floats but never narrowing.
pub(crate) fn read_datum_bool(datum: &Datum, field: &str) -> RowResult<bool> {
    coerce!(datum, field, "bool", Datum::Bool(v) => *v)
}

pub(crate) fn read_datum_byte(datum: &Datum, field: &str) -> RowResult<i8> {
    coerce!(datum, field, "byte", Datum::Byte(v) => *v)
}

pub(crate) fn read_datum_short(datum: &Datum, field: &str) -> RowResult<i16> {
    match datum.as_integer() {
        Some(v) if i16::try_from(v).is_ok() => Ok(v as i16),
        _ => coerce!(datum, field, "short", Datum::Short(v) => *v),
    }
}

pub(crate) fn read_datum_int(datum: &Datum, field: &str) -> RowResult<i32> {
    match datum.as_integer() {
        Some(v) if i32::try_from(v).is_ok() => Ok(v as i32),
        _ => coerce!(datum, field, "int", Datum::Int(v) => *v),
    }
}

pub(crate) fn read_datum_long(datum: &Datum, field: &str) -> RowResult<i64> {
    match datum.as_integer() {
        Some(v) => Ok(v),
        None => coerce!(datum, field, "long", Datum::Long(v) => *v),
    }
}

pub(crate) fn read_datum_float(datum: &Datum, field: &str) -> RowResult<f32> {
    coerce!(datum, field, "float", Datum::Float(v) => *v)
}

pub(crate) fn read_datum_double(datum: &Datum, field: &str) -> RowResult<f64> {
    match datum {
        Datum::Float(v) => Ok(*v as f64),
        other => coerce!(other, field, "double", Datum::Double(v) => *v),
    }
}

pub(crate) fn read_datum_string(datum: &Datum, field: &str) -> RowResult<String> {
    coerce!(datum, field, "string", Datum::String(v) => v.clone())
}

pub(crate) fn read_datum_list(datum: &Datum, field: &str) -> RowResult<ListData> {
    coerce!(datum, field, "list", Datum::List(v) => v.clone())
}

pub(crate) fn read_datum_map(datum: &Datum, field: &str) -> RowResult<MapData> {
    coerce!(datum, field, "map", Datum::Map(v) => v.clone())
}

/// Typed, name-based readers over one row.
///
/// Reads of null cells fail with [`RowError::NullValue`]; probe with
/// `is_null` first. Integer reads widen (a `byte` cell satisfies
/// `read_long`) but never narrow out of range.
pub trait RowData {
    fn is_null(&self, field: &str) -> bool;
    fn read_bool(&self, field: &str) -> RowResult<bool>;
    fn read_byte(&self, field: &str) -> RowResult<i8>;
    fn read_short(&self, field: &str) -> RowResult<i16>;
    fn read_int(&self, field: &str) -> RowResult<i32>;
    fn read_long(&self, field: &str) -> RowResult<i64>;
    fn read_float(&self, field: &str) -> RowResult<f32>;
    fn read_double(&self, field: &str) -> RowResult<f64>;
    fn read_string(&self, field: &str) -> RowResult<String>;
    fn read_list(&self, field: &str) -> RowResult<ListData>;
    fn read_map(&self, field: &str) -> RowResult<MapData>;
}

/// An owned in-memory row: field name to [`Datum`].
///
/// Used for synthetic data, Parquet record conversion, and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticRow {
    values: HashMap<String, Datum>,
}

impl StaticRow {
    pub fn new() -> StaticRow {
        StaticRow::default()
    }

    /// Builder-style field assignment.
    pub fn set(mut self, field: impl Into<String>, value: Datum) -> StaticRow {
        self.values.insert(field.into(), value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Datum) {
        self.values.insert(field.into(), value);
    }

    fn get(&self, field: &str) -> RowResult<&Datum> {
        self.values
            .get(field)
            .context(UnknownFieldSnafu { field })
    }
}

impl RowData for StaticRow {
    fn is_null(&self, field: &str) -> bool {
        self.values.get(field).map_or(true, Datum::is_null)
    }

    fn read_bool(&self, field: &str) -> RowResult<bool> {
        read_datum_bool(self.get(field)?, field)
    }

    fn read_byte(&self, field: &str) -> RowResult<i8> {
        read_datum_byte(self.get(field)?, field)
    }

    fn read_short(&self, field: &str) -> RowResult<i16> {
        read_datum_short(self.get(field)?, field)
    }

    fn read_int(&self, field: &str) -> RowResult<i32> {
        read_datum_int(self.get(field)?, field)
    }

    fn read_long(&self, field: &str) -> RowResult<i64> {
        read_datum_long(self.get(field)?, field)
    }

    fn read_float(&self, field: &str) -> RowResult<f32> {
        read_datum_float(self.get(field)?, field)
    }

    fn read_double(&self, field: &str) -> RowResult<f64> {
        read_datum_double(self.get(field)?, field)
    }

    fn read_string(&self, field: &str) -> RowResult<String> {
        read_datum_string(self.get(field)?, field)
    }

    fn read_list(&self, field: &str) -> RowResult<ListData> {
        read_datum_list(self.get(field)?, field)
    }

    fn read_map(&self, field: &str) -> RowResult<MapData> {
        read_datum_map(self.get(field)?, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowError;

    #[test]
    fn static_row_typed_reads() {
        let row = StaticRow::new()
            .set("id", Datum::Int(42))
            .set("name", Datum::String("vela".to_string()))
            .set("score", Datum::Double(0.5))
            .set("flag", Datum::Bool(true))
            .set("missing", Datum::Null);

        assert_eq!(row.read_int("id").unwrap(), 42);
        assert_eq!(row.read_long("id").unwrap(), 42); // widening
        assert_eq!(row.read_string("name").unwrap(), "vela");
        assert_eq!(row.read_double("score").unwrap(), 0.5);
        assert!(row.read_bool("flag").unwrap());

        assert!(row.is_null("missing"));
        assert!(row.is_null("not_a_field"));
        assert!(!row.is_null("id"));
    }

    #[test]
    fn reads_report_typed_errors() {
        let row = StaticRow::new()
            .set("id", Datum::Int(1))
            .set("gone", Datum::Null);

        assert!(matches!(
            row.read_string("id"),
            Err(RowError::TypeMismatch { .. })
        ));
        assert!(matches!(
            row.read_int("gone"),
            Err(RowError::NullValue { .. })
        ));
        assert!(matches!(
            row.read_int("nope"),
            Err(RowError::UnknownField { .. })
        ));
        // Narrowing out of range is rejected.
        let wide = StaticRow::new().set("n", Datum::Long(1 << 40));
        assert!(matches!(
            wide.read_int("n"),
            Err(RowError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn list_data_probes() {
        let list = ListData::new(vec![
            Datum::String("a".to_string()),
            Datum::Null,
            Datum::String("c".to_string()),
        ]);
        assert_eq!(list.len(), 3);
        assert!(!list.is_null(0));
        assert!(list.is_null(1));
        assert_eq!(list.item(2), &Datum::String("c".to_string()));
    }
}
