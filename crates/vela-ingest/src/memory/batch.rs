//! The columnar batch builder.

use std::mem;

use crate::row::data::{
    read_datum_bool, read_datum_byte, read_datum_double, read_datum_float, read_datum_int,
    read_datum_list, read_datum_long, read_datum_map, read_datum_short, read_datum_string,
};
use crate::row::{Datum, ListData, MapData, RowData, RowResult};
use crate::schema::{Schema, TypeKind};

/// Typed storage of one column. Nulls are kept in-line.
#[derive(Debug, Clone)]
enum ColumnStore {
    Bool(Vec<Option<bool>>),
    Byte(Vec<Option<i8>>),
    Short(Vec<Option<i16>>),
    Int(Vec<Option<i32>>),
    Long(Vec<Option<i64>>),
    Float(Vec<Option<f32>>),
    Double(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    List(Vec<Option<ListData>>),
    Map(Vec<Option<MapData>>),
}

impl ColumnStore {
    fn with_capacity(kind: TypeKind, capacity: usize) -> ColumnStore {
        match kind {
            TypeKind::Bool => ColumnStore::Bool(Vec::with_capacity(capacity)),
            TypeKind::Byte => ColumnStore::Byte(Vec::with_capacity(capacity)),
            TypeKind::Short => ColumnStore::Short(Vec::with_capacity(capacity)),
            TypeKind::Int => ColumnStore::Int(Vec::with_capacity(capacity)),
            TypeKind::Long => ColumnStore::Long(Vec::with_capacity(capacity)),
            TypeKind::Float => ColumnStore::Float(Vec::with_capacity(capacity)),
            TypeKind::Double => ColumnStore::Double(Vec::with_capacity(capacity)),
            TypeKind::String => ColumnStore::String(Vec::with_capacity(capacity)),
            TypeKind::List => ColumnStore::List(Vec::with_capacity(capacity)),
            TypeKind::Map => ColumnStore::Map(Vec::with_capacity(capacity)),
            // Row only occurs at the schema root, never as a column.
            TypeKind::Row => ColumnStore::Long(Vec::with_capacity(capacity)),
        }
    }

    fn truncate(&mut self, len: usize) {
        match self {
            ColumnStore::Bool(v) => v.truncate(len),
            ColumnStore::Byte(v) => v.truncate(len),
            ColumnStore::Short(v) => v.truncate(len),
            ColumnStore::Int(v) => v.truncate(len),
            ColumnStore::Long(v) => v.truncate(len),
            ColumnStore::Float(v) => v.truncate(len),
            ColumnStore::Double(v) => v.truncate(len),
            ColumnStore::String(v) => v.truncate(len),
            ColumnStore::List(v) => v.truncate(len),
            ColumnStore::Map(v) => v.truncate(len),
        }
    }

    fn push_null(&mut self) {
        match self {
            ColumnStore::Bool(v) => v.push(None),
            ColumnStore::Byte(v) => v.push(None),
            ColumnStore::Short(v) => v.push(None),
            ColumnStore::Int(v) => v.push(None),
            ColumnStore::Long(v) => v.push(None),
            ColumnStore::Float(v) => v.push(None),
            ColumnStore::Double(v) => v.push(None),
            ColumnStore::String(v) => v.push(None),
            ColumnStore::List(v) => v.push(None),
            ColumnStore::Map(v) => v.push(None),
        }
    }

    fn push_from(&mut self, name: &str, row: &dyn RowData) -> RowResult<()> {
        match self {
            ColumnStore::Bool(v) => v.push(Some(row.read_bool(name)?)),
            ColumnStore::Byte(v) => v.push(Some(row.read_byte(name)?)),
            ColumnStore::Short(v) => v.push(Some(row.read_short(name)?)),
            ColumnStore::Int(v) => v.push(Some(row.read_int(name)?)),
            ColumnStore::Long(v) => v.push(Some(row.read_long(name)?)),
            ColumnStore::Float(v) => v.push(Some(row.read_float(name)?)),
            ColumnStore::Double(v) => v.push(Some(row.read_double(name)?)),
            ColumnStore::String(v) => v.push(Some(row.read_string(name)?)),
            ColumnStore::List(v) => v.push(Some(row.read_list(name)?)),
            ColumnStore::Map(v) => v.push(Some(row.read_map(name)?)),
        }
        Ok(())
    }

    fn datum(&self, index: usize) -> Datum {
        match self {
            ColumnStore::Bool(v) => v[index].map_or(Datum::Null, Datum::Bool),
            ColumnStore::Byte(v) => v[index].map_or(Datum::Null, Datum::Byte),
            ColumnStore::Short(v) => v[index].map_or(Datum::Null, Datum::Short),
            ColumnStore::Int(v) => v[index].map_or(Datum::Null, Datum::Int),
            ColumnStore::Long(v) => v[index].map_or(Datum::Null, Datum::Long),
            ColumnStore::Float(v) => v[index].map_or(Datum::Null, Datum::Float),
            ColumnStore::Double(v) => v[index].map_or(Datum::Null, Datum::Double),
            ColumnStore::String(v) => v[index]
                .as_ref()
                .map_or(Datum::Null, |s| Datum::String(s.clone())),
            ColumnStore::List(v) => v[index]
                .as_ref()
                .map_or(Datum::Null, |l| Datum::List(l.clone())),
            ColumnStore::Map(v) => v[index]
                .as_ref()
                .map_or(Datum::Null, |m| Datum::Map(m.clone())),
        }
    }

    fn is_null(&self, index: usize) -> bool {
        match self {
            ColumnStore::Bool(v) => v[index].is_none(),
            ColumnStore::Byte(v) => v[index].is_none(),
            ColumnStore::Short(v) => v[index].is_none(),
            ColumnStore::Int(v) => v[index].is_none(),
            ColumnStore::Long(v) => v[index].is_none(),
            ColumnStore::Float(v) => v[index].is_none(),
            ColumnStore::Double(v) => v[index].is_none(),
            ColumnStore::String(v) => v[index].is_none(),
            ColumnStore::List(v) => v[index].is_none(),
            ColumnStore::Map(v) => v[index].is_none(),
        }
    }

    fn bytes(&self) -> usize {
        fn datum_bytes(d: &Datum) -> usize {
            match d {
                Datum::String(s) => mem::size_of::<Datum>() + s.len(),
                Datum::List(l) => {
                    mem::size_of::<Datum>() + l.items().iter().map(datum_bytes).sum::<usize>()
                }
                Datum::Map(m) => {
                    mem::size_of::<Datum>()
                        + m.entries()
                            .iter()
                            .map(|(k, v)| datum_bytes(k) + datum_bytes(v))
                            .sum::<usize>()
                }
                _ => mem::size_of::<Datum>(),
            }
        }

        match self {
            ColumnStore::Bool(v) => v.len() * mem::size_of::<Option<bool>>(),
            ColumnStore::Byte(v) => v.len() * mem::size_of::<Option<i8>>(),
            ColumnStore::Short(v) => v.len() * mem::size_of::<Option<i16>>(),
            ColumnStore::Int(v) => v.len() * mem::size_of::<Option<i32>>(),
            ColumnStore::Long(v) => v.len() * mem::size_of::<Option<i64>>(),
            ColumnStore::Float(v) => v.len() * mem::size_of::<Option<f32>>(),
            ColumnStore::Double(v) => v.len() * mem::size_of::<Option<f64>>(),
            ColumnStore::String(v) => v
                .iter()
                .map(|s| mem::size_of::<Option<String>>() + s.as_ref().map_or(0, String::len))
                .sum(),
            ColumnStore::List(v) => v
                .iter()
                .map(|l| {
                    mem::size_of::<Option<ListData>>()
                        + l.as_ref().map_or(0, |l| {
                            l.items().iter().map(datum_bytes).sum::<usize>()
                        })
                })
                .sum(),
            ColumnStore::Map(v) => v
                .iter()
                .map(|m| {
                    mem::size_of::<Option<MapData>>()
                        + m.as_ref().map_or(0, |m| {
                            m.entries()
                                .iter()
                                .map(|(k, val)| datum_bytes(k) + datum_bytes(val))
                                .sum::<usize>()
                        })
                })
                .sum(),
        }
    }
}

struct Column {
    name: String,
    store: ColumnStore,
}

/// Append-only columnar buffer keyed by an effective schema.
///
/// Invariants:
/// - A successful [`add`](Batch::add) appends exactly one row; a failed one
///   leaves the batch untouched (the row is dropped, not half-written).
/// - [`rollback`](Batch::rollback) undoes the last appended row.
/// - Reads of row `i` for `i < rows()` are stable across later appends.
pub struct Batch {
    schema: Schema,
    columns: Vec<Column>,
    rows: usize,
}

impl Batch {
    /// Create an empty batch for `schema`, pre-sizing for `capacity` rows.
    pub fn new(schema: Schema, capacity: usize) -> Batch {
        let columns = schema
            .columns()
            .iter()
            .map(|c| Column {
                name: c.name().to_string(),
                store: ColumnStore::with_capacity(c.kind(), capacity),
            })
            .collect();
        Batch {
            schema,
            columns,
            rows: 0,
        }
    }

    /// The effective schema this batch stores.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of appended rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Estimated resident size in bytes.
    pub fn bytes(&self) -> usize {
        self.columns.iter().map(|c| c.store.bytes()).sum()
    }

    /// Append one row, reading every schema column from the row view.
    ///
    /// On error the partially written cells are reclaimed and the batch is
    /// left exactly as before the call.
    pub fn add(&mut self, row: &dyn RowData) -> RowResult<()> {
        let mark = self.rows;
        let mut failure = None;
        for index in 0..self.columns.len() {
            let Column { name, store } = &mut self.columns[index];
            let name: &str = name;
            let appended = if row.is_null(name) {
                store.push_null();
                Ok(())
            } else {
                store.push_from(name, row)
            };

            if let Err(e) = appended {
                failure = Some(e);
                break;
            }
        }

        match failure {
            Some(e) => {
                for column in &mut self.columns {
                    column.store.truncate(mark);
                }
                Err(e)
            }
            None => {
                self.rows += 1;
                Ok(())
            }
        }
    }

    /// Undo the last appended row.
    ///
    /// Valid immediately after any successful [`add`](Batch::add). Calling
    /// it repeatedly keeps removing earlier rows and is safe on an empty
    /// batch (no-op).
    pub fn rollback(&mut self) {
        if self.rows == 0 {
            return;
        }
        self.rows -= 1;
        for column in &mut self.columns {
            column.store.truncate(self.rows);
        }
    }

    /// Read access to row `index`.
    ///
    /// # Panics
    /// Panics if `index >= rows()`.
    pub fn row(&self, index: usize) -> BatchRow<'_> {
        assert!(index < self.rows, "row {index} out of range ({})", self.rows);
        BatchRow { batch: self, index }
    }

    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A read-only view of one appended row.
pub struct BatchRow<'a> {
    batch: &'a Batch,
    index: usize,
}

impl BatchRow<'_> {
    fn datum(&self, field: &str) -> RowResult<Datum> {
        match self.batch.column(field) {
            Some(column) => Ok(column.store.datum(self.index)),
            None => crate::row::UnknownFieldSnafu { field }.fail(),
        }
    }
}

impl RowData for BatchRow<'_> {
    fn is_null(&self, field: &str) -> bool {
        self.batch
            .column(field)
            .map_or(true, |c| c.store.is_null(self.index))
    }

    fn read_bool(&self, field: &str) -> RowResult<bool> {
        read_datum_bool(&self.datum(field)?, field)
    }

    fn read_byte(&self, field: &str) -> RowResult<i8> {
        read_datum_byte(&self.datum(field)?, field)
    }

    fn read_short(&self, field: &str) -> RowResult<i16> {
        read_datum_short(&self.datum(field)?, field)
    }

    fn read_int(&self, field: &str) -> RowResult<i32> {
        read_datum_int(&self.datum(field)?, field)
    }

    fn read_long(&self, field: &str) -> RowResult<i64> {
        read_datum_long(&self.datum(field)?, field)
    }

    fn read_float(&self, field: &str) -> RowResult<f32> {
        read_datum_float(&self.datum(field)?, field)
    }

    fn read_double(&self, field: &str) -> RowResult<f64> {
        read_datum_double(&self.datum(field)?, field)
    }

    fn read_string(&self, field: &str) -> RowResult<String> {
        read_datum_string(&self.datum(field)?, field)
    }

    fn read_list(&self, field: &str) -> RowResult<ListData> {
        read_datum_list(&self.datum(field)?, field)
    }

    fn read_map(&self, field: &str) -> RowResult<MapData> {
        read_datum_map(&self.datum(field)?, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::StaticRow;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const TEST_SCHEMA: &str = "ROW<id:int, event:string, items:list<string>, flag:bool>";

    fn mock_row(rng: &mut StdRng, null_items: bool) -> StaticRow {
        let items = if null_items {
            Datum::Null
        } else {
            Datum::List(ListData::new(
                (0..rng.gen_range(0..4))
                    .map(|i| Datum::String(format!("item-{i}-{}", rng.gen_range(0..100))))
                    .collect(),
            ))
        };
        StaticRow::new()
            .set("id", Datum::Int(rng.gen_range(0..1_000_000)))
            .set("event", Datum::String(format!("event-{}", rng.gen_range(0..10_000))))
            .set("items", items)
            .set("flag", Datum::Bool(rng.gen_bool(0.5)))
    }

    /// Render one row as text, the way the write tests compare rows.
    fn line(row: &dyn RowData) -> String {
        let mut items = String::new();
        if !row.is_null("items") {
            let list = row.read_list("items").unwrap();
            for i in 0..list.len() {
                if list.is_null(i) {
                    items.push_str("NULL,");
                } else {
                    match list.item(i) {
                        Datum::String(s) => {
                            items.push_str(s);
                            items.push(',');
                        }
                        other => panic!("unexpected item {other:?}"),
                    }
                }
            }
        }
        format!(
            "({}, {}, [{}], {})",
            if row.is_null("id") { 0 } else { row.read_int("id").unwrap() },
            if row.is_null("event") {
                "NULL".to_string()
            } else {
                row.read_string("event").unwrap()
            },
            items,
            if row.is_null("flag") { true } else { row.read_bool("flag").unwrap() },
        )
    }

    #[test]
    fn write_then_read_back_1024_rows() {
        let schema = Schema::parse(TEST_SCHEMA).unwrap();
        let mut batch = Batch::new(schema, 1024);

        let mut rng = StdRng::seed_from_u64(0x5EED);
        let rows: Vec<StaticRow> = (0..1024)
            // every third row has a null items list
            .map(|i| mock_row(&mut rng, i % 3 == 0))
            .collect();

        for row in &rows {
            batch.add(row).unwrap();
        }

        assert_eq!(batch.rows(), 1024);
        for (i, expected) in rows.iter().enumerate() {
            assert_eq!(line(&batch.row(i)), line(expected), "row {i}");
        }
    }

    #[test]
    fn rollback_undoes_the_last_add() {
        let schema = Schema::parse(TEST_SCHEMA).unwrap();
        let mut batch = Batch::new(schema, 8);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..5 {
            batch.add(&mock_row(&mut rng, false)).unwrap();
        }
        let lines: Vec<String> = (0..5).map(|i| line(&batch.row(i))).collect();

        assert_eq!(batch.rows(), 5);
        batch.rollback();
        assert_eq!(batch.rows(), 4);

        // add + rollback leaves the count unchanged every time
        for _ in 0..5 {
            batch.add(&mock_row(&mut rng, false)).unwrap();
            batch.rollback();
            assert_eq!(batch.rows(), 4);
        }

        batch.add(&mock_row(&mut rng, false)).unwrap();
        assert_eq!(batch.rows(), 5);

        // the untouched prefix is stable
        for (i, expected) in lines.iter().enumerate().take(4) {
            assert_eq!(&line(&batch.row(i)), expected);
        }
    }

    #[test]
    fn rollback_on_empty_batch_is_a_noop() {
        let schema = Schema::parse("ROW<id:int>").unwrap();
        let mut batch = Batch::new(schema, 4);
        batch.rollback();
        assert_eq!(batch.rows(), 0);
    }

    #[test]
    fn failed_add_leaves_the_batch_unchanged() {
        let schema = Schema::parse("ROW<id:int, event:string>").unwrap();
        let mut batch = Batch::new(schema, 4);

        batch
            .add(
                &StaticRow::new()
                    .set("id", Datum::Int(1))
                    .set("event", Datum::String("ok".to_string())),
            )
            .unwrap();

        // `event` has the wrong type: the id cell written first must be
        // reclaimed.
        let bad = StaticRow::new()
            .set("id", Datum::Int(2))
            .set("event", Datum::Long(7));
        assert!(batch.add(&bad).is_err());

        assert_eq!(batch.rows(), 1);
        assert_eq!(batch.row(0).read_int("id").unwrap(), 1);

        // and the batch still accepts rows afterwards
        batch
            .add(
                &StaticRow::new()
                    .set("id", Datum::Int(3))
                    .set("event", Datum::String("again".to_string())),
            )
            .unwrap();
        assert_eq!(batch.rows(), 2);
        assert_eq!(batch.row(1).read_int("id").unwrap(), 3);
    }

    #[test]
    fn bytes_grow_with_content() {
        let schema = Schema::parse("ROW<id:int, event:string>").unwrap();
        let mut batch = Batch::new(schema, 4);
        let empty = batch.bytes();

        batch
            .add(
                &StaticRow::new()
                    .set("id", Datum::Int(1))
                    .set("event", Datum::String("x".repeat(100))),
            )
            .unwrap();
        assert!(batch.bytes() > empty + 100);
    }
}
