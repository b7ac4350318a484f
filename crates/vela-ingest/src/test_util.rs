//! Built-in test table and seeded mock data.
//!
//! The synthetic test loader admits blocks generated here, and the test
//! suites reuse the same generators so synthetic content stays consistent
//! across the codebase. Generation is fully seeded: the same seed always
//! yields the same rows.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::memory::Batch;
use crate::meta::{DataSource, TableSpec, TimeSpec, TimeType};
use crate::row::{Datum, ListData, StaticRow};
use crate::schema::{Schema, TIME_COLUMN};

/// Schema of the built-in test table.
pub const TEST_TABLE_SCHEMA: &str = "ROW<id:int, event:string, items:list<string>, flag:bool>";

/// Name of the built-in test table.
pub const TEST_TABLE_NAME: &str = "vela.test";

/// A complete spec for the built-in test table.
///
/// `unix_time` anchors the synthetic time window `[unix_time,
/// unix_time + 3600 * max_hr)`.
pub fn test_table(unix_time: i64, max_hr: u64) -> TableSpec {
    TableSpec {
        name: TEST_TABLE_NAME.to_string(),
        max_mb: 100,
        max_hr,
        schema: TEST_TABLE_SCHEMA.to_string(),
        source: DataSource::Custom,
        loader: crate::config::DEFAULT_TEST_LOADER.to_string(),
        location: String::new(),
        backup: None,
        format: "csv".to_string(),
        serde: Default::default(),
        columns: Default::default(),
        time: TimeSpec {
            kind: TimeType::Static,
            unix_time,
            column: String::new(),
            pattern: String::new(),
        },
        access: Vec::new(),
        bucket: Default::default(),
        settings: Default::default(),
    }
}

/// Shared handle to the built-in test table.
pub fn test_table_arc(unix_time: i64, max_hr: u64) -> Arc<TableSpec> {
    Arc::new(test_table(unix_time, max_hr))
}

/// One seeded mock row of the test schema (without `_time_`).
pub fn mock_row(rng: &mut StdRng) -> StaticRow {
    let items = if rng.gen_bool(0.3) {
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
        .set(
            "event",
            Datum::String(format!("event-{}", rng.gen_range(0..10_000))),
        )
        .set("items", items)
        .set("flag", Datum::Bool(rng.gen_bool(0.5)))
}

/// A sealed batch of `rows` seeded mock rows with `_time_` values spread
/// over `[start, end)`.
pub fn mock_batch(seed: u64, rows: usize, start: i64, end: i64) -> Batch {
    let mut schema = Schema::parse(TEST_TABLE_SCHEMA).expect("test schema parses");
    schema
        .add_column(crate::schema::TypeNode::scalar(
            TIME_COLUMN,
            crate::schema::TypeKind::Long,
        ))
        .expect("test schema has no reserved column");

    let width = (end - start).max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut batch = Batch::new(schema, rows);
    for i in 0..rows {
        let time = start + (i as i64 * width) / rows.max(1) as i64;
        let row = mock_row(&mut rng).set(TIME_COLUMN, Datum::Long(time.min(end - 1)));
        batch.add(&row).expect("mock rows always match the schema");
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowData;

    #[test]
    fn mock_rows_are_deterministic_per_seed() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            assert_eq!(mock_row(&mut a), mock_row(&mut b));
        }

        let mut c = StdRng::seed_from_u64(8);
        let differs = (0..32).any(|_| mock_row(&mut a) != mock_row(&mut c));
        assert!(differs);
    }

    #[test]
    fn mock_batch_times_stay_in_range() {
        let batch = mock_batch(1, 100, 1_000, 2_000);
        assert_eq!(batch.rows(), 100);
        for i in 0..batch.rows() {
            let t = batch.row(i).read_long(TIME_COLUMN).unwrap();
            assert!((1_000..2_000).contains(&t), "row {i} time {t}");
        }
    }
}
