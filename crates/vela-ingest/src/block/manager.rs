//! The process-wide block registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use snafu::prelude::*;
use tracing::debug;

use crate::block::{BatchBlock, BlockSignature};
use crate::meta::TableSpec;
use crate::time::pattern::HOUR_SECONDS;

const MB: usize = 1024 * 1024;

/// Admission failures. Rejections leave the registry unchanged.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AdmissionError {
    /// The block's newest row is already outside the retention window.
    #[snafu(display("Block {signature} expired: max_time {max_time} below watermark {watermark}"))]
    Expired {
        signature: String,
        max_time: u64,
        watermark: u64,
    },

    /// The block alone exceeds the whole per-table memory budget.
    #[snafu(display("Block {signature} of {bytes} bytes exceeds the {max_mb} MB table budget"))]
    OverBudget {
        signature: String,
        bytes: usize,
        max_mb: u64,
    },

    /// A block with this exact identity is already resident.
    #[snafu(display("Duplicate block {signature}"))]
    Duplicate { signature: String },
}

/// Monotonic admission counters, exported for observability.
#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time copy of the admission counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub admitted: u64,
    pub rejected: u64,
    pub evicted: u64,
}

struct Resident {
    order: u64,
    // Cached so budget math does not re-measure column payloads.
    bytes: usize,
    block: BatchBlock,
}

#[derive(Default)]
struct TableStore {
    blocks: Vec<Resident>,
    next_order: u64,
}

impl TableStore {
    fn bytes(&self) -> usize {
        self.blocks.iter().map(|r| r.bytes).sum()
    }

    /// Index of the eviction victim: oldest `max_time`, ties broken by
    /// insertion order.
    fn victim(&self) -> Option<usize> {
        self.blocks
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| (r.block.signature().max_time, r.order))
            .map(|(i, _)| i)
    }

    fn admit(
        &mut self,
        spec: &TableSpec,
        block: BatchBlock,
        now: u64,
        evicted: &mut u64,
    ) -> Result<(), AdmissionError> {
        let signature = block.signature().clone();
        let watermark = now.saturating_sub(spec.max_hr * HOUR_SECONDS as u64);
        ensure!(
            signature.max_time >= watermark,
            ExpiredSnafu {
                signature: signature.to_string(),
                max_time: signature.max_time,
                watermark,
            }
        );

        ensure!(
            !self.blocks.iter().any(|r| {
                let s = r.block.signature();
                s.sequence == signature.sequence && s.spec_id == signature.spec_id
            }),
            DuplicateSnafu {
                signature: signature.to_string(),
            }
        );

        let budget = spec.max_mb as usize * MB;
        let bytes = block.bytes();
        ensure!(
            bytes <= budget,
            OverBudgetSnafu {
                signature: signature.to_string(),
                bytes,
                max_mb: spec.max_mb,
            }
        );

        while self.bytes() + bytes > budget {
            match self.victim() {
                Some(index) => {
                    let victim = self.blocks.remove(index);
                    *evicted += 1;
                    debug!(block = %victim.block.signature(), "evicted for space");
                }
                None => break,
            }
        }

        let order = self.next_order;
        self.next_order += 1;
        self.blocks.push(Resident {
            order,
            bytes,
            block,
        });
        Ok(())
    }

    fn remove_same_spec(&mut self, signature: &BlockSignature) -> Vec<Resident> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.blocks.len());
        for resident in self.blocks.drain(..) {
            if resident.block.signature().same_spec(signature) {
                removed.push(resident);
            } else {
                kept.push(resident);
            }
        }
        self.blocks = kept;
        removed
    }
}

/// In-memory registry of admitted blocks.
///
/// Admission, swap, and eviction are linearizable per table: every mutating
/// operation for a table runs under that table's lock.
#[derive(Default)]
pub struct BlockManager {
    tables: RwLock<HashMap<String, Mutex<TableStore>>>,
    counters: Counters,
}

impl BlockManager {
    pub fn new() -> BlockManager {
        BlockManager::default()
    }

    fn with_table<R>(&self, table: &str, f: impl FnOnce(&mut TableStore) -> R) -> R {
        {
            let tables = self.tables.read().expect("block manager poisoned");
            if let Some(store) = tables.get(table) {
                return f(&mut store.lock().expect("table store poisoned"));
            }
        }

        let mut tables = self.tables.write().expect("block manager poisoned");
        let store = tables.entry(table.to_string()).or_default();
        let result = f(&mut store.lock().expect("table store poisoned"));
        result
    }

    /// Admit one block under the table's caps.
    pub fn add(
        &self,
        spec: &TableSpec,
        block: BatchBlock,
        now: u64,
    ) -> Result<(), AdmissionError> {
        let table = block.signature().table.clone();
        let result = self.with_table(&table, |store| {
            let mut evicted = 0;
            let out = store.admit(spec, block, now, &mut evicted);
            (out, evicted)
        });

        self.counters
            .evicted
            .fetch_add(result.1, Ordering::Relaxed);
        match result.0 {
            Ok(()) => {
                self.counters.admitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Admit a set of blocks; stops at the first rejection and reports how
    /// many were admitted.
    pub fn add_all(
        &self,
        spec: &TableSpec,
        blocks: Vec<BatchBlock>,
        now: u64,
    ) -> Result<usize, AdmissionError> {
        let mut admitted = 0;
        for block in blocks {
            self.add(spec, block, now)?;
            admitted += 1;
        }
        Ok(admitted)
    }

    /// Atomically replace every resident block sharing the spec id with the
    /// given replacement set.
    ///
    /// Observers see either the old set or the new set, never a mix. On
    /// rejection of any replacement block the old set is restored and the
    /// whole swap fails.
    pub fn swap(
        &self,
        spec: &TableSpec,
        spec_id: &str,
        blocks: Vec<BatchBlock>,
        now: u64,
    ) -> Result<usize, AdmissionError> {
        let probe = BlockSignature {
            table: spec.name.clone(),
            sequence: 0,
            min_time: 0,
            max_time: 0,
            spec_id: spec_id.to_string(),
        };

        let (result, evicted) = self.with_table(&spec.name, |store| {
            let mut evicted = 0;
            let removed = store.remove_same_spec(&probe);
            let staged_count = removed.len() as u64;
            let mut staged = Some(removed);

            let incoming = blocks.len();
            let mut outcome = Ok(incoming);
            for block in blocks {
                if let Err(e) = store.admit(spec, block, now, &mut evicted) {
                    // Restore the displaced set; the failed swap admits
                    // nothing.
                    store.remove_same_spec(&probe);
                    if let Some(old) = staged.take() {
                        store.blocks.extend(old);
                    }
                    outcome = Err(e);
                    break;
                }
            }

            if outcome.is_ok() {
                evicted += staged_count;
            }
            (outcome, evicted)
        });

        self.counters.evicted.fetch_add(evicted, Ordering::Relaxed);
        match result {
            Ok(n) => {
                self.counters
                    .admitted
                    .fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Drop all blocks sharing `{table, spec_id}` with the query.
    pub fn remove_same_spec(&self, signature: &BlockSignature) -> usize {
        let removed = self.with_table(&signature.table, |store| {
            store.remove_same_spec(signature).len()
        });
        self.counters
            .evicted
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Evict blocks whose `max_time` fell behind the retention window.
    pub fn evict_expired(&self, spec: &TableSpec, now: u64) -> usize {
        let watermark = now.saturating_sub(spec.max_hr * HOUR_SECONDS as u64);
        let removed = self.with_table(&spec.name, |store| {
            let before = store.blocks.len();
            store
                .blocks
                .retain(|r| r.block.signature().max_time >= watermark);
            before - store.blocks.len()
        });
        self.counters
            .evicted
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Signatures of resident blocks for `table` overlapping
    /// `[min_time, max_time]`.
    pub fn list(&self, table: &str, min_time: u64, max_time: u64) -> Vec<BlockSignature> {
        self.with_table(table, |store| {
            store
                .blocks
                .iter()
                .map(|r| r.block.signature())
                .filter(|s| s.min_time <= max_time && s.max_time >= min_time)
                .cloned()
                .collect()
        })
    }

    /// Signatures of every resident block for `table`.
    pub fn list_all(&self, table: &str) -> Vec<BlockSignature> {
        self.list(table, 0, u64::MAX)
    }

    /// Total resident rows for `table`.
    pub fn rows(&self, table: &str) -> usize {
        self.with_table(table, |store| {
            store.blocks.iter().map(|r| r.block.rows()).sum()
        })
    }

    /// Total resident bytes for `table`.
    pub fn bytes(&self, table: &str) -> usize {
        self.with_table(table, |store| store.bytes())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Batch;
    use crate::meta::{DataSource, TimeSpec};
    use crate::row::{Datum, StaticRow};
    use crate::schema::Schema;

    fn table_spec(name: &str, max_mb: u64, max_hr: u64) -> TableSpec {
        TableSpec {
            name: name.to_string(),
            max_mb,
            max_hr,
            schema: "ROW<id:int>".to_string(),
            source: DataSource::Custom,
            loader: "Roll".to_string(),
            location: String::new(),
            backup: None,
            format: "csv".to_string(),
            serde: Default::default(),
            columns: Default::default(),
            time: TimeSpec::default(),
            access: Vec::new(),
            bucket: Default::default(),
            settings: Default::default(),
        }
    }

    fn block(table: &str, sequence: u64, spec_id: &str, min: u64, max: u64, rows: usize) -> BatchBlock {
        let schema = Schema::parse("ROW<id:int, _time_:long>").unwrap();
        let mut batch = Batch::new(schema, rows);
        for i in 0..rows {
            batch
                .add(
                    &StaticRow::new()
                        .set("id", Datum::Int(i as i32))
                        .set("_time_", Datum::Long(min as i64)),
                )
                .unwrap();
        }
        BatchBlock::new(
            BlockSignature {
                table: table.to_string(),
                sequence,
                min_time: min,
                max_time: max,
                spec_id: spec_id.to_string(),
            },
            batch,
        )
    }

    const NOW: u64 = 1_000_000;

    #[test]
    fn add_and_list() {
        let bm = BlockManager::new();
        let spec = table_spec("t", 100, 1000);

        bm.add(&spec, block("t", 0, "t@a@1", NOW - 100, NOW, 10), NOW)
            .unwrap();
        bm.add(&spec, block("t", 1, "t@a@1", NOW - 50, NOW, 10), NOW)
            .unwrap();

        assert_eq!(bm.list_all("t").len(), 2);
        assert_eq!(bm.rows("t"), 20);
        assert!(bm.bytes("t") > 0);
        // Range filter excludes non-overlapping blocks.
        assert_eq!(bm.list("t", 0, NOW - 75).len(), 1);
        assert_eq!(bm.metrics().admitted, 2);
    }

    #[test]
    fn resident_accounting_tracks_removal() {
        let bm = BlockManager::new();
        let spec = table_spec("t", 100, 1000);

        bm.add(&spec, block("t", 0, "t@a@1", 0, NOW, 10), NOW).unwrap();
        bm.add(&spec, block("t", 0, "t@b@1", 0, NOW, 10), NOW).unwrap();
        let both = bm.bytes("t");
        assert_eq!(bm.rows("t"), 20);
        assert!(both > 0);

        let probe = BlockSignature {
            table: "t".to_string(),
            sequence: 0,
            min_time: 0,
            max_time: 0,
            spec_id: "t@a@1".to_string(),
        };
        assert_eq!(bm.remove_same_spec(&probe), 1);
        assert_eq!(bm.rows("t"), 10);
        assert!(bm.bytes("t") < both);
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let bm = BlockManager::new();
        let spec = table_spec("t", 100, 1000);

        bm.add(&spec, block("t", 0, "t@a@1", 0, NOW, 1), NOW).unwrap();
        let err = bm
            .add(&spec, block("t", 0, "t@a@1", 0, NOW, 1), NOW)
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Duplicate { .. }));
        assert_eq!(bm.metrics().rejected, 1);
    }

    #[test]
    fn expired_blocks_are_rejected() {
        let bm = BlockManager::new();
        let spec = table_spec("t", 100, 1); // one hour retention

        let old = block("t", 0, "t@a@1", 0, NOW - 2 * HOUR_SECONDS as u64, 1);
        assert!(matches!(
            bm.add(&spec, old, NOW),
            Err(AdmissionError::Expired { .. })
        ));
        assert!(bm.list_all("t").is_empty());
    }

    #[test]
    fn overflow_evicts_oldest_max_time_first() {
        let bm = BlockManager::new();
        // A tiny budget: one ~row block fits, two do not.
        let spec = table_spec("t", 1, 1000);

        // Fill with many rows so that two blocks overflow 1 MB.
        let rows = 25_000;
        bm.add(&spec, block("t", 0, "t@a@1", NOW - 500, NOW - 300, rows), NOW)
            .unwrap();
        bm.add(&spec, block("t", 1, "t@a@1", NOW - 200, NOW - 100, rows), NOW)
            .unwrap();

        let left = bm.list_all("t");
        // The older block (smaller max_time) was evicted.
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].sequence, 1);
        assert!(bm.metrics().evicted >= 1);
    }

    #[test]
    fn over_budget_single_block_is_rejected() {
        let bm = BlockManager::new();
        let spec = table_spec("t", 1, 1000);

        let big = block("t", 0, "t@a@1", NOW - 10, NOW, 100_000);
        assert!(matches!(
            bm.add(&spec, big, NOW),
            Err(AdmissionError::OverBudget { .. })
        ));
    }

    #[test]
    fn swap_replaces_only_the_matching_spec() {
        let bm = BlockManager::new();
        let spec = table_spec("t", 100, 1000);

        bm.add(&spec, block("t", 0, "t@a@1", 0, NOW, 2), NOW).unwrap();
        bm.add(&spec, block("t", 1, "t@a@1", 0, NOW, 2), NOW).unwrap();
        bm.add(&spec, block("t", 0, "t@b@1", 0, NOW, 2), NOW).unwrap();

        let replacement = vec![
            block("t", 0, "t@a@1", 10, NOW, 3),
            block("t", 1, "t@a@1", 10, NOW, 3),
        ];
        bm.swap(&spec, "t@a@1", replacement, NOW).unwrap();

        let all = bm.list_all("t");
        assert_eq!(all.len(), 3);
        let for_a: Vec<_> = all.iter().filter(|s| s.spec_id == "t@a@1").collect();
        assert_eq!(for_a.len(), 2);
        // Only the new generation remains.
        assert!(for_a.iter().all(|s| s.min_time == 10));
        // The unrelated spec is untouched.
        assert_eq!(all.iter().filter(|s| s.spec_id == "t@b@1").count(), 1);
    }

    #[test]
    fn failed_swap_restores_the_old_generation() {
        let bm = BlockManager::new();
        let spec = table_spec("t", 1, 1000);

        bm.add(&spec, block("t", 0, "t@a@1", 0, NOW, 2), NOW).unwrap();

        // Replacement cannot fit the table budget at all.
        let replacement = vec![block("t", 0, "t@a@1", 10, NOW, 100_000)];
        assert!(bm.swap(&spec, "t@a@1", replacement, NOW).is_err());

        let all = bm.list_all("t");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].min_time, 0);
    }

    #[test]
    fn remove_same_spec_drops_the_partition() {
        let bm = BlockManager::new();
        let spec = table_spec("t", 100, 1000);

        bm.add(&spec, block("t", 0, "t@a@1", 0, NOW, 1), NOW).unwrap();
        bm.add(&spec, block("t", 1, "t@a@1", 0, NOW, 1), NOW).unwrap();
        bm.add(&spec, block("t", 0, "t@b@1", 0, NOW, 1), NOW).unwrap();

        let probe = BlockSignature {
            table: "t".to_string(),
            sequence: 0,
            min_time: 0,
            max_time: 0,
            spec_id: "t@a@1".to_string(),
        };
        assert_eq!(bm.remove_same_spec(&probe), 2);
        assert_eq!(bm.list_all("t").len(), 1);
    }

    #[test]
    fn evict_expired_sweeps_old_blocks() {
        let bm = BlockManager::new();
        let spec = table_spec("t", 100, 1);

        let hour = HOUR_SECONDS as u64;
        bm.add(&spec, block("t", 0, "t@a@1", NOW - hour, NOW - hour / 2, 1), NOW)
            .unwrap();
        bm.add(&spec, block("t", 1, "t@a@1", NOW - 10, NOW, 1), NOW)
            .unwrap();

        // An hour later the first block is out of the retention window.
        assert_eq!(bm.evict_expired(&spec, NOW + hour / 2 + 1), 1);
        assert_eq!(bm.list_all("t").len(), 1);
    }
}
