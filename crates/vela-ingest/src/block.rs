//! Published blocks and their process-wide registry.
//!
//! A [`BatchBlock`] pairs an immutable [`Batch`] with its identity, the
//! [`BlockSignature`]. The [`BlockManager`] owns every admitted block and
//! enforces the per-table residency caps (`max_mb`, `max_hr`), swap
//! semantics, and time-based eviction.

pub mod manager;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::memory::Batch;

pub use manager::{AdmissionError, BlockManager, MetricsSnapshot};

/// Identity of a published block.
///
/// Blocks with identical `{table, spec_id}` belong to the same logical
/// partition; swap admission replaces exactly that set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockSignature {
    pub table: String,
    pub sequence: u64,
    pub min_time: u64,
    pub max_time: u64,
    pub spec_id: String,
}

impl BlockSignature {
    /// Whether `other` identifies the same logical partition.
    pub fn same_spec(&self, other: &BlockSignature) -> bool {
        self.table == other.table && self.spec_id == other.spec_id
    }
}

impl fmt::Display for BlockSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}[{}, {}]@{}",
            self.table, self.sequence, self.min_time, self.max_time, self.spec_id
        )
    }
}

/// A signed, immutable columnar block.
pub struct BatchBlock {
    signature: BlockSignature,
    data: Batch,
}

impl BatchBlock {
    pub fn new(signature: BlockSignature, data: Batch) -> BatchBlock {
        BatchBlock { signature, data }
    }

    pub fn signature(&self) -> &BlockSignature {
        &self.signature
    }

    pub fn data(&self) -> &Batch {
        &self.data
    }

    pub fn rows(&self) -> usize {
        self.data.rows()
    }

    pub fn bytes(&self) -> usize {
        self.data.bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(table: &str, sequence: u64, spec_id: &str) -> BlockSignature {
        BlockSignature {
            table: table.to_string(),
            sequence,
            min_time: 100,
            max_time: 200,
            spec_id: spec_id.to_string(),
        }
    }

    #[test]
    fn same_spec_compares_table_and_spec_only() {
        let a = sig("t", 0, "t@p@1");
        let mut b = sig("t", 7, "t@p@1");
        b.min_time = 0;
        b.max_time = 999;
        assert!(a.same_spec(&b));

        assert!(!a.same_spec(&sig("t", 0, "t@q@1")));
        assert!(!a.same_spec(&sig("u", 0, "t@p@1")));
    }

    #[test]
    fn signature_wire_form_round_trips() {
        let s = sig("events", 3, "events@p/part-0.csv@10");
        let json = serde_json::to_string(&s).unwrap();
        let back: BlockSignature = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
