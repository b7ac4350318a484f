//! In-memory columnar storage.
//!
//! [`Batch`] is the block builder: it accumulates typed rows into
//! column-oriented buffers, bounded by row count, with a one-step
//! [`Batch::rollback`] and stable addressing of already-appended rows.

pub mod batch;

pub use batch::{Batch, BatchRow};
