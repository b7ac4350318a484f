//! Declarative table metadata.
//!
//! These types mirror the entries of a cluster configuration file: which
//! tables exist, where their data lives, how rows get a timestamp, and the
//! per-table residency caps the block manager enforces. They are immutable
//! once loaded and shared (`Arc`) between the spec repository, the ingest
//! executor, and any downstream metadata service.

pub mod table_spec;
pub mod time_spec;

pub use table_spec::{
    AccessRule, BucketInfo, ColumnProp, DataSource, Settings, StreamSerde, TableSpec,
};
pub use time_spec::{TimeSpec, TimeType};
