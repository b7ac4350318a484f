//! Ingestion core for the vela analytics engine.
//!
//! This crate turns declarative table specifications into resident
//! in-memory columnar blocks:
//!
//! - [`config`]: cluster configuration loading and validation (fatal at
//!   startup, never at refresh time).
//! - [`meta`]: table specifications ([`TableSpec`], [`TimeSpec`]) shared
//!   read-only across the pipeline.
//! - [`schema`]: the nominal type tree behind each table, including the
//!   reserved `_time_` column.
//! - [`time`]: path-macro classification and expansion, and the per-row
//!   time resolver.
//! - [`source`]: adapters over object storage for listing and fetching
//!   ingest inputs.
//! - [`row`]: the row-view and row-cursor contracts plus the CSV and
//!   Parquet implementations.
//! - [`memory`]: the columnar [`Batch`] builder with rollback and stable
//!   addressing.
//! - [`block`]: block identity and the process-wide [`BlockManager`] with
//!   size/time-capped admission.
//! - [`ingest`]: work units ([`IngestSpec`]), their deterministic
//!   enumeration ([`SpecRepo`]), and the executor running the
//!   fetch → decode → batch → publish pipeline.
//!
//! The query engine, its RPC surface, and the web gateway consume admitted
//! blocks through the block manager; they live outside this crate.

pub mod block;
pub mod config;
pub mod ingest;
pub mod memory;
pub mod meta;
pub mod row;
pub mod schema;
pub mod source;
pub mod test_util;
pub mod time;

pub use block::{BatchBlock, BlockManager, BlockSignature};
pub use config::{ClusterConfig, EngineSettings};
pub use ingest::{IngestExecutor, IngestSpec, SpecRepo, SpecState};
pub use memory::Batch;
pub use meta::{TableSpec, TimeSpec};
pub use schema::{Schema, TIME_COLUMN};
pub use source::{SourceAdapter, SourceRegistry};
