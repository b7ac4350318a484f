//! Ingest work units and their lifecycle.
//!
//! The [`SpecRepo`] turns the cluster configuration into the canonical set
//! of [`IngestSpec`] work units; the [`IngestExecutor`] runs one work unit
//! through the fetch → decode → batch → publish pipeline and reports the
//! outcome back onto the spec's state machine.

pub mod executor;
pub mod repo;
pub mod spec;

use snafu::{Backtrace, prelude::*};

use crate::block::AdmissionError;
use crate::row::RowError;
use crate::schema::SchemaError;
use crate::source::SourceError;
use crate::time::TimeError;

pub use executor::IngestExecutor;
pub use repo::SpecRepo;
pub use spec::{IngestSpec, SpecState};

/// Work-unit-level failures. Any of these marks the spec FAILED; no
/// partial blocks are admitted.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IngestError {
    /// The table's schema string failed to parse or normalize.
    #[snafu(display("Schema error for {spec_id}: {source}"))]
    Schema {
        spec_id: String,
        source: SchemaError,
    },

    /// The source adapter could not list, read, or copy the input.
    #[snafu(display("Source unavailable for {spec_id}: {source}"))]
    Source {
        spec_id: String,
        source: SourceError,
    },

    /// The declared format has no cursor, or the file failed to open.
    #[snafu(display("Format error for {spec_id}: {source}"))]
    Format { spec_id: String, source: RowError },

    /// Row time extraction failed; the block identity would be wrong.
    #[snafu(display("Time error for {spec_id}: {source}"))]
    Time {
        spec_id: String,
        source: TimeError,
    },

    /// The block manager rejected the produced blocks.
    #[snafu(display("Admission rejected for {spec_id}: {source}"))]
    Admission {
        spec_id: String,
        source: AdmissionError,
    },

    /// No loader implementation matches the dispatch key.
    #[snafu(display("Unknown loader {loader:?} for {spec_id}"))]
    UnknownLoader {
        spec_id: String,
        loader: String,
        backtrace: Backtrace,
    },

    /// The work unit was cancelled at a suspension point.
    #[snafu(display("Work unit {spec_id} cancelled"))]
    Cancelled { spec_id: String },
}

impl IngestError {
    /// Stable error kind for structured logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Schema { .. } => "schema",
            IngestError::Source { .. } => "source_unavailable",
            IngestError::Format { .. } => "format",
            IngestError::Time { .. } => "time",
            IngestError::Admission { .. } => "admission_rejected",
            IngestError::UnknownLoader { .. } => "unknown_loader",
            IngestError::Cancelled { .. } => "cancelled",
        }
    }
}
