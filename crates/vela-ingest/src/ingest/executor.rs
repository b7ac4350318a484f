//! The ingest executor: fetch → decode → batch → publish.

use std::path::Path;
use std::sync::Arc;

use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::block::{BatchBlock, BlockManager, BlockSignature};
use crate::config::EngineSettings;
use crate::ingest::spec::IngestSpec;
use crate::ingest::{
    AdmissionSnafu, CancelledSnafu, FormatSnafu, IngestError, SchemaSnafu, SourceSnafu, TimeSnafu,
    UnknownLoaderSnafu,
};
use crate::memory::Batch;
use crate::row::{open_cursor, TimeProjectedRow};
use crate::source::{parse_location, SourceAdapter, SourceRegistry};
use crate::test_util;
use crate::time::pattern::HOUR_SECONDS;
use crate::time::resolver::time_func;

/// Fetch-and-replace loader: new blocks displace the previous generation
/// of the same spec id.
const LOADER_SWAP: &str = "Swap";

/// Fetch-and-append loader: displaced blocks age out by time instead.
const LOADER_ROLL: &str = "Roll";

/// Rows per synthesized test block.
const TEST_BLOCK_ROWS: usize = 100;

/// Consecutive cursor failures tolerated before the work unit is declared
/// corrupt.
const MAX_CURSOR_ERRORS: usize = 100;

/// Runs one work unit at a time against the shared service handles.
pub struct IngestExecutor {
    blocks: Arc<BlockManager>,
    sources: Arc<SourceRegistry>,
    settings: EngineSettings,
    cancel: CancellationToken,
}

impl IngestExecutor {
    pub fn new(
        blocks: Arc<BlockManager>,
        sources: Arc<SourceRegistry>,
        settings: EngineSettings,
    ) -> IngestExecutor {
        IngestExecutor {
            blocks,
            sources,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Token observed at the pipeline's suspension points. Cancelling it
    /// fails in-flight work units without admitting partial blocks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute one claimed work unit and drive its state machine.
    ///
    /// Returns whether the work unit completed. Failures are logged with
    /// the spec id and error kind, and schedule a retry via the spec's
    /// backoff.
    pub async fn execute(&self, spec: &mut IngestSpec, now: u64) -> bool {
        spec.begin();
        match self.run(spec, now).await {
            Ok(()) => {
                spec.complete();
                info!(spec = %spec.id(), "work unit done");
                true
            }
            Err(e) => {
                error!(spec = %spec.id(), kind = e.kind(), error = %e, "work unit failed");
                spec.fail(now, self.settings.refresh_secs);
                false
            }
        }
    }

    async fn run(&self, spec: &IngestSpec, now: u64) -> Result<(), IngestError> {
        let loader = spec.table().loader.as_str();

        if loader == self.settings.test_loader {
            return self.load_test(spec, now);
        }
        if loader == LOADER_SWAP {
            let blocks = self.load(spec).await?;
            self.blocks
                .swap(spec.table(), &spec.id(), blocks, now)
                .context(AdmissionSnafu { spec_id: spec.id() })?;
            return Ok(());
        }
        if loader == LOADER_ROLL {
            let blocks = self.load(spec).await?;
            self.blocks
                .add_all(spec.table(), blocks, now)
                .context(AdmissionSnafu { spec_id: spec.id() })?;
            return Ok(());
        }

        UnknownLoaderSnafu {
            spec_id: spec.id(),
            loader,
        }
        .fail()
    }

    fn check_cancel(&self, spec: &IngestSpec) -> Result<(), IngestError> {
        ensure!(
            !self.cancel.is_cancelled(),
            CancelledSnafu { spec_id: spec.id() }
        );
        Ok(())
    }

    /// Fetch the input to a temp file and decode it into blocks. The temp
    /// file unlinks on every exit path, including unwind.
    async fn load(&self, spec: &IngestSpec) -> Result<Vec<BatchBlock>, IngestError> {
        self.check_cancel(spec)?;

        let adapter = self
            .sources
            .adapter_for(spec.table())
            .context(SourceSnafu { spec_id: spec.id() })?;

        let tmp = match adapter.fetch(spec.path()).await {
            Ok(tmp) => tmp,
            Err(primary) => {
                let Some(tmp) = self.fetch_backup(spec).await else {
                    return Err(primary).context(SourceSnafu { spec_id: spec.id() });
                };
                tmp
            }
        };

        self.check_cancel(spec)?;
        self.decode(spec, tmp.path())
    }

    /// Try the table's backup location for the same file name.
    async fn fetch_backup(&self, spec: &IngestSpec) -> Option<tempfile::NamedTempFile> {
        let backup = spec.table().backup.as_deref()?;
        let location = parse_location(backup).ok()?;

        let adapter = match location.scheme.as_deref() {
            Some("s3") => SourceAdapter::s3(&location.domain).ok()?,
            _ => SourceAdapter::local(),
        };

        let file_name = spec.path().rsplit('/').next()?;
        let key = format!("{}/{}", location.key.trim_end_matches('/'), file_name);
        match adapter.fetch(&key).await {
            Ok(tmp) => {
                warn!(spec = %spec.id(), key = %key, "primary fetch failed, using backup");
                Some(tmp)
            }
            Err(_) => None,
        }
    }

    /// Decode a local file into sealed blocks.
    ///
    /// Per-row decode errors drop the row; a time-extraction failure fails
    /// the whole work unit because block time ranges would be wrong.
    fn decode(&self, spec: &IngestSpec, path: &Path) -> Result<Vec<BatchBlock>, IngestError> {
        let table = spec.table();
        let spec_id = spec.id();

        let source_schema = table
            .source_schema()
            .context(SchemaSnafu { spec_id: &spec_id })?;
        let effective = table
            .effective_schema()
            .context(SchemaSnafu { spec_id: &spec_id })?;
        let resolve_time = time_func(&table.time, spec.mdate())
            .context(TimeSnafu { spec_id: &spec_id })?;

        let mut cursor = open_cursor(&table.format, path, &source_schema, &table.settings)
            .context(FormatSnafu { spec_id: &spec_id })?;

        let max_rows = self.settings.max_block_rows;
        let mut blocks: Vec<BatchBlock> = Vec::new();
        let mut sequence: u64 = 0;
        let mut range = (u64::MAX, u64::MIN);
        let mut batch = Batch::new(effective.clone(), max_rows.min(1024));

        let seal = |blocks: &mut Vec<BatchBlock>,
                    batch: &mut Batch,
                    range: &mut (u64, u64),
                    sequence: &mut u64| {
            let sealed = std::mem::replace(batch, Batch::new(effective.clone(), max_rows.min(1024)));
            blocks.push(BatchBlock::new(
                BlockSignature {
                    table: table.name.clone(),
                    sequence: *sequence,
                    min_time: range.0,
                    max_time: range.1,
                    spec_id: spec_id.clone(),
                },
                sealed,
            ));
            *sequence += 1;
            *range = (u64::MAX, u64::MIN);
        };

        let mut cursor_errors = 0usize;
        loop {
            let row = match cursor.next_row() {
                Ok(None) => break,
                Ok(Some(row)) => row,
                Err(e) => {
                    // A cursor that only produces errors is a corrupt file,
                    // not a stream of droppable rows.
                    cursor_errors += 1;
                    if cursor_errors >= MAX_CURSOR_ERRORS {
                        return Err(e).context(FormatSnafu { spec_id: &spec_id });
                    }
                    warn!(spec = %spec_id, error = %e, "dropping undecodable row");
                    continue;
                }
            };
            cursor_errors = 0;

            // Block identity depends on the time range, so a row whose
            // time cannot be resolved fails the work unit.
            let time = resolve_time(row).context(TimeSnafu { spec_id: &spec_id })?;

            if batch.rows() >= max_rows {
                seal(&mut blocks, &mut batch, &mut range, &mut sequence);
                self.check_cancel(spec)?;
            }

            let projected = TimeProjectedRow::new(row, time);
            if let Err(e) = batch.add(&projected) {
                warn!(spec = %spec_id, error = %e, "dropping row");
                continue;
            }

            let unix = time.max(0) as u64;
            range.0 = range.0.min(unix);
            range.1 = range.1.max(unix);
        }

        if batch.rows() > 0 {
            seal(&mut blocks, &mut batch, &mut range, &mut sequence);
        }

        info!(
            spec = %spec_id,
            blocks = blocks.len(),
            rows = blocks.iter().map(BatchBlock::rows).sum::<usize>(),
            "decoded input"
        );
        Ok(blocks)
    }

    /// Synthesize test blocks covering the table's whole time window, one
    /// per available core, and admit them directly.
    fn load_test(&self, spec: &IngestSpec, now: u64) -> Result<(), IngestError> {
        let table = spec.table();
        let parallelism = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1) as u64;

        let start = table.time.unix_time.max(0) as u64;
        let end = start + HOUR_SECONDS as u64 * table.max_hr;
        let window = (end - start) / parallelism.max(1);

        for i in 0..parallelism {
            let begin = start + i * window;
            let batch = test_util::mock_batch(
                i,
                TEST_BLOCK_ROWS,
                begin as i64,
                (begin + window.max(1)) as i64,
            );
            let block = BatchBlock::new(
                BlockSignature {
                    table: table.name.clone(),
                    sequence: i,
                    min_time: begin,
                    max_time: begin + window,
                    spec_id: spec.id(),
                },
                batch,
            );
            self.blocks
                .add(table, block, now)
                .context(AdmissionSnafu { spec_id: spec.id() })?;
        }

        Ok(())
    }
}
