//! The ingest work unit.

use std::fmt;
use std::sync::Arc;

use crate::meta::TableSpec;

/// Base of the exponential retry backoff, in seconds.
const RETRY_BASE_SECS: u64 = 2;

/// Lifecycle of a work unit.
///
/// `New → InProgress → {Done, Failed}`. `Done` is terminal; `Failed`
/// becomes eligible again after a backoff, at which point the repository
/// resets it to `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecState {
    New,
    InProgress,
    Done,
    Failed,
}

/// One unit of ingest work: a concrete source location owned by a table.
///
/// Identity is the wire form `"{table}@{path}@{size}"`; repeated refreshes
/// with unchanged inputs produce the same ids.
pub struct IngestSpec {
    table: Arc<TableSpec>,
    version: String,
    path: String,
    domain: String,
    size: u64,
    state: SpecState,
    mdate: Option<i64>,
    attempts: u32,
    retry_at: u64,
}

impl IngestSpec {
    pub fn new(
        table: Arc<TableSpec>,
        version: impl Into<String>,
        path: impl Into<String>,
        domain: impl Into<String>,
        size: u64,
        mdate: Option<i64>,
    ) -> IngestSpec {
        IngestSpec {
            table,
            version: version.into(),
            path: path.into(),
            domain: domain.into(),
            size,
            state: SpecState::New,
            mdate,
            attempts: 0,
            retry_at: 0,
        }
    }

    /// Wire-form identity: `"{table}@{path}@{size}"`.
    pub fn id(&self) -> String {
        format!("{}@{}@{}", self.table.name, self.path, self.size)
    }

    pub fn table(&self) -> &Arc<TableSpec> {
        &self.table
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn state(&self) -> SpecState {
        self.state
    }

    /// Macro-resolved date computed at work-unit creation.
    pub fn mdate(&self) -> Option<i64> {
        self.mdate
    }

    /// Claim the work unit for execution.
    pub fn begin(&mut self) {
        debug_assert_eq!(self.state, SpecState::New, "claiming a non-NEW spec");
        self.state = SpecState::InProgress;
    }

    /// Mark the work unit done; blocks are admitted.
    pub fn complete(&mut self) {
        debug_assert_eq!(self.state, SpecState::InProgress);
        self.state = SpecState::Done;
    }

    /// Mark the work unit failed and schedule the next retry with
    /// exponential backoff bounded by `max_backoff_secs`.
    pub fn fail(&mut self, now: u64, max_backoff_secs: u64) {
        debug_assert_eq!(self.state, SpecState::InProgress);
        self.state = SpecState::Failed;
        let backoff = RETRY_BASE_SECS
            .checked_shl(self.attempts)
            .unwrap_or(u64::MAX)
            .min(max_backoff_secs.max(RETRY_BASE_SECS));
        self.attempts = self.attempts.saturating_add(1);
        self.retry_at = now.saturating_add(backoff);
    }

    /// Whether a failed work unit may be retried at `now`.
    pub fn retry_eligible(&self, now: u64) -> bool {
        self.state == SpecState::Failed && now >= self.retry_at
    }

    /// Reset an eligible failed work unit back to NEW. No-op otherwise.
    pub fn retry(&mut self, now: u64) {
        if self.retry_eligible(now) {
            self.state = SpecState::New;
        }
    }
}

impl fmt::Display for IngestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:?}] v{} domain={}",
            self.id(),
            self.state,
            self.version,
            self.domain
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{DataSource, TimeSpec};

    fn table() -> Arc<TableSpec> {
        Arc::new(TableSpec {
            name: "test".to_string(),
            max_mb: 1000,
            max_hr: 10,
            schema: "ROW<id:int>".to_string(),
            source: DataSource::S3,
            loader: "Swap".to_string(),
            location: "s3://test".to_string(),
            backup: Some("s3://bak".to_string()),
            format: "csv".to_string(),
            serde: Default::default(),
            columns: Default::default(),
            time: TimeSpec::default(),
            access: Vec::new(),
            bucket: Default::default(),
            settings: Default::default(),
        })
    }

    #[test]
    fn id_wire_form() {
        let spec = IngestSpec::new(table(), "1.0", "vela/v1.x", "vela", 10, None);
        assert_eq!(spec.id(), "test@vela/v1.x@10");
        assert_eq!(spec.size(), 10);
        assert_eq!(spec.path(), "vela/v1.x");
        assert_eq!(spec.domain(), "vela");
        assert_eq!(spec.table().name, "test");
        assert_eq!(spec.version(), "1.0");
        assert_eq!(spec.state(), SpecState::New);
    }

    #[test]
    fn lifecycle_transitions() {
        let mut spec = IngestSpec::new(table(), "1.0", "p", "d", 1, None);
        spec.begin();
        assert_eq!(spec.state(), SpecState::InProgress);
        spec.complete();
        assert_eq!(spec.state(), SpecState::Done);
    }

    #[test]
    fn failure_backoff_grows_and_is_bounded() {
        let mut spec = IngestSpec::new(table(), "1.0", "p", "d", 1, None);
        let refresh = 60;

        spec.begin();
        spec.fail(1_000, refresh);
        assert_eq!(spec.state(), SpecState::Failed);
        assert!(!spec.retry_eligible(1_001));
        assert!(spec.retry_eligible(1_002)); // base backoff of 2s

        spec.retry(1_002);
        assert_eq!(spec.state(), SpecState::New);

        // Each failure doubles the backoff, capped at the refresh interval.
        spec.begin();
        spec.fail(1_002, refresh);
        assert!(!spec.retry_eligible(1_005));
        assert!(spec.retry_eligible(1_006)); // 4s now

        for _ in 0..10 {
            spec.retry(u64::MAX - refresh);
            spec.begin();
            spec.fail(10_000, refresh);
        }
        // Bounded at the refresh interval.
        assert!(spec.retry_eligible(10_000 + refresh));
        assert!(!spec.retry_eligible(10_000 + refresh - 1));
    }

    #[test]
    fn retry_is_a_noop_when_not_eligible() {
        let mut spec = IngestSpec::new(table(), "1.0", "p", "d", 1, None);
        spec.retry(u64::MAX);
        assert_eq!(spec.state(), SpecState::New);

        spec.begin();
        spec.fail(1_000, 60);
        spec.retry(1_000);
        assert_eq!(spec.state(), SpecState::Failed);
    }
}
