//! The spec repository: deterministic enumeration of ingest work units.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ClusterConfig;
use crate::ingest::spec::{IngestSpec, SpecState};
use crate::meta::{DataSource, TableSpec};
use crate::source::{parse_location, SourceRegistry};
use crate::time::expand;
use crate::time::pattern::HOUR_SECONDS;

/// Path recorded for synthesized test-table work units.
const TEST_SPEC_PATH: &str = "test";

/// Holds the canonical set of work units the cluster must ingest.
///
/// The repository is the single writer of spec states; executors receive
/// mutable access to one spec at a time through [`SpecRepo::spec_mut`].
/// Repeated [`refresh`](SpecRepo::refresh) calls with identical inputs
/// (table specs, clock, listing results) produce identical spec-id sets.
#[derive(Default)]
pub struct SpecRepo {
    specs: BTreeMap<String, IngestSpec>,
}

impl SpecRepo {
    pub fn new() -> SpecRepo {
        SpecRepo::default()
    }

    /// All known work units, keyed by id.
    pub fn specs(&self) -> &BTreeMap<String, IngestSpec> {
        &self.specs
    }

    /// Ids of work units ready for execution, in id order.
    pub fn ready_ids(&self) -> Vec<String> {
        self.specs
            .iter()
            .filter(|(_, s)| s.state() == SpecState::New)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Mutable access to one work unit, for the executing worker.
    pub fn spec_mut(&mut self, id: &str) -> Option<&mut IngestSpec> {
        self.specs.get_mut(id)
    }

    /// Hand a ready work unit to a worker. Only NEW specs can be claimed;
    /// the worker returns it through [`SpecRepo::finish`].
    pub fn claim(&mut self, id: &str) -> Option<IngestSpec> {
        match self.specs.get(id) {
            Some(spec) if spec.state() == SpecState::New => self.specs.remove(id),
            _ => None,
        }
    }

    /// Return a claimed work unit after execution.
    pub fn finish(&mut self, spec: IngestSpec) {
        self.specs.insert(spec.id(), spec);
    }

    /// Recompute the canonical spec set for the given configuration.
    ///
    /// - The built-in test source synthesizes one deterministic spec per
    ///   table.
    /// - File-system sources expand their location over the retention
    ///   window `[now - max_hr * 3600, now)` and emit one spec per listed
    ///   file.
    /// - Stream sources are placeholders and contribute nothing.
    ///
    /// Merging keeps the state of surviving ids (resetting failed ones
    /// whose backoff elapsed), starts new ids at NEW, and drops ids no
    /// longer present.
    pub async fn refresh(&mut self, config: &ClusterConfig, sources: &SourceRegistry, now: u64) {
        let mut candidates: Vec<IngestSpec> = Vec::new();

        for table in config.tables() {
            match table.source {
                DataSource::Custom => {
                    candidates.push(IngestSpec::new(
                        Arc::clone(&table),
                        config.version.clone(),
                        TEST_SPEC_PATH,
                        "",
                        0,
                        Some(table.time.unix_time),
                    ));
                }
                source if source.is_file_system() => {
                    self.scan_table(config, sources, &table, now, &mut candidates)
                        .await;
                }
                source => {
                    // Stream / spreadsheet ingestion is future work.
                    warn!(table = %table.name, ?source, "source has no spec generation yet");
                }
            }
        }

        let mut next = BTreeMap::new();
        let mut fresh = 0usize;
        for candidate in candidates {
            let id = candidate.id();
            match self.specs.remove(&id) {
                Some(mut existing) => {
                    existing.retry(now);
                    next.insert(id, existing);
                }
                None => {
                    fresh += 1;
                    next.insert(id, candidate);
                }
            }
        }

        let dropped = self.specs.len();
        if dropped > 0 {
            debug!(dropped, "work units no longer present; evicting");
        }
        self.specs = next;
        debug!(
            total = self.specs.len(),
            fresh, dropped, "spec repository refreshed"
        );
    }

    async fn scan_table(
        &self,
        config: &ClusterConfig,
        sources: &SourceRegistry,
        table: &Arc<TableSpec>,
        now: u64,
        candidates: &mut Vec<IngestSpec>,
    ) {
        let location = match parse_location(&table.location) {
            Ok(l) => l,
            Err(e) => {
                warn!(table = %table.name, error = %e, "bad table location; skipping");
                return;
            }
        };

        let adapter = match sources.adapter_for(table) {
            Ok(a) => a,
            Err(e) => {
                warn!(table = %table.name, error = %e, "no source adapter; skipping");
                return;
            }
        };

        let window_end = now as i64;
        let window_start = window_end - (table.max_hr * HOUR_SECONDS as u64) as i64;

        for prefix in expand(&location.key, window_start, window_end) {
            let files = match adapter.list(&prefix.prefix).await {
                Ok(files) => files,
                Err(e) => {
                    // Degrade to an empty listing; the next refresh retries.
                    warn!(
                        table = %table.name,
                        prefix = %prefix.prefix,
                        error = %e,
                        "listing failed"
                    );
                    continue;
                }
            };

            for file in files.into_iter().filter(|f| !f.is_dir) {
                candidates.push(IngestSpec::new(
                    Arc::clone(table),
                    config.version.clone(),
                    file.path,
                    location.domain.clone(),
                    file.size,
                    prefix.mdate,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceAdapter;
    use bytes::Bytes;

    const CONFIG: &str = r#"{
        "version": "1.0",
        "tables": [
            {
                "name": "events",
                "max_mb": 1000,
                "max_hr": 2,
                "schema": "ROW<id:int, name:string>",
                "source": "s3",
                "loader": "Swap",
                "location": "s3://bucket/events/dt=DATE/hr=HOUR/",
                "format": "csv"
            },
            {
                "name": "vela.test",
                "max_mb": 10,
                "max_hr": 2,
                "schema": "ROW<id:int, event:string, items:list<string>, flag:bool>",
                "source": "custom",
                "loader": "NebulaTest",
                "location": "",
                "format": "csv",
                "time": { "type": "static", "unix_time": 1600000000 }
            }
        ]
    }"#;

    // 2020-09-13 12:26:40 UTC
    const NOW: u64 = 1_600_000_000;

    async fn seeded_registry() -> SourceRegistry {
        let adapter = Arc::new(SourceAdapter::memory("bucket"));
        // NOW is 12:26:40; the aligned two-hour window covers hours 10..13.
        adapter
            .upload(
                "events/dt=2020-09-13/hr=11/part-0.csv",
                Bytes::from_static(b"1\ta\n"),
            )
            .await
            .unwrap();
        adapter
            .upload(
                "events/dt=2020-09-13/hr=12/part-1.csv",
                Bytes::from_static(b"2\tbb\n"),
            )
            .await
            .unwrap();
        // Outside the window: must not be listed.
        adapter
            .upload(
                "events/dt=2020-09-13/hr=03/part-9.csv",
                Bytes::from_static(b"9\tz\n"),
            )
            .await
            .unwrap();

        let mut registry = SourceRegistry::new();
        registry.register("events", adapter);
        registry
    }

    #[tokio::test]
    async fn refresh_emits_one_spec_per_listed_file() {
        let config = ClusterConfig::from_json(CONFIG).unwrap();
        let sources = seeded_registry().await;
        let mut repo = SpecRepo::new();

        repo.refresh(&config, &sources, NOW).await;

        let ids: Vec<&String> = repo.specs().keys().collect();
        assert_eq!(
            ids,
            vec![
                "events@events/dt=2020-09-13/hr=11/part-0.csv@4",
                "events@events/dt=2020-09-13/hr=12/part-1.csv@5",
                "vela.test@test@0",
            ]
        );
        assert!(repo
            .specs()
            .values()
            .all(|s| s.state() == SpecState::New));

        // Macro-resolved dates align to each file's hour.
        let first = &repo.specs()["events@events/dt=2020-09-13/hr=11/part-0.csv@4"];
        assert_eq!(first.mdate(), Some(1_599_994_800)); // 2020-09-13T11:00:00Z
        assert_eq!(first.domain(), "bucket");
        assert_eq!(first.version(), "1.0");
    }

    #[tokio::test]
    async fn refresh_is_deterministic() {
        let config = ClusterConfig::from_json(CONFIG).unwrap();
        let sources = seeded_registry().await;

        let mut a = SpecRepo::new();
        a.refresh(&config, &sources, NOW).await;
        let ids_a: Vec<String> = a.specs().keys().cloned().collect();

        let mut b = SpecRepo::new();
        b.refresh(&config, &sources, NOW).await;
        let ids_b: Vec<String> = b.specs().keys().cloned().collect();
        assert_eq!(ids_a, ids_b);

        // Refreshing the same repo again keeps the same set.
        a.refresh(&config, &sources, NOW).await;
        let ids_again: Vec<String> = a.specs().keys().cloned().collect();
        assert_eq!(ids_a, ids_again);
    }

    #[tokio::test]
    async fn refresh_preserves_done_and_drops_vanished() {
        let config = ClusterConfig::from_json(CONFIG).unwrap();
        let sources = seeded_registry().await;
        let mut repo = SpecRepo::new();
        repo.refresh(&config, &sources, NOW).await;

        // Execute one spec to DONE.
        let id = "events@events/dt=2020-09-13/hr=11/part-0.csv@4".to_string();
        {
            let spec = repo.spec_mut(&id).unwrap();
            spec.begin();
            spec.complete();
        }

        repo.refresh(&config, &sources, NOW).await;
        assert_eq!(repo.specs()[&id].state(), SpecState::Done);

        // Two hours later the hr=11 file leaves the window: its spec is
        // dropped, the new hour emits nothing (no files there).
        repo.refresh(&config, &sources, NOW + 2 * HOUR_SECONDS as u64)
            .await;
        assert!(!repo.specs().contains_key(&id));
    }

    #[tokio::test]
    async fn failed_specs_retry_after_backoff() {
        let config = ClusterConfig::from_json(CONFIG).unwrap();
        let sources = seeded_registry().await;
        let mut repo = SpecRepo::new();
        repo.refresh(&config, &sources, NOW).await;

        let id = "vela.test@test@0".to_string();
        {
            let spec = repo.spec_mut(&id).unwrap();
            spec.begin();
            spec.fail(NOW, config.settings.refresh_secs);
        }

        // Too early: still failed.
        repo.refresh(&config, &sources, NOW + 1).await;
        assert_eq!(repo.specs()[&id].state(), SpecState::Failed);

        // After the backoff the repository resets it to NEW.
        repo.refresh(&config, &sources, NOW + 10).await;
        assert_eq!(repo.specs()[&id].state(), SpecState::New);
    }

    #[tokio::test]
    async fn listing_failures_degrade_to_empty() {
        // No override and an s3 location: building the adapter may succeed
        // or fail depending on the environment, but either way refresh must
        // not error and must emit only the synthetic table's spec.
        let config = ClusterConfig::from_json(CONFIG).unwrap();
        let sources = SourceRegistry::new();
        let mut repo = SpecRepo::new();

        repo.refresh(&config, &sources, NOW).await;
        assert!(repo.specs().contains_key("vela.test@test@0"));
        assert!(repo.specs().keys().all(|id| !id.starts_with("events@")));
    }
}
