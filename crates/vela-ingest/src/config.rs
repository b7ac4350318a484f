//! Cluster configuration.
//!
//! A configuration file enumerates every [`TableSpec`] the cluster serves
//! plus engine-level settings. Loading is strict: unreadable files,
//! malformed JSON, duplicate table names, or unparseable schema strings are
//! fatal at startup, never at refresh time.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use snafu::{Backtrace, prelude::*};

use crate::meta::TableSpec;
use crate::schema::SchemaError;

/// Default cap on rows per block.
pub const DEFAULT_MAX_BLOCK_ROWS: usize = 50_000;

/// Default loader name that triggers synthetic test data.
pub const DEFAULT_TEST_LOADER: &str = "NebulaTest";

/// Default refresh interval in seconds.
pub const DEFAULT_REFRESH_SECS: u64 = 60;

/// Errors raised while loading a cluster configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("Cannot read configuration at {path}: {source}"))]
    Read {
        path: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Malformed configuration at {path}: {source}"))]
    Parse {
        path: String,
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Duplicate table name: {name}"))]
    DuplicateTable { name: String, backtrace: Backtrace },

    #[snafu(display("Bad schema for table {table}: {source}"))]
    BadSchema {
        table: String,
        source: SchemaError,
    },

    #[snafu(display("Table {table} uses time column {column} that is not in its schema"))]
    MissingTimeColumn {
        table: String,
        column: String,
        backtrace: Backtrace,
    },
}

/// Engine-level tuning knobs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    /// Max rows per block.
    #[serde(default = "default_max_block_rows")]
    pub max_block_rows: usize,

    /// Loader name dispatched to the synthetic test loader.
    #[serde(default = "default_test_loader")]
    pub test_loader: String,

    /// Spec repository refresh interval; bounds the retry backoff.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

fn default_max_block_rows() -> usize {
    DEFAULT_MAX_BLOCK_ROWS
}

fn default_test_loader() -> String {
    DEFAULT_TEST_LOADER.to_string()
}

fn default_refresh_secs() -> u64 {
    DEFAULT_REFRESH_SECS
}

impl Default for EngineSettings {
    fn default() -> EngineSettings {
        EngineSettings {
            max_block_rows: DEFAULT_MAX_BLOCK_ROWS,
            test_loader: DEFAULT_TEST_LOADER.to_string(),
            refresh_secs: DEFAULT_REFRESH_SECS,
        }
    }
}

/// The loaded cluster configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Configuration version, carried into work units for lineage.
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub settings: EngineSettings,

    pub tables: Vec<TableSpec>,
}

impl ClusterConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<ClusterConfig, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).context(ReadSnafu {
            path: path.display().to_string(),
        })?;
        let config: ClusterConfig = serde_json::from_str(&text).context(ParseSnafu {
            path: path.display().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate from a JSON string.
    pub fn from_json(text: &str) -> Result<ClusterConfig, ConfigError> {
        let config: ClusterConfig = serde_json::from_str(text).context(ParseSnafu {
            path: "<inline>".to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants a loaded configuration must satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            ensure!(
                seen.insert(table.name.clone()),
                DuplicateTableSnafu { name: &table.name }
            );

            let schema = table.source_schema().context(BadSchemaSnafu {
                table: &table.name,
            })?;

            if table.time.kind == crate::meta::TimeType::Column {
                ensure!(
                    schema.column(&table.time.column).is_some(),
                    MissingTimeColumnSnafu {
                        table: &table.name,
                        column: &table.time.column,
                    }
                );
            }
        }
        Ok(())
    }

    /// Shared handles to the table specs, sorted by name for deterministic
    /// iteration.
    pub fn tables(&self) -> Vec<Arc<TableSpec>> {
        let mut tables: Vec<Arc<TableSpec>> =
            self.tables.iter().cloned().map(Arc::new).collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables
    }
}
