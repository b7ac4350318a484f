//! Table specifications as loaded from the cluster configuration.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::meta::time_spec::{TimeSpec, TimeType};
use crate::schema::{Schema, SchemaError, TypeKind, TypeNode, TIME_COLUMN};

/// Where a table's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Built-in test source handled by the synthetic loader.
    Custom,
    S3,
    Local,
    Kafka,
    GSheet,
}

impl DataSource {
    /// File-system-like sources are enumerated by listing expanded prefixes.
    pub fn is_file_system(self) -> bool {
        matches!(self, DataSource::S3 | DataSource::Local)
    }
}

/// Serde description for stream sources (protocol framing, batching, and
/// the column-name to field-id map a binary protocol needs).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSerde {
    /// Topic retention in seconds.
    #[serde(default)]
    pub retention: u64,

    /// Rows per ingestion batch.
    #[serde(default)]
    pub batch_size: u64,

    /// Framing protocol name (e.g. "binary", "json").
    #[serde(default)]
    pub protocol: String,

    /// Column name to field id, as defined by the upstream schema.
    #[serde(default)]
    pub cmap: HashMap<String, u32>,
}

/// Per-column storage hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnProp {
    #[serde(default)]
    pub bloom_filter: bool,

    #[serde(default)]
    pub dictionary: bool,

    /// Value substituted for missing cells.
    #[serde(default)]
    pub default_value: Option<String>,
}

/// One access-control rule attached to a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub action: String,

    #[serde(default)]
    pub groups: Vec<String>,
}

/// Bucketed layout info for sources that shard by a column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    #[serde(default)]
    pub count: u64,

    #[serde(default)]
    pub column: String,
}

/// Free-form key-value settings.
pub type Settings = HashMap<String, String>;

/// Declarative description of a logical table. Immutable once loaded.
///
/// Two specs are equal iff their names match; names are unique within a
/// configuration load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Unique table name.
    pub name: String,

    /// Max resident size in MB.
    pub max_mb: u64,

    /// Max resident time span in hours.
    pub max_hr: u64,

    /// Serialized schema of the source data.
    pub schema: String,

    /// Data source to load from.
    pub source: DataSource,

    /// Loader dispatch key ("Swap", "Roll", or the synthetic test loader).
    pub loader: String,

    /// Primary source location URI.
    pub location: String,

    /// Optional backup location tried when the primary fetch fails.
    #[serde(default)]
    pub backup: Option<String>,

    /// Data format ("csv", "parquet").
    pub format: String,

    /// Stream serde info, meaningful for stream sources only.
    #[serde(default)]
    pub serde: StreamSerde,

    /// Per-column properties keyed by column name.
    #[serde(default)]
    pub columns: HashMap<String, ColumnProp>,

    /// How rows obtain their `_time_` value.
    #[serde(default)]
    pub time: TimeSpec,

    /// Access-control rules.
    #[serde(default)]
    pub access: Vec<AccessRule>,

    /// Bucketed layout info.
    #[serde(default)]
    pub bucket: BucketInfo,

    /// Free-form settings.
    #[serde(default)]
    pub settings: Settings,
}

impl TableSpec {
    /// Parse the source schema string.
    pub fn source_schema(&self) -> Result<Schema, SchemaError> {
        Schema::parse(&self.schema)
    }

    /// The effective schema of blocks built for this table: the source
    /// schema normalized for time.
    ///
    /// `Static`/`Current`/`Macro`/`Provided` append the reserved `_time_`
    /// column; `Column` additionally removes the source time column so the
    /// value is not stored twice.
    pub fn effective_schema(&self) -> Result<Schema, SchemaError> {
        let mut schema = self.source_schema()?;
        if self.time.kind == TimeType::Column {
            schema.remove_column(&self.time.column)?;
        }
        schema.add_column(TypeNode::scalar(TIME_COLUMN, TypeKind::Long))?;
        Ok(schema)
    }

    /// Lookup helper for free-form settings.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Short human-readable summary used in logs.
    pub fn summary(&self) -> String {
        format!(
            "{}@{}-{}: {}",
            self.name, self.location, self.format, self.time.unix_time
        )
    }
}

impl PartialEq for TableSpec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TableSpec {}

impl Hash for TableSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableSpec {
        TableSpec {
            name: "events".to_string(),
            max_mb: 1000,
            max_hr: 10,
            schema: "ROW<id:int, date:string, value:double>".to_string(),
            source: DataSource::S3,
            loader: "Swap".to_string(),
            location: "s3://bucket/events/".to_string(),
            backup: None,
            format: "csv".to_string(),
            serde: StreamSerde::default(),
            columns: HashMap::new(),
            time: TimeSpec {
                kind: TimeType::Column,
                unix_time: 0,
                column: "date".to_string(),
                pattern: "%Y-%m-%d %H:%M:%S".to_string(),
            },
            access: Vec::new(),
            bucket: BucketInfo::default(),
            settings: Settings::new(),
        }
    }

    #[test]
    fn equality_and_hash_are_by_name() {
        let a = sample();
        let mut b = sample();
        b.location = "s3://elsewhere/".to_string();
        b.max_mb = 1;
        assert_eq!(a, b);

        let mut c = sample();
        c.name = "other".to_string();
        assert_ne!(a, c);
    }

    #[test]
    fn effective_schema_replaces_column_time() {
        let spec = sample();
        let schema = spec.effective_schema().unwrap();

        assert!(schema.column("date").is_none());
        let (_, time) = schema.column(TIME_COLUMN).expect("time column");
        assert_eq!(time.kind(), TypeKind::Long);
        assert_eq!(schema.len(), 3); // id, value, _time_
    }

    #[test]
    fn effective_schema_appends_time_for_static() {
        let mut spec = sample();
        spec.time = TimeSpec {
            kind: TimeType::Static,
            unix_time: 1_700_000_000,
            column: String::new(),
            pattern: String::new(),
        };

        let schema = spec.effective_schema().unwrap();
        assert!(schema.column("date").is_some());
        assert!(schema.column(TIME_COLUMN).is_some());
        assert_eq!(schema.len(), 4);
    }

    #[test]
    fn effective_schema_fails_for_missing_time_column() {
        let mut spec = sample();
        spec.time.column = "nope".to_string();
        assert!(matches!(
            spec.effective_schema(),
            Err(SchemaError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn deserialize_minimal_entry() {
        let json = r#"{
            "name": "t",
            "max_mb": 10,
            "max_hr": 1,
            "schema": "ROW<id:int>",
            "source": "local",
            "loader": "Roll",
            "location": "file:///tmp/t/",
            "format": "csv"
        }"#;
        let spec: TableSpec = serde_json::from_str(json).expect("deserialize");
        assert_eq!(spec.source, DataSource::Local);
        assert_eq!(spec.time, TimeSpec::default());
        assert!(spec.backup.is_none());
        assert!(spec.settings.is_empty());
    }
}
