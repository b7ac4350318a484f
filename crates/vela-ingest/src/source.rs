//! Source adapters: listing and fetching ingest inputs.
//!
//! A [`SourceAdapter`] wraps an [`object_store::ObjectStore`] client and
//! exposes the minimal capability set the ingestion core needs: delimited
//! prefix listing, fetch-to-temp-file, whole-object read, and upload.
//! Listing is paginated under the hood by the client with no practical key
//! limit; the delimiter distinguishes common prefixes (directories) from
//! objects, so callers can tell partitions apart from files.
//!
//! Backends: local filesystem for `Local`, S3 for `S3`, and an in-memory
//! store for tests. Stream sources (`Kafka`) have no adapter yet and are
//! reported as unsupported. Mutating operations serialize through an
//! internal mutex; the wrapped client itself is thread-safe.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutPayload};
use snafu::{Backtrace, prelude::*};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::meta::{DataSource, TableSpec};

/// One listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Object key (no scheme, no domain).
    pub path: String,

    /// Object size in bytes; 0 for directories.
    pub size: u64,

    /// Whether the entry is a common prefix rather than an object.
    pub is_dir: bool,
}

/// Errors raised by source adapters.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SourceError {
    /// The underlying object store failed.
    #[snafu(display("Object store error at {path}: {source}"))]
    Store {
        path: String,
        source: object_store::Error,
        backtrace: Backtrace,
    },

    /// Building the object store client failed.
    #[snafu(display("Object store client init failed for {uri}: {source}"))]
    ClientInit {
        uri: String,
        source: object_store::Error,
        backtrace: Backtrace,
    },

    /// Temp-file I/O during fetch failed.
    #[snafu(display("Temp file I/O failed: {source}"))]
    TempFile {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// The location URI is not understood.
    #[snafu(display("Invalid source location: {uri}"))]
    BadUri { uri: String, backtrace: Backtrace },

    /// Stream sources are recognized but not implemented.
    #[snafu(display("Stream source {kind:?} has no adapter yet"))]
    StreamUnsupported { kind: DataSource },

    /// The source kind has no listable backend.
    #[snafu(display("Source {kind:?} cannot be listed"))]
    UnsupportedSource { kind: DataSource },
}

/// A parsed source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// URI scheme, if any.
    pub scheme: Option<String>,

    /// Bucket or host component; empty for local paths.
    pub domain: String,

    /// Key or path component.
    pub key: String,
}

/// Split a location URI into scheme, domain, and key.
///
/// `s3://bucket/a/b/` parses to (`s3`, `bucket`, `a/b/`);
/// `file:///data/x` and plain `/data/x` both parse to a local path.
pub fn parse_location(uri: &str) -> Result<Location, SourceError> {
    match uri.split_once("://") {
        None => {
            ensure!(!uri.is_empty(), BadUriSnafu { uri });
            Ok(Location {
                scheme: None,
                domain: String::new(),
                key: uri.to_string(),
            })
        }
        Some((scheme, rest)) => {
            if scheme == "file" {
                ensure!(rest.starts_with('/'), BadUriSnafu { uri });
                return Ok(Location {
                    scheme: Some(scheme.to_string()),
                    domain: String::new(),
                    key: rest.to_string(),
                });
            }

            let (domain, key) = rest.split_once('/').unwrap_or((rest, ""));
            ensure!(!domain.is_empty(), BadUriSnafu { uri });
            Ok(Location {
                scheme: Some(scheme.to_string()),
                domain: domain.to_string(),
                key: key.to_string(),
            })
        }
    }
}

/// Adapter over one object-store namespace.
pub struct SourceAdapter {
    store: Arc<dyn ObjectStore>,
    domain: String,
    // Serializes mutating operations (fetch-to-disk, upload).
    write_lock: Mutex<()>,
}

impl SourceAdapter {
    fn wrap(store: Arc<dyn ObjectStore>, domain: impl Into<String>) -> SourceAdapter {
        SourceAdapter {
            store,
            domain: domain.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Local filesystem namespace.
    pub fn local() -> SourceAdapter {
        SourceAdapter::wrap(Arc::new(LocalFileSystem::new()), "")
    }

    /// Volatile in-memory namespace, used by tests and the placeholder
    /// stream path.
    pub fn memory(domain: impl Into<String>) -> SourceAdapter {
        SourceAdapter::wrap(Arc::new(InMemory::new()), domain)
    }

    /// S3 namespace for one bucket; credentials come from the environment.
    pub fn s3(bucket: &str) -> Result<SourceAdapter, SourceError> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .context(ClientInitSnafu {
                uri: format!("s3://{bucket}"),
            })?;
        Ok(SourceAdapter::wrap(Arc::new(store), bucket))
    }

    /// Build the adapter a table's source requires.
    pub fn for_table(spec: &TableSpec) -> Result<SourceAdapter, SourceError> {
        match spec.source {
            DataSource::Local => Ok(SourceAdapter::local()),
            DataSource::S3 => {
                let location = parse_location(&spec.location)?;
                SourceAdapter::s3(&location.domain)
            }
            DataSource::Kafka => StreamUnsupportedSnafu { kind: spec.source }.fail(),
            DataSource::Custom | DataSource::GSheet => {
                UnsupportedSourceSnafu { kind: spec.source }.fail()
            }
        }
    }

    /// Bucket or host this adapter is bound to.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// List the immediate children of `prefix`, directories first is not
    /// guaranteed; entries are sorted by path for deterministic output.
    pub async fn list(&self, prefix: &str) -> Result<Vec<FileInfo>, SourceError> {
        let path = StorePath::from(prefix);
        let result = self
            .store
            .list_with_delimiter(Some(&path))
            .await
            .context(StoreSnafu { path: prefix })?;

        let mut entries: Vec<FileInfo> = result
            .common_prefixes
            .iter()
            .map(|p| FileInfo {
                path: p.to_string(),
                size: 0,
                is_dir: true,
            })
            .chain(result.objects.iter().map(|o| FileInfo {
                path: o.location.to_string(),
                size: o.size as u64,
                is_dir: false,
            }))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Copy a remote object into a local temp file.
    ///
    /// The returned [`NamedTempFile`] unlinks itself when dropped, on every
    /// exit path.
    pub async fn fetch(&self, key: &str) -> Result<NamedTempFile, SourceError> {
        let bytes = self.read(key).await?;

        let _guard = self.write_lock.lock().await;
        let tmp = NamedTempFile::new().context(TempFileSnafu)?;
        std::fs::write(tmp.path(), &bytes).context(TempFileSnafu)?;
        Ok(tmp)
    }

    /// Read a whole object.
    pub async fn read(&self, key: &str) -> Result<Bytes, SourceError> {
        let path = StorePath::from(key);
        let result = self
            .store
            .get(&path)
            .await
            .context(StoreSnafu { path: key })?;
        result.bytes().await.context(StoreSnafu { path: key })
    }

    /// Upload a whole object.
    pub async fn upload(&self, key: &str, bytes: Bytes) -> Result<(), SourceError> {
        let _guard = self.write_lock.lock().await;
        let path = StorePath::from(key);
        self.store
            .put(&path, PutPayload::from(bytes))
            .await
            .context(StoreSnafu { path: key })?;
        Ok(())
    }
}

/// Explicit adapter handles for the repository and the executor.
///
/// Tables normally get a fresh adapter derived from their source; tests
/// and embedding services can register a shared adapter per table name
/// (for example an in-memory store seeded with fixtures).
#[derive(Default)]
pub struct SourceRegistry {
    overrides: HashMap<String, Arc<SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> SourceRegistry {
        SourceRegistry::default()
    }

    /// Pin the adapter used for `table`.
    pub fn register(&mut self, table: impl Into<String>, adapter: Arc<SourceAdapter>) {
        self.overrides.insert(table.into(), adapter);
    }

    /// Adapter for a table: the registered override, or one derived from
    /// the table's source.
    pub fn adapter_for(&self, spec: &TableSpec) -> Result<Arc<SourceAdapter>, SourceError> {
        if let Some(adapter) = self.overrides.get(&spec.name) {
            return Ok(Arc::clone(adapter));
        }
        SourceAdapter::for_table(spec).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_s3_location() {
        let loc = parse_location("s3://bucket/events/dt=DATE/").unwrap();
        assert_eq!(loc.scheme.as_deref(), Some("s3"));
        assert_eq!(loc.domain, "bucket");
        assert_eq!(loc.key, "events/dt=DATE/");
    }

    #[test]
    fn parse_local_locations() {
        let explicit = parse_location("file:///data/x/").unwrap();
        assert_eq!(explicit.scheme.as_deref(), Some("file"));
        assert_eq!(explicit.domain, "");
        assert_eq!(explicit.key, "/data/x/");

        let bare = parse_location("/data/x/").unwrap();
        assert_eq!(bare.scheme, None);
        assert_eq!(bare.key, "/data/x/");
    }

    #[test]
    fn parse_rejects_empty_or_hostless() {
        assert!(matches!(
            parse_location(""),
            Err(SourceError::BadUri { .. })
        ));
        assert!(matches!(
            parse_location("s3://"),
            Err(SourceError::BadUri { .. })
        ));
    }

    #[tokio::test]
    async fn memory_adapter_round_trip() {
        let adapter = SourceAdapter::memory("test");

        adapter
            .upload("events/part-0.csv", Bytes::from_static(b"1\tx\n"))
            .await
            .unwrap();
        adapter
            .upload("events/part-1.csv", Bytes::from_static(b"2\ty\n"))
            .await
            .unwrap();
        adapter
            .upload("events/nested/part-2.csv", Bytes::from_static(b"3\tz\n"))
            .await
            .unwrap();

        let listed = adapter.list("events").await.unwrap();
        // One directory entry plus two objects, sorted by path.
        assert_eq!(listed.len(), 3);
        assert!(listed[0].is_dir);
        assert_eq!(listed[0].path, "events/nested");
        assert_eq!(listed[1].path, "events/part-0.csv");
        assert_eq!(listed[1].size, 4);
        assert!(!listed[1].is_dir);

        let bytes = adapter.read("events/part-0.csv").await.unwrap();
        assert_eq!(&bytes[..], b"1\tx\n");
    }

    #[tokio::test]
    async fn fetch_copies_to_a_temp_file() {
        let adapter = SourceAdapter::memory("test");
        adapter
            .upload("k", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        let tmp = adapter.fetch("k").await.unwrap();
        let content = std::fs::read(tmp.path()).unwrap();
        assert_eq!(content, b"payload");

        let path = tmp.path().to_path_buf();
        drop(tmp);
        assert!(!path.exists(), "temp file must unlink on drop");
    }

    #[tokio::test]
    async fn missing_object_is_a_store_error() {
        let adapter = SourceAdapter::memory("test");
        assert!(matches!(
            adapter.read("absent").await,
            Err(SourceError::Store { .. })
        ));
    }

    #[test]
    fn stream_sources_are_unsupported() {
        let spec = TableSpec {
            name: "k".to_string(),
            max_mb: 1,
            max_hr: 1,
            schema: "ROW<id:int>".to_string(),
            source: DataSource::Kafka,
            loader: "Roll".to_string(),
            location: "kafka://broker/topic".to_string(),
            backup: None,
            format: "csv".to_string(),
            serde: Default::default(),
            columns: Default::default(),
            time: Default::default(),
            access: Vec::new(),
            bucket: Default::default(),
            settings: Default::default(),
        };
        assert!(matches!(
            SourceAdapter::for_table(&spec),
            Err(SourceError::StreamUnsupported { .. })
        ));
    }
}
