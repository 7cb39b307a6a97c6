//! Where game definitions are kept between restarts.
//!
//! The orchestrator loads everything once at startup and saves a record
//! whenever the registry asks for it. Saves run on a background task, in
//! order, so a slow disk never stalls the tick loop.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skirmish_game::DefinitionRecord;
use skirmish_protocol::{Codec, JsonCodec, ProtocolError};
use tokio::sync::Mutex;

/// Errors from a [`DefinitionStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o on {path:?} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Codec(#[from] ProtocolError),
}

/// Persistence for definition records.
///
/// Keys are lower-cased definition names; saving a record replaces any
/// earlier one with the same key.
pub trait DefinitionStore: Send + Sync + 'static {
    /// Every stored record.
    fn load_all(&self) -> impl Future<Output = Result<Vec<DefinitionRecord>, StoreError>> + Send;

    /// Inserts or replaces one record.
    fn save(&self, record: &DefinitionRecord) -> impl Future<Output = Result<(), StoreError>> + Send;
}

fn store_key(record: &DefinitionRecord) -> String {
    record.name.to_lowercase()
}

/// Rejects records the registry could never have produced.
fn check_record(record: &DefinitionRecord) -> Result<(), ProtocolError> {
    if record.name.trim().is_empty() {
        return Err(ProtocolError::InvalidRecord("definition without a name".into()));
    }
    if record.min_players == 0 {
        return Err(ProtocolError::InvalidRecord(format!(
            "{}: min_players must be at least 1",
            record.name
        )));
    }
    if record.spawn_points.contains_key(&0) {
        return Err(ProtocolError::InvalidRecord(format!(
            "{}: spawn slot 0",
            record.name
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// All definitions in one JSON document, an object keyed by lower-cased
/// name.
///
/// Every save rewrites the whole document to `<path>.tmp` and renames it
/// over the original, so a crash mid-write leaves the previous version.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    codec: JsonCodec,
    /// Current document contents. Also serializes concurrent saves.
    records: Mutex<BTreeMap<String, DefinitionRecord>>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            codec: JsonCodec,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DefinitionStore for JsonFileStore {
    /// A missing file is an empty store.
    async fn load_all(&self) -> Result<Vec<DefinitionRecord>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = ?self.path, "no definition file yet");
                return Ok(Vec::new());
            }
            Err(err) => return Err(self.io_error(err)),
        };

        let document: BTreeMap<String, DefinitionRecord> = self.codec.decode(&bytes)?;
        for record in document.values() {
            check_record(record)?;
        }
        let loaded: Vec<DefinitionRecord> = document.values().cloned().collect();
        *self.records.lock().await = document;
        tracing::info!(path = ?self.path, count = loaded.len(), "definitions read");
        Ok(loaded)
    }

    async fn save(&self, record: &DefinitionRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.insert(store_key(record), record.clone());
        let bytes = self.codec.encode(&*records)?;

        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|err| self.io_error(err))?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|err| self.io_error(err))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        tracing::debug!(game = %record.name, path = ?self.path, "definition written");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Keeps records in memory. Clones share the same contents, so a test can
/// hand one clone to the orchestrator and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<String, DefinitionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `records`.
    pub fn with_records(records: impl IntoIterator<Item = DefinitionRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (store_key(&record), record))
            .collect();
        Self {
            records: Arc::new(Mutex::new(map)),
        }
    }

    /// The stored record for `name`, ignoring case.
    pub async fn get(&self, name: &str) -> Option<DefinitionRecord> {
        self.records.lock().await.get(&name.to_lowercase()).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

impl DefinitionStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<DefinitionRecord>, StoreError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn save(&self, record: &DefinitionRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(store_key(record), record.clone());
        Ok(())
    }
}
