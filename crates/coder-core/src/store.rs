//! JSON file learning store
//!
//! Appends `(shard, predicate, args, extra)` records to a single JSON array
//! file. Writes go through a sibling temp file and a rename.

use crate::autopoiesis::{LearnedRecord, LearningStore};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    shard: String,
    predicate: String,
    args: Vec<String>,
    #[serde(default)]
    extra: serde_json::Value,
}

/// File-backed [`LearningStore`]
#[derive(Debug)]
pub struct JsonFileLearningStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileLearningStore {
    /// Store backed by `path`; created on first save
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn write_all(&self, records: &[StoredRecord]) -> Result<(), StoreError> {
        let io = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io)
    }
}

#[async_trait::async_trait]
impl LearningStore for JsonFileLearningStore {
    async fn save(
        &self,
        shard: &str,
        predicate: &str,
        args: &[String],
        extra: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        records.push(StoredRecord {
            shard: shard.to_string(),
            predicate: predicate.to_string(),
            args: args.to_vec(),
            extra: extra.clone(),
        });
        self.write_all(&records).await
    }

    async fn load_by_predicate(
        &self,
        shard: &str,
        predicate: &str,
    ) -> Result<Vec<LearnedRecord>, StoreError> {
        let records = self.read_all().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.shard == shard && r.predicate == predicate)
            .map(|r| LearnedRecord { args: r.args })
            .collect())
    }
}
