//! Document persistence for configuration and the story catalog.
//!
//! Documents are JSON values addressed by a short key (`config`, `stories`).
//! The file-backed store keeps one `<key>.json` per document and replaces
//! files atomically, so a crash mid-write never leaves a half-written catalog.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid document key: {0}")]
    InvalidKey(String),
}

/// A key-value store of JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document. `Ok(None)` means it has never been saved.
    async fn load(&self, key: &str) -> Result<Option<Value>, PersistError>;

    /// Replace a document in full.
    async fn save(&self, key: &str, document: &Value) -> Result<(), PersistError>;
}

/// Stores each document as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing a document.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, PersistError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PersistError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, PersistError> {
        let path = self.path_for(key)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn save(&self, key: &str, document: &Value) -> Result<(), PersistError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).await?;

        let content = serde_json::to_string_pretty(document)?;
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), "Saved document");
        Ok(())
    }
}

/// In-memory store, used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a document.
    pub fn with_document(self, key: impl Into<String>, document: Value) -> Self {
        if let Ok(mut docs) = self.documents.lock() {
            docs.insert(key.into(), document);
        }
        self
    }

    /// Make every `save` fail with an IO error.
    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    /// Current contents of a document, if any.
    pub fn document(&self, key: &str) -> Option<Value> {
        self.documents
            .lock()
            .ok()
            .and_then(|docs| docs.get(key).cloned())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, PersistError> {
        Ok(self.document(key))
    }

    async fn save(&self, key: &str, document: &Value) -> Result<(), PersistError> {
        if self.fail_saves {
            return Err(PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "store is read-only",
            )));
        }
        let mut docs = self
            .documents
            .lock()
            .map_err(|_| PersistError::Io(std::io::Error::other("store lock poisoned")))?;
        docs.insert(key.to_string(), document.clone());
        Ok(())
    }
}
