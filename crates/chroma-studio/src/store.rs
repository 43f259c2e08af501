//! Named JSON level storage.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::engine::SCRATCH_LEVEL_NAME;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid level name: {0:?}")]
    InvalidName(String),

    #[error("level not found: {0}")]
    NotFound(String),

    #[error("empty body")]
    Empty,

    #[error("storage i/o failed for {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Turns a user-supplied name into a file-safe key.
///
/// Everything except ASCII letters, digits, `_`, `-` and `.` is dropped, so
/// no path separator survives; `.json` is appended when missing.
pub fn sanitize_name(raw: &str) -> Result<String, StoreError> {
    let safe: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    let stem = safe.strip_suffix(".json").unwrap_or(&safe);
    if stem.trim_matches('.').is_empty() {
        return Err(StoreError::InvalidName(raw.to_string()));
    }
    if safe.ends_with(".json") {
        Ok(safe)
    } else {
        Ok(format!("{safe}.json"))
    }
}

#[async_trait]
pub trait LevelStore: Send + Sync {
    /// Stored names, sorted, `.json` only, the engine scratch file excluded.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    async fn read(&self, name: &str) -> Result<String, StoreError>;

    /// Stores `text` verbatim under `name`. Blank text is rejected.
    async fn write(&self, name: &str, text: &str) -> Result<String, StoreError>;
}

fn check_writable(name: &str, text: &str) -> Result<String, StoreError> {
    let file = sanitize_name(name)?;
    if file == SCRATCH_LEVEL_NAME {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    if text.trim().is_empty() {
        return Err(StoreError::Empty);
    }
    Ok(file)
}

fn listed(name: &str) -> bool {
    name.ends_with(".json") && name != SCRATCH_LEVEL_NAME
}

/// One file per level inside a directory.
#[derive(Debug, Clone)]
pub struct FsLevelStore {
    dir: PathBuf,
}

impl FsLevelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl LevelStore for FsLevelStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let io_err = |source| StoreError::Io {
            name: self.dir.display().to_string(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_err(err)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if listed(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read(&self, name: &str) -> Result<String, StoreError> {
        let file = sanitize_name(name)?;
        match tokio::fs::read_to_string(self.dir.join(&file)).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(file)),
            Err(source) => Err(StoreError::Io { name: file, source }),
        }
    }

    async fn write(&self, name: &str, text: &str) -> Result<String, StoreError> {
        let file = check_writable(name, text)?;
        let io_err = |source| StoreError::Io {
            name: file.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        tokio::fs::write(self.dir.join(&file), text)
            .await
            .map_err(io_err)?;
        tracing::info!(level = %file, dir = %self.dir.display(), "level saved");
        Ok(file)
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryLevelStore {
    levels: Mutex<BTreeMap<String, String>>,
}

impl MemoryLevelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LevelStore for MemoryLevelStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .levels
            .lock()
            .keys()
            .filter(|name| listed(name))
            .cloned()
            .collect())
    }

    async fn read(&self, name: &str) -> Result<String, StoreError> {
        let file = sanitize_name(name)?;
        self.levels
            .lock()
            .get(&file)
            .cloned()
            .ok_or(StoreError::NotFound(file))
    }

    async fn write(&self, name: &str, text: &str) -> Result<String, StoreError> {
        let file = check_writable(name, text)?;
        self.levels.lock().insert(file.clone(), text.to_string());
        Ok(file)
    }
}
