//! Release boundary: authoring levels in, player-safe levels out.

use std::sync::Arc;

use chroma_core::level::{LevelError, LevelV2, is_level_v2, load_for_editing, to_pretty_json};
use chroma_core::migrate::strip_dev;
use serde_json::Value;
use thiserror::Error;

use crate::store::{LevelStore, StoreError};

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("level {name} cannot be released: {source}")]
    Level {
        name: String,
        #[source]
        source: LevelError,
    },

    #[error("failed to encode released level: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Text to store for a release upload.
///
/// Anything shaped like a version-2 level loses its `dev` block and is
/// re-indented, whether or not the rest of it matches the schema; anything
/// else is stored as sent.
pub fn release_text(body: &str) -> Result<String, ReleaseError> {
    let Ok(mut value) = serde_json::from_str::<Value>(body) else {
        return Ok(body.to_string());
    };
    if !is_level_v2(&value) {
        return Ok(body.to_string());
    }
    if let Some(fields) = value.as_object_mut() {
        fields.remove("dev");
    }
    Ok(to_pretty_json(&value)?)
}

#[derive(Clone)]
pub struct ReleasePublisher {
    authoring: Arc<dyn LevelStore>,
    release: Arc<dyn LevelStore>,
}

impl ReleasePublisher {
    pub fn new(authoring: Arc<dyn LevelStore>, release: Arc<dyn LevelStore>) -> Self {
        Self { authoring, release }
    }

    pub fn authoring(&self) -> &Arc<dyn LevelStore> {
        &self.authoring
    }

    pub fn release(&self) -> &Arc<dyn LevelStore> {
        &self.release
    }

    /// Copies authoring level `name` into the release store without its
    /// author-only data. Returns the stored file name.
    pub async fn publish(&self, name: &str) -> Result<String, ReleaseError> {
        let text = self.authoring.read(name).await?;
        let level = load_for_editing(&text).map_err(|source| ReleaseError::Level {
            name: name.to_string(),
            source,
        })?;
        let released = to_pretty_json(&strip_dev(&level))?;
        let file = self.release.write(name, &released).await?;
        tracing::info!(level = %file, "level published");
        Ok(file)
    }

    /// Loads a level for play: the release copy when there is one, the
    /// authoring copy otherwise. Author-only data is stripped either way.
    pub async fn load_play_level(&self, name: &str) -> Result<LevelV2, ReleaseError> {
        let text = match self.release.read(name).await {
            Ok(text) => text,
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(level = %name, "no release copy, using authoring level");
                self.authoring.read(name).await?
            }
            Err(err) => return Err(err.into()),
        };

        let level = load_for_editing(&text).map_err(|source| ReleaseError::Level {
            name: name.to_string(),
            source,
        })?;
        Ok(strip_dev(&level))
    }
}
