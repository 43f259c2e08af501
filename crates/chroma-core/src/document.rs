//! Editing session over raw level text.
//!
//! The text is the source of truth: users may type into it directly, so it
//! can be anything. Structured edits only apply while the text parses as a
//! level; every applied edit rewrites the text as pretty JSON.

use crate::edit::{self, EditAction, EditOutcome};
use crate::level::{AnyLevel, LevelV1, LevelV2, parse_level, to_pretty_json};
use crate::migrate::{EngineVariant, v1_to_v2, v2_to_engine_v1};
use crate::validate::Violation;

/// Parse state of the document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Ready(Box<LevelV2>),
    /// Inline message shown next to the text; the session stays editable.
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct EditorDocument {
    text: String,
    status: DocumentStatus,
}

impl EditorDocument {
    /// Opens `text`. Version-1 input is migrated and the text replaced by the
    /// version-2 form.
    pub fn open(text: impl Into<String>) -> Self {
        let text = text.into();
        match parse_level(&text) {
            Ok(AnyLevel::V1(legacy)) => {
                let level = v1_to_v2(&legacy);
                tracing::info!(level = %level.meta.name, "migrated v1 level to v2");
                let mut doc = Self {
                    text,
                    status: DocumentStatus::Invalid(String::new()),
                };
                doc.commit(level);
                doc
            }
            Ok(AnyLevel::V2(level)) => Self {
                text,
                status: DocumentStatus::Ready(Box::new(level)),
            },
            Err(err) => Self {
                text,
                status: DocumentStatus::Invalid(err.to_string()),
            },
        }
    }

    pub fn from_level(level: &LevelV2) -> Result<Self, serde_json::Error> {
        Ok(Self::open(to_pretty_json(level)?))
    }

    /// A fresh document holding the default level.
    pub fn template() -> Self {
        let level = LevelV2::template();
        Self::from_level(&level).unwrap_or_else(|_| Self {
            text: String::new(),
            status: DocumentStatus::Ready(Box::new(level)),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn status(&self) -> &DocumentStatus {
        &self.status
    }

    pub fn level(&self) -> Option<&LevelV2> {
        match &self.status {
            DocumentStatus::Ready(level) => Some(&**level),
            DocumentStatus::Invalid(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            DocumentStatus::Ready(_) => None,
            DocumentStatus::Invalid(message) => Some(message),
        }
    }

    /// First structural problem of the parsed level, if any.
    pub fn violation(&self) -> Option<Violation> {
        self.level().and_then(|level| level.validate().err())
    }

    /// Replaces the text as typed. Never fails; see [`Self::status`].
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.reparse();
    }

    fn reparse(&mut self) {
        self.status = match parse_level(&self.text) {
            Ok(level) => DocumentStatus::Ready(Box::new(level.into_v2())),
            Err(err) => DocumentStatus::Invalid(err.to_string()),
        };
    }

    /// Runs `f` on a copy of the level and commits the copy as pretty text.
    /// Returns `None` while the text does not parse.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut LevelV2) -> R) -> Option<R> {
        let mut level = self.level()?.clone();
        let out = f(&mut level);
        self.commit(level);
        Some(out)
    }

    /// Applies one edit; the text is only rewritten when the edit applied.
    pub fn dispatch(&mut self, action: EditAction) -> Option<EditOutcome> {
        let mut level = self.level()?.clone();
        let outcome = edit::apply(&mut level, action);
        if outcome.is_applied() {
            self.commit(level);
        }
        Some(outcome)
    }

    fn commit(&mut self, level: LevelV2) {
        match to_pretty_json(&level) {
            Ok(text) => {
                self.text = text;
                self.status = DocumentStatus::Ready(Box::new(level));
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize edited level"),
        }
    }

    /// Pretty-prints the text if it is JSON at all. Returns whether it did.
    pub fn format(&mut self) -> bool {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&self.text) else {
            return false;
        };
        match to_pretty_json(&value) {
            Ok(text) => {
                self.set_text(text);
                true
            }
            Err(_) => false,
        }
    }

    /// What the engine should simulate for this document.
    pub fn engine_level(&self) -> Option<LevelV1> {
        self.level()
            .map(|level| v2_to_engine_v1(level, EngineVariant::Editor))
    }
}

impl Default for EditorDocument {
    fn default() -> Self {
        Self::template()
    }
}
