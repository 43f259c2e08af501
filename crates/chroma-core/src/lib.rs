//! Chroma Core Library
//!
//! Level data model and everything that can be done to a level without I/O:
//! schema recognition, version migration, validated edits, the editor and
//! play sessions, engine reply handling and a reference beam tracer.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod beam;
pub mod document;
pub mod edit;
pub mod level;
pub mod migrate;
pub mod play;
pub mod trace;
pub mod validate;

pub use document::{DocumentStatus, EditorDocument};
pub use edit::{EditAction, EditOutcome, EntityPatch, Rejection};
pub use level::{
    AnyLevel, Color, DEFAULT_INVENTORY_MIRRORS, Dir, Entity, EntityKind, FixedEntity, Grid,
    LevelError, LevelV1, LevelV2, Mirror, MirrorAngle, Placed, canonicalize, is_level_v1,
    is_level_v2, load_for_editing, parse_level, to_pretty_json,
};
pub use migrate::{EngineVariant, strip_dev, v1_to_v2, v2_to_engine_v1};
pub use play::PlaySession;
pub use trace::{ReplyError, TraceInput, TracePlan, TraceResult, TraceSegment, merge, parse_reply};
pub use validate::Violation;
