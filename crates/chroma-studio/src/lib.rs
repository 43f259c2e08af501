//! Chroma Studio
//!
//! The async side of level authoring: engine adapters behind a lazily
//! initialized service, trace orchestration with stale-result discard,
//! debounced auto-build, periodic refresh, level storage and release
//! publishing.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod autobuild;
pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod refresh;
pub mod release;
pub mod store;

pub use autobuild::{AutoBuildScheduler, AutoBuildState, BuildPhase};
pub use config::{ConfigError, EngineInputMode, StudioConfig};
pub use engine::{
    BuiltinEngine, Engine, EngineError, EngineFactory, EngineInput, EngineService, EngineSpec,
    ProcessEngine, SCRATCH_LEVEL_NAME,
};
pub use orchestrator::{TraceError, TraceOrchestrator, TraceRun, TraceState, TraceStatus};
pub use refresh::{RefreshHandle, RefreshState, TraceRefresh};
pub use release::{ReleaseError, ReleasePublisher, release_text};
pub use store::{FsLevelStore, LevelStore, MemoryLevelStore, StoreError, sanitize_name};
