use std::path::PathBuf;
use std::sync::Arc;

use chroma_studio::{
    EngineInput, EngineInputMode, EngineService, EngineSpec, FsLevelStore, LevelStore,
    ProcessEngine, ReleasePublisher, SCRATCH_LEVEL_NAME, StudioConfig, TraceOrchestrator,
};

/// Shared handler state: both level stores and the trace pipeline.
#[derive(Clone)]
pub struct Studio {
    publisher: ReleasePublisher,
    orchestrator: TraceOrchestrator,
}

impl Studio {
    pub fn new(
        levels: Arc<dyn LevelStore>,
        release: Arc<dyn LevelStore>,
        engine: EngineService,
    ) -> Self {
        Self {
            publisher: ReleasePublisher::new(levels, release),
            orchestrator: TraceOrchestrator::new(Arc::new(engine)),
        }
    }

    /// Directory-backed stores and an engine chosen from `engine_exe`: the
    /// native binary when given, the in-process tracer otherwise.
    pub fn from_dirs(
        levels_dir: PathBuf,
        release_dir: PathBuf,
        engine_exe: Option<PathBuf>,
        config: &StudioConfig,
    ) -> Self {
        let spec = match engine_exe {
            Some(exe) => {
                let input = match config.engine_input {
                    EngineInputMode::Stdin => EngineInput::Stdin,
                    EngineInputMode::ScratchFile => {
                        EngineInput::ScratchFile(levels_dir.join(SCRATCH_LEVEL_NAME))
                    }
                };
                EngineSpec::Process(ProcessEngine::new(exe, input, config.engine_timeout()))
            }
            None => EngineSpec::Builtin,
        };

        Self::new(
            Arc::new(FsLevelStore::new(levels_dir)),
            Arc::new(FsLevelStore::new(release_dir)),
            EngineService::from_spec(spec),
        )
    }

    pub fn levels(&self) -> &Arc<dyn LevelStore> {
        self.publisher.authoring()
    }

    pub fn release(&self) -> &Arc<dyn LevelStore> {
        self.publisher.release()
    }

    pub fn publisher(&self) -> &ReleasePublisher {
        &self.publisher
    }

    pub fn orchestrator(&self) -> &TraceOrchestrator {
        &self.orchestrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_dirs_uses_separate_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let studio = Studio::from_dirs(
            dir.path().join("levels"),
            dir.path().join("release"),
            None,
            &StudioConfig::default(),
        );

        studio.levels().write("a", "{}").await.expect("write");
        assert!(dir.path().join("levels").join("a.json").exists());
        assert!(studio.release().list().await.expect("list").is_empty());

        let engine = studio.orchestrator().engine().init().await.expect("builtin");
        assert_eq!(engine.name(), "builtin");
    }

    #[tokio::test]
    async fn test_missing_engine_exe_fails_init() {
        let dir = tempfile::tempdir().expect("tempdir");
        let studio = Studio::from_dirs(
            dir.path().join("levels"),
            dir.path().join("release"),
            Some(dir.path().join("no-such-engine")),
            &StudioConfig::default(),
        );
        assert!(studio.orchestrator().engine().init().await.is_err());
    }
}
