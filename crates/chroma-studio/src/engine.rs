//! Physics engine adapters.
//!
//! An engine takes one version-1 level as JSON text and answers with a trace
//! reply as JSON text. Nothing else about it is assumed.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{Mutex, OnceCell};

/// Scratch file name the process engine reads its level from. Level listings
/// hide it.
pub const SCRATCH_LEVEL_NAME: &str = "__web_temp_level.json";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine executable not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to start engine {}: {source}", .path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine exited with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },

    #[error("engine did not answer within {0:?}")]
    Timeout(Duration),

    #[error("engine output is not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[async_trait]
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    async fn trace(&self, request: &str) -> Result<String, EngineError>;
}

/// The reference tracer from `chroma-core`, run in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinEngine;

#[async_trait]
impl Engine for BuiltinEngine {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn trace(&self, request: &str) -> Result<String, EngineError> {
        Ok(chroma_core::beam::handle_request(request))
    }
}

/// How the native engine receives its level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineInput {
    Stdin,
    /// Written to this file, whose path is the only argument.
    ScratchFile(PathBuf),
}

/// Native engine executable, one process per request.
///
/// Requests through a scratch file run one at a time, since they all share
/// the same file.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    exe: PathBuf,
    input: EngineInput,
    timeout: Duration,
    scratch: Arc<Mutex<()>>,
}

impl ProcessEngine {
    pub fn new(exe: impl Into<PathBuf>, input: EngineInput, timeout: Duration) -> Self {
        Self {
            exe: exe.into(),
            input,
            timeout,
            scratch: Arc::new(Mutex::new(())),
        }
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.exe);
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, request: &str) -> Result<std::process::Output, EngineError> {
        let spawn_err = |source| EngineError::Spawn {
            path: self.exe.clone(),
            source,
        };

        match &self.input {
            EngineInput::Stdin => {
                let mut child = self
                    .command()
                    .stdin(Stdio::piped())
                    .spawn()
                    .map_err(spawn_err)?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(request.as_bytes()).await?;
                    stdin.shutdown().await?;
                }
                Ok(child.wait_with_output().await?)
            }
            EngineInput::ScratchFile(path) => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(path, request).await?;
                let mut command = self.command();
                command.stdin(Stdio::null()).arg(path);
                command.output().await.map_err(spawn_err)
            }
        }
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    fn name(&self) -> &str {
        "process"
    }

    async fn trace(&self, request: &str) -> Result<String, EngineError> {
        let _scratch = match self.input {
            EngineInput::ScratchFile(_) => Some(self.scratch.lock().await),
            EngineInput::Stdin => None,
        };
        let output = tokio::time::timeout(self.timeout, self.run(request))
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(EngineError::Exit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8(output.stdout)?)
    }
}

/// Which engine the service should bring up.
#[derive(Debug, Clone)]
pub enum EngineSpec {
    Builtin,
    Process(ProcessEngine),
}

/// Creates the engine on first use.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Engine>, EngineError>;
}

#[async_trait]
impl EngineFactory for EngineSpec {
    async fn create(&self) -> Result<Arc<dyn Engine>, EngineError> {
        match self {
            Self::Builtin => Ok(Arc::new(BuiltinEngine)),
            Self::Process(engine) => {
                if !tokio::fs::try_exists(engine.exe()).await.unwrap_or(false) {
                    return Err(EngineError::NotFound(engine.exe().to_path_buf()));
                }
                Ok(Arc::new(engine.clone()))
            }
        }
    }
}

/// Process-wide engine handle.
///
/// The first [`EngineService::init`] creates the engine; concurrent callers
/// wait for that same initialization. A failed initialization is not cached,
/// the next call tries again.
pub struct EngineService {
    factory: Arc<dyn EngineFactory>,
    engine: OnceCell<Arc<dyn Engine>>,
}

impl EngineService {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            engine: OnceCell::new(),
        }
    }

    pub fn from_spec(spec: EngineSpec) -> Self {
        Self::new(Arc::new(spec))
    }

    /// A service whose engine is already up.
    pub fn ready(engine: Arc<dyn Engine>) -> Self {
        Self {
            factory: Arc::new(EngineSpec::Builtin),
            engine: OnceCell::new_with(Some(engine)),
        }
    }

    pub async fn init(&self) -> Result<Arc<dyn Engine>, EngineError> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                let engine = self.factory.create().await?;
                tracing::info!(engine = engine.name(), "engine initialized");
                Ok::<_, EngineError>(engine)
            })
            .await?;
        Ok(Arc::clone(engine))
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.initialized()
    }
}
