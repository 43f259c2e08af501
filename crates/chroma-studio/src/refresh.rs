//! Periodic re-trace for play views.

use std::sync::Arc;
use std::time::Duration;

use chroma_core::trace::{TraceInput, TraceResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::StudioConfig;
use crate::orchestrator::TraceOrchestrator;

/// What the refresh loop has seen so far.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshState {
    pub ticks: u64,
    pub result: Option<TraceResult>,
    pub error: Option<String>,
    pub last_ok_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TraceRefresh {
    orchestrator: TraceOrchestrator,
    after_ok: Duration,
    after_err: Duration,
}

impl TraceRefresh {
    pub fn new(orchestrator: TraceOrchestrator, config: &StudioConfig) -> Self {
        Self::with_delays(orchestrator, config.refresh_ok(), config.refresh_err())
    }

    pub fn with_delays(orchestrator: TraceOrchestrator, after_ok: Duration, after_err: Duration) -> Self {
        Self {
            orchestrator,
            after_ok,
            after_err,
        }
    }

    /// Starts tracing whatever `source` returns, right away and then again
    /// after every run. Stops when the handle is cancelled or dropped.
    pub fn spawn<F>(&self, source: F) -> RefreshHandle
    where
        F: Fn() -> TraceInput + Send + Sync + 'static,
    {
        let (cancel, cancelled) = watch::channel(false);
        let state = Arc::new(Mutex::new(RefreshState::default()));
        let (updates, _) = watch::channel(RefreshState::default());

        let task = tokio::spawn(refresh_loop(
            self.clone(),
            source,
            cancelled,
            Arc::clone(&state),
            updates.clone(),
        ));

        RefreshHandle {
            cancel,
            state,
            updates,
            task,
        }
    }
}

async fn refresh_loop<F>(
    refresh: TraceRefresh,
    source: F,
    mut cancelled: watch::Receiver<bool>,
    state: Arc<Mutex<RefreshState>>,
    updates: watch::Sender<RefreshState>,
) where
    F: Fn() -> TraceInput + Send + Sync + 'static,
{
    loop {
        if *cancelled.borrow() {
            break;
        }

        // Detached so a cancel does not tear down engine I/O half way.
        let run = tokio::spawn(refresh.orchestrator.run(source()));
        let joined = tokio::select! {
            _ = cancelled.changed() => break,
            joined = run => joined,
        };
        if *cancelled.borrow() {
            break;
        }

        let ok = {
            let mut state = state.lock();
            state.ticks += 1;
            match joined.map(|run| run.result) {
                Ok(Ok(result)) => {
                    state.result = Some(result);
                    state.error = None;
                    state.last_ok_at = Some(Utc::now());
                }
                Ok(Err(err)) => state.error = Some(err.to_string()),
                Err(err) => state.error = Some(format!("trace task failed: {err}")),
            }
            updates.send_replace(state.clone());
            state.error.is_none()
        };

        let delay = if ok { refresh.after_ok } else { refresh.after_err };
        tokio::select! {
            _ = cancelled.changed() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!("trace refresh stopped");
}

/// Owner of a running refresh loop.
pub struct RefreshHandle {
    cancel: watch::Sender<bool>,
    state: Arc<Mutex<RefreshState>>,
    updates: watch::Sender<RefreshState>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stops the loop. A trace already in flight still completes but its
    /// outcome is not recorded.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn state(&self) -> RefreshState {
        self.state.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RefreshState> {
        self.updates.subscribe()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
