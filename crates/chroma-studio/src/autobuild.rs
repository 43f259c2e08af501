//! Debounced save-and-trace.
//!
//! ```text
//! idle --edit--> pending --timer--> running --ok--> idle
//!                   ^                  |  \--err--> error (behaves as idle)
//!                   \---- deferred ----/
//! ```
//!
//! Every new text re-arms the debounce timer. When the timer fires the text
//! is persisted and then traced. At most one build runs at a time; a timer
//! that fires during a build is deferred and re-armed once the build ends.

use std::sync::Arc;
use std::time::Duration;

use chroma_core::level::canonicalize;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::StudioConfig;
use crate::orchestrator::TraceOrchestrator;
use crate::store::{LevelStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    #[default]
    Idle,
    Pending,
    Running,
    Error,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoBuildState {
    pub phase: BuildPhase,
    pub enabled: bool,
    /// Raw cause of the last failed build.
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    /// Completed builds, successful or not.
    pub builds: u64,
}

/// Formatting-insensitive key used for the dirty check.
fn canonical(text: &str) -> String {
    canonicalize(text).unwrap_or_else(|| text.to_string())
}

struct Core {
    state: AutoBuildState,
    text: String,
    baseline: String,
    /// Bumped on every baseline change.
    baseline_rev: u64,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    running: bool,
    deferred: bool,
}

struct Shared {
    name: String,
    delay: Duration,
    store: Arc<dyn LevelStore>,
    orchestrator: TraceOrchestrator,
    core: Mutex<Core>,
    updates: watch::Sender<AutoBuildState>,
}

impl Shared {
    fn publish(&self, core: &Core) {
        self.updates.send_replace(core.state.clone());
    }

    fn set_baseline(core: &mut Core, text: &str) -> u64 {
        core.baseline = canonical(text);
        core.baseline_rev += 1;
        core.baseline_rev
    }

    fn cancel_timer(core: &mut Core) {
        core.generation += 1;
        if let Some(timer) = core.timer.take() {
            timer.abort();
        }
    }

    fn arm(self: &Arc<Self>, core: &mut Core) {
        Self::cancel_timer(core);
        let generation = core.generation;
        if !core.running {
            core.state.phase = BuildPhase::Pending;
        }

        let shared = Arc::clone(self);
        let delay = self.delay;
        core.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire(generation);
        }));
    }

    fn fire(self: &Arc<Self>, generation: u64) {
        let mut core = self.core.lock();
        if core.generation != generation || !core.state.enabled {
            return;
        }
        core.timer = None;

        if core.running {
            tracing::debug!(level = %self.name, "build in flight, deferring");
            core.deferred = true;
            return;
        }

        core.running = true;
        core.state.phase = BuildPhase::Running;
        let text = core.text.clone();
        self.publish(&core);
        drop(core);

        tokio::spawn(Arc::clone(self).build(text));
    }

    async fn build(self: Arc<Self>, text: String) {
        tracing::debug!(level = %self.name, "auto-build started");

        let outcome = match self.store.write(&self.name, &text).await {
            Ok(_) => {
                Self::set_baseline(&mut self.core.lock(), &text);
                self.orchestrator
                    .trace(text.as_str())
                    .await
                    .map_err(|err| err.to_string())
            }
            Err(err) => Err(err.to_string()),
        };

        let mut core = self.core.lock();
        core.running = false;
        core.state.builds += 1;
        match outcome {
            Ok(_) => {
                core.state.phase = BuildPhase::Idle;
                core.state.last_error = None;
                core.state.last_success_at = Some(Utc::now());
                tracing::info!(level = %self.name, "auto-build finished");
            }
            Err(cause) => {
                tracing::warn!(level = %self.name, error = %cause, "auto-build failed");
                core.state.phase = BuildPhase::Error;
                core.state.last_error = Some(cause);
            }
        }

        if core.deferred {
            core.deferred = false;
            if core.state.enabled {
                self.arm(&mut core);
            }
        }
        // An edit made during the build left its timer armed.
        if core.timer.is_some() {
            core.state.phase = BuildPhase::Pending;
        }
        self.publish(&core);
    }
}

/// Keeps one level persisted and traced while it is being edited.
pub struct AutoBuildScheduler {
    shared: Arc<Shared>,
}

impl AutoBuildScheduler {
    /// `text` is the level as currently stored; it is the initial clean
    /// baseline.
    pub fn new(
        name: impl Into<String>,
        text: impl Into<String>,
        store: Arc<dyn LevelStore>,
        orchestrator: TraceOrchestrator,
        delay: Duration,
    ) -> Self {
        let text = text.into();
        let state = AutoBuildState {
            enabled: true,
            ..AutoBuildState::default()
        };
        let (updates, _) = watch::channel(state.clone());
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                delay,
                store,
                orchestrator,
                core: Mutex::new(Core {
                    state,
                    baseline: canonical(&text),
                    baseline_rev: 0,
                    text,
                    generation: 0,
                    timer: None,
                    running: false,
                    deferred: false,
                }),
                updates,
            }),
        }
    }

    /// Scheduler using the configured debounce delay and initial switch.
    pub fn from_config(
        name: impl Into<String>,
        text: impl Into<String>,
        store: Arc<dyn LevelStore>,
        orchestrator: TraceOrchestrator,
        config: &StudioConfig,
    ) -> Self {
        let scheduler = Self::new(name, text, store, orchestrator, config.autobuild_delay());
        if !config.autobuild_enabled {
            scheduler.set_enabled(false);
        }
        scheduler
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> AutoBuildState {
        self.shared.core.lock().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutoBuildState> {
        self.shared.updates.subscribe()
    }

    pub fn text(&self) -> String {
        self.shared.core.lock().text.clone()
    }

    /// Records the editor's current text. New text re-arms the timer while
    /// enabled; the same text again does nothing.
    pub fn edit(&self, text: impl Into<String>) {
        let text = text.into();
        let mut core = self.shared.core.lock();
        if core.text == text {
            return;
        }
        core.text = text;
        if core.state.enabled {
            self.shared.arm(&mut core);
            self.shared.publish(&core);
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut core = self.shared.core.lock();
        core.state.enabled = enabled;
        if !enabled {
            Shared::cancel_timer(&mut core);
            core.deferred = false;
            if core.state.phase == BuildPhase::Pending {
                core.state.phase = BuildPhase::Idle;
            }
        }
        self.shared.publish(&core);
    }

    /// Whether the current text differs from what was last persisted,
    /// ignoring formatting.
    pub fn is_dirty(&self) -> bool {
        let core = self.shared.core.lock();
        canonical(&core.text) != core.baseline
    }

    /// Persists the current text right away.
    ///
    /// The clean baseline moves first so the UI shows the level as saved
    /// immediately; it moves back if the write fails, unless another save
    /// moved it again in the meantime.
    pub async fn save_now(&self) -> Result<String, StoreError> {
        let (text, previous, rev) = {
            let mut core = self.shared.core.lock();
            let text = core.text.clone();
            let previous = core.baseline.clone();
            let rev = Shared::set_baseline(&mut core, &text);
            (text, previous, rev)
        };

        match self.shared.store.write(&self.shared.name, &text).await {
            Ok(file) => Ok(file),
            Err(err) => {
                tracing::warn!(level = %self.shared.name, error = %err, "manual save failed");
                let mut core = self.shared.core.lock();
                if core.baseline_rev == rev {
                    core.baseline = previous;
                    core.baseline_rev += 1;
                }
                Err(err)
            }
        }
    }
}

impl Drop for AutoBuildScheduler {
    fn drop(&mut self) {
        Shared::cancel_timer(&mut self.shared.core.lock());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chroma_core::level::{LevelV2, to_pretty_json};

    use super::*;
    use crate::engine::{BuiltinEngine, Engine, EngineError, EngineService};
    use crate::store::MemoryLevelStore;

    const DELAY: Duration = Duration::from_millis(400);

    /// Reference tracer that takes a second per call and tracks overlap.
    #[derive(Default)]
    struct SlowEngine {
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Engine for SlowEngine {
        fn name(&self) -> &str {
            "slow"
        }

        async fn trace(&self, request: &str) -> Result<String, EngineError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            BuiltinEngine.trace(request).await
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl LevelStore for BrokenStore {
        async fn list(&self) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }

        async fn read(&self, name: &str) -> Result<String, StoreError> {
            Err(StoreError::NotFound(name.to_string()))
        }

        async fn write(&self, name: &str, _text: &str) -> Result<String, StoreError> {
            Err(StoreError::Io {
                name: name.to_string(),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    /// Fails any write containing `marker` after a delay; stores the rest.
    struct FailingWrites {
        marker: &'static str,
        inner: MemoryLevelStore,
    }

    #[async_trait]
    impl LevelStore for FailingWrites {
        async fn list(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list().await
        }

        async fn read(&self, name: &str) -> Result<String, StoreError> {
            self.inner.read(name).await
        }

        async fn write(&self, name: &str, text: &str) -> Result<String, StoreError> {
            if text.contains(self.marker) {
                tokio::time::sleep(Duration::from_secs(1)).await;
                return Err(StoreError::Io {
                    name: name.to_string(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.write(name, text).await
        }
    }

    fn level_text(name: &str) -> String {
        let mut level = LevelV2::template();
        level.meta.name = name.to_string();
        to_pretty_json(&level).expect("serialize")
    }

    fn scheduler_with(
        engine: Arc<dyn Engine>,
        store: Arc<dyn LevelStore>,
    ) -> AutoBuildScheduler {
        let orchestrator = TraceOrchestrator::new(Arc::new(EngineService::ready(engine)));
        AutoBuildScheduler::new("level01", level_text("start"), store, orchestrator, DELAY)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_are_debounced() {
        let store = Arc::new(MemoryLevelStore::new());
        let scheduler = scheduler_with(Arc::new(BuiltinEngine), store.clone());

        scheduler.edit(level_text("a"));
        assert_eq!(scheduler.state().phase, BuildPhase::Pending);
        advance(200).await;
        scheduler.edit(level_text("b"));
        advance(300).await;
        assert_eq!(scheduler.state().builds, 0, "timer was re-armed at 200ms");

        advance(200).await;
        let state = scheduler.state();
        assert_eq!(state.builds, 1);
        assert_eq!(state.phase, BuildPhase::Idle);
        assert!(state.last_success_at.is_some());
        assert_eq!(store.read("level01").await.expect("saved"), level_text("b"));
        assert!(!scheduler.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_text_does_not_rearm() {
        let store = Arc::new(MemoryLevelStore::new());
        let scheduler = scheduler_with(Arc::new(BuiltinEngine), store);

        scheduler.edit(level_text("a"));
        advance(300).await;
        scheduler.edit(level_text("a"));
        advance(150).await;
        assert_eq!(scheduler.state().builds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_defers_next_build() {
        let store = Arc::new(MemoryLevelStore::new());
        let engine = Arc::new(SlowEngine::default());
        let scheduler = scheduler_with(engine.clone(), store.clone());

        scheduler.edit(level_text("a"));
        advance(500).await;
        assert_eq!(scheduler.state().phase, BuildPhase::Running);

        // Fires at 900ms while the first build runs until about 1400ms.
        scheduler.edit(level_text("b"));
        advance(500).await;
        assert_eq!(scheduler.state().phase, BuildPhase::Running);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        advance(500).await;
        assert_eq!(scheduler.state().builds, 1);
        assert_eq!(scheduler.state().phase, BuildPhase::Pending);

        advance(2000).await;
        assert_eq!(scheduler.state().builds, 2);
        assert_eq!(engine.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(store.read("level01").await.expect("saved"), level_text("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_build_reports_pending_after_it() {
        let store = Arc::new(MemoryLevelStore::new());
        let scheduler = scheduler_with(Arc::new(SlowEngine::default()), store.clone());

        // Build runs from 400ms to about 1400ms.
        scheduler.edit(level_text("a"));
        advance(1300).await;
        assert_eq!(scheduler.state().phase, BuildPhase::Running);

        // Timer due at 1700ms, after the build has finished.
        scheduler.edit(level_text("b"));
        advance(200).await;
        let state = scheduler.state();
        assert_eq!(state.builds, 1);
        assert_eq!(state.phase, BuildPhase::Pending);
        assert!(state.last_success_at.is_some());

        advance(1500).await;
        assert_eq!(scheduler.state().builds, 2);
        assert_eq!(scheduler.state().phase, BuildPhase::Idle);
        assert_eq!(store.read("level01").await.expect("saved"), level_text("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_cause_and_rearms_on_edit() {
        let scheduler = scheduler_with(Arc::new(BuiltinEngine), Arc::new(BrokenStore));

        scheduler.edit(level_text("a"));
        advance(500).await;
        let state = scheduler.state();
        assert_eq!(state.phase, BuildPhase::Error);
        assert!(state.last_error.as_deref().is_some_and(|e| e.contains("disk full")));
        assert!(scheduler.is_dirty());

        advance(5000).await;
        assert_eq!(scheduler.state().builds, 1, "no automatic retry");

        scheduler.edit(level_text("b"));
        assert_eq!(scheduler.state().phase, BuildPhase::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trace_failure_is_reported() {
        let store = Arc::new(MemoryLevelStore::new());
        let scheduler = scheduler_with(Arc::new(BuiltinEngine), store.clone());

        scheduler.edit("{ broken");
        advance(500).await;
        let state = scheduler.state();
        assert_eq!(state.phase, BuildPhase::Error);
        assert!(state.last_error.as_deref().is_some_and(|e| e.starts_with("trace failed:")));
        assert_eq!(store.read("level01").await.expect("persisted anyway"), "{ broken");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_cancels_pending_timer() {
        let store = Arc::new(MemoryLevelStore::new());
        let scheduler = scheduler_with(Arc::new(BuiltinEngine), store.clone());

        scheduler.edit(level_text("a"));
        scheduler.set_enabled(false);
        assert_eq!(scheduler.state().phase, BuildPhase::Idle);
        advance(1000).await;
        assert_eq!(scheduler.state().builds, 0);

        scheduler.edit(level_text("b"));
        advance(1000).await;
        assert_eq!(scheduler.state().builds, 0);
        assert!(store.list().await.expect("list").is_empty());

        scheduler.set_enabled(true);
        scheduler.edit(level_text("c"));
        advance(500).await;
        assert_eq!(scheduler.state().builds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_save_rolls_back_baseline_on_failure() {
        let scheduler = scheduler_with(Arc::new(BuiltinEngine), Arc::new(BrokenStore));
        scheduler.set_enabled(false);
        scheduler.edit(level_text("a"));
        assert!(scheduler.is_dirty());

        assert!(scheduler.save_now().await.is_err());
        assert!(scheduler.is_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_manual_save_keeps_newer_auto_build_baseline() {
        let store = Arc::new(FailingWrites {
            marker: "manual",
            inner: MemoryLevelStore::new(),
        });
        let scheduler = scheduler_with(Arc::new(BuiltinEngine), store.clone());
        scheduler.set_enabled(false);
        scheduler.edit(level_text("manual"));
        scheduler.set_enabled(true);

        // The manual write fails at 1000ms; the auto-build of "auto" lands at 600ms.
        let (saved, ()) = tokio::join!(scheduler.save_now(), async {
            advance(200).await;
            scheduler.edit(level_text("auto"));
        });
        assert!(saved.is_err());
        assert_eq!(scheduler.state().builds, 1);
        assert_eq!(store.read("level01").await.expect("saved"), level_text("auto"));
        assert!(!scheduler.is_dirty());
    }

    #[tokio::test]
    async fn test_from_config_applies_delay_and_switch() {
        let orchestrator =
            TraceOrchestrator::new(Arc::new(EngineService::ready(Arc::new(BuiltinEngine))));
        let config = StudioConfig {
            autobuild_delay_ms: 50,
            autobuild_enabled: false,
            ..StudioConfig::default()
        };
        let scheduler = AutoBuildScheduler::from_config(
            "level01",
            level_text("start"),
            Arc::new(MemoryLevelStore::new()),
            orchestrator,
            &config,
        );
        assert!(!scheduler.state().enabled);
        assert_eq!(scheduler.shared.delay, Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_save_and_formatting_insensitive_dirty() {
        let store = Arc::new(MemoryLevelStore::new());
        let scheduler = scheduler_with(Arc::new(BuiltinEngine), store.clone());
        scheduler.set_enabled(false);

        let compact = serde_json::to_string(&LevelV2::template()).expect("serialize");
        scheduler.edit(compact.clone());
        assert!(scheduler.is_dirty());
        assert_eq!(scheduler.save_now().await.expect("save"), "level01.json");
        assert!(!scheduler.is_dirty());

        scheduler.edit(to_pretty_json(&LevelV2::template()).expect("serialize"));
        assert!(!scheduler.is_dirty(), "re-indenting is not a change");
    }
}
