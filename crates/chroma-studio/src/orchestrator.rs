//! Trace orchestration: level in, merged trace result out.
//!
//! Any number of runs may be in flight. Each run is numbered when it is
//! issued and only the most recently issued run may write the shared
//! [`TraceState`]; anything older that resolves later is dropped. A latest
//! run whose future is dropped unfinished puts the state back to what the
//! last applied run left; older runs stay superseded.

use std::future::Future;
use std::sync::Arc;

use chroma_core::trace::{ReplyError, TraceInput, TracePlan, TraceResult, merge, parse_reply};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::engine::{EngineError, EngineService};

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("trace failed: {0}")]
    Unavailable(#[from] EngineError),

    #[error("trace failed: {0}")]
    Malformed(#[source] ReplyError),

    /// Reported by the engine itself.
    #[error("trace failed: {0}")]
    Engine(String),

    #[error("trace failed: could not encode level: {0}")]
    Encode(#[source] serde_json::Error),
}

impl From<ReplyError> for TraceError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::Engine(message) => Self::Engine(message),
            other => Self::Malformed(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    #[default]
    Idle,
    Loading,
    Ok,
    Error,
}

/// What the render surface reads.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceState {
    pub status: TraceStatus,
    pub result: Option<TraceResult>,
    pub error: Option<String>,
    /// Id of the run whose outcome is shown.
    pub applied_run: Option<u64>,
    pub last_trace_at: Option<DateTime<Utc>>,
}

/// Outcome of one run, whether or not it was applied.
#[derive(Debug)]
pub struct TraceRun {
    pub run_id: u64,
    /// `false` when a newer run had been issued by the time this one resolved.
    pub applied: bool,
    pub result: Result<TraceResult, TraceError>,
}

struct Inner {
    issued: u64,
    state: TraceState,
}

struct Shared {
    inner: Mutex<Inner>,
    updates: watch::Sender<TraceState>,
}

impl Shared {
    fn issue(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.issued += 1;
        inner.state.status = TraceStatus::Loading;
        self.updates.send_replace(inner.state.clone());
        inner.issued
    }

    fn finish(&self, run_id: u64, result: &Result<TraceResult, TraceError>) -> bool {
        let mut inner = self.inner.lock();
        if inner.issued != run_id {
            tracing::debug!(run_id, latest = inner.issued, "discarding stale trace");
            return false;
        }

        let state = &mut inner.state;
        state.applied_run = Some(run_id);
        match result {
            Ok(trace) => {
                state.status = TraceStatus::Ok;
                state.result = Some(trace.clone());
                state.error = None;
                state.last_trace_at = Some(Utc::now());
            }
            Err(err) => {
                state.status = TraceStatus::Error;
                state.error = Some(err.to_string());
            }
        }
        self.updates.send_replace(state.clone());
        true
    }

    fn abandon(&self, run_id: u64) {
        let mut inner = self.inner.lock();
        if inner.issued != run_id || inner.state.status != TraceStatus::Loading {
            return;
        }
        tracing::debug!(run_id, "trace run abandoned");
        let state = &mut inner.state;
        state.status = match (&state.error, &state.result) {
            (Some(_), _) => TraceStatus::Error,
            (None, Some(_)) => TraceStatus::Ok,
            (None, None) => TraceStatus::Idle,
        };
        self.updates.send_replace(state.clone());
    }
}

/// Marks its run abandoned unless the run got to finish.
struct RunGuard {
    shared: Arc<Shared>,
    run_id: u64,
    finished: bool,
}

impl RunGuard {
    fn finish(mut self, result: &Result<TraceResult, TraceError>) -> bool {
        self.finished = true;
        self.shared.finish(self.run_id, result)
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.abandon(self.run_id);
        }
    }
}

#[derive(Clone)]
pub struct TraceOrchestrator {
    engine: Arc<EngineService>,
    shared: Arc<Shared>,
}

impl TraceOrchestrator {
    pub fn new(engine: Arc<EngineService>) -> Self {
        let (updates, _) = watch::channel(TraceState::default());
        Self {
            engine,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    issued: 0,
                    state: TraceState::default(),
                }),
                updates,
            }),
        }
    }

    pub fn engine(&self) -> &Arc<EngineService> {
        &self.engine
    }

    pub fn state(&self) -> TraceState {
        self.shared.inner.lock().state.clone()
    }

    /// Receives every state change.
    pub fn subscribe(&self) -> watch::Receiver<TraceState> {
        self.shared.updates.subscribe()
    }

    /// Issues a run.
    ///
    /// The run id is taken right here, not when the returned future is first
    /// polled, so issue order is call order.
    pub fn run<I: Into<TraceInput>>(
        &self,
        input: I,
    ) -> impl Future<Output = TraceRun> + Send + 'static + use<I> {
        let input = input.into();
        let run_id = self.shared.issue();
        let engine = Arc::clone(&self.engine);
        let guard = RunGuard {
            shared: Arc::clone(&self.shared),
            run_id,
            finished: false,
        };

        async move {
            let result = execute(&engine, &input, run_id).await;
            if let Err(err) = &result {
                tracing::warn!(run_id, error = %err, "trace run failed");
            }
            let applied = guard.finish(&result);
            TraceRun {
                run_id,
                applied,
                result,
            }
        }
    }

    /// Runs one trace to completion and returns its result.
    pub async fn trace(&self, input: impl Into<TraceInput>) -> Result<TraceResult, TraceError> {
        self.run(input).await.result
    }
}

async fn execute(
    engine: &EngineService,
    input: &TraceInput,
    run_id: u64,
) -> Result<TraceResult, TraceError> {
    let plan = TracePlan::build(input).map_err(TraceError::Encode)?;
    let engine = engine.init().await?;
    tracing::debug!(
        run_id,
        lasers = plan.lasers,
        calls = plan.requests.len(),
        engine = engine.name(),
        "tracing level"
    );

    // One laser at a time; the engine is not assumed to be reentrant.
    let mut results = Vec::with_capacity(plan.requests.len());
    for request in &plan.requests {
        let reply = engine.trace(request).await?;
        results.push(parse_reply(&reply)?);
    }
    Ok(merge(results))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chroma_core::level::{AnyLevel, Dir, Entity, Grid, Laser, LevelV1, MetaV1, Target, Wall};
    use serde_json::{Value, json};
    use tokio::sync::oneshot;

    use super::*;
    use crate::engine::{BuiltinEngine, Engine};

    /// Answers each request only once the test releases the gate for the
    /// request's level name.
    struct GatedEngine {
        gates: Mutex<HashMap<String, oneshot::Receiver<String>>>,
    }

    #[async_trait]
    impl Engine for GatedEngine {
        fn name(&self) -> &str {
            "gated"
        }

        async fn trace(&self, request: &str) -> Result<String, EngineError> {
            let level: Value = serde_json::from_str(request).expect("request is json");
            let name = level["meta"]["name"].as_str().expect("name").to_string();
            let gate = self.gates.lock().remove(&name).expect("gate for level");
            Ok(gate.await.expect("gate released"))
        }
    }

    /// Records every request and answers with the reference tracer.
    #[derive(Default)]
    struct RecordingEngine {
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Engine for RecordingEngine {
        fn name(&self) -> &str {
            "recording"
        }

        async fn trace(&self, request: &str) -> Result<String, EngineError> {
            self.requests.lock().push(request.to_string());
            BuiltinEngine.trace(request).await
        }
    }

    fn named(name: &str) -> AnyLevel {
        AnyLevel::V1(LevelV1 {
            meta: MetaV1 {
                name: name.to_string(),
                author: None,
            },
            ..LevelV1::template()
        })
    }

    fn reply_hitting(target: &str) -> String {
        json!({
            "segments": [{ "x0": 0, "y0": 0, "x1": 1, "y1": 0 }],
            "hitTarget": true,
            "hitTargetId": target
        })
        .to_string()
    }

    fn orchestrator(engine: impl Engine + 'static) -> TraceOrchestrator {
        TraceOrchestrator::new(Arc::new(EngineService::ready(Arc::new(engine))))
    }

    #[tokio::test]
    async fn test_single_laser_example() {
        let level = LevelV1 {
            version: 1,
            meta: MetaV1::default(),
            grid: Grid { w: 5, h: 5, cell_size: 32 },
            objects: vec![
                Entity::Laser(Laser {
                    id: "L1".into(),
                    x: 0,
                    y: 2,
                    dir: Dir::E,
                    color: None,
                }),
                Entity::Target(Target {
                    id: "T1".into(),
                    x: 4,
                    y: 2,
                    accept: None,
                }),
            ],
        };
        let orch = orchestrator(BuiltinEngine);

        let result = orch.trace(AnyLevel::V1(level)).await.expect("trace");
        assert_eq!(result.segments.len(), 1);
        assert_eq!(
            (result.segments[0].x0, result.segments[0].x1, result.segments[0].y1),
            (0, 4, 2)
        );
        assert!(result.hit_target);
        assert_eq!(result.hit_target_id.as_deref(), Some("T1"));

        let state = orch.state();
        assert_eq!(state.status, TraceStatus::Ok);
        assert_eq!(state.applied_run, Some(1));
        assert!(state.last_trace_at.is_some());
    }

    #[tokio::test]
    async fn test_multi_laser_runs_in_order_and_merges() {
        let laser = |id: &str, y| {
            Entity::Laser(Laser {
                id: id.into(),
                x: 0,
                y,
                dir: Dir::E,
                color: None,
            })
        };
        let level = LevelV1 {
            version: 1,
            meta: MetaV1::default(),
            grid: Grid { w: 4, h: 2, cell_size: 16 },
            objects: vec![
                laser("L1", 0),
                Entity::Wall(Wall { id: "W1".into(), x: 3, y: 0 }),
                laser("L2", 1),
                Entity::Target(Target {
                    id: "T1".into(),
                    x: 2,
                    y: 1,
                    accept: None,
                }),
            ],
        };
        let engine = Arc::new(RecordingEngine::default());
        let orch = TraceOrchestrator::new(Arc::new(EngineService::ready(engine.clone())));

        let result = orch.trace(AnyLevel::V1(level)).await.expect("trace");

        let requests = engine.requests.lock().clone();
        assert_eq!(requests.len(), 2);
        let first: Value = serde_json::from_str(&requests[0]).expect("json");
        let second: Value = serde_json::from_str(&requests[1]).expect("json");
        assert_eq!(first["objects"][0]["id"], "L1");
        assert_eq!(second["objects"][0]["id"], "L2");
        assert_eq!(second["objects"].as_array().map(Vec::len), Some(3));

        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[0].y0, 0);
        assert_eq!(result.segments[1].y0, 1);
        assert!(result.hit_wall);
        assert!(result.hit_target);
        assert_eq!(result.hit_target_id.as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_dropped_run_restores_previous_status() {
        let orch = orchestrator(BuiltinEngine);

        let pending = orch.run(named("A"));
        assert_eq!(orch.state().status, TraceStatus::Loading);
        drop(pending);
        assert_eq!(orch.state().status, TraceStatus::Idle);

        orch.trace(named("B")).await.expect("trace");
        let mut updates = orch.subscribe();
        let pending = orch.run(named("C"));
        drop(pending);
        assert!(updates.has_changed().expect("sender alive"));
        let state = orch.state();
        assert_eq!(state.status, TraceStatus::Ok);
        assert_eq!(state.applied_run, Some(2));
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let (release_a, gate_a) = oneshot::channel();
        let (release_b, gate_b) = oneshot::channel();
        let orch = orchestrator(GatedEngine {
            gates: Mutex::new(HashMap::from([("A".to_string(), gate_a), ("B".to_string(), gate_b)])),
        });

        let run_a = tokio::spawn(orch.run(named("A")));
        let run_b = tokio::spawn(orch.run(named("B")));

        release_b.send(reply_hitting("TB")).expect("b waiting");
        let b = run_b.await.expect("join b");
        assert!(b.applied);

        release_a.send(reply_hitting("TA")).expect("a waiting");
        let a = run_a.await.expect("join a");
        assert!(!a.applied);
        assert!(a.result.is_ok(), "stale runs still report their own result");

        let state = orch.state();
        assert_eq!(state.applied_run, Some(b.run_id));
        assert_eq!(
            state.result.and_then(|r| r.hit_target_id).as_deref(),
            Some("TB")
        );
    }

    #[tokio::test]
    async fn test_stale_failure_is_discarded() {
        let (release_a, gate_a) = oneshot::channel();
        let (release_b, gate_b) = oneshot::channel();
        let orch = orchestrator(GatedEngine {
            gates: Mutex::new(HashMap::from([("A".to_string(), gate_a), ("B".to_string(), gate_b)])),
        });

        let run_a = tokio::spawn(orch.run(named("A")));
        let run_b = tokio::spawn(orch.run(named("B")));

        release_b.send(reply_hitting("TB")).expect("b waiting");
        run_b.await.expect("join b");
        release_a
            .send(r#"{"ok":false,"error":"boom"}"#.to_string())
            .expect("a waiting");
        let a = run_a.await.expect("join a");

        assert!(matches!(a.result, Err(TraceError::Engine(ref m)) if m == "boom"));
        let state = orch.state();
        assert_eq!(state.status, TraceStatus::Ok);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_engine_failure_sets_error_state() {
        let (release, gate) = oneshot::channel();
        let orch = orchestrator(GatedEngine {
            gates: Mutex::new(HashMap::from([("A".to_string(), gate)])),
        });
        let mut updates = orch.subscribe();

        let run = tokio::spawn(orch.run(named("A")));
        assert_eq!(orch.state().status, TraceStatus::Loading);
        release.send("not json".to_string()).expect("waiting");
        let run = run.await.expect("join");

        assert!(matches!(run.result, Err(TraceError::Malformed(ReplyError::NotJson(_)))));
        let state = orch.state();
        assert_eq!(state.status, TraceStatus::Error);
        assert!(state.error.as_deref().is_some_and(|e| e.starts_with("trace failed:")));

        updates.changed().await.expect("update");
        assert_eq!(updates.borrow().status, TraceStatus::Error);
    }

    #[tokio::test]
    async fn test_unrecognized_text_is_forwarded_verbatim() {
        let engine = Arc::new(RecordingEngine::default());
        let orch = TraceOrchestrator::new(Arc::new(EngineService::ready(engine.clone())));

        let err = orch.trace("{ definitely not json").await.expect_err("engine rejects");
        assert!(matches!(err, TraceError::Engine(_)));
        assert_eq!(engine.requests.lock().as_slice(), ["{ definitely not json"]);
    }
}
