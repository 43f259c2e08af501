//! Trace result model, engine reply parsing and multi-laser decomposition.
//!
//! The engine only understands a version-1 level and only ever follows the
//! first laser it finds. Levels with several lasers are therefore split into
//! one request per laser (that laser followed by every non-laser entity, in
//! their original order) and the replies are merged back in laser order.

use std::iter;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::level::{AnyLevel, Entity, LevelV1, parse_level};
use crate::migrate::{EngineVariant, v2_to_engine_v1};

/// One straight run of the beam, both ends inclusive, in cell coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceSegment {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    pub segments: Vec<TraceSegment>,
    #[serde(default)]
    pub hit_wall: bool,
    #[serde(default)]
    pub hit_target: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty_id"
    )]
    pub hit_target_id: Option<String>,
}

/// The engine writes `""` when nothing was hit.
fn non_empty_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let id = Option::<String>::deserialize(deserializer)?;
    Ok(id.filter(|id| !id.is_empty()))
}

/// Why an engine reply could not be turned into a [`TraceResult`].
#[derive(Error, Debug)]
pub enum ReplyError {
    #[error("engine output is not JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("engine output has no segments")]
    MissingSegments,

    #[error("engine output does not match the trace format: {0}")]
    Shape(#[source] serde_json::Error),

    /// The engine answered, but reported a failure of its own.
    #[error("{0}")]
    Engine(String),
}

fn engine_failure(reply: &Value) -> Option<String> {
    let error = reply.get("error").filter(|e| match e {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    });
    let declined = reply.get("ok").and_then(Value::as_bool) == Some(false);

    match (error, declined) {
        (Some(Value::String(message)), _) => Some(message.clone()),
        (Some(other), _) => Some(other.to_string()),
        (None, true) => Some("engine reported failure".to_string()),
        (None, false) => None,
    }
}

/// Parses one raw engine reply.
pub fn parse_reply(text: &str) -> Result<TraceResult, ReplyError> {
    let reply: Value = serde_json::from_str(text).map_err(ReplyError::NotJson)?;

    if let Some(message) = engine_failure(&reply) {
        return Err(ReplyError::Engine(message));
    }
    if !reply.get("segments").is_some_and(Value::is_array) {
        return Err(ReplyError::MissingSegments);
    }

    serde_json::from_value(reply).map_err(ReplyError::Shape)
}

/// Combines per-laser results in the order given.
///
/// Segments are concatenated, the hit flags are OR'd and the target id of the
/// first result that reports one wins.
pub fn merge(results: impl IntoIterator<Item = TraceResult>) -> TraceResult {
    results
        .into_iter()
        .fold(TraceResult::default(), |mut acc, result| {
            acc.segments.extend(result.segments);
            acc.hit_wall |= result.hit_wall;
            acc.hit_target |= result.hit_target;
            if acc.hit_target_id.is_none() {
                acc.hit_target_id = result.hit_target_id;
            }
            acc
        })
}

/// Splits `level` into single-laser levels, one per laser, in laser order.
/// Levels with at most one laser come back unchanged.
pub fn split_per_laser(level: &LevelV1) -> Vec<LevelV1> {
    let (lasers, rest): (Vec<&Entity>, Vec<&Entity>) =
        level.objects.iter().partition(|o| o.is_laser());
    if lasers.len() <= 1 {
        return vec![level.clone()];
    }

    lasers
        .into_iter()
        .map(|laser| LevelV1 {
            version: level.version,
            meta: level.meta.clone(),
            grid: level.grid,
            objects: iter::once(laser)
                .chain(rest.iter().copied())
                .cloned()
                .collect(),
        })
        .collect()
}

/// What a trace is asked to simulate.
#[derive(Debug, Clone)]
pub enum TraceInput {
    Level(AnyLevel),
    Text(String),
}

impl From<AnyLevel> for TraceInput {
    fn from(level: AnyLevel) -> Self {
        Self::Level(level)
    }
}

impl From<String> for TraceInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for TraceInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Engine requests needed to trace one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePlan {
    pub requests: Vec<String>,
    pub lasers: usize,
}

impl TracePlan {
    /// Resolves `input` into engine requests.
    ///
    /// Version-2 levels are flattened with the editor variant. Text that is
    /// not a recognizable level goes to the engine untouched, in a single
    /// request, so the engine gets to report what is wrong with it.
    pub fn build(input: &TraceInput) -> Result<Self, serde_json::Error> {
        let level = match input {
            TraceInput::Level(AnyLevel::V1(level)) => level.clone(),
            TraceInput::Level(AnyLevel::V2(level)) => v2_to_engine_v1(level, EngineVariant::Editor),
            TraceInput::Text(text) => match parse_level(text) {
                Ok(AnyLevel::V1(level)) => level,
                Ok(AnyLevel::V2(level)) => v2_to_engine_v1(&level, EngineVariant::Editor),
                Err(_) => {
                    return Ok(Self {
                        requests: vec![text.clone()],
                        lasers: 0,
                    });
                }
            },
        };

        let requests = split_per_laser(&level)
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<_, _>>()?;

        Ok(Self {
            requests,
            lasers: level.laser_count(),
        })
    }
}
