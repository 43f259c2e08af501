//! In-process reference tracer.
//!
//! Answers the same request/reply contract as the native engine: a version-1
//! level in, a trace reply out. Only the first laser is followed.

use std::collections::HashMap;

use serde_json::json;

use crate::level::{Dir, Entity, LevelV1, MirrorAngle, Placed};
use crate::trace::{TraceResult, TraceSegment};

fn reflect(dir: Dir, angle: MirrorAngle) -> Dir {
    match (angle, dir) {
        // `\`
        (MirrorAngle::Deg45 | MirrorAngle::Deg225, Dir::N) => Dir::W,
        (MirrorAngle::Deg45 | MirrorAngle::Deg225, Dir::W) => Dir::N,
        (MirrorAngle::Deg45 | MirrorAngle::Deg225, Dir::S) => Dir::E,
        (MirrorAngle::Deg45 | MirrorAngle::Deg225, Dir::E) => Dir::S,
        // `/`
        (MirrorAngle::Deg135 | MirrorAngle::Deg315, Dir::N) => Dir::E,
        (MirrorAngle::Deg135 | MirrorAngle::Deg315, Dir::E) => Dir::N,
        (MirrorAngle::Deg135 | MirrorAngle::Deg315, Dir::S) => Dir::W,
        (MirrorAngle::Deg135 | MirrorAngle::Deg315, Dir::W) => Dir::S,
    }
}

/// Follows the first laser of `level` until it leaves the grid, stops on a
/// wall or target, or runs out of steps.
pub fn trace_first_laser(level: &LevelV1) -> TraceResult {
    let mut result = TraceResult::default();

    let Some(laser) = level.objects.iter().find_map(|o| match o {
        Entity::Laser(laser) => Some(laser),
        _ => None,
    }) else {
        return result;
    };

    let cells: HashMap<(i32, i32), &Entity> = level
        .objects
        .iter()
        .map(|o| (o.cell(), o))
        .collect();

    let grid = level.grid;
    let mut dir = laser.dir;
    let (mut x, mut y) = (laser.x, laser.y);
    let (mut sx, mut sy) = (x, y);
    let max_steps = grid.w.saturating_mul(grid.h).saturating_mul(4);

    for _ in 0..max_steps {
        let (dx, dy) = dir.delta();
        let next = x.checked_add(dx).zip(y.checked_add(dy));

        let Some((nx, ny)) = next.filter(|&(nx, ny)| grid.contains(nx, ny)) else {
            result.segments.push(TraceSegment { x0: sx, y0: sy, x1: x, y1: y });
            return result;
        };
        (x, y) = (nx, ny);

        match cells.get(&(x, y)) {
            Some(Entity::Wall(_)) => {
                result.segments.push(TraceSegment { x0: sx, y0: sy, x1: x, y1: y });
                result.hit_wall = true;
                return result;
            }
            Some(Entity::Target(target)) => {
                result.segments.push(TraceSegment { x0: sx, y0: sy, x1: x, y1: y });
                result.hit_target = true;
                result.hit_target_id = Some(target.id.clone());
                return result;
            }
            Some(Entity::Mirror(mirror)) => {
                result.segments.push(TraceSegment { x0: sx, y0: sy, x1: x, y1: y });
                dir = reflect(dir, mirror.angle);
                (sx, sy) = (x, y);
            }
            // Lasers are transparent to other beams.
            Some(Entity::Laser(_)) | None => {}
        }
    }

    tracing::debug!(max_steps, "beam step cap reached");
    result.segments.push(TraceSegment { x0: sx, y0: sy, x1: x, y1: y });
    result
}

/// Serves one engine request in the engine's own reply format.
pub fn handle_request(request: &str) -> String {
    let level: LevelV1 = match serde_json::from_str(request) {
        Ok(level) => level,
        Err(err) => {
            return json!({ "ok": false, "error": format!("JSON schema error: {err}") }).to_string();
        }
    };

    let result = trace_first_laser(&level);
    json!({
        "ok": true,
        "hitWall": result.hit_wall,
        "hitTarget": result.hit_target,
        "hitTargetId": result.hit_target_id.unwrap_or_default(),
        "segments": result.segments,
    })
    .to_string()
}
