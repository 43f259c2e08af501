//! Validated mutators for authoring levels.
//!
//! Every operation either applies fully or leaves the level untouched. Routine
//! invalid requests (dropping a piece on an occupied cell, dragging onto
//! another piece, acting on an id that no longer exists) are not errors: they
//! come straight from pointer interaction. They are reported through
//! [`EditOutcome::Ignored`] so callers and tests can still observe them.
//!
//! Invariants kept by this module:
//! - ids are unique across `fixed`, `initialPlayer` and `dev.solution`;
//! - no two entities share a cell;
//! - every coordinate is inside the grid (inputs are clamped, not rejected);
//! - the mirror budget is a non-negative integer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::level::{
    Color, Dir, EntityKind, FixedEntity, Laser, LevelV2, Mirror, MirrorAngle, Placed, Target,
    Wall,
};

/// Why an edit did not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The (clamped) cell already holds another entity.
    Occupied,
    /// No entity with that id exists in any pool.
    UnknownId,
    /// The entity exists but may not be changed by the player.
    Locked,
    /// The mirror budget is used up.
    NoBudget,
}

/// Observable result of an edit.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied { id: String },
    Ignored(Rejection),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn applied_id(&self) -> Option<&str> {
        match self {
            Self::Applied { id } => Some(id),
            Self::Ignored(_) => None,
        }
    }
}

/// Field patch for an existing entity.
///
/// Only the fields meaningful for the entity's kind are merged; the rest are
/// ignored. Ids and positions are not patchable here, moves go through
/// [`move_entity`] so the occupancy invariant holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<Dir>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<MirrorAngle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<Color>>,
}

impl EntityPatch {
    /// Decodes a patch coming from an untyped form. Values outside the closed
    /// enumerations (a direction of `"X"`, an angle of `90`) are rejected
    /// here instead of leaking into the level.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    fn apply_laser(&self, laser: &mut Laser) {
        if let Some(dir) = self.dir {
            laser.dir = dir;
        }
        if let Some(color) = self.color {
            laser.color = Some(color);
        }
    }

    fn apply_mirror(&self, mirror: &mut Mirror) {
        if let Some(angle) = self.angle {
            mirror.angle = angle;
        }
    }

    fn apply_target(&self, target: &mut Target) {
        if let Some(accept) = &self.accept {
            target.accept = Some(accept.clone());
        }
    }
}

/// A single editor command, for UI code that dispatches edits as values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EditAction {
    Add { kind: EntityKind, x: i32, y: i32 },
    Remove { id: String },
    Patch { id: String, patch: EntityPatch },
    Move { id: String, x: i32, y: i32 },
    SetInventory { count: f64 },
}

/// Applies an [`EditAction`] to `level`.
pub fn apply(level: &mut LevelV2, action: EditAction) -> EditOutcome {
    match action {
        EditAction::Add { kind, x, y } => add_entity(level, kind, x, y),
        EditAction::Remove { id } => remove_entity(level, &id),
        EditAction::Patch { id, patch } => patch_entity(level, &id, &patch),
        EditAction::Move { id, x, y } => move_entity(level, &id, x, y),
        EditAction::SetInventory { count } => {
            let stored = set_inventory(level, count);
            EditOutcome::Applied {
                id: format!("inventory.mirror={stored}"),
            }
        }
    }
}

/// Places a new entity with default properties on the clamped cell.
///
/// Lasers, walls and targets join `fixed`; mirrors join the editable
/// solution pool.
pub fn add_entity(level: &mut LevelV2, kind: EntityKind, x: i32, y: i32) -> EditOutcome {
    let (x, y) = level.grid.clamp(x, y);
    if level.occupant(x, y, None).is_some() {
        return EditOutcome::Ignored(Rejection::Occupied);
    }

    let id = level.next_id(kind.id_prefix());
    match kind {
        EntityKind::Laser => level.fixed.push(FixedEntity::Laser(Laser {
            id: id.clone(),
            x,
            y,
            dir: Dir::E,
            color: Some(Color::R),
        })),
        EntityKind::Wall => level.fixed.push(FixedEntity::Wall(Wall { id: id.clone(), x, y })),
        EntityKind::Target => level.fixed.push(FixedEntity::Target(Target {
            id: id.clone(),
            x,
            y,
            accept: Some(vec![Color::R]),
        })),
        EntityKind::Mirror => level.solution_mut().push(Mirror {
            id: id.clone(),
            x,
            y,
            angle: MirrorAngle::Deg45,
        }),
    }

    tracing::trace!(%id, x, y, "entity added");
    EditOutcome::Applied { id }
}

/// Removes `id` from whichever pool holds it.
pub fn remove_entity(level: &mut LevelV2, id: &str) -> EditOutcome {
    let before = level.placed().count();

    level.fixed.retain(|e| e.id() != id);
    if let Some(initial) = level.initial_player.as_mut() {
        initial.retain(|m| m.id != id);
    }
    if let Some(solution) = level.dev.as_mut().and_then(|dev| dev.solution.as_mut()) {
        solution.retain(|m| m.id != id);
    }

    if level.placed().count() == before {
        EditOutcome::Ignored(Rejection::UnknownId)
    } else {
        EditOutcome::Applied { id: id.to_string() }
    }
}

/// Mutable handle to an entity wherever it lives.
enum Slot<'a> {
    Fixed(&'a mut FixedEntity),
    Mirror(&'a mut Mirror),
}

impl Slot<'_> {
    fn placed_mut(&mut self) -> &mut dyn Placed {
        match self {
            Slot::Fixed(entity) => &mut **entity,
            Slot::Mirror(mirror) => &mut **mirror,
        }
    }
}

fn locate<'a>(level: &'a mut LevelV2, id: &str) -> Option<Slot<'a>> {
    if let Some(entity) = level.fixed.iter_mut().find(|e| e.id() == id) {
        return Some(Slot::Fixed(entity));
    }
    if let Some(mirror) = level
        .initial_player
        .iter_mut()
        .flatten()
        .find(|m| m.id == id)
    {
        return Some(Slot::Mirror(mirror));
    }
    level
        .dev
        .iter_mut()
        .filter_map(|dev| dev.solution.as_mut())
        .flatten()
        .find(|m| m.id == id)
        .map(Slot::Mirror)
}

/// Shallow-merges `patch` onto the entity with `id` in any pool.
pub fn patch_entity(level: &mut LevelV2, id: &str, patch: &EntityPatch) -> EditOutcome {
    let Some(slot) = locate(level, id) else {
        return EditOutcome::Ignored(Rejection::UnknownId);
    };

    match slot {
        Slot::Fixed(FixedEntity::Laser(laser)) => patch.apply_laser(laser),
        Slot::Fixed(FixedEntity::Target(target)) => patch.apply_target(target),
        Slot::Fixed(FixedEntity::Wall(_)) => {}
        Slot::Mirror(mirror) => patch.apply_mirror(mirror),
    }

    EditOutcome::Applied { id: id.to_string() }
}

/// Moves `id` to the clamped destination unless another entity sits there.
pub fn move_entity(level: &mut LevelV2, id: &str, x: i32, y: i32) -> EditOutcome {
    let (x, y) = level.grid.clamp(x, y);
    if !level.contains_id(id) {
        return EditOutcome::Ignored(Rejection::UnknownId);
    }
    if level.occupant(x, y, Some(id)).is_some() {
        return EditOutcome::Ignored(Rejection::Occupied);
    }

    if let Some(mut slot) = locate(level, id) {
        slot.placed_mut().set_cell(x, y);
    }
    EditOutcome::Applied { id: id.to_string() }
}

/// Snaps any integer angle to the nearest supported mirror orientation.
pub fn normalize_angle(degrees: i32) -> MirrorAngle {
    MirrorAngle::nearest(degrees)
}

/// Turns mirror `id` a quarter clockwise. Non-mirror ids are ignored.
pub fn rotate_mirror(level: &mut LevelV2, id: &str) -> EditOutcome {
    match locate(level, id) {
        Some(Slot::Mirror(mirror)) => {
            mirror.angle = mirror.angle.rotated();
            EditOutcome::Applied { id: id.to_string() }
        }
        Some(Slot::Fixed(_)) | None => EditOutcome::Ignored(Rejection::UnknownId),
    }
}

/// Stores `floor(count)` clamped at zero as the mirror budget and returns it.
/// Non-finite input (NaN) counts as zero.
pub fn set_inventory(level: &mut LevelV2, count: f64) -> u32 {
    let count = if count.is_nan() { 0.0 } else { count.floor() };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let stored = count.clamp(0.0, f64::from(u32::MAX)) as u32;
    level.inventory.mirror = stored;
    stored
}
