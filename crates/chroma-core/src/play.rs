//! Player-side session over a released level.
//!
//! The player sees the fixed scenery and the pre-placed mirrors and may add
//! up to `inventory.mirror` pieces of their own. Pre-placed mirrors count
//! against the budget but stay locked, like the scenery.

use std::collections::HashSet;

use crate::edit::{EditOutcome, Rejection};
use crate::level::{LevelV1, LevelV2, Mirror, MirrorAngle, Placed, next_free_id};
use crate::migrate::{EngineVariant, strip_dev, v2_to_engine_v1};

/// Id prefix of mirrors placed during play.
pub const PLAYER_MIRROR_PREFIX: &str = "PM";

#[derive(Debug, Clone)]
pub struct PlaySession {
    level: LevelV2,
    pool: Vec<Mirror>,
    locked: HashSet<String>,
}

impl PlaySession {
    /// Starts a session. Author-only data is dropped even if present.
    pub fn new(level: &LevelV2) -> Self {
        let level = strip_dev(level);
        let pool = level.initial_mirrors().to_vec();
        let locked = level
            .placed()
            .map(|e| e.id().to_string())
            .collect();
        Self {
            level,
            pool,
            locked,
        }
    }

    pub fn level(&self) -> &LevelV2 {
        &self.level
    }

    /// Every mirror the player currently has on the board, pre-placed ones
    /// first.
    pub fn pool(&self) -> &[Mirror] {
        &self.pool
    }

    /// Mirrors the player placed in this session.
    pub fn placements(&self) -> Vec<Mirror> {
        self.pool
            .iter()
            .filter(|m| !self.locked.contains(&m.id))
            .cloned()
            .collect()
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.locked.contains(id)
    }

    pub fn used(&self) -> u32 {
        u32::try_from(self.pool.len()).unwrap_or(u32::MAX)
    }

    pub fn remaining(&self) -> u32 {
        self.level.inventory.mirror.saturating_sub(self.used())
    }

    /// What the engine should simulate right now.
    pub fn engine_level(&self) -> LevelV1 {
        v2_to_engine_v1(&self.level, EngineVariant::Play(&self.placements()))
    }

    fn occupant(&self, x: i32, y: i32, except: Option<&str>) -> Option<String> {
        self.engine_level()
            .objects
            .iter()
            .find(|e| e.cell() == (x, y) && Some(e.id()) != except)
            .map(|e| e.id().to_string())
    }

    /// Drops a new mirror at 45 degrees on the clamped cell.
    pub fn place_mirror(&mut self, x: i32, y: i32) -> EditOutcome {
        if self.remaining() == 0 {
            return EditOutcome::Ignored(Rejection::NoBudget);
        }
        let (x, y) = self.level.grid.clamp(x, y);
        if self.occupant(x, y, None).is_some() {
            return EditOutcome::Ignored(Rejection::Occupied);
        }

        let engine = self.engine_level();
        let id = next_free_id(PLAYER_MIRROR_PREFIX, engine.objects.iter().map(Placed::id));
        self.pool.push(Mirror {
            id: id.clone(),
            x,
            y,
            angle: MirrorAngle::Deg45,
        });
        EditOutcome::Applied { id }
    }

    fn unlocked_mut(&mut self, id: &str) -> Result<&mut Mirror, Rejection> {
        if self.locked.contains(id) {
            return Err(Rejection::Locked);
        }
        self.pool
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(Rejection::UnknownId)
    }

    /// Turns a placed mirror a quarter clockwise.
    pub fn rotate(&mut self, id: &str) -> EditOutcome {
        match self.unlocked_mut(id) {
            Ok(mirror) => {
                mirror.angle = mirror.angle.rotated();
                EditOutcome::Applied { id: id.to_string() }
            }
            Err(reason) => EditOutcome::Ignored(reason),
        }
    }

    pub fn move_mirror(&mut self, id: &str, x: i32, y: i32) -> EditOutcome {
        let (x, y) = self.level.grid.clamp(x, y);
        if let Err(reason) = self.unlocked_mut(id) {
            return EditOutcome::Ignored(reason);
        }
        if self.occupant(x, y, Some(id)).is_some() {
            return EditOutcome::Ignored(Rejection::Occupied);
        }
        match self.unlocked_mut(id) {
            Ok(mirror) => {
                mirror.set_cell(x, y);
                EditOutcome::Applied { id: id.to_string() }
            }
            Err(reason) => EditOutcome::Ignored(reason),
        }
    }

    pub fn remove(&mut self, id: &str) -> EditOutcome {
        if let Err(reason) = self.unlocked_mut(id) {
            return EditOutcome::Ignored(reason);
        }
        self.pool.retain(|m| m.id != id);
        EditOutcome::Applied { id: id.to_string() }
    }

    /// Puts the board back to its starting state.
    pub fn reset(&mut self) {
        self.pool = self.level.initial_mirrors().to_vec();
    }
}
