//! Structural invariant checks for whole levels.
//!
//! Mutators in [`crate::edit`] keep these invariants by construction; the
//! checks here are for levels arriving from text, where nothing is promised.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::level::{Grid, LevelV1, LevelV2, Placed};

/// First invariant violation found in a level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("grid size must be > 0 (got {w}x{h}, cell size {cell_size})")]
    EmptyGrid { w: i32, h: i32, cell_size: i32 },

    #[error("object with empty id at ({x},{y})")]
    EmptyId { x: i32, y: i32 },

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("object {id} out of bounds: ({x},{y})")]
    OutOfBounds { id: String, x: i32, y: i32 },

    #[error("{first} and {second} share the same cell: ({x},{y})")]
    SharedCell {
        first: String,
        second: String,
        x: i32,
        y: i32,
    },
}

fn check<'a>(grid: &Grid, entities: impl Iterator<Item = &'a dyn Placed>) -> Result<(), Violation> {
    if grid.w <= 0 || grid.h <= 0 || grid.cell_size <= 0 {
        return Err(Violation::EmptyGrid {
            w: grid.w,
            h: grid.h,
            cell_size: grid.cell_size,
        });
    }

    let mut ids = HashSet::new();
    let mut cells: HashMap<(i32, i32), &str> = HashMap::new();

    for entity in entities {
        let (x, y) = entity.cell();
        let id = entity.id();
        if id.is_empty() {
            return Err(Violation::EmptyId { x, y });
        }
        if !ids.insert(id) {
            return Err(Violation::DuplicateId(id.to_string()));
        }
        if !grid.contains(x, y) {
            return Err(Violation::OutOfBounds {
                id: id.to_string(),
                x,
                y,
            });
        }
        if let Some(first) = cells.insert((x, y), id) {
            return Err(Violation::SharedCell {
                first: first.to_string(),
                second: id.to_string(),
                x,
                y,
            });
        }
    }

    Ok(())
}

impl LevelV1 {
    pub fn validate(&self) -> Result<(), Violation> {
        check(&self.grid, self.placed())
    }
}

impl LevelV2 {
    /// Checks ids and cells across `fixed`, `initialPlayer` and
    /// `dev.solution` together.
    pub fn validate(&self) -> Result<(), Violation> {
        check(&self.grid, self.placed())
    }
}
