//! Conversions between level versions and the release boundary.

use crate::level::{
    DEFAULT_INVENTORY_MIRRORS, DevData, Entity, FixedEntity, Inventory, LevelV1, LevelV2, MetaV1,
    MetaV2, Mirror, Rules,
};

/// Which mirror pool the engine should see next to the fixed scenery.
#[derive(Debug, Clone, Copy)]
pub enum EngineVariant<'a> {
    /// `fixed + initialPlayer + dev.solution`: the editor always simulates
    /// the author's reference solution.
    Editor,
    /// `fixed + initialPlayer + <placements>`: what the player actually put
    /// down. The solution is never included.
    Play(&'a [Mirror]),
}

/// Lifts a legacy level into the authoring shape.
///
/// Version 1 has no notion of player pieces, so every mirror is taken to be
/// the answer and lands in `dev.solution`; the rest becomes fixed scenery.
pub fn v1_to_v2(level: &LevelV1) -> LevelV2 {
    let mut fixed = Vec::new();
    let mut mirrors = Vec::new();

    for object in &level.objects {
        match object.clone() {
            Entity::Mirror(mirror) => mirrors.push(mirror),
            Entity::Laser(laser) => fixed.push(FixedEntity::Laser(laser)),
            Entity::Wall(wall) => fixed.push(FixedEntity::Wall(wall)),
            Entity::Target(target) => fixed.push(FixedEntity::Target(target)),
        }
    }

    let mirror_budget = if mirrors.is_empty() {
        DEFAULT_INVENTORY_MIRRORS
    } else {
        u32::try_from(mirrors.len()).unwrap_or(u32::MAX)
    };

    LevelV2 {
        version: LevelV2::VERSION,
        meta: MetaV2 {
            id: None,
            name: level.meta.name.clone(),
            author: level.meta.author.clone(),
            difficulty: Some(1),
        },
        grid: level.grid,
        fixed,
        inventory: Inventory {
            mirror: mirror_budget,
        },
        initial_player: Some(Vec::new()),
        rules: Some(Rules::default()),
        dev: Some(DevData {
            solution: Some(mirrors),
            notes: None,
        }),
    }
}

/// Flattens an authoring level into the engine's input contract.
pub fn v2_to_engine_v1(level: &LevelV2, variant: EngineVariant<'_>) -> LevelV1 {
    let mirrors = match variant {
        EngineVariant::Editor => level.solution(),
        EngineVariant::Play(placed) => placed,
    };

    let objects = level
        .fixed
        .iter()
        .cloned()
        .map(Entity::from)
        .chain(level.initial_mirrors().iter().cloned().map(Entity::Mirror))
        .chain(mirrors.iter().cloned().map(Entity::Mirror))
        .collect();

    LevelV1 {
        version: LevelV1::VERSION,
        meta: MetaV1 {
            name: level.meta.name.clone(),
            author: level.meta.author.clone(),
        },
        grid: level.grid,
        objects,
    }
}

/// Copy of `level` without any author-only data.
///
/// Must be applied before a level crosses a release or play boundary,
/// otherwise the reference solution ships to players.
pub fn strip_dev(level: &LevelV2) -> LevelV2 {
    LevelV2 {
        dev: None,
        ..level.clone()
    }
}
