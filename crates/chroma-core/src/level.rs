//! Versioned level schema.
//!
//! Version 1 is the flat `objects[]` shape the engine consumes. Version 2 is
//! the authoring/release shape that separates fixed scenery from the mirror
//! budget, the pre-placed mirrors and the author's reference solution.
//!
//! The structural recognizers [`is_level_v1`] and [`is_level_v2`] only decide
//! which shape a JSON value claims to be; entity-level invariants live in
//! [`crate::edit`] and [`crate::validate`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::migrate::v1_to_v2;

/// Mirror budget assigned when nothing better is known.
pub const DEFAULT_INVENTORY_MIRRORS: u32 = 3;

/// Beam direction of a laser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Dir {
    N,
    E,
    S,
    W,
}

impl Dir {
    /// Cell offset of one step in this direction (y grows downwards).
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::N => (0, -1),
            Self::E => (1, 0),
            Self::S => (0, 1),
            Self::W => (-1, 0),
        }
    }
}

/// Beam color.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Color {
    R,
    G,
    B,
}

#[derive(Debug, Error)]
#[error("mirror angle must be one of 45, 135, 225, 315 (got {0})")]
pub struct InvalidAngle(pub i64);

/// Mirror orientation. Serialized as the bare integer number of degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "i64", into = "i64")]
pub enum MirrorAngle {
    #[default]
    Deg45,
    Deg135,
    Deg225,
    Deg315,
}

impl MirrorAngle {
    pub const ALL: [Self; 4] = [Self::Deg45, Self::Deg135, Self::Deg225, Self::Deg315];

    pub fn degrees(self) -> i32 {
        match self {
            Self::Deg45 => 45,
            Self::Deg135 => 135,
            Self::Deg225 => 225,
            Self::Deg315 => 315,
        }
    }

    /// Snaps an arbitrary angle to the closest allowed orientation.
    ///
    /// Distances are measured around the circle, ties resolve towards the
    /// smaller allowed angle.
    pub fn nearest(degrees: i32) -> Self {
        let v = degrees.rem_euclid(360);
        let mut best = Self::Deg45;
        let mut best_dist = i32::MAX;
        for candidate in Self::ALL {
            let raw = (v - candidate.degrees()).abs();
            let dist = raw.min(360 - raw);
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
        best
    }

    /// Quarter turn clockwise.
    pub fn rotated(self) -> Self {
        Self::nearest(self.degrees() + 90)
    }
}

impl TryFrom<i64> for MirrorAngle {
    type Error = InvalidAngle;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            45 => Ok(Self::Deg45),
            135 => Ok(Self::Deg135),
            225 => Ok(Self::Deg225),
            315 => Ok(Self::Deg315),
            other => Err(InvalidAngle(other)),
        }
    }
}

impl From<MirrorAngle> for i64 {
    fn from(angle: MirrorAngle) -> Self {
        i64::from(angle.degrees())
    }
}

/// Playfield dimensions in cells.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub w: i32,
    pub h: i32,
    pub cell_size: i32,
}

impl Grid {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (0..self.w).contains(&x) && (0..self.h).contains(&y)
    }

    /// Clamps a coordinate pair into `[0,w) x [0,h)`.
    pub fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        (x.clamp(0, (self.w - 1).max(0)), y.clamp(0, (self.h - 1).max(0)))
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            w: 20,
            h: 12,
            cell_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Laser {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub dir: Dir,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mirror {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub angle: MirrorAngle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wall {
    pub id: String,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub x: i32,
    pub y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<Color>>,
}

/// Anything that sits on exactly one grid cell under a level-unique id.
pub trait Placed {
    fn id(&self) -> &str;
    fn cell(&self) -> (i32, i32);
    fn set_cell(&mut self, x: i32, y: i32);
}

macro_rules! impl_placed {
    ($($ty:ty),*) => {
        $(
            impl Placed for $ty {
                fn id(&self) -> &str {
                    &self.id
                }

                fn cell(&self) -> (i32, i32) {
                    (self.x, self.y)
                }

                fn set_cell(&mut self, x: i32, y: i32) {
                    self.x = x;
                    self.y = y;
                }
            }
        )*
    };
}

impl_placed!(Laser, Mirror, Wall, Target);

/// Entity kinds that can be placed in the editor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Laser,
    Mirror,
    Wall,
    Target,
}

impl EntityKind {
    /// Prefix used when synthesizing ids for this kind.
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::Laser => "L",
            Self::Mirror => "M",
            Self::Wall => "W",
            Self::Target => "T",
        }
    }
}

/// A version-1 object: any entity kind in one flat pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entity {
    Laser(Laser),
    Mirror(Mirror),
    Wall(Wall),
    Target(Target),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Laser(_) => EntityKind::Laser,
            Self::Mirror(_) => EntityKind::Mirror,
            Self::Wall(_) => EntityKind::Wall,
            Self::Target(_) => EntityKind::Target,
        }
    }

    pub fn is_laser(&self) -> bool {
        matches!(self, Self::Laser(_))
    }

    fn placed(&self) -> &dyn Placed {
        match self {
            Self::Laser(e) => e,
            Self::Mirror(e) => e,
            Self::Wall(e) => e,
            Self::Target(e) => e,
        }
    }

    fn placed_mut(&mut self) -> &mut dyn Placed {
        match self {
            Self::Laser(e) => e,
            Self::Mirror(e) => e,
            Self::Wall(e) => e,
            Self::Target(e) => e,
        }
    }
}

/// Immutable scenery of a version-2 level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixedEntity {
    Laser(Laser),
    Wall(Wall),
    Target(Target),
}

impl FixedEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Laser(_) => EntityKind::Laser,
            Self::Wall(_) => EntityKind::Wall,
            Self::Target(_) => EntityKind::Target,
        }
    }

    fn placed(&self) -> &dyn Placed {
        match self {
            Self::Laser(e) => e,
            Self::Wall(e) => e,
            Self::Target(e) => e,
        }
    }

    fn placed_mut(&mut self) -> &mut dyn Placed {
        match self {
            Self::Laser(e) => e,
            Self::Wall(e) => e,
            Self::Target(e) => e,
        }
    }
}

impl From<FixedEntity> for Entity {
    fn from(entity: FixedEntity) -> Self {
        match entity {
            FixedEntity::Laser(e) => Self::Laser(e),
            FixedEntity::Wall(e) => Self::Wall(e),
            FixedEntity::Target(e) => Self::Target(e),
        }
    }
}

macro_rules! delegate_placed {
    ($($ty:ty),*) => {
        $(
            impl Placed for $ty {
                fn id(&self) -> &str {
                    self.placed().id()
                }

                fn cell(&self) -> (i32, i32) {
                    self.placed().cell()
                }

                fn set_cell(&mut self, x: i32, y: i32) {
                    self.placed_mut().set_cell(x, y);
                }
            }
        )*
    };
}

delegate_placed!(Entity, FixedEntity);

/// Serde glue for mirror pools: mirrors are stored as bare [`Mirror`]s in
/// memory but carry `"type": "mirror"` on the wire like every other entity.
mod mirror_pool {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Mirror;

    #[derive(Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum TaggedRef<'a> {
        Mirror(&'a Mirror),
    }

    #[derive(Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum Tagged {
        Mirror(Mirror),
    }

    pub fn serialize<S: Serializer>(pool: &[Mirror], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(pool.iter().map(TaggedRef::Mirror))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Mirror>, D::Error> {
        let tagged = Vec::<Tagged>::deserialize(deserializer)?;
        Ok(tagged
            .into_iter()
            .map(|Tagged::Mirror(mirror)| mirror)
            .collect())
    }

    pub mod optional {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::Mirror;

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            pool: &Option<Vec<Mirror>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match pool {
                Some(pool) => super::serialize(pool, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<Mirror>>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapper(#[serde(deserialize_with = "super::deserialize")] Vec<Mirror>);

            let wrapper = Option::<Wrapper>::deserialize(deserializer)?;
            Ok(wrapper.map(|Wrapper(pool)| pool))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MetaV1 {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Engine-facing level (version 1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelV1 {
    pub version: u8,
    #[serde(default)]
    pub meta: MetaV1,
    pub grid: Grid,
    pub objects: Vec<Entity>,
}

impl LevelV1 {
    pub const VERSION: u8 = 1;

    /// The blank legacy level offered by "new level" flows.
    pub fn template() -> Self {
        Self {
            version: Self::VERSION,
            meta: MetaV1 {
                name: "Level 01".to_string(),
                author: Some("you".to_string()),
            },
            grid: Grid::default(),
            objects: Vec::new(),
        }
    }

    pub fn laser_count(&self) -> usize {
        self.objects.iter().filter(|o| o.is_laser()).count()
    }

    pub fn placed(&self) -> impl Iterator<Item = &dyn Placed> {
        self.objects.iter().map(|o| o as &dyn Placed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MetaV2 {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Inventory {
    #[serde(default)]
    pub mirror: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    #[serde(default)]
    pub move_limit: Option<u32>,
    #[serde(default = "default_true")]
    pub require_all_targets: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            move_limit: None,
            require_all_targets: true,
        }
    }
}

/// Author-only data. Never shipped past a release or play boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DevData {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "mirror_pool::optional"
    )]
    pub solution: Option<Vec<Mirror>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Authoring/release level (version 2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LevelV2 {
    pub version: u8,
    #[serde(default)]
    pub meta: MetaV2,
    pub grid: Grid,
    pub fixed: Vec<FixedEntity>,
    pub inventory: Inventory,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "mirror_pool::optional"
    )]
    pub initial_player: Option<Vec<Mirror>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Rules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<DevData>,
}

impl LevelV2 {
    pub const VERSION: u8 = 2;

    /// The blank authoring level offered by "new level" flows.
    pub fn template() -> Self {
        Self {
            version: Self::VERSION,
            meta: MetaV2 {
                id: Some("l001".to_string()),
                name: "Level 01".to_string(),
                author: Some("you".to_string()),
                difficulty: Some(1),
            },
            grid: Grid::default(),
            fixed: Vec::new(),
            inventory: Inventory {
                mirror: DEFAULT_INVENTORY_MIRRORS,
            },
            initial_player: Some(Vec::new()),
            rules: Some(Rules::default()),
            dev: Some(DevData {
                solution: Some(Vec::new()),
                notes: None,
            }),
        }
    }

    /// Pre-placed mirrors (empty when the pool is absent).
    pub fn initial_mirrors(&self) -> &[Mirror] {
        self.initial_player.as_deref().unwrap_or_default()
    }

    /// The author's reference solution (empty when absent or stripped).
    pub fn solution(&self) -> &[Mirror] {
        self.dev
            .as_ref()
            .and_then(|dev| dev.solution.as_deref())
            .unwrap_or_default()
    }

    /// The editable mirror pool, created on demand.
    pub fn solution_mut(&mut self) -> &mut Vec<Mirror> {
        self.dev
            .get_or_insert_with(DevData::default)
            .solution
            .get_or_insert_with(Vec::new)
    }

    /// Every entity across `fixed`, `initialPlayer` and `dev.solution`, in
    /// that order.
    pub fn placed(&self) -> impl Iterator<Item = &dyn Placed> {
        self.fixed
            .iter()
            .map(|e| e as &dyn Placed)
            .chain(self.initial_mirrors().iter().map(|m| m as &dyn Placed))
            .chain(self.solution().iter().map(|m| m as &dyn Placed))
    }

    /// Id of the entity on `(x, y)`, ignoring `except`.
    pub fn occupant(&self, x: i32, y: i32, except: Option<&str>) -> Option<&str> {
        self.placed()
            .find(|e| e.cell() == (x, y) && Some(e.id()) != except)
            .map(Placed::id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.placed().any(|e| e.id() == id)
    }

    /// Smallest unused `<prefix><n>` id, `n` starting at 1.
    pub fn next_id(&self, prefix: &str) -> String {
        next_free_id(prefix, self.placed().map(Placed::id))
    }
}

pub(crate) fn next_free_id<'a>(prefix: &str, taken: impl Iterator<Item = &'a str>) -> String {
    let taken: std::collections::HashSet<&str> = taken.collect();
    (1..)
        .map(|n| format!("{prefix}{n}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| prefix.to_string())
}

#[derive(Error, Debug)]
pub enum LevelError {
    #[error("invalid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("JSON is valid, but not a level (missing version/grid/objects or fixed/inventory)")]
    Unrecognized,

    #[error("level v{version} does not match its schema: {source}")]
    Schema {
        version: u8,
        #[source]
        source: serde_json::Error,
    },
}

/// A parsed level of either version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyLevel {
    V1(LevelV1),
    V2(LevelV2),
}

impl AnyLevel {
    /// Migrates version 1 input; version 2 passes through.
    pub fn into_v2(self) -> LevelV2 {
        match self {
            Self::V1(level) => v1_to_v2(&level),
            Self::V2(level) => level,
        }
    }
}

fn positive_int(value: Option<&Value>) -> bool {
    value.and_then(Value::as_i64).is_some_and(|n| n > 0)
}

fn has_grid(value: &Value) -> bool {
    let Some(grid) = value.get("grid").filter(|g| g.is_object()) else {
        return false;
    };
    positive_int(grid.get("w")) && positive_int(grid.get("h")) && positive_int(grid.get("cellSize"))
}

fn has_version(value: &Value, version: u8) -> bool {
    value.get("version").and_then(Value::as_u64) == Some(u64::from(version))
}

/// Shape check for a version-1 level. Never fails, only answers.
pub fn is_level_v1(value: &Value) -> bool {
    has_version(value, LevelV1::VERSION)
        && has_grid(value)
        && value.get("objects").is_some_and(Value::is_array)
}

/// Shape check for a version-2 level. Never fails, only answers.
pub fn is_level_v2(value: &Value) -> bool {
    has_version(value, LevelV2::VERSION)
        && has_grid(value)
        && value.get("fixed").is_some_and(Value::is_array)
        && value.get("inventory").is_some_and(Value::is_object)
}

/// Routes a JSON value to the matching version and decodes it.
pub fn level_from_value(value: Value) -> Result<AnyLevel, LevelError> {
    if is_level_v2(&value) {
        serde_json::from_value(value)
            .map(AnyLevel::V2)
            .map_err(|source| LevelError::Schema {
                version: LevelV2::VERSION,
                source,
            })
    } else if is_level_v1(&value) {
        serde_json::from_value(value)
            .map(AnyLevel::V1)
            .map_err(|source| LevelError::Schema {
                version: LevelV1::VERSION,
                source,
            })
    } else {
        Err(LevelError::Unrecognized)
    }
}

pub fn parse_level(text: &str) -> Result<AnyLevel, LevelError> {
    let value: Value = serde_json::from_str(text).map_err(LevelError::Syntax)?;
    level_from_value(value)
}

/// Parses either version and returns the session's version-2 form.
pub fn load_for_editing(text: &str) -> Result<LevelV2, LevelError> {
    parse_level(text).map(AnyLevel::into_v2)
}

/// Formatting-insensitive form of a JSON document, `None` if it is not JSON.
pub fn canonicalize(text: &str) -> Option<String> {
    serde_json::from_str::<Value>(text)
        .ok()
        .map(|value| value.to_string())
}

/// Two-space indented JSON, the on-disk format for saved levels.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_recognizers_route_by_version() {
        let v1 = json!({
            "version": 1,
            "meta": { "name": "a" },
            "grid": { "w": 5, "h": 5, "cellSize": 32 },
            "objects": []
        });
        let v2 = json!({
            "version": 2,
            "meta": { "name": "a" },
            "grid": { "w": 5, "h": 5, "cellSize": 32 },
            "fixed": [],
            "inventory": {}
        });

        assert!(is_level_v1(&v1));
        assert!(!is_level_v2(&v1));
        assert!(is_level_v2(&v2));
        assert!(!is_level_v1(&v2));
    }

    #[test]
    fn test_recognizers_reject_bad_shapes() {
        assert!(!is_level_v1(&json!(null)));
        assert!(!is_level_v1(&json!([1, 2])));
        assert!(!is_level_v1(&json!({ "version": 1, "grid": { "w": 0, "h": 5, "cellSize": 32 }, "objects": [] })));
        assert!(!is_level_v1(&json!({ "version": 1, "grid": { "w": 2.5, "h": 5, "cellSize": 32 }, "objects": [] })));
        assert!(!is_level_v1(&json!({ "version": 1, "grid": { "w": 5, "h": 5, "cellSize": 32 }, "objects": {} })));
        assert!(!is_level_v2(&json!({ "version": 2, "grid": { "w": 5, "h": 5, "cellSize": 32 }, "fixed": [], "inventory": 3 })));
        assert!(!is_level_v2(&json!({ "version": "2", "grid": { "w": 5, "h": 5, "cellSize": 32 }, "fixed": [], "inventory": {} })));
    }

    #[test]
    fn test_v2_wire_format() {
        let json = r#"{
            "version": 2,
            "meta": { "name": "Wire" },
            "grid": { "w": 5, "h": 5, "cellSize": 32 },
            "fixed": [
                { "id": "L1", "type": "laser", "x": 0, "y": 2, "dir": "E", "color": "R" },
                { "id": "T1", "type": "target", "x": 4, "y": 2, "accept": ["R"] }
            ],
            "inventory": { "mirror": 0 },
            "initialPlayer": [ { "id": "M2", "type": "mirror", "x": 1, "y": 1, "angle": 135 } ],
            "dev": { "solution": [ { "id": "M1", "type": "mirror", "x": 2, "y": 2, "angle": 45 } ] }
        }"#;

        let level = match parse_level(json).expect("parse") {
            AnyLevel::V2(level) => level,
            AnyLevel::V1(_) => panic!("expected v2"),
        };

        assert_eq!(level.fixed.len(), 2);
        assert_eq!(level.initial_mirrors()[0].angle, MirrorAngle::Deg135);
        assert_eq!(level.solution()[0].id, "M1");
        assert!(level.rules.is_none());

        let back: Value = serde_json::to_value(&level).expect("serialize");
        assert_eq!(back["initialPlayer"][0]["type"], "mirror");
        assert_eq!(back["dev"]["solution"][0]["angle"], 45);
        assert_eq!(back["grid"]["cellSize"], 32);
        assert!(back.get("rules").is_none());
    }

    #[test]
    fn test_schema_errors_are_reported() {
        let bad_angle = r#"{
            "version": 1,
            "meta": { "name": "x" },
            "grid": { "w": 5, "h": 5, "cellSize": 32 },
            "objects": [ { "id": "M1", "type": "mirror", "x": 0, "y": 0, "angle": 90 } ]
        }"#;
        assert!(matches!(
            parse_level(bad_angle),
            Err(LevelError::Schema { version: 1, .. })
        ));
        assert!(matches!(parse_level("{ nope"), Err(LevelError::Syntax(_))));
        assert!(matches!(parse_level("{}"), Err(LevelError::Unrecognized)));
    }

    #[test]
    fn test_mirror_pool_rejects_other_kinds() {
        let json = r#"{
            "version": 2,
            "meta": { "name": "x" },
            "grid": { "w": 5, "h": 5, "cellSize": 32 },
            "fixed": [],
            "inventory": {},
            "initialPlayer": [ { "id": "W1", "type": "wall", "x": 0, "y": 0 } ]
        }"#;
        assert!(parse_level(json).is_err());
    }

    #[test]
    fn test_template_roundtrip() {
        let template = LevelV2::template();
        let text = to_pretty_json(&template).expect("serialize");
        let loaded = load_for_editing(&text).expect("load");
        assert_eq!(loaded, template);
        assert_eq!(loaded.inventory.mirror, DEFAULT_INVENTORY_MIRRORS);
        assert!(text.contains("\"moveLimit\": null"));
    }

    #[test]
    fn test_next_id_fills_gaps_across_pools() {
        let mut level = LevelV2::template();
        level.fixed.push(FixedEntity::Wall(Wall { id: "W1".into(), x: 0, y: 0 }));
        level.fixed.push(FixedEntity::Wall(Wall { id: "W3".into(), x: 1, y: 0 }));
        level.solution_mut().push(Mirror {
            id: "W2".into(),
            x: 2,
            y: 0,
            angle: MirrorAngle::Deg45,
        });

        assert_eq!(level.next_id("W"), "W4");
        assert_eq!(level.next_id("L"), "L1");
    }

    #[test]
    fn test_nearest_angle() {
        assert_eq!(MirrorAngle::nearest(0), MirrorAngle::Deg45);
        assert_eq!(MirrorAngle::nearest(100), MirrorAngle::Deg135);
        assert_eq!(MirrorAngle::nearest(-45), MirrorAngle::Deg315);
        assert_eq!(MirrorAngle::nearest(405), MirrorAngle::Deg45);
        assert_eq!(MirrorAngle::Deg315.rotated(), MirrorAngle::Deg45);
        assert_eq!(MirrorAngle::Deg45.rotated(), MirrorAngle::Deg135);
    }

    #[test]
    fn test_canonicalize_ignores_formatting() {
        let a = "{\"b\":1,\"a\":[1,2]}";
        let b = "{\n  \"a\": [1, 2],\n  \"b\": 1\n}";
        assert_eq!(canonicalize(a), canonicalize(b));
        assert_eq!(canonicalize("not json"), None);
    }

    #[test]
    fn test_grid_clamp() {
        let grid = Grid { w: 5, h: 4, cell_size: 32 };
        assert_eq!(grid.clamp(-3, 99), (0, 3));
        assert_eq!(grid.clamp(2, 1), (2, 1));
        assert!(grid.contains(4, 3));
        assert!(!grid.contains(5, 0));
    }
}
