//! Entity categories and positional primitives.

use serde::Deserialize;

/// Discriminant values at or above this are gameplay-relevant entities.
pub const REAL_ENTITY_THRESHOLD: u16 = 100;

/// Entity category.
///
/// Values below [`REAL_ENTITY_THRESHOLD`] are structural: errors,
/// effects, terrain and other objects no consumer cares about once gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[repr(u16)]
pub enum EntityType {
    Error = 0,
    None = 1,
    Effect = 2,
    Terrain = 3,
    MiscellaneousObjects = 4,
    Light = 5,
    Chest = 100,
    Monster = 101,
    Npc = 102,
    Player = 103,
    WorldItem = 104,
    Shrine = 105,
    AreaTransition = 106,
    Portal = 107,
    Waypoint = 108,
    Stash = 109,
    Door = 110,
    QuestObject = 111,
    IngameIcon = 112,
}

impl EntityType {
    #[must_use]
    pub fn discriminant(self) -> u16 {
        self as u16
    }

    /// Gameplay-relevant (as opposed to structural/error/misc).
    #[must_use]
    pub fn is_real_entity(self) -> bool {
        self.discriminant() >= REAL_ENTITY_THRESHOLD
    }

    /// Decode a raw discriminant. Unknown values map to [`EntityType::Error`].
    #[must_use]
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            1 => Self::None,
            2 => Self::Effect,
            3 => Self::Terrain,
            4 => Self::MiscellaneousObjects,
            5 => Self::Light,
            100 => Self::Chest,
            101 => Self::Monster,
            102 => Self::Npc,
            103 => Self::Player,
            104 => Self::WorldItem,
            105 => Self::Shrine,
            106 => Self::AreaTransition,
            107 => Self::Portal,
            108 => Self::Waypoint,
            109 => Self::Stash,
            110 => Self::Door,
            111 => Self::QuestObject,
            112 => Self::IngameIcon,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// League mechanic an entity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[repr(u8)]
pub enum LeagueType {
    #[default]
    General = 0,
    Delve = 1,
    Harvest = 2,
    Heist = 3,
    Expedition = 4,
    Legion = 5,
    Breach = 6,
    Blight = 7,
}

impl LeagueType {
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Delve,
            2 => Self::Harvest,
            3 => Self::Heist,
            4 => Self::Expedition,
            5 => Self::Legion,
            6 => Self::Breach,
            7 => Self::Blight,
            _ => Self::General,
        }
    }
}

/// Position on the area grid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridPos {
    pub x: f32,
    pub y: f32,
}

impl GridPos {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// A position that was never resolved: the zero sentinel, or a
    /// coordinate that is NaN or infinite.
    #[must_use]
    pub fn is_unresolved(self) -> bool {
        !self.x.is_finite() || !self.y.is_finite() || (self.x == 0.0 && self.y == 0.0)
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::fmt::Display for GridPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}
