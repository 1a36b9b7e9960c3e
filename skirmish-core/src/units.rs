//! Unit archetypes, spells and the shared catalog

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::board::Point;

/// Unit identifier (also the grid occupant id)
pub type UnitId = u32;

/// Side a unit fights for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub fn opponent(self) -> Self {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Player one maximizes the heuristic, player two minimizes it
    pub fn is_maximizing(self) -> bool {
        self == Player::One
    }
}

/// Spell definition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spell {
    pub name: String,
    pub damage: i32,
    pub range: u32,
}

/// Unit template shared by every unit of the same kind
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archetype {
    pub name: String,
    pub max_health: i32,
    /// Armor class: difficulty to hit this unit
    pub armor_class: i32,
    /// Weapon class: bonus on this unit's attack rolls
    pub weapon_class: i32,
    pub attack_damage: i32,
    pub speed: u32,
    pub spells: Vec<String>,
}

impl Archetype {
    pub fn knows_spell(&self, name: &str) -> bool {
        self.spells.iter().any(|s| s == name)
    }
}

/// Immutable lookup of archetypes and spells, loaded once per run
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    archetypes: BTreeMap<String, Arc<Archetype>>,
    spells: BTreeMap<String, Arc<Spell>>,
}

impl Catalog {
    pub fn new(archetypes: Vec<Archetype>, spells: Vec<Spell>) -> Self {
        Self {
            archetypes: archetypes
                .into_iter()
                .map(|a| (a.name.clone(), Arc::new(a)))
                .collect(),
            spells: spells
                .into_iter()
                .map(|s| (s.name.clone(), Arc::new(s)))
                .collect(),
        }
    }

    pub fn archetype(&self, name: &str) -> Option<&Arc<Archetype>> {
        self.archetypes.get(name)
    }

    pub fn spell(&self, name: &str) -> Option<&Arc<Spell>> {
        self.spells.get(name)
    }

    pub fn archetypes(&self) -> impl Iterator<Item = &Arc<Archetype>> + '_ {
        self.archetypes.values()
    }

    pub fn spells(&self) -> impl Iterator<Item = &Arc<Spell>> + '_ {
        self.spells.values()
    }

    /// Strongest single hit an archetype can deal (weapon or best spell)
    pub fn peak_damage(&self, archetype: &Archetype) -> i32 {
        archetype
            .spells
            .iter()
            .filter_map(|name| self.spell(name))
            .map(|spell| spell.damage)
            .fold(archetype.attack_damage, i32::max)
    }
}

// ============================================================================
// UNIT STATE
// ============================================================================

/// Whether a unit is on the board
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitStatus {
    Alive(Point),
    Dead,
}

/// Per-game record of one unit; kept after death
#[derive(Clone, Debug)]
pub struct UnitState {
    pub id: UnitId,
    pub owner: Player,
    pub archetype: Arc<Archetype>,
    pub health: i32,
    pub status: UnitStatus,
}

impl UnitState {
    pub fn new(id: UnitId, owner: Player, archetype: Arc<Archetype>, position: Point) -> Self {
        Self {
            id,
            owner,
            health: archetype.max_health,
            archetype,
            status: UnitStatus::Alive(position),
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.status, UnitStatus::Alive(_))
    }

    pub fn position(&self) -> Option<Point> {
        match self.status {
            UnitStatus::Alive(p) => Some(p),
            UnitStatus::Dead => None,
        }
    }

    pub fn name(&self) -> &str {
        &self.archetype.name
    }
}
