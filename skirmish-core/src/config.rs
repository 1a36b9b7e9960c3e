//! Fixture loading: grid settings, spells and unit archetypes

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::units::{Archetype, Catalog, Spell};

/// Default grid width
pub const DEFAULT_WIDTH: u32 = 17;

/// Default grid height
pub const DEFAULT_HEIGHT: u32 = 24;

/// Cell layout of the grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Square,
    #[default]
    Hex,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub topology: Layout,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            topology: Layout::Hex,
        }
    }
}

/// Unit archetype as written in fixtures
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    pub health: i32,
    #[serde(rename = "AC")]
    pub armor_class: i32,
    #[serde(rename = "WC")]
    pub weapon_class: i32,
    pub attack_damage: i32,
    pub speed: u32,
    #[serde(default)]
    pub spells: Vec<String>,
}

impl From<&UnitConfig> for Archetype {
    fn from(unit: &UnitConfig) -> Self {
        Archetype {
            name: unit.name.clone(),
            max_health: unit.health,
            armor_class: unit.armor_class,
            weapon_class: unit.weapon_class,
            attack_damage: unit.attack_damage,
            speed: unit.speed,
            spells: unit.spells.clone(),
        }
    }
}

/// Everything a game needs besides the armies
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub spells: Vec<Spell>,
    pub units: Vec<UnitConfig>,
}

impl GameConfig {
    /// Load and validate a JSON fixture file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_json_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        tracing::info!(
            "Loaded {} units and {} spells from {}",
            config.units.len(),
            config.spells.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(content).context("Malformed config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Save to JSON file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.grid.width == 0 || self.grid.height == 0 {
            bail!("grid must be at least 1x1, got {}x{}", self.grid.width, self.grid.height);
        }

        let mut spell_names = BTreeSet::new();
        for spell in &self.spells {
            if spell.name.is_empty() {
                bail!("spell with empty name");
            }
            if !spell_names.insert(spell.name.as_str()) {
                bail!("duplicate spell {:?}", spell.name);
            }
        }

        let mut unit_names = BTreeSet::new();
        for unit in &self.units {
            if unit.name.is_empty() {
                bail!("unit with empty name");
            }
            if !unit_names.insert(unit.name.as_str()) {
                bail!("duplicate unit {:?}", unit.name);
            }
            if unit.health <= 0 {
                bail!("unit {:?} has non-positive health {}", unit.name, unit.health);
            }
            if let Some(missing) = unit.spells.iter().find(|s| !spell_names.contains(s.as_str())) {
                bail!("unit {:?} knows undefined spell {:?}", unit.name, missing);
            }
        }
        Ok(())
    }

    /// Immutable lookup tables for a game
    pub fn catalog(&self) -> Catalog {
        Catalog::new(
            self.units.iter().map(Archetype::from).collect(),
            self.spells.clone(),
        )
    }
}
