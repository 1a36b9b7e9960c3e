//! Shared command plumbing: fixtures, armies, agents and seeding

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use skirmish_core::{
    Agent, ArmySetup, Catalog, DiceResolver, ExpectimaxAI, GameConfig, GameState, GreedyAI, RandomAI, Topology,
};

/// Fixtures compiled into the binary
pub const DEFAULT_FIXTURES: &str = include_str!("../fixtures.json");

/// Which move source drives a side
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    Expectimax,
    Greedy,
    Random,
}

impl AgentKind {
    pub fn build<T: Topology>(self, depth: u32, seed: u64) -> Box<dyn Agent<T>> {
        match self {
            AgentKind::Expectimax => Box::new(ExpectimaxAI::new(depth)),
            AgentKind::Greedy => Box::new(GreedyAI),
            AgentKind::Random => Box::new(RandomAI::new(seed)),
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct ArmyArgs {
    /// Player one's units, comma separated
    #[arg(long, value_delimiter = ',', default_value = "Warrior,Mage")]
    pub p1: Vec<String>,

    /// Player two's units, comma separated
    #[arg(long, value_delimiter = ',', default_value = "Warrior,Mage")]
    pub p2: Vec<String>,
}

impl ArmyArgs {
    pub fn setup(&self) -> ArmySetup {
        ArmySetup::new(self.p1.iter().cloned(), self.p2.iter().cloned())
    }
}

/// Load fixtures from a file, or the built-in ones
pub fn load_config(path: Option<&Path>) -> Result<GameConfig> {
    match path {
        Some(path) => GameConfig::load(path),
        None => GameConfig::from_json_str(DEFAULT_FIXTURES).context("Built-in fixtures are invalid"),
    }
}

/// Create RNG from seed or random
pub fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Dice with their own stream, split off the master RNG
pub fn create_dice(rng: &mut ChaCha8Rng) -> DiceResolver {
    DiceResolver::seeded(rng.gen())
}

/// Deploy both armies on the configured grid
pub fn new_game<T: Topology>(
    config: &GameConfig,
    catalog: &Arc<Catalog>,
    army: &ArmySetup,
    rng: &mut ChaCha8Rng,
) -> Result<GameState<T>> {
    army.build(config.grid.width, config.grid.height, Arc::clone(catalog), rng)
        .with_context(|| format!("Failed to deploy {:?} vs {:?}", army.player_one, army.player_two))
}
