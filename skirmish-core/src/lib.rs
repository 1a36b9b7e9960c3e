//! SKIRMISH Core - Tactics engine and expectimax AI
//!
//! This crate provides the core logic for SKIRMISH:
//! - Grid geometry (square and odd-row hex layouts, A* pathing)
//! - d20 combat rolls with exact outcome probabilities
//! - Unit archetypes, game state and move resolution
//! - Generic expectimax search with alpha-beta and a transposition table
//! - Fixture loading, army setup and agents for live play

pub mod board;
pub mod combat;
pub mod units;
pub mod game;
pub mod search;
pub mod eval;
pub mod config;
pub mod setup;
pub mod ai;

// Re-exports for convenient access
pub use board::{Grid, GridError, Hex, Point, Square, Topology};
pub use combat::{DiceResolver, FixedResolver, Resolver, Roll, RollOutcome};
pub use units::{Archetype, Catalog, Player, Spell, UnitId, UnitState, UnitStatus};
pub use game::{GameError, GameMove, GameResult, GameState, Resolution};
pub use search::{Bound, SearchState, SearchStats, Solver, TranspositionTable};
pub use eval::evaluate;
pub use config::{GameConfig, Layout};
pub use setup::{ArmySetup, SetupError};
pub use ai::{play_game, play_game_observed, Agent, ExpectimaxAI, GameRecord, GreedyAI, RandomAI, TurnRecord};
