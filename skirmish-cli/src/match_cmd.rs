//! Match command - play games between two agents
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: play_match(), report_results()
//! - Level 3: play_single_game(), compute_match_statistics()
//! - Level 4: formatting utilities

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use skirmish_core::{
    play_game, ArmySetup, Catalog, GameConfig, GameResult, GameState, Hex, Layout, Player, Square, Topology,
};

use crate::common::{create_dice, create_rng, new_game, AgentKind, ArmyArgs};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args)]
pub struct MatchArgs {
    #[command(flatten)]
    pub army: ArmyArgs,

    /// First agent (player one in odd-numbered games)
    #[arg(long, value_enum, default_value = "expectimax")]
    pub one: AgentKind,

    /// Second agent
    #[arg(long, value_enum, default_value = "greedy")]
    pub two: AgentKind,

    /// Number of games to play (will alternate sides)
    #[arg(long, default_value = "10")]
    pub games: usize,

    /// Expectimax search depth
    #[arg(long, default_value = "2")]
    pub depth: u32,

    /// Maximum unit turns per game
    #[arg(long, default_value = "200")]
    pub max_turns: u32,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Which agent came out on top
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Outcome {
    First,
    Second,
    Draw,
}

/// Result of a single game
#[derive(Clone, Debug)]
struct MatchGame {
    game_number: usize,
    outcome: Outcome,
    turns: u32,
    /// Side the first agent played
    first_side: Player,
}

/// Aggregated match results
#[derive(Clone, Debug)]
struct MatchResults {
    games: Vec<MatchGame>,
    first_wins: usize,
    second_wins: usize,
    draws: usize,
    avg_turns: f32,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run match command
///
/// 1. Pick the grid layout from the fixtures
/// 2. Play the match (multiple games)
/// 3. Report results
pub fn run(args: MatchArgs, config: &GameConfig, seed: Option<u64>) -> Result<()> {
    tracing::info!(
        "Starting match: {:?} vs {:?} ({} games, depth={})",
        args.one,
        args.two,
        args.games,
        args.depth
    );

    let results = match config.grid.topology {
        Layout::Hex => play_match::<Hex>(&args, config, seed)?,
        Layout::Square => play_match::<Square>(&args, config, seed)?,
    };

    report_results(&results, &args)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Play all games in the match
fn play_match<T: Topology>(args: &MatchArgs, config: &GameConfig, seed: Option<u64>) -> Result<MatchResults> {
    let mut rng = create_rng(seed);
    let catalog = Arc::new(config.catalog());
    let army = args.army.setup();
    let progress = create_progress(args)?;
    let mut games = Vec::with_capacity(args.games);

    for game_num in 0..args.games {
        // Alternate sides for fairness
        let first_side = if game_num % 2 == 0 { Player::One } else { Player::Two };
        let record = play_single_game::<T>(game_num + 1, first_side, args, config, &catalog, &army, &mut rng)?;

        tracing::info!(
            "Game {}: {:?} ({} turns)",
            record.game_number,
            record.outcome,
            record.turns
        );
        progress.inc(1);
        games.push(record);
    }
    progress.finish_with_message("done");

    Ok(compute_match_statistics(games))
}

/// Report match results
fn report_results(results: &MatchResults, args: &MatchArgs) -> Result<()> {
    if args.json {
        print_json_results(results)
    } else {
        print_text_results(results);
        Ok(())
    }
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

/// Play one game with the first agent on `first_side`
fn play_single_game<T: Topology>(
    game_number: usize,
    first_side: Player,
    args: &MatchArgs,
    config: &GameConfig,
    catalog: &Arc<Catalog>,
    army: &ArmySetup,
    rng: &mut ChaCha8Rng,
) -> Result<MatchGame> {
    let state: GameState<T> = new_game(config, catalog, army, rng)?;
    let mut first = args.one.build::<T>(args.depth, rng.gen());
    let mut second = args.two.build::<T>(args.depth, rng.gen());
    let mut dice = create_dice(rng);

    let record = match first_side {
        Player::One => play_game(state, first.as_mut(), second.as_mut(), &mut dice, args.max_turns)?,
        Player::Two => play_game(state, second.as_mut(), first.as_mut(), &mut dice, args.max_turns)?,
    };

    Ok(MatchGame {
        game_number,
        outcome: outcome_for(record.result, first_side),
        turns: record.turns,
        first_side,
    })
}

/// Compute aggregate statistics from game records
fn compute_match_statistics(games: Vec<MatchGame>) -> MatchResults {
    let count = |outcome: Outcome| games.iter().filter(|g| g.outcome == outcome).count();
    let first_wins = count(Outcome::First);
    let second_wins = count(Outcome::Second);
    let draws = count(Outcome::Draw);

    let total_turns: u32 = games.iter().map(|g| g.turns).sum();
    let avg_turns = if games.is_empty() {
        0.0
    } else {
        total_turns as f32 / games.len() as f32
    };

    MatchResults {
        games,
        first_wins,
        second_wins,
        draws,
        avg_turns,
    }
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn outcome_for(result: GameResult, first_side: Player) -> Outcome {
    match result {
        GameResult::Won(winner) if winner == first_side => Outcome::First,
        GameResult::Won(_) => Outcome::Second,
        GameResult::Draw | GameResult::Ongoing => Outcome::Draw,
    }
}

/// Progress bar on stderr; hidden for JSON output
fn create_progress(args: &MatchArgs) -> Result<ProgressBar> {
    if args.json {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(args.games as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} games")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

fn percent(part: usize, total: usize) -> f32 {
    if total > 0 {
        part as f32 / total as f32 * 100.0
    } else {
        0.0
    }
}

/// Print results as JSON
fn print_json_results(results: &MatchResults) -> Result<()> {
    #[derive(Serialize)]
    struct JsonGame {
        game_number: usize,
        outcome: Outcome,
        turns: u32,
        first_side: Player,
    }

    #[derive(Serialize)]
    struct JsonOutput {
        total_games: usize,
        first_wins: usize,
        second_wins: usize,
        draws: usize,
        avg_turns: f32,
        first_win_rate: f32,
        games: Vec<JsonGame>,
    }

    let total = results.games.len();
    let output = JsonOutput {
        total_games: total,
        first_wins: results.first_wins,
        second_wins: results.second_wins,
        draws: results.draws,
        avg_turns: results.avg_turns,
        first_win_rate: percent(results.first_wins, total) / 100.0,
        games: results
            .games
            .iter()
            .map(|g| JsonGame {
                game_number: g.game_number,
                outcome: g.outcome,
                turns: g.turns,
                first_side: g.first_side,
            })
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print results as text
fn print_text_results(results: &MatchResults) {
    let total = results.games.len();

    println!("\n=== Match Results ===");
    println!("Total games:  {}", total);
    println!("First wins:   {} ({:.1}%)", results.first_wins, percent(results.first_wins, total));
    println!("Second wins:  {} ({:.1}%)", results.second_wins, percent(results.second_wins, total));
    println!("Draws:        {} ({:.1}%)", results.draws, percent(results.draws, total));
    println!("Avg turns:    {:.1}", results.avg_turns);

    println!("\nGame details:");
    for game in &results.games {
        println!(
            "  Game {}: {:?} in {} turns (first agent as {:?})",
            game.game_number, game.outcome, game.turns, game.first_side
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
