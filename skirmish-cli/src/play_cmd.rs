//! Play command - one game with the board printed after every move

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use rand::Rng;

use skirmish_core::{
    play_game_observed, GameConfig, GameResult, GameState, Hex, Layout, Player, Square, Topology, TurnRecord,
};

use crate::common::{create_dice, create_rng, new_game, AgentKind, ArmyArgs};

#[derive(Args)]
pub struct PlayArgs {
    #[command(flatten)]
    pub army: ArmyArgs,

    /// Agent for player one
    #[arg(long, value_enum, default_value = "expectimax")]
    pub one: AgentKind,

    /// Agent for player two
    #[arg(long, value_enum, default_value = "greedy")]
    pub two: AgentKind,

    /// Expectimax search depth
    #[arg(long, default_value = "2")]
    pub depth: u32,

    /// Maximum unit turns before the game is called a draw
    #[arg(long, default_value = "200")]
    pub max_turns: u32,

    /// Only print the final board and result
    #[arg(long)]
    pub quiet: bool,
}

pub fn run(args: PlayArgs, config: &GameConfig, seed: Option<u64>) -> Result<()> {
    match config.grid.topology {
        Layout::Hex => play::<Hex>(&args, config, seed),
        Layout::Square => play::<Square>(&args, config, seed),
    }
}

fn play<T: Topology>(args: &PlayArgs, config: &GameConfig, seed: Option<u64>) -> Result<()> {
    let mut rng = create_rng(seed);
    let catalog = Arc::new(config.catalog());
    let state: GameState<T> = new_game(config, &catalog, &args.army.setup(), &mut rng)?;

    let mut one = args.one.build::<T>(args.depth, rng.gen());
    let mut two = args.two.build::<T>(args.depth, rng.gen());
    let mut dice = create_dice(&mut rng);

    tracing::info!(
        "Playing {} (P1) vs {} (P2) on {}",
        one.name(),
        two.name(),
        T::NAME
    );
    if !args.quiet {
        println!("{}", state);
    }

    let quiet = args.quiet;
    let record = play_game_observed(
        state,
        one.as_mut(),
        two.as_mut(),
        &mut dice,
        args.max_turns,
        |turn, after| {
            if !quiet {
                print_turn(turn, after);
            }
        },
    )?;

    if quiet {
        println!("{}", record.final_state);
    }
    println!("{} after {} turns", describe_result(record.result), record.turns);
    Ok(())
}

fn print_turn<T: Topology>(turn: &TurnRecord, after: &GameState<T>) {
    let name = after.unit(turn.unit).map_or("?", |u| u.name());
    println!("--- Turn {}: {} #{} ---", turn.turn, name, turn.unit);
    match &turn.resolution.strike {
        Some(strike) => println!(
            "Action: {} -> {:?} for {}{}",
            turn.mv,
            strike.roll.outcome,
            strike.damage,
            if strike.killed { " (killed)" } else { "" }
        ),
        None => println!("Action: {}", turn.mv),
    }
    println!("{}", after);
}

fn describe_result(result: GameResult) -> &'static str {
    match result {
        GameResult::Won(Player::One) => "Player one wins",
        GameResult::Won(Player::Two) => "Player two wins",
        GameResult::Draw | GameResult::Ongoing => "Draw",
    }
}
