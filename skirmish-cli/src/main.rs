//! SKIRMISH CLI - Command-line interface
//!
//! Commands:
//! - play: Play a single game, printing the board after every move
//! - match: Play a series of games between two agents and report win rates

mod common;
mod match_cmd;
mod play_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "skirmish")]
#[command(about = "Turn-based grid tactics with an expectimax AI")]
struct Cli {
    /// Fixture file with grid, spells and units (built-in fixtures if omitted)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seed for deployment, dice and random agents
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a single game
    Play(play_cmd::PlayArgs),
    /// Play a series of games between two agents
    Match(match_cmd::MatchArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `--json` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = common::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Play(args) => play_cmd::run(args, &config, cli.seed),
        Commands::Match(args) => match_cmd::run(args, &config, cli.seed),
    }
}
