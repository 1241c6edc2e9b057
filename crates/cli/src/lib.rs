pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "slotbot",
    about = "Slotbot operator CLI",
    long_about = "Inspect slot bot configuration, check readiness, simulate payouts, and play from a terminal.",
    after_help = "Examples:\n  slotbot doctor --json\n  slotbot config\n  slotbot simulate --spins 10000 --seed 7\n  slotbot play"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, bot token readiness, and the throttle cooldown table")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Report the exact expected return, or simulate random spins")]
    Simulate {
        #[arg(long, help = "Number of random spins; omit for the exact 64-outcome report")]
        spins: Option<u64>,
        #[arg(long, help = "Seed for reproducible random spins")]
        seed: Option<u64>,
    },
    #[command(
        about = "Play in the terminal: one command per line, an empty line presses the spin button"
    )]
    Play {
        #[arg(long, default_value = "console", help = "User id the session plays as")]
        user: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Simulate { spins, seed } => commands::simulate::run(spins, seed),
        Command::Play { user } => commands::play::run(&user),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
