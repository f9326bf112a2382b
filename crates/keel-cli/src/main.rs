//! Keel CLI - schema migration runner

use clap::Parser;
use env_logger::Env;
use keel_runner::Direction;

mod cli;
mod commands;

use cli::Cli;
use commands::{common, force, migrate, status, validate};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let result = match &cli.command {
        cli::Commands::Up(args) => migrate::execute(Direction::Up, args, &cli.global).await,
        cli::Commands::Down(args) => migrate::execute(Direction::Down, args, &cli.global).await,
        cli::Commands::Validate(args) => validate::execute(args, &cli.global).await,
        cli::Commands::Status(args) => status::execute(args, &cli.global).await,
        cli::Commands::Force(args) => force::execute(args, &cli.global).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<common::ExitCode>() {
            Some(code) => std::process::ExitCode::from(code.0),
            None => {
                eprintln!("Error: {err:#}");
                std::process::ExitCode::FAILURE
            }
        },
    }
}
