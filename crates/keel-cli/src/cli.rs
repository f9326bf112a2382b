//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand};

/// Keel - migrate independently versioned database schemas
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations
    Up(MigrateArgs),

    /// Revert applied migrations
    Down(MigrateArgs),

    /// Check that every schema is at its latest version without changing anything
    Validate(ValidateArgs),

    /// Show recorded and latest versions per schema
    Status(StatusArgs),

    /// Overwrite a schema's recorded version after manual repair
    Force(ForceArgs),
}

/// Arguments for the up and down commands
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Schema names (comma-separated, default: all configured)
    #[arg(short, long)]
    pub schemas: Option<String>,

    /// Maximum number of migrations per schema (0 = no limit)
    #[arg(short = 'n', long, default_value_t = 0)]
    pub num: usize,
}

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Schema names (comma-separated, default: all configured)
    #[arg(short, long)]
    pub schemas: Option<String>,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Schema names (comma-separated, default: all configured)
    #[arg(short, long)]
    pub schemas: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the force command
#[derive(Args, Debug)]
pub struct ForceArgs {
    /// Schema to repair
    pub schema: String,

    /// Version to record as clean (0 erases the record)
    pub version: i32,

    /// Remove a lock left behind by a runner that exited without releasing it
    #[arg(long)]
    pub break_lock: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
