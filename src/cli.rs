//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::output::OutputContext;

/// Signed installs and brownfield upgrades for Agora framework assets
#[derive(Parser)]
#[command(
    name = "agora",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate an installed tree against its signed manifest
    Validate(commands::validate::ValidateArgs),

    /// Check for or apply a framework upgrade
    #[command(subcommand)]
    Upgrade(commands::upgrade::UpgradeCommand),

    /// Restore missing or corrupted files from a trusted source tree
    Repair(commands::repair::RepairArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub fn run(self) -> Result<()> {
        let Self {
            json,
            quiet,
            no_color,
            command,
        } = self;
        let ctx = OutputContext::new(no_color, quiet);
        match command {
            Command::Validate(args) => commands::validate::run(&args, &ctx, json),
            Command::Upgrade(cmd) => commands::upgrade::run(cmd, &ctx, json),
            Command::Repair(args) => commands::repair::run(&args, &ctx),
            Command::Version => commands::version::run(json),
        }
    }
}
