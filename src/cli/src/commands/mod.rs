//! CLI command definitions and dispatch.

mod build;
mod layers;
mod prune;
mod run;

use clap::{Parser, Subcommand};
use containy_core::error::Result;

/// Containy — minimal container toolkit.
#[derive(Parser)]
#[command(name = "containy", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Build an image from a recipe file
    Build(build::BuildArgs),
    /// Run a command inside a built image
    Run(run::RunArgs),
    /// List cached layers
    Layers(layers::LayersArgs),
    /// Unmount and delete all cached layers and aliases
    Prune(prune::PruneArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build(args) => build::execute(args),
        Command::Run(args) => run::execute(args),
        Command::Layers(args) => layers::execute(args),
        Command::Prune(args) => prune::execute(args),
    }
}
