//! `containy build` command — build an image from a recipe file.
//!
//! Parses the recipe, executes each instruction as an overlay layer (or
//! reuses a cached one), and publishes an alias for the final layer.

use std::path::PathBuf;

use clap::Args;
use containy_core::config::Config;
use containy_core::error::Result;
use containy_runtime::{Builder, HttpFetcher};

#[derive(Args)]
pub struct BuildArgs {
    /// Path to the recipe file
    pub file: PathBuf,

    /// Alias for the built image (defaults to the final layer ID)
    #[arg(short, long)]
    pub alias: Option<String>,
}

pub fn execute(args: BuildArgs) -> Result<()> {
    let config = Config::default();
    let fetcher = HttpFetcher;

    Builder::new(&config, &fetcher).build(&args.file, args.alias.as_deref())
}
