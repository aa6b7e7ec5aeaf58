//! `containy prune` command — unmount and remove all cached layers and
//! aliases.

use clap::Args;
use containy_core::config::Config;
use containy_core::error::Result;
use containy_runtime::LayerStore;

#[derive(Args)]
pub struct PruneArgs {}

pub fn execute(_args: PruneArgs) -> Result<()> {
    let config = Config::default();
    let store = LayerStore::new(&config);
    let removed = store.prune()?;

    println!("Removed {removed} layer(s).");
    Ok(())
}
