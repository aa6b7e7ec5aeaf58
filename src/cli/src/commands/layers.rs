//! `containy layers` command — list cached layers.

use clap::Args;
use containy_core::config::Config;
use containy_core::error::Result;
use containy_runtime::LayerStore;

#[derive(Args)]
pub struct LayersArgs {}

pub fn execute(_args: LayersArgs) -> Result<()> {
    let config = Config::default();
    let store = LayerStore::new(&config);
    let layers = store.list()?;

    if layers.is_empty() {
        println!("No cached layers.");
        return Ok(());
    }

    println!("{:<14} INSTRUCTION", "LAYER ID");
    for metadata in layers {
        println!("{:<14} {}", metadata.id, metadata.instruction);
    }
    Ok(())
}
