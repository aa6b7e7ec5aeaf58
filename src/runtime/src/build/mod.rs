//! Layered build engine.
//!
//! Sequences recipe instructions, consults the layer cache, threads build
//! state from step to step, and publishes an alias for the final layer.

mod instructions;
pub mod recipe;

pub use instructions::{BuildState, Opcode};
pub use recipe::Instruction;

use std::path::Path;

use containy_core::config::Config;
use containy_core::error::{ContainyError, Result};

use crate::id::layer_id;
use crate::overlay::LayerStore;
use crate::rootfs::RootfsFetcher;

use instructions::{from_instruction, run_instruction};

/// Everything an instruction handler needs from its surroundings.
pub(crate) struct BuildContext<'a> {
    pub config: &'a Config,
    pub store: &'a LayerStore,
    pub fetcher: &'a dyn RootfsFetcher,
}

/// Drives a recipe build against a layer store.
pub struct Builder<'a> {
    config: &'a Config,
    store: LayerStore,
    fetcher: &'a dyn RootfsFetcher,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a Config, fetcher: &'a dyn RootfsFetcher) -> Self {
        Self {
            config,
            store: LayerStore::new(config),
            fetcher,
        }
    }

    /// Build a recipe and register `alias` (or the final layer's ID) for the
    /// terminal layer.
    ///
    /// Instructions execute strictly in source order; the first failure
    /// aborts the build. Layer directories created by completed steps are
    /// left on disk to serve as cache for a retry.
    pub fn build(&self, recipe_path: &Path, alias: Option<&str>) -> Result<()> {
        tracing::debug!(recipe = %recipe_path.display(), "Building container image");
        let instructions = recipe::parse(recipe_path)?;

        let mut state = BuildState::default();
        let total = instructions.len();

        for (idx, instruction) in instructions.iter().enumerate() {
            let step = idx + 1;
            let opcode = Opcode::parse(&instruction.opcode)
                .ok_or_else(|| ContainyError::UnknownOpcode(instruction.opcode.clone()))?;

            let id = layer_id(&instruction.canonical(), self.config.id_length);
            if self.store.exists(&id) {
                tracing::info!(step, total, id = %id, "Layer is already in cache");
                match self.store.load(&id) {
                    Ok(layer) => {
                        state.current_layer = Some(layer);
                        state.last_opcode = Some(opcode);
                    }
                    Err(e) => {
                        // Pre-sidecar or partial layer; later steps cannot
                        // chain onto it.
                        tracing::warn!(id = %id, error = %e, "Cached layer has no usable metadata");
                    }
                }
                continue;
            }

            tracing::info!(
                step,
                total,
                "Executing instruction: {} {}",
                instruction.opcode,
                instruction.args
            );
            let ctx = BuildContext {
                config: self.config,
                store: &self.store,
                fetcher: self.fetcher,
            };
            let layer = match opcode {
                Opcode::From => from_instruction(&instruction.args, &ctx)?,
                Opcode::Run => run_instruction(&instruction.args, &state, &ctx)?,
            };

            state.current_layer = Some(layer);
            state.last_opcode = Some(opcode);
        }

        if let Some(layer) = &state.current_layer {
            let name = alias.unwrap_or_else(|| layer.id());
            layer.create_alias(&self.store, name)?;
            tracing::info!(alias = name, "Build completed");
        }

        Ok(())
    }

    /// The store this builder caches layers in.
    pub fn store(&self) -> &LayerStore {
        &self.store
    }
}
