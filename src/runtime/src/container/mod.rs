//! Container execution.
//!
//! Resolves a run target (alias name or merged directory) and hands it to
//! the namespace trampoline, dispatching between its parent and child
//! phases based on argv[0].

mod namespace;

use containy_core::config::Config;
use containy_core::error::Result;

use crate::overlay::LayerStore;

/// Run `command` inside the image at `target`.
///
/// `target` is either an alias name or a layer's merged directory. Returns
/// the user command's exit code.
pub fn run(target: &str, command: &[String], config: &Config) -> Result<i32> {
    let store = LayerStore::new(config);
    let overlay_dir = store.resolve(target)?;

    if namespace::is_reexec_child() {
        namespace::child_entry(&overlay_dir, command, config)
    } else {
        namespace::spawn_parent(&overlay_dir, command)
    }
}
