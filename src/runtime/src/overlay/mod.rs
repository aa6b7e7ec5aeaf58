//! Overlay filesystem layers and their on-disk store.

mod layer;
mod store;

pub use layer::{LayerMetadata, OverlayFs, METADATA_FILE};
pub use store::{ensure_directories, LayerStore};
