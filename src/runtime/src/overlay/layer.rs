//! Overlay layer creation and mounting.
//!
//! Each build step materializes as one layer: a directory quartet under
//! `<layers_root>/<id>/`. The read-only lower stack is either the layer's
//! own `lower/` directory (base layers) or a colon-joined list of ancestor
//! directories (derived layers); `upper/` captures the step's writes,
//! `work/` is kernel scratch space, and `merged/` is where the unified view
//! appears once mounted.

use std::path::{Path, PathBuf};

use containy_core::error::{ContainyError, Result};
use nix::mount::{mount, MsFlags};
use serde::{Deserialize, Serialize};

use super::store::{ensure_directories, LayerStore};

/// File inside a layer directory describing how the layer was produced.
pub const METADATA_FILE: &str = "layer.json";

/// Sidecar metadata persisted inside `<layers_root>/<id>/`.
///
/// Lets a cached layer be rebuilt into an [`OverlayFs`] on a later run so
/// subsequent steps can chain onto it without re-executing the instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerMetadata {
    /// Layer ID
    pub id: String,
    /// Canonical instruction text that produced the layer
    pub instruction: String,
    /// Effective lower stack; `None` for base layers, which own their
    /// materialized `lower/` directory
    pub lower: Option<String>,
}

/// One copy-on-write layer of a container image.
#[derive(Debug, Clone)]
pub struct OverlayFs {
    id: String,
    /// Colon-joined read-only stack passed to the kernel as `lowerdir`
    lower: String,
    upper: PathBuf,
    work: PathBuf,
    merged: PathBuf,
}

impl OverlayFs {
    /// Create the on-disk directory structure for a new layer.
    ///
    /// Base layers (`lower` absent) materialize an empty `lower/` directory
    /// of their own; derived layers store the supplied colon-joined stack
    /// verbatim and materialize no lower directory. `upper/`, `work/`, and
    /// `merged/` are always created. The layer is not mounted.
    pub fn create(
        store: &LayerStore,
        lower: Option<String>,
        id: &str,
        instruction: &str,
    ) -> Result<Self> {
        let base = store.layer_dir(id);
        tracing::debug!(id, base = %base.display(), "Creating overlay layer");

        let metadata = LayerMetadata {
            id: id.to_string(),
            instruction: instruction.to_string(),
            lower: lower.clone(),
        };

        let lower = match lower {
            Some(stack) => stack,
            None => {
                let dir = base.join("lower");
                ensure_directories(&[&dir])?;
                dir.to_string_lossy().into_owned()
            }
        };

        let layer = Self {
            id: id.to_string(),
            lower,
            upper: base.join("upper"),
            work: base.join("work"),
            merged: base.join("merged"),
        };
        ensure_directories(&[&layer.upper, &layer.work, &layer.merged])?;
        layer.write_metadata(&base, &metadata)?;
        Ok(layer)
    }

    /// Rebuild a layer from its persisted metadata without touching disk.
    pub(crate) fn from_metadata(store: &LayerStore, metadata: &LayerMetadata) -> Self {
        let base = store.layer_dir(&metadata.id);
        let lower = metadata
            .lower
            .clone()
            .unwrap_or_else(|| base.join("lower").to_string_lossy().into_owned());
        Self {
            id: metadata.id.clone(),
            lower,
            upper: base.join("upper"),
            work: base.join("work"),
            merged: base.join("merged"),
        }
    }

    /// Mount the overlay filesystem at `merged/`.
    ///
    /// The mount data string is exactly
    /// `lowerdir=<L>,upperdir=<U>,workdir=<W>` with the stored paths
    /// substituted verbatim. The kernel rejects missing lower directories
    /// and overlapping work directories; no retries are attempted.
    pub fn mount(&self) -> Result<()> {
        let data = format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower,
            self.upper.display(),
            self.work.display()
        );
        tracing::debug!(target = %self.merged.display(), options = %data, "Mounting overlay filesystem");
        mount(
            Some("overlay"),
            &self.merged,
            Some("overlay"),
            MsFlags::empty(),
            Some(data.as_str()),
        )
        .map_err(|e| {
            ContainyError::Mount(format!(
                "failed to mount overlay at {}: {}",
                self.merged.display(),
                e
            ))
        })
    }

    /// Register `name` as an alias for this layer's merged view.
    pub fn create_alias(&self, store: &LayerStore, name: &str) -> Result<()> {
        store.register_alias(name, &self.merged)
    }

    fn write_metadata(&self, base: &Path, metadata: &LayerMetadata) -> Result<()> {
        let path = base.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(metadata)
            .map_err(|e| ContainyError::Io(format!("failed to encode layer metadata: {e}")))?;
        std::fs::write(&path, json).map_err(|e| {
            ContainyError::Io(format!(
                "failed to write layer metadata {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Layer ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Colon-joined read-only lower stack.
    pub fn lower(&self) -> &str {
        &self.lower
    }

    /// Writable directory capturing this layer's changes.
    pub fn upper(&self) -> &Path {
        &self.upper
    }

    /// Kernel scratch directory.
    pub fn work(&self) -> &Path {
        &self.work
    }

    /// Mount point of the unified view.
    pub fn merged(&self) -> &Path {
        &self.merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use containy_core::config::Config;
    use tempfile::TempDir;

    fn test_store(tmp: &TempDir) -> LayerStore {
        let config = Config {
            layers_root: tmp.path().join("layers"),
            alias_root: tmp.path().join("alias"),
            ..Config::default()
        };
        LayerStore::new(&config)
    }

    #[test]
    fn test_create_base_layer_materializes_directories() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let layer = OverlayFs::create(&store, None, "abc123", "FROM base").unwrap();

        let base = store.layer_dir("abc123");
        assert!(base.join("lower").is_dir());
        assert!(layer.upper().is_dir());
        assert!(layer.work().is_dir());
        assert!(layer.merged().is_dir());
        assert_eq!(layer.lower(), base.join("lower").to_string_lossy());
    }

    #[test]
    fn test_create_derived_layer_keeps_stack_verbatim() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let layer =
            OverlayFs::create(&store, Some("/a/lower:/a/upper".to_string()), "def456", "RUN ls")
                .unwrap();

        assert_eq!(layer.lower(), "/a/lower:/a/upper");
        // Derived layers never materialize a lower directory of their own
        assert!(!store.layer_dir("def456").join("lower").exists());
        assert!(layer.upper().is_dir());
        assert!(layer.work().is_dir());
        assert!(layer.merged().is_dir());
    }

    #[test]
    fn test_create_writes_metadata_sidecar() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        OverlayFs::create(&store, None, "aaa111", "FROM https://example/fs.tgz").unwrap();

        let raw =
            std::fs::read_to_string(store.layer_dir("aaa111").join(METADATA_FILE)).unwrap();
        let meta: LayerMetadata = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta.id, "aaa111");
        assert_eq!(meta.instruction, "FROM https://example/fs.tgz");
        assert!(meta.lower.is_none());
    }

    #[test]
    fn test_from_metadata_restores_paths() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let created =
            OverlayFs::create(&store, Some("/x:/y".to_string()), "bbb222", "RUN touch f").unwrap();
        let meta = LayerMetadata {
            id: "bbb222".to_string(),
            instruction: "RUN touch f".to_string(),
            lower: Some("/x:/y".to_string()),
        };

        let restored = OverlayFs::from_metadata(&store, &meta);
        assert_eq!(restored.id(), created.id());
        assert_eq!(restored.lower(), created.lower());
        assert_eq!(restored.upper(), created.upper());
        assert_eq!(restored.merged(), created.merged());
    }

    #[test]
    fn test_create_alias_links_merged_view() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let layer = OverlayFs::create(&store, None, "ccc333", "FROM base").unwrap();
        layer.create_alias(&store, "demo").unwrap();

        let link = tmp.path().join("alias").join("demo");
        assert_eq!(std::fs::read_link(link).unwrap(), layer.merged());
    }
}
