//! On-disk layer store.
//!
//! Owns the directory layout under the configured layer and alias roots:
//! cache-existence queries, alias symlink registration and resolution, and
//! rehydration of cached layers from their metadata sidecars.

use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use containy_core::config::Config;
use containy_core::error::{ContainyError, Result};
use nix::mount::{umount2, MntFlags};

use super::layer::{LayerMetadata, OverlayFs, METADATA_FILE};

/// Directory-backed store for overlay layers and alias symlinks.
pub struct LayerStore {
    layers_root: PathBuf,
    alias_root: PathBuf,
}

impl LayerStore {
    /// Create a store over the configured roots. No directories are created
    /// until a layer or alias is first written.
    pub fn new(config: &Config) -> Self {
        Self {
            layers_root: config.layers_root.clone(),
            alias_root: config.alias_root.clone(),
        }
    }

    /// Directory holding a layer's lower/upper/work/merged structure.
    pub fn layer_dir(&self, id: &str) -> PathBuf {
        self.layers_root.join(id)
    }

    /// A layer is cached iff its directory exists.
    ///
    /// Presence is the whole test: partially written directories from a
    /// crashed build also count as cached.
    pub fn exists(&self, id: &str) -> bool {
        let dir = self.layer_dir(id);
        tracing::debug!(id, path = %dir.display(), "Checking layer cache");
        dir.exists()
    }

    /// Register an alias symlink pointing at `target`.
    ///
    /// Fails with [`ContainyError::AliasConflict`] if the name is already
    /// taken; the existing link is never overwritten.
    pub fn register_alias(&self, name: &str, target: &Path) -> Result<()> {
        let link = self.alias_root.join(name);
        if link.symlink_metadata().is_ok() {
            return Err(ContainyError::AliasConflict(name.to_string()));
        }
        ensure_directories(&[&self.alias_root])?;
        std::os::unix::fs::symlink(target, &link).map_err(|e| {
            ContainyError::Io(format!("failed to create alias {name}: {e}"))
        })?;
        tracing::debug!(alias = name, target = %target.display(), "Registered alias");
        Ok(())
    }

    /// Resolve an alias name or a literal path to an overlay directory.
    ///
    /// A symlink under the alias root is followed one hop; any other input
    /// is used verbatim. The resolved path must exist.
    pub fn resolve(&self, target: &str) -> Result<PathBuf> {
        let link = self.alias_root.join(target);
        let resolved = match fs::read_link(&link) {
            Ok(dest) => dest,
            Err(_) => PathBuf::from(target),
        };
        if !resolved.exists() {
            return Err(ContainyError::Io(format!(
                "overlay directory does not exist: {}",
                resolved.display()
            )));
        }
        Ok(resolved)
    }

    /// Read a cached layer's metadata sidecar.
    pub fn metadata(&self, id: &str) -> Result<LayerMetadata> {
        let path = self.layer_dir(id).join(METADATA_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| {
            ContainyError::Io(format!(
                "failed to read layer metadata {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ContainyError::Io(format!(
                "corrupt layer metadata {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Rehydrate a cached layer from its metadata sidecar.
    ///
    /// Performs no mounts and no network access; the returned layer is
    /// usable as a parent for subsequent build steps.
    pub fn load(&self, id: &str) -> Result<OverlayFs> {
        let metadata = self.metadata(id)?;
        Ok(OverlayFs::from_metadata(self, &metadata))
    }

    /// List metadata for every cached layer, sorted by ID.
    ///
    /// Layers without a readable sidecar are listed with an empty
    /// instruction.
    pub fn list(&self) -> Result<Vec<LayerMetadata>> {
        let mut layers = Vec::new();
        let entries = match fs::read_dir(&self.layers_root) {
            Ok(entries) => entries,
            Err(_) => return Ok(layers),
        };

        for entry in entries {
            let entry = entry.map_err(|e| {
                ContainyError::Io(format!(
                    "failed to read {}: {}",
                    self.layers_root.display(),
                    e
                ))
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            layers.push(self.metadata(&id).unwrap_or(LayerMetadata {
                id,
                instruction: String::new(),
                lower: None,
            }));
        }

        layers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(layers)
    }

    /// Unmount every cached layer's merged view and delete the layer and
    /// alias roots.
    ///
    /// Unmounting is lazy-detach and best-effort; layers that were never
    /// mounted report an error the kernel is free to give us, which is
    /// ignored. Returns the number of layers removed.
    pub fn prune(&self) -> Result<usize> {
        let layers = self.list()?;
        for metadata in &layers {
            let merged = self.layer_dir(&metadata.id).join("merged");
            let _ = umount2(&merged, MntFlags::MNT_DETACH);
        }

        if self.layers_root.exists() {
            fs::remove_dir_all(&self.layers_root).map_err(|e| {
                ContainyError::Io(format!(
                    "failed to remove {}: {}",
                    self.layers_root.display(),
                    e
                ))
            })?;
        }
        if self.alias_root.exists() {
            fs::remove_dir_all(&self.alias_root).map_err(|e| {
                ContainyError::Io(format!(
                    "failed to remove {}: {}",
                    self.alias_root.display(),
                    e
                ))
            })?;
        }

        tracing::info!(count = layers.len(), "Pruned layer store");
        Ok(layers.len())
    }
}

/// Create every path as a directory with mode 0755, recursively.
///
/// Existing directories are left alone; a non-directory at any of the paths
/// is an error.
pub fn ensure_directories(paths: &[&Path]) -> Result<()> {
    for path in paths {
        if path.exists() {
            if path.is_dir() {
                continue;
            }
            return Err(ContainyError::Io(format!(
                "{} exists and is not a directory",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), "Creating directory");
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(path)
            .map_err(|e| {
                ContainyError::Io(format!(
                    "failed to create directory {}: {}",
                    path.display(),
                    e
                ))
            })?;
    }
    Ok(())
}
