use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of hex characters kept from a layer digest.
pub const DEFAULT_ID_LENGTH: usize = 10;

/// PATH exported inside containers.
pub const DEFAULT_CONTAINER_PATH: &str =
    "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Toolkit configuration shared by the build engine and the container runner.
///
/// Paths are interpreted relative to the process working directory unless
/// absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base directory for all layer directories
    pub layers_root: PathBuf,

    /// Base directory for alias symlinks
    pub alias_root: PathBuf,

    /// Number of hex characters kept from SHA-256 layer digests
    pub id_length: usize,

    /// PATH value injected into containers
    pub default_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layers_root: PathBuf::from("tmp/build/layers"),
            alias_root: PathBuf::from("tmp/build/alias"),
            id_length: DEFAULT_ID_LENGTH,
            default_path: DEFAULT_CONTAINER_PATH.to_string(),
        }
    }
}
