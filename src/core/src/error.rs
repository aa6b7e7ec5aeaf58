use thiserror::Error;

/// Containy error types
#[derive(Error, Debug)]
pub enum ContainyError {
    /// Malformed recipe line
    #[error("parse error: {0}")]
    Parse(String),

    /// Opcode with no registered handler
    #[error("unknown instruction: {0}")]
    UnknownOpcode(String),

    /// Directory creation, read, stat, symlink, or remove failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Root filesystem download failure
    #[error("network error: {0}")]
    Network(String),

    /// Corrupted or unsupported archive content
    #[error("archive error: {0}")]
    Archive(String),

    /// Kernel mount, pivot_root, unshare, or sethostname failure
    #[error("mount error: {0}")]
    Mount(String),

    /// The user command could not be spawned or exited non-zero
    #[error("exec error: {0}")]
    Exec(String),

    /// Alias name already registered
    #[error("alias {0} already exists")]
    AliasConflict(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for containy operations
pub type Result<T> = std::result::Result<T, ContainyError>;
