//! Containy Core - Foundational Types
//!
//! This module provides the configuration and error types shared across
//! the containy build engine, container runner, and CLI.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::Config;
pub use error::{ContainyError, Result};

/// Containy version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
