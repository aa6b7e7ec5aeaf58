//! Containy CLI library.

pub mod commands;
