//! Containy CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use containy_cli::commands::{dispatch, Cli};

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// `info` unless LOG_LEVEL=DEBUG is exported.
fn log_level() -> &'static str {
    match std::env::var("LOG_LEVEL") {
        Ok(v) if v.eq_ignore_ascii_case("debug") => "debug",
        _ => "info",
    }
}
