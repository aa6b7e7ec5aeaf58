//! `containy run` command — run a command inside a built image.
//!
//! Doubles as the namespace trampoline re-entry point: the runtime
//! re-executes `/proc/self/exe run ...` and dispatches on argv[0], so this
//! command body serves both phases.

use clap::Args;
use containy_core::config::Config;
use containy_core::error::Result;
use containy_runtime::container;

#[derive(Args)]
pub struct RunArgs {
    /// Alias name or merged directory of a built image
    pub target: String,

    /// Command and arguments to execute inside the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

pub fn execute(args: RunArgs) -> Result<()> {
    let config = Config::default();
    let code = container::run(&args.target, &args.command, &config)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
