//! Per-opcode build instruction handlers.

use std::path::Path;

use containy_core::error::{ContainyError, Result};

use crate::container;
use crate::id::layer_id;
use crate::overlay::OverlayFs;

use super::BuildContext;

/// Recognized instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    From,
    Run,
}

impl Opcode {
    /// Look up the handler for an opcode, if one is registered.
    pub fn parse(opcode: &str) -> Option<Self> {
        match opcode {
            "FROM" => Some(Self::From),
            "RUN" => Some(Self::Run),
            _ => None,
        }
    }

    /// Canonical uppercase spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::From => "FROM",
            Self::Run => "RUN",
        }
    }
}

/// Mutable state threaded through a build: the layer and opcode of the most
/// recently completed step. Consumed and replaced by each step; lives only
/// for one build invocation.
#[derive(Debug, Default)]
pub struct BuildState {
    pub current_layer: Option<OverlayFs>,
    pub last_opcode: Option<Opcode>,
}

/// Handle FROM: create a base layer, populate its lower directory from the
/// rootfs URL, and mount the merged view.
pub(crate) fn from_instruction(args: &str, ctx: &BuildContext<'_>) -> Result<OverlayFs> {
    tracing::info!(url = args, "Processing FROM instruction");

    let canonical = format!("FROM {args}");
    let id = layer_id(&canonical, ctx.config.id_length);

    let layer = OverlayFs::create(ctx.store, None, &id, &canonical)?;
    ctx.fetcher.fetch(args, Path::new(layer.lower()))?;
    layer.mount()?;

    tracing::debug!(merged = %layer.merged().display(), "Base layer mounted");
    Ok(layer)
}

/// Handle RUN: derive the lower stack from the previous step, create and
/// mount a new layer, and execute the command inside it. A non-zero exit
/// aborts the build.
pub(crate) fn run_instruction(
    args: &str,
    state: &BuildState,
    ctx: &BuildContext<'_>,
) -> Result<OverlayFs> {
    tracing::info!(command = args, "Processing RUN instruction");

    let canonical = format!("RUN {args}");
    let id = layer_id(&canonical, ctx.config.id_length);

    let lower = derive_lower(state)?;
    let layer = OverlayFs::create(ctx.store, Some(lower), &id, &canonical)?;
    layer.mount()?;

    let command: Vec<String> = args.split_whitespace().map(str::to_string).collect();
    let target = layer.merged().to_string_lossy().into_owned();
    let status = container::run(&target, &command, ctx.config)?;
    if status != 0 {
        return Err(ContainyError::Exec(format!(
            "command exited with status {status}: {args}"
        )));
    }

    Ok(layer)
}

/// Effective lower stack for a layer derived from `state`.
///
/// After FROM the parent's lower directory is the sole lower; after RUN the
/// parent's upper directory is appended to the parent's own stack, keeping
/// every ancestor's writes visible read-only.
fn derive_lower(state: &BuildState) -> Result<String> {
    let (layer, opcode) = match (&state.current_layer, state.last_opcode) {
        (Some(layer), Some(opcode)) => (layer, opcode),
        _ => {
            return Err(ContainyError::Parse(
                "RUN requires a preceding FROM instruction".to_string(),
            ))
        }
    };

    Ok(match opcode {
        Opcode::From => layer.lower().to_string(),
        Opcode::Run => format!("{}:{}", layer.lower(), layer.upper().display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::LayerStore;
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

    fn state(layer: OverlayFs, opcode: Opcode) -> BuildState {
        BuildState {
            current_layer: Some(layer),
            last_opcode: Some(opcode),
        }
    }

    #[test]
    fn test_opcode_parse() {
        assert_eq!(Opcode::parse("FROM"), Some(Opcode::From));
        assert_eq!(Opcode::parse("RUN"), Some(Opcode::Run));
        assert_eq!(Opcode::parse("FOO"), None);
    }

    #[test]
    fn test_opcode_as_str() {
        assert_eq!(Opcode::From.as_str(), "FROM");
        assert_eq!(Opcode::Run.as_str(), "RUN");
    }

    #[test]
    fn test_derive_lower_after_from_uses_base_lower() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        let base = OverlayFs::create(&store, None, "base01", "FROM url").unwrap();
        let expected = base.lower().to_string();

        let lower = derive_lower(&state(base, Opcode::From)).unwrap();
        assert_eq!(lower, expected);
    }

    #[test]
    fn test_derive_lower_after_run_appends_upper() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        let parent =
            OverlayFs::create(&store, Some("/base/lower".to_string()), "run001", "RUN a").unwrap();
        let expected = format!("/base/lower:{}", parent.upper().display());

        let lower = derive_lower(&state(parent, Opcode::Run)).unwrap();
        assert_eq!(lower, expected);
    }

    #[test]
    fn test_derive_lower_chains_ancestors_in_order() {
        // FROM x; RUN a; RUN b; RUN c — layer c's stack lists the base
        // lower, then each intermediate upper, oldest first.
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let base = OverlayFs::create(&store, None, "base01", "FROM x").unwrap();
        let base_lower = base.lower().to_string();
        let mut build_state = state(base, Opcode::From);

        let mut uppers = Vec::new();
        for id in ["run00a", "run00b", "run00c"] {
            let lower = derive_lower(&build_state).unwrap();
            let layer = OverlayFs::create(&store, Some(lower), id, "RUN step").unwrap();
            uppers.push(layer.upper().display().to_string());
            build_state = state(layer, Opcode::Run);
        }

        let final_lower = derive_lower(&build_state).unwrap();
        let expected = format!("{}:{}:{}:{}", base_lower, uppers[0], uppers[1], uppers[2]);
        assert_eq!(final_lower, expected);
    }

    #[test]
    fn test_derive_lower_without_previous_layer_fails() {
        let err = derive_lower(&BuildState::default()).unwrap_err();
        assert!(matches!(err, ContainyError::Parse(_)));
    }
}
