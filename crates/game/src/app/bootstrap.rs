use std::path::PathBuf;

use engine::{IdleInput, InputSource, LoopConfig, Scene, ScriptError, ScriptedInput};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::{ConfigError, GameConfig};
use super::gameplay::{self, StageError, StageId};

pub(crate) const SCRIPT_ENV_VAR: &str = "FEVERED_DREAM_SCRIPT";
pub(crate) const START_STAGE_ENV_VAR: &str = "FEVERED_DREAM_START_STAGE";

#[derive(Debug, Error)]
pub(crate) enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Stage(#[from] StageError),
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scene: Box<dyn Scene>,
    pub(crate) input: Box<dyn InputSource>,
}

pub(crate) fn build_app() -> Result<AppWiring, StartupError> {
    init_tracing();
    info!("=== Fevered Dream Startup ===");

    let mut game_config = GameConfig::from_env()?;
    if let Ok(raw) = std::env::var(START_STAGE_ENV_VAR) {
        let stage = StageId::parse(&raw)?;
        info!(stage = %stage, "start_stage_override");
        game_config.session.start_stage = stage.number();
    }
    let input = input_from_env()?;
    let config = LoopConfig {
        max_ticks: game_config.session.max_ticks,
        ..LoopConfig::default()
    };
    let scene = gameplay::build_session(game_config);

    Ok(AppWiring {
        config,
        scene,
        input,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// Scripted input when `FEVERED_DREAM_SCRIPT` names a file, idle otherwise.
fn input_from_env() -> Result<Box<dyn InputSource>, ScriptError> {
    match std::env::var_os(SCRIPT_ENV_VAR) {
        Some(raw) if !raw.is_empty() => {
            let path = PathBuf::from(raw);
            let script = ScriptedInput::from_file(&path)?;
            info!(path = %path.display(), ticks = script.total_ticks(), "input_script_loaded");
            Ok(Box::new(script))
        }
        _ => Ok(Box::new(IdleInput)),
    }
}
