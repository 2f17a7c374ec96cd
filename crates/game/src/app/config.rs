use std::fs;
use std::path::{Path, PathBuf};

use engine::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::validation::validate_position;

pub(crate) const CONFIG_ENV_VAR: &str = "FEVERED_DREAM_CONFIG";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config at {path}: {message}")]
    Invalid { path: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct MazeConfig {
    pub(crate) cols: u32,
    pub(crate) rows: u32,
    pub(crate) seed: u64,
    pub(crate) cell_size: f32,
    pub(crate) wall_thickness: f32,
    pub(crate) wall_height: f32,
    pub(crate) show_range: u32,
    pub(crate) iteration_ceiling: u32,
}

impl Default for MazeConfig {
    fn default() -> Self {
        Self {
            cols: 40,
            rows: 40,
            seed: 1,
            cell_size: 16.0,
            wall_thickness: 5.0,
            wall_height: 5.0,
            show_range: 1,
            iteration_ceiling: 100_000,
        }
    }
}

/// Explicit pool sizes. Any size left out is derived from `show_range`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PoolConfig {
    pub(crate) walls: Option<usize>,
    pub(crate) floors: Option<usize>,
    pub(crate) pillars: Option<usize>,
    pub(crate) trees: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct PursuitConfig {
    pub(crate) max_active_candles: usize,
    pub(crate) candle_duration_seconds: f32,
    pub(crate) flame_idle_delay_ms: u64,
    pub(crate) angel_speed: f32,
    pub(crate) ritual_angel_speed: f32,
    pub(crate) ritual_stop_radius: f32,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            max_active_candles: 1,
            candle_duration_seconds: 60.0,
            flame_idle_delay_ms: 500,
            angel_speed: 2.0,
            ritual_angel_speed: 1.5,
            ritual_stop_radius: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FadeConfig {
    pub(crate) out_seconds: f32,
    pub(crate) hold_seconds: f32,
    pub(crate) in_seconds: f32,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            out_seconds: 1.0,
            hold_seconds: 0.5,
            in_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct AmbienceConfig {
    pub(crate) clip_min_seconds: f32,
    pub(crate) clip_max_seconds: f32,
    pub(crate) gap_min_seconds: f32,
    pub(crate) gap_max_seconds: f32,
    pub(crate) volume: f32,
    pub(crate) seed: u64,
}

impl Default for AmbienceConfig {
    fn default() -> Self {
        Self {
            clip_min_seconds: 10.0,
            clip_max_seconds: 20.0,
            gap_min_seconds: 3.0,
            gap_max_seconds: 8.0,
            volume: 0.8,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct SessionConfig {
    /// Skips the "begin" press and starts the graveyard immediately.
    pub(crate) auto_begin: bool,
    pub(crate) start_stage: u8,
    pub(crate) player_spawn: Vec3,
    pub(crate) initial_candle: Vec3,
    pub(crate) quit_on_finish: bool,
    pub(crate) max_ticks: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_begin: false,
            start_stage: 1,
            player_spawn: Vec3::new(2.0, 0.0, 2.0),
            initial_candle: Vec3::new(7.0, 0.3, 7.0),
            quit_on_finish: true,
            max_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct GameConfig {
    pub(crate) maze: MazeConfig,
    pub(crate) pools: PoolConfig,
    pub(crate) pursuit: PursuitConfig,
    pub(crate) fade: FadeConfig,
    pub(crate) ambience: AmbienceConfig,
    pub(crate) session: SessionConfig,
}

impl GameConfig {
    /// Reads the file named by `FEVERED_DREAM_CONFIG`, or returns defaults
    /// when the variable is unset.
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => {
                info!("config_defaults");
                Ok(Self::default())
            }
        }
    }

    pub(crate) fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&raw)?;
        info!(path = %path.display(), "config_loaded");
        Ok(config)
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: GameConfig =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
                let location = error.path().to_string();
                ConfigError::Parse {
                    location,
                    source: error.into_inner(),
                }
            })?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let maze = &self.maze;
        if maze.cols == 0 || maze.rows == 0 {
            return Err(invalid("maze", format!("grid must be non-empty, got {}x{}", maze.cols, maze.rows)));
        }
        positive("maze.cell_size", maze.cell_size)?;
        non_negative("maze.wall_thickness", maze.wall_thickness)?;
        non_negative("maze.wall_height", maze.wall_height)?;
        let widest = maze.cols.max(maze.rows);
        if maze.show_range > widest {
            return Err(invalid(
                "maze.show_range",
                format!("expected at most {widest}, got {}", maze.show_range),
            ));
        }
        if maze.iteration_ceiling == 0 {
            return Err(invalid("maze.iteration_ceiling", "must be at least 1"));
        }

        let pursuit = &self.pursuit;
        if pursuit.max_active_candles == 0 {
            return Err(invalid("pursuit.max_active_candles", "must be at least 1"));
        }
        positive("pursuit.candle_duration_seconds", pursuit.candle_duration_seconds)?;
        non_negative("pursuit.angel_speed", pursuit.angel_speed)?;
        non_negative("pursuit.ritual_angel_speed", pursuit.ritual_angel_speed)?;
        non_negative("pursuit.ritual_stop_radius", pursuit.ritual_stop_radius)?;

        non_negative("fade.out_seconds", self.fade.out_seconds)?;
        non_negative("fade.hold_seconds", self.fade.hold_seconds)?;
        non_negative("fade.in_seconds", self.fade.in_seconds)?;

        let ambience = &self.ambience;
        non_negative("ambience.clip_min_seconds", ambience.clip_min_seconds)?;
        non_negative("ambience.gap_min_seconds", ambience.gap_min_seconds)?;
        if ambience.clip_max_seconds < ambience.clip_min_seconds {
            return Err(invalid("ambience.clip_max_seconds", "must not be below clip_min_seconds"));
        }
        if ambience.gap_max_seconds < ambience.gap_min_seconds {
            return Err(invalid("ambience.gap_max_seconds", "must not be below gap_min_seconds"));
        }
        if !(0.0..=1.0).contains(&ambience.volume) {
            return Err(invalid("ambience.volume", format!("expected 0..=1, got {}", ambience.volume)));
        }

        if !(1..=5).contains(&self.session.start_stage) {
            return Err(invalid(
                "session.start_stage",
                format!("expected 1..=5, got {}", self.session.start_stage),
            ));
        }
        for (path, position) in [
            ("session.player_spawn", self.session.player_spawn),
            ("session.initial_candle", self.session.initial_candle),
        ] {
            if let Some(message) = validate_position(position).errors.into_iter().next() {
                return Err(invalid(path, message));
            }
        }
        Ok(())
    }
}

fn invalid(path: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        path,
        message: message.into(),
    }
}

fn positive(path: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(path, format!("expected a positive number, got {value}")))
    }
}

fn non_negative(path: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(path, format!("expected a non-negative number, got {value}")))
    }
}
