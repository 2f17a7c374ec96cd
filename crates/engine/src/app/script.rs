use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::input::{InputAction, InputSnapshot};

/// Source of per-tick input for the headless loop. Returning `None` ends the run.
pub trait InputSource {
    fn next_tick(&mut self) -> Option<InputSnapshot>;
}

/// Never presses anything; the run is bounded by `LoopConfig::max_ticks`.
#[derive(Debug, Default)]
pub struct IdleInput;

impl InputSource for IdleInput {
    fn next_tick(&mut self) -> Option<InputSnapshot> {
        Some(InputSnapshot::empty())
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read input script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse input script at {location}: {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptStep {
    #[serde(default = "default_step_ticks")]
    pub ticks: u32,
    #[serde(default)]
    pub hold: Vec<InputAction>,
    #[serde(default)]
    pub begin: bool,
    #[serde(default)]
    pub interact: bool,
}

fn default_step_ticks() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    steps: Vec<ScriptStep>,
}

/// Replays a JSON list of held actions and edge presses, one step at a time.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    steps: Vec<ScriptStep>,
    step_index: usize,
    tick_in_step: u32,
}

impl ScriptedInput {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps,
            step_index: 0,
            tick_in_step: 0,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let raw = fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ScriptError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let file: ScriptFile =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
                let location = error.path().to_string();
                ScriptError::Parse {
                    location,
                    source: error.into_inner(),
                }
            })?;
        Ok(Self::new(file.steps))
    }

    pub fn total_ticks(&self) -> u64 {
        self.steps.iter().map(|step| u64::from(step.ticks)).sum()
    }
}

impl InputSource for ScriptedInput {
    fn next_tick(&mut self) -> Option<InputSnapshot> {
        loop {
            let step = self.steps.get(self.step_index)?;
            if self.tick_in_step >= step.ticks {
                self.step_index += 1;
                self.tick_in_step = 0;
                continue;
            }

            let first_tick = self.tick_in_step == 0;
            let mut snapshot = InputSnapshot::empty()
                .with_begin_pressed(first_tick && step.begin)
                .with_interact_pressed(first_tick && step.interact);
            for action in &step.hold {
                snapshot = snapshot.with_action_down(*action, true);
            }
            self.tick_in_step += 1;
            return Some(snapshot);
        }
    }
}
