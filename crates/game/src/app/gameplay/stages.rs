use std::fmt;

use engine::{EntityId, HostError, Schedule, SceneWorld, System, SystemId, Transform};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum StageId {
    Graveyard,
    Boat,
    Spiral,
    Ritual,
    Epilogue,
}

impl StageId {
    pub(crate) const ALL: [StageId; 5] = [
        StageId::Graveyard,
        StageId::Boat,
        StageId::Spiral,
        StageId::Ritual,
        StageId::Epilogue,
    ];

    pub(crate) const fn number(self) -> u8 {
        match self {
            StageId::Graveyard => 1,
            StageId::Boat => 2,
            StageId::Spiral => 3,
            StageId::Ritual => 4,
            StageId::Epilogue => 5,
        }
    }

    pub(crate) fn from_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.number() == number)
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            StageId::Graveyard => "graveyard",
            StageId::Boat => "boat",
            StageId::Spiral => "spiral",
            StageId::Ritual => "ritual",
            StageId::Epilogue => "epilogue",
        }
    }

    /// Accepts the stage number (`"3"`) or its name (`"spiral"`).
    pub(crate) fn parse(raw: &str) -> Result<Self, StageError> {
        let trimmed = raw.trim();
        if let Ok(number) = trimmed.parse::<u8>() {
            return Self::from_number(number).ok_or_else(|| StageError::UnknownStage(raw.to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| StageError::UnknownStage(raw.to_string()))
    }

    pub(crate) fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

#[derive(Debug, Error)]
pub(crate) enum StageError {
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    #[error("invalid stage transition from {from:?} to {to}")]
    InvalidTransition { from: Option<StageId>, to: StageId },
    #[error("failed to build stage {stage}: {source}")]
    Build {
        stage: StageId,
        #[source]
        source: HostError,
    },
}

/// Linear stage sequencer. Only the stage after the current one may be
/// entered; the first stage entered is free.
#[derive(Debug, Clone, Default)]
pub(crate) struct StageController {
    current: Option<StageId>,
    history: Vec<StageId>,
}

impl StageController {
    pub(crate) fn current(&self) -> Option<StageId> {
        self.current
    }

    pub(crate) fn history(&self) -> &[StageId] {
        &self.history
    }

    pub(crate) fn next_stage(&self) -> Option<StageId> {
        self.current.and_then(StageId::next)
    }

    pub(crate) fn previous_stage(&self) -> Option<StageId> {
        self.history.last().copied()
    }

    pub(crate) fn can_enter(&self, target: StageId) -> bool {
        match self.current {
            None => true,
            Some(current) => current.next() == Some(target),
        }
    }

    pub(crate) fn check_entry(&self, target: StageId) -> Result<(), StageError> {
        if self.can_enter(target) {
            Ok(())
        } else {
            Err(StageError::InvalidTransition {
                from: self.current,
                to: target,
            })
        }
    }

    /// Records the outgoing stage in history and makes `target` current.
    /// Returns the stage that was current before.
    pub(crate) fn transition_to(&mut self, target: StageId) -> Result<Option<StageId>, StageError> {
        self.check_entry(target)?;
        let outgoing = self.current.replace(target);
        if let Some(stage) = outgoing {
            self.history.push(stage);
        }
        info!(
            from = outgoing.map(StageId::number),
            to = target.number(),
            "stage_transition"
        );
        Ok(outgoing)
    }

    pub(crate) fn reset(&mut self) {
        self.current = None;
        self.history.clear();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CleanupReport {
    pub(crate) systems_removed: usize,
    pub(crate) entities_removed: usize,
    pub(crate) already_gone: usize,
}

/// Everything a stage builder created, so teardown can remove exactly that.
#[derive(Debug, Default)]
pub(crate) struct StageScope {
    systems: Vec<SystemId>,
    entities: Vec<EntityId>,
}

impl StageScope {
    pub(crate) fn spawn(&mut self, world: &mut SceneWorld, debug_name: &'static str, transform: Transform) -> EntityId {
        let id = world.spawn(debug_name, transform);
        self.entities.push(id);
        id
    }

    pub(crate) fn track_entities(&mut self, ids: impl IntoIterator<Item = EntityId>) {
        self.entities.extend(ids);
    }

    pub(crate) fn add_system<C: ?Sized>(&mut self, schedule: &mut Schedule<C>, system: Box<dyn System<C>>) -> SystemId {
        let id = schedule.add_system(system);
        self.systems.push(id);
        id
    }

    pub(crate) fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Best-effort teardown: a missing system or entity is logged and counted,
    /// and never stops the rest of the removal.
    pub(crate) fn cleanup<C: ?Sized>(&mut self, schedule: &mut Schedule<C>, world: &mut SceneWorld) -> CleanupReport {
        let mut report = CleanupReport::default();
        for id in self.systems.drain(..) {
            match schedule.remove_system(id) {
                Ok(()) => report.systems_removed += 1,
                Err(err) => {
                    debug!(error = %err, "cleanup_system_missing");
                    report.already_gone += 1;
                }
            }
        }
        for id in self.entities.drain(..) {
            match world.despawn(id) {
                Ok(()) => report.entities_removed += 1,
                Err(err) => {
                    debug!(error = %err, "cleanup_entity_missing");
                    report.already_gone += 1;
                }
            }
        }
        report
    }
}
