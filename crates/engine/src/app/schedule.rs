use thiserror::Error;
use tracing::warn;

use super::world::{HostError, SceneWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SystemId(pub u64);

#[derive(Debug, Error)]
pub enum SystemError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("{0}")]
    Failed(String),
}

/// Per-frame callback slot. `C` is the scene-owned state the system mutates.
pub trait System<C: ?Sized> {
    fn name(&self) -> &'static str;
    fn run(
        &mut self,
        context: &mut C,
        world: &mut SceneWorld,
        fixed_dt_seconds: f32,
    ) -> Result<(), SystemError>;
}

#[derive(Debug)]
pub struct SystemFailure {
    pub system: SystemId,
    pub name: &'static str,
    pub error: SystemError,
}

struct ScheduledSystem<C: ?Sized> {
    id: SystemId,
    system: Box<dyn System<C>>,
}

/// Systems run in registration order. A failing system is logged and the
/// remaining systems still run that tick.
pub struct Schedule<C: ?Sized> {
    next_id: u64,
    systems: Vec<ScheduledSystem<C>>,
}

impl<C: ?Sized> Default for Schedule<C> {
    fn default() -> Self {
        Self {
            next_id: 0,
            systems: Vec::new(),
        }
    }
}

impl<C: ?Sized> Schedule<C> {
    pub fn add_system(&mut self, system: Box<dyn System<C>>) -> SystemId {
        let id = SystemId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.systems.push(ScheduledSystem { id, system });
        id
    }

    pub fn remove_system(&mut self, id: SystemId) -> Result<(), HostError> {
        let index = self
            .systems
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(HostError::SystemNotFound(id))?;
        self.systems.remove(index);
        Ok(())
    }

    pub fn contains(&self, id: SystemId) -> bool {
        self.systems.iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn system_names(&self) -> Vec<&'static str> {
        self.systems.iter().map(|entry| entry.system.name()).collect()
    }

    pub fn run(
        &mut self,
        context: &mut C,
        world: &mut SceneWorld,
        fixed_dt_seconds: f32,
    ) -> Vec<SystemFailure> {
        let mut failures = Vec::new();
        for entry in &mut self.systems {
            if let Err(error) = entry.system.run(context, world, fixed_dt_seconds) {
                warn!(
                    system = entry.system.name(),
                    error = %error,
                    "system_failed"
                );
                failures.push(SystemFailure {
                    system: entry.id,
                    name: entry.system.name(),
                    error,
                });
            }
        }
        failures
    }
}
