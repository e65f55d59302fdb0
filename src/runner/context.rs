use crate::commands::validate::check_selection;
use crate::commands::{CommandConfig, CommandDescriptor};
use crate::error::{CommandError, UnresolvedVariable};

use super::events::{EngineEvent, EventEmitter};
use super::instances::{InstanceRegistry, RunId};
use super::variables::VariableProvider;

/// What a command sees while it runs: the run's variables, its instance
/// registry (both tiers) and a log channel.
pub struct ExecutionContext<'a> {
    step: usize,
    run_id: RunId,
    variables: &'a mut dyn VariableProvider,
    instances: &'a mut InstanceRegistry,
    emitter: &'a EventEmitter,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        step: usize,
        variables: &'a mut dyn VariableProvider,
        instances: &'a mut InstanceRegistry,
        emitter: &'a EventEmitter,
    ) -> Self {
        Self {
            step,
            run_id: instances.current_run(),
            variables,
            instances,
            emitter,
        }
    }

    /// Index of the step being executed
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn variables(&self) -> &dyn VariableProvider {
        &*self.variables
    }

    pub fn variables_mut(&mut self) -> &mut dyn VariableProvider {
        &mut *self.variables
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &*self.instances
    }

    pub fn instances_mut(&mut self) -> &mut InstanceRegistry {
        &mut *self.instances
    }

    pub fn resolve(&self, raw: &str) -> Result<String, UnresolvedVariable> {
        self.variables.resolve(raw)
    }

    /// Resolve one configured property and check it against its option list.
    pub fn resolve_property(
        &self,
        descriptor: &CommandDescriptor,
        config: &CommandConfig,
        key: &str,
    ) -> Result<String, CommandError> {
        let resolved = self
            .variables
            .resolve(config.get(key))
            .map_err(|source| CommandError::Unresolved {
                property: key.to_string(),
                source,
            })?;
        check_selection(descriptor, key, &resolved)?;
        Ok(resolved)
    }

    /// Emit a log line attached to the current step
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("[{} step {}] {}", self.run_id, self.step, message);
        self.emitter.emit(EngineEvent::Log {
            run_id: self.run_id,
            step: Some(self.step),
            message,
        });
    }
}
