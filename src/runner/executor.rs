use std::time::Duration;

use crate::commands::Script;
use crate::error::CommandError;
use crate::utils::config::EngineConfig;

use super::cancel::CancelToken;
use super::context::ExecutionContext;
use super::events::{EngineEvent, EventEmitter};
use super::instances::{close_handles, InstanceRegistry, ProcessInstances, RunId};
use super::state::{RunReport, RunState, RunStatus, StepState, StepStatus};
use super::variables::{VariableProvider, VariableTable};

const SKIP_AFTER_FAILURE: &str = "previous command failed";
const SKIP_CANCELLED: &str = "cancelled";
const SKIP_DISABLED: &str = "disabled";

/// Runs scripts one command at a time.
///
/// An engine owns its variables and its run-scoped instances; the process
/// tier is shared with every other engine holding the same
/// [`ProcessInstances`]. Each call to [`ScriptEngine::run`] is a new run with
/// its own [`RunId`].
pub struct ScriptEngine {
    config: EngineConfig,
    variables: Box<dyn VariableProvider>,
    instances: InstanceRegistry,
    emitter: EventEmitter,
    cancel: CancelToken,
}

impl ScriptEngine {
    pub fn new(process: ProcessInstances, config: EngineConfig) -> Self {
        Self {
            config,
            variables: Box::new(VariableTable::new()),
            instances: InstanceRegistry::new(RunId::new(), process),
            emitter: EventEmitter::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_variables(mut self, variables: impl VariableProvider + 'static) -> Self {
        self.variables = Box::new(variables);
        self
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Id of the current (or most recent) run
    pub fn run_id(&self) -> RunId {
        self.instances.current_run()
    }

    pub fn variables(&self) -> &dyn VariableProvider {
        self.variables.as_ref()
    }

    pub fn variables_mut(&mut self) -> &mut dyn VariableProvider {
        self.variables.as_mut()
    }

    pub fn instances(&self) -> &InstanceRegistry {
        &self.instances
    }

    /// Run `script` to a terminal state.
    ///
    /// Never fails as a whole: step failures, cancellation and teardown
    /// problems all end up in the returned report.
    pub async fn run(&mut self, script: &Script) -> RunReport {
        let run_id = RunId::new();
        self.instances.begin_run(run_id);

        for (name, value) in &script.variables {
            if !self.variables.is_set(name) {
                self.variables.set(name, value.clone());
            }
        }

        let steps = script
            .commands
            .iter()
            .enumerate()
            .map(|(i, command)| StepState::new(i, command.name(), &command.display_value()))
            .collect();
        let path = script.path.as_ref().map(|p| p.display().to_string());
        let mut state = RunState::new(run_id, &script.name, path, steps);

        self.emitter.emit(EngineEvent::RunStarted {
            run_id,
            script: script.name.clone(),
            step_count: script.len(),
        });
        log::info!("run {} of '{}' started ({} steps)", run_id, script.name, script.len());
        state.start();

        let mut status = RunStatus::Completed;
        for (index, command) in script.commands.iter().enumerate() {
            if index > 0 && self.config.command_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.command_delay_ms)).await;
            }

            if self.cancel.is_cancelled() {
                log::info!("run {} cancelled before step {}", run_id, index);
                self.skip_from(&mut state, index, SKIP_CANCELLED);
                status = RunStatus::Cancelled;
                break;
            }

            state.status = RunStatus::Running { step: index };

            if !command.is_enabled() {
                state.steps[index].skip(SKIP_DISABLED);
                self.emitter.emit(EngineEvent::StepSkipped {
                    run_id,
                    index,
                    reason: SKIP_DISABLED.to_string(),
                });
                continue;
            }

            self.emitter.emit(EngineEvent::StepStarted {
                run_id,
                index,
                display: state.steps[index].command_display.clone(),
            });
            state.steps[index].start();

            let result = match command.validate() {
                Err(errors) => Err(CommandError::Validation(errors)),
                Ok(()) => {
                    let mut ctx = ExecutionContext::new(
                        index,
                        self.variables.as_mut(),
                        &mut self.instances,
                        &self.emitter,
                    );
                    command.run(&mut ctx).await
                }
            };

            let step = &mut state.steps[index];
            match result {
                Ok(()) => {
                    step.pass();
                    self.emitter.emit(EngineEvent::StepPassed {
                        run_id,
                        index,
                        duration_ms: step.duration_ms.unwrap_or(0),
                    });
                }
                Err(e) => {
                    let kind = e.kind();
                    let error = e.to_string();
                    let fatal = !(command.continue_on_error() || self.config.continue_on_failure);
                    log::warn!("step {} ({}) failed [{}]: {}", index, command.name(), kind, error);

                    step.fail(kind, error.clone());
                    self.emitter.emit(EngineEvent::StepFailed {
                        run_id,
                        index,
                        kind,
                        error,
                        duration_ms: step.duration_ms.unwrap_or(0),
                        fatal,
                    });

                    if fatal {
                        self.skip_from(&mut state, index + 1, SKIP_AFTER_FAILURE);
                        status = RunStatus::Failed { step: index };
                        break;
                    }
                }
            }
        }

        state.teardown_failures = self.teardown(run_id).await;
        state.finish(status);

        log::info!("run {} of '{}' finished: {:?}", run_id, script.name, status);
        self.emitter.emit(EngineEvent::RunFinished {
            run_id,
            script: script.name.clone(),
            status,
            duration_ms: state.total_duration_ms,
        });
        state.to_report()
    }

    fn skip_from(&self, state: &mut RunState, from: usize, reason: &str) {
        state.skip_remaining(from, reason);
        for step in state.steps.iter().skip(from) {
            if matches!(&step.status, StepStatus::Skipped { reason: r } if r == reason) {
                self.emitter.emit(EngineEvent::StepSkipped {
                    run_id: state.run_id,
                    index: step.index,
                    reason: reason.to_string(),
                });
            }
        }
    }

    async fn teardown(&mut self, run_id: RunId) -> Vec<super::instances::CloseFailure> {
        let entries = self.instances.teardown_run(run_id);
        if entries.is_empty() {
            return Vec::new();
        }
        log::debug!("closing {} run-scoped instance(s) of run {}", entries.len(), run_id);

        let failures = close_handles(entries).await;
        for failure in &failures {
            self.emitter.emit(EngineEvent::TeardownFailed {
                run_id,
                name: failure.name.clone(),
                error: failure.error.clone(),
            });
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::browser::{BrowserCloseCommand, BrowserCreateCommand, BrowserNavigateCommand};
    use crate::commands::flow::ThrowErrorCommand;
    use crate::commands::{CommandConfig, CommandDescriptor, ScriptCommand};
    use crate::error::{ErrorKind, RegistryError};
    use crate::runner::instances::{Tier, KEEP_INSTANCE_ALIVE};
    use crate::test_support::{FakeHandle, FakeLauncher, RecordingCommand};
    use std::sync::{Arc, Mutex};

    fn engine(process: &ProcessInstances) -> ScriptEngine {
        ScriptEngine::new(process.clone(), EngineConfig::default()).with_variables(VariableTable::isolated())
    }

    fn visits() -> Arc<Mutex<Vec<usize>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn configured(descriptor: &'static CommandDescriptor, pairs: &[(&str, &str)]) -> CommandConfig {
        let mut config = CommandConfig::from_descriptor(descriptor);
        for (k, v) in pairs {
            config.set(k, *v).unwrap();
        }
        config
    }

    fn throw(message: &str) -> Box<dyn ScriptCommand> {
        Box::new(ThrowErrorCommand::new(configured(
            &ThrowErrorCommand::DESCRIPTOR,
            &[("message", message)],
        )))
    }

    fn create(launcher: &Arc<FakeLauncher>, pairs: &[(&str, &str)]) -> Box<dyn ScriptCommand> {
        Box::new(BrowserCreateCommand::new(
            configured(&BrowserCreateCommand::DESCRIPTOR, pairs),
            launcher.clone(),
        ))
    }

    #[tokio::test]
    async fn test_steps_run_in_order_and_complete() {
        let seen = visits();
        let script = Script::new(
            "ordered",
            (0..5).map(|_| RecordingCommand::new(&seen)).collect(),
        );

        let report = engine(&ProcessInstances::new()).run(&script).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(report.counts(), (5, 0, 0));
    }

    #[tokio::test]
    async fn test_fatal_failure_halts_the_script() {
        let seen = visits();
        let script = Script::new(
            "halts",
            vec![
                RecordingCommand::new(&seen),
                throw("boom"),
                RecordingCommand::new(&seen),
                RecordingCommand::new(&seen),
            ],
        );

        let report = engine(&ProcessInstances::new()).run(&script).await;

        assert_eq!(report.status, RunStatus::Failed { step: 1 });
        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert_eq!(report.counts(), (1, 1, 2));
        assert_eq!(
            report.steps[1].status,
            StepStatus::Failed {
                kind: ErrorKind::Execution,
                error: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_continue_on_error_records_and_continues() {
        let seen = visits();
        let mut tolerant = configured(&ThrowErrorCommand::DESCRIPTOR, &[("message", "soft")]);
        tolerant.continue_on_error = true;

        let script = Script::new(
            "continues",
            vec![
                Box::new(ThrowErrorCommand::new(tolerant)),
                RecordingCommand::new(&seen),
            ],
        );

        let report = engine(&ProcessInstances::new()).run(&script).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn test_engine_wide_continue_on_failure() {
        let seen = visits();
        let script = Script::new("lenient", vec![throw("a"), throw("b"), RecordingCommand::new(&seen)]);

        let config = EngineConfig {
            continue_on_failure: true,
            ..EngineConfig::default()
        };
        let mut engine = ScriptEngine::new(ProcessInstances::new(), config);
        let report = engine.run(&script).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.counts(), (1, 2, 0));
    }

    #[tokio::test]
    async fn test_disabled_and_invalid_steps() {
        let seen = visits();
        let mut disabled = configured(&RecordingCommand::DESCRIPTOR, &[]);
        disabled.enabled = false;

        let script = Script::new(
            "checks",
            vec![
                RecordingCommand::with_config(&seen, disabled),
                RecordingCommand::with_config(&seen, configured(&RecordingCommand::DESCRIPTOR, &[("tag", "${oops")])),
                RecordingCommand::new(&seen),
            ],
        );

        let report = engine(&ProcessInstances::new()).run(&script).await;

        assert_eq!(report.status, RunStatus::Failed { step: 1 });
        assert!(matches!(
            &report.steps[0].status,
            StepStatus::Skipped { reason } if reason == "disabled"
        ));
        assert!(matches!(
            &report.steps[1].status,
            StepStatus::Failed { kind: ErrorKind::Validation, .. }
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_variable_fails_the_step() {
        let script = Script::new("unresolved", vec![throw("${missing}")]);
        let report = engine(&ProcessInstances::new()).run(&script).await;

        match &report.steps[0].status {
            StepStatus::Failed { kind, error } => {
                assert_eq!(*kind, ErrorKind::UnresolvedVariable);
                assert!(error.contains("missing"));
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_between_steps() {
        let seen = visits();
        let token = CancelToken::new();
        let script = Script::new(
            "cancelled",
            vec![
                RecordingCommand::new(&seen),
                RecordingCommand::cancelling(&seen, &token),
                RecordingCommand::new(&seen),
            ],
        );

        let mut engine = engine(&ProcessInstances::new()).with_cancel_token(token.clone());
        let report = engine.run(&script).await;

        assert_eq!(report.status, RunStatus::Cancelled);
        // The step that requested cancellation still finished
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(report.counts(), (2, 0, 1));
    }

    #[tokio::test]
    async fn test_cancel_during_command_delay() {
        let seen = visits();
        let token = CancelToken::new();
        let script = Script::new("delayed", vec![RecordingCommand::new(&seen), RecordingCommand::new(&seen)]);

        let config = EngineConfig {
            command_delay_ms: 300,
            ..EngineConfig::default()
        };
        let mut engine = ScriptEngine::new(ProcessInstances::new(), config)
            .with_variables(VariableTable::isolated())
            .with_cancel_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        let report = engine.run(&script).await;
        canceller.await.unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(*seen.lock().unwrap(), vec![0]);
        assert_eq!(report.counts(), (1, 0, 1));
    }

    #[tokio::test]
    async fn test_script_variables_win_over_environment() {
        std::env::set_var("LUMI_EXECUTOR_SEED_SITE", "from-env");
        let script = Script::new("seeded", vec![throw("${LUMI_EXECUTOR_SEED_SITE}")])
            .with_variable("LUMI_EXECUTOR_SEED_SITE", "from-script");

        let mut engine = ScriptEngine::new(ProcessInstances::new(), EngineConfig::default());
        let report = engine.run(&script).await;

        assert!(matches!(
            &report.steps[0].status,
            StepStatus::Failed { error, .. } if error == "from-script"
        ));
    }

    #[tokio::test]
    async fn test_host_variables_win_over_script_defaults() {
        let script = Script::new("seeded", vec![throw("${site}")]).with_variable("site", "from-script");
        let mut engine = engine(&ProcessInstances::new());
        engine.variables_mut().set("site", "from-host".to_string());

        let report = engine.run(&script).await;
        assert!(matches!(
            &report.steps[0].status,
            StepStatus::Failed { error, .. } if error == "from-host"
        ));
    }

    #[tokio::test]
    async fn test_script_variables_seed_the_table() {
        let script = Script::new("vars", vec![throw("${greeting}")]).with_variable("greeting", "hello");
        let mut engine = engine(&ProcessInstances::new());
        engine.variables_mut().set("other", "x".to_string());

        let report = engine.run(&script).await;
        assert!(matches!(
            &report.steps[0].status,
            StepStatus::Failed { error, .. } if error == "hello"
        ));
        assert_eq!(engine.variables().get("greeting").as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_keep_alive_instance_released_by_script() {
        let process = ProcessInstances::new();
        let launcher = FakeLauncher::new();
        let script = Script::new(
            "keep alive",
            vec![
                create(&launcher, &[("instanceName", "b1"), ("instanceTracking", KEEP_INSTANCE_ALIVE)]),
                Box::new(BrowserNavigateCommand::new(configured(
                    &BrowserNavigateCommand::DESCRIPTOR,
                    &[("instanceName", "b1"), ("url", "https://example.com")],
                ))),
                Box::new(BrowserCloseCommand::new(configured(
                    &BrowserCloseCommand::DESCRIPTOR,
                    &[("instanceName", "b1")],
                ))),
            ],
        );

        let report = engine(&process).run(&script).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert!(matches!(process.get("b1"), Err(RegistryError::NotFound { .. })));
        assert!(launcher.session(0).is_closed());
    }

    #[tokio::test]
    async fn test_run_scoped_instance_closed_on_failure() {
        let process = ProcessInstances::new();
        let launcher = FakeLauncher::new();
        let script = Script::new(
            "teardown",
            vec![create(&launcher, &[("instanceName", "b1")]), throw("fail")],
        );

        let mut engine = engine(&process);
        let report = engine.run(&script).await;

        assert_eq!(report.status, RunStatus::Failed { step: 1 });
        assert!(launcher.session(0).is_closed());
        assert!(matches!(
            engine.instances().get(Tier::RunScoped, "b1"),
            Err(RegistryError::NotFound { .. })
        ));
        assert!(report.teardown_failures.is_empty());
    }

    #[tokio::test]
    async fn test_keep_alive_instance_survives_the_run() {
        let process = ProcessInstances::new();
        let launcher = FakeLauncher::new();
        let script = Script::new(
            "survives",
            vec![
                create(&launcher, &[("instanceName", "kept"), ("instanceTracking", KEEP_INSTANCE_ALIVE)]),
                create(&launcher, &[("instanceName", "temp")]),
            ],
        );

        engine(&process).run(&script).await;

        assert!(process.contains("kept"));
        assert!(!launcher.session(0).is_closed());
        assert!(launcher.session(1).is_closed());

        // A later engine in the same process can still use it
        let navigate = Script::new(
            "reuse",
            vec![Box::new(BrowserNavigateCommand::new(configured(
                &BrowserNavigateCommand::DESCRIPTOR,
                &[("instanceName", "kept"), ("url", "https://example.com/next")],
            )))],
        );
        let report = engine(&process).run(&navigate).await;
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(launcher.session(0).navigated(), vec!["https://example.com/next"]);
    }

    /// Registers a fake handle under the configured name (run tier)
    struct RegisterFake {
        config: CommandConfig,
        handle: Arc<FakeHandle>,
    }

    impl RegisterFake {
        const DESCRIPTOR: CommandDescriptor = CommandDescriptor {
            name: "registerFake",
            display_label: "Register Fake",
            group: "Test Commands",
            description: "",
            uses_notes: "",
            implementation_notes: "",
            properties: &[crate::commands::PropertyDescriptor::text("name", "Name")],
        };
    }

    #[async_trait::async_trait]
    impl ScriptCommand for RegisterFake {
        crate::commands::command_accessors!();

        fn display_value(&self) -> String {
            self.config.get("name").to_string()
        }

        async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
            let name = self.resolved(ctx, "name")?;
            ctx.instances_mut().put(Tier::RunScoped, &name, self.handle.clone())?;
            Ok(())
        }
    }

    fn register(name: &str, handle: &Arc<FakeHandle>) -> Box<dyn ScriptCommand> {
        Box::new(RegisterFake {
            config: configured(&RegisterFake::DESCRIPTOR, &[("name", name)]),
            handle: handle.clone(),
        })
    }

    #[tokio::test]
    async fn test_teardown_failures_are_reported_not_raised() {
        let broken = FakeHandle::failing("broken");
        let fine = FakeHandle::new("fine");
        let script = Script::new("teardown", vec![register("a", &broken), register("b", &fine)]);

        let report = engine(&ProcessInstances::new()).run(&script).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.teardown_failures.len(), 1);
        assert_eq!(report.teardown_failures[0].name, "a");
        assert!(broken.is_closed());
        assert!(fine.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_runs_only_tear_down_their_own_instances() {
        let process = ProcessInstances::new();
        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let process = process.clone();
                tokio::spawn(async move {
                    let handle = FakeHandle::new(&format!("h{}", i));
                    let script = Script::new(
                        "parallel",
                        vec![
                            register("shared", &handle),
                            Box::new(crate::commands::flow::PauseCommand::new(configured(
                                &crate::commands::flow::PauseCommand::DESCRIPTOR,
                                &[("milliseconds", "5")],
                            ))),
                        ],
                    );
                    let mut engine = engine(&process);
                    let report = engine.run(&script).await;
                    (report, handle)
                })
            })
            .collect();

        for task in tasks {
            let (report, handle) = task.await.unwrap();
            assert_eq!(report.status, RunStatus::Completed);
            assert!(handle.is_closed());
        }
        assert!(process.is_empty());
    }

    #[tokio::test]
    async fn test_events_follow_the_run() {
        let (emitter, mut rx) = EventEmitter::new();
        let seen = visits();
        let script = Script::new("events", vec![RecordingCommand::new(&seen), throw("x")]);

        let mut engine = engine(&ProcessInstances::new()).with_emitter(emitter);
        engine.run(&script).await;

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(match event {
                EngineEvent::RunStarted { .. } => "runStarted",
                EngineEvent::StepStarted { .. } => "stepStarted",
                EngineEvent::StepPassed { .. } => "stepPassed",
                EngineEvent::StepFailed { fatal: true, .. } => "stepFailed",
                EngineEvent::RunFinished { .. } => "runFinished",
                _ => "other",
            });
        }
        assert_eq!(
            names,
            vec!["runStarted", "stepStarted", "stepPassed", "stepStarted", "stepFailed", "runFinished"]
        );
    }
}
