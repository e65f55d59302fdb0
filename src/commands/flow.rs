use async_trait::async_trait;
use std::time::Duration;

use super::{command_accessors, CommandConfig, CommandDescriptor, PropertyDescriptor, ScriptCommand};
use crate::error::CommandError;
use crate::runner::context::ExecutionContext;

/// Suspends the script for a fixed time
pub struct PauseCommand {
    config: CommandConfig,
}

impl PauseCommand {
    pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor {
        name: "pause",
        display_label: "Pause Script",
        group: "Misc Commands",
        description: "Pause the script for a number of milliseconds.",
        uses_notes: "Use this command to give an external application time to catch up.",
        implementation_notes: "Sleeps on the async runtime; other scripts keep running.",
        properties: &[PropertyDescriptor {
            input_spec: "Whole number of milliseconds.",
            sample_usage: "**1000** or **${delay}**",
            default: Some("1000"),
            ..PropertyDescriptor::text("milliseconds", "Amount of time to pause for (ms)")
        }],
    };

    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScriptCommand for PauseCommand {
    command_accessors!();

    fn display_value(&self) -> String {
        format!("{} - [Wait for {}ms]", self.display_label(), self.config.get("milliseconds"))
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        let raw = self.resolved(ctx, "milliseconds")?;
        let ms: u64 = raw
            .trim()
            .parse()
            .map_err(|_| CommandError::failed(format!("'{}' is not a number of milliseconds", raw)))?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }
}

/// Writes a message to the run log
pub struct LogMessageCommand {
    config: CommandConfig,
}

impl LogMessageCommand {
    pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor {
        name: "logMessage",
        display_label: "Log Message",
        group: "Misc Commands",
        description: "Write a message to the run log.",
        uses_notes: "Use this command to trace variable values while a script runs.",
        implementation_notes: "",
        properties: &[PropertyDescriptor {
            sample_usage: "**Logged in as ${userName}**",
            control: super::UiControl::MultiLineTextBox,
            ..PropertyDescriptor::text("message", "Message")
        }],
    };

    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScriptCommand for LogMessageCommand {
    command_accessors!();

    fn display_value(&self) -> String {
        format!("{} - [{}]", self.display_label(), self.config.get("message"))
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        let message = self.resolved(ctx, "message")?;
        ctx.log(message);
        Ok(())
    }
}

/// Fails the step with a custom message
pub struct ThrowErrorCommand {
    config: CommandConfig,
}

impl ThrowErrorCommand {
    pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor {
        name: "throwError",
        display_label: "Throw Error",
        group: "Error Handling Commands",
        description: "Fail the current step with a message.",
        uses_notes: "Use this command to stop a script when a precondition is not met.",
        implementation_notes: "Always returns an execution error; continueOnError still applies.",
        properties: &[PropertyDescriptor {
            sample_usage: "**Login page did not load**",
            ..PropertyDescriptor::text("message", "Error Message")
        }],
    };

    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScriptCommand for ThrowErrorCommand {
    command_accessors!();

    fn display_value(&self) -> String {
        format!("{} - [{}]", self.display_label(), self.config.get("message"))
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        let message = self.resolved(ctx, "message")?;
        Err(CommandError::Failed(message))
    }
}
