use async_trait::async_trait;

use super::{command_accessors, CommandConfig, CommandDescriptor, PropertyDescriptor, ScriptCommand};
use crate::error::CommandError;
use crate::runner::context::ExecutionContext;

/// Assigns a (resolved) value to a variable
pub struct SetVariableCommand {
    config: CommandConfig,
}

impl SetVariableCommand {
    pub const DESCRIPTOR: CommandDescriptor = CommandDescriptor {
        name: "setVariable",
        display_label: "Set Variable",
        group: "Variable Commands",
        description: "Assign a value to a variable.",
        uses_notes: "Use this command to store text or the result of other variables for later steps.",
        implementation_notes: "Resolves the value first, then writes it to the run's variable table.",
        properties: &[
            PropertyDescriptor {
                input_spec: "Name of the variable to assign, without ${ }.",
                sample_usage: "**userName**",
                remarks: "The variable is created if it does not exist.",
                ..PropertyDescriptor::text("variableName", "Variable Name")
            },
            PropertyDescriptor {
                input_spec: "Text, or text containing variable references.",
                sample_usage: "**Hello ${userName}**",
                optional: true,
                ..PropertyDescriptor::text("value", "Value")
            },
        ],
    };

    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ScriptCommand for SetVariableCommand {
    command_accessors!();

    fn display_value(&self) -> String {
        format!(
            "{} - [Set '{}' = '{}']",
            self.display_label(),
            self.config.get("variableName"),
            self.config.get("value")
        )
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError> {
        let name = self.resolved(ctx, "variableName")?;
        let value = self.resolved(ctx, "value")?;
        ctx.variables_mut().set(name.trim(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::events::EventEmitter;
    use crate::runner::instances::{InstanceRegistry, ProcessInstances, RunId};
    use crate::runner::variables::{VariableProvider, VariableTable};

    #[tokio::test]
    async fn test_sets_resolved_value() {
        let mut vars = VariableTable::isolated().with_vars([("target", "greeting"), ("who", "world")]);
        let mut instances = InstanceRegistry::new(RunId::new(), ProcessInstances::new());
        let emitter = EventEmitter::default();

        let command = SetVariableCommand::new(
            CommandConfig::from_descriptor(&SetVariableCommand::DESCRIPTOR)
                .with("variableName", "${target}")
                .unwrap()
                .with("value", "hello ${who}")
                .unwrap(),
        );
        assert_eq!(command.display_value(), "Set Variable - [Set '${target}' = 'hello ${who}']");

        let mut ctx = ExecutionContext::new(0, &mut vars, &mut instances, &emitter);
        command.run(&mut ctx).await.unwrap();

        assert_eq!(vars.get("greeting").as_deref(), Some("hello world"));
    }
}
