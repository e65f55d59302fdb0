//! Self-describing script commands.
//!
//! Every variant pairs a static [`CommandDescriptor`] with a
//! [`CommandConfig`] holding its raw (unresolved) property values, and
//! implements [`ScriptCommand`]. The engine only ever sees
//! `Box<dyn ScriptCommand>`.

pub mod browser;
pub mod catalog;
pub mod descriptor;
pub mod flow;
pub mod script;
pub mod validate;
pub mod variable;

use async_trait::async_trait;

use crate::error::{CommandError, ValidationError};
use crate::parser::types::CommandRecord;
use crate::runner::context::ExecutionContext;

pub use catalog::CommandCatalog;
pub use descriptor::{CommandDescriptor, PropertyDescriptor, UiControl, UiHelper};
pub use script::Script;

/// Raw configuration of one command, in descriptor order.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandConfig {
    values: Vec<(&'static str, String)>,
    pub enabled: bool,
    pub continue_on_error: bool,
}

impl CommandConfig {
    /// Configuration holding the descriptor's defaults
    pub fn from_descriptor(descriptor: &'static CommandDescriptor) -> Self {
        Self {
            values: descriptor
                .properties
                .iter()
                .map(|p| (p.key, p.default.unwrap_or_default().to_string()))
                .collect(),
            enabled: true,
            continue_on_error: false,
        }
    }

    /// Raw value of `key`; empty for unknown keys
    pub fn get(&self, key: &str) -> &str {
        self.values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), ValidationError> {
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(ValidationError::UnknownProperty {
                property: key.to_string(),
            }),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Result<Self, ValidationError> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn values(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

/// One configuration property as the editor sees it
#[derive(Debug, Clone, Copy)]
pub struct Property<'a> {
    pub key: &'static str,
    pub value: &'a str,
    pub descriptor: &'static PropertyDescriptor,
}

/// The capability set every command variant implements.
#[async_trait]
pub trait ScriptCommand: Send + Sync {
    fn descriptor(&self) -> &'static CommandDescriptor;

    fn config(&self) -> &CommandConfig;

    fn config_mut(&mut self) -> &mut CommandConfig;

    /// One-line summary built from the configured values only
    fn display_value(&self) -> String;

    /// Perform the command's effect. Called once per script step.
    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), CommandError>;

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    fn display_label(&self) -> &'static str {
        self.descriptor().display_label
    }

    fn is_enabled(&self) -> bool {
        self.config().enabled
    }

    fn continue_on_error(&self) -> bool {
        self.config().continue_on_error
    }

    fn properties(&self) -> Vec<Property<'_>> {
        let config = self.config();
        self.descriptor()
            .properties
            .iter()
            .map(|descriptor| Property {
                key: descriptor.key,
                value: config.get(descriptor.key),
                descriptor,
            })
            .collect()
    }

    /// Check raw values against the property descriptors.
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validate::validate_config(self.descriptor(), self.config())
    }

    /// Resolve one property against the run's variables.
    fn resolved(&self, ctx: &ExecutionContext<'_>, key: &str) -> Result<String, CommandError> {
        ctx.resolve_property(self.descriptor(), self.config(), key)
    }

    fn to_record(&self) -> CommandRecord {
        CommandRecord::from_config(self.name(), self.config())
    }
}

/// Implement the accessor half of [`ScriptCommand`] for a struct with a
/// `config: CommandConfig` field and an associated `DESCRIPTOR`.
macro_rules! command_accessors {
    () => {
        fn descriptor(&self) -> &'static $crate::commands::CommandDescriptor {
            &Self::DESCRIPTOR
        }

        fn config(&self) -> &$crate::commands::CommandConfig {
            &self.config
        }

        fn config_mut(&mut self) -> &mut $crate::commands::CommandConfig {
            &mut self.config
        }
    };
}
pub(crate) use command_accessors;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::variable::SetVariableCommand;

    #[test]
    fn test_config_starts_from_defaults() {
        let config = CommandConfig::from_descriptor(&SetVariableCommand::DESCRIPTOR);
        assert!(config.enabled);
        assert!(!config.continue_on_error);
        assert_eq!(config.get("variableName"), "");
        assert_eq!(config.get("nonexistent"), "");
    }

    #[test]
    fn test_config_rejects_unknown_keys() {
        let mut config = CommandConfig::from_descriptor(&SetVariableCommand::DESCRIPTOR);
        config.set("value", "42").unwrap();
        assert_eq!(config.get("value"), "42");
        assert_eq!(
            config.set("colour", "red").unwrap_err(),
            ValidationError::UnknownProperty {
                property: "colour".to_string()
            }
        );
    }

    #[test]
    fn test_properties_follow_descriptor_order() {
        let command = SetVariableCommand::new(
            CommandConfig::from_descriptor(&SetVariableCommand::DESCRIPTOR)
                .with("value", "1")
                .unwrap(),
        );
        let keys: Vec<&str> = command.properties().iter().map(|p| p.key).collect();
        assert_eq!(keys, vec!["variableName", "value"]);
        assert_eq!(command.properties()[1].value, "1");
        assert_eq!(command.name(), "setVariable");
        assert_eq!(command.display_label(), "Set Variable");
    }
}
