use std::path::PathBuf;

use super::ScriptCommand;
use crate::error::ValidationError;
use crate::parser::types::{scalar_to_string, ScriptFile};

/// An ordered, loaded script ready for the engine
pub struct Script {
    pub name: String,
    pub description: Option<String>,
    pub path: Option<PathBuf>,
    /// Initial variable values, applied when not already set
    pub variables: Vec<(String, String)>,
    pub commands: Vec<Box<dyn ScriptCommand>>,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let commands: Vec<&str> = self.commands.iter().map(|c| c.name()).collect();
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("variables", &self.variables)
            .field("commands", &commands)
            .finish()
    }
}

/// One validation problem, tied to its step
#[derive(Debug, Clone, PartialEq)]
pub struct StepIssue {
    pub index: usize,
    pub command: &'static str,
    pub error: ValidationError,
}

impl Script {
    pub fn new(name: &str, commands: Vec<Box<dyn ScriptCommand>>) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            path: None,
            variables: Vec::new(),
            commands,
        }
    }

    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.variables.push((name.to_string(), value.to_string()));
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Validate every enabled command against its descriptor
    pub fn validate(&self) -> Vec<StepIssue> {
        self.commands
            .iter()
            .enumerate()
            .filter(|(_, command)| command.is_enabled())
            .flat_map(|(index, command)| {
                let errors = command.validate().err().unwrap_or_default();
                errors.into_iter().map(move |error| StepIssue {
                    index,
                    command: command.name(),
                    error,
                })
            })
            .collect()
    }

    /// Serialize back into the on-disk form
    pub fn to_file(&self) -> ScriptFile {
        ScriptFile {
            name: Some(self.name.clone()),
            description: self.description.clone(),
            variables: self
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), serde_yaml::Value::String(v.clone())))
                .collect(),
            commands: self.commands.iter().map(|c| c.to_record()).collect(),
        }
    }
}

/// Flatten a script file's initial variables into strings.
///
/// Mappings and sequences are stored as JSON so `${name.path}` can read
/// into them.
pub(crate) fn initial_variables(file: &ScriptFile) -> Vec<(String, String)> {
    file.variables
        .iter()
        .filter_map(|(name, value)| {
            let text = match scalar_to_string(value) {
                Some(text) => Some(text),
                None => serde_json::to_string(value).ok(),
            };
            if text.is_none() {
                log::warn!("variable '{}' cannot be represented as text; ignored", name);
            }
            text.map(|t| (name.clone(), t))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::variable::SetVariableCommand;
    use crate::commands::CommandConfig;
    use crate::parser::yaml::parse_script_content;

    #[test]
    fn test_validate_reports_step_index_and_skips_disabled() {
        let mut disabled = CommandConfig::from_descriptor(&SetVariableCommand::DESCRIPTOR);
        disabled.enabled = false;

        let script = Script::new(
            "s",
            vec![
                Box::new(SetVariableCommand::new(
                    CommandConfig::from_descriptor(&SetVariableCommand::DESCRIPTOR)
                        .with("variableName", "a")
                        .unwrap(),
                )),
                Box::new(SetVariableCommand::new(disabled)),
                Box::new(SetVariableCommand::new(CommandConfig::from_descriptor(
                    &SetVariableCommand::DESCRIPTOR,
                ))),
            ],
        );

        let issues = script.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].index, 2);
        assert_eq!(issues[0].command, "setVariable");
        assert_eq!(issues[0].error.property(), "variableName");
    }

    #[test]
    fn test_structured_variables_become_json() {
        let file = parse_script_content(
            r#"
variables:
  user:
    name: ada
    roles: [admin]
  count: 3
"#,
        )
        .unwrap();

        let vars = initial_variables(&file);
        assert_eq!(vars[0], ("count".to_string(), "3".to_string()));
        assert_eq!(vars[1].0, "user");
        let json: serde_json::Value = serde_json::from_str(&vars[1].1).unwrap();
        assert_eq!(json["name"], "ada");
    }
}
