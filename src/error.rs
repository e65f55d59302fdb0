//! Error kinds surfaced by script loading, validation, variable resolution,
//! the instance registry and command execution.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runner::instances::Tier;

/// A configuration value that does not satisfy its property descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required property left empty
    #[error("property '{property}' is required")]
    MissingRequired { property: String },

    /// Selector property holding something other than a declared option
    #[error("property '{property}' has invalid value '{value}' (expected one of: {})", .options.join(", "))]
    InvalidSelection {
        property: String,
        value: String,
        options: Vec<String>,
    },

    /// `${...}` reference that cannot be parsed
    #[error("property '{property}' contains a malformed variable reference: '{value}'")]
    MalformedVariable { property: String, value: String },

    /// Key not declared by the command
    #[error("unknown property '{property}'")]
    UnknownProperty { property: String },
}

impl ValidationError {
    pub fn property(&self) -> &str {
        match self {
            Self::MissingRequired { property }
            | Self::InvalidSelection { property, .. }
            | Self::MalformedVariable { property, .. }
            | Self::UnknownProperty { property } => property,
        }
    }
}

/// A `${name}` reference with no value in the variable table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("variable '{name}' is not defined")]
pub struct UnresolvedVariable {
    pub name: String,
}

/// Instance registry failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no instance named '{name}' ({})", tier_label(.tier))]
    NotFound { tier: Option<Tier>, name: String },

    #[error("instance '{name}' already exists ({tier})")]
    DuplicateReplace { tier: Tier, name: String },

    #[error("instance name must not be empty")]
    InvalidName,
}

fn tier_label(tier: &Option<Tier>) -> String {
    match tier {
        Some(tier) => tier.to_string(),
        None => "any tier".to_string(),
    }
}

/// Error returned by a command's `run`.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{}", join_validation(.0))]
    Validation(Vec<ValidationError>),

    #[error("property '{property}': {source}")]
    Unresolved {
        property: String,
        #[source]
        source: UnresolvedVariable,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    External(#[from] anyhow::Error),
}

fn join_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl CommandError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unresolved { .. } => ErrorKind::UnresolvedVariable,
            Self::Registry(_) => ErrorKind::Registry,
            Self::Failed(_) | Self::External(_) => ErrorKind::Execution,
        }
    }
}

impl From<ValidationError> for CommandError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(vec![err])
    }
}

/// Error category shown in run reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Validation,
    UnresolvedVariable,
    Execution,
    Registry,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::UnresolvedVariable => "unresolved variable",
            Self::Execution => "execution",
            Self::Registry => "registry",
        };
        f.write_str(label)
    }
}

/// Failures while turning a script file into commands.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("failed to read script {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse script: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("script must be a mapping with `commands` or a list of commands")]
    InvalidLayout,

    #[error("step {index}: unknown command '{name}'")]
    UnknownCommand { index: usize, name: String },

    #[error("step {index} ({command}): unknown property '{property}'")]
    UnknownProperty {
        index: usize,
        command: String,
        property: String,
    },

    #[error("step {index} ({command}): property '{property}' must be a scalar value")]
    UnsupportedValue {
        index: usize,
        command: String,
        property: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_kinds() {
        let err = CommandError::from(ValidationError::MissingRequired {
            property: "url".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "property 'url' is required");

        let err = CommandError::Unresolved {
            property: "url".to_string(),
            source: UnresolvedVariable {
                name: "site".to_string(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::UnresolvedVariable);
        assert_eq!(err.to_string(), "property 'url': variable 'site' is not defined");

        let err = CommandError::from(RegistryError::NotFound {
            tier: None,
            name: "b1".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Registry);
        assert_eq!(err.to_string(), "no instance named 'b1' (any tier)");

        let err = CommandError::from(anyhow::anyhow!("driver crashed"));
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_invalid_selection_lists_options() {
        let err = ValidationError::InvalidSelection {
            property: "engineType".to_string(),
            value: "Opera".to_string(),
            options: vec!["Chrome".to_string(), "Edge".to_string()],
        };
        assert_eq!(err.property(), "engineType");
        assert!(err.to_string().contains("expected one of: Chrome, Edge"));
    }
}
