use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::commands::CommandConfig;

/// A script file as written on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptFile {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Initial variable values
    #[serde(default)]
    pub variables: BTreeMap<String, serde_yaml::Value>,

    #[serde(default)]
    pub commands: Vec<CommandRecord>,
}

/// One serialized command: its variant name plus raw property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub command: String,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub continue_on_error: bool,

    #[serde(flatten)]
    pub properties: BTreeMap<String, serde_yaml::Value>,
}

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl CommandRecord {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            enabled: true,
            continue_on_error: false,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.properties
            .insert(key.to_string(), serde_yaml::Value::String(value.to_string()));
        self
    }

    pub fn from_config(name: &str, config: &CommandConfig) -> Self {
        Self {
            command: name.to_string(),
            enabled: config.enabled,
            continue_on_error: config.continue_on_error,
            properties: config
                .values()
                .map(|(k, v)| (k.to_string(), serde_yaml::Value::String(v.to_string())))
                .collect(),
        }
    }
}

/// Render a scalar YAML value as the raw string a property holds.
///
/// Returns `None` for sequences and mappings.
pub fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => None,
    }
}
