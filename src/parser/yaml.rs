use super::types::{CommandRecord, ScriptFile};
use crate::error::ScriptError;
use std::path::Path;

/// Parse a YAML (or JSON) script file
pub fn parse_script_file(path: &Path) -> Result<ScriptFile, ScriptError> {
    let content = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut script = parse_script_content(&content)?;
    if script.name.is_none() {
        script.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string());
    }
    Ok(script)
}

/// Parse script content.
///
/// Accepts either a mapping with a `commands` list or, as a shorthand, a
/// bare list of command records.
pub fn parse_script_content(content: &str) -> Result<ScriptFile, ScriptError> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;

    match value {
        serde_yaml::Value::Sequence(_) => {
            let commands: Vec<CommandRecord> = serde_yaml::from_value(value)?;
            Ok(ScriptFile {
                commands,
                ..ScriptFile::default()
            })
        }
        serde_yaml::Value::Mapping(_) => Ok(serde_yaml::from_value(value)?),
        serde_yaml::Value::Null => Ok(ScriptFile::default()),
        _ => Err(ScriptError::InvalidLayout),
    }
}

/// Serialize records back into the list form
pub fn records_to_yaml(records: &[CommandRecord]) -> Result<String, ScriptError> {
    Ok(serde_yaml::to_string(records)?)
}
