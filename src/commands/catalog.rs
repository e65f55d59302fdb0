use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use super::browser::{BrowserCloseCommand, BrowserCreateCommand, BrowserNavigateCommand};
use super::flow::{LogMessageCommand, PauseCommand, ThrowErrorCommand};
use super::script::{initial_variables, Script};
use super::variable::SetVariableCommand;
use super::{CommandConfig, CommandDescriptor, ScriptCommand};
use crate::driver::traits::BrowserLauncher;
use crate::error::ScriptError;
use crate::parser::types::{scalar_to_string, CommandRecord, ScriptFile};
use crate::parser::yaml::parse_script_file;

/// Builds a command from its raw configuration
pub type CommandFactory = Arc<dyn Fn(CommandConfig) -> Box<dyn ScriptCommand> + Send + Sync>;

#[derive(Clone)]
struct CatalogEntry {
    descriptor: &'static CommandDescriptor,
    factory: CommandFactory,
}

/// Registry of command variants by name.
///
/// Lookup is case-insensitive; listings keep registration order.
#[derive(Clone, Default)]
pub struct CommandCatalog {
    entries: Vec<CatalogEntry>,
}

impl CommandCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in command, with browsers started by `launcher`
    pub fn builtin(launcher: Arc<dyn BrowserLauncher>) -> Self {
        let mut catalog = Self::new();
        catalog.register(&BrowserCreateCommand::DESCRIPTOR, move |config| {
            Box::new(BrowserCreateCommand::new(config, launcher.clone()))
        });
        catalog.register(&BrowserNavigateCommand::DESCRIPTOR, |config| {
            Box::new(BrowserNavigateCommand::new(config))
        });
        catalog.register(&BrowserCloseCommand::DESCRIPTOR, |config| {
            Box::new(BrowserCloseCommand::new(config))
        });
        catalog.register(&SetVariableCommand::DESCRIPTOR, |config| {
            Box::new(SetVariableCommand::new(config))
        });
        catalog.register(&PauseCommand::DESCRIPTOR, |config| Box::new(PauseCommand::new(config)));
        catalog.register(&LogMessageCommand::DESCRIPTOR, |config| {
            Box::new(LogMessageCommand::new(config))
        });
        catalog.register(&ThrowErrorCommand::DESCRIPTOR, |config| {
            Box::new(ThrowErrorCommand::new(config))
        });
        catalog
    }

    /// Add a variant, replacing any variant with the same name
    pub fn register<F>(&mut self, descriptor: &'static CommandDescriptor, factory: F)
    where
        F: Fn(CommandConfig) -> Box<dyn ScriptCommand> + Send + Sync + 'static,
    {
        let entry = CatalogEntry {
            descriptor,
            factory: Arc::new(factory),
        };
        match self.position(descriptor.name) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.descriptor.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn descriptor(&self, name: &str) -> Option<&'static CommandDescriptor> {
        self.position(name).map(|i| self.entries[i].descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static CommandDescriptor> + '_ {
        self.entries.iter().map(|e| e.descriptor)
    }

    /// Descriptors grouped by their `group`, groups sorted by name
    pub fn groups(&self) -> BTreeMap<&'static str, Vec<&'static CommandDescriptor>> {
        let mut groups: BTreeMap<&'static str, Vec<&'static CommandDescriptor>> = BTreeMap::new();
        for descriptor in self.descriptors() {
            groups.entry(descriptor.group).or_default().push(descriptor);
        }
        groups
    }

    /// A command of variant `name` holding its default configuration
    pub fn create(&self, name: &str) -> Option<Box<dyn ScriptCommand>> {
        self.position(name).map(|i| {
            let entry = &self.entries[i];
            (entry.factory)(CommandConfig::from_descriptor(entry.descriptor))
        })
    }

    /// Build the command for step `index` from its record
    pub fn instantiate(&self, index: usize, record: &CommandRecord) -> Result<Box<dyn ScriptCommand>, ScriptError> {
        let entry = self
            .position(&record.command)
            .map(|i| &self.entries[i])
            .ok_or_else(|| ScriptError::UnknownCommand {
                index,
                name: record.command.clone(),
            })?;

        let mut config = CommandConfig::from_descriptor(entry.descriptor);
        config.enabled = record.enabled;
        config.continue_on_error = record.continue_on_error;

        for (key, value) in &record.properties {
            let text = scalar_to_string(value).ok_or_else(|| ScriptError::UnsupportedValue {
                index,
                command: entry.descriptor.name.to_string(),
                property: key.clone(),
            })?;
            config
                .set(key, text)
                .map_err(|_| ScriptError::UnknownProperty {
                    index,
                    command: entry.descriptor.name.to_string(),
                    property: key.clone(),
                })?;
        }

        Ok((entry.factory)(config))
    }

    /// Turn a parsed script file into a runnable script
    pub fn load(&self, file: &ScriptFile) -> Result<Script, ScriptError> {
        let commands = file
            .commands
            .iter()
            .enumerate()
            .map(|(index, record)| self.instantiate(index, record))
            .collect::<Result<Vec<_>, _>>()?;

        let mut script = Script::new(file.name.as_deref().unwrap_or("script"), commands);
        script.description = file.description.clone();
        script.variables = initial_variables(file);
        Ok(script)
    }

    /// Parse and load a script file from disk
    pub fn load_path(&self, path: &Path) -> Result<Script, ScriptError> {
        let file = parse_script_file(path)?;
        let mut script = self.load(&file)?;
        script.path = Some(path.to_path_buf());
        Ok(script)
    }
}
