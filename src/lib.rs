pub mod commands;
pub mod driver;
pub mod error;
pub mod parser;
pub mod report;
pub mod runner;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export common items
pub use commands::{CommandCatalog, Script, ScriptCommand};
pub use report::generate_report;
pub use runner::{run_scripts, shutdown_process_instances, ScriptEngine};
