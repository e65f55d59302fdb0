pub mod types;
pub mod yaml;

pub use types::{CommandRecord, ScriptFile};
pub use yaml::{parse_script_content, parse_script_file};
