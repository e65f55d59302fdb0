pub mod cancel;
pub mod context;
pub mod events;
pub mod executor;
pub mod instances;
pub mod state;
pub mod variables;

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::commands::{CommandCatalog, Script};
use crate::report::types::SessionResults;
use crate::utils::config::EngineConfig;

pub use cancel::CancelToken;
pub use events::*;
pub use executor::ScriptEngine;
pub use instances::{close_handles, InstanceRegistry, ProcessInstances, RunId, Tier};
pub use state::*;
pub use variables::{VariableProvider, VariableTable};

/// How a batch of scripts is run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// One task per script instead of one after another
    pub parallel: bool,
    pub engine: EngineConfig,
    /// `--var` values; they win over a script's own defaults
    pub variables: Vec<(String, String)>,
    pub output: PathBuf,
    pub report: bool,
}

/// Expand files and directories into the script files to run, sorted
pub fn collect_script_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            anyhow::bail!("Path does not exist: {}", path.display());
        }
        if path.is_dir() {
            let mut found: Vec<PathBuf> = walkdir::WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_script_file(e.path()))
                .map(|e| e.path().to_path_buf())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn is_script_file(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext == "yaml" || ext == "yml" || ext == "json")
}

/// Load every script file, stopping at the first one that does not load
pub fn load_scripts(catalog: &CommandCatalog, files: &[PathBuf]) -> Result<Vec<Script>> {
    files
        .iter()
        .map(|file| {
            catalog
                .load_path(file)
                .with_context(|| format!("Failed to load {}", file.display()))
        })
        .collect()
}

fn engine_for(process: &ProcessInstances, options: &RunOptions, emitter: &EventEmitter, cancel: &CancelToken) -> ScriptEngine {
    ScriptEngine::new(process.clone(), options.engine.clone())
        .with_variables(VariableTable::new().with_vars(options.variables.clone()))
        .with_emitter(emitter.clone())
        .with_cancel_token(cancel.clone())
}

/// Run scripts from files or directories against the process-wide
/// instance store.
///
/// Scripts that fail do not make this return an error; check the
/// returned summary.
pub async fn run_scripts(
    paths: &[PathBuf],
    catalog: &CommandCatalog,
    options: &RunOptions,
    cancel: CancelToken,
) -> Result<SessionSummary> {
    let files = collect_script_files(paths)?;
    let session_id = uuid::Uuid::new_v4().to_string();

    if files.is_empty() {
        println!("{} No script files found.", "ℹ".blue());
        return Ok(SessionSummary::from_reports(&session_id, &[], None));
    }

    let scripts = load_scripts(catalog, &files)?;
    let process = ProcessInstances::global();

    let (emitter, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

    emitter.emit(EngineEvent::SessionStarted {
        session_id: session_id.clone(),
    });
    let started = Instant::now();

    let mut reports = Vec::with_capacity(scripts.len());
    if options.parallel && scripts.len() > 1 {
        log::info!("running {} scripts in parallel", scripts.len());
        let mut handles = Vec::new();
        for script in scripts {
            let mut engine = engine_for(&process, options, &emitter, &cancel);
            handles.push(tokio::spawn(async move { engine.run(&script).await }));
        }
        for handle in handles {
            reports.push(handle.await?);
        }
    } else {
        for script in &scripts {
            let mut engine = engine_for(&process, options, &emitter, &cancel);
            reports.push(engine.run(script).await);
        }
    }

    let total_duration_ms = Some(started.elapsed().as_millis() as u64);
    let results = SessionResults::new(&session_id, reports, total_duration_ms);

    emitter.emit(EngineEvent::SessionFinished {
        summary: results.summary.clone(),
    });
    if let Err(e) = listener.await {
        log::debug!("console listener ended abnormally: {}", e);
    }

    if options.report {
        crate::report::write_reports(&results, &options.output)?;
    }

    Ok(results.summary)
}

/// Close every instance still kept alive in `process`.
///
/// Returns how many could not be closed.
pub async fn shutdown_process_instances(process: &ProcessInstances) -> usize {
    let entries = process.drain();
    if entries.is_empty() {
        return 0;
    }
    log::info!("closing {} kept-alive instance(s)", entries.len());
    close_handles(entries).await.len()
}
