use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use lumi_automation::commands::CommandCatalog;
use lumi_automation::driver::ChromeLauncher;
use lumi_automation::parser::yaml::records_to_yaml;
use lumi_automation::runner::{self, CancelToken, ProcessInstances, RunOptions};
use lumi_automation::utils::config::{parse_key_value, BrowserConfig, EngineConfig};
use lumi_automation::{report, run_scripts, shutdown_process_instances};

#[derive(Parser)]
#[command(name = "lumi-automation")]
#[command(version = "0.1.0")]
#[command(about = "Script-driven automation runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run script file(s) or directories
    Run {
        /// Script files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Run scripts in parallel, one task per script
        #[arg(long, default_value = "false")]
        parallel: bool,

        /// Keep going after a failed command
        #[arg(long, default_value = "false")]
        continue_on_failure: bool,

        /// Pause between commands (ms)
        #[arg(long, default_value = "0")]
        delay: u64,

        /// Launch browsers headless
        #[arg(long, default_value = "false")]
        headless: bool,

        /// Set a variable, KEY=VALUE. Can be specified multiple times.
        #[arg(long = "var", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,

        /// Output directory for reports
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Write JSON and JUnit reports
        #[arg(long, default_value = "false")]
        report: bool,
    },

    /// Load and validate scripts without running them
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List available commands
    Commands {
        /// Only show this group
        #[arg(short, long)]
        group: Option<String>,

        /// Print descriptors as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show the documentation of one command
    Describe {
        name: String,

        /// Print a script record with default values instead
        #[arg(long, default_value = "false")]
        template: bool,
    },

    /// Generate a report from a results.json file
    Report {
        /// Path to results JSON
        results: PathBuf,

        /// Output format (json, junit)
        #[arg(short, long, default_value = "junit")]
        format: String,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("LUMI_LOG", "warn")).init();

    let cli = Cli::parse();
    let mut browser_config = BrowserConfig::from_env();

    match cli.command {
        Commands::Run {
            paths,
            parallel,
            continue_on_failure,
            delay,
            headless,
            vars,
            output,
            report,
        } => {
            browser_config.headless |= headless;
            let catalog = CommandCatalog::builtin(Arc::new(ChromeLauncher::new(browser_config)));

            println!("{} Running scripts from: {}", "▶".green().bold(), join_paths(&paths));
            if parallel {
                println!("  Parallel: {}", "Enabled".yellow());
            }
            if continue_on_failure {
                println!("  Continue on failure: {}", "Enabled".yellow());
            }
            if report {
                println!("  Reports: {}", output.display().to_string().cyan());
            }

            let cancel = CancelToken::new();
            let handler_token = cancel.clone();
            ctrlc::set_handler(move || {
                eprintln!("\n{} Cancelling after the current step...", "⏹".yellow());
                handler_token.cancel();
            })?;

            let options = RunOptions {
                parallel,
                engine: EngineConfig {
                    continue_on_failure,
                    command_delay_ms: delay,
                },
                variables: vars,
                output,
                report,
            };

            let result = run_scripts(&paths, &catalog, &options, cancel).await;

            let unclosed = shutdown_process_instances(&ProcessInstances::global()).await;
            if unclosed > 0 {
                eprintln!("{} {} kept-alive instance(s) could not be closed", "⚠".yellow(), unclosed);
            }

            let summary = result?;
            if !summary.all_completed() {
                anyhow::bail!(
                    "{} of {} script run(s) did not complete",
                    summary.total_runs - summary.completed_runs,
                    summary.total_runs
                );
            }
        }

        Commands::Check { paths } => {
            let catalog = CommandCatalog::builtin(Arc::new(ChromeLauncher::new(browser_config)));
            let files = runner::collect_script_files(&paths)?;
            let mut problems = 0;

            for file in &files {
                match catalog.load_path(file) {
                    Ok(script) => {
                        let issues = script.validate();
                        if issues.is_empty() {
                            println!("{} {}", "✓".green(), file.display());
                        } else {
                            println!("{} {}", "✗".red(), file.display());
                            for issue in &issues {
                                println!(
                                    "    step {} ({}): {}",
                                    issue.index,
                                    issue.command.cyan(),
                                    issue.error
                                );
                            }
                            problems += issues.len();
                        }
                    }
                    Err(e) => {
                        println!("{} {}", "✗".red(), file.display());
                        println!("    {}", e);
                        problems += 1;
                    }
                }
            }

            if problems > 0 {
                anyhow::bail!("{} problem(s) found in {} file(s)", problems, files.len());
            }
            println!("{} {} script(s) OK", "✓".green().bold(), files.len());
        }

        Commands::Commands { group, json } => {
            let catalog = CommandCatalog::builtin(Arc::new(ChromeLauncher::new(browser_config)));
            let wanted = |g: &str| group.as_deref().map_or(true, |w| w.eq_ignore_ascii_case(g));

            if json {
                let descriptors: Vec<_> = catalog.descriptors().filter(|d| wanted(d.group)).collect();
                println!("{}", serde_json::to_string_pretty(&descriptors)?);
            } else {
                for (name, descriptors) in catalog.groups() {
                    if !wanted(name) {
                        continue;
                    }
                    println!("{}", name.white().bold());
                    for d in descriptors {
                        println!("  {:<18} {}", d.name.cyan(), d.description);
                    }
                }
            }
        }

        Commands::Describe { name, template } => {
            let catalog = CommandCatalog::builtin(Arc::new(ChromeLauncher::new(browser_config)));
            let command = catalog
                .create(&name)
                .with_context(|| format!("Unknown command: {}", name))?;

            if template {
                print!("{}", records_to_yaml(&[command.to_record()])?);
                return Ok(());
            }

            let d = command.descriptor();
            println!("{} ({})", d.display_label.white().bold(), d.name.cyan());
            println!("  Group: {}", d.group);
            println!("  {}", d.description);
            if !d.uses_notes.is_empty() {
                println!("  Uses: {}", d.uses_notes);
            }
            if !d.implementation_notes.is_empty() {
                println!("  Implementation: {}", d.implementation_notes);
            }
            println!();
            for p in d.properties {
                let optional = if p.optional { " (optional)".dimmed().to_string() } else { String::new() };
                println!("  {} - {}{}", p.key.cyan(), p.label, optional);
                if !p.input_spec.is_empty() {
                    println!("      {}", p.input_spec);
                }
                if !p.sample_usage.is_empty() {
                    println!("      Sample: {}", p.sample_usage);
                }
                if !p.remarks.is_empty() {
                    println!("      Remarks: {}", p.remarks);
                }
                if p.is_selector() {
                    println!("      Options: {}", p.options.join(" | "));
                }
                if let Some(default) = p.default {
                    println!("      Default: {}", default);
                }
            }
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".blue(),
                format.cyan(),
                results.display()
            );
            report::generate_report(&results, &format, &output)?;
        }
    }

    Ok(())
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
