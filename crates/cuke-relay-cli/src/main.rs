//! cuke-relay command-line tools
//!
//! Usage:
//!   cuke-relay merge <files..> [--output <file>]
//!   cuke-relay normalize <file> [--output <file>]
//!   cuke-relay patterns --integration-folder <dir> [--config <file>] <feature>
//!   cuke-relay config [--config <file>] [--env KEY=VALUE..]
//!
//! Logs go to stderr and follow `RUST_LOG`.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cuke_relay::config::{resolve, RuntimeContext, TestingType};
use cuke_relay::messages::{
    merge_messages, order_messages, read_envelopes, remove_duplicated_step_definitions,
    write_envelopes, Envelope,
};
use cuke_relay::paths::{ensure_is_absolute, step_definition_patterns};
use serde_json::{Map, Value};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "cuke-relay")]
#[command(author, version, about = "Cucumber message logs and configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge several NDJSON message logs into one
    Merge {
        /// Logs to merge, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Order a message log and collapse duplicated step definitions
    Normalize {
        file: PathBuf,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the step-definition patterns searched for a feature
    Patterns {
        /// Configuration file (YAML, or JSON when ending in `.json`)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Folder the feature files live in
        #[arg(long)]
        integration_folder: PathBuf,

        /// Project root (default: current directory)
        #[arg(long)]
        project_root: Option<PathBuf>,

        #[arg(long, default_value = "e2e")]
        testing_type: TestingType,

        /// Environment override as KEY=VALUE, e.g. stepDefinitions=steps/*.rs
        #[arg(short, long = "env", value_parser = parse_key_value)]
        env: Vec<(String, String)>,

        feature: PathBuf,
    },

    /// Print the resolved configuration as JSON
    Config {
        /// Configuration file (YAML, or JSON when ending in `.json`)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Folder the feature files live in (default: `<project-root>/features`)
        #[arg(long)]
        integration_folder: Option<PathBuf>,

        /// Project root (default: current directory)
        #[arg(long)]
        project_root: Option<PathBuf>,

        #[arg(long, default_value = "e2e")]
        testing_type: TestingType,

        /// Environment override as KEY=VALUE, e.g. messagesEnabled=true
        #[arg(short, long = "env", value_parser = parse_key_value)]
        env: Vec<(String, String)>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Merge { files, output } => {
            let logs = files.iter().map(|file| read_log(file)).collect::<Result<Vec<_>>>()?;
            let merged = merge_messages(logs)?;
            info!(files = files.len(), envelopes = merged.len(), "merged logs");
            write_log(output.as_deref(), &merged)
        }

        Commands::Normalize { file, output } => {
            let envelopes = read_log(&file)?;
            let normalized = remove_duplicated_step_definitions(order_messages(envelopes));
            write_log(output.as_deref(), &normalized)
        }

        Commands::Patterns {
            config,
            integration_folder,
            project_root,
            testing_type,
            env,
            feature,
        } => {
            let project_root = project_root_or_cwd(project_root)?;
            let runtime = RuntimeContext {
                testing_type,
                implicit_integration_folder: ensure_is_absolute(&project_root, &integration_folder),
                project_root: project_root.clone(),
            };
            let configuration = resolve(config.as_deref(), &environment(env), &runtime)?;
            let feature = ensure_is_absolute(&project_root, &feature);

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for pattern in step_definition_patterns(&configuration, &feature)? {
                writeln!(out, "{pattern}")?;
            }
            Ok(())
        }

        Commands::Config {
            config,
            integration_folder,
            project_root,
            testing_type,
            env,
        } => {
            let project_root = project_root_or_cwd(project_root)?;
            let integration_folder =
                integration_folder.unwrap_or_else(|| PathBuf::from("features"));
            let runtime = RuntimeContext {
                testing_type,
                implicit_integration_folder: ensure_is_absolute(&project_root, &integration_folder),
                project_root,
            };
            let configuration = resolve(config.as_deref(), &environment(env), &runtime)?;
            println!("{}", serde_json::to_string_pretty(&configuration)?);
            Ok(())
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Overrides arrive as strings, like real environment variables.
fn environment(pairs: Vec<(String, String)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

fn project_root_or_cwd(project_root: Option<PathBuf>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    Ok(match project_root {
        Some(root) => ensure_is_absolute(&cwd, &root),
        None => cwd,
    })
}

fn read_log(path: &Path) -> Result<Vec<Envelope>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let envelopes = read_envelopes(BufReader::new(file))
        .with_context(|| format!("failed to read {}", path.display()))?;
    debug!(path = %path.display(), envelopes = envelopes.len(), "read log");
    Ok(envelopes)
}

fn write_log(output: Option<&Path>, envelopes: &[Envelope]) -> Result<()> {
    match output {
        Some(path) => {
            if path.is_dir() {
                bail!("{} is a directory", path.display());
            }
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_envelopes(BufWriter::new(file), envelopes)?;
            info!(path = %path.display(), "wrote log");
        }
        None => write_envelopes(io::stdout().lock(), envelopes)?,
    }
    Ok(())
}
