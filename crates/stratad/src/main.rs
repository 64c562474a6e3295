use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use strata_canon::RawFile;
use strata_config::ensure_workspace_config;
use strata_engine::{AnalysisRequest, run_analysis_from_raw};
use strata_envelope::{AdapterChain, DriftClass, DriftClassifier};
use strata_rules::builtin_registry;

#[derive(Debug, Parser)]
#[command(author, version, about = "STRATA analysis host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Canonicalize a raw file list and run the analysis pipeline.
    Analyze {
        #[arg(long, help = "JSON file holding the raw file list")]
        files: PathBuf,

        #[arg(long, help = "JSON file holding opaque identity data")]
        identity: Option<PathBuf>,

        #[arg(
            long,
            default_value = ".",
            help = "Workspace root holding .strata/config.toml"
        )]
        workspace: PathBuf,
    },
    /// Upgrade a stored envelope to the current structural version.
    Upgrade {
        #[arg(long, help = "JSON file holding the stored envelope")]
        envelope: PathBuf,
    },
    /// Compare two envelopes and classify their drift.
    Drift {
        #[arg(long, help = "JSON file holding the live envelope")]
        live: PathBuf,

        #[arg(long, help = "JSON file holding the candidate envelope")]
        candidate: PathBuf,
    },
}

/// Host-side wire form of one raw file: text content carried as a
/// JSON string. The snapshot collaborator feeding this format is
/// responsible for archive access and symlink/submodule rejection.
#[derive(Debug, Deserialize)]
struct RawFileInput {
    path: String,
    content: String,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze {
            files,
            identity,
            workspace,
        } => run_analyze(files, identity, workspace),
        Command::Upgrade { envelope } => run_upgrade(envelope),
        Command::Drift { live, candidate } => run_drift(live, candidate),
    }
}

fn run_analyze(
    files: PathBuf,
    identity: Option<PathBuf>,
    workspace: PathBuf,
) -> Result<ExitCode> {
    let raw = fs::read_to_string(&files)
        .with_context(|| format!("failed to read raw file list {}", files.display()))?;
    let inputs: Vec<RawFileInput> =
        serde_json::from_str(&raw).context("raw file list is not valid JSON")?;
    let raw_files = inputs
        .into_iter()
        .map(|input| RawFile {
            path: input.path,
            bytes: input.content.into_bytes(),
        })
        .collect();

    let identity = match identity {
        Some(path) => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read identity {}", path.display()))?;
            serde_json::from_str(&raw).context("identity is not valid JSON")?
        }
        None => Value::Null,
    };

    let config = ensure_workspace_config(&workspace)?;
    let registry = builtin_registry()?;
    let envelope = run_analysis_from_raw(
        raw_files,
        &config,
        &registry,
        AnalysisRequest {
            identity,
            now_ms: None,
        },
    )
    .context("snapshot rejected before analysis")?;

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(ExitCode::SUCCESS)
}

fn run_upgrade(envelope: PathBuf) -> Result<ExitCode> {
    let raw = fs::read_to_string(&envelope)
        .with_context(|| format!("failed to read envelope {}", envelope.display()))?;
    let value: Value = serde_json::from_str(&raw).context("envelope is not valid JSON")?;

    let upgraded = AdapterChain::published()
        .upgrade_to_current(value)
        .context("adapter chain failed")?;

    println!("{}", serde_json::to_string_pretty(&upgraded)?);
    Ok(ExitCode::SUCCESS)
}

fn run_drift(live: PathBuf, candidate: PathBuf) -> Result<ExitCode> {
    let read = |path: &PathBuf| -> Result<Value> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read envelope {}", path.display()))?;
        serde_json::from_str(&raw).context("envelope is not valid JSON")
    };
    let live = read(&live)?;
    let candidate = read(&candidate)?;

    let registry = builtin_registry()?;
    let known_namespaces = registry
        .namespaces()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let classifier = DriftClassifier::new(AdapterChain::published(), known_namespaces);
    let report = classifier.classify(live, candidate);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(match report.classification {
        DriftClass::Benign => ExitCode::SUCCESS,
        DriftClass::Warning => ExitCode::from(3),
        DriftClass::Blocker => ExitCode::from(4),
    })
}
