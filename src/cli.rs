//! Interfaz de línea de comandos de `fuzzforge`.
use clap::{Args, Parser, Subcommand};
use forge_adapters::{render_dockerfile, BuildPlan, ContainerEngine, HarnessPipeline, PipelineError, PipelineOutcome,
                     PipelineRun};
use forge_core::FlowEvent;
use forge_domain::PipelineConfig;
use log::{error, info};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{self, ConfigError};

/// Builds libsignal fuzz harnesses into minimal runtime images
#[derive(Parser, Debug)]
#[command(name = "fuzzforge")]
#[command(about = "Build a cargo-fuzz harness into a minimal container image")]
#[command(version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the equivalent multi-stage Dockerfile
    Render,
    /// Print the build plan as JSON
    Plan,
    /// Print the build-stage artifact path and the runtime path
    Locate,
    /// Run the pipeline against the container engine
    Build(BuildArgs),
}

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Source tree copied into the build stage
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Tag for the runtime image
    #[arg(long)]
    pub tag: Option<String>,

    /// Keep the provision and builder images after the run
    #[arg(long)]
    pub keep_build_env: bool,

    /// Write events and outcome as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("cannot write output: {0}")]
    Io(#[from] io::Error),
    #[error("cannot serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) => 2,
            CliError::Pipeline(e) => e.exit_code(),
            CliError::Io(_) | CliError::Json(_) => 1,
        }
    }
}

#[derive(Debug, Serialize)]
struct FailureReport {
    category: &'static str,
    message: String,
    exit_code: u8,
}

/// Contenido de `--report`.
#[derive(Debug, Serialize)]
struct BuildReport<'a> {
    flow_id: Uuid,
    events: &'a [FlowEvent],
    outcome: Option<&'a PipelineOutcome>,
    error: Option<FailureReport>,
}

fn load_config(cli: &Cli, build: Option<&BuildArgs>) -> Result<PipelineConfig, ConfigError> {
    let mut file = config::load_file_config(cli.config.as_deref())?;
    if let Some(args) = build {
        if let Some(dir) = &args.source {
            file.source_dir = Some(dir.clone());
        }
        if let Some(tag) = &args.tag {
            file.output_tag = Some(tag.clone());
        }
        if args.keep_build_env {
            file.keep_build_env = Some(true);
        }
    }
    file.resolve()
}

fn write_report(path: &Path, run: &PipelineRun) -> Result<(), CliError> {
    let error = run.outcome.as_ref().err().map(|e| FailureReport { category: e.category(),
                                                                   message: e.to_string(),
                                                                   exit_code: e.exit_code() });
    let report = BuildReport { flow_id: run.flow_id,
                               events: &run.events,
                               outcome: run.outcome.as_ref().ok(),
                               error };
    let json = serde_json::to_string_pretty(&report)?;
    fs::write(path, json).map_err(|e| {
                             error!("cannot write report {}: {e}", path.display());
                             CliError::Io(e)
                         })?;
    info!("report written to {}", path.display());
    Ok(())
}

/// Ejecuta un subcomando; la salida normal va a `out`.
pub fn execute(cli: &Cli, engine: Arc<dyn ContainerEngine>, out: &mut impl Write) -> Result<(), CliError> {
    match &cli.command {
        Command::Render => {
            let cfg = load_config(cli, None)?;
            out.write_all(render_dockerfile(&BuildPlan::plan_for(&cfg)).as_bytes())?;
        }
        Command::Plan => {
            let cfg = load_config(cli, None)?;
            serde_json::to_writer_pretty(&mut *out, &BuildPlan::plan_for(&cfg))?;
            writeln!(out)?;
        }
        Command::Locate => {
            let locator = load_config(cli, None)?.locator();
            writeln!(out, "artifact: {}", locator.artifact_path())?;
            writeln!(out, "runtime: {}", locator.runtime_path())?;
        }
        Command::Build(args) => {
            let cfg = load_config(cli, Some(args))?;
            let pipeline = HarnessPipeline::new(cfg, engine);
            info!("run {}: runtime image will be {}", pipeline.run_id(), pipeline.tags().runtime);
            let run = pipeline.run_recorded();
            let written = match &args.report {
                Some(path) => write_report(path, &run),
                None => Ok(()),
            };
            // el fallo del pipeline tiene prioridad sobre el del reporte
            let outcome = run.outcome?;
            written?;
            writeln!(out, "{}", outcome.runtime.image)?;
        }
    }
    Ok(())
}
