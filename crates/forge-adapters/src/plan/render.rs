//! Render del plan a Dockerfile.
//!
//! Dos formas:
//! - `render_dockerfile`: un único Dockerfile multi-stage, con las etapas
//!   referenciadas por nombre.
//! - `render_stage`: el Dockerfile de una sola etapa, con las referencias a
//!   otras etapas resueltas a tags concretos. Es lo que construye `DockerCli`.
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

use super::{BuildPlan, Command, FromSource, Instruction, RunSpec, StageName, StagePlan};

const SYNTAX_HEADER: &str = "# syntax=docker/dockerfile:1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("stage '{stage}' needs an image for upstream stage '{upstream}'")]
    UnresolvedUpstream { stage: StageName, upstream: StageName },
}

/// Dockerfile multi-stage equivalente al plan completo.
pub fn render_dockerfile(plan: &BuildPlan) -> String {
    let mut out = String::new();
    out.push_str(SYNTAX_HEADER);
    out.push('\n');
    for stage in &plan.stages {
        out.push('\n');
        let from = match &stage.from {
            FromSource::Base(img) => img.to_string(),
            FromSource::Stage(s) => s.to_string(),
        };
        let _ = writeln!(out, "FROM {from} AS {}", stage.name);
        for ins in &stage.instructions {
            out.push_str(&render_instruction(ins, |s| s.to_string()));
            out.push('\n');
        }
    }
    out
}

/// Dockerfile de una sola etapa. `upstream` asigna a cada etapa previa el
/// tag de la imagen ya construida.
pub fn render_stage(stage: &StagePlan, upstream: &BTreeMap<StageName, String>) -> Result<String, RenderError> {
    let resolve = |s: StageName| {
        upstream.get(&s)
                .cloned()
                .ok_or(RenderError::UnresolvedUpstream { stage: stage.name,
                                                         upstream: s })
    };
    for dep in stage.dependencies() {
        resolve(dep)?;
    }

    let mut out = String::new();
    out.push_str(SYNTAX_HEADER);
    out.push('\n');
    let from = match &stage.from {
        FromSource::Base(img) => img.to_string(),
        FromSource::Stage(s) => resolve(*s)?,
    };
    let _ = writeln!(out, "FROM {from}");
    for ins in &stage.instructions {
        // las dependencias ya se resolvieron arriba
        out.push_str(&render_instruction(ins, |s| upstream.get(&s).cloned().unwrap_or_default()));
        out.push('\n');
    }
    Ok(out)
}

fn render_instruction(ins: &Instruction, stage_ref: impl Fn(StageName) -> String) -> String {
    match ins {
        Instruction::Env { key, value } => format!("ENV {key}=\"{}\"", escape_double_quoted(value)),
        Instruction::Run(spec) => format!("RUN {}", render_run(spec)),
        Instruction::Fetch { url, sha256, dest, mode } => {
            format!("ADD --checksum=sha256:{sha256} --chmod={mode:o} {url} {dest}")
        }
        Instruction::Copy { src, dest } => format!("COPY {src} {dest}"),
        Instruction::Workdir { path } => format!("WORKDIR {path}"),
        Instruction::CopyFrom { stage, src, dest } => format!("COPY --from={} {src} {dest}", stage_ref(*stage)),
    }
}

/// Línea de shell de un `RUN`. El prefijo de entorno se repite en cada
/// comando porque sólo aplica al comando inmediato.
pub fn render_run(spec: &RunSpec) -> String {
    let env_prefix: String = spec.env
                                 .iter()
                                 .map(|(k, v)| format!("{k}={} ", shell_quote(v)))
                                 .collect();
    let mut parts: Vec<String> = Vec::with_capacity(spec.commands.len() + 1);
    if let Some(cwd) = &spec.cwd {
        parts.push(format!("cd {}", shell_quote(cwd)));
    }
    parts.extend(spec.commands.iter().map(|c| format!("{env_prefix}{}", render_command(c))));
    parts.join(" && ")
}

fn render_command(cmd: &Command) -> String {
    std::iter::once(&cmd.program).chain(cmd.args.iter())
                                 .map(|a| shell_quote(a))
                                 .collect::<Vec<_>>()
                                 .join(" ")
}

/// Cita un argumento para sh sólo cuando hace falta.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
               && arg.chars()
                     .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '+' | '@' | '%' | ','));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

fn escape_double_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
