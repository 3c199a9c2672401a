use log::debug;
use std::collections::BTreeSet;
use std::io::Write;
use std::process::{Command, Output, Stdio};

use super::{BuildContext, ContainerEngine, FileInfo, ImageRef, StageBuild};
use crate::error::EngineError;
use crate::plan::render_stage;

/// Bytes de stderr que se conservan en un `CommandFailed`.
const STDERR_TAIL: usize = 4000;

/// Motor que invoca el CLI de docker (o uno compatible, p. ej. podman).
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        DockerCli { program: program.into() }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env("DOCKER_BUILDKIT", "1");
        cmd
    }

    fn run(&self, mut cmd: Command, stdin: Option<&[u8]>) -> Result<Output, EngineError> {
        debug!("exec {cmd:?}");
        let spawn_err = |source| EngineError::Spawn { program: self.program.clone(),
                                                      source };
        let output = match stdin {
            Some(bytes) => {
                let mut child = cmd.stdin(Stdio::piped())
                                   .stdout(Stdio::piped())
                                   .stderr(Stdio::piped())
                                   .spawn()
                                   .map_err(spawn_err)?;
                let written = match child.stdin.take() {
                    Some(mut pipe) => pipe.write_all(bytes),
                    None => Ok(()),
                };
                // siempre se espera al hijo, aunque la escritura haya fallado
                let output = child.wait_with_output()?;
                if output.status.success() {
                    written?;
                } else if let Err(e) = written {
                    debug!("stdin of {} closed early: {e}", self.program);
                }
                output
            }
            None => cmd.output().map_err(spawn_err)?,
        };
        Ok(output)
    }

    fn run_checked(&self, cmd: Command, stdin: Option<&[u8]>) -> Result<Output, EngineError> {
        let output = self.run(cmd, stdin)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(command_failed(&output))
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerEngine for DockerCli {
    fn build_stage(&self, build: &StageBuild<'_>) -> Result<ImageRef, EngineError> {
        let dockerfile = render_stage(build.stage, &build.upstream_tags()).map_err(|e| EngineError::Parse(e.to_string()))?;
        let mut cmd = self.command();
        cmd.args(["build", "--tag", build.tag]);
        match &build.context {
            BuildContext::Empty => {
                cmd.arg("-");
            }
            BuildContext::Dir(dir) => {
                cmd.args(["--file", "-"]).arg(dir);
            }
        }
        self.run_checked(cmd, Some(dockerfile.as_bytes()))?;
        Ok(ImageRef::new(build.tag))
    }

    fn probe(&self, image: &ImageRef, path: &str) -> Result<Option<FileInfo>, EngineError> {
        let mut cmd = self.command();
        cmd.args(["run", "--rm", "--entrypoint", "stat", image.as_str(), "-c", "%s:%a", path]);
        let output = self.run(cmd, None)?;
        match output.status.code() {
            Some(0) => parse_stat(&String::from_utf8_lossy(&output.stdout)).map(Some),
            // stat sale con 1 cuando el path no existe
            Some(1) => Ok(None),
            _ => Err(command_failed(&output)),
        }
    }

    fn list_files(&self, image: &ImageRef) -> Result<BTreeSet<String>, EngineError> {
        let mut cmd = self.command();
        cmd.args(["run", "--rm", "--entrypoint", "find", image.as_str(), "/", "-xdev", "-type", "f"]);
        let output = self.run_checked(cmd, None)?;
        Ok(String::from_utf8_lossy(&output.stdout).lines()
                                                  .filter(|l| !l.is_empty())
                                                  .map(str::to_string)
                                                  .collect())
    }

    fn remove_image(&self, image: &ImageRef) -> Result<(), EngineError> {
        let mut cmd = self.command();
        cmd.args(["image", "rm", "--force", image.as_str()]);
        self.run_checked(cmd, None).map(|_| ())
    }
}

fn command_failed(output: &Output) -> EngineError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let start = stderr.len().saturating_sub(STDERR_TAIL);
    let start = (start..stderr.len()).find(|i| stderr.is_char_boundary(*i))
                                     .unwrap_or(stderr.len());
    EngineError::CommandFailed { status: output.status.code().unwrap_or(-1),
                                 stderr: stderr[start..].trim().to_string() }
}

/// Parsea la salida de `stat -c %s:%a` (tamaño y modo octal).
fn parse_stat(out: &str) -> Result<FileInfo, EngineError> {
    let line = out.trim();
    let (size, mode) = line.split_once(':')
                           .ok_or_else(|| EngineError::Parse(format!("unexpected stat output '{line}'")))?;
    let size = size.parse::<u64>()
                   .map_err(|e| EngineError::Parse(format!("bad size in '{line}': {e}")))?;
    let mode = u32::from_str_radix(mode, 8).map_err(|e| EngineError::Parse(format!("bad mode in '{line}': {e}")))?;
    Ok(FileInfo { size, mode })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{BuildPlan, StageName};
    use forge_domain::PipelineConfig;
    use std::collections::BTreeMap;

    #[test]
    fn stat_output() {
        assert_eq!(parse_stat("1048576:755\n").unwrap(),
                   FileInfo { size: 1_048_576,
                              mode: 0o755 });
        assert!(parse_stat("garbage").is_err());
        assert!(parse_stat("12:9z").is_err());
    }

    fn build_runtime(engine: &DockerCli) -> Result<ImageRef, EngineError> {
        let plan = BuildPlan::plan_for(&PipelineConfig::default());
        let stage = plan.stage(StageName::Runtime).unwrap();
        let upstream = BTreeMap::from([(StageName::Builder, ImageRef::new("fuzzforge-builder:test"))]);
        engine.build_stage(&StageBuild { stage,
                                         tag: "fuzzforge-runtime:test",
                                         context: BuildContext::Empty,
                                         upstream: &upstream })
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = build_runtime(&DockerCli::with_program("/nonexistent/docker")).unwrap_err();
        assert!(matches!(err, EngineError::Spawn { ref program, .. } if program == "/nonexistent/docker"),
                "got {err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn exit_status_wins_over_a_closed_stdin() {
        // `false` no lee stdin; la escritura puede fallar o no según el timing
        let err = build_runtime(&DockerCli::with_program("false")).unwrap_err();
        assert!(matches!(err, EngineError::CommandFailed { status: 1, .. }), "got {err:?}");
    }
}
