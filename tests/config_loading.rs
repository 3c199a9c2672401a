use forge_domain::{BuildProfile, ToolchainChannel};
use fuzzforge::config::{apply_env_overrides, load, ConfigError, FileConfig};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const FORGE_TOML: &str = r#"
base_image = "ubuntu:22.04"
harness = "sealed_sender"
profile = "debug"
toolchain = "nightly-2024-05-01"
native_packages = ["clang", "cmake", "curl"]
source_dir = "/work/libsignal"

[installer]
min_tls = "1.3"

[fuzz_tool]
crate = "cargo-fuzz"
version = "0.12.0"
"#;

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |k: &str| map.get(k).cloned()
}

#[test]
fn file_values_reach_the_pipeline_config() {
    let cfg = FileConfig::from_toml(Path::new("forge.toml"), FORGE_TOML).unwrap().resolve().unwrap();
    assert_eq!(cfg.base_image().to_string(), "ubuntu:22.04");
    assert_eq!(cfg.harness_name().to_string(), "sealed_sender");
    assert_eq!(cfg.profile(), BuildProfile::Debug);
    assert!(cfg.toolchain().is_pinned());
    assert_eq!(cfg.fuzz_tool().version.as_deref(), Some("0.12.0"));
    assert_eq!(cfg.native_packages(), ["clang", "cmake", "curl"]);
    assert_eq!(cfg.locator().artifact_path(),
               "/libsignal/rust/protocol/fuzz/target/x86_64-unknown-linux-gnu/debug/sealed_sender");
    assert_eq!(cfg.installer().trust_label(), "remote-script");
}

#[test]
fn env_overrides_beat_file_values() {
    let mut file = FileConfig::from_toml(Path::new("forge.toml"), FORGE_TOML).unwrap();
    apply_env_overrides(&mut file,
                        env(&[("FORGE_HARNESS", "interaction"),
                              ("FORGE_PROFILE", "release"),
                              ("FORGE_TOOLCHAIN", "nightly")])).unwrap();
    let cfg = file.resolve().unwrap();
    assert_eq!(cfg.harness_name().to_string(), "interaction");
    assert_eq!(cfg.profile(), BuildProfile::Release);
    assert_eq!(cfg.toolchain(), ToolchainChannel::nightly());
    // lo que el entorno no toca sigue viniendo del archivo
    assert_eq!(cfg.base_image().to_string(), "ubuntu:22.04");
}

#[test]
fn installer_digest_from_env_pins_the_installer() {
    let digest = "c".repeat(64);
    let mut file = FileConfig::default();
    apply_env_overrides(&mut file,
                        env(&[("FORGE_INSTALLER_URL", "https://mirror.example/rustup-init.sh"),
                              ("FORGE_INSTALLER_SHA256", digest.as_str())])).unwrap();
    let cfg = file.resolve().unwrap();
    assert_eq!(cfg.installer().url(), "https://mirror.example/rustup-init.sh");
    assert_eq!(cfg.installer().trust_label(), format!("sha256:{digest}"));
}

#[test]
fn invalid_paths_are_rejected() {
    let bad_root = FileConfig::from_toml(Path::new("forge.toml"), "source_root = \"/\"\n").unwrap();
    assert!(matches!(bad_root.resolve(), Err(ConfigError::Domain(_))));

    let bad_dir = FileConfig::from_toml(Path::new("forge.toml"), "fuzz_target_dir = \"../fuzz\"\n").unwrap();
    assert!(matches!(bad_dir.resolve(), Err(ConfigError::Domain(_))));

    let mut file = FileConfig::default();
    let err = apply_env_overrides(&mut file, env(&[("FORGE_HARNESS", "fuzz/interaction")])).unwrap_err();
    assert!(matches!(err, ConfigError::Env { var: "FORGE_HARNESS", .. }));
}

#[test]
fn load_reads_the_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forge.toml");
    fs::write(&path, "platform_triple = \"aarch64-unknown-linux-gnu\"\n").unwrap();
    // puede haber FORGE_* en el entorno de quien corre los tests
    if std::env::var_os("FORGE_PLATFORM_TRIPLE").is_none() {
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.platform_triple().to_string(), "aarch64-unknown-linux-gnu");
    }

    let missing = dir.path().join("absent.toml");
    assert!(matches!(load(Some(&missing)), Err(ConfigError::Io { .. })));

    fs::write(&path, "harness = [1, 2]\n").unwrap();
    assert!(matches!(load(Some(&path)), Err(ConfigError::Toml { .. })));
}
