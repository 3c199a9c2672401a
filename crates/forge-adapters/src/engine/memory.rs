//! Motor en memoria.
//!
//! Cada imagen es un `ImageFs`: un mapa ruta → archivo más el entorno y el
//! directorio de trabajo. Las instrucciones se aplican sobre una copia de la
//! imagen de partida; sólo si todas tienen éxito la imagen queda registrada
//! con su tag.
//!
//! Los comandos de `RUN` no ejecutan nada: se registran y, si hay un handler
//! para el programa, el handler muta el filesystem o falla.
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{BuildContext, ContainerEngine, FileInfo, ImageRef, StageBuild};
use crate::error::EngineError;
use crate::plan::{FromSource, Instruction, RunSpec, StageName, CARGO_BIN};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub contents: Vec<u8>,
    pub mode: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFs {
    pub files: BTreeMap<String, FileEntry>,
    pub dirs: BTreeSet<String>,
    pub env: BTreeMap<String, String>,
    pub workdir: String,
}

impl ImageFs {
    pub fn new() -> Self {
        let mut fs = ImageFs { workdir: "/".into(),
                               ..Default::default() };
        fs.dirs.insert("/".into());
        fs
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>, mode: u32) -> Self {
        self.write(path, contents.into(), mode);
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn write(&mut self, path: &str, contents: Vec<u8>, mode: u32) {
        let mut parent = Path::new(path).parent();
        while let Some(p) = parent {
            self.dirs.insert(p.to_string_lossy().into_owned());
            parent = p.parent();
        }
        self.files.insert(path.to_string(), FileEntry { contents, mode });
    }

    pub fn mkdir_p(&mut self, path: &str) {
        let mut cur = Some(Path::new(path));
        while let Some(p) = cur {
            self.dirs.insert(p.to_string_lossy().into_owned());
            cur = p.parent();
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        let trimmed = if path.len() > 1 { path.trim_end_matches('/') } else { path };
        self.dirs.contains(trimmed)
    }

    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    /// Expande `$VAR` y `${VAR}` con el entorno de la imagen.
    pub fn expand(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            let braced = chars.peek() == Some(&'{');
            if braced {
                chars.next();
            }
            let mut name = String::new();
            while let Some(&n) = chars.peek() {
                if n.is_ascii_alphanumeric() || n == '_' {
                    name.push(n);
                    chars.next();
                } else {
                    break;
                }
            }
            if braced && chars.peek() == Some(&'}') {
                chars.next();
            }
            if name.is_empty() {
                out.push('$');
            } else {
                out.push_str(self.env.get(&name).map(String::as_str).unwrap_or_default());
            }
        }
        out
    }
}

/// Un comando de `RUN` tal como lo vería el proceso.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub image: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: String,
    pub env: BTreeMap<String, String>,
}

pub type CommandHandler = Box<dyn FnMut(&Invocation, &mut ImageFs) -> Result<(), String> + Send>;

#[derive(Default)]
struct State {
    images: BTreeMap<String, ImageFs>,
    downloads: BTreeMap<String, Vec<u8>>,
    handlers: BTreeMap<String, CommandHandler>,
    executed: Vec<Invocation>,
}

#[derive(Default)]
pub struct InMemoryImageEngine {
    state: Mutex<State>,
}

impl fmt::Debug for InMemoryImageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryImageEngine")
         .field("images", &state.images.keys().collect::<Vec<_>>())
         .field("handlers", &state.handlers.keys().collect::<Vec<_>>())
         .finish()
    }
}

impl InMemoryImageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // un handler que hizo panic no invalida el estado de las imágenes
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_base(&self, reference: &str, fs: ImageFs) {
        self.lock().images.insert(reference.to_string(), fs);
    }

    /// Contenido servido para una URL de `Fetch`.
    pub fn register_download(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        self.lock().downloads.insert(url.to_string(), bytes.into());
    }

    /// Registra el comportamiento de un programa invocado desde `RUN`.
    /// Programas sin handler terminan con éxito sin efectos.
    pub fn on_command<F>(&self, program: &str, handler: F)
        where F: FnMut(&Invocation, &mut ImageFs) -> Result<(), String> + Send + 'static
    {
        self.lock().handlers.insert(program.to_string(), Box::new(handler));
    }

    pub fn has_image(&self, tag: &str) -> bool {
        self.lock().images.contains_key(tag)
    }

    pub fn images(&self) -> Vec<String> {
        self.lock().images.keys().cloned().collect()
    }

    pub fn image(&self, tag: &str) -> Option<ImageFs> {
        self.lock().images.get(tag).cloned()
    }

    pub fn file(&self, tag: &str, path: &str) -> Option<FileEntry> {
        self.lock().images.get(tag).and_then(|fs| fs.file(path).cloned())
    }

    pub fn executed(&self) -> Vec<Invocation> {
        self.lock().executed.clone()
    }
}

fn failed(status: i32, stderr: impl Into<String>) -> EngineError {
    EngineError::CommandFailed { status,
                                 stderr: stderr.into() }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn upstream_fs(state: &State, build: &StageBuild<'_>, stage: StageName) -> Result<ImageFs, EngineError> {
    let image = build.upstream
                     .get(&stage)
                     .ok_or_else(|| EngineError::UnknownImage(format!("<stage {stage}>")))?;
    state.images
         .get(image.as_str())
         .cloned()
         .ok_or_else(|| EngineError::UnknownImage(image.to_string()))
}

fn copy_context(dir: &Path, src: &str, dest: &str, fs: &mut ImageFs) -> Result<(), EngineError> {
    let root = if src == "." { dir.to_path_buf() } else { dir.join(src) };
    if !root.exists() {
        return Err(failed(1, format!("COPY failed: {src} not found in build context")));
    }
    if root.is_file() {
        let mode = file_mode(&root)?;
        fs.write(dest, std::fs::read(&root)?, mode);
        return Ok(());
    }
    fs.mkdir_p(dest);
    let mut pending = vec![root.clone()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            let rel = path.strip_prefix(&root)
                          .map_err(|e| EngineError::Parse(e.to_string()))?
                          .to_string_lossy()
                          .replace('\\', "/");
            let target = format!("{}/{rel}", dest.trim_end_matches('/'));
            if path.is_dir() {
                fs.mkdir_p(&target);
                pending.push(path);
            } else {
                let mode = file_mode(&path)?;
                fs.write(&target, std::fs::read(&path)?, mode);
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<u32, EngineError> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::metadata(path)?.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Result<u32, EngineError> {
    Ok(0o644)
}

fn run_commands(state: &mut State, tag: &str, spec: &RunSpec, fs: &mut ImageFs) -> Result<(), EngineError> {
    let cwd = spec.cwd.clone().unwrap_or_else(|| fs.workdir.clone());
    if !fs.is_dir(&cwd) {
        return Err(failed(2, format!("/bin/sh: 1: cd: can't cd to {cwd}")));
    }
    for cmd in &spec.commands {
        let mut env = fs.env.clone();
        env.extend(spec.env.iter().cloned());
        let invocation = Invocation { image: tag.to_string(),
                                      program: cmd.program.clone(),
                                      args: cmd.args.clone(),
                                      cwd: cwd.clone(),
                                      env };
        state.executed.push(invocation.clone());
        if let Some(handler) = state.handlers.get_mut(&cmd.program) {
            handler(&invocation, &mut *fs).map_err(|msg| failed(1, msg))?;
        }
    }
    Ok(())
}

impl ContainerEngine for InMemoryImageEngine {
    fn build_stage(&self, build: &StageBuild<'_>) -> Result<ImageRef, EngineError> {
        let mut state = self.lock();
        let mut fs = match &build.stage.from {
            FromSource::Base(img) => {
                let key = img.to_string();
                state.images.get(&key).cloned().ok_or(EngineError::UnknownImage(key))?
            }
            FromSource::Stage(s) => upstream_fs(&state, build, *s)?,
        };

        for ins in &build.stage.instructions {
            match ins {
                Instruction::Env { key, value } => {
                    let expanded = fs.expand(value);
                    fs.env.insert(key.clone(), expanded);
                }
                Instruction::Workdir { path } => {
                    fs.mkdir_p(path);
                    fs.workdir = path.clone();
                }
                Instruction::Run(spec) => run_commands(&mut state, build.tag, spec, &mut fs)?,
                Instruction::Fetch { url, sha256, dest, mode } => {
                    let bytes = state.downloads
                                     .get(url)
                                     .cloned()
                                     .ok_or_else(|| failed(1, format!("failed to fetch {url}: 404 Not Found")))?;
                    let actual = sha256_hex(&bytes);
                    if actual != *sha256 {
                        return Err(EngineError::ChecksumMismatch { url: url.clone(),
                                                                   expected: sha256.clone(),
                                                                   actual });
                    }
                    fs.write(dest, bytes, *mode);
                }
                Instruction::Copy { src, dest } => match &build.context {
                    BuildContext::Dir(dir) => copy_context(dir, src, dest, &mut fs)?,
                    BuildContext::Empty => return Err(failed(1, format!("COPY {src}: no build context"))),
                },
                Instruction::CopyFrom { stage, src, dest } => {
                    let source = upstream_fs(&state, build, *stage)?;
                    let entry = source.file(src)
                                      .cloned()
                                      .ok_or_else(|| failed(1, format!("COPY --from={stage} {src}: not found")))?;
                    fs.write(dest, entry.contents, entry.mode);
                }
            }
        }

        state.images.insert(build.tag.to_string(), fs);
        Ok(ImageRef::new(build.tag))
    }

    fn probe(&self, image: &ImageRef, path: &str) -> Result<Option<FileInfo>, EngineError> {
        let state = self.lock();
        let fs = state.images
                      .get(image.as_str())
                      .ok_or_else(|| EngineError::UnknownImage(image.to_string()))?;
        Ok(fs.file(path).map(|f| FileInfo { size: f.contents.len() as u64,
                                            mode: f.mode }))
    }

    fn list_files(&self, image: &ImageRef) -> Result<BTreeSet<String>, EngineError> {
        let state = self.lock();
        state.images
             .get(image.as_str())
             .map(|fs| fs.files.keys().cloned().collect())
             .ok_or_else(|| EngineError::UnknownImage(image.to_string()))
    }

    fn remove_image(&self, image: &ImageRef) -> Result<(), EngineError> {
        self.lock()
            .images
            .remove(image.as_str())
            .map(|_| ())
            .ok_or_else(|| EngineError::UnknownImage(image.to_string()))
    }
}

/// Handler para `cargo` que imita `cargo install` y `cargo fuzz build`.
///
/// - `cargo install <krate>` deja `<CARGO_BIN>/<krate>` ejecutable.
/// - `cargo +<channel> fuzz build ... <name>` exige `cargo-fuzz` instalado,
///   `Cargo.toml` y `fuzz_targets/<name>.rs` en el cwd, y escribe el binario en
///   `<cwd>/target/<triple>/<profile>/<name>` con modo 0755.
pub fn cargo_fuzz_simulator() -> impl FnMut(&Invocation, &mut ImageFs) -> Result<(), String> + Send + 'static {
    |inv: &Invocation, fs: &mut ImageFs| {
        let args: Vec<&str> = inv.args
                                 .iter()
                                 .map(String::as_str)
                                 .skip_while(|a| a.starts_with('+'))
                                 .collect();
        match args.as_slice() {
            ["install", krate, ..] => {
                fs.write(&format!("{CARGO_BIN}/{krate}"), format!("#!cargo-bin {krate}").into_bytes(), 0o755);
                Ok(())
            }
            ["fuzz", "build", rest @ ..] => {
                if fs.file(&format!("{CARGO_BIN}/cargo-fuzz")).is_none() {
                    return Err("error: no such command: `fuzz`".into());
                }
                if fs.file(&format!("{}/Cargo.toml", inv.cwd)).is_none() {
                    return Err(format!("error: could not find `Cargo.toml` in `{}`", inv.cwd));
                }
                let mut profile = "release";
                let mut triple = "x86_64-unknown-linux-gnu";
                let mut name = None;
                let mut iter = rest.iter();
                while let Some(arg) = iter.next() {
                    match *arg {
                        "--dev" | "-D" => profile = "debug",
                        "--release" | "-O" => profile = "release",
                        "--target" => triple = iter.next().copied().unwrap_or(triple),
                        other if !other.starts_with('-') => name = Some(other),
                        _ => {}
                    }
                }
                let name = name.ok_or("error: no fuzz target given")?;
                if fs.file(&format!("{}/fuzz_targets/{name}.rs", inv.cwd)).is_none() {
                    return Err(format!("error: no bin target named `{name}`"));
                }
                let out = format!("{}/target/{triple}/{profile}/{name}", inv.cwd);
                fs.write(&out, format!("\x7fELF fuzz harness {name} ({triple}, {profile})").into_bytes(), 0o755);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
