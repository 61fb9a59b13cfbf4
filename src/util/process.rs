use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};

/// A blocking subprocess invocation with both output streams captured.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner {
    fn run(&self, spec: CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands on the host, resolving bare program names first.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        let program = resolve_binary(&spec.program)?;
        let mut command = Command::new(&program);
        command.args(&spec.args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        hide_window(&mut command);
        let output = command
            .output()
            .with_context(|| format!("failed to spawn `{}`", program.display()))?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Resolve a program by name using env override, then PATH.
///
/// PATH lookup goes through `which`, which also finds `npm.cmd` and friends
/// on Windows without involving a shell.
pub fn resolve_binary(name: &str) -> Result<PathBuf> {
    let env_key = format!("PUBLISH_FLAT_BIN_{}", name.replace('-', "_").to_uppercase());
    if let Ok(path) = env::var(&env_key) {
        let pb = PathBuf::from(path);
        if pb.exists() {
            return Ok(pb);
        }
        bail!("{env_key} points to non-existent binary: {}", pb.display());
    }

    which::which(name)
        .with_context(|| format!("failed to find `{name}` in PATH; set {env_key} or install {name}"))
}

#[cfg(windows)]
fn hide_window(command: &mut Command) {
    use std::os::windows::process::CommandExt;

    // CREATE_NO_WINDOW: keep the publish subprocess from opening a console.
    command.creation_flags(0x0800_0000);
}

#[cfg(not(windows))]
fn hide_window(_command: &mut Command) {}
