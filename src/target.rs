//! Build targets
//!
//! A [`Target`] is a named unit that exposes commands. The runner only talks
//! to targets through this trait; [`ShellTarget`] is the implementation
//! backed by `monobuild.toml`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{BuildError, Result, SkipError, SkipReason};

/// Kind of target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Application or library code in some language toolchain
    Language,
    /// Shared prerequisite (codegen, schemas, infrastructure)
    Auxiliary,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetType::Language => f.pad("language"),
            TargetType::Auxiliary => f.pad("auxiliary"),
        }
    }
}

/// How much command output to show
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Options passed to a single [`Target::execute`] call
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Run inside the target's container image
    pub docker: bool,
    /// Extra arguments appended to every command line
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    pub verbosity: Verbosity,
}

#[async_trait]
pub trait Target: Send + Sync {
    fn name(&self) -> &str;

    fn target_type(&self) -> TargetType;

    /// Names of targets this one depends on
    fn depends_on(&self) -> &[String];

    /// Root directory of the target, used for artifact lookup
    fn dir(&self) -> &Path;

    /// Whether the target defines the named command
    fn has_command(&self, command: &str) -> bool;

    /// Run a command. Must observe `ctx` and stop promptly once it fires.
    async fn execute(
        &self,
        ctx: &CancellationToken,
        command: &str,
        options: &ExecOptions,
    ) -> Result<()>;
}

/// Exit code reported when a required tool is missing
pub const TOOL_NOT_FOUND_EXIT: u8 = 127;

/// A target whose commands are shell lines
#[derive(Debug, Clone)]
pub struct ShellTarget {
    pub name: String,
    pub target_type: TargetType,
    pub dir: PathBuf,
    pub depends_on: Vec<String>,
    pub commands: HashMap<String, Vec<String>>,
    pub env: HashMap<String, String>,
    /// Container image used in docker mode
    pub image: Option<String>,
}

impl ShellTarget {
    pub fn new(name: impl Into<String>, target_type: TargetType, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            target_type,
            dir: dir.into(),
            depends_on: Vec::new(),
            commands: HashMap::new(),
            env: HashMap::new(),
            image: None,
        }
    }

    pub fn with_command(mut self, name: &str, lines: &[&str]) -> Self {
        self.commands
            .insert(name.to_string(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Build the process for one command line
    fn build_command(&self, line: &str, options: &ExecOptions) -> Result<Command> {
        let mut line = line.to_string();
        for arg in &options.args {
            line.push(' ');
            line.push_str(arg);
        }

        let mut command = if options.docker {
            // Checked by the caller
            let image = self.image.as_deref().unwrap_or_default();
            let docker = locate_tool("docker")?;
            let mut c = Command::new(docker);
            c.arg("run")
                .arg("--rm")
                .arg("-v")
                .arg(format!("{}:/workspace", self.dir.display()))
                .arg("-w")
                .arg("/workspace");
            for (k, v) in self.env.iter().chain(options.env.iter()) {
                c.arg("-e").arg(format!("{k}={v}"));
            }
            c.arg(image).arg("sh").arg("-c").arg(&line);
            c
        } else {
            let shell = if cfg!(windows) { "cmd" } else { "sh" };
            let flag = if cfg!(windows) { "/C" } else { "-c" };
            let mut c = Command::new(locate_tool(shell)?);
            c.arg(flag).arg(&line);
            c
        };

        command
            .current_dir(&self.dir)
            .envs(&self.env)
            .envs(&options.env)
            .kill_on_drop(true);

        if options.verbosity == Verbosity::Quiet {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            command.stdout(Stdio::inherit()).stderr(Stdio::piped());
        }

        Ok(command)
    }

    async fn run_line(
        &self,
        ctx: &CancellationToken,
        command_name: &str,
        line: &str,
        options: &ExecOptions,
    ) -> Result<()> {
        if options.verbosity == Verbosity::Verbose {
            tracing::info!(target_name = %self.name, "$ {}", line);
        }

        let child = self.build_command(line, options)?.spawn()?;

        let output = tokio::select! {
            _ = ctx.cancelled() => {
                // Dropping the future kills the child (kill_on_drop)
                tracing::debug!(target_name = %self.name, command = command_name, "cancelled");
                return Err(BuildError::Cancelled);
            }
            output = child.wait_with_output() => output?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BuildError::CommandFailed {
                target: self.name.clone(),
                command: line.to_string(),
                code: output.status.code().unwrap_or(1),
                stderr: (!stderr.is_empty()).then_some(stderr),
            });
        }

        if options.verbosity != Verbosity::Quiet && !output.stderr.is_empty() {
            eprint!("{}", String::from_utf8_lossy(&output.stderr));
        }

        Ok(())
    }
}

fn locate_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| BuildError::Environment {
        message: format!("required tool '{name}' was not found in PATH"),
        exit_code: TOOL_NOT_FOUND_EXIT,
    })
}

#[async_trait]
impl Target for ShellTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn target_type(&self) -> TargetType {
        self.target_type
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn has_command(&self, command: &str) -> bool {
        self.commands.contains_key(command)
    }

    async fn execute(
        &self,
        ctx: &CancellationToken,
        command: &str,
        options: &ExecOptions,
    ) -> Result<()> {
        let Some(lines) = self.commands.get(command) else {
            return Err(SkipError::new(&self.name, command, SkipReason::NoCommand).into());
        };

        if options.docker && self.image.is_none() {
            return Err(SkipError::new(&self.name, command, SkipReason::NoDockerImage)
                .with_detail("set `image` on the target to run it in docker mode")
                .into());
        }

        for line in lines {
            if ctx.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            self.run_line(ctx, command, line, options).await?;
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn quiet() -> ExecOptions {
        ExecOptions {
            verbosity: Verbosity::Quiet,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_command_is_skip() {
        let target = ShellTarget::new("docs", TargetType::Auxiliary, ".");
        let err = target
            .execute(&CancellationToken::new(), "build", &quiet())
            .await
            .unwrap_err();

        assert_eq!(err.as_skip().map(|s| s.reason), Some(SkipReason::NoCommand));
    }

    #[tokio::test]
    async fn test_docker_without_image_is_skip() {
        let target = ShellTarget::new("api", TargetType::Language, ".").with_command("build", &["true"]);
        let options = ExecOptions {
            docker: true,
            ..quiet()
        };
        let err = target
            .execute(&CancellationToken::new(), "build", &options)
            .await
            .unwrap_err();

        assert_eq!(err.as_skip().map(|s| s.reason), Some(SkipReason::NoDockerImage));
    }

    #[tokio::test]
    async fn test_runs_lines_in_dir_with_env_and_args() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = ShellTarget::new("api", TargetType::Language, dir.path())
            .with_command("build", &["echo \"$GREETING\" > out.txt"]);
        target.env.insert("GREETING".to_string(), "hello".to_string());

        let options = ExecOptions {
            args: vec!["world".to_string()],
            ..quiet()
        };
        target
            .execute(&CancellationToken::new(), "build", &options)
            .await
            .unwrap();

        let out = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out.trim(), "hello world");
    }

    #[tokio::test]
    async fn test_failure_carries_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let target = ShellTarget::new("api", TargetType::Language, dir.path())
            .with_command("test", &["echo broken >&2; exit 3"]);

        let err = target
            .execute(&CancellationToken::new(), "test", &quiet())
            .await
            .unwrap_err();

        match err {
            BuildError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr.as_deref(), Some("broken"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_running_command() {
        let dir = tempfile::tempdir().unwrap();
        let target = ShellTarget::new("slow", TargetType::Language, dir.path())
            .with_command("build", &["sleep 30"]);
        let ctx = CancellationToken::new();

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            target.execute(&ctx, "build", &quiet()),
        )
        .await
        .expect("execute should observe cancellation")
        .unwrap_err();

        assert!(err.is_cancelled());
    }
}
