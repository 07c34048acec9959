//! Error types for monobuild
//!
//! Uses `miette` for pretty error reporting with help text. Target outcomes
//! fall into two classes: [`SkipError`] (the target has nothing to do) and
//! everything else (a hard failure that is aggregated and may stop the run).

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Main error type for monobuild operations
#[derive(Error, Diagnostic, Debug)]
pub enum BuildError {
    #[error("Configuration file not found")]
    #[diagnostic(
        code(monobuild::config::not_found),
        help("Create a monobuild.toml in your repository root, or specify one with --config")
    )]
    ConfigNotFound { searched: Vec<PathBuf> },

    #[error("Failed to parse configuration")]
    #[diagnostic(code(monobuild::config::parse))]
    ConfigParse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid target '{target}': {reason}")]
    #[diagnostic(code(monobuild::config::invalid_target))]
    InvalidTarget { target: String, reason: String },

    #[error("Target '{name}' not found")]
    #[diagnostic(
        code(monobuild::target::not_found),
        help("Run `monobuild list` to see available targets")
    )]
    TargetNotFound { name: String },

    #[error("circular dependency detected at '{node}'")]
    #[diagnostic(
        code(monobuild::graph::cycle),
        help("Check the 'depends_on' field in your target definitions")
    )]
    CircularDependency { node: String },

    #[error("circular dependency: '{node}' depends on itself")]
    #[diagnostic(code(monobuild::graph::self_loop))]
    SelfDependency { node: String },

    #[error("node '{node}' not found{}", required_by_suffix(.required_by))]
    #[diagnostic(code(monobuild::graph::not_found))]
    NodeNotFound {
        node: String,
        required_by: Option<String>,
    },

    #[error(transparent)]
    #[diagnostic(code(monobuild::exec::skipped))]
    Skip(#[from] SkipError),

    #[error("[{target}] {command}: {source}")]
    #[diagnostic(code(monobuild::exec::failed))]
    Execution {
        target: String,
        command: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("'{command}' in target '{target}' exited with code {code}")]
    #[diagnostic(code(monobuild::exec::exit_code))]
    CommandFailed {
        target: String,
        command: String,
        code: i32,
        #[help]
        stderr: Option<String>,
    },

    #[error("task for target '{target}' panicked: {message}")]
    #[diagnostic(code(monobuild::exec::panic))]
    TaskPanic { target: String, message: String },

    #[error("operation cancelled")]
    #[diagnostic(code(monobuild::cancelled))]
    Cancelled,

    #[error("{message}")]
    #[diagnostic(code(monobuild::environment))]
    Environment { message: String, exit_code: u8 },

    #[error("CI pipeline failed in phase(s): {}", .failed_phases.join(", "))]
    #[diagnostic(code(monobuild::ci::failed))]
    PipelineFailed {
        failed_phases: Vec<String>,
        /// Exit code of an environment failure inside a phase
        exit_code: Option<u8>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Multiple(#[from] MultiError),

    #[error("I/O error")]
    #[diagnostic(code(monobuild::io))]
    Io(#[from] std::io::Error),
}

/// Result type alias for monobuild operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Why a target legitimately had nothing to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The target does not define the requested command
    NoCommand,
    /// Docker mode was requested but the target has no image
    NoDockerImage,
    /// The target opted out for another reason (see detail)
    NotApplicable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::NoCommand => "no such command",
            SkipReason::NoDockerImage => "no docker image configured",
            SkipReason::NotApplicable => "not applicable",
        };
        f.write_str(s)
    }
}

/// Soft signal: the target has nothing to do for this command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{target}] {command}: skipped ({reason}){}", detail_suffix(.detail))]
pub struct SkipError {
    pub target: String,
    pub command: String,
    pub reason: SkipReason,
    pub detail: String,
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(name) => format!(" (required by '{name}')"),
        None => String::new(),
    }
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

impl SkipError {
    pub fn new(target: impl Into<String>, command: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            target: target.into(),
            command: command.into(),
            reason,
            detail: String::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Several independent failures, kept as separate causes
#[derive(Error, Diagnostic, Debug)]
pub struct MultiError {
    #[related]
    errors: Vec<BuildError>,
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl MultiError {
    pub fn new(errors: Vec<BuildError>) -> Self {
        Self { errors }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildError> {
        self.errors.iter()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_inner(self) -> Vec<BuildError> {
        self.errors
    }
}

impl BuildError {
    /// Wrap a target failure as `[target] command: <message>`
    pub fn execution(target: &str, command: &str, source: BuildError) -> Self {
        BuildError::Execution {
            target: target.to_string(),
            command: command.to_string(),
            source: Box::new(source),
        }
    }

    /// Find a skip signal in this error, looking one level into wrappers
    pub fn as_skip(&self) -> Option<&SkipError> {
        match self {
            BuildError::Skip(skip) => Some(skip),
            BuildError::Execution { source, .. } => match source.as_ref() {
                BuildError::Skip(skip) => Some(skip),
                _ => None,
            },
            BuildError::Multiple(multi) => multi.iter().find_map(|e| match e {
                BuildError::Skip(skip) => Some(skip),
                _ => None,
            }),
            _ => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        self.as_skip().is_some()
    }

    /// True when the error is a cancellation, directly or as a wrapped cause
    pub fn is_cancelled(&self) -> bool {
        match self {
            BuildError::Cancelled => true,
            BuildError::Execution { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// True for the graph error family (cycle, self loop, undefined node)
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            BuildError::CircularDependency { .. }
                | BuildError::SelfDependency { .. }
                | BuildError::NodeNotFound { .. }
        )
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        self.environment_exit_code().unwrap_or(1)
    }

    /// Exit code of the first environment failure, looking through
    /// execution wrappers and multi-errors
    pub fn environment_exit_code(&self) -> Option<u8> {
        match self {
            BuildError::Environment { exit_code, .. } => Some(*exit_code),
            BuildError::Execution { source, .. } => source.environment_exit_code(),
            BuildError::PipelineFailed { exit_code, .. } => *exit_code,
            BuildError::Multiple(multi) => multi.iter().find_map(|e| e.environment_exit_code()),
            _ => None,
        }
    }

    /// Iterate the individual causes: the members of a multi-error, or self
    pub fn causes(&self) -> Box<dyn Iterator<Item = &BuildError> + '_> {
        match self {
            BuildError::Multiple(multi) => Box::new(multi.iter()),
            other => Box::new(std::iter::once(other)),
        }
    }
}

/// Combine accumulated hard errors into a single result
pub fn combine(mut errors: Vec<BuildError>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(BuildError::Multiple(MultiError::new(errors))),
    }
}
