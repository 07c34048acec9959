//! CI pipeline orchestration
//!
//! Runs a fixed sequence of phases, first over auxiliary targets (always in
//! order) and then over language targets, and finally gathers build
//! artifacts into a single directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{BuildError, Result};
use crate::runner::{FailurePolicy, RunOptions, Runner, TaskRunSummary};
use crate::sink::OutputSink;
use crate::target::{Target, TargetType, Verbosity};

/// Relative glob patterns searched in each target directory after a run
pub const ARTIFACT_PATTERNS: &[&str] = &[
    "target/release/*",
    "dist/*",
    "build/libs/*.jar",
    "build/distributions/*",
    "bin/Release/**/*.nupkg",
    "*.tgz",
    "*.whl",
];

/// One step of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Clean,
    Restore,
    Check,
    Build,
    Test,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Clean,
        Phase::Restore,
        Phase::Check,
        Phase::Build,
        Phase::Test,
    ];

    /// Command a target must define to take part in this phase
    pub fn command(self, group: TargetType, release: bool) -> &'static str {
        match self {
            Phase::Clean => "clean",
            Phase::Restore if group == TargetType::Auxiliary => "init",
            Phase::Restore => "restore",
            Phase::Check => "check",
            Phase::Build if release => "build-release",
            Phase::Build => "build",
            Phase::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CiOptions {
    pub docker: bool,
    pub policy: FailurePolicy,
    /// Use the release build command
    pub release: bool,
    /// Run language phases on the worker pool
    pub parallel: bool,
    pub artifact_dir: Option<PathBuf>,
    pub verbosity: Verbosity,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    /// Command run in this phase
    pub name: String,
    pub group: TargetType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
    /// Set when the phase failed because its environment was unusable
    pub exit_code: Option<u8>,
}

impl PhaseResult {
    /// A phase no target takes part in
    fn empty(name: &str, group: TargetType) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            group,
            start_time: now,
            end_time: now,
            duration: Duration::ZERO,
            success: true,
            error: None,
            exit_code: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetResult {
    pub name: String,
    pub success: bool,
    pub errors: Vec<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct CiResult {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    /// In execution order
    pub phase_results: Vec<PhaseResult>,
    pub target_results: BTreeMap<String, TargetResult>,
    pub success: bool,
    pub artifact_count: usize,
}

impl CiResult {
    /// Labels of failed phases, e.g. `language/test`
    pub fn failed_phases(&self) -> Vec<String> {
        self.phase_results
            .iter()
            .filter(|p| !p.success)
            .map(|p| format!("{}/{}", p.group, p.name))
            .collect()
    }

    /// The pipeline failure as an error, if it failed
    pub fn error(&self) -> Option<BuildError> {
        (!self.success).then(|| BuildError::PipelineFailed {
            failed_phases: self.failed_phases(),
            exit_code: self.phase_results.iter().find_map(|p| p.exit_code),
        })
    }
}

/// Drives the CI phases through a [`Runner`]
pub struct Pipeline {
    runner: Runner,
}

impl Pipeline {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Run every phase and collect artifacts.
    ///
    /// Phase failures are reported in the returned [`CiResult`]; an `Err` is
    /// only returned when the artifact directory cannot be created.
    pub async fn run_ci(&self, ctx: &CancellationToken, options: &CiOptions) -> Result<CiResult> {
        let start_time = Utc::now();
        let started = Instant::now();
        let sink = self.runner.sink();

        let run_options = RunOptions {
            docker: options.docker,
            policy: options.policy,
            verbosity: options.verbosity,
            ..Default::default()
        };

        let mut phase_results = Vec::new();
        let mut target_results = BTreeMap::new();
        let mut success = true;

        'groups: for group in [TargetType::Auxiliary, TargetType::Language] {
            let targets = self.runner.registry().of_type(group);
            let parallel = group == TargetType::Language && options.parallel;

            for phase in Phase::ALL {
                let command = phase.command(group, options.release);
                let active: Vec<Arc<dyn Target>> = targets
                    .iter()
                    .filter(|t| t.has_command(command))
                    .cloned()
                    .collect();

                if active.is_empty() {
                    tracing::debug!(%group, command, "no targets in phase");
                    phase_results.push(PhaseResult::empty(command, group));
                    continue;
                }

                sink.info(&format!(
                    "{group} {command}: {} target(s){}",
                    active.len(),
                    if parallel { " (parallel)" } else { "" }
                ));

                let phase_start = Utc::now();
                let summary = if parallel {
                    self.runner
                        .run_parallel_summary(ctx, &active, command, &run_options)
                        .await
                } else {
                    self.runner
                        .run_sequential_summary(ctx, &active, command, &run_options)
                        .await
                };

                record_targets(&mut target_results, &summary);

                let failed = summary.error.is_some();
                phase_results.push(PhaseResult {
                    name: command.to_string(),
                    group,
                    start_time: phase_start,
                    end_time: Utc::now(),
                    duration: summary.duration,
                    success: !failed,
                    error: summary.error.as_ref().map(|e| e.to_string()),
                    exit_code: summary
                        .error
                        .as_ref()
                        .and_then(BuildError::environment_exit_code),
                });

                if failed {
                    success = false;
                    tracing::info!(%group, command, "phase failed");
                    if !options.policy.keeps_going() {
                        break 'groups;
                    }
                }
            }
        }

        let mut artifact_count = 0;
        if let Some(dir) = &options.artifact_dir {
            if success || options.policy.keeps_going() {
                artifact_count = collect_artifacts(self.runner.registry().all(), dir, sink).await?;
            }
        }

        Ok(CiResult {
            start_time,
            end_time: Utc::now(),
            duration: started.elapsed(),
            phase_results,
            target_results,
            success,
            artifact_count,
        })
    }
}

fn record_targets(into: &mut BTreeMap<String, TargetResult>, summary: &TaskRunSummary) {
    for result in &summary.results {
        let entry = into
            .entry(result.name.clone())
            .or_insert_with(|| TargetResult {
                name: result.name.clone(),
                success: true,
                errors: Vec::new(),
                duration: Duration::ZERO,
            });

        entry.duration += result.duration;
        if !result.success {
            entry.success = false;
            if let Some(err) = &result.error {
                entry.errors.push(err.clone());
            }
        }
    }
}

/// Copy files matching [`ARTIFACT_PATTERNS`] from each target into `dest`,
/// flattened by file name. Copy failures are warnings.
pub async fn collect_artifacts(
    targets: &[Arc<dyn Target>],
    dest: &Path,
    sink: &dyn OutputSink,
) -> Result<usize> {
    tokio::fs::create_dir_all(dest).await?;

    let roots: Vec<(String, PathBuf)> = targets
        .iter()
        .map(|t| (t.name().to_string(), t.dir().to_path_buf()))
        .collect();

    // Globbing walks directories synchronously
    let scan = tokio::task::spawn_blocking(move || scan_artifacts(&roots))
        .await
        .map_err(|e| BuildError::TaskPanic {
            target: "artifacts".to_string(),
            message: e.to_string(),
        })?;

    for warning in &scan.warnings {
        sink.warn(warning);
    }

    let mut count = 0;
    for path in scan.files {
        let Some(file_name) = path.file_name() else {
            continue;
        };

        match tokio::fs::copy(&path, dest.join(file_name)).await {
            Ok(_) => {
                tracing::debug!(from = %path.display(), "collected artifact");
                count += 1;
            }
            Err(e) => sink.warn(&format!(
                "failed to copy artifact {}: {e}",
                path.display()
            )),
        }
    }

    Ok(count)
}

#[derive(Debug, Default)]
struct ArtifactScan {
    files: Vec<PathBuf>,
    warnings: Vec<String>,
}

fn scan_artifacts(roots: &[(String, PathBuf)]) -> ArtifactScan {
    let mut scan = ArtifactScan::default();

    for (name, dir) in roots {
        let Some(root) = dir.to_str() else {
            scan.warnings.push(format!(
                "skipping artifacts for '{name}': directory is not valid UTF-8"
            ));
            continue;
        };
        let root = glob::Pattern::escape(root);

        for pattern in ARTIFACT_PATTERNS {
            let full = format!("{root}/{pattern}");
            let paths = match glob::glob(&full) {
                Ok(paths) => paths,
                Err(e) => {
                    scan.warnings
                        .push(format!("invalid artifact pattern '{full}': {e}"));
                    continue;
                }
            };

            for entry in paths {
                match entry {
                    Ok(path) if path.is_file() => scan.files.push(path),
                    Ok(_) => {}
                    Err(e) => scan
                        .warnings
                        .push(format!("cannot read artifact candidate: {e}")),
                }
            }
        }
    }

    scan
}
