//! Task execution engine
//!
//! Runs one command across a list of targets, either strictly in the given
//! order or concurrently under a bounded worker pool. Skip signals are
//! logged and never counted as failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{combine, BuildError, Result};
use crate::registry::Registry;
use crate::sink::OutputSink;
use crate::target::{ExecOptions, Target, Verbosity};

/// Environment variable bounding the parallel worker count
pub const WORKERS_ENV: &str = "MONOBUILD_WORKERS";

/// Largest accepted worker count
pub const MAX_WORKERS: usize = 256;

/// What to do after the first hard failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failure
    #[default]
    FailFast,
    /// Keep going and report every failure at the end
    Continue,
}

impl FailurePolicy {
    pub fn from_continue(keep_going: bool) -> Self {
        if keep_going {
            FailurePolicy::Continue
        } else {
            FailurePolicy::FailFast
        }
    }

    pub fn keeps_going(self) -> bool {
        self == FailurePolicy::Continue
    }
}

/// Options for a runner invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub docker: bool,
    pub policy: FailurePolicy,
    /// Use the worker pool instead of ordered execution
    pub parallel: bool,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub verbosity: Verbosity,
}

impl RunOptions {
    /// Options handed to each target
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            docker: self.docker,
            args: self.args.clone(),
            env: self.env.clone(),
            verbosity: self.verbosity,
        }
    }
}

/// Parsed test totals reported by a target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TestCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Result of executing a command on a single target
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub name: String,
    pub success: bool,
    /// The target had nothing to do
    pub skipped: bool,
    pub duration: Duration,
    pub error: Option<String>,
    pub test_counts: Option<TestCounts>,
}

impl TaskResult {
    fn new(name: &str, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            skipped: false,
            duration,
            error: None,
            test_counts: None,
        }
    }
}

/// Outcome of one runner invocation
#[derive(Debug)]
pub struct TaskRunSummary {
    pub command: String,
    /// Per-target results in input order; targets that never started are absent
    pub results: Vec<TaskResult>,
    pub duration: Duration,
    pub error: Option<BuildError>,
}

impl TaskRunSummary {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success && !r.skipped).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| r.skipped).count()
    }

    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Resolve the worker count from a raw setting.
///
/// Accepts integers in `1..=256`; anything else warns and falls back to the
/// number of logical CPUs (at least 1).
pub fn resolve_workers(raw: Option<&str>, sink: &dyn OutputSink) -> usize {
    let fallback = num_cpus::get().max(1);

    match raw.map(|r| (r, r.parse::<usize>())) {
        Some((_, Ok(n))) if (1..=MAX_WORKERS).contains(&n) => n,
        Some((r, _)) => {
            sink.warn(&format!(
                "invalid {WORKERS_ENV} value '{r}' (expected 1-{MAX_WORKERS}); using {fallback} workers"
            ));
            fallback
        }
        None => {
            sink.warn(&format!(
                "{WORKERS_ENV} is not set; using {fallback} workers"
            ));
            fallback
        }
    }
}

/// Executes commands across targets
pub struct Runner {
    registry: Arc<Registry>,
    sink: Arc<dyn OutputSink>,
    workers: Option<String>,
}

impl Runner {
    pub fn new(registry: Arc<Registry>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            registry,
            sink,
            workers: None,
        }
    }

    /// Use this worker setting instead of reading the environment
    pub fn with_workers(mut self, raw: impl Into<String>) -> Self {
        self.workers = Some(raw.into());
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sink(&self) -> &dyn OutputSink {
        self.sink.as_ref()
    }

    /// Worker count, read at call time
    pub fn workers(&self) -> usize {
        let from_env = std::env::var(WORKERS_ENV).ok();
        let raw = self.workers.as_deref().or(from_env.as_deref());
        resolve_workers(raw, self.sink.as_ref())
    }

    /// Run a command on every registered target
    pub async fn run_all(
        &self,
        ctx: &CancellationToken,
        command: &str,
        options: &RunOptions,
    ) -> Result<()> {
        let targets = self.registry.all().to_vec();
        self.run(ctx, &targets, command, options).await
    }

    /// Run a command on the named targets and their dependencies
    pub async fn run_targets(
        &self,
        ctx: &CancellationToken,
        names: &[&str],
        command: &str,
        options: &RunOptions,
    ) -> Result<()> {
        let targets = self.registry.resolve(names)?;
        self.run(ctx, &targets, command, options).await
    }

    /// Dispatch on `options.parallel`
    pub async fn run(
        &self,
        ctx: &CancellationToken,
        targets: &[Arc<dyn Target>],
        command: &str,
        options: &RunOptions,
    ) -> Result<()> {
        self.run_summary(ctx, targets, command, options)
            .await
            .into_result()
    }

    pub async fn run_summary(
        &self,
        ctx: &CancellationToken,
        targets: &[Arc<dyn Target>],
        command: &str,
        options: &RunOptions,
    ) -> TaskRunSummary {
        if options.parallel {
            self.run_parallel_summary(ctx, targets, command, options)
                .await
        } else {
            self.run_sequential_summary(ctx, targets, command, options)
                .await
        }
    }

    /// Run targets one after another in the given order
    pub async fn run_sequential(
        &self,
        ctx: &CancellationToken,
        targets: &[Arc<dyn Target>],
        command: &str,
        options: &RunOptions,
    ) -> Result<()> {
        self.run_sequential_summary(ctx, targets, command, options)
            .await
            .into_result()
    }

    pub async fn run_sequential_summary(
        &self,
        ctx: &CancellationToken,
        targets: &[Arc<dyn Target>],
        command: &str,
        options: &RunOptions,
    ) -> TaskRunSummary {
        let start = Instant::now();
        let exec = options.exec_options();
        let mut results = Vec::with_capacity(targets.len());
        let mut errors = Vec::new();

        for target in targets {
            if ctx.is_cancelled() {
                return TaskRunSummary {
                    command: command.to_string(),
                    results,
                    duration: start.elapsed(),
                    error: Some(BuildError::Cancelled),
                };
            }

            let (result, outcome) =
                execute_one(self.sink.as_ref(), ctx, target.as_ref(), command, &exec).await;
            results.push(result);

            if let Err(err) = outcome {
                errors.push(err);
                if !options.policy.keeps_going() {
                    break;
                }
            }
        }

        TaskRunSummary {
            command: command.to_string(),
            results,
            duration: start.elapsed(),
            error: combine(errors).err(),
        }
    }

    /// Run targets concurrently under the worker limit.
    ///
    /// Declared dependencies are not respected and completion order is
    /// unspecified.
    pub async fn run_parallel(
        &self,
        ctx: &CancellationToken,
        targets: &[Arc<dyn Target>],
        command: &str,
        options: &RunOptions,
    ) -> Result<()> {
        self.run_parallel_summary(ctx, targets, command, options)
            .await
            .into_result()
    }

    pub async fn run_parallel_summary(
        &self,
        ctx: &CancellationToken,
        targets: &[Arc<dyn Target>],
        command: &str,
        options: &RunOptions,
    ) -> TaskRunSummary {
        let start = Instant::now();

        if targets.iter().any(|t| !t.depends_on().is_empty()) {
            self.sink.warn(
                "parallel mode ignores depends_on; targets may run before their dependencies",
            );
        }

        let workers = self.workers();
        tracing::debug!(workers, targets = targets.len(), command, "dispatching in parallel");

        let semaphore = Arc::new(Semaphore::new(workers));
        let fail_fast = ctx.child_token();
        let shared = Arc::new(Mutex::new(Shared::default()));
        let exec = Arc::new(options.exec_options());
        let command_name: Arc<str> = Arc::from(command);
        let keep_going = options.policy.keeps_going();

        let mut handles = Vec::with_capacity(targets.len());

        for (index, target) in targets.iter().enumerate() {
            let target = Arc::clone(target);
            let semaphore = Arc::clone(&semaphore);
            let fail_fast = fail_fast.clone();
            let shared = Arc::clone(&shared);
            let exec = Arc::clone(&exec);
            let command = Arc::clone(&command_name);
            let sink = Arc::clone(&self.sink);

            let name = target.name().to_string();
            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = fail_fast.cancelled() => return,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                // Cancelled while this unit waited for its slot
                if fail_fast.is_cancelled() {
                    return;
                }

                let (result, outcome) =
                    execute_one(sink.as_ref(), &fail_fast, target.as_ref(), &command, &exec).await;

                let mut shared = shared.lock().unwrap_or_else(|e| e.into_inner());
                shared.results.push((index, result));
                if let Err(err) = outcome {
                    // Record and cancel under the same lock
                    shared.errors.push(err);
                    if !keep_going {
                        fail_fast.cancel();
                    }
                }
            });
            handles.push((name, handle));
        }

        let mut panics = Vec::new();
        for (name, handle) in handles {
            if let Err(e) = handle.await {
                tracing::error!(target_name = %name, error = %e, "worker task failed");
                panics.push(BuildError::TaskPanic {
                    target: name,
                    message: e.to_string(),
                });
            }
        }

        let Shared {
            mut results,
            mut errors,
        } = std::mem::take(&mut *shared.lock().unwrap_or_else(|e| e.into_inner()));

        errors.extend(panics);
        if errors.is_empty() && ctx.is_cancelled() {
            errors.push(BuildError::Cancelled);
        }

        results.sort_by_key(|(index, _)| *index);

        TaskRunSummary {
            command: command.to_string(),
            results: results.into_iter().map(|(_, r)| r).collect(),
            duration: start.elapsed(),
            error: combine(errors).err(),
        }
    }
}

#[derive(Default)]
struct Shared {
    results: Vec<(usize, TaskResult)>,
    errors: Vec<BuildError>,
}

/// Execute one target and classify the outcome.
///
/// Returns the wrapped hard error, if any; skips are reported to the sink.
async fn execute_one(
    sink: &dyn OutputSink,
    ctx: &CancellationToken,
    target: &dyn Target,
    command: &str,
    exec: &ExecOptions,
) -> (TaskResult, Result<()>) {
    let name = target.name();
    tracing::debug!(target_name = name, command, "executing");

    let start = Instant::now();
    let outcome = target.execute(ctx, command, exec).await;
    let mut result = TaskResult::new(name, start.elapsed());

    match outcome {
        Ok(()) => (result, Ok(())),
        Err(err) => {
            if let Some(skip) = err.as_skip() {
                sink.warn(&skip.to_string());
                result.skipped = true;
                return (result, Ok(()));
            }

            let err = BuildError::execution(name, command, err);
            result.success = false;
            result.error = Some(err.to_string());
            (result, Err(err))
        }
    }
}
