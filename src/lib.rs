//! monobuild - a build and CI orchestrator for monorepos
//!
//! This crate provides both a CLI tool and a library for running commands
//! across a set of build targets.
//!
//! # Features
//!
//! - **Simple TOML configuration** - Declare language and auxiliary targets
//! - **Dependency ordering** - Targets run after the targets they depend on
//! - **Parallel execution** - Bounded worker pool with fail-fast cancellation
//! - **CI pipeline** - clean, restore, check, build and test phases with artifact collection
//!
//! # Example
//!
//! ```toml
//! # monobuild.toml
//!
//! [targets.proto]
//! type = "auxiliary"
//! commands.build = ["buf generate"]
//!
//! [targets.api]
//! type = "language"
//! dir = "services/api"
//! depends_on = ["proto"]
//! commands.build = ["cargo build"]
//! commands.test = ["cargo test"]
//! ```
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use monobuild::{Config, Registry, Runner, RunOptions, TracingSink};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (config, path) = Config::load(None)?;
//!     let root = path.parent().unwrap().to_path_buf();
//!     let registry = Arc::new(Registry::from_config(&config, &root)?);
//!
//!     let runner = Runner::new(registry, Arc::new(TracingSink));
//!     runner
//!         .run_all(&CancellationToken::new(), "build", &RunOptions::default())
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod ci;
pub mod config;
pub mod error;
pub mod graph;
pub mod registry;
pub mod report;
pub mod runner;
pub mod sink;
pub mod target;

// Re-export main types
pub use ci::{CiOptions, CiResult, Phase, PhaseResult, Pipeline, TargetResult};
pub use config::Config;
pub use error::{BuildError, MultiError, Result, SkipError, SkipReason};
pub use graph::{DependencyGraph, Graph};
pub use registry::Registry;
pub use runner::{FailurePolicy, RunOptions, Runner, TaskResult, TaskRunSummary, TestCounts};
pub use sink::{ConsoleSink, MemorySink, OutputSink, TracingSink};
pub use target::{ExecOptions, ShellTarget, Target, TargetType, Verbosity};
