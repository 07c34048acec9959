//! CLI command definitions
//!
//! Uses `clap` derive API for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// monobuild - run commands across monorepo build targets
#[derive(Parser, Debug)]
#[command(name = "monobuild")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to monobuild.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Working directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Parallel worker count (1-256, defaults to the number of CPUs)
    #[arg(long, global = true, env = "MONOBUILD_WORKERS")]
    pub workers: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command on targets
    Run {
        /// Command to run (build, test, clean, ...)
        command: String,

        /// Targets to run (all targets if omitted); dependencies are included
        targets: Vec<String>,

        /// Run targets concurrently, ignoring dependency order
        #[arg(short, long)]
        parallel: bool,

        /// Keep going after a target fails
        #[arg(long = "continue")]
        keep_going: bool,

        /// Run commands inside each target's container image
        #[arg(long)]
        docker: bool,

        /// Extra arguments appended to every command line
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Run the CI pipeline
    Ci {
        /// Build release variants
        #[arg(long)]
        release: bool,

        /// Run language-target phases concurrently
        #[arg(short, long)]
        parallel: bool,

        /// Keep going after a phase fails
        #[arg(long = "continue")]
        keep_going: bool,

        /// Run commands inside each target's container image
        #[arg(long)]
        docker: bool,

        /// Copy build artifacts into this directory
        #[arg(long)]
        artifact_dir: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List targets
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: ListFormat,
    },

    /// Show the target dependency graph
    Graph {
        /// Targets to show (all targets if omitted)
        targets: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: GraphFormat,
    },

    /// Validate monobuild.toml
    Check,

    /// Initialize a new monobuild.toml
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ListFormat {
    #[default]
    Table,
    Json,
    Plain,
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum GraphFormat {
    #[default]
    Text,
    Dot,
    Json,
}
