//! monobuild - a build and CI orchestrator for monorepos
//!
//! Runs named commands across declared build targets and drives a fixed
//! phase CI pipeline over them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use console::style;
use tokio_util::sync::CancellationToken;

mod cli;

use cli::{Cli, Commands, GraphFormat, ListFormat};
use monobuild::report::{render_ci_summary, render_run_summary};
use monobuild::{
    BuildError, CiOptions, Config, ConsoleSink, DependencyGraph, FailurePolicy, Graph, Pipeline,
    Registry, Result, RunOptions, Runner, Verbosity,
};

#[tokio::main]
async fn main() -> ExitCode {
    // Set up panic handler for nice error messages
    miette::set_panic_hook();

    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    // Handle --no-color
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{}: {:?}", style("error").red().bold(), miette::Report::new(e));
            ExitCode::from(code)
        }
    }
}

/// Cancel the returned token on Ctrl-C
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            trigger.cancel();
        }
    });
    token
}

fn verbosity(cli: &Cli) -> Verbosity {
    if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Loaded configuration plus the runner built from it
struct Workspace {
    config: Config,
    path: PathBuf,
    root: PathBuf,
    runner: Runner,
}

impl Workspace {
    fn load(cli: &Cli) -> Result<Self> {
        let (config, path) = Config::load(cli.config.as_deref())?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let registry = Arc::new(Registry::from_config(&config, &root)?);
        let mut runner = Runner::new(registry, Arc::new(ConsoleSink { quiet: cli.quiet }));
        if let Some(workers) = cli.workers.clone().or_else(|| config.settings.workers.clone()) {
            runner = runner.with_workers(workers);
        }

        Ok(Self {
            config,
            path,
            root,
            runner,
        })
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Change working directory if specified
    if let Some(cwd) = &cli.cwd {
        std::env::set_current_dir(cwd)?;
    }

    match &cli.command {
        Commands::Run {
            command,
            targets,
            parallel,
            keep_going,
            docker,
            args,
        } => {
            let ws = Workspace::load(&cli)?;
            let options = RunOptions {
                docker: *docker,
                policy: FailurePolicy::from_continue(*keep_going),
                parallel: *parallel,
                args: args.clone(),
                env: HashMap::new(),
                verbosity: verbosity(&cli),
            };

            let selected = if targets.is_empty() {
                ws.runner.registry().all().to_vec()
            } else {
                let names: Vec<&str> = targets.iter().map(String::as_str).collect();
                ws.runner.registry().resolve(&names)?
            };

            let ctx = shutdown_token();
            let summary = ws.runner.run_summary(&ctx, &selected, command, &options).await;
            if !cli.quiet {
                print!("{}", render_run_summary(&summary));
            }
            summary.into_result()
        }

        Commands::Ci {
            release,
            parallel,
            keep_going,
            docker,
            artifact_dir,
            json,
        } => {
            let ws = Workspace::load(&cli)?;
            let artifact_dir = artifact_dir.clone().or_else(|| {
                ws.config
                    .settings
                    .artifact_dir
                    .as_ref()
                    .map(|dir| ws.root.join(dir))
            });
            let options = CiOptions {
                docker: *docker,
                policy: FailurePolicy::from_continue(*keep_going),
                release: *release,
                parallel: *parallel,
                artifact_dir,
                // Keep stdout clean for the JSON document
                verbosity: if *json {
                    Verbosity::Quiet
                } else {
                    verbosity(&cli)
                },
            };

            let ctx = shutdown_token();
            let pipeline = Pipeline::new(ws.runner);
            let result = pipeline.run_ci(&ctx, &options).await?;

            if *json {
                let text = serde_json::to_string_pretty(&result)
                    .map_err(|e| BuildError::Io(e.into()))?;
                println!("{text}");
            } else if !cli.quiet {
                print!("{}", render_ci_summary(&result));
            }

            match result.error() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        Commands::List { format } => {
            let ws = Workspace::load(&cli)?;
            print_target_list(&ws, format.clone())
        }

        Commands::Graph { targets, format } => {
            let ws = Workspace::load(&cli)?;
            print_graph(&ws, targets, format.clone())
        }

        Commands::Check => {
            let ws = Workspace::load(&cli)?;
            println!(
                "{} {} is valid ({} targets)",
                style("✓").green(),
                ws.path.display(),
                ws.runner.registry().len()
            );
            Ok(())
        }

        Commands::Init { force } => init_config(*force),
    }
}

fn print_target_list(ws: &Workspace, format: ListFormat) -> Result<()> {
    let registry = ws.runner.registry();

    match format {
        ListFormat::Table => {
            println!("{}", style("Targets:").bold());
            println!();

            let max_name_len = registry.names().iter().map(|n| n.len()).max().unwrap_or(0);

            for target in registry.all() {
                let name = target.name();
                let mut commands: Vec<&String> = ws
                    .config
                    .targets
                    .get(name)
                    .map(|t| t.commands.keys().collect())
                    .unwrap_or_default();
                commands.sort();
                let commands: Vec<&str> = commands.into_iter().map(String::as_str).collect();

                print!(
                    "  {}{}  {:<9} {}",
                    style(name).cyan().bold(),
                    " ".repeat(max_name_len - name.len()),
                    target.target_type(),
                    style(commands.join(", ")).dim()
                );

                if !target.depends_on().is_empty() {
                    print!(
                        " {}",
                        style(format!("[deps: {}]", target.depends_on().join(", "))).yellow().dim()
                    );
                }

                println!();
            }
        }

        ListFormat::Json => {
            let mut targets = serde_json::Map::new();
            for target in registry.all() {
                targets.insert(
                    target.name().to_string(),
                    serde_json::json!({
                        "type": target.target_type(),
                        "dir": target.dir(),
                        "depends_on": target.depends_on(),
                    }),
                );
            }
            let text = serde_json::to_string_pretty(&targets).map_err(|e| BuildError::Io(e.into()))?;
            println!("{text}");
        }

        ListFormat::Plain => {
            for name in registry.names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

fn print_graph(ws: &Workspace, targets: &[String], format: GraphFormat) -> Result<()> {
    let registry = ws.runner.registry();
    let selected = if targets.is_empty() {
        registry.all().to_vec()
    } else {
        let names: Vec<&str> = targets.iter().map(String::as_str).collect();
        registry.resolve(&names)?
    };

    let subgraph: Graph = selected
        .iter()
        .map(|t| (t.name().to_string(), t.depends_on().to_vec()))
        .collect();
    let graph = DependencyGraph::new(&subgraph)?;

    match format {
        GraphFormat::Text => {
            println!("{}", style("Target dependency graph:").bold());
            println!();

            for target in &selected {
                let deps = graph.dependencies(target.name()).unwrap_or_default();
                if deps.is_empty() {
                    println!("  {}", style(target.name()).cyan().bold());
                } else {
                    println!(
                        "  {} {} {}",
                        style(target.name()).cyan().bold(),
                        style("←").dim(),
                        deps.join(", ")
                    );
                }
            }
        }

        GraphFormat::Dot => {
            print!("{}", graph.to_dot());
        }

        GraphFormat::Json => {
            let mut nodes = Vec::new();
            let mut edges = Vec::new();

            for target in &selected {
                nodes.push(serde_json::json!({
                    "id": target.name(),
                    "type": target.target_type(),
                }));
                for dep in graph.dependencies(target.name()).unwrap_or_default() {
                    edges.push(serde_json::json!({
                        "from": dep,
                        "to": target.name(),
                    }));
                }
            }

            let output = serde_json::json!({
                "nodes": nodes,
                "edges": edges,
            });
            let text = serde_json::to_string_pretty(&output).map_err(|e| BuildError::Io(e.into()))?;
            println!("{text}");
        }
    }

    Ok(())
}

fn init_config(force: bool) -> Result<()> {
    let path = Path::new("monobuild.toml");

    if path.exists() && !force {
        return Err(BuildError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "monobuild.toml already exists (use --force to overwrite)",
        )));
    }

    let template = r#"# monobuild.toml - monorepo build configuration

[env]
# Global environment variables
# RUST_LOG = "info"

[settings]
# workers = "8"             # Parallel workers (MONOBUILD_WORKERS overrides)
# artifact_dir = "artifacts" # Where `monobuild ci` collects build outputs

[targets.proto]
type = "auxiliary"
dir = "proto"
commands.init = ["echo generating schemas"]
commands.build = ["echo building schemas"]

[targets.app]
type = "language"
dir = "app"
depends_on = ["proto"]
commands.clean = ["cargo clean"]
commands.check = ["cargo clippy -- -D warnings"]
commands.build = ["cargo build"]
commands.build-release = ["cargo build --release"]
commands.test = ["cargo test"]
"#;

    std::fs::write(path, template)?;

    println!(
        "{} Created {}",
        style("✓").green(),
        style("monobuild.toml").bold()
    );

    Ok(())
}
