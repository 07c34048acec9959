//! Configuration parsing for monobuild.toml
//!
//! Handles loading and validating target declarations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::graph::{self, Graph};
use crate::target::{ShellTarget, TargetType};

/// Default config file names to search for
pub const CONFIG_FILES: &[&str] = &["monobuild.toml", "Monobuild.toml"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Global environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Target definitions
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,

    /// Global settings
    #[serde(default)]
    pub settings: Settings,
}

/// Global settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Parallel worker count; `MONOBUILD_WORKERS` takes precedence
    #[serde(default)]
    pub workers: Option<String>,

    /// Default artifact directory for `monobuild ci`
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

/// Configuration for a single target
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Target kind
    #[serde(rename = "type")]
    pub target_type: TargetType,

    /// Target directory, relative to the config file
    #[serde(default)]
    pub dir: Option<String>,

    /// Targets that must be built before this one
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Command name to shell lines
    #[serde(default)]
    pub commands: HashMap<String, Vec<String>>,

    /// Target-specific environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Container image for docker mode
    #[serde(default)]
    pub image: Option<String>,
}

impl Config {
    /// Load configuration from the specified path or search for it
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let config_path = match path {
            Some(p) => {
                if p.exists() {
                    p.to_path_buf()
                } else {
                    return Err(BuildError::ConfigNotFound {
                        searched: vec![p.to_path_buf()],
                    });
                }
            }
            None => Self::find_config()?,
        };
        // Target dirs hang off the config's parent, so it must be absolute
        let config_path = config_path.canonicalize()?;

        let content = std::fs::read_to_string(&config_path)?;
        let config = Self::parse(&content, &config_path)?;

        Ok((config, config_path))
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| BuildError::ConfigParse {
            source: e,
            path: path.to_path_buf(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Search for config file starting from current directory
    fn find_config() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;
        let mut searched = Vec::new();

        loop {
            for name in CONFIG_FILES {
                let candidate = current.join(name);
                searched.push(candidate.clone());
                if candidate.exists() {
                    return Ok(candidate);
                }
            }

            if !current.pop() {
                break;
            }
        }

        Err(BuildError::ConfigNotFound { searched })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        for (name, target) in &self.targets {
            if target.depends_on.contains(name) {
                return Err(BuildError::InvalidTarget {
                    target: name.clone(),
                    reason: "target cannot depend on itself".to_string(),
                });
            }

            if let Some(missing) = target
                .depends_on
                .iter()
                .find(|dep| !self.targets.contains_key(*dep))
            {
                return Err(BuildError::InvalidTarget {
                    target: name.clone(),
                    reason: format!("depends on unknown target '{missing}'"),
                });
            }
        }

        graph::validate(&self.dependency_graph())
    }

    /// Target name to its declared dependencies
    pub fn dependency_graph(&self) -> Graph {
        self.targets
            .iter()
            .map(|(name, t)| (name.clone(), t.depends_on.clone()))
            .collect()
    }

    /// List all target names, sorted
    pub fn target_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Build shell targets, resolving directories against `root`.
    ///
    /// A relative `root` is taken from the current directory, so every
    /// target dir comes out absolute.
    pub fn build_targets(&self, root: &Path) -> Result<Vec<ShellTarget>> {
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        let mut targets = Vec::with_capacity(self.targets.len());

        for (name, tc) in &self.targets {
            let dir = match &tc.dir {
                Some(raw) => {
                    let expanded =
                        shellexpand::full(raw).map_err(|e| BuildError::InvalidTarget {
                            target: name.clone(),
                            reason: format!("cannot expand dir '{raw}': {e}"),
                        })?;
                    root.join(&*expanded)
                }
                None => root.join(name),
            };

            let mut env = self.env.clone();
            env.extend(tc.env.clone());

            targets.push(ShellTarget {
                name: name.clone(),
                target_type: tc.target_type,
                dir,
                depends_on: tc.depends_on.clone(),
                commands: tc.commands.clone(),
                env,
                image: tc.image.clone(),
            });
        }

        Ok(targets)
    }
}
