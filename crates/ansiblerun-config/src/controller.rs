//! Controller configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default base directory for per-run working directories.
pub const DEFAULT_WORKING_DIR: &str = "/ansibleDir";

/// Default root for `.git-credentials`. Container images point git's
/// credential helper at this tree, so it stays separate from the working
/// directory.
pub const DEFAULT_GIT_CREDENTIALS_ROOT: &str = "/tmp/ansibleDir";

pub const ENV_WORKING_DIR: &str = "ANSIBLERUN_WORKING_DIR";
pub const ENV_GIT_CREDENTIALS_ROOT: &str = "ANSIBLERUN_GIT_CREDENTIALS_ROOT";

/// Controller-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Base directory under which each run gets `<working_dir>/<uid>`.
    pub working_dir: PathBuf,
    /// Base directory under which `.git-credentials` is written.
    pub git_credentials_root: PathBuf,
    /// External tool configuration.
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Path to the ansible-runner binary.
    pub binary: String,
    /// Path to the ansible-galaxy binary.
    pub galaxy_binary: String,
    /// Where galaxy installs collections.
    pub collections_path: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            binary: "ansible-runner".to_string(),
            galaxy_binary: "ansible-galaxy".to_string(),
            collections_path: None,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from(DEFAULT_WORKING_DIR),
            git_credentials_root: PathBuf::from(DEFAULT_GIT_CREDENTIALS_ROOT),
            runner: RunnerConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        parse_controller_config(&content)
    }

    /// Apply `ANSIBLERUN_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps an environment key to a value.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<Self> {
        if let Some(dir) = lookup(ENV_WORKING_DIR) {
            self.working_dir = absolute_path(ENV_WORKING_DIR, &dir)?;
        }
        if let Some(dir) = lookup(ENV_GIT_CREDENTIALS_ROOT) {
            self.git_credentials_root = absolute_path(ENV_GIT_CREDENTIALS_ROOT, &dir)?;
        }
        Ok(self)
    }
}

/// Parse controller configuration from KDL text.
///
/// Every field is optional. Unknown nodes are ignored.
pub fn parse_controller_config(kdl: &str) -> ConfigResult<ControllerConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = ControllerConfig::default();
    let mut seen_controller = false;
    let mut seen_runner = false;

    for node in doc.nodes() {
        match node.name().value() {
            "controller" => {
                if seen_controller {
                    return Err(ConfigError::Duplicate("controller".to_string()));
                }
                seen_controller = true;
                parse_controller(node, &mut config)?;
            }
            "runner" => {
                if seen_runner {
                    return Err(ConfigError::Duplicate("runner".to_string()));
                }
                seen_runner = true;
                config.runner = parse_runner(node)?;
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_controller(node: &KdlNode, config: &mut ControllerConfig) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "working-dir" => {
                let value = required_string_arg(child, "controller.working-dir")?;
                config.working_dir = absolute_path("controller.working-dir", &value)?;
            }
            "git-credentials-root" => {
                let value = required_string_arg(child, "controller.git-credentials-root")?;
                config.git_credentials_root =
                    absolute_path("controller.git-credentials-root", &value)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_runner(node: &KdlNode) -> ConfigResult<RunnerConfig> {
    let mut runner = RunnerConfig::default();
    let Some(children) = node.children() else {
        return Ok(runner);
    };

    for child in children.nodes() {
        match child.name().value() {
            "binary" => {
                runner.binary = required_string_arg(child, "runner.binary")?;
            }
            "galaxy-binary" => {
                runner.galaxy_binary = required_string_arg(child, "runner.galaxy-binary")?;
            }
            "collections-path" => {
                let value = required_string_arg(child, "runner.collections-path")?;
                runner.collections_path = Some(PathBuf::from(value));
            }
            _ => {}
        }
    }
    Ok(runner)
}

fn absolute_path(field: &str, value: &str) -> ConfigResult<PathBuf> {
    let path = PathBuf::from(value);
    if !path.is_absolute() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("{} is not an absolute path", value),
        });
    }
    Ok(path)
}

// Helper functions for extracting values from KDL nodes

fn required_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    let value =
        get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(value)
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            controller {
                working-dir "/var/lib/ansible"
                git-credentials-root "/tmp/var/lib/ansible"
            }

            runner {
                binary "/usr/local/bin/ansible-runner"
                galaxy-binary "/usr/local/bin/ansible-galaxy"
                collections-path "/ansible_collections"
            }
        "#;

        let config = parse_controller_config(kdl).unwrap();
        assert_eq!(config.working_dir, PathBuf::from("/var/lib/ansible"));
        assert_eq!(
            config.git_credentials_root,
            PathBuf::from("/tmp/var/lib/ansible")
        );
        assert_eq!(config.runner.binary, "/usr/local/bin/ansible-runner");
        assert_eq!(config.runner.galaxy_binary, "/usr/local/bin/ansible-galaxy");
        assert_eq!(
            config.runner.collections_path,
            Some(PathBuf::from("/ansible_collections"))
        );
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_controller_config("").unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.working_dir, PathBuf::from("/ansibleDir"));
        assert_eq!(config.git_credentials_root, PathBuf::from("/tmp/ansibleDir"));
    }

    #[test]
    fn test_unknown_nodes_are_ignored() {
        let kdl = r#"
            telemetry "on"
            controller {
                working-dir "/work"
                flavour "vanilla"
            }
        "#;

        let config = parse_controller_config(kdl).unwrap();
        assert_eq!(config.working_dir, PathBuf::from("/work"));
        assert_eq!(config.runner, RunnerConfig::default());
    }

    #[test]
    fn test_relative_working_dir_rejected() {
        let kdl = r#"
            controller {
                working-dir "relative/dir"
            }
        "#;

        let result = parse_controller_config(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { ref field, .. } if field == "controller.working-dir"
        ));
    }

    #[test]
    fn test_missing_value_rejected() {
        let kdl = r#"
            runner {
                binary
            }
        "#;

        let result = parse_controller_config(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(_)));
    }

    #[test]
    fn test_empty_binary_rejected() {
        let kdl = r#"
            runner {
                binary ""
            }
        "#;

        let result = parse_controller_config(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_duplicate_section_rejected() {
        let kdl = r#"
            runner {
                binary "a"
            }
            runner {
                binary "b"
            }
        "#;

        let result = parse_controller_config(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::Duplicate(_)));
    }

    #[test]
    fn test_invalid_kdl() {
        let result = parse_controller_config("controller {");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::default()
            .with_overrides(|key| match key {
                ENV_WORKING_DIR => Some("/override".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.working_dir, PathBuf::from("/override"));
        assert_eq!(config.git_credentials_root, PathBuf::from("/tmp/ansibleDir"));
    }

    #[test]
    fn test_relative_override_rejected() {
        let result = ControllerConfig::default().with_overrides(|key| match key {
            ENV_GIT_CREDENTIALS_ROOT => Some("tmp".to_string()),
            _ => None,
        });
        assert!(result.is_err());
    }
}
