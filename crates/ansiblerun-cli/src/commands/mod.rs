//! CLI command implementations.

pub mod connect;

use ansiblerun_config::ControllerConfig;
use anyhow::{Context, Result};

/// Load the controller configuration, falling back to defaults when no
/// file is given, then apply environment overrides.
pub fn load_config(path: Option<&str>) -> Result<ControllerConfig> {
    read_config(path)?
        .with_env_overrides()
        .context("Invalid configuration override")
}

fn read_config(path: Option<&str>) -> Result<ControllerConfig> {
    match path {
        Some(path) => ControllerConfig::load(path)
            .with_context(|| format!("Failed to load config file: {}", path)),
        None => Ok(ControllerConfig::default()),
    }
}

pub fn validate_config(path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path))?;
    match ansiblerun_config::parse_controller_config(&content) {
        Ok(config) => {
            println!("Configuration is valid");
            println!("Working directory: {}", config.working_dir.display());
            println!(
                "Git credentials root: {}",
                config.git_credentials_root.display()
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
