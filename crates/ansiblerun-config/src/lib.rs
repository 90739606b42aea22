//! KDL configuration parsing for the AnsibleRun controller.
//!
//! This crate handles parsing of:
//! - Controller configuration (working directories, runner binaries)
//! - Environment overrides on top of a parsed configuration

pub mod controller;
pub mod error;

pub use controller::{ControllerConfig, RunnerConfig, parse_controller_config};
pub use error::{ConfigError, ConfigResult};
