//! ansible-runner integration for the AnsibleRun controller.
//!
//! Provides:
//! - The [`RunnerParams`] capability the connector drives (init + galaxy install)
//! - [`AnsibleParams`], the implementation backed by the ansible CLIs
//! - [`Runner`], the handle bound to one prepared working directory

pub mod error;
pub mod params;
pub mod runner;

pub use error::RunnerError;
pub use params::{AnsibleParams, RunnerFactory, RunnerParams, RunnerSettings};
pub use runner::Runner;

/// Name of the materialized playbook inside a working directory.
pub const PLAYBOOK_YML: &str = "playbook.yml";

/// Name of the galaxy requirements document inside a working directory.
pub const REQUIREMENTS_YML: &str = "requirements.yml";

/// Name of the git credentials file inside the git credentials directory.
pub const GIT_CREDENTIALS: &str = ".git-credentials";

/// Environment variable pointing git's credential store at its directory.
pub const GIT_CRED_DIR_ENV: &str = "GIT_CRED_DIR";

pub const COLLECTIONS_PATH_ENV: &str = "ANSIBLE_COLLECTIONS_PATH";
