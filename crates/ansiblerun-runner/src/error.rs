//! Runner errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid runner configuration: {0}")]
    InvalidConfiguration(String),

    #[error("ansible-galaxy install failed: {0}")]
    GalaxyFailed(String),

    #[error("ansible-runner failed: {0}")]
    RunFailed(String),
}
