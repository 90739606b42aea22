//! The runner handle produced once a working directory is prepared.

use ansiblerun_core::Uid;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info};

use crate::RunnerError;

/// An ansible-runner invocation bound to one working directory and one
/// ProviderConfig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runner {
    pub(crate) uid: Uid,
    pub(crate) working_dir: PathBuf,
    pub(crate) provider_config: String,
    pub(crate) binary: String,
    pub(crate) args: Vec<String>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) check_mode: bool,
}

impl Runner {
    /// A runner invoking `binary` with no arguments.
    pub fn new(
        uid: Uid,
        working_dir: impl Into<PathBuf>,
        provider_config: impl Into<String>,
        binary: impl Into<String>,
    ) -> Self {
        Self {
            uid,
            working_dir: working_dir.into(),
            provider_config: provider_config.into(),
            binary: binary.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            check_mode: false,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Name of the ProviderConfig the runner was initialized with.
    pub fn provider_config(&self) -> &str {
        &self.provider_config
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn check_mode(&self) -> bool {
        self.check_mode
    }

    /// The command that executes the run.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .envs(&self.env)
            .current_dir(&self.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Execute the run to completion and return its combined output.
    pub async fn run(&self) -> Result<String, RunnerError> {
        info!(uid = %self.uid, dir = %self.working_dir.display(), "Running ansible-runner");

        let output = self.command().output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let combined = format!("{}\n{}", stdout, stderr);

        if !output.status.success() {
            error!(uid = %self.uid, status = ?output.status.code(), "ansible-runner failed");
            return Err(RunnerError::RunFailed(combined));
        }

        info!(uid = %self.uid, "ansible-runner succeeded");
        Ok(combined)
    }
}
