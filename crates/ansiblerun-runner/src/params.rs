//! Runner capability and its ansible CLI implementation.

use ansiblerun_core::{AnsibleRun, Managed, ProviderConfig};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::{
    COLLECTIONS_PATH_ENV, GIT_CRED_DIR_ENV, PLAYBOOK_YML, REQUIREMENTS_YML, Runner, RunnerError,
};

/// Operations available once a working directory has been prepared.
#[async_trait]
pub trait RunnerParams: Send + Sync {
    /// Bind a runner to the working directory, the run and its ProviderConfig.
    ///
    /// Implementations must not write to the working directory.
    async fn init(&self, run: &AnsibleRun, pc: &ProviderConfig) -> Result<Runner, RunnerError>;

    /// Install the galaxy roles and collections listed in the ProviderConfig's
    /// requirements. A no-op when it declares none.
    async fn galaxy_install(&self, pc: &ProviderConfig) -> Result<(), RunnerError>;
}

/// Builds the runner capability for a working directory.
pub type RunnerFactory = Arc<dyn Fn(&Path) -> Box<dyn RunnerParams> + Send + Sync>;

/// Settings shared by every [`AnsibleParams`] a factory produces.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub runner_binary: String,
    pub galaxy_binary: String,
    pub collections_path: Option<PathBuf>,
    /// Root under which each run's `.git-credentials` directory lives.
    pub git_credentials_root: Option<PathBuf>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            runner_binary: "ansible-runner".to_string(),
            galaxy_binary: "ansible-galaxy".to_string(),
            collections_path: None,
            git_credentials_root: None,
        }
    }
}

/// [`RunnerParams`] backed by the ansible-runner and ansible-galaxy CLIs.
#[derive(Debug, Clone)]
pub struct AnsibleParams {
    working_dir: PathBuf,
    settings: RunnerSettings,
}

impl AnsibleParams {
    pub fn new(working_dir: impl Into<PathBuf>, settings: RunnerSettings) -> Self {
        Self {
            working_dir: working_dir.into(),
            settings,
        }
    }

    /// A [`RunnerFactory`] producing `AnsibleParams` with `settings`.
    pub fn factory(settings: RunnerSettings) -> RunnerFactory {
        Arc::new(move |dir: &Path| -> Box<dyn RunnerParams> {
            Box::new(AnsibleParams::new(dir, settings.clone()))
        })
    }

    /// Directory holding this run's `.git-credentials`, if configured.
    fn git_credentials_dir(&self) -> Option<PathBuf> {
        let root = self.settings.git_credentials_root.as_ref()?;
        let uid = self.working_dir.file_name()?;
        Some(root.join(uid))
    }

    fn tool_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(path) = &self.settings.collections_path {
            env.insert(
                COLLECTIONS_PATH_ENV.to_string(),
                path.to_string_lossy().to_string(),
            );
        }
        if let Some(dir) = self.git_credentials_dir() {
            env.insert(
                GIT_CRED_DIR_ENV.to_string(),
                dir.to_string_lossy().to_string(),
            );
        }
        env
    }

    /// The `ansible-galaxy install` command for this working directory.
    pub fn galaxy_command(&self) -> Command {
        let mut cmd = Command::new(&self.settings.galaxy_binary);
        cmd.args(["install", "-r", REQUIREMENTS_YML])
            .envs(self.tool_env())
            .current_dir(&self.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn runner_args(&self, run: &AnsibleRun) -> Result<Vec<String>, RunnerError> {
        let params = &run.spec.for_provider;
        let mut args = vec![
            "run".to_string(),
            self.working_dir.to_string_lossy().to_string(),
            "--playbook".to_string(),
            PLAYBOOK_YML.to_string(),
            "--ident".to_string(),
            run.uid().to_string(),
        ];

        let mut cmdline = Vec::new();
        if params.check_mode {
            cmdline.push("--check".to_string());
        }
        if !params.vars.is_empty() {
            let vars = serde_json::to_string(&params.vars).map_err(|e| {
                RunnerError::InvalidConfiguration(format!("cannot encode vars: {}", e))
            })?;
            cmdline.push(format!("--extra-vars {}", shell_quote(&vars)));
        }
        if !cmdline.is_empty() {
            args.push("--cmdline".to_string());
            args.push(cmdline.join(" "));
        }

        Ok(args)
    }
}

#[async_trait]
impl RunnerParams for AnsibleParams {
    async fn init(&self, run: &AnsibleRun, pc: &ProviderConfig) -> Result<Runner, RunnerError> {
        if self.settings.runner_binary.is_empty() {
            return Err(RunnerError::InvalidConfiguration(
                "no ansible-runner binary configured".to_string(),
            ));
        }
        if self.working_dir.as_os_str().is_empty() {
            return Err(RunnerError::InvalidConfiguration(
                "no working directory".to_string(),
            ));
        }
        if run.uid().is_empty() {
            return Err(RunnerError::InvalidConfiguration(
                "AnsibleRun has no uid".to_string(),
            ));
        }

        let runner = Runner {
            uid: run.uid().clone(),
            working_dir: self.working_dir.clone(),
            provider_config: pc.metadata.name.clone(),
            binary: self.settings.runner_binary.clone(),
            args: self.runner_args(run)?,
            env: self.tool_env(),
            check_mode: run.spec.for_provider.check_mode,
        };

        debug!(uid = %runner.uid, args = ?runner.args, "Initialized ansible-runner");
        Ok(runner)
    }

    async fn galaxy_install(&self, pc: &ProviderConfig) -> Result<(), RunnerError> {
        // A requirements.yml left by an earlier connect does not count.
        if pc.spec.requirements.is_none() {
            debug!(dir = %self.working_dir.display(), "No galaxy requirements, skipping install");
            return Ok(());
        }

        info!(dir = %self.working_dir.display(), "Running ansible-galaxy install");

        let output = self.galaxy_command().output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let combined = format!("{}\n{}", stdout, stderr);

        if !output.status.success() {
            error!(output = %combined, "ansible-galaxy install failed");
            return Err(RunnerError::GalaxyFailed(combined));
        }

        info!("ansible-galaxy install succeeded");
        Ok(())
    }
}

/// Quote `s` as a single POSIX shell word.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
