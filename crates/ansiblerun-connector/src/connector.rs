//! Connector - prepares a run's working directory and hands back a runner.

use ansiblerun_config::ControllerConfig;
use ansiblerun_core::fs::{Filesystem, OsFs};
use ansiblerun_core::resource::ConfigurationSource;
use ansiblerun_core::secret::SecretStore;
use ansiblerun_core::{AnsibleRun, ControlPlane, Managed, ProviderConfig, UsageTracker};
use ansiblerun_runner::{
    AnsibleParams, PLAYBOOK_YML, REQUIREMENTS_YML, Runner, RunnerFactory, RunnerSettings,
};
use bytes::Bytes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::{
    GitCredentialsError, git_credentials, write_credentials, write_git_credentials,
};
use crate::playbook::{HttpFetcher, PlaybookFetcher, playbook_content};
use crate::staging::Staging;
use crate::ConnectError;

/// A connected run: the prepared working directory and its runner.
#[derive(Debug, Clone)]
pub struct External {
    working_dir: PathBuf,
    runner: Runner,
}

impl External {
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn into_runner(self) -> Runner {
        self.runner
    }
}

/// Drives the connect pipeline for AnsibleRun resources.
///
/// Steps run in a fixed order and stop at the first failure:
/// directory, usage tracking, ProviderConfig, credentials, git credentials
/// (remote runs only), playbook, requirements, runner init, galaxy install.
pub struct Connector {
    control_plane: Arc<dyn ControlPlane>,
    usage: Arc<dyn UsageTracker>,
    secrets: Arc<dyn SecretStore>,
    staging: Staging,
    git_staging: Staging,
    fetcher: Arc<dyn PlaybookFetcher>,
    runner: RunnerFactory,
}

impl Connector {
    pub fn builder(
        control_plane: Arc<dyn ControlPlane>,
        usage: Arc<dyn UsageTracker>,
        secrets: Arc<dyn SecretStore>,
    ) -> ConnectorBuilder {
        ConnectorBuilder::new(control_plane, usage, secrets)
    }

    /// Base directory of per-run working directories.
    pub fn working_dir(&self) -> &Path {
        self.staging.base()
    }

    /// Base directory of per-run `.git-credentials` directories.
    pub fn git_credentials_root(&self) -> &Path {
        self.git_staging.base()
    }

    /// Prepare `mg` for execution.
    ///
    /// `cancel` is observed between steps and aborts the step in flight.
    /// Files written before a failure or cancellation are left in place.
    pub async fn connect(
        &self,
        mg: &dyn Managed,
        cancel: &CancellationToken,
    ) -> Result<External, ConnectError> {
        let run = mg
            .as_any()
            .downcast_ref::<AnsibleRun>()
            .ok_or_else(|| ConnectError::NotSupportedType(mg.kind().to_string()))?;
        let uid = run.uid();

        info!(uid = %uid, name = %run.name(), source = %run.source(), "Connecting AnsibleRun");

        let dir = guard(cancel, async {
            self.staging
                .ensure_directory(uid)
                .await
                .map_err(ConnectError::MkdirFailed)
        })
        .await?;

        guard(cancel, async {
            self.usage
                .track(mg)
                .await
                .map_err(ConnectError::TrackUsageFailed)
        })
        .await?;

        let pc_name = run.provider_config_name().unwrap_or_default();
        let pc = guard(cancel, async {
            self.control_plane
                .get_provider_config(pc_name)
                .await
                .map_err(ConnectError::GetConfigFailed)
        })
        .await?;
        debug!(uid = %uid, provider_config = %pc_name, "Fetched ProviderConfig");

        let git_entry = guard(
            cancel,
            write_credentials(
                &self.staging,
                &dir,
                &pc.spec.credentials,
                self.secrets.as_ref(),
            ),
        )
        .await?;

        if run.source() == ConfigurationSource::Remote {
            guard(cancel, async {
                self.stage_git_credentials(run, git_entry, &pc)
                    .await
                    .map_err(ConnectError::WriteGitCredentialsFailed)
            })
            .await?;
        }

        let content = guard(cancel, async {
            playbook_content(run, self.fetcher.as_ref())
                .await
                .map_err(ConnectError::FetchPlaybookFailed)
        })
        .await?;

        guard(cancel, async {
            self.staging
                .write_file(&dir.join(PLAYBOOK_YML), &content)
                .await
                .map_err(ConnectError::WritePlaybookFailed)
        })
        .await?;

        if let Some(requirements) = &pc.spec.requirements {
            guard(cancel, async {
                self.staging
                    .write_file(&dir.join(REQUIREMENTS_YML), requirements.as_bytes())
                    .await
                    .map_err(ConnectError::WriteRequirementsFailed)
            })
            .await?;
        }

        let params = (self.runner)(&dir);

        let runner = guard(cancel, async {
            params.init(run, &pc).await.map_err(ConnectError::InitFailed)
        })
        .await?;

        guard(cancel, async {
            params
                .galaxy_install(&pc)
                .await
                .map_err(ConnectError::GalaxyInstallFailed)
        })
        .await?;

        info!(uid = %uid, dir = %dir.display(), "Connected AnsibleRun");
        Ok(External {
            working_dir: dir,
            runner,
        })
    }

    /// Write `.git-credentials` under the git credentials root.
    async fn stage_git_credentials(
        &self,
        run: &AnsibleRun,
        entry: Option<Bytes>,
        pc: &ProviderConfig,
    ) -> Result<(), GitCredentialsError> {
        let git_dir = self.git_staging.dir(run.uid())?;
        let content = git_credentials(
            entry,
            pc.spec.git.as_ref(),
            &self.staging,
            self.secrets.as_ref(),
        )
        .await?;
        write_git_credentials(&self.git_staging, &git_dir, &content).await
    }
}

/// Builds a [`Connector`].
///
/// Defaults to the operating system's filesystem, [`HttpFetcher`], the
/// directories of [`ControllerConfig::default`] and an [`AnsibleParams`]
/// runner factory configured from the same settings.
pub struct ConnectorBuilder {
    control_plane: Arc<dyn ControlPlane>,
    usage: Arc<dyn UsageTracker>,
    secrets: Arc<dyn SecretStore>,
    config: ControllerConfig,
    fs: Option<Arc<dyn Filesystem>>,
    fetcher: Option<Arc<dyn PlaybookFetcher>>,
    runner: Option<RunnerFactory>,
}

impl ConnectorBuilder {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        usage: Arc<dyn UsageTracker>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            control_plane,
            usage,
            secrets,
            config: ControllerConfig::default(),
            fs: None,
            fetcher: None,
            runner: None,
        }
    }

    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = dir.into();
        self
    }

    pub fn git_credentials_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.git_credentials_root = dir.into();
        self
    }

    pub fn fs(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PlaybookFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn runner_factory(mut self, factory: RunnerFactory) -> Self {
        self.runner = Some(factory);
        self
    }

    pub fn build(self) -> Connector {
        let fs = self.fs.unwrap_or_else(|| Arc::new(OsFs));
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::new(fs.clone())));
        let runner = self
            .runner
            .unwrap_or_else(|| AnsibleParams::factory(runner_settings(&self.config)));

        Connector {
            control_plane: self.control_plane,
            usage: self.usage,
            secrets: self.secrets,
            staging: Staging::new(fs.clone(), self.config.working_dir),
            git_staging: Staging::new(fs, self.config.git_credentials_root),
            fetcher,
            runner,
        }
    }
}

/// Runner settings derived from the controller configuration.
pub fn runner_settings(config: &ControllerConfig) -> RunnerSettings {
    RunnerSettings {
        runner_binary: config.runner.binary.clone(),
        galaxy_binary: config.runner.galaxy_binary.clone(),
        collections_path: config.runner.collections_path.clone(),
        git_credentials_root: Some(config.git_credentials_root.clone()),
    }
}

/// Run `step` unless `cancel` fires first.
async fn guard<T>(
    cancel: &CancellationToken,
    step: impl Future<Output = Result<T, ConnectError>>,
) -> Result<T, ConnectError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            warn!("Connect cancelled");
            Err(ConnectError::Cancelled)
        }
        result = step => result,
    }
}
