//! Connect an AnsibleRun from the cluster.

use ansiblerun_config::ControllerConfig;
use ansiblerun_connector::Connector;
use ansiblerun_kube::KubeControlPlane;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fetch the AnsibleRun `name`, prepare its working directory and init the
/// runner. With `run`, execute ansible-runner afterwards.
pub async fn connect(config: ControllerConfig, name: &str, run: bool) -> Result<()> {
    let kube = Arc::new(
        KubeControlPlane::new()
            .await
            .context("Failed to connect to Kubernetes")?,
    );

    let ansible_run = kube
        .get_ansible_run(name)
        .await
        .with_context(|| format!("Failed to get AnsibleRun {}", name))?;

    let connector = Connector::builder(kube.clone(), kube.clone(), kube)
        .config(config)
        .build();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let external = connector
        .connect(&ansible_run, &cancel)
        .await
        .with_context(|| format!("Failed to connect AnsibleRun {}", name))?;

    println!("Working directory: {}", external.working_dir().display());
    println!(
        "Runner: {} {}",
        external.runner().binary(),
        external.runner().args().join(" ")
    );

    if run {
        info!(name = %name, "Executing ansible-runner");
        let output = tokio::select! {
            result = external.runner().run() => result.context("ansible-runner failed")?,
            _ = cancel.cancelled() => anyhow::bail!("Cancelled"),
        };
        println!("{}", output);
    }

    Ok(())
}
