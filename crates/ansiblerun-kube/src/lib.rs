//! Kubernetes control-plane adapters for the AnsibleRun controller.
//!
//! [`KubeControlPlane`] serves every collaborator the connector needs from
//! the cluster:
//! - ProviderConfig lookup ([`ansiblerun_core::ControlPlane`])
//! - Secret keys ([`ansiblerun_core::secret::SecretStore`])
//! - ProviderConfigUsage tracking ([`ansiblerun_core::UsageTracker`])

pub mod kubernetes;

pub use kubernetes::KubeControlPlane;
