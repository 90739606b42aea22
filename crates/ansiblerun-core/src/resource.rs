//! AnsibleRun and ProviderConfig resource types.
//!
//! These mirror the custom resources served by the control plane. Field
//! names follow the resources' camelCase wire form.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::Uid;

/// API group of the AnsibleRun and ProviderConfig resources.
pub const API_GROUP: &str = "ansible.crossplane.io";

/// API version of the AnsibleRun and ProviderConfig resources.
pub const API_VERSION: &str = "v1alpha1";

/// A resource managed by the controller.
///
/// The connector receives managed resources as trait objects and narrows
/// them to the concrete type it supports through [`Managed::as_any`].
pub trait Managed: Any + Send + Sync + fmt::Debug {
    /// Kind of the resource, e.g. `AnsibleRun`.
    fn kind(&self) -> &'static str;

    /// Unique identity assigned by the control plane.
    fn uid(&self) -> &Uid;

    /// Name of the resource.
    fn name(&self) -> &str;

    /// Name of the ProviderConfig this resource is configured by.
    fn provider_config_name(&self) -> Option<&str>;

    fn as_any(&self) -> &dyn Any;
}

/// Object metadata carried by every resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub uid: Uid,
}

/// Reference to a cluster-scoped ProviderConfig.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfigReference {
    #[serde(default)]
    pub name: String,
}

/// Where the automation content of an AnsibleRun comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigurationSource {
    /// The playbook text is embedded in the resource.
    #[default]
    Inline,
    /// The resource carries a locator that must be fetched.
    Remote,
}

impl fmt::Display for ConfigurationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationSource::Inline => write!(f, "Inline"),
            ConfigurationSource::Remote => write!(f, "Remote"),
        }
    }
}

/// An AnsibleRun custom resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsibleRun {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: AnsibleRunSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsibleRunSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config_ref: Option<ProviderConfigReference>,
    #[serde(default)]
    pub for_provider: AnsibleRunParameters,
}

/// Desired state of an AnsibleRun.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnsibleRunParameters {
    /// Where `module` should be read from.
    #[serde(default)]
    pub source: ConfigurationSource,
    /// Playbook text for [`ConfigurationSource::Inline`], or the locator of
    /// the playbook for [`ConfigurationSource::Remote`].
    #[serde(default)]
    pub module: String,
    /// Extra variables handed to the playbook.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Run the playbook in check mode.
    #[serde(default)]
    pub check_mode: bool,
}

impl AnsibleRun {
    pub fn new(name: impl Into<String>, uid: impl Into<Uid>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                namespace: None,
                uid: uid.into(),
            },
            spec: AnsibleRunSpec::default(),
        }
    }

    pub fn source(&self) -> ConfigurationSource {
        self.spec.for_provider.source
    }
}

impl Managed for AnsibleRun {
    fn kind(&self) -> &'static str {
        "AnsibleRun"
    }

    fn uid(&self) -> &Uid {
        &self.metadata.uid
    }

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn provider_config_name(&self) -> Option<&str> {
        self.spec
            .provider_config_ref
            .as_ref()
            .map(|r| r.name.as_str())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A ProviderConfig custom resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ProviderConfigSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    /// Credential files written into every run's working directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<ProviderCredentials>,
    /// Source-control connection used to derive `.git-credentials`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitConnection>,
    /// Galaxy requirements document installed before a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
}

/// Source of a credential's bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialsSource {
    #[default]
    None,
    Secret,
    Filesystem,
    Environment,
    Inline,
}

impl fmt::Display for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsSource::None => write!(f, "None"),
            CredentialsSource::Secret => write!(f, "Secret"),
            CredentialsSource::Filesystem => write!(f, "Filesystem"),
            CredentialsSource::Environment => write!(f, "Environment"),
            CredentialsSource::Inline => write!(f, "Inline"),
        }
    }
}

/// Selects a key of a Secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub key: String,
}

impl fmt::Display for SecretKeySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.name, self.key)
    }
}

/// Selects an environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSelector {
    #[serde(default)]
    pub name: String,
}

/// Selects a file on the controller's filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsSelector {
    #[serde(default)]
    pub path: String,
}

/// Locator fields for every credential source. Only the field matching the
/// chosen [`CredentialsSource`] is consulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSelectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsSelector>,
    /// Literal content for the `Inline` and `None` sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// One credential file written into the working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    /// Name of the file inside the working directory.
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub source: CredentialsSource,
    #[serde(flatten)]
    pub selectors: CredentialSelectors,
}

/// Connection details for a source-control host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitConnection {
    /// Host URL, e.g. `https://github.com`.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Source of the access token.
    #[serde(default)]
    pub token_source: CredentialsSource,
    #[serde(flatten)]
    pub token: CredentialSelectors,
}
