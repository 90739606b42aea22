//! Kubernetes-backed collaborators.

use ansiblerun_core::resource::{API_GROUP, API_VERSION, SecretKeySelector};
use ansiblerun_core::secret::SecretStore;
use ansiblerun_core::{
    AnsibleRun, ControlPlane, Error, Managed, ProviderConfig, Result, UsageTracker,
};
use async_trait::async_trait;
use bytes::Bytes;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ApiResource, DynamicObject, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::{debug, info};

/// Field manager used for server-side apply.
const FIELD_MANAGER: &str = "ansiblerun";

/// Label linking a ProviderConfigUsage to its ProviderConfig.
const PROVIDER_CONFIG_LABEL: &str = "crossplane.io/provider-config";

/// Control-plane access through the Kubernetes API.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub async fn new() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn resource(kind: &str, plural: &str) -> ApiResource {
        ApiResource {
            group: API_GROUP.to_string(),
            version: API_VERSION.to_string(),
            api_version: format!("{}/{}", API_GROUP, API_VERSION),
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }

    async fn get_dynamic<T: serde::de::DeserializeOwned>(
        &self,
        kind: &str,
        plural: &str,
        name: &str,
    ) -> Result<T> {
        let ar = Self::resource(kind, plural);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let obj = api.get(name).await.map_err(map_kube_error)?;
        let value = serde_json::to_value(&obj).map_err(|e| Error::Internal(e.to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidInput(format!("cannot decode {} {}: {}", kind, name, e)))
    }

    /// Fetch a cluster-scoped AnsibleRun by name.
    pub async fn get_ansible_run(&self, name: &str) -> Result<AnsibleRun> {
        self.get_dynamic("AnsibleRun", "ansibleruns", name).await
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn get_provider_config(&self, name: &str) -> Result<ProviderConfig> {
        debug!(name = %name, "Fetching ProviderConfig");
        self.get_dynamic("ProviderConfig", "providerconfigs", name)
            .await
    }
}

#[async_trait]
impl SecretStore for KubeControlPlane {
    async fn get_key(&self, selector: &SecretKeySelector) -> Result<Bytes> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &selector.namespace);
        let secret = api.get(&selector.name).await.map_err(map_kube_error)?;
        secret
            .data
            .and_then(|mut data| data.remove(&selector.key))
            .map(|value| Bytes::from(value.0))
            .ok_or_else(|| Error::NotFound(format!("key {} in secret {}", selector.key, selector)))
    }
}

#[async_trait]
impl UsageTracker for KubeControlPlane {
    async fn track(&self, mg: &dyn Managed) -> Result<()> {
        let body = usage_body(mg)?;
        let ar = Self::resource("ProviderConfigUsage", "providerconfigusages");
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let params = PatchParams::apply(FIELD_MANAGER).force();

        api.patch(mg.uid().as_str(), &params, &Patch::Apply(&body))
            .await
            .map_err(map_kube_error)?;

        info!(uid = %mg.uid(), kind = mg.kind(), "Tracked ProviderConfig usage");
        Ok(())
    }
}

/// The ProviderConfigUsage recording that `mg` uses its ProviderConfig.
fn usage_body(mg: &dyn Managed) -> Result<serde_json::Value> {
    let pc = mg
        .provider_config_name()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            Error::InvalidInput(format!("{} {} has no providerConfigRef", mg.kind(), mg.name()))
        })?;
    let api_version = format!("{}/{}", API_GROUP, API_VERSION);

    Ok(json!({
        "apiVersion": api_version,
        "kind": "ProviderConfigUsage",
        "metadata": {
            "name": mg.uid().as_str(),
            "labels": { PROVIDER_CONFIG_LABEL: pc },
            "ownerReferences": [{
                "apiVersion": api_version,
                "kind": mg.kind(),
                "name": mg.name(),
                "uid": mg.uid().as_str(),
                "controller": true,
                "blockOwnerDeletion": true,
            }],
        },
        "providerConfigRef": { "name": pc },
        "resourceRef": {
            "apiVersion": api_version,
            "kind": mg.kind(),
            "name": mg.name(),
        },
    }))
}

fn map_kube_error(err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(resp.message),
        kube::Error::Api(resp) if resp.code == 403 => Error::Forbidden(resp.message),
        kube::Error::Api(resp) if resp.code == 409 => Error::Conflict(resp.message),
        other => Error::ControlPlane(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ansiblerun_core::resource::ProviderConfigReference;
    use kube::core::ErrorResponse;

    fn run() -> AnsibleRun {
        let mut run = AnsibleRun::new("example", "no-you-id");
        run.spec.provider_config_ref = Some(ProviderConfigReference {
            name: "default".to_string(),
        });
        run
    }

    #[test]
    fn test_usage_body() {
        let body = usage_body(&run()).unwrap();

        assert_eq!(body["kind"], "ProviderConfigUsage");
        assert_eq!(body["apiVersion"], "ansible.crossplane.io/v1alpha1");
        assert_eq!(body["metadata"]["name"], "no-you-id");
        assert_eq!(
            body["metadata"]["labels"]["crossplane.io/provider-config"],
            "default"
        );
        assert_eq!(body["metadata"]["ownerReferences"][0]["kind"], "AnsibleRun");
        assert_eq!(body["metadata"]["ownerReferences"][0]["uid"], "no-you-id");
        assert_eq!(body["providerConfigRef"]["name"], "default");
        assert_eq!(body["resourceRef"]["name"], "example");
    }

    #[test]
    fn test_usage_body_requires_provider_config() {
        let run = AnsibleRun::new("example", "no-you-id");
        assert!(matches!(usage_body(&run), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_map_kube_error() {
        let not_found = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "providerconfigs \"default\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        });
        assert!(matches!(map_kube_error(not_found), Error::NotFound(_)));

        let forbidden = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        assert!(matches!(map_kube_error(forbidden), Error::Forbidden(_)));

        let server = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "etcd unavailable".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        });
        assert!(matches!(map_kube_error(server), Error::ControlPlane(_)));
    }

    /// Requires a cluster with the provider's CRDs installed.
    #[tokio::test]
    #[ignore]
    async fn test_get_provider_config_from_cluster() {
        let cp = KubeControlPlane::new().await.expect("Should connect to cluster");
        let pc = cp.get_provider_config("default").await;
        assert!(pc.is_ok(), "Should fetch ProviderConfig 'default'");
    }
}
