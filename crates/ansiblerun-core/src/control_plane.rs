//! Control-plane collaborators used while connecting to a managed resource.

use async_trait::async_trait;

use crate::resource::{Managed, ProviderConfig};
use crate::Result;

/// Read access to the configuration objects served by the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch a cluster-scoped ProviderConfig by name.
    async fn get_provider_config(&self, name: &str) -> Result<ProviderConfig>;
}

/// Records that a managed resource uses its ProviderConfig.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    async fn track(&self, mg: &dyn Managed) -> Result<()>;
}

/// Adapts a closure into a [`UsageTracker`].
pub struct TrackerFn<F>(pub F);

#[async_trait]
impl<F> UsageTracker for TrackerFn<F>
where
    F: Fn(&dyn Managed) -> Result<()> + Send + Sync,
{
    async fn track(&self, mg: &dyn Managed) -> Result<()> {
        (self.0)(mg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::AnsibleRun;
    use crate::Error;

    #[tokio::test]
    async fn test_tracker_fn_forwards_result() {
        let ok = TrackerFn(|_: &dyn Managed| -> Result<()> { Ok(()) });
        let boom =
            TrackerFn(|_: &dyn Managed| -> Result<()> { Err(Error::Internal("boom".to_string())) });
        let run = AnsibleRun::new("example", "no-you-id");

        assert!(ok.track(&run).await.is_ok());
        assert!(matches!(boom.track(&run).await, Err(Error::Internal(_))));
    }
}
