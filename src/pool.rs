//! Version pool accessor.
//!
//! Read-only view of a project's versions and deployments. Every call
//! goes to the platform: the pool is shared with whoever else deploys to
//! the project, so nothing here is cached between decisions.

use crate::backend::PlatformBackend;
use crate::error::DeployError;
use crate::types::{DeploymentSlot, PoolSnapshot, VersionRecord};
use std::future::Future;
use tracing::{debug, warn};

pub struct VersionPool<'a, B: PlatformBackend> {
    backend: &'a B,
}

impl<'a, B: PlatformBackend> VersionPool<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Versions in ascending version order.
    pub async fn list_versions(&self, project_id: &str) -> Result<Vec<VersionRecord>, DeployError> {
        self.backend.ensure_fresh_credentials().await?;
        let backend = self.backend;
        let mut versions =
            with_auth_retry(backend, move || backend.list_versions(project_id)).await?;
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    /// Deployments with HEAD first, then ascending by version.
    pub async fn list_deployments(
        &self,
        project_id: &str,
    ) -> Result<Vec<DeploymentSlot>, DeployError> {
        self.backend.ensure_fresh_credentials().await?;
        let backend = self.backend;
        let mut deployments =
            with_auth_retry(backend, move || backend.list_deployments(project_id)).await?;
        deployments.sort_by_key(|d| (!d.is_head, d.version_number));
        Ok(deployments)
    }

    /// Fresh listing of both halves of the pool.
    pub async fn snapshot(&self, project_id: &str) -> Result<PoolSnapshot, DeployError> {
        let versions = self.list_versions(project_id).await?;
        let deployments = self.list_deployments(project_id).await?;
        debug!(
            event = "pool.snapshot",
            project_id,
            versions = versions.len(),
            deployments = deployments.len()
        );
        Ok(PoolSnapshot {
            project_id: project_id.to_string(),
            versions,
            deployments,
        })
    }
}

/// Run `op`; on an auth failure refresh credentials once and run it again.
/// A second auth failure is returned as-is.
pub(crate) async fn with_auth_retry<B, T, F, Fut>(backend: &B, mut op: F) -> Result<T, DeployError>
where
    B: PlatformBackend,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeployError>>,
{
    match op().await {
        Err(DeployError::Auth(reason)) => {
            warn!(event = "auth.refresh_and_retry", %reason);
            backend.refresh_credentials().await?;
            op().await
        }
        other => other,
    }
}
