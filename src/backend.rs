//! The seams: PlatformBackend and ReadinessProbe
//!
//! These are the only abstraction points for external effects. The
//! workflow, pool accessor, eviction and warmup logic never talk HTTP
//! or shell out themselves; they go through these traits, which is also
//! how tests substitute recording fakes.

use crate::error::DeployError;
use crate::source::SourceBundle;
use crate::types::{DeploymentSlot, PushReceipt, VersionRecord};
use std::future::Future;
use std::time::Duration;

/// Everything the deployment lifecycle needs from the hosting platform.
pub trait PlatformBackend: Send + Sync {
    // ═══════════════════════════════════════════════════════════════
    // CREDENTIALS
    // ═══════════════════════════════════════════════════════════════

    /// Project the active credentials are bound to.
    fn bound_project_id(&self) -> impl Future<Output = Result<String, DeployError>> + Send;

    /// Refresh credentials if they expire within the safety margin.
    /// Called before each batch of operations, not only after a 401.
    fn ensure_fresh_credentials(&self) -> impl Future<Output = Result<(), DeployError>> + Send;

    /// Force a refresh-token exchange.
    fn refresh_credentials(&self) -> impl Future<Output = Result<(), DeployError>> + Send;

    // ═══════════════════════════════════════════════════════════════
    // POOL QUERIES (read-only)
    // ═══════════════════════════════════════════════════════════════

    /// List stored versions. Empty project yields an empty list.
    fn list_versions(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<Vec<VersionRecord>, DeployError>> + Send;

    /// List deployments, HEAD included and flagged.
    fn list_deployments(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<Vec<DeploymentSlot>, DeployError>> + Send;

    // ═══════════════════════════════════════════════════════════════
    // MUTATIONS
    // ═══════════════════════════════════════════════════════════════

    /// Upload the source tree and cut a new version from it.
    fn push(
        &self,
        project_id: &str,
        bundle: &SourceBundle,
        description: &str,
    ) -> impl Future<Output = Result<PushReceipt, DeployError>> + Send;

    /// Create a deployment of `version_number`.
    ///
    /// `Ok(None)` means the platform accepted the request but the response
    /// carried no deployment identifier.
    fn create_deployment(
        &self,
        project_id: &str,
        version_number: u64,
        description: &str,
    ) -> impl Future<Output = Result<Option<DeploymentSlot>, DeployError>> + Send;

    /// Delete a deployment. HEAD cannot be deleted.
    fn delete_deployment(
        &self,
        project_id: &str,
        deployment_id: &str,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;

    /// Delete a stored version. May be rejected while a deployment uses it.
    fn delete_version(
        &self,
        project_id: &str,
        version_number: u64,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;
}

/// Raw outcome of one readiness GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// Issues a single readiness request. Transport failures and timeouts
/// come back as [`DeployError::Transient`].
pub trait ReadinessProbe: Send + Sync + 'static {
    fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProbeResponse, DeployError>> + Send;
}
