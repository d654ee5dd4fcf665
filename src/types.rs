//! Minimal domain types for the deployment lifecycle.
//!
//! These are the types the workflow engine needs. The platform's own
//! response shapes live in the client; everything here is what the
//! workflow reasons about.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DeployError;

/// Platform cap on non-HEAD deployments per project.
pub const MAX_DEPLOYMENTS: usize = 20;

/// Platform cap on stored versions per project.
pub const MAX_VERSIONS: usize = 200;

/// Version count at which pruning kicks in.
pub const VERSION_PRUNE_THRESHOLD: usize = 190;

/// Anything that can sit in the pool and be planned for eviction.
pub trait PoolEntry {
    fn entry_id(&self) -> String;
    fn version_number(&self) -> u64;
    fn is_head(&self) -> bool;
}

/// One entry in the platform's deployment registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSlot {
    pub id: String,
    /// Backing version. HEAD has none of its own and reports 0.
    pub version_number: u64,
    pub description: String,
    /// Unix seconds. Falls back to version ordering when the platform omits it.
    pub created_at: Option<u64>,
    pub is_head: bool,
    /// Serving URL, when the platform exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl PoolEntry for DeploymentSlot {
    fn entry_id(&self) -> String {
        self.id.clone()
    }

    fn version_number(&self) -> u64 {
        self.version_number
    }

    fn is_head(&self) -> bool {
        self.is_head
    }
}

/// One entry in the platform's version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version_number: u64,
    #[serde(default)]
    pub description: String,
    pub created_at: Option<u64>,
}

impl PoolEntry for VersionRecord {
    fn entry_id(&self) -> String {
        self.version_number.to_string()
    }

    fn version_number(&self) -> u64 {
        self.version_number
    }

    fn is_head(&self) -> bool {
        false
    }
}

/// A point-in-time listing of a project's versions and deployments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub project_id: String,
    pub versions: Vec<VersionRecord>,
    pub deployments: Vec<DeploymentSlot>,
}

impl PoolSnapshot {
    pub fn non_head_deployments(&self) -> impl Iterator<Item = &DeploymentSlot> {
        self.deployments.iter().filter(|d| !d.is_head)
    }

    pub fn non_head_count(&self) -> usize {
        self.non_head_deployments().count()
    }

    pub fn head(&self) -> Option<&DeploymentSlot> {
        self.deployments.iter().find(|d| d.is_head)
    }

    /// How many more deployments fit before the platform cap.
    pub fn deployment_headroom(&self) -> usize {
        MAX_DEPLOYMENTS.saturating_sub(self.non_head_count())
    }

    pub fn version_headroom(&self) -> usize {
        MAX_VERSIONS.saturating_sub(self.versions.len())
    }
}

/// Result of a successful push: the version the platform created for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    pub version_number: u64,
    /// SHA-256 over the uploaded files, for the audit trail.
    pub content_digest: String,
    pub file_count: usize,
}

/// Target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    pub fn name(&self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Environment {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DeployError::Config(format!(
                "unknown environment '{}' (expected staging or production)",
                other
            ))),
        }
    }
}

/// Static pairing of an environment with the project and URL it must use.
///
/// Used only by the safety check; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentBinding {
    pub environment: Environment,
    pub project_id: String,
    /// Prefix every deployment URL of this environment starts with.
    pub base_url: String,
}

impl EnvironmentBinding {
    pub fn new(
        environment: Environment,
        project_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            environment,
            project_id: project_id.into(),
            base_url: base_url.into(),
        }
    }

    /// URL a deployment of this environment is served from.
    pub fn deployment_url(&self, slot: &DeploymentSlot) -> String {
        match &slot.url {
            Some(url) => url.clone(),
            None => format!("{}/{}/exec", self.base_url.trim_end_matches('/'), slot.id),
        }
    }
}

/// Warmup status of one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupStatus {
    Pending,
    Ready,
    Failed,
}

/// One tenant endpoint under verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupTarget {
    pub tenant_id: String,
    pub url: String,
    pub status: WarmupStatus,
    pub attempts_used: u32,
    pub observed_build_id: Option<String>,
    /// Why the last attempt was not ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WarmupTarget {
    pub fn new(tenant_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            url: url.into(),
            status: WarmupStatus::Pending,
            attempts_used: 0,
            observed_build_id: None,
            last_error: None,
        }
    }
}
