//! [`AuditRecord`]: one line of the audit trail.

use crate::auth::token::current_unix_time;
use crate::types::Environment;
use serde::{Deserialize, Serialize};

/// Which kind of mutation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    DeploymentCreated,
    DeploymentsEvicted,
    VersionsPruned,
}

/// A successful mutation against a project's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unix seconds.
    pub timestamp: u64,
    pub environment: Environment,
    pub action: AuditAction,
    pub project_id: String,
    /// Deployment ids or version numbers touched.
    pub ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AuditRecord {
    pub fn new(
        environment: Environment,
        action: AuditAction,
        project_id: impl Into<String>,
        ids: Vec<String>,
    ) -> Self {
        Self {
            timestamp: current_unix_time(),
            environment,
            action,
            project_id: project_id.into(),
            ids,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
