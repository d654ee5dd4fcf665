//! Eviction planning and execution.
//!
//! Planning is pure: given entries and a keep count, pick the oldest
//! non-HEAD entries so that at most `keep` remain. Execution deletes them
//! one by one and tolerates individual rejections.

use crate::backend::PlatformBackend;
use crate::error::DeployError;
use crate::pool::with_auth_retry;
use crate::types::{
    PoolEntry, PoolSnapshot, VersionRecord, MAX_DEPLOYMENTS, VERSION_PRUNE_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Ids of the oldest non-HEAD entries beyond `keep`, oldest first.
pub fn plan<E: PoolEntry>(entries: &[E], keep: usize) -> Vec<String> {
    let mut candidates: Vec<&E> = entries.iter().filter(|e| !e.is_head()).collect();
    candidates.sort_by_key(|e| e.version_number());
    let overage = candidates.len().saturating_sub(keep);
    candidates
        .into_iter()
        .take(overage)
        .map(|e| e.entry_id())
        .collect()
}

/// An ordered list of entries to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionPlan {
    /// Oldest first.
    pub ids: Vec<String>,
    /// How many deletions would have been needed to make room.
    pub required: usize,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// The plan frees less than is needed; creation may still hit the cap.
    pub fn is_short(&self) -> bool {
        self.ids.len() < self.required
    }
}

/// Planner configured with how many entries survive an eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPlanner {
    keep_count: usize,
    version_keep: usize,
}

impl EvictionPlanner {
    pub fn new(keep_count: usize, version_keep: usize) -> Result<Self, DeployError> {
        if keep_count == 0 {
            return Err(DeployError::Config("keep_count must be at least 1".into()));
        }
        if version_keep == 0 {
            return Err(DeployError::Config("version_keep must be at least 1".into()));
        }
        Ok(Self {
            keep_count,
            version_keep,
        })
    }

    pub fn keep_count(&self) -> usize {
        self.keep_count
    }

    /// Deployments to delete before creating one more. Empty while the
    /// pool still has room for the new deployment.
    pub fn plan_for_creation(&self, snapshot: &PoolSnapshot) -> EvictionPlan {
        let current = snapshot.non_head_count();
        if current < MAX_DEPLOYMENTS {
            return EvictionPlan::default();
        }
        let required = current + 1 - MAX_DEPLOYMENTS;
        let ids = plan(&snapshot.deployments, self.keep_count);
        let result = EvictionPlan { ids, required };
        if result.is_short() {
            warn!(
                event = "eviction.plan.short",
                planned = result.len(),
                required,
                keep_count = self.keep_count
            );
        }
        result
    }

    /// Re-plan after the platform rejected a creation for capacity. The
    /// platform's count wins over ours, so at least one deletion is
    /// always required.
    pub fn plan_after_rejection(&self, snapshot: &PoolSnapshot) -> EvictionPlan {
        let required = (snapshot.non_head_count() + 1)
            .saturating_sub(MAX_DEPLOYMENTS)
            .max(1);
        let result = EvictionPlan {
            ids: plan(&snapshot.deployments, self.keep_count),
            required,
        };
        if result.is_short() {
            warn!(
                event = "eviction.replan.short",
                planned = result.len(),
                required,
                keep_count = self.keep_count
            );
        }
        result
    }

    /// Versions to delete once the version cap is approached. Versions
    /// backing deployments that survive `deployment_plan` are never planned.
    pub fn plan_versions(&self, snapshot: &PoolSnapshot, deployment_plan: &EvictionPlan) -> EvictionPlan {
        if snapshot.versions.len() < VERSION_PRUNE_THRESHOLD {
            return EvictionPlan::default();
        }
        let evicted: BTreeSet<&str> = deployment_plan.ids.iter().map(String::as_str).collect();
        let protected: BTreeSet<u64> = snapshot
            .non_head_deployments()
            .filter(|d| !evicted.contains(d.id.as_str()))
            .map(|d| d.version_number)
            .collect();
        let candidates: Vec<VersionRecord> = snapshot
            .versions
            .iter()
            .filter(|v| !protected.contains(&v.version_number))
            .cloned()
            .collect();
        let keep = self.version_keep.saturating_sub(protected.len());
        let required = snapshot.versions.len() + 1 - VERSION_PRUNE_THRESHOLD;
        EvictionPlan {
            ids: plan(&candidates, keep),
            required,
        }
    }
}

impl Default for EvictionPlanner {
    fn default() -> Self {
        Self {
            keep_count: 3,
            version_keep: 50,
        }
    }
}

/// What actually happened when a plan was executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionOutcome {
    pub deleted: Vec<String>,
    /// Ids the platform refused to delete, with the reason.
    pub rejected: Vec<(String, String)>,
}

/// Delete planned deployments, oldest first.
pub async fn evict_deployments<B: PlatformBackend>(
    backend: &B,
    project_id: &str,
    plan: &EvictionPlan,
) -> Result<EvictionOutcome, DeployError> {
    let mut outcome = EvictionOutcome::default();
    for id in &plan.ids {
        let id = id.as_str();
        match with_auth_retry(backend, move || backend.delete_deployment(project_id, id)).await {
            Ok(()) => {
                info!(event = "eviction.deployment.deleted", deployment_id = id);
                outcome.deleted.push(id.to_string());
            }
            Err(err @ (DeployError::Auth(_) | DeployError::SafetyViolation(_) | DeployError::Cancelled(_))) => {
                return Err(err)
            }
            Err(err) => {
                warn!(event = "eviction.deployment.rejected", deployment_id = id, error = %err);
                outcome.rejected.push((id.to_string(), err.to_string()));
            }
        }
    }
    Ok(outcome)
}

/// Delete planned versions. Rejections (version still deployed) are expected.
pub async fn evict_versions<B: PlatformBackend>(
    backend: &B,
    project_id: &str,
    plan: &EvictionPlan,
) -> Result<EvictionOutcome, DeployError> {
    let mut outcome = EvictionOutcome::default();
    for id in &plan.ids {
        let version_number: u64 = id
            .parse()
            .map_err(|_| DeployError::InvalidState(format!("version id '{}' is not numeric", id)))?;
        match with_auth_retry(backend, move || backend.delete_version(project_id, version_number)).await {
            Ok(()) => {
                info!(event = "eviction.version.deleted", version_number);
                outcome.deleted.push(id.clone());
            }
            Err(err @ DeployError::Auth(_)) => return Err(err),
            Err(err) => {
                warn!(event = "eviction.version.rejected", version_number, error = %err);
                outcome.rejected.push((id.clone(), err.to_string()));
            }
        }
    }
    Ok(outcome)
}
