//! Creation state machine definition.
//!
//! The state is the complete snapshot of one create-deployment run:
//! where it is, what it has done, and every attempt it made. It is
//! serializable so a summary can carry it verbatim.

use crate::auth::token::current_unix_time;
use crate::types::{DeploymentSlot, PushReceipt};
use serde::{Deserialize, Serialize};

/// Workflow steps: the state machine's nodes.
///
/// `Deploy` → `EvictAndRetry` → `Deploy` happens at most once; the
/// `capacity_retry_used` flag on the state enforces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Starting point.
    Init,
    /// Compare the environment binding with the credentials' project.
    SafetyCheck,
    /// Upload source and cut a version.
    Push { attempt: u32 },
    /// Create the deployment from the pushed version.
    Deploy { attempt: u32 },
    /// Capacity hit: re-list, evict, then deploy once more.
    EvictAndRetry,
    /// Deploy response had no id: re-list and look for our deployment.
    Reconcile,
    /// Done.
    Complete,
    /// Failed, possibly recoverable.
    Failed { reason: String, recoverable: bool },
}

impl Step {
    /// Human-readable step name for logging/display.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::SafetyCheck => "safety_check",
            Step::Push { .. } => "push",
            Step::Deploy { .. } => "deploy",
            Step::EvictAndRetry => "evict_and_retry",
            Step::Reconcile => "reconcile",
            Step::Complete => "complete",
            Step::Failed { .. } => "failed",
        }
    }
}

/// Which remote operation an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Push,
    Deploy,
}

/// One remote attempt and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub operation: Operation,
    /// 0-based.
    pub attempt: u32,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Backoff slept before the next attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// Full workflow state. Serializable, so a run can be inspected after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationState {
    /// Project to deploy into.
    pub project_id: String,
    /// Description stamped on the version and deployment.
    pub description: String,
    /// Current step in the workflow.
    pub step: Step,

    // Populated as workflow progresses
    pub push: Option<PushReceipt>,
    pub deployment: Option<DeploymentSlot>,
    /// Deployments deleted by a capacity-triggered eviction.
    pub evicted: Vec<String>,

    // Guards
    /// The single automatic eviction cycle has been spent.
    pub capacity_retry_used: bool,
    /// A refresh-and-retry has been spent for the current operation.
    pub auth_retry_used: bool,

    // Audit
    pub attempts: Vec<AttemptRecord>,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Unix timestamp of last update.
    pub updated_at: u64,
}

impl CreationState {
    pub fn new(project_id: impl Into<String>, description: impl Into<String>) -> Self {
        let now = current_unix_time();
        Self {
            project_id: project_id.into(),
            description: description.into(),
            step: Step::Init,
            push: None,
            deployment: None,
            evicted: Vec::new(),
            capacity_retry_used: false,
            auth_retry_used: false,
            attempts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Is this workflow in a terminal state?
    pub fn is_terminal(&self) -> bool {
        matches!(self.step, Step::Complete | Step::Failed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.step, Step::Failed { .. })
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.step, Step::Complete)
    }

    /// Attempts made for one operation.
    pub fn attempts_for(&self, operation: Operation) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.operation == operation)
            .count()
    }

    pub fn record_attempt(&mut self, record: AttemptRecord) {
        self.attempts.push(record);
        self.updated_at = current_unix_time();
    }

    /// Transition to a new step.
    pub fn transition(&mut self, step: Step) {
        self.step = step;
        self.updated_at = current_unix_time();
    }

    /// Fail the workflow.
    pub fn fail(&mut self, reason: impl Into<String>, recoverable: bool) {
        self.step = Step::Failed {
            reason: reason.into(),
            recoverable,
        };
        self.updated_at = current_unix_time();
    }
}
