//! Deployment Creator
//!
//! The state machine that drives push → deploy. It only transitions
//! between steps and calls the backend. Retries, the single capacity
//! eviction cycle and reconciliation are explicit steps, so every limit
//! is enforced by the state rather than by control flow.

use crate::backend::PlatformBackend;
use crate::backoff::BackoffPolicy;
use crate::error::DeployError;
use crate::eviction::{evict_deployments, EvictionPlanner};
use crate::pool::VersionPool;
use crate::safety::verify_binding;
use crate::source::SourceBundle;
use crate::state::{AttemptRecord, CreationState, Operation, Step};
use crate::types::{DeploymentSlot, EnvironmentBinding};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Workflow configuration.
#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    /// Retry policy for push and deploy.
    pub retry: BackoffPolicy,
    /// Planner used when the platform rejects creation for capacity.
    pub planner: EvictionPlanner,
}

/// Result of advancing one step.
#[derive(Debug, PartialEq, Eq)]
pub enum StepResult {
    /// Keep going, call advance() again.
    Continue,
    /// Done successfully.
    Complete,
}

/// The deployment creation engine.
///
/// Parameterized by the backend; you provide the implementation.
pub struct DeploymentWorkflow<'a, B: PlatformBackend> {
    backend: &'a B,
    bundle: &'a SourceBundle,
    target: &'a EnvironmentBinding,
    known: &'a [EnvironmentBinding],
    config: WorkflowConfig,
    cancel: CancellationToken,
}

impl<'a, B: PlatformBackend> DeploymentWorkflow<'a, B> {
    /// Create a new workflow engine for one environment.
    ///
    /// `known` lists every configured binding so the safety check can tell
    /// a cross-environment mix-up from an unknown project.
    pub fn new(
        backend: &'a B,
        bundle: &'a SourceBundle,
        target: &'a EnvironmentBinding,
        known: &'a [EnvironmentBinding],
        config: WorkflowConfig,
    ) -> Self {
        Self {
            backend,
            bundle,
            target,
            known,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Push and deploy into the target's project.
    pub async fn create(&self, description: &str) -> Result<DeploymentSlot, DeployError> {
        let mut state = CreationState::new(self.target.project_id.clone(), description);
        self.run_to_completion(&mut state).await?;
        state
            .deployment
            .ok_or_else(|| DeployError::InvalidState("completed without a deployment".into()))
    }

    /// Advance the workflow by one step.
    ///
    /// Fatal errors move the state to `Failed` and are returned as `Err`.
    pub async fn advance(&self, state: &mut CreationState) -> Result<StepResult, DeployError> {
        if let Step::Failed { reason, .. } = &state.step {
            return Err(DeployError::InvalidState(format!(
                "workflow already failed: {}",
                reason
            )));
        }
        if state.is_complete() {
            return Ok(StepResult::Complete);
        }
        if self.cancel.is_cancelled() {
            let step = state.step.name();
            return self.fatal(state, DeployError::Cancelled(format!("before {}", step)));
        }

        match state.step.clone() {
            Step::Init => {
                state.transition(Step::SafetyCheck);
                Ok(StepResult::Continue)
            }
            Step::SafetyCheck => self.step_safety_check(state).await,
            Step::Push { attempt } => self.step_push(state, attempt).await,
            Step::Deploy { attempt } => self.step_deploy(state, attempt).await,
            Step::EvictAndRetry => self.step_evict_and_retry(state).await,
            Step::Reconcile => self.step_reconcile(state).await,
            Step::Complete | Step::Failed { .. } => Ok(StepResult::Complete),
        }
    }

    /// Run until completion or a fatal error.
    pub async fn run_to_completion(&self, state: &mut CreationState) -> Result<(), DeployError> {
        loop {
            match self.advance(state).await? {
                StepResult::Continue => continue,
                StepResult::Complete => return Ok(()),
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // STEP IMPLEMENTATIONS
    // ═══════════════════════════════════════════════════════════════

    /// Runs before the push and again before the deploy.
    async fn step_safety_check(&self, state: &mut CreationState) -> Result<StepResult, DeployError> {
        let bound = match self.bound_project().await {
            Ok(bound) => bound,
            Err(err) => return self.fatal(state, err),
        };
        if let Err(err) = verify_binding(self.target, &state.project_id, &bound, self.known) {
            return self.fatal(state, err);
        }

        let next = if state.push.is_some() {
            Step::Deploy { attempt: 0 }
        } else {
            Step::Push { attempt: 0 }
        };
        state.transition(next);
        Ok(StepResult::Continue)
    }

    async fn step_push(&self, state: &mut CreationState, attempt: u32) -> Result<StepResult, DeployError> {
        info!(event = "workflow.push.attempt", project_id = %state.project_id, attempt);
        let result = self
            .backend
            .push(&state.project_id, self.bundle, &state.description)
            .await;

        match result {
            Ok(receipt) => {
                info!(
                    event = "workflow.push.succeeded",
                    version_number = receipt.version_number,
                    files = receipt.file_count
                );
                state.record_attempt(AttemptRecord {
                    operation: Operation::Push,
                    attempt,
                    succeeded: true,
                    error: None,
                    retry_after_ms: None,
                });
                state.push = Some(receipt);
                state.auth_retry_used = false;
                state.transition(Step::SafetyCheck);
                Ok(StepResult::Continue)
            }
            Err(err) => {
                self.handle_failure(state, Operation::Push, attempt, err, |a| Step::Push { attempt: a })
                    .await
            }
        }
    }

    async fn step_deploy(&self, state: &mut CreationState, attempt: u32) -> Result<StepResult, DeployError> {
        let Some(version_number) = state.push.as_ref().map(|p| p.version_number) else {
            return self.fatal(state, DeployError::InvalidState("deploy before push".into()));
        };
        info!(event = "workflow.deploy.attempt", version_number, attempt);
        let result = self
            .backend
            .create_deployment(&state.project_id, version_number, &state.description)
            .await;

        match result {
            Ok(Some(slot)) => {
                info!(event = "workflow.deploy.succeeded", deployment_id = %slot.id, version_number);
                state.record_attempt(AttemptRecord {
                    operation: Operation::Deploy,
                    attempt,
                    succeeded: true,
                    error: None,
                    retry_after_ms: None,
                });
                state.deployment = Some(slot);
                state.transition(Step::Complete);
                Ok(StepResult::Complete)
            }
            Ok(None) => {
                warn!(event = "workflow.deploy.missing_id", version_number);
                state.record_attempt(AttemptRecord {
                    operation: Operation::Deploy,
                    attempt,
                    succeeded: true,
                    error: Some("response carried no deployment id".into()),
                    retry_after_ms: None,
                });
                state.transition(Step::Reconcile);
                Ok(StepResult::Continue)
            }
            Err(DeployError::Capacity(reason)) if !state.capacity_retry_used => {
                warn!(event = "workflow.deploy.capacity", %reason);
                state.record_attempt(AttemptRecord {
                    operation: Operation::Deploy,
                    attempt,
                    succeeded: false,
                    error: Some(reason),
                    retry_after_ms: None,
                });
                state.transition(Step::EvictAndRetry);
                Ok(StepResult::Continue)
            }
            Err(err @ DeployError::Transient(_)) => {
                // The request may have landed before the connection failed.
                match self.find_created(state, version_number).await {
                    Ok(Some(slot)) => {
                        info!(event = "workflow.deploy.adopted", deployment_id = %slot.id, version_number);
                        state.record_attempt(AttemptRecord {
                            operation: Operation::Deploy,
                            attempt,
                            succeeded: true,
                            error: Some(err.to_string()),
                            retry_after_ms: None,
                        });
                        state.deployment = Some(slot);
                        state.transition(Step::Complete);
                        Ok(StepResult::Complete)
                    }
                    Ok(None) => {
                        self.handle_failure(state, Operation::Deploy, attempt, err, |a| Step::Deploy { attempt: a })
                            .await
                    }
                    Err(list_err) => {
                        warn!(event = "workflow.deploy.relist_failed", error = %list_err);
                        self.handle_failure(state, Operation::Deploy, attempt, err, |a| Step::Deploy { attempt: a })
                            .await
                    }
                }
            }
            Err(err) => {
                self.handle_failure(state, Operation::Deploy, attempt, err, |a| Step::Deploy { attempt: a })
                    .await
            }
        }
    }

    /// A non-HEAD deployment of `version_number` carrying this run's
    /// description, if the platform lists one.
    async fn find_created(
        &self,
        state: &CreationState,
        version_number: u64,
    ) -> Result<Option<DeploymentSlot>, DeployError> {
        let deployments = VersionPool::new(self.backend)
            .list_deployments(&state.project_id)
            .await?;
        Ok(deployments
            .into_iter()
            .find(|d| !d.is_head && d.version_number == version_number && d.description == state.description))
    }

    /// The one automatic eviction cycle. Lists afresh: the pool may have
    /// changed since the orchestrator planned.
    async fn step_evict_and_retry(&self, state: &mut CreationState) -> Result<StepResult, DeployError> {
        state.capacity_retry_used = true;

        let snapshot = match VersionPool::new(self.backend).snapshot(&state.project_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => return self.fatal(state, err),
        };
        let plan = self.config.planner.plan_after_rejection(&snapshot);
        info!(
            event = "workflow.evict_and_retry",
            planned = plan.len(),
            pool = snapshot.non_head_count()
        );
        match evict_deployments(self.backend, &state.project_id, &plan).await {
            Ok(outcome) => state.evicted.extend(outcome.deleted),
            Err(err) => return self.fatal(state, err),
        }

        state.transition(Step::Deploy { attempt: 0 });
        Ok(StepResult::Continue)
    }

    /// The deploy was accepted without an id. Look for our deployment
    /// before declaring a protocol failure.
    async fn step_reconcile(&self, state: &mut CreationState) -> Result<StepResult, DeployError> {
        let Some(version_number) = state.push.as_ref().map(|p| p.version_number) else {
            return self.fatal(state, DeployError::InvalidState("reconcile before push".into()));
        };
        let found = match self.find_created(state, version_number).await {
            Ok(found) => found,
            Err(err) => return self.fatal(state, err),
        };
        match found {
            Some(slot) => {
                info!(event = "workflow.reconcile.matched", deployment_id = %slot.id, version_number);
                state.deployment = Some(slot);
                state.transition(Step::Complete);
                Ok(StepResult::Complete)
            }
            None => self.fatal(
                state,
                DeployError::Protocol(format!(
                    "deploy of version {} returned no deployment id and no matching deployment is listed",
                    version_number
                )),
            ),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════

    async fn bound_project(&self) -> Result<String, DeployError> {
        self.backend.ensure_fresh_credentials().await?;
        self.backend.bound_project_id().await
    }

    /// Shared failure policy for push and deploy: one refresh on auth,
    /// backoff on transient, fatal otherwise.
    async fn handle_failure(
        &self,
        state: &mut CreationState,
        operation: Operation,
        attempt: u32,
        err: DeployError,
        retry_step: impl Fn(u32) -> Step,
    ) -> Result<StepResult, DeployError> {
        let mut record = AttemptRecord {
            operation,
            attempt,
            succeeded: false,
            error: Some(err.to_string()),
            retry_after_ms: None,
        };

        match err {
            DeployError::Auth(reason) if !state.auth_retry_used => {
                warn!(event = "workflow.auth.refresh", ?operation, %reason);
                state.record_attempt(record);
                state.auth_retry_used = true;
                if let Err(err) = self.backend.refresh_credentials().await {
                    return self.fatal(state, err);
                }
                state.transition(retry_step(attempt));
                Ok(StepResult::Continue)
            }
            DeployError::Transient(reason) if self.config.retry.allows_retry(attempt + 1) => {
                let delay = self.config.retry.delay(attempt);
                warn!(
                    event = "workflow.retry",
                    ?operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %reason
                );
                record.retry_after_ms = Some(delay.as_millis() as u64);
                state.record_attempt(record);
                if let Err(err) = self.sleep(delay).await {
                    return self.fatal(state, err);
                }
                state.transition(retry_step(attempt + 1));
                Ok(StepResult::Continue)
            }
            err => {
                state.record_attempt(record);
                self.fatal(state, err)
            }
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<(), DeployError> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.cancel.cancelled() => Err(DeployError::Cancelled("during retry backoff".into())),
        }
    }

    fn fatal(&self, state: &mut CreationState, err: DeployError) -> Result<StepResult, DeployError> {
        error!(
            event = "workflow.failed",
            step = state.step.name(),
            kind = err.kind(),
            error = %err
        );
        state.fail(err.to_string(), err.is_recoverable());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bundle, production, staging, Call, FakeBackend, STAGING_PROJECT};

    fn known() -> Vec<EnvironmentBinding> {
        vec![staging(), production()]
    }

    #[tokio::test]
    async fn test_create_under_cap() {
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(4);
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let mut state = CreationState::new(STAGING_PROJECT, "release 5");
        workflow.run_to_completion(&mut state).await.unwrap();

        assert!(state.is_complete());
        let slot = state.deployment.unwrap();
        assert_eq!(slot.id, "new-1");
        assert_eq!(slot.version_number, 5);
        assert_eq!(backend.non_head_count(), 5);
        // once before push, once before deploy
        assert_eq!(backend.count(|c| *c == Call::BoundProject), 2);
    }

    #[tokio::test]
    async fn test_safety_violation_makes_no_mutations() {
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(2);
        let (bundle, target, known) = (bundle(), production(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let err = workflow.create("release").await.unwrap_err();
        assert!(matches!(err, DeployError::SafetyViolation(_)));
        assert_eq!(backend.count(Call::is_mutation), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_transient_push_failure_retries() {
        let backend = FakeBackend::new(STAGING_PROJECT);
        backend.fail_push(DeployError::Transient("connection reset".into()));
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let mut state = CreationState::new(STAGING_PROJECT, "release");
        workflow.run_to_completion(&mut state).await.unwrap();

        assert!(state.is_complete());
        assert_eq!(state.attempts_for(Operation::Push), 2);
        assert_eq!(backend.count(|c| *c == Call::Push), 2);
        let first = &state.attempts[0];
        assert!(!first.succeeded);
        assert!(first.retry_after_ms.unwrap() >= 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_push_exhausts_attempts() {
        let backend = FakeBackend::new(STAGING_PROJECT);
        for _ in 0..3 {
            backend.fail_push(DeployError::Transient("timeout".into()));
        }
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let mut state = CreationState::new(STAGING_PROJECT, "release");
        let err = workflow.run_to_completion(&mut state).await.unwrap_err();
        assert!(matches!(err, DeployError::Transient(_)));
        assert!(state.is_failed());
        assert_eq!(backend.count(|c| *c == Call::Push), 3);
        assert_eq!(backend.count(|c| matches!(c, Call::CreateDeployment(_))), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_retried() {
        let backend = FakeBackend::new(STAGING_PROJECT);
        backend.fail_push(DeployError::Validation("missing manifest".into()));
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let err = workflow.create("release").await.unwrap_err();
        assert!(matches!(err, DeployError::Validation(_)));
        assert_eq!(backend.count(|c| *c == Call::Push), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_refreshes_once() {
        let backend = FakeBackend::new(STAGING_PROJECT);
        backend.fail_push(DeployError::Auth("expired".into()));
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        workflow.create("release").await.unwrap();
        assert_eq!(backend.count(|c| *c == Call::Refresh), 1);

        let backend = FakeBackend::new(STAGING_PROJECT);
        backend.fail_push(DeployError::Auth("expired".into()));
        backend.fail_push(DeployError::Auth("revoked".into()));
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());
        let err = workflow.create("release").await.unwrap_err();
        assert!(matches!(err, DeployError::Auth(_)));
        assert_eq!(backend.count(|c| *c == Call::Push), 2);
    }

    #[tokio::test]
    async fn test_capacity_triggers_one_eviction_cycle() {
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(20);
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let mut state = CreationState::new(STAGING_PROJECT, "release");
        workflow.run_to_completion(&mut state).await.unwrap();

        assert!(state.capacity_retry_used);
        assert_eq!(state.evicted.len(), 17);
        assert_eq!(backend.non_head_count(), 4);
        assert_eq!(backend.count(|c| matches!(c, Call::CreateDeployment(_))), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_transient_deploy_failure_retries() {
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(4);
        backend.fail_deploy(DeployError::Transient("connection reset".into()));
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let mut state = CreationState::new(STAGING_PROJECT, "release 5");
        workflow.run_to_completion(&mut state).await.unwrap();

        assert!(state.is_complete());
        assert_eq!(state.attempts_for(Operation::Deploy), 2);
        assert_eq!(backend.count(|c| matches!(c, Call::CreateDeployment(_))), 2);
        // nothing was created by the failed call, so the listing found no match
        assert_eq!(backend.count(|c| *c == Call::ListDeployments), 1);
        assert_eq!(backend.non_head_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_deploy_exhausts_attempts() {
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(4);
        for _ in 0..3 {
            backend.fail_deploy(DeployError::Transient("timeout".into()));
        }
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let mut state = CreationState::new(STAGING_PROJECT, "release");
        let err = workflow.run_to_completion(&mut state).await.unwrap_err();
        assert!(matches!(err, DeployError::Transient(_)));
        assert!(state.is_failed());
        assert_eq!(backend.count(|c| matches!(c, Call::CreateDeployment(_))), 3);
        assert_eq!(backend.non_head_count(), 4);
    }

    #[tokio::test]
    async fn test_auth_failure_during_deploy_refreshes_once() {
        let backend = FakeBackend::new(STAGING_PROJECT);
        backend.fail_deploy(DeployError::Auth("expired".into()));
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        workflow.create("release").await.unwrap();
        assert_eq!(backend.count(|c| *c == Call::Refresh), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::CreateDeployment(_))), 2);

        let backend = FakeBackend::new(STAGING_PROJECT);
        backend.fail_deploy(DeployError::Auth("expired".into()));
        backend.fail_deploy(DeployError::Auth("revoked".into()));
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());
        let err = workflow.create("release").await.unwrap_err();
        assert!(matches!(err, DeployError::Auth(_)));
        assert_eq!(backend.count(|c| *c == Call::Refresh), 1);
    }

    #[tokio::test]
    async fn test_transient_deploy_adopts_created_deployment() {
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(4);
        backend.fail_after_create(DeployError::Transient("response lost".into()));
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let mut state = CreationState::new(STAGING_PROJECT, "release 5");
        workflow.run_to_completion(&mut state).await.unwrap();

        assert!(state.is_complete());
        assert_eq!(state.deployment.as_ref().unwrap().id, "new-1");
        assert_eq!(backend.count(|c| matches!(c, Call::CreateDeployment(_))), 1);
        assert_eq!(backend.non_head_count(), 5);
        let ours = backend
            .deployments()
            .into_iter()
            .filter(|d| d.description == "release 5")
            .count();
        assert_eq!(ours, 1);
    }

    #[tokio::test]
    async fn test_second_capacity_error_is_fatal() {
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(20);
        backend.stay_full();
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let err = workflow.create("release").await.unwrap_err();
        assert!(matches!(err, DeployError::Capacity(_)));
        assert_eq!(backend.count(|c| matches!(c, Call::CreateDeployment(_))), 2);
    }

    #[tokio::test]
    async fn test_missing_id_reconciles_from_listing() {
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(1);
        backend.omit_deploy_id();
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let slot = workflow.create("release 2").await.unwrap();
        assert_eq!(slot.id, "new-1");
        assert_eq!(slot.version_number, 2);
    }

    #[tokio::test]
    async fn test_missing_id_without_listing_is_protocol_error() {
        let backend = FakeBackend::new(STAGING_PROJECT);
        backend.lose_deploy();
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default());

        let err = workflow.create("release").await.unwrap_err();
        assert!(matches!(err, DeployError::Protocol(_)));
        assert_eq!(backend.count(|c| matches!(c, Call::CreateDeployment(_))), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let backend = FakeBackend::new(STAGING_PROJECT);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (bundle, target, known) = (bundle(), staging(), known());
        let workflow = DeploymentWorkflow::new(&backend, &bundle, &target, &known, WorkflowConfig::default())
            .with_cancellation(cancel);

        let err = workflow.create("release").await.unwrap_err();
        assert!(matches!(err, DeployError::Cancelled(_)));
        assert!(backend.calls().is_empty());
    }
}
