//! Orchestrator
//!
//! Composition root: safety check → load source → list pool → plan →
//! evict → prune versions → create → warmup → summary. Any fatal step
//! halts the run; the summary names the last step that completed and
//! the one that failed.

use crate::backend::{PlatformBackend, ReadinessProbe};
use crate::backoff::BackoffPolicy;
use crate::error::DeployError;
use crate::eviction::{evict_deployments, evict_versions, EvictionOutcome, EvictionPlan};
use crate::pool::VersionPool;
use crate::safety::{verify_binding, verify_url};
use crate::source::{SourceBundle, DEFAULT_MANIFEST_FILE};
use crate::state::{AttemptRecord, CreationState};
use crate::store::{AuditAction, AuditLog, AuditRecord};
use crate::types::{DeploymentSlot, Environment, EnvironmentBinding, PoolSnapshot};
use crate::warmup::{ReadinessRoute, WarmupReport, WarmupRequest, WarmupVerifier};
use crate::workflow::{DeploymentWorkflow, WorkflowConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    SafetyCheck,
    LoadSource,
    ListPool,
    Plan,
    Evict,
    PruneVersions,
    Create,
    Warmup,
}

impl PipelineStep {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStep::SafetyCheck => "safety_check",
            PipelineStep::LoadSource => "load_source",
            PipelineStep::ListPool => "list_pool",
            PipelineStep::Plan => "plan",
            PipelineStep::Evict => "evict",
            PipelineStep::PruneVersions => "prune_versions",
            PipelineStep::Create => "create",
            PipelineStep::Warmup => "warmup",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: PipelineStep,
    pub outcome: StepOutcome,
    pub elapsed_ms: u64,
}

/// A fatal condition as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
    pub next_action: String,
}

impl From<&DeployError> for ErrorReport {
    fn from(err: &DeployError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            next_action: err.next_action().to_string(),
        }
    }
}

/// Structured result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub environment: Environment,
    pub project_id: String,
    pub description: String,
    /// Deployment created and every tenant ready.
    pub success: bool,
    pub deployment_created: bool,
    pub fully_warmed: bool,
    pub cancelled: bool,
    pub deployment: Option<DeploymentSlot>,
    pub deployment_url: Option<String>,
    pub evicted: Vec<String>,
    pub pruned_versions: Vec<String>,
    /// Deletions the platform refused, as `(id, reason)`.
    pub rejected: Vec<(String, String)>,
    pub steps: Vec<StepTiming>,
    pub last_completed_step: Option<PipelineStep>,
    pub failed_step: Option<PipelineStep>,
    pub error: Option<ErrorReport>,
    pub warmup: Option<WarmupReport>,
    pub attempts: Vec<AttemptRecord>,
}

impl RunSummary {
    fn new(target: &EnvironmentBinding, description: &str) -> Self {
        Self {
            environment: target.environment,
            project_id: target.project_id.clone(),
            description: description.to_string(),
            success: false,
            deployment_created: false,
            fully_warmed: false,
            cancelled: false,
            deployment: None,
            deployment_url: None,
            evicted: Vec::new(),
            pruned_versions: Vec::new(),
            rejected: Vec::new(),
            steps: Vec::new(),
            last_completed_step: None,
            failed_step: None,
            error: None,
            warmup: None,
            attempts: Vec::new(),
        }
    }

    fn complete(&mut self, step: PipelineStep, started: Instant) {
        self.push_timing(step, StepOutcome::Completed, started);
        self.last_completed_step = Some(step);
    }

    fn skip(&mut self, step: PipelineStep) {
        self.steps.push(StepTiming {
            step,
            outcome: StepOutcome::Skipped,
            elapsed_ms: 0,
        });
    }

    fn fail(&mut self, step: PipelineStep, started: Instant, err: &DeployError) {
        self.push_timing(step, StepOutcome::Failed, started);
        self.failed_step = Some(step);
        self.cancelled |= matches!(err, DeployError::Cancelled(_));
        self.error = Some(ErrorReport::from(err));
    }

    fn push_timing(&mut self, step: PipelineStep, outcome: StepOutcome, started: Instant) {
        self.steps.push(StepTiming {
            step,
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }

    fn absorb(&mut self, outcome: EvictionOutcome) -> Vec<String> {
        self.rejected.extend(outcome.rejected);
        outcome.deleted
    }
}

/// Dry-run output: what a run would delete, without deleting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub environment: Environment,
    pub project_id: String,
    pub non_head_deployments: usize,
    pub versions: usize,
    pub deployment_headroom: usize,
    pub deployment_plan: EvictionPlan,
    pub version_plan: EvictionPlan,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub workflow: WorkflowConfig,
    pub source_dir: PathBuf,
    pub manifest_file: String,
    pub tenants: Vec<String>,
    pub root_tenant: Option<String>,
    pub route: ReadinessRoute,
    pub warmup_policy: BackoffPolicy,
    pub poll_timeout: Duration,
    /// Prune versions as the version cap approaches.
    pub prune_versions: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workflow: WorkflowConfig::default(),
            source_dir: PathBuf::from("."),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            tenants: vec!["root".to_string()],
            root_tenant: Some("root".to_string()),
            route: ReadinessRoute::default(),
            warmup_policy: BackoffPolicy::warmup(),
            poll_timeout: Duration::from_secs(30),
            prune_versions: true,
        }
    }
}

type StepError = (PipelineStep, DeployError);

trait AtStep<T> {
    fn at(self, step: PipelineStep) -> Result<T, StepError>;
}

impl<T> AtStep<T> for Result<T, DeployError> {
    fn at(self, step: PipelineStep) -> Result<T, StepError> {
        self.map_err(|e| (step, e))
    }
}

pub struct Orchestrator<B: PlatformBackend, P: ReadinessProbe> {
    backend: B,
    probe: Arc<P>,
    target: EnvironmentBinding,
    known: Vec<EnvironmentBinding>,
    config: OrchestratorConfig,
    audit: Box<dyn AuditLog>,
    cancel: CancellationToken,
}

impl<B: PlatformBackend, P: ReadinessProbe> Orchestrator<B, P> {
    pub fn new(
        backend: B,
        probe: Arc<P>,
        target: EnvironmentBinding,
        known: Vec<EnvironmentBinding>,
        config: OrchestratorConfig,
        audit: Box<dyn AuditLog>,
    ) -> Self {
        Self {
            backend,
            probe,
            target,
            known,
            config,
            audit,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run the whole pipeline. Never returns early without a summary.
    pub async fn run(&mut self, description: &str) -> RunSummary {
        let mut summary = RunSummary::new(&self.target, description);
        let mut clock = Instant::now();
        if let Err((step, err)) = self.pipeline(&mut summary, &mut clock, description).await {
            summary.fail(step, clock, &err);
        }
        summary.success = summary.deployment_created && summary.fully_warmed;
        info!(
            event = "orchestrator.finished",
            environment = %summary.environment,
            success = summary.success,
            deployment_created = summary.deployment_created,
            fully_warmed = summary.fully_warmed,
            failed_step = summary.failed_step.map(|s| s.name()).unwrap_or("")
        );
        summary
    }

    async fn pipeline(
        &mut self,
        summary: &mut RunSummary,
        clock: &mut Instant,
        description: &str,
    ) -> Result<(), StepError> {
        let project_id = self.target.project_id.clone();

        self.begin(PipelineStep::SafetyCheck, clock)?;
        self.safety_check().await.at(PipelineStep::SafetyCheck)?;
        summary.complete(PipelineStep::SafetyCheck, *clock);

        self.begin(PipelineStep::LoadSource, clock)?;
        let bundle = SourceBundle::load(&self.config.source_dir, &self.config.manifest_file)
            .at(PipelineStep::LoadSource)?;
        summary.complete(PipelineStep::LoadSource, *clock);

        self.begin(PipelineStep::ListPool, clock)?;
        let snapshot = VersionPool::new(&self.backend)
            .snapshot(&project_id)
            .await
            .at(PipelineStep::ListPool)?;
        summary.complete(PipelineStep::ListPool, *clock);

        self.begin(PipelineStep::Plan, clock)?;
        let planner = self.config.workflow.planner;
        let deployment_plan = planner.plan_for_creation(&snapshot);
        let version_plan = if self.config.prune_versions {
            planner.plan_versions(&snapshot, &deployment_plan)
        } else {
            EvictionPlan::default()
        };
        info!(
            event = "orchestrator.plan",
            pool = snapshot.non_head_count(),
            evict = deployment_plan.len(),
            prune = version_plan.len()
        );
        summary.complete(PipelineStep::Plan, *clock);

        if deployment_plan.is_empty() {
            summary.skip(PipelineStep::Evict);
        } else {
            self.begin(PipelineStep::Evict, clock)?;
            let outcome = evict_deployments(&self.backend, &project_id, &deployment_plan)
                .await
                .at(PipelineStep::Evict)?;
            let deleted = summary.absorb(outcome);
            self.record_audit(AuditAction::DeploymentsEvicted, deleted.clone(), None).await;
            summary.evicted.extend(deleted);
            summary.complete(PipelineStep::Evict, *clock);
        }

        if version_plan.is_empty() {
            summary.skip(PipelineStep::PruneVersions);
        } else {
            self.begin(PipelineStep::PruneVersions, clock)?;
            let outcome = evict_versions(&self.backend, &project_id, &version_plan)
                .await
                .at(PipelineStep::PruneVersions)?;
            let deleted = summary.absorb(outcome);
            self.record_audit(AuditAction::VersionsPruned, deleted.clone(), None).await;
            summary.pruned_versions.extend(deleted);
            summary.complete(PipelineStep::PruneVersions, *clock);
        }

        self.begin(PipelineStep::Create, clock)?;
        let mut state = CreationState::new(project_id.clone(), description);
        let created = {
            let workflow = DeploymentWorkflow::new(
                &self.backend,
                &bundle,
                &self.target,
                &self.known,
                self.config.workflow.clone(),
            )
            .with_cancellation(self.cancel.clone());
            workflow.run_to_completion(&mut state).await
        };
        summary.attempts = state.attempts.clone();
        if !state.evicted.is_empty() {
            self.record_audit(AuditAction::DeploymentsEvicted, state.evicted.clone(), None).await;
            summary.evicted.extend(state.evicted.iter().cloned());
        }
        created.at(PipelineStep::Create)?;
        let slot = state
            .deployment
            .ok_or_else(|| DeployError::InvalidState("workflow completed without a deployment".into()))
            .at(PipelineStep::Create)?;
        self.record_audit(
            AuditAction::DeploymentCreated,
            vec![slot.id.clone()],
            Some(format!("version {}: {}", slot.version_number, description)),
        )
        .await;
        let url = self.target.deployment_url(&slot);
        summary.deployment_created = true;
        summary.deployment = Some(slot);
        summary.deployment_url = Some(url.clone());
        summary.complete(PipelineStep::Create, *clock);

        self.begin(PipelineStep::Warmup, clock)?;
        let report = self.verify(&url).await.at(PipelineStep::Warmup)?;
        summary.fully_warmed = report.all_ready;
        let outcome = if report.cancelled {
            Err(DeployError::Cancelled("warmup interrupted".into()))
        } else if !report.all_ready {
            let tenants: Vec<&str> = report.not_ready().map(|t| t.tenant_id.as_str()).collect();
            Err(DeployError::NotReady(format!("tenants not ready: {}", tenants.join(", "))))
        } else {
            Ok(())
        };
        summary.warmup = Some(report);
        outcome.at(PipelineStep::Warmup)?;
        summary.complete(PipelineStep::Warmup, *clock);
        Ok(())
    }

    /// Dry run: safety check, fresh listing and both plans. Mutates nothing.
    pub async fn plan_only(&self) -> Result<PlanReport, DeployError> {
        self.safety_check().await?;
        let snapshot = self.inspect().await?;
        let planner = self.config.workflow.planner;
        let deployment_plan = planner.plan_for_creation(&snapshot);
        let version_plan = if self.config.prune_versions {
            planner.plan_versions(&snapshot, &deployment_plan)
        } else {
            EvictionPlan::default()
        };
        Ok(PlanReport {
            environment: self.target.environment,
            project_id: self.target.project_id.clone(),
            non_head_deployments: snapshot.non_head_count(),
            versions: snapshot.versions.len(),
            deployment_headroom: snapshot.deployment_headroom(),
            deployment_plan,
            version_plan,
        })
    }

    /// Read-only listing of the target's pool.
    pub async fn inspect(&self) -> Result<PoolSnapshot, DeployError> {
        VersionPool::new(&self.backend)
            .snapshot(&self.target.project_id)
            .await
    }

    /// Warm up an existing deployment URL with the configured tenants.
    pub async fn verify(&self, url: &str) -> Result<WarmupReport, DeployError> {
        verify_url(&self.target, url)?;
        let request = WarmupRequest {
            base_url: url.to_string(),
            tenants: self.config.tenants.clone(),
            root_tenant: self.config.root_tenant.clone(),
            policy: self.config.warmup_policy,
            timeout: self.config.poll_timeout,
        };
        WarmupVerifier::new(Arc::clone(&self.probe), self.config.route)
            .with_cancellation(self.cancel.clone())
            .warmup(&request)
            .await
    }

    async fn safety_check(&self) -> Result<(), DeployError> {
        self.backend.ensure_fresh_credentials().await?;
        let bound = self.backend.bound_project_id().await?;
        verify_binding(&self.target, &self.target.project_id, &bound, &self.known)
    }

    /// Mark the start of `step`, refusing to start anything once cancelled.
    fn begin(&self, step: PipelineStep, clock: &mut Instant) -> Result<(), StepError> {
        *clock = Instant::now();
        if self.cancel.is_cancelled() {
            return Err((step, DeployError::Cancelled(format!("before {}", step))));
        }
        info!(event = "orchestrator.step", step = step.name());
        Ok(())
    }

    /// Audit failures are logged, never fatal: the mutation already happened.
    async fn record_audit(&mut self, action: AuditAction, ids: Vec<String>, description: Option<String>) {
        if ids.is_empty() {
            return;
        }
        let mut record = AuditRecord::new(self.target.environment, action, self.target.project_id.clone(), ids);
        if let Some(description) = description {
            record = record.with_description(description);
        }
        if let Err(err) = self.audit.append(&record).await {
            warn!(event = "audit.write_failed", error = %err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Operation;
    use crate::store::MemoryAuditLog;
    use crate::testing::{
        not_ready_body, production, ready_body, staging, Call, FakeBackend, FakeProbe, STAGING_PROJECT,
    };
    use crate::types::WarmupStatus;

    const TENANTS: [&str; 3] = ["root", "abc", "cbc"];

    struct Harness {
        _dir: tempfile::TempDir,
        config: OrchestratorConfig,
        audit: MemoryAuditLog,
        probe: Arc<FakeProbe>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("appsscript.json"), r#"{"timeZone":"Etc/UTC"}"#).unwrap();
        std::fs::write(dir.path().join("Code.gs"), "function doGet(e) {}").unwrap();
        let config = OrchestratorConfig {
            source_dir: dir.path().to_path_buf(),
            tenants: TENANTS.iter().map(|t| t.to_string()).collect(),
            ..OrchestratorConfig::default()
        };
        Harness {
            _dir: dir,
            config,
            audit: MemoryAuditLog::new(),
            probe: Arc::new(FakeProbe::new()),
        }
    }

    fn all_ready(probe: &FakeProbe, slot_id: &str) {
        let base = format!("https://script.example.com/macros/s/{}/exec", slot_id);
        for t in TENANTS {
            probe.always(&ReadinessRoute::Query.url(&base, t), ready_body(t));
        }
    }

    fn orchestrator(
        h: &Harness,
        backend: FakeBackend,
        target: EnvironmentBinding,
    ) -> Orchestrator<FakeBackend, FakeProbe> {
        Orchestrator::new(
            backend,
            Arc::clone(&h.probe),
            target,
            vec![staging(), production()],
            h.config.clone(),
            Box::new(h.audit.clone()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pool_evicts_creates_and_warms() {
        let h = harness();
        all_ready(&h.probe, "new-1");
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(20);
        let mut orch = orchestrator(&h, backend, staging());

        let summary = orch.run("release 21").await;
        assert!(summary.success, "{:?}", summary.error);
        assert_eq!(summary.evicted.len(), 17);
        assert_eq!(summary.evicted[0], "dep-1");
        assert_eq!(orch.backend().non_head_count(), 4);
        assert_eq!(summary.last_completed_step, Some(PipelineStep::Warmup));
        assert_eq!(summary.warmup.as_ref().unwrap().ready_count(), 3);

        let actions: Vec<AuditAction> = h.audit.records().iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![AuditAction::DeploymentsEvicted, AuditAction::DeploymentCreated]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_under_cap_skips_eviction() {
        let h = harness();
        all_ready(&h.probe, "new-1");
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(5);
        let mut orch = orchestrator(&h, backend, staging());

        let summary = orch.run("release").await;
        assert!(summary.success);
        assert!(summary.evicted.is_empty());
        assert_eq!(orch.backend().count(|c| matches!(c, Call::DeleteDeployment(_))), 0);
        assert!(summary
            .steps
            .iter()
            .any(|s| s.step == PipelineStep::Evict && s.outcome == StepOutcome::Skipped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_limit_prunes_oldest_unused_versions() {
        let h = harness();
        all_ready(&h.probe, "new-1");
        // versions 1..=195, the first five backing live deployments
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(5).with_versions(190);
        backend.reject_version_delete(6);
        let mut orch = orchestrator(&h, backend, staging());

        let summary = orch.run("release").await;
        assert!(summary.success, "{:?}", summary.error);
        assert!(summary.evicted.is_empty());

        // 190 unprotected candidates, 45 kept alongside the 5 in use
        assert_eq!(summary.pruned_versions.len(), 144);
        assert_eq!(summary.pruned_versions[0], "7");
        assert_eq!(summary.pruned_versions.last().map(String::as_str), Some("150"));
        assert_eq!(summary.rejected.len(), 1);
        assert_eq!(summary.rejected[0].0, "6");
        assert!(summary
            .steps
            .iter()
            .any(|s| s.step == PipelineStep::PruneVersions && s.outcome == StepOutcome::Completed));

        let backend = orch.backend();
        assert_eq!(backend.count(|c| matches!(c, Call::DeleteVersion(1..=5))), 0);
        assert_eq!(backend.count(|c| matches!(c, Call::DeleteVersion(_))), 145);
        // 195 - 144 pruned + 1 pushed
        assert_eq!(backend.versions().len(), 52);

        let records = h.audit.records();
        let actions: Vec<AuditAction> = records.iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![AuditAction::VersionsPruned, AuditAction::DeploymentCreated]);
        assert_eq!(records[0].ids, summary.pruned_versions);
    }

    #[tokio::test]
    async fn test_wrong_credentials_abort_before_any_mutation() {
        let h = harness();
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(20);
        let mut orch = orchestrator(&h, backend, production());

        let summary = orch.run("release").await;
        assert!(!summary.success);
        assert_eq!(summary.failed_step, Some(PipelineStep::SafetyCheck));
        assert_eq!(summary.last_completed_step, None);
        assert_eq!(summary.error.as_ref().unwrap().kind, "safety_violation");
        assert_eq!(orch.backend().count(Call::is_mutation), 0);
        assert!(h.audit.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_push_failure_recovers() {
        let h = harness();
        all_ready(&h.probe, "new-1");
        let backend = FakeBackend::new(STAGING_PROJECT);
        backend.fail_push(DeployError::Transient("connection reset".into()));
        let mut orch = orchestrator(&h, backend, staging());

        let summary = orch.run("release").await;
        assert!(summary.success);
        let pushes = summary.attempts.iter().filter(|a| a.operation == Operation::Push).count();
        assert_eq!(pushes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_failure_keeps_deployment_created() {
        let h = harness();
        let base = "https://script.example.com/macros/s/new-1/exec";
        h.probe.always(&ReadinessRoute::Query.url(base, "root"), ready_body("root"));
        h.probe.always(&ReadinessRoute::Query.url(base, "abc"), ready_body("abc"));
        h.probe.always(&ReadinessRoute::Query.url(base, "cbc"), not_ready_body());
        let backend = FakeBackend::new(STAGING_PROJECT);
        let mut orch = orchestrator(&h, backend, staging());

        let summary = orch.run("release").await;
        assert!(!summary.success);
        assert!(summary.deployment_created);
        assert!(!summary.fully_warmed);
        assert_eq!(summary.failed_step, Some(PipelineStep::Warmup));
        assert_eq!(summary.last_completed_step, Some(PipelineStep::Create));
        let error = summary.error.unwrap();
        assert_eq!(error.kind, "not_ready");
        assert!(error.message.contains("cbc"));
        let warmup = summary.warmup.unwrap();
        assert_eq!(warmup.results[2].status, WarmupStatus::Failed);
        assert_eq!(warmup.results[1].status, WarmupStatus::Ready);
    }

    #[tokio::test]
    async fn test_missing_manifest_fails_before_pool_mutation() {
        let mut h = harness();
        let empty = tempfile::tempdir().unwrap();
        h.config.source_dir = empty.path().to_path_buf();
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(20);
        let mut orch = orchestrator(&h, backend, staging());

        let summary = orch.run("release").await;
        assert_eq!(summary.failed_step, Some(PipelineStep::LoadSource));
        assert_eq!(summary.error.unwrap().kind, "validation");
        assert_eq!(orch.backend().count(Call::is_mutation), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_step() {
        let h = harness();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backend = FakeBackend::new(STAGING_PROJECT);
        let mut orch = orchestrator(&h, backend, staging()).with_cancellation(cancel);

        let summary = orch.run("release").await;
        assert!(summary.cancelled);
        assert_eq!(summary.failed_step, Some(PipelineStep::SafetyCheck));
        assert!(orch.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_plan_only_mutates_nothing() {
        let h = harness();
        let backend = FakeBackend::new(STAGING_PROJECT).with_deployments(20);
        let orch = orchestrator(&h, backend, staging());

        let report = orch.plan_only().await.unwrap();
        assert_eq!(report.non_head_deployments, 20);
        assert_eq!(report.deployment_plan.len(), 17);
        assert!(report.version_plan.is_empty());
        assert_eq!(orch.backend().count(Call::is_mutation), 0);
    }
}
