//! Warmup Verifier
//!
//! Polls each tenant's readiness endpoint until it reports ready or the
//! attempts run out. The root tenant goes first and gates the rest; the
//! remaining tenants are polled concurrently, one task each.

use crate::backend::{ProbeResponse, ReadinessProbe};
use crate::backoff::BackoffPolicy;
use crate::error::DeployError;
use crate::types::{WarmupStatus, WarmupTarget};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How the hosted application routes the status page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessRoute {
    /// `{base}/status?tenant={tenant}`
    Path,
    /// `{base}?p=status&tenant={tenant}`
    #[default]
    Query,
}

impl ReadinessRoute {
    pub fn url(&self, base_url: &str, tenant: &str) -> String {
        let base = base_url.trim_end_matches('/');
        let tenant: String = url::form_urlencoded::byte_serialize(tenant.as_bytes()).collect();
        match self {
            ReadinessRoute::Path => format!("{}/status?tenant={}", base, tenant),
            ReadinessRoute::Query => format!("{}?p=status&tenant={}", base, tenant),
        }
    }
}

/// Structured readiness body. Field names vary between application
/// releases, hence the aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadySignal {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default, alias = "build")]
    pub build_id: Option<String>,
    #[serde(default, alias = "brand", alias = "tenant")]
    pub brand_id: Option<String>,
    #[serde(default, alias = "timestamp")]
    pub time: Option<serde_json::Value>,
}

/// Decide whether one response means "ready".
///
/// Ready requires status 200, a JSON body and `ok == true`. Everything
/// else is `NotReady`, never a hard error.
pub fn evaluate(response: &ProbeResponse) -> Result<ReadySignal, DeployError> {
    if response.status != 200 {
        return Err(DeployError::NotReady(format!("HTTP {}", response.status)));
    }
    let signal: ReadySignal = serde_json::from_str(&response.body)
        .map_err(|e| DeployError::NotReady(format!("body is not structured: {}", e)))?;
    match signal.ok {
        Some(true) => Ok(signal),
        Some(false) => Err(DeployError::NotReady("success flag is false".into())),
        None => Err(DeployError::NotReady("success flag is missing".into())),
    }
}

/// One warmup run.
#[derive(Debug, Clone)]
pub struct WarmupRequest {
    /// Deployment URL the tenant routes hang off.
    pub base_url: String,
    pub tenants: Vec<String>,
    /// Tenant polled alone before the others. Ignored when not in `tenants`.
    pub root_tenant: Option<String>,
    /// Per-tenant attempt budget and delays.
    pub policy: BackoffPolicy,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl WarmupRequest {
    pub fn new(base_url: impl Into<String>, tenants: Vec<String>) -> Self {
        Self {
            base_url: base_url.into(),
            tenants,
            root_tenant: None,
            policy: BackoffPolicy::warmup(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root_tenant = Some(root.into());
        self
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of a warmup run, in the order tenants were requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupReport {
    pub all_ready: bool,
    /// The run was interrupted; pending targets were not exhausted.
    pub cancelled: bool,
    pub results: Vec<WarmupTarget>,
}

impl WarmupReport {
    pub fn ready_count(&self) -> usize {
        self.results
            .iter()
            .filter(|t| t.status == WarmupStatus::Ready)
            .count()
    }

    pub fn not_ready(&self) -> impl Iterator<Item = &WarmupTarget> {
        self.results.iter().filter(|t| t.status != WarmupStatus::Ready)
    }
}

pub struct WarmupVerifier<P: ReadinessProbe> {
    probe: Arc<P>,
    route: ReadinessRoute,
    cancel: CancellationToken,
}

impl<P: ReadinessProbe> WarmupVerifier<P> {
    pub fn new(probe: Arc<P>, route: ReadinessRoute) -> Self {
        Self {
            probe,
            route,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn warmup(&self, request: &WarmupRequest) -> Result<WarmupReport, DeployError> {
        if request.tenants.is_empty() {
            return Err(DeployError::Config("warmup needs at least one tenant".into()));
        }
        if request.policy.max_attempts == 0 {
            return Err(DeployError::Config("warmup max_attempts must be at least 1".into()));
        }

        let mut results: Vec<WarmupTarget> = request
            .tenants
            .iter()
            .map(|t| WarmupTarget::new(t.clone(), self.route.url(&request.base_url, t)))
            .collect();

        let root_index = request
            .root_tenant
            .as_ref()
            .and_then(|root| request.tenants.iter().position(|t| t == root));

        if let Some(i) = root_index {
            info!(event = "warmup.root.start", tenant = %results[i].tenant_id);
            let root = results[i].clone();
            results[i] = poll_target(self.probe.as_ref(), root, request.policy, request.timeout, &self.cancel).await;
            if results[i].status != WarmupStatus::Ready {
                warn!(
                    event = "warmup.root.gate_closed",
                    tenant = %results[i].tenant_id,
                    attempts = results[i].attempts_used
                );
                return Ok(self.report(results));
            }
        }

        let mut tasks = JoinSet::new();
        for (i, target) in results.iter().enumerate() {
            if Some(i) == root_index {
                continue;
            }
            let probe = Arc::clone(&self.probe);
            let target = target.clone();
            let policy = request.policy;
            let timeout = request.timeout;
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let polled = poll_target(probe.as_ref(), target, policy, timeout, &cancel).await;
                (i, polled)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, polled)) => results[i] = polled,
                // The slot stays pending, which already keeps all_ready false.
                Err(e) => error!(event = "warmup.task.panicked", error = %e),
            }
        }

        Ok(self.report(results))
    }

    fn report(&self, results: Vec<WarmupTarget>) -> WarmupReport {
        let all_ready = results.iter().all(|t| t.status == WarmupStatus::Ready);
        let report = WarmupReport {
            all_ready,
            cancelled: self.cancel.is_cancelled(),
            results,
        };
        info!(
            event = "warmup.finished",
            all_ready,
            ready = report.ready_count(),
            total = report.results.len(),
            cancelled = report.cancelled
        );
        report
    }
}

/// Poll one target until it is terminal, the budget is spent or the run
/// is cancelled. A cancelled target stays `Pending`.
async fn poll_target<P: ReadinessProbe>(
    probe: &P,
    mut target: WarmupTarget,
    policy: BackoffPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
) -> WarmupTarget {
    while target.attempts_used < policy.max_attempts {
        let attempt = target.attempts_used;
        let polled = tokio::select! {
            r = tokio::time::timeout(timeout, probe.get(&target.url, timeout)) => r,
            _ = cancel.cancelled() => break,
        };
        target.attempts_used += 1;

        let outcome = polled
            .map_err(|_| DeployError::Transient(format!("no response within {:?}", timeout)))
            .and_then(|r| r)
            .and_then(|response| evaluate(&response));
        match outcome {
            Ok(signal) => {
                info!(
                    event = "warmup.target.ready",
                    tenant = %target.tenant_id,
                    attempts = target.attempts_used,
                    build_id = signal.build_id.as_deref().unwrap_or("")
                );
                target.status = WarmupStatus::Ready;
                target.observed_build_id = signal.build_id;
                target.last_error = None;
                return target;
            }
            Err(err) => {
                debug!(event = "warmup.target.not_ready", tenant = %target.tenant_id, attempt, error = %err);
                target.last_error = Some(err.to_string());
            }
        }

        if target.attempts_used >= policy.max_attempts {
            warn!(
                event = "warmup.target.failed",
                tenant = %target.tenant_id,
                attempts = target.attempts_used,
                error = target.last_error.as_deref().unwrap_or("")
            );
            target.status = WarmupStatus::Failed;
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(policy.delay(attempt)) => {}
            _ = cancel.cancelled() => break,
        }
    }
    target
}
