//! Recording fakes for the backend seams.

use crate::backend::{PlatformBackend, ProbeResponse, ReadinessProbe};
use crate::error::DeployError;
use crate::source::{FileKind, SourceBundle, SourceFile};
use crate::types::{
    DeploymentSlot, EnvironmentBinding, Environment, PushReceipt, VersionRecord, MAX_DEPLOYMENTS,
};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

pub const STAGING_PROJECT: &str = "staging-project";
pub const PRODUCTION_PROJECT: &str = "production-project";

pub fn staging() -> EnvironmentBinding {
    EnvironmentBinding::new(
        Environment::Staging,
        STAGING_PROJECT,
        "https://script.example.com/macros/s",
    )
}

pub fn production() -> EnvironmentBinding {
    EnvironmentBinding::new(
        Environment::Production,
        PRODUCTION_PROJECT,
        "https://script.example.com/macros/s",
    )
}

pub fn bundle() -> SourceBundle {
    SourceBundle {
        root: PathBuf::from("."),
        files: vec![
            SourceFile {
                name: "appsscript".into(),
                kind: FileKind::Json,
                source: "{}".into(),
            },
            SourceFile {
                name: "Code".into(),
                kind: FileKind::ServerJs,
                source: "function doGet(e) {}".into(),
            },
        ],
        digest: "0".repeat(64),
    }
}

pub fn slot(id: &str, version_number: u64) -> DeploymentSlot {
    DeploymentSlot {
        id: id.into(),
        version_number,
        description: format!("deploy {}", version_number),
        created_at: None,
        is_head: false,
        url: None,
    }
}

pub fn head() -> DeploymentSlot {
    DeploymentSlot {
        id: "HEAD-ID".into(),
        version_number: 0,
        description: "Head deployment".into(),
        created_at: None,
        is_head: true,
        url: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    BoundProject,
    EnsureFresh,
    Refresh,
    ListVersions,
    ListDeployments,
    Push,
    CreateDeployment(u64),
    DeleteDeployment(String),
    DeleteVersion(u64),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Push | Call::CreateDeployment(_) | Call::DeleteDeployment(_) | Call::DeleteVersion(_)
        )
    }
}

#[derive(Default)]
struct FakeState {
    bound_project: String,
    versions: Vec<VersionRecord>,
    deployments: Vec<DeploymentSlot>,
    next_id: u64,
    calls: Vec<Call>,
    push_failures: VecDeque<DeployError>,
    deploy_failures: VecDeque<DeployError>,
    after_create_failures: VecDeque<DeployError>,
    list_failures: VecDeque<DeployError>,
    undeletable_versions: Vec<u64>,
    omit_deploy_id: bool,
    lose_deploy: bool,
    enforce_cap: bool,
}

/// In-memory platform that behaves like the real one closely enough for
/// the workflow: it enforces the deployment cap, refuses to delete HEAD
/// and refuses to delete versions that back a deployment.
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(bound_project: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                bound_project: bound_project.into(),
                next_id: 1,
                enforce_cap: true,
                ..Default::default()
            }),
        }
    }

    /// Populate `n` non-HEAD deployments (versions 1..=n) plus HEAD.
    pub fn with_deployments(self, n: u64) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            s.deployments.push(head());
            for v in 1..=n {
                s.versions.push(VersionRecord {
                    version_number: v,
                    description: String::new(),
                    created_at: None,
                });
                s.deployments.push(slot(&format!("dep-{}", v), v));
            }
        }
        self
    }

    /// Add `n` versions numbered after the newest existing one.
    pub fn with_versions(self, n: u64) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            let newest = s.versions.iter().map(|v| v.version_number).max().unwrap_or(0);
            for v in newest + 1..=newest + n {
                s.versions.push(VersionRecord {
                    version_number: v,
                    description: String::new(),
                    created_at: None,
                });
            }
        }
        self
    }

    pub fn fail_push(&self, err: DeployError) {
        self.state.lock().unwrap().push_failures.push_back(err);
    }

    pub fn fail_deploy(&self, err: DeployError) {
        self.state.lock().unwrap().deploy_failures.push_back(err);
    }

    /// Create the deployment, then report `err` as if the response was
    /// lost on the way back.
    pub fn fail_after_create(&self, err: DeployError) {
        self.state.lock().unwrap().after_create_failures.push_back(err);
    }

    pub fn fail_list(&self, err: DeployError) {
        self.state.lock().unwrap().list_failures.push_back(err);
    }

    /// Refuse to delete `version_number` whether or not it is in use.
    pub fn reject_version_delete(&self, version_number: u64) {
        self.state.lock().unwrap().undeletable_versions.push(version_number);
    }

    pub fn versions(&self) -> Vec<VersionRecord> {
        self.state.lock().unwrap().versions.clone()
    }

    pub fn omit_deploy_id(&self) {
        self.state.lock().unwrap().omit_deploy_id = true;
    }

    /// Accept creation without an id and without the deployment ever
    /// showing up in listings.
    pub fn lose_deploy(&self) {
        let mut s = self.state.lock().unwrap();
        s.omit_deploy_id = true;
        s.lose_deploy = true;
    }

    /// Reject creation at the cap even after eviction freed room.
    pub fn stay_full(&self) {
        let mut s = self.state.lock().unwrap();
        s.enforce_cap = false;
        for _ in 0..2 {
            s.deploy_failures
                .push_back(DeployError::Capacity("20 deployments".into()));
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn deployments(&self) -> Vec<DeploymentSlot> {
        self.state.lock().unwrap().deployments.clone()
    }

    pub fn non_head_count(&self) -> usize {
        self.deployments().iter().filter(|d| !d.is_head).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl PlatformBackend for FakeBackend {
    async fn bound_project_id(&self) -> Result<String, DeployError> {
        self.record(Call::BoundProject);
        Ok(self.state.lock().unwrap().bound_project.clone())
    }

    async fn ensure_fresh_credentials(&self) -> Result<(), DeployError> {
        self.record(Call::EnsureFresh);
        Ok(())
    }

    async fn refresh_credentials(&self) -> Result<(), DeployError> {
        self.record(Call::Refresh);
        Ok(())
    }

    async fn list_versions(&self, _project_id: &str) -> Result<Vec<VersionRecord>, DeployError> {
        self.record(Call::ListVersions);
        let mut s = self.state.lock().unwrap();
        if let Some(err) = s.list_failures.pop_front() {
            return Err(err);
        }
        Ok(s.versions.clone())
    }

    async fn list_deployments(&self, _project_id: &str) -> Result<Vec<DeploymentSlot>, DeployError> {
        self.record(Call::ListDeployments);
        let mut s = self.state.lock().unwrap();
        if let Some(err) = s.list_failures.pop_front() {
            return Err(err);
        }
        Ok(s.deployments.clone())
    }

    async fn push(
        &self,
        _project_id: &str,
        bundle: &SourceBundle,
        description: &str,
    ) -> Result<PushReceipt, DeployError> {
        self.record(Call::Push);
        let mut s = self.state.lock().unwrap();
        if let Some(err) = s.push_failures.pop_front() {
            return Err(err);
        }
        let version_number = s.versions.iter().map(|v| v.version_number).max().unwrap_or(0) + 1;
        s.versions.push(VersionRecord {
            version_number,
            description: description.into(),
            created_at: None,
        });
        Ok(PushReceipt {
            version_number,
            content_digest: bundle.digest.clone(),
            file_count: bundle.files.len(),
        })
    }

    async fn create_deployment(
        &self,
        _project_id: &str,
        version_number: u64,
        description: &str,
    ) -> Result<Option<DeploymentSlot>, DeployError> {
        self.record(Call::CreateDeployment(version_number));
        let mut s = self.state.lock().unwrap();
        if let Some(err) = s.deploy_failures.pop_front() {
            return Err(err);
        }
        let non_head = s.deployments.iter().filter(|d| !d.is_head).count();
        if s.enforce_cap && non_head >= MAX_DEPLOYMENTS {
            return Err(DeployError::Capacity(format!("{} deployments", non_head)));
        }
        let id = format!("new-{}", s.next_id);
        s.next_id += 1;
        let created = DeploymentSlot {
            id,
            version_number,
            description: description.into(),
            created_at: None,
            is_head: false,
            url: None,
        };
        if !s.lose_deploy {
            s.deployments.push(created.clone());
        }
        if let Some(err) = s.after_create_failures.pop_front() {
            return Err(err);
        }
        if s.omit_deploy_id {
            return Ok(None);
        }
        Ok(Some(created))
    }

    async fn delete_deployment(&self, _project_id: &str, deployment_id: &str) -> Result<(), DeployError> {
        self.record(Call::DeleteDeployment(deployment_id.into()));
        let mut s = self.state.lock().unwrap();
        match s.deployments.iter().position(|d| d.id == deployment_id) {
            Some(i) if s.deployments[i].is_head => Err(DeployError::Platform {
                code: "FAILED_PRECONDITION".into(),
                message: "cannot delete HEAD".into(),
            }),
            Some(i) => {
                s.deployments.remove(i);
                Ok(())
            }
            None => Err(DeployError::NotFound(deployment_id.into())),
        }
    }

    async fn delete_version(&self, _project_id: &str, version_number: u64) -> Result<(), DeployError> {
        self.record(Call::DeleteVersion(version_number));
        let mut s = self.state.lock().unwrap();
        if s.undeletable_versions.contains(&version_number) {
            return Err(DeployError::Platform {
                code: "PERMISSION_DENIED".into(),
                message: format!("version {} is locked", version_number),
            });
        }
        if s.deployments
            .iter()
            .any(|d| !d.is_head && d.version_number == version_number)
        {
            return Err(DeployError::Platform {
                code: "FAILED_PRECONDITION".into(),
                message: format!("version {} is in use", version_number),
            });
        }
        s.versions.retain(|v| v.version_number != version_number);
        Ok(())
    }
}

/// Scripted readiness responses per URL. Once a script runs out, the
/// last response repeats.
#[derive(Default)]
pub struct FakeProbe {
    scripts: Mutex<HashMap<String, VecDeque<Result<ProbeResponse, DeployError>>>>,
    last: Mutex<HashMap<String, ProbeResponse>>,
    polls: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, responses: Vec<Result<ProbeResponse, DeployError>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into_iter().collect());
    }

    pub fn always(&self, url: &str, response: ProbeResponse) {
        self.script(url, vec![Ok(response)]);
    }

    pub fn polls(&self) -> Vec<String> {
        self.polls.lock().unwrap().clone()
    }

    pub fn poll_count(&self, url: &str) -> usize {
        self.polls().iter().filter(|u| u.as_str() == url).count()
    }
}

pub fn ready_body(tenant: &str) -> ProbeResponse {
    ProbeResponse {
        status: 200,
        body: format!(
            r#"{{"ok":true,"buildId":"build-7","brandId":"{}","time":"2026-10-16T00:00:00Z"}}"#,
            tenant
        ),
    }
}

pub fn not_ready_body() -> ProbeResponse {
    ProbeResponse {
        status: 503,
        body: "starting".into(),
    }
}

impl ReadinessProbe for FakeProbe {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<ProbeResponse, DeployError> {
        self.polls.lock().unwrap().push(url.to_string());
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|q| q.pop_front());
        match next {
            Some(Ok(resp)) => {
                self.last.lock().unwrap().insert(url.to_string(), resp.clone());
                Ok(resp)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self
                .last
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(not_ready_body)),
        }
    }
}
