//! Runtime configuration.
//!
//! Layering, lowest to highest: built-in defaults, the TOML file, then
//! `SCRIPT_DEPLOY_*` environment variables (after `.env` is loaded by the
//! binary). Environment tables are data here, never constants, so every
//! binding the safety check sees was injected at startup.

use crate::backoff::BackoffPolicy;
use crate::error::DeployError;
use crate::eviction::EvictionPlanner;
use crate::orchestrator::OrchestratorConfig;
use crate::types::{Environment, EnvironmentBinding};
use crate::warmup::ReadinessRoute;
use crate::workflow::WorkflowConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_PREFIX: &str = "SCRIPT_DEPLOY_";

pub const DEFAULT_API_BASE: &str = "https://script.googleapis.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_BASE_URL: &str = "https://script.google.com/macros/s";

/// Project and serving URL of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub project_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Retry numbers for both backoff users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub deploy_attempts: u32,
    pub deploy_base_ms: u64,
    pub deploy_cap_ms: u64,
    pub warmup_attempts: u32,
    pub warmup_base_ms: u64,
    pub warmup_cap_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            deploy_attempts: 3,
            deploy_base_ms: 5_000,
            deploy_cap_ms: 60_000,
            warmup_attempts: 5,
            warmup_base_ms: 2_000,
            warmup_cap_ms: 30_000,
            jitter_max_ms: 1_000,
        }
    }
}

/// Per-operation timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub list_secs: u64,
    pub push_secs: u64,
    pub deploy_secs: u64,
    pub delete_secs: u64,
    pub poll_secs: u64,
    pub token_secs: u64,
    /// Refresh tokens that expire within this margin.
    pub token_margin_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            list_secs: 30,
            push_secs: 180,
            deploy_secs: 120,
            delete_secs: 30,
            poll_secs: 30,
            token_secs: 30,
            token_margin_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn list(&self) -> Duration {
        Duration::from_secs(self.list_secs)
    }

    pub fn push(&self) -> Duration {
        Duration::from_secs(self.push_secs)
    }

    pub fn deploy(&self) -> Duration {
        Duration::from_secs(self.deploy_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }

    pub fn token(&self) -> Duration {
        Duration::from_secs(self.token_secs)
    }

    pub fn token_margin(&self) -> Duration {
        Duration::from_secs(self.token_margin_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub api_base: String,
    pub token_url: String,
    /// Credentials JSON. Defaults to `~/.script-deploy/credentials.json`.
    pub credentials: Option<PathBuf>,
    pub source_dir: PathBuf,
    pub manifest_file: String,
    pub keep_count: usize,
    pub version_keep: usize,
    pub tenants: Vec<String>,
    pub root_tenant: Option<String>,
    pub readiness_route: ReadinessRoute,
    pub environments: BTreeMap<Environment, EnvironmentConfig>,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            credentials: None,
            source_dir: PathBuf::from("."),
            manifest_file: crate::source::DEFAULT_MANIFEST_FILE.to_string(),
            keep_count: 3,
            version_keep: 50,
            tenants: ["root", "abc", "cbc", "cbl"].iter().map(|t| t.to_string()).collect(),
            root_tenant: Some("root".to_string()),
            readiness_route: ReadinessRoute::default(),
            environments: BTreeMap::new(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl DeployConfig {
    /// Load from `path` (must exist) or from the default location (may be
    /// absent), then apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DeployError> {
        debug!(event = "config.load", path = %path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| DeployError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self, DeployError> {
        toml::from_str(content).map_err(|e| DeployError::Config(format!("invalid config: {}", e)))
    }

    /// Apply `SCRIPT_DEPLOY_*` overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), DeployError> {
        let get = |name: &str| var(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty());

        if let Some(v) = get("API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = get("TOKEN_URL") {
            self.token_url = v;
        }
        if let Some(v) = get("CREDENTIALS") {
            self.credentials = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SOURCE_DIR") {
            self.source_dir = PathBuf::from(v);
        }
        if let Some(v) = get("KEEP_COUNT") {
            self.keep_count = v
                .parse()
                .map_err(|_| DeployError::Config(format!("{}KEEP_COUNT is not a number: {}", ENV_PREFIX, v)))?;
        }
        if let Some(v) = get("TENANTS") {
            self.tenants = v
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        for env in [Environment::Staging, Environment::Production] {
            let upper = env.name().to_ascii_uppercase();
            let project = get(&format!("{}_PROJECT_ID", upper));
            let base_url = get(&format!("{}_BASE_URL", upper));
            if project.is_none() && base_url.is_none() {
                continue;
            }
            let entry = self.environments.entry(env).or_insert_with(|| EnvironmentConfig {
                project_id: String::new(),
                base_url: default_base_url(),
            });
            if let Some(project) = project {
                entry.project_id = project;
            }
            if let Some(base_url) = base_url {
                entry.base_url = base_url;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        if self.keep_count == 0 {
            return Err(DeployError::Config("keep_count must be at least 1".into()));
        }
        if self.version_keep == 0 {
            return Err(DeployError::Config("version_keep must be at least 1".into()));
        }
        if self.retry.deploy_attempts == 0 || self.retry.warmup_attempts == 0 {
            return Err(DeployError::Config("retry attempts must be at least 1".into()));
        }
        if self.tenants.is_empty() {
            return Err(DeployError::Config("at least one tenant is required".into()));
        }
        Ok(())
    }

    /// Binding for `environment`. Missing or empty project ids are errors.
    pub fn binding(&self, environment: Environment) -> Result<EnvironmentBinding, DeployError> {
        match self.environments.get(&environment) {
            Some(env) if !env.project_id.is_empty() => Ok(EnvironmentBinding::new(
                environment,
                env.project_id.clone(),
                env.base_url.clone(),
            )),
            _ => Err(DeployError::Config(format!(
                "no project configured for {} (set [environments.{}] or {}{}_PROJECT_ID)",
                environment,
                environment,
                ENV_PREFIX,
                environment.name().to_ascii_uppercase()
            ))),
        }
    }

    /// Every configured binding, for cross-environment safety checks.
    pub fn bindings(&self) -> Vec<EnvironmentBinding> {
        self.environments
            .keys()
            .filter_map(|env| self.binding(*env).ok())
            .collect()
    }

    pub fn deploy_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.retry.deploy_base_ms),
            Duration::from_millis(self.retry.deploy_cap_ms),
            self.retry.deploy_attempts,
        )
        .with_jitter_max(Duration::from_millis(self.retry.jitter_max_ms))
    }

    pub fn warmup_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.retry.warmup_base_ms),
            Duration::from_millis(self.retry.warmup_cap_ms),
            self.retry.warmup_attempts,
        )
        .with_jitter_max(Duration::from_millis(self.retry.jitter_max_ms))
    }

    pub fn planner(&self) -> Result<EvictionPlanner, DeployError> {
        EvictionPlanner::new(self.keep_count, self.version_keep)
    }

    /// Pipeline settings derived from this configuration.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, DeployError> {
        Ok(OrchestratorConfig {
            workflow: WorkflowConfig {
                retry: self.deploy_policy(),
                planner: self.planner()?,
            },
            source_dir: self.source_dir.clone(),
            manifest_file: self.manifest_file.clone(),
            tenants: self.tenants.clone(),
            root_tenant: self.root_tenant.clone(),
            route: self.readiness_route,
            warmup_policy: self.warmup_policy(),
            poll_timeout: self.timeouts.poll(),
            prune_versions: true,
        })
    }

    /// Explicit credentials path, else `~/.script-deploy/credentials.json`.
    #[cfg(feature = "file-storage")]
    pub fn credentials_path(&self) -> Result<PathBuf, DeployError> {
        if let Some(path) = &self.credentials {
            return Ok(path.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| DeployError::Config("could not determine home directory".into()))?;
        Ok(home.join(".script-deploy").join("credentials.json"))
    }
}

/// `$XDG_CONFIG_HOME/script-deploy/config.toml`, falling back to the
/// platform config directory.
#[cfg(feature = "file-storage")]
pub fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)?;
    Some(base.join("script-deploy").join("config.toml"))
}

#[cfg(not(feature = "file-storage"))]
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(|base| PathBuf::from(base).join("script-deploy").join("config.toml"))
}
