//! Error types for the deployment lifecycle.
//!
//! No `anyhow` leakage. Explicit, typed errors, one variant per failure
//! class the workflow has to treat differently.

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("deployment capacity reached: {0}")]
    Capacity(String),

    #[error("unexpected platform response: {0}")]
    Protocol(String),

    #[error("transient network failure: {0}")]
    Transient(String),

    #[error("safety violation: {0}")]
    SafetyViolation(String),

    #[error("target not ready: {0}")]
    NotReady(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("platform error: code={code}, message={message}")]
    Platform { code: String, message: String },

    #[error("local validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("invalid workflow state: {0}")]
    InvalidState(String),
}

impl DeployError {
    /// Whether this error might be recoverable by retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DeployError::Transient(_) | DeployError::NotReady(_))
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::Auth(_) => "auth",
            DeployError::Capacity(_) => "capacity",
            DeployError::Protocol(_) => "protocol",
            DeployError::Transient(_) => "transient_network",
            DeployError::SafetyViolation(_) => "safety_violation",
            DeployError::NotReady(_) => "not_ready",
            DeployError::NotFound(_) => "not_found",
            DeployError::Platform { .. } => "platform",
            DeployError::Validation(_) => "validation",
            DeployError::Config(_) => "config",
            DeployError::Storage(_) => "storage",
            DeployError::Cancelled(_) => "cancelled",
            DeployError::InvalidState(_) => "invalid_state",
        }
    }

    /// What the operator should do next when this error is fatal.
    pub fn next_action(&self) -> &'static str {
        match self {
            DeployError::Auth(_) => "re-authenticate and refresh the stored credentials",
            DeployError::Capacity(_) => {
                "deployment cap still exceeded after eviction, manually inspect the pool"
            }
            DeployError::Protocol(_) => {
                "re-list deployments to check whether the operation partially succeeded"
            }
            DeployError::Transient(_) => "check network connectivity and re-run",
            DeployError::SafetyViolation(_) => {
                "check the environment name and the project bound to the active credentials"
            }
            DeployError::NotReady(_) => "inspect the tenant status endpoints and re-run warmup",
            DeployError::NotFound(_) => "verify the configured project id",
            DeployError::Platform { .. } => "inspect the platform error and re-run",
            DeployError::Validation(_) => "fix the local source tree and re-run",
            DeployError::Config(_) => "fix the configuration file or environment overrides",
            DeployError::Storage(_) => "check permissions of the local state directory",
            DeployError::Cancelled(_) => "re-run when ready; completed steps are listed above",
            DeployError::InvalidState(_) => "report this as a bug",
        }
    }
}
