//! Script Deploy Library
//!
//! Deployment lifecycle and warmup verification for script-hosting platforms
//! with hard deployment and version caps.
//!
//! # Design
//!
//! The library drives a deployment through a fixed pipeline: safety check,
//! pool inspection, eviction, push, deploy, and warmup. It does not couple to
//! any particular transport. You implement the [`PlatformBackend`] and
//! [`ReadinessProbe`] traits (or use the bundled [`PlatformClient`] and
//! [`HttpReadinessProbe`]), and the [`Orchestrator`] handles retries,
//! capacity recovery and readiness polling.
//!
//! # Usage
//!
//! ```ignore
//! use script_deploy::{
//!     ClientSettings, CredentialsFile, DeployConfig, Environment, HttpReadinessProbe,
//!     Orchestrator, PlatformClient, StdoutAuditLog,
//! };
//! use std::sync::Arc;
//!
//! let config = DeployConfig::load(None)?;
//! let target = config.binding(Environment::Staging)?;
//! let client = PlatformClient::from_credentials_file(
//!     ClientSettings::from_config(&config),
//!     CredentialsFile::new(config.credentials_path()?),
//! )
//! .await?;
//!
//! let mut orchestrator = Orchestrator::new(
//!     client,
//!     Arc::new(HttpReadinessProbe::new()?),
//!     target,
//!     config.bindings(),
//!     config.orchestrator_config()?,
//!     Box::new(StdoutAuditLog),
//! );
//!
//! let summary = orchestrator.run("release 42").await;
//! if !summary.success {
//!     eprintln!("{}", serde_json::to_string_pretty(&summary)?);
//! }
//! ```

pub mod auth;
pub mod backend;
pub mod backoff;
pub mod config;
pub mod error;
pub mod eviction;
pub mod orchestrator;
pub mod pool;
pub mod safety;
pub mod source;
pub mod state;
pub mod store;
pub mod types;
pub mod warmup;
pub mod workflow;

#[cfg(feature = "default-client")]
pub mod client;

#[cfg(feature = "legacy-cli")]
pub mod legacy;

#[cfg(test)]
mod testing;

// Re-export the main types at crate root for convenience
pub use auth::{CredentialsFile, TokenSet};
pub use backend::{PlatformBackend, ProbeResponse, ReadinessProbe};
pub use backoff::BackoffPolicy;
pub use config::DeployConfig;
pub use error::DeployError;
pub use eviction::{EvictionPlan, EvictionPlanner};
pub use orchestrator::{
    ErrorReport, Orchestrator, OrchestratorConfig, PipelineStep, PlanReport, RunSummary,
};
pub use pool::VersionPool;
pub use source::SourceBundle;
pub use state::{CreationState, Step};
pub use store::{AuditAction, AuditLog, AuditRecord, MemoryAuditLog, StdoutAuditLog};
#[cfg(feature = "file-storage")]
pub use store::FileAuditLog;
pub use types::*;
pub use warmup::{ReadinessRoute, WarmupReport, WarmupRequest, WarmupVerifier};
pub use workflow::{DeploymentWorkflow, StepResult, WorkflowConfig};

#[cfg(feature = "default-client")]
pub use client::{ClientSettings, HttpReadinessProbe, PlatformClient};
#[cfg(feature = "legacy-cli")]
pub use legacy::LegacyCliBackend;
