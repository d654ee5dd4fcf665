//! Environment safety check.
//!
//! Refuses to touch a project unless the environment being targeted, the
//! project the credentials are bound to, and the project requested all
//! agree. Runs before any remote mutation.

use crate::error::DeployError;
use crate::types::EnvironmentBinding;
use tracing::error;

/// Verify that `target` may be deployed with credentials bound to
/// `bound_project_id`. `known` holds every configured binding so a
/// cross-environment mix-up can be named in the error.
pub fn verify_binding(
    target: &EnvironmentBinding,
    requested_project_id: &str,
    bound_project_id: &str,
    known: &[EnvironmentBinding],
) -> Result<(), DeployError> {
    if requested_project_id != target.project_id {
        let reason = format!(
            "{} deployment requested for project {} but {} is bound to {}",
            target.environment, requested_project_id, target.environment, target.project_id
        );
        error!(event = "safety.violation", %reason);
        return Err(DeployError::SafetyViolation(reason));
    }

    if bound_project_id == target.project_id {
        return Ok(());
    }

    let reason = match known
        .iter()
        .find(|b| b.environment != target.environment && b.project_id == bound_project_id)
    {
        Some(other) => format!(
            "refusing to deploy {} with credentials bound to the {} project {}",
            target.environment, other.environment, bound_project_id
        ),
        None => format!(
            "credentials are bound to project {} but {} expects {}",
            bound_project_id, target.environment, target.project_id
        ),
    };
    error!(event = "safety.violation", %reason);
    Err(DeployError::SafetyViolation(reason))
}

/// Deployment URLs must live under the environment's base URL.
pub fn verify_url(target: &EnvironmentBinding, url: &str) -> Result<(), DeployError> {
    let base = target.base_url.trim_end_matches('/');
    let inside = url
        .strip_prefix(base)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'));
    if inside {
        Ok(())
    } else {
        Err(DeployError::SafetyViolation(format!(
            "deployment URL {} is outside the {} base URL {}",
            url, target.environment, base
        )))
    }
}
