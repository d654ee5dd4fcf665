//! Legacy adapter over the platform's command-line tool.
//!
//! Text scraping is fragile: this backend exists for hosts where only the
//! CLI is authenticated. The typed client is the primary contract; nothing
//! else in the crate parses tool output.

use crate::backend::PlatformBackend;
use crate::error::DeployError;
use crate::source::SourceBundle;
use crate::types::{DeploymentSlot, PushReceipt, VersionRecord};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

fn deploy_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^-\s+(\S+)\s+@(\d+)").expect("static regex"))
}

fn deployment_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^-\s+(\S+)\s+@(HEAD|\d+)(?:\s+-\s+(.*?))?\s*$").expect("static regex")
    })
}

fn version_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(\d+)\s+-\s+(.*?)\s*$").expect("static regex"))
}

fn created_version() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Created version (\d+)").expect("static regex"))
}

/// Deployment id and version from `deploy` output, if present.
pub fn parse_deploy_output(output: &str) -> Option<(String, u64)> {
    let caps = deploy_line().captures(output)?;
    let version = caps.get(2)?.as_str().parse().ok()?;
    Some((caps.get(1)?.as_str().to_string(), version))
}

/// Version number from `version` output.
pub fn parse_created_version(output: &str) -> Option<u64> {
    created_version()
        .captures(output)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Rows of a `deployments` listing.
pub fn parse_deployments(output: &str) -> Vec<DeploymentSlot> {
    deployment_line()
        .captures_iter(output)
        .filter_map(|caps| {
            let id = caps.get(1)?.as_str().to_string();
            let tag = caps.get(2)?.as_str();
            let description = caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default();
            let (version_number, is_head) = if tag == "HEAD" {
                (0, true)
            } else {
                (tag.parse().ok()?, false)
            };
            Some(DeploymentSlot {
                id,
                version_number,
                description,
                created_at: None,
                is_head,
                url: None,
            })
        })
        .collect()
}

/// Rows of a `versions` listing.
pub fn parse_versions(output: &str) -> Vec<VersionRecord> {
    version_line()
        .captures_iter(output)
        .filter_map(|caps| {
            Some(VersionRecord {
                version_number: caps.get(1)?.as_str().parse().ok()?,
                description: caps.get(2)?.as_str().to_string(),
                created_at: None,
            })
        })
        .collect()
}

/// Best-effort mapping of a failed invocation onto the error taxonomy.
pub fn classify_output(exit_code: Option<i32>, output: &str) -> DeployError {
    let lower = output.to_ascii_lowercase();
    let snippet: String = output.trim().chars().take(500).collect();
    if ["not logged in", "invalid_grant", "unauthenticated", "login required"]
        .iter()
        .any(|p| lower.contains(p))
    {
        return DeployError::Auth(snippet);
    }
    if lower.contains("too many deployments") || lower.contains("maximum number of deployments") {
        return DeployError::Capacity(snippet);
    }
    if ["etimedout", "econnreset", "socket hang up", "503", "rate limit"]
        .iter()
        .any(|p| lower.contains(p))
    {
        return DeployError::Transient(snippet);
    }
    DeployError::Platform {
        code: match exit_code {
            Some(code) => format!("CLI_EXIT_{}", code),
            None => "CLI_KILLED".to_string(),
        },
        message: snippet,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFile {
    script_id: String,
}

/// Backend that shells out to the CLI tool inside a project directory.
pub struct LegacyCliBackend {
    program: PathBuf,
    project_dir: PathBuf,
    timeout: Duration,
}

impl LegacyCliBackend {
    pub fn new(program: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            project_dir: project_dir.into(),
            timeout: Duration::from_secs(180),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String, DeployError> {
        debug!(event = "legacy.exec", program = %self.program.display(), ?args);
        let child = Command::new(&self.program)
            .args(args)
            .current_dir(&self.project_dir)
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| DeployError::Transient(format!("{} timed out after {:?}", args.join(" "), self.timeout)))?
            .map_err(|e| DeployError::Config(format!("failed to run {}: {}", self.program.display(), e)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(text)
        } else {
            Err(classify_output(output.status.code(), &text))
        }
    }

    /// The CLI acts on whatever project its directory is bound to.
    async fn check_project(&self, project_id: &str) -> Result<(), DeployError> {
        let bound = self.bound_project_id().await?;
        if bound == project_id {
            Ok(())
        } else {
            Err(DeployError::SafetyViolation(format!(
                "CLI directory is bound to {} but {} was requested",
                bound, project_id
            )))
        }
    }
}

impl PlatformBackend for LegacyCliBackend {
    async fn bound_project_id(&self) -> Result<String, DeployError> {
        let path = self.project_dir.join(".clasp.json");
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DeployError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let project: ProjectFile = serde_json::from_str(&content)
            .map_err(|e| DeployError::Config(format!("invalid {}: {}", path.display(), e)))?;
        Ok(project.script_id)
    }

    async fn ensure_fresh_credentials(&self) -> Result<(), DeployError> {
        Ok(())
    }

    async fn refresh_credentials(&self) -> Result<(), DeployError> {
        // The tool refreshes on its own; a second auth failure surfaces as-is.
        Ok(())
    }

    async fn list_versions(&self, project_id: &str) -> Result<Vec<VersionRecord>, DeployError> {
        self.check_project(project_id).await?;
        Ok(parse_versions(&self.run(&["versions"]).await?))
    }

    async fn list_deployments(&self, project_id: &str) -> Result<Vec<DeploymentSlot>, DeployError> {
        self.check_project(project_id).await?;
        Ok(parse_deployments(&self.run(&["deployments"]).await?))
    }

    async fn push(
        &self,
        project_id: &str,
        bundle: &SourceBundle,
        description: &str,
    ) -> Result<PushReceipt, DeployError> {
        self.check_project(project_id).await?;
        self.run(&["push", "--force"]).await?;
        let output = self.run(&["version", description]).await?;
        let version_number = parse_created_version(&output).ok_or_else(|| {
            DeployError::Protocol(format!("no version number in output: {}", output.trim()))
        })?;
        Ok(PushReceipt {
            version_number,
            content_digest: bundle.digest.clone(),
            file_count: bundle.files.len(),
        })
    }

    async fn create_deployment(
        &self,
        project_id: &str,
        version_number: u64,
        description: &str,
    ) -> Result<Option<DeploymentSlot>, DeployError> {
        self.check_project(project_id).await?;
        let version = version_number.to_string();
        let output = self
            .run(&["deploy", "--versionNumber", &version, "--description", description])
            .await?;
        match parse_deploy_output(&output) {
            Some((id, parsed_version)) => Ok(Some(DeploymentSlot {
                id,
                version_number: parsed_version,
                description: description.to_string(),
                created_at: None,
                is_head: false,
                url: None,
            })),
            None => {
                warn!(event = "legacy.deploy.unparsed", output = %output.trim());
                Ok(None)
            }
        }
    }

    async fn delete_deployment(&self, project_id: &str, deployment_id: &str) -> Result<(), DeployError> {
        self.check_project(project_id).await?;
        self.run(&["undeploy", deployment_id]).await.map(|_| ())
    }

    async fn delete_version(&self, _project_id: &str, version_number: u64) -> Result<(), DeployError> {
        Err(DeployError::Platform {
            code: "UNSUPPORTED".into(),
            message: format!("the CLI cannot delete version {}", version_number),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOYMENTS: &str = "3 Deployments.\n\
- AKfycbHEAD @HEAD \n\
- AKfycb001 @1 - first release\n\
- AKfycb002 @2 - second release\n";

    #[test]
    fn test_output_patterns_compile() {
        assert!(deploy_line().is_match("- AKfyc1 @4"));
        assert!(deployment_line().is_match("- AKfycbHEAD @HEAD"));
        assert!(version_line().is_match("12 - release"));
        assert!(created_version().is_match("Created version 7."));
    }

    #[test]
    fn test_parse_deploy_output() {
        let out = "Created version 12.\n- AKfycbxyz123 @12.\n";
        assert_eq!(parse_deploy_output(out), Some(("AKfycbxyz123".to_string(), 12)));
        assert_eq!(parse_created_version(out), Some(12));
        assert_eq!(parse_deploy_output("Deployed."), None);
    }

    #[test]
    fn test_parse_deployments() {
        let slots = parse_deployments(DEPLOYMENTS);
        assert_eq!(slots.len(), 3);
        assert!(slots[0].is_head);
        assert_eq!(slots[2].id, "AKfycb002");
        assert_eq!(slots[2].version_number, 2);
        assert_eq!(slots[2].description, "second release");
    }

    #[test]
    fn test_parse_versions() {
        let versions = parse_versions("~ 2 Versions ~\n2 - hotfix\n1 - No description\n");
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_number, 2);
        assert_eq!(versions[1].description, "No description");
    }

    #[test]
    fn test_classify_output() {
        assert!(matches!(classify_output(Some(1), "Error: Not logged in."), DeployError::Auth(_)));
        assert!(matches!(
            classify_output(Some(1), "Script has too many deployments"),
            DeployError::Capacity(_)
        ));
        assert!(matches!(classify_output(Some(1), "read ECONNRESET"), DeployError::Transient(_)));
        match classify_output(Some(2), "boom") {
            DeployError::Platform { code, .. } => assert_eq!(code, "CLI_EXIT_2"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_tool_in_project_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".clasp.json"), r#"{"scriptId":"proj-1"}"#).unwrap();
        let tool = dir.path().join("fake-cli");
        std::fs::write(&tool, format!("#!/bin/sh\nprintf '{}'\n", DEPLOYMENTS.replace('\n', "\\n"))).unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = LegacyCliBackend::new(&tool, dir.path());
        let slots = backend.list_deployments("proj-1").await.unwrap();
        assert_eq!(slots.len(), 3);

        let err = backend.list_deployments("other").await.unwrap_err();
        assert!(matches!(err, DeployError::SafetyViolation(_)));
    }
}
