//! Bearer tokens and their on-disk form.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

/// Refresh this long before the recorded expiry.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Access token plus what is needed to renew it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub expires_at: u64,
    /// Project the credentials are bound to.
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl TokenSet {
    pub fn new(access_token: impl Into<String>, expires_at: u64, project_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at,
            project_id: project_id.into(),
            client_id: None,
            client_secret: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Check if the token expires within `margin` of `now` (unix seconds).
    pub fn needs_refresh_at(&self, now: u64, margin: Duration) -> bool {
        self.expires_at <= now.saturating_add(margin.as_secs())
    }

    /// Check against the wall clock.
    pub fn needs_refresh(&self, margin: Duration) -> bool {
        self.needs_refresh_at(current_unix_time(), margin)
    }

    /// Apply the result of a refresh-token exchange.
    pub fn apply_refresh(&mut self, access_token: String, expires_in: u64, refresh_token: Option<String>) {
        self.access_token = access_token;
        self.expires_at = current_unix_time().saturating_add(expires_in);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
    }
}

/// JSON file holding a [`TokenSet`].
#[derive(Debug, Clone)]
pub struct CredentialsFile {
    path: PathBuf,
}

impl CredentialsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<TokenSet, DeployError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DeployError::Auth(format!(
                "failed to read credentials {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| DeployError::Auth(format!("failed to parse credentials: {}", e)))
    }

    /// Persist a refreshed token set; owner-only permissions on unix.
    pub async fn save(&self, tokens: &TokenSet) -> Result<(), DeployError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DeployError::Storage(format!("failed to create credentials dir: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(tokens)
            .map_err(|e| DeployError::Storage(format!("failed to serialize credentials: {}", e)))?;
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Owner-only from the moment the file exists.
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options
            .open(&self.path)
            .await
            .map_err(|e| DeployError::Storage(format!("failed to open credentials: {}", e)))?;

        // mode() only applies on creation; tighten a file that already existed
        // before any token lands in it.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| DeployError::Storage(format!("failed to restrict credentials: {}", e)))?;
        }

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| DeployError::Storage(format!("failed to write credentials: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| DeployError::Storage(format!("failed to write credentials: {}", e)))?;
        Ok(())
    }
}

pub(crate) fn current_unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
