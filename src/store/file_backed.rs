//! File-backed audit log.
//!
//! Appends one JSON object per line to `audit.jsonl` under
//! `~/.script-deploy/audit/`.

use crate::error::DeployError;
use crate::store::{AuditLog, AuditRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const AUDIT_FILE: &str = "audit.jsonl";

/// File-backed implementation of [`AuditLog`].
pub struct FileAuditLog {
    path: PathBuf,
}

impl FileAuditLog {
    /// Create a log using the default directory (`~/.script-deploy/audit`).
    pub async fn new_default() -> Result<Self, DeployError> {
        let home = dirs::home_dir()
            .ok_or_else(|| DeployError::Storage("could not determine home directory".into()))?;
        Self::new(home.join(".script-deploy").join("audit")).await
    }

    /// Create a log in a custom directory.
    pub async fn new(audit_dir: PathBuf) -> Result<Self, DeployError> {
        tokio::fs::create_dir_all(&audit_dir)
            .await
            .map_err(|e| DeployError::Storage(format!("failed to create audit dir: {}", e)))?;

        Ok(Self {
            path: audit_dir.join(AUDIT_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn append(&mut self, record: &AuditRecord) -> Result<(), DeployError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| DeployError::Storage(format!("failed to serialize audit record: {}", e)))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| DeployError::Storage(format!("failed to open audit log: {}", e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| DeployError::Storage(format!("failed to write audit record: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| DeployError::Storage(format!("failed to flush audit log: {}", e)))?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<AuditRecord>, DeployError> {
        if tokio::fs::metadata(&self.path).await.is_err() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| DeployError::Storage(format!("failed to read audit log: {}", e)))?;

        // A torn last line from an interrupted write is skipped.
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str::<AuditRecord>(line).ok())
            .collect())
    }
}
