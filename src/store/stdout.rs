//! Stdout-based audit fallback.
//!
//! When the `file-storage` feature is disabled, records are written as
//! JSON lines to stdout for external tools and pipelines. Nothing is
//! persisted across runs.

use crate::error::DeployError;
use crate::store::{AuditLog, AuditRecord};
use async_trait::async_trait;

/// Audit sink that prints one JSON object per line.
pub struct StdoutAuditLog;

impl StdoutAuditLog {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StdoutAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLog for StdoutAuditLog {
    async fn append(&mut self, record: &AuditRecord) -> Result<(), DeployError> {
        let json = serde_json::to_string(record)
            .map_err(|e| DeployError::Storage(format!("failed to serialize audit record: {}", e)))?;
        println!("{}", json);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AuditRecord>, DeployError> {
        Ok(Vec::new())
    }
}
