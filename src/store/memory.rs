//! In-memory audit sink. Clones share the same records.

use crate::error::DeployError;
use crate::store::{AuditLog, AuditRecord};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&mut self, record: &AuditRecord) -> Result<(), DeployError> {
        self.records
            .lock()
            .map_err(|_| DeployError::Storage("audit log lock poisoned".into()))?
            .push(record.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AuditRecord>, DeployError> {
        Ok(self.records())
    }
}
