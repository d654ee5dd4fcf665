//! [`AuditLog`] trait definition.

use crate::error::DeployError;
use crate::store::AuditRecord;
use async_trait::async_trait;

/// Append-only sink for audit records.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one record. Never rewrites earlier records.
    async fn append(&mut self, record: &AuditRecord) -> Result<(), DeployError>;

    /// All records in append order. Sinks without persistence return empty.
    async fn list(&self) -> Result<Vec<AuditRecord>, DeployError>;
}
