//! Audit trail persistence.
//!
//! This module contains:
//! - [`AuditRecord`]: one successful mutation (timestamp + affected ids)
//! - [`AuditLog`] trait: append-only sink for records
//! - [`FileAuditLog`]: JSON lines under `~/.script-deploy/audit/`
//! - [`StdoutAuditLog`] and [`MemoryAuditLog`]: for pipelines and tests
//!
//! Records are written after the fact and never read back to make a
//! deployment decision.

mod memory;
mod record;
mod store;
pub mod stdout;

#[cfg(feature = "file-storage")]
pub mod file_backed;

pub use memory::MemoryAuditLog;
pub use record::{AuditAction, AuditRecord};
pub use store::AuditLog;
pub use stdout::StdoutAuditLog;

#[cfg(feature = "file-storage")]
pub use file_backed::FileAuditLog;
