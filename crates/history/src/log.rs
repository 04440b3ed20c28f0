//! Append-only history log.

use std::collections::HashMap;
use std::sync::RwLock;

use restock_core::{DomainError, DomainResult, TenantId};

use crate::record::HistoryEvent;

/// Append-only, tenant-scoped audit log.
///
/// There is intentionally no update or delete surface: once appended, a
/// record stays. Appends from different tenants (and different orders) may
/// happen concurrently; within one entity the caller is responsible for
/// writing the record in the same atomic scope as the state change it
/// documents.
pub trait HistoryLog: Send + Sync {
    /// Append one record, returning its position in the tenant's log
    /// (1-based, monotonically increasing).
    fn append(&self, record: HistoryEvent) -> DomainResult<u64>;

    /// Snapshot of all records for a tenant, in append order.
    fn records(&self, tenant_id: TenantId) -> DomainResult<Vec<HistoryEvent>>;
}

/// In-memory history log.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryHistoryLog {
    records: RwLock<HashMap<TenantId, Vec<HistoryEvent>>>,
}

impl InMemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryLog for InMemoryHistoryLog {
    fn append(&self, record: HistoryEvent) -> DomainResult<u64> {
        let mut records = self
            .records
            .write()
            .map_err(|_| DomainError::invariant("history log lock poisoned"))?;
        let log = records.entry(record.tenant_id()).or_default();
        log.push(record);
        Ok(log.len() as u64)
    }

    fn records(&self, tenant_id: TenantId) -> DomainResult<Vec<HistoryEvent>> {
        let records = self
            .records
            .read()
            .map_err(|_| DomainError::invariant("history log lock poisoned"))?;
        Ok(records.get(&tenant_id).cloned().unwrap_or_default())
    }
}

impl<L> HistoryLog for std::sync::Arc<L>
where
    L: HistoryLog + ?Sized,
{
    fn append(&self, record: HistoryEvent) -> DomainResult<u64> {
        (**self).append(record)
    }

    fn records(&self, tenant_id: TenantId) -> DomainResult<Vec<HistoryEvent>> {
        (**self).records(tenant_id)
    }
}
