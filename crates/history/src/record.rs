//! The immutable audit record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use restock_core::{AggregateId, DomainError, DomainResult, TenantId};

/// Kind of entity an audit record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    PurchaseOrder,
    Receipt,
}

/// One append-only audit record.
///
/// Fields are private: a `HistoryEvent` cannot be modified after
/// construction, only read. `quantity_delta` carries the quantity moved by
/// the transition (0 for pure status changes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    event_id: Uuid,
    tenant_id: TenantId,
    entity_type: EntityType,
    entity_id: AggregateId,
    event_type: String,
    quantity_delta: i64,
    reference: Option<String>,
    note: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl HistoryEvent {
    /// Build a record for one state transition.
    ///
    /// The only failure mode is malformed input: a blank `event_type` or a
    /// present-but-blank `reference` is rejected with
    /// [`DomainError::InvalidHistoryEvent`]. Once built the
    /// record is a fact — it is never retried and never rolled back;
    /// corrections are new compensating records.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        tenant_id: TenantId,
        entity_type: EntityType,
        entity_id: AggregateId,
        event_type: impl Into<String>,
        quantity_delta: i64,
        reference: Option<String>,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(DomainError::invalid_history_event(
                "event_type cannot be blank",
            ));
        }
        if reference.as_deref().is_some_and(|r| r.trim().is_empty()) {
            return Err(DomainError::invalid_history_event(
                "reference, when present, cannot be blank",
            ));
        }

        Ok(Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            entity_type,
            entity_id,
            event_type,
            quantity_delta,
            reference,
            note,
            occurred_at,
        })
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn entity_id(&self) -> AggregateId {
        self.entity_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn quantity_delta(&self) -> i64 {
        self.quantity_delta
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
