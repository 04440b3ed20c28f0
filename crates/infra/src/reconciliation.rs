//! Command execution pipeline for purchase orders.
//!
//! The `ReconciliationService` orchestrates the full lifecycle of a mutation:
//! load the order's event stream, rehydrate state, run the pure decision
//! logic, append the resulting events, and write the matching audit records.
//!
//! Concurrency discipline: all mutations to one purchase order are
//! serialized through a per-order mutex, so two concurrent receipts can
//! never both pass the conservation check against stale cumulative
//! quantities. Orders are independent — no cross-order locking. The event
//! store additionally enforces `ExpectedVersion`, so a writer that bypasses
//! the service still surfaces as a concurrent modification instead of
//! corrupting the stream.
//!
//! History records are written inside the same lock scope as the state
//! change they document, directly after the append succeeds, so per order
//! the audit trail is ordered consistently with the stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use restock_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion, TenantId,
};
use restock_history::{EntityType, Event, HistoryEvent, HistoryLog};
use restock_pricing::{OrderTotals, TaxRate};
use restock_purchasing::{
    AddLine, CancelOrder, CompleteOrder, CreatePurchaseOrder, PlaceOrder, ProductId,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId,
    PurchaseOrderStatus, ReceiptId, ReceiptLine, RecordReceipt, SupplierId,
};

use crate::event_store::{EventStore, EventStoreError, UncommittedEvent};

const AGGREGATE_TYPE: &str = "purchasing.order";

/// Reconciliation pipeline error.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Deterministic domain failure (validation, invariant, over-receipt,
    /// concurrent modification). Recoverable at the caller.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Event store failure other than optimistic concurrency.
    #[error("event store: {0}")]
    Store(EventStoreError),

    /// A historical payload no longer deserializes into the aggregate's
    /// event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),
}

impl From<EventStoreError> for ReconcileError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => {
                ReconcileError::Domain(DomainError::concurrent_modification(msg))
            }
            other => ReconcileError::Store(other),
        }
    }
}

/// Serializes mutations per purchase order and keeps the audit trail in
/// step with the event stream.
pub struct ReconciliationService<S, H> {
    store: S,
    history: H,
    order_locks: Mutex<HashMap<(TenantId, AggregateId), Arc<Mutex<()>>>>,
}

impl<S, H> ReconciliationService<S, H>
where
    S: EventStore,
    H: HistoryLog,
{
    pub fn new(store: S, history: H) -> Self {
        Self {
            store,
            history,
            order_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    /// Current state of an order, rehydrated from its stream.
    pub fn order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> Result<PurchaseOrder, ReconcileError> {
        let order = self.rehydrate(tenant_id, order_id)?;
        if order.version() == 0 {
            return Err(ReconcileError::Domain(DomainError::not_found()));
        }
        Ok(order)
    }

    pub fn create_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        supplier_id: SupplierId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        self.execute(
            tenant_id,
            order_id,
            PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id,
                order_id,
                supplier_id,
                occurred_at,
            }),
        )?;
        Ok(())
    }

    /// Add a draft line; returns the assigned line number.
    pub fn add_line(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        product_id: ProductId,
        quantity_ordered: i64,
        unit_price: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Result<u32, ReconcileError> {
        let events = self.execute(
            tenant_id,
            order_id,
            PurchaseOrderCommand::AddLine(AddLine {
                tenant_id,
                order_id,
                product_id,
                quantity_ordered,
                unit_price,
                occurred_at,
            }),
        )?;
        match events.as_slice() {
            [PurchaseOrderEvent::PurchaseOrderLineAdded(e)] => Ok(e.line.line_no),
            _ => Err(ReconcileError::Domain(DomainError::invariant(
                "AddLine produced an unexpected event shape",
            ))),
        }
    }

    /// Place the order; returns the totals fixed at place time.
    pub fn place_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        tax_rate: TaxRate,
        shipping: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Result<OrderTotals, ReconcileError> {
        let events = self.execute(
            tenant_id,
            order_id,
            PurchaseOrderCommand::PlaceOrder(PlaceOrder {
                tenant_id,
                order_id,
                tax_rate,
                shipping,
                occurred_at,
            }),
        )?;
        match events.as_slice() {
            [PurchaseOrderEvent::PurchaseOrderPlaced(e)] => Ok(e.totals),
            _ => Err(ReconcileError::Domain(DomainError::invariant(
                "PlaceOrder produced an unexpected event shape",
            ))),
        }
    }

    /// Record one delivery; returns the order status after reconciliation.
    pub fn record_receipt(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        receipt_id: ReceiptId,
        lines: Vec<ReceiptLine>,
        note: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<PurchaseOrderStatus, ReconcileError> {
        let events = self.execute(
            tenant_id,
            order_id,
            PurchaseOrderCommand::RecordReceipt(RecordReceipt {
                tenant_id,
                order_id,
                receipt_id,
                lines,
                note,
                occurred_at,
            }),
        )?;
        match events.as_slice() {
            [PurchaseOrderEvent::ReceiptRecorded(e)] => Ok(e.new_status),
            _ => Err(ReconcileError::Domain(DomainError::invariant(
                "RecordReceipt produced an unexpected event shape",
            ))),
        }
    }

    pub fn cancel_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        self.execute(
            tenant_id,
            order_id,
            PurchaseOrderCommand::CancelOrder(CancelOrder {
                tenant_id,
                order_id,
                reason,
                occurred_at,
            }),
        )?;
        Ok(())
    }

    pub fn complete_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        self.execute(
            tenant_id,
            order_id,
            PurchaseOrderCommand::CompleteOrder(CompleteOrder {
                tenant_id,
                order_id,
                occurred_at,
            }),
        )?;
        Ok(())
    }

    /// Load -> decide -> append -> record history, all under the per-order
    /// lock. On any failure nothing is mutated: the decision is pure, the
    /// append is atomic, and history is only written after a successful
    /// append.
    fn execute(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
    ) -> Result<Vec<PurchaseOrderEvent>, ReconcileError> {
        let lock = self.order_lock(tenant_id, order_id.0)?;
        let _guard = lock
            .lock()
            .map_err(|_| DomainError::invariant("order lock poisoned"))?;

        let order = self.rehydrate(tenant_id, order_id)?;
        let events = order.handle(&command)?;

        let mut uncommitted = Vec::with_capacity(events.len());
        for event in &events {
            uncommitted.push(UncommittedEvent::from_typed(
                tenant_id,
                order_id.0,
                AGGREGATE_TYPE,
                Uuid::now_v7(),
                event,
            )?);
        }
        self.store
            .append(uncommitted, ExpectedVersion::Exact(order.version()))?;

        for event in &events {
            self.history.append(history_record(tenant_id, order_id, event)?)?;
            tracing::info!(
                tenant = %tenant_id,
                order = %order_id,
                event = event.event_type(),
                "purchase order event committed"
            );
        }

        Ok(events)
    }

    fn rehydrate(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
    ) -> Result<PurchaseOrder, ReconcileError> {
        let stream = self.store.load_stream(tenant_id, order_id.0)?;
        let mut order = PurchaseOrder::empty(order_id);
        for stored in &stream {
            let event: PurchaseOrderEvent = serde_json::from_value(stored.payload.clone())
                .map_err(|e| ReconcileError::Deserialize(e.to_string()))?;
            order.apply(&event);
        }
        Ok(order)
    }

    fn order_lock(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Arc<Mutex<()>>, DomainError> {
        let mut locks = self
            .order_locks
            .lock()
            .map_err(|_| DomainError::invariant("order lock registry poisoned"))?;
        // Evict locks no writer currently holds, keeping the registry
        // bounded by the number of in-flight mutations.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(Arc::clone(
            locks.entry((tenant_id, aggregate_id)).or_default(),
        ))
    }

    #[cfg(test)]
    pub(crate) fn lock_registry_len(&self) -> usize {
        self.order_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

/// Map one committed domain event to its audit record.
///
/// Receipts carry the moved quantity and reference the delivery; everything
/// else is a pure status transition with a zero delta.
fn history_record(
    tenant_id: TenantId,
    order_id: PurchaseOrderId,
    event: &PurchaseOrderEvent,
) -> Result<HistoryEvent, DomainError> {
    let (quantity_delta, reference, note) = match event {
        PurchaseOrderEvent::ReceiptRecorded(e) => (
            e.quantity_delta(),
            Some(e.receipt_id.to_string()),
            e.note.clone(),
        ),
        PurchaseOrderEvent::PurchaseOrderLineAdded(e) => (e.line.quantity_ordered, None, None),
        PurchaseOrderEvent::PurchaseOrderCanceled(e) => (0, None, e.reason.clone()),
        _ => (0, None, None),
    };

    HistoryEvent::record(
        tenant_id,
        EntityType::PurchaseOrder,
        order_id.0,
        event.event_type(),
        quantity_delta,
        reference,
        note,
        event.occurred_at(),
    )
}
