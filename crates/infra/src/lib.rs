//! Infrastructure for the reconciliation core: the append-only event store
//! and the service that serializes mutations per purchase order.
//!
//! Nothing here contains business rules — decisions live in
//! `restock-purchasing`; this crate persists their outcomes and enforces the
//! single-writer-per-order discipline.

pub mod event_store;
pub mod reconciliation;

pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use reconciliation::{ReconcileError, ReconciliationService};

#[cfg(test)]
mod integration_tests;
