//! Audit trail primitives: the domain `Event` trait, the immutable
//! `HistoryEvent` record, and the append-only `HistoryLog`.
//!
//! History is owned by the system, not by any single entity: records are
//! never mutated or deleted. Corrections happen through compensating
//! records, never in-place edits.

pub mod event;
pub mod log;
pub mod record;

pub use event::Event;
pub use log::{HistoryLog, InMemoryHistoryLog};
pub use record::{EntityType, HistoryEvent};
