//! Purchasing domain module (Purchase Orders with receiving reconciliation,
//! event-sourced).
//!
//! This crate contains business rules for purchase orders and the receiving
//! reconciler, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage). Conservation invariant: per line, cumulative
//! `good + damaged + missing` never exceeds the ordered quantity.

pub mod order;
pub mod receiving;

pub use order::{
    AddLine, CancelOrder, CompleteOrder, CreatePurchaseOrder, PlaceOrder, ProductId,
    PurchaseOrder, PurchaseOrderCanceled, PurchaseOrderCommand, PurchaseOrderCompleted,
    PurchaseOrderCreated, PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderLine,
    PurchaseOrderLineAdded, PurchaseOrderPlaced, PurchaseOrderStatus, ReceiptId,
    ReceiptRecorded, RecordReceipt, SupplierId,
};
pub use receiving::{LineState, ReceiptLine, ReceivingProgress, MAX_LINE_QUANTITY};
