//! End-to-end flows over the in-memory store: lifecycle, reconciliation,
//! audit trail, and the per-order concurrency discipline.

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use restock_core::{AggregateId, DomainError, ExpectedVersion, TenantId};
use restock_history::{HistoryLog, InMemoryHistoryLog};
use restock_pricing::TaxRate;
use restock_purchasing::{
    LineState, ProductId, PurchaseOrderId, PurchaseOrderStatus, ReceiptId, ReceiptLine,
    SupplierId,
};

use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use crate::reconciliation::{ReconcileError, ReconciliationService};

type Service = ReconciliationService<InMemoryEventStore, InMemoryHistoryLog>;

fn service() -> Service {
    restock_observability::init();
    ReconciliationService::new(InMemoryEventStore::new(), InMemoryHistoryLog::new())
}

fn test_time() -> DateTime<Utc> {
    Utc::now()
}

fn order_id() -> PurchaseOrderId {
    PurchaseOrderId::new(AggregateId::new())
}

fn receipt_line(line_no: u32, good: i64, damaged: i64, missing: i64) -> ReceiptLine {
    ReceiptLine {
        line_no,
        good,
        damaged,
        missing,
    }
}

/// Created + placed order with the given (quantity, unit_price) lines.
fn placed<S: EventStore, H: HistoryLog>(
    svc: &ReconciliationService<S, H>,
    tenant: TenantId,
    id: PurchaseOrderId,
    lines: &[(i64, Decimal)],
) {
    svc.create_order(tenant, id, SupplierId::new(AggregateId::new()), test_time())
        .unwrap();
    for &(quantity, unit_price) in lines {
        svc.add_line(
            tenant,
            id,
            ProductId::new(AggregateId::new()),
            quantity,
            unit_price,
            test_time(),
        )
        .unwrap();
    }
    svc.place_order(
        tenant,
        id,
        TaxRate::new(dec!(0.10)).unwrap(),
        dec!(0),
        test_time(),
    )
    .unwrap();
}

#[test]
fn full_lifecycle_with_audit_trail() {
    let svc = service();
    let tenant = TenantId::new();
    let id = order_id();

    svc.create_order(tenant, id, SupplierId::new(AggregateId::new()), test_time())
        .unwrap();
    let line_no = svc
        .add_line(
            tenant,
            id,
            ProductId::new(AggregateId::new()),
            10,
            dec!(5.00),
            test_time(),
        )
        .unwrap();
    assert_eq!(line_no, 1);

    let totals = svc
        .place_order(
            tenant,
            id,
            TaxRate::new(dec!(0.10)).unwrap(),
            dec!(0),
            test_time(),
        )
        .unwrap();
    assert_eq!(totals.subtotal, dec!(50.00));
    assert_eq!(totals.tax_amount, dec!(5.00));
    assert_eq!(totals.total_amount, dec!(55.00));

    let receipt_a = ReceiptId::new(AggregateId::new());
    let status = svc
        .record_receipt(
            tenant,
            id,
            receipt_a,
            vec![receipt_line(1, 6, 1, 0)],
            Some("first delivery".to_string()),
            test_time(),
        )
        .unwrap();
    assert_eq!(status, PurchaseOrderStatus::PartiallyReceived);

    let status = svc
        .record_receipt(
            tenant,
            id,
            ReceiptId::new(AggregateId::new()),
            vec![receipt_line(1, 3, 0, 0)],
            None,
            test_time(),
        )
        .unwrap();
    assert_eq!(status, PurchaseOrderStatus::Received);

    svc.complete_order(tenant, id, test_time()).unwrap();

    let order = svc.order(tenant, id).unwrap();
    assert_eq!(order.status(), PurchaseOrderStatus::Completed);
    assert_eq!(order.line_state(1), Some(LineState::FullyReconciled));
    // 9 good units billed, the damaged one is not.
    assert_eq!(order.total_received_value(), dec!(45.00));

    // One audit record per transition, in order, with the moved quantities.
    let records = svc.history().records(tenant).unwrap();
    let kinds: Vec<&str> = records.iter().map(|r| r.event_type()).collect();
    assert_eq!(
        kinds,
        vec![
            "purchasing.order.created",
            "purchasing.order.line_added",
            "purchasing.order.placed",
            "purchasing.order.receipt_recorded",
            "purchasing.order.receipt_recorded",
            "purchasing.order.completed",
        ]
    );
    assert_eq!(records[3].quantity_delta(), 7);
    assert_eq!(records[3].reference(), Some(receipt_a.to_string().as_str()));
    assert_eq!(records[3].note(), Some("first delivery"));
    assert_eq!(records[4].quantity_delta(), 3);
}

#[test]
fn rejected_receipt_mutates_nothing() {
    let svc = service();
    let tenant = TenantId::new();
    let id = order_id();
    placed(&svc, tenant, id, &[(10, dec!(5.00))]);

    svc.record_receipt(
        tenant,
        id,
        ReceiptId::new(AggregateId::new()),
        vec![receipt_line(1, 6, 1, 0)],
        None,
        test_time(),
    )
    .unwrap();
    let records_before = svc.history().records(tenant).unwrap().len();

    // 7 already received, 4 more would exceed the 10 ordered.
    let err = svc
        .record_receipt(
            tenant,
            id,
            ReceiptId::new(AggregateId::new()),
            vec![receipt_line(1, 4, 0, 0)],
            None,
            test_time(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Domain(DomainError::OverReceipt(_))
    ));

    let order = svc.order(tenant, id).unwrap();
    assert_eq!(order.progress(1).received(), 7);
    assert_eq!(order.status(), PurchaseOrderStatus::PartiallyReceived);
    // No audit record for the rejected receipt.
    assert_eq!(svc.history().records(tenant).unwrap().len(), records_before);
}

#[test]
fn duplicate_create_surfaces_concurrent_modification() {
    let svc = service();
    let tenant = TenantId::new();
    let id = order_id();
    let supplier = SupplierId::new(AggregateId::new());

    svc.create_order(tenant, id, supplier, test_time()).unwrap();
    let err = svc.create_order(tenant, id, supplier, test_time()).unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Domain(DomainError::ConcurrentModification(_))
    ));
}

#[test]
fn compensating_receipt_corrects_a_short_delivery() {
    // Corrections are new receipts, never edits of recorded ones.
    let svc = service();
    let tenant = TenantId::new();
    let id = order_id();
    placed(&svc, tenant, id, &[(10, dec!(2.00))]);

    // Delivery arrives short: 6 good, 4 initially marked missing.
    svc.record_receipt(
        tenant,
        id,
        ReceiptId::new(AggregateId::new()),
        vec![receipt_line(1, 6, 0, 4)],
        None,
        test_time(),
    )
    .unwrap();
    let order = svc.order(tenant, id).unwrap();
    assert_eq!(order.status(), PurchaseOrderStatus::Received);
    assert_eq!(order.total_received_value(), dec!(12.00));

    // The missing cartons cannot be re-received: the line is reconciled and
    // conservation holds.
    let err = svc
        .record_receipt(
            tenant,
            id,
            ReceiptId::new(AggregateId::new()),
            vec![receipt_line(1, 4, 0, 0)],
            None,
            test_time(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Domain(DomainError::OverReceipt(_))
    ));

    // Both deliveries stay on record.
    let receipts = svc
        .history()
        .records(tenant)
        .unwrap()
        .iter()
        .filter(|r| r.event_type() == "purchasing.order.receipt_recorded")
        .count();
    assert_eq!(receipts, 1);
}

#[test]
fn concurrent_receipts_preserve_conservation() {
    let svc = Arc::new(service());
    let tenant = TenantId::new();
    let id = order_id();
    placed(&svc, tenant, id, &[(10, dec!(1.00))]);

    // Eight writers race to deliver 3 units each against 10 ordered. Only
    // three can win; the rest must see the up-to-date cumulative count and
    // be rejected, never truncated.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let svc = Arc::clone(&svc);
        handles.push(thread::spawn(move || {
            svc.record_receipt(
                tenant,
                id,
                ReceiptId::new(AggregateId::new()),
                vec![receipt_line(1, 3, 0, 0)],
                None,
                Utc::now(),
            )
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => accepted += 1,
            Err(ReconcileError::Domain(DomainError::OverReceipt(_))) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(accepted, 3);
    let order = svc.order(tenant, id).unwrap();
    assert_eq!(order.progress(1).received(), 9);
    assert_eq!(order.status(), PurchaseOrderStatus::PartiallyReceived);

    let receipts = svc
        .history()
        .records(tenant)
        .unwrap()
        .iter()
        .filter(|r| r.event_type() == "purchasing.order.receipt_recorded")
        .count();
    assert_eq!(receipts, 3);
}

#[test]
fn lock_registry_does_not_grow_with_finished_orders() {
    let svc = service();
    let tenant = TenantId::new();

    for _ in 0..5 {
        placed(&svc, tenant, order_id(), &[(1, dec!(1.00))]);
    }

    // Every mutation above has finished, so the next acquisition evicts all
    // idle entries and the registry holds only the order being mutated.
    placed(&svc, tenant, order_id(), &[(1, dec!(1.00))]);
    assert_eq!(svc.lock_registry_len(), 1);
}

#[test]
fn out_of_band_writer_surfaces_concurrent_modification() {
    restock_observability::init();
    let store = Arc::new(InMemoryEventStore::new());
    let svc = ReconciliationService::new(Arc::clone(&store), InMemoryHistoryLog::new());
    let tenant = TenantId::new();
    let id = order_id();
    placed(&svc, tenant, id, &[(10, dec!(1.00))]);

    // A writer that read the stream before the order was placed appends
    // against a stale version and loses the optimistic check.
    let stale = UncommittedEvent {
        event_id: uuid::Uuid::now_v7(),
        tenant_id: tenant,
        aggregate_id: id.0,
        aggregate_type: "purchasing.order".to_string(),
        event_type: "purchasing.order.canceled".to_string(),
        event_version: 1,
        occurred_at: Utc::now(),
        payload: serde_json::json!({ "canceled": { "occurred_at": Utc::now() } }),
    };
    let err = store
        .append(vec![stale], ExpectedVersion::Exact(1))
        .unwrap_err();
    let mapped: ReconcileError = err.into();
    assert!(matches!(
        mapped,
        ReconcileError::Domain(DomainError::ConcurrentModification(_))
    ));
}
