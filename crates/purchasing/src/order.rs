use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use restock_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use restock_history::Event;
use restock_pricing::{calculate_totals, valuate, OrderTotals, TaxRate};

use crate::receiving::{LineState, ReceiptLine, ReceivingProgress, MAX_LINE_QUANTITY};

/// Purchase order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

/// Supplier identifier. Supplier CRUD lives outside this core.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

/// Product identifier. Product CRUD lives outside this core.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

/// Identifier of one delivery (receiving event).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub AggregateId);

macro_rules! impl_id_newtype {
    ($t:ty) => {
        impl $t {
            pub fn new(id: AggregateId) -> Self {
                Self(id)
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

impl_id_newtype!(PurchaseOrderId);
impl_id_newtype!(SupplierId);
impl_id_newtype!(ProductId);
impl_id_newtype!(ReceiptId);

/// Purchase order status lifecycle.
///
/// Draft -> Ordered -> PartiallyReceived -> Received -> Completed, with
/// Canceled terminal from any pre-Completed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Ordered,
    PartiallyReceived,
    Received,
    Completed,
    Canceled,
}

/// Purchase order line item.
///
/// Locked once the order is placed; `subtotal` is derived at add time via
/// exact decimal valuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Aggregate root: PurchaseOrder with per-line receiving reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    supplier_id: Option<SupplierId>,
    status: PurchaseOrderStatus,
    lines: Vec<PurchaseOrderLine>,
    progress: HashMap<u32, ReceivingProgress>,
    totals: Option<OrderTotals>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            supplier_id: None,
            status: PurchaseOrderStatus::Draft,
            lines: Vec::new(),
            progress: HashMap::new(),
            totals: None,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    /// Monetary breakdown fixed at place time.
    pub fn totals(&self) -> Option<OrderTotals> {
        self.totals
    }

    /// Cumulative receiving counters for a line.
    pub fn progress(&self, line_no: u32) -> ReceivingProgress {
        self.progress.get(&line_no).copied().unwrap_or_default()
    }

    /// Reconciliation state of a line, or None for an unknown line number.
    pub fn line_state(&self, line_no: u32) -> Option<LineState> {
        let line = self.lines.iter().find(|l| l.line_no == line_no)?;
        Some(self.progress(line_no).state(line.quantity_ordered))
    }

    /// Value of everything received in good condition so far.
    ///
    /// Damaged and missing quantities are never billed.
    pub fn total_received_value(&self) -> Decimal {
        self.lines
            .iter()
            .map(|line| Decimal::from(self.progress(line.line_no).good()) * line.unit_price)
            .sum()
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub unit_price: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PlaceOrder (Draft -> Ordered; locks lines, fixes totals).
///
/// Tax rate and shipping are injected here, not read from any constant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub tax_rate: TaxRate,
    pub shipping: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordReceipt (one delivery, possibly spanning several lines).
///
/// Atomic: either every line passes the conservation check and the whole
/// receipt is recorded, or nothing is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_id: ReceiptId,
    pub lines: Vec<ReceiptLine>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder (terminal from any pre-Completed state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteOrder (Received -> Completed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    PlaceOrder(PlaceOrder),
    RecordReceipt(RecordReceipt),
    CancelOrder(CancelOrder),
    CompleteOrder(CompleteOrder),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLineAdded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line: PurchaseOrderLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderPlaced.
///
/// Carries the totals computed from the injected tax rate and shipping, so
/// rehydration never re-derives money from configuration that may have
/// changed since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderPlaced {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub tax_rate: TaxRate,
    pub shipping: Decimal,
    pub totals: OrderTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptRecorded.
///
/// One per delivery. Immutable once created; corrections happen via a new
/// compensating receipt, not in-place edits. `new_status` is the order
/// status recomputed from the post-receipt line states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecorded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_id: ReceiptId,
    pub lines: Vec<ReceiptLine>,
    pub new_status: PurchaseOrderStatus,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ReceiptRecorded {
    /// Total quantity moved by this delivery across all lines.
    pub fn quantity_delta(&self) -> i64 {
        self.lines.iter().map(ReceiptLine::total).sum()
    }
}

/// Event: PurchaseOrderCanceled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCanceled {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCompleted {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderLineAdded(PurchaseOrderLineAdded),
    PurchaseOrderPlaced(PurchaseOrderPlaced),
    ReceiptRecorded(ReceiptRecorded),
    PurchaseOrderCanceled(PurchaseOrderCanceled),
    PurchaseOrderCompleted(PurchaseOrderCompleted),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderLineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::PurchaseOrderPlaced(_) => "purchasing.order.placed",
            PurchaseOrderEvent::ReceiptRecorded(_) => "purchasing.order.receipt_recorded",
            PurchaseOrderEvent::PurchaseOrderCanceled(_) => "purchasing.order.canceled",
            PurchaseOrderEvent::PurchaseOrderCompleted(_) => "purchasing.order.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderPlaced(e) => e.occurred_at,
            PurchaseOrderEvent::ReceiptRecorded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderCanceled(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderCompleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.supplier_id = Some(e.supplier_id);
                self.status = PurchaseOrderStatus::Draft;
                self.lines.clear();
                self.progress.clear();
                self.totals = None;
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => {
                self.progress
                    .insert(e.line.line_no, ReceivingProgress::default());
                self.lines.push(e.line.clone());
            }
            PurchaseOrderEvent::PurchaseOrderPlaced(e) => {
                self.totals = Some(e.totals);
                self.status = PurchaseOrderStatus::Ordered;
            }
            PurchaseOrderEvent::ReceiptRecorded(e) => {
                for rl in &e.lines {
                    self.progress.entry(rl.line_no).or_default().absorb(rl);
                }
                self.status = e.new_status;
            }
            PurchaseOrderEvent::PurchaseOrderCanceled(_) => {
                self.status = PurchaseOrderStatus::Canceled;
            }
            PurchaseOrderEvent::PurchaseOrderCompleted(_) => {
                self.status = PurchaseOrderStatus::Completed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            PurchaseOrderCommand::RecordReceipt(cmd) => self.handle_record_receipt(cmd),
            PurchaseOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            PurchaseOrderCommand::CompleteOrder(cmd) => self.handle_complete(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::concurrent_modification(
                "purchase order already exists",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                supplier_id: cmd.supplier_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(
                "lines are locked once the purchase order is placed",
            ));
        }

        if cmd.quantity_ordered > MAX_LINE_QUANTITY {
            return Err(DomainError::invalid_quantity(format!(
                "ordered quantity {} exceeds the maximum of {}",
                cmd.quantity_ordered, MAX_LINE_QUANTITY
            )));
        }

        // Valuation rejects negative quantity/price with the typed errors.
        let subtotal = valuate(cmd.quantity_ordered, cmd.unit_price)?;

        let line_no = (self.lines.len() as u32) + 1;
        Ok(vec![PurchaseOrderEvent::PurchaseOrderLineAdded(
            PurchaseOrderLineAdded {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line: PurchaseOrderLine {
                    line_no,
                    product_id: cmd.product_id,
                    quantity_ordered: cmd.quantity_ordered,
                    unit_price: cmd.unit_price,
                    subtotal,
                },
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(
                "only draft purchase orders can be placed",
            ));
        }

        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot place purchase order without lines",
            ));
        }

        let totals = calculate_totals(
            self.lines
                .iter()
                .map(|l| (l.quantity_ordered, l.unit_price)),
            cmd.tax_rate,
            cmd.shipping,
        )?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderPlaced(
            PurchaseOrderPlaced {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                tax_rate: cmd.tax_rate,
                shipping: cmd.shipping,
                totals,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_record_receipt(
        &self,
        cmd: &RecordReceipt,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        match self.status {
            PurchaseOrderStatus::Ordered
            | PurchaseOrderStatus::PartiallyReceived
            | PurchaseOrderStatus::Received => {}
            _ => {
                return Err(DomainError::invariant(
                    "receipts can only be recorded against a placed purchase order",
                ));
            }
        }

        if cmd.lines.is_empty() {
            return Err(DomainError::validation("receipt must have lines"));
        }

        // All-or-nothing: validate every line before accepting any of them.
        let mut seen = HashSet::new();
        let mut next = self.progress.clone();
        for rl in &cmd.lines {
            rl.validate()?;

            if !seen.insert(rl.line_no) {
                return Err(DomainError::validation(format!(
                    "receipt references line {} more than once",
                    rl.line_no
                )));
            }

            let order_line = self
                .lines
                .iter()
                .find(|l| l.line_no == rl.line_no)
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "receipt references unknown line {}",
                        rl.line_no
                    ))
                })?;

            let progress = next.entry(rl.line_no).or_default();
            if progress.received() + rl.total() > order_line.quantity_ordered {
                return Err(DomainError::over_receipt(format!(
                    "line {}: {} already received + {} in this receipt exceeds {} ordered",
                    rl.line_no,
                    progress.received(),
                    rl.total(),
                    order_line.quantity_ordered
                )));
            }
            progress.absorb(rl);
        }

        let all_reconciled = self.lines.iter().all(|line| {
            next.get(&line.line_no)
                .copied()
                .unwrap_or_default()
                .state(line.quantity_ordered)
                == LineState::FullyReconciled
        });
        let new_status = if all_reconciled {
            PurchaseOrderStatus::Received
        } else {
            PurchaseOrderStatus::PartiallyReceived
        };

        Ok(vec![PurchaseOrderEvent::ReceiptRecorded(ReceiptRecorded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            receipt_id: cmd.receipt_id,
            lines: cmd.lines.clone(),
            new_status,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        match self.status {
            PurchaseOrderStatus::Completed => {
                return Err(DomainError::invariant(
                    "cannot cancel a completed purchase order",
                ));
            }
            PurchaseOrderStatus::Canceled => {
                return Err(DomainError::invariant("purchase order is already canceled"));
            }
            _ => {}
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCanceled(
            PurchaseOrderCanceled {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_complete(
        &self,
        cmd: &CompleteOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Received {
            return Err(DomainError::invariant(
                "only fully received purchase orders can be completed",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCompleted(
            PurchaseOrderCompleted {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
