//! Per-line receiving state: progress counters and the reconciliation
//! state machine.

use serde::{Deserialize, Serialize};

use restock_core::{DomainError, DomainResult};

/// Upper bound on any single quantity (ordered or received per condition).
///
/// Keeps every downstream sum — line totals, cumulative progress, the
/// conservation check — comfortably inside `i64` without checked arithmetic
/// at each call site.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000_000;

/// One line of a delivery, referencing a purchase order line by number.
///
/// Immutable once recorded; corrections are new compensating receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_no: u32,
    pub good: i64,
    pub damaged: i64,
    pub missing: i64,
}

impl ReceiptLine {
    /// Quantity this receipt line moves, regardless of condition.
    ///
    /// Cannot overflow for lines that passed [`ReceiptLine::validate`],
    /// which bounds each component by [`MAX_LINE_QUANTITY`].
    pub fn total(&self) -> i64 {
        self.good + self.damaged + self.missing
    }

    /// Validate standalone constraints (conservation against the order is
    /// checked by the aggregate, which knows the ordered quantities).
    pub fn validate(&self) -> DomainResult<()> {
        for quantity in [self.good, self.damaged, self.missing] {
            if quantity < 0 {
                return Err(DomainError::invalid_quantity(format!(
                    "receipt quantities must be non-negative (line {})",
                    self.line_no
                )));
            }
            if quantity > MAX_LINE_QUANTITY {
                return Err(DomainError::invalid_quantity(format!(
                    "receipt quantity {} exceeds the maximum of {} (line {})",
                    quantity, MAX_LINE_QUANTITY, self.line_no
                )));
            }
        }
        if self.total() == 0 {
            return Err(DomainError::validation(format!(
                "receipt line {} must receive at least one unit",
                self.line_no
            )));
        }
        Ok(())
    }
}

/// Reconciliation state of a single purchase order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    /// No receipt recorded yet (and some quantity is outstanding).
    Unfulfilled,
    /// Some, but not all, of the ordered quantity accounted for.
    PartiallyReceived,
    /// `good + damaged + missing` equals the ordered quantity.
    FullyReconciled,
}

/// Cumulative received quantities for one purchase order line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingProgress {
    good: i64,
    damaged: i64,
    missing: i64,
}

impl ReceivingProgress {
    pub fn good(&self) -> i64 {
        self.good
    }

    pub fn damaged(&self) -> i64 {
        self.damaged
    }

    pub fn missing(&self) -> i64 {
        self.missing
    }

    /// Total quantity accounted for so far.
    pub fn received(&self) -> i64 {
        self.good + self.damaged + self.missing
    }

    /// State of the line given its ordered quantity.
    ///
    /// A line ordered at zero quantity has nothing outstanding and is
    /// `FullyReconciled` from the start.
    pub fn state(&self, quantity_ordered: i64) -> LineState {
        if self.received() >= quantity_ordered {
            LineState::FullyReconciled
        } else if self.received() == 0 {
            LineState::Unfulfilled
        } else {
            LineState::PartiallyReceived
        }
    }

    /// Quantity that can still be received against this line.
    pub fn outstanding(&self, quantity_ordered: i64) -> i64 {
        quantity_ordered - self.received()
    }

    /// Fold one receipt line into the cumulative counters.
    ///
    /// The aggregate has already enforced conservation before this is called.
    pub(crate) fn absorb(&mut self, line: &ReceiptLine) {
        self.good += line.good;
        self.damaged += line.damaged;
        self.missing += line.missing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_progress_is_unfulfilled_when_quantity_outstanding() {
        let progress = ReceivingProgress::default();
        assert_eq!(progress.state(10), LineState::Unfulfilled);
        assert_eq!(progress.outstanding(10), 10);
    }

    #[test]
    fn zero_ordered_line_is_fully_reconciled_from_the_start() {
        let progress = ReceivingProgress::default();
        assert_eq!(progress.state(0), LineState::FullyReconciled);
        assert_eq!(progress.outstanding(0), 0);
    }

    #[test]
    fn partial_then_full_reconciliation() {
        let mut progress = ReceivingProgress::default();
        progress.absorb(&ReceiptLine {
            line_no: 1,
            good: 6,
            damaged: 1,
            missing: 0,
        });
        assert_eq!(progress.received(), 7);
        assert_eq!(progress.state(10), LineState::PartiallyReceived);

        progress.absorb(&ReceiptLine {
            line_no: 1,
            good: 2,
            damaged: 0,
            missing: 1,
        });
        assert_eq!(progress.received(), 10);
        assert_eq!(progress.state(10), LineState::FullyReconciled);
        assert_eq!(progress.good(), 8);
    }

    #[test]
    fn receipt_line_rejects_negative_quantity() {
        let line = ReceiptLine {
            line_no: 2,
            good: -1,
            damaged: 0,
            missing: 0,
        };
        assert!(matches!(
            line.validate().unwrap_err(),
            DomainError::InvalidQuantity(_)
        ));
    }

    #[test]
    fn receipt_line_rejects_quantities_beyond_bound() {
        // An extreme component must be rejected outright, not summed: the
        // raw total would wrap around i64.
        let line = ReceiptLine {
            line_no: 1,
            good: i64::MAX,
            damaged: 1,
            missing: 0,
        };
        assert!(matches!(
            line.validate().unwrap_err(),
            DomainError::InvalidQuantity(_)
        ));

        let line = ReceiptLine {
            line_no: 1,
            good: 0,
            damaged: MAX_LINE_QUANTITY + 1,
            missing: 0,
        };
        assert!(matches!(
            line.validate().unwrap_err(),
            DomainError::InvalidQuantity(_)
        ));
    }

    #[test]
    fn receipt_line_accepts_quantity_at_the_bound() {
        let line = ReceiptLine {
            line_no: 1,
            good: MAX_LINE_QUANTITY,
            damaged: MAX_LINE_QUANTITY,
            missing: MAX_LINE_QUANTITY,
        };
        assert!(line.validate().is_ok());
        assert_eq!(line.total(), 3 * MAX_LINE_QUANTITY);
    }

    #[test]
    fn receipt_line_rejects_all_zero_quantities() {
        let line = ReceiptLine {
            line_no: 2,
            good: 0,
            damaged: 0,
            missing: 0,
        };
        assert!(matches!(
            line.validate().unwrap_err(),
            DomainError::Validation(_)
        ));
    }
}
