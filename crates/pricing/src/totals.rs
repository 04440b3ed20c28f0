//! Order-level totals: subtotal, tax, total.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use restock_core::{DomainError, DomainResult};

use crate::valuation::valuate;

/// Tax rate as a fraction in `[0, 1]`.
///
/// Injected configuration — there is deliberately no default rate baked into
/// the calculator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(Decimal);

impl TaxRate {
    pub fn new(rate: Decimal) -> DomainResult<Self> {
        if rate.is_sign_negative() || rate > Decimal::ONE {
            return Err(DomainError::validation(format!(
                "tax rate must be within [0, 1], got {rate}"
            )));
        }
        Ok(Self(rate))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

/// Computed monetary breakdown of a purchase order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

/// Aggregate line subtotals into `subtotal`/`tax_amount`/`total_amount`.
///
/// - `subtotal` is the exact sum of each line's valuation; decimal addition
///   is associative, so reordering lines cannot change the result.
/// - `tax_amount = subtotal * rate`, rounded to 2 minor units, half-up.
/// - `total_amount = subtotal + tax_amount + shipping`.
///
/// Pure and idempotent: identical inputs yield bit-identical output. The
/// caller persists the result.
pub fn calculate_totals<I>(lines: I, tax_rate: TaxRate, shipping: Decimal) -> DomainResult<OrderTotals>
where
    I: IntoIterator<Item = (i64, Decimal)>,
{
    if shipping.is_sign_negative() {
        return Err(DomainError::invalid_price(format!(
            "shipping must be non-negative, got {shipping}"
        )));
    }

    let mut subtotal = Decimal::ZERO;
    for (quantity, unit_price) in lines {
        subtotal = subtotal
            .checked_add(valuate(quantity, unit_price)?)
            .ok_or_else(|| {
                DomainError::validation("order subtotal overflows the decimal range")
            })?;
    }

    let tax_amount = subtotal
        .checked_mul(tax_rate.as_decimal())
        .ok_or_else(|| DomainError::validation("tax amount overflows the decimal range"))?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let total_amount = subtotal
        .checked_add(tax_amount)
        .and_then(|sum| sum.checked_add(shipping))
        .ok_or_else(|| DomainError::validation("order total overflows the decimal range"))?;

    Ok(OrderTotals {
        subtotal,
        tax_amount,
        total_amount,
    })
}
