//! Line item valuation.

use rust_decimal::Decimal;

use restock_core::{DomainError, DomainResult};

/// Compute a line subtotal from quantity and unit price.
///
/// Exact decimal multiplication; no rounding happens here. Rejects negative
/// inputs with [`DomainError::InvalidQuantity`] / [`DomainError::InvalidPrice`],
/// and a product outside the decimal range with [`DomainError::InvalidPrice`].
pub fn valuate(quantity: i64, unit_price: Decimal) -> DomainResult<Decimal> {
    if quantity < 0 {
        return Err(DomainError::invalid_quantity(format!(
            "quantity must be non-negative, got {quantity}"
        )));
    }
    if unit_price.is_sign_negative() {
        return Err(DomainError::invalid_price(format!(
            "unit price must be non-negative, got {unit_price}"
        )));
    }
    Decimal::from(quantity).checked_mul(unit_price).ok_or_else(|| {
        DomainError::invalid_price(format!(
            "line value {quantity} x {unit_price} overflows the decimal range"
        ))
    })
}
