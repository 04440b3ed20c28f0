//! Pricing arithmetic for purchase orders.
//!
//! Pure functions only: no IO, no shared state. All money is
//! `rust_decimal::Decimal` — exact until the single rounding step on tax, so
//! totals are reproducible across platforms and independent of summation
//! order.

pub mod totals;
pub mod valuation;

pub use totals::{calculate_totals, OrderTotals, TaxRate};
pub use valuation::valuate;
