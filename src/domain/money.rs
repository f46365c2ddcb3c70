//! Money-related type aliases.
//!
//! All prices and quantities are `rust_decimal::Decimal` to avoid
//! floating-point drift in profit accounting.

use rust_decimal::Decimal;

/// A price in quote currency.
pub type Price = Decimal;

/// An order or trade quantity in base currency.
pub type Quantity = Decimal;
