//! Validation utilities for quantities and costs
//!
//! Values are rejected rather than rounded when they carry more fractional
//! digits than the ledger stores.

use rust_decimal::Decimal;

use crate::types::{COST_SCALE, MAX_INTEGER_DIGITS, QUANTITY_SCALE};

/// Exclusive upper bound for quantities and unit costs; keeps every
/// quantity times cost product inside `Decimal` range
fn upper_bound() -> Decimal {
    Decimal::from(10_i64.pow(MAX_INTEGER_DIGITS))
}

// ============================================================================
// Quantity Validations
// ============================================================================

/// Validate a demand or receipt quantity (strictly positive)
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err("Quantity supports at most 4 decimal places");
    }
    if quantity >= upper_bound() {
        return Err("Quantity must be below 100000000000000");
    }
    Ok(())
}

// ============================================================================
// Cost Validations
// ============================================================================

/// Validate a unit cost (zero allowed, negative rejected)
pub fn validate_unit_cost(unit_cost: Decimal) -> Result<(), &'static str> {
    if unit_cost < Decimal::ZERO {
        return Err("Unit cost cannot be negative");
    }
    if unit_cost.normalize().scale() > COST_SCALE {
        return Err("Unit cost supports at most 6 decimal places");
    }
    if unit_cost >= upper_bound() {
        return Err("Unit cost must be below 100000000000000");
    }
    Ok(())
}

// ============================================================================
// Transfer Validations
// ============================================================================

/// A transfer must change location or bin.
///
/// Within one location the source must be a single bin, otherwise the draw
/// could include the destination bin's own layers.
pub fn validate_transfer_route(
    from_location: uuid::Uuid,
    from_bin: Option<uuid::Uuid>,
    to_location: uuid::Uuid,
    to_bin: Option<uuid::Uuid>,
) -> Result<(), &'static str> {
    if from_location != to_location {
        return Ok(());
    }
    if from_bin.is_none() {
        return Err("A transfer within one location needs a source bin");
    }
    if from_bin == to_bin {
        return Err("Source and destination must differ");
    }
    Ok(())
}
