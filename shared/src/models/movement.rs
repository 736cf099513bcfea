//! Movement ledger models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable record of one inventory-affecting event
///
/// Positive quantities are receipts, negative quantities are consumption.
/// An estimated row (written against a shortage) is settled in place exactly
/// once when the shortage is reconciled; no other field ever changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub from_location_id: Option<Uuid>,
    pub from_bin_id: Option<Uuid>,
    pub to_location_id: Option<Uuid>,
    pub to_bin_id: Option<Uuid>,
    /// Layer this row drew from or created
    pub layer_id: Option<Uuid>,
    pub work_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub order_line_id: Option<Uuid>,
    pub is_estimated: bool,
    pub actual_cost_variance: Option<Decimal>,
    pub reference: String,
    pub note: String,
    pub moved_at: DateTime<Utc>,
}

/// Direction of a ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Receipt,
    Consumption,
}

impl InventoryMovement {
    pub fn kind(&self) -> MovementKind {
        if self.quantity.is_sign_negative() {
            MovementKind::Consumption
        } else {
            MovementKind::Receipt
        }
    }
}

/// Values written onto an estimated row when its shortage is reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSettlement {
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    /// Actual minus previously estimated total
    pub variance: Decimal,
}
