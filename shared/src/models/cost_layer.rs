//! Cost layer models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One inventory receipt lot, consumed oldest-first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLayer {
    pub id: Uuid,
    /// Store-assigned creation order, breaks ties between equal `received_at`
    pub sequence: i64,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub bin_id: Option<Uuid>,
    pub quantity_received: Decimal,
    pub quantity_remaining: Decimal,
    pub unit_cost: Decimal,
    pub received_at: DateTime<Utc>,
    pub source_order_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub manufacturer: Option<String>,
    pub manufacturer_part_no: Option<String>,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl CostLayer {
    pub fn is_open(&self) -> bool {
        self.quantity_remaining > Decimal::ZERO
    }

    /// Value of what is still on hand in this layer
    pub fn total_value(&self) -> Decimal {
        self.quantity_remaining * self.unit_cost
    }

    /// Sort key for FIFO consumption
    pub fn fifo_key(&self) -> (DateTime<Utc>, i64) {
        (self.received_at, self.sequence)
    }
}

/// Layer row as shown in breakdowns and cost previews
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerBreakdownEntry {
    pub layer_id: Uuid,
    pub bin_id: Option<Uuid>,
    pub quantity_remaining: Decimal,
    pub unit_cost: Decimal,
    pub total_value: Decimal,
    pub received_at: DateTime<Utc>,
    pub source_order_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub manufacturer: Option<String>,
    pub reference: String,
}

impl From<&CostLayer> for LayerBreakdownEntry {
    fn from(layer: &CostLayer) -> Self {
        Self {
            layer_id: layer.id,
            bin_id: layer.bin_id,
            quantity_remaining: layer.quantity_remaining,
            unit_cost: layer.unit_cost,
            total_value: layer.total_value(),
            received_at: layer.received_at,
            source_order_id: layer.source_order_id,
            vendor_id: layer.vendor_id,
            manufacturer: layer.manufacturer.clone(),
            reference: layer.reference.clone(),
        }
    }
}

/// FIFO valuation of the open layers for an item at a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryValuation {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub bin_id: Option<Uuid>,
    pub quantity_on_hand: Decimal,
    pub total_value: Decimal,
    /// Informational only; costing always uses the individual layers
    pub average_unit_cost: Decimal,
    pub layer_count: usize,
}
