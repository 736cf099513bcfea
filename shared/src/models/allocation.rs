//! Result records for allocation, transfer, receipt and reconciliation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CostLayer, InventoryMovement, PendingAllocation};

/// Quantity drawn from one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConsumption {
    pub layer_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub received_at: DateTime<Utc>,
}

/// Demand that could not be met from layers and became a backorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortage {
    pub quantity: Decimal,
    pub estimated_unit_cost: Decimal,
    pub estimated_total_cost: Decimal,
    pub pending_allocation: PendingAllocation,
    pub estimated_movement: InventoryMovement,
    pub warning: String,
}

/// Outcome of a successful allocation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub item_id: Uuid,
    pub location_id: Uuid,
    /// Always the requested quantity; any part not drawn from layers is in `shortage`
    pub allocated_quantity: Decimal,
    /// Real layer cost plus the estimated cost of any shortfall
    pub total_cost: Decimal,
    pub allocations: Vec<LayerConsumption>,
    /// Every ledger row written, estimated row last
    pub movements: Vec<InventoryMovement>,
    pub shortage: Option<Shortage>,
}

impl AllocationResult {
    pub fn shortage_quantity(&self) -> Decimal {
        self.shortage
            .as_ref()
            .map(|s| s.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Quantity actually drawn from layers
    pub fn drawn_quantity(&self) -> Decimal {
        self.allocations.iter().map(|a| a.quantity).sum()
    }

    /// Cost of the layer draws only
    pub fn drawn_cost(&self) -> Decimal {
        self.allocations.iter().map(|a| a.total_cost).sum()
    }

    pub fn warning(&self) -> Option<&str> {
        self.shortage.as_ref().map(|s| s.warning.as_str())
    }
}

/// Outcome of a receipt, including the backorders it satisfied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptResult {
    pub layer: CostLayer,
    pub movement: InventoryMovement,
    pub reconciliation: ReconciliationReport,
}

/// Outcome of a transfer between locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub item_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    /// Quantity that physically arrived at the destination
    pub quantity_transferred: Decimal,
    /// Source allocation total, including any estimated shortfall
    pub total_cost: Decimal,
    pub allocations: Vec<LayerConsumption>,
    pub from_movements: Vec<InventoryMovement>,
    pub to_movements: Vec<InventoryMovement>,
    pub destination_layers: Vec<CostLayer>,
    pub shortage: Option<Shortage>,
    pub reconciliation: ReconciliationReport,
}

/// Read-only cost preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity_requested: Decimal,
    pub available_quantity: Decimal,
    pub sufficient: bool,
    /// Layer cost plus the shortage estimate
    pub estimated_cost: Decimal,
    pub cost_breakdown: Vec<LayerConsumption>,
    pub shortage: Decimal,
    pub shortage_estimated_cost: Decimal,
}

/// A pending allocation that could not be reconciled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationFailure {
    pub pending_allocation_id: Uuid,
    pub error: String,
}

/// What one reconciliation pass did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub fulfilled: Vec<Uuid>,
    pub partially_fulfilled: Vec<Uuid>,
    /// Open allocations left untouched
    pub waiting: usize,
    pub failures: Vec<ReconciliationFailure>,
}

impl ReconciliationReport {
    pub fn new(item_id: Uuid, location_id: Uuid) -> Self {
        Self {
            item_id,
            location_id,
            fulfilled: Vec::new(),
            partially_fulfilled: Vec::new(),
            waiting: 0,
            failures: Vec::new(),
        }
    }

    /// True when the pass changed nothing
    pub fn is_noop(&self) -> bool {
        self.fulfilled.is_empty() && self.partially_fulfilled.is_empty()
    }
}
