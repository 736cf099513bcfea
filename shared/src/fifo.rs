//! Pure FIFO planning over cost layer snapshots
//!
//! Nothing in here performs I/O. The backend locks the layers, asks for a
//! plan and then applies it inside one transaction; the WASM preview runs the
//! same plan over a snapshot supplied by the UI.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CostEstimate, CostLayer, CostSettlement, LayerConsumption};
use crate::types::COST_SCALE;

/// One planned decrement of a layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDraw {
    pub layer_id: Uuid,
    pub bin_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub received_at: DateTime<Utc>,
    pub remaining_after: Decimal,
}

impl From<&LayerDraw> for LayerConsumption {
    fn from(draw: &LayerDraw) -> Self {
        Self {
            layer_id: draw.layer_id,
            quantity: draw.quantity,
            unit_cost: draw.unit_cost,
            total_cost: draw.total_cost,
            received_at: draw.received_at,
        }
    }
}

/// Draws that satisfy as much of a demand as the layers allow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionPlan {
    pub requested: Decimal,
    pub available: Decimal,
    pub draws: Vec<LayerDraw>,
    /// Part of the demand the layers cannot cover
    pub shortfall: Decimal,
}

impl ConsumptionPlan {
    pub fn is_sufficient(&self) -> bool {
        self.shortfall.is_zero()
    }

    pub fn drawn_quantity(&self) -> Decimal {
        self.draws.iter().map(|d| d.quantity).sum()
    }

    pub fn drawn_cost(&self) -> Decimal {
        self.draws.iter().map(|d| d.total_cost).sum()
    }

    pub fn consumptions(&self) -> Vec<LayerConsumption> {
        self.draws.iter().map(LayerConsumption::from).collect()
    }
}

/// Open layers in consumption order: oldest `received_at` first, then
/// creation order.
pub fn fifo_order(layers: &[CostLayer]) -> Vec<&CostLayer> {
    let mut open: Vec<&CostLayer> = layers.iter().filter(|l| l.is_open()).collect();
    open.sort_by_key(|l| l.fifo_key());
    open
}

/// Sum of remaining quantity over open layers
pub fn available_quantity(layers: &[CostLayer]) -> Decimal {
    layers
        .iter()
        .filter(|l| l.is_open())
        .map(|l| l.quantity_remaining)
        .sum()
}

/// Plan the draws for `demand` without mutating anything.
///
/// Every open layer is taken in FIFO order; a layer is only touched after all
/// older layers are exhausted, and no draw exceeds the layer's remaining
/// quantity.
pub fn plan_consumption(layers: &[CostLayer], demand: Decimal) -> ConsumptionPlan {
    let ordered = fifo_order(layers);
    let available: Decimal = ordered.iter().map(|l| l.quantity_remaining).sum();

    let mut left = demand.max(Decimal::ZERO);
    let mut draws = Vec::new();

    for layer in ordered {
        if left <= Decimal::ZERO {
            break;
        }
        let quantity = layer.quantity_remaining.min(left);
        draws.push(LayerDraw {
            layer_id: layer.id,
            bin_id: layer.bin_id,
            quantity,
            unit_cost: layer.unit_cost,
            total_cost: quantity * layer.unit_cost,
            received_at: layer.received_at,
            remaining_after: layer.quantity_remaining - quantity,
        });
        left -= quantity;
    }

    ConsumptionPlan {
        requested: demand,
        available,
        draws,
        shortfall: left,
    }
}

/// Unit cost used to price a shortfall.
///
/// The item's replacement cost wins when it is set and non-zero, then the
/// most recently received layer's cost, then zero.
pub fn shortage_unit_cost(
    replacement_cost: Option<Decimal>,
    latest_layer_cost: Option<Decimal>,
) -> Decimal {
    replacement_cost
        .filter(|c| !c.is_zero())
        .or(latest_layer_cost)
        .unwrap_or(Decimal::ZERO)
}

/// Build a cost preview for `demand` over a layer snapshot
pub fn preview_cost(
    item_id: Uuid,
    location_id: Uuid,
    layers: &[CostLayer],
    demand: Decimal,
    shortage_unit_cost: Decimal,
) -> CostEstimate {
    let plan = plan_consumption(layers, demand);
    let shortage_estimated_cost = plan.shortfall * shortage_unit_cost;

    CostEstimate {
        item_id,
        location_id,
        quantity_requested: demand,
        available_quantity: plan.available,
        sufficient: plan.is_sufficient(),
        estimated_cost: plan.drawn_cost() + shortage_estimated_cost,
        cost_breakdown: plan.consumptions(),
        shortage: plan.shortfall,
        shortage_estimated_cost,
    }
}

/// Actual cost figures for an estimated ledger row
pub fn settle_estimate(
    estimated_total: Decimal,
    actual_total: Decimal,
    quantity: Decimal,
) -> CostSettlement {
    let unit_cost = if quantity.is_zero() {
        Decimal::ZERO
    } else {
        (actual_total / quantity.abs()).round_dp(COST_SCALE)
    };

    CostSettlement {
        unit_cost,
        total_cost: actual_total,
        variance: actual_total - estimated_total,
    }
}

/// Warning returned with a backorder
pub fn shortage_warning(available: Decimal, shortage: Decimal) -> String {
    format!(
        "Insufficient inventory. Allocated {}, pending {} units.",
        available.normalize(),
        shortage.normalize()
    )
}
