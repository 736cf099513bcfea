//! Movement ledger entries
//!
//! Builders for every kind of row the engine appends. Rows are never edited
//! afterwards except for settling an estimate during reconciliation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use shared::fifo::LayerDraw;
use shared::{CostLayer, InventoryMovement, PendingAllocation};

use crate::error::AppResult;
use crate::store::{CostingStore, MovementFilter, NewMovement};

/// Order and work order references carried onto ledger rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderRefs {
    pub work_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub order_line_id: Option<Uuid>,
}

impl From<&PendingAllocation> for OrderRefs {
    fn from(pending: &PendingAllocation) -> Self {
        Self {
            work_order_id: pending.work_order_id,
            order_id: pending.order_id,
            order_line_id: pending.order_line_id,
        }
    }
}

/// Where a receipt row came from, for transfer legs
#[derive(Debug, Clone, Copy)]
pub struct Origin {
    pub location_id: Uuid,
    pub bin_id: Option<Uuid>,
}

fn base(
    item_id: Uuid,
    refs: OrderRefs,
    reference: &str,
    note: String,
    now: DateTime<Utc>,
) -> NewMovement {
    NewMovement {
        id: Uuid::new_v4(),
        item_id,
        quantity: Decimal::ZERO,
        unit_cost: Decimal::ZERO,
        total_cost: Decimal::ZERO,
        from_location_id: None,
        from_bin_id: None,
        to_location_id: None,
        to_bin_id: None,
        layer_id: None,
        work_order_id: refs.work_order_id,
        order_id: refs.order_id,
        order_line_id: refs.order_line_id,
        is_estimated: false,
        reference: reference.to_string(),
        note,
        moved_at: now,
    }
}

/// Negative row for one real layer draw
pub fn consumption(
    item_id: Uuid,
    location_id: Uuid,
    draw: &LayerDraw,
    refs: OrderRefs,
    reference: &str,
    note: String,
    now: DateTime<Utc>,
) -> NewMovement {
    NewMovement {
        quantity: -draw.quantity,
        unit_cost: draw.unit_cost,
        total_cost: draw.total_cost,
        from_location_id: Some(location_id),
        from_bin_id: draw.bin_id,
        layer_id: Some(draw.layer_id),
        ..base(item_id, refs, reference, note, now)
    }
}

/// Positive row for a newly created layer
pub fn receipt(
    layer: &CostLayer,
    origin: Option<Origin>,
    refs: OrderRefs,
    note: String,
    now: DateTime<Utc>,
) -> NewMovement {
    NewMovement {
        quantity: layer.quantity_received,
        unit_cost: layer.unit_cost,
        total_cost: layer.quantity_received * layer.unit_cost,
        from_location_id: origin.map(|o| o.location_id),
        from_bin_id: origin.and_then(|o| o.bin_id),
        to_location_id: Some(layer.location_id),
        to_bin_id: layer.bin_id,
        layer_id: Some(layer.id),
        ..base(layer.item_id, refs, &layer.reference, note, now)
    }
}

/// Negative estimated row for a shortfall awaiting stock
#[allow(clippy::too_many_arguments)]
pub fn estimated_shortage(
    item_id: Uuid,
    location_id: Uuid,
    bin_id: Option<Uuid>,
    shortfall: Decimal,
    unit_cost: Decimal,
    refs: OrderRefs,
    reference: &str,
    pending_id: Uuid,
    now: DateTime<Utc>,
) -> NewMovement {
    NewMovement {
        quantity: -shortfall,
        unit_cost,
        total_cost: shortfall * unit_cost,
        from_location_id: Some(location_id),
        from_bin_id: bin_id,
        is_estimated: true,
        ..base(
            item_id,
            refs,
            reference,
            format!("ESTIMATED - Pending fulfillment: {}", pending_id),
            now,
        )
    }
}

/// Positive estimated row netting out what is left of a canceled backorder
pub fn estimate_reversal(pending: &PendingAllocation, now: DateTime<Utc>) -> NewMovement {
    let outstanding = pending.outstanding();
    NewMovement {
        quantity: outstanding,
        unit_cost: pending.estimated_unit_cost,
        total_cost: outstanding * pending.estimated_unit_cost,
        to_location_id: Some(pending.location_id),
        is_estimated: true,
        ..base(
            pending.item_id,
            OrderRefs::from(pending),
            &format!("Cancel pending: {}", pending.id),
            format!(
                "Reversal of estimate for canceled pending allocation {}",
                pending.id
            ),
            now,
        )
    }
}

/// Ledger rows matching the filter, newest first
pub async fn list_movements(
    store: &mut dyn CostingStore,
    filter: &MovementFilter,
) -> AppResult<Vec<InventoryMovement>> {
    store.list_movements(filter).await
}
