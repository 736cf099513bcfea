//! Moving stock between locations with its cost basis
//!
//! Each source layer draw becomes its own destination layer at the same unit
//! cost, so costs are never blended in transit.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use shared::{validate_quantity, validate_transfer_route, ReconciliationReport, TransferResult};

use crate::error::{AppError, AppResult};
use crate::services::allocation::{self, AllocateRequest};
use crate::services::ledger::{self, OrderRefs, Origin};
use crate::services::reconciliation::{self, ReconciliationPolicy};
use crate::services::references;
use crate::store::{CostingStore, NewCostLayer};

/// Input for a location to location transfer
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransferRequest {
    pub item_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub quantity: Decimal,
    pub from_bin_id: Option<Uuid>,
    pub to_bin_id: Option<Uuid>,
    pub work_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

impl TransferRequest {
    pub fn new(item_id: Uuid, from_location_id: Uuid, to_location_id: Uuid, quantity: Decimal) -> Self {
        Self {
            item_id,
            from_location_id,
            to_location_id,
            quantity,
            from_bin_id: None,
            to_bin_id: None,
            work_order_id: None,
            order_id: None,
            reference: None,
            note: None,
        }
    }
}

/// Move `request.quantity` to the destination at its FIFO cost basis.
///
/// A source shortfall is backordered at the source. Backorders at the
/// destination are reconciled afterwards, except when both ends share a
/// location: those backorders would be drawn from the stock just moved.
pub async fn transfer(
    store: &mut dyn CostingStore,
    request: &TransferRequest,
    policy: ReconciliationPolicy,
) -> AppResult<TransferResult> {
    request.validate()?;
    validate_quantity(request.quantity).map_err(|m| AppError::validation("quantity", m))?;
    validate_transfer_route(
        request.from_location_id,
        request.from_bin_id,
        request.to_location_id,
        request.to_bin_id,
    )
    .map_err(|m| AppError::validation("to_location_id", m))?;

    // Source side is checked by the allocation itself
    references::ensure_stock(store, request.item_id, request.to_location_id, request.to_bin_id)
        .await?;

    let reference = request.reference.clone().unwrap_or_else(|| {
        format!(
            "Transfer {} -> {}",
            request.from_location_id, request.to_location_id
        )
    });
    let note = request
        .note
        .clone()
        .unwrap_or_else(|| format!("Transfer to location {}", request.to_location_id));

    let source = AllocateRequest {
        item_id: request.item_id,
        location_id: request.from_location_id,
        quantity: request.quantity,
        bin_id: request.from_bin_id,
        work_order_id: request.work_order_id,
        order_id: request.order_id,
        order_line_id: None,
        reference: Some(reference.clone()),
        note: Some(note),
        allow_negative: Some(true),
    };
    let allocated = allocation::allocate(store, &source, true).await?;

    let now = Utc::now();
    let refs = OrderRefs {
        work_order_id: request.work_order_id,
        order_id: request.order_id,
        order_line_id: None,
    };
    let origin = Origin {
        location_id: request.from_location_id,
        bin_id: request.from_bin_id,
    };

    let mut destination_layers = Vec::with_capacity(allocated.allocations.len());
    let mut to_movements = Vec::with_capacity(allocated.allocations.len());

    for draw in &allocated.allocations {
        let layer = store
            .insert_layer(NewCostLayer {
                id: Uuid::new_v4(),
                item_id: request.item_id,
                location_id: request.to_location_id,
                bin_id: request.to_bin_id,
                quantity: draw.quantity,
                unit_cost: draw.unit_cost,
                received_at: now,
                source_order_id: None,
                vendor_id: None,
                manufacturer: None,
                manufacturer_part_no: None,
                reference: reference.clone(),
            })
            .await?;

        let note = format!(
            "Transfer from location {} @ ${}/unit",
            request.from_location_id,
            draw.unit_cost.normalize()
        );
        let movement = store
            .insert_movement(ledger::receipt(&layer, Some(origin), refs, note, now))
            .await?;

        destination_layers.push(layer);
        to_movements.push(movement);
    }

    let reconciliation = if request.from_location_id == request.to_location_id {
        ReconciliationReport::new(request.item_id, request.to_location_id)
    } else {
        reconciliation::reconcile(store, request.item_id, request.to_location_id, policy).await?
    };

    let quantity_transferred = allocated.drawn_quantity();

    info!(
        item_id = %request.item_id,
        from_location_id = %request.from_location_id,
        to_location_id = %request.to_location_id,
        quantity = %quantity_transferred,
        layers = destination_layers.len(),
        "Transferred inventory"
    );

    Ok(TransferResult {
        item_id: request.item_id,
        from_location_id: request.from_location_id,
        to_location_id: request.to_location_id,
        quantity_transferred,
        total_cost: allocated.total_cost,
        allocations: allocated.allocations,
        from_movements: allocated.movements,
        to_movements,
        destination_layers,
        shortage: allocated.shortage,
        reconciliation,
    })
}
