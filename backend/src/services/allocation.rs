//! FIFO allocation engine
//!
//! Consumes the oldest open layers first. When the layers cannot cover the
//! demand and negative inventory is allowed, the shortfall is booked at an
//! estimated cost and parked as a pending allocation until stock arrives.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use shared::{fifo, validate_quantity, AllocationResult, CostEstimate, Shortage, StockKey};

use crate::error::{AppError, AppResult};
use crate::services::ledger::{self, OrderRefs};
use crate::services::references;
use crate::store::{CostingStore, NewPendingAllocation};

/// Input for drawing stock
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AllocateRequest {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: Decimal,
    pub bin_id: Option<Uuid>,
    pub work_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub order_line_id: Option<Uuid>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
    /// Backorder the shortfall instead of failing; falls back to the
    /// configured default when absent
    pub allow_negative: Option<bool>,
}

impl AllocateRequest {
    pub fn new(item_id: Uuid, location_id: Uuid, quantity: Decimal) -> Self {
        Self {
            item_id,
            location_id,
            quantity,
            bin_id: None,
            work_order_id: None,
            order_id: None,
            order_line_id: None,
            reference: None,
            note: None,
            allow_negative: None,
        }
    }

    pub fn refs(&self) -> OrderRefs {
        OrderRefs {
            work_order_id: self.work_order_id,
            order_id: self.order_id,
            order_line_id: self.order_line_id,
        }
    }
}

/// Input for a read-only cost preview
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EstimateCostRequest {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: Decimal,
    pub bin_id: Option<Uuid>,
}

/// Estimated unit cost for stock that is not on hand
pub async fn shortage_unit_cost(
    store: &mut dyn CostingStore,
    item_id: Uuid,
    location_id: Uuid,
) -> AppResult<Decimal> {
    let replacement = store.replacement_cost(item_id).await?;
    let latest = store.latest_unit_cost(item_id, location_id).await?;
    Ok(fifo::shortage_unit_cost(replacement, latest))
}

/// Draw `request.quantity` in FIFO order.
///
/// With `allow_negative` off, a shortfall fails with `InsufficientInventory`
/// before anything is written.
pub async fn allocate(
    store: &mut dyn CostingStore,
    request: &AllocateRequest,
    allow_negative: bool,
) -> AppResult<AllocationResult> {
    request.validate()?;
    validate_quantity(request.quantity).map_err(|m| AppError::validation("quantity", m))?;

    let refs = request.refs();
    references::ensure_stock(store, request.item_id, request.location_id, request.bin_id).await?;
    references::ensure_order_refs(store, refs).await?;

    let key = StockKey::new(request.item_id, request.location_id, request.bin_id);
    let layers = store.lock_open_layers(&key).await?;
    let plan = fifo::plan_consumption(&layers, request.quantity);

    if !plan.is_sufficient() && !allow_negative {
        debug!(
            item_id = %request.item_id,
            location_id = %request.location_id,
            requested = %request.quantity,
            available = %plan.available,
            "Allocation refused, negative inventory not allowed"
        );
        return Err(AppError::InsufficientInventory {
            item_id: request.item_id,
            location_id: request.location_id,
            requested: request.quantity,
            available: plan.available,
        });
    }

    let now = Utc::now();
    let reference = request.reference.clone().unwrap_or_default();
    let mut movements = Vec::with_capacity(plan.draws.len() + 1);

    for draw in &plan.draws {
        store.decrement_layer(draw.layer_id, draw.quantity).await?;

        let note = request
            .note
            .clone()
            .unwrap_or_else(|| format!("FIFO allocation from layer {}", draw.layer_id));
        let movement = store
            .insert_movement(ledger::consumption(
                request.item_id,
                request.location_id,
                draw,
                refs,
                &reference,
                note,
                now,
            ))
            .await?;
        movements.push(movement);
    }

    let mut total_cost = plan.drawn_cost();
    let mut shortage = None;

    if !plan.is_sufficient() {
        let shortfall = plan.shortfall;
        let unit_cost =
            shortage_unit_cost(store, request.item_id, request.location_id).await?;
        let estimated_total = shortfall * unit_cost;
        let pending_id = Uuid::new_v4();

        let estimated_movement = store
            .insert_movement(ledger::estimated_shortage(
                request.item_id,
                request.location_id,
                request.bin_id,
                shortfall,
                unit_cost,
                refs,
                &reference,
                pending_id,
                now,
            ))
            .await?;

        let pending_allocation = store
            .insert_pending(NewPendingAllocation {
                id: pending_id,
                item_id: request.item_id,
                location_id: request.location_id,
                work_order_id: refs.work_order_id,
                order_id: refs.order_id,
                order_line_id: refs.order_line_id,
                quantity: shortfall,
                estimated_unit_cost: unit_cost,
                estimated_total_cost: estimated_total,
                estimated_movement_id: Some(estimated_movement.id),
                notes: request
                    .note
                    .clone()
                    .unwrap_or_else(|| format!("Shortage from allocation: {}", reference)),
                created_at: now,
            })
            .await?;

        info!(
            item_id = %request.item_id,
            location_id = %request.location_id,
            pending_allocation_id = %pending_id,
            available = %plan.available,
            shortage = %shortfall,
            estimated_unit_cost = %unit_cost,
            "Allocation short, pending allocation created"
        );

        total_cost += estimated_total;
        movements.push(estimated_movement.clone());
        shortage = Some(Shortage {
            quantity: shortfall,
            estimated_unit_cost: unit_cost,
            estimated_total_cost: estimated_total,
            pending_allocation,
            estimated_movement,
            warning: fifo::shortage_warning(plan.available, shortfall),
        });
    }

    info!(
        item_id = %request.item_id,
        location_id = %request.location_id,
        quantity = %request.quantity,
        layers = plan.draws.len(),
        total_cost = %total_cost,
        "Allocated inventory"
    );

    Ok(AllocationResult {
        item_id: request.item_id,
        location_id: request.location_id,
        allocated_quantity: request.quantity,
        total_cost,
        allocations: plan.consumptions(),
        movements,
        shortage,
    })
}

/// Price a demand against current layers without locking or writing
pub async fn estimate_cost(
    store: &mut dyn CostingStore,
    request: &EstimateCostRequest,
) -> AppResult<CostEstimate> {
    request.validate()?;
    validate_quantity(request.quantity).map_err(|m| AppError::validation("quantity", m))?;
    references::ensure_stock(store, request.item_id, request.location_id, request.bin_id).await?;

    let key = StockKey::new(request.item_id, request.location_id, request.bin_id);
    let layers = store.open_layers(&key).await?;

    let available = fifo::available_quantity(&layers);
    let unit_cost = if available < request.quantity {
        shortage_unit_cost(store, request.item_id, request.location_id).await?
    } else {
        Decimal::ZERO
    };

    Ok(fifo::preview_cost(
        request.item_id,
        request.location_id,
        &layers,
        request.quantity,
        unit_cost,
    ))
}
