//! HTTP handlers for inventory costing endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use shared::{
    AllocationResult, CostEstimate, CostLayer, InventoryMovement, InventoryValuation,
    LayerBreakdownEntry, LayerConsumption, PendingAllocation, ReceiptResult,
    ReconciliationReport, StockKey, TransferResult,
};

use crate::error::AppResult;
use crate::services::{
    AllocateRequest, CanceledAllocation, EstimateCostRequest, InventoryService,
    PgInventoryService, ReceiveRequest, TransferRequest,
};
use crate::store::{MovementFilter, PendingFilter, PgBackend, PgItemCostIndex};
use crate::AppState;

fn service(state: &AppState) -> PgInventoryService {
    InventoryService::new(
        PgBackend::new(state.db.clone(), state.config.costing.lock_timeout_ms),
        PgItemCostIndex::new(state.db.clone()),
        &state.config.costing,
    )
}

// ============================================================================
// Request / response types
// ============================================================================

/// Optional bin filter on read endpoints
#[derive(Debug, Default, Deserialize)]
pub struct BinQuery {
    pub bin_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelRequest {
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AllocateResponse {
    pub success: bool,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub allocated_quantity: Decimal,
    pub total_cost: Decimal,
    pub allocations: Vec<LayerConsumption>,
    pub movements: Vec<InventoryMovement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_allocation: Option<PendingAllocation>,
    pub shortage: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<AllocationResult> for AllocateResponse {
    fn from(result: AllocationResult) -> Self {
        let shortage_quantity = result.shortage_quantity();
        let (pending_allocation, warning) = match result.shortage {
            Some(s) => (Some(s.pending_allocation), Some(s.warning)),
            None => (None, None),
        };

        Self {
            success: true,
            item_id: result.item_id,
            location_id: result.location_id,
            allocated_quantity: result.allocated_quantity,
            total_cost: result.total_cost,
            allocations: result.allocations,
            movements: result.movements,
            pending_allocation,
            shortage: shortage_quantity,
            warning,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub success: bool,
    pub item_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    pub quantity_transferred: Decimal,
    pub total_cost: Decimal,
    pub allocations: Vec<LayerConsumption>,
    pub from_movements: Vec<InventoryMovement>,
    pub to_movements: Vec<InventoryMovement>,
    pub destination_layers: Vec<CostLayer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_allocation: Option<PendingAllocation>,
    pub shortage: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub reconciliation: ReconciliationReport,
}

impl From<TransferResult> for TransferResponse {
    fn from(result: TransferResult) -> Self {
        let (pending_allocation, shortage, warning) = match result.shortage {
            Some(s) => (Some(s.pending_allocation), s.quantity, Some(s.warning)),
            None => (None, Decimal::ZERO, None),
        };

        Self {
            success: true,
            item_id: result.item_id,
            from_location_id: result.from_location_id,
            to_location_id: result.to_location_id,
            quantity_transferred: result.quantity_transferred,
            total_cost: result.total_cost,
            allocations: result.allocations,
            from_movements: result.from_movements,
            to_movements: result.to_movements,
            destination_layers: result.destination_layers,
            pending_allocation,
            shortage,
            warning,
            reconciliation: result.reconciliation,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AvailableResponse {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub bin_id: Option<Uuid>,
    pub available_quantity: Decimal,
}

#[derive(Debug, Serialize)]
pub struct LayersResponse {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub bin_id: Option<Uuid>,
    pub count: usize,
    pub layers: Vec<LayerBreakdownEntry>,
}

#[derive(Debug, Serialize)]
pub struct PendingListResponse {
    pub count: usize,
    pub pending_allocations: Vec<PendingAllocation>,
}

#[derive(Debug, Serialize)]
pub struct MovementListResponse {
    pub count: usize,
    pub movements: Vec<InventoryMovement>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Receive stock into a new cost layer
pub async fn receive_inventory(
    State(state): State<AppState>,
    Json(input): Json<ReceiveRequest>,
) -> AppResult<(StatusCode, Json<ReceiptResult>)> {
    let receipt = service(&state).receive(input).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Allocate stock in FIFO order
pub async fn allocate_inventory(
    State(state): State<AppState>,
    Json(input): Json<AllocateRequest>,
) -> AppResult<Json<AllocateResponse>> {
    let result = service(&state).allocate(input).await?;
    Ok(Json(result.into()))
}

/// Transfer stock between locations
pub async fn transfer_inventory(
    State(state): State<AppState>,
    Json(input): Json<TransferRequest>,
) -> AppResult<Json<TransferResponse>> {
    let result = service(&state).transfer(input).await?;
    Ok(Json(result.into()))
}

/// Preview the FIFO cost of a demand
pub async fn estimate_cost(
    State(state): State<AppState>,
    Json(input): Json<EstimateCostRequest>,
) -> AppResult<Json<CostEstimate>> {
    let estimate = service(&state).estimate_cost(input).await?;
    Ok(Json(estimate))
}

/// Get on-hand quantity for an item at a location
pub async fn get_available_quantity(
    State(state): State<AppState>,
    Path((item_id, location_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<BinQuery>,
) -> AppResult<Json<AvailableResponse>> {
    let key = StockKey::new(item_id, location_id, query.bin_id);
    let available_quantity = service(&state).available_quantity(key).await?;
    Ok(Json(AvailableResponse {
        item_id,
        location_id,
        bin_id: query.bin_id,
        available_quantity,
    }))
}

/// Get open cost layers in consumption order
pub async fn get_layer_breakdown(
    State(state): State<AppState>,
    Path((item_id, location_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<BinQuery>,
) -> AppResult<Json<LayersResponse>> {
    let key = StockKey::new(item_id, location_id, query.bin_id);
    let layers = service(&state).layer_breakdown(key).await?;
    Ok(Json(LayersResponse {
        item_id,
        location_id,
        bin_id: query.bin_id,
        count: layers.len(),
        layers,
    }))
}

/// Get FIFO valuation of on-hand stock
pub async fn get_valuation(
    State(state): State<AppState>,
    Path((item_id, location_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<BinQuery>,
) -> AppResult<Json<InventoryValuation>> {
    let key = StockKey::new(item_id, location_id, query.bin_id);
    let valuation = service(&state).valuation(key).await?;
    Ok(Json(valuation))
}

/// List pending allocations
pub async fn list_pending_allocations(
    State(state): State<AppState>,
    Query(filter): Query<PendingFilter>,
) -> AppResult<Json<PendingListResponse>> {
    let pending_allocations = service(&state).list_pending(&filter).await?;
    Ok(Json(PendingListResponse {
        count: pending_allocations.len(),
        pending_allocations,
    }))
}

/// Cancel an open pending allocation
pub async fn cancel_pending_allocation(
    State(state): State<AppState>,
    Path(pending_id): Path<Uuid>,
    Json(input): Json<CancelRequest>,
) -> AppResult<Json<CanceledAllocation>> {
    input.validate()?;
    let canceled = service(&state)
        .cancel_pending(pending_id, input.reason.as_deref())
        .await?;
    Ok(Json(canceled))
}

/// Reconcile pending allocations for an item at a location
pub async fn reconcile_pending(
    State(state): State<AppState>,
    Path((item_id, location_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ReconciliationReport>> {
    let report = service(&state).reconcile(item_id, location_id).await?;
    Ok(Json(report))
}

/// List ledger rows
pub async fn list_movements(
    State(state): State<AppState>,
    Query(filter): Query<MovementFilter>,
) -> AppResult<Json<MovementListResponse>> {
    let movements = service(&state).list_movements(&filter).await?;
    Ok(Json(MovementListResponse {
        count: movements.len(),
        movements,
    }))
}
