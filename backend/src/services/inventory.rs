//! Inventory costing service
//!
//! Wraps every engine operation in one storage transaction. Dropping the
//! transaction on an error path rolls everything back.

use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use shared::{
    AllocationResult, CostEstimate, InventoryMovement, InventoryValuation, LayerBreakdownEntry,
    PendingAllocation, ReceiptResult, ReconciliationReport, StockKey, TransferResult,
};

use crate::config::CostingConfig;
use crate::error::AppResult;
use crate::services::allocation::{self, AllocateRequest, EstimateCostRequest};
use crate::services::layers::{self, ReceiveRequest};
use crate::services::ledger;
use crate::services::reconciliation::{self, CanceledAllocation, ReconciliationPolicy};
use crate::services::transfer::{self, TransferRequest};
use crate::store::{
    CostingBackend, MovementFilter, PendingFilter, PgBackend, PgItemCostIndex,
};

/// Service used by the HTTP handlers
pub type PgInventoryService = InventoryService<PgBackend, PgItemCostIndex>;

/// FIFO costing service over a storage backend and the item master
#[derive(Clone)]
pub struct InventoryService<B, C> {
    backend: B,
    costs: C,
    policy: ReconciliationPolicy,
    default_allow_negative: bool,
}

impl<B, C> InventoryService<B, C>
where
    B: CostingBackend,
    C: crate::store::ItemCostIndex,
{
    /// Create a new InventoryService instance
    pub fn new(backend: B, costs: C, config: &CostingConfig) -> Self {
        Self {
            backend,
            costs,
            policy: ReconciliationPolicy {
                partial: config.partial_reconciliation,
            },
            default_allow_negative: config.default_allow_negative,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn costs(&self) -> &C {
        &self.costs
    }

    /// Receive stock and fulfil whatever backorders it covers
    pub async fn receive(&self, request: ReceiveRequest) -> AppResult<ReceiptResult> {
        let mut tx = self.backend.begin().await?;

        let (layer, movement) = layers::receive_layer(&mut tx, request).await?;
        let reconciliation = reconciliation::reconcile(
            &mut tx,
            layer.item_id,
            layer.location_id,
            self.policy,
        )
        .await?;

        self.backend.commit(tx).await?;

        if let Err(err) = self
            .costs
            .record_receipt_cost(layer.item_id, layer.unit_cost)
            .await
        {
            warn!(
                item_id = %layer.item_id,
                error = %err,
                "Failed to update replacement cost after receipt"
            );
        }

        Ok(ReceiptResult {
            layer,
            movement,
            reconciliation,
        })
    }

    /// Allocate stock; `allow_negative` on the request overrides the configured default
    pub async fn allocate(&self, request: AllocateRequest) -> AppResult<AllocationResult> {
        let allow_negative = request.allow_negative.unwrap_or(self.default_allow_negative);

        let mut tx = self.backend.begin().await?;
        let result = allocation::allocate(&mut tx, &request, allow_negative).await?;
        self.backend.commit(tx).await?;

        Ok(result)
    }

    pub async fn transfer(&self, request: TransferRequest) -> AppResult<TransferResult> {
        let mut tx = self.backend.begin().await?;
        let result = transfer::transfer(&mut tx, &request, self.policy).await?;
        self.backend.commit(tx).await?;

        Ok(result)
    }

    /// Run reconciliation for an item and location outside of a receipt
    pub async fn reconcile(&self, item_id: Uuid, location_id: Uuid) -> AppResult<ReconciliationReport> {
        let mut tx = self.backend.begin().await?;
        crate::services::references::ensure_stock(&mut tx, item_id, location_id, None).await?;
        let report = reconciliation::reconcile(&mut tx, item_id, location_id, self.policy).await?;
        self.backend.commit(tx).await?;

        Ok(report)
    }

    pub async fn cancel_pending(
        &self,
        pending_id: Uuid,
        reason: Option<&str>,
    ) -> AppResult<CanceledAllocation> {
        let mut tx = self.backend.begin().await?;
        let canceled = reconciliation::cancel_pending(&mut tx, pending_id, reason).await?;
        self.backend.commit(tx).await?;

        Ok(canceled)
    }

    // ========================================================================
    // Read-only queries
    // ========================================================================

    pub async fn estimate_cost(&self, request: EstimateCostRequest) -> AppResult<CostEstimate> {
        let mut tx = self.backend.begin().await?;
        allocation::estimate_cost(&mut tx, &request).await
    }

    pub async fn available_quantity(&self, key: StockKey) -> AppResult<Decimal> {
        let mut tx = self.backend.begin().await?;
        layers::available_quantity(&mut tx, key).await
    }

    pub async fn layer_breakdown(&self, key: StockKey) -> AppResult<Vec<LayerBreakdownEntry>> {
        let mut tx = self.backend.begin().await?;
        layers::layer_breakdown(&mut tx, key).await
    }

    pub async fn valuation(&self, key: StockKey) -> AppResult<InventoryValuation> {
        let mut tx = self.backend.begin().await?;
        layers::valuation(&mut tx, key).await
    }

    pub async fn list_pending(&self, filter: &PendingFilter) -> AppResult<Vec<PendingAllocation>> {
        let mut tx = self.backend.begin().await?;
        reconciliation::list_pending(&mut tx, filter).await
    }

    pub async fn list_movements(&self, filter: &MovementFilter) -> AppResult<Vec<InventoryMovement>> {
        let mut tx = self.backend.begin().await?;
        ledger::list_movements(&mut tx, filter).await
    }
}
