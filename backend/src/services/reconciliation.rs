//! Matching pending allocations against newly available stock
//!
//! Runs inside the caller's transaction. Each pending allocation gets its own
//! savepoint so one bad record cannot undo the rest of the batch.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared::{
    fifo, InventoryMovement, PendingAllocation, PendingStatus, ReconciliationFailure,
    ReconciliationReport, StockKey,
};

use crate::error::{AppError, AppResult};
use crate::services::allocation::{self, AllocateRequest};
use crate::services::ledger;
use crate::store::{CostingStore, PendingFilter};

/// How much a receipt may do for a backorder it cannot cover in full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationPolicy {
    /// Draw whatever is on hand into a partially fulfilled allocation
    pub partial: bool,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self { partial: true }
    }
}

/// A canceled backorder and the row that nets out its estimate
#[derive(Debug, Clone, Serialize)]
pub struct CanceledAllocation {
    pub pending_allocation: PendingAllocation,
    pub reversal_movement: InventoryMovement,
}

/// Fulfil open pending allocations for the pair, oldest first
pub async fn reconcile(
    store: &mut dyn CostingStore,
    item_id: Uuid,
    location_id: Uuid,
    policy: ReconciliationPolicy,
) -> AppResult<ReconciliationReport> {
    let mut report = ReconciliationReport::new(item_id, location_id);
    let open = store.lock_open_pending(item_id, location_id).await?;
    let key = StockKey::location_wide(item_id, location_id);

    for mut pending in open {
        let available = fifo::available_quantity(&store.open_layers(&key).await?);
        let outstanding = pending.outstanding();

        let quantity = if available >= outstanding {
            outstanding
        } else if policy.partial && available > Decimal::ZERO {
            available
        } else {
            debug!(
                pending_allocation_id = %pending.id,
                outstanding = %outstanding,
                available = %available,
                "Pending allocation still waiting for stock"
            );
            report.waiting += 1;
            continue;
        };

        store.savepoint().await?;
        match fulfil(store, &mut pending, quantity).await {
            Ok(PendingStatus::Fulfilled) => {
                store.release_savepoint().await?;
                report.fulfilled.push(pending.id);
            }
            Ok(_) => {
                store.release_savepoint().await?;
                report.partially_fulfilled.push(pending.id);
            }
            Err(err) => {
                store.rollback_to_savepoint().await?;
                warn!(
                    pending_allocation_id = %pending.id,
                    error = %err,
                    "Failed to reconcile pending allocation"
                );
                report.failures.push(ReconciliationFailure {
                    pending_allocation_id: pending.id,
                    error: err.to_string(),
                });
            }
        }
    }

    if !report.is_noop() {
        info!(
            item_id = %item_id,
            location_id = %location_id,
            fulfilled = report.fulfilled.len(),
            partially_fulfilled = report.partially_fulfilled.len(),
            waiting = report.waiting,
            failures = report.failures.len(),
            "Reconciled pending allocations"
        );
    }

    Ok(report)
}

async fn fulfil(
    store: &mut dyn CostingStore,
    pending: &mut PendingAllocation,
    quantity: Decimal,
) -> AppResult<PendingStatus> {
    let request = AllocateRequest {
        item_id: pending.item_id,
        location_id: pending.location_id,
        quantity,
        bin_id: None,
        work_order_id: pending.work_order_id,
        order_id: pending.order_id,
        order_line_id: pending.order_line_id,
        reference: Some(format!("Auto-fulfill pending: {}", pending.id)),
        note: Some(format!(
            "Fulfilled pending allocation from {}",
            pending.created_at
        )),
        allow_negative: Some(false),
    };
    let result = allocation::allocate(store, &request, false).await?;

    pending.apply_fulfilment(quantity, result.total_cost, Utc::now())?;
    store.update_pending(pending).await?;

    if pending.status == PendingStatus::Fulfilled {
        settle_estimated_row(store, pending).await?;
    }

    info!(
        pending_allocation_id = %pending.id,
        quantity = %quantity,
        actual_cost = %result.total_cost,
        status = %pending.status,
        "Pending allocation matched"
    );

    Ok(pending.status)
}

/// Replace the estimate on the shortage row with the actual cost
async fn settle_estimated_row(
    store: &mut dyn CostingStore,
    pending: &PendingAllocation,
) -> AppResult<()> {
    let linked = match pending.estimated_movement_id {
        Some(id) => store.get_movement(id).await?.filter(|m| m.is_estimated),
        None => None,
    };
    let estimated = match linked {
        Some(movement) => Some(movement),
        None => {
            store
                .find_estimated_movement(
                    pending.item_id,
                    pending.work_order_id,
                    pending.order_id,
                    -pending.quantity,
                )
                .await?
        }
    };

    let Some(estimated) = estimated else {
        warn!(
            pending_allocation_id = %pending.id,
            "No estimated movement found to settle"
        );
        return Ok(());
    };

    let actual = pending.actual_cost_to_date;
    let settlement = fifo::settle_estimate(estimated.total_cost, actual, pending.quantity);
    let suffix = format!(" | Fulfilled with actual cost: ${}", actual.normalize());
    store
        .settle_estimated_movement(estimated.id, &settlement, &suffix)
        .await?;

    Ok(())
}

/// Cancel an open pending allocation and reverse what is left of its estimate
pub async fn cancel_pending(
    store: &mut dyn CostingStore,
    pending_id: Uuid,
    reason: Option<&str>,
) -> AppResult<CanceledAllocation> {
    let mut pending = store
        .lock_pending(pending_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Pending allocation".to_string()))?;

    let now = Utc::now();
    pending.cancel(reason, now)?;
    store.update_pending(&pending).await?;

    let reversal_movement = store
        .insert_movement(ledger::estimate_reversal(&pending, now))
        .await?;

    info!(
        pending_allocation_id = %pending.id,
        outstanding = %pending.outstanding(),
        "Pending allocation canceled"
    );

    Ok(CanceledAllocation {
        pending_allocation: pending,
        reversal_movement,
    })
}

/// Pending allocations matching the filter, newest first
pub async fn list_pending(
    store: &mut dyn CostingStore,
    filter: &PendingFilter,
) -> AppResult<Vec<PendingAllocation>> {
    store.list_pending(filter).await
}
