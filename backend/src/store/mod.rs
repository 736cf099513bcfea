//! Storage seam for the costing engine
//!
//! The engine only talks to a [`CostingStore`], which is always one open
//! transaction. [`CostingBackend`] hands those out and commits them; dropping
//! a store without committing discards every write made through it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use shared::{
    CostLayer, CostSettlement, InventoryMovement, PendingAllocation, PendingStatus,
    ReferenceKind, StockKey,
};

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryBackend, MemoryCostIndex};
pub use postgres::{PgBackend, PgItemCostIndex, PgStore};

/// Layer to persist for a receipt
#[derive(Debug, Clone)]
pub struct NewCostLayer {
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub bin_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub received_at: DateTime<Utc>,
    pub source_order_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub manufacturer: Option<String>,
    pub manufacturer_part_no: Option<String>,
    pub reference: String,
}

/// Ledger row to append
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub id: Uuid,
    pub item_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub from_location_id: Option<Uuid>,
    pub from_bin_id: Option<Uuid>,
    pub to_location_id: Option<Uuid>,
    pub to_bin_id: Option<Uuid>,
    pub layer_id: Option<Uuid>,
    pub work_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub order_line_id: Option<Uuid>,
    pub is_estimated: bool,
    pub reference: String,
    pub note: String,
    pub moved_at: DateTime<Utc>,
}

/// Backorder to persist
#[derive(Debug, Clone)]
pub struct NewPendingAllocation {
    pub id: Uuid,
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub work_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub order_line_id: Option<Uuid>,
    pub quantity: Decimal,
    pub estimated_unit_cost: Decimal,
    pub estimated_total_cost: Decimal,
    pub estimated_movement_id: Option<Uuid>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Filters for listing pending allocations
///
/// Without a status filter, FULFILLED allocations are left out.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PendingFilter {
    pub item_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub work_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub status: Option<PendingStatus>,
}

impl PendingFilter {
    pub fn matches(&self, pending: &PendingAllocation) -> bool {
        let status_ok = match self.status {
            Some(status) => pending.status == status,
            None => pending.status != PendingStatus::Fulfilled,
        };
        status_ok
            && self.item_id.map_or(true, |id| pending.item_id == id)
            && self.location_id.map_or(true, |id| pending.location_id == id)
            && self
                .work_order_id
                .map_or(true, |id| pending.work_order_id == Some(id))
            && self.order_id.map_or(true, |id| pending.order_id == Some(id))
    }
}

/// Filters for listing ledger rows
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementFilter {
    pub item_id: Option<Uuid>,
    /// Matches either side of the movement
    pub location_id: Option<Uuid>,
    pub work_order_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub estimated: Option<bool>,
    pub limit: Option<i64>,
}

impl MovementFilter {
    pub const DEFAULT_LIMIT: i64 = 200;
    pub const MAX_LIMIT: i64 = 1000;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn matches(&self, movement: &InventoryMovement) -> bool {
        self.item_id.map_or(true, |id| movement.item_id == id)
            && self.location_id.map_or(true, |id| {
                movement.from_location_id == Some(id) || movement.to_location_id == Some(id)
            })
            && self
                .work_order_id
                .map_or(true, |id| movement.work_order_id == Some(id))
            && self.order_id.map_or(true, |id| movement.order_id == Some(id))
            && self.estimated.map_or(true, |e| movement.is_estimated == e)
    }
}

/// One open unit of work against the cost layer store, pending allocation
/// store and movement ledger.
#[async_trait]
pub trait CostingStore: Send {
    // References owned by collaborators

    async fn reference_exists(&mut self, kind: ReferenceKind, id: Uuid) -> AppResult<bool>;

    /// Location a bin belongs to, `None` when the bin does not exist
    async fn bin_location(&mut self, bin_id: Uuid) -> AppResult<Option<Uuid>>;

    // Cost layers

    /// Open layers in FIFO order, locked until the transaction ends
    async fn lock_open_layers(&mut self, key: &StockKey) -> AppResult<Vec<CostLayer>>;

    /// Open layers in FIFO order without locking
    async fn open_layers(&mut self, key: &StockKey) -> AppResult<Vec<CostLayer>>;

    /// Unit cost of the most recently received layer, depleted or not
    async fn latest_unit_cost(&mut self, item_id: Uuid, location_id: Uuid)
        -> AppResult<Option<Decimal>>;

    /// Item master replacement cost, read through the open transaction
    async fn replacement_cost(&mut self, item_id: Uuid) -> AppResult<Option<Decimal>>;

    async fn insert_layer(&mut self, layer: NewCostLayer) -> AppResult<CostLayer>;

    /// Take `quantity` off a layer; fails with a conflict instead of going
    /// below zero. Returns the new remaining quantity.
    async fn decrement_layer(&mut self, layer_id: Uuid, quantity: Decimal) -> AppResult<Decimal>;

    // Movement ledger

    async fn insert_movement(&mut self, movement: NewMovement) -> AppResult<InventoryMovement>;

    async fn get_movement(&mut self, id: Uuid) -> AppResult<Option<InventoryMovement>>;

    /// Oldest estimated row for the item with the given references and signed quantity
    async fn find_estimated_movement(
        &mut self,
        item_id: Uuid,
        work_order_id: Option<Uuid>,
        order_id: Option<Uuid>,
        quantity: Decimal,
    ) -> AppResult<Option<InventoryMovement>>;

    /// The one sanctioned ledger update; only applies to rows still estimated
    async fn settle_estimated_movement(
        &mut self,
        id: Uuid,
        settlement: &CostSettlement,
        note_suffix: &str,
    ) -> AppResult<InventoryMovement>;

    async fn list_movements(&mut self, filter: &MovementFilter) -> AppResult<Vec<InventoryMovement>>;

    // Pending allocations

    async fn insert_pending(&mut self, pending: NewPendingAllocation) -> AppResult<PendingAllocation>;

    async fn lock_pending(&mut self, id: Uuid) -> AppResult<Option<PendingAllocation>>;

    /// Open allocations for the pair, oldest first, locked
    async fn lock_open_pending(
        &mut self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> AppResult<Vec<PendingAllocation>>;

    async fn update_pending(&mut self, pending: &PendingAllocation) -> AppResult<()>;

    /// Newest first
    async fn list_pending(&mut self, filter: &PendingFilter) -> AppResult<Vec<PendingAllocation>>;

    // Nested units of work

    async fn savepoint(&mut self) -> AppResult<()>;

    async fn rollback_to_savepoint(&mut self) -> AppResult<()>;

    async fn release_savepoint(&mut self) -> AppResult<()>;
}

/// Source of transactions
#[async_trait]
pub trait CostingBackend: Send + Sync {
    type Tx: CostingStore + 'static;

    async fn begin(&self) -> AppResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> AppResult<()>;
}

/// Item master collaborator that owns the current replacement cost.
///
/// Reads go through [`CostingStore::replacement_cost`] so they share the
/// caller's transaction.
#[async_trait]
pub trait ItemCostIndex: Send + Sync {
    /// Told about every purchase receipt after it commits
    async fn record_receipt_cost(&self, item_id: Uuid, unit_cost: Decimal) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(status: PendingStatus) -> PendingAllocation {
        let now = Utc::now();
        PendingAllocation {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            work_order_id: Some(Uuid::new_v4()),
            order_id: None,
            order_line_id: None,
            quantity: Decimal::from(5),
            quantity_fulfilled: Decimal::ZERO,
            estimated_unit_cost: Decimal::ONE,
            estimated_total_cost: Decimal::from(5),
            actual_cost_to_date: Decimal::ZERO,
            estimated_movement_id: None,
            status,
            notes: String::new(),
            created_at: now,
            fulfilled_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_pending_filter_excludes_fulfilled_by_default() {
        let filter = PendingFilter::default();
        assert!(filter.matches(&pending(PendingStatus::AwaitingReceipt)));
        assert!(filter.matches(&pending(PendingStatus::Canceled)));
        assert!(!filter.matches(&pending(PendingStatus::Fulfilled)));

        let fulfilled = PendingFilter {
            status: Some(PendingStatus::Fulfilled),
            ..Default::default()
        };
        assert!(fulfilled.matches(&pending(PendingStatus::Fulfilled)));
        assert!(!fulfilled.matches(&pending(PendingStatus::AwaitingReceipt)));
    }

    #[test]
    fn test_pending_filter_by_work_order() {
        let p = pending(PendingStatus::AwaitingReceipt);
        let hit = PendingFilter {
            work_order_id: p.work_order_id,
            ..Default::default()
        };
        let miss = PendingFilter {
            work_order_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(hit.matches(&p));
        assert!(!miss.matches(&p));
    }

    #[test]
    fn test_movement_limit_is_clamped() {
        assert_eq!(MovementFilter::default().effective_limit(), 200);
        let big = MovementFilter {
            limit: Some(50_000),
            ..Default::default()
        };
        assert_eq!(big.effective_limit(), 1000);
        let zero = MovementFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.effective_limit(), 1);
    }
}
