//! In-memory costing store
//!
//! Used by the integration tests and for running the engine without a
//! database. A transaction holds the state lock for its whole life and works
//! on a private copy, so commit is a swap and dropping it is a rollback.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use shared::{
    fifo, CostLayer, CostSettlement, InventoryMovement, PendingAllocation, PendingStatus,
    ReferenceKind, StockKey,
};

use super::{
    CostingBackend, CostingStore, ItemCostIndex, MovementFilter, NewCostLayer, NewMovement,
    NewPendingAllocation, PendingFilter,
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    layers: Vec<CostLayer>,
    movements: Vec<InventoryMovement>,
    pending: Vec<PendingAllocation>,
    references: HashMap<ReferenceKind, HashSet<Uuid>>,
    bin_locations: HashMap<Uuid, Uuid>,
    replacement_costs: HashMap<Uuid, Decimal>,
    next_sequence: i64,
}

impl MemoryState {
    fn layers_for(&self, key: &StockKey) -> Vec<CostLayer> {
        let matching: Vec<CostLayer> = self
            .layers
            .iter()
            .filter(|l| l.item_id == key.item_id && l.location_id == key.location_id)
            .filter(|l| key.bin_id.map_or(true, |bin| l.bin_id == Some(bin)))
            .cloned()
            .collect();

        fifo::fifo_order(&matching).into_iter().cloned().collect()
    }
}

/// Shared in-memory state plus the transaction source over it
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a collaborator record visible to reference checks
    pub async fn register(&self, kind: ReferenceKind, id: Uuid) {
        let mut state = self.state.lock().await;
        state.references.entry(kind).or_default().insert(id);
    }

    pub async fn register_bin(&self, bin_id: Uuid, location_id: Uuid) {
        let mut state = self.state.lock().await;
        state
            .references
            .entry(ReferenceKind::Bin)
            .or_default()
            .insert(bin_id);
        state.bin_locations.insert(bin_id, location_id);
    }

    /// Simulate a collaborator record disappearing
    pub async fn remove_reference(&self, kind: ReferenceKind, id: Uuid) {
        let mut state = self.state.lock().await;
        if let Some(ids) = state.references.get_mut(&kind) {
            ids.remove(&id);
        }
        if kind == ReferenceKind::Bin {
            state.bin_locations.remove(&id);
        }
    }

    /// Item master view over the same state
    pub fn cost_index(&self) -> MemoryCostIndex {
        MemoryCostIndex {
            state: self.state.clone(),
        }
    }

    /// Every layer in creation order
    pub async fn layers(&self) -> Vec<CostLayer> {
        self.state.lock().await.layers.clone()
    }

    /// Every ledger row in insertion order
    pub async fn movements(&self) -> Vec<InventoryMovement> {
        self.state.lock().await.movements.clone()
    }

    /// Every pending allocation in creation order
    pub async fn pending(&self) -> Vec<PendingAllocation> {
        self.state.lock().await.pending.clone()
    }
}

#[async_trait]
impl CostingBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            savepoints: Vec::new(),
        })
    }

    async fn commit(&self, tx: MemoryTx) -> AppResult<()> {
        let MemoryTx {
            mut guard, working, ..
        } = tx;
        *guard = working;
        Ok(())
    }
}

/// Open transaction over a [`MemoryBackend`]
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    savepoints: Vec<MemoryState>,
}

#[async_trait]
impl CostingStore for MemoryTx {
    async fn reference_exists(&mut self, kind: ReferenceKind, id: Uuid) -> AppResult<bool> {
        Ok(self
            .working
            .references
            .get(&kind)
            .map_or(false, |ids| ids.contains(&id)))
    }

    async fn bin_location(&mut self, bin_id: Uuid) -> AppResult<Option<Uuid>> {
        Ok(self.working.bin_locations.get(&bin_id).copied())
    }

    async fn lock_open_layers(&mut self, key: &StockKey) -> AppResult<Vec<CostLayer>> {
        Ok(self.working.layers_for(key))
    }

    async fn open_layers(&mut self, key: &StockKey) -> AppResult<Vec<CostLayer>> {
        Ok(self.working.layers_for(key))
    }

    async fn latest_unit_cost(
        &mut self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> AppResult<Option<Decimal>> {
        Ok(self
            .working
            .layers
            .iter()
            .filter(|l| l.item_id == item_id && l.location_id == location_id)
            .max_by_key(|l| l.fifo_key())
            .map(|l| l.unit_cost))
    }

    async fn replacement_cost(&mut self, item_id: Uuid) -> AppResult<Option<Decimal>> {
        Ok(self.working.replacement_costs.get(&item_id).copied())
    }

    async fn insert_layer(&mut self, layer: NewCostLayer) -> AppResult<CostLayer> {
        self.working.next_sequence += 1;
        let created = CostLayer {
            id: layer.id,
            sequence: self.working.next_sequence,
            item_id: layer.item_id,
            location_id: layer.location_id,
            bin_id: layer.bin_id,
            quantity_received: layer.quantity,
            quantity_remaining: layer.quantity,
            unit_cost: layer.unit_cost,
            received_at: layer.received_at,
            source_order_id: layer.source_order_id,
            vendor_id: layer.vendor_id,
            manufacturer: layer.manufacturer,
            manufacturer_part_no: layer.manufacturer_part_no,
            reference: layer.reference,
            created_at: Utc::now(),
        };
        self.working.layers.push(created.clone());
        Ok(created)
    }

    async fn decrement_layer(&mut self, layer_id: Uuid, quantity: Decimal) -> AppResult<Decimal> {
        let layer = self
            .working
            .layers
            .iter_mut()
            .find(|l| l.id == layer_id)
            .ok_or_else(|| AppError::NotFound("Cost layer".to_string()))?;

        if layer.quantity_remaining < quantity {
            return Err(AppError::Conflict(format!(
                "Cost layer {} no longer has {} remaining",
                layer_id,
                quantity.normalize()
            )));
        }
        layer.quantity_remaining -= quantity;
        Ok(layer.quantity_remaining)
    }

    async fn insert_movement(&mut self, movement: NewMovement) -> AppResult<InventoryMovement> {
        let created = InventoryMovement {
            id: movement.id,
            item_id: movement.item_id,
            quantity: movement.quantity,
            unit_cost: movement.unit_cost,
            total_cost: movement.total_cost,
            from_location_id: movement.from_location_id,
            from_bin_id: movement.from_bin_id,
            to_location_id: movement.to_location_id,
            to_bin_id: movement.to_bin_id,
            layer_id: movement.layer_id,
            work_order_id: movement.work_order_id,
            order_id: movement.order_id,
            order_line_id: movement.order_line_id,
            is_estimated: movement.is_estimated,
            actual_cost_variance: None,
            reference: movement.reference,
            note: movement.note,
            moved_at: movement.moved_at,
        };
        self.working.movements.push(created.clone());
        Ok(created)
    }

    async fn get_movement(&mut self, id: Uuid) -> AppResult<Option<InventoryMovement>> {
        Ok(self.working.movements.iter().find(|m| m.id == id).cloned())
    }

    async fn find_estimated_movement(
        &mut self,
        item_id: Uuid,
        work_order_id: Option<Uuid>,
        order_id: Option<Uuid>,
        quantity: Decimal,
    ) -> AppResult<Option<InventoryMovement>> {
        Ok(self
            .working
            .movements
            .iter()
            .filter(|m| {
                m.item_id == item_id
                    && m.is_estimated
                    && m.work_order_id == work_order_id
                    && m.order_id == order_id
                    && m.quantity == quantity
            })
            .min_by_key(|m| m.moved_at)
            .cloned())
    }

    async fn settle_estimated_movement(
        &mut self,
        id: Uuid,
        settlement: &CostSettlement,
        note_suffix: &str,
    ) -> AppResult<InventoryMovement> {
        let movement = self
            .working
            .movements
            .iter_mut()
            .find(|m| m.id == id && m.is_estimated)
            .ok_or_else(|| AppError::Conflict(format!("Movement {} is not an open estimate", id)))?;

        movement.unit_cost = settlement.unit_cost;
        movement.total_cost = settlement.total_cost;
        movement.actual_cost_variance = Some(settlement.variance);
        movement.is_estimated = false;
        movement.note.push_str(note_suffix);
        Ok(movement.clone())
    }

    async fn list_movements(&mut self, filter: &MovementFilter) -> AppResult<Vec<InventoryMovement>> {
        let mut rows: Vec<InventoryMovement> = self
            .working
            .movements
            .iter()
            .rev()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.moved_at.cmp(&a.moved_at));
        rows.truncate(filter.effective_limit() as usize);
        Ok(rows)
    }

    async fn insert_pending(&mut self, pending: NewPendingAllocation) -> AppResult<PendingAllocation> {
        let created = PendingAllocation {
            id: pending.id,
            item_id: pending.item_id,
            location_id: pending.location_id,
            work_order_id: pending.work_order_id,
            order_id: pending.order_id,
            order_line_id: pending.order_line_id,
            quantity: pending.quantity,
            quantity_fulfilled: Decimal::ZERO,
            estimated_unit_cost: pending.estimated_unit_cost,
            estimated_total_cost: pending.estimated_total_cost,
            actual_cost_to_date: Decimal::ZERO,
            estimated_movement_id: pending.estimated_movement_id,
            status: PendingStatus::AwaitingReceipt,
            notes: pending.notes,
            created_at: pending.created_at,
            fulfilled_at: None,
            updated_at: pending.created_at,
        };
        self.working.pending.push(created.clone());
        Ok(created)
    }

    async fn lock_pending(&mut self, id: Uuid) -> AppResult<Option<PendingAllocation>> {
        Ok(self.working.pending.iter().find(|p| p.id == id).cloned())
    }

    async fn lock_open_pending(
        &mut self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> AppResult<Vec<PendingAllocation>> {
        let mut open: Vec<PendingAllocation> = self
            .working
            .pending
            .iter()
            .filter(|p| p.item_id == item_id && p.location_id == location_id && p.status.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|p| (p.created_at, p.id));
        Ok(open)
    }

    async fn update_pending(&mut self, pending: &PendingAllocation) -> AppResult<()> {
        let slot = self
            .working
            .pending
            .iter_mut()
            .find(|p| p.id == pending.id)
            .ok_or_else(|| AppError::NotFound("Pending allocation".to_string()))?;
        *slot = pending.clone();
        Ok(())
    }

    async fn list_pending(&mut self, filter: &PendingFilter) -> AppResult<Vec<PendingAllocation>> {
        let mut rows: Vec<PendingAllocation> = self
            .working
            .pending
            .iter()
            .rev()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn savepoint(&mut self) -> AppResult<()> {
        self.savepoints.push(self.working.clone());
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> AppResult<()> {
        self.working = self
            .savepoints
            .pop()
            .ok_or_else(|| AppError::Internal("No savepoint to roll back to".to_string()))?;
        Ok(())
    }

    async fn release_savepoint(&mut self) -> AppResult<()> {
        self.savepoints
            .pop()
            .map(|_| ())
            .ok_or_else(|| AppError::Internal("No savepoint to release".to_string()))
    }
}

/// Replacement costs held alongside the rest of the in-memory state
#[derive(Clone)]
pub struct MemoryCostIndex {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCostIndex {
    pub async fn set_replacement_cost(&self, item_id: Uuid, unit_cost: Decimal) {
        let mut state = self.state.lock().await;
        state.replacement_costs.insert(item_id, unit_cost);
    }

    pub async fn replacement_cost(&self, item_id: Uuid) -> Option<Decimal> {
        self.state.lock().await.replacement_costs.get(&item_id).copied()
    }
}

#[async_trait]
impl ItemCostIndex for MemoryCostIndex {
    async fn record_receipt_cost(&self, item_id: Uuid, unit_cost: Decimal) -> AppResult<()> {
        self.set_replacement_cost(item_id, unit_cost).await;
        Ok(())
    }
}
