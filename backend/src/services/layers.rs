//! Cost layer receipts and read-side queries

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use shared::{
    fifo, validate_quantity, validate_unit_cost, CostLayer, InventoryMovement,
    InventoryValuation, LayerBreakdownEntry, ReferenceKind, StockKey,
};

use crate::error::{AppError, AppResult};
use crate::services::ledger::{self, OrderRefs};
use crate::services::references;
use crate::store::{CostingStore, NewCostLayer};

/// Input for receiving stock into a new layer
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReceiveRequest {
    pub item_id: Uuid,
    pub location_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub bin_id: Option<Uuid>,
    pub source_order_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    #[validate(length(max = 255))]
    pub manufacturer: Option<String>,
    #[validate(length(max = 100))]
    pub manufacturer_part_no: Option<String>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    /// Defaults to now
    pub received_at: Option<DateTime<Utc>>,
}

impl ReceiveRequest {
    pub fn new(item_id: Uuid, location_id: Uuid, quantity: Decimal, unit_cost: Decimal) -> Self {
        Self {
            item_id,
            location_id,
            quantity,
            unit_cost,
            bin_id: None,
            source_order_id: None,
            vendor_id: None,
            manufacturer: None,
            manufacturer_part_no: None,
            reference: None,
            received_at: None,
        }
    }

    pub fn validate_amounts(&self) -> AppResult<()> {
        self.validate()?;
        validate_quantity(self.quantity).map_err(|m| AppError::validation("quantity", m))?;
        validate_unit_cost(self.unit_cost).map_err(|m| AppError::validation("unit_cost", m))?;
        Ok(())
    }
}

/// Create a layer and its receipt row. Never merges into an existing layer.
pub async fn receive_layer(
    store: &mut dyn CostingStore,
    request: ReceiveRequest,
) -> AppResult<(CostLayer, InventoryMovement)> {
    request.validate_amounts()?;

    references::ensure_stock(store, request.item_id, request.location_id, request.bin_id).await?;
    references::ensure_optional(store, ReferenceKind::Order, request.source_order_id).await?;
    references::ensure_optional(store, ReferenceKind::Vendor, request.vendor_id).await?;

    let now = Utc::now();
    let layer = store
        .insert_layer(NewCostLayer {
            id: Uuid::new_v4(),
            item_id: request.item_id,
            location_id: request.location_id,
            bin_id: request.bin_id,
            quantity: request.quantity,
            unit_cost: request.unit_cost,
            received_at: request.received_at.unwrap_or(now),
            source_order_id: request.source_order_id,
            vendor_id: request.vendor_id,
            manufacturer: request.manufacturer,
            manufacturer_part_no: request.manufacturer_part_no,
            reference: request.reference.unwrap_or_default(),
        })
        .await?;

    let refs = OrderRefs {
        order_id: layer.source_order_id,
        ..Default::default()
    };
    let note = format!(
        "Received into inventory @ ${}/unit",
        layer.unit_cost.normalize()
    );
    let movement = store
        .insert_movement(ledger::receipt(&layer, None, refs, note, now))
        .await?;

    info!(
        layer_id = %layer.id,
        item_id = %layer.item_id,
        location_id = %layer.location_id,
        quantity = %layer.quantity_received,
        unit_cost = %layer.unit_cost,
        "Received cost layer"
    );

    Ok((layer, movement))
}

/// On-hand quantity over open layers
pub async fn available_quantity(store: &mut dyn CostingStore, key: StockKey) -> AppResult<Decimal> {
    references::ensure_stock(store, key.item_id, key.location_id, key.bin_id).await?;
    let layers = store.open_layers(&key).await?;
    Ok(fifo::available_quantity(&layers))
}

/// Open layers in consumption order
pub async fn layer_breakdown(
    store: &mut dyn CostingStore,
    key: StockKey,
) -> AppResult<Vec<LayerBreakdownEntry>> {
    references::ensure_stock(store, key.item_id, key.location_id, key.bin_id).await?;
    let layers = store.open_layers(&key).await?;
    Ok(fifo::fifo_order(&layers)
        .into_iter()
        .map(LayerBreakdownEntry::from)
        .collect())
}

/// FIFO valuation of what is on hand
pub async fn valuation(store: &mut dyn CostingStore, key: StockKey) -> AppResult<InventoryValuation> {
    references::ensure_stock(store, key.item_id, key.location_id, key.bin_id).await?;
    let layers = store.open_layers(&key).await?;

    let quantity_on_hand = fifo::available_quantity(&layers);
    let total_value = layers
        .iter()
        .try_fold(Decimal::ZERO, |acc, layer| acc.checked_add(layer.total_value()))
        .ok_or_else(|| AppError::Internal("Inventory value exceeds the decimal range".to_string()))?;
    let average_unit_cost = if quantity_on_hand.is_zero() {
        Decimal::ZERO
    } else {
        (total_value / quantity_on_hand).round_dp(shared::COST_SCALE)
    };

    Ok(InventoryValuation {
        item_id: key.item_id,
        location_id: key.location_id,
        bin_id: key.bin_id,
        quantity_on_hand,
        total_value,
        average_unit_cost,
        layer_count: layers.len(),
    })
}
