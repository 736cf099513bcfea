//! WebAssembly module for the inventory costing UI
//!
//! Provides client-side computation for:
//! - FIFO cost previews over a layer snapshot from `/inventory/layers`
//! - On-hand quantity totals
//! - Quantity and unit cost input validation

use std::str::FromStr;

use rust_decimal::Decimal;
use uuid::Uuid;
use wasm_bindgen::prelude::*;

use shared::{fifo, CostEstimate, CostLayer, LayerBreakdownEntry};

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|e| format!("Invalid {}: {}", field, e))
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, String> {
    Uuid::parse_str(value.trim()).map_err(|e| format!("Invalid {}: {}", field, e))
}

/// Rebuild layers from the breakdown rows; rows arrive in consumption order
fn layers_from_breakdown(
    item_id: Uuid,
    location_id: Uuid,
    layers_json: &str,
) -> Result<Vec<CostLayer>, String> {
    let entries: Vec<LayerBreakdownEntry> =
        serde_json::from_str(layers_json).map_err(|e| format!("Invalid layers JSON: {}", e))?;
    for entry in &entries {
        validate_quantity(entry.quantity_remaining)
            .and_then(|_| validate_unit_cost(entry.unit_cost))
            .map_err(|e| format!("Invalid layer {}: {}", entry.layer_id, e))?;
    }

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| CostLayer {
            id: entry.layer_id,
            sequence: i as i64,
            item_id,
            location_id,
            bin_id: entry.bin_id,
            quantity_received: entry.quantity_remaining,
            quantity_remaining: entry.quantity_remaining,
            unit_cost: entry.unit_cost,
            received_at: entry.received_at,
            source_order_id: entry.source_order_id,
            vendor_id: entry.vendor_id,
            manufacturer: entry.manufacturer,
            manufacturer_part_no: None,
            reference: entry.reference,
            created_at: entry.received_at,
        })
        .collect())
}

/// Cost preview without the JavaScript boundary
pub fn preview(
    item_id: &str,
    location_id: &str,
    layers_json: &str,
    quantity: &str,
    shortage_unit_cost: &str,
) -> Result<CostEstimate, String> {
    let item_id = parse_uuid("item_id", item_id)?;
    let location_id = parse_uuid("location_id", location_id)?;
    let quantity = parse_decimal("quantity", quantity)?;
    validate_quantity(quantity).map_err(str::to_string)?;
    let shortage_unit_cost = parse_decimal("shortage_unit_cost", shortage_unit_cost)?;
    validate_unit_cost(shortage_unit_cost).map_err(str::to_string)?;

    let layers = layers_from_breakdown(item_id, location_id, layers_json)?;
    Ok(fifo::preview_cost(
        item_id,
        location_id,
        &layers,
        quantity,
        shortage_unit_cost,
    ))
}

/// Preview the FIFO cost of drawing `quantity` from a layer snapshot.
///
/// Returns the estimate as JSON. The shortfall, if any, is priced at
/// `shortage_unit_cost`.
#[wasm_bindgen]
pub fn estimate_allocation_cost(
    item_id: &str,
    location_id: &str,
    layers_json: &str,
    quantity: &str,
    shortage_unit_cost: &str,
) -> Result<String, JsValue> {
    let estimate = preview(item_id, location_id, layers_json, quantity, shortage_unit_cost)
        .map_err(|e| JsValue::from(js_sys::Error::new(&e)))?;

    if !estimate.sufficient {
        web_sys::console::warn_1(&JsValue::from_str(&fifo::shortage_warning(
            estimate.available_quantity,
            estimate.shortage,
        )));
    }

    serde_json::to_string(&estimate).map_err(|e| JsValue::from(js_sys::Error::new(&e.to_string())))
}

/// Total remaining quantity over a layer snapshot
pub fn snapshot_quantity(layers_json: &str) -> Result<Decimal, String> {
    let layers = layers_from_breakdown(Uuid::nil(), Uuid::nil(), layers_json)?;
    Ok(fifo::available_quantity(&layers))
}

#[wasm_bindgen]
pub fn available_quantity_from_layers(layers_json: &str) -> Result<String, JsValue> {
    snapshot_quantity(layers_json)
        .map(|q| q.normalize().to_string())
        .map_err(|e| JsValue::from(js_sys::Error::new(&e)))
}

/// Error message for an invalid quantity, or nothing when it is acceptable
#[wasm_bindgen]
pub fn validate_quantity_input(quantity: &str) -> Option<String> {
    match parse_decimal("quantity", quantity) {
        Ok(q) => validate_quantity(q).err().map(str::to_string),
        Err(e) => Some(e),
    }
}

/// Error message for an invalid unit cost, or nothing when it is acceptable
#[wasm_bindgen]
pub fn validate_unit_cost_input(unit_cost: &str) -> Option<String> {
    match parse_decimal("unit cost", unit_cost) {
        Ok(c) => validate_unit_cost(c).err().map(str::to_string),
        Err(e) => Some(e),
    }
}
