//! Common types used across the costing service

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fractional digits stored for quantities
pub const QUANTITY_SCALE: u32 = 4;

/// Fractional digits stored for unit costs and totals
pub const COST_SCALE: u32 = 6;

/// Integer digits stored for quantities and unit costs
pub const MAX_INTEGER_DIGITS: u32 = 14;

/// Identifies the stock a layer query or allocation runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub item_id: Uuid,
    pub location_id: Uuid,
    /// When set, only layers in this bin are considered
    pub bin_id: Option<Uuid>,
}

impl StockKey {
    pub fn new(item_id: Uuid, location_id: Uuid, bin_id: Option<Uuid>) -> Self {
        Self {
            item_id,
            location_id,
            bin_id,
        }
    }

    /// Key covering every bin at the location
    pub fn location_wide(item_id: Uuid, location_id: Uuid) -> Self {
        Self::new(item_id, location_id, None)
    }
}

/// Kinds of records owned by collaborators that the core only references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Item,
    Location,
    Bin,
    Vendor,
    Order,
    OrderLine,
    WorkOrder,
}

impl ReferenceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceKind::Item => "Item",
            ReferenceKind::Location => "Location",
            ReferenceKind::Bin => "Bin",
            ReferenceKind::Vendor => "Vendor",
            ReferenceKind::Order => "Order",
            ReferenceKind::OrderLine => "Order line",
            ReferenceKind::WorkOrder => "Work order",
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
