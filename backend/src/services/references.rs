//! Existence checks for records owned by other services

use uuid::Uuid;

use shared::ReferenceKind;

use crate::error::{AppError, AppResult};
use crate::services::ledger::OrderRefs;
use crate::store::CostingStore;

pub async fn ensure_exists(
    store: &mut dyn CostingStore,
    kind: ReferenceKind,
    id: Uuid,
) -> AppResult<()> {
    if store.reference_exists(kind, id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound(kind.label().to_string()))
    }
}

pub async fn ensure_optional(
    store: &mut dyn CostingStore,
    kind: ReferenceKind,
    id: Option<Uuid>,
) -> AppResult<()> {
    match id {
        Some(id) => ensure_exists(store, kind, id).await,
        None => Ok(()),
    }
}

/// Item, location and, when given, a bin that belongs to that location
pub async fn ensure_stock(
    store: &mut dyn CostingStore,
    item_id: Uuid,
    location_id: Uuid,
    bin_id: Option<Uuid>,
) -> AppResult<()> {
    ensure_exists(store, ReferenceKind::Item, item_id).await?;
    ensure_exists(store, ReferenceKind::Location, location_id).await?;

    if let Some(bin_id) = bin_id {
        let owner = store
            .bin_location(bin_id)
            .await?
            .ok_or_else(|| AppError::NotFound(ReferenceKind::Bin.label().to_string()))?;
        if owner != location_id {
            return Err(AppError::validation(
                "bin_id",
                "Bin does not belong to the location",
            ));
        }
    }

    Ok(())
}

pub async fn ensure_order_refs(store: &mut dyn CostingStore, refs: OrderRefs) -> AppResult<()> {
    ensure_optional(store, ReferenceKind::WorkOrder, refs.work_order_id).await?;
    ensure_optional(store, ReferenceKind::Order, refs.order_id).await?;
    ensure_optional(store, ReferenceKind::OrderLine, refs.order_line_id).await?;
    Ok(())
}
