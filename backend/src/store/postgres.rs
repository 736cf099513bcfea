//! PostgreSQL implementation of the costing store
//!
//! Every [`PgStore`] wraps one database transaction. Layer and pending rows
//! read for mutation are taken `FOR UPDATE`, so concurrent allocations on the
//! same item and location serialize on the row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{
    CostLayer, CostSettlement, InventoryMovement, PendingAllocation, PendingStatus,
    ReferenceKind, StockKey,
};

use super::{
    CostingBackend, CostingStore, ItemCostIndex, MovementFilter, NewCostLayer, NewMovement,
    NewPendingAllocation, PendingFilter,
};
use crate::error::{AppError, AppResult};

const LAYER_COLUMNS: &str = "id, sequence, item_id, location_id, bin_id, quantity_received, \
     quantity_remaining, unit_cost, received_at, source_order_id, vendor_id, manufacturer, \
     manufacturer_part_no, reference, created_at";

const MOVEMENT_COLUMNS: &str = "id, item_id, quantity, unit_cost, total_cost, from_location_id, \
     from_bin_id, to_location_id, to_bin_id, layer_id, work_order_id, order_id, order_line_id, \
     is_estimated, actual_cost_variance, reference, note, moved_at";

const PENDING_COLUMNS: &str = "id, item_id, location_id, work_order_id, order_id, order_line_id, \
     quantity, quantity_fulfilled, estimated_unit_cost, estimated_total_cost, \
     actual_cost_to_date, estimated_movement_id, status, notes, created_at, fulfilled_at, \
     updated_at";

// ============================================================================
// Row mapping
// ============================================================================

#[derive(Debug, FromRow)]
struct LayerRow {
    id: Uuid,
    sequence: i64,
    item_id: Uuid,
    location_id: Uuid,
    bin_id: Option<Uuid>,
    quantity_received: Decimal,
    quantity_remaining: Decimal,
    unit_cost: Decimal,
    received_at: DateTime<Utc>,
    source_order_id: Option<Uuid>,
    vendor_id: Option<Uuid>,
    manufacturer: Option<String>,
    manufacturer_part_no: Option<String>,
    reference: String,
    created_at: DateTime<Utc>,
}

impl From<LayerRow> for CostLayer {
    fn from(row: LayerRow) -> Self {
        Self {
            id: row.id,
            sequence: row.sequence,
            item_id: row.item_id,
            location_id: row.location_id,
            bin_id: row.bin_id,
            quantity_received: row.quantity_received,
            quantity_remaining: row.quantity_remaining,
            unit_cost: row.unit_cost,
            received_at: row.received_at,
            source_order_id: row.source_order_id,
            vendor_id: row.vendor_id,
            manufacturer: row.manufacturer,
            manufacturer_part_no: row.manufacturer_part_no,
            reference: row.reference,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    item_id: Uuid,
    quantity: Decimal,
    unit_cost: Decimal,
    total_cost: Decimal,
    from_location_id: Option<Uuid>,
    from_bin_id: Option<Uuid>,
    to_location_id: Option<Uuid>,
    to_bin_id: Option<Uuid>,
    layer_id: Option<Uuid>,
    work_order_id: Option<Uuid>,
    order_id: Option<Uuid>,
    order_line_id: Option<Uuid>,
    is_estimated: bool,
    actual_cost_variance: Option<Decimal>,
    reference: String,
    note: String,
    moved_at: DateTime<Utc>,
}

impl From<MovementRow> for InventoryMovement {
    fn from(row: MovementRow) -> Self {
        Self {
            id: row.id,
            item_id: row.item_id,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            total_cost: row.total_cost,
            from_location_id: row.from_location_id,
            from_bin_id: row.from_bin_id,
            to_location_id: row.to_location_id,
            to_bin_id: row.to_bin_id,
            layer_id: row.layer_id,
            work_order_id: row.work_order_id,
            order_id: row.order_id,
            order_line_id: row.order_line_id,
            is_estimated: row.is_estimated,
            actual_cost_variance: row.actual_cost_variance,
            reference: row.reference,
            note: row.note,
            moved_at: row.moved_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PendingRow {
    id: Uuid,
    item_id: Uuid,
    location_id: Uuid,
    work_order_id: Option<Uuid>,
    order_id: Option<Uuid>,
    order_line_id: Option<Uuid>,
    quantity: Decimal,
    quantity_fulfilled: Decimal,
    estimated_unit_cost: Decimal,
    estimated_total_cost: Decimal,
    actual_cost_to_date: Decimal,
    estimated_movement_id: Option<Uuid>,
    status: String,
    notes: String,
    created_at: DateTime<Utc>,
    fulfilled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PendingRow> for PendingAllocation {
    type Error = AppError;

    fn try_from(row: PendingRow) -> Result<Self, Self::Error> {
        let status: PendingStatus = row
            .status
            .parse()
            .map_err(|e| AppError::Internal(format!("pending allocation {}: {}", row.id, e)))?;

        Ok(Self {
            id: row.id,
            item_id: row.item_id,
            location_id: row.location_id,
            work_order_id: row.work_order_id,
            order_id: row.order_id,
            order_line_id: row.order_line_id,
            quantity: row.quantity,
            quantity_fulfilled: row.quantity_fulfilled,
            estimated_unit_cost: row.estimated_unit_cost,
            estimated_total_cost: row.estimated_total_cost,
            actual_cost_to_date: row.actual_cost_to_date,
            estimated_movement_id: row.estimated_movement_id,
            status,
            notes: row.notes,
            created_at: row.created_at,
            fulfilled_at: row.fulfilled_at,
            updated_at: row.updated_at,
        })
    }
}

fn pending_rows(rows: Vec<PendingRow>) -> AppResult<Vec<PendingAllocation>> {
    rows.into_iter().map(PendingAllocation::try_from).collect()
}

fn reference_table(kind: ReferenceKind) -> &'static str {
    match kind {
        ReferenceKind::Item => "items",
        ReferenceKind::Location => "locations",
        ReferenceKind::Bin => "bins",
        ReferenceKind::Vendor => "vendors",
        ReferenceKind::Order => "orders",
        ReferenceKind::OrderLine => "order_lines",
        ReferenceKind::WorkOrder => "work_orders",
    }
}

/// Lock waits, deadlocks and serialization failures roll the caller back
/// and are worth retrying.
fn map_db_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("55P03") => {
                return AppError::Conflict("Timed out waiting for a row lock".to_string())
            }
            Some("40P01") | Some("40001") => {
                return AppError::Conflict("Concurrent update detected".to_string())
            }
            _ => {}
        }
    }
    AppError::DatabaseError(err)
}

// ============================================================================
// Backend
// ============================================================================

/// Hands out [`PgStore`] transactions from the pool
#[derive(Clone)]
pub struct PgBackend {
    db: PgPool,
    lock_timeout_ms: u64,
}

impl PgBackend {
    pub fn new(db: PgPool, lock_timeout_ms: u64) -> Self {
        Self {
            db,
            lock_timeout_ms,
        }
    }
}

#[async_trait]
impl CostingBackend for PgBackend {
    type Tx = PgStore;

    async fn begin(&self) -> AppResult<PgStore> {
        let mut tx = self.db.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await?;

        Ok(PgStore { tx, savepoints: 0 })
    }

    async fn commit(&self, store: PgStore) -> AppResult<()> {
        store.tx.commit().await.map_err(map_db_error)
    }
}

/// One open transaction
pub struct PgStore {
    tx: Transaction<'static, Postgres>,
    savepoints: usize,
}

#[async_trait]
impl CostingStore for PgStore {
    async fn reference_exists(&mut self, kind: ReferenceKind, id: Uuid) -> AppResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
            reference_table(kind)
        );
        let exists = sqlx::query_scalar::<_, bool>(&sql)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(exists)
    }

    async fn bin_location(&mut self, bin_id: Uuid) -> AppResult<Option<Uuid>> {
        let location = sqlx::query_scalar::<_, Uuid>("SELECT location_id FROM bins WHERE id = $1")
            .bind(bin_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(location)
    }

    async fn lock_open_layers(&mut self, key: &StockKey) -> AppResult<Vec<CostLayer>> {
        let sql = format!(
            r#"
            SELECT {LAYER_COLUMNS}
            FROM cost_layers
            WHERE item_id = $1 AND location_id = $2
              AND ($3::uuid IS NULL OR bin_id = $3)
              AND quantity_remaining > 0
            ORDER BY received_at, sequence
            FOR UPDATE
            "#
        );
        let rows = sqlx::query_as::<_, LayerRow>(&sql)
            .bind(key.item_id)
            .bind(key.location_id)
            .bind(key.bin_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(rows.into_iter().map(CostLayer::from).collect())
    }

    async fn open_layers(&mut self, key: &StockKey) -> AppResult<Vec<CostLayer>> {
        let sql = format!(
            r#"
            SELECT {LAYER_COLUMNS}
            FROM cost_layers
            WHERE item_id = $1 AND location_id = $2
              AND ($3::uuid IS NULL OR bin_id = $3)
              AND quantity_remaining > 0
            ORDER BY received_at, sequence
            "#
        );
        let rows = sqlx::query_as::<_, LayerRow>(&sql)
            .bind(key.item_id)
            .bind(key.location_id)
            .bind(key.bin_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(rows.into_iter().map(CostLayer::from).collect())
    }

    async fn latest_unit_cost(
        &mut self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> AppResult<Option<Decimal>> {
        let cost = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT unit_cost
            FROM cost_layers
            WHERE item_id = $1 AND location_id = $2
            ORDER BY received_at DESC, sequence DESC
            LIMIT 1
            "#,
        )
        .bind(item_id)
        .bind(location_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(cost)
    }

    async fn replacement_cost(&mut self, item_id: Uuid) -> AppResult<Option<Decimal>> {
        let cost = sqlx::query_scalar::<_, Option<Decimal>>(
            "SELECT current_replacement_cost FROM items WHERE id = $1",
        )
        .bind(item_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(cost.flatten())
    }

    async fn insert_layer(&mut self, layer: NewCostLayer) -> AppResult<CostLayer> {
        let sql = format!(
            r#"
            INSERT INTO cost_layers (
                id, item_id, location_id, bin_id, quantity_received, quantity_remaining,
                unit_cost, received_at, source_order_id, vendor_id, manufacturer,
                manufacturer_part_no, reference
            )
            VALUES ($1, $2, $3, $4, $5, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {LAYER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, LayerRow>(&sql)
            .bind(layer.id)
            .bind(layer.item_id)
            .bind(layer.location_id)
            .bind(layer.bin_id)
            .bind(layer.quantity)
            .bind(layer.unit_cost)
            .bind(layer.received_at)
            .bind(layer.source_order_id)
            .bind(layer.vendor_id)
            .bind(&layer.manufacturer)
            .bind(&layer.manufacturer_part_no)
            .bind(&layer.reference)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(row.into())
    }

    async fn decrement_layer(&mut self, layer_id: Uuid, quantity: Decimal) -> AppResult<Decimal> {
        let remaining = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE cost_layers
            SET quantity_remaining = quantity_remaining - $2
            WHERE id = $1 AND quantity_remaining >= $2
            RETURNING quantity_remaining
            "#,
        )
        .bind(layer_id)
        .bind(quantity)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;

        remaining.ok_or_else(|| {
            AppError::Conflict(format!(
                "Cost layer {} no longer has {} remaining",
                layer_id,
                quantity.normalize()
            ))
        })
    }

    async fn insert_movement(&mut self, movement: NewMovement) -> AppResult<InventoryMovement> {
        let sql = format!(
            r#"
            INSERT INTO inventory_movements (
                id, item_id, quantity, unit_cost, total_cost, from_location_id, from_bin_id,
                to_location_id, to_bin_id, layer_id, work_order_id, order_id, order_line_id,
                is_estimated, reference, note, moved_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {MOVEMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(movement.id)
            .bind(movement.item_id)
            .bind(movement.quantity)
            .bind(movement.unit_cost)
            .bind(movement.total_cost)
            .bind(movement.from_location_id)
            .bind(movement.from_bin_id)
            .bind(movement.to_location_id)
            .bind(movement.to_bin_id)
            .bind(movement.layer_id)
            .bind(movement.work_order_id)
            .bind(movement.order_id)
            .bind(movement.order_line_id)
            .bind(movement.is_estimated)
            .bind(&movement.reference)
            .bind(&movement.note)
            .bind(movement.moved_at)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(row.into())
    }

    async fn get_movement(&mut self, id: Uuid) -> AppResult<Option<InventoryMovement>> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE id = $1");
        let row = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(InventoryMovement::from))
    }

    async fn find_estimated_movement(
        &mut self,
        item_id: Uuid,
        work_order_id: Option<Uuid>,
        order_id: Option<Uuid>,
        quantity: Decimal,
    ) -> AppResult<Option<InventoryMovement>> {
        let sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM inventory_movements
            WHERE item_id = $1
              AND is_estimated
              AND work_order_id IS NOT DISTINCT FROM $2
              AND order_id IS NOT DISTINCT FROM $3
              AND quantity = $4
            ORDER BY moved_at
            LIMIT 1
            FOR UPDATE
            "#
        );
        let row = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(item_id)
            .bind(work_order_id)
            .bind(order_id)
            .bind(quantity)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(InventoryMovement::from))
    }

    async fn settle_estimated_movement(
        &mut self,
        id: Uuid,
        settlement: &CostSettlement,
        note_suffix: &str,
    ) -> AppResult<InventoryMovement> {
        let sql = format!(
            r#"
            UPDATE inventory_movements
            SET unit_cost = $2,
                total_cost = $3,
                actual_cost_variance = $4,
                is_estimated = FALSE,
                note = note || $5
            WHERE id = $1 AND is_estimated
            RETURNING {MOVEMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(id)
            .bind(settlement.unit_cost)
            .bind(settlement.total_cost)
            .bind(settlement.variance)
            .bind(note_suffix)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        row.map(InventoryMovement::from).ok_or_else(|| {
            AppError::Conflict(format!("Movement {} is not an open estimate", id))
        })
    }

    async fn list_movements(&mut self, filter: &MovementFilter) -> AppResult<Vec<InventoryMovement>> {
        let sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM inventory_movements
            WHERE ($1::uuid IS NULL OR item_id = $1)
              AND ($2::uuid IS NULL OR from_location_id = $2 OR to_location_id = $2)
              AND ($3::uuid IS NULL OR work_order_id = $3)
              AND ($4::uuid IS NULL OR order_id = $4)
              AND ($5::boolean IS NULL OR is_estimated = $5)
            ORDER BY moved_at DESC, id DESC
            LIMIT $6
            "#
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(filter.item_id)
            .bind(filter.location_id)
            .bind(filter.work_order_id)
            .bind(filter.order_id)
            .bind(filter.estimated)
            .bind(filter.effective_limit())
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(rows.into_iter().map(InventoryMovement::from).collect())
    }

    async fn insert_pending(&mut self, pending: NewPendingAllocation) -> AppResult<PendingAllocation> {
        let sql = format!(
            r#"
            INSERT INTO pending_allocations (
                id, item_id, location_id, work_order_id, order_id, order_line_id, quantity,
                estimated_unit_cost, estimated_total_cost, estimated_movement_id, status, notes,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING {PENDING_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PendingRow>(&sql)
            .bind(pending.id)
            .bind(pending.item_id)
            .bind(pending.location_id)
            .bind(pending.work_order_id)
            .bind(pending.order_id)
            .bind(pending.order_line_id)
            .bind(pending.quantity)
            .bind(pending.estimated_unit_cost)
            .bind(pending.estimated_total_cost)
            .bind(pending.estimated_movement_id)
            .bind(PendingStatus::AwaitingReceipt.as_str())
            .bind(&pending.notes)
            .bind(pending.created_at)
            .fetch_one(&mut *self.tx)
            .await?;

        row.try_into()
    }

    async fn lock_pending(&mut self, id: Uuid) -> AppResult<Option<PendingAllocation>> {
        let sql = format!("SELECT {PENDING_COLUMNS} FROM pending_allocations WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, PendingRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        row.map(PendingAllocation::try_from).transpose()
    }

    async fn lock_open_pending(
        &mut self,
        item_id: Uuid,
        location_id: Uuid,
    ) -> AppResult<Vec<PendingAllocation>> {
        let sql = format!(
            r#"
            SELECT {PENDING_COLUMNS}
            FROM pending_allocations
            WHERE item_id = $1 AND location_id = $2
              AND status IN ('AWAITING_RECEIPT', 'PARTIALLY_FULFILLED')
            ORDER BY created_at, id
            FOR UPDATE
            "#
        );
        let rows = sqlx::query_as::<_, PendingRow>(&sql)
            .bind(item_id)
            .bind(location_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(map_db_error)?;

        pending_rows(rows)
    }

    async fn update_pending(&mut self, pending: &PendingAllocation) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pending_allocations
            SET quantity_fulfilled = $2,
                actual_cost_to_date = $3,
                status = $4,
                notes = $5,
                fulfilled_at = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(pending.id)
        .bind(pending.quantity_fulfilled)
        .bind(pending.actual_cost_to_date)
        .bind(pending.status.as_str())
        .bind(&pending.notes)
        .bind(pending.fulfilled_at)
        .bind(pending.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Pending allocation".to_string()));
        }

        Ok(())
    }

    async fn list_pending(&mut self, filter: &PendingFilter) -> AppResult<Vec<PendingAllocation>> {
        let sql = format!(
            r#"
            SELECT {PENDING_COLUMNS}
            FROM pending_allocations
            WHERE ($1::uuid IS NULL OR item_id = $1)
              AND ($2::uuid IS NULL OR location_id = $2)
              AND ($3::uuid IS NULL OR work_order_id = $3)
              AND ($4::uuid IS NULL OR order_id = $4)
              AND (($5::text IS NULL AND status <> 'FULFILLED') OR status = $5)
            ORDER BY created_at DESC, id DESC
            "#
        );
        let rows = sqlx::query_as::<_, PendingRow>(&sql)
            .bind(filter.item_id)
            .bind(filter.location_id)
            .bind(filter.work_order_id)
            .bind(filter.order_id)
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&mut *self.tx)
            .await?;

        pending_rows(rows)
    }

    async fn savepoint(&mut self) -> AppResult<()> {
        self.savepoints += 1;
        let sql = format!("SAVEPOINT sp_{}", self.savepoints);
        sqlx::query(&sql).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> AppResult<()> {
        if self.savepoints == 0 {
            return Err(AppError::Internal("No savepoint to roll back to".to_string()));
        }
        let rollback = format!("ROLLBACK TO SAVEPOINT sp_{}", self.savepoints);
        sqlx::query(&rollback).execute(&mut *self.tx).await?;
        let release = format!("RELEASE SAVEPOINT sp_{}", self.savepoints);
        sqlx::query(&release).execute(&mut *self.tx).await?;
        self.savepoints -= 1;
        Ok(())
    }

    async fn release_savepoint(&mut self) -> AppResult<()> {
        if self.savepoints == 0 {
            return Err(AppError::Internal("No savepoint to release".to_string()));
        }
        let sql = format!("RELEASE SAVEPOINT sp_{}", self.savepoints);
        sqlx::query(&sql).execute(&mut *self.tx).await?;
        self.savepoints -= 1;
        Ok(())
    }
}

// ============================================================================
// Item master
// ============================================================================

/// Writes the replacement cost kept on the `items` table
#[derive(Clone)]
pub struct PgItemCostIndex {
    db: PgPool,
}

impl PgItemCostIndex {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ItemCostIndex for PgItemCostIndex {
    async fn record_receipt_cost(&self, item_id: Uuid, unit_cost: Decimal) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE items
            SET current_replacement_cost = $2, replacement_cost_updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .bind(unit_cost)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
