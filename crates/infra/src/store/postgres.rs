//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `Domain(Conflict)` |
//! | Database (foreign key violation) | `23503` | `Domain(NotFound)` |
//! | anything else | | `Backend` |
//!
//! ## Locking
//!
//! `commit` runs in one transaction: products are locked with
//! `SELECT ... FOR UPDATE` in id order (so concurrent units cannot deadlock),
//! and the requisition row is updated with `WHERE version = $expected`.
//! Returning early drops the transaction, which rolls it back.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};
use tracing::instrument;
use uuid::Uuid;

use equiplend_core::{AggregateRoot, DomainError, ExpectedVersion, ProductId, RequisitionId, UserId};
use equiplend_inventory::Product;
use equiplend_requisitions::{Requisition, RequisitionItem, RequisitionNumber, RequisitionStatus};

use super::{
    CommitReceipt, LendingStore, RequisitionFilter, RequisitionWrite, StoreError, UnitOfWork,
    stage_product_changes,
};

#[derive(Debug, Clone)]
pub struct PostgresLendingStore {
    pool: PgPool,
}

impl PostgresLendingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool and apply pending migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    stock: i64,
    min_stock: i64,
    active: bool,
    version: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product::restore(
            ProductId::from_uuid(row.id),
            row.name,
            row.stock,
            row.min_stock,
            row.active,
            row.version as u64,
        )
    }
}

#[derive(Debug, FromRow)]
struct RequisitionRow {
    id: Uuid,
    number: String,
    requester_id: Uuid,
    status: String,
    purpose: String,
    notes: Option<String>,
    admin_note: Option<String>,
    rejection_reason: Option<String>,
    requested_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    approved_by: Option<Uuid>,
    rejected_at: Option<DateTime<Utc>>,
    rejected_by: Option<Uuid>,
    issued_at: Option<DateTime<Utc>>,
    issued_by: Option<Uuid>,
    completed_at: Option<DateTime<Utc>>,
    completed_by: Option<Uuid>,
    cancelled_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    version: i64,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    requisition_id: Uuid,
    line_no: i32,
    product_id: Uuid,
    quantity: i64,
    issued_quantity: i64,
}

impl RequisitionRow {
    fn into_requisition(self, items: Vec<RequisitionItem>) -> Result<Requisition, StoreError> {
        let corrupt = |what: &str, e: DomainError| {
            StoreError::Backend(format!("corrupt requisition row {}: {what}: {e}", self.id))
        };
        let number = RequisitionNumber::parse(&self.number).map_err(|e| corrupt("number", e))?;
        let status: RequisitionStatus = self.status.parse().map_err(|e| corrupt("status", e))?;
        let user = |id: Option<Uuid>| id.map(UserId::from_uuid);

        Ok(Requisition {
            id: RequisitionId::from_uuid(self.id),
            number,
            requester_id: UserId::from_uuid(self.requester_id),
            status,
            purpose: self.purpose,
            notes: self.notes,
            admin_note: self.admin_note,
            rejection_reason: self.rejection_reason,
            items,
            requested_at: self.requested_at,
            approved_at: self.approved_at,
            approved_by: user(self.approved_by),
            rejected_at: self.rejected_at,
            rejected_by: user(self.rejected_by),
            issued_at: self.issued_at,
            issued_by: user(self.issued_by),
            completed_at: self.completed_at,
            completed_by: user(self.completed_by),
            cancelled_at: self.cancelled_at,
            deleted_at: self.deleted_at,
            updated_at: self.updated_at,
            version: self.version as u64,
        })
    }
}

const PRODUCT_COLUMNS: &str = "id, name, stock, min_stock, active, version";

const REQUISITION_COLUMNS: &str = "id, number, requester_id, status, purpose, notes, admin_note, \
     rejection_reason, requested_at, approved_at, approved_by, rejected_at, rejected_by, \
     issued_at, issued_by, completed_at, completed_by, cancelled_at, deleted_at, updated_at, version";

async fn load_items<'e>(
    executor: impl PgExecutor<'e>,
    requisition_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<RequisitionItem>>, StoreError> {
    let rows: Vec<ItemRow> = sqlx::query_as(
        r#"
        SELECT requisition_id, line_no, product_id, quantity, issued_quantity
        FROM requisition_items
        WHERE requisition_id = ANY($1)
        ORDER BY requisition_id, line_no
        "#,
    )
    .bind(requisition_ids)
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("load_items", e))?;

    let mut by_requisition: HashMap<Uuid, Vec<RequisitionItem>> = HashMap::new();
    for row in rows {
        by_requisition
            .entry(row.requisition_id)
            .or_default()
            .push(RequisitionItem {
                line_no: row.line_no as u32,
                product_id: ProductId::from_uuid(row.product_id),
                quantity: row.quantity,
                issued_quantity: row.issued_quantity,
            });
    }
    Ok(by_requisition)
}

async fn write_product(conn: &mut PgConnection, product: &Product) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE products
        SET stock = $2, active = $3, status = $4, version = $5, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(product.id().as_uuid())
    .bind(product.stock())
    .bind(product.is_active())
    .bind(product.status().as_str())
    .bind(product.version() as i64)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("write_product", e))?;
    Ok(())
}

async fn write_requisition(conn: &mut PgConnection, write: &RequisitionWrite) -> Result<(), StoreError> {
    let r = &write.state;
    let expected = match write.expected_version {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    };

    let updated = sqlx::query(
        r#"
        UPDATE requisitions
        SET status = $3, admin_note = $4, rejection_reason = $5,
            approved_at = $6, approved_by = $7, rejected_at = $8, rejected_by = $9,
            issued_at = $10, issued_by = $11, completed_at = $12, completed_by = $13,
            cancelled_at = $14, deleted_at = $15, updated_at = $16, version = $17
        WHERE id = $1 AND ($2::BIGINT IS NULL OR version = $2)
        "#,
    )
    .bind(r.id.as_uuid())
    .bind(expected)
    .bind(r.status.as_str())
    .bind(&r.admin_note)
    .bind(&r.rejection_reason)
    .bind(r.approved_at)
    .bind(r.approved_by.map(Uuid::from))
    .bind(r.rejected_at)
    .bind(r.rejected_by.map(Uuid::from))
    .bind(r.issued_at)
    .bind(r.issued_by.map(Uuid::from))
    .bind(r.completed_at)
    .bind(r.completed_by.map(Uuid::from))
    .bind(r.cancelled_at)
    .bind(r.deleted_at)
    .bind(r.updated_at)
    .bind(r.version as i64)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("write_requisition", e))?;

    if updated.rows_affected() == 0 {
        return Err(DomainError::conflict(format!(
            "requisition {} was modified concurrently (expected {:?})",
            r.id, write.expected_version
        ))
        .into());
    }

    for item in &r.items {
        sqlx::query(
            "UPDATE requisition_items SET issued_quantity = $3 WHERE requisition_id = $1 AND line_no = $2",
        )
        .bind(r.id.as_uuid())
        .bind(item.line_no as i32)
        .bind(item.issued_quantity)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("write_requisition_items", e))?;
    }
    Ok(())
}

#[async_trait]
impl LendingStore for PostgresLendingStore {
    #[instrument(skip(self, product), fields(product_id = %product.id()), err)]
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, stock, min_stock, active, status, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product.id().as_uuid())
        .bind(product.name())
        .bind(product.stock())
        .bind(product.min_stock())
        .bind(product.is_active())
        .bind(product.status().as_str())
        .bind(product.version() as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_product", e))?;
        Ok(row.map(Product::from))
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, StoreError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows: Vec<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"))
                .bind(&uuids)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("get_products", e))?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows: Vec<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name, id"))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("list_products", e))?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn next_requisition_number(&self, day: NaiveDate) -> Result<RequisitionNumber, StoreError> {
        let seq: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO requisition_sequences (day, last_value)
            VALUES ($1, 1)
            ON CONFLICT (day) DO UPDATE SET last_value = requisition_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("next_requisition_number", e))?;

        Ok(RequisitionNumber::new(day, seq as u32))
    }

    #[instrument(skip(self, requisition), fields(requisition_id = %requisition.id, number = %requisition.number), err)]
    async fn insert_requisition(&self, requisition: &Requisition) -> Result<(), StoreError> {
        let r = requisition;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(&format!(
            "INSERT INTO requisitions ({REQUISITION_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
        ))
        .bind(r.id.as_uuid())
        .bind(r.number.as_str())
        .bind(r.requester_id.as_uuid())
        .bind(r.status.as_str())
        .bind(&r.purpose)
        .bind(&r.notes)
        .bind(&r.admin_note)
        .bind(&r.rejection_reason)
        .bind(r.requested_at)
        .bind(r.approved_at)
        .bind(r.approved_by.map(Uuid::from))
        .bind(r.rejected_at)
        .bind(r.rejected_by.map(Uuid::from))
        .bind(r.issued_at)
        .bind(r.issued_by.map(Uuid::from))
        .bind(r.completed_at)
        .bind(r.completed_by.map(Uuid::from))
        .bind(r.cancelled_at)
        .bind(r.deleted_at)
        .bind(r.updated_at)
        .bind(r.version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_requisition", e))?;

        for item in &r.items {
            sqlx::query(
                r#"
                INSERT INTO requisition_items (requisition_id, line_no, product_id, quantity, issued_quantity)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(r.id.as_uuid())
            .bind(item.line_no as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(item.issued_quantity)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_requisition_item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn get_requisition(&self, id: RequisitionId) -> Result<Option<Requisition>, StoreError> {
        let row: Option<RequisitionRow> = sqlx::query_as(&format!(
            "SELECT {REQUISITION_COLUMNS} FROM requisitions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_requisition", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut items = load_items(&self.pool, &[row.id]).await?;
        let items = items.remove(&row.id).unwrap_or_default();
        row.into_requisition(items).map(Some)
    }

    async fn list_requisitions(&self, filter: &RequisitionFilter) -> Result<Vec<Requisition>, StoreError> {
        let rows: Vec<RequisitionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {REQUISITION_COLUMNS}
            FROM requisitions
            WHERE ($1::UUID IS NULL OR requester_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3 OR deleted_at IS NULL)
            ORDER BY requested_at DESC, id DESC
            "#
        ))
        .bind(filter.requester_id.map(Uuid::from))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.include_deleted)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_requisitions", e))?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = load_items(&self.pool, &ids).await?;

        rows.into_iter()
            .map(|row| {
                let row_items = items.remove(&row.id).unwrap_or_default();
                row.into_requisition(row_items)
            })
            .collect()
    }

    #[instrument(
        skip(self, unit),
        fields(
            product_changes = unit.product_changes.len(),
            requisition_id = ?unit.requisition.as_ref().map(|w| w.state.id)
        ),
        err
    )]
    async fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let ids: Vec<Uuid> = unit.product_ids().iter().map(|id| *id.as_uuid()).collect();
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_products", e))?;

        let mut staged: HashMap<ProductId, Product> = rows
            .into_iter()
            .map(|row| (ProductId::from_uuid(row.id), Product::from(row)))
            .collect();
        let receipt = stage_product_changes(&mut staged, &unit)?;

        for product in &receipt.products {
            write_product(&mut *tx, product).await?;
        }
        if let Some(write) = &unit.requisition {
            write_requisition(&mut *tx, write).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(receipt)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => DomainError::conflict(msg).into(),
                Some("23503") => DomainError::not_found(format!("referenced row ({msg})")).into(),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
