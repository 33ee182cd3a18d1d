//! Warehouses and their stock

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use shared::{PaginatedResponse, Pagination, Warehouse, WarehouseMaterial, WarehouseType};

use crate::error::{AppError, AppResult};

#[derive(Debug, FromRow)]
struct WarehouseRow {
    id: Uuid,
    code: String,
    name: String,
    warehouse_type: String,
    location: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WarehouseRow> for Warehouse {
    type Error = AppError;

    fn try_from(row: WarehouseRow) -> AppResult<Self> {
        Ok(Warehouse {
            id: row.id,
            code: row.code,
            name: row.name,
            warehouse_type: row.warehouse_type.parse()?,
            location: row.location,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StockRow {
    id: Uuid,
    warehouse_id: Uuid,
    raw_material_id: Uuid,
    quantity: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<StockRow> for WarehouseMaterial {
    fn from(row: StockRow) -> Self {
        WarehouseMaterial {
            id: row.id,
            warehouse_id: row.warehouse_id,
            raw_material_id: row.raw_material_id,
            quantity: row.quantity,
            updated_at: row.updated_at,
        }
    }
}

const COLUMNS: &str =
    "id, code, name, warehouse_type, location, is_active, created_at, updated_at";

fn catalog_code(code: &str) -> Result<(), ValidationError> {
    shared::validate_catalog_code(code).map_err(|msg| {
        let mut err = ValidationError::new("code");
        err.message = Some(msg.into());
        err
    })
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWarehouseInput {
    #[validate(custom = "catalog_code")]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    pub warehouse_type: WarehouseType,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWarehouseInput {
    #[validate(length(min = 1, max = 255, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub location: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseFilter {
    pub warehouse_type: Option<WarehouseType>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockFilter {
    pub warehouse_id: Option<Uuid>,
    pub raw_material_id: Option<Uuid>,
    /// Hide lines that were drawn down to zero
    #[serde(default)]
    pub in_stock: bool,
}

/// Warehouse service
#[derive(Clone)]
pub struct WarehouseService {
    db: PgPool,
}

impl WarehouseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_warehouses(
        &self,
        filter: WarehouseFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Warehouse>> {
        let warehouse_type = filter.warehouse_type.map(|t| t.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM warehouses
            WHERE ($1::text IS NULL OR warehouse_type = $1)
              AND ($2::bool IS NULL OR is_active = $2)
            "#,
        )
        .bind(warehouse_type)
        .bind(filter.is_active)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, WarehouseRow>(&format!(
            r#"
            SELECT {} FROM warehouses
            WHERE ($1::text IS NULL OR warehouse_type = $1)
              AND ($2::bool IS NULL OR is_active = $2)
            ORDER BY code
            LIMIT $3 OFFSET $4
            "#,
            COLUMNS
        ))
        .bind(warehouse_type)
        .bind(filter.is_active)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let warehouses = rows
            .into_iter()
            .map(Warehouse::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(warehouses, pagination, total as u64))
    }

    pub async fn get_warehouse(&self, id: Uuid) -> AppResult<Warehouse> {
        let mut conn = self.db.acquire().await?;
        load_warehouse(&mut conn, id).await
    }

    pub async fn create_warehouse(&self, input: CreateWarehouseInput) -> AppResult<Warehouse> {
        let row = sqlx::query_as::<_, WarehouseRow>(&format!(
            r#"
            INSERT INTO warehouses (code, name, warehouse_type, location)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(&input.code)
        .bind(input.name.trim())
        .bind(input.warehouse_type.as_str())
        .bind(&input.location)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(warehouse_id = %row.id, code = %row.code, "warehouse created");
        row.try_into()
    }

    pub async fn update_warehouse(
        &self,
        id: Uuid,
        input: UpdateWarehouseInput,
    ) -> AppResult<Warehouse> {
        let row = sqlx::query_as::<_, WarehouseRow>(&format!(
            r#"
            UPDATE warehouses
            SET name = COALESCE($2, name),
                location = COALESCE($3, location),
                is_active = COALESCE($4, is_active)
            WHERE id = $1
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.location)
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Warehouse"))?;

        row.try_into()
    }

    /// Stock on hand, per warehouse and material
    pub async fn list_materials(
        &self,
        filter: StockFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<WarehouseMaterial>> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM warehouse_materials
            WHERE ($1::uuid IS NULL OR warehouse_id = $1)
              AND ($2::uuid IS NULL OR raw_material_id = $2)
              AND (NOT $3 OR quantity > 0)
            "#,
        )
        .bind(filter.warehouse_id)
        .bind(filter.raw_material_id)
        .bind(filter.in_stock)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, StockRow>(
            r#"
            SELECT id, warehouse_id, raw_material_id, quantity, updated_at
            FROM warehouse_materials
            WHERE ($1::uuid IS NULL OR warehouse_id = $1)
              AND ($2::uuid IS NULL OR raw_material_id = $2)
              AND (NOT $3 OR quantity > 0)
            ORDER BY warehouse_id, raw_material_id
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.warehouse_id)
        .bind(filter.raw_material_id)
        .bind(filter.in_stock)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(
            rows.into_iter().map(Into::into).collect(),
            pagination,
            total as u64,
        ))
    }
}

pub(crate) async fn load_warehouse(conn: &mut PgConnection, id: Uuid) -> AppResult<Warehouse> {
    sqlx::query_as::<_, WarehouseRow>(&format!(
        "SELECT {} FROM warehouses WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Warehouse"))?
    .try_into()
}

/// Load an active warehouse of the expected type
pub(crate) async fn require_warehouse(
    conn: &mut PgConnection,
    id: Uuid,
    expected: WarehouseType,
) -> AppResult<Warehouse> {
    let warehouse = load_warehouse(conn, id).await?;
    if !warehouse.is_active {
        return Err(AppError::validation(
            "warehouseId",
            format!("Warehouse {} is inactive", warehouse.code),
        ));
    }
    if warehouse.warehouse_type != expected {
        return Err(AppError::validation(
            "warehouseId",
            format!("Warehouse {} is not a {} warehouse", warehouse.code, expected),
        ));
    }
    Ok(warehouse)
}
