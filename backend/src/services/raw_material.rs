//! Raw material catalog

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use shared::{PaginatedResponse, Pagination, RawMaterial};

use crate::error::{AppError, AppResult};

#[derive(Debug, FromRow)]
struct RawMaterialRow {
    id: Uuid,
    code: String,
    name: String,
    unit: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RawMaterialRow> for RawMaterial {
    fn from(row: RawMaterialRow) -> Self {
        RawMaterial {
            id: row.id,
            code: row.code,
            name: row.name,
            unit: row.unit,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn catalog_code(code: &str) -> Result<(), ValidationError> {
    shared::validate_catalog_code(code).map_err(|msg| {
        let mut err = ValidationError::new("code");
        err.message = Some(msg.into());
        err
    })
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRawMaterialInput {
    #[validate(custom = "catalog_code")]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 32, message = "Unit is required"))]
    pub unit: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRawMaterialInput {
    #[validate(length(min = 1, max = 255, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 32, message = "Unit cannot be empty"))]
    pub unit: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMaterialFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

const COLUMNS: &str = "id, code, name, unit, description, is_active, created_at, updated_at";

/// Raw material service
#[derive(Clone)]
pub struct RawMaterialService {
    db: PgPool,
}

impl RawMaterialService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        filter: RawMaterialFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<RawMaterial>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM raw_materials
            WHERE ($1::text IS NULL OR code ILIKE $1 OR name ILIKE $1)
              AND ($2::bool IS NULL OR is_active = $2)
            "#,
        )
        .bind(&search)
        .bind(filter.is_active)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, RawMaterialRow>(&format!(
            r#"
            SELECT {} FROM raw_materials
            WHERE ($1::text IS NULL OR code ILIKE $1 OR name ILIKE $1)
              AND ($2::bool IS NULL OR is_active = $2)
            ORDER BY code
            LIMIT $3 OFFSET $4
            "#,
            COLUMNS
        ))
        .bind(&search)
        .bind(filter.is_active)
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

    pub async fn get(&self, id: Uuid) -> AppResult<RawMaterial> {
        sqlx::query_as::<_, RawMaterialRow>(&format!(
            "SELECT {} FROM raw_materials WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(Into::into)
        .ok_or_else(|| AppError::not_found("Raw material"))
    }

    pub async fn create(&self, input: CreateRawMaterialInput) -> AppResult<RawMaterial> {
        let row = sqlx::query_as::<_, RawMaterialRow>(&format!(
            r#"
            INSERT INTO raw_materials (code, name, unit, description)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(&input.code)
        .bind(input.name.trim())
        .bind(input.unit.trim())
        .bind(&input.description)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(raw_material_id = %row.id, code = %row.code, "raw material created");
        Ok(row.into())
    }

    pub async fn update(&self, id: Uuid, input: UpdateRawMaterialInput) -> AppResult<RawMaterial> {
        let row = sqlx::query_as::<_, RawMaterialRow>(&format!(
            r#"
            UPDATE raw_materials
            SET name = COALESCE($2, name),
                unit = COALESCE($3, unit),
                description = COALESCE($4, description),
                is_active = COALESCE($5, is_active)
            WHERE id = $1
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.unit)
        .bind(&input.description)
        .bind(input.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("Raw material"))?;

        Ok(row.into())
    }
}
