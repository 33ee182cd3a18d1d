//! Warehouse import and export forms
//!
//! A form moves stock only when it is completed. Completing a main-warehouse
//! import that came from a delivery stage also records the received
//! quantities and pushes progress up to tasks, plans and the order.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    apply_stock_movement, document_prefix, validate_positive_quantity, DeliveryStatus,
    LedgerError, PaginatedResponse, Pagination, WarehouseForm, WarehouseFormMaterial,
    WarehouseFormStatus, WarehouseFormType, WarehouseType,
};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::delivery_stage::{lock_stage_with_order, set_stage_status};
use crate::services::document_code::next_document_code;
use crate::services::purchasing_order::refresh_order_status;
use crate::services::purchasing_plan::refresh_task_progress;
use crate::services::warehouse::{load_warehouse, require_warehouse};

#[derive(Debug, FromRow)]
struct FormRow {
    id: Uuid,
    code: String,
    form_type: String,
    warehouse_id: Uuid,
    delivery_stage_id: Option<Uuid>,
    temp_warehouse_request_id: Option<Uuid>,
    status: String,
    note: Option<String>,
    created_by: Uuid,
    processed_by: Option<Uuid>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FormRow {
    fn into_form(self, materials: Vec<WarehouseFormMaterial>) -> AppResult<WarehouseForm> {
        Ok(WarehouseForm {
            id: self.id,
            code: self.code,
            form_type: self.form_type.parse()?,
            warehouse_id: self.warehouse_id,
            delivery_stage_id: self.delivery_stage_id,
            temp_warehouse_request_id: self.temp_warehouse_request_id,
            status: self.status.parse()?,
            note: self.note,
            materials,
            created_by: self.created_by,
            processed_by: self.processed_by,
            processed_at: self.processed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct FormMaterialRow {
    id: Uuid,
    raw_material_id: Uuid,
    purchase_material_id: Option<Uuid>,
    quantity: Decimal,
    unit: String,
}

impl From<FormMaterialRow> for WarehouseFormMaterial {
    fn from(row: FormMaterialRow) -> Self {
        WarehouseFormMaterial {
            id: row.id,
            raw_material_id: row.raw_material_id,
            purchase_material_id: row.purchase_material_id,
            quantity: row.quantity,
            unit: row.unit,
        }
    }
}

const COLUMNS: &str = "id, code, form_type, warehouse_id, delivery_stage_id, \
     temp_warehouse_request_id, status, note, created_by, processed_by, processed_at, \
     created_at, updated_at";

/// One line of a form about to be inserted
#[derive(Debug, Clone)]
pub(crate) struct NewFormLine {
    pub raw_material_id: Uuid,
    pub purchase_material_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit: String,
}

/// Where a generated form comes from
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FormSource {
    pub delivery_stage_id: Option<Uuid>,
    pub temp_warehouse_request_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFilter {
    pub form_type: Option<WarehouseFormType>,
    pub status: Option<WarehouseFormStatus>,
    pub warehouse_id: Option<Uuid>,
    pub delivery_stage_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormMaterialInput {
    pub raw_material_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormInput {
    pub form_type: WarehouseFormType,
    pub warehouse_id: Uuid,
    #[validate(length(max = 2000, message = "Note is too long"))]
    pub note: Option<String>,
    #[validate(length(min = 1, message = "At least one material is required"))]
    pub materials: Vec<FormMaterialInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FromStageInput {
    pub delivery_stage_id: Uuid,
    /// Main warehouse receiving the passed goods
    pub warehouse_id: Uuid,
    pub note: Option<String>,
}

/// Flat row of the CSV export
#[derive(Debug, Serialize)]
struct FormCsvLine {
    form_code: String,
    form_type: String,
    status: String,
    warehouse_code: String,
    material_code: String,
    material_name: String,
    quantity: Decimal,
    unit: String,
}

/// Stock after one line, reporting an overdraw as insufficient stock
fn next_stock(
    current: Decimal,
    form_type: WarehouseFormType,
    quantity: Decimal,
) -> AppResult<Decimal> {
    apply_stock_movement(current, form_type, quantity).map_err(|err| match err {
        LedgerError::Exceeds { .. } => AppError::InsufficientStock(err.to_string()),
        other => other.into(),
    })
}

fn check_manual_lines(materials: &[FormMaterialInput]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for line in materials {
        if !seen.insert(line.raw_material_id) {
            return Err(LedgerError::DuplicateMaterial(line.raw_material_id).into());
        }
        validate_positive_quantity(line.quantity)
            .map_err(|msg| AppError::validation("quantity", msg))?;
    }
    Ok(())
}

/// Warehouse form service
#[derive(Clone)]
pub struct WarehouseFormService {
    db: PgPool,
}

impl WarehouseFormService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_forms(
        &self,
        filter: FormFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<WarehouseForm>> {
        let form_type = filter.form_type.map(|t| t.as_str());
        let status = filter.status.map(|s| s.as_str());
        let where_clause = r#"
            WHERE ($1::text IS NULL OR form_type = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR warehouse_id = $3)
              AND ($4::uuid IS NULL OR delivery_stage_id = $4)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM warehouse_forms {}",
            where_clause
        ))
        .bind(form_type)
        .bind(status)
        .bind(filter.warehouse_id)
        .bind(filter.delivery_stage_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, FormRow>(&format!(
            "SELECT {} FROM warehouse_forms {} ORDER BY created_at DESC LIMIT $5 OFFSET $6",
            COLUMNS, where_clause
        ))
        .bind(form_type)
        .bind(status)
        .bind(filter.warehouse_id)
        .bind(filter.delivery_stage_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let mut forms = Vec::with_capacity(rows.len());
        for row in rows {
            let materials = load_form_materials(&mut conn, row.id).await?;
            forms.push(row.into_form(materials)?);
        }

        Ok(PaginatedResponse::new(forms, pagination, total as u64))
    }

    pub async fn get_form(&self, id: Uuid) -> AppResult<WarehouseForm> {
        let mut conn = self.db.acquire().await?;
        load_form(&mut conn, id).await
    }

    /// Manual stock adjustment, not tied to a delivery
    pub async fn create_form(
        &self,
        actor: &AuthUser,
        input: CreateFormInput,
    ) -> AppResult<WarehouseForm> {
        check_manual_lines(&input.materials)?;

        let mut tx = self.db.begin().await?;

        let warehouse = load_warehouse(&mut tx, input.warehouse_id).await?;
        if !warehouse.is_active {
            return Err(AppError::validation(
                "warehouseId",
                format!("Warehouse {} is inactive", warehouse.code),
            ));
        }

        let mut lines = Vec::with_capacity(input.materials.len());
        for material in &input.materials {
            let unit = sqlx::query_scalar::<_, String>(
                "SELECT unit FROM raw_materials WHERE id = $1 AND is_active",
            )
            .bind(material.raw_material_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Raw material"))?;
            lines.push(NewFormLine {
                raw_material_id: material.raw_material_id,
                purchase_material_id: None,
                quantity: material.quantity,
                unit,
            });
        }

        let id = insert_form(
            &mut tx,
            input.form_type,
            warehouse.id,
            FormSource::default(),
            input.note.as_deref(),
            actor.user_id,
            &lines,
        )
        .await?;

        let form = load_form(&mut tx, id).await?;
        tx.commit().await?;
        Ok(form)
    }

    /// Generate the forms that move an inspected stage into a main warehouse:
    /// an export out of the temporary warehouse when the goods were stored
    /// there, and an import of the passed quantities.
    pub async fn create_forms_from_stage(
        &self,
        actor: &AuthUser,
        input: FromStageInput,
    ) -> AppResult<Vec<WarehouseForm>> {
        let mut tx = self.db.begin().await?;

        let (_, stage) = lock_stage_with_order(&mut tx, input.delivery_stage_id).await?;
        if stage.delivery_status != DeliveryStatus::Inspected {
            return Err(AppError::InvalidStateTransition(format!(
                "Only an inspected stage can be imported, this one is {}",
                stage.delivery_status
            )));
        }

        let open_import = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM warehouse_forms
                WHERE delivery_stage_id = $1 AND form_type = 'IMPORT'
                  AND temp_warehouse_request_id IS NULL AND status <> 'CANCELLED'
            )
            "#,
        )
        .bind(stage.id)
        .fetch_one(&mut *tx)
        .await?;
        if open_import {
            return Err(AppError::Conflict {
                resource: "warehouse form".into(),
                message: "An import form already exists for this stage".into(),
            });
        }

        let warehouse = require_warehouse(&mut tx, input.warehouse_id, WarehouseType::Main).await?;

        let import_lines: Vec<NewFormLine> = stage
            .purchase_materials
            .iter()
            .filter_map(|m| {
                m.after_inspect_quantity
                    .filter(|q| *q > Decimal::ZERO)
                    .map(|quantity| NewFormLine {
                        raw_material_id: m.raw_material_id,
                        purchase_material_id: Some(m.id),
                        quantity,
                        unit: m.unit.clone(),
                    })
            })
            .collect();
        if import_lines.is_empty() {
            return Err(AppError::validation(
                "deliveryStageId",
                "Nothing on this stage passed inspection",
            ));
        }

        let mut form_ids = Vec::with_capacity(2);

        // Goods parked in a temporary warehouse leave it first
        let stored = sqlx::query_as::<_, (Uuid, Uuid, Uuid)>(
            r#"
            SELECT t.id, t.warehouse_id, f.id
            FROM temp_warehouse_requests t
            JOIN warehouse_forms f ON f.id = t.warehouse_form_id
            WHERE t.delivery_stage_id = $1 AND t.approve_status = 'APPROVED'
              AND f.status = 'COMPLETED'
            "#,
        )
        .bind(stage.id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((request_id, temp_warehouse_id, temp_import_id)) = stored {
            let export_lines: Vec<NewFormLine> = load_form_materials(&mut tx, temp_import_id)
                .await?
                .into_iter()
                .map(|m| NewFormLine {
                    raw_material_id: m.raw_material_id,
                    purchase_material_id: m.purchase_material_id,
                    quantity: m.quantity,
                    unit: m.unit,
                })
                .collect();
            let export_id = insert_form(
                &mut tx,
                WarehouseFormType::Export,
                temp_warehouse_id,
                FormSource {
                    delivery_stage_id: Some(stage.id),
                    temp_warehouse_request_id: Some(request_id),
                },
                input.note.as_deref(),
                actor.user_id,
                &export_lines,
            )
            .await?;
            form_ids.push(export_id);
        }

        let import_id = insert_form(
            &mut tx,
            WarehouseFormType::Import,
            warehouse.id,
            FormSource {
                delivery_stage_id: Some(stage.id),
                temp_warehouse_request_id: None,
            },
            input.note.as_deref(),
            actor.user_id,
            &import_lines,
        )
        .await?;
        form_ids.push(import_id);

        let mut forms = Vec::with_capacity(form_ids.len());
        for id in form_ids {
            forms.push(load_form(&mut tx, id).await?);
        }
        tx.commit().await?;

        tracing::info!(stage_id = %stage.id, forms = forms.len(), "warehouse forms generated from stage");
        Ok(forms)
    }

    /// Apply a pending form to stock
    pub async fn complete_form(&self, actor: &AuthUser, id: Uuid) -> AppResult<WarehouseForm> {
        let mut tx = self.db.begin().await?;

        let form = lock_form(&mut tx, id).await?;
        let next = form.status.transition(WarehouseFormStatus::Completed)?;
        let warehouse = load_warehouse(&mut tx, form.warehouse_id).await?;

        for line in &form.materials {
            let current = sqlx::query_scalar::<_, Decimal>(
                r#"
                SELECT quantity FROM warehouse_materials
                WHERE warehouse_id = $1 AND raw_material_id = $2
                FOR UPDATE
                "#,
            )
            .bind(form.warehouse_id)
            .bind(line.raw_material_id)
            .fetch_optional(&mut *tx)
            .await?
            .unwrap_or(Decimal::ZERO);

            let updated = next_stock(current, form.form_type, line.quantity)?;

            sqlx::query(
                r#"
                INSERT INTO warehouse_materials (warehouse_id, raw_material_id, quantity)
                VALUES ($1, $2, $3)
                ON CONFLICT (warehouse_id, raw_material_id)
                DO UPDATE SET quantity = EXCLUDED.quantity
                "#,
            )
            .bind(form.warehouse_id)
            .bind(line.raw_material_id)
            .bind(updated)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE warehouse_forms
            SET status = $2, processed_by = $3, processed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(actor.user_id)
        .execute(&mut *tx)
        .await?;

        let receives_stage = form.form_type == WarehouseFormType::Import
            && warehouse.warehouse_type == WarehouseType::Main
            && form.temp_warehouse_request_id.is_none();
        if let (true, Some(stage_id)) = (receives_stage, form.delivery_stage_id) {
            receive_stage(&mut tx, stage_id, &form.materials).await?;
        }

        let form = load_form(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            warehouse_form_id = %id,
            code = %form.code,
            form_type = %form.form_type,
            from = %WarehouseFormStatus::Pending,
            to = %next,
            "warehouse form completed"
        );
        Ok(form)
    }

    pub async fn cancel_form(&self, id: Uuid) -> AppResult<WarehouseForm> {
        let mut tx = self.db.begin().await?;

        let form = lock_form(&mut tx, id).await?;
        let next = form.status.transition(WarehouseFormStatus::Cancelled)?;

        sqlx::query("UPDATE warehouse_forms SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(next.as_str())
            .execute(&mut *tx)
            .await?;

        let form = load_form(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(warehouse_form_id = %id, from = %WarehouseFormStatus::Pending, to = %next, "warehouse form cancelled");
        Ok(form)
    }

    /// Form lines as CSV, one row per material
    pub async fn export_csv(&self, id: Uuid) -> AppResult<(String, String)> {
        let rows = sqlx::query_as::<_, (String, String, String, String, String, String, Decimal, String)>(
            r#"
            SELECT f.code, f.form_type, f.status, w.code, rm.code, rm.name, m.quantity, m.unit
            FROM warehouse_forms f
            JOIN warehouses w ON w.id = f.warehouse_id
            JOIN warehouse_form_materials m ON m.warehouse_form_id = f.id
            JOIN raw_materials rm ON rm.id = m.raw_material_id
            WHERE f.id = $1
            ORDER BY rm.code
            "#,
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        let Some(code) = rows.first().map(|r| r.0.clone()) else {
            return Err(AppError::not_found("Warehouse form"));
        };

        let lines: Vec<FormCsvLine> = rows
            .into_iter()
            .map(
                |(form_code, form_type, status, warehouse_code, material_code, material_name, quantity, unit)| {
                    FormCsvLine {
                        form_code,
                        form_type,
                        status,
                        warehouse_code,
                        material_code,
                        material_name,
                        quantity,
                        unit,
                    }
                },
            )
            .collect();

        Ok((code, to_csv(&lines)?))
    }
}

fn to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in data {
        wtr.serialize(record)
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
}

/// Record what a completed main import received and move the stage to IMPORTED
async fn receive_stage(
    conn: &mut PgConnection,
    stage_id: Uuid,
    materials: &[WarehouseFormMaterial],
) -> AppResult<()> {
    let (_, stage) = lock_stage_with_order(conn, stage_id).await?;

    for line in materials {
        if let Some(purchase_material_id) = line.purchase_material_id {
            sqlx::query(
                "UPDATE purchase_materials SET received_quantity = received_quantity + $2 WHERE id = $1",
            )
            .bind(purchase_material_id)
            .bind(line.quantity)
            .execute(&mut *conn)
            .await?;
        }
    }

    set_stage_status(conn, &stage, DeliveryStatus::Imported).await?;

    let task_ids: BTreeSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT DISTINCT om.purchase_task_id
        FROM purchase_materials pm
        JOIN order_materials om ON om.id = pm.order_material_id
        WHERE pm.delivery_stage_id = $1 AND om.purchase_task_id IS NOT NULL
        "#,
    )
    .bind(stage_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .collect();

    for task_id in task_ids {
        refresh_task_progress(conn, task_id).await?;
    }

    refresh_order_status(conn, stage.purchasing_order_id).await?;
    Ok(())
}

/// Insert a PENDING form with its lines and return its id
pub(crate) async fn insert_form(
    conn: &mut PgConnection,
    form_type: WarehouseFormType,
    warehouse_id: Uuid,
    source: FormSource,
    note: Option<&str>,
    created_by: Uuid,
    lines: &[NewFormLine],
) -> AppResult<Uuid> {
    let prefix = match form_type {
        WarehouseFormType::Import => document_prefix::IMPORT_FORM,
        WarehouseFormType::Export => document_prefix::EXPORT_FORM,
    };
    let code = next_document_code(conn, prefix).await?;

    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO warehouse_forms (code, form_type, warehouse_id, delivery_stage_id,
                                     temp_warehouse_request_id, note, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(&code)
    .bind(form_type.as_str())
    .bind(warehouse_id)
    .bind(source.delivery_stage_id)
    .bind(source.temp_warehouse_request_id)
    .bind(note)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await?;

    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO warehouse_form_materials (warehouse_form_id, raw_material_id,
                                                  purchase_material_id, quantity, unit)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(line.raw_material_id)
        .bind(line.purchase_material_id)
        .bind(line.quantity)
        .bind(&line.unit)
        .execute(&mut *conn)
        .await?;
    }

    tracing::info!(warehouse_form_id = %id, code = %code, form_type = %form_type, "warehouse form created");
    Ok(id)
}

async fn load_form_materials(
    conn: &mut PgConnection,
    form_id: Uuid,
) -> AppResult<Vec<WarehouseFormMaterial>> {
    let rows = sqlx::query_as::<_, FormMaterialRow>(
        r#"
        SELECT id, raw_material_id, purchase_material_id, quantity, unit
        FROM warehouse_form_materials WHERE warehouse_form_id = $1
        ORDER BY id
        "#,
    )
    .bind(form_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn fetch_form(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<WarehouseForm> {
    let row = sqlx::query_as::<_, FormRow>(&format!(
        "SELECT {} FROM warehouse_forms WHERE id = $1{}",
        COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Warehouse form"))?;

    let materials = load_form_materials(conn, id).await?;
    row.into_form(materials)
}

async fn load_form(conn: &mut PgConnection, id: Uuid) -> AppResult<WarehouseForm> {
    fetch_form(conn, id, false).await
}

async fn lock_form(conn: &mut PgConnection, id: Uuid) -> AppResult<WarehouseForm> {
    fetch_form(conn, id, true).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_beyond_stock_is_insufficient_stock() {
        let err = next_stock(Decimal::from(5), WarehouseFormType::Export, Decimal::from(6))
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock(_)));
    }

    #[test]
    fn test_import_adds_to_stock() {
        let stock = next_stock(Decimal::from(5), WarehouseFormType::Import, Decimal::from(6)).unwrap();
        assert_eq!(stock, Decimal::from(11));
    }

    #[test]
    fn test_export_to_zero_is_allowed() {
        let stock = next_stock(Decimal::from(5), WarehouseFormType::Export, Decimal::from(5)).unwrap();
        assert!(stock.is_zero());
    }

    #[test]
    fn test_manual_lines_reject_duplicates_and_non_positive() {
        let id = Uuid::new_v4();
        let duplicate = vec![
            FormMaterialInput { raw_material_id: id, quantity: Decimal::ONE },
            FormMaterialInput { raw_material_id: id, quantity: Decimal::ONE },
        ];
        assert!(matches!(check_manual_lines(&duplicate), Err(AppError::QuantityMismatch(_))));

        let zero = vec![FormMaterialInput { raw_material_id: id, quantity: Decimal::ZERO }];
        assert!(matches!(check_manual_lines(&zero), Err(AppError::Validation { .. })));
    }

    #[test]
    fn test_csv_has_header_and_rows() {
        let lines = vec![FormCsvLine {
            form_code: "IM-2026-0001".into(),
            form_type: "IMPORT".into(),
            status: "PENDING".into(),
            warehouse_code: "WH-MAIN".into(),
            material_code: "RM-001".into(),
            material_name: "Cane sugar".into(),
            quantity: Decimal::from(120),
            unit: "kg".into(),
        }];
        let csv = to_csv(&lines).unwrap();
        let mut rows = csv.lines();
        assert_eq!(
            rows.next(),
            Some("form_code,form_type,status,warehouse_code,material_code,material_name,quantity,unit")
        );
        assert_eq!(
            rows.next(),
            Some("IM-2026-0001,IMPORT,PENDING,WH-MAIN,RM-001,Cane sugar,120,kg")
        );
    }
}
