//! Inspection requests: delivered stages are checked and the passed
//! quantities recorded

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    document_prefix, validate_inspection_quantities, DeliveryStage, DeliveryStatus,
    InspectionLine, InspectionRequest, InspectionStatus, PaginatedResponse, Pagination, Role,
};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::delivery_stage::{lock_stage_with_order, set_stage_status};
use crate::services::document_code::next_document_code;
use crate::services::purchasing_order::refresh_order_status;

#[derive(Debug, FromRow)]
struct InspectionRow {
    id: Uuid,
    code: String,
    delivery_stage_id: Uuid,
    purchasing_order_id: Uuid,
    inspector_id: Option<Uuid>,
    status: String,
    note: Option<String>,
    requested_by: Uuid,
    inspected_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InspectionRow {
    fn into_request(self, result_lines: Vec<InspectionLine>) -> AppResult<InspectionRequest> {
        Ok(InspectionRequest {
            id: self.id,
            code: self.code,
            delivery_stage_id: self.delivery_stage_id,
            purchasing_order_id: self.purchasing_order_id,
            inspector_id: self.inspector_id,
            status: self.status.parse()?,
            note: self.note,
            result_lines,
            requested_by: self.requested_by,
            inspected_at: self.inspected_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct InspectionLineRow {
    purchase_material_id: Uuid,
    raw_material_id: Uuid,
    inspected_quantity: Decimal,
    passed_quantity: Decimal,
    note: Option<String>,
}

impl From<InspectionLineRow> for InspectionLine {
    fn from(row: InspectionLineRow) -> Self {
        InspectionLine {
            purchase_material_id: row.purchase_material_id,
            raw_material_id: row.raw_material_id,
            inspected_quantity: row.inspected_quantity,
            passed_quantity: row.passed_quantity,
            note: row.note,
        }
    }
}

const COLUMNS: &str = "id, code, delivery_stage_id, purchasing_order_id, inspector_id, status, \
     note, requested_by, inspected_at, created_at, updated_at";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionFilter {
    pub status: Option<InspectionStatus>,
    pub delivery_stage_id: Option<Uuid>,
    pub purchasing_order_id: Option<Uuid>,
    pub inspector_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInspectionInput {
    pub delivery_stage_id: Uuid,
    pub inspector_id: Option<Uuid>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionLineInput {
    pub purchase_material_id: Uuid,
    pub inspected_quantity: Decimal,
    pub passed_quantity: Decimal,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionResultInput {
    pub lines: Vec<InspectionLineInput>,
    pub note: Option<String>,
}

/// Match result lines to the stage's materials: every material exactly once,
/// quantities within what was delivered
fn build_result_lines(
    stage: &DeliveryStage,
    input: &[InspectionLineInput],
) -> AppResult<Vec<InspectionLine>> {
    let mut seen = HashSet::new();
    let mut lines = Vec::with_capacity(input.len());

    for line in input {
        if !seen.insert(line.purchase_material_id) {
            return Err(AppError::validation(
                "lines",
                "A material appears more than once in the result",
            ));
        }
        let material = stage
            .purchase_materials
            .iter()
            .find(|m| m.id == line.purchase_material_id)
            .ok_or_else(|| AppError::not_found("Purchase material"))?;

        validate_inspection_quantities(
            material.delivered_quantity,
            line.inspected_quantity,
            line.passed_quantity,
        )?;

        lines.push(InspectionLine {
            purchase_material_id: material.id,
            raw_material_id: material.raw_material_id,
            inspected_quantity: line.inspected_quantity,
            passed_quantity: line.passed_quantity,
            note: line.note.clone(),
        });
    }

    if let Some(missing) = stage
        .purchase_materials
        .iter()
        .find(|m| !seen.contains(&m.id))
    {
        return Err(AppError::validation(
            "lines",
            format!("No result given for material {}", missing.raw_material_id),
        ));
    }

    Ok(lines)
}

/// Inspection service
#[derive(Clone)]
pub struct InspectionService {
    db: PgPool,
}

impl InspectionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_requests(
        &self,
        filter: InspectionFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<InspectionRequest>> {
        let status = filter.status.map(|s| s.as_str());
        let where_clause = r#"
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR delivery_stage_id = $2)
              AND ($3::uuid IS NULL OR purchasing_order_id = $3)
              AND ($4::uuid IS NULL OR inspector_id = $4)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM inspection_requests {}",
            where_clause
        ))
        .bind(status)
        .bind(filter.delivery_stage_id)
        .bind(filter.purchasing_order_id)
        .bind(filter.inspector_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, InspectionRow>(&format!(
            "SELECT {} FROM inspection_requests {} ORDER BY created_at DESC LIMIT $5 OFFSET $6",
            COLUMNS, where_clause
        ))
        .bind(status)
        .bind(filter.delivery_stage_id)
        .bind(filter.purchasing_order_id)
        .bind(filter.inspector_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = load_lines(&mut conn, row.id).await?;
            requests.push(row.into_request(lines)?);
        }

        Ok(PaginatedResponse::new(requests, pagination, total as u64))
    }

    pub async fn get_request(&self, id: Uuid) -> AppResult<InspectionRequest> {
        let mut conn = self.db.acquire().await?;
        load_request(&mut conn, id).await
    }

    /// Ask for a delivered stage to be inspected; the stage moves to INSPECTING
    pub async fn create_request(
        &self,
        actor: &AuthUser,
        input: CreateInspectionInput,
    ) -> AppResult<InspectionRequest> {
        let mut tx = self.db.begin().await?;

        if let Some(inspector_id) = input.inspector_id {
            let role = sqlx::query_scalar::<_, String>(
                "SELECT role FROM users WHERE id = $1 AND is_active",
            )
            .bind(inspector_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Inspector"))?;
            if role.parse::<Role>()? != Role::Inspector {
                return Err(AppError::validation(
                    "inspectorId",
                    "The selected account is not an inspector",
                ));
            }
        }

        let (_, stage) = lock_stage_with_order(&mut tx, input.delivery_stage_id).await?;
        set_stage_status(&mut tx, &stage, DeliveryStatus::Inspecting).await?;

        let code = next_document_code(&mut tx, document_prefix::INSPECTION_REQUEST).await?;
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO inspection_requests (code, delivery_stage_id, purchasing_order_id,
                                             inspector_id, note, requested_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&code)
        .bind(stage.id)
        .bind(stage.purchasing_order_id)
        .bind(input.inspector_id)
        .bind(&input.note)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let request = load_request(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(inspection_request_id = %id, code = %code, stage_id = %stage.id, "inspection requested");
        Ok(request)
    }

    /// Record inspected and passed quantities; the stage becomes INSPECTED
    pub async fn record_result(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: InspectionResultInput,
    ) -> AppResult<InspectionRequest> {
        let mut tx = self.db.begin().await?;

        let request = lock_request(&mut tx, id).await?;
        if request
            .inspector_id
            .is_some_and(|inspector| inspector != actor.user_id)
        {
            return Err(AppError::InsufficientPermissions);
        }
        let next = request.status.transition(InspectionStatus::Inspected)?;

        let (_, stage) = lock_stage_with_order(&mut tx, request.delivery_stage_id).await?;
        let lines = build_result_lines(&stage, &input.lines)?;

        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO inspection_lines (inspection_request_id, purchase_material_id,
                    raw_material_id, inspected_quantity, passed_quantity, note)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(id)
            .bind(line.purchase_material_id)
            .bind(line.raw_material_id)
            .bind(line.inspected_quantity)
            .bind(line.passed_quantity)
            .bind(&line.note)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE purchase_materials SET after_inspect_quantity = $2 WHERE id = $1")
                .bind(line.purchase_material_id)
                .bind(line.passed_quantity)
                .execute(&mut *tx)
                .await?;
        }

        set_stage_status(&mut tx, &stage, DeliveryStatus::Inspected).await?;

        sqlx::query(
            r#"
            UPDATE inspection_requests
            SET status = $2, inspector_id = $3, inspected_at = NOW(),
                note = COALESCE($4, note)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(actor.user_id)
        .bind(&input.note)
        .execute(&mut *tx)
        .await?;

        refresh_order_status(&mut tx, stage.purchasing_order_id).await?;

        let request = load_request(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            inspection_request_id = %id,
            stage_id = %stage.id,
            passed = %lines.iter().map(|l| l.passed_quantity).sum::<Decimal>(),
            "inspection result recorded"
        );
        Ok(request)
    }

    /// Withdraw a pending request; the stage returns to DELIVERED
    pub async fn cancel_request(&self, id: Uuid) -> AppResult<InspectionRequest> {
        let mut tx = self.db.begin().await?;

        let request = lock_request(&mut tx, id).await?;
        let next = request.status.transition(InspectionStatus::Cancelled)?;

        let (_, stage) = lock_stage_with_order(&mut tx, request.delivery_stage_id).await?;
        set_stage_status(&mut tx, &stage, DeliveryStatus::Delivered).await?;

        sqlx::query("UPDATE inspection_requests SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(next.as_str())
            .execute(&mut *tx)
            .await?;

        let request = load_request(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(inspection_request_id = %id, "inspection request cancelled");
        Ok(request)
    }
}

async fn load_lines(conn: &mut PgConnection, request_id: Uuid) -> AppResult<Vec<InspectionLine>> {
    let rows = sqlx::query_as::<_, InspectionLineRow>(
        r#"
        SELECT purchase_material_id, raw_material_id, inspected_quantity, passed_quantity, note
        FROM inspection_lines WHERE inspection_request_id = $1
        ORDER BY id
        "#,
    )
    .bind(request_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn fetch_request(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<InspectionRequest> {
    let row = sqlx::query_as::<_, InspectionRow>(&format!(
        "SELECT {} FROM inspection_requests WHERE id = $1{}",
        COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Inspection request"))?;

    let lines = load_lines(conn, id).await?;
    row.into_request(lines)
}

async fn load_request(conn: &mut PgConnection, id: Uuid) -> AppResult<InspectionRequest> {
    fetch_request(conn, id, false).await
}

async fn lock_request(conn: &mut PgConnection, id: Uuid) -> AppResult<InspectionRequest> {
    fetch_request(conn, id, true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::PurchaseMaterial;

    fn stage_with(delivered: &[i64]) -> DeliveryStage {
        let stage_id = Uuid::new_v4();
        DeliveryStage {
            id: stage_id,
            purchasing_order_id: Uuid::new_v4(),
            stage_order: 1,
            delivery_date: chrono::NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            delivery_status: DeliveryStatus::Inspecting,
            is_supplemental: false,
            cancel_reason: None,
            note: None,
            delivered_at: None,
            purchase_materials: delivered
                .iter()
                .map(|d| PurchaseMaterial {
                    id: Uuid::new_v4(),
                    delivery_stage_id: stage_id,
                    order_material_id: Uuid::new_v4(),
                    raw_material_id: Uuid::new_v4(),
                    package: Decimal::from(*d),
                    material_per_package: Decimal::ONE,
                    unit: "kg".into(),
                    total_quantity: Decimal::from(*d),
                    delivered_quantity: Decimal::from(*d),
                    after_inspect_quantity: None,
                    received_quantity: Decimal::ZERO,
                    unit_price: Decimal::ONE,
                    total_price: Decimal::from(*d),
                })
                .collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(material_id: Uuid, inspected: i64, passed: i64) -> InspectionLineInput {
        InspectionLineInput {
            purchase_material_id: material_id,
            inspected_quantity: Decimal::from(inspected),
            passed_quantity: Decimal::from(passed),
            note: None,
        }
    }

    #[test]
    fn test_every_material_needs_a_result() {
        let stage = stage_with(&[10, 20]);
        let first = stage.purchase_materials[0].id;
        let err = build_result_lines(&stage, &[line(first, 10, 9)]).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "lines"));
    }

    #[test]
    fn test_passed_over_inspected_is_a_quantity_mismatch() {
        let stage = stage_with(&[10]);
        let id = stage.purchase_materials[0].id;
        let err = build_result_lines(&stage, &[line(id, 8, 9)]).unwrap_err();
        assert!(matches!(err, AppError::QuantityMismatch(_)));
    }

    #[test]
    fn test_complete_result() {
        let stage = stage_with(&[10, 20]);
        let a = stage.purchase_materials[0].id;
        let b = stage.purchase_materials[1].id;
        let lines = build_result_lines(&stage, &[line(a, 10, 10), line(b, 20, 15)]).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].failed_quantity(), Decimal::from(5));
    }

    #[test]
    fn test_unknown_material_is_not_found() {
        let stage = stage_with(&[10]);
        let err = build_result_lines(&stage, &[line(Uuid::new_v4(), 1, 1)]).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
