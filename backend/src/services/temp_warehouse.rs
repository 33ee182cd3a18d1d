//! Temporary warehouse requests: parking delivered goods until inspection ends

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    document_prefix, ApprovalInput, ApproveStatus, Decision, DeliveryStage, DeliveryStatus,
    PaginatedResponse, Pagination, TempWarehouseRequest, WarehouseFormType, WarehouseType,
};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::delivery_stage::{load_stage, lock_stage_with_order};
use crate::services::document_code::next_document_code;
use crate::services::warehouse::require_warehouse;
use crate::services::warehouse_form::{insert_form, FormSource, NewFormLine};

#[derive(Debug, FromRow)]
struct RequestRow {
    id: Uuid,
    code: String,
    delivery_stage_id: Uuid,
    warehouse_id: Uuid,
    approve_status: String,
    note: Option<String>,
    reject_reason: Option<String>,
    warehouse_form_id: Option<Uuid>,
    requested_by: Uuid,
    resolved_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for TempWarehouseRequest {
    type Error = AppError;

    fn try_from(row: RequestRow) -> AppResult<Self> {
        Ok(TempWarehouseRequest {
            id: row.id,
            code: row.code,
            delivery_stage_id: row.delivery_stage_id,
            warehouse_id: row.warehouse_id,
            approve_status: row.approve_status.parse()?,
            note: row.note,
            reject_reason: row.reject_reason,
            warehouse_form_id: row.warehouse_form_id,
            requested_by: row.requested_by,
            resolved_by: row.resolved_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id, code, delivery_stage_id, warehouse_id, approve_status, note, \
     reject_reason, warehouse_form_id, requested_by, resolved_by, created_at, updated_at";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempRequestFilter {
    pub approve_status: Option<ApproveStatus>,
    pub delivery_stage_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTempRequestInput {
    pub delivery_stage_id: Uuid,
    pub warehouse_id: Uuid,
    pub note: Option<String>,
}

/// Import lines carrying every delivered quantity of the stage
fn delivered_lines(stage: &DeliveryStage) -> Vec<NewFormLine> {
    stage
        .purchase_materials
        .iter()
        .filter(|m| m.delivered_quantity > Decimal::ZERO)
        .map(|m| NewFormLine {
            raw_material_id: m.raw_material_id,
            purchase_material_id: Some(m.id),
            quantity: m.delivered_quantity,
            unit: m.unit.clone(),
        })
        .collect()
}

/// Temporary warehouse request service
#[derive(Clone)]
pub struct TempWarehouseService {
    db: PgPool,
}

impl TempWarehouseService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_requests(
        &self,
        filter: TempRequestFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<TempWarehouseRequest>> {
        let status = filter.approve_status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM temp_warehouse_requests
            WHERE ($1::text IS NULL OR approve_status = $1)
              AND ($2::uuid IS NULL OR delivery_stage_id = $2)
              AND ($3::uuid IS NULL OR warehouse_id = $3)
            "#,
        )
        .bind(status)
        .bind(filter.delivery_stage_id)
        .bind(filter.warehouse_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            SELECT {} FROM temp_warehouse_requests
            WHERE ($1::text IS NULL OR approve_status = $1)
              AND ($2::uuid IS NULL OR delivery_stage_id = $2)
              AND ($3::uuid IS NULL OR warehouse_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            COLUMNS
        ))
        .bind(status)
        .bind(filter.delivery_stage_id)
        .bind(filter.warehouse_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let requests = rows
            .into_iter()
            .map(TempWarehouseRequest::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(requests, pagination, total as u64))
    }

    pub async fn get_request(&self, id: Uuid) -> AppResult<TempWarehouseRequest> {
        let mut conn = self.db.acquire().await?;
        fetch_request(&mut conn, id, false).await
    }

    /// Ask to store a delivered stage in a temporary warehouse
    pub async fn create_request(
        &self,
        actor: &AuthUser,
        input: CreateTempRequestInput,
    ) -> AppResult<TempWarehouseRequest> {
        let mut tx = self.db.begin().await?;

        let (_, stage) = lock_stage_with_order(&mut tx, input.delivery_stage_id).await?;
        if stage.delivery_status != DeliveryStatus::Delivered {
            return Err(AppError::InvalidStateTransition(format!(
                "Only a delivered stage can be stored temporarily, this one is {}",
                stage.delivery_status
            )));
        }
        let warehouse =
            require_warehouse(&mut tx, input.warehouse_id, WarehouseType::Temporary).await?;

        let code = next_document_code(&mut tx, document_prefix::TEMP_WAREHOUSE_REQUEST).await?;
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            INSERT INTO temp_warehouse_requests (code, delivery_stage_id, warehouse_id, note,
                                                 requested_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(&code)
        .bind(stage.id)
        .bind(warehouse.id)
        .bind(&input.note)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            temp_warehouse_request_id = %row.id,
            code = %code,
            stage_id = %stage.id,
            warehouse_id = %warehouse.id,
            "temporary warehouse requested"
        );
        row.try_into()
    }

    /// Approve or reject. Approval raises a PENDING import form of the
    /// delivered quantities into the temporary warehouse.
    pub async fn approve_request(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: ApprovalInput,
    ) -> AppResult<TempWarehouseRequest> {
        let decision = input.decision()?;
        let mut tx = self.db.begin().await?;

        let request = fetch_request(&mut tx, id, true).await?;
        let next = request
            .approve_status
            .decide("temporary warehouse request", decision)?;

        let warehouse_form_id = if decision == Decision::Approve {
            let stage = load_stage(&mut tx, request.delivery_stage_id).await?;
            let lines = delivered_lines(&stage);
            if lines.is_empty() {
                return Err(AppError::validation(
                    "deliveryStageId",
                    "The stage has no delivered quantity to store",
                ));
            }
            let note = format!("Temporary storage for {}", request.code);
            let form_id = insert_form(
                &mut tx,
                WarehouseFormType::Import,
                request.warehouse_id,
                FormSource {
                    delivery_stage_id: Some(stage.id),
                    temp_warehouse_request_id: Some(request.id),
                },
                Some(&note),
                actor.user_id,
                &lines,
            )
            .await?;
            Some(form_id)
        } else {
            None
        };

        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            UPDATE temp_warehouse_requests
            SET approve_status = $2, reject_reason = $3, resolved_by = $4,
                warehouse_form_id = $5
            WHERE id = $1
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(id)
        .bind(next.as_str())
        .bind(input.reason())
        .bind(actor.user_id)
        .bind(warehouse_form_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            temp_warehouse_request_id = %id,
            from = %request.approve_status,
            to = %next,
            warehouse_form_id = ?warehouse_form_id,
            "temporary warehouse request resolved"
        );
        row.try_into()
    }
}

async fn fetch_request(
    conn: &mut PgConnection,
    id: Uuid,
    lock: bool,
) -> AppResult<TempWarehouseRequest> {
    sqlx::query_as::<_, RequestRow>(&format!(
        "SELECT {} FROM temp_warehouse_requests WHERE id = $1{}",
        COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Temporary warehouse request"))?
    .try_into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared::PurchaseMaterial;

    fn material(stage_id: Uuid, delivered: i64) -> PurchaseMaterial {
        PurchaseMaterial {
            id: Uuid::new_v4(),
            delivery_stage_id: stage_id,
            order_material_id: Uuid::new_v4(),
            raw_material_id: Uuid::new_v4(),
            package: Decimal::from(10),
            material_per_package: Decimal::from(10),
            unit: "kg".into(),
            total_quantity: Decimal::from(100),
            delivered_quantity: Decimal::from(delivered),
            after_inspect_quantity: None,
            received_quantity: Decimal::ZERO,
            unit_price: Decimal::ONE,
            total_price: Decimal::from(100),
        }
    }

    #[test]
    fn test_delivered_lines_skip_undelivered_materials() {
        let stage_id = Uuid::new_v4();
        let stage = DeliveryStage {
            id: stage_id,
            purchasing_order_id: Uuid::new_v4(),
            stage_order: 2,
            delivery_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            delivery_status: DeliveryStatus::Delivered,
            is_supplemental: false,
            cancel_reason: None,
            note: None,
            delivered_at: Some(Utc::now()),
            purchase_materials: vec![material(stage_id, 80), material(stage_id, 0)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let lines = delivered_lines(&stage);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, Decimal::from(80));
        assert_eq!(lines[0].purchase_material_id, Some(stage.purchase_materials[0].id));
    }
}
