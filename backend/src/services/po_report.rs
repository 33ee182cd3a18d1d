//! PO reports: what happens to quantity that failed inspection

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    document_prefix, stage_shortfall, validate_supplemental, ApprovalInput, ApproveStatus,
    Decision, DeliveryStage, DeliveryStatus, OrderStatus, OrderedQuantity, PaginatedResponse,
    Pagination, PoReport, ResolutionType, ShortfallLine,
};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::delivery_stage::{
    insert_stage, load_stage, lock_stage_with_order, split_packages, NewStageLine,
};
use crate::services::document_code::next_document_code;
use crate::services::purchasing_order::{
    ensure_order_access, load_order_header, load_order_materials, lock_order_header, reconcile,
    refresh_order_status,
};

#[derive(Debug, FromRow)]
struct ReportRow {
    id: Uuid,
    code: String,
    delivery_stage_id: Uuid,
    purchasing_order_id: Uuid,
    resolution_type: String,
    content: String,
    approve_status: String,
    reject_reason: Option<String>,
    supplemental_stage_id: Option<Uuid>,
    created_by: Uuid,
    resolved_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReportRow {
    fn into_report(self, shortfall_lines: Vec<ShortfallLine>) -> AppResult<PoReport> {
        Ok(PoReport {
            id: self.id,
            code: self.code,
            delivery_stage_id: self.delivery_stage_id,
            purchasing_order_id: self.purchasing_order_id,
            resolution_type: self.resolution_type.parse()?,
            content: self.content,
            approve_status: self.approve_status.parse()?,
            reject_reason: self.reject_reason,
            supplemental_stage_id: self.supplemental_stage_id,
            shortfall_lines,
            created_by: self.created_by,
            resolved_by: self.resolved_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const COLUMNS: &str = "r.id, r.code, r.delivery_stage_id, r.purchasing_order_id, \
     r.resolution_type, r.content, r.approve_status, r.reject_reason, \
     r.supplemental_stage_id, r.created_by, r.resolved_by, r.created_at, r.updated_at";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilter {
    pub approve_status: Option<ApproveStatus>,
    pub resolution_type: Option<ResolutionType>,
    pub purchasing_order_id: Option<Uuid>,
    pub delivery_stage_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportInput {
    pub delivery_stage_id: Uuid,
    pub resolution_type: ResolutionType,
    #[validate(length(min = 1, max = 4000, message = "Report content is required"))]
    pub content: String,
}

/// Lines of the supplemental stage that ships a reported shortfall
/// Reported shortfall summed per raw material
fn reported_quantities(lines: &[ShortfallLine]) -> Vec<OrderedQuantity> {
    let mut totals: Vec<OrderedQuantity> = Vec::new();
    for line in lines {
        match totals
            .iter_mut()
            .find(|t| t.raw_material_id == line.raw_material_id)
        {
            Some(total) => total.quantity += line.quantity,
            None => totals.push(OrderedQuantity {
                raw_material_id: line.raw_material_id,
                quantity: line.quantity,
            }),
        }
    }
    totals
}

fn supplemental_lines(
    stage: &DeliveryStage,
    shortfall: &[ShortfallLine],
    unit_prices: impl Fn(Uuid) -> Option<Decimal>,
) -> AppResult<Vec<NewStageLine>> {
    shortfall
        .iter()
        .map(|line| -> AppResult<NewStageLine> {
            let material = stage
                .purchase_materials
                .iter()
                .find(|m| m.id == line.purchase_material_id)
                .ok_or_else(|| AppError::not_found("Purchase material"))?;
            let (package, material_per_package) =
                split_packages(line.quantity, material.material_per_package);
            Ok(NewStageLine {
                order_material_id: material.order_material_id,
                raw_material_id: material.raw_material_id,
                package,
                material_per_package,
                unit: material.unit.clone(),
                unit_price: unit_prices(material.order_material_id).unwrap_or(material.unit_price),
            })
        })
        .collect()
}

/// PO report service
#[derive(Clone)]
pub struct PoReportService {
    db: PgPool,
}

impl PoReportService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_reports(
        &self,
        actor: &AuthUser,
        filter: ReportFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<PoReport>> {
        let supplier_id = actor.is_supplier().then_some(actor.user_id);
        let status = filter.approve_status.map(|s| s.as_str());
        let resolution = filter.resolution_type.map(|r| r.as_str());
        let where_clause = r#"
            WHERE ($1::text IS NULL OR r.approve_status = $1)
              AND ($2::text IS NULL OR r.resolution_type = $2)
              AND ($3::uuid IS NULL OR r.purchasing_order_id = $3)
              AND ($4::uuid IS NULL OR r.delivery_stage_id = $4)
              AND ($5::uuid IS NULL OR po.supplier_id = $5)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM po_reports r \
             JOIN purchasing_orders po ON po.id = r.purchasing_order_id {}",
            where_clause
        ))
        .bind(status)
        .bind(resolution)
        .bind(filter.purchasing_order_id)
        .bind(filter.delivery_stage_id)
        .bind(supplier_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {} FROM po_reports r \
             JOIN purchasing_orders po ON po.id = r.purchasing_order_id {} \
             ORDER BY r.created_at DESC LIMIT $6 OFFSET $7",
            COLUMNS, where_clause
        ))
        .bind(status)
        .bind(resolution)
        .bind(filter.purchasing_order_id)
        .bind(filter.delivery_stage_id)
        .bind(supplier_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = load_lines(&mut conn, row.id).await?;
            reports.push(row.into_report(lines)?);
        }

        Ok(PaginatedResponse::new(reports, pagination, total as u64))
    }

    pub async fn get_report(&self, actor: &AuthUser, id: Uuid) -> AppResult<PoReport> {
        let mut conn = self.db.acquire().await?;
        let report = load_report(&mut conn, id).await?;
        let header = load_order_header(&mut conn, report.purchasing_order_id).await?;
        ensure_order_access(actor, &header)?;
        Ok(report)
    }

    /// Report the shortfall of an inspected stage
    pub async fn create_report(
        &self,
        actor: &AuthUser,
        input: CreateReportInput,
    ) -> AppResult<PoReport> {
        let mut tx = self.db.begin().await?;

        let (_, stage) = lock_stage_with_order(&mut tx, input.delivery_stage_id).await?;
        if !stage.delivery_status.has_inspection_result() {
            return Err(AppError::InvalidStateTransition(format!(
                "A {} stage has no inspection result to report on",
                stage.delivery_status
            )));
        }
        let shortfall = stage_shortfall(&stage);
        if shortfall.is_empty() {
            return Err(AppError::validation(
                "deliveryStageId",
                "Every delivered material passed inspection; there is nothing to report",
            ));
        }

        let code = next_document_code(&mut tx, document_prefix::PO_REPORT).await?;
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO po_reports (code, delivery_stage_id, purchasing_order_id,
                                    resolution_type, content, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&code)
        .bind(stage.id)
        .bind(stage.purchasing_order_id)
        .bind(input.resolution_type.as_str())
        .bind(input.content.trim())
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        for line in &shortfall {
            sqlx::query(
                r#"
                INSERT INTO po_report_lines (po_report_id, raw_material_id,
                                             purchase_material_id, quantity)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id)
            .bind(line.raw_material_id)
            .bind(line.purchase_material_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        let report = load_report(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            po_report_id = %id,
            code = %code,
            stage_id = %stage.id,
            resolution = %input.resolution_type,
            "PO report created"
        );
        Ok(report)
    }

    /// Approve or reject a report. An approved SUPPLEMENTAL_DELIVERY report
    /// opens a `SupInactive` stage for the reported shortfall; an approved
    /// ACCEPT_SHORTAGE report writes it off.
    pub async fn approve_report(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: ApprovalInput,
    ) -> AppResult<PoReport> {
        let decision = input.decision()?;
        let mut tx = self.db.begin().await?;

        let report = lock_report(&mut tx, id).await?;
        let next = report.approve_status.decide("PO report", decision)?;

        let supplemental_stage_id = if decision == Decision::Approve {
            let header = lock_order_header(&mut tx, report.purchasing_order_id).await?;
            // The reported quantity must still be uncovered by other stages and write-offs
            let reconciliation = reconcile(&mut tx, report.purchasing_order_id).await?;
            let reported = reported_quantities(&report.shortfall_lines);
            validate_supplemental(&reconciliation, &reported)?;

            match report.resolution_type {
                ResolutionType::SupplementalDelivery => {
                    if !matches!(
                        header.order_status,
                        OrderStatus::Approved | OrderStatus::InProgress
                    ) {
                        return Err(AppError::InvalidStateTransition(format!(
                            "A {} order cannot take a supplemental delivery",
                            header.order_status
                        )));
                    }

                    let stage = load_stage(&mut tx, report.delivery_stage_id).await?;
                    let order_materials =
                        load_order_materials(&mut tx, report.purchasing_order_id).await?;
                    let lines = supplemental_lines(&stage, &report.shortfall_lines, |om_id| {
                        order_materials
                            .iter()
                            .find(|om| om.id == om_id)
                            .map(|om| om.unit_price)
                    })?;

                    let note = format!("Supplemental delivery for {}", report.code);
                    let stage_id = insert_stage(
                        &mut tx,
                        report.purchasing_order_id,
                        None,
                        Utc::now().date_naive().max(stage.delivery_date),
                        Some(&note),
                        true,
                        DeliveryStatus::SupInactive,
                        &lines,
                    )
                    .await?;
                    Some(stage_id)
                }
                ResolutionType::AcceptShortage => None,
            }
        } else {
            None
        };

        sqlx::query(
            r#"
            UPDATE po_reports
            SET approve_status = $2, reject_reason = $3, resolved_by = $4,
                supplemental_stage_id = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(input.reason())
        .bind(actor.user_id)
        .bind(supplemental_stage_id)
        .execute(&mut *tx)
        .await?;

        refresh_order_status(&mut tx, report.purchasing_order_id).await?;

        let report = load_report(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            po_report_id = %id,
            from = %ApproveStatus::Pending,
            to = %next,
            supplemental_stage_id = ?supplemental_stage_id,
            "PO report resolved"
        );
        Ok(report)
    }
}

async fn load_lines(conn: &mut PgConnection, report_id: Uuid) -> AppResult<Vec<ShortfallLine>> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, Decimal)>(
        r#"
        SELECT raw_material_id, purchase_material_id, quantity
        FROM po_report_lines WHERE po_report_id = $1
        ORDER BY id
        "#,
    )
    .bind(report_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(raw_material_id, purchase_material_id, quantity)| ShortfallLine {
            raw_material_id,
            purchase_material_id,
            quantity,
        })
        .collect())
}

async fn fetch_report(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<PoReport> {
    let row = sqlx::query_as::<_, ReportRow>(&format!(
        "SELECT {} FROM po_reports r WHERE r.id = $1{}",
        COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("PO report"))?;

    let lines = load_lines(conn, id).await?;
    row.into_report(lines)
}

async fn load_report(conn: &mut PgConnection, id: Uuid) -> AppResult<PoReport> {
    fetch_report(conn, id, false).await
}

async fn lock_report(conn: &mut PgConnection, id: Uuid) -> AppResult<PoReport> {
    fetch_report(conn, id, true).await
}
