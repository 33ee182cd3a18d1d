//! Delivery stages: supplier progress, delivered quantities, supplemental stages
//!
//! Row locks are taken order first, then its stages, then purchase tasks.
//! Every path that moves a stage goes through [`lock_stage_with_order`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use shared::{
    checked_quantity, line_total, reconcile_order, validate_delivered_quantity,
    validate_supplemental, DeliveryStage, DeliveryStatus, OrderStatus, OrderedQuantity,
    PaginatedResponse, Pagination, PurchaseMaterial, StageMaterialInput, StageQuantities,
};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::purchasing_order::{
    ensure_order_access, load_order_header, load_order_materials, load_waived,
    lock_order_header, refresh_order_status, CancelInput, OrderHeader,
};

#[derive(Debug, FromRow)]
struct StageRow {
    id: Uuid,
    purchasing_order_id: Uuid,
    stage_order: i32,
    delivery_date: NaiveDate,
    delivery_status: String,
    is_supplemental: bool,
    cancel_reason: Option<String>,
    note: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StageRow {
    fn into_stage(self, purchase_materials: Vec<PurchaseMaterial>) -> AppResult<DeliveryStage> {
        Ok(DeliveryStage {
            id: self.id,
            purchasing_order_id: self.purchasing_order_id,
            stage_order: self.stage_order,
            delivery_date: self.delivery_date,
            delivery_status: self.delivery_status.parse()?,
            is_supplemental: self.is_supplemental,
            cancel_reason: self.cancel_reason,
            note: self.note,
            delivered_at: self.delivered_at,
            purchase_materials,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PurchaseMaterialRow {
    id: Uuid,
    delivery_stage_id: Uuid,
    order_material_id: Uuid,
    raw_material_id: Uuid,
    package: Decimal,
    material_per_package: Decimal,
    unit: String,
    total_quantity: Decimal,
    delivered_quantity: Decimal,
    after_inspect_quantity: Option<Decimal>,
    received_quantity: Decimal,
    unit_price: Decimal,
    total_price: Decimal,
}

impl From<PurchaseMaterialRow> for PurchaseMaterial {
    fn from(row: PurchaseMaterialRow) -> Self {
        PurchaseMaterial {
            id: row.id,
            delivery_stage_id: row.delivery_stage_id,
            order_material_id: row.order_material_id,
            raw_material_id: row.raw_material_id,
            package: row.package,
            material_per_package: row.material_per_package,
            unit: row.unit,
            total_quantity: row.total_quantity,
            delivered_quantity: row.delivered_quantity,
            after_inspect_quantity: row.after_inspect_quantity,
            received_quantity: row.received_quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
        }
    }
}

const STAGE_COLUMNS: &str = "id, purchasing_order_id, stage_order, delivery_date, \
     delivery_status, is_supplemental, cancel_reason, note, delivered_at, created_at, updated_at";

const MATERIAL_COLUMNS: &str = "id, delivery_stage_id, order_material_id, raw_material_id, \
     package, material_per_package, unit, total_quantity, delivered_quantity, \
     after_inspect_quantity, received_quantity, unit_price, total_price";

/// One material line of a stage about to be inserted
#[derive(Debug, Clone)]
pub(crate) struct NewStageLine {
    pub order_material_id: Uuid,
    pub raw_material_id: Uuid,
    pub package: Decimal,
    pub material_per_package: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageFilter {
    pub purchasing_order_id: Option<Uuid>,
    pub delivery_status: Option<DeliveryStatus>,
    pub is_supplemental: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementalStageInput {
    pub purchasing_order_id: Uuid,
    pub delivery_date: NaiveDate,
    pub note: Option<String>,
    pub materials: Vec<StageMaterialInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusInput {
    pub delivery_status: DeliveryStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredQuantityInput {
    pub purchase_material_id: Uuid,
    pub delivered_quantity: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuantityInput {
    pub materials: Vec<DeliveredQuantityInput>,
}

/// Split a quantity into packages of `per_package` when it divides evenly,
/// otherwise into single-unit packages
pub(crate) fn split_packages(quantity: Decimal, per_package: Decimal) -> (Decimal, Decimal) {
    if per_package > Decimal::ZERO && (quantity % per_package).is_zero() {
        (quantity / per_package, per_package)
    } else {
        (quantity, Decimal::ONE)
    }
}

/// Delivery stage service
#[derive(Clone)]
pub struct DeliveryStageService {
    db: PgPool,
}

impl DeliveryStageService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_stages(
        &self,
        actor: &AuthUser,
        filter: StageFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<DeliveryStage>> {
        let supplier_id = actor.is_supplier().then_some(actor.user_id);
        let status = filter.delivery_status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM delivery_stages s
            JOIN purchasing_orders po ON po.id = s.purchasing_order_id
            WHERE ($1::uuid IS NULL OR s.purchasing_order_id = $1)
              AND ($2::text IS NULL OR s.delivery_status = $2)
              AND ($3::bool IS NULL OR s.is_supplemental = $3)
              AND ($4::uuid IS NULL OR po.supplier_id = $4)
            "#,
        )
        .bind(filter.purchasing_order_id)
        .bind(status)
        .bind(filter.is_supplemental)
        .bind(supplier_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, StageRow>(&format!(
            r#"
            SELECT {} FROM delivery_stages s
            WHERE EXISTS (
                    SELECT 1 FROM purchasing_orders po
                    WHERE po.id = s.purchasing_order_id
                      AND ($4::uuid IS NULL OR po.supplier_id = $4)
                  )
              AND ($1::uuid IS NULL OR s.purchasing_order_id = $1)
              AND ($2::text IS NULL OR s.delivery_status = $2)
              AND ($3::bool IS NULL OR s.is_supplemental = $3)
            ORDER BY s.delivery_date, s.stage_order
            LIMIT $5 OFFSET $6
            "#,
            STAGE_COLUMNS
        ))
        .bind(filter.purchasing_order_id)
        .bind(status)
        .bind(filter.is_supplemental)
        .bind(supplier_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let mut stages = Vec::with_capacity(rows.len());
        for row in rows {
            let materials = load_purchase_materials(&mut conn, row.id).await?;
            stages.push(row.into_stage(materials)?);
        }

        Ok(PaginatedResponse::new(stages, pagination, total as u64))
    }

    pub async fn get_stage(&self, actor: &AuthUser, id: Uuid) -> AppResult<DeliveryStage> {
        let mut conn = self.db.acquire().await?;
        let stage = load_stage(&mut conn, id).await?;
        let header = load_order_header(&mut conn, stage.purchasing_order_id).await?;
        ensure_order_access(actor, &header)?;
        Ok(stage)
    }

    /// Add an extra stage covering open shortfall; it waits in `SupInactive`
    /// until the supplier starts it
    pub async fn create_supplemental_stage(
        &self,
        input: SupplementalStageInput,
    ) -> AppResult<DeliveryStage> {
        let mut tx = self.db.begin().await?;

        let header = lock_order_header(&mut tx, input.purchasing_order_id).await?;
        if !matches!(
            header.order_status,
            OrderStatus::Approved | OrderStatus::InProgress
        ) {
            return Err(AppError::InvalidStateTransition(format!(
                "Supplemental stages cannot be added to a {} order",
                header.order_status
            )));
        }

        let order_materials = load_order_materials(&mut tx, input.purchasing_order_id).await?;
        let stages = load_order_stages(&mut tx, input.purchasing_order_id).await?;
        let waived = load_waived(&mut tx, input.purchasing_order_id).await?;
        let ordered: Vec<OrderedQuantity> = order_materials.iter().map(Into::into).collect();
        let stage_quantities: Vec<StageQuantities> = stages.iter().map(Into::into).collect();
        let reconciliation = reconcile_order(&ordered, &stage_quantities, &waived);

        let requested: Vec<OrderedQuantity> = input
            .materials
            .iter()
            .map(|m| -> AppResult<OrderedQuantity> {
                Ok(OrderedQuantity {
                    raw_material_id: m.raw_material_id,
                    quantity: m.quantity()?,
                })
            })
            .collect::<AppResult<_>>()?;
        validate_supplemental(&reconciliation, &requested)?;

        let mut lines = Vec::with_capacity(input.materials.len());
        for material in &input.materials {
            let order_material = order_materials
                .iter()
                .find(|om| om.raw_material_id == material.raw_material_id)
                .ok_or(shared::LedgerError::UnknownMaterial(material.raw_material_id))?;
            lines.push(NewStageLine {
                order_material_id: order_material.id,
                raw_material_id: material.raw_material_id,
                package: material.package,
                material_per_package: material.material_per_package,
                unit: order_material.unit.clone(),
                unit_price: order_material.unit_price,
            });
        }

        let stage_id = insert_stage(
            &mut tx,
            input.purchasing_order_id,
            None,
            input.delivery_date,
            input.note.as_deref(),
            true,
            DeliveryStatus::SupInactive,
            &lines,
        )
        .await?;

        let stage = load_stage(&mut tx, stage_id).await?;
        tx.commit().await?;

        tracing::info!(
            stage_id = %stage_id,
            purchasing_order_id = %input.purchasing_order_id,
            stage_order = stage.stage_order,
            "supplemental delivery stage created"
        );
        Ok(stage)
    }

    /// Supplier progress: only `DELIVERING` and `DELIVERED` can be requested here
    pub async fn update_status(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: UpdateStatusInput,
    ) -> AppResult<DeliveryStage> {
        let target = input.delivery_status;
        if !target.is_manual_target() {
            return Err(AppError::InvalidStateTransition(format!(
                "{} is set by its own workflow, not through a status update",
                target
            )));
        }

        let mut tx = self.db.begin().await?;
        let (header, stage) = lock_stage_with_order(&mut tx, id).await?;
        ensure_order_access(actor, &header)?;

        if stage.delivery_status == DeliveryStatus::SupInactive {
            return Err(AppError::InvalidStateTransition(
                "Supplemental stages are started with start-delivering-supplemental".into(),
            ));
        }
        if target == DeliveryStatus::Delivered && stage.delivered_quantity() <= Decimal::ZERO {
            return Err(AppError::QuantityMismatch(
                "Record the delivered quantities before marking the stage delivered".into(),
            ));
        }

        set_stage_status(&mut tx, &stage, target).await?;
        refresh_order_status(&mut tx, stage.purchasing_order_id).await?;

        let stage = load_stage(&mut tx, id).await?;
        tx.commit().await?;
        Ok(stage)
    }

    /// Record how much of each material the supplier is handing over
    pub async fn update_quantity(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: UpdateQuantityInput,
    ) -> AppResult<DeliveryStage> {
        if input.materials.is_empty() {
            return Err(AppError::validation("materials", "No quantities given"));
        }

        let mut tx = self.db.begin().await?;
        let (header, stage) = lock_stage_with_order(&mut tx, id).await?;
        ensure_order_access(actor, &header)?;

        if !stage.delivery_status.accepts_quantity_updates() {
            return Err(AppError::InvalidStateTransition(format!(
                "Delivered quantities cannot change while the stage is {}",
                stage.delivery_status
            )));
        }

        for line in &input.materials {
            let material = stage
                .purchase_materials
                .iter()
                .find(|m| m.id == line.purchase_material_id)
                .ok_or_else(|| AppError::not_found("Purchase material"))?;
            validate_delivered_quantity(material.total_quantity, line.delivered_quantity)?;

            sqlx::query("UPDATE purchase_materials SET delivered_quantity = $2 WHERE id = $1")
                .bind(material.id)
                .bind(line.delivered_quantity)
                .execute(&mut *tx)
                .await?;
        }

        let stage = load_stage(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(stage_id = %id, delivered = %stage.delivered_quantity(), "delivered quantities updated");
        Ok(stage)
    }

    pub async fn cancel_stage(&self, id: Uuid, input: CancelInput) -> AppResult<DeliveryStage> {
        let reason = input.reason()?;

        let mut tx = self.db.begin().await?;
        let (_, stage) = lock_stage_with_order(&mut tx, id).await?;
        if stage.delivery_status == DeliveryStatus::Pending {
            return Err(AppError::InvalidStateTransition(
                "Stages of an unapproved order are cancelled with the order".into(),
            ));
        }

        set_stage_status(&mut tx, &stage, DeliveryStatus::Cancelled).await?;
        sqlx::query("UPDATE delivery_stages SET cancel_reason = $2 WHERE id = $1")
            .bind(id)
            .bind(reason)
            .execute(&mut *tx)
            .await?;
        refresh_order_status(&mut tx, stage.purchasing_order_id).await?;

        let stage = load_stage(&mut tx, id).await?;
        tx.commit().await?;
        Ok(stage)
    }

    pub async fn start_delivering_supplemental(
        &self,
        actor: &AuthUser,
        id: Uuid,
    ) -> AppResult<DeliveryStage> {
        let mut tx = self.db.begin().await?;
        let (header, stage) = lock_stage_with_order(&mut tx, id).await?;
        ensure_order_access(actor, &header)?;

        if !stage.is_supplemental {
            return Err(AppError::InvalidStateTransition(
                "Only supplemental stages can be started this way".into(),
            ));
        }

        set_stage_status(&mut tx, &stage, DeliveryStatus::Delivering).await?;
        refresh_order_status(&mut tx, stage.purchasing_order_id).await?;

        let stage = load_stage(&mut tx, id).await?;
        tx.commit().await?;
        Ok(stage)
    }
}

pub(crate) async fn load_purchase_materials(
    conn: &mut PgConnection,
    stage_id: Uuid,
) -> AppResult<Vec<PurchaseMaterial>> {
    let rows = sqlx::query_as::<_, PurchaseMaterialRow>(&format!(
        "SELECT {} FROM purchase_materials WHERE delivery_stage_id = $1 ORDER BY id",
        MATERIAL_COLUMNS
    ))
    .bind(stage_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

async fn fetch_stage(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<DeliveryStage> {
    let row = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT {} FROM delivery_stages WHERE id = $1{}",
        STAGE_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Delivery stage"))?;

    let materials = load_purchase_materials(conn, id).await?;
    row.into_stage(materials)
}

pub(crate) async fn load_stage(conn: &mut PgConnection, id: Uuid) -> AppResult<DeliveryStage> {
    fetch_stage(conn, id, false).await
}

/// Lock a stage and the order it belongs to, order row first
pub(crate) async fn lock_stage_with_order(
    conn: &mut PgConnection,
    id: Uuid,
) -> AppResult<(OrderHeader, DeliveryStage)> {
    let order_id = sqlx::query_scalar::<_, Uuid>(
        "SELECT purchasing_order_id FROM delivery_stages WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Delivery stage"))?;

    let header = lock_order_header(conn, order_id).await?;
    let stage = fetch_stage(conn, id, true).await?;
    Ok((header, stage))
}

async fn fetch_order_stages(
    conn: &mut PgConnection,
    order_id: Uuid,
    lock: bool,
) -> AppResult<Vec<DeliveryStage>> {
    let rows = sqlx::query_as::<_, StageRow>(&format!(
        "SELECT {} FROM delivery_stages WHERE purchasing_order_id = $1 ORDER BY stage_order{}",
        STAGE_COLUMNS,
        if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut stages = Vec::with_capacity(rows.len());
    for row in rows {
        let materials = load_purchase_materials(conn, row.id).await?;
        stages.push(row.into_stage(materials)?);
    }
    Ok(stages)
}

pub(crate) async fn load_order_stages(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<Vec<DeliveryStage>> {
    fetch_order_stages(conn, order_id, false).await
}

/// Lock every stage of an order. The caller must already hold the order lock.
pub(crate) async fn lock_order_stages(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<Vec<DeliveryStage>> {
    fetch_order_stages(conn, order_id, true).await
}

/// Move a locked stage along its transition table
pub(crate) async fn set_stage_status(
    conn: &mut PgConnection,
    stage: &DeliveryStage,
    target: DeliveryStatus,
) -> AppResult<DeliveryStatus> {
    let next = stage.delivery_status.transition(target)?;

    let updated = sqlx::query(
        r#"
        UPDATE delivery_stages
        SET delivery_status = $2,
            delivered_at = CASE WHEN $2 = 'DELIVERED' AND delivered_at IS NULL
                                THEN NOW() ELSE delivered_at END
        WHERE id = $1 AND delivery_status = $3
        "#,
    )
    .bind(stage.id)
    .bind(next.as_str())
    .bind(stage.delivery_status.as_str())
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(stale_stage(stage));
    }

    tracing::info!(
        stage_id = %stage.id,
        purchasing_order_id = %stage.purchasing_order_id,
        from = %stage.delivery_status,
        to = %next,
        "delivery stage transitioned"
    );
    Ok(next)
}

/// Another transaction moved the stage after it was read
fn stale_stage(stage: &DeliveryStage) -> AppError {
    AppError::InvalidStateTransition(format!(
        "Delivery stage {} is no longer {}",
        stage.stage_order, stage.delivery_status
    ))
}

/// Insert a stage with its materials. Without an explicit `stage_order`
/// the stage is appended after the order's last one.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_stage(
    conn: &mut PgConnection,
    order_id: Uuid,
    stage_order: Option<i32>,
    delivery_date: NaiveDate,
    note: Option<&str>,
    is_supplemental: bool,
    status: DeliveryStatus,
    lines: &[NewStageLine],
) -> AppResult<Uuid> {
    let stage_order = match stage_order {
        Some(order) => order,
        None => {
            sqlx::query_scalar::<_, i32>(
                "SELECT COALESCE(MAX(stage_order), 0) + 1 FROM delivery_stages WHERE purchasing_order_id = $1",
            )
            .bind(order_id)
            .fetch_one(&mut *conn)
            .await?
        }
    };

    let stage_id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO delivery_stages (purchasing_order_id, stage_order, delivery_date,
                                     delivery_status, is_supplemental, note)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(order_id)
    .bind(stage_order)
    .bind(delivery_date)
    .bind(status.as_str())
    .bind(is_supplemental)
    .bind(note)
    .fetch_one(&mut *conn)
    .await?;

    for line in lines {
        let total_quantity = checked_quantity(line.package, line.material_per_package)?;
        let total_price = line_total(total_quantity, line.unit_price)?;
        sqlx::query(
            r#"
            INSERT INTO purchase_materials (delivery_stage_id, order_material_id, raw_material_id,
                                            package, material_per_package, unit, total_quantity,
                                            unit_price, total_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(stage_id)
        .bind(line.order_material_id)
        .bind(line.raw_material_id)
        .bind(line.package)
        .bind(line.material_per_package)
        .bind(&line.unit)
        .bind(total_quantity)
        .bind(line.unit_price)
        .bind(total_price)
        .execute(&mut *conn)
        .await?;
    }

    Ok(stage_id)
}
