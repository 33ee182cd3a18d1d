//! Purchasing orders: creation with a delivery schedule, dual approval,
//! cancellation and quantity reconciliation

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    check_task_capacity, derive_order_status, document_prefix, line_total, order_totals,
    reconcile_order, validate_stage_allocation, ApprovalInput, ApproveStatus, DeliveryStatus,
    DualApproval, OrderMaterial, OrderMaterialInput, OrderReconciliation, OrderStatus,
    OrderedQuantity, PaginatedResponse, Pagination, PurchasingOrder, Role, StageInput,
    StageQuantities, SupplierSnapshot, TaskStatus,
};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::delivery_stage::{
    insert_stage, load_order_stages, lock_order_stages, set_stage_status, NewStageLine,
};
use crate::services::document_code::next_document_code;
use crate::services::purchasing_plan::{lock_task, refresh_task_progress};

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    po_code: String,
    plan_id: Option<Uuid>,
    supplier_id: Uuid,
    supplier_name: String,
    supplier_company_name: Option<String>,
    supplier_tax_code: Option<String>,
    supplier_address: Option<String>,
    supplier_email: String,
    supplier_phone: Option<String>,
    manager_approve_status: String,
    supplier_approve_status: String,
    order_status: String,
    reject_reason: Option<String>,
    cancel_reason: Option<String>,
    note: Option<String>,
    sub_total: Decimal,
    vat_rate: Decimal,
    vat_amount: Decimal,
    total_amount: Decimal,
    currency: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const ORDER_COLUMNS: &str = "id, po_code, plan_id, supplier_id, supplier_name, \
     supplier_company_name, supplier_tax_code, supplier_address, supplier_email, supplier_phone, \
     manager_approve_status, supplier_approve_status, order_status, reject_reason, cancel_reason, \
     note, sub_total, vat_rate, vat_amount, total_amount, currency, created_by, created_at, updated_at";

#[derive(Debug, FromRow)]
struct OrderMaterialRow {
    id: Uuid,
    purchasing_order_id: Uuid,
    raw_material_id: Uuid,
    purchase_task_id: Option<Uuid>,
    package: Decimal,
    material_per_package: Decimal,
    unit: String,
    total_quantity: Decimal,
    unit_price: Decimal,
    total_price: Decimal,
}

impl From<OrderMaterialRow> for OrderMaterial {
    fn from(row: OrderMaterialRow) -> Self {
        OrderMaterial {
            id: row.id,
            purchasing_order_id: row.purchasing_order_id,
            raw_material_id: row.raw_material_id,
            purchase_task_id: row.purchase_task_id,
            package: row.package,
            material_per_package: row.material_per_package,
            unit: row.unit,
            total_quantity: row.total_quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
        }
    }
}

/// Status columns of an order, enough to gate a transition
#[derive(Debug, Clone)]
pub(crate) struct OrderHeader {
    pub supplier_id: Uuid,
    pub order_status: OrderStatus,
    pub approval: DualApproval,
}

#[derive(Debug, FromRow)]
struct OrderHeaderRow {
    supplier_id: Uuid,
    order_status: String,
    manager_approve_status: String,
    supplier_approve_status: String,
}

impl TryFrom<OrderHeaderRow> for OrderHeader {
    type Error = AppError;

    fn try_from(row: OrderHeaderRow) -> AppResult<Self> {
        Ok(OrderHeader {
            supplier_id: row.supplier_id,
            order_status: row.order_status.parse()?,
            approval: DualApproval::new(
                row.manager_approve_status.parse()?,
                row.supplier_approve_status.parse()?,
            ),
        })
    }
}

/// Order with its materials and delivery schedule, as submitted
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    pub plan_id: Option<Uuid>,
    pub supplier_id: Uuid,
    pub note: Option<String>,
    #[validate(length(min = 1, message = "An order needs at least one material"))]
    pub order_materials: Vec<OrderMaterialInput>,
    #[validate(length(min = 1, message = "An order needs at least one delivery stage"))]
    pub delivery_stages: Vec<StageInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub order_status: Option<OrderStatus>,
    pub supplier_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub search: Option<String>,
}

/// Body of every cancel endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelInput {
    pub reason: Option<String>,
}

impl CancelInput {
    pub fn reason(&self) -> AppResult<&str> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| AppError::validation("reason", "A cancel reason is required"))
    }
}

/// Suppliers only reach their own orders, and only after the manager signed off
pub(crate) fn ensure_order_access(actor: &AuthUser, header: &OrderHeader) -> AppResult<()> {
    if actor.role.sees_all_orders() {
        return Ok(());
    }
    if header.supplier_id == actor.user_id && header.approval.manager == ApproveStatus::Approved {
        Ok(())
    } else {
        Err(AppError::not_found("Purchasing order"))
    }
}

/// Purchasing order service
#[derive(Clone)]
pub struct PurchasingOrderService {
    db: PgPool,
    vat_rate: Decimal,
    currency: String,
}

impl PurchasingOrderService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            vat_rate: config.procurement.vat_rate,
            currency: config.procurement.currency.clone(),
        }
    }

    pub async fn list_orders(
        &self,
        actor: &AuthUser,
        filter: OrderFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<PurchasingOrder>> {
        let (supplier_id, manager_approved_only) = if actor.role.sees_all_orders() {
            (filter.supplier_id, false)
        } else {
            (Some(actor.user_id), true)
        };
        let status = filter.order_status.map(|s| s.as_str());
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let where_clause = r#"
            WHERE ($1::text IS NULL OR order_status = $1)
              AND ($2::uuid IS NULL OR supplier_id = $2)
              AND ($3::uuid IS NULL OR plan_id = $3)
              AND ($4::text IS NULL OR po_code ILIKE $4 OR supplier_name ILIKE $4
                   OR supplier_company_name ILIKE $4)
              AND (NOT $5 OR manager_approve_status = 'APPROVED')
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM purchasing_orders {}",
            where_clause
        ))
        .bind(status)
        .bind(supplier_id)
        .bind(filter.plan_id)
        .bind(&search)
        .bind(manager_approved_only)
        .fetch_one(&self.db)
        .await?;

        let ids = sqlx::query_scalar::<_, Uuid>(&format!(
            "SELECT id FROM purchasing_orders {} ORDER BY created_at DESC LIMIT $6 OFFSET $7",
            where_clause
        ))
        .bind(status)
        .bind(supplier_id)
        .bind(filter.plan_id)
        .bind(&search)
        .bind(manager_approved_only)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            orders.push(load_order(&mut conn, id).await?);
        }

        Ok(PaginatedResponse::new(orders, pagination, total as u64))
    }

    pub async fn get_order(&self, actor: &AuthUser, id: Uuid) -> AppResult<PurchasingOrder> {
        let mut conn = self.db.acquire().await?;
        let header = load_order_header(&mut conn, id).await?;
        ensure_order_access(actor, &header)?;
        load_order(&mut conn, id).await
    }

    pub async fn create_order(&self, actor: &AuthUser, input: OrderInput) -> AppResult<PurchasingOrder> {
        let mut tx = self.db.begin().await?;

        let supplier = load_supplier_snapshot(&mut tx, input.supplier_id).await?;
        let code = next_document_code(&mut tx, document_prefix::PURCHASING_ORDER).await?;

        let order_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO purchasing_orders (po_code, plan_id, supplier_id, supplier_name,
                supplier_company_name, supplier_tax_code, supplier_address, supplier_email,
                supplier_phone, note, vat_rate, currency, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(&code)
        .bind(input.plan_id)
        .bind(input.supplier_id)
        .bind(&supplier.supplier_name)
        .bind(&supplier.supplier_company_name)
        .bind(&supplier.supplier_tax_code)
        .bind(&supplier.supplier_address)
        .bind(&supplier.supplier_email)
        .bind(&supplier.supplier_phone)
        .bind(&input.note)
        .bind(self.vat_rate)
        .bind(&self.currency)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        let tasks = write_order_lines(&mut tx, order_id, &input, self.vat_rate).await?;
        for task_id in &tasks {
            refresh_task_progress(&mut tx, *task_id).await?;
        }

        let order = load_order(&mut tx, order_id).await?;
        tx.commit().await?;

        tracing::info!(
            purchasing_order_id = %order_id,
            po_code = %code,
            total_amount = %order.total_amount,
            "purchasing order created"
        );
        Ok(order)
    }

    /// Replace the lines of a PENDING order; both approvals start over
    pub async fn update_order(&self, id: Uuid, input: OrderInput) -> AppResult<PurchasingOrder> {
        let mut tx = self.db.begin().await?;

        let header = lock_order_header(&mut tx, id).await?;
        if !header.order_status.is_editable() {
            return Err(AppError::InvalidStateTransition(format!(
                "A {} order can no longer be edited",
                header.order_status
            )));
        }

        let previous_tasks = sqlx::query_scalar::<_, Uuid>(
            "SELECT purchase_task_id FROM order_materials WHERE purchasing_order_id = $1 AND purchase_task_id IS NOT NULL",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM delivery_stages WHERE purchasing_order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM order_materials WHERE purchasing_order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for task_id in &previous_tasks {
            refresh_task_progress(&mut tx, *task_id).await?;
        }

        let supplier = load_supplier_snapshot(&mut tx, input.supplier_id).await?;
        let approval = header.approval.reset();
        sqlx::query(
            r#"
            UPDATE purchasing_orders
            SET plan_id = $2, supplier_id = $3, supplier_name = $4, supplier_company_name = $5,
                supplier_tax_code = $6, supplier_address = $7, supplier_email = $8,
                supplier_phone = $9, note = $10, manager_approve_status = $11,
                supplier_approve_status = $12, reject_reason = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.plan_id)
        .bind(input.supplier_id)
        .bind(&supplier.supplier_name)
        .bind(&supplier.supplier_company_name)
        .bind(&supplier.supplier_tax_code)
        .bind(&supplier.supplier_address)
        .bind(&supplier.supplier_email)
        .bind(&supplier.supplier_phone)
        .bind(&input.note)
        .bind(approval.manager.as_str())
        .bind(approval.supplier.as_str())
        .execute(&mut *tx)
        .await?;

        let vat_rate = sqlx::query_scalar::<_, Decimal>(
            "SELECT vat_rate FROM purchasing_orders WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let tasks = write_order_lines(&mut tx, id, &input, vat_rate).await?;
        for task_id in &tasks {
            refresh_task_progress(&mut tx, *task_id).await?;
        }

        let order = load_order(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(purchasing_order_id = %id, "purchasing order updated, approvals reset");
        Ok(order)
    }

    pub async fn approve_manager(&self, id: Uuid, input: ApprovalInput) -> AppResult<PurchasingOrder> {
        let decision = input.decision()?;

        let mut tx = self.db.begin().await?;
        let header = lock_order_header(&mut tx, id).await?;
        if !header.order_status.is_editable() {
            return Err(AppError::InvalidStateTransition(format!(
                "A {} order cannot be approved",
                header.order_status
            )));
        }
        let approval = header.approval.decide_manager(decision)?;

        sqlx::query(
            "UPDATE purchasing_orders SET manager_approve_status = $2, reject_reason = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(approval.manager.as_str())
        .bind(input.reason())
        .execute(&mut *tx)
        .await?;

        let order = load_order(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            purchasing_order_id = %id,
            from = %header.approval.manager,
            to = %approval.manager,
            "manager approval decided"
        );
        Ok(order)
    }

    /// Supplier sign-off. Once both sides approved, the order and its
    /// scheduled stages become APPROVED.
    pub async fn approve_supplier(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: ApprovalInput,
    ) -> AppResult<PurchasingOrder> {
        let decision = input.decision()?;

        let mut tx = self.db.begin().await?;
        let header = lock_order_header(&mut tx, id).await?;
        ensure_order_access(actor, &header)?;
        if !header.order_status.is_editable() {
            return Err(AppError::InvalidStateTransition(format!(
                "A {} order cannot be approved",
                header.order_status
            )));
        }
        let approval = header.approval.decide_supplier(decision)?;

        let order_status = if approval.is_approved() {
            header.order_status.transition(OrderStatus::Approved)?
        } else {
            header.order_status
        };

        sqlx::query(
            r#"
            UPDATE purchasing_orders
            SET supplier_approve_status = $2, order_status = $3, reject_reason = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(approval.supplier.as_str())
        .bind(order_status.as_str())
        .bind(input.reason())
        .execute(&mut *tx)
        .await?;

        if order_status == OrderStatus::Approved {
            for stage in lock_order_stages(&mut tx, id).await? {
                if stage.delivery_status == DeliveryStatus::Pending {
                    set_stage_status(&mut tx, &stage, DeliveryStatus::Approved).await?;
                }
            }
        }

        let order = load_order(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            purchasing_order_id = %id,
            supplier_approval = %approval.supplier,
            order_status = %order_status,
            "supplier approval decided"
        );
        Ok(order)
    }

    pub async fn cancel_order(&self, id: Uuid, input: CancelInput) -> AppResult<PurchasingOrder> {
        let reason = input.reason()?;

        let mut tx = self.db.begin().await?;
        let header = lock_order_header(&mut tx, id).await?;
        let next = header.order_status.transition(OrderStatus::Cancelled)?;

        for stage in lock_order_stages(&mut tx, id).await? {
            if stage.delivery_status.is_cancellable() {
                set_stage_status(&mut tx, &stage, DeliveryStatus::Cancelled).await?;
            } else if !stage.delivery_status.is_terminal() {
                return Err(AppError::InvalidStateTransition(format!(
                    "Stage {} is already {}",
                    stage.stage_order, stage.delivery_status
                )));
            }
        }

        sqlx::query(
            "UPDATE purchasing_orders SET order_status = $2, cancel_reason = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(next.as_str())
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        let tasks = sqlx::query_scalar::<_, Uuid>(
            "SELECT purchase_task_id FROM order_materials WHERE purchasing_order_id = $1 AND purchase_task_id IS NOT NULL",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        for task_id in &tasks {
            refresh_task_progress(&mut tx, *task_id).await?;
        }

        let order = load_order(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            purchasing_order_id = %id,
            from = %header.order_status,
            to = %next,
            "purchasing order cancelled"
        );
        Ok(order)
    }

    /// Ordered vs delivered vs inspected vs received, per material
    pub async fn reconciliation(&self, actor: &AuthUser, id: Uuid) -> AppResult<OrderReconciliation> {
        let mut conn = self.db.acquire().await?;
        let header = load_order_header(&mut conn, id).await?;
        ensure_order_access(actor, &header)?;
        reconcile(&mut conn, id).await
    }
}

async fn load_supplier_snapshot(conn: &mut PgConnection, supplier_id: Uuid) -> AppResult<SupplierSnapshot> {
    #[derive(FromRow)]
    struct SupplierRow {
        full_name: String,
        email: String,
        phone: Option<String>,
        role: String,
        is_active: bool,
        company_name: Option<String>,
        tax_code: Option<String>,
        address: Option<String>,
    }

    let row = sqlx::query_as::<_, SupplierRow>(
        r#"
        SELECT full_name, email, phone, role, is_active, company_name, tax_code, address
        FROM users WHERE id = $1
        "#,
    )
    .bind(supplier_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Supplier"))?;

    if row.role.parse::<Role>()? != Role::Supplier || !row.is_active {
        return Err(AppError::validation(
            "supplierId",
            "The selected account is not an active supplier",
        ));
    }

    Ok(SupplierSnapshot {
        supplier_name: row.full_name,
        supplier_company_name: row.company_name,
        supplier_tax_code: row.tax_code,
        supplier_address: row.address,
        supplier_email: row.email,
        supplier_phone: row.phone,
    })
}

/// Insert order materials and the planned stages, then store the totals.
/// Returns the purchase tasks the order draws on.
async fn write_order_lines(
    conn: &mut PgConnection,
    order_id: Uuid,
    input: &OrderInput,
    vat_rate: Decimal,
) -> AppResult<BTreeSet<Uuid>> {
    validate_stage_allocation(&input.order_materials, &input.delivery_stages)?;

    let mut tasks = BTreeSet::new();
    let mut lines: Vec<(Uuid, &OrderMaterialInput, String)> = Vec::new();

    for material in &input.order_materials {
        let unit = sqlx::query_scalar::<_, String>(
            "SELECT unit FROM raw_materials WHERE id = $1 AND is_active",
        )
        .bind(material.raw_material_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Raw material"))?;

        if let Some(task_id) = material.purchase_task_id {
            check_task_allocation(conn, task_id, input.plan_id, material).await?;
            tasks.insert(task_id);
        }

        let total_quantity = material.total_quantity()?;
        let total_price = line_total(total_quantity, material.unit_price)?;
        let order_material_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO order_materials (purchasing_order_id, raw_material_id, purchase_task_id,
                                         package, material_per_package, unit, total_quantity,
                                         unit_price, total_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(material.raw_material_id)
        .bind(material.purchase_task_id)
        .bind(material.package)
        .bind(material.material_per_package)
        .bind(&unit)
        .bind(total_quantity)
        .bind(material.unit_price)
        .bind(total_price)
        .fetch_one(&mut *conn)
        .await?;

        lines.push((order_material_id, material, unit));
    }

    let mut stages: Vec<&StageInput> = input.delivery_stages.iter().collect();
    stages.sort_by_key(|s| s.stage_order);
    for stage in stages {
        let stage_lines = stage
            .materials
            .iter()
            .map(|m| -> AppResult<NewStageLine> {
                let (order_material_id, ordered, unit) = lines
                    .iter()
                    .find(|(_, om, _)| om.raw_material_id == m.raw_material_id)
                    .ok_or(shared::LedgerError::UnknownMaterial(m.raw_material_id))?;
                Ok(NewStageLine {
                    order_material_id: *order_material_id,
                    raw_material_id: m.raw_material_id,
                    package: m.package,
                    material_per_package: m.material_per_package,
                    unit: unit.clone(),
                    unit_price: ordered.unit_price,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        insert_stage(
            conn,
            order_id,
            Some(stage.stage_order),
            stage.delivery_date,
            stage.note.as_deref(),
            false,
            DeliveryStatus::Pending,
            &stage_lines,
        )
        .await?;
    }

    let priced = input
        .order_materials
        .iter()
        .map(|m| Ok((m.total_quantity()?, m.unit_price)))
        .collect::<Result<Vec<_>, shared::LedgerError>>()?;
    let totals = order_totals(priced, vat_rate)?;
    sqlx::query(
        r#"
        UPDATE purchasing_orders
        SET sub_total = $2, vat_amount = $3, total_amount = $4
        WHERE id = $1
        "#,
    )
    .bind(order_id)
    .bind(totals.sub_total)
    .bind(totals.vat_amount)
    .bind(totals.total_amount)
    .execute(&mut *conn)
    .await?;

    Ok(tasks)
}

/// An order line drawing on a task must match the task's material, belong
/// to an approved plan and fit into what the task still needs
async fn check_task_allocation(
    conn: &mut PgConnection,
    task_id: Uuid,
    plan_id: Option<Uuid>,
    material: &OrderMaterialInput,
) -> AppResult<()> {
    let task = lock_task(conn, task_id).await?;

    if task.raw_material_id != material.raw_material_id {
        return Err(AppError::validation(
            "orderMaterials.purchaseTaskId",
            "The task is for a different raw material",
        ));
    }
    if plan_id.is_some_and(|p| p != task.plan_id) {
        return Err(AppError::validation(
            "orderMaterials.purchaseTaskId",
            "The task belongs to another plan",
        ));
    }
    if matches!(task.task_status, TaskStatus::Finished | TaskStatus::Cancelled) {
        return Err(AppError::InvalidStateTransition(format!(
            "A {} task cannot take new orders",
            task.task_status
        )));
    }

    let plan_status = sqlx::query_scalar::<_, String>(
        "SELECT approve_status FROM purchasing_plans WHERE id = $1",
    )
    .bind(task.plan_id)
    .fetch_one(&mut *conn)
    .await?
    .parse::<ApproveStatus>()?;
    if plan_status != ApproveStatus::Approved {
        return Err(AppError::InvalidStateTransition(
            "Orders can only draw on tasks of an approved plan".into(),
        ));
    }

    check_task_capacity(
        task.quantity,
        task.processed_quantity,
        material.total_quantity()?,
    )?;
    Ok(())
}

async fn fetch_order_header(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<OrderHeader> {
    sqlx::query_as::<_, OrderHeaderRow>(&format!(
        r#"
        SELECT supplier_id, order_status, manager_approve_status, supplier_approve_status
        FROM purchasing_orders WHERE id = $1{}
        "#,
        if lock { " FOR UPDATE" } else { "" }
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Purchasing order"))?
    .try_into()
}

pub(crate) async fn load_order_header(conn: &mut PgConnection, id: Uuid) -> AppResult<OrderHeader> {
    fetch_order_header(conn, id, false).await
}

pub(crate) async fn lock_order_header(conn: &mut PgConnection, id: Uuid) -> AppResult<OrderHeader> {
    fetch_order_header(conn, id, true).await
}

pub(crate) async fn load_order_materials(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<Vec<OrderMaterial>> {
    let rows = sqlx::query_as::<_, OrderMaterialRow>(
        r#"
        SELECT id, purchasing_order_id, raw_material_id, purchase_task_id, package,
               material_per_package, unit, total_quantity, unit_price, total_price
        FROM order_materials WHERE purchasing_order_id = $1
        ORDER BY id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Quantities written off through approved ACCEPT_SHORTAGE reports
pub(crate) async fn load_waived(
    conn: &mut PgConnection,
    order_id: Uuid,
) -> AppResult<Vec<OrderedQuantity>> {
    let rows = sqlx::query_as::<_, (Uuid, Decimal)>(
        r#"
        SELECT l.raw_material_id, SUM(l.quantity)
        FROM po_report_lines l
        JOIN po_reports r ON r.id = l.po_report_id
        WHERE r.purchasing_order_id = $1
          AND r.resolution_type = 'ACCEPT_SHORTAGE'
          AND r.approve_status = 'APPROVED'
        GROUP BY l.raw_material_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(raw_material_id, quantity)| OrderedQuantity {
            raw_material_id,
            quantity,
        })
        .collect())
}

pub(crate) async fn load_order(conn: &mut PgConnection, id: Uuid) -> AppResult<PurchasingOrder> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {} FROM purchasing_orders WHERE id = $1",
        ORDER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Purchasing order"))?;

    let order_materials = load_order_materials(conn, id).await?;
    let delivery_stages = load_order_stages(conn, id).await?;

    Ok(PurchasingOrder {
        id: row.id,
        po_code: row.po_code,
        plan_id: row.plan_id,
        supplier_id: row.supplier_id,
        supplier: SupplierSnapshot {
            supplier_name: row.supplier_name,
            supplier_company_name: row.supplier_company_name,
            supplier_tax_code: row.supplier_tax_code,
            supplier_address: row.supplier_address,
            supplier_email: row.supplier_email,
            supplier_phone: row.supplier_phone,
        },
        manager_approve_status: row.manager_approve_status.parse()?,
        supplier_approve_status: row.supplier_approve_status.parse()?,
        order_status: row.order_status.parse()?,
        reject_reason: row.reject_reason,
        cancel_reason: row.cancel_reason,
        note: row.note,
        sub_total: row.sub_total,
        vat_rate: row.vat_rate,
        vat_amount: row.vat_amount,
        total_amount: row.total_amount,
        currency: row.currency,
        order_materials,
        delivery_stages,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub(crate) async fn reconcile(conn: &mut PgConnection, order_id: Uuid) -> AppResult<OrderReconciliation> {
    let ordered: Vec<OrderedQuantity> = load_order_materials(conn, order_id)
        .await?
        .iter()
        .map(Into::into)
        .collect();
    let stages: Vec<StageQuantities> = load_order_stages(conn, order_id)
        .await?
        .iter()
        .map(Into::into)
        .collect();
    let waived = load_waived(conn, order_id).await?;

    Ok(reconcile_order(&ordered, &stages, &waived))
}

/// Re-derive an approved order's status from its stages and open shortfall
pub(crate) async fn refresh_order_status(conn: &mut PgConnection, order_id: Uuid) -> AppResult<OrderStatus> {
    let header = lock_order_header(conn, order_id).await?;

    let ordered: Vec<OrderedQuantity> = load_order_materials(conn, order_id)
        .await?
        .iter()
        .map(Into::into)
        .collect();
    let stages: Vec<StageQuantities> = load_order_stages(conn, order_id)
        .await?
        .iter()
        .map(Into::into)
        .collect();
    let waived = load_waived(conn, order_id).await?;
    let reconciliation = reconcile_order(&ordered, &stages, &waived);

    let next = derive_order_status(header.order_status, &stages, &reconciliation);
    if next != header.order_status {
        // Derived moves skip intermediate steps only along the table
        let mut current = header.order_status;
        if current == OrderStatus::Approved && next == OrderStatus::Finished {
            current = current.transition(OrderStatus::InProgress)?;
        }
        current.transition(next)?;

        sqlx::query("UPDATE purchasing_orders SET order_status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(next.as_str())
            .execute(&mut *conn)
            .await?;

        tracing::info!(
            purchasing_order_id = %order_id,
            from = %header.order_status,
            to = %next,
            "purchasing order progressed"
        );
    }
    Ok(next)
}
