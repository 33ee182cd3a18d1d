//! Purchasing plans, their purchase tasks and derived plan progress

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use shared::{
    derive_plan_process_status, derive_task_progress, document_prefix, ApprovalInput,
    ApproveStatus, PaginatedResponse, Pagination, PlanProcessStatus, PurchaseTask,
    PurchasingPlan, Role, TaskInput, TaskStatus,
};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::document_code::next_document_code;

#[derive(Debug, FromRow)]
struct PlanRow {
    id: Uuid,
    code: String,
    title: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    approve_status: String,
    process_status: String,
    reject_reason: Option<String>,
    note: Option<String>,
    created_by: Uuid,
    approved_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PlanRow {
    fn into_plan(self, purchase_tasks: Vec<PurchaseTask>) -> AppResult<PurchasingPlan> {
        Ok(PurchasingPlan {
            id: self.id,
            code: self.code,
            title: self.title,
            start_date: self.start_date,
            end_date: self.end_date,
            approve_status: self.approve_status.parse()?,
            process_status: self.process_status.parse()?,
            reject_reason: self.reject_reason,
            note: self.note,
            created_by: self.created_by,
            approved_by: self.approved_by,
            purchase_tasks,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    plan_id: Uuid,
    raw_material_id: Uuid,
    quantity: Decimal,
    processed_quantity: Decimal,
    remained_quantity: Decimal,
    finished_quantity: Decimal,
    purchasing_staff_id: Option<Uuid>,
    task_status: String,
    task_start_date: NaiveDate,
    task_end_date: NaiveDate,
    finish_date: Option<NaiveDate>,
}

impl TryFrom<TaskRow> for PurchaseTask {
    type Error = AppError;

    fn try_from(row: TaskRow) -> AppResult<Self> {
        Ok(PurchaseTask {
            id: row.id,
            plan_id: row.plan_id,
            raw_material_id: row.raw_material_id,
            quantity: row.quantity,
            processed_quantity: row.processed_quantity,
            remained_quantity: row.remained_quantity,
            finished_quantity: row.finished_quantity,
            purchasing_staff_id: row.purchasing_staff_id,
            task_status: row.task_status.parse()?,
            task_start_date: row.task_start_date,
            task_end_date: row.task_end_date,
            finish_date: row.finish_date,
        })
    }
}

const PLAN_COLUMNS: &str = "id, code, title, start_date, end_date, approve_status, \
     process_status, reject_reason, note, created_by, approved_by, created_at, updated_at";

const TASK_COLUMNS: &str = "id, plan_id, raw_material_id, quantity, \
     processed_quantity, remained_quantity, finished_quantity, purchasing_staff_id, \
     task_status, task_start_date, task_end_date, finish_date";

/// Plan as submitted for creation or resubmission
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub note: Option<String>,
    #[validate(length(min = 1, message = "A plan needs at least one task"))]
    pub tasks: Vec<TaskInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanFilter {
    pub approve_status: Option<ApproveStatus>,
    pub process_status: Option<PlanProcessStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    pub plan_id: Option<Uuid>,
    pub purchasing_staff_id: Option<Uuid>,
    pub task_status: Option<TaskStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTaskInput {
    pub purchasing_staff_id: Uuid,
}

/// Check the period and tasks of a submitted plan
fn validate_plan_input(input: &PlanInput) -> AppResult<()> {
    shared::validate_date_range(input.start_date, input.end_date)
        .map_err(|msg| AppError::validation("endDate", msg))?;

    let mut seen = HashSet::new();
    for task in &input.tasks {
        if !seen.insert(task.raw_material_id) {
            return Err(AppError::validation(
                "tasks",
                "Each raw material may appear only once in a plan",
            ));
        }
        shared::validate_positive_quantity(task.quantity)
            .map_err(|msg| AppError::validation("tasks.quantity", msg))?;
        shared::validate_date_range(task.task_start_date, task.task_end_date)
            .map_err(|msg| AppError::validation("tasks.taskEndDate", msg))?;
        if task.task_start_date < input.start_date || task.task_end_date > input.end_date {
            return Err(AppError::validation(
                "tasks.taskStartDate",
                "Task dates must fall within the plan period",
            ));
        }
    }
    Ok(())
}

/// Purchasing plan service
#[derive(Clone)]
pub struct PurchasingPlanService {
    db: PgPool,
}

impl PurchasingPlanService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_plans(
        &self,
        filter: PlanFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<PurchasingPlan>> {
        let approve_status = filter.approve_status.map(|s| s.as_str());
        let process_status = filter.process_status.map(|s| s.as_str());
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM purchasing_plans
            WHERE ($1::text IS NULL OR approve_status = $1)
              AND ($2::text IS NULL OR process_status = $2)
              AND ($3::text IS NULL OR code ILIKE $3 OR title ILIKE $3)
            "#,
        )
        .bind(approve_status)
        .bind(process_status)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, PlanRow>(&format!(
            r#"
            SELECT {} FROM purchasing_plans
            WHERE ($1::text IS NULL OR approve_status = $1)
              AND ($2::text IS NULL OR process_status = $2)
              AND ($3::text IS NULL OR code ILIKE $3 OR title ILIKE $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            PLAN_COLUMNS
        ))
        .bind(approve_status)
        .bind(process_status)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let mut conn = self.db.acquire().await?;
        let mut plans = Vec::with_capacity(rows.len());
        for row in rows {
            let tasks = load_tasks(&mut conn, row.id).await?;
            plans.push(row.into_plan(tasks)?);
        }

        Ok(PaginatedResponse::new(plans, pagination, total as u64))
    }

    pub async fn get_plan(&self, id: Uuid) -> AppResult<PurchasingPlan> {
        let mut conn = self.db.acquire().await?;
        load_plan(&mut conn, id).await
    }

    pub async fn create_plan(&self, actor: &AuthUser, input: PlanInput) -> AppResult<PurchasingPlan> {
        validate_plan_input(&input)?;

        let mut tx = self.db.begin().await?;
        let code = next_document_code(&mut tx, document_prefix::PURCHASING_PLAN).await?;

        let plan_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO purchasing_plans (code, title, start_date, end_date, note, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&code)
        .bind(input.title.trim())
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(&input.note)
        .bind(actor.user_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_tasks(&mut tx, plan_id, &input.tasks).await?;
        let plan = load_plan(&mut tx, plan_id).await?;
        tx.commit().await?;

        tracing::info!(plan_id = %plan_id, code = %code, "purchasing plan created");
        Ok(plan)
    }

    /// Edit a plan that has not been approved; a rejected plan goes back to PENDING
    pub async fn update_plan(&self, id: Uuid, input: PlanInput) -> AppResult<PurchasingPlan> {
        validate_plan_input(&input)?;

        let mut tx = self.db.begin().await?;
        let status = lock_plan_status(&mut tx, id).await?;
        let next = status.resubmit("purchasing plan")?;

        sqlx::query(
            r#"
            UPDATE purchasing_plans
            SET title = $2, start_date = $3, end_date = $4, note = $5,
                approve_status = $6, reject_reason = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input.title.trim())
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(&input.note)
        .bind(next.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM purchase_tasks WHERE plan_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_tasks(&mut tx, id, &input.tasks).await?;

        let plan = load_plan(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(plan_id = %id, from = %status, to = %next, "purchasing plan updated");
        Ok(plan)
    }

    pub async fn approve_plan(
        &self,
        actor: &AuthUser,
        id: Uuid,
        input: ApprovalInput,
    ) -> AppResult<PurchasingPlan> {
        let decision = input.decision()?;

        let mut tx = self.db.begin().await?;
        let status = lock_plan_status(&mut tx, id).await?;
        let next = status.decide("purchasing plan", decision)?;

        sqlx::query(
            r#"
            UPDATE purchasing_plans
            SET approve_status = $2, reject_reason = $3, approved_by = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next.as_str())
        .bind(input.reason())
        .bind(actor.user_id)
        .execute(&mut *tx)
        .await?;

        let plan = load_plan(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(plan_id = %id, from = %status, to = %next, "purchasing plan decided");
        Ok(plan)
    }

    /// Hand a task of an approved plan to a purchasing staff member
    pub async fn assign_task(
        &self,
        plan_id: Uuid,
        task_id: Uuid,
        input: AssignTaskInput,
    ) -> AppResult<PurchaseTask> {
        let mut tx = self.db.begin().await?;

        let status = lock_plan_status(&mut tx, plan_id).await?;
        if status != ApproveStatus::Approved {
            return Err(AppError::InvalidStateTransition(
                "Tasks can only be assigned on an approved plan".into(),
            ));
        }

        let staff_role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM users WHERE id = $1 AND is_active",
        )
        .bind(input.purchasing_staff_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Purchasing staff"))?;
        if staff_role.parse::<Role>()? != Role::PurchasingStaff {
            return Err(AppError::validation(
                "purchasingStaffId",
                "Tasks can only be assigned to purchasing staff",
            ));
        }

        let task: PurchaseTask = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {} FROM purchase_tasks WHERE id = $1 AND plan_id = $2 FOR UPDATE",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Purchase task"))?
        .try_into()?;

        if matches!(task.task_status, TaskStatus::Finished | TaskStatus::Cancelled) {
            return Err(AppError::InvalidStateTransition(format!(
                "A {} task cannot be reassigned",
                task.task_status
            )));
        }

        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "UPDATE purchase_tasks SET purchasing_staff_id = $2 WHERE id = $1 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(input.purchasing_staff_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            task_id = %task_id,
            purchasing_staff_id = %input.purchasing_staff_id,
            "purchase task assigned"
        );
        row.try_into()
    }

    /// Tasks of approved plans; purchasing staff only see their own
    pub async fn list_tasks(
        &self,
        actor: &AuthUser,
        filter: TaskFilter,
    ) -> AppResult<Vec<PurchaseTask>> {
        let staff_id = if actor.role == Role::PurchasingStaff {
            Some(actor.user_id)
        } else {
            filter.purchasing_staff_id
        };

        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            r#"
            SELECT {} FROM purchase_tasks t
            WHERE EXISTS (
                    SELECT 1 FROM purchasing_plans p
                    WHERE p.id = t.plan_id AND p.approve_status = 'APPROVED'
                  )
              AND ($1::uuid IS NULL OR t.plan_id = $1)
              AND ($2::uuid IS NULL OR t.purchasing_staff_id = $2)
              AND ($3::text IS NULL OR t.task_status = $3)
            ORDER BY t.task_end_date
            "#,
            TASK_COLUMNS
        ))
        .bind(filter.plan_id)
        .bind(staff_id)
        .bind(filter.task_status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

async fn lock_plan_status(conn: &mut PgConnection, id: Uuid) -> AppResult<ApproveStatus> {
    let status = sqlx::query_scalar::<_, String>(
        "SELECT approve_status FROM purchasing_plans WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Purchasing plan"))?;

    Ok(status.parse()?)
}

async fn insert_tasks(conn: &mut PgConnection, plan_id: Uuid, tasks: &[TaskInput]) -> AppResult<()> {
    for task in tasks {
        sqlx::query(
            r#"
            INSERT INTO purchase_tasks (plan_id, raw_material_id, quantity, remained_quantity,
                                        purchasing_staff_id, task_start_date, task_end_date)
            VALUES ($1, $2, $3, $3, $4, $5, $6)
            "#,
        )
        .bind(plan_id)
        .bind(task.raw_material_id)
        .bind(task.quantity)
        .bind(task.purchasing_staff_id)
        .bind(task.task_start_date)
        .bind(task.task_end_date)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_tasks(conn: &mut PgConnection, plan_id: Uuid) -> AppResult<Vec<PurchaseTask>> {
    let rows = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {} FROM purchase_tasks WHERE plan_id = $1 ORDER BY task_start_date, id",
        TASK_COLUMNS
    ))
    .bind(plan_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

async fn load_plan(conn: &mut PgConnection, id: Uuid) -> AppResult<PurchasingPlan> {
    let row = sqlx::query_as::<_, PlanRow>(&format!(
        "SELECT {} FROM purchasing_plans WHERE id = $1",
        PLAN_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Purchasing plan"))?;

    let tasks = load_tasks(conn, id).await?;
    row.into_plan(tasks)
}

/// Lock a task row for an order that draws on it. Its plan is locked
/// first, the same order `assign_task` takes them in.
pub(crate) async fn lock_task(conn: &mut PgConnection, task_id: Uuid) -> AppResult<PurchaseTask> {
    let plan_id = sqlx::query_scalar::<_, Uuid>("SELECT plan_id FROM purchase_tasks WHERE id = $1")
        .bind(task_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Purchase task"))?;
    lock_plan_status(conn, plan_id).await?;

    sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {} FROM purchase_tasks WHERE id = $1 FOR UPDATE",
        TASK_COLUMNS
    ))
    .bind(task_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Purchase task"))?
    .try_into()
}

/// Recompute a task's processed, remained and finished quantities from the
/// orders drawing on it, then the progress of its plan.
pub(crate) async fn refresh_task_progress(conn: &mut PgConnection, task_id: Uuid) -> AppResult<()> {
    let task = lock_task(conn, task_id).await?;

    let processed = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(om.total_quantity), 0)
        FROM order_materials om
        JOIN purchasing_orders po ON po.id = om.purchasing_order_id
        WHERE om.purchase_task_id = $1 AND po.order_status <> 'CANCELLED'
        "#,
    )
    .bind(task_id)
    .fetch_one(&mut *conn)
    .await?;

    let finished = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(pm.received_quantity), 0)
        FROM purchase_materials pm
        JOIN order_materials om ON om.id = pm.order_material_id
        WHERE om.purchase_task_id = $1
        "#,
    )
    .bind(task_id)
    .fetch_one(&mut *conn)
    .await?;

    let progress = derive_task_progress(
        task.quantity,
        processed,
        finished,
        task.task_status,
        task.finish_date,
        Utc::now().date_naive(),
    );

    sqlx::query(
        r#"
        UPDATE purchase_tasks
        SET processed_quantity = $2, remained_quantity = $3, finished_quantity = $4,
            task_status = $5, finish_date = $6
        WHERE id = $1
        "#,
    )
    .bind(task_id)
    .bind(processed)
    .bind(progress.remained_quantity)
    .bind(finished)
    .bind(progress.status.as_str())
    .bind(progress.finish_date)
    .execute(&mut *conn)
    .await?;

    if progress.status != task.task_status {
        tracing::info!(
            task_id = %task_id,
            from = %task.task_status,
            to = %progress.status,
            "purchase task progressed"
        );
    }

    refresh_plan_progress(conn, task.plan_id).await
}

/// Derive a plan's process status from its tasks
pub(crate) async fn refresh_plan_progress(conn: &mut PgConnection, plan_id: Uuid) -> AppResult<()> {
    let statuses = sqlx::query_scalar::<_, String>(
        "SELECT task_status FROM purchase_tasks WHERE plan_id = $1",
    )
    .bind(plan_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(|s| s.parse::<TaskStatus>())
    .collect::<Result<Vec<_>, _>>()?;

    let next = derive_plan_process_status(&statuses);
    let previous: PlanProcessStatus = sqlx::query_scalar::<_, String>(
        "SELECT process_status FROM purchasing_plans WHERE id = $1 FOR UPDATE",
    )
    .bind(plan_id)
    .fetch_one(&mut *conn)
    .await?
    .parse()?;

    if previous != next {
        sqlx::query("UPDATE purchasing_plans SET process_status = $2 WHERE id = $1")
            .bind(plan_id)
            .bind(next.as_str())
            .execute(&mut *conn)
            .await?;
        tracing::info!(plan_id = %plan_id, from = %previous, to = %next, "purchasing plan progressed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    fn task(material: Uuid, start: NaiveDate, end: NaiveDate) -> TaskInput {
        TaskInput {
            raw_material_id: material,
            quantity: Decimal::from(100),
            purchasing_staff_id: None,
            task_start_date: start,
            task_end_date: end,
        }
    }

    fn plan(tasks: Vec<TaskInput>) -> PlanInput {
        PlanInput {
            title: "Q2 steel".into(),
            start_date: date(4, 1),
            end_date: date(6, 30),
            note: None,
            tasks,
        }
    }

    #[test]
    fn test_valid_plan() {
        let input = plan(vec![task(Uuid::new_v4(), date(4, 1), date(5, 1))]);
        assert!(validate_plan_input(&input).is_ok());
    }

    #[test]
    fn test_duplicate_material_rejected() {
        let steel = Uuid::new_v4();
        let input = plan(vec![
            task(steel, date(4, 1), date(5, 1)),
            task(steel, date(5, 1), date(6, 1)),
        ]);
        assert!(matches!(
            validate_plan_input(&input),
            Err(AppError::Validation { ref field, .. }) if field == "tasks"
        ));
    }

    #[test]
    fn test_task_outside_plan_period_rejected() {
        let input = plan(vec![task(Uuid::new_v4(), date(3, 1), date(5, 1))]);
        assert!(validate_plan_input(&input).is_err());
    }

    #[test]
    fn test_reversed_plan_period_rejected() {
        let mut input = plan(vec![task(Uuid::new_v4(), date(4, 1), date(5, 1))]);
        input.end_date = date(3, 1);
        assert!(matches!(
            validate_plan_input(&input),
            Err(AppError::Validation { ref field, .. }) if field == "endDate"
        ));
    }
}
