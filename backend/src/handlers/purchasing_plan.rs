//! Purchasing plan HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use shared::{Action, ApprovalInput, Pagination, PurchaseTask, PurchasingPlan};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::purchasing_plan::{
    AssignTaskInput, PlanFilter, PlanInput, PurchasingPlanService, TaskFilter,
};
use crate::AppState;

pub async fn list_plans(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<PlanFilter>,
) -> AppResult<impl IntoResponse> {
    actor.require_internal()?;

    let service = PurchasingPlanService::new(state.db.clone());
    Ok(Json(service.list_plans(filter, &pagination).await?))
}

pub async fn get_plan(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchasingPlan>> {
    actor.require_internal()?;

    let service = PurchasingPlanService::new(state.db.clone());
    Ok(Json(service.get_plan(id).await?))
}

pub async fn create_plan(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<PlanInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::CreatePlan)?;
    input.validate()?;

    let service = PurchasingPlanService::new(state.db.clone());
    let plan = service.create_plan(&actor, input).await?;
    Ok(super::created("Purchasing plan created successfully", plan))
}

/// Edit a pending or rejected plan; it goes back to the approval queue
pub async fn update_plan(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<PlanInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::EditPlan)?;
    input.validate()?;

    let service = PurchasingPlanService::new(state.db.clone());
    let plan = service.update_plan(id, input).await?;
    Ok(super::updated("Purchasing plan updated successfully", plan))
}

pub async fn approve_plan(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ApprovalInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ApprovePlan)?;

    let service = PurchasingPlanService::new(state.db.clone());
    let approved = input.approved;
    let plan = service.approve_plan(&actor, id, input).await?;
    let message = if approved {
        "Purchasing plan approved"
    } else {
        "Purchasing plan rejected"
    };
    Ok(super::updated(message, plan))
}

pub async fn assign_task(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((plan_id, task_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<AssignTaskInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::AssignTask)?;

    let service = PurchasingPlanService::new(state.db.clone());
    let task = service.assign_task(plan_id, task_id, input).await?;
    Ok(super::updated("Task assigned successfully", task))
}

/// Tasks of approved plans; purchasing staff only see their own
pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(filter): Query<TaskFilter>,
) -> AppResult<Json<Vec<PurchaseTask>>> {
    actor.require_internal()?;

    let service = PurchasingPlanService::new(state.db.clone());
    Ok(Json(service.list_tasks(&actor, filter).await?))
}
