//! Purchasing order HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use shared::{Action, ApprovalInput, OrderReconciliation, Pagination, PurchasingOrder};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::purchasing_order::{
    CancelInput, OrderFilter, OrderInput, PurchasingOrderService,
};
use crate::AppState;

/// Suppliers only get their own orders, once the manager approved them
pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<OrderFilter>,
) -> AppResult<impl IntoResponse> {
    let service = PurchasingOrderService::new(state.db.clone(), &state.config);
    Ok(Json(service.list_orders(&actor, filter, &pagination).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchasingOrder>> {
    let service = PurchasingOrderService::new(state.db.clone(), &state.config);
    Ok(Json(service.get_order(&actor, id).await?))
}

pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<OrderInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::CreateOrder)?;
    input.validate()?;

    let service = PurchasingOrderService::new(state.db.clone(), &state.config);
    let order = service.create_order(&actor, input).await?;
    Ok(super::created("Purchasing order created successfully", order))
}

pub async fn update_order(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<OrderInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::EditOrder)?;
    input.validate()?;

    let service = PurchasingOrderService::new(state.db.clone(), &state.config);
    let order = service.update_order(id, input).await?;
    Ok(super::updated("Purchasing order updated successfully", order))
}

pub async fn approve_manager(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ApprovalInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ApproveOrderManager)?;

    let service = PurchasingOrderService::new(state.db.clone(), &state.config);
    let approved = input.approved;
    let order = service.approve_manager(id, input).await?;
    let message = if approved {
        "Purchasing order approved by manager"
    } else {
        "Purchasing order rejected by manager"
    };
    Ok(super::updated(message, order))
}

pub async fn approve_supplier(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ApprovalInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ApproveOrderSupplier)?;

    let service = PurchasingOrderService::new(state.db.clone(), &state.config);
    let approved = input.approved;
    let order = service.approve_supplier(&actor, id, input).await?;
    let message = if approved {
        "Purchasing order accepted by supplier"
    } else {
        "Purchasing order declined by supplier"
    };
    Ok(super::updated(message, order))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<CancelInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::CancelOrder)?;

    let service = PurchasingOrderService::new(state.db.clone(), &state.config);
    let order = service.cancel_order(id, input).await?;
    Ok(super::updated("Purchasing order cancelled", order))
}

/// Per-material quantity ledger of an order
pub async fn reconciliation(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OrderReconciliation>> {
    let service = PurchasingOrderService::new(state.db.clone(), &state.config);
    Ok(Json(service.reconciliation(&actor, id).await?))
}
