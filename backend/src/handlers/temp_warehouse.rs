//! Temporary warehouse request HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use shared::{Action, ApprovalInput, Pagination, TempWarehouseRequest};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::temp_warehouse::{
    CreateTempRequestInput, TempRequestFilter, TempWarehouseService,
};
use crate::AppState;

pub async fn list_requests(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<TempRequestFilter>,
) -> AppResult<impl IntoResponse> {
    actor.require_internal()?;

    let service = TempWarehouseService::new(state.db.clone());
    Ok(Json(service.list_requests(filter, &pagination).await?))
}

pub async fn get_request(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TempWarehouseRequest>> {
    actor.require_internal()?;

    let service = TempWarehouseService::new(state.db.clone());
    Ok(Json(service.get_request(id).await?))
}

pub async fn create_request(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateTempRequestInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::RequestTempWarehouse)?;

    let service = TempWarehouseService::new(state.db.clone());
    let request = service.create_request(&actor, input).await?;
    Ok(super::created("Temporary warehouse requested", request))
}

pub async fn approve_request(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ApprovalInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ResolveTempWarehouse)?;

    let service = TempWarehouseService::new(state.db.clone());
    let approved = input.approved;
    let request = service.approve_request(&actor, id, input).await?;
    let message = if approved {
        "Temporary warehouse request approved, import form created"
    } else {
        "Temporary warehouse request rejected"
    };
    Ok(super::updated(message, request))
}
