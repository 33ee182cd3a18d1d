//! Inspection request HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use shared::{Action, InspectionRequest, Pagination};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::inspection::{
    CreateInspectionInput, InspectionFilter, InspectionResultInput, InspectionService,
};
use crate::AppState;

pub async fn list_requests(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<InspectionFilter>,
) -> AppResult<impl IntoResponse> {
    actor.require_internal()?;

    let service = InspectionService::new(state.db.clone());
    Ok(Json(service.list_requests(filter, &pagination).await?))
}

pub async fn get_request(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<InspectionRequest>> {
    actor.require_internal()?;

    let service = InspectionService::new(state.db.clone());
    Ok(Json(service.get_request(id).await?))
}

pub async fn create_request(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateInspectionInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::RequestInspection)?;

    let service = InspectionService::new(state.db.clone());
    let request = service.create_request(&actor, input).await?;
    Ok(super::created("Inspection requested", request))
}

pub async fn record_result(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<InspectionResultInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::RecordInspection)?;

    let service = InspectionService::new(state.db.clone());
    let request = service.record_result(&actor, id, input).await?;
    Ok(super::updated("Inspection result recorded", request))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::CancelInspection)?;

    let service = InspectionService::new(state.db.clone());
    let request = service.cancel_request(id).await?;
    Ok(super::updated("Inspection request cancelled", request))
}
