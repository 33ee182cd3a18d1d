//! Delivery stage HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use shared::{Action, DeliveryStage, Pagination};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::delivery_stage::{
    DeliveryStageService, StageFilter, SupplementalStageInput, UpdateQuantityInput,
    UpdateStatusInput,
};
use crate::services::purchasing_order::CancelInput;
use crate::AppState;

pub async fn list_stages(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<StageFilter>,
) -> AppResult<impl IntoResponse> {
    let service = DeliveryStageService::new(state.db.clone());
    Ok(Json(service.list_stages(&actor, filter, &pagination).await?))
}

pub async fn get_stage(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeliveryStage>> {
    let service = DeliveryStageService::new(state.db.clone());
    Ok(Json(service.get_stage(&actor, id).await?))
}

/// Schedule an extra stage for open shortfall
pub async fn create_supplemental_stage(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<SupplementalStageInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::CreateSupplementalStage)?;

    let service = DeliveryStageService::new(state.db.clone());
    let stage = service.create_supplemental_stage(input).await?;
    Ok(super::created("Supplemental delivery stage created", stage))
}

pub async fn update_status(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::UpdateDelivery)?;

    let service = DeliveryStageService::new(state.db.clone());
    let stage = service.update_status(&actor, id, input).await?;
    let message = format!("Delivery stage is now {}", stage.delivery_status);
    Ok(super::updated(&message, stage))
}

pub async fn update_quantity(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateQuantityInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::UpdateDelivery)?;

    let service = DeliveryStageService::new(state.db.clone());
    let stage = service.update_quantity(&actor, id, input).await?;
    Ok(super::updated("Delivered quantities updated", stage))
}

pub async fn cancel_stage(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<CancelInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::CancelStage)?;

    let service = DeliveryStageService::new(state.db.clone());
    let stage = service.cancel_stage(id, input).await?;
    Ok(super::updated("Delivery stage cancelled", stage))
}

/// Supplier starts shipping a `SupInactive` supplemental stage
pub async fn start_delivering_supplemental(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::StartSupplementalDelivery)?;

    let service = DeliveryStageService::new(state.db.clone());
    let stage = service.start_delivering_supplemental(&actor, id).await?;
    Ok(super::updated("Supplemental delivery started", stage))
}
