//! Raw material catalog HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use shared::{Action, Pagination, RawMaterial};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::raw_material::{
    CreateRawMaterialInput, RawMaterialFilter, RawMaterialService, UpdateRawMaterialInput,
};
use crate::AppState;

pub async fn list_raw_materials(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<RawMaterialFilter>,
) -> AppResult<impl IntoResponse> {
    let service = RawMaterialService::new(state.db.clone());
    Ok(Json(service.list(filter, &pagination).await?))
}

pub async fn get_raw_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RawMaterial>> {
    let service = RawMaterialService::new(state.db.clone());
    Ok(Json(service.get(id).await?))
}

pub async fn create_raw_material(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateRawMaterialInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ManageMaterials)?;
    input.validate()?;

    let service = RawMaterialService::new(state.db.clone());
    let material = service.create(input).await?;
    Ok(super::created("Raw material created successfully", material))
}

pub async fn update_raw_material(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateRawMaterialInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ManageMaterials)?;
    input.validate()?;

    let service = RawMaterialService::new(state.db.clone());
    let material = service.update(id, input).await?;
    Ok(super::updated("Raw material updated successfully", material))
}
