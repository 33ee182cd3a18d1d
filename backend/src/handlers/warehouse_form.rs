//! Warehouse form HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use shared::{Action, Pagination, WarehouseForm};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::warehouse_form::{
    CreateFormInput, FormFilter, FromStageInput, WarehouseFormService,
};
use crate::AppState;

pub async fn list_forms(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<FormFilter>,
) -> AppResult<impl IntoResponse> {
    actor.require_internal()?;

    let service = WarehouseFormService::new(state.db.clone());
    Ok(Json(service.list_forms(filter, &pagination).await?))
}

pub async fn get_form(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<WarehouseForm>> {
    actor.require_internal()?;

    let service = WarehouseFormService::new(state.db.clone());
    Ok(Json(service.get_form(id).await?))
}

pub async fn create_form(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateFormInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::CreateWarehouseForm)?;
    input.validate()?;

    let service = WarehouseFormService::new(state.db.clone());
    let form = service.create_form(&actor, input).await?;
    Ok(super::created("Warehouse form created successfully", form))
}

/// Generate the export/import forms of an inspected stage
pub async fn create_forms_from_stage(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<FromStageInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::CreateWarehouseForm)?;

    let service = WarehouseFormService::new(state.db.clone());
    let forms = service.create_forms_from_stage(&actor, input).await?;
    Ok(super::created("Warehouse forms created from delivery stage", forms))
}

pub async fn complete_form(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ProcessWarehouseForm)?;

    let service = WarehouseFormService::new(state.db.clone());
    let form = service.complete_form(&actor, id).await?;
    Ok(super::updated("Warehouse form completed", form))
}

pub async fn cancel_form(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ProcessWarehouseForm)?;

    let service = WarehouseFormService::new(state.db.clone());
    let form = service.cancel_form(id).await?;
    Ok(super::updated("Warehouse form cancelled", form))
}

/// Download a form's lines as CSV
pub async fn export_form(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    actor.require_internal()?;

    let service = WarehouseFormService::new(state.db.clone());
    let (code, csv) = service.export_csv(id).await?;
    let disposition = format!("attachment; filename=\"{}.csv\"", code);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
