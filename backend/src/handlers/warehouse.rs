//! Warehouse and stock HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use shared::{Action, Pagination, Warehouse};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::warehouse::{
    CreateWarehouseInput, StockFilter, UpdateWarehouseInput, WarehouseFilter, WarehouseService,
};
use crate::AppState;

pub async fn list_warehouses(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<WarehouseFilter>,
) -> AppResult<impl IntoResponse> {
    actor.require_internal()?;

    let service = WarehouseService::new(state.db.clone());
    Ok(Json(service.list_warehouses(filter, &pagination).await?))
}

pub async fn get_warehouse(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Warehouse>> {
    actor.require_internal()?;

    let service = WarehouseService::new(state.db.clone());
    Ok(Json(service.get_warehouse(id).await?))
}

pub async fn create_warehouse(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateWarehouseInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ManageWarehouses)?;
    input.validate()?;

    let service = WarehouseService::new(state.db.clone());
    let warehouse = service.create_warehouse(input).await?;
    Ok(super::created("Warehouse created successfully", warehouse))
}

pub async fn update_warehouse(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateWarehouseInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ManageWarehouses)?;
    input.validate()?;

    let service = WarehouseService::new(state.db.clone());
    let warehouse = service.update_warehouse(id, input).await?;
    Ok(super::updated("Warehouse updated successfully", warehouse))
}

/// Stock of one warehouse
pub async fn list_warehouse_materials(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
    Query(mut filter): Query<StockFilter>,
) -> AppResult<impl IntoResponse> {
    actor.require_internal()?;

    filter.warehouse_id = Some(id);
    let service = WarehouseService::new(state.db.clone());
    Ok(Json(service.list_materials(filter, &pagination).await?))
}

/// Stock across warehouses
pub async fn list_materials(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<StockFilter>,
) -> AppResult<impl IntoResponse> {
    actor.require_internal()?;

    let service = WarehouseService::new(state.db.clone());
    Ok(Json(service.list_materials(filter, &pagination).await?))
}
