//! User management HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use shared::{Action, Pagination, Role, User};

use crate::error::AppResult;
use crate::middleware::{AuthUser, CurrentUser};
use crate::services::user::{CreateUserInput, UpdateUserInput, UserFilter, UserService};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetActiveInput {
    pub is_active: bool,
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<UserFilter>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ViewUsers)?;

    let service = UserService::new(state.db.clone());
    Ok(Json(service.list_users(filter, &pagination).await?))
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    actor.require(Action::ViewUsers)?;

    let service = UserService::new(state.db.clone());
    Ok(Json(service.get_user(id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateUserInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ManageUsers)?;
    input.validate()?;

    let service = UserService::new(state.db.clone());
    let user = service.create_user(input).await?;
    Ok(super::created("User created successfully", user))
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateUserInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ManageUsers)?;
    input.validate()?;

    let service = UserService::new(state.db.clone());
    let user = service.update_user(id, input).await?;
    Ok(super::updated("User updated successfully", user))
}

/// Activate or deactivate an account
pub async fn set_active(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SetActiveInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ManageUsers)?;

    let service = UserService::new(state.db.clone());
    let user = service.set_active(actor.user_id, id, input.is_active).await?;
    let message = if input.is_active {
        "User activated successfully"
    } else {
        "User deactivated successfully"
    };
    Ok(super::updated(message, user))
}

async fn list_role(state: AppState, actor: &AuthUser, role: Role) -> AppResult<Json<Vec<User>>> {
    actor.require(Action::ViewUsers)?;

    let service = UserService::new(state.db);
    Ok(Json(service.list_by_role(role).await?))
}

pub async fn list_suppliers(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    list_role(state, &actor, Role::Supplier).await
}

pub async fn list_purchasing_staff(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    list_role(state, &actor, Role::PurchasingStaff).await
}

pub async fn list_inspectors(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    list_role(state, &actor, Role::Inspector).await
}

pub async fn list_warehouse_staff(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    list_role(state, &actor, Role::WarehouseStaff).await
}
