//! Authentication handlers

use axum::{extract::State, response::IntoResponse, Json};
use validator::Validate;

use shared::User;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::auth::{LoginInput, RefreshInput};
use crate::services::AuthService;
use crate::AppState;

/// Exchange credentials for an access/refresh token pair
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;

    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.login(&body.email, &body.password).await?;

    Ok(super::updated("Signed in successfully", tokens))
}

/// Trade a refresh token for a new pair
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshInput>,
) -> AppResult<impl IntoResponse> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.refresh(&body.refresh_token).await?;

    Ok(Json(tokens))
}

pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<User>> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    Ok(Json(auth_service.me(user.user_id).await?))
}
