//! Authentication middleware
//!
//! JWT authentication and role-based access control middleware

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::{Action, Role};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::auth::{decode_token, TokenKind};
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Check if user may perform an action
    pub fn can(&self, action: Action) -> bool {
        self.role.can(action)
    }

    /// Fail with 403 unless the user may perform the action
    pub fn require(&self, action: Action) -> AppResult<()> {
        if self.can(action) {
            Ok(())
        } else {
            tracing::debug!(
                user_id = %self.user_id,
                role = %self.role,
                ?action,
                "permission denied"
            );
            Err(AppError::InsufficientPermissions)
        }
    }

    pub fn is_supplier(&self) -> bool {
        self.role == Role::Supplier
    }

    /// Internal records (warehouses, inspections, stock) are hidden from suppliers
    pub fn require_internal(&self) -> AppResult<()> {
        if self.is_supplier() {
            Err(AppError::InsufficientPermissions)
        } else {
            Ok(())
        }
    }
}

/// Authentication middleware that validates JWT access tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return AppError::Unauthorized("Missing or invalid Authorization header".into())
                .into_response();
        }
    };

    let claims = match decode_token(token, &state.config.jwt.secret, TokenKind::Access) {
        Ok(claims) => claims,
        Err(err) => return err.into_response(),
    };

    let auth_user = match claims.auth_user() {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))
    }
}
