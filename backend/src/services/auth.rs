//! Authentication service: login, token refresh and the bootstrap administrator

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use shared::{Role, User};

use crate::config::{BootstrapConfig, Config};
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::user::{UserRow, USER_COLUMNS};

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// Which of the two token flavours a JWT is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub role: String,
    pub token_type: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn auth_user(&self) -> AppResult<AuthUser> {
        let user_id = Uuid::parse_str(&self.sub).map_err(|_| AppError::InvalidToken)?;
        let role = self
            .role
            .parse::<Role>()
            .map_err(|_| AppError::InvalidToken)?;
        Ok(AuthUser { user_id, role })
    }
}

/// Authentication tokens
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: User,
}

/// Login payload
#[derive(Debug, Deserialize, validator::Validate)]
pub struct LoginInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshInput {
    pub refresh_token: String,
}

/// Decode and check a token of the expected kind
pub fn decode_token(token: &str, secret: &str, kind: TokenKind) -> AppResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::TokenExpired,
        _ => AppError::InvalidToken,
    })?;

    if token_data.claims.token_type != kind {
        return Err(AppError::InvalidToken);
    }

    Ok(token_data.claims)
}

fn encode_token(
    secret: &str,
    user_id: Uuid,
    role: Role,
    kind: TokenKind,
    ttl_seconds: i64,
) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        token_type: kind,
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Hash a password with bcrypt
pub fn hash_password(password: &str) -> AppResult<String> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Authenticate user with email and password
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthTokens> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        let valid = verify(password, &row.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            tracing::info!(email = %email, "login failed");
            return Err(AppError::InvalidCredentials);
        }

        if !row.is_active {
            return Err(AppError::AccountDisabled);
        }

        let user = row.into_user()?;
        tracing::info!(user_id = %user.id, role = %user.role, "user logged in");
        self.issue_tokens(user)
    }

    /// Exchange a refresh token for a fresh token pair
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let claims = decode_token(refresh_token, &self.jwt_secret, TokenKind::Refresh)?;
        let auth_user = claims.auth_user()?;

        let user = self.me(auth_user.user_id).await?;
        if !user.is_active {
            return Err(AppError::AccountDisabled);
        }

        self.issue_tokens(user)
    }

    /// Profile of the signed-in user
    pub async fn me(&self, user_id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::InvalidToken)?
            .into_user()
    }

    /// Create the first administrator when the users table has none
    pub async fn ensure_bootstrap_admin(&self, bootstrap: &BootstrapConfig) -> AppResult<()> {
        let admins = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(Role::Admin.as_str())
            .fetch_one(&self.db)
            .await?;
        if admins > 0 {
            return Ok(());
        }

        let password_hash = hash_password(&bootstrap.admin_password)?;
        sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, full_name, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(bootstrap.admin_email.trim().to_lowercase())
        .bind(&password_hash)
        .bind(&bootstrap.admin_name)
        .bind(Role::Admin.as_str())
        .execute(&self.db)
        .await?;

        tracing::info!(email = %bootstrap.admin_email, "bootstrap administrator created");
        Ok(())
    }

    fn issue_tokens(&self, user: User) -> AppResult<AuthTokens> {
        let access_token = encode_token(
            &self.jwt_secret,
            user.id,
            user.role,
            TokenKind::Access,
            self.access_token_expiry,
        )?;
        let refresh_token = encode_token(
            &self.jwt_secret,
            user.id,
            user.role,
            TokenKind::Refresh,
            self.refresh_token_expiry,
        )?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
            user,
        })
    }
}
