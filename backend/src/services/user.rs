//! User account management

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use shared::{PaginatedResponse, Pagination, Role, SupplierProfile, User};

use crate::error::{AppError, AppResult};
use crate::services::auth::hash_password;

/// Column list shared by every user query
pub const USER_COLUMNS: &str = "id, email, password_hash, full_name, phone, role, is_active, \
     company_name, tax_code, address, created_at, updated_at";

/// User row from database
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub company_name: Option<String>,
    pub tax_code: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_user(self) -> AppResult<User> {
        let role: Role = self.role.parse()?;
        let supplier_profile = match (role, self.company_name) {
            (Role::Supplier, Some(company_name)) => Some(SupplierProfile {
                company_name,
                tax_code: self.tax_code,
                address: self.address,
            }),
            _ => None,
        };
        Ok(User {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            phone: self.phone,
            role,
            is_active: self.is_active,
            supplier_profile,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn phone_format(phone: &str) -> Result<(), ValidationError> {
    shared::validate_phone(phone).map_err(|msg| {
        let mut err = ValidationError::new("phone");
        err.message = Some(msg.into());
        err
    })
}

fn tax_code_format(tax_code: &str) -> Result<(), ValidationError> {
    shared::validate_tax_code(tax_code).map_err(|msg| {
        let mut err = ValidationError::new("tax_code");
        err.message = Some(msg.into());
        err
    })
}

fn password_strength(password: &str) -> Result<(), ValidationError> {
    shared::validate_password(password).map_err(|msg| {
        let mut err = ValidationError::new("password");
        err.message = Some(msg.into());
        err
    })
}

/// Input for creating a user
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(custom = "password_strength")]
    pub password: String,
    #[validate(length(min = 1, max = 255, message = "Full name is required"))]
    pub full_name: String,
    #[validate(custom = "phone_format")]
    pub phone: Option<String>,
    pub role: Role,
    #[validate(length(min = 1, max = 255, message = "Company name cannot be empty"))]
    pub company_name: Option<String>,
    #[validate(custom = "tax_code_format")]
    pub tax_code: Option<String>,
    pub address: Option<String>,
}

/// Input for updating a user
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    #[validate(length(min = 1, max = 255, message = "Full name cannot be empty"))]
    pub full_name: Option<String>,
    #[validate(custom = "phone_format")]
    pub phone: Option<String>,
    pub role: Option<Role>,
    #[validate(custom = "password_strength")]
    pub password: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Company name cannot be empty"))]
    pub company_name: Option<String>,
    #[validate(custom = "tax_code_format")]
    pub tax_code: Option<String>,
    pub address: Option<String>,
}

/// Filters for listing users
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

/// User service
#[derive(Clone)]
pub struct UserService {
    db: PgPool,
}

impl UserService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_users(
        &self,
        filter: UserFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<User>> {
        let role = filter.role.map(|r| r.as_str());
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::bool IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR full_name ILIKE $3 OR email ILIKE $3)
            "#,
        )
        .bind(role)
        .bind(filter.is_active)
        .bind(&search)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {} FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::bool IS NULL OR is_active = $2)
              AND ($3::text IS NULL OR full_name ILIKE $3 OR email ILIKE $3)
            ORDER BY full_name
            LIMIT $4 OFFSET $5
            "#,
            USER_COLUMNS
        ))
        .bind(role)
        .bind(filter.is_active)
        .bind(&search)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let users = rows
            .into_iter()
            .map(UserRow::into_user)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(PaginatedResponse::new(users, pagination, total as u64))
    }

    /// Active users holding `role`, for the dashboard's pickers
    pub async fn list_by_role(&self, role: Role) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE role = $1 AND is_active ORDER BY full_name",
            USER_COLUMNS
        ))
        .bind(role.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    pub async fn get_user(&self, id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?
            .into_user()
    }

    pub async fn create_user(&self, input: CreateUserInput) -> AppResult<User> {
        if input.role == Role::Supplier && input.company_name.is_none() {
            return Err(AppError::validation(
                "companyName",
                "Supplier accounts need a company name",
            ));
        }

        let password_hash = hash_password(&input.password)?;
        let (company_name, tax_code, address) = supplier_fields(
            input.role,
            input.company_name,
            input.tax_code,
            input.address,
        );

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, password_hash, full_name, phone, role,
                               company_name, tax_code, address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(input.email.trim().to_lowercase())
        .bind(&password_hash)
        .bind(input.full_name.trim())
        .bind(&input.phone)
        .bind(input.role.as_str())
        .bind(&company_name)
        .bind(&tax_code)
        .bind(&address)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(user_id = %row.id, role = %row.role, "user created");
        row.into_user()
    }

    pub async fn update_user(&self, id: Uuid, input: UpdateUserInput) -> AppResult<User> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

        let current_role: Role = current.role.parse()?;
        let role = input.role.unwrap_or(current_role);
        let company_name = input.company_name.or(current.company_name);
        if role == Role::Supplier && company_name.is_none() {
            return Err(AppError::validation(
                "companyName",
                "Supplier accounts need a company name",
            ));
        }
        let (company_name, tax_code, address) = supplier_fields(
            role,
            company_name,
            input.tax_code.or(current.tax_code),
            input.address.or(current.address),
        );

        let password_hash = match input.password {
            Some(password) => hash_password(&password)?,
            None => current.password_hash,
        };

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET full_name = $2, phone = $3, role = $4, password_hash = $5,
                company_name = $6, tax_code = $7, address = $8
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(input.full_name.unwrap_or(current.full_name))
        .bind(input.phone.or(current.phone))
        .bind(role.as_str())
        .bind(&password_hash)
        .bind(&company_name)
        .bind(&tax_code)
        .bind(&address)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if role != current_role {
            tracing::info!(user_id = %id, from = %current_role, to = %role, "user role changed");
        }
        row.into_user()
    }

    /// Enable or disable an account. Nobody can disable themselves.
    pub async fn set_active(&self, actor_id: Uuid, id: Uuid, is_active: bool) -> AppResult<User> {
        if actor_id == id && !is_active {
            return Err(AppError::validation(
                "isActive",
                "You cannot deactivate your own account",
            ));
        }

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET is_active = $2 WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

        tracing::info!(user_id = %id, is_active, "user activation changed");
        row.into_user()
    }
}

/// Company details are only kept for supplier accounts
fn supplier_fields(
    role: Role,
    company_name: Option<String>,
    tax_code: Option<String>,
    address: Option<String>,
) -> (Option<String>, Option<String>, Option<String>) {
    if role == Role::Supplier {
        (company_name, tax_code, address)
    } else {
        (None, None, None)
    }
}
