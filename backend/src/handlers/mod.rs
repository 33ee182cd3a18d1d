//! HTTP handlers
//!
//! Handlers only extract, check permissions, call a service and wrap the
//! result. Mutations answer with `{ message, data }`.

pub mod auth;
pub mod delivery_stage;
pub mod health;
pub mod inspection;
pub mod po_report;
pub mod purchasing_order;
pub mod purchasing_plan;
pub mod raw_material;
pub mod temp_warehouse;
pub mod user;
pub mod warehouse;
pub mod warehouse_form;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use shared::MutationResponse;

pub use health::health_check;

/// 201 with the mutation envelope
pub(crate) fn created<T: Serialize>(message: &str, data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(MutationResponse::new(message, data)))
}

/// 200 with the mutation envelope
pub(crate) fn updated<T: Serialize>(message: &str, data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(MutationResponse::new(message, data)))
}
