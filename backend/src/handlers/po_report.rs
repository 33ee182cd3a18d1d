//! PO report HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use shared::{Action, ApprovalInput, Pagination, PoReport};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::po_report::{CreateReportInput, PoReportService, ReportFilter};
use crate::AppState;

pub async fn list_reports(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<ReportFilter>,
) -> AppResult<impl IntoResponse> {
    let service = PoReportService::new(state.db.clone());
    Ok(Json(service.list_reports(&actor, filter, &pagination).await?))
}

pub async fn get_report(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PoReport>> {
    let service = PoReportService::new(state.db.clone());
    Ok(Json(service.get_report(&actor, id).await?))
}

pub async fn create_report(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Json(input): Json<CreateReportInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::CreatePoReport)?;
    input.validate()?;

    let service = PoReportService::new(state.db.clone());
    let report = service.create_report(&actor, input).await?;
    Ok(super::created("PO report created successfully", report))
}

pub async fn approve_report(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ApprovalInput>,
) -> AppResult<impl IntoResponse> {
    actor.require(Action::ResolvePoReport)?;

    let service = PoReportService::new(state.db.clone());
    let approved = input.approved;
    let report = service.approve_report(&actor, id, input).await?;
    let message = match (approved, report.supplemental_stage_id) {
        (true, Some(_)) => "PO report approved, supplemental delivery stage created",
        (true, None) => "PO report approved",
        (false, _) => "PO report rejected",
    };
    Ok(super::updated(message, report))
}
