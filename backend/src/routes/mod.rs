//! Route definitions for the Procurement Workflow Platform

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Auth routes (public)
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .merge(protected_routes().route_layer(middleware::from_fn_with_state(
            state,
            auth_middleware,
        )))
}

/// Everything behind a bearer token
fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .nest("/user", user_routes())
        .nest("/raw-material", raw_material_routes())
        .nest("/purchasing-plan", purchasing_plan_routes())
        .nest("/purchasing-order", purchasing_order_routes())
        .nest("/delivery-stage", delivery_stage_routes())
        .nest("/inspection-request", inspection_routes())
        .nest("/po-report", po_report_routes())
        .nest("/temp-warehouse-request", temp_warehouse_routes())
        .nest("/warehouse-form", warehouse_form_routes())
        .nest("/warehouse", warehouse_routes())
        .route(
            "/warehouse-material",
            get(handlers::warehouse::list_materials),
        )
}

fn user_routes() -> Router<AppState> {
    use handlers::user;

    Router::new()
        .route("/", get(user::list_users).post(user::create_user))
        .route("/suppliers", get(user::list_suppliers))
        .route("/purchasing-staff", get(user::list_purchasing_staff))
        .route("/inspectors", get(user::list_inspectors))
        .route("/warehouse-staff", get(user::list_warehouse_staff))
        .route("/:id", get(user::get_user).put(user::update_user))
        .route("/:id/active", post(user::set_active))
}

fn raw_material_routes() -> Router<AppState> {
    use handlers::raw_material;

    Router::new()
        .route(
            "/",
            get(raw_material::list_raw_materials).post(raw_material::create_raw_material),
        )
        .route(
            "/:id",
            get(raw_material::get_raw_material).put(raw_material::update_raw_material),
        )
}

fn purchasing_plan_routes() -> Router<AppState> {
    use handlers::purchasing_plan as plan;

    Router::new()
        .route("/", get(plan::list_plans).post(plan::create_plan))
        .route("/tasks", get(plan::list_tasks))
        .route("/:id", get(plan::get_plan).put(plan::update_plan))
        .route("/:id/approve", post(plan::approve_plan))
        .route("/:id/tasks/:task_id/assign", put(plan::assign_task))
}

fn purchasing_order_routes() -> Router<AppState> {
    use handlers::purchasing_order as order;

    Router::new()
        .route("/", get(order::list_orders).post(order::create_order))
        .route("/:id", get(order::get_order).put(order::update_order))
        .route("/:id/approve-manager", post(order::approve_manager))
        .route("/:id/approve-supplier", post(order::approve_supplier))
        .route("/:id/cancel", post(order::cancel_order))
        .route("/:id/reconciliation", get(order::reconciliation))
}

fn delivery_stage_routes() -> Router<AppState> {
    use handlers::delivery_stage as stage;

    Router::new()
        .route(
            "/",
            get(stage::list_stages).post(stage::create_supplemental_stage),
        )
        .route("/:id", get(stage::get_stage))
        .route("/:id/status", put(stage::update_status))
        .route("/:id/quantity", put(stage::update_quantity))
        .route("/:id/cancel", post(stage::cancel_stage))
        .route(
            "/:id/start-delivering-supplemental",
            post(stage::start_delivering_supplemental),
        )
}

fn inspection_routes() -> Router<AppState> {
    use handlers::inspection;

    Router::new()
        .route(
            "/",
            get(inspection::list_requests).post(inspection::create_request),
        )
        .route("/:id", get(inspection::get_request))
        .route("/:id/result", post(inspection::record_result))
        .route("/:id/cancel", post(inspection::cancel_request))
}

fn po_report_routes() -> Router<AppState> {
    use handlers::po_report;

    Router::new()
        .route(
            "/",
            get(po_report::list_reports).post(po_report::create_report),
        )
        .route("/:id", get(po_report::get_report))
        .route("/:id/approve", post(po_report::approve_report))
}

fn temp_warehouse_routes() -> Router<AppState> {
    use handlers::temp_warehouse;

    Router::new()
        .route(
            "/",
            get(temp_warehouse::list_requests).post(temp_warehouse::create_request),
        )
        .route("/:id", get(temp_warehouse::get_request))
        .route("/:id/approve", post(temp_warehouse::approve_request))
}

fn warehouse_form_routes() -> Router<AppState> {
    use handlers::warehouse_form as form;

    Router::new()
        .route("/", get(form::list_forms).post(form::create_form))
        .route("/from-stage", post(form::create_forms_from_stage))
        .route("/:id", get(form::get_form))
        .route("/:id/complete", post(form::complete_form))
        .route("/:id/cancel", post(form::cancel_form))
        .route("/:id/export", get(form::export_form))
}

fn warehouse_routes() -> Router<AppState> {
    use handlers::warehouse;

    Router::new()
        .route(
            "/",
            get(warehouse::list_warehouses).post(warehouse::create_warehouse),
        )
        .route(
            "/:id",
            get(warehouse::get_warehouse).put(warehouse::update_warehouse),
        )
        .route("/:id/materials", get(warehouse::list_warehouse_materials))
}
