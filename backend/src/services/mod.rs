//! Business logic services for the Procurement Workflow Platform
//!
//! Each service owns its transactions. Cross-entity effects (task progress,
//! plan progress, derived order status) run inside the caller's transaction
//! through the `pub(crate)` helpers the owning module exposes.

pub mod auth;
pub mod delivery_stage;
pub mod document_code;
pub mod inspection;
pub mod po_report;
pub mod purchasing_order;
pub mod purchasing_plan;
pub mod raw_material;
pub mod temp_warehouse;
pub mod user;
pub mod warehouse;
pub mod warehouse_form;

pub use auth::AuthService;
