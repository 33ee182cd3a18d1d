//! Shared types and models for the Procurement Workflow Platform
//!
//! This crate contains the domain model, the status transition tables and the
//! quantity ledger shared between the backend, the dashboard (via WASM), and
//! the test suites.

pub mod error;
pub mod ledger;
pub mod models;
pub mod permissions;
pub mod pricing;
pub mod types;
pub mod validation;

pub use error::*;
pub use ledger::*;
pub use models::*;
pub use permissions::*;
pub use pricing::*;
pub use types::*;
pub use validation::*;
