//! Domain errors raised by the pure workflow logic

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// A status change that the transition table does not allow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{entity} cannot move from {from} to {to}")]
    NotAllowed {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{entity} has already been decided ({status})")]
    AlreadyDecided { entity: &'static str, status: String },

    #[error("supplier approval requires manager approval first")]
    ManagerApprovalRequired,

    #[error("a reason is required when rejecting")]
    ReasonRequired,
}

impl TransitionError {
    pub fn not_allowed(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        TransitionError::NotAllowed {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Quantity bookkeeping violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("material {raw_material_id} is allocated {allocated} across stages but {ordered} was ordered")]
    AllocationMismatch {
        raw_material_id: Uuid,
        ordered: Decimal,
        allocated: Decimal,
    },

    #[error("stage references material {0} which is not part of the order")]
    UnknownMaterial(Uuid),

    #[error("material {0} appears more than once")]
    DuplicateMaterial(Uuid),

    #[error("stage orders must be contiguous starting at 1 (found {found} at position {position})")]
    StageOrderGap { position: usize, found: i32 },

    #[error("delivery date of stage {stage_order} is earlier than the previous stage")]
    DeliveryDateOrder { stage_order: i32 },

    #[error("stage {0} has no materials")]
    EmptyStage(i32),

    #[error("{field} must be positive")]
    NonPositive { field: &'static str },

    #[error("{field} ({value}) exceeds {limit_name} ({limit})")]
    Exceeds {
        field: &'static str,
        value: Decimal,
        limit_name: &'static str,
        limit: Decimal,
    },

    #[error("total quantity {total} does not equal package {package} x material per package {per_package}")]
    PackageMismatch {
        package: Decimal,
        per_package: Decimal,
        total: Decimal,
    },

    #[error("nothing to reconcile: {0}")]
    Empty(&'static str),

    #[error("{field} is too large to be stored")]
    Overflow { field: &'static str },
}

/// A string that does not name any variant of a status enum
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
