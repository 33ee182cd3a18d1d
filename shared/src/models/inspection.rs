//! Inspection requests for delivered stages

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, TransitionError};

string_enum! {
    pub enum InspectionStatus {
        Pending => "PENDING",
        Inspected => "INSPECTED",
        Cancelled => "CANCELLED",
    }
}

impl InspectionStatus {
    pub fn transition(self, target: InspectionStatus) -> Result<InspectionStatus, TransitionError> {
        match (self, target) {
            (InspectionStatus::Pending, InspectionStatus::Inspected)
            | (InspectionStatus::Pending, InspectionStatus::Cancelled) => Ok(target),
            _ => Err(TransitionError::not_allowed("inspection request", self, target)),
        }
    }
}

/// A request to inspect the goods of one delivered stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRequest {
    pub id: Uuid,
    pub code: String,
    pub delivery_stage_id: Uuid,
    pub purchasing_order_id: Uuid,
    pub inspector_id: Option<Uuid>,
    pub status: InspectionStatus,
    pub note: Option<String>,
    pub result_lines: Vec<InspectionLine>,
    pub requested_by: Uuid,
    pub inspected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inspection outcome for one purchase material
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionLine {
    pub purchase_material_id: Uuid,
    pub raw_material_id: Uuid,
    pub inspected_quantity: Decimal,
    pub passed_quantity: Decimal,
    pub note: Option<String>,
}

impl InspectionLine {
    pub fn failed_quantity(&self) -> Decimal {
        self.inspected_quantity - self.passed_quantity
    }
}

/// Check `0 <= passed <= inspected <= delivered`
pub fn validate_inspection_quantities(
    delivered: Decimal,
    inspected: Decimal,
    passed: Decimal,
) -> Result<(), LedgerError> {
    if inspected < Decimal::ZERO {
        return Err(LedgerError::NonPositive {
            field: "inspectedQuantity",
        });
    }
    if passed < Decimal::ZERO {
        return Err(LedgerError::NonPositive {
            field: "passedQuantity",
        });
    }
    if inspected > delivered {
        return Err(LedgerError::Exceeds {
            field: "inspectedQuantity",
            value: inspected,
            limit_name: "deliveredQuantity",
            limit: delivered,
        });
    }
    if passed > inspected {
        return Err(LedgerError::Exceeds {
            field: "passedQuantity",
            value: passed,
            limit_name: "inspectedQuantity",
            limit: inspected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passed_cannot_exceed_inspected() {
        let err = validate_inspection_quantities(
            Decimal::from(10),
            Decimal::from(8),
            Decimal::from(9),
        );
        assert!(matches!(err, Err(LedgerError::Exceeds { field: "passedQuantity", .. })));
    }

    #[test]
    fn inspected_cannot_exceed_delivered() {
        let err = validate_inspection_quantities(
            Decimal::from(10),
            Decimal::from(11),
            Decimal::from(5),
        );
        assert!(err.is_err());
        assert!(validate_inspection_quantities(
            Decimal::from(10),
            Decimal::from(10),
            Decimal::ZERO
        )
        .is_ok());
    }

    #[test]
    fn only_pending_requests_move() {
        assert!(InspectionStatus::Inspected
            .transition(InspectionStatus::Cancelled)
            .is_err());
    }
}
