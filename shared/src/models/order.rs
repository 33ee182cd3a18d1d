//! Purchasing orders

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApproveStatus, DeliveryStage, DualApproval};
use crate::error::{LedgerError, TransitionError};
use crate::pricing::checked_quantity;

string_enum! {
    /// Overall progress of a purchasing order
    pub enum OrderStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        InProgress => "IN_PROGRESS",
        Finished => "FINISHED",
        Cancelled => "CANCELLED",
    }
}

impl OrderStatus {
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        matches!(
            (self, target),
            (Pending, Approved)
                | (Pending, Cancelled)
                | (Approved, InProgress)
                | (Approved, Cancelled)
                | (InProgress, Finished)
        )
    }

    pub fn transition(self, target: OrderStatus) -> Result<OrderStatus, TransitionError> {
        if self == target {
            return Ok(self);
        }
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(TransitionError::not_allowed("purchasing order", self, target))
        }
    }

    /// Orders can only be edited before anyone signed them off
    pub fn is_editable(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Finished | OrderStatus::Cancelled)
    }
}

/// Supplier details copied onto the order when it is created
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupplierSnapshot {
    pub supplier_name: String,
    pub supplier_company_name: Option<String>,
    pub supplier_tax_code: Option<String>,
    pub supplier_address: Option<String>,
    pub supplier_email: String,
    pub supplier_phone: Option<String>,
}

/// A purchasing order with its materials and delivery schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasingOrder {
    pub id: Uuid,
    pub po_code: String,
    pub plan_id: Option<Uuid>,
    pub supplier_id: Uuid,
    #[serde(flatten)]
    pub supplier: SupplierSnapshot,
    pub manager_approve_status: ApproveStatus,
    pub supplier_approve_status: ApproveStatus,
    pub order_status: OrderStatus,
    pub reject_reason: Option<String>,
    pub cancel_reason: Option<String>,
    pub note: Option<String>,
    pub sub_total: Decimal,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub order_materials: Vec<OrderMaterial>,
    pub delivery_stages: Vec<DeliveryStage>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchasingOrder {
    pub fn approval(&self) -> DualApproval {
        DualApproval::new(self.manager_approve_status, self.supplier_approve_status)
    }
}

/// One ordered raw material
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMaterial {
    pub id: Uuid,
    pub purchasing_order_id: Uuid,
    pub raw_material_id: Uuid,
    pub purchase_task_id: Option<Uuid>,
    pub package: Decimal,
    pub material_per_package: Decimal,
    pub unit: String,
    pub total_quantity: Decimal,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

/// Ordered material as submitted by purchasing staff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMaterialInput {
    pub raw_material_id: Uuid,
    pub purchase_task_id: Option<Uuid>,
    pub package: Decimal,
    pub material_per_package: Decimal,
    pub unit_price: Decimal,
}

impl OrderMaterialInput {
    pub fn total_quantity(&self) -> Result<Decimal, LedgerError> {
        checked_quantity(self.package, self.material_per_package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_lifecycle() {
        let status = OrderStatus::Pending;
        let status = status.transition(OrderStatus::Approved).unwrap();
        let status = status.transition(OrderStatus::InProgress).unwrap();
        let status = status.transition(OrderStatus::Finished).unwrap();
        assert!(status.is_terminal());
    }

    #[test]
    fn in_progress_orders_cannot_be_cancelled() {
        assert!(OrderStatus::InProgress
            .transition(OrderStatus::Cancelled)
            .is_err());
    }

    #[test]
    fn same_status_is_a_no_op() {
        assert_eq!(
            OrderStatus::InProgress.transition(OrderStatus::InProgress),
            Ok(OrderStatus::InProgress)
        );
    }
}
