//! Delivery stages and their lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, TransitionError};
use crate::pricing::checked_quantity;

string_enum! {
    /// Lifecycle of a scheduled (or supplemental) partial shipment
    pub enum DeliveryStatus {
        /// Order still waiting for manager and supplier approval
        Pending => "PENDING",
        Approved => "APPROVED",
        Delivering => "DELIVERING",
        Delivered => "DELIVERED",
        Inspecting => "INSPECTING",
        Inspected => "INSPECTED",
        Imported => "IMPORTED",
        Cancelled => "CANCELLED",
        /// Supplemental stage created but not yet started by the supplier
        SupInactive => "SupInactive",
    }
}

impl DeliveryStatus {
    /// Check if transition is valid
    pub fn can_transition_to(&self, target: DeliveryStatus) -> bool {
        use DeliveryStatus::*;

        matches!(
            (self, target),
            (Pending, Approved)
                | (Pending, Cancelled)
                | (SupInactive, Delivering)
                | (SupInactive, Cancelled)
                | (Approved, Delivering)
                | (Approved, Cancelled)
                | (Delivering, Delivered)
                | (Delivering, Cancelled)
                | (Delivered, Inspecting)
                | (Inspecting, Delivered)
                | (Inspecting, Inspected)
                | (Inspected, Imported)
        )
    }

    pub fn transition(self, target: DeliveryStatus) -> Result<DeliveryStatus, TransitionError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(TransitionError::not_allowed("delivery stage", self, target))
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Imported | DeliveryStatus::Cancelled)
    }

    /// Targets a supplier may request through the generic status endpoint.
    /// Everything else is driven by approvals, inspections or warehouse forms.
    pub fn is_manual_target(&self) -> bool {
        matches!(self, DeliveryStatus::Delivering | DeliveryStatus::Delivered)
    }

    /// Goods not yet handed over
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Pending
                | DeliveryStatus::Approved
                | DeliveryStatus::Delivering
                | DeliveryStatus::SupInactive
        )
    }

    /// Handed over, inspection outcome unknown
    pub fn is_awaiting_inspection(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Inspecting)
    }

    pub fn has_inspection_result(&self) -> bool {
        matches!(self, DeliveryStatus::Inspected | DeliveryStatus::Imported)
    }

    pub fn accepts_quantity_updates(&self) -> bool {
        matches!(self, DeliveryStatus::Approved | DeliveryStatus::Delivering)
    }

    pub fn is_cancellable(&self) -> bool {
        self.can_transition_to(DeliveryStatus::Cancelled)
    }
}

/// A delivery stage with its materials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStage {
    pub id: Uuid,
    pub purchasing_order_id: Uuid,
    pub stage_order: i32,
    pub delivery_date: NaiveDate,
    pub delivery_status: DeliveryStatus,
    pub is_supplemental: bool,
    pub cancel_reason: Option<String>,
    pub note: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub purchase_materials: Vec<PurchaseMaterial>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryStage {
    pub fn total_quantity(&self) -> Decimal {
        self.purchase_materials.iter().map(|m| m.total_quantity).sum()
    }

    pub fn delivered_quantity(&self) -> Decimal {
        self.purchase_materials
            .iter()
            .map(|m| m.delivered_quantity)
            .sum()
    }

    pub fn total_price(&self) -> Decimal {
        self.purchase_materials.iter().map(|m| m.total_price).sum()
    }
}

/// Quantity of one raw material scheduled on a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseMaterial {
    pub id: Uuid,
    pub delivery_stage_id: Uuid,
    pub order_material_id: Uuid,
    pub raw_material_id: Uuid,
    pub package: Decimal,
    pub material_per_package: Decimal,
    pub unit: String,
    pub total_quantity: Decimal,
    pub delivered_quantity: Decimal,
    pub after_inspect_quantity: Option<Decimal>,
    pub received_quantity: Decimal,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl PurchaseMaterial {
    /// Quantity that failed inspection or never arrived
    pub fn shortfall(&self) -> Option<Decimal> {
        self.after_inspect_quantity
            .map(|passed| (self.total_quantity - passed).max(Decimal::ZERO))
    }
}

/// Planned stage submitted with a purchasing order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInput {
    pub stage_order: i32,
    pub delivery_date: NaiveDate,
    pub note: Option<String>,
    pub materials: Vec<StageMaterialInput>,
}

/// Quantity of one order material allocated to a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMaterialInput {
    pub raw_material_id: Uuid,
    pub package: Decimal,
    pub material_per_package: Decimal,
}

impl StageMaterialInput {
    pub fn quantity(&self) -> Result<Decimal, LedgerError> {
        checked_quantity(self.package, self.material_per_package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            DeliveryStatus::Pending,
            DeliveryStatus::Approved,
            DeliveryStatus::Delivering,
            DeliveryStatus::Delivered,
            DeliveryStatus::Inspecting,
            DeliveryStatus::Inspected,
            DeliveryStatus::Imported,
        ];
        for pair in path.windows(2) {
            assert_eq!(pair[0].transition(pair[1]), Ok(pair[1]));
        }
    }

    #[test]
    fn supplemental_stage_starts_inactive() {
        assert!(DeliveryStatus::SupInactive.can_transition_to(DeliveryStatus::Delivering));
        assert!(!DeliveryStatus::SupInactive.can_transition_to(DeliveryStatus::Approved));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for from in [DeliveryStatus::Imported, DeliveryStatus::Cancelled] {
            assert!(from.is_terminal());
            for to in DeliveryStatus::ALL {
                assert!(!from.can_transition_to(*to));
            }
        }
    }

    #[test]
    fn delivered_goods_cannot_be_cancelled() {
        assert!(!DeliveryStatus::Delivered.is_cancellable());
        assert!(DeliveryStatus::Delivering.is_cancellable());
    }

    #[test]
    fn sup_inactive_keeps_its_spelling() {
        let json = serde_json::to_string(&DeliveryStatus::SupInactive).unwrap();
        assert_eq!(json, "\"SupInactive\"");
        let back: DeliveryStatus = serde_json::from_str("\"DELIVERING\"").unwrap();
        assert_eq!(back, DeliveryStatus::Delivering);
    }
}
