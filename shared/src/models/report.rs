//! PO reports raised against inspection shortfalls

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApproveStatus;

string_enum! {
    /// What should happen to the missing quantity once the report is approved
    pub enum ResolutionType {
        /// Supplier ships the shortfall in a new supplemental stage
        SupplementalDelivery => "SUPPLEMENTAL_DELIVERY",
        /// The shortfall is written off
        AcceptShortage => "ACCEPT_SHORTAGE",
    }
}

/// A report on a stage whose inspected quantity fell short
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoReport {
    pub id: Uuid,
    pub code: String,
    pub delivery_stage_id: Uuid,
    pub purchasing_order_id: Uuid,
    pub resolution_type: ResolutionType,
    pub content: String,
    pub approve_status: ApproveStatus,
    pub reject_reason: Option<String>,
    pub supplemental_stage_id: Option<Uuid>,
    pub shortfall_lines: Vec<ShortfallLine>,
    pub created_by: Uuid,
    pub resolved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Missing quantity of one material on the reported stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortfallLine {
    pub raw_material_id: Uuid,
    pub purchase_material_id: Uuid,
    pub quantity: Decimal,
}
