//! Warehouses, stock, warehouse forms and temporary storage requests

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApproveStatus;
use crate::error::{LedgerError, TransitionError};

string_enum! {
    pub enum WarehouseType {
        Main => "MAIN",
        /// Holds delivered goods until they pass inspection
        Temporary => "TEMPORARY",
    }
}

string_enum! {
    pub enum WarehouseFormType {
        Import => "IMPORT",
        Export => "EXPORT",
    }
}

string_enum! {
    pub enum WarehouseFormStatus {
        Pending => "PENDING",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
}

impl WarehouseFormStatus {
    pub fn transition(
        self,
        target: WarehouseFormStatus,
    ) -> Result<WarehouseFormStatus, TransitionError> {
        match (self, target) {
            (WarehouseFormStatus::Pending, WarehouseFormStatus::Completed)
            | (WarehouseFormStatus::Pending, WarehouseFormStatus::Cancelled) => Ok(target),
            _ => Err(TransitionError::not_allowed("warehouse form", self, target)),
        }
    }
}

/// Warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warehouse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub warehouse_type: WarehouseType,
    pub location: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stock of one raw material in one warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseMaterial {
    pub id: Uuid,
    pub warehouse_id: Uuid,
    pub raw_material_id: Uuid,
    pub quantity: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Import or export document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseForm {
    pub id: Uuid,
    pub code: String,
    pub form_type: WarehouseFormType,
    pub warehouse_id: Uuid,
    pub delivery_stage_id: Option<Uuid>,
    pub temp_warehouse_request_id: Option<Uuid>,
    pub status: WarehouseFormStatus,
    pub note: Option<String>,
    pub materials: Vec<WarehouseFormMaterial>,
    pub created_by: Uuid,
    pub processed_by: Option<Uuid>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a warehouse form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseFormMaterial {
    pub id: Uuid,
    pub raw_material_id: Uuid,
    pub purchase_material_id: Option<Uuid>,
    pub quantity: Decimal,
    pub unit: String,
}

/// Request to park a delivered stage in a temporary warehouse
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempWarehouseRequest {
    pub id: Uuid,
    pub code: String,
    pub delivery_stage_id: Uuid,
    pub warehouse_id: Uuid,
    pub approve_status: ApproveStatus,
    pub note: Option<String>,
    pub reject_reason: Option<String>,
    pub warehouse_form_id: Option<Uuid>,
    pub requested_by: Uuid,
    pub resolved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stock level after applying one form line. Stock never goes negative.
pub fn apply_stock_movement(
    current: Decimal,
    form_type: WarehouseFormType,
    quantity: Decimal,
) -> Result<Decimal, LedgerError> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::NonPositive { field: "quantity" });
    }
    match form_type {
        WarehouseFormType::Import => Ok(current + quantity),
        WarehouseFormType::Export if quantity > current => Err(LedgerError::Exceeds {
            field: "quantity",
            value: quantity,
            limit_name: "stock on hand",
            limit: current,
        }),
        WarehouseFormType::Export => Ok(current - quantity),
    }
}
