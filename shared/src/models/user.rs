//! User accounts and roles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

string_enum! {
    /// What a user is allowed to do in the workflow
    pub enum Role {
        Admin => "ADMIN",
        Manager => "MANAGER",
        PurchasingStaff => "PURCHASING_STAFF",
        Supplier => "SUPPLIER",
        Inspector => "INSPECTOR",
        WarehouseStaff => "WAREHOUSE_STAFF",
    }
}

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_profile: Option<SupplierProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Company details kept for supplier accounts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupplierProfile {
    pub company_name: String,
    pub tax_code: Option<String>,
    pub address: Option<String>,
}
