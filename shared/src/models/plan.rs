//! Purchasing plans and their tasks

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApproveStatus;

string_enum! {
    /// Progress of a plan, derived from its tasks
    pub enum PlanProcessStatus {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Finished => "FINISHED",
    }
}

string_enum! {
    /// Progress of a single purchase task
    pub enum TaskStatus {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Finished => "FINISHED",
        Cancelled => "CANCELLED",
    }
}

/// A purchasing plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasingPlan {
    pub id: Uuid,
    pub code: String,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub approve_status: ApproveStatus,
    pub process_status: PlanProcessStatus,
    pub reject_reason: Option<String>,
    pub note: Option<String>,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    pub purchase_tasks: Vec<PurchaseTask>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Quantity of one raw material a plan needs purchased
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseTask {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub raw_material_id: Uuid,
    pub quantity: Decimal,
    pub processed_quantity: Decimal,
    pub remained_quantity: Decimal,
    pub finished_quantity: Decimal,
    pub purchasing_staff_id: Option<Uuid>,
    pub task_status: TaskStatus,
    pub task_start_date: NaiveDate,
    pub task_end_date: NaiveDate,
    pub finish_date: Option<NaiveDate>,
}

/// Task as submitted with a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub raw_material_id: Uuid,
    pub quantity: Decimal,
    pub purchasing_staff_id: Option<Uuid>,
    pub task_start_date: NaiveDate,
    pub task_end_date: NaiveDate,
}
