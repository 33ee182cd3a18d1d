//! Role based access control
//!
//! A static role x action matrix, plus the status-aware view the dashboard
//! uses to decide which action buttons to render for a record.

use serde::{Deserialize, Serialize};

use crate::models::{
    ApproveStatus, DeliveryStatus, DualApproval, InspectionStatus, OrderStatus, Role,
    WarehouseFormStatus,
};

/// Something a user can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    ManageUsers,
    ViewUsers,
    ManageMaterials,
    ManageWarehouses,
    CreatePlan,
    EditPlan,
    ApprovePlan,
    AssignTask,
    CreateOrder,
    EditOrder,
    CancelOrder,
    ApproveOrderManager,
    ApproveOrderSupplier,
    UpdateDelivery,
    StartSupplementalDelivery,
    CreateSupplementalStage,
    CancelStage,
    RequestInspection,
    RecordInspection,
    CancelInspection,
    CreatePoReport,
    ResolvePoReport,
    RequestTempWarehouse,
    ResolveTempWarehouse,
    CreateWarehouseForm,
    ProcessWarehouseForm,
}

impl Role {
    /// Whether the role may perform the action at all
    pub fn can(&self, action: Action) -> bool {
        use Action::*;

        match self {
            Role::Admin => !matches!(
                action,
                ApproveOrderSupplier | UpdateDelivery | StartSupplementalDelivery | RecordInspection
            ),
            Role::Manager => matches!(
                action,
                ViewUsers
                    | ManageMaterials
                    | ManageWarehouses
                    | CreatePlan
                    | EditPlan
                    | ApprovePlan
                    | AssignTask
                    | CreateOrder
                    | EditOrder
                    | CancelOrder
                    | ApproveOrderManager
                    | CreateSupplementalStage
                    | CancelStage
                    | RequestInspection
                    | CancelInspection
                    | CreatePoReport
                    | ResolvePoReport
                    | ResolveTempWarehouse
            ),
            Role::PurchasingStaff => matches!(
                action,
                ViewUsers
                    | CreatePlan
                    | EditPlan
                    | CreateOrder
                    | EditOrder
                    | CancelOrder
                    | CreateSupplementalStage
                    | CancelStage
                    | RequestInspection
                    | CancelInspection
                    | CreatePoReport
                    | RequestTempWarehouse
            ),
            Role::Supplier => matches!(
                action,
                ApproveOrderSupplier | UpdateDelivery | StartSupplementalDelivery
            ),
            Role::Inspector => matches!(action, RecordInspection | CreatePoReport),
            Role::WarehouseStaff => matches!(
                action,
                ManageWarehouses
                    | ResolveTempWarehouse
                    | CreateWarehouseForm
                    | ProcessWarehouseForm
            ),
        }
    }

    /// Internal staff see every record; suppliers only their own orders
    pub fn sees_all_orders(&self) -> bool {
        !matches!(self, Role::Supplier)
    }
}

/// A record in its current state, as far as action gating is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Subject {
    Plan {
        approve_status: ApproveStatus,
    },
    Order {
        approval: DualApproval,
        order_status: OrderStatus,
    },
    Stage {
        status: DeliveryStatus,
    },
    Inspection {
        status: InspectionStatus,
    },
    PoReport {
        approve_status: ApproveStatus,
    },
    TempWarehouseRequest {
        approve_status: ApproveStatus,
    },
    WarehouseForm {
        status: WarehouseFormStatus,
    },
}

impl Subject {
    /// Actions the record's state allows, regardless of who is asking
    fn state_actions(&self) -> Vec<Action> {
        use Action::*;

        match *self {
            Subject::Plan { approve_status } => match approve_status {
                ApproveStatus::Pending => vec![ApprovePlan, EditPlan],
                ApproveStatus::Rejected => vec![EditPlan],
                ApproveStatus::Approved => vec![AssignTask],
            },
            Subject::Order {
                approval,
                order_status,
            } => {
                let mut actions = Vec::new();
                if order_status.is_editable() {
                    actions.push(EditOrder);
                    if approval.manager == ApproveStatus::Pending {
                        actions.push(ApproveOrderManager);
                    }
                    if approval.manager == ApproveStatus::Approved
                        && approval.supplier == ApproveStatus::Pending
                    {
                        actions.push(ApproveOrderSupplier);
                    }
                }
                if order_status.can_transition_to(OrderStatus::Cancelled) {
                    actions.push(CancelOrder);
                }
                if matches!(order_status, OrderStatus::Approved | OrderStatus::InProgress) {
                    actions.push(CreateSupplementalStage);
                }
                actions
            }
            Subject::Stage { status } => {
                let mut actions = Vec::new();
                if status == DeliveryStatus::SupInactive {
                    actions.push(StartSupplementalDelivery);
                }
                if matches!(status, DeliveryStatus::Approved | DeliveryStatus::Delivering) {
                    actions.push(UpdateDelivery);
                }
                if status.is_cancellable() && status != DeliveryStatus::Pending {
                    actions.push(CancelStage);
                }
                if status == DeliveryStatus::Delivered {
                    actions.push(RequestInspection);
                    actions.push(RequestTempWarehouse);
                }
                if status == DeliveryStatus::Inspected {
                    actions.push(CreatePoReport);
                    actions.push(CreateWarehouseForm);
                }
                actions
            }
            Subject::Inspection { status } => match status {
                InspectionStatus::Pending => vec![RecordInspection, CancelInspection],
                _ => Vec::new(),
            },
            Subject::PoReport { approve_status } => match approve_status {
                ApproveStatus::Pending => vec![ResolvePoReport],
                _ => Vec::new(),
            },
            Subject::TempWarehouseRequest { approve_status } => match approve_status {
                ApproveStatus::Pending => vec![ResolveTempWarehouse],
                _ => Vec::new(),
            },
            Subject::WarehouseForm { status } => match status {
                WarehouseFormStatus::Pending => vec![ProcessWarehouseForm],
                _ => Vec::new(),
            },
        }
    }
}

/// Actions to offer `role` on `subject`
pub fn available_actions(role: Role, subject: &Subject) -> Vec<Action> {
    subject
        .state_actions()
        .into_iter()
        .filter(|action| role.can(*action))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_sees_approve_on_pending_plan() {
        let subject = Subject::Plan {
            approve_status: ApproveStatus::Pending,
        };
        assert!(available_actions(Role::Manager, &subject).contains(&Action::ApprovePlan));
        assert!(!available_actions(Role::PurchasingStaff, &subject).contains(&Action::ApprovePlan));
    }

    #[test]
    fn supplier_only_sees_orders_after_manager_approval() {
        let pending = Subject::Order {
            approval: DualApproval::default(),
            order_status: OrderStatus::Pending,
        };
        assert!(available_actions(Role::Supplier, &pending).is_empty());

        let manager_approved = Subject::Order {
            approval: DualApproval::new(ApproveStatus::Approved, ApproveStatus::Pending),
            order_status: OrderStatus::Pending,
        };
        assert_eq!(
            available_actions(Role::Supplier, &manager_approved),
            vec![Action::ApproveOrderSupplier]
        );
    }

    #[test]
    fn admin_cannot_act_as_supplier() {
        assert!(!Role::Admin.can(Action::ApproveOrderSupplier));
        assert!(Role::Admin.can(Action::ManageUsers));
    }
}
