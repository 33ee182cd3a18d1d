//! Workflow state machine tests
//!
//! Covers the lifecycle tables every service relies on:
//! - Single and dual approval
//! - Delivery stage lifecycle
//! - Purchasing order lifecycle
//! - Inspection requests and warehouse forms

use proptest::prelude::*;
use shared::{
    ApprovalInput, ApproveStatus, Decision, DeliveryStatus, DualApproval, InspectionStatus,
    OrderStatus, TransitionError, WarehouseFormStatus,
};

fn any_delivery_status() -> impl Strategy<Value = DeliveryStatus> {
    prop::sample::select(DeliveryStatus::ALL.to_vec())
}

fn any_approve_status() -> impl Strategy<Value = ApproveStatus> {
    prop::sample::select(ApproveStatus::ALL.to_vec())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Every allowed delivery stage move, written out by hand
    const STAGE_EDGES: [(DeliveryStatus, DeliveryStatus); 12] = [
        (DeliveryStatus::Pending, DeliveryStatus::Approved),
        (DeliveryStatus::Pending, DeliveryStatus::Cancelled),
        (DeliveryStatus::SupInactive, DeliveryStatus::Delivering),
        (DeliveryStatus::SupInactive, DeliveryStatus::Cancelled),
        (DeliveryStatus::Approved, DeliveryStatus::Delivering),
        (DeliveryStatus::Approved, DeliveryStatus::Cancelled),
        (DeliveryStatus::Delivering, DeliveryStatus::Delivered),
        (DeliveryStatus::Delivering, DeliveryStatus::Cancelled),
        (DeliveryStatus::Delivered, DeliveryStatus::Inspecting),
        (DeliveryStatus::Inspecting, DeliveryStatus::Delivered),
        (DeliveryStatus::Inspecting, DeliveryStatus::Inspected),
        (DeliveryStatus::Inspected, DeliveryStatus::Imported),
    ];

    /// Every allowed purchasing order move, written out by hand
    const ORDER_EDGES: [(OrderStatus, OrderStatus); 5] = [
        (OrderStatus::Pending, OrderStatus::Approved),
        (OrderStatus::Pending, OrderStatus::Cancelled),
        (OrderStatus::Approved, OrderStatus::InProgress),
        (OrderStatus::Approved, OrderStatus::Cancelled),
        (OrderStatus::InProgress, OrderStatus::Finished),
    ];

    #[test]
    fn test_stage_transitions_are_exactly_the_edge_list() {
        assert_eq!(DeliveryStatus::ALL.len(), 9);
        for &from in DeliveryStatus::ALL {
            for &to in DeliveryStatus::ALL {
                let allowed = STAGE_EDGES.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), allowed, "{} -> {}", from, to);
                assert_eq!(from.transition(to).is_ok(), allowed, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_order_transitions_are_exactly_the_edge_list() {
        assert_eq!(OrderStatus::ALL.len(), 5);
        for &from in OrderStatus::ALL {
            for &to in OrderStatus::ALL {
                let allowed = ORDER_EDGES.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), allowed, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_rejection_requires_reason() {
        let blank = ApprovalInput {
            approved: false,
            reason: Some("   ".to_string()),
        };
        assert_eq!(blank.decision(), Err(TransitionError::ReasonRequired));

        let missing = ApprovalInput {
            approved: false,
            reason: None,
        };
        assert_eq!(missing.decision(), Err(TransitionError::ReasonRequired));

        let given = ApprovalInput {
            approved: false,
            reason: Some("  Unit price too high ".to_string()),
        };
        assert_eq!(given.decision(), Ok(Decision::Reject));
        assert_eq!(given.reason(), Some("Unit price too high"));
    }

    #[test]
    fn test_approval_ignores_reason() {
        let input = ApprovalInput {
            approved: true,
            reason: None,
        };
        assert_eq!(input.decision(), Ok(Decision::Approve));
    }

    #[test]
    fn test_decided_items_cannot_be_decided_again() {
        for status in [ApproveStatus::Approved, ApproveStatus::Rejected] {
            let result = status.decide("purchasing plan", Decision::Approve);
            assert!(matches!(
                result,
                Err(TransitionError::AlreadyDecided { .. })
            ));
        }
    }

    #[test]
    fn test_rejected_plan_can_be_resubmitted() {
        assert_eq!(
            ApproveStatus::Rejected.resubmit("purchasing plan"),
            Ok(ApproveStatus::Pending)
        );
        assert!(ApproveStatus::Approved.resubmit("purchasing plan").is_err());
    }

    #[test]
    fn test_supplier_waits_for_manager() {
        let fresh = DualApproval::default();
        assert_eq!(
            fresh.decide_supplier(Decision::Approve),
            Err(TransitionError::ManagerApprovalRequired)
        );

        let managed = fresh.decide_manager(Decision::Approve).unwrap();
        let signed = managed.decide_supplier(Decision::Approve).unwrap();
        assert!(signed.is_approved());
        assert!(!signed.is_rejected());
    }

    #[test]
    fn test_rejected_manager_blocks_supplier() {
        let rejected = DualApproval::default()
            .decide_manager(Decision::Reject)
            .unwrap();
        assert!(rejected.is_rejected());
        assert_eq!(
            rejected.decide_supplier(Decision::Approve),
            Err(TransitionError::ManagerApprovalRequired)
        );
        assert_eq!(rejected.reset(), DualApproval::default());
    }

    #[test]
    fn test_happy_path_delivery_lifecycle() {
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
    fn test_supplemental_stage_starts_inactive() {
        assert!(DeliveryStatus::SupInactive.can_transition_to(DeliveryStatus::Delivering));
        assert!(!DeliveryStatus::SupInactive.can_transition_to(DeliveryStatus::Approved));
        assert_eq!(DeliveryStatus::SupInactive.as_str(), "SupInactive");
    }

    #[test]
    fn test_cancelled_inspection_returns_stage() {
        assert!(DeliveryStatus::Inspecting.can_transition_to(DeliveryStatus::Delivered));
        assert!(!DeliveryStatus::Inspected.can_transition_to(DeliveryStatus::Delivered));
    }

    #[test]
    fn test_stage_cannot_be_cancelled_after_handover() {
        for status in [
            DeliveryStatus::Delivered,
            DeliveryStatus::Inspecting,
            DeliveryStatus::Inspected,
            DeliveryStatus::Imported,
            DeliveryStatus::Cancelled,
        ] {
            assert!(!status.is_cancellable(), "{} should not cancel", status);
        }
    }

    #[test]
    fn test_supplier_may_only_request_delivery_targets() {
        let manual: Vec<DeliveryStatus> = DeliveryStatus::ALL
            .iter()
            .copied()
            .filter(DeliveryStatus::is_manual_target)
            .collect();
        assert_eq!(
            manual,
            vec![DeliveryStatus::Delivering, DeliveryStatus::Delivered]
        );
    }

    #[test]
    fn test_order_lifecycle() {
        assert_eq!(
            OrderStatus::Pending.transition(OrderStatus::Approved),
            Ok(OrderStatus::Approved)
        );
        assert_eq!(
            OrderStatus::Approved.transition(OrderStatus::InProgress),
            Ok(OrderStatus::InProgress)
        );
        assert_eq!(
            OrderStatus::InProgress.transition(OrderStatus::Finished),
            Ok(OrderStatus::Finished)
        );
        assert!(OrderStatus::InProgress
            .transition(OrderStatus::Cancelled)
            .is_err());
        assert!(OrderStatus::Finished.transition(OrderStatus::Pending).is_err());
    }

    #[test]
    fn test_only_pending_orders_are_editable() {
        for status in OrderStatus::ALL {
            assert_eq!(status.is_editable(), *status == OrderStatus::Pending);
        }
    }

    #[test]
    fn test_inspection_is_decided_once() {
        assert_eq!(
            InspectionStatus::Pending.transition(InspectionStatus::Inspected),
            Ok(InspectionStatus::Inspected)
        );
        assert!(InspectionStatus::Inspected
            .transition(InspectionStatus::Cancelled)
            .is_err());
        assert!(InspectionStatus::Cancelled
            .transition(InspectionStatus::Inspected)
            .is_err());
    }

    #[test]
    fn test_warehouse_form_is_processed_once() {
        assert_eq!(
            WarehouseFormStatus::Pending.transition(WarehouseFormStatus::Completed),
            Ok(WarehouseFormStatus::Completed)
        );
        assert!(WarehouseFormStatus::Completed
            .transition(WarehouseFormStatus::Cancelled)
            .is_err());
        assert!(WarehouseFormStatus::Cancelled
            .transition(WarehouseFormStatus::Completed)
            .is_err());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::SupInactive).unwrap(),
            "\"SupInactive\""
        );
        let parsed: Result<DeliveryStatus, _> = serde_json::from_str("\"SHIPPED\"");
        assert!(parsed.is_err());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Terminal stages never move again
    #[test]
    fn prop_terminal_stages_are_final(
        from in any_delivery_status(),
        to in any_delivery_status(),
    ) {
        if from.is_terminal() {
            prop_assert!(from.transition(to).is_err());
        }
    }

    /// No stage moves to itself through the table
    #[test]
    fn prop_no_self_transitions(status in any_delivery_status()) {
        prop_assert!(!status.can_transition_to(status));
    }

    /// Status strings parse back to the same variant
    #[test]
    fn prop_status_parses_back(status in any_delivery_status()) {
        let parsed: DeliveryStatus = status.as_str().parse().unwrap();
        prop_assert_eq!(parsed, status);
    }

    /// A decision on a pending item always lands on its target
    #[test]
    fn prop_pending_decision_lands(approved in any::<bool>()) {
        let decision = if approved { Decision::Approve } else { Decision::Reject };
        prop_assert_eq!(
            ApproveStatus::Pending.decide("po report", decision),
            Ok(decision.target())
        );
    }

    /// Supplier sign-off only ever succeeds after manager approval
    #[test]
    fn prop_supplier_after_manager(
        manager in any_approve_status(),
        supplier in any_approve_status(),
        approve in any::<bool>(),
    ) {
        let decision = if approve { Decision::Approve } else { Decision::Reject };
        let result = DualApproval::new(manager, supplier).decide_supplier(decision);
        if result.is_ok() {
            prop_assert_eq!(manager, ApproveStatus::Approved);
            prop_assert_eq!(supplier, ApproveStatus::Pending);
        }
    }
}
