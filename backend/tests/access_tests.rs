//! Access control and input validation tests
//!
//! Tests for:
//! - The role x action matrix
//! - Status-aware action lists rendered by the dashboard
//! - Account and catalog field validators
//! - Generated document codes

use proptest::prelude::*;
use shared::{
    available_actions, document_prefix, format_document_code, validate_catalog_code,
    validate_date_range, validate_document_code, validate_email, validate_password,
    validate_phone, validate_required, validate_tax_code, validate_unit_price, Action,
    ApproveStatus, DeliveryStatus, DualApproval, InspectionStatus, OrderStatus, Role, Subject,
    WarehouseFormStatus,
};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_manager_approves_plans_staff_does_not() {
        let subject = Subject::Plan {
            approve_status: ApproveStatus::Pending,
        };
        assert!(available_actions(Role::Manager, &subject).contains(&Action::ApprovePlan));
        let staff = available_actions(Role::PurchasingStaff, &subject);
        assert!(!staff.contains(&Action::ApprovePlan));
        assert!(staff.contains(&Action::EditPlan));
    }

    #[test]
    fn test_approved_plan_only_offers_assignment() {
        let subject = Subject::Plan {
            approve_status: ApproveStatus::Approved,
        };
        assert_eq!(
            available_actions(Role::Manager, &subject),
            vec![Action::AssignTask]
        );
    }

    #[test]
    fn test_supplier_signs_after_manager() {
        let pending = Subject::Order {
            approval: DualApproval::default(),
            order_status: OrderStatus::Pending,
        };
        assert!(available_actions(Role::Supplier, &pending).is_empty());

        let managed = Subject::Order {
            approval: DualApproval::new(ApproveStatus::Approved, ApproveStatus::Pending),
            order_status: OrderStatus::Pending,
        };
        assert_eq!(
            available_actions(Role::Supplier, &managed),
            vec![Action::ApproveOrderSupplier]
        );
        assert!(!available_actions(Role::Manager, &managed).contains(&Action::ApproveOrderManager));
    }

    #[test]
    fn test_supplier_delivers_stages() {
        let approved = Subject::Stage {
            status: DeliveryStatus::Approved,
        };
        assert_eq!(
            available_actions(Role::Supplier, &approved),
            vec![Action::UpdateDelivery]
        );

        let supplemental = Subject::Stage {
            status: DeliveryStatus::SupInactive,
        };
        assert!(available_actions(Role::Supplier, &supplemental)
            .contains(&Action::StartSupplementalDelivery));
    }

    #[test]
    fn test_delivered_stage_actions() {
        let delivered = Subject::Stage {
            status: DeliveryStatus::Delivered,
        };
        let staff = available_actions(Role::PurchasingStaff, &delivered);
        assert!(staff.contains(&Action::RequestInspection));
        assert!(staff.contains(&Action::RequestTempWarehouse));
        assert!(!staff.contains(&Action::CancelStage));
    }

    #[test]
    fn test_inspected_stage_actions() {
        let inspected = Subject::Stage {
            status: DeliveryStatus::Inspected,
        };
        assert_eq!(
            available_actions(Role::WarehouseStaff, &inspected),
            vec![Action::CreateWarehouseForm]
        );
        assert_eq!(
            available_actions(Role::Inspector, &inspected),
            vec![Action::CreatePoReport]
        );
    }

    #[test]
    fn test_finished_records_offer_nothing() {
        let subjects = [
            Subject::Inspection {
                status: InspectionStatus::Inspected,
            },
            Subject::PoReport {
                approve_status: ApproveStatus::Approved,
            },
            Subject::TempWarehouseRequest {
                approve_status: ApproveStatus::Rejected,
            },
            Subject::WarehouseForm {
                status: WarehouseFormStatus::Completed,
            },
            Subject::Stage {
                status: DeliveryStatus::Imported,
            },
        ];
        for subject in &subjects {
            for role in Role::ALL {
                assert!(
                    available_actions(*role, subject).is_empty(),
                    "{} sees actions on {:?}",
                    role,
                    subject
                );
            }
        }
    }

    #[test]
    fn test_supplier_is_not_internal() {
        assert!(!Role::Supplier.sees_all_orders());
        assert!(Role::Inspector.sees_all_orders());
    }

    #[test]
    fn test_email() {
        assert!(validate_email("buyer@example.com").is_ok());
        assert!(validate_email("buyer@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("buyer @example.com").is_err());
        assert!(validate_email("buyer.example.com").is_err());
    }

    #[test]
    fn test_password() {
        assert!(validate_password("s3cretpass").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("nodigitshere").is_err());
    }

    #[test]
    fn test_phone() {
        assert!(validate_phone("+84 912 345 678").is_ok());
        assert!(validate_phone("028-3822-1234").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("call me").is_err());
    }

    #[test]
    fn test_tax_code() {
        assert!(validate_tax_code("0312345678").is_ok());
        assert!(validate_tax_code("0312345678-001").is_ok());
        assert!(validate_tax_code("0312345678-1").is_err());
        assert!(validate_tax_code("03123456").is_err());
    }

    #[test]
    fn test_catalog_code() {
        assert!(validate_catalog_code("RM-FLOUR_01").is_ok());
        assert!(validate_catalog_code("rm-flour").is_err());
        assert!(validate_catalog_code("R").is_err());
    }

    #[test]
    fn test_required_text() {
        assert!(validate_required("Restock Q3").is_ok());
        assert!(validate_required("  \t").is_err());
    }

    #[test]
    fn test_unit_price() {
        assert!(validate_unit_price(rust_decimal::Decimal::ZERO).is_ok());
        assert!(validate_unit_price(rust_decimal::Decimal::new(-1, 2)).is_err());
    }

    #[test]
    fn test_date_range() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        assert!(validate_date_range(start, end).is_ok());
        assert!(validate_date_range(start, start).is_ok());
        assert!(validate_date_range(end, start).is_err());
    }

    #[test]
    fn test_document_codes() {
        let code = format_document_code(document_prefix::PURCHASING_ORDER, 2026, 7);
        assert_eq!(code, "PO-2026-0007");
        assert!(validate_document_code(document_prefix::PURCHASING_ORDER, &code).is_ok());
        assert!(validate_document_code(document_prefix::PURCHASING_PLAN, &code).is_err());
        assert!(validate_document_code("IR", "IR-26-0001").is_err());
        assert!(validate_document_code("IR", "IR-2026-001").is_err());
    }

    #[test]
    fn test_sequence_grows_past_four_digits() {
        let code = format_document_code(document_prefix::IMPORT_FORM, 2026, 12345);
        assert_eq!(code, "IM-2026-12345");
        assert!(validate_document_code(document_prefix::IMPORT_FORM, &code).is_ok());
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(Role::PurchasingStaff.as_str(), "PURCHASING_STAFF");
        assert_eq!("WAREHOUSE_STAFF".parse::<Role>(), Ok(Role::WarehouseStaff));
        assert!("OWNER".parse::<Role>().is_err());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn any_role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

fn any_subject() -> impl Strategy<Value = Subject> {
    let approve = prop::sample::select(ApproveStatus::ALL.to_vec());
    prop_oneof![
        approve
            .clone()
            .prop_map(|approve_status| Subject::Plan { approve_status }),
        (
            approve.clone(),
            approve.clone(),
            prop::sample::select(OrderStatus::ALL.to_vec()),
        )
            .prop_map(|(manager, supplier, order_status)| Subject::Order {
                approval: DualApproval::new(manager, supplier),
                order_status,
            }),
        prop::sample::select(DeliveryStatus::ALL.to_vec())
            .prop_map(|status| Subject::Stage { status }),
        prop::sample::select(InspectionStatus::ALL.to_vec())
            .prop_map(|status| Subject::Inspection { status }),
        approve
            .clone()
            .prop_map(|approve_status| Subject::PoReport { approve_status }),
        approve.prop_map(|approve_status| Subject::TempWarehouseRequest { approve_status }),
        prop::sample::select(WarehouseFormStatus::ALL.to_vec())
            .prop_map(|status| Subject::WarehouseForm { status }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Offered actions are always ones the role may perform
    #[test]
    fn prop_offered_actions_are_permitted(role in any_role(), subject in any_subject()) {
        for action in available_actions(role, &subject) {
            prop_assert!(role.can(action));
        }
    }

    /// Suppliers never see internal workflow actions
    #[test]
    fn prop_supplier_actions_limited(subject in any_subject()) {
        for action in available_actions(Role::Supplier, &subject) {
            prop_assert!(matches!(
                action,
                Action::ApproveOrderSupplier
                    | Action::UpdateDelivery
                    | Action::StartSupplementalDelivery
            ));
        }
    }

    /// Formatted codes always validate against their own prefix
    #[test]
    fn prop_document_code_valid(year in 2000i32..=9999, sequence in 1i32..1_000_000) {
        for prefix in [
            document_prefix::PURCHASING_PLAN,
            document_prefix::PURCHASING_ORDER,
            document_prefix::INSPECTION_REQUEST,
            document_prefix::PO_REPORT,
            document_prefix::TEMP_WAREHOUSE_REQUEST,
            document_prefix::IMPORT_FORM,
            document_prefix::EXPORT_FORM,
        ] {
            let code = format_document_code(prefix, year, sequence);
            prop_assert!(validate_document_code(prefix, &code).is_ok());
        }
    }
}
