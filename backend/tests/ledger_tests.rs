//! Quantity ledger tests
//!
//! Tests for the bookkeeping behind orders, stages and warehouses:
//! - Stage allocation of ordered materials
//! - Order reconciliation and shortfall
//! - Derived task, plan and order status
//! - Stock movements

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    apply_stock_movement, check_task_capacity, derive_order_status, derive_plan_process_status,
    derive_task_progress, reconcile_order, stage_shortfall, validate_delivered_quantity,
    validate_inspection_quantities, validate_stage_allocation, validate_supplemental,
    DeliveryStage, DeliveryStatus, LedgerError, OrderMaterialInput, OrderStatus, OrderedQuantity,
    PlanProcessStatus, PurchaseMaterial, StageInput, StageMaterialInput, StageMaterialQuantities,
    StageQuantities, TaskStatus, WarehouseFormType,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
}

fn ordered(raw_material_id: Uuid, package: &str, per_package: &str) -> OrderMaterialInput {
    OrderMaterialInput {
        raw_material_id,
        purchase_task_id: None,
        package: dec(package),
        material_per_package: dec(per_package),
        unit_price: dec("12.50"),
    }
}

fn planned(stage_order: i32, date: NaiveDate, lines: &[(Uuid, &str)]) -> StageInput {
    StageInput {
        stage_order,
        delivery_date: date,
        note: None,
        materials: lines
            .iter()
            .map(|(id, package)| StageMaterialInput {
                raw_material_id: *id,
                package: dec(package),
                material_per_package: dec("25"),
            })
            .collect(),
    }
}

fn stage_quantities(
    stage_order: i32,
    status: DeliveryStatus,
    raw_material_id: Uuid,
    total: Decimal,
    delivered: Decimal,
    passed: Option<Decimal>,
) -> StageQuantities {
    StageQuantities {
        stage_order,
        is_supplemental: false,
        status,
        materials: vec![StageMaterialQuantities {
            raw_material_id,
            total_quantity: total,
            delivered_quantity: delivered,
            after_inspect_quantity: passed,
            received_quantity: if status == DeliveryStatus::Imported {
                passed.unwrap_or_default()
            } else {
                Decimal::ZERO
            },
        }],
    }
}

fn inspected_stage(lines: &[(&str, &str)]) -> DeliveryStage {
    let stage_id = Uuid::new_v4();
    let now = Utc::now();
    DeliveryStage {
        id: stage_id,
        purchasing_order_id: Uuid::new_v4(),
        stage_order: 1,
        delivery_date: day(10),
        delivery_status: DeliveryStatus::Inspected,
        is_supplemental: false,
        cancel_reason: None,
        note: None,
        delivered_at: Some(now),
        purchase_materials: lines
            .iter()
            .map(|(total, passed)| PurchaseMaterial {
                id: Uuid::new_v4(),
                delivery_stage_id: stage_id,
                order_material_id: Uuid::new_v4(),
                raw_material_id: Uuid::new_v4(),
                package: dec("1"),
                material_per_package: dec(total),
                unit: "kg".to_string(),
                total_quantity: dec(total),
                delivered_quantity: dec(total),
                after_inspect_quantity: Some(dec(passed)),
                received_quantity: Decimal::ZERO,
                unit_price: dec("2"),
                total_price: dec(total) * dec("2"),
            })
            .collect(),
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// 40 packages of 25 kg split 16 + 24 across two stages
    #[test]
    fn test_allocation_across_stages() {
        let flour = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[ordered(flour, "40", "25")],
            &[
                planned(1, day(3), &[(flour, "16")]),
                planned(2, day(17), &[(flour, "24")]),
            ],
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_over_allocation_rejected() {
        let flour = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[ordered(flour, "40", "25")],
            &[
                planned(1, day(3), &[(flour, "20")]),
                planned(2, day(17), &[(flour, "24")]),
            ],
        );
        assert!(matches!(
            result,
            Err(LedgerError::AllocationMismatch { .. })
        ));
    }

    #[test]
    fn test_oversized_quantities_are_rejected_not_panicking() {
        let flour = Uuid::new_v4();
        let huge = "39614081257132168796771975168";

        let result = validate_stage_allocation(
            &[ordered(flour, huge, "10")],
            &[planned(1, day(3), &[(flour, "16")])],
        );
        assert_eq!(result, Err(LedgerError::Overflow { field: "quantity" }));

        let result = validate_stage_allocation(
            &[ordered(flour, "40", "25")],
            &[planned(1, day(3), &[(flour, huge)])],
        );
        assert_eq!(result, Err(LedgerError::Overflow { field: "quantity" }));

        // Fits in memory, but not in a NUMERIC(18,4) column
        let result = validate_stage_allocation(
            &[ordered(flour, "100000000000000", "2")],
            &[planned(1, day(3), &[(flour, "16")])],
        );
        assert_eq!(result, Err(LedgerError::Overflow { field: "quantity" }));
    }

    #[test]
    fn test_stage_orders_must_be_contiguous() {
        let flour = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[ordered(flour, "40", "25")],
            &[
                planned(1, day(3), &[(flour, "16")]),
                planned(3, day(17), &[(flour, "24")]),
            ],
        );
        assert_eq!(
            result,
            Err(LedgerError::StageOrderGap {
                position: 2,
                found: 3
            })
        );
    }

    #[test]
    fn test_delivery_dates_cannot_go_backwards() {
        let flour = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[ordered(flour, "40", "25")],
            &[
                planned(1, day(17), &[(flour, "16")]),
                planned(2, day(3), &[(flour, "24")]),
            ],
        );
        assert_eq!(result, Err(LedgerError::DeliveryDateOrder { stage_order: 2 }));
    }

    #[test]
    fn test_stage_material_must_be_ordered() {
        let flour = Uuid::new_v4();
        let sugar = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[ordered(flour, "40", "25")],
            &[planned(1, day(3), &[(flour, "40"), (sugar, "1")])],
        );
        assert_eq!(result, Err(LedgerError::UnknownMaterial(sugar)));
    }

    #[test]
    fn test_order_without_stages_rejected() {
        let flour = Uuid::new_v4();
        let result = validate_stage_allocation(&[ordered(flour, "40", "25")], &[]);
        assert_eq!(result, Err(LedgerError::Empty("delivery stages")));
    }

    #[test]
    fn test_shortfall_of_inspected_stage() {
        let stage = inspected_stage(&[("100", "92"), ("50", "50")]);
        let shortfall = stage_shortfall(&stage);
        assert_eq!(shortfall.len(), 1);
        assert_eq!(shortfall[0].quantity, dec("8"));
        assert_eq!(shortfall[0].purchase_material_id, stage.purchase_materials[0].id);
    }

    #[test]
    fn test_uninspected_stage_has_no_shortfall() {
        let mut stage = inspected_stage(&[("100", "92")]);
        stage.delivery_status = DeliveryStatus::Inspecting;
        assert!(stage_shortfall(&stage).is_empty());
    }

    #[test]
    fn test_reconciliation_with_waived_shortfall() {
        let sugar = Uuid::new_v4();
        let order = [OrderedQuantity {
            raw_material_id: sugar,
            quantity: dec("100"),
        }];
        let stages = [
            stage_quantities(
                1,
                DeliveryStatus::Imported,
                sugar,
                dec("100"),
                dec("100"),
                Some(dec("80")),
            ),
            stage_quantities(
                2,
                DeliveryStatus::Cancelled,
                sugar,
                dec("20"),
                Decimal::ZERO,
                None,
            ),
        ];

        let open = reconcile_order(&order, &stages, &[]);
        let line = open.material(sugar).unwrap();
        assert_eq!(line.scheduled, dec("100"));
        assert_eq!(line.passed_inspection, dec("80"));
        assert_eq!(line.received, dec("80"));
        assert_eq!(line.open_shortfall, dec("20"));
        assert!(!open.is_settled);
        assert_eq!(
            derive_order_status(OrderStatus::InProgress, &stages, &open),
            OrderStatus::InProgress
        );

        let waived = [OrderedQuantity {
            raw_material_id: sugar,
            quantity: dec("20"),
        }];
        let settled = reconcile_order(&order, &stages, &waived);
        assert!(settled.is_settled);
        assert_eq!(
            derive_order_status(OrderStatus::InProgress, &stages, &settled),
            OrderStatus::Finished
        );
    }

    #[test]
    fn test_in_flight_supplemental_covers_shortfall() {
        let sugar = Uuid::new_v4();
        let order = [OrderedQuantity {
            raw_material_id: sugar,
            quantity: dec("100"),
        }];
        let mut supplemental = stage_quantities(
            2,
            DeliveryStatus::SupInactive,
            sugar,
            dec("20"),
            Decimal::ZERO,
            None,
        );
        supplemental.is_supplemental = true;
        let stages = [
            stage_quantities(
                1,
                DeliveryStatus::Inspected,
                sugar,
                dec("100"),
                dec("100"),
                Some(dec("80")),
            ),
            supplemental,
        ];

        let reconciliation = reconcile_order(&order, &stages, &[]);
        let line = reconciliation.material(sugar).unwrap();
        assert_eq!(line.in_flight, dec("20"));
        assert_eq!(line.open_shortfall, Decimal::ZERO);
        assert!(!reconciliation.is_settled);

        let extra = [OrderedQuantity {
            raw_material_id: sugar,
            quantity: dec("1"),
        }];
        assert!(matches!(
            validate_supplemental(&reconciliation, &extra),
            Err(LedgerError::Exceeds { .. })
        ));
    }

    #[test]
    fn test_approved_order_moves_once_a_stage_starts() {
        let sugar = Uuid::new_v4();
        let order = [OrderedQuantity {
            raw_material_id: sugar,
            quantity: dec("10"),
        }];
        let waiting = [stage_quantities(
            1,
            DeliveryStatus::Approved,
            sugar,
            dec("10"),
            Decimal::ZERO,
            None,
        )];
        let reconciliation = reconcile_order(&order, &waiting, &[]);
        assert_eq!(
            derive_order_status(OrderStatus::Approved, &waiting, &reconciliation),
            OrderStatus::Approved
        );

        let moving = [stage_quantities(
            1,
            DeliveryStatus::Delivering,
            sugar,
            dec("10"),
            Decimal::ZERO,
            None,
        )];
        let reconciliation = reconcile_order(&order, &moving, &[]);
        assert_eq!(
            derive_order_status(OrderStatus::Approved, &moving, &reconciliation),
            OrderStatus::InProgress
        );
    }

    #[test]
    fn test_cancelled_order_is_left_alone() {
        let reconciliation = reconcile_order(&[], &[], &[]);
        assert_eq!(
            derive_order_status(OrderStatus::Cancelled, &[], &reconciliation),
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn test_task_progress() {
        let progress = derive_task_progress(
            dec("500"),
            dec("200"),
            Decimal::ZERO,
            TaskStatus::Pending,
            None,
            day(1),
        );
        assert_eq!(progress.remained_quantity, dec("300"));
        assert_eq!(progress.status, TaskStatus::InProgress);
        assert_eq!(progress.finish_date, None);

        let done = derive_task_progress(
            dec("500"),
            dec("500"),
            dec("500"),
            TaskStatus::InProgress,
            None,
            day(9),
        );
        assert_eq!(done.status, TaskStatus::Finished);
        assert_eq!(done.finish_date, Some(day(9)));
    }

    #[test]
    fn test_task_capacity() {
        assert_eq!(check_task_capacity(dec("500"), dec("200"), dec("300")), Ok(()));
        assert!(check_task_capacity(dec("500"), dec("200"), dec("301")).is_err());
    }

    #[test]
    fn test_plan_status_ignores_cancelled_tasks() {
        assert_eq!(
            derive_plan_process_status(&[TaskStatus::Finished, TaskStatus::Cancelled]),
            PlanProcessStatus::Finished
        );
        assert_eq!(
            derive_plan_process_status(&[TaskStatus::Finished, TaskStatus::Pending]),
            PlanProcessStatus::InProgress
        );
        assert_eq!(
            derive_plan_process_status(&[TaskStatus::Cancelled]),
            PlanProcessStatus::Pending
        );
    }

    #[test]
    fn test_inspection_quantity_bounds() {
        assert_eq!(
            validate_inspection_quantities(dec("100"), dec("100"), dec("95")),
            Ok(())
        );
        assert!(validate_inspection_quantities(dec("100"), dec("101"), dec("95")).is_err());
        assert!(validate_inspection_quantities(dec("100"), dec("90"), dec("95")).is_err());
        assert!(validate_inspection_quantities(dec("100"), dec("-1"), dec("0")).is_err());
    }

    #[test]
    fn test_delivered_quantity_bounds() {
        assert_eq!(validate_delivered_quantity(dec("60"), dec("60")), Ok(()));
        assert!(validate_delivered_quantity(dec("60"), dec("61")).is_err());
        assert!(validate_delivered_quantity(dec("60"), dec("-1")).is_err());
    }

    #[test]
    fn test_stock_movement() {
        assert_eq!(
            apply_stock_movement(dec("10.5"), WarehouseFormType::Import, dec("4.5")),
            Ok(dec("15.0"))
        );
        assert_eq!(
            apply_stock_movement(dec("10"), WarehouseFormType::Export, dec("10")),
            Ok(Decimal::ZERO)
        );
        assert!(apply_stock_movement(dec("10"), WarehouseFormType::Export, dec("10.01")).is_err());
        assert_eq!(
            apply_stock_movement(dec("10"), WarehouseFormType::Import, Decimal::ZERO),
            Err(LedgerError::NonPositive { field: "quantity" })
        );
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Open shortfall is exactly what inspection did not pass
    #[test]
    fn prop_shortfall_is_ordered_minus_passed(
        quantity in 1i64..10_000,
        delivered_pct in 0i64..=100,
        passed_pct in 0i64..=100,
    ) {
        let sugar = Uuid::new_v4();
        let total = Decimal::from(quantity);
        let delivered = Decimal::from(quantity * delivered_pct / 100);
        let passed = Decimal::from(quantity * delivered_pct / 100 * passed_pct / 100);

        let order = [OrderedQuantity { raw_material_id: sugar, quantity: total }];
        let stages = [stage_quantities(
            1,
            DeliveryStatus::Inspected,
            sugar,
            total,
            delivered,
            Some(passed),
        )];
        let reconciliation = reconcile_order(&order, &stages, &[]);
        let line = reconciliation.material(sugar).unwrap();

        prop_assert_eq!(line.open_shortfall, total - passed);
        prop_assert_eq!(reconciliation.has_open_shortfall(), passed < total);
    }

    /// Shortfall never goes negative and never exceeds the ordered quantity
    #[test]
    fn prop_shortfall_bounded(
        quantity in 1i64..10_000,
        scheduled in 0i64..20_000,
        waived in 0i64..10_000,
        status in prop::sample::select(DeliveryStatus::ALL.to_vec()),
    ) {
        let sugar = Uuid::new_v4();
        let total = Decimal::from(quantity);
        let order = [OrderedQuantity { raw_material_id: sugar, quantity: total }];
        let stages = [stage_quantities(
            1,
            status,
            sugar,
            Decimal::from(scheduled),
            Decimal::from(scheduled),
            Some(Decimal::from(scheduled)),
        )];
        let waivers = [OrderedQuantity { raw_material_id: sugar, quantity: Decimal::from(waived) }];
        let reconciliation = reconcile_order(&order, &stages, &waivers);
        let line = reconciliation.material(sugar).unwrap();

        prop_assert!(line.open_shortfall >= Decimal::ZERO);
        prop_assert!(line.open_shortfall <= total);
    }

    /// Every ordered unit is passed, in flight, awaiting inspection, waived
    /// or still open, whatever mix of stage statuses the order has
    #[test]
    fn prop_reconciliation_accounts_for_every_unit(
        stages in prop::collection::vec(
            (
                prop::sample::select(DeliveryStatus::ALL.to_vec()),
                1i64..5_000,
                0i64..=100,
                0i64..=100,
            ),
            1..8,
        ),
        waived in 0i64..2_000,
        slack in 0i64..2_000,
    ) {
        let sugar = Uuid::new_v4();
        let quantities: Vec<StageQuantities> = stages
            .iter()
            .enumerate()
            .map(|(i, (status, total, delivered_pct, passed_pct))| {
                let delivered = total * delivered_pct / 100;
                stage_quantities(
                    i as i32 + 1,
                    *status,
                    sugar,
                    Decimal::from(*total),
                    Decimal::from(delivered),
                    Some(Decimal::from(delivered * passed_pct / 100)),
                )
            })
            .collect();
        let scheduled: i64 = stages
            .iter()
            .filter(|(status, ..)| *status != DeliveryStatus::Cancelled)
            .map(|(_, total, ..)| total)
            .sum();

        // Ordered at least what every stage and the waiver could cover
        let ordered = Decimal::from(scheduled + waived + slack);
        let order = [OrderedQuantity { raw_material_id: sugar, quantity: ordered }];
        let waivers = [OrderedQuantity { raw_material_id: sugar, quantity: Decimal::from(waived) }];
        let reconciliation = reconcile_order(&order, &quantities, &waivers);
        let line = reconciliation.material(sugar).unwrap();

        prop_assert_eq!(line.scheduled, Decimal::from(scheduled));
        prop_assert_eq!(
            line.ordered,
            line.passed_inspection
                + line.in_flight
                + line.awaiting_inspection
                + line.waived
                + line.open_shortfall
        );

        let live: Vec<StageQuantities> = quantities
            .iter()
            .filter(|s| s.status != DeliveryStatus::Cancelled)
            .cloned()
            .collect();
        prop_assert_eq!(&reconcile_order(&order, &live, &waivers), &reconciliation);
    }

    /// Any even split of packages across stages is a valid allocation
    #[test]
    fn prop_split_allocation_accepted(
        packages in prop::collection::vec(1i64..200, 1..6),
    ) {
        let flour = Uuid::new_v4();
        let total: i64 = packages.iter().sum();
        let order = [OrderMaterialInput {
            raw_material_id: flour,
            purchase_task_id: None,
            package: Decimal::from(total),
            material_per_package: dec("25"),
            unit_price: dec("1"),
        }];
        let stages: Vec<StageInput> = packages
            .iter()
            .enumerate()
            .map(|(i, package)| StageInput {
                stage_order: i as i32 + 1,
                delivery_date: day(1 + i as u32),
                note: None,
                materials: vec![StageMaterialInput {
                    raw_material_id: flour,
                    package: Decimal::from(*package),
                    material_per_package: dec("25"),
                }],
            })
            .collect();

        prop_assert_eq!(validate_stage_allocation(&order, &stages), Ok(()));
    }

    /// Import then export of the same quantity restores stock
    #[test]
    fn prop_import_export_restores_stock(
        current in 0i64..1_000_000,
        moved in 1i64..1_000_000,
    ) {
        let start = Decimal::new(current, 2);
        let quantity = Decimal::new(moved, 2);
        let after_import = apply_stock_movement(start, WarehouseFormType::Import, quantity).unwrap();
        let after_export = apply_stock_movement(after_import, WarehouseFormType::Export, quantity).unwrap();
        prop_assert_eq!(after_export, start);
    }

    /// Exports never drive stock below zero
    #[test]
    fn prop_export_never_negative(
        current in 0i64..10_000,
        moved in 1i64..20_000,
    ) {
        let result = apply_stock_movement(
            Decimal::from(current),
            WarehouseFormType::Export,
            Decimal::from(moved),
        );
        match result {
            Ok(stock) => prop_assert!(stock >= Decimal::ZERO),
            Err(_) => prop_assert!(moved > current),
        }
    }

    /// Remained quantity is never negative
    #[test]
    fn prop_task_remained_non_negative(
        quantity in 0i64..10_000,
        processed in 0i64..20_000,
    ) {
        let progress = derive_task_progress(
            Decimal::from(quantity),
            Decimal::from(processed),
            Decimal::ZERO,
            TaskStatus::Pending,
            None,
            day(1),
        );
        prop_assert!(progress.remained_quantity >= Decimal::ZERO);
    }
}
