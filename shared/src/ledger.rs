//! Quantity reconciliation ledger
//!
//! Tracks, per raw material, how much was ordered, scheduled, delivered,
//! passed inspection and was received into a main warehouse, and derives
//! the lifecycle values (task, plan and order status) that depend on those
//! quantities. Everything here is pure; the backend feeds it rows it loaded
//! inside a transaction.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{
    DeliveryStage, DeliveryStatus, OrderMaterial, OrderMaterialInput, OrderStatus,
    PlanProcessStatus, ShortfallLine, StageInput, TaskStatus,
};
use crate::pricing::line_total;

/// Ordered quantity of one material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedQuantity {
    pub raw_material_id: Uuid,
    pub quantity: Decimal,
}

impl From<&OrderMaterial> for OrderedQuantity {
    fn from(m: &OrderMaterial) -> Self {
        Self {
            raw_material_id: m.raw_material_id,
            quantity: m.total_quantity,
        }
    }
}

/// Quantities of one stage, detached from the persistence model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageQuantities {
    pub stage_order: i32,
    pub is_supplemental: bool,
    pub status: DeliveryStatus,
    pub materials: Vec<StageMaterialQuantities>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMaterialQuantities {
    pub raw_material_id: Uuid,
    pub total_quantity: Decimal,
    pub delivered_quantity: Decimal,
    pub after_inspect_quantity: Option<Decimal>,
    pub received_quantity: Decimal,
}

impl From<&DeliveryStage> for StageQuantities {
    fn from(stage: &DeliveryStage) -> Self {
        Self {
            stage_order: stage.stage_order,
            is_supplemental: stage.is_supplemental,
            status: stage.delivery_status,
            materials: stage
                .purchase_materials
                .iter()
                .map(|m| StageMaterialQuantities {
                    raw_material_id: m.raw_material_id,
                    total_quantity: m.total_quantity,
                    delivered_quantity: m.delivered_quantity,
                    after_inspect_quantity: m.after_inspect_quantity,
                    received_quantity: m.received_quantity,
                })
                .collect(),
        }
    }
}

/// Reconciled quantities of one material across all stages of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialReconciliation {
    pub raw_material_id: Uuid,
    pub ordered: Decimal,
    /// Scheduled on stages that were not cancelled
    pub scheduled: Decimal,
    /// Scheduled on stages the supplier has not handed over yet
    pub in_flight: Decimal,
    pub delivered: Decimal,
    pub awaiting_inspection: Decimal,
    pub passed_inspection: Decimal,
    pub received: Decimal,
    /// Written off through accepted PO reports
    pub waived: Decimal,
    pub open_shortfall: Decimal,
}

/// Reconciliation of a whole order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReconciliation {
    pub materials: Vec<MaterialReconciliation>,
    pub is_settled: bool,
}

impl OrderReconciliation {
    pub fn material(&self, raw_material_id: Uuid) -> Option<&MaterialReconciliation> {
        self.materials
            .iter()
            .find(|m| m.raw_material_id == raw_material_id)
    }

    pub fn has_open_shortfall(&self) -> bool {
        self.materials
            .iter()
            .any(|m| m.open_shortfall > Decimal::ZERO)
    }
}

fn require_positive(value: Decimal, field: &'static str) -> Result<(), LedgerError> {
    if value <= Decimal::ZERO {
        return Err(LedgerError::NonPositive { field });
    }
    Ok(())
}

/// Validate an order's materials against its planned delivery schedule.
///
/// Every ordered material must be fully allocated across the stages, stage
/// orders must run 1..=n, and delivery dates must not go backwards.
pub fn validate_stage_allocation(
    order_materials: &[OrderMaterialInput],
    stages: &[StageInput],
) -> Result<(), LedgerError> {
    if order_materials.is_empty() {
        return Err(LedgerError::Empty("order materials"));
    }
    if stages.is_empty() {
        return Err(LedgerError::Empty("delivery stages"));
    }

    let mut ordered: BTreeMap<Uuid, Decimal> = BTreeMap::new();
    for material in order_materials {
        require_positive(material.package, "package")?;
        require_positive(material.material_per_package, "materialPerPackage")?;
        if material.unit_price < Decimal::ZERO {
            return Err(LedgerError::NonPositive { field: "unitPrice" });
        }
        let quantity = material.total_quantity()?;
        line_total(quantity, material.unit_price)?;
        if ordered.insert(material.raw_material_id, quantity).is_some() {
            return Err(LedgerError::DuplicateMaterial(material.raw_material_id));
        }
    }

    let mut sorted: Vec<&StageInput> = stages.iter().collect();
    sorted.sort_by_key(|s| s.stage_order);

    let mut previous_date: Option<NaiveDate> = None;
    let mut allocated: BTreeMap<Uuid, Decimal> = BTreeMap::new();
    for (position, stage) in sorted.iter().enumerate() {
        let expected = position as i32 + 1;
        if stage.stage_order != expected {
            return Err(LedgerError::StageOrderGap {
                position: position + 1,
                found: stage.stage_order,
            });
        }
        if previous_date.is_some_and(|prev| stage.delivery_date < prev) {
            return Err(LedgerError::DeliveryDateOrder {
                stage_order: stage.stage_order,
            });
        }
        previous_date = Some(stage.delivery_date);

        if stage.materials.is_empty() {
            return Err(LedgerError::EmptyStage(stage.stage_order));
        }
        let mut seen = HashSet::new();
        for material in &stage.materials {
            if !ordered.contains_key(&material.raw_material_id) {
                return Err(LedgerError::UnknownMaterial(material.raw_material_id));
            }
            if !seen.insert(material.raw_material_id) {
                return Err(LedgerError::DuplicateMaterial(material.raw_material_id));
            }
            require_positive(material.package, "package")?;
            require_positive(material.material_per_package, "materialPerPackage")?;
            let total = allocated.entry(material.raw_material_id).or_default();
            *total = total
                .checked_add(material.quantity()?)
                .ok_or(LedgerError::Overflow { field: "quantity" })?;
        }
    }

    for (raw_material_id, ordered_qty) in &ordered {
        let allocated_qty = allocated.get(raw_material_id).copied().unwrap_or_default();
        if allocated_qty != *ordered_qty {
            return Err(LedgerError::AllocationMismatch {
                raw_material_id: *raw_material_id,
                ordered: *ordered_qty,
                allocated: allocated_qty,
            });
        }
    }

    Ok(())
}

/// Reconcile ordered against scheduled, delivered, inspected and received
/// quantities. `waived` lists quantities written off per material.
pub fn reconcile_order(
    ordered: &[OrderedQuantity],
    stages: &[StageQuantities],
    waived: &[OrderedQuantity],
) -> OrderReconciliation {
    let mut materials: Vec<MaterialReconciliation> = ordered
        .iter()
        .map(|o| MaterialReconciliation {
            raw_material_id: o.raw_material_id,
            ordered: o.quantity,
            scheduled: Decimal::ZERO,
            in_flight: Decimal::ZERO,
            delivered: Decimal::ZERO,
            awaiting_inspection: Decimal::ZERO,
            passed_inspection: Decimal::ZERO,
            received: Decimal::ZERO,
            waived: Decimal::ZERO,
            open_shortfall: Decimal::ZERO,
        })
        .collect();

    for stage in stages
        .iter()
        .filter(|s| s.status != DeliveryStatus::Cancelled)
    {
        for line in &stage.materials {
            let Some(entry) = materials
                .iter_mut()
                .find(|m| m.raw_material_id == line.raw_material_id)
            else {
                continue;
            };
            entry.scheduled += line.total_quantity;
            entry.delivered += line.delivered_quantity;
            entry.received += line.received_quantity;
            if stage.status.is_in_flight() {
                entry.in_flight += line.total_quantity;
            } else if stage.status.is_awaiting_inspection() {
                entry.awaiting_inspection += line.delivered_quantity;
            } else if stage.status.has_inspection_result() {
                entry.passed_inspection += line.after_inspect_quantity.unwrap_or_default();
            }
        }
    }

    for w in waived {
        if let Some(entry) = materials
            .iter_mut()
            .find(|m| m.raw_material_id == w.raw_material_id)
        {
            entry.waived += w.quantity;
        }
    }

    for entry in &mut materials {
        let covered =
            entry.passed_inspection + entry.in_flight + entry.awaiting_inspection + entry.waived;
        entry.open_shortfall = (entry.ordered - covered).max(Decimal::ZERO);
    }

    let is_settled = materials.iter().all(|m| {
        m.open_shortfall.is_zero() && m.in_flight.is_zero() && m.awaiting_inspection.is_zero()
    });

    OrderReconciliation {
        materials,
        is_settled,
    }
}

/// Missing quantities of an inspected stage
pub fn stage_shortfall(stage: &DeliveryStage) -> Vec<ShortfallLine> {
    if !stage.delivery_status.has_inspection_result() {
        return Vec::new();
    }
    stage
        .purchase_materials
        .iter()
        .filter_map(|m| {
            m.shortfall()
                .filter(|q| *q > Decimal::ZERO)
                .map(|quantity| ShortfallLine {
                    raw_material_id: m.raw_material_id,
                    purchase_material_id: m.id,
                    quantity,
                })
        })
        .collect()
}

/// Check a supplemental stage only asks for quantities that are still open
pub fn validate_supplemental(
    reconciliation: &OrderReconciliation,
    requested: &[OrderedQuantity],
) -> Result<(), LedgerError> {
    if requested.is_empty() {
        return Err(LedgerError::Empty("supplemental materials"));
    }
    let mut seen = HashSet::new();
    for line in requested {
        if !seen.insert(line.raw_material_id) {
            return Err(LedgerError::DuplicateMaterial(line.raw_material_id));
        }
        require_positive(line.quantity, "quantity")?;
        let material = reconciliation
            .material(line.raw_material_id)
            .ok_or(LedgerError::UnknownMaterial(line.raw_material_id))?;
        if line.quantity > material.open_shortfall {
            return Err(LedgerError::Exceeds {
                field: "quantity",
                value: line.quantity,
                limit_name: "open shortfall",
                limit: material.open_shortfall,
            });
        }
    }
    Ok(())
}

/// Delivered quantity must stay within what the stage schedules
pub fn validate_delivered_quantity(total: Decimal, delivered: Decimal) -> Result<(), LedgerError> {
    if delivered < Decimal::ZERO {
        return Err(LedgerError::NonPositive {
            field: "deliveredQuantity",
        });
    }
    if delivered > total {
        return Err(LedgerError::Exceeds {
            field: "deliveredQuantity",
            value: delivered,
            limit_name: "totalQuantity",
            limit: total,
        });
    }
    Ok(())
}

/// Ordering `requested` more of a task must not exceed what the task needs
pub fn check_task_capacity(
    task_quantity: Decimal,
    already_processed: Decimal,
    requested: Decimal,
) -> Result<(), LedgerError> {
    let remaining = (task_quantity - already_processed).max(Decimal::ZERO);
    if requested > remaining {
        return Err(LedgerError::Exceeds {
            field: "totalQuantity",
            value: requested,
            limit_name: "task remained quantity",
            limit: remaining,
        });
    }
    Ok(())
}

/// Derived view of a task's quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub remained_quantity: Decimal,
    pub status: TaskStatus,
    pub finish_date: Option<NaiveDate>,
}

/// Recompute remained quantity and status of a task.
///
/// A finish date already recorded is kept; a newly finished task gets `today`.
pub fn derive_task_progress(
    quantity: Decimal,
    processed: Decimal,
    finished: Decimal,
    current: TaskStatus,
    finish_date: Option<NaiveDate>,
    today: NaiveDate,
) -> TaskProgress {
    let remained_quantity = (quantity - processed).max(Decimal::ZERO);
    let status = if current == TaskStatus::Cancelled {
        TaskStatus::Cancelled
    } else if quantity > Decimal::ZERO && finished >= quantity {
        TaskStatus::Finished
    } else if processed > Decimal::ZERO || finished > Decimal::ZERO {
        TaskStatus::InProgress
    } else {
        TaskStatus::Pending
    };
    let finish_date = match status {
        TaskStatus::Finished => finish_date.or(Some(today)),
        _ => None,
    };
    TaskProgress {
        remained_quantity,
        status,
        finish_date,
    }
}

/// Plan progress from its task statuses; cancelled tasks are ignored
pub fn derive_plan_process_status(tasks: &[TaskStatus]) -> PlanProcessStatus {
    let live: Vec<&TaskStatus> = tasks
        .iter()
        .filter(|t| **t != TaskStatus::Cancelled)
        .collect();
    if live.is_empty() {
        return PlanProcessStatus::Pending;
    }
    if live.iter().all(|t| **t == TaskStatus::Finished) {
        PlanProcessStatus::Finished
    } else if live
        .iter()
        .any(|t| matches!(t, TaskStatus::InProgress | TaskStatus::Finished))
    {
        PlanProcessStatus::InProgress
    } else {
        PlanProcessStatus::Pending
    }
}

/// Order progress from its stages.
///
/// An approved order is in progress once any stage has started moving; it is
/// finished when every stage is terminal, at least one was imported and no
/// shortfall is left open.
pub fn derive_order_status(
    current: OrderStatus,
    stages: &[StageQuantities],
    reconciliation: &OrderReconciliation,
) -> OrderStatus {
    if !matches!(current, OrderStatus::Approved | OrderStatus::InProgress) {
        return current;
    }

    let started = stages.iter().any(|s| {
        !matches!(
            s.status,
            DeliveryStatus::Pending
                | DeliveryStatus::Approved
                | DeliveryStatus::SupInactive
                | DeliveryStatus::Cancelled
        )
    });
    let all_terminal = !stages.is_empty() && stages.iter().all(|s| s.status.is_terminal());
    let any_imported = stages
        .iter()
        .any(|s| s.status == DeliveryStatus::Imported);

    if all_terminal && any_imported && !reconciliation.has_open_shortfall() {
        OrderStatus::Finished
    } else if started || any_imported {
        OrderStatus::InProgress
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn material(id: Uuid, package: i64, per_package: i64) -> OrderMaterialInput {
        OrderMaterialInput {
            raw_material_id: id,
            purchase_task_id: None,
            package: Decimal::from(package),
            material_per_package: Decimal::from(per_package),
            unit_price: Decimal::from(5),
        }
    }

    fn stage(order: i32, day: u32, lines: &[(Uuid, i64)]) -> StageInput {
        StageInput {
            stage_order: order,
            delivery_date: date(day),
            note: None,
            materials: lines
                .iter()
                .map(|(id, package)| crate::models::StageMaterialInput {
                    raw_material_id: *id,
                    package: Decimal::from(*package),
                    material_per_package: Decimal::from(10),
                })
                .collect(),
        }
    }

    #[test]
    fn exact_split_is_accepted() {
        let steel = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[material(steel, 10, 10)],
            &[stage(1, 1, &[(steel, 4)]), stage(2, 5, &[(steel, 6)])],
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn stages_may_arrive_out_of_order() {
        let steel = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[material(steel, 10, 10)],
            &[stage(2, 5, &[(steel, 6)]), stage(1, 1, &[(steel, 4)])],
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn under_allocation_is_rejected() {
        let steel = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[material(steel, 10, 10)],
            &[stage(1, 1, &[(steel, 4)])],
        );
        assert!(matches!(result, Err(LedgerError::AllocationMismatch { .. })));
    }

    #[test]
    fn stage_gap_is_rejected() {
        let steel = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[material(steel, 10, 10)],
            &[stage(1, 1, &[(steel, 4)]), stage(3, 5, &[(steel, 6)])],
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
    fn decreasing_dates_are_rejected() {
        let steel = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[material(steel, 10, 10)],
            &[stage(1, 9, &[(steel, 4)]), stage(2, 5, &[(steel, 6)])],
        );
        assert_eq!(result, Err(LedgerError::DeliveryDateOrder { stage_order: 2 }));
    }

    #[test]
    fn unknown_material_is_rejected() {
        let steel = Uuid::new_v4();
        let copper = Uuid::new_v4();
        let result = validate_stage_allocation(
            &[material(steel, 10, 10)],
            &[stage(1, 1, &[(steel, 10), (copper, 1)])],
        );
        assert_eq!(result, Err(LedgerError::UnknownMaterial(copper)));
    }

    #[test]
    fn plan_status_ignores_cancelled_tasks() {
        assert_eq!(
            derive_plan_process_status(&[TaskStatus::Finished, TaskStatus::Cancelled]),
            PlanProcessStatus::Finished
        );
        assert_eq!(
            derive_plan_process_status(&[TaskStatus::Pending, TaskStatus::Finished]),
            PlanProcessStatus::InProgress
        );
        assert_eq!(derive_plan_process_status(&[]), PlanProcessStatus::Pending);
    }

    #[test]
    fn task_keeps_first_finish_date() {
        let progress = derive_task_progress(
            Decimal::from(100),
            Decimal::from(100),
            Decimal::from(100),
            TaskStatus::Finished,
            Some(date(2)),
            date(20),
        );
        assert_eq!(progress.status, TaskStatus::Finished);
        assert_eq!(progress.finish_date, Some(date(2)));
        assert_eq!(progress.remained_quantity, Decimal::ZERO);
    }
}
