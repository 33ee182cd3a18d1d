//! WebAssembly module for the Procurement Workflow Platform
//!
//! Provides client-side helpers for the dashboard:
//! - Which action buttons to render for a role and record state
//! - Order and line pricing
//! - Delivery schedule validation before submitting an order
//! - Form field validation

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

use shared::{Action, Subject};

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    // Panics show up in the browser console instead of as `unreachable`
    console_error_panic_hook::set_once();
}

fn parse_json<T: DeserializeOwned>(what: &str, json: &str) -> Result<T, String> {
    serde_json::from_str(json).map_err(|e| format!("Invalid {} JSON: {}", what, e))
}

fn parse_decimal(what: &str, value: &str) -> Result<Decimal, String> {
    value
        .trim()
        .parse::<Decimal>()
        .map_err(|e| format!("Invalid {}: {}", what, e))
}

fn to_js_error(message: String) -> JsValue {
    web_sys::console::warn_1(&JsValue::from_str(&message));
    JsValue::from_str(&message)
}

fn action_names(role: &str, subject_json: &str) -> Result<Vec<String>, String> {
    let role: Role = role.parse().map_err(|e: shared::UnknownVariant| e.to_string())?;
    let subject: Subject = parse_json("subject", subject_json)?;
    shared::available_actions(role, &subject)
        .into_iter()
        .map(|action| {
            serde_json::to_value(action)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| "Unserializable action".to_string())
        })
        .collect()
}

/// Action names (e.g. `APPROVE_PLAN`) to render for `role` on a record.
///
/// `subject_json` is a tagged record state, for example
/// `{"kind":"plan","approveStatus":"PENDING"}`.
#[wasm_bindgen(js_name = availableActions)]
pub fn available_actions(role: &str, subject_json: &str) -> Result<js_sys::Array, JsValue> {
    let names = action_names(role, subject_json).map_err(to_js_error)?;
    Ok(names.into_iter().map(JsValue::from).collect())
}

fn role_can(role: &str, action: &str) -> bool {
    let Ok(role) = role.parse::<Role>() else {
        return false;
    };
    let Ok(action) = serde_json::from_value::<Action>(serde_json::Value::String(action.into()))
    else {
        return false;
    };
    role.can(action)
}

/// Whether a role may perform an action at all
#[wasm_bindgen(js_name = canPerform)]
pub fn can_perform(role: &str, action: &str) -> bool {
    role_can(role, action)
}

fn line_total_str(quantity: &str, unit_price: &str) -> Result<String, String> {
    let quantity = parse_decimal("quantity", quantity)?;
    let unit_price = parse_decimal("unit price", unit_price)?;
    shared::line_total(quantity, unit_price)
        .map(|total| total.to_string())
        .map_err(|e| e.to_string())
}

/// Price of one line, as a decimal string
#[wasm_bindgen(js_name = calculateLineTotal)]
pub fn calculate_line_total(quantity: &str, unit_price: &str) -> Result<String, JsValue> {
    line_total_str(quantity, unit_price).map_err(to_js_error)
}

fn order_totals_json(materials_json: &str, vat_rate: &str) -> Result<String, String> {
    let materials: Vec<OrderMaterialInput> = parse_json("materials", materials_json)?;
    let vat_rate = parse_decimal("VAT rate", vat_rate)?;
    validate_vat_rate(vat_rate).map_err(str::to_string)?;
    let priced = materials
        .iter()
        .map(|m| Ok((m.total_quantity()?, m.unit_price)))
        .collect::<Result<Vec<_>, shared::LedgerError>>()
        .map_err(|e| e.to_string())?;
    let totals = shared::order_totals(priced, vat_rate).map_err(|e| e.to_string())?;
    serde_json::to_string(&totals).map_err(|e| e.to_string())
}

/// Order totals (`subTotal`, `vatAmount`, `totalAmount`) as JSON
#[wasm_bindgen(js_name = calculateOrderTotals)]
pub fn calculate_order_totals(materials_json: &str, vat_rate: &str) -> Result<String, JsValue> {
    order_totals_json(materials_json, vat_rate).map_err(to_js_error)
}

fn schedule_error(materials_json: &str, stages_json: &str) -> Option<String> {
    let materials: Vec<OrderMaterialInput> = match parse_json("materials", materials_json) {
        Ok(m) => m,
        Err(e) => return Some(e),
    };
    let stages: Vec<StageInput> = match parse_json("stages", stages_json) {
        Ok(s) => s,
        Err(e) => return Some(e),
    };
    shared::validate_stage_allocation(&materials, &stages)
        .err()
        .map(|e| e.to_string())
}

/// Validate a delivery schedule; returns the error message or `undefined`
#[wasm_bindgen(js_name = validateDeliverySchedule)]
pub fn validate_delivery_schedule(materials_json: &str, stages_json: &str) -> Option<String> {
    schedule_error(materials_json, stages_json)
}

/// Validate an email address
#[wasm_bindgen(js_name = isValidEmail)]
pub fn is_valid_email(email: &str) -> bool {
    validate_email(email).is_ok()
}

/// Validate a supplier tax code
#[wasm_bindgen(js_name = isValidTaxCode)]
pub fn is_valid_tax_code(tax_code: &str) -> bool {
    validate_tax_code(tax_code).is_ok()
}

/// Validate a phone number
#[wasm_bindgen(js_name = isValidPhone)]
pub fn is_valid_phone(phone: &str) -> bool {
    validate_phone(phone).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_can_run_twice() {
        init();
        init();
    }

    #[test]
    fn test_manager_gets_plan_buttons() {
        let names = action_names("MANAGER", r#"{"kind":"plan","approveStatus":"PENDING"}"#).unwrap();
        assert_eq!(names, vec!["APPROVE_PLAN", "EDIT_PLAN"]);

        let names =
            action_names("INSPECTOR", r#"{"kind":"plan","approveStatus":"PENDING"}"#).unwrap();
        assert!(names.is_empty());
    }

    #[test]
    fn test_unknown_role_is_an_error() {
        assert!(action_names("CEO", r#"{"kind":"plan","approveStatus":"PENDING"}"#).is_err());
        assert!(!can_perform("CEO", "APPROVE_PLAN"));
        assert!(can_perform("SUPPLIER", "APPROVE_ORDER_SUPPLIER"));
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line_total_str("12.5", "4").unwrap(), "50.0");
        assert!(line_total_str("abc", "4").is_err());
        assert_eq!(
            line_total_str("79228162514264337593543950335", "2").unwrap_err(),
            "total price is too large to be stored"
        );
    }

    #[test]
    fn test_order_totals() {
        let materials = r#"[{"rawMaterialId":"7f1c2b4e-8a55-4c1e-9d8e-0c9f1a2b3c4d","purchaseTaskId":null,"package":"10","materialPerPackage":"5","unitPrice":"2"}]"#;
        let json = order_totals_json(materials, "0.1").unwrap();
        let totals: shared::OrderTotals = serde_json::from_str(&json).unwrap();
        assert_eq!(totals.sub_total, Decimal::from(100));
        assert_eq!(totals.total_amount, Decimal::from(110));
        assert!(order_totals_json(materials, "1.5").is_err());

        let oversized = r#"[{"rawMaterialId":"7f1c2b4e-8a55-4c1e-9d8e-0c9f1a2b3c4d","purchaseTaskId":null,"package":"39614081257132168796771975168","materialPerPackage":"10","unitPrice":"2"}]"#;
        assert_eq!(
            order_totals_json(oversized, "0.1").unwrap_err(),
            "quantity is too large to be stored"
        );
    }

    #[test]
    fn test_schedule_validation_message() {
        let materials = r#"[{"rawMaterialId":"7f1c2b4e-8a55-4c1e-9d8e-0c9f1a2b3c4d","purchaseTaskId":null,"package":"10","materialPerPackage":"5","unitPrice":"2"}]"#;
        let stages = r#"[{"stageOrder":1,"deliveryDate":"2026-05-01","note":null,"materials":[{"rawMaterialId":"7f1c2b4e-8a55-4c1e-9d8e-0c9f1a2b3c4d","package":"10","materialPerPackage":"5"}]}]"#;
        assert_eq!(schedule_error(materials, stages), None);

        let short = r#"[{"stageOrder":1,"deliveryDate":"2026-05-01","note":null,"materials":[{"rawMaterialId":"7f1c2b4e-8a55-4c1e-9d8e-0c9f1a2b3c4d","package":"4","materialPerPackage":"5"}]}]"#;
        assert!(schedule_error(materials, short).is_some());
    }
}
