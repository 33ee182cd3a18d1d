//! Validation utilities for the Procurement Workflow Platform

use chrono::NaiveDate;
use rust_decimal::Decimal;

// ============================================================================
// Quantity Validations
// ============================================================================

/// Validate a quantity is strictly positive
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than zero");
    }
    Ok(())
}

/// Validate a unit price is not negative
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    Ok(())
}

/// Validate a VAT rate is a fraction between 0 and 1
pub fn validate_vat_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err("VAT rate must be between 0 and 1");
    }
    Ok(())
}

/// Validate that a period does not end before it starts
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), &'static str> {
    if end < start {
        return Err("End date must not be before start date");
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Validate email format (basic check)
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email format");
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.')
    {
        return Err("Invalid email format");
    }
    if email.chars().any(char::is_whitespace) {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit");
    }
    Ok(())
}

/// Validate phone number: 8-15 digits, optionally prefixed with `+`,
/// spaces, dots and dashes ignored
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if body
        .chars()
        .any(|c| !(c.is_ascii_digit() || c == ' ' || c == '-' || c == '.'))
    {
        return Err("Phone number may only contain digits");
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(8..=15).contains(&digits) {
        return Err("Phone number must have 8 to 15 digits");
    }
    Ok(())
}

/// Validate a company tax code: 10 digits, optionally followed by a
/// `-NNN` branch suffix
pub fn validate_tax_code(tax_code: &str) -> Result<(), &'static str> {
    let (main, branch) = match tax_code.split_once('-') {
        Some((main, branch)) => (main, Some(branch)),
        None => (tax_code, None),
    };
    if main.len() != 10 || !main.chars().all(|c| c.is_ascii_digit()) {
        return Err("Tax code must be 10 digits");
    }
    if let Some(branch) = branch {
        if branch.len() != 3 || !branch.chars().all(|c| c.is_ascii_digit()) {
            return Err("Tax code branch suffix must be 3 digits");
        }
    }
    Ok(())
}

/// Validate a catalog code (materials, warehouses): 2-20 characters of
/// uppercase letters, digits, `-` or `_`
pub fn validate_catalog_code(code: &str) -> Result<(), &'static str> {
    if code.len() < 2 || code.len() > 20 {
        return Err("Code must be 2 to 20 characters");
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err("Code must be uppercase alphanumeric");
    }
    Ok(())
}

/// Validate a non-blank text field
pub fn validate_required(value: &str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        return Err("Value is required");
    }
    Ok(())
}

// ============================================================================
// Document Codes
// ============================================================================

/// Prefixes of generated document codes
pub mod document_prefix {
    pub const PURCHASING_PLAN: &str = "PP";
    pub const PURCHASING_ORDER: &str = "PO";
    pub const INSPECTION_REQUEST: &str = "IR";
    pub const PO_REPORT: &str = "RP";
    pub const TEMP_WAREHOUSE_REQUEST: &str = "TW";
    pub const IMPORT_FORM: &str = "IM";
    pub const EXPORT_FORM: &str = "EX";
}

/// Format a generated document code: `PREFIX-YYYY-NNNN`
pub fn format_document_code(prefix: &str, year: i32, sequence: i32) -> String {
    format!("{}-{}-{:04}", prefix, year, sequence)
}

/// Validate a generated document code against its prefix
pub fn validate_document_code(prefix: &str, code: &str) -> Result<(), &'static str> {
    let parts: Vec<&str> = code.split('-').collect();

    if parts.len() != 3 {
        return Err("Document code must be in format PREFIX-YYYY-NNNN");
    }

    if parts[0] != prefix {
        return Err("Document code has the wrong prefix");
    }

    // Validate year
    if parts[1].len() != 4 || !parts[1].chars().all(|c| c.is_ascii_digit()) {
        return Err("Invalid year in document code");
    }

    // Validate sequence number (at least 4 digits, grows past 9999)
    if parts[2].len() < 4 || !parts[2].chars().all(|c| c.is_ascii_digit()) {
        return Err("Invalid sequence number in document code");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("buyer@factory.vn").is_ok());
        assert!(validate_email("buyer@factory").is_err());
        assert!(validate_email("@factory.vn").is_err());
        assert!(validate_email("buyer @factory.vn").is_err());
    }

    #[test]
    fn test_validate_tax_code() {
        assert!(validate_tax_code("0101234567").is_ok());
        assert!(validate_tax_code("0101234567-001").is_ok());
        assert!(validate_tax_code("010123456").is_err());
        assert!(validate_tax_code("0101234567-01").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+84 912 345 678").is_ok());
        assert!(validate_phone("0912-345-678").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("09123abc78").is_err());
    }

    #[test]
    fn test_document_code_format() {
        let code = format_document_code(document_prefix::PURCHASING_ORDER, 2026, 7);
        assert_eq!(code, "PO-2026-0007");
        assert!(validate_document_code("PO", &code).is_ok());
        assert!(validate_document_code("PP", &code).is_err());
        assert!(validate_document_code("PO", "PO-2026-12345").is_ok());
    }

    #[test]
    fn test_validate_catalog_code() {
        assert!(validate_catalog_code("STEEL-01").is_ok());
        assert!(validate_catalog_code("steel").is_err());
        assert!(validate_catalog_code("S").is_err());
    }
}
