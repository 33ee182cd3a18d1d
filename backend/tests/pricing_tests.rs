//! Order pricing tests
//!
//! Tests for purchasing order totals:
//! - Line totals and money rounding
//! - VAT on the sub total
//! - Total = sub total + VAT

use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    checked_quantity, line_total, order_totals, round_money, validate_vat_rate, LedgerError,
    OrderTotals, MAX_AMOUNT, MAX_QUANTITY, MONEY_SCALE,
};
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn totals_of<I>(lines: I, vat_rate: Decimal) -> OrderTotals
where
    I: IntoIterator<Item = (Decimal, Decimal)>,
{
    order_totals(lines, vat_rate).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_line_total() {
        // 40 packages x 25 kg at 12.50 per kg
        assert_eq!(line_total(dec("1000"), dec("12.50")), Ok(dec("12500.00")));
        assert_eq!(line_total(dec("0.333"), dec("3")), Ok(dec("1.00")));
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(round_money(dec("2.345")), dec("2.35"));
        assert_eq!(round_money(dec("2.344")), dec("2.34"));
        assert_eq!(round_money(dec("-2.345")), dec("-2.35"));
    }

    #[test]
    fn test_order_with_vat() {
        let totals = totals_of(
            [
                (dec("1000"), dec("12.50")),
                (dec("250"), dec("3.20")),
            ],
            dec("0.08"),
        );
        assert_eq!(totals.sub_total, dec("13300.00"));
        assert_eq!(totals.vat_amount, dec("1064.00"));
        assert_eq!(totals.total_amount, dec("14364.00"));
        assert_eq!(totals.vat_rate, dec("0.08"));
    }

    #[test]
    fn test_zero_vat() {
        let totals = totals_of([(dec("10"), dec("1.99"))], Decimal::ZERO);
        assert_eq!(totals.vat_amount, Decimal::ZERO);
        assert_eq!(totals.total_amount, dec("19.90"));
    }

    #[test]
    fn test_quantities_past_the_column_bound_are_rejected() {
        assert_eq!(checked_quantity(dec("40"), dec("25")), Ok(dec("1000")));
        assert_eq!(
            checked_quantity(Decimal::MAX / dec("2"), dec("10")),
            Err(LedgerError::Overflow { field: "quantity" })
        );
        assert_eq!(checked_quantity(MAX_QUANTITY, Decimal::ONE), Ok(MAX_QUANTITY));
        assert!(checked_quantity(MAX_QUANTITY, dec("2")).is_err());
    }

    #[test]
    fn test_amounts_past_the_column_bound_are_rejected() {
        assert_eq!(
            line_total(Decimal::MAX, dec("1.5")),
            Err(LedgerError::Overflow { field: "total price" })
        );
        assert!(line_total(MAX_AMOUNT, Decimal::ONE).is_ok());
        assert!(order_totals([(MAX_AMOUNT, Decimal::ONE)], dec("0.1")).is_err());
    }

    #[test]
    fn test_vat_rate_bounds() {
        assert!(validate_vat_rate(dec("0")).is_ok());
        assert!(validate_vat_rate(dec("0.1")).is_ok());
        assert!(validate_vat_rate(dec("1")).is_ok());
        assert!(validate_vat_rate(dec("-0.01")).is_err());
        assert!(validate_vat_rate(dec("8")).is_err());
    }

    #[test]
    fn test_totals_serialize_as_strings() {
        let totals = totals_of([(dec("2"), dec("5"))], dec("0.1"));
        let json = serde_json::to_value(totals).unwrap();
        assert!(json["subTotal"].is_string());
        assert_eq!(
            json["totalAmount"].as_str().map(|s| dec(s)),
            Some(dec("11"))
        );
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn money() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn quantity() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000).prop_map(|thousandths| Decimal::new(thousandths, 3))
}

fn vat_rate() -> impl Strategy<Value = Decimal> {
    (0i64..=100).prop_map(|pct| Decimal::new(pct, 2))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Total is always sub total plus VAT
    #[test]
    fn prop_total_is_sub_total_plus_vat(
        lines in prop::collection::vec((quantity(), money()), 0..10),
        rate in vat_rate(),
    ) {
        let totals = totals_of(lines, rate);
        prop_assert_eq!(totals.total_amount, totals.sub_total + totals.vat_amount);
    }

    /// Sub total is the sum of rounded line totals
    #[test]
    fn prop_sub_total_sums_lines(
        lines in prop::collection::vec((quantity(), money()), 0..10),
        rate in vat_rate(),
    ) {
        let expected: Decimal = lines.iter().map(|(q, p)| line_total(*q, *p).unwrap()).sum();
        let totals = totals_of(lines, rate);
        prop_assert_eq!(totals.sub_total, expected);
    }

    /// Every amount is kept to cents
    #[test]
    fn prop_amounts_are_cents(
        lines in prop::collection::vec((quantity(), money()), 1..10),
        rate in vat_rate(),
    ) {
        let totals = totals_of(lines, rate);
        prop_assert!(totals.sub_total.scale() <= MONEY_SCALE);
        prop_assert!(totals.vat_amount.scale() <= MONEY_SCALE);
        prop_assert!(totals.total_amount.scale() <= MONEY_SCALE);
    }

    /// Non-negative lines never produce a negative total, and VAT never
    /// exceeds the sub total
    #[test]
    fn prop_totals_non_negative(
        lines in prop::collection::vec((quantity(), money()), 0..10),
        rate in vat_rate(),
    ) {
        let totals = totals_of(lines, rate);
        prop_assert!(totals.sub_total >= Decimal::ZERO);
        prop_assert!(totals.vat_amount <= totals.sub_total);
        prop_assert!(totals.total_amount >= totals.sub_total);
    }

    /// Rounding moves an amount by at most half a cent
    #[test]
    fn prop_rounding_error_bounded(raw in -10_000_000i64..10_000_000) {
        let amount = Decimal::new(raw, 4);
        let rounded = round_money(amount);
        prop_assert!((rounded - amount).abs() <= dec("0.005"));
    }
}
