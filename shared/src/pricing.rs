//! Purchasing order pricing

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Money is kept to two decimal places
pub const MONEY_SCALE: u32 = 2;

/// Largest quantity a NUMERIC(18,4) column holds: 99,999,999,999,999.9999
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(0xA763_FFFF, 0x0DE0_B6B3, 0, false, 4);

/// Largest amount a NUMERIC(18,2) column holds: 9,999,999,999,999,999.99
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA763_FFFF, 0x0DE0_B6B3, 0, false, 2);

/// Round a money amount half away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn bounded(
    value: Option<Decimal>,
    max: Decimal,
    field: &'static str,
) -> Result<Decimal, LedgerError> {
    value
        .filter(|v| v.abs() <= max)
        .ok_or(LedgerError::Overflow { field })
}

/// `package x material_per_package`, rejected when it no longer fits a quantity column
pub fn checked_quantity(
    package: Decimal,
    material_per_package: Decimal,
) -> Result<Decimal, LedgerError> {
    bounded(package.checked_mul(material_per_package), MAX_QUANTITY, "quantity")
}

/// Price of one order or stage line
pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, LedgerError> {
    bounded(
        quantity.checked_mul(unit_price).map(round_money),
        MAX_AMOUNT,
        "total price",
    )
}

/// Totals of a purchasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub sub_total: Decimal,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
}

/// Sum `(quantity, unit_price)` lines and apply VAT
pub fn order_totals<I>(lines: I, vat_rate: Decimal) -> Result<OrderTotals, LedgerError>
where
    I: IntoIterator<Item = (Decimal, Decimal)>,
{
    let mut sub_total = Decimal::ZERO;
    for (quantity, unit_price) in lines {
        let line = line_total(quantity, unit_price)?;
        sub_total = bounded(sub_total.checked_add(line), MAX_AMOUNT, "sub total")?;
    }
    let vat_amount = bounded(
        sub_total.checked_mul(vat_rate).map(round_money),
        MAX_AMOUNT,
        "VAT amount",
    )?;
    let total_amount = bounded(sub_total.checked_add(vat_amount), MAX_AMOUNT, "total amount")?;

    Ok(OrderTotals {
        sub_total,
        vat_rate,
        vat_amount,
        total_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn column_bounds() {
        assert_eq!(MAX_QUANTITY, dec("99999999999999.9999"));
        assert_eq!(MAX_AMOUNT, dec("9999999999999999.99"));
    }

    #[test]
    fn quantity_overflow_is_an_error() {
        let huge = Decimal::MAX / dec("2");
        assert_eq!(
            checked_quantity(huge, dec("10")),
            Err(LedgerError::Overflow { field: "quantity" })
        );
        assert!(checked_quantity(MAX_QUANTITY, dec("1.0001")).is_err());
        assert_eq!(checked_quantity(dec("40"), dec("25")), Ok(dec("1000")));
    }

    #[test]
    fn line_total_overflow_is_an_error() {
        assert!(line_total(Decimal::MAX, dec("2")).is_err());
        assert!(line_total(MAX_QUANTITY, MAX_QUANTITY).is_err());
    }

    #[test]
    fn sub_total_overflow_is_an_error() {
        let line = (dec("99999999999999"), dec("99"));
        assert!(order_totals([line], Decimal::ZERO).is_ok());
        assert!(order_totals([line; 2], Decimal::ZERO).is_err());
    }

    #[test]
    fn vat_is_rounded_to_cents() {
        let totals = order_totals([(dec("3"), dec("0.335"))], dec("0.10")).unwrap();
        assert_eq!(totals.sub_total, dec("1.01"));
        assert_eq!(totals.vat_amount, dec("0.10"));
        assert_eq!(totals.total_amount, dec("1.11"));
    }

    #[test]
    fn empty_order_is_zero() {
        let totals = order_totals(Vec::new(), dec("0.08")).unwrap();
        assert_eq!(totals.total_amount, Decimal::ZERO);
    }
}
