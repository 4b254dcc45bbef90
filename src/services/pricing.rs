use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::ServiceError;

/// Money is stored with two fractional digits.
pub const MONEY_SCALE: u32 = 2;

/// Round to the storage scale, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a major-unit amount (rupees, dollars) into gateway minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::ValidationError(
            "Amount cannot be negative".to_string(),
        ));
    }
    (round_money(amount) * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError("Amount is out of range".to_string()))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MONEY_SCALE)
}

/// `unit_price * quantity`, rounded to the storage scale.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_major_to_minor_units() {
        assert_eq!(to_minor_units(dec!(499.00)).unwrap(), 49_900);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(12.345)).unwrap(), 1_235);
        assert_eq!(to_minor_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(to_minor_units(dec!(-1.00)).is_err());
    }

    #[test]
    fn minor_units_round_trip_through_display_scale() {
        assert_eq!(from_minor_units(49_900), dec!(499.00));
        assert_eq!(from_minor_units(1_235).to_string(), "12.35");
    }

    #[test]
    fn line_total_multiplies_and_rounds() {
        assert_eq!(line_total(dec!(19.99), 3), dec!(59.97));
        assert_eq!(line_total(dec!(0.335), 1), dec!(0.34));
    }
}
