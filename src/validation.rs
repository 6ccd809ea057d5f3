use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use validator::ValidationError;

/// Order numbers are "GJ" followed by exactly five digits, e.g. GJ00042.
pub static ORDER_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^GJ\d{5}$").expect("order number pattern is valid"));

/// Upper bound on a single order total, in major currency units.
pub const MAX_ORDER_AMOUNT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Tolerance when comparing a client-supplied amount against the stored order
/// total. Absorbs rounding differences of at most one cent.
pub const AMOUNT_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub fn validate_order_number(value: &str) -> Result<(), ValidationError> {
    if ORDER_NUMBER_RE.is_match(value) {
        Ok(())
    } else {
        let mut err = ValidationError::new("order_number");
        err.message = Some("must match GJ followed by five digits".into());
        Err(err)
    }
}

/// Monetary amounts must be positive, bounded, and carry at most two decimal
/// places.
pub fn validate_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("amount");
        err.message = Some("must be positive".into());
        return Err(err);
    }
    if *value > MAX_ORDER_AMOUNT {
        let mut err = ValidationError::new("amount");
        err.message = Some("exceeds maximum order amount".into());
        return Err(err);
    }
    if value.scale() > 2 {
        let mut err = ValidationError::new("amount");
        err.message = Some("at most two decimal places".into());
        return Err(err);
    }
    Ok(())
}

/// Compares a client-supplied amount with the stored total, tolerating a
/// one-cent difference in either direction.
pub fn amounts_match(supplied: Decimal, stored: Decimal) -> bool {
    (supplied - stored).abs() <= AMOUNT_EPSILON
}
