//! Exact money types.
//!
//! Balances and amounts use `rust_decimal::Decimal` so repeated credits and
//! debits never accumulate binary floating-point error.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Maximum number of fractional digits a stored amount may carry.
///
/// Matches the `NUMERIC(20, 4)` columns; anything finer would be rounded by
/// the database.
pub const MONEY_SCALE: u32 = 4;

/// Largest value a `NUMERIC(20, 4)` column holds: `9999999999999999.9999`.
///
/// Bounds both single amounts and resulting balances.
pub const MAX_MONEY: Decimal = Decimal::from_parts(0x630F_FFFF, 0x6BC7_5E2D, 0x5, false, MONEY_SCALE);

/// An account balance.
///
/// Always held in normalised form (`500.0000` and `500` are the same value
/// and render identically).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value.normalize())
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Whether this balance can absorb a debit of `amount`.
    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.as_decimal()
    }

    /// Balance after crediting `amount`.
    ///
    /// Fails with [`DomainError::LimitExceeded`] when the result would not fit
    /// in a stored balance.
    pub fn checked_credit(self, amount: Amount) -> DomainResult<Money> {
        match self.0.checked_add(amount.as_decimal()) {
            Some(sum) if sum <= MAX_MONEY => Ok(Money::new(sum)),
            _ => Err(DomainError::limit_exceeded(self.0, amount.as_decimal())),
        }
    }

    /// Balance after debiting `amount`.
    ///
    /// Fails with [`DomainError::InsufficientFunds`] when the balance is
    /// smaller than the amount; a debit never produces a negative balance.
    pub fn checked_debit(self, amount: Amount) -> DomainResult<Money> {
        if !self.covers(amount) {
            return Err(DomainError::insufficient_funds(self.0, amount.as_decimal()));
        }
        self.0
            .checked_sub(amount.as_decimal())
            .map(Money::new)
            .ok_or_else(|| DomainError::invariant("balance underflow"))
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ValueObject for Money {}

/// A strictly positive credit/debit amount, at most [`MAX_MONEY`].
///
/// The sign of a ledger movement is carried by its entry kind, never by the
/// amount, so a constructed `Amount` is always `> 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        let value = value.normalize();
        if value <= Decimal::ZERO {
            return Err(DomainError::validation("amount must be greater than zero"));
        }
        if value.scale() > MONEY_SCALE {
            return Err(DomainError::validation(format!(
                "amount must have at most {MONEY_SCALE} decimal places"
            )));
        }
        if value > MAX_MONEY {
            return Err(DomainError::validation(format!("amount must not exceed {MAX_MONEY}")));
        }
        Ok(Self(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ValueObject for Amount {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[test]
    fn amount_must_be_positive() {
        assert!(Amount::new(dec!(0)).is_err());
        assert!(Amount::new(dec!(-1)).is_err());
        assert!(Amount::new(dec!(0.0001)).is_ok());
    }

    #[test]
    fn amount_rejects_sub_scale_precision() {
        let err = Amount::new(dec!(1.00001)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        // Trailing zeros do not count against the scale.
        assert_eq!(amount(dec!(1.50000000)).as_decimal(), dec!(1.5));
    }

    #[test]
    fn max_money_is_the_column_bound() {
        assert_eq!(MAX_MONEY, dec!(9999999999999999.9999));
    }

    #[test]
    fn amount_is_bounded_by_the_column() {
        assert_eq!(amount(MAX_MONEY).as_decimal(), MAX_MONEY);
        assert!(matches!(
            Amount::new(dec!(100000000000000000000)).unwrap_err(),
            DomainError::Validation(_)
        ));
        assert!(Amount::new(dec!(10000000000000000)).is_err());
        assert!(Amount::new(Decimal::MAX).is_err());
    }

    #[test]
    fn credit_past_the_limit_is_rejected() {
        let balance = Money::new(MAX_MONEY - dec!(1));
        assert_eq!(balance.checked_credit(amount(dec!(1))).unwrap(), Money::new(MAX_MONEY));

        let err = balance.checked_credit(amount(dec!(1.0001))).unwrap_err();
        assert_eq!(err, DomainError::limit_exceeded(MAX_MONEY - dec!(1), dec!(1.0001)));

        let err = Money::new(MAX_MONEY).checked_credit(amount(MAX_MONEY)).unwrap_err();
        assert!(matches!(err, DomainError::LimitExceeded { .. }));
    }

    #[test]
    fn repeated_cents_do_not_drift() {
        let mut balance = Money::ZERO;
        for _ in 0..1000 {
            balance = balance.checked_credit(amount(dec!(0.1))).unwrap();
        }
        assert_eq!(balance, Money::new(dec!(100)));
    }

    #[test]
    fn debit_guard_rejects_overdraw() {
        let balance = Money::new(dec!(300));
        let err = balance.checked_debit(amount(dec!(1000))).unwrap_err();
        assert_eq!(err, DomainError::insufficient_funds(dec!(300), dec!(1000)));
        assert_eq!(balance.checked_debit(amount(dec!(300))).unwrap(), Money::ZERO);
    }

    #[test]
    fn normalised_balances_compare_and_render_equal() {
        let stored = Money::new(dec!(500.0000));
        assert_eq!(stored, Money::new(dec!(500)));
        assert_eq!(stored.to_string(), "500");
    }

    #[test]
    fn serde_rejects_non_positive_amounts() {
        assert!(serde_json::from_str::<Amount>("\"12.5\"").is_ok());
        assert!(serde_json::from_str::<Amount>("\"-4\"").is_err());
        assert_eq!(serde_json::to_string(&Money::new(dec!(10.50))).unwrap(), "\"10.5\"");
    }
}
