//! Rupee amounts using decimal arithmetic.
//!
//! The store prices everything in INR. Gateways want integer minor units
//! (paise), Postgres stores `NUMERIC(12,2)`, and customers read `₹1,499.00`,
//! so [`Money`] owns all three conversions.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when building a [`Money`] value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
    /// Amount cannot be represented in minor units.
    #[error("amount is out of range")]
    OutOfRange,
    /// Input string is not a decimal number.
    #[error("invalid amount: {0}")]
    Invalid(String),
}

/// A non-negative amount in Indian rupees, always rounded to paise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero rupees.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create from a decimal amount, rounding half-up to two places.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for amounts below zero.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        Ok(Self(round2(amount)))
    }

    /// Create from paise.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for negative input.
    pub fn from_minor(paise: i64) -> Result<Self, MoneyError> {
        Self::new(Decimal::new(paise, 2))
    }

    /// Create from whole rupees.
    #[must_use]
    pub fn from_rupees(rupees: u32) -> Self {
        Self(Decimal::from(rupees))
    }

    /// Amount in paise, as gateways expect it.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::OutOfRange`] if the amount does not fit in `i64`.
    pub fn to_minor(self) -> Result<i64, MoneyError> {
        (self.0 * Decimal::ONE_HUNDRED)
            .to_i64()
            .ok_or(MoneyError::OutOfRange)
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// `percent`% of this amount, rounded to paise.
    #[must_use]
    pub fn percent_of(self, percent: Decimal) -> Self {
        let value = self.0 * percent / Decimal::ONE_HUNDRED;
        if value.is_sign_negative() {
            Self::ZERO
        } else {
            Self(round2(value))
        }
    }

    /// Subtract, clamping at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        if other.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - other.0)
        }
    }

    /// Whether this amount is zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Convert to another currency given how many rupees one unit costs.
    ///
    /// Returns the converted amount formatted with two decimals, which is the
    /// shape PayPal expects in `amount.value`.
    #[must_use]
    pub fn convert(self, inr_per_unit: Decimal) -> String {
        if inr_per_unit.is_zero() {
            return "0.00".to_owned();
        }
        format!("{:.2}", round2(self.0 / inr_per_unit))
    }
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = format!("{:.2}", self.0);
        let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));
        write!(f, "₹{}.{fraction}", group_indian(whole))
    }
}

/// Group digits the Indian way: last three, then pairs (`12,34,567`).
fn group_indian(whole: &str) -> String {
    if whole.len() <= 3 {
        return whole.to_owned();
    }
    let (head, tail) = whole.split_at(whole.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (left, right) = rest.split_at(rest.len() - 2);
        groups.push(right);
        rest = left;
    }
    if !rest.is_empty() {
        groups.push(rest);
    }
    groups.reverse();
    format!("{},{tail}", groups.join(","))
}

impl std::str::FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| MoneyError::Invalid(s.to_owned()))?;
        Self::new(amount)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_minor_units_roundtrip() {
        let price = Money::from_minor(149_950).unwrap();
        assert_eq!(price.amount(), dec!(1499.50));
        assert_eq!(price.to_minor().unwrap(), 149_950);
    }

    #[test]
    fn test_rejects_negative() {
        assert_eq!(Money::new(dec!(-1)), Err(MoneyError::Negative));
    }

    #[test]
    fn test_rounds_half_up_to_paise() {
        assert_eq!(Money::new(dec!(10.005)).unwrap().amount(), dec!(10.01));
        assert_eq!(Money::new(dec!(10.004)).unwrap().amount(), dec!(10.00));
    }

    #[test]
    fn test_percent_of() {
        let price = Money::new(dec!(2499)).unwrap();
        assert_eq!(price.percent_of(dec!(15)).amount(), dec!(374.85));
        assert_eq!(price.percent_of(dec!(-5)), Money::ZERO);
    }

    #[test]
    fn test_saturating_sub_clamps() {
        let a = Money::from_rupees(100);
        let b = Money::from_rupees(250);
        assert_eq!(a.saturating_sub(b), Money::ZERO);
        assert_eq!(b.saturating_sub(a), Money::from_rupees(150));
    }

    #[test]
    fn test_display_uses_indian_grouping() {
        assert_eq!(Money::from_rupees(999).to_string(), "₹999.00");
        assert_eq!(Money::from_rupees(1499).to_string(), "₹1,499.00");
        assert_eq!(Money::new(dec!(1234567.5)).unwrap().to_string(), "₹12,34,567.50");
    }

    #[test]
    fn test_multiply_and_sum() {
        let lines = [Money::from_rupees(500) * 3, Money::from_rupees(250) * 2];
        assert_eq!(lines.into_iter().sum::<Money>(), Money::from_rupees(2000));
    }

    #[test]
    fn test_convert_for_foreign_gateway() {
        let total = Money::from_rupees(8300);
        assert_eq!(total.convert(dec!(83)), "100.00");
        assert_eq!(total.convert(Decimal::ZERO), "0.00");
    }

    #[test]
    fn test_parse_from_str() {
        assert_eq!("79.5".parse::<Money>().unwrap().amount(), dec!(79.50));
        assert!("abc".parse::<Money>().is_err());
    }
}
