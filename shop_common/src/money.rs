use std::{
    fmt::Display,
    iter::Sum,
    ops::Add,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Currency used for new orders when nothing else is configured.
pub const DEFAULT_CURRENCY: &str = "INR";

const MINOR_UNITS_PER_MAJOR: i64 = 100;

//--------------------------------------        Money        ---------------------------------------------------------
/// A monetary amount in minor currency units (paise, cents).
///
/// Amounts are stored, compared and sent to payment providers as integers. The [`Display`] impl renders the
/// conventional two-decimal form, so `Money::from(2500)` prints as `25.00`.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

/// Saturates at the bounds of `i64`. Use [`Money::checked_sum`] where an overflow must be reported.
impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Money::saturating_add)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot parse '{0}' as a monetary amount")]
pub struct MoneyParseError(String);

impl FromStr for Money {
    type Err = MoneyParseError;

    /// Accepts `"10"`, `"10.5"` and `"10.50"` (and their negatives). More than two decimals is an error, since the
    /// amount would not be representable in minor units.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MoneyParseError(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (major, minor) = digits.split_once('.').unwrap_or((digits, ""));
        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        if minor.len() > 2 || !minor.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let major = major.parse::<i64>().map_err(|_| err())?;
        let minor = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().map_err(|_| err())? * 10,
            _ => minor.parse::<i64>().map_err(|_| err())?,
        };
        let value = major
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .and_then(|v| v.checked_add(minor))
            .ok_or_else(err)?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_major = MINOR_UNITS_PER_MAJOR.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / per_major, abs % per_major)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Amount expressed in whole major units, e.g. rupees or dollars.
    pub fn from_major(major: i64) -> Self {
        Self(major * MINOR_UNITS_PER_MAJOR)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    /// The price of `quantity` units at this unit price, or `None` if it does not fit in minor units.
    pub fn checked_mul(self, quantity: i64) -> Option<Self> {
        self.0.checked_mul(quantity).map(Self)
    }

    pub fn saturating_mul(self, quantity: i64) -> Self {
        Self(self.0.saturating_mul(quantity))
    }

    pub fn checked_sum<I: IntoIterator<Item = Self>>(iter: I) -> Option<Self> {
        iter.into_iter().try_fold(Self::default(), Money::checked_add)
    }
}
