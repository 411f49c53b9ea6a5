use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const CURRENCY_CODE: &str = "NGN";

//--------------------------------------        Kobo         ---------------------------------------------------------
/// An amount of money in integer minor units. All settlement arithmetic happens in this type; there is no floating
/// point anywhere on the money path.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Kobo(i64);

op!(binary Kobo, Add, add);
op!(binary Kobo, Sub, sub);
op!(inplace Kobo, AddAssign, add_assign);
op!(inplace Kobo, SubAssign, sub_assign);
op!(unary Kobo, Neg, neg);

impl Mul<i64> for Kobo {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Kobo {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Value cannot be represented in kobo: {0}")]
pub struct KoboConversionError(String);

impl From<i64> for Kobo {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Kobo {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Kobo {}

impl TryFrom<u64> for Kobo {
    type Error = KoboConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(KoboConversionError(format!("Value {value} is too large to convert to Kobo")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Kobo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}₦{}.{:02}", abs / 100, abs % 100)
    }
}

/// Parses a decimal major-unit amount, as payment gateways report it (e.g. `"1250.5"`), into kobo.
impl FromStr for Kobo {
    type Err = KoboConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        let valid = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !valid(whole) || !valid(frac) || frac.len() > 2 {
            return Err(KoboConversionError(format!("'{s}' is not a valid amount")));
        }
        let whole = whole.parse::<i64>().map_err(|e| KoboConversionError(format!("{s}: {e}")))?;
        let frac = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|e| KoboConversionError(format!("{s}: {e}")))? * 10,
            _ => frac.parse::<i64>().map_err(|e| KoboConversionError(format!("{s}: {e}")))?,
        };
        let value = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(|| KoboConversionError(format!("{s} overflows")))?;
        Ok(Self(if negative { -value } else { value }))
    }
}

impl Kobo {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_naira(naira: i64) -> Self {
        Self(naira * 100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(self, rhs: i64) -> Option<Self> {
        self.0.checked_mul(rhs).map(Self)
    }

    /// Returns `bps` basis points of this amount, rounded down.
    pub fn basis_points(self, bps: i64) -> Self {
        Self((i128::from(self.0) * i128::from(bps) / 10_000) as i64)
    }

    /// Formats the amount in major units with exactly two decimals, without a currency symbol.
    pub fn to_major_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}
