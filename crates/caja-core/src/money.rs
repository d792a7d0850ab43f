//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    19.99 * 3 = 59.97000000000001   ❌ WRONG!                            │
//! │                                                                         │
//! │  Debts paid in installments drift the same way:                         │
//! │    100.00 - 60.00 - 40.00 = 1.4e-14 → "still owes 0.00"                 │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every amount has exactly 2 fraction digits and is stored as i64     │
//! │    cents. Parsing and display are the ONLY decimal conversions.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use caja_core::money::Money;
//!
//! let price: Money = "19.99".parse().unwrap();
//! assert_eq!(price.cents(), 1999);
//!
//! let line = price * 3i64;
//! assert_eq!(line.to_string(), "59.97");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::PointsRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents, 2 fraction digits).
///
/// ## Design Decisions
/// - **i64 (signed)**: deltas (loyalty corrections, reversals) can be negative
/// - **Single field tuple struct**: Zero-cost abstraction over i64
///
/// ## Where Money is Used
/// ```text
/// Product.price_cents ──► SaleItem.unit_price ──► SaleItem.line_total
///                                                       │
///                          Sale.subtotal - Sale.discount = Sale.total
///                                                       │
///               ┌───────────────────────────────────────┼──────────────┐
///               ▼                                       ▼              ▼
///   Customer.total_spent (+=)            Debt.total (fiado)   points (floor)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use caja_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the value, or zero when it is negative.
    ///
    /// ## Example
    /// ```rust
    /// use caja_core::money::Money;
    ///
    /// // A debt of 100.00 paid with 110.00 has nothing remaining.
    /// let remaining = Money::from_cents(10000) - Money::from_cents(11000);
    /// assert_eq!(remaining.floor_zero(), Money::zero());
    /// ```
    #[inline]
    pub const fn floor_zero(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            Money(self.0)
        }
    }

    /// Multiplies money by a quantity, clamping at the i64 bounds.
    ///
    /// For display totals. Where an overflow must be rejected, use
    /// [`Money::checked_mul`].
    ///
    /// ## Example
    /// ```rust
    /// use caja_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Adds two amounts, or `None` if the result does not fit in an i64.
    #[inline]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Multiplies by a quantity, or `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use caja_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(299).checked_mul(3), Some(Money::from_cents(897)));
    /// assert_eq!(Money::from_cents(i64::MAX / 2).checked_mul(3), None);
    /// ```
    #[inline]
    pub const fn checked_mul(self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Sums amounts, or `None` as soon as the running total overflows.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), Money::checked_add)
    }

    /// Adds two amounts, clamping at the i64 bounds.
    #[inline]
    pub const fn saturating_add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }

    /// Loyalty points earned for spending this amount.
    ///
    /// Always truncates: 19.99 at 1 point per unit earns 19 points, never 20.
    /// Negative and zero amounts earn nothing.
    ///
    /// ## Example
    /// ```rust
    /// use caja_core::money::Money;
    /// use caja_core::types::PointsRate;
    ///
    /// let spent = Money::from_cents(1999);
    /// assert_eq!(spent.points_earned(PointsRate::per_unit(1)), 19);
    /// ```
    pub fn points_earned(&self, rate: PointsRate) -> i64 {
        if self.0 <= 0 {
            return 0;
        }
        // cents * bps / (100 cents per unit * 10_000 bps per point)
        i64::try_from(self.0 as i128 * rate.bps() as i128 / 1_000_000).unwrap_or(i64::MAX)
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses a decimal amount with at most two fraction digits.
///
/// Accepted: `"19.99"`, `"19.9"`, `"19"`, `"-5.50"`, `" 0.05 "`.
/// Rejected: `"1.234"`, `"abc"`, `""`, `"1,50"`.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "amount".to_string(),
            });
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (major_str, minor_str) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major_str.is_empty() || !major_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("must be a decimal number such as 19.99"));
        }
        if minor_str.len() > 2 || !minor_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("at most two fraction digits are allowed"));
        }

        let major: i64 = major_str
            .parse()
            .map_err(|_| invalid("amount is too large"))?;
        let minor: i64 = match minor_str.len() {
            0 => 0,
            1 => minor_str.parse::<i64>().map_err(|_| invalid("bad fraction"))? * 10,
            _ => minor_str.parse().map_err(|_| invalid("bad fraction"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering (`"19.99"`, `"-5.50"`).
///
/// ## Note
/// Currency symbols and locale separators belong to the UI layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

/// Saturating; see [`Money::checked_sum`] for the rejecting form.
impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Money::saturating_add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_parse() {
        assert_eq!("19.99".parse::<Money>().unwrap().cents(), 1999);
        assert_eq!("19.9".parse::<Money>().unwrap().cents(), 1990);
        assert_eq!("19".parse::<Money>().unwrap().cents(), 1900);
        assert_eq!("-5.50".parse::<Money>().unwrap().cents(), -550);
        assert_eq!(" 0.05 ".parse::<Money>().unwrap().cents(), 5);

        assert!("1.234".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
        assert!("1,50".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3i64).cents(), 3000);
        assert_eq!((-a).cents(), -1000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_checked_arithmetic() {
        let big = Money::from_cents(i64::MAX);
        assert_eq!(big.checked_add(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(100).checked_add(Money::from_cents(50)),
            Some(Money::from_cents(150))
        );
        assert_eq!(Money::from_cents(i64::MAX / 2).checked_mul(3), None);
        assert_eq!(big.saturating_add(Money::from_cents(1)), big);

        let total = Money::checked_sum([Money::from_cents(1000), Money::from_cents(500)]);
        assert_eq!(total, Some(Money::from_cents(1500)));
        assert_eq!(Money::checked_sum([big, Money::from_cents(1)]), None);
        assert_eq!(Money::checked_sum(Vec::new()), Some(Money::zero()));
    }

    #[test]
    fn test_floor_zero() {
        assert_eq!(Money::from_cents(-1000).floor_zero(), Money::zero());
        assert_eq!(Money::from_cents(4000).floor_zero().cents(), 4000);
    }

    #[test]
    fn test_points_truncate() {
        let rate = PointsRate::per_unit(1);
        assert_eq!(Money::from_cents(1999).points_earned(rate), 19);
        assert_eq!(Money::from_cents(2000).points_earned(rate), 20);
        assert_eq!(Money::from_cents(99).points_earned(rate), 0);
        assert_eq!(Money::from_cents(-500).points_earned(rate), 0);

        // Half a point per unit: 19.99 * 0.5 = 9.995 → 9
        let half = PointsRate::from_bps(5_000);
        assert_eq!(Money::from_cents(1999).points_earned(half), 9);
    }

    /// 100.00 paid as 60.00 + 40.00 leaves exactly zero, unlike floats.
    #[test]
    fn test_installments_are_exact() {
        let total = Money::from_cents(10000);
        let remaining = total - Money::from_cents(6000) - Money::from_cents(4000);
        assert!(remaining.is_zero());
    }
}
