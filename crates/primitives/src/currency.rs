//! Non-negative arbitrary-precision coin amounts.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Div, Mul, Sub};

use alloy_primitives::{U256, uint};
use serde::{Deserialize, Serialize};

/// A coin amount.
///
/// Currency is unsigned: subtraction saturates at zero rather than wrapping,
/// since a negative balance is never meaningful for prices or collateral.
/// Host prices are quoted in base units per byte per block, so realistic
/// values stay far below the 256-bit range.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Currency(U256);

impl Currency {
    /// Zero coins.
    pub const ZERO: Self = Self(U256::ZERO);

    /// One whole coin in base units (10^24).
    pub const COIN: Self = Self(uint!(1_000_000_000_000_000_000_000_000_U256));

    /// Create a currency value from base units.
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// Create a currency value from a u64 of base units.
    pub fn from_base(value: u64) -> Self {
        Self(U256::from(value))
    }

    /// Create a currency value from a whole number of coins.
    pub fn from_coins(coins: u64) -> Self {
        Self(Self::COIN.0 * U256::from(coins))
    }

    /// The raw base-unit value.
    pub const fn as_u256(&self) -> U256 {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition.
    pub fn checked_add(&self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction, `None` if `rhs > self`.
    pub fn checked_sub(&self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(&self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Multiply by a dimensionless integer factor.
    pub fn saturating_mul(&self, rhs: u64) -> Self {
        Self(self.0.saturating_mul(U256::from(rhs)))
    }

    /// Integer division by another currency amount, truncating.
    ///
    /// Used to normalize raw prices before they are downcast to floats.
    /// Division by zero maps to zero.
    pub fn div_currency(&self, rhs: Self) -> Self {
        if rhs.is_zero() {
            return Self::ZERO;
        }
        Self(self.0 / rhs.0)
    }

    /// Downcast to u64, saturating at `u64::MAX` when the value does not fit.
    ///
    /// Callers normalize with [`Currency::div_currency`] first; saturation is
    /// only reachable for absurdly priced hosts, which the weight function
    /// treats as maximally expensive.
    pub fn to_u64_saturating(&self) -> u64 {
        if self.0 > U256::from(u64::MAX) {
            u64::MAX
        } else {
            self.0.to::<u64>()
        }
    }
}

impl Add for Currency {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Currency {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Currency {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl Mul<u64> for Currency {
    type Output = Self;

    fn mul(self, rhs: u64) -> Self {
        Self(self.0 * U256::from(rhs))
    }
}

impl Div<u64> for Currency {
    type Output = Self;

    /// Integer division, truncating. Division by zero maps to zero rather
    /// than panicking; the weight function guards its denominators anyway.
    fn div(self, rhs: u64) -> Self {
        if rhs == 0 {
            return Self::ZERO;
        }
        Self(self.0 / U256::from(rhs))
    }
}

impl Sum for Currency {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, c| acc + c)
    }
}

impl From<u64> for Currency {
    fn from(value: u64) -> Self {
        Self::from_base(value)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
