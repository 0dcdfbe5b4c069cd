use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Supported display currencies. Every product carries a price in both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Cuban peso.
    #[default]
    #[serde(rename = "CUP")]
    Cup,
    /// Freely convertible currency (moneda libremente convertible).
    #[serde(rename = "MLC")]
    Mlc,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Currency {
    pub fn all() -> &'static [Currency] {
        &[Currency::Cup, Currency::Mlc]
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Cup => "CUP",
            Currency::Mlc => "MLC",
        }
    }

    /// The other supported currency.
    pub fn toggled(self) -> Currency {
        match self {
            Currency::Cup => Currency::Mlc,
            Currency::Mlc => Currency::Cup,
        }
    }

    /// Subtotal at or above which delivery is free.
    pub fn free_delivery_threshold(self) -> Money {
        match self {
            Currency::Cup => Money::from_major(5_000),
            Currency::Mlc => Money::from_major(17),
        }
    }

    pub fn parse(code: &str) -> Option<Currency> {
        match code.trim().to_ascii_uppercase().as_str() {
            "CUP" => Some(Currency::Cup),
            "MLC" => Some(Currency::Mlc),
            _ => None,
        }
    }
}

/// A non-negative amount in minor units (centavos) of some currency.
///
/// Integer arithmetic keeps `total == subtotal + fee` exact. The currency is
/// carried alongside by whoever owns the amount.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: u64) -> Self {
        Money(minor)
    }

    pub const fn from_major(major: u64) -> Self {
        Money(major * 100)
    }

    pub fn minor(self) -> u64 {
        self.0
    }

    /// Convert a decimal amount as stored remotely. Negative, NaN and
    /// infinite inputs clamp to zero.
    pub fn from_decimal(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Money::ZERO;
        }
        Money((value * 100.0).round() as u64)
    }

    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn times(self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(quantity as u64))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Format an amount for display in the given currency.
pub fn format_amount(amount: Money, currency: Currency) -> String {
    format!("${amount} {currency}")
}
