use std::fmt;

use bigdecimal::{BigDecimal, Zero};
use clap::ValueEnum;

use crate::error::CurrencyMismatchError;

#[derive(ValueEnum, Copy, Clone, Default, PartialEq, Eq, Hash, Debug)]
pub enum Currency {
    #[default]
    Eur,
    Usd,
    Gbp,
    Sek,
}

impl Currency {
    pub fn code(self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
            Currency::Sek => "SEK",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An exact amount of money in a single currency.
///
/// Amounts keep full precision; only [`Display`](fmt::Display) rounds, to five
/// decimals, and [`Money::rounded`] to cents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    pub amount: BigDecimal,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: BigDecimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(BigDecimal::zero(), currency)
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, CurrencyMismatchError> {
        self.ensure_same_currency(other)?;
        Ok(Money::new(&self.amount + &other.amount, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, CurrencyMismatchError> {
        self.ensure_same_currency(other)?;
        Ok(Money::new(&self.amount - &other.amount, self.currency))
    }

    /// Multiplies by a plain factor such as a quantity in kWh or a tax multiplier.
    pub fn scale(&self, factor: &BigDecimal) -> Money {
        Money::new(&self.amount * factor, self.currency)
    }

    /// Display form rounded to cents, e.g. `12.35 EUR`.
    pub fn rounded(&self) -> String {
        format!("{:.2} {}", self.amount, self.currency)
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), CurrencyMismatchError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(CurrencyMismatchError {
                left: self.currency,
                right: other.currency,
            })
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5} {}", self.amount, self.currency)
    }
}
