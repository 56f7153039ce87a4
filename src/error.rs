//! Error types for the tariff calendar.
//!
//! Rule resolution itself never fails: a rule that does not match an hour simply
//! contributes nothing. Errors only come from building rules, from the spot-price
//! feed and from combining amounts in different currencies.

use jiff::civil::DateTime;
use thiserror::Error;

use crate::money::Currency;

/// A rule scope that cannot be built as written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// `days_of_week` was given as an empty list. Leave it unset for "every day".
    #[error("rule {rule:?} has an empty days-of-week list; leave it unset to allow every day")]
    EmptyDaysOfWeek { rule: String },

    /// `months` was given as an empty list. Leave it unset for "every month".
    #[error("rule {rule:?} has an empty months list; leave it unset to allow every month")]
    EmptyMonths { rule: String },

    #[error("rule {rule:?} has month {month}, expected 1..=12")]
    InvalidMonth { rule: String, month: i8 },

    #[error("rule {rule:?} ends ({end}) before it starts ({start})")]
    InvertedDateRange {
        rule: String,
        start: DateTime,
        end: DateTime,
    },
}

/// No spot price is known for the requested hour.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no price available for {timestamp}")]
pub struct MissingPriceError {
    pub timestamp: DateTime,
}

/// Two amounts in different currencies were combined.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot combine amounts in {left} and {right}")]
pub struct CurrencyMismatchError {
    pub left: Currency,
    pub right: Currency,
}

/// Crate-wide error.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    MissingPrice(#[from] MissingPriceError),

    #[error(transparent)]
    CurrencyMismatch(#[from] CurrencyMismatchError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A timestamp cell that does not parse as a civil datetime.
    #[error("invalid timestamp {value:?} on line {line}: {source}")]
    InvalidTimestamp {
        value: String,
        line: u64,
        #[source]
        source: jiff::Error,
    },

    #[error("missing column {0:?}")]
    MissingColumn(&'static str),

    /// A price cell that does not parse as a decimal.
    #[error("invalid price {value:?} on line {line}")]
    InvalidPrice { value: String, line: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
