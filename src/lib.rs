//! Hour-by-hour electricity tariff resolution.
//!
//! A [`UsageSchedule`] says how much energy is drawn in an hour, a
//! [`RuleCalendar`] says what each billing category charges in that hour, and
//! [`UsageCostAnalyzer`] walks a period and adds it all up.

pub mod analyzer;
pub mod day_ahead;
pub mod error;
pub mod money;
pub mod pricing;
pub mod scope;
pub mod time_window;
pub mod usage_schedule;

pub use analyzer::{AnalysisRecord, Peak, Summary, UsageCostAnalyzer};
pub use day_ahead::{DayAheadPrices, SpotCostBreakdown, SpotCostCalculator};
pub use error::{ConfigurationError, CurrencyMismatchError, Error, MissingPriceError, Result};
pub use money::{Currency, Money};
pub use pricing::{Breakdown, FixedChargeLedger, PricingRule, ResolvedPrices, RuleCalendar};
pub use scope::{Restriction, RuleScope, Scoped};
pub use time_window::TimeWindow;
pub use usage_schedule::{UsagePattern, UsageSchedule};
