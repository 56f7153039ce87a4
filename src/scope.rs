//! When a rule applies.
//!
//! Usage patterns and pricing rules share the same activation predicate: an
//! inclusive date range, optional month and weekday filters and an optional
//! time-of-day window. [`RuleScope`] holds those and answers [`RuleScope::is_active`].

use std::collections::BTreeSet;

use jiff::civil::{DateTime, Weekday};

use crate::error::ConfigurationError;
use crate::time_window::TimeWindow;

/// A filter over a small value domain such as months or weekdays.
///
/// `Only` with an empty set is a valid state that never matches. It is distinct
/// from `Unrestricted`, which matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Restriction<T: Ord> {
    #[default]
    Unrestricted,
    Only(BTreeSet<T>),
}

impl<T: Ord> Restriction<T> {
    pub fn only(values: impl IntoIterator<Item = T>) -> Self {
        Restriction::Only(values.into_iter().collect())
    }

    pub fn allows(&self, value: &T) -> bool {
        match self {
            Restriction::Unrestricted => true,
            Restriction::Only(values) => values.contains(value),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Restriction::Unrestricted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleScope {
    pub start_date: DateTime,
    /// Inclusive.
    pub end_date: DateTime,
    pub time_window: Option<TimeWindow>,
    /// Monday-zero offsets, `0..=6`.
    pub days_of_week: Restriction<i8>,
    /// `1..=12`.
    pub months: Restriction<i8>,
}

impl RuleScope {
    /// A scope with no filters besides the date range.
    pub fn between(start_date: DateTime, end_date: DateTime) -> Self {
        Self {
            start_date,
            end_date,
            time_window: None,
            days_of_week: Restriction::Unrestricted,
            months: Restriction::Unrestricted,
        }
    }

    pub fn builder(start_date: DateTime, end_date: DateTime) -> RuleScopeBuilder {
        RuleScopeBuilder {
            start_date,
            end_date,
            time_window: None,
            days_of_week: None,
            months: None,
        }
    }

    /// Whether the rule applies at `timestamp`. Both ends of the date range are inclusive.
    pub fn is_active(&self, timestamp: DateTime) -> bool {
        if timestamp < self.start_date || timestamp > self.end_date {
            return false;
        }
        if !self.months.allows(&timestamp.month()) {
            return false;
        }
        let weekday = timestamp.weekday().to_monday_zero_offset();
        if !self.days_of_week.allows(&weekday) {
            return false;
        }
        self.time_window
            .is_none_or(|window| window.contains(timestamp.time()))
    }
}

/// Collects optional filters and validates them into a [`RuleScope`].
#[derive(Debug, Clone)]
pub struct RuleScopeBuilder {
    start_date: DateTime,
    end_date: DateTime,
    time_window: Option<TimeWindow>,
    days_of_week: Option<Vec<Weekday>>,
    months: Option<Vec<i8>>,
}

impl RuleScopeBuilder {
    pub fn time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn days_of_week(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.days_of_week = Some(days.into_iter().collect());
        self
    }

    pub fn weekdays(self) -> Self {
        self.days_of_week([
            Weekday::Monday,
            Weekday::Tuesday,
            Weekday::Wednesday,
            Weekday::Thursday,
            Weekday::Friday,
        ])
    }

    pub fn months(mut self, months: impl IntoIterator<Item = i8>) -> Self {
        self.months = Some(months.into_iter().collect());
        self
    }

    /// Fails on empty filter lists, months outside `1..=12` and a start after the end.
    /// A rule that should never match can still be written as `Restriction::Only` of an empty set.
    pub fn build(self, rule: &str) -> Result<RuleScope, ConfigurationError> {
        if self.start_date > self.end_date {
            return Err(ConfigurationError::InvertedDateRange {
                rule: rule.to_string(),
                start: self.start_date,
                end: self.end_date,
            });
        }

        let days_of_week = match self.days_of_week {
            None => Restriction::Unrestricted,
            Some(days) if days.is_empty() => {
                return Err(ConfigurationError::EmptyDaysOfWeek {
                    rule: rule.to_string(),
                });
            }
            Some(days) => Restriction::only(days.into_iter().map(Weekday::to_monday_zero_offset)),
        };

        let months = match self.months {
            None => Restriction::Unrestricted,
            Some(months) if months.is_empty() => {
                return Err(ConfigurationError::EmptyMonths {
                    rule: rule.to_string(),
                });
            }
            Some(months) => {
                if let Some(&month) = months.iter().find(|month| !(1..=12).contains(*month)) {
                    return Err(ConfigurationError::InvalidMonth {
                        rule: rule.to_string(),
                        month,
                    });
                }
                Restriction::only(months)
            }
        };

        Ok(RuleScope {
            start_date: self.start_date,
            end_date: self.end_date,
            time_window: self.time_window,
            days_of_week,
            months,
        })
    }
}

/// Anything that carries a [`RuleScope`].
pub trait Scoped {
    fn scope(&self) -> &RuleScope;

    fn is_active(&self, timestamp: DateTime) -> bool {
        self.scope().is_active(timestamp)
    }
}
