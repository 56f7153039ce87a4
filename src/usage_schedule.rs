use bigdecimal::{BigDecimal, Zero};
use jiff::civil::{DateTime, Weekday};

use crate::error::ConfigurationError;
use crate::scope::{RuleScope, RuleScopeBuilder, Scoped};
use crate::time_window::TimeWindow;

/// A quantity of energy drawn in every hour the scope covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePattern {
    pub name: String,
    pub kwh: BigDecimal,
    pub scope: RuleScope,
}

impl UsagePattern {
    pub fn new(name: impl Into<String>, kwh: BigDecimal, scope: RuleScope) -> Self {
        Self {
            name: name.into(),
            kwh,
            scope,
        }
    }

    pub fn builder(
        name: impl Into<String>,
        kwh: BigDecimal,
        start_date: DateTime,
        end_date: DateTime,
    ) -> UsagePatternBuilder {
        UsagePatternBuilder {
            name: name.into(),
            kwh,
            scope: RuleScope::builder(start_date, end_date),
        }
    }
}

impl Scoped for UsagePattern {
    fn scope(&self) -> &RuleScope {
        &self.scope
    }
}

#[derive(Debug, Clone)]
pub struct UsagePatternBuilder {
    name: String,
    kwh: BigDecimal,
    scope: RuleScopeBuilder,
}

impl UsagePatternBuilder {
    pub fn time_window(mut self, window: TimeWindow) -> Self {
        self.scope = self.scope.time_window(window);
        self
    }

    pub fn days_of_week(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.scope = self.scope.days_of_week(days);
        self
    }

    pub fn months(mut self, months: impl IntoIterator<Item = i8>) -> Self {
        self.scope = self.scope.months(months);
        self
    }

    pub fn build(self) -> Result<UsagePattern, ConfigurationError> {
        let scope = self.scope.build(&self.name)?;
        Ok(UsagePattern::new(self.name, self.kwh, scope))
    }
}

/// The consumer's hourly draw, as a sum of overlapping patterns.
///
/// Every matching pattern contributes, so a base load plus an evening heating
/// pattern add up. Insertion order does not affect the result.
#[derive(Debug, Clone, Default)]
pub struct UsageSchedule {
    patterns: Vec<UsagePattern>,
}

impl UsageSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_usage_pattern(&mut self, pattern: UsagePattern) {
        self.patterns.push(pattern);
    }

    pub fn patterns(&self) -> &[UsagePattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matching(&self, timestamp: DateTime) -> impl Iterator<Item = &UsagePattern> {
        self.patterns
            .iter()
            .filter(move |pattern| pattern.is_active(timestamp))
    }

    /// Total kWh drawn in the hour starting at `timestamp`; zero when nothing matches.
    pub fn resolve(&self, timestamp: DateTime) -> BigDecimal {
        self.matching(timestamp)
            .fold(BigDecimal::zero(), |total, pattern| total + &pattern.kwh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::{date, datetime, time};
    use std::str::FromStr;

    fn kwh(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn base_schedule() -> UsageSchedule {
        let mut schedule = UsageSchedule::new();
        schedule.add_usage_pattern(UsagePattern::new(
            "Base Usage",
            kwh("1"),
            RuleScope::between(
                datetime(2023, 1, 1, 0, 0, 0, 0),
                datetime(2023, 12, 31, 0, 0, 0, 0),
            ),
        ));
        schedule
    }

    #[test]
    fn single_pattern() {
        let schedule = base_schedule();
        let in_range = date(2023, 3, 14).at(15, 0, 0, 0);
        let next_year = date(2024, 3, 14).at(15, 0, 0, 0);
        assert_eq!(schedule.resolve(in_range), kwh("1"));
        assert_eq!(schedule.resolve(next_year), BigDecimal::zero());
    }

    #[test]
    fn overlapping_patterns_add_up() {
        let mut schedule = base_schedule();
        schedule.add_usage_pattern(
            UsagePattern::builder(
                "Evening Heating",
                kwh("2.5"),
                datetime(2023, 1, 1, 0, 0, 0, 0),
                datetime(2023, 12, 31, 0, 0, 0, 0),
            )
            .time_window(TimeWindow::new(time(18, 0, 0, 0), time(23, 0, 0, 0)))
            .months([11, 12, 1, 2, 3])
            .build()
            .unwrap(),
        );
        schedule.add_usage_pattern(
            UsagePattern::builder(
                "Weekend Sauna",
                kwh("0.35"),
                datetime(2023, 1, 1, 0, 0, 0, 0),
                datetime(2023, 12, 31, 0, 0, 0, 0),
            )
            .days_of_week([Weekday::Saturday])
            .time_window(TimeWindow::new(time(20, 0, 0, 0), time(1, 0, 0, 0)))
            .build()
            .unwrap(),
        );

        let saturday = date(2023, 1, 7);
        // Saturday evening in January: all three.
        assert_eq!(schedule.resolve(saturday.at(20, 0, 0, 0)), kwh("3.85"));
        // Saturday late night: base and sauna, heating window closed.
        assert_eq!(schedule.resolve(saturday.at(23, 0, 0, 0)), kwh("1.35"));
        // Monday morning: base only.
        assert_eq!(schedule.resolve(date(2023, 1, 9).at(8, 0, 0, 0)), kwh("1"));
        assert_eq!(schedule.matching(saturday.at(20, 0, 0, 0)).count(), 3);
    }

    #[test]
    fn empty_schedule_draws_nothing() {
        let schedule = UsageSchedule::new();
        assert!(schedule.is_empty());
        assert!(schedule.resolve(date(2023, 1, 1).at(0, 0, 0, 0)).is_zero());
    }

    #[test]
    fn builder_validates_scope() {
        let err = UsagePattern::builder(
            "Nobody Home",
            kwh("0.2"),
            datetime(2023, 1, 1, 0, 0, 0, 0),
            datetime(2023, 12, 31, 0, 0, 0, 0),
        )
        .days_of_week([])
        .build()
        .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::EmptyDaysOfWeek {
                rule: "Nobody Home".to_string()
            }
        );
    }
}
