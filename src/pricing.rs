//! Pricing rules grouped by billing category, and their per-hour resolution.
//!
//! Within a category the first matching rule wins, so rules must be added
//! most-specific first: a winter-daytime rate before the catch-all rate of the
//! same category. Categories are independent of each other and their prices add
//! up into the hour's total.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bigdecimal::{BigDecimal, Zero};
use jiff::civil::{DateTime, Weekday};
use tracing::trace;

use crate::error::ConfigurationError;
use crate::scope::{RuleScope, RuleScopeBuilder, Scoped};
use crate::time_window::TimeWindow;

/// VAT multiplier applied when a rule does not set its own.
pub fn default_tax_multiplier() -> BigDecimal {
    BigDecimal::new(124.into(), 2)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingRule {
    pub name: String,
    pub category: String,
    /// Per-kWh price, or the whole monthly amount when `is_fixed_monthly`.
    pub price: BigDecimal,
    pub tax_multiplier: BigDecimal,
    pub is_fixed_monthly: bool,
    pub scope: RuleScope,
}

impl PricingRule {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        price: BigDecimal,
        scope: RuleScope,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            price,
            tax_multiplier: default_tax_multiplier(),
            is_fixed_monthly: false,
            scope,
        }
    }

    pub fn builder(
        name: impl Into<String>,
        category: impl Into<String>,
        price: BigDecimal,
        start_date: DateTime,
        end_date: DateTime,
    ) -> PricingRuleBuilder {
        PricingRuleBuilder {
            name: name.into(),
            category: category.into(),
            price,
            tax_multiplier: default_tax_multiplier(),
            is_fixed_monthly: false,
            scope: RuleScope::builder(start_date, end_date),
        }
    }

    pub fn with_tax_multiplier(mut self, tax_multiplier: BigDecimal) -> Self {
        self.tax_multiplier = tax_multiplier;
        self
    }

    pub fn fixed_monthly(mut self) -> Self {
        self.is_fixed_monthly = true;
        self
    }
}

impl Scoped for PricingRule {
    fn scope(&self) -> &RuleScope {
        &self.scope
    }
}

#[derive(Debug, Clone)]
pub struct PricingRuleBuilder {
    name: String,
    category: String,
    price: BigDecimal,
    tax_multiplier: BigDecimal,
    is_fixed_monthly: bool,
    scope: RuleScopeBuilder,
}

impl PricingRuleBuilder {
    pub fn tax_multiplier(mut self, tax_multiplier: BigDecimal) -> Self {
        self.tax_multiplier = tax_multiplier;
        self
    }

    pub fn fixed_monthly(mut self) -> Self {
        self.is_fixed_monthly = true;
        self
    }

    pub fn time_window(mut self, window: TimeWindow) -> Self {
        self.scope = self.scope.time_window(window);
        self
    }

    pub fn days_of_week(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.scope = self.scope.days_of_week(days);
        self
    }

    pub fn weekdays(mut self) -> Self {
        self.scope = self.scope.weekdays();
        self
    }

    pub fn months(mut self, months: impl IntoIterator<Item = i8>) -> Self {
        self.scope = self.scope.months(months);
        self
    }

    pub fn build(self) -> Result<PricingRule, ConfigurationError> {
        let scope = self.scope.build(&self.name)?;
        Ok(PricingRule {
            name: self.name,
            category: self.category,
            price: self.price,
            tax_multiplier: self.tax_multiplier,
            is_fixed_monthly: self.is_fixed_monthly,
            scope,
        })
    }
}

/// Remembers which calendar month each fixed-monthly category was last billed in.
///
/// Use one ledger per analysis run and feed it hours in increasing order; the
/// monthly charge lands on the first hour of each month that is resolved.
#[derive(Debug, Clone, Default)]
pub struct FixedChargeLedger {
    last_charged: HashMap<String, (i16, i8)>,
}

impl FixedChargeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last_charged.clear();
    }

    pub fn last_charged(&self, category: &str) -> Option<(i16, i8)> {
        self.last_charged.get(category).copied()
    }

    /// Returns `true` if `category` has not been billed yet in the month of
    /// `timestamp`, and records it as billed.
    pub fn charge(&mut self, category: &str, timestamp: DateTime) -> bool {
        let month = (timestamp.year(), timestamp.month());
        if self.last_charged.get(category) == Some(&month) {
            return false;
        }
        self.last_charged.insert(category.to_string(), month);
        true
    }
}

/// Per-category amounts for one hour plus their sum.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakdown {
    pub by_category: BTreeMap<String, BigDecimal>,
    pub total: BigDecimal,
}

impl Breakdown {
    pub fn get(&self, category: &str) -> Option<&BigDecimal> {
        self.by_category.get(category)
    }

    fn insert(&mut self, category: &str, amount: BigDecimal) {
        self.total += &amount;
        self.by_category.insert(category.to_string(), amount);
    }

    /// Every amount, total included, multiplied by `factor`.
    pub fn scale(&self, factor: &BigDecimal) -> Breakdown {
        Breakdown {
            by_category: self
                .by_category
                .iter()
                .map(|(category, amount)| (category.clone(), amount * factor))
                .collect(),
            total: &self.total * factor,
        }
    }
}

/// Prices that apply in one hour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPrices {
    pub without_tax: Breakdown,
    pub with_tax: Breakdown,
    /// Category to the name of the rule that won it.
    pub rules: BTreeMap<String, String>,
    /// Categories won by a fixed-monthly rule. Their prices are flat amounts,
    /// not per-kWh rates.
    pub fixed_monthly: BTreeSet<String>,
}

/// Pricing rules grouped by category, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RuleCalendar {
    categories: Vec<(String, Vec<PricingRule>)>,
}

impl RuleCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `rule` to its category. Earlier rules take priority over later ones.
    pub fn add_pricing_rule(&mut self, rule: PricingRule) {
        match self
            .categories
            .iter_mut()
            .find(|(category, _)| *category == rule.category)
        {
            Some((_, rules)) => rules.push(rule),
            None => self.categories.push((rule.category.clone(), vec![rule])),
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .map(|(category, _)| category.as_str())
    }

    pub fn rules(&self, category: &str) -> &[PricingRule] {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, rules)| rules.as_slice())
            .unwrap_or_default()
    }

    /// Number of rules across all categories.
    pub fn len(&self) -> usize {
        self.categories.iter().map(|(_, rules)| rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// The rule that wins `category` at `timestamp`, if any.
    pub fn winning_rule(&self, category: &str, timestamp: DateTime) -> Option<&PricingRule> {
        self.rules(category)
            .iter()
            .find(|rule| rule.is_active(timestamp))
    }

    /// Resolves every category at `timestamp`.
    ///
    /// Categories without a matching rule are left out. A fixed-monthly rule
    /// charges its full price on the first hour of the month the `ledger` sees
    /// and zero afterwards.
    pub fn resolve(&self, timestamp: DateTime, ledger: &mut FixedChargeLedger) -> ResolvedPrices {
        let mut resolved = ResolvedPrices::default();

        for (category, rules) in &self.categories {
            let Some(rule) = rules.iter().find(|rule| rule.is_active(timestamp)) else {
                continue;
            };
            let price = if !rule.is_fixed_monthly {
                rule.price.clone()
            } else if ledger.charge(category, timestamp) {
                trace!(
                    %category,
                    rule = %rule.name,
                    %timestamp,
                    price = %rule.price,
                    "fixed monthly charge"
                );
                rule.price.clone()
            } else {
                BigDecimal::zero()
            };
            if rule.is_fixed_monthly {
                resolved.fixed_monthly.insert(category.clone());
            }
            let with_tax = &price * &rule.tax_multiplier;
            resolved.without_tax.insert(category, price);
            resolved.with_tax.insert(category, with_tax);
            resolved.rules.insert(category.clone(), rule.name.clone());
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::{Date, date, datetime, time};
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn year_2023() -> RuleScope {
        RuleScope::between(
            datetime(2023, 1, 1, 0, 0, 0, 0),
            datetime(2023, 12, 31, 0, 0, 0, 0),
        )
    }

    fn other_time() -> PricingRule {
        PricingRule::new("Other Time", "distribution", dec("0.10"), year_2023())
    }

    fn winter_daytime() -> PricingRule {
        PricingRule::builder(
            "Winter Daytime",
            "distribution",
            dec("0.15"),
            datetime(2023, 1, 1, 0, 0, 0, 0),
            datetime(2023, 12, 31, 0, 0, 0, 0),
        )
        .time_window(TimeWindow::new(time(7, 0, 0, 0), time(21, 0, 0, 0)))
        .weekdays()
        .months([11, 12, 1, 2, 3])
        .build()
        .unwrap()
    }

    fn resolve_once(calendar: &RuleCalendar, day: Date, hour: i8) -> ResolvedPrices {
        calendar.resolve(day.at(hour, 0, 0, 0), &mut FixedChargeLedger::new())
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut calendar = RuleCalendar::new();
        calendar.add_pricing_rule(winter_daytime());
        calendar.add_pricing_rule(other_time());
        let mut ledger = FixedChargeLedger::new();
        let monday = date(2023, 1, 2);

        let prices = calendar.resolve(monday.at(12, 0, 0, 0), &mut ledger);
        assert_eq!(prices.without_tax.get("distribution"), Some(&dec("0.15")));
        assert_eq!(prices.with_tax.get("distribution"), Some(&dec("0.186")));
        assert_eq!(prices.rules["distribution"], "Winter Daytime");
        assert!(prices.fixed_monthly.is_empty());

        // Monday night falls through to the catch-all.
        let prices = calendar.resolve(monday.at(22, 0, 0, 0), &mut ledger);
        assert_eq!(prices.without_tax.get("distribution"), Some(&dec("0.10")));
        assert_eq!(prices.rules["distribution"], "Other Time");
    }

    #[test]
    fn catch_all_added_first_shadows_specific_rule() {
        let mut calendar = RuleCalendar::new();
        calendar.add_pricing_rule(other_time());
        calendar.add_pricing_rule(winter_daytime());

        let prices = resolve_once(&calendar, date(2023, 1, 2), 12);
        assert_eq!(prices.without_tax.get("distribution"), Some(&dec("0.10")));
    }

    #[test]
    fn totals_sum_categories() {
        let mut calendar = RuleCalendar::new();
        calendar.add_pricing_rule(other_time());
        let supply = PricingRule::new("Supply", "supply", dec("0.08"), year_2023());
        calendar.add_pricing_rule(supply);

        let prices = resolve_once(&calendar, date(2023, 5, 1), 3);
        assert_eq!(prices.without_tax.total, dec("0.18"));
        assert_eq!(prices.with_tax.total, dec("0.2232"));
        let categories: Vec<&str> = calendar.categories().collect();
        assert_eq!(categories, ["distribution", "supply"]);
        assert_eq!(calendar.len(), 2);
    }

    #[test]
    fn unmatched_category_is_omitted() {
        let mut calendar = RuleCalendar::new();
        calendar.add_pricing_rule(winter_daytime());

        let prices = resolve_once(&calendar, date(2023, 7, 3), 12);
        assert!(prices.without_tax.by_category.is_empty());
        assert!(prices.with_tax.total.is_zero());
    }

    #[test]
    fn fixed_monthly_charges_once_per_month() {
        let mut calendar = RuleCalendar::new();
        let fee = PricingRule::new("Monthly Fee", "fixed_monthly", dec("39.90"), year_2023());
        calendar.add_pricing_rule(fee.fixed_monthly());
        let mut ledger = FixedChargeLedger::new();
        let zero = BigDecimal::zero();

        let first = calendar.resolve(datetime(2023, 1, 1, 0, 0, 0, 0), &mut ledger);
        assert_eq!(first.without_tax.get("fixed_monthly"), Some(&dec("39.90")));
        assert_eq!(first.with_tax.get("fixed_monthly"), Some(&dec("49.476")));
        assert!(first.fixed_monthly.contains("fixed_monthly"));

        let second = calendar.resolve(datetime(2023, 1, 1, 1, 0, 0, 0), &mut ledger);
        assert_eq!(second.without_tax.get("fixed_monthly"), Some(&zero));
        assert_eq!(second.with_tax.get("fixed_monthly"), Some(&zero));
        assert!(second.fixed_monthly.contains("fixed_monthly"));

        let february = calendar.resolve(datetime(2023, 2, 1, 0, 0, 0, 0), &mut ledger);
        let charge = february.without_tax.get("fixed_monthly");
        assert_eq!(charge, Some(&dec("39.90")));
        assert_eq!(ledger.last_charged("fixed_monthly"), Some((2023, 2)));
    }

    #[test]
    fn ledger_distinguishes_years() {
        let mut ledger = FixedChargeLedger::new();
        assert!(ledger.charge("fixed", datetime(2023, 1, 5, 0, 0, 0, 0)));
        assert!(!ledger.charge("fixed", datetime(2023, 1, 6, 0, 0, 0, 0)));
        assert!(ledger.charge("fixed", datetime(2024, 1, 5, 0, 0, 0, 0)));
        assert!(ledger.charge("other", datetime(2024, 1, 5, 0, 0, 0, 0)));

        ledger.reset();
        assert_eq!(ledger.last_charged("fixed"), None);
        assert!(ledger.charge("fixed", datetime(2024, 1, 7, 0, 0, 0, 0)));
    }

    #[test]
    fn custom_tax_multiplier() {
        let rule = PricingRule::new("Tax Free", "supply", dec("0.08"), year_2023());
        let mut calendar = RuleCalendar::new();
        calendar.add_pricing_rule(rule.with_tax_multiplier(dec("1")));

        let prices = resolve_once(&calendar, date(2023, 5, 1), 3);
        assert_eq!(prices.with_tax.get("supply"), Some(&dec("0.08")));
    }
}
