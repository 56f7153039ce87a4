use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, Zero};
use jiff::ToSpan;
use jiff::civil::DateTime;
use tracing::debug;

use crate::pricing::{Breakdown, FixedChargeLedger, RuleCalendar};
use crate::usage_schedule::UsageSchedule;

/// What one hour costs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRecord {
    pub timestamp: DateTime,
    pub usage_kwh: BigDecimal,
    /// Tax-inclusive prices.
    pub prices: Breakdown,
    /// Tax-inclusive prices times usage.
    pub costs: Breakdown,
}

/// Walks a period hour by hour and prices the usage in each hour.
pub struct UsageCostAnalyzer<'a> {
    calendar: &'a RuleCalendar,
    schedule: &'a UsageSchedule,
}

impl<'a> UsageCostAnalyzer<'a> {
    pub fn new(calendar: &'a RuleCalendar, schedule: &'a UsageSchedule) -> Self {
        Self { calendar, schedule }
    }

    /// Analyzes every hour in `[start, end)` with a fresh fixed-charge ledger.
    pub fn analyze(&self, start: DateTime, end: DateTime) -> Vec<AnalysisRecord> {
        self.analyze_with_ledger(start, end, &mut FixedChargeLedger::new())
    }

    /// Like [`Self::analyze`], but continues `ledger`, so a period split into
    /// consecutive chunks bills each fixed monthly charge only once.
    ///
    /// Hours are resolved strictly in increasing order; the ledger relies on it.
    pub fn analyze_with_ledger(
        &self,
        start: DateTime,
        end: DateTime,
        ledger: &mut FixedChargeLedger,
    ) -> Vec<AnalysisRecord> {
        debug!(%start, %end, "starting analysis");
        let records: Vec<AnalysisRecord> = hours(start, end)
            .map(|timestamp| self.record(timestamp, ledger))
            .collect();
        debug!(hours = records.len(), "analysis completed");
        records
    }

    fn record(&self, timestamp: DateTime, ledger: &mut FixedChargeLedger) -> AnalysisRecord {
        let usage_kwh = self.schedule.resolve(timestamp);
        let prices = self.calendar.resolve(timestamp, ledger).with_tax;
        let costs = prices.scale(&usage_kwh);
        AnalysisRecord {
            timestamp,
            usage_kwh,
            prices,
            costs,
        }
    }

    pub fn summarize(records: &[AnalysisRecord]) -> Summary {
        Summary::from_records(records)
    }
}

/// Whole hours from `start` up to, but excluding, `end`.
pub fn hours(start: DateTime, end: DateTime) -> impl Iterator<Item = DateTime> {
    start
        .series(1.hour())
        .take_while(move |timestamp| *timestamp < end)
}

fn add_to(totals: &mut BTreeMap<String, BigDecimal>, category: &str, amount: &BigDecimal) {
    *totals.entry(category.to_string()).or_default() += amount;
}

/// The hour with the highest value of some measure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peak {
    /// Position in the analyzed records.
    pub index: usize,
    pub timestamp: DateTime,
    pub value: BigDecimal,
}

impl Peak {
    /// Replaces `current` when `value` is strictly higher, so the earliest hour wins ties.
    fn update(current: &mut Option<Peak>, index: usize, timestamp: DateTime, value: &BigDecimal) {
        if current.as_ref().is_none_or(|peak| *value > peak.value) {
            *current = Some(Peak {
                index,
                timestamp,
                value: value.clone(),
            });
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_usage_kwh: BigDecimal,
    pub total_cost: BigDecimal,
    /// Per-category costs; the hour totals are not repeated here.
    pub cost_by_category: BTreeMap<String, BigDecimal>,
    /// Zero when nothing was used.
    pub average_price_per_kwh: BigDecimal,
    pub peak_usage: Option<Peak>,
    pub peak_cost: Option<Peak>,
}

impl Summary {
    pub fn from_records(records: &[AnalysisRecord]) -> Self {
        debug!(hours = records.len(), "summarizing");
        let mut summary = Summary::default();

        for (index, record) in records.iter().enumerate() {
            summary.total_usage_kwh += &record.usage_kwh;
            summary.total_cost += &record.costs.total;
            for (category, cost) in &record.costs.by_category {
                add_to(&mut summary.cost_by_category, category, cost);
            }
            Peak::update(
                &mut summary.peak_usage,
                index,
                record.timestamp,
                &record.usage_kwh,
            );
            Peak::update(
                &mut summary.peak_cost,
                index,
                record.timestamp,
                &record.costs.total,
            );
        }

        summary.update_average();
        debug!(
            total_usage_kwh = %summary.total_usage_kwh,
            total_cost = %summary.total_cost,
            "summary completed"
        );
        summary
    }

    pub fn peak_usage_hour(&self) -> Option<usize> {
        self.peak_usage.as_ref().map(|peak| peak.index)
    }

    pub fn peak_cost_hour(&self) -> Option<usize> {
        self.peak_cost.as_ref().map(|peak| peak.index)
    }

    /// Combines this summary with the summary of the records that directly
    /// follow it. `offset` is the number of records this summary covers, and
    /// shifts the peak indices of `later`.
    pub fn merge(&self, later: &Summary, offset: usize) -> Summary {
        let mut merged = self.clone();
        merged.total_usage_kwh += &later.total_usage_kwh;
        merged.total_cost += &later.total_cost;
        for (category, cost) in &later.cost_by_category {
            add_to(&mut merged.cost_by_category, category, cost);
        }
        for (merged_peak, later_peak) in [
            (&mut merged.peak_usage, &later.peak_usage),
            (&mut merged.peak_cost, &later.peak_cost),
        ] {
            if let Some(peak) = later_peak {
                Peak::update(
                    merged_peak,
                    peak.index + offset,
                    peak.timestamp,
                    &peak.value,
                );
            }
        }
        merged.update_average();
        merged
    }

    fn update_average(&mut self) {
        self.average_price_per_kwh = if self.total_usage_kwh > BigDecimal::zero() {
            &self.total_cost / &self.total_usage_kwh
        } else {
            BigDecimal::zero()
        };
    }
}
