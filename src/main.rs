use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use bigdecimal::{BigDecimal, One, Zero};
use clap::{Args, Parser, ValueEnum};
use jiff::ToSpan;
use jiff::civil::{DateTime, time};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tariff_calendar::{
    Currency, CurrencyMismatchError, DayAheadPrices, Money, PricingRule, RuleCalendar, RuleScope,
    SpotCostBreakdown, SpotCostCalculator, Summary, TimeWindow, UsageCostAnalyzer, UsagePattern,
    UsageSchedule,
};

/// Prices a constant hourly draw against a time-of-use tariff, hour by hour.
/// Optionally compares the result with buying the same energy at day-ahead spot prices.
#[derive(Parser, Debug)]
#[command(version, long_about)]
struct TariffCalendar {
    /// First hour of the period, e.g. `2023-01-01T00:00`.
    #[arg(long)]
    start: DateTime,
    /// End of the period, exclusive.
    #[arg(long)]
    end: DateTime,
    /// Energy drawn every hour, in kWh.
    #[arg(long, default_value = "1")]
    hourly_kwh: BigDecimal,
    #[command(flatten)]
    tariff: TariffInfo,
    /// Fixed monthly fee, charged once in every calendar month of the period.
    #[arg(long)]
    fixed_monthly: Option<BigDecimal>,
    /// Tax multiplier applied to every tariff price, and to the spot total.
    #[arg(long, default_value = "1.24")]
    tax_multiplier: BigDecimal,
    #[arg(long, value_enum, default_value_t = Currency::Eur)]
    currency: Currency,
    /// CSV file with `Timestamp,Price` day-ahead prices per MWh.
    /// When given, the same usage is also priced at spot prices plus the
    /// tariff's fixed monthly fee and distribution rates.
    #[arg(long)]
    spot_prices: Option<PathBuf>,
    /// Fixed supplier fee for the spot contract over the whole period.
    #[arg(long, requires = "spot_prices")]
    spot_fixed_cost: Option<BigDecimal>,
    /// Log every step of the analysis.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
#[group(required = true)]
struct TariffInfo {
    /// A built-in tariff. You must specify this or the individual rates.
    #[arg(short = 't', long, value_enum, conflicts_with = "tariff_rates")]
    tariff: Option<TariffPreset>,
    #[arg(short, long, group = "tariff_rates", long_help = rate_help("distribution"))]
    distribution_rate: Option<BigDecimal>,
    #[arg(short, long, group = "tariff_rates", long_help = rate_help("supply"))]
    supply_rate: Option<BigDecimal>,
    /// Winter weekday daytime distribution rate (07:00-21:00, November to March), per kWh.
    /// Without it the distribution rate applies around the clock.
    #[arg(long, group = "tariff_rates")]
    day_rate: Option<BigDecimal>,
}

fn rate_help(category: &str) -> String {
    format!(
        "Your {} rate per kWh, before tax. \
         Typically you can just pick a built-in tariff with `--tariff`. \
         If your rates differ, give them here instead.",
        category
    )
}

#[derive(ValueEnum, Copy, Clone, PartialEq, Eq, Debug)]
enum TariffPreset {
    /// Same distribution price around the clock.
    Flat,
    /// Higher distribution price on winter weekdays from 07:00 to 21:00.
    WinterDay,
}

#[derive(Debug, Clone)]
struct TariffRates {
    pub distribution: BigDecimal,
    pub supply: BigDecimal,
    pub day: Option<BigDecimal>,
}

impl TariffRates {
    fn from_args(args: &TariffInfo) -> anyhow::Result<Self> {
        if let Some(preset) = args.tariff {
            let rates = match preset {
                TariffPreset::Flat => Self {
                    distribution: BigDecimal::from_str("0.10")?,
                    supply: BigDecimal::from_str("0.08")?,
                    day: None,
                },
                TariffPreset::WinterDay => Self {
                    distribution: BigDecimal::from_str("0.10")?,
                    supply: BigDecimal::from_str("0.08")?,
                    day: Some(BigDecimal::from_str("0.15")?),
                },
            };
            return Ok(rates);
        }
        let Some(distribution) = args.distribution_rate.clone() else {
            bail!("the distribution rate is required without --tariff");
        };
        Ok(Self {
            distribution,
            supply: args.supply_rate.clone().unwrap_or_else(BigDecimal::zero),
            day: args.day_rate.clone(),
        })
    }
}

/// The grid-side rules: the fixed monthly fee and the distribution rates.
/// They are paid the same way whichever supplier contract is chosen.
fn build_grid_calendar(args: &TariffCalendar, rates: &TariffRates) -> anyhow::Result<RuleCalendar> {
    let mut calendar = RuleCalendar::new();
    let tax = &args.tax_multiplier;
    let (start, end) = (args.start, args.end);
    let period = RuleScope::between(start, end);

    if let Some(fee) = &args.fixed_monthly {
        let rule = PricingRule::new(
            "Fixed Monthly Fee",
            "fixed_monthly",
            fee.clone(),
            period.clone(),
        );
        calendar.add_pricing_rule(rule.with_tax_multiplier(tax.clone()).fixed_monthly());
    }
    // Day rate first: within a category the first matching rule wins.
    if let Some(day) = &rates.day {
        let rule = PricingRule::builder("Winter Daytime", "distribution", day.clone(), start, end)
            .tax_multiplier(tax.clone())
            .time_window(TimeWindow::new(time(7, 0, 0, 0), time(21, 0, 0, 0)))
            .weekdays()
            .months([11, 12, 1, 2, 3])
            .build()?;
        calendar.add_pricing_rule(rule);
    }
    let distribution = rates.distribution.clone();
    let other_time = PricingRule::new("Other Time", "distribution", distribution, period);
    calendar.add_pricing_rule(other_time.with_tax_multiplier(tax.clone()));
    Ok(calendar)
}

/// The whole tariff: the grid-side rules plus the supply rate.
fn build_calendar(args: &TariffCalendar, grid: &RuleCalendar, rates: &TariffRates) -> RuleCalendar {
    let mut calendar = grid.clone();
    let period = RuleScope::between(args.start, args.end);
    let supply = PricingRule::new("Supply", "supply", rates.supply.clone(), period);
    calendar.add_pricing_rule(supply.with_tax_multiplier(args.tax_multiplier.clone()));
    calendar
}

fn constant_schedule(args: &TariffCalendar) -> UsageSchedule {
    let mut schedule = UsageSchedule::new();
    let period = RuleScope::between(args.start, args.end);
    let usage = UsagePattern::new("Constant Usage", args.hourly_kwh.clone(), period);
    schedule.add_usage_pattern(usage);
    schedule
}

/// Prices the same usage over the same hours at spot prices, with the grid
/// side priced by `grid` and taxed like the tariff.
fn price_at_spot(
    args: &TariffCalendar,
    prices: &DayAheadPrices,
    schedule: &UsageSchedule,
    grid: &RuleCalendar,
) -> anyhow::Result<SpotCostBreakdown> {
    let fixed_cost = args.spot_fixed_cost.clone().unwrap_or_default();
    let last_hour = args.end.checked_sub(1.hour())?;
    let breakdown = SpotCostCalculator::new(prices, schedule)
        .grid(grid)
        .fixed_cost(Money::new(fixed_cost, args.currency))
        .vat_rate(&args.tax_multiplier - BigDecimal::one())
        .calculate(args.start, last_hour)?;
    Ok(breakdown)
}

/// What switching from the tariff to spot prices would do.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Save(Money),
    PayMore(Money),
    Same,
}

impl Verdict {
    fn compare(tariff: &Money, spot: &Money) -> Result<Self, CurrencyMismatchError> {
        let difference = spot.checked_sub(tariff)?;
        let zero = BigDecimal::zero();
        Ok(if difference.amount < zero {
            Verdict::Save(Money::new(-difference.amount, difference.currency))
        } else if difference.amount > zero {
            Verdict::PayMore(difference)
        } else {
            Verdict::Same
        })
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tariff_calendar=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tariff_calendar=info"))
    };
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = TariffCalendar::parse();
    init_tracing(args.verbose);

    let (start, end) = (args.start, args.end);
    if start >= end {
        bail!("--start ({start}) must be before --end ({end})");
    }

    let rates = TariffRates::from_args(&args.tariff)?;
    let grid = build_grid_calendar(&args, &rates)?;
    let calendar = build_calendar(&args, &grid, &rates);
    let schedule = constant_schedule(&args);
    info!(rules = calendar.len(), "built tariff calendar");

    let analyzer = UsageCostAnalyzer::new(&calendar, &schedule);
    let records = analyzer.analyze(start, end);
    let summary = UsageCostAnalyzer::summarize(&records);
    print_summary(&summary, records.len(), args.currency);

    let Some(path) = &args.spot_prices else {
        return Ok(());
    };
    let prices = DayAheadPrices::from_path(path, args.currency)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let spot = price_at_spot(&args, &prices, &schedule, &grid)?;
    print_spot(&spot);

    let tariff_cost = Money::new(summary.total_cost, args.currency);
    match Verdict::compare(&tariff_cost, &spot.total_with_tax)? {
        Verdict::Save(amount) => println!("You would save {} with spot prices!", amount.rounded()),
        Verdict::PayMore(amount) => {
            println!("You would pay {} more with spot prices!", amount.rounded())
        }
        Verdict::Same => {
            println!("You would pay the same amount with spot prices. Try another period?")
        }
    }
    Ok(())
}

fn print_summary(summary: &Summary, hours: usize, currency: Currency) {
    println!("Analyzed {} hours", hours);
    println!("Total usage: {:.2} kWh", summary.total_usage_kwh);
    let total = Money::new(summary.total_cost.clone(), currency);
    println!("Total cost: {}", total.rounded());
    for (category, cost) in &summary.cost_by_category {
        let cost = Money::new(cost.clone(), currency);
        println!("  {}: {}", category, cost.rounded());
    }
    let average = &summary.average_price_per_kwh;
    println!("Average price: {average:.5} {currency}/kWh");
    if let Some(peak) = &summary.peak_usage {
        println!("Peak usage: {:.2} kWh at {}", peak.value, peak.timestamp);
    }
    if let Some(peak) = &summary.peak_cost {
        let cost = Money::new(peak.value.clone(), currency);
        println!("Peak cost: {} at {}", cost.rounded(), peak.timestamp);
    }
}

fn print_spot(spot: &SpotCostBreakdown) {
    if !spot.missing_hours.is_empty() {
        println!("Hours without a spot price: {}", spot.missing_hours.len());
    }
    println!("Spot energy cost: {}", spot.total_energy_cost.rounded());
    let distribution = spot.total_distribution_cost.rounded();
    println!("Spot distribution cost: {distribution}");
    println!("Spot total cost: {}", spot.total_with_tax.rounded());
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 80 EUR/MWh, the same as the built-in supply rate.
    const SPOT_CSV: &str = "\
Timestamp,Price
2023-01-01T00:00,80
2023-01-01T01:00,80
2023-01-01T02:00,80
";

    fn parse(extra: &[&str]) -> TariffCalendar {
        let base = [
            "tariff-calendar",
            "--start",
            "2023-01-01T00:00",
            "--end",
            "2023-01-01T03:00",
        ];
        TariffCalendar::try_parse_from(base.iter().chain(extra).copied()).unwrap()
    }

    fn compare(extra: &[&str]) -> Verdict {
        let args = parse(extra);
        let rates = TariffRates::from_args(&args.tariff).unwrap();
        let grid = build_grid_calendar(&args, &rates).unwrap();
        let calendar = build_calendar(&args, &grid, &rates);
        let schedule = constant_schedule(&args);
        let analyzer = UsageCostAnalyzer::new(&calendar, &schedule);
        let summary = Summary::from_records(&analyzer.analyze(args.start, args.end));

        let prices = DayAheadPrices::from_csv(SPOT_CSV.as_bytes(), args.currency).unwrap();
        let spot = price_at_spot(&args, &prices, &schedule, &grid).unwrap();
        let tariff = Money::new(summary.total_cost, args.currency);
        Verdict::compare(&tariff, &spot.total_with_tax).unwrap()
    }

    fn eur(amount: &str) -> Money {
        Money::new(BigDecimal::from_str(amount).unwrap(), Currency::Eur)
    }

    #[test]
    fn equal_prices_without_tax_pay_the_same() {
        let verdict = compare(&["--tariff", "flat", "--tax-multiplier", "1"]);
        assert_eq!(verdict, Verdict::Same);
    }

    #[test]
    fn equal_prices_with_default_tax_pay_the_same() {
        assert_eq!(compare(&["--tariff", "flat"]), Verdict::Same);
    }

    #[test]
    fn monthly_fee_is_paid_on_both_sides() {
        let verdict = compare(&["--tariff", "winter-day", "--fixed-monthly", "5"]);
        assert_eq!(verdict, Verdict::Same);
    }

    #[test]
    fn spot_tax_follows_the_tax_multiplier() {
        let args = parse(&["--tariff", "flat", "--tax-multiplier", "1"]);
        let rates = TariffRates::from_args(&args.tariff).unwrap();
        let grid = build_grid_calendar(&args, &rates).unwrap();
        let schedule = constant_schedule(&args);
        let prices = DayAheadPrices::from_csv(SPOT_CSV.as_bytes(), args.currency).unwrap();

        let spot = price_at_spot(&args, &prices, &schedule, &grid).unwrap();
        // (0.08 spot + 0.10 distribution) * 3 hours, untaxed.
        assert_eq!(spot.total_energy_cost, eur("0.24"));
        assert_eq!(spot.total_distribution_cost, eur("0.30"));
        assert_eq!(spot.total_with_tax, eur("0.54"));
    }

    #[test]
    fn cheaper_tariff_means_paying_more_at_spot() {
        let rates = [
            "--distribution-rate",
            "0.10",
            "--supply-rate",
            "0.05",
            "--tax-multiplier",
            "1",
        ];
        assert_eq!(compare(&rates), Verdict::PayMore(eur("0.09")));
    }

    #[test]
    fn dearer_tariff_means_saving_at_spot() {
        let rates = [
            "--distribution-rate",
            "0.10",
            "--supply-rate",
            "0.10",
            "--tax-multiplier",
            "1",
        ];
        assert_eq!(compare(&rates), Verdict::Save(eur("0.06")));
    }
}
