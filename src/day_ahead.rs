//! Day-ahead market prices and the cost of usage at those prices.
//!
//! This path sits beside the rule calendar: instead of resolving tariff rules it
//! multiplies an externally supplied spot price by the hour's usage. Grid-side
//! charges still come from a [`RuleCalendar`] when one is attached.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use bigdecimal::{BigDecimal, One, Zero};
use csv::StringRecord;
use jiff::civil::DateTime;
use jiff::{Timestamp, ToSpan};
use tracing::{debug, warn};

use crate::error::{CurrencyMismatchError, Error, MissingPriceError, Result};
use crate::money::{Currency, Money};
use crate::pricing::{FixedChargeLedger, RuleCalendar};
use crate::usage_schedule::UsageSchedule;

const TIMESTAMP_COLUMN: &str = "Timestamp";
const PRICE_COLUMN: &str = "Price";

/// Hourly spot prices, per kWh, for one bidding area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayAheadPrices {
    currency: Currency,
    country_code: Option<String>,
    zone_code: Option<String>,
    /// When prices were last loaded or merged in.
    last_updated: Option<Timestamp>,
    prices: BTreeMap<DateTime, BigDecimal>,
}

impl DayAheadPrices {
    pub fn new(currency: Currency) -> Self {
        Self {
            currency,
            country_code: None,
            zone_code: None,
            last_updated: None,
            prices: BTreeMap::new(),
        }
    }

    /// Tags the prices with the market they come from, e.g. `SE` and `SE3`.
    pub fn with_area(
        mut self,
        country_code: impl Into<String>,
        zone_code: impl Into<String>,
    ) -> Self {
        self.country_code = Some(country_code.into());
        self.zone_code = Some(zone_code.into());
        self
    }

    pub fn from_path(path: &Path, currency: Currency) -> Result<Self> {
        Self::from_csv(File::open(path)?, currency)
    }

    /// Reads a `Timestamp,Price` CSV where prices are per MWh.
    ///
    /// Other columns are ignored. A repeated timestamp replaces the earlier price.
    pub fn from_csv(reader: impl Read, currency: Currency) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        let timestamp_index = column_index(&headers, TIMESTAMP_COLUMN)?;
        let price_index = column_index(&headers, PRICE_COLUMN)?;

        let per_mwh = BigDecimal::from(1000);
        let mut prices = Self::new(currency);
        for record in csv_reader.into_records() {
            let record = record?;
            let line = record.position().map_or(0, |position| position.line());
            let timestamp_cell = record.get(timestamp_index).unwrap_or_default();
            let price_cell = record.get(price_index).unwrap_or_default();

            let timestamp =
                DateTime::from_str(timestamp_cell).map_err(|source| Error::InvalidTimestamp {
                    value: timestamp_cell.to_string(),
                    line,
                    source,
                })?;
            let price = BigDecimal::from_str(price_cell).map_err(|_| Error::InvalidPrice {
                value: price_cell.to_string(),
                line,
            })?;
            prices.insert(timestamp, price / &per_mwh);
        }

        prices.last_updated = Some(Timestamp::now());
        debug!(hours = prices.len(), "loaded day-ahead prices");
        Ok(prices)
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn country_code(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    pub fn zone_code(&self) -> Option<&str> {
        self.zone_code.as_deref()
    }

    pub fn last_updated(&self) -> Option<Timestamp> {
        self.last_updated
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Sets the per-kWh price of one hour.
    pub fn insert(&mut self, timestamp: DateTime, price_per_kwh: BigDecimal) {
        if let Some(previous) = self.prices.insert(timestamp, price_per_kwh) {
            debug!(%timestamp, %previous, "replaced day-ahead price");
        }
    }

    /// Merges in newer prices, which win over existing ones, and stamps the
    /// update time.
    pub fn extend(
        &mut self,
        newer: DayAheadPrices,
    ) -> std::result::Result<(), CurrencyMismatchError> {
        if newer.currency != self.currency {
            return Err(CurrencyMismatchError {
                left: self.currency,
                right: newer.currency,
            });
        }
        for (timestamp, price) in newer.prices {
            self.insert(timestamp, price);
        }
        self.last_updated = Some(Timestamp::now());
        Ok(())
    }

    pub fn price_at(&self, timestamp: DateTime) -> std::result::Result<Money, MissingPriceError> {
        self.prices
            .get(&timestamp)
            .map(|price| Money::new(price.clone(), self.currency))
            .ok_or(MissingPriceError { timestamp })
    }
}

fn column_index(headers: &StringRecord, column: &'static str) -> Result<usize> {
    headers
        .iter()
        .position(|header| header == column)
        .ok_or(Error::MissingColumn(column))
}

/// Whole hours from `start` through `end`, both included.
fn hours_through(start: DateTime, end: DateTime) -> impl Iterator<Item = DateTime> {
    start
        .series(1.hour())
        .take_while(move |timestamp| *timestamp <= end)
}

/// Spot-price cost of a schedule over a period.
///
/// The energy side is the spot price times usage plus the supplier's fixed
/// fee. The distribution side is whatever the attached grid calendar charges
/// in the same hours. Tax is applied once, on the sum of both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotCostBreakdown {
    pub energy_cost: Money,
    pub fixed_cost: Money,
    /// Per-kWh grid charges times usage.
    pub distribution_cost: Money,
    /// Fixed-monthly grid charges.
    pub distribution_fixed_cost: Money,
    pub total_energy_cost: Money,
    pub total_distribution_cost: Money,
    pub total_without_tax: Money,
    pub total_with_tax: Money,
    /// Usage in the priced hours only.
    pub total_usage_kwh: BigDecimal,
    pub priced_hours: usize,
    /// Hours skipped for lack of a price.
    pub missing_hours: Vec<DateTime>,
}

pub struct SpotCostCalculator<'a> {
    prices: &'a DayAheadPrices,
    schedule: &'a UsageSchedule,
    grid: Option<&'a RuleCalendar>,
    fixed_cost: Money,
    vat_rate: BigDecimal,
}

impl<'a> SpotCostCalculator<'a> {
    pub fn new(prices: &'a DayAheadPrices, schedule: &'a UsageSchedule) -> Self {
        Self {
            prices,
            schedule,
            grid: None,
            fixed_cost: Money::zero(prices.currency()),
            vat_rate: BigDecimal::new(24.into(), 2),
        }
    }

    /// Prices grid-side categories with `calendar`, in the spot prices' currency.
    ///
    /// Only the pre-tax rule prices are used; the VAT rate of this calculator
    /// applies to them like to the energy side.
    pub fn grid(mut self, calendar: &'a RuleCalendar) -> Self {
        self.grid = Some(calendar);
        self
    }

    /// Adds a fixed supplier fee for the whole period.
    pub fn fixed_cost(mut self, fixed_cost: Money) -> Self {
        self.fixed_cost = fixed_cost;
        self
    }

    /// The fraction added on top, e.g. `0.24` for 24 % VAT.
    pub fn vat_rate(mut self, vat_rate: BigDecimal) -> Self {
        self.vat_rate = vat_rate;
        self
    }

    /// Prices every hour from `start` through `end`, both included.
    ///
    /// Hours without a spot price are logged, listed in
    /// [`SpotCostBreakdown::missing_hours`] and contribute nothing, grid
    /// charges included. A fixed-monthly grid charge lands on the first priced
    /// hour of each month.
    pub fn calculate(
        &self,
        start: DateTime,
        end: DateTime,
    ) -> std::result::Result<SpotCostBreakdown, CurrencyMismatchError> {
        let currency = self.prices.currency();
        let mut energy_cost = Money::zero(currency);
        let mut distribution_cost = BigDecimal::zero();
        let mut distribution_fixed_cost = BigDecimal::zero();
        let mut total_usage_kwh = BigDecimal::zero();
        let mut priced_hours = 0;
        let mut missing_hours = Vec::new();
        let mut ledger = FixedChargeLedger::new();

        for timestamp in hours_through(start, end) {
            let price = match self.prices.price_at(timestamp) {
                Ok(price) => price,
                Err(error) => {
                    warn!("{error}, skipping the hour");
                    missing_hours.push(timestamp);
                    continue;
                }
            };
            let usage = self.schedule.resolve(timestamp);
            energy_cost = energy_cost.checked_add(&price.scale(&usage))?;

            if let Some(grid) = self.grid {
                let resolved = grid.resolve(timestamp, &mut ledger);
                for (category, price) in &resolved.without_tax.by_category {
                    if resolved.fixed_monthly.contains(category) {
                        distribution_fixed_cost += price;
                    } else {
                        distribution_cost += price * &usage;
                    }
                }
            }

            total_usage_kwh += usage;
            priced_hours += 1;
        }

        let distribution_cost = Money::new(distribution_cost, currency);
        let distribution_fixed_cost = Money::new(distribution_fixed_cost, currency);
        let total_energy_cost = energy_cost.checked_add(&self.fixed_cost)?;
        let total_distribution_cost = distribution_cost.checked_add(&distribution_fixed_cost)?;
        let total_without_tax = total_energy_cost.checked_add(&total_distribution_cost)?;
        let total_with_tax = total_without_tax.scale(&(BigDecimal::one() + &self.vat_rate));
        debug!(
            %total_without_tax,
            %total_with_tax,
            priced_hours,
            missing_hours = missing_hours.len(),
            "spot calculation completed"
        );
        Ok(SpotCostBreakdown {
            energy_cost,
            fixed_cost: self.fixed_cost.clone(),
            distribution_cost,
            distribution_fixed_cost,
            total_energy_cost,
            total_distribution_cost,
            total_without_tax,
            total_with_tax,
            total_usage_kwh,
            priced_hours,
            missing_hours,
        })
    }
}
