//! Monthly warehouse billing.
//!
//! Each warehouse is billed under the mode configured for it:
//! rate-based warehouses charge the contract rate on day-prorated occupied
//! area, passthrough warehouses charge the invoiced amount verbatim and
//! no-charge warehouses are always billed at zero.

use hvdc_core::config::BillingConfig;
use hvdc_core::{
    BillingLineItem, BillingMode, Error, InvoiceLine, Period, PeriodTotal, Result,
    WarehouseOccupancy,
};
use hvdc_ingestion::LocationNormalizer;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Invoiced amount per (canonical warehouse, period).
pub type InvoiceTotals = BTreeMap<(String, Period), f64>;

fn billing_key(warehouse: &str, period: Period) -> String {
    format!("{warehouse}/{period}")
}

/// Bill one warehouse for one period.
///
/// RATE charges `rate × area_days / days_in_period`, which equals the
/// occupied area times the rate prorated by the days each stay spent in the
/// period. A missing mode, a missing rate, or missing occupancy for a
/// rate-based warehouse is a validation error naming `warehouse/period`.
pub fn bill(
    warehouse: &str,
    period: Period,
    modes: &BTreeMap<String, BillingMode>,
    occupancy: Option<&WarehouseOccupancy>,
    invoice_total: Option<f64>,
    rates: &BTreeMap<String, f64>,
) -> Result<BillingLineItem> {
    let key = || billing_key(warehouse, period);
    let mode = *modes
        .get(warehouse)
        .ok_or_else(|| Error::validation(key(), "warehouse has no billing mode"))?;

    let occupied_area = occupancy.map_or(0.0, |o| o.area_occupied);
    let prorated_area = occupancy.map_or(0.0, |o| o.prorated_area());

    let (rate_or_amount, charge) = match mode {
        BillingMode::Rate => {
            let rate = *rates
                .get(warehouse)
                .ok_or_else(|| Error::validation(key(), "rate-based warehouse has no rate"))?;
            let occupancy = occupancy.ok_or_else(|| {
                Error::validation(key(), "rate-based warehouse has no occupancy")
            })?;
            let charge = rate * occupancy.area_days / f64::from(period.days());
            (rate, charge)
        }
        BillingMode::Passthrough => {
            let total = invoice_total.unwrap_or_else(|| {
                warn!(warehouse, %period, "no invoice total for passthrough warehouse, billing 0");
                0.0
            });
            (total, total)
        }
        BillingMode::NoCharge => (0.0, 0.0),
    };

    Ok(BillingLineItem {
        warehouse: warehouse.to_string(),
        period,
        mode,
        occupied_area,
        prorated_area,
        rate_or_amount,
        charge,
    })
}

/// Sum invoice amounts per canonical warehouse and period.
///
/// Lines without a period cannot be attributed to a month and are skipped.
pub fn invoice_totals(lines: &[InvoiceLine], locations: &LocationNormalizer) -> InvoiceTotals {
    let mut totals = InvoiceTotals::new();
    for line in lines {
        let Some(period) = line.period else {
            debug!(code = %line.reference_code, "invoice line without period skipped for totals");
            continue;
        };
        let warehouse = locations.canonical(&line.warehouse);
        *totals.entry((warehouse, period)).or_insert(0.0) += line.amount;
    }
    totals
}

/// Total charge per period, ascending by period.
pub fn period_totals(items: &[BillingLineItem]) -> Vec<PeriodTotal> {
    let mut totals: BTreeMap<Period, PeriodTotal> = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.period).or_insert(PeriodTotal {
            period: item.period,
            charge: 0.0,
            warehouse_count: 0,
        });
        total.charge += item.charge;
        total.warehouse_count += 1;
    }
    totals.into_values().collect()
}

/// Line items and per-warehouse failures of a billing pass.
#[derive(Debug, Default)]
pub struct BillingRun {
    pub items: Vec<BillingLineItem>,
    pub errors: Vec<Error>,
}

impl BillingRun {
    fn merge(&mut self, other: BillingRun) {
        self.items.extend(other.items);
        self.errors.extend(other.errors);
    }
}

/// Billing engine over a fixed mode and rate table.
pub struct BillingEngine {
    modes: BTreeMap<String, BillingMode>,
    rates: BTreeMap<String, f64>,
}

impl BillingEngine {
    /// Create an engine from the billing configuration.
    pub fn new(config: &BillingConfig) -> Self {
        Self {
            modes: config.modes.clone(),
            rates: config.rates.clone(),
        }
    }

    /// Mode configured for a warehouse.
    pub fn mode(&self, warehouse: &str) -> Option<BillingMode> {
        self.modes.get(warehouse).copied()
    }

    /// Bill one warehouse for one period.
    pub fn bill(
        &self,
        warehouse: &str,
        period: Period,
        occupancy: Option<&WarehouseOccupancy>,
        invoice_total: Option<f64>,
    ) -> Result<BillingLineItem> {
        bill(warehouse, period, &self.modes, occupancy, invoice_total, &self.rates)
    }

    /// Bill every relevant warehouse for one period.
    ///
    /// `occupancy` and `invoice_totals` hold this period's values keyed by
    /// canonical warehouse. No-charge warehouses are always emitted. Rate and
    /// passthrough warehouses are billed when they have occupancy or an
    /// invoice total. Warehouses seen in the data but absent from the mode
    /// table fail individually without stopping the rest.
    pub fn bill_period(
        &self,
        period: Period,
        occupancy: &BTreeMap<String, WarehouseOccupancy>,
        invoice_totals: &BTreeMap<String, f64>,
    ) -> BillingRun {
        let warehouses: BTreeSet<&str> = self
            .modes
            .keys()
            .chain(occupancy.keys())
            .chain(invoice_totals.keys())
            .map(String::as_str)
            .collect();

        let mut run = BillingRun::default();
        for warehouse in warehouses {
            let occ = occupancy.get(warehouse);
            let total = invoice_totals.get(warehouse).copied();
            let billable = match self.mode(warehouse) {
                Some(BillingMode::NoCharge) | None => true,
                Some(_) => occ.is_some() || total.is_some(),
            };
            if !billable {
                continue;
            }
            match self.bill(warehouse, period, occ, total) {
                Ok(item) => run.items.push(item),
                Err(error) => {
                    warn!(%error, "billing failed");
                    run.errors.push(error);
                }
            }
        }
        run
    }

    /// Bill a sequence of periods.
    pub fn bill_periods<'a>(
        &self,
        periods: &[Period],
        occupancy: impl IntoIterator<Item = &'a WarehouseOccupancy>,
        totals: &InvoiceTotals,
    ) -> BillingRun {
        let mut occupancy_by_period: BTreeMap<Period, BTreeMap<String, WarehouseOccupancy>> =
            BTreeMap::new();
        for cell in occupancy {
            occupancy_by_period
                .entry(cell.period)
                .or_default()
                .insert(cell.warehouse.clone(), cell.clone());
        }
        let mut totals_by_period: BTreeMap<Period, BTreeMap<String, f64>> = BTreeMap::new();
        for ((warehouse, period), amount) in totals {
            totals_by_period
                .entry(*period)
                .or_default()
                .insert(warehouse.clone(), *amount);
        }

        let empty_occupancy = BTreeMap::new();
        let empty_totals = BTreeMap::new();
        let mut run = BillingRun::default();
        for &period in periods {
            run.merge(self.bill_period(
                period,
                occupancy_by_period.get(&period).unwrap_or(&empty_occupancy),
                totals_by_period.get(&period).unwrap_or(&empty_totals),
            ));
        }
        debug!(
            periods = periods.len(),
            items = run.items.len(),
            errors = run.errors.len(),
            "billing complete"
        );
        run
    }
}
