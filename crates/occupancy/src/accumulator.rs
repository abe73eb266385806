//! Per-SKU occupancy records and their warehouse roll-up.
//!
//! `accumulate` turns one ledger into monthly occupancy records. The
//! [`OccupancyAccumulator`] sums records from many SKUs into cumulative
//! area per (warehouse, period) and keeps a summary per SKU.

use crate::interval::storage_stays;
use hvdc_core::{
    Error, OccupancyRecord, Period, Result, SkuId, SkuLedger, SkuOccupancy, Timestamp,
    WarehouseOccupancy,
};
use hvdc_ingestion::LocationNormalizer;
use std::collections::BTreeMap;
use tracing::debug;

/// Monthly occupancy records for one SKU.
///
/// Every calendar month a storage stay intersects receives the full
/// `unit_area`. Two stays of the same SKU in the same warehouse and month
/// merge into one record whose days are summed (capped at the month length).
pub fn accumulate(
    ledger: &SkuLedger,
    unit_area: f64,
    run_end: Timestamp,
    locations: &LocationNormalizer,
) -> Result<Vec<OccupancyRecord>> {
    if !unit_area.is_finite() || unit_area < 0.0 {
        return Err(Error::validation(
            ledger.sku_id(),
            format!("unit area must be a non-negative number, got {unit_area}"),
        ));
    }

    let mut records: Vec<OccupancyRecord> = Vec::new();
    for stay in storage_stays(ledger, locations, run_end)? {
        for period in stay.periods() {
            let days = stay.days_in(period);
            let existing = records
                .iter_mut()
                .find(|r| r.period == period && r.warehouse == stay.warehouse);
            match existing {
                Some(record) => {
                    record.days_occupied = (record.days_occupied + days).min(period.days());
                }
                None => records.push(OccupancyRecord {
                    sku_id: ledger.sku_id().to_string(),
                    warehouse: stay.warehouse.clone(),
                    period,
                    area_occupied: unit_area,
                    days_occupied: days,
                    is_cumulative: stay.is_carried_into(period),
                }),
            }
        }
    }

    debug!(
        sku_id = %ledger.sku_id(),
        records = records.len(),
        "occupancy accumulated"
    );
    Ok(records)
}

/// Running roll-up of occupancy records.
#[derive(Debug, Default)]
pub struct OccupancyAccumulator {
    /// (warehouse, period) -> cumulative occupancy.
    cells: BTreeMap<(String, Period), WarehouseOccupancy>,
    /// Per-SKU summaries.
    skus: BTreeMap<SkuId, SkuOccupancy>,
}

impl OccupancyAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one record.
    pub fn add_record(&mut self, record: &OccupancyRecord) {
        let cell = self
            .cells
            .entry((record.warehouse.clone(), record.period))
            .or_insert_with(|| WarehouseOccupancy::empty(record.warehouse.clone(), record.period));
        cell.area_occupied += record.area_occupied;
        if record.is_cumulative {
            cell.carried_area += record.area_occupied;
        }
        cell.area_days += record.area_days();
        cell.sku_count += 1;

        let summary = self
            .skus
            .entry(record.sku_id.clone())
            .or_insert_with(|| SkuOccupancy {
                sku_id: record.sku_id.clone(),
                warehouses: Vec::new(),
                periods_occupied: 0,
                area_months: 0.0,
            });
        if !summary.warehouses.contains(&record.warehouse) {
            summary.warehouses.push(record.warehouse.clone());
        }
        summary.periods_occupied += 1;
        summary.area_months += record.area_occupied;
    }

    /// Add multiple records.
    pub fn add_records<'a>(&mut self, records: impl IntoIterator<Item = &'a OccupancyRecord>) {
        for record in records {
            self.add_record(record);
        }
    }

    /// Cumulative occupancy of a warehouse in a period.
    pub fn warehouse_occupancy(&self, warehouse: &str, period: Period) -> Option<&WarehouseOccupancy> {
        self.cells.get(&(warehouse.to_string(), period))
    }

    /// All roll-ups, ordered by warehouse then period.
    pub fn occupancy(&self) -> impl Iterator<Item = &WarehouseOccupancy> {
        self.cells.values()
    }

    /// Periods with any occupancy, ascending.
    pub fn periods(&self) -> Vec<Period> {
        let mut periods: Vec<Period> = self.cells.keys().map(|(_, p)| *p).collect();
        periods.sort();
        periods.dedup();
        periods
    }

    /// Total area occupied across warehouses in a period.
    pub fn total_area(&self, period: Period) -> f64 {
        self.cells
            .values()
            .filter(|c| c.period == period)
            .map(|c| c.area_occupied)
            .sum()
    }

    /// Summary for one SKU.
    pub fn sku_summary(&self, sku_id: &str) -> Option<&SkuOccupancy> {
        self.skus.get(sku_id)
    }

    /// All SKU summaries keyed by SKU id.
    pub fn sku_summaries(&self) -> &BTreeMap<SkuId, SkuOccupancy> {
        &self.skus
    }

    /// Number of (warehouse, period) cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.skus.clear();
    }
}
