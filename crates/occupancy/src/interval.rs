//! Storage stays extracted from a movement ledger.
//!
//! An arrival (inbound or transfer) at a warehouse or transshipment point
//! opens a stay. The stay closes at an outbound from that location, at the
//! next arrival anywhere else, or at the end of the run.

use chrono::TimeDelta;
use hvdc_core::{Error, EventType, Period, Result, SkuLedger, Timestamp};
use hvdc_ingestion::LocationNormalizer;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Time a SKU spent at one storage location, half-open `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStay {
    /// Canonical warehouse name.
    pub warehouse: String,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Still present when the run ended.
    pub open: bool,
}

impl StorageStay {
    /// Calendar months the stay intersects, in order. A zero-length stay
    /// touches the month it starts in.
    pub fn periods(&self) -> Vec<Period> {
        let first = Period::containing(self.start);
        let last = if self.end > self.start {
            Period::containing(self.end - TimeDelta::nanoseconds(1))
        } else {
            first
        };
        Period::range_inclusive(first, last)
    }

    /// Whole days of the stay inside a period, clipped to the period and
    /// never less than one.
    pub fn days_in(&self, period: Period) -> u32 {
        let from = self.start.date_naive().max(period.first_day());
        let to = self.end.date_naive().min(period.end_exclusive());
        let days = (to - from).num_days().clamp(0, i64::from(period.days()));
        u32::try_from(days).unwrap_or(0).max(1)
    }

    /// Whether the SKU was already stored when the period began.
    pub fn is_carried_into(&self, period: Period) -> bool {
        self.start < period.start_ts()
    }
}

/// Extract the storage stays of a ledger.
///
/// Open stays are closed at `run_end` (or at their start if `run_end`
/// precedes it). Locations missing from the catalog are a validation error.
pub fn storage_stays(
    ledger: &SkuLedger,
    locations: &LocationNormalizer,
    run_end: Timestamp,
) -> Result<Vec<StorageStay>> {
    let mut stays = Vec::new();
    let mut current: Option<(String, Timestamp)> = None;

    for event in ledger.events() {
        let resolved = locations.resolve(&event.location).ok_or_else(|| {
            Error::validation(
                ledger.sku_id(),
                format!(
                    "unconfigured location '{}' in {} event at {}",
                    event.location,
                    event.event_type.as_str(),
                    event.timestamp
                ),
            )
        })?;

        match event.event_type {
            EventType::Inbound | EventType::Transfer => {
                if let Some((warehouse, _)) = &current {
                    if *warehouse == resolved.name {
                        continue;
                    }
                }
                if let Some((warehouse, start)) = current.take() {
                    stays.push(StorageStay {
                        warehouse,
                        start,
                        end: event.timestamp,
                        open: false,
                    });
                }
                if resolved.kind.is_storage() {
                    current = Some((resolved.name.clone(), event.timestamp));
                }
            }
            EventType::Outbound => match current.take() {
                Some((warehouse, start)) if warehouse == resolved.name => {
                    stays.push(StorageStay {
                        warehouse,
                        start,
                        end: event.timestamp,
                        open: false,
                    });
                }
                other => {
                    if resolved.kind.is_storage() {
                        debug!(
                            sku_id = %ledger.sku_id(),
                            location = %resolved.name,
                            "outbound without matching inbound"
                        );
                    }
                    current = other;
                }
            },
        }
    }

    if let Some((warehouse, start)) = current {
        stays.push(StorageStay {
            warehouse,
            start,
            end: run_end.max(start),
            open: true,
        });
    }

    Ok(stays)
}
