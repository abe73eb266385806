//! Flow classification from a SKU's movement ledger.
//!
//! Consecutive events at the same location collapse into one hop. The
//! storage stops (warehouse, transshipment point) the SKU has completed
//! between port and site determine the route code:
//!
//! | stops                        | code |
//! |------------------------------|------|
//! | (no events)                  | 0    |
//! | none                         | 1    |
//! | warehouse                    | 2    |
//! | warehouse, transshipment     | 3    |
//! | transshipment                | 3    |
//! | anything longer              | 4    |

use crate::normalize::LocationNormalizer;
use hvdc_core::config::LocationCatalog;
use hvdc_core::{
    Error, EventType, FlowClassification, FlowCode, LocationKind, Result, SkuLedger,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Statistics about flow classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationStats {
    /// Total ledgers submitted.
    pub total: u64,
    /// Classified ledgers per flow code (index = code).
    pub by_code: [u64; 5],
    /// Ledgers rejected with a validation error.
    pub rejected: u64,
    /// Classified ledgers whose SKU is still sitting at a storage stop.
    pub open_ended: u64,
}

impl ClassificationStats {
    /// Number of SKUs classified with a given code.
    pub fn count(&self, code: FlowCode) -> u64 {
        self.by_code[usize::from(code.code())]
    }

    /// Number of successfully classified SKUs.
    pub fn classified(&self) -> u64 {
        self.by_code.iter().sum()
    }

    /// Number of distinct flow codes observed.
    pub fn codes_present(&self) -> usize {
        self.by_code.iter().filter(|&&n| n > 0).count()
    }

    /// Fraction of classified SKUs with a given code.
    pub fn share(&self, code: FlowCode) -> f64 {
        let classified = self.classified();
        if classified > 0 {
            self.count(code) as f64 / classified as f64
        } else {
            0.0
        }
    }

    /// Reset statistics.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One collapsed visit to a location.
#[derive(Debug)]
struct Hop<'a> {
    location: &'a str,
    kind: LocationKind,
    /// The SKU left this location (outbound, or arrived elsewhere later).
    departed: bool,
}

/// Map completed storage stops to a route code.
fn route_code(stops: &[LocationKind]) -> FlowCode {
    use LocationKind::{Transshipment, Warehouse};
    match stops {
        [] => FlowCode::PortToSite,
        [Warehouse] => FlowCode::ViaWarehouse,
        [Warehouse, Transshipment] | [Transshipment] => FlowCode::ViaWarehouseAndTransshipment,
        _ => FlowCode::MultiHop,
    }
}

/// Collapse a ledger into hops, resolving every location.
fn hops<'a>(ledger: &'a SkuLedger, locations: &LocationNormalizer) -> Result<Vec<Hop<'a>>> {
    let mut hops: Vec<Hop<'a>> = Vec::with_capacity(ledger.len());

    for event in ledger.events() {
        let kind = locations.kind(&event.location).ok_or_else(|| {
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

        match hops.last_mut() {
            Some(hop) if hop.location == event.location => {
                hop.departed = event.event_type == EventType::Outbound;
            }
            previous => {
                if let Some(hop) = previous {
                    hop.departed = true;
                }
                hops.push(Hop {
                    location: &event.location,
                    kind,
                    departed: event.event_type == EventType::Outbound,
                });
            }
        }
    }

    Ok(hops)
}

/// Classify one ledger.
///
/// The last event's location becomes `final_location`. A storage stop the
/// SKU has not yet left does not count towards the route code, so a ledger
/// that grows never lowers the code it already had.
pub fn classify(ledger: &SkuLedger, locations: &LocationNormalizer) -> Result<FlowClassification> {
    let Some(last) = ledger.last() else {
        return Ok(FlowClassification {
            sku_id: ledger.sku_id().to_string(),
            flow_code: FlowCode::PreArrival,
            route_description: FlowCode::PreArrival.description().to_string(),
            final_location: None,
        });
    };

    let hops = hops(ledger, locations)?;
    let stops: Vec<LocationKind> = hops
        .iter()
        .filter(|hop| hop.kind.is_storage() && hop.departed)
        .map(|hop| hop.kind)
        .collect();
    let flow_code = route_code(&stops);

    Ok(FlowClassification {
        sku_id: ledger.sku_id().to_string(),
        flow_code,
        route_description: flow_code.description().to_string(),
        final_location: Some(last.location.clone()),
    })
}

/// Flow classifier with running statistics.
pub struct FlowClassifier {
    locations: LocationNormalizer,
    stats: ClassificationStats,
}

impl FlowClassifier {
    /// Create a classifier over a location catalog.
    pub fn new(catalog: &LocationCatalog) -> Self {
        Self {
            locations: LocationNormalizer::new(catalog),
            stats: ClassificationStats::default(),
        }
    }

    /// Classify a single ledger.
    pub fn classify(&mut self, ledger: &SkuLedger) -> Result<FlowClassification> {
        self.stats.total += 1;

        match classify(ledger, &self.locations) {
            Ok(classification) => {
                self.stats.by_code[usize::from(classification.flow_code.code())] += 1;
                let open = ledger
                    .last()
                    .map(|e| {
                        e.event_type.is_arrival()
                            && self.locations.kind(&e.location).is_some_and(LocationKind::is_storage)
                    })
                    .unwrap_or(false);
                if open {
                    self.stats.open_ended += 1;
                }
                debug!(
                    sku_id = %classification.sku_id,
                    flow_code = classification.flow_code.code(),
                    "classified"
                );
                Ok(classification)
            }
            Err(error) => {
                self.stats.rejected += 1;
                warn!(sku_id = %ledger.sku_id(), %error, "flow classification failed");
                Err(error)
            }
        }
    }

    /// Classify multiple ledgers. Failures are isolated per SKU.
    pub fn classify_batch(&mut self, ledgers: &[SkuLedger]) -> Vec<Result<FlowClassification>> {
        ledgers.iter().map(|ledger| self.classify(ledger)).collect()
    }

    /// Get classification statistics.
    pub fn stats(&self) -> &ClassificationStats {
        &self.stats
    }

    /// Reset statistics.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }
}
