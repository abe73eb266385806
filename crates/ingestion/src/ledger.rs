//! Ledger building from ingested movements.
//!
//! Groups movements per SKU, canonicalizes location names and produces one
//! [`SkuLedger`] per SKU. A SKU with a malformed movement is rejected as a
//! whole; the rest of the batch is unaffected.

use crate::normalize::LocationNormalizer;
use hvdc_core::config::LocationCatalog;
use hvdc_core::{Error, MovementEvent, RawMovement, SkuId, SkuLedger};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A SKU excluded from the run, with the reason.
#[derive(Debug)]
pub struct RejectedSku {
    pub sku_id: SkuId,
    pub error: Error,
}

/// Output of the ledger builder.
#[derive(Debug, Default)]
pub struct LedgerSet {
    /// Valid ledgers ordered by SKU id.
    pub ledgers: Vec<SkuLedger>,
    /// SKUs rejected during ingestion.
    pub rejected: Vec<RejectedSku>,
    /// Consecutive duplicate events dropped.
    pub duplicates_dropped: usize,
}

/// Builder that groups movements into per-SKU ledgers.
pub struct LedgerBuilder {
    normalizer: LocationNormalizer,
    /// Pending events per SKU, in ingestion order.
    pending: BTreeMap<SkuId, Vec<MovementEvent>>,
    /// First error seen per SKU.
    rejected: BTreeMap<SkuId, Error>,
}

impl LedgerBuilder {
    /// Create a builder resolving location names against a catalog.
    pub fn new(catalog: &LocationCatalog) -> Self {
        Self {
            normalizer: LocationNormalizer::new(catalog),
            pending: BTreeMap::new(),
            rejected: BTreeMap::new(),
        }
    }

    /// Register a SKU known from the master list. A SKU with no movements
    /// still yields an (empty) ledger.
    pub fn register_sku(&mut self, sku_id: impl Into<SkuId>) {
        self.pending.entry(sku_id.into()).or_default();
    }

    /// Add a typed movement.
    pub fn add_event(&mut self, mut event: MovementEvent) {
        event.location = self.normalizer.canonical(&event.location);
        self.pending
            .entry(event.sku_id.clone())
            .or_default()
            .push(event);
    }

    /// Add multiple typed movements.
    pub fn add_events(&mut self, events: impl IntoIterator<Item = MovementEvent>) {
        for event in events {
            self.add_event(event);
        }
    }

    /// Add a movement from the ingestion collaborator. An unrecognized event
    /// type rejects the whole SKU.
    pub fn add_raw(&mut self, raw: RawMovement) {
        let sku_id = raw.sku_id.clone();
        match raw.into_event() {
            Ok(event) => self.add_event(event),
            Err(error) => {
                warn!(sku_id = %sku_id, %error, "rejecting SKU with malformed movement");
                self.rejected.entry(sku_id).or_insert(error);
            }
        }
    }

    /// Add multiple raw movements.
    pub fn add_raw_batch(&mut self, raws: impl IntoIterator<Item = RawMovement>) {
        for raw in raws {
            self.add_raw(raw);
        }
    }

    /// Number of SKUs seen so far (including rejected ones).
    pub fn sku_count(&self) -> usize {
        self.pending
            .keys()
            .chain(self.rejected.keys())
            .collect::<std::collections::BTreeSet<_>>()
            .len()
    }

    /// Finish building.
    pub fn build(self) -> LedgerSet {
        let mut set = LedgerSet::default();

        for (sku_id, events) in self.pending {
            if self.rejected.contains_key(&sku_id) {
                continue;
            }
            let received = events.len();
            match SkuLedger::from_events(sku_id.clone(), events) {
                Ok(ledger) => {
                    let dropped = received - ledger.len();
                    if dropped > 0 {
                        debug!(sku_id = %sku_id, dropped, "dropped repeated ledger events");
                    }
                    set.duplicates_dropped += dropped;
                    set.ledgers.push(ledger);
                }
                Err(error) => {
                    warn!(sku_id = %sku_id, %error, "rejecting SKU ledger");
                    set.rejected.push(RejectedSku { sku_id, error });
                }
            }
        }

        set.rejected.extend(
            self.rejected
                .into_iter()
                .map(|(sku_id, error)| RejectedSku { sku_id, error }),
        );
        set.rejected.sort_by(|a, b| a.sku_id.cmp(&b.sku_id));

        debug!(
            ledgers = set.ledgers.len(),
            rejected = set.rejected.len(),
            duplicates = set.duplicates_dropped,
            "ledger build complete"
        );
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hvdc_core::EventType;

    fn make_raw(sku: &str, location: &str, day: u32, event_type: &str) -> RawMovement {
        RawMovement {
            sku_id: sku.to_string(),
            location: location.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            event_type: event_type.to_string(),
        }
    }

    #[test]
    fn test_groups_and_orders_by_sku() {
        let mut builder = LedgerBuilder::new(&LocationCatalog::default());
        builder.add_raw_batch(vec![
            make_raw("B", "DSV Indoor", 3, "inbound"),
            make_raw("A", "Khalifa Port", 1, "inbound"),
            make_raw("B", "Port", 1, "inbound"),
        ]);
        let set = builder.build();

        assert_eq!(set.ledgers.len(), 2);
        assert_eq!(set.ledgers[0].sku_id(), "A");
        let b = &set.ledgers[1];
        assert_eq!(b.events()[0].location, "Khalifa Port");
        assert_eq!(b.events()[1].location, "DSV Indoor");
        assert!(set.rejected.is_empty());
    }

    #[test]
    fn test_malformed_event_rejects_only_that_sku() {
        let mut builder = LedgerBuilder::new(&LocationCatalog::default());
        builder.add_raw_batch(vec![
            make_raw("GOOD", "Khalifa Port", 1, "inbound"),
            make_raw("BAD", "Khalifa Port", 1, "inbound"),
            make_raw("BAD", "DSV Indoor", 2, "shipped"),
        ]);
        let set = builder.build();

        assert_eq!(set.ledgers.len(), 1);
        assert_eq!(set.ledgers[0].sku_id(), "GOOD");
        assert_eq!(set.rejected.len(), 1);
        assert_eq!(set.rejected[0].sku_id, "BAD");
        assert!(set.rejected[0].error.to_string().contains("shipped"));
    }

    #[test]
    fn test_registered_sku_without_movement() {
        let mut builder = LedgerBuilder::new(&LocationCatalog::default());
        builder.register_sku("PRE-1");
        let set = builder.build();
        assert_eq!(set.ledgers.len(), 1);
        assert!(set.ledgers[0].is_empty());
    }

    #[test]
    fn test_duplicates_counted() {
        let mut builder = LedgerBuilder::new(&LocationCatalog::default());
        builder.add_raw_batch(vec![
            make_raw("A", "DSV Indoor", 1, "inbound"),
            make_raw("A", "Indoor", 2, "inbound"),
            make_raw("A", "DSV Indoor", 5, "outbound"),
        ]);
        assert_eq!(builder.sku_count(), 1);
        let set = builder.build();
        assert_eq!(set.duplicates_dropped, 1);
        assert_eq!(set.ledgers[0].len(), 2);
        assert_eq!(set.ledgers[0].events()[1].event_type, EventType::Outbound);
    }
}
