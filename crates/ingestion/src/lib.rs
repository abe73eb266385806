//! Movement ingestion and flow classification for the HVDC logistics engine.
//!
//! This crate handles:
//! - Location name and reference code normalization
//! - Ledger building (grouping, ordering, duplicate suppression)
//! - Flow classification (route code 0-4 per SKU)

pub mod normalize;
pub mod ledger;
pub mod classifier;

pub use normalize::{expand_combined_codes, normalize_code, LocationNormalizer};
pub use ledger::{LedgerBuilder, LedgerSet, RejectedSku};
pub use classifier::{classify, ClassificationStats, FlowClassifier};
