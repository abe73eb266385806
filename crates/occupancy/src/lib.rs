//! Warehouse occupancy for the HVDC logistics engine.
//!
//! This crate handles:
//! - Storage stay extraction from movement ledgers
//! - Per-SKU monthly occupancy records
//! - Cumulative per-warehouse, per-month occupancy roll-ups

pub mod interval;
pub mod accumulator;

pub use interval::{storage_stays, StorageStay};
pub use accumulator::{accumulate, OccupancyAccumulator};
