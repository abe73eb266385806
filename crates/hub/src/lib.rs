//! SKU master hub for the HVDC logistics engine.
//!
//! This crate provides:
//! - Left-outer join of classification, occupancy and reconciliation per SKU
//! - Hub KPIs (flow coverage, location coverage, match distribution)
//! - The end-to-end batch pipeline

pub mod aggregate;
pub mod kpi;
pub mod pipeline;

pub use aggregate::aggregate;
pub use kpi::HubKpi;
pub use pipeline::{Engine, EngineInput, RunError, RunOutput, Stage};
