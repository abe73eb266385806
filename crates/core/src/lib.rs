//! Core types and configuration for the HVDC logistics engine.
//!
//! This crate provides shared types used across all other crates:
//! - Movement, ledger, occupancy, invoice and billing types
//! - Calendar month periods
//! - Configuration structures (location catalog, billing tables)
//! - Common error types

pub mod config;
pub mod error;
pub mod period;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use period::Period;
pub use types::*;
