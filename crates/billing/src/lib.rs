//! Billing, invoice reconciliation and charge audit.
//!
//! This crate provides:
//! - Monthly warehouse charges by billing mode (rate, passthrough, no charge)
//! - Computed-versus-invoiced quantity reconciliation
//! - Audit of billed charges against invoice totals

pub mod engine;
pub mod reconcile;
pub mod audit;

pub use engine::{bill, invoice_totals, period_totals, BillingEngine, BillingRun, InvoiceTotals};
pub use reconcile::{
    align_combined_codes, reconcile, CodeAlignment, ErrorStats, ReconciliationSummary,
};
pub use audit::{AuditGrade, AuditReason, ChargeAudit, ChargeAuditor};
