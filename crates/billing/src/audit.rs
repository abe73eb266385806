//! Audit of billed charges against invoice totals.

use crate::engine::InvoiceTotals;
use hvdc_core::config::BillingConfig;
use hvdc_core::{BillingLineItem, BillingMode, Period};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const AMOUNT_EPSILON: f64 = 1e-9;

/// Why an audited charge failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditReason {
    /// Invoiced amount differs from the prorated rate charge.
    ProrationMismatch,
    /// Invoiced amount differs from the passthrough charge.
    PassthroughMismatch,
    /// A no-charge warehouse was invoiced.
    NochargeViolation,
    /// Invoiced warehouse has no billing mode.
    ModeMissing,
}

impl AuditReason {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditReason::ProrationMismatch => "PRORATION_MISMATCH",
            AuditReason::PassthroughMismatch => "PASSTHROUGH_MISMATCH",
            AuditReason::NochargeViolation => "NOCHARGE_VIOLATION",
            AuditReason::ModeMissing => "MODE_MISSING",
        }
    }
}

/// Difference relative to the invoiced amount, 0 when nothing was invoiced.
fn relative_delta(delta: f64, invoiced: f64) -> f64 {
    if invoiced.abs() > AMOUNT_EPSILON {
        delta / invoiced
    } else {
        0.0
    }
}

/// Severity of an audited charge.
///
/// Rate-based charges between the pass and warn thresholds grade WARN;
/// every other charge grades PASS or FAIL with its audit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditGrade {
    Pass,
    Warn,
    Fail,
}

/// Outcome of comparing one billed charge with its invoice total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeAudit {
    pub warehouse: String,
    pub period: Period,
    pub mode: Option<BillingMode>,
    /// Charge billed by the engine.
    pub expected: f64,
    /// Amount on the invoice.
    pub invoiced: f64,
    /// `invoiced - expected`.
    pub delta: f64,
    /// `delta / invoiced`, 0 when nothing was invoiced.
    pub delta_pct: f64,
    pub passed: bool,
    pub grade: AuditGrade,
    pub reason: Option<AuditReason>,
}

/// Audits billed charges with configured thresholds.
pub struct ChargeAuditor {
    modes: BTreeMap<String, BillingMode>,
    rate_delta_threshold: f64,
    rate_warn_threshold: f64,
    passthrough_tolerance: f64,
}

impl ChargeAuditor {
    /// Create an auditor from the billing configuration.
    pub fn new(config: &BillingConfig) -> Self {
        Self {
            modes: config.modes.clone(),
            rate_delta_threshold: config.rate_delta_threshold,
            rate_warn_threshold: config.rate_warn_threshold,
            passthrough_tolerance: config.passthrough_tolerance,
        }
    }

    /// Audit one line item against its invoiced amount.
    pub fn audit_item(&self, item: &BillingLineItem, invoiced: f64) -> ChargeAudit {
        let expected = item.charge;
        let delta = invoiced - expected;
        let delta_pct = relative_delta(delta, invoiced);

        let (passed, failure) = match item.mode {
            BillingMode::Rate => (
                delta_pct.abs() <= self.rate_delta_threshold + AMOUNT_EPSILON,
                AuditReason::ProrationMismatch,
            ),
            BillingMode::Passthrough => (
                delta.abs() < self.passthrough_tolerance,
                AuditReason::PassthroughMismatch,
            ),
            BillingMode::NoCharge => (
                invoiced.abs() <= AMOUNT_EPSILON,
                AuditReason::NochargeViolation,
            ),
        };

        let grade = match item.mode {
            _ if passed => AuditGrade::Pass,
            BillingMode::Rate if delta_pct.abs() <= self.rate_warn_threshold + AMOUNT_EPSILON => {
                AuditGrade::Warn
            }
            _ => AuditGrade::Fail,
        };

        ChargeAudit {
            warehouse: item.warehouse.clone(),
            period: item.period,
            mode: Some(item.mode),
            expected,
            invoiced,
            delta,
            delta_pct,
            passed,
            grade,
            reason: (!passed).then_some(failure),
        }
    }

    /// Audit every invoiced (warehouse, period).
    ///
    /// Items without an invoice total are not audited. Invoice totals for
    /// warehouses without a billing mode fail with `MODE_MISSING`.
    pub fn audit(&self, items: &[BillingLineItem], totals: &InvoiceTotals) -> Vec<ChargeAudit> {
        let mut audits = Vec::new();
        let mut audited: BTreeSet<(&str, Period)> = BTreeSet::new();

        for item in items {
            let key = (item.warehouse.clone(), item.period);
            if let Some(&invoiced) = totals.get(&key) {
                audits.push(self.audit_item(item, invoiced));
                audited.insert((item.warehouse.as_str(), item.period));
            }
        }

        for ((warehouse, period), &invoiced) in totals {
            if self.modes.contains_key(warehouse) || audited.contains(&(warehouse.as_str(), *period)) {
                continue;
            }
            audits.push(ChargeAudit {
                warehouse: warehouse.clone(),
                period: *period,
                mode: None,
                expected: 0.0,
                invoiced,
                delta: invoiced,
                delta_pct: relative_delta(invoiced, invoiced),
                passed: false,
                grade: AuditGrade::Fail,
                reason: Some(AuditReason::ModeMissing),
            });
        }

        debug!(
            audited = audits.len(),
            failed = audits.iter().filter(|a| !a.passed).count(),
            "charge audit complete"
        );
        audits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn june() -> Period {
        Period::new(2024, 6).unwrap()
    }

    fn make_item(warehouse: &str, mode: BillingMode, charge: f64) -> BillingLineItem {
        BillingLineItem {
            warehouse: warehouse.to_string(),
            period: june(),
            mode,
            occupied_area: 0.0,
            prorated_area: 0.0,
            rate_or_amount: 0.0,
            charge,
        }
    }

    fn auditor() -> ChargeAuditor {
        ChargeAuditor::new(&BillingConfig::default())
    }

    #[test]
    fn test_rate_delta_relative_to_invoice() {
        // 20 AED short of a 1000 AED invoice is exactly 2%.
        let item = make_item("DSV Indoor", BillingMode::Rate, 980.0);
        let audit = auditor().audit_item(&item, 1000.0);
        assert_relative_eq!(audit.delta_pct, 0.02, epsilon = 1e-12);
        assert!(audit.passed);
        assert_eq!(audit.grade, AuditGrade::Pass);
        assert!(audit.reason.is_none());
    }

    #[test]
    fn test_rate_grades() {
        let grade_at = |charge: f64| {
            let item = make_item("DSV Indoor", BillingMode::Rate, charge);
            auditor().audit_item(&item, 1000.0)
        };
        assert_eq!(grade_at(980.0).grade, AuditGrade::Pass);

        let warn = grade_at(960.0);
        assert_eq!(warn.grade, AuditGrade::Warn);
        assert!(!warn.passed);
        assert_eq!(warn.reason, Some(AuditReason::ProrationMismatch));

        let fail = grade_at(940.0);
        assert_eq!(fail.grade, AuditGrade::Fail);
        assert_eq!(fail.reason, Some(AuditReason::ProrationMismatch));
    }

    #[test]
    fn test_rate_with_nothing_invoiced() {
        let item = make_item("DSV Indoor", BillingMode::Rate, 470.0);
        let audit = auditor().audit_item(&item, 0.0);
        assert_eq!(audit.delta_pct, 0.0);
        assert_relative_eq!(audit.delta, -470.0);
    }

    #[test]
    fn test_passthrough_tolerance_is_strict() {
        let item = make_item("AAA Storage", BillingMode::Passthrough, 500.0);
        assert!(auditor().audit_item(&item, 500.25).passed);
        let failed = auditor().audit_item(&item, 500.5);
        assert!(!failed.passed);
        assert_eq!(failed.reason, Some(AuditReason::PassthroughMismatch));
        assert_eq!(failed.grade, AuditGrade::Fail);
    }

    #[test]
    fn test_no_charge_violation() {
        let item = make_item("MOSB", BillingMode::NoCharge, 0.0);
        assert!(auditor().audit_item(&item, 0.0).passed);
        let failed = auditor().audit_item(&item, 15.0);
        assert_eq!(failed.reason, Some(AuditReason::NochargeViolation));
        assert_eq!(failed.grade, AuditGrade::Fail);
        assert_relative_eq!(failed.delta_pct, 1.0);
    }

    #[test]
    fn test_audit_with_mode_missing() {
        let items = vec![
            make_item("DSV Indoor", BillingMode::Rate, 470.0),
            make_item("MOSB", BillingMode::NoCharge, 0.0),
        ];
        let totals = InvoiceTotals::from([
            (("DSV Indoor".to_string(), june()), 470.0),
            (("Back Lot".to_string(), june()), 80.0),
        ]);
        let audits = auditor().audit(&items, &totals);
        assert_eq!(audits.len(), 2);
        assert!(audits[0].passed);
        assert_eq!(audits[1].warehouse, "Back Lot");
        assert_eq!(audits[1].reason, Some(AuditReason::ModeMissing));
        assert_eq!(AuditReason::ModeMissing.as_str(), "MODE_MISSING");
    }
}
