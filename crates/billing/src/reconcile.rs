//! Reconciliation of computed quantities against invoice lines.
//!
//! Records pair on the normalized reference code. A pair passes when both
//! the weight and the volume difference are within tolerance; anything
//! without a partner is reported as unmatched.

use hvdc_core::{ComputedQuantities, InvoiceLine, MatchStatus, ReconciliationResult};
use hvdc_ingestion::{expand_combined_codes, normalize_code};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Relative slack, in ulps of the larger operand, for decimal quantities
/// that have no exact binary representation.
const TOLERANCE_ULPS: f64 = 4.0;

#[derive(Default)]
struct InvoiceSide {
    gross_weight: f64,
    volume: f64,
    package_count: i64,
    lines: usize,
}

/// Whether `|invoiced - computed|` is within `tolerance`. The slack scales
/// with the operands so it only absorbs rounding of the subtraction.
fn within(computed: f64, invoiced: f64, tolerance: f64) -> bool {
    let err = (invoiced - computed).abs();
    let slack = TOLERANCE_ULPS * f64::EPSILON * computed.abs().max(invoiced.abs());
    err <= tolerance + slack
}

/// Computed quantities aligned to invoice codes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeAlignment {
    /// Computed quantities keyed by normalized code, combined codes folded.
    pub computed: BTreeMap<String, ComputedQuantities>,
    /// Normalized member code to the combined key that absorbed it.
    pub members: BTreeMap<String, String>,
}

impl CodeAlignment {
    /// Copy each combined result to every member code it covers.
    ///
    /// Results for combined keys are kept and followed by one copy per
    /// member, keyed by the member code, so per-SKU lookups find them.
    pub fn expand_results(&self, results: &[ReconciliationResult]) -> Vec<ReconciliationResult> {
        let mut by_combined: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (member, combined) in &self.members {
            by_combined.entry(combined.as_str()).or_default().push(member.as_str());
        }

        let mut expanded = Vec::with_capacity(results.len() + self.members.len());
        for result in results {
            expanded.push(result.clone());
            for member in by_combined.get(result.key.as_str()).into_iter().flatten() {
                expanded.push(ReconciliationResult {
                    key: member.to_string(),
                    ..result.clone()
                });
            }
        }
        expanded
    }
}

/// Fold computed records covered by a combined invoice code into one record.
///
/// An invoice line such as `HVDC-ADOPT-HE-0087,90` covers several cases. The
/// computed quantities of every expanded code are summed under the line's
/// normalized code and removed from the individual records, so the pair
/// reconciles as one. Single codes pass through normalized.
pub fn align_combined_codes(
    computed: &BTreeMap<String, ComputedQuantities>,
    invoice: &[InvoiceLine],
) -> CodeAlignment {
    let mut aligned: BTreeMap<String, ComputedQuantities> = BTreeMap::new();
    let mut absorbed: BTreeMap<String, String> = BTreeMap::new();
    for (code, quantities) in computed {
        aligned.entry(normalize_code(code)).or_default().merge(quantities);
    }

    for line in invoice {
        let members = expand_combined_codes(&line.reference_code);
        if members.len() < 2 {
            continue;
        }
        let key = normalize_code(&line.reference_code);
        let mut combined = ComputedQuantities::default();
        let mut found = 0;
        for member in members {
            if let Some(quantities) = aligned.remove(&member) {
                combined.merge(&quantities);
                absorbed.insert(member, key.clone());
                found += 1;
            }
        }
        if found > 0 {
            debug!(
                code = %line.reference_code,
                found,
                "combined invoice code aligned"
            );
            aligned.entry(key).or_default().merge(&combined);
        }
    }
    CodeAlignment {
        computed: aligned,
        members: absorbed,
    }
}

/// Reconcile computed quantities against invoice lines.
///
/// Both sides key on [`normalize_code`]. Invoice lines sharing a code are
/// summed. The comparison is inclusive: an error equal to `tolerance`
/// passes. Results are ordered by key.
pub fn reconcile(
    computed: &BTreeMap<String, ComputedQuantities>,
    invoice: &[InvoiceLine],
    tolerance: f64,
) -> Vec<ReconciliationResult> {
    let mut computed_side: BTreeMap<String, ComputedQuantities> = BTreeMap::new();
    for (code, quantities) in computed {
        computed_side.entry(normalize_code(code)).or_default().merge(quantities);
    }

    let mut invoice_side: BTreeMap<String, InvoiceSide> = BTreeMap::new();
    for line in invoice {
        let side = invoice_side.entry(normalize_code(&line.reference_code)).or_default();
        side.gross_weight += line.gross_weight;
        side.volume += line.volume;
        side.package_count += i64::from(line.package_count);
        side.lines += 1;
    }

    let mut results = Vec::with_capacity(computed_side.len().max(invoice_side.len()));
    for (key, quantities) in &computed_side {
        let result = match invoice_side.remove(key) {
            Some(side) => {
                if side.lines > 1 {
                    debug!(key = %key, lines = side.lines, "summed invoice lines sharing a code");
                }
                let err_weight = (side.gross_weight - quantities.gross_weight).abs();
                let err_volume = (side.volume - quantities.volume).abs();
                let match_status = if within(quantities.gross_weight, side.gross_weight, tolerance)
                    && within(quantities.volume, side.volume, tolerance)
                {
                    MatchStatus::Pass
                } else {
                    MatchStatus::Fail
                };
                ReconciliationResult {
                    key: key.clone(),
                    err_weight: Some(err_weight),
                    err_volume: Some(err_volume),
                    package_delta: Some(side.package_count - i64::from(quantities.package_count)),
                    match_status,
                }
            }
            None => unmatched(key.clone()),
        };
        results.push(result);
    }

    for key in invoice_side.into_keys() {
        warn!(key = %key, "invoice line without computed record");
        results.push(unmatched(key));
    }
    results.sort_by(|a, b| a.key.cmp(&b.key));
    results
}

fn unmatched(key: String) -> ReconciliationResult {
    ReconciliationResult {
        key,
        err_weight: None,
        err_volume: None,
        package_delta: None,
        match_status: MatchStatus::Unmatched,
    }
}

/// Distribution of absolute errors over matched pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub mean: f64,
    /// Sample standard deviation (0 for a single sample).
    pub std_dev: f64,
    pub max: f64,
}

impl ErrorStats {
    /// Statistics over a set of errors, `None` when empty.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let std_dev = if samples.len() > 1 {
            samples.iter().std_dev()
        } else {
            0.0
        };
        Some(Self {
            mean: samples.iter().mean(),
            std_dev,
            max: Statistics::max(samples.iter()),
        })
    }
}

/// Aggregate view of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub unmatched: usize,
    /// Share of matched pairs that passed (0 when nothing matched).
    pub pass_rate: f64,
    pub weight_error: Option<ErrorStats>,
    pub volume_error: Option<ErrorStats>,
}

impl ReconciliationSummary {
    /// Summarize reconciliation results.
    pub fn from_results(results: &[ReconciliationResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        let mut weights = Vec::new();
        let mut volumes = Vec::new();
        for result in results {
            match result.match_status {
                MatchStatus::Pass => summary.passed += 1,
                MatchStatus::Fail => summary.failed += 1,
                MatchStatus::Unmatched => summary.unmatched += 1,
            }
            weights.extend(result.err_weight);
            volumes.extend(result.err_volume);
        }
        let matched = summary.passed + summary.failed;
        summary.pass_rate = if matched > 0 {
            summary.passed as f64 / matched as f64
        } else {
            0.0
        };
        summary.weight_error = ErrorStats::from_samples(&weights);
        summary.volume_error = ErrorStats::from_samples(&volumes);
        summary
    }

    /// Keys of the `n` matched pairs with the largest error, largest first.
    pub fn largest_errors(results: &[ReconciliationResult], n: usize) -> Vec<(String, f64)> {
        let mut errors: Vec<(OrderedFloat<f64>, &str)> = results
            .iter()
            .filter_map(|r| {
                let worst = r.err_weight?.max(r.err_volume?);
                Some((OrderedFloat(worst), r.key.as_str()))
            })
            .collect();
        errors.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        errors
            .into_iter()
            .take(n)
            .map(|(err, key)| (key.to_string(), err.into_inner()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_computed(entries: &[(&str, f64, f64)]) -> BTreeMap<String, ComputedQuantities> {
        entries
            .iter()
            .map(|(code, weight, volume)| {
                (
                    code.to_string(),
                    ComputedQuantities {
                        gross_weight: *weight,
                        volume: *volume,
                        package_count: 1,
                    },
                )
            })
            .collect()
    }

    fn make_line(code: &str, weight: f64, volume: f64) -> InvoiceLine {
        InvoiceLine {
            reference_code: code.to_string(),
            package_count: 1,
            gross_weight: weight,
            volume,
            amount: 0.0,
            warehouse: "DSV Indoor".to_string(),
            period: None,
        }
    }

    #[test]
    fn test_decimal_boundary() {
        let computed = make_computed(&[("A-0001", 1000.00, 5.0), ("A-0002", 1000.00, 5.0)]);
        let invoice = vec![make_line("A-0001", 1000.10, 5.0), make_line("A-0002", 1000.11, 5.0)];
        let results = reconcile(&computed, &invoice, 0.10);
        assert_eq!(results[0].match_status, MatchStatus::Pass);
        assert_eq!(results[1].match_status, MatchStatus::Fail);
    }

    #[test]
    fn test_tolerance_is_inclusive() {
        let computed = make_computed(&[("A", 10.0, 2.0), ("B", 10.0, 2.0)]);
        let invoice = vec![make_line("A", 10.5, 2.0), make_line("B", 10.0, 2.500001)];
        let results = reconcile(&computed, &invoice, 0.5);
        assert_eq!(results[0].match_status, MatchStatus::Pass);
        assert_eq!(results[1].match_status, MatchStatus::Fail);
        assert_relative_eq!(results[0].err_weight.unwrap(), 0.5);
    }

    #[test]
    fn test_unmatched_both_sides() {
        let computed = make_computed(&[("ONLY-COMPUTED", 1.0, 1.0), ("BOTH", 1.0, 1.0)]);
        let invoice = vec![make_line("both", 1.0, 1.0), make_line("ONLY-INVOICE", 1.0, 1.0)];
        let results = reconcile(&computed, &invoice, 0.1);
        assert_eq!(results.len(), 3);
        let status = |key: &str| results.iter().find(|r| r.key == key).unwrap().match_status;
        assert_eq!(status("BOTH"), MatchStatus::Pass);
        assert_eq!(status("ONLY-COMPUTED"), MatchStatus::Unmatched);
        assert_eq!(status("ONLY-INVOICE"), MatchStatus::Unmatched);
        let unmatched = results.iter().find(|r| r.key == "ONLY-INVOICE").unwrap();
        assert!(unmatched.err_weight.is_none());
    }

    #[test]
    fn test_duplicate_invoice_lines_summed() {
        let computed = make_computed(&[("A", 30.0, 3.0)]);
        let invoice = vec![make_line("A", 10.0, 1.0), make_line(" a ", 20.0, 2.0)];
        let results = reconcile(&computed, &invoice, 0.1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_status, MatchStatus::Pass);
        assert_eq!(results[0].package_delta, Some(1));
    }

    #[test]
    fn test_combined_code_alignment() {
        let computed = make_computed(&[
            ("HVDC-ADOPT-HE-0087", 100.0, 1.0),
            ("HVDC-ADOPT-HE-0090", 50.0, 0.5),
            ("HVDC-ADOPT-HE-0100", 10.0, 0.1),
        ]);
        let invoice = vec![
            make_line("HVDC-ADOPT-HE-0087,90", 150.0, 1.5),
            make_line("HVDC-ADOPT-HE-0100", 10.0, 0.1),
        ];
        let alignment = align_combined_codes(&computed, &invoice);
        assert_eq!(alignment.computed.len(), 2);
        assert_eq!(alignment.members.len(), 2);
        assert_eq!(alignment.members["HVDC-ADOPT-HE-0090"], "HVDC-ADOPT-HE-008790");

        let results = reconcile(&alignment.computed, &invoice, 0.1);
        assert!(results.iter().all(|r| r.match_status == MatchStatus::Pass));

        let expanded = alignment.expand_results(&results);
        assert_eq!(expanded.len(), 4);
        for member in ["HVDC-ADOPT-HE-0087", "HVDC-ADOPT-HE-0090"] {
            let result = expanded.iter().find(|r| r.key == member).unwrap();
            assert_eq!(result.match_status, MatchStatus::Pass);
            assert_relative_eq!(result.err_weight.unwrap(), 0.0);
        }
    }

    #[test]
    fn test_slack_does_not_widen_tolerance() {
        // Half a nano above the tolerance is a real difference at this scale.
        let computed = make_computed(&[("A", 10.0, 1.0), ("B", 10.0, 1.0)]);
        let invoice = vec![make_line("A", 10.1000000005, 1.0), make_line("B", 10.1, 1.0)];
        let results = reconcile(&computed, &invoice, 0.1);
        assert_eq!(results[0].match_status, MatchStatus::Fail);
        assert_eq!(results[1].match_status, MatchStatus::Pass);
    }

    #[test]
    fn test_summary() {
        let computed = make_computed(&[("A", 10.0, 1.0), ("B", 10.0, 1.0), ("C", 1.0, 1.0)]);
        let invoice = vec![make_line("A", 10.05, 1.0), make_line("B", 13.0, 1.0)];
        let results = reconcile(&computed, &invoice, 0.1);
        let summary = ReconciliationSummary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.unmatched, 1);
        assert_relative_eq!(summary.pass_rate, 0.5);
        let weight = summary.weight_error.unwrap();
        assert_relative_eq!(weight.mean, 1.525, epsilon = 1e-9);
        assert_relative_eq!(weight.max, 3.0, epsilon = 1e-9);

        let largest = ReconciliationSummary::largest_errors(&results, 1);
        assert_eq!(largest[0].0, "B");

        let empty = ReconciliationSummary::from_results(&[]);
        assert_eq!(empty.pass_rate, 0.0);
        assert!(empty.weight_error.is_none());
    }
}
