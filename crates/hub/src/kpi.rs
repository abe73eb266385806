//! Hub KPIs.
//!
//! Summary indicators over the SKU master hub, in the spirit of a batch
//! performance report.

use hvdc_core::{FlowCode, MatchStatus, SkuMasterRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Count and share of one flow code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowShare {
    pub flow_code: FlowCode,
    pub count: u64,
    pub share: f64,
}

/// KPIs over a hub.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubKpi {
    /// Number of hub records.
    pub sku_count: u64,
    /// Every SKU appears once.
    pub unique_skus: bool,
    /// Distinct flow codes present divided by the number of codes.
    pub flow_coverage: f64,
    /// Count and share per flow code, in code order.
    pub flow_distribution: Vec<FlowShare>,
    /// Share of arrived SKUs (code > 0) with a final location.
    pub location_coverage: f64,
    pub passed: u64,
    pub failed: u64,
    pub unmatched: u64,
    /// SKUs with no reconciliation record.
    pub not_reconciled: u64,
    /// Passed over matched (passed + failed).
    pub pass_rate: f64,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

impl HubKpi {
    /// Calculate KPIs from hub records.
    pub fn calculate(records: &[SkuMasterRecord]) -> Self {
        if records.is_empty() {
            return Self {
                unique_skus: true,
                flow_distribution: FlowCode::ALL
                    .iter()
                    .map(|&flow_code| FlowShare {
                        flow_code,
                        count: 0,
                        share: 0.0,
                    })
                    .collect(),
                ..Self::default()
            };
        }

        let mut kpi = Self {
            sku_count: records.len() as u64,
            ..Self::default()
        };

        let mut by_code = [0u64; 5];
        let mut arrived = 0u64;
        let mut located = 0u64;
        let mut ids: HashSet<&str> = HashSet::with_capacity(records.len());

        for record in records {
            ids.insert(record.sku_id.as_str());
            by_code[usize::from(record.flow_code.code())] += 1;

            if record.flow_code != FlowCode::PreArrival {
                arrived += 1;
                if record.final_location.is_some() {
                    located += 1;
                }
            }

            match record.match_status {
                Some(MatchStatus::Pass) => kpi.passed += 1,
                Some(MatchStatus::Fail) => kpi.failed += 1,
                Some(MatchStatus::Unmatched) => kpi.unmatched += 1,
                None => kpi.not_reconciled += 1,
            }
        }

        kpi.unique_skus = ids.len() == records.len();
        let present = by_code.iter().filter(|&&n| n > 0).count() as u64;
        kpi.flow_coverage = ratio(present, FlowCode::ALL.len() as u64);
        kpi.flow_distribution = FlowCode::ALL
            .iter()
            .map(|&flow_code| {
                let count = by_code[usize::from(flow_code.code())];
                FlowShare {
                    flow_code,
                    count,
                    share: ratio(count, kpi.sku_count),
                }
            })
            .collect();
        kpi.location_coverage = ratio(located, arrived);
        kpi.pass_rate = ratio(kpi.passed, kpi.passed + kpi.failed);

        kpi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_record(sku: &str, flow_code: FlowCode, status: Option<MatchStatus>) -> SkuMasterRecord {
        SkuMasterRecord {
            sku_id: sku.to_string(),
            flow_code,
            route_description: flow_code.description().to_string(),
            final_location: (flow_code != FlowCode::PreArrival).then(|| "DAS".to_string()),
            sqm_cum: None,
            warehouses: None,
            periods_occupied: None,
            match_status: status,
            err_weight: None,
            err_volume: None,
        }
    }

    #[test]
    fn test_basic_kpi() {
        let records = vec![
            make_record("A", FlowCode::PreArrival, None),
            make_record("B", FlowCode::ViaWarehouse, Some(MatchStatus::Pass)),
            make_record("C", FlowCode::ViaWarehouse, Some(MatchStatus::Fail)),
            make_record("D", FlowCode::MultiHop, Some(MatchStatus::Unmatched)),
        ];
        let kpi = HubKpi::calculate(&records);

        assert_eq!(kpi.sku_count, 4);
        assert!(kpi.unique_skus);
        assert_relative_eq!(kpi.flow_coverage, 0.6);
        assert_eq!(kpi.flow_distribution[2].count, 2);
        assert_relative_eq!(kpi.flow_distribution[2].share, 0.5);
        assert_relative_eq!(kpi.location_coverage, 1.0);
        assert_relative_eq!(kpi.pass_rate, 0.5);
        assert_eq!(kpi.unmatched, 1);
        assert_eq!(kpi.not_reconciled, 1);
    }

    #[test]
    fn test_duplicate_detected() {
        let records = vec![
            make_record("A", FlowCode::PortToSite, None),
            make_record("A", FlowCode::PortToSite, None),
        ];
        assert!(!HubKpi::calculate(&records).unique_skus);
    }

    #[test]
    fn test_empty_hub() {
        let kpi = HubKpi::calculate(&[]);
        assert_eq!(kpi.sku_count, 0);
        assert_eq!(kpi.flow_distribution.len(), 5);
        assert_eq!(kpi.pass_rate, 0.0);
    }
}
