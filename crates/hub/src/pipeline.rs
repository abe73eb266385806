//! End-to-end batch run.
//!
//! Chains ledger building, flow classification, occupancy, reconciliation,
//! billing, charge audit, hub aggregation and KPIs over one snapshot of
//! inputs. Failures tied to one SKU or one warehouse are collected in
//! [`RunOutput::errors`] and the run continues; a duplicate hub key aborts.

use crate::aggregate::aggregate;
use crate::kpi::HubKpi;
use hvdc_billing::{
    align_combined_codes, invoice_totals, period_totals, reconcile, BillingEngine, ChargeAudit,
    ChargeAuditor, ReconciliationSummary,
};
use hvdc_core::{
    BillingLineItem, ComputedQuantities, Config, Error, FlowClassification, InvoiceLine,
    MovementEvent, Period, PeriodTotal, RawMovement, ReconciliationResult, Result, SkuId,
    SkuLedger, SkuMasterRecord, Timestamp,
};
use hvdc_ingestion::{ClassificationStats, FlowClassifier, LedgerBuilder, LocationNormalizer};
use hvdc_occupancy::{accumulate, OccupancyAccumulator};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Stage at which a per-key failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Classification,
    Occupancy,
    Billing,
}

/// A failure isolated to one SKU or one warehouse/period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub stage: Stage,
    /// Offending key (SKU id or `warehouse/period`).
    pub key: String,
    pub message: String,
}

impl RunError {
    fn new(stage: Stage, fallback_key: &str, error: &Error) -> Self {
        Self {
            stage,
            key: error.key().unwrap_or(fallback_key).to_string(),
            message: error.to_string(),
        }
    }
}

/// Inputs of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineInput {
    /// Typed movement events.
    #[serde(default)]
    pub movements: Vec<MovementEvent>,
    /// Movements with unparsed event types.
    #[serde(default)]
    pub raw_movements: Vec<RawMovement>,
    /// SKUs known from the master list, with or without movements.
    #[serde(default)]
    pub registered_skus: Vec<SkuId>,
    #[serde(default)]
    pub invoice_lines: Vec<InvoiceLine>,
    /// Computed quantities keyed by SKU (case) code.
    #[serde(default)]
    pub computed: BTreeMap<String, ComputedQuantities>,
    /// Per-SKU footprint (m²); missing SKUs use the configured default.
    #[serde(default)]
    pub unit_areas: BTreeMap<SkuId, f64>,
    /// Open storage stays close here.
    pub run_end: Timestamp,
    /// Billing periods. Defaults to every period with occupancy or invoices.
    #[serde(default)]
    pub periods: Option<Vec<Period>>,
}

impl EngineInput {
    /// Empty input ending at `run_end`.
    pub fn new(run_end: Timestamp) -> Self {
        Self {
            movements: Vec::new(),
            raw_movements: Vec::new(),
            registered_skus: Vec::new(),
            invoice_lines: Vec::new(),
            computed: BTreeMap::new(),
            unit_areas: BTreeMap::new(),
            run_end,
            periods: None,
        }
    }
}

/// Outputs of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub hub: Vec<SkuMasterRecord>,
    pub billing: Vec<BillingLineItem>,
    pub period_totals: Vec<PeriodTotal>,
    pub audits: Vec<ChargeAudit>,
    pub reconciliation: Vec<ReconciliationResult>,
    pub reconciliation_summary: ReconciliationSummary,
    pub classification: ClassificationStats,
    pub kpi: HubKpi,
    pub errors: Vec<RunError>,
}

/// Logistics engine over a validated configuration.
pub struct Engine {
    config: Config,
    locations: LocationNormalizer,
    billing: BillingEngine,
    auditor: ChargeAuditor,
}

impl Engine {
    /// Create an engine. The configuration is validated first.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let locations = LocationNormalizer::new(&config.locations);
        let billing = BillingEngine::new(&config.billing);
        let auditor = ChargeAuditor::new(&config.billing);
        Ok(Self {
            config,
            locations,
            billing,
            auditor,
        })
    }

    /// Engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every stage over one input snapshot.
    pub fn run(&self, input: EngineInput) -> Result<RunOutput> {
        let mut errors = Vec::new();

        // Ledgers
        let mut builder = LedgerBuilder::new(&self.config.locations);
        for sku_id in input.registered_skus {
            builder.register_sku(sku_id);
        }
        builder.add_events(input.movements);
        builder.add_raw_batch(input.raw_movements);
        let ledger_set = builder.build();
        errors.extend(
            ledger_set
                .rejected
                .iter()
                .map(|r| RunError::new(Stage::Ingestion, &r.sku_id, &r.error)),
        );

        // Classification
        let mut classifier = FlowClassifier::new(&self.config.locations);
        let mut classifications: Vec<FlowClassification> = Vec::with_capacity(ledger_set.ledgers.len());
        let mut classified: Vec<&SkuLedger> = Vec::with_capacity(ledger_set.ledgers.len());
        for ledger in &ledger_set.ledgers {
            match classifier.classify(ledger) {
                Ok(classification) => {
                    classifications.push(classification);
                    classified.push(ledger);
                }
                Err(error) => errors.push(RunError::new(Stage::Classification, ledger.sku_id(), &error)),
            }
        }

        // Occupancy
        let mut occupancy = OccupancyAccumulator::new();
        for ledger in classified {
            let unit_area = input
                .unit_areas
                .get(ledger.sku_id())
                .copied()
                .unwrap_or(self.config.occupancy.default_unit_area);
            match accumulate(ledger, unit_area, input.run_end, &self.locations) {
                Ok(records) => occupancy.add_records(&records),
                Err(error) => errors.push(RunError::new(Stage::Occupancy, ledger.sku_id(), &error)),
            }
        }

        // Reconciliation
        let alignment = align_combined_codes(&input.computed, &input.invoice_lines);
        let reconciliation = reconcile(
            &alignment.computed,
            &input.invoice_lines,
            self.config.reconciliation.tolerance,
        );
        let reconciliation_summary = ReconciliationSummary::from_results(&reconciliation);

        // Billing and audit
        let totals = invoice_totals(&input.invoice_lines, &self.locations);
        let periods = match input.periods {
            Some(periods) => periods,
            None => {
                let mut periods: BTreeSet<Period> = occupancy.periods().into_iter().collect();
                periods.extend(totals.keys().map(|(_, period)| *period));
                periods.into_iter().collect()
            }
        };
        let billing_run = self
            .billing
            .bill_periods(&periods, occupancy.occupancy(), &totals);
        errors.extend(
            billing_run
                .errors
                .iter()
                .map(|e| RunError::new(Stage::Billing, "", e)),
        );
        let period_totals = period_totals(&billing_run.items);
        let audits = self.auditor.audit(&billing_run.items, &totals);
        let failed_audits = audits.iter().filter(|a| !a.passed).count();
        if failed_audits > 0 {
            warn!(failed_audits, "charge audit found mismatches");
        }

        // Hub
        let by_member = alignment.expand_results(&reconciliation);
        let hub = aggregate(&classifications, occupancy.sku_summaries(), &by_member)?;
        let kpi = HubKpi::calculate(&hub);

        info!(
            skus = hub.len(),
            errors = errors.len(),
            periods = periods.len(),
            billed = billing_run.items.len(),
            pass_rate = reconciliation_summary.pass_rate,
            "run complete"
        );

        Ok(RunOutput {
            hub,
            billing: billing_run.items,
            period_totals,
            audits,
            reconciliation,
            reconciliation_summary,
            classification: classifier.stats().clone(),
            kpi,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use hvdc_core::{BillingMode, EventType, FlowCode, MatchStatus};

    fn ts(month: u32, day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap()
    }

    fn make_event(sku: &str, location: &str, at: Timestamp, event_type: EventType) -> MovementEvent {
        MovementEvent {
            sku_id: sku.to_string(),
            location: location.to_string(),
            timestamp: at,
            event_type,
        }
    }

    fn make_input() -> EngineInput {
        let mut input = EngineInput::new(ts(7, 1));
        input.movements = vec![
            make_event("HVDC-ADOPT-HE-0001", "Khalifa Port", ts(6, 1), EventType::Inbound),
            make_event("HVDC-ADOPT-HE-0001", "DSV Indoor", ts(6, 16), EventType::Inbound),
            make_event("HVDC-ADOPT-HE-0001", "DSV Indoor", ts(6, 30), EventType::Outbound),
            make_event("HVDC-ADOPT-HE-0001", "SHU", ts(7, 1), EventType::Inbound),
            make_event("HVDC-ADOPT-HE-0002", "Port", ts(6, 2), EventType::Inbound),
            make_event("HVDC-ADOPT-HE-0002", "DAS", ts(6, 5), EventType::Inbound),
        ];
        input.registered_skus = vec!["HVDC-ADOPT-HE-0003".to_string()];
        input.unit_areas = BTreeMap::from([("HVDC-ADOPT-HE-0001".to_string(), 100.0)]);
        input.computed = BTreeMap::from([(
            "HVDC-ADOPT-HE-0001".to_string(),
            ComputedQuantities {
                gross_weight: 1000.0,
                volume: 12.0,
                package_count: 2,
            },
        )]);
        input.invoice_lines = vec![InvoiceLine {
            reference_code: "hvdc-adopt-he-0001".to_string(),
            package_count: 2,
            gross_weight: 1000.1,
            volume: 12.0,
            amount: 300.0,
            warehouse: "AAA".to_string(),
            period: Some(Period::new(2024, 6).unwrap()),
        }];
        input
    }

    #[test]
    fn test_end_to_end() {
        let mut config = Config::default();
        config.billing.rates.insert("DSV Indoor".to_string(), 20.0);
        let engine = Engine::new(config).unwrap();
        let output = engine.run(make_input()).unwrap();

        assert!(output.errors.is_empty());
        assert_eq!(output.hub.len(), 3);

        let first = &output.hub[0];
        assert_eq!(first.sku_id, "HVDC-ADOPT-HE-0001");
        assert_eq!(first.flow_code, FlowCode::ViaWarehouse);
        assert_eq!(first.final_location.as_deref(), Some("SHU"));
        assert_eq!(first.sqm_cum, Some(100.0));
        assert_eq!(first.match_status, Some(MatchStatus::Pass));

        assert_eq!(output.hub[1].flow_code, FlowCode::PortToSite);
        assert_eq!(output.hub[1].final_location.as_deref(), Some("DAS"));
        assert_eq!(output.hub[2].flow_code, FlowCode::PreArrival);
        assert!(output.hub[2].final_location.is_none());

        let indoor = output
            .billing
            .iter()
            .find(|item| item.warehouse == "DSV Indoor")
            .unwrap();
        assert_eq!(indoor.mode, BillingMode::Rate);
        // 100 m² for 14 of 30 days at 20 AED.
        assert_relative_eq!(indoor.charge, 20.0 * 100.0 * 14.0 / 30.0, epsilon = 1e-9);

        let aaa = output
            .billing
            .iter()
            .find(|item| item.warehouse == "AAA Storage")
            .unwrap();
        assert_eq!(aaa.charge, 300.0);

        assert_eq!(output.period_totals.len(), 1);
        assert_eq!(output.audits.len(), 1);
        assert!(output.audits[0].passed);
        assert_eq!(output.kpi.sku_count, 3);
        assert_relative_eq!(output.kpi.flow_coverage, 0.6);
        assert_eq!(output.classification.classified(), 3);
    }

    #[test]
    fn test_bad_sku_does_not_stop_the_run() {
        let engine = Engine::new(Config::default()).unwrap();
        let mut input = make_input();
        input.movements.push(make_event("BAD-1", "Back Lot", ts(6, 3), EventType::Inbound));
        input.raw_movements.push(RawMovement {
            sku_id: "BAD-2".to_string(),
            location: "DSV Indoor".to_string(),
            timestamp: ts(6, 3),
            event_type: "teleported".to_string(),
        });
        let output = engine.run(input).unwrap();

        assert_eq!(output.hub.len(), 3);
        assert_eq!(output.errors.len(), 2);
        let stages: Vec<(Stage, &str)> = output
            .errors
            .iter()
            .map(|e| (e.stage, e.key.as_str()))
            .collect();
        assert!(stages.contains(&(Stage::Ingestion, "BAD-2")));
        assert!(stages.contains(&(Stage::Classification, "BAD-1")));
    }

    #[test]
    fn test_explicit_periods_and_serialization() {
        let engine = Engine::new(Config::default()).unwrap();
        let mut input = make_input();
        input.periods = Some(vec![Period::new(2024, 5).unwrap()]);
        let output = engine.run(input).unwrap();

        // Only the no-charge warehouse is billed in an idle month.
        assert_eq!(output.billing.len(), 1);
        assert_eq!(output.billing[0].warehouse, "MOSB");
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"match_status\":\"PASS\""));
    }

    #[test]
    fn test_combined_invoice_code_reaches_members() {
        let engine = Engine::new(Config::default()).unwrap();
        let mut input = EngineInput::new(ts(7, 1));
        input.movements = vec![
            make_event("HVDC-ADOPT-HE-0087", "DAS", ts(6, 5), EventType::Inbound),
            make_event("HVDC-ADOPT-HE-0090", "DAS", ts(6, 5), EventType::Inbound),
        ];
        let case = ComputedQuantities {
            gross_weight: 100.0,
            volume: 1.0,
            package_count: 1,
        };
        input.computed = BTreeMap::from([
            ("HVDC-ADOPT-HE-0087".to_string(), case),
            ("HVDC-ADOPT-HE-0090".to_string(), case),
        ]);
        input.invoice_lines = vec![InvoiceLine {
            reference_code: "HVDC-ADOPT-HE-0087,90".to_string(),
            package_count: 2,
            gross_weight: 200.0,
            volume: 2.0,
            amount: 0.0,
            warehouse: "DAS".to_string(),
            period: None,
        }];
        let output = engine.run(input).unwrap();

        assert_eq!(output.reconciliation.len(), 1);
        assert_eq!(output.reconciliation[0].key, "HVDC-ADOPT-HE-008790");
        assert_eq!(output.hub.len(), 2);
        for record in &output.hub {
            assert_eq!(record.match_status, Some(MatchStatus::Pass), "{}", record.sku_id);
            assert_eq!(record.err_weight, Some(0.0));
        }
        assert_eq!(output.kpi.passed, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.reconciliation.tolerance = -1.0;
        assert!(Engine::new(config).is_err());
    }
}
