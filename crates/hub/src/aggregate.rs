//! SKU master hub: one row per classified SKU.

use hvdc_core::{
    Error, FlowClassification, ReconciliationResult, Result, SkuId, SkuMasterRecord, SkuOccupancy,
};
use hvdc_ingestion::normalize_code;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Join classifications with occupancy and reconciliation.
///
/// Left-outer join on SKU id preserving classification order. Occupancy and
/// reconciliation fields are `None` when the SKU has no such record.
/// Reconciliation keys match on the normalized SKU code; the first result of
/// a repeated key wins. A SKU classified twice aborts the aggregation.
pub fn aggregate(
    classifications: &[FlowClassification],
    occupancy_by_sku: &BTreeMap<SkuId, SkuOccupancy>,
    reconciliation: &[ReconciliationResult],
) -> Result<Vec<SkuMasterRecord>> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(classifications.len());
    for classification in classifications {
        if !seen.insert(classification.sku_id.as_str()) {
            return Err(Error::validation(
                &classification.sku_id,
                "duplicate SKU in hub input",
            ));
        }
    }

    let mut by_key: HashMap<&str, &ReconciliationResult> = HashMap::with_capacity(reconciliation.len());
    for result in reconciliation {
        if by_key.contains_key(result.key.as_str()) {
            warn!(key = %result.key, "repeated reconciliation key, keeping first");
            continue;
        }
        by_key.insert(result.key.as_str(), result);
    }

    let records: Vec<SkuMasterRecord> = classifications
        .iter()
        .map(|classification| {
            let occupancy = occupancy_by_sku.get(&classification.sku_id);
            let matched = by_key.get(normalize_code(&classification.sku_id).as_str()).copied();
            SkuMasterRecord {
                sku_id: classification.sku_id.clone(),
                flow_code: classification.flow_code,
                route_description: classification.route_description.clone(),
                final_location: classification.final_location.clone(),
                sqm_cum: occupancy.map(|o| o.area_months),
                warehouses: occupancy.map(|o| o.warehouses.clone()),
                periods_occupied: occupancy.map(|o| o.periods_occupied),
                match_status: matched.map(|r| r.match_status),
                err_weight: matched.and_then(|r| r.err_weight),
                err_volume: matched.and_then(|r| r.err_volume),
            }
        })
        .collect();

    debug!(
        records = records.len(),
        with_occupancy = records.iter().filter(|r| r.sqm_cum.is_some()).count(),
        with_match = records.iter().filter(|r| r.match_status.is_some()).count(),
        "hub aggregated"
    );
    Ok(records)
}
