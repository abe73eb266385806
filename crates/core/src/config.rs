//! Configuration structures for the HVDC logistics engine.

use crate::error::{Error, Result};
use crate::types::{BillingMode, LocationKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Main configuration for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Location catalog (categories and name aliases).
    #[serde(default)]
    pub locations: LocationCatalog,
    /// Billing mode and rate tables.
    #[serde(default)]
    pub billing: BillingConfig,
    /// Invoice reconciliation configuration.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Occupancy configuration.
    #[serde(default)]
    pub occupancy: OccupancyConfig,
}

impl Config {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check cross-table consistency.
    pub fn validate(&self) -> Result<()> {
        self.locations.validate()?;

        let tolerance = self.reconciliation.tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::config(format!("tolerance must be >= 0, got {tolerance}")));
        }

        let unit_area = self.occupancy.default_unit_area;
        if !unit_area.is_finite() || unit_area < 0.0 {
            return Err(Error::config(format!(
                "default_unit_area must be >= 0, got {unit_area}"
            )));
        }

        let (pass, warn) = (self.billing.rate_delta_threshold, self.billing.rate_warn_threshold);
        if !(pass >= 0.0 && warn >= pass) {
            return Err(Error::config(format!(
                "audit thresholds must satisfy 0 <= pass <= warn, got pass {pass} warn {warn}"
            )));
        }

        for (warehouse, mode) in &self.billing.modes {
            match self.locations.lookup(warehouse) {
                Some(spec) if spec.kind.is_storage() && spec.name == *warehouse => {}
                Some(spec) if spec.kind.is_storage() => {
                    return Err(Error::config(format!(
                        "billing mode for '{warehouse}' must use canonical name '{}'",
                        spec.name
                    )));
                }
                _ => {
                    return Err(Error::config(format!(
                        "billing mode configured for non-storage location '{warehouse}'"
                    )));
                }
            }

            if *mode == BillingMode::Rate {
                match self.billing.rates.get(warehouse) {
                    Some(rate) if rate.is_finite() && *rate >= 0.0 => {}
                    Some(rate) => {
                        return Err(Error::config(format!(
                            "invalid rate {rate} for '{warehouse}'"
                        )));
                    }
                    None => {
                        return Err(Error::config(format!(
                            "rate-mode warehouse '{warehouse}' has no contract rate"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// A configured physical location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSpec {
    /// Canonical name.
    pub name: String,
    /// Location category.
    pub kind: LocationKind,
    /// Alternative spellings seen in source data.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl LocationSpec {
    fn new(name: &str, kind: LocationKind, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Canonical name followed by all aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Lookup key for location names: lowercase, whitespace removed.
pub fn location_key(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Catalog of known locations and their categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationCatalog {
    pub locations: Vec<LocationSpec>,
}

impl Default for LocationCatalog {
    fn default() -> Self {
        use LocationKind::*;
        Self {
            locations: vec![
                LocationSpec::new("Khalifa Port", Port, &["Port", "Khalifa"]),
                LocationSpec::new("Mina Zayed Port", Port, &["Mina Zayed"]),
                LocationSpec::new("Jebel Ali Port", Port, &["Jebel Ali"]),
                LocationSpec::new(
                    "DSV Al Markaz",
                    Warehouse,
                    &["DSV AlMarkaz", "Al Markaz", "AlMarkaz"],
                ),
                LocationSpec::new("DSV Indoor", Warehouse, &["Indoor"]),
                LocationSpec::new("DSV Outdoor", Warehouse, &["Outdoor"]),
                LocationSpec::new("DSV MZP", Warehouse, &["MZP"]),
                LocationSpec::new("AAA Storage", Warehouse, &["AAA"]),
                LocationSpec::new("Hauler Indoor", Warehouse, &["Hauler"]),
                LocationSpec::new("DHL Warehouse", Warehouse, &["DHL"]),
                LocationSpec::new("MOSB", Transshipment, &["MOSB Storage"]),
                LocationSpec::new("SHU", Site, &[]),
                LocationSpec::new("DAS", Site, &[]),
                LocationSpec::new("MIR", Site, &[]),
                LocationSpec::new("AGI", Site, &[]),
            ],
        }
    }
}

impl LocationCatalog {
    /// Find a location by canonical name or alias (case and whitespace
    /// insensitive).
    pub fn lookup(&self, name: &str) -> Option<&LocationSpec> {
        let key = location_key(name);
        self.locations
            .iter()
            .find(|spec| spec.names().any(|n| location_key(n) == key))
    }

    /// Category of a location, if configured.
    pub fn kind_of(&self, name: &str) -> Option<LocationKind> {
        self.lookup(name).map(|spec| spec.kind)
    }

    /// Canonical names of all storage locations.
    pub fn storage_locations(&self) -> impl Iterator<Item = &str> {
        self.locations
            .iter()
            .filter(|spec| spec.kind.is_storage())
            .map(|spec| spec.name.as_str())
    }

    /// Reject aliases that resolve to more than one location.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for spec in &self.locations {
            for name in spec.names() {
                let key = location_key(name);
                if key.is_empty() {
                    return Err(Error::config(format!("empty alias for '{}'", spec.name)));
                }
                // Spelling variants of the same location collapse to one key.
                match seen.insert(key, spec.name.as_str()) {
                    Some(owner) if owner != spec.name => {
                        return Err(Error::config(format!(
                            "location name '{name}' is ambiguous between '{owner}' and '{}'",
                            spec.name
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

/// Billing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Billing mode per warehouse (canonical name).
    pub modes: BTreeMap<String, BillingMode>,
    /// Contract rate per warehouse (AED/m²/month).
    pub rates: BTreeMap<String, f64>,
    /// Maximum relative difference for a rate-mode audit PASS.
    pub rate_delta_threshold: f64,
    /// Maximum relative difference for a rate-mode audit WARN.
    pub rate_warn_threshold: f64,
    /// Maximum absolute difference (AED) for a passthrough audit PASS.
    pub passthrough_tolerance: f64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        let modes = [
            ("DSV Outdoor", BillingMode::Rate),
            ("DSV MZP", BillingMode::Rate),
            ("DSV Indoor", BillingMode::Rate),
            ("DSV Al Markaz", BillingMode::Rate),
            ("AAA Storage", BillingMode::Passthrough),
            ("Hauler Indoor", BillingMode::Passthrough),
            ("DHL Warehouse", BillingMode::Passthrough),
            ("MOSB", BillingMode::NoCharge),
        ];
        let rates = [
            ("DSV Outdoor", 18.0),
            ("DSV MZP", 33.0),
            ("DSV Indoor", 47.0),
            ("DSV Al Markaz", 47.0),
        ];

        Self {
            modes: modes
                .into_iter()
                .map(|(wh, mode)| (wh.to_string(), mode))
                .collect(),
            rates: rates
                .into_iter()
                .map(|(wh, rate)| (wh.to_string(), rate))
                .collect(),
            rate_delta_threshold: 0.02,
            rate_warn_threshold: 0.05,
            passthrough_tolerance: 0.5,
        }
    }
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Maximum absolute weight/volume difference for a PASS (inclusive).
    pub tolerance: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self { tolerance: 0.10 }
    }
}

/// Occupancy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyConfig {
    /// Footprint (m²) for SKUs without a supplied unit area.
    pub default_unit_area: f64,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            default_unit_area: 1.0,
        }
    }
}
