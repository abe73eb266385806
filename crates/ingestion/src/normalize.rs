//! Location name and reference code normalization.
//!
//! Source spreadsheets spell warehouses inconsistently ("DSVAlMarkaz",
//! "Al Markaz") and invoices write several case numbers in one cell
//! ("HVDC-ADOPT-HE-0087,90"). Everything downstream keys on the normalized
//! forms produced here.

use hvdc_core::config::{location_key, LocationCatalog};
use hvdc_core::LocationKind;
use std::collections::{BTreeSet, HashMap};

/// Resolved location: canonical name and category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub name: String,
    pub kind: LocationKind,
}

/// Resolves location spellings against a catalog.
#[derive(Debug, Clone)]
pub struct LocationNormalizer {
    /// location_key(alias) -> resolved location.
    by_key: HashMap<String, ResolvedLocation>,
}

impl LocationNormalizer {
    /// Build a normalizer from a location catalog.
    pub fn new(catalog: &LocationCatalog) -> Self {
        let mut by_key = HashMap::new();
        for spec in &catalog.locations {
            let resolved = ResolvedLocation {
                name: spec.name.clone(),
                kind: spec.kind,
            };
            for name in spec.names() {
                by_key.entry(location_key(name)).or_insert_with(|| resolved.clone());
            }
        }
        Self { by_key }
    }

    /// Resolve a location spelling, if configured.
    pub fn resolve(&self, name: &str) -> Option<&ResolvedLocation> {
        self.by_key.get(&location_key(name))
    }

    /// Category of a location, if configured.
    pub fn kind(&self, name: &str) -> Option<LocationKind> {
        self.resolve(name).map(|r| r.kind)
    }

    /// Canonical name for a spelling. Unknown names pass through trimmed.
    pub fn canonical(&self, name: &str) -> String {
        match self.resolve(name) {
            Some(resolved) => resolved.name.clone(),
            None => name.trim().to_string(),
        }
    }
}

/// Normalize a reference code: trim, uppercase, keep only word characters
/// and hyphens, collapse repeated hyphens.
pub fn normalize_code(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    for c in code.trim().chars() {
        let c = c.to_ascii_uppercase();
        if c == '-' {
            if !out.ends_with('-') {
                out.push('-');
            }
        } else if c.is_alphanumeric() || c == '_' {
            out.push(c);
        }
    }
    out
}

fn pad4(digits: &str) -> String {
    match digits.parse::<u32>() {
        Ok(n) => format!("{n:04}"),
        Err(_) => digits.to_string(),
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Expand combined code shorthand into full codes.
///
/// The first comma-separated token is a full code; later tokens replace its
/// numeric segment (`0087,90`) or its numeric segment and sub-identifier
/// (`0325-1, 0325-2`). Numbers are padded to four digits.
pub fn expand_combined_codes(code: &str) -> BTreeSet<String> {
    let mut expanded = BTreeSet::new();
    let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    let mut tokens = compact.split(',').filter(|t| !t.is_empty());

    let Some(base) = tokens.next() else {
        return expanded;
    };
    let base = normalize_code(base);
    expanded.insert(base.clone());

    let segments: Vec<&str> = base.split('-').collect();
    let number_at = segments.iter().position(|s| is_digits(s));

    for token in tokens {
        let token = normalize_code(token);
        let full = match number_at {
            Some(idx) => {
                let prefix = segments[..idx].join("-");
                let base_sub = &segments[idx + 1..];
                match token.split_once('-') {
                    Some((num, sub)) if is_digits(num) => {
                        format!("{prefix}-{}-{sub}", pad4(num))
                    }
                    None if is_digits(&token) => {
                        if base_sub.is_empty() {
                            format!("{prefix}-{}", pad4(&token))
                        } else {
                            format!("{prefix}-{}-{}", pad4(&token), base_sub.join("-"))
                        }
                    }
                    _ => token.clone(),
                }
            }
            None => token.clone(),
        };
        if !full.is_empty() {
            expanded.insert(full);
        }
    }

    expanded
}
