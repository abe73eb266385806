//! Core data types for the HVDC logistics engine.

use crate::error::{Error, Result};
use crate::period::Period;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp of a recorded movement (UTC).
pub type Timestamp = DateTime<Utc>;

/// Shipped unit identifier (case number).
pub type SkuId = String;

/// Kind of a recorded movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Arrival at a location.
    Inbound,
    /// Departure from a location.
    Outbound,
    /// Arrival at a location by warehouse-to-warehouse move.
    Transfer,
}

impl EventType {
    /// Parse a free-text event type (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inbound" => Some(EventType::Inbound),
            "outbound" => Some(EventType::Outbound),
            "transfer" => Some(EventType::Transfer),
            _ => None,
        }
    }

    /// Whether the event places the SKU at its location.
    #[inline]
    pub fn is_arrival(self) -> bool {
        matches!(self, EventType::Inbound | EventType::Transfer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Inbound => "inbound",
            EventType::Outbound => "outbound",
            EventType::Transfer => "transfer",
        }
    }
}

/// A single recorded movement of a SKU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEvent {
    pub sku_id: SkuId,
    /// Location name as recorded (normalized by the ledger builder).
    pub location: String,
    pub timestamp: Timestamp,
    pub event_type: EventType,
}

/// A movement as delivered by the ingestion collaborator, event type untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMovement {
    pub sku_id: SkuId,
    pub location: String,
    pub timestamp: Timestamp,
    pub event_type: String,
}

impl RawMovement {
    /// Convert to a typed event. Unrecognized event types are a validation
    /// error naming the SKU and the event.
    pub fn into_event(self) -> Result<MovementEvent> {
        let event_type = EventType::parse(&self.event_type).ok_or_else(|| {
            Error::validation(
                &self.sku_id,
                format!(
                    "unrecognized event type '{}' at {} ({})",
                    self.event_type, self.location, self.timestamp
                ),
            )
        })?;
        Ok(MovementEvent {
            sku_id: self.sku_id,
            location: self.location,
            timestamp: self.timestamp,
            event_type,
        })
    }
}

/// Time-ordered movement history of one SKU.
///
/// Events are ordered by timestamp with ties kept in ingestion order, and
/// no two consecutive events share the same (location, event type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuLedger {
    sku_id: SkuId,
    events: Vec<MovementEvent>,
}

impl SkuLedger {
    /// Build a ledger from events in ingestion order.
    ///
    /// Sorts stably by timestamp and drops consecutive repeats of the same
    /// (location, event type). Events for a different SKU are rejected.
    pub fn from_events(sku_id: impl Into<SkuId>, mut events: Vec<MovementEvent>) -> Result<Self> {
        let sku_id = sku_id.into();
        if let Some(stray) = events.iter().find(|e| e.sku_id != sku_id) {
            return Err(Error::validation(
                &sku_id,
                format!("ledger contains event for other SKU '{}'", stray.sku_id),
            ));
        }

        events.sort_by_key(|e| e.timestamp);
        events.dedup_by(|next, prev| {
            next.location == prev.location && next.event_type == prev.event_type
        });

        Ok(Self { sku_id, events })
    }

    /// An empty ledger (material not yet physically moved).
    pub fn empty(sku_id: impl Into<SkuId>) -> Self {
        Self {
            sku_id: sku_id.into(),
            events: Vec::new(),
        }
    }

    pub fn sku_id(&self) -> &str {
        &self.sku_id
    }

    pub fn events(&self) -> &[MovementEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Most recent event, if any.
    pub fn last(&self) -> Option<&MovementEvent> {
        self.events.last()
    }

    /// Timestamp of the first recorded event.
    pub fn first_seen(&self) -> Option<Timestamp> {
        self.events.first().map(|e| e.timestamp)
    }

    /// Timestamp of the last recorded event.
    pub fn last_seen(&self) -> Option<Timestamp> {
        self.events.last().map(|e| e.timestamp)
    }
}

/// Category of a physical location in the logistics chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    /// Port of entry.
    Port,
    /// Generic storage warehouse.
    Warehouse,
    /// Transshipment point (staging before offshore/onshore sites).
    Transshipment,
    /// Final installation site.
    Site,
}

impl LocationKind {
    /// Locations where a SKU occupies billable area.
    #[inline]
    pub fn is_storage(self) -> bool {
        matches!(self, LocationKind::Warehouse | LocationKind::Transshipment)
    }
}

/// Route category of a SKU, derived from the shape of its hop sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FlowCode {
    /// No movement recorded yet.
    PreArrival = 0,
    /// Port directly to site.
    PortToSite = 1,
    /// Port, one warehouse, site.
    ViaWarehouse = 2,
    /// Port, warehouse, transshipment point, site.
    ViaWarehouseAndTransshipment = 3,
    /// Two or more intermediate stops in any other arrangement.
    MultiHop = 4,
}

impl FlowCode {
    pub const ALL: [FlowCode; 5] = [
        FlowCode::PreArrival,
        FlowCode::PortToSite,
        FlowCode::ViaWarehouse,
        FlowCode::ViaWarehouseAndTransshipment,
        FlowCode::MultiHop,
    ];

    /// Numeric code (0-4).
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Human readable route.
    pub fn description(self) -> &'static str {
        match self {
            FlowCode::PreArrival => "Pre Arrival",
            FlowCode::PortToSite => "Port → Site",
            FlowCode::ViaWarehouse => "Port → WH → Site",
            FlowCode::ViaWarehouseAndTransshipment => "Port → WH → MOSB → Site",
            FlowCode::MultiHop => "Multi-hop",
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        FlowCode::ALL.get(usize::from(code)).copied()
    }
}

impl From<FlowCode> for u8 {
    fn from(code: FlowCode) -> Self {
        code.code()
    }
}

impl TryFrom<u8> for FlowCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        FlowCode::from_code(value).ok_or_else(|| Error::Other(format!("invalid flow code {value}")))
    }
}

/// Flow classification of one SKU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowClassification {
    pub sku_id: SkuId,
    pub flow_code: FlowCode,
    pub route_description: String,
    /// Location of the last recorded event (None before arrival).
    pub final_location: Option<String>,
}

/// Area one SKU attributes to one warehouse in one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyRecord {
    pub sku_id: SkuId,
    pub warehouse: String,
    pub period: Period,
    /// Full footprint of the SKU (m²), not prorated.
    pub area_occupied: f64,
    /// Whole days the stay covers inside the period (at least 1).
    pub days_occupied: u32,
    /// True when the SKU was already stored before the period began.
    pub is_cumulative: bool,
}

impl OccupancyRecord {
    /// Area-days contributed to the period.
    #[inline]
    pub fn area_days(&self) -> f64 {
        self.area_occupied * f64::from(self.days_occupied)
    }
}

/// Cumulative occupancy of one warehouse in one month, over all SKUs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseOccupancy {
    pub warehouse: String,
    pub period: Period,
    /// Sum of SKU footprints present at any time in the period (m²).
    pub area_occupied: f64,
    /// Part of `area_occupied` carried over from earlier periods.
    pub carried_area: f64,
    /// Σ area × days occupied within the period.
    pub area_days: f64,
    /// Number of SKU stays contributing.
    pub sku_count: u32,
}

impl WarehouseOccupancy {
    /// Empty occupancy for a warehouse/period.
    pub fn empty(warehouse: impl Into<String>, period: Period) -> Self {
        Self {
            warehouse: warehouse.into(),
            period,
            area_occupied: 0.0,
            carried_area: 0.0,
            area_days: 0.0,
            sku_count: 0,
        }
    }

    /// Area newly brought in during the period.
    pub fn inbound_area(&self) -> f64 {
        self.area_occupied - self.carried_area
    }

    /// Day-weighted average occupied area over the period.
    pub fn prorated_area(&self) -> f64 {
        self.area_days / f64::from(self.period.days())
    }
}

/// Per-SKU occupancy summary used by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuOccupancy {
    pub sku_id: SkuId,
    /// Warehouses the SKU occupied, in first-visit order.
    pub warehouses: Vec<String>,
    /// Number of (warehouse, period) records.
    pub periods_occupied: u32,
    /// Σ area over all records (m²·months).
    pub area_months: f64,
}

/// Quantities computed for a SKU from the movement/packing data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedQuantities {
    /// Gross weight (kg).
    pub gross_weight: f64,
    /// Volume (m³).
    pub volume: f64,
    pub package_count: u32,
}

impl ComputedQuantities {
    /// Add another record's quantities to this one.
    pub fn merge(&mut self, other: &ComputedQuantities) {
        self.gross_weight += other.gross_weight;
        self.volume += other.volume;
        self.package_count += other.package_count;
    }
}

/// One line of the externally supplied invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub reference_code: String,
    pub package_count: u32,
    /// Gross weight (kg).
    pub gross_weight: f64,
    /// Volume (m³).
    pub volume: f64,
    /// Invoiced amount (AED).
    pub amount: f64,
    pub warehouse: String,
    /// Billing month, when the invoice carries an operation date.
    #[serde(default)]
    pub period: Option<Period>,
}

/// Outcome of comparing a computed record with an invoice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Pass,
    Fail,
    Unmatched,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Pass => "PASS",
            MatchStatus::Fail => "FAIL",
            MatchStatus::Unmatched => "UNMATCHED",
        }
    }
}

/// Reconciliation result for one SKU or invoice reference code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// SKU id for computed records, reference code for unpaired invoice lines.
    pub key: String,
    pub err_weight: Option<f64>,
    pub err_volume: Option<f64>,
    /// Invoice packages minus computed packages (informational).
    pub package_delta: Option<i64>,
    pub match_status: MatchStatus,
}

/// Billing mode of a warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingMode {
    /// Contract rate × occupied area.
    Rate,
    /// Invoice amount charged verbatim.
    Passthrough,
    /// Never charged.
    NoCharge,
}

/// Monthly charge for one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingLineItem {
    pub warehouse: String,
    pub period: Period,
    pub mode: BillingMode,
    /// Cumulative occupied area (m²), informational for non-rate modes.
    pub occupied_area: f64,
    /// Day-weighted average occupied area (m²).
    pub prorated_area: f64,
    /// Contract rate (RATE), invoice total (PASSTHROUGH) or 0 (NO_CHARGE).
    pub rate_or_amount: f64,
    /// Charge (AED).
    pub charge: f64,
}

/// Total charge across warehouses for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodTotal {
    pub period: Period,
    pub charge: f64,
    pub warehouse_count: u32,
}

/// Unified per-SKU hub row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuMasterRecord {
    pub sku_id: SkuId,
    pub flow_code: FlowCode,
    pub route_description: String,
    pub final_location: Option<String>,
    /// Σ occupied area over all months (m²·months).
    pub sqm_cum: Option<f64>,
    pub warehouses: Option<Vec<String>>,
    pub periods_occupied: Option<u32>,
    pub match_status: Option<MatchStatus>,
    pub err_weight: Option<f64>,
    pub err_volume: Option<f64>,
}
