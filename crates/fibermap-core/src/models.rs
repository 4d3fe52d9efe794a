//! Shared typed models used across extraction, progress tracking, and storage.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Domain constants
// ---------------------------------------------------------------------------

/// Every module exposes exactly this many fiber ports, whatever the
/// spreadsheet lists.
pub const FIBER_SLOTS_PER_MODULE: u32 = 24;

/// First spreadsheet row (1-based) holding data; rows 1-2 are headers.
pub const FIRST_DATA_ROW: u32 = 3;

/// Value substituted for any missing cell.
pub const NOT_SET: &str = "NOT_SET";

pub const SPLICE_UNIT_COLUMN: &str = "BP";
pub const CABINET_CODE_COLUMN: &str = "CC";
pub const FIBER_NUMBER_COLUMN: &str = "CD";
pub const LEGACY_STATUS_COLUMN: &str = "K";
pub const LEGACY_DISTANCE_COLUMN: &str = "M";

pub const PBO_PREFIX: &str = "PBO-";
pub const PBI_PREFIX: &str = "BE-";

/// Build the global fiber identifier `{spliceUnitId}-{fiberNumber}`.
pub fn fiber_id(splice_unit_id: &str, fiber_number: u32) -> String {
    format!("{splice_unit_id}-{fiber_number}")
}

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

/// Column letters the cell reader pulls for each row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLayout {
    pub splice_unit: String,
    pub cabinet_code: String,
    pub fiber_number: String,
    pub legacy_status: String,
    pub legacy_distance: String,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            splice_unit: SPLICE_UNIT_COLUMN.to_string(),
            cabinet_code: CABINET_CODE_COLUMN.to_string(),
            fiber_number: FIBER_NUMBER_COLUMN.to_string(),
            legacy_status: LEGACY_STATUS_COLUMN.to_string(),
            legacy_distance: LEGACY_DISTANCE_COLUMN.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Row-level records
// ---------------------------------------------------------------------------

/// One spreadsheet row as read from the sheet. Missing cells hold [`NOT_SET`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    pub row_index: u32,
    pub splice_unit_raw: String,
    pub cabinet_code: String,
    pub fiber_number_raw: String,
    pub legacy_status: String,
    pub legacy_distance: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpliceUnitKind {
    #[serde(rename = "PBO")]
    Pbo,
    #[serde(rename = "PBI")]
    Pbi,
}

impl SpliceUnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SpliceUnitKind::Pbo => "PBO",
            SpliceUnitKind::Pbi => "PBI",
        }
    }
}

impl std::fmt::Display for SpliceUnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpliceUnitKey {
    pub id: String,
    pub kind: SpliceUnitKind,
}

/// Site / cabinet / module triple decoded from a cabinet code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CabinetPath {
    pub site_code: String,
    pub cabinet_id: String,
    pub module_id: String,
}

/// A usable row with every identifier decoded, ready for aggregation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRow {
    pub row_index: u32,
    pub splice_unit: SpliceUnitKey,
    pub cabinet: CabinetPath,
    pub fiber_number: u32,
    pub legacy_status: String,
    pub legacy_distance: String,
}

impl ParsedRow {
    pub fn fiber_id(&self) -> String {
        fiber_id(&self.splice_unit.id, self.fiber_number)
    }
}

// ---------------------------------------------------------------------------
// Hierarchical model
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FiberStatus {
    #[default]
    NotConfigured,
    Available,
    Occupied,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fiber {
    pub id: String,
    pub splice_unit_id: String,
    pub fiber_number: u32,
    pub cabinet_id: String,
    pub module_id: String,
    pub legacy_status: String,
    pub legacy_distance: String,
    #[serde(default)]
    pub current_status: FiberStatus,
    #[serde(default)]
    pub current_distance: Option<f64>,
    pub source_row_index: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpliceUnit {
    pub id: String,
    pub kind: SpliceUnitKind,
    pub cabinet_id: String,
    pub module_id: String,
    pub site_code: String,
    /// Fiber number -> fiber id in [`ProjectModel::fibers`].
    #[serde(default, deserialize_with = "numbered_keys")]
    pub fibers: IndexMap<u32, String>,
}

/// Integer map keys arrive as strings once the model sits inside a
/// flattened document, so parse them explicitly.
fn numbered_keys<'de, D>(deserializer: D) -> Result<IndexMap<u32, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = IndexMap::<String, String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            key.trim()
                .parse::<u32>()
                .map(|n| (n, value))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    #[serde(default)]
    pub splice_unit_ids: IndexSet<String>,
    #[serde(default = "default_slot_count")]
    pub fiber_slot_count: u32,
}

fn default_slot_count() -> u32 {
    FIBER_SLOTS_PER_MODULE
}

impl Module {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            splice_unit_ids: IndexSet::new(),
            fiber_slot_count: FIBER_SLOTS_PER_MODULE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cabinet {
    pub id: String,
    pub site_code: String,
    #[serde(default)]
    pub modules: IndexMap<String, Module>,
}

/// The full extracted project: cabinets, both splice-unit collections, and
/// the flat fiber index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectModel {
    #[serde(default, alias = "tiroirs")]
    pub cabinets: IndexMap<String, Cabinet>,
    #[serde(default)]
    pub pbos: IndexMap<String, SpliceUnit>,
    #[serde(default)]
    pub pbis: IndexMap<String, SpliceUnit>,
    #[serde(default)]
    pub fibers: IndexMap<String, Fiber>,
}

impl ProjectModel {
    pub fn is_empty(&self) -> bool {
        self.cabinets.is_empty() && self.fibers.is_empty()
    }

    pub fn splice_units(&self, kind: SpliceUnitKind) -> &IndexMap<String, SpliceUnit> {
        match kind {
            SpliceUnitKind::Pbo => &self.pbos,
            SpliceUnitKind::Pbi => &self.pbis,
        }
    }

    pub fn splice_units_mut(&mut self, kind: SpliceUnitKind) -> &mut IndexMap<String, SpliceUnit> {
        match kind {
            SpliceUnitKind::Pbo => &mut self.pbos,
            SpliceUnitKind::Pbi => &mut self.pbis,
        }
    }

    pub fn module(&self, cabinet_id: &str, module_id: &str) -> Option<&Module> {
        self.cabinets.get(cabinet_id)?.modules.get(module_id)
    }

    /// Number of modules across every cabinet.
    pub fn module_count(&self) -> usize {
        self.cabinets.values().map(|c| c.modules.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Flat summary handed back to callers after processing and on refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiberStats {
    pub total_fibers: usize,
    pub configured_fibers: usize,
    pub cabinets: usize,
    pub pbos: usize,
    pub pbis: usize,
    pub progress_percentage: u32,
}
