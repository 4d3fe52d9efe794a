//! Persisted project document.
//!
//! Field names follow the stored JSON (`excelFile`, `rawData`, `tiroir_cfg`,
//! ...). Fields the core does not own are kept in [`ProjectDocument::extra`]
//! and written back untouched.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::errors::{FiberError, FiberResult};
use crate::models::{ProjectModel, RawRow};
use crate::progress::overlay::{
    extract_overlay, merge_overlay, ConfigShape, SavedConfig, SlotSetting,
};

/// Key under [`ProjectDocument::extra`] holding per-cabinet photo lists
/// carried over from the wrapped configuration shape.
pub const PHOTOS_KEY: &str = "tiroirPhotos";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Draft,
    ExcelUploaded,
    ExcelProcessed,
    InProgress,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::ExcelUploaded => "excel-uploaded",
            ProjectStatus::ExcelProcessed => "excel-processed",
            ProjectStatus::InProgress => "in-progress",
            ProjectStatus::Completed => "completed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ProjectStatus::Draft => "Draft",
            ProjectStatus::ExcelUploaded => "File Uploaded",
            ProjectStatus::ExcelProcessed => "Data Processed",
            ProjectStatus::InProgress => "In Progress",
            ProjectStatus::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The spreadsheet attached to a project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcelFileInfo {
    pub original_name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Where a technician left off, plus the counts shown on the dashboard.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgress {
    #[serde(default)]
    pub total_fibers: usize,
    #[serde(default)]
    pub configured_fibers: usize,
    #[serde(default)]
    pub current_tiroir: Option<String>,
    #[serde(default)]
    pub current_module: Option<String>,
    #[serde(default, rename = "currentPBO", alias = "currentPbo")]
    pub current_pbo: Option<String>,
}

/// Input for a new project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub excel_file: Option<ExcelFileInfo>,
    #[serde(default)]
    pub data: ProjectModel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_data: Vec<RawRow>,
    #[serde(default)]
    pub progress: ProjectProgress,
    /// Saved port configuration, in whichever shape it was written.
    #[serde(
        default,
        rename = "tiroir_cfg",
        alias = "tiroirCfg",
        skip_serializing_if = "Value::is_null"
    )]
    pub tiroir_cfg: Value,
    /// Fibers whose setting differs from their port's, by fiber id.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fiber_overrides: IndexMap<String, SlotSetting>,
    #[serde(default)]
    pub configured_fibers: usize,
    #[serde(default)]
    pub total_fibers: usize,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectDocument {
    /// A fresh draft project with a random id. The name must not be blank.
    pub fn create(input: NewProject, now: DateTime<Utc>) -> FiberResult<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(FiberError::InvalidProject(
                "project name is required".to_string(),
            ));
        }
        let reference = input
            .reference
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("PROJ-{}", now.timestamp_millis()));
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            reference,
            description: input.description.unwrap_or_default(),
            created_at: Some(now),
            updated_at: Some(now),
            ..Self::default()
        })
    }

    pub fn from_json(json: &str) -> FiberResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> FiberResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn has_workbook(&self) -> bool {
        self.excel_file.is_some()
    }

    /// Move non-empty photo lists found in a wrapped `tiroir_cfg` under
    /// [`PHOTOS_KEY`]. Returns the number of cabinets carried.
    pub fn carry_photos(&mut self) -> usize {
        let Some(cabinets) = self.tiroir_cfg.as_object() else {
            return 0;
        };
        let photos: Map<String, Value> = cabinets
            .iter()
            .filter_map(|(cabinet_id, entry)| {
                let photos = entry.get("photos")?;
                let non_empty = photos.as_array().is_some_and(|list| !list.is_empty());
                non_empty.then(|| (cabinet_id.clone(), photos.clone()))
            })
            .collect();
        let carried = photos.len();
        if carried == 0 {
            return 0;
        }
        match self.extra.get_mut(PHOTOS_KEY).and_then(Value::as_object_mut) {
            Some(existing) => existing.extend(photos),
            None => {
                if self.extra.contains_key(PHOTOS_KEY) {
                    warn!("Replacing non-object {PHOTOS_KEY} on project {}", self.id);
                }
                self.extra.insert(PHOTOS_KEY.to_string(), Value::Object(photos));
            }
        }
        carried
    }

    /// Rewrite a flat or wrapped `tiroir_cfg` in the nested shape, resolved
    /// against the stored model. Documents without a model, or already in
    /// the nested shape, are left alone and `false` is returned.
    pub fn canonicalize_configuration(&mut self) -> FiberResult<bool> {
        if self.data.is_empty() || !ConfigShape::detect(&self.tiroir_cfg)?.is_legacy() {
            return Ok(false);
        }
        let saved = SavedConfig::from_value(&self.tiroir_cfg)?;
        self.carry_photos();
        let mut merged = merge_overlay(self.data.clone(), &saved);
        merged.apply_fiber_overrides(&self.fiber_overrides);
        self.tiroir_cfg = serde_json::to_value(extract_overlay(&merged))?;
        self.fiber_overrides = merged.fiber_overrides();
        Ok(true)
    }
}
