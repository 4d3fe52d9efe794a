//! Project lifecycle over a [`ProjectStore`]: create, attach a spreadsheet,
//! process it, configure ports, save.

use std::path::Path;

use chrono::Utc;
use tracing::info;

use crate::errors::{FiberError, FiberResult};
use crate::extract::pipeline::{process_sheet, ExtractOptions, Extraction};
use crate::extract::sheet::{load_first_sheet, Sheet};
use crate::models::FiberStats;
use crate::progress::overlay::{merge_overlay, SavedConfig};
use crate::progress::session::ConfigSession;
use crate::progress::stats::compute_stats;
use crate::store::database::ProjectStore;
use crate::store::document::{
    ExcelFileInfo, NewProject, ProjectDocument, ProjectProgress, ProjectStatus,
};

pub fn require_project<St: ProjectStore + ?Sized>(
    store: &St,
    id: &str,
) -> FiberResult<ProjectDocument> {
    store
        .get(id)?
        .ok_or_else(|| FiberError::ProjectNotFound(id.to_string()))
}

pub fn create_project<St: ProjectStore + ?Sized>(
    store: &St,
    input: NewProject,
) -> FiberResult<ProjectDocument> {
    let doc = ProjectDocument::create(input, Utc::now())?;
    store.create(&doc)?;
    info!("Created project {} ({})", doc.name, doc.id);
    Ok(doc)
}

/// Record the spreadsheet file for a project. The file itself is not read.
pub fn attach_workbook<St: ProjectStore + ?Sized>(
    store: &St,
    id: &str,
    path: &Path,
) -> FiberResult<ProjectDocument> {
    let mut doc = require_project(store, id)?;
    let metadata = std::fs::metadata(path)?;
    let original_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let now = Utc::now();
    doc.excel_file = Some(ExcelFileInfo {
        original_name,
        path: path.to_string_lossy().into_owned(),
        size: metadata.len(),
        uploaded_at: now,
    });
    doc.status = ProjectStatus::ExcelUploaded;
    doc.updated_at = Some(now);
    store.put(&doc)?;
    Ok(doc)
}

/// Forget the attached spreadsheet and return the project to draft. The
/// file is removed from disk when it still exists.
pub fn detach_workbook<St: ProjectStore + ?Sized>(
    store: &St,
    id: &str,
) -> FiberResult<ProjectDocument> {
    let mut doc = require_project(store, id)?;
    let Some(file) = doc.excel_file.take() else {
        return Ok(doc);
    };
    match std::fs::remove_file(&file.path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    doc.status = ProjectStatus::Draft;
    doc.updated_at = Some(Utc::now());
    store.put(&doc)?;
    Ok(doc)
}

/// Rebuild a project's model from `sheet` and store it.
///
/// The saved port configuration is left alone; it is merged back on the
/// next [`load_session`].
pub fn process_project<St, S>(
    store: &St,
    id: &str,
    sheet: &S,
    options: &ExtractOptions,
) -> FiberResult<Extraction>
where
    St: ProjectStore + ?Sized,
    S: Sheet + ?Sized,
{
    let mut doc = require_project(store, id)?;
    if !doc.has_workbook() {
        return Err(FiberError::MissingWorkbook(id.to_string()));
    }
    let extraction = process_sheet(sheet, options)?;

    doc.data = extraction.model.clone();
    doc.raw_data = extraction.raw_rows.clone();
    doc.progress = ProjectProgress {
        total_fibers: extraction.stats.total_fibers,
        ..ProjectProgress::default()
    };
    doc.status = ProjectStatus::ExcelProcessed;
    doc.updated_at = Some(Utc::now());
    store.put(&doc)?;

    info!(
        "Processed project {}: {} fibers, {} cabinets, {} PBOs, {} PBIs",
        doc.name,
        extraction.stats.total_fibers,
        extraction.stats.cabinets,
        extraction.stats.pbos,
        extraction.stats.pbis
    );
    Ok(extraction)
}

/// [`process_project`] on the first worksheet of the attached file.
pub fn process_project_file<St: ProjectStore + ?Sized>(
    store: &St,
    id: &str,
    options: &ExtractOptions,
) -> FiberResult<Extraction> {
    let doc = require_project(store, id)?;
    let file = doc
        .excel_file
        .as_ref()
        .ok_or_else(|| FiberError::MissingWorkbook(id.to_string()))?;
    let range = load_first_sheet(Path::new(&file.path))?;
    process_project(store, id, &range, options)
}

/// Open a configuration session with the saved configuration merged onto
/// the stored model.
pub fn load_session<St: ProjectStore + ?Sized>(
    store: &St,
    id: &str,
) -> FiberResult<ConfigSession> {
    let doc = require_project(store, id)?;
    let saved = SavedConfig::from_value(&doc.tiroir_cfg)?;
    let mut merged = merge_overlay(doc.data, &saved);
    merged.apply_fiber_overrides(&doc.fiber_overrides);
    Ok(ConfigSession::new(merged))
}

/// Persist the session's configuration in the canonical shape.
pub fn save_configuration<St: ProjectStore + ?Sized>(
    store: &St,
    id: &str,
    session: &ConfigSession,
) -> FiberResult<ProjectDocument> {
    let mut doc = require_project(store, id)?;
    doc.carry_photos();

    let totals = session.slot_totals();
    doc.tiroir_cfg = serde_json::to_value(session.overlay())?;
    doc.fiber_overrides = session.fiber_overrides();
    doc.configured_fibers = totals.configured_slots;
    doc.total_fibers = totals.total_slots;
    doc.progress.configured_fibers = session.stats().configured_fibers;
    if let Some((cabinet_id, module_id)) = session.active_module() {
        doc.progress.current_tiroir = Some(cabinet_id.to_string());
        doc.progress.current_module = Some(module_id.to_string());
    }
    doc.status = if totals.configured_slots > 0 {
        ProjectStatus::InProgress
    } else {
        ProjectStatus::ExcelProcessed
    };
    doc.updated_at = Some(Utc::now());
    store.put(&doc)?;

    info!(
        "Saved configuration for project {}: {}/{} ports configured",
        doc.name, totals.configured_slots, totals.total_slots
    );
    Ok(doc)
}

/// Stats recomputed from the stored model and saved configuration.
pub fn project_stats<St: ProjectStore + ?Sized>(store: &St, id: &str) -> FiberResult<FiberStats> {
    let session = load_session(store, id)?;
    Ok(compute_stats(&session.merged().model))
}
