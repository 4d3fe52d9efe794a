//! Progress statistics, over spreadsheet fibers and over module ports.

use serde::{Deserialize, Serialize};

use crate::models::{Fiber, FiberStats, FiberStatus, ProjectModel};
use crate::progress::overlay::MergedModel;

/// `round(configured / total * 100)`, 0 when there is nothing to count.
pub fn progress_percentage(configured: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (configured as f64 / total as f64 * 100.0).round() as u32
}

/// Total and configured counts over any collection of fibers.
pub fn count_fibers<'a, I>(fibers: I) -> (usize, usize)
where
    I: IntoIterator<Item = &'a Fiber>,
{
    fibers.into_iter().fold((0, 0), |(total, configured), fiber| {
        (total + 1, configured + usize::from(fiber.current_status.is_configured()))
    })
}

/// Summary counts for a model. Pure: the result is never stored as truth.
pub fn compute_stats(model: &ProjectModel) -> FiberStats {
    let (total_fibers, configured_fibers) = count_fibers(model.fibers.values());
    FiberStats {
        total_fibers,
        configured_fibers,
        cabinets: model.cabinets.len(),
        pbos: model.pbos.len(),
        pbis: model.pbis.len(),
        progress_percentage: progress_percentage(configured_fibers, total_fibers),
    }
}

/// Port counts for one module, one cabinet, or the whole project.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStats {
    pub total_slots: usize,
    pub configured_slots: usize,
    pub available: usize,
    pub occupied: usize,
    pub not_configured: usize,
    pub progress_percentage: u32,
}

impl SlotStats {
    fn record(&mut self, status: FiberStatus) {
        self.total_slots += 1;
        match status {
            FiberStatus::NotConfigured => self.not_configured += 1,
            FiberStatus::Available => self.available += 1,
            FiberStatus::Occupied => self.occupied += 1,
        }
        self.configured_slots = self.available + self.occupied;
        self.progress_percentage = progress_percentage(self.configured_slots, self.total_slots);
    }
}

fn collect_slots<I>(statuses: I) -> SlotStats
where
    I: IntoIterator<Item = FiberStatus>,
{
    let mut stats = SlotStats::default();
    for status in statuses {
        stats.record(status);
    }
    stats
}

pub fn module_slot_stats(
    merged: &MergedModel,
    cabinet_id: &str,
    module_id: &str,
) -> Option<SlotStats> {
    let ports = merged.module_slots(cabinet_id, module_id)?;
    Some(collect_slots(ports.values().map(|s| s.status)))
}

pub fn cabinet_slot_stats(merged: &MergedModel, cabinet_id: &str) -> Option<SlotStats> {
    let cabinet = merged.model.cabinets.get(cabinet_id)?;
    let statuses = cabinet.modules.keys().flat_map(|module_id| {
        merged
            .module_slots(cabinet_id, module_id)
            .into_iter()
            .flat_map(|ports| ports.values().map(|s| s.status))
    });
    Some(collect_slots(statuses))
}

/// Project-wide port counts; saved alongside the configuration.
pub fn slot_totals(merged: &MergedModel) -> SlotStats {
    let statuses = merged.modules().flat_map(|(cabinet_id, module_id)| {
        merged
            .module_slots(cabinet_id, module_id)
            .into_iter()
            .flat_map(|ports| ports.values().map(|s| s.status))
    });
    collect_slots(statuses)
}
