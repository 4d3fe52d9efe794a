//! Spreadsheet processing: walk rows, classify, aggregate, summarize.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::FiberResult;
use crate::extract::aggregate::{Aggregator, CollisionPolicy, FiberCollision};
use crate::extract::classify::{classify, DiscardReason};
use crate::extract::rows::RowWalker;
use crate::extract::sheet::{CellReader, Sheet};
use crate::limits::{max_scan_rows, strict_duplicates_enabled};
use crate::models::{ColumnLayout, FiberStats, ProjectModel, RawRow, FIRST_DATA_ROW};
use crate::progress::stats::compute_stats;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractOptions {
    pub layout: ColumnLayout,
    pub first_data_row: u32,
    pub max_row: u32,
    pub collision_policy: CollisionPolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            layout: ColumnLayout::default(),
            first_data_row: FIRST_DATA_ROW,
            max_row: max_scan_rows(),
            collision_policy: if strict_duplicates_enabled() {
                CollisionPolicy::KeepFirst
            } else {
                CollisionPolicy::LastWriteWins
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscardedRow {
    pub row_index: u32,
    pub reason: DiscardReason,
}

/// Everything one processing run produces.
#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub model: ProjectModel,
    pub stats: FiberStats,
    /// Usable rows exactly as read from the sheet.
    pub raw_rows: Vec<RawRow>,
    pub discarded: Vec<DiscardedRow>,
    pub collisions: Vec<FiberCollision>,
    pub rows_scanned: usize,
    pub elapsed_ms: i64,
}

/// Rebuild the whole model from a sheet.
///
/// Fails only when the sheet itself cannot be read; bad rows are skipped and
/// listed in [`Extraction::discarded`].
pub fn process_sheet<S: Sheet + ?Sized>(
    sheet: &S,
    options: &ExtractOptions,
) -> FiberResult<Extraction> {
    let started = Instant::now();
    let reader = CellReader::new(&options.layout)?;
    let walker = RowWalker::new(sheet, &reader, options.first_data_row, options.max_row)?;

    let mut aggregator = Aggregator::new(options.collision_policy);
    let mut raw_rows = Vec::new();
    let mut discarded = Vec::new();
    let mut rows_scanned = 0usize;

    for raw in walker {
        rows_scanned += 1;
        match classify(&raw) {
            Ok(parsed) => {
                aggregator.push(&parsed);
                raw_rows.push(raw);
            }
            Err(reason) => {
                debug!("Row {} discarded: {reason}", raw.row_index);
                discarded.push(DiscardedRow {
                    row_index: raw.row_index,
                    reason,
                });
            }
        }
    }

    let aggregation = aggregator.finish();
    let stats = compute_stats(&aggregation.model);
    let elapsed_ms = started.elapsed().as_millis() as i64;

    info!(
        "Processed sheet: {rows_scanned} rows scanned, {} kept, {} discarded, {} fibers, {} cabinets, {} PBOs, {} PBIs in {elapsed_ms}ms",
        raw_rows.len(),
        discarded.len(),
        stats.total_fibers,
        stats.cabinets,
        stats.pbos,
        stats.pbis,
    );

    Ok(Extraction {
        model: aggregation.model,
        stats,
        raw_rows,
        discarded,
        collisions: aggregation.collisions,
        rows_scanned,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FiberError;
    use crate::extract::sheet::MemorySheet;
    use crate::models::{FiberStatus, NOT_SET};

    fn put_row(sheet: &mut MemorySheet, row: u32, cells: &[(&str, &str)]) {
        for (column, value) in cells {
            sheet.set(&format!("{column}{row}"), *value).unwrap();
        }
    }

    fn options() -> ExtractOptions {
        ExtractOptions {
            collision_policy: CollisionPolicy::LastWriteWins,
            ..ExtractOptions::default()
        }
    }

    #[test]
    fn end_to_end_single_row() {
        let mut sheet = MemorySheet::new();
        put_row(
            &mut sheet,
            3,
            &[
                ("BP", "PBO-B2-T1-MODULE-A-99"),
                ("CC", "B2-T1-MODULE-A"),
                ("CD", "3"),
                ("K", "OK"),
                ("M", "120"),
            ],
        );

        let result = process_sheet(&sheet, &options()).unwrap();
        let model = &result.model;
        assert_eq!(model.cabinets.len(), 1);
        assert_eq!(model.cabinets["T1"].site_code, "B2");
        assert_eq!(model.cabinets["T1"].modules.len(), 1);
        assert!(model.cabinets["T1"].modules.contains_key("A"));
        assert_eq!(model.pbos.len(), 1);

        let fiber = &model.fibers["99-3"];
        assert_eq!(fiber.fiber_number, 3);
        assert_eq!(fiber.current_status, FiberStatus::NotConfigured);
        assert_eq!(fiber.legacy_status, "OK");
        assert_eq!(fiber.legacy_distance, "120");

        assert_eq!(
            result.stats,
            FiberStats {
                total_fibers: 1,
                configured_fibers: 0,
                cabinets: 1,
                pbos: 1,
                pbis: 0,
                progress_percentage: 0,
            }
        );
        assert_eq!(result.raw_rows.len(), 1);
        assert!(result.discarded.is_empty());
        assert_eq!(result.rows_scanned, 1);
    }

    #[test]
    fn stops_at_gap_in_cabinet_column() {
        let mut sheet = MemorySheet::new();
        for row in 3..8 {
            put_row(
                &mut sheet,
                row,
                &[("BP", "PBO-X-1"), ("CC", "B2-T1-MODULE-A"), ("CD", &row.to_string())],
            );
        }
        put_row(&mut sheet, 8, &[("BP", "PBO-X-1"), ("CD", "8")]);
        for row in 9..12 {
            put_row(
                &mut sheet,
                row,
                &[("BP", "PBO-X-1"), ("CC", "B2-T1-MODULE-A"), ("CD", &row.to_string())],
            );
        }

        let result = process_sheet(&sheet, &options()).unwrap();
        assert_eq!(result.rows_scanned, 5);
        assert_eq!(result.model.fibers.len(), 5);
        assert!(!result.model.fibers.contains_key("1-9"));
    }

    #[test]
    fn bad_rows_are_reported_not_fatal() {
        let mut sheet = MemorySheet::new();
        put_row(&mut sheet, 3, &[("BP", "PBO-X-1"), ("CC", "B2-T1-MODULE-A"), ("CD", "1")]);
        put_row(&mut sheet, 4, &[("BP", "XYZ-1"), ("CC", "B2-T1-MODULE-A"), ("CD", "1")]);
        put_row(&mut sheet, 5, &[("BP", "PBO-X-1"), ("CC", "B2-T1"), ("CD", "2")]);
        put_row(&mut sheet, 6, &[("BP", "PBO-X-1"), ("CC", "B2-T1-MODULE-A"), ("CD", "n/a")]);
        put_row(&mut sheet, 7, &[("CC", "B2-T1-MODULE-A"), ("CD", "3")]);

        let result = process_sheet(&sheet, &options()).unwrap();
        assert_eq!(result.rows_scanned, 5);
        assert_eq!(result.model.fibers.len(), 1);
        let reasons: Vec<(u32, DiscardReason)> = result
            .discarded
            .iter()
            .map(|d| (d.row_index, d.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (4, DiscardReason::UnrecognizedSplicePrefix),
                (5, DiscardReason::MalformedCabinetCode),
                (6, DiscardReason::NonNumericFiberNumber),
                (7, DiscardReason::MissingRequiredField),
            ]
        );
        assert_eq!(result.raw_rows[0].legacy_status, NOT_SET);
    }

    #[test]
    fn collisions_are_reported() {
        let mut sheet = MemorySheet::new();
        put_row(&mut sheet, 3, &[("BP", "PBO-X-1"), ("CC", "B2-T1-MODULE-A"), ("CD", "1")]);
        put_row(&mut sheet, 4, &[("BP", "PBO-Y-1"), ("CC", "B2-T1-MODULE-A"), ("CD", "1")]);

        let result = process_sheet(&sheet, &options()).unwrap();
        assert_eq!(result.model.fibers.len(), 1);
        assert_eq!(result.collisions.len(), 1);
        assert_eq!(result.model.fibers["1-1"].source_row_index, 4);
    }

    #[test]
    fn custom_layout_and_start_row() {
        let mut sheet = MemorySheet::new();
        put_row(&mut sheet, 2, &[("A", "BE-9"), ("B", "S1-T4-M-Z"), ("C", "2")]);
        let options = ExtractOptions {
            layout: ColumnLayout {
                splice_unit: "A".to_string(),
                cabinet_code: "B".to_string(),
                fiber_number: "C".to_string(),
                legacy_status: "D".to_string(),
                legacy_distance: "E".to_string(),
            },
            first_data_row: 2,
            ..options()
        };
        let result = process_sheet(&sheet, &options).unwrap();
        assert_eq!(result.stats.pbis, 1);
        assert!(result.model.fibers.contains_key("BE-9-2"));
    }

    #[test]
    fn invalid_layout_is_rejected() {
        let sheet = MemorySheet::new().with_cell("CC3", "x").unwrap();
        let options = ExtractOptions {
            layout: ColumnLayout {
                cabinet_code: "C3".to_string(),
                ..ColumnLayout::default()
            },
            ..options()
        };
        assert!(matches!(
            process_sheet(&sheet, &options),
            Err(FiberError::InvalidAddress(_))
        ));
    }

    #[test]
    fn empty_sheet_is_unreadable() {
        let sheet = MemorySheet::new();
        assert!(matches!(
            process_sheet(&sheet, &options()),
            Err(FiberError::SheetUnreadable(_))
        ));
    }
}
