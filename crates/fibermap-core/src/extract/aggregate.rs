//! Fold classified rows into the cabinet / module / splice-unit / fiber model.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{
    Cabinet, Fiber, FiberStatus, Module, ParsedRow, ProjectModel, SpliceUnit, SpliceUnitKind,
};

/// What to do when two rows produce the same fiber id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// The later row replaces the earlier one.
    #[default]
    LastWriteWins,
    /// The earlier row stays; the later one is dropped.
    KeepFirst,
}

/// Two rows mapped to the same fiber id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiberCollision {
    pub fiber_id: String,
    pub existing_row: u32,
    pub incoming_row: u32,
    pub kept_row: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregation {
    pub model: ProjectModel,
    pub collisions: Vec<FiberCollision>,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    model: ProjectModel,
    policy: CollisionPolicy,
    collisions: Vec<FiberCollision>,
}

impl Aggregator {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            model: ProjectModel::default(),
            policy,
            collisions: Vec::new(),
        }
    }

    pub fn push(&mut self, row: &ParsedRow) {
        let path = &row.cabinet;
        let unit_key = &row.splice_unit;

        let cabinet = self
            .model
            .cabinets
            .entry(path.cabinet_id.clone())
            .or_insert_with(|| Cabinet {
                id: path.cabinet_id.clone(),
                site_code: path.site_code.clone(),
                modules: Default::default(),
            });
        let module = cabinet
            .modules
            .entry(path.module_id.clone())
            .or_insert_with(|| Module::new(&path.module_id));
        module.splice_unit_ids.insert(unit_key.id.clone());

        // Cabinet/module of a splice unit are fixed by the first row naming it.
        let units = match unit_key.kind {
            SpliceUnitKind::Pbo => &mut self.model.pbos,
            SpliceUnitKind::Pbi => &mut self.model.pbis,
        };
        let unit = units
            .entry(unit_key.id.clone())
            .or_insert_with(|| SpliceUnit {
                id: unit_key.id.clone(),
                kind: unit_key.kind,
                cabinet_id: path.cabinet_id.clone(),
                module_id: path.module_id.clone(),
                site_code: path.site_code.clone(),
                fibers: Default::default(),
            });

        let fiber_id = row.fiber_id();
        if let Some(existing) = self.model.fibers.get(&fiber_id) {
            let kept_row = match self.policy {
                CollisionPolicy::LastWriteWins => row.row_index,
                CollisionPolicy::KeepFirst => existing.source_row_index,
            };
            warn!(
                "Fiber {fiber_id} appears on rows {} and {}; keeping row {kept_row}",
                existing.source_row_index, row.row_index
            );
            self.collisions.push(FiberCollision {
                fiber_id: fiber_id.clone(),
                existing_row: existing.source_row_index,
                incoming_row: row.row_index,
                kept_row,
            });
            if self.policy == CollisionPolicy::KeepFirst {
                return;
            }
        }

        unit.fibers.insert(row.fiber_number, fiber_id.clone());
        self.model.fibers.insert(
            fiber_id.clone(),
            Fiber {
                id: fiber_id,
                splice_unit_id: unit_key.id.clone(),
                fiber_number: row.fiber_number,
                cabinet_id: path.cabinet_id.clone(),
                module_id: path.module_id.clone(),
                legacy_status: row.legacy_status.clone(),
                legacy_distance: row.legacy_distance.clone(),
                current_status: FiberStatus::NotConfigured,
                current_distance: None,
                source_row_index: row.row_index,
            },
        );
    }

    pub fn finish(self) -> Aggregation {
        Aggregation {
            model: self.model,
            collisions: self.collisions,
        }
    }
}

/// Build a model from rows in order; duplicate fiber ids keep the last row.
pub fn aggregate<'a, I>(rows: I) -> ProjectModel
where
    I: IntoIterator<Item = &'a ParsedRow>,
{
    aggregate_with(rows, CollisionPolicy::LastWriteWins).model
}

pub fn aggregate_with<'a, I>(rows: I, policy: CollisionPolicy) -> Aggregation
where
    I: IntoIterator<Item = &'a ParsedRow>,
{
    let mut aggregator = Aggregator::new(policy);
    for row in rows {
        aggregator.push(row);
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::classify::classify;
    use crate::models::RawRow;

    fn parsed(row: u32, bp: &str, cc: &str, cd: &str) -> ParsedRow {
        classify(&RawRow {
            row_index: row,
            splice_unit_raw: bp.to_string(),
            cabinet_code: cc.to_string(),
            fiber_number_raw: cd.to_string(),
            legacy_status: "OK".to_string(),
            legacy_distance: format!("{row}0"),
        })
        .unwrap()
    }

    fn sample_rows() -> Vec<ParsedRow> {
        vec![
            parsed(3, "PBO-B2-T1-MODULE-A-99", "B2-T1-MODULE-A", "1"),
            parsed(4, "PBO-B2-T1-MODULE-A-99", "B2-T1-MODULE-A", "2"),
            parsed(5, "BE-B2-T1-42", "B2-T1-MODULE-B", "1"),
            parsed(6, "PBO-B3-T2-MODULE-A-7", "B3-T2-MODULE-A", "5"),
        ]
    }

    #[test]
    fn single_row_builds_full_hierarchy() {
        let rows = vec![parsed(3, "PBO-B2-T1-MODULE-A-99", "B2-T1-MODULE-A", "3")];
        let model = aggregate(&rows);

        assert_eq!(model.cabinets.len(), 1);
        let cabinet = &model.cabinets["T1"];
        assert_eq!(cabinet.site_code, "B2");
        let module = &cabinet.modules["A"];
        assert!(module.splice_unit_ids.contains("99"));
        assert_eq!(model.pbos["99"].fibers[&3], "99-3");
        assert!(model.pbis.is_empty());

        let fiber = &model.fibers["99-3"];
        assert_eq!(fiber.fiber_number, 3);
        assert_eq!(fiber.current_status, FiberStatus::NotConfigured);
        assert_eq!(fiber.current_distance, None);
        assert_eq!(fiber.source_row_index, 3);
    }

    #[test]
    fn kinds_live_in_separate_collections() {
        let model = aggregate(&sample_rows());
        assert_eq!(model.pbos.len(), 2);
        assert_eq!(model.pbis.len(), 1);
        assert_eq!(model.pbis["BE-B2-T1-42"].kind, SpliceUnitKind::Pbi);
        assert_eq!(model.cabinets["T1"].modules.len(), 2);
        assert_eq!(model.fibers.len(), 4);
    }

    #[test]
    fn splice_unit_membership_is_unique() {
        let model = aggregate(&sample_rows());
        let module = &model.cabinets["T1"].modules["A"];
        assert_eq!(module.splice_unit_ids.len(), 1);
        assert_eq!(model.pbos["99"].fibers.len(), 2);
    }

    #[test]
    fn first_row_fixes_cabinet_attributes() {
        let rows = vec![
            parsed(3, "PBO-X-1", "B2-T1-MODULE-A", "1"),
            parsed(4, "PBO-X-1", "B9-T1-MODULE-A", "2"),
        ];
        let model = aggregate(&rows);
        assert_eq!(model.cabinets["T1"].site_code, "B2");
        assert_eq!(model.pbos["1"].site_code, "B2");
    }

    #[test]
    fn aggregation_is_idempotent() {
        let rows = sample_rows();
        let first = serde_json::to_string(&aggregate(&rows)).unwrap();
        let second = serde_json::to_string(&aggregate(&rows)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn structure_is_order_independent() {
        let rows = sample_rows();
        let mut reversed = rows.clone();
        reversed.reverse();
        let a = aggregate(&rows);
        let b = aggregate(&reversed);

        let mut cab_a: Vec<_> = a.cabinets.keys().cloned().collect();
        let mut cab_b: Vec<_> = b.cabinets.keys().cloned().collect();
        cab_a.sort();
        cab_b.sort();
        assert_eq!(cab_a, cab_b);
        for (id, cabinet) in &a.cabinets {
            let other = &b.cabinets[id];
            for (module_id, module) in &cabinet.modules {
                let mut x: Vec<_> = module.splice_unit_ids.iter().cloned().collect();
                let mut y: Vec<_> = other.modules[module_id].splice_unit_ids.iter().cloned().collect();
                x.sort();
                y.sort();
                assert_eq!(x, y);
            }
        }
        let mut fibers_a: Vec<_> = a.fibers.keys().cloned().collect();
        let mut fibers_b: Vec<_> = b.fibers.keys().cloned().collect();
        fibers_a.sort();
        fibers_b.sort();
        assert_eq!(fibers_a, fibers_b);
    }

    #[test]
    fn duplicate_fiber_last_row_wins() {
        let rows = vec![
            parsed(3, "PBO-X-1", "B2-T1-MODULE-A", "4"),
            parsed(9, "PBO-Y-1", "B2-T1-MODULE-A", "4"),
        ];
        let result = aggregate_with(&rows, CollisionPolicy::LastWriteWins);
        assert_eq!(result.model.fibers.len(), 1);
        assert_eq!(result.model.fibers["1-4"].source_row_index, 9);
        assert_eq!(result.model.fibers["1-4"].legacy_distance, "90");
        assert_eq!(
            result.collisions,
            vec![FiberCollision {
                fiber_id: "1-4".to_string(),
                existing_row: 3,
                incoming_row: 9,
                kept_row: 9,
            }]
        );
    }

    #[test]
    fn duplicate_fiber_keep_first() {
        let rows = vec![
            parsed(3, "PBO-X-1", "B2-T1-MODULE-A", "4"),
            parsed(9, "PBO-Y-1", "B2-T1-MODULE-A", "4"),
        ];
        let result = aggregate_with(&rows, CollisionPolicy::KeepFirst);
        assert_eq!(result.model.fibers["1-4"].source_row_index, 3);
        assert_eq!(result.collisions.len(), 1);
        assert_eq!(result.collisions[0].kept_row, 3);
    }

    #[test]
    fn empty_input_gives_empty_model() {
        let model = aggregate(&Vec::<ParsedRow>::new());
        assert!(model.is_empty());
    }
}
