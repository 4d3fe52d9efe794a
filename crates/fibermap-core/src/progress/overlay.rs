//! Saved per-slot configuration and its merge onto a freshly extracted model.
//!
//! The canonical saved shape is nested: cabinet id -> module id -> slot
//! number (1..=24) -> setting. Two older shapes are still readable:
//!
//! - a flat map keyed by fiber id (`"99-3"`) or by `"{cabinet}-{module}-{slot}"`;
//! - the nested shape wrapped as `{cabinet: {photos, modules: {module: {fibers: {slot: status}}}}}`.
//!
//! Slot values may be a bare status string or `{status, distance}`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::{FiberError, FiberResult};
use crate::models::{FiberStatus, ProjectModel, FIBER_SLOTS_PER_MODULE};

// ---------------------------------------------------------------------------
// Saved shapes
// ---------------------------------------------------------------------------

/// Status and optional measured distance of one module port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "SettingRepr")]
pub struct SlotSetting {
    pub status: FiberStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl SlotSetting {
    pub fn with_status(status: FiberStatus) -> Self {
        Self {
            status,
            distance: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SettingRepr {
    Bare(FiberStatus),
    Full {
        status: FiberStatus,
        #[serde(default)]
        distance: Option<f64>,
    },
}

impl From<SettingRepr> for SlotSetting {
    fn from(repr: SettingRepr) -> Self {
        match repr {
            SettingRepr::Bare(status) => SlotSetting::with_status(status),
            SettingRepr::Full { status, distance } => SlotSetting { status, distance },
        }
    }
}

pub type ModuleSlots = IndexMap<u32, SlotSetting>;

/// Canonical saved configuration: cabinet -> module -> slot -> setting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestedConfig(pub IndexMap<String, IndexMap<String, ModuleSlots>>);

impl NestedConfig {
    pub fn get(&self, cabinet_id: &str, module_id: &str, slot: u32) -> Option<&SlotSetting> {
        self.0.get(cabinet_id)?.get(module_id)?.get(&slot)
    }

    pub fn module(&self, cabinet_id: &str, module_id: &str) -> Option<&ModuleSlots> {
        self.0.get(cabinet_id)?.get(module_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Deserialize)]
struct WrappedCabinet {
    #[serde(default)]
    modules: IndexMap<String, WrappedModule>,
}

#[derive(Deserialize)]
struct WrappedModule {
    #[serde(default)]
    fibers: ModuleSlots,
}

/// A saved configuration in whichever shape it was written.
#[derive(Clone, Debug, PartialEq)]
pub enum SavedConfig {
    Nested(NestedConfig),
    Flat(IndexMap<String, SlotSetting>),
}

impl Default for SavedConfig {
    fn default() -> Self {
        SavedConfig::Nested(NestedConfig::default())
    }
}

fn looks_like_setting(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Object(map) => matches!(map.get("status"), Some(Value::String(_))),
        _ => false,
    }
}

/// Which shape a stored configuration was written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigShape {
    Empty,
    Flat,
    Wrapped,
    Nested,
}

impl ConfigShape {
    pub fn detect(value: &Value) -> FiberResult<ConfigShape> {
        let object = match value {
            Value::Null => return Ok(ConfigShape::Empty),
            Value::Object(map) => map,
            other => {
                return Err(FiberError::InvalidConfig(format!(
                    "expected an object, found {other}"
                )))
            }
        };
        if object.values().any(looks_like_setting) {
            return Ok(ConfigShape::Flat);
        }
        let wrapped = object
            .values()
            .any(|v| v.as_object().is_some_and(|m| m.contains_key("modules")));
        Ok(if wrapped {
            ConfigShape::Wrapped
        } else {
            ConfigShape::Nested
        })
    }

    /// Flat and wrapped configurations are only read, never written.
    pub fn is_legacy(self) -> bool {
        matches!(self, ConfigShape::Flat | ConfigShape::Wrapped)
    }
}

impl SavedConfig {
    /// Detect the shape of a stored configuration and decode it.
    pub fn from_value(value: &Value) -> FiberResult<SavedConfig> {
        match ConfigShape::detect(value)? {
            ConfigShape::Empty => Ok(SavedConfig::default()),
            ConfigShape::Flat => Ok(SavedConfig::Flat(serde_json::from_value(value.clone())?)),
            ConfigShape::Wrapped => {
                let cabinets: IndexMap<String, WrappedCabinet> =
                    serde_json::from_value(value.clone())?;
                let nested = cabinets
                    .into_iter()
                    .map(|(cabinet_id, cabinet)| {
                        let modules = cabinet
                            .modules
                            .into_iter()
                            .map(|(module_id, module)| (module_id, module.fibers))
                            .collect();
                        (cabinet_id, modules)
                    })
                    .collect();
                Ok(SavedConfig::Nested(NestedConfig(nested)))
            }
            ConfigShape::Nested => Ok(SavedConfig::Nested(serde_json::from_value(value.clone())?)),
        }
    }
}

// ---------------------------------------------------------------------------
// Merged view
// ---------------------------------------------------------------------------

/// Fiber ids sitting in each port: cabinet -> module -> slot -> fibers.
type PortIndex = IndexMap<String, IndexMap<String, IndexMap<u32, Vec<String>>>>;

/// A model with saved settings applied, plus the state of every port of
/// every module (24 per module, whether or not the sheet lists a fiber there).
#[derive(Clone, Debug, PartialEq)]
pub struct MergedModel {
    pub model: ProjectModel,
    slots: NestedConfig,
    ports: PortIndex,
}

impl MergedModel {
    /// Wrap a model with every slot at `not-configured`.
    pub fn new(model: ProjectModel) -> Self {
        let slots: IndexMap<String, IndexMap<String, ModuleSlots>> = model
            .cabinets
            .values()
            .map(|cabinet| {
                let modules = cabinet
                    .modules
                    .keys()
                    .map(|module_id| {
                        let ports = (1..=FIBER_SLOTS_PER_MODULE)
                            .map(|slot| (slot, SlotSetting::default()))
                            .collect();
                        (module_id.clone(), ports)
                    })
                    .collect();
                (cabinet.id.clone(), modules)
            })
            .collect();

        let mut ports = PortIndex::new();
        for (fiber_id, fiber) in &model.fibers {
            let has_port = slots
                .get(&fiber.cabinet_id)
                .and_then(|modules| modules.get(&fiber.module_id))
                .is_some_and(|module| module.contains_key(&fiber.fiber_number));
            if has_port {
                ports
                    .entry(fiber.cabinet_id.clone())
                    .or_default()
                    .entry(fiber.module_id.clone())
                    .or_default()
                    .entry(fiber.fiber_number)
                    .or_default()
                    .push(fiber_id.clone());
            }
        }

        Self {
            model,
            slots: NestedConfig(slots),
            ports,
        }
    }

    pub fn slot(&self, cabinet_id: &str, module_id: &str, slot: u32) -> Option<SlotSetting> {
        self.slots.get(cabinet_id, module_id, slot).copied()
    }

    pub fn module_slots(&self, cabinet_id: &str, module_id: &str) -> Option<&ModuleSlots> {
        self.slots.module(cabinet_id, module_id)
    }

    /// Every (cabinet, module) pair, in model order.
    pub fn modules(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.slots.0.iter().flat_map(|(cabinet_id, modules)| {
            modules
                .keys()
                .map(move |module_id| (cabinet_id.as_str(), module_id.as_str()))
        })
    }

    /// Spreadsheet fibers sitting in one port.
    pub fn fibers_in_slot(&self, cabinet_id: &str, module_id: &str, slot: u32) -> &[String] {
        self.ports
            .get(cabinet_id)
            .and_then(|modules| modules.get(module_id))
            .and_then(|module| module.get(&slot))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn port_mut(
        &mut self,
        cabinet_id: &str,
        module_id: &str,
        slot: u32,
    ) -> Option<&mut SlotSetting> {
        self.slots
            .0
            .get_mut(cabinet_id)
            .and_then(|modules| modules.get_mut(module_id))
            .and_then(|ports| ports.get_mut(&slot))
    }

    /// Set one port and every spreadsheet fiber sitting in it. Returns false
    /// when the port does not exist.
    pub fn set_slot(
        &mut self,
        cabinet_id: &str,
        module_id: &str,
        slot: u32,
        setting: SlotSetting,
    ) -> bool {
        let Some(entry) = self.port_mut(cabinet_id, module_id, slot) else {
            return false;
        };
        *entry = setting;
        let fiber_ids = self
            .ports
            .get(cabinet_id)
            .and_then(|modules| modules.get(module_id))
            .and_then(|module| module.get(&slot));
        for fiber_id in fiber_ids.into_iter().flatten() {
            if let Some(fiber) = self.model.fibers.get_mut(fiber_id) {
                fiber.current_status = setting.status;
                fiber.current_distance = setting.distance;
            }
        }
        true
    }

    /// Set one fiber without touching its port.
    fn set_fiber(&mut self, fiber_id: &str, setting: SlotSetting) -> bool {
        let Some(fiber) = self.model.fibers.get_mut(fiber_id) else {
            return false;
        };
        fiber.current_status = setting.status;
        fiber.current_distance = setting.distance;
        true
    }

    /// Fibers whose own setting differs from their port's setting, including
    /// configured fibers that have no port. The nested shape cannot carry
    /// these, so they are stored next to it.
    pub fn fiber_overrides(&self) -> IndexMap<String, SlotSetting> {
        self.model
            .fibers
            .iter()
            .filter_map(|(fiber_id, fiber)| {
                let own = SlotSetting {
                    status: fiber.current_status,
                    distance: fiber.current_distance,
                };
                let port = self
                    .slot(&fiber.cabinet_id, &fiber.module_id, fiber.fiber_number)
                    .unwrap_or_default();
                (own != port).then(|| (fiber_id.clone(), own))
            })
            .collect()
    }

    /// Re-apply per-fiber settings on top of the port settings. Returns the
    /// number of fibers updated; unknown ids are skipped.
    pub fn apply_fiber_overrides(&mut self, overrides: &IndexMap<String, SlotSetting>) -> usize {
        let mut applied = 0;
        for (fiber_id, setting) in overrides {
            if self.set_fiber(fiber_id, *setting) {
                applied += 1;
            } else {
                warn!("Saved override for fiber {fiber_id} matches no fiber");
            }
        }
        applied
    }
}

/// Split `"{cabinet}-{module}-{slot}"` from the right.
fn split_slot_key(key: &str) -> Option<(&str, &str, u32)> {
    let mut parts = key.rsplitn(3, '-');
    let slot = parts.next()?.parse::<u32>().ok()?;
    let module_id = parts.next()?;
    let cabinet_id = parts.next()?;
    Some((cabinet_id, module_id, slot))
}

/// Port settings requested by flat fiber entries.
struct PortClaim {
    setting: SlotSetting,
    fibers: Vec<String>,
    conflict: bool,
}

fn merge_flat(merged: &mut MergedModel, entries: &IndexMap<String, SlotSetting>) {
    // Port keys first so that fiber entries refine them.
    for (key, setting) in entries {
        if merged.model.fibers.contains_key(key) {
            continue;
        }
        let applied = split_slot_key(key)
            .map(|(cabinet_id, module_id, slot)| {
                merged.set_slot(cabinet_id, module_id, slot, *setting)
            })
            .unwrap_or(false);
        if !applied {
            warn!("Saved fiber {key} matches no fiber or module port");
        }
    }

    let mut claims: IndexMap<(String, String, u32), PortClaim> = IndexMap::new();
    for (key, setting) in entries {
        let Some(fiber) = merged.model.fibers.get(key) else {
            continue;
        };
        let port = (fiber.cabinet_id.clone(), fiber.module_id.clone(), fiber.fiber_number);
        merged.set_fiber(key, *setting);
        let claim = claims.entry(port).or_insert_with(|| PortClaim {
            setting: *setting,
            fibers: Vec::new(),
            conflict: false,
        });
        claim.conflict |= claim.setting != *setting;
        claim.fibers.push(key.clone());
    }

    for ((cabinet_id, module_id, slot), claim) in claims {
        if claim.conflict {
            warn!(
                "Saved fibers {} disagree on port {cabinet_id}/{module_id}/{slot}; port left unchanged",
                claim.fibers.join(", ")
            );
            continue;
        }
        if let Some(entry) = merged.port_mut(&cabinet_id, &module_id, slot) {
            *entry = claim.setting;
        }
    }
}

/// Apply a saved configuration onto a freshly extracted model.
///
/// Fibers and ports without a saved entry stay `not-configured`. Entries
/// naming ports or fibers the model does not have are skipped. In the flat
/// shape, fibers sharing a port that were saved with different settings keep
/// their own settings and the port is left as it was.
pub fn merge_overlay(model: ProjectModel, saved: &SavedConfig) -> MergedModel {
    let mut merged = MergedModel::new(model);
    match saved {
        SavedConfig::Nested(nested) => {
            for (cabinet_id, modules) in &nested.0 {
                for (module_id, ports) in modules {
                    for (slot, setting) in ports {
                        if !merged.set_slot(cabinet_id, module_id, *slot, *setting) {
                            warn!(
                                "Saved slot {cabinet_id}/{module_id}/{slot} has no matching module port"
                            );
                        }
                    }
                }
            }
        }
        SavedConfig::Flat(entries) => merge_flat(&mut merged, entries),
    }
    merged
}

/// Emit the canonical nested configuration: every module, slots 1..=24.
pub fn extract_overlay(merged: &MergedModel) -> NestedConfig {
    let mut out: IndexMap<String, IndexMap<String, ModuleSlots>> = IndexMap::new();
    for cabinet in merged.model.cabinets.values() {
        let modules = out.entry(cabinet.id.clone()).or_default();
        for module_id in cabinet.modules.keys() {
            let ports = (1..=FIBER_SLOTS_PER_MODULE)
                .map(|slot| {
                    let setting = merged.slot(&cabinet.id, module_id, slot).unwrap_or_default();
                    (slot, setting)
                })
                .collect();
            modules.insert(module_id.clone(), ports);
        }
    }
    NestedConfig(out)
}
