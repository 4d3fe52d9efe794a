//! Interactive configuration of module ports.
//!
//! A [`ConfigSession`] owns the merged model plus the cursor and listening
//! state. Callers keep one per open project; nothing here is global.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{FiberStats, FiberStatus, FIBER_SLOTS_PER_MODULE};
use crate::progress::overlay::{extract_overlay, MergedModel, NestedConfig, SlotSetting};
use crate::progress::state::{apply_command, FiberCommand};
use crate::progress::stats::{compute_stats, slot_totals, SlotStats};

/// One port of one module.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRef {
    pub cabinet_id: String,
    pub module_id: String,
    pub slot: u32,
}

impl SlotRef {
    pub fn new(cabinet_id: &str, module_id: &str, slot: u32) -> Self {
        Self {
            cabinet_id: cabinet_id.to_string(),
            module_id: module_id.to_string(),
            slot,
        }
    }
}

/// Result of feeding one command into a session.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    /// The port was updated and the cursor stays on it.
    Updated { slot: SlotRef, status: FiberStatus },
    /// The port was updated and the cursor moved to `next`.
    Recorded {
        slot: SlotRef,
        status: FiberStatus,
        next: SlotRef,
    },
    /// The last port of the module was recorded; listening stopped.
    ModuleComplete {
        slot: SlotRef,
        status: FiberStatus,
    },
    ListeningStopped,
    /// No port is selected.
    NoSelection,
}

#[derive(Clone, Debug)]
pub struct ConfigSession {
    merged: MergedModel,
    cursor: Option<SlotRef>,
    active_module: Option<(String, String)>,
    listening: bool,
}

impl ConfigSession {
    pub fn new(merged: MergedModel) -> Self {
        Self {
            merged,
            cursor: None,
            active_module: None,
            listening: false,
        }
    }

    pub fn merged(&self) -> &MergedModel {
        &self.merged
    }

    pub fn into_merged(self) -> MergedModel {
        self.merged
    }

    pub fn cursor(&self) -> Option<&SlotRef> {
        self.cursor.as_ref()
    }

    pub fn active_module(&self) -> Option<(&str, &str)> {
        self.active_module
            .as_ref()
            .map(|(cabinet_id, module_id)| (cabinet_id.as_str(), module_id.as_str()))
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn status(&self, slot: &SlotRef) -> Option<FiberStatus> {
        self.merged
            .slot(&slot.cabinet_id, &slot.module_id, slot.slot)
            .map(|s| s.status)
    }

    /// Move the cursor to a port. Returns false when the port does not exist.
    pub fn select(&mut self, cabinet_id: &str, module_id: &str, slot: u32) -> bool {
        if self.merged.slot(cabinet_id, module_id, slot).is_none() {
            return false;
        }
        self.cursor = Some(SlotRef::new(cabinet_id, module_id, slot));
        true
    }

    /// Click on a port: advance its status one step and select it.
    pub fn cycle(&mut self, cabinet_id: &str, module_id: &str, slot: u32) -> Option<FiberStatus> {
        if !self.select(cabinet_id, module_id, slot) {
            return None;
        }
        match self.apply(FiberCommand::Advance) {
            CommandOutcome::Updated { status, .. } => Some(status),
            _ => None,
        }
    }

    /// Begin a guided walk: select the first unconfigured port and listen.
    ///
    /// Returns the selected port, or `None` when the module is unknown or
    /// already fully configured.
    pub fn start_module(&mut self, cabinet_id: &str, module_id: &str) -> Option<SlotRef> {
        let ports = self.merged.module_slots(cabinet_id, module_id)?;
        let first = ports
            .iter()
            .find(|(_, setting)| setting.status == FiberStatus::NotConfigured)
            .map(|(slot, _)| *slot)?;
        self.active_module = Some((cabinet_id.to_string(), module_id.to_string()));
        self.cursor = Some(SlotRef::new(cabinet_id, module_id, first));
        self.listening = true;
        debug!("Guided walk on {cabinet_id}/{module_id} starting at port {first}");
        self.cursor.clone()
    }

    /// Stop listening; the cursor stays where it is.
    pub fn pause(&mut self) {
        self.listening = false;
    }

    /// Stop listening and leave the module.
    pub fn stop_module(&mut self) {
        self.listening = false;
        self.active_module = None;
    }

    /// Move the cursor one port forward inside its module. At the last port
    /// the cursor stays, a guided walk ends, and `None` is returned.
    pub fn move_next(&mut self) -> Option<SlotRef> {
        let current = self.cursor.as_ref()?;
        if current.slot >= FIBER_SLOTS_PER_MODULE {
            if self.active_module.is_some() {
                self.stop_module();
            }
            return None;
        }
        let next = SlotRef::new(&current.cabinet_id, &current.module_id, current.slot + 1);
        self.cursor = Some(next.clone());
        Some(next)
    }

    /// Feed one command (click, key, or voice) into the session.
    pub fn apply(&mut self, command: FiberCommand) -> CommandOutcome {
        if command == FiberCommand::CancelListening {
            self.pause();
            return CommandOutcome::ListeningStopped;
        }
        let Some(slot) = self.cursor.clone() else {
            return CommandOutcome::NoSelection;
        };
        let Some(current) = self.merged.slot(&slot.cabinet_id, &slot.module_id, slot.slot) else {
            return CommandOutcome::NoSelection;
        };
        let status = apply_command(current.status, command);
        self.merged.set_slot(
            &slot.cabinet_id,
            &slot.module_id,
            slot.slot,
            SlotSetting {
                status,
                distance: current.distance,
            },
        );

        if !command.moves_next() {
            return CommandOutcome::Updated { slot, status };
        }
        let walking = self.active_module.is_some();
        match self.move_next() {
            Some(next) => CommandOutcome::Recorded { slot, status, next },
            None if walking => CommandOutcome::ModuleComplete { slot, status },
            None => CommandOutcome::Updated { slot, status },
        }
    }

    /// Record a measured distance on a port, keeping its status.
    pub fn set_distance(&mut self, slot: &SlotRef, distance: Option<f64>) -> bool {
        let Some(current) = self.merged.slot(&slot.cabinet_id, &slot.module_id, slot.slot) else {
            return false;
        };
        self.merged.set_slot(
            &slot.cabinet_id,
            &slot.module_id,
            slot.slot,
            SlotSetting {
                status: current.status,
                distance,
            },
        )
    }

    /// Reset every port of one module. Returns the number of ports touched.
    pub fn clear_module(&mut self, cabinet_id: &str, module_id: &str) -> usize {
        let mut cleared = 0;
        for slot in 1..=FIBER_SLOTS_PER_MODULE {
            if self
                .merged
                .set_slot(cabinet_id, module_id, slot, SlotSetting::default())
            {
                cleared += 1;
            }
        }
        cleared
    }

    /// Put every port of every module in `status`.
    pub fn set_all(&mut self, status: FiberStatus) {
        let modules: Vec<(String, String)> = self
            .merged
            .modules()
            .map(|(cabinet_id, module_id)| (cabinet_id.to_string(), module_id.to_string()))
            .collect();
        for (cabinet_id, module_id) in modules {
            for slot in 1..=FIBER_SLOTS_PER_MODULE {
                self.merged
                    .set_slot(&cabinet_id, &module_id, slot, SlotSetting::with_status(status));
            }
        }
    }

    pub fn reset_all(&mut self) {
        self.set_all(FiberStatus::NotConfigured);
        self.cursor = None;
        self.stop_module();
    }

    pub fn stats(&self) -> FiberStats {
        compute_stats(&self.merged.model)
    }

    pub fn slot_totals(&self) -> SlotStats {
        slot_totals(&self.merged)
    }

    /// Canonical configuration to persist.
    pub fn overlay(&self) -> NestedConfig {
        extract_overlay(&self.merged)
    }

    /// Per-fiber settings the canonical configuration cannot express.
    pub fn fiber_overrides(&self) -> IndexMap<String, SlotSetting> {
        self.merged.fiber_overrides()
    }
}
