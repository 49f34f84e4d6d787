//! MAC-layer slot scheduler core for a 5G NR gNB distributed unit.
//!
//! `Scheduler` is the crate's single public entry point: a cell-group
//! registry that owns one [`CellScheduler`] per configured cell behind a
//! `parking_lot::Mutex` (§5 "Concurrency & resource model": "one task per
//! slot per cell group ... a mutex serialises `run_slot`"). Everything else
//! in this crate -- resource grid, inter/intra-slice scheduling, HARQ,
//! event ingress, UCI/SRS placement, metrics -- is reached through a single
//! cell's [`CellScheduler::run_slot`] (§4.1 "Contract").

pub mod alloc;
pub mod cell_scheduler;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod event_manager;
pub mod grid;
pub mod harq;
pub mod intra_slice;
pub mod metrics;
pub mod policy;
pub mod rb;
pub mod slice;
pub mod uci_srs;
pub mod ue;

pub use cell_scheduler::{CellScheduler, CellSchedulerCollaborators};
pub use error::{Result, SchedulerError};
pub use event_manager::{EventManager, SchedulerEvent};
pub use grid::SchedResult;

use common::{CellId, SlotPoint};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

/// Owns every cell in one cell group and serialises `run_slot` calls across
/// them with a single mutex (§5: cell groups, not individual cells, are the
/// scheduler's concurrency unit -- cells sharing a group share a slot clock
/// and must not race each other's resource grids).
#[derive(Default)]
pub struct Scheduler {
    cells: Mutex<HashMap<CellId, CellScheduler>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { cells: Mutex::new(HashMap::new()) }
    }

    /// Adds a cell to the group. Replaces any existing cell with the same
    /// id (a reconfiguration, not a runtime event this crate models itself
    /// -- see §1 non-goals on cell (de)activation procedures).
    pub fn add_cell(
        &self,
        cell_cfg: config::CellConfiguration,
        ring_size: usize,
        collaborators: CellSchedulerCollaborators,
    ) {
        let cell_id = cell_cfg.cell_id;
        let sched = CellScheduler::new(cell_cfg, ring_size, collaborators);
        self.cells.lock().insert(cell_id, sched);
        info!(cell = cell_id.0, "cell added to scheduler");
    }

    pub fn remove_cell(&self, cell_id: CellId) {
        self.cells.lock().remove(&cell_id);
        info!(cell = cell_id.0, "cell removed from scheduler");
    }

    pub fn has_cell(&self, cell_id: CellId) -> bool {
        self.cells.lock().contains_key(&cell_id)
    }

    /// Runs one slot for `cell_id`, returning an owned copy of the result
    /// (`SchedResult` derives `Clone`; the original stays inside the mutex
    /// guard, which a reference could not outlive).
    pub fn slot_indication(&self, cell_id: CellId, sl_tx: SlotPoint) -> Result<SchedResult> {
        let mut cells = self.cells.lock();
        let cell = cells.get_mut(&cell_id).ok_or(SchedulerError::UnknownCell(cell_id.0))?;
        Ok(cell.run_slot(sl_tx).clone())
    }

    /// Hands an upstream event's queue for `cell_id` so a caller can enqueue
    /// into it without holding the registry lock for the whole slot
    /// (`EventManager`'s internal queues are themselves lock-free, §5).
    pub fn event_manager_for(&self, cell_id: CellId, f: impl FnOnce(&EventManager)) -> Result<()> {
        let cells = self.cells.lock();
        let cell = cells.get(&cell_id).ok_or(SchedulerError::UnknownCell(cell_id.0))?;
        f(cell.event_manager());
        Ok(())
    }

    pub fn request_stop(&self, cell_id: CellId) -> Result<()> {
        let cells = self.cells.lock();
        let cell = cells.get(&cell_id).ok_or(SchedulerError::UnknownCell(cell_id.0))?;
        cell.request_stop();
        Ok(())
    }

    pub fn is_cell_active(&self, cell_id: CellId) -> Result<bool> {
        let cells = self.cells.lock();
        let cell = cells.get(&cell_id).ok_or(SchedulerError::UnknownCell(cell_id.0))?;
        Ok(cell.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::NullCollaborators;
    use crate::config::{CellConfiguration, HarqOperatingMode, PeriodicUciTemplate, PucchResourceSetConfig, SchedulerExpertConfig};
    use common::SubcarrierSpacing;

    fn test_cfg() -> CellConfiguration {
        CellConfiguration {
            cell_id: CellId(1),
            nof_prbs: 106,
            scs: SubcarrierSpacing::Scs30,
            tdd_ul_dl_pattern: None,
            slices: vec![],
            expert_cfg: SchedulerExpertConfig::default(),
            harq_mode: HarqOperatingMode::A,
            coresets: Vec::new(),
            search_spaces: Vec::new(),
            periodic_uci_template: PeriodicUciTemplate::default(),
            pucch_resources: PucchResourceSetConfig::default(),
        }
    }

    #[test]
    fn unknown_cell_is_reported() {
        let sched = Scheduler::new();
        let err = sched.slot_indication(CellId(1), SlotPoint::new(0, 0));
        assert!(matches!(err, Err(SchedulerError::UnknownCell(1))));
    }

    #[test]
    fn added_cell_advances_across_slot_indications() {
        let sched = Scheduler::new();
        sched.add_cell(test_cfg(), 80, NullCollaborators::boxed());
        assert!(sched.has_cell(CellId(1)));
        let result = sched.slot_indication(CellId(1), SlotPoint::new(0, 0)).unwrap();
        assert!(result.pdsch_ue.is_empty());
        sched.remove_cell(CellId(1));
        assert!(!sched.has_cell(CellId(1)));
    }

    #[test]
    fn request_stop_is_observed_by_is_cell_active() {
        let sched = Scheduler::new();
        sched.add_cell(test_cfg(), 80, NullCollaborators::boxed());
        assert!(sched.is_cell_active(CellId(1)).unwrap());
        sched.request_stop(CellId(1)).unwrap();
        // `is_active` only flips false once `run_slot` observes the stop
        // command (§4.1 step 3); request it, then drive one slot.
        sched.slot_indication(CellId(1), SlotPoint::new(0, 1)).unwrap();
        assert!(!sched.is_cell_active(CellId(1)).unwrap());
    }
}
