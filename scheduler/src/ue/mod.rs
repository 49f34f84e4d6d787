//! UE-context state: identity, per-cell configuration, logical-channel
//! managers, and the HARQ process arrays (§3 "UE", §3 "HARQ process").

pub mod logical_channels;
pub mod repository;

pub use logical_channels::{DlLogicalChannelManager, Lcg, Lcid, UlLogicalChannelGroupManager};
pub use repository::UeRepository;

use crate::harq::HarqEntityPair;
use common::Rnti;

/// Opaque index identifying a UE within a cell group's `UeRepository`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UeIndex(pub u32);

/// Per-UE-cell state: its own HARQ entity and activity flags. A UE with
/// carrier aggregation owns one `UeCell` per serving cell (PCell + SCells).
pub struct UeCell {
    pub cell_id: common::CellId,
    pub harq: HarqEntityPair,
    pub is_pcell: bool,
}

impl UeCell {
    pub fn new(cell_id: common::CellId, is_pcell: bool, max_nof_harqs: usize) -> Self {
        Self {
            cell_id,
            harq: HarqEntityPair::new(max_nof_harqs),
            is_pcell,
        }
    }
}

/// A connected UE.
pub struct Ue {
    pub index: UeIndex,
    pub crnti: Rnti,
    pub cells: Vec<UeCell>,
    pub dl_lc: DlLogicalChannelManager,
    pub ul_lcg: UlLogicalChannelGroupManager,
    pub sr_pending: bool,
    /// A UE is created in fallback mode and only transitions to
    /// non-fallback after an explicit `config_applied` event (§3).
    fallback: bool,
    /// Set when the UE is pending removal; it is only actually destroyed
    /// once the current slot passes `safe_after` (§5).
    pub pending_removal_safe_after: Option<common::SlotPoint>,
}

impl Ue {
    pub fn new(index: UeIndex, crnti: Rnti) -> Self {
        Self {
            index,
            crnti,
            cells: Vec::new(),
            dl_lc: DlLogicalChannelManager::default(),
            ul_lcg: UlLogicalChannelGroupManager::default(),
            sr_pending: false,
            fallback: true,
            pending_removal_safe_after: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Handles a `config_applied` event. Idempotent: a second application
    /// for an already non-fallback UE is a no-op (§8 round-trip property).
    pub fn apply_config(&mut self) {
        self.fallback = false;
    }

    pub fn pcell(&self) -> Option<&UeCell> {
        self.cells.iter().find(|c| c.is_pcell)
    }

    pub fn pcell_mut(&mut self) -> Option<&mut UeCell> {
        self.cells.iter_mut().find(|c| c.is_pcell)
    }

    pub fn add_cell(&mut self, cell: UeCell) {
        self.cells.push(cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CellId;

    #[test]
    fn ue_starts_in_fallback_and_apply_config_is_idempotent() {
        let mut ue = Ue::new(UeIndex(0), Rnti(0x4601));
        assert!(ue.is_fallback());
        ue.apply_config();
        assert!(!ue.is_fallback());
        ue.apply_config();
        assert!(!ue.is_fallback());
    }

    #[test]
    fn pcell_lookup() {
        let mut ue = Ue::new(UeIndex(1), Rnti(0x4602));
        ue.add_cell(UeCell::new(CellId(1), true, 16));
        ue.add_cell(UeCell::new(CellId(2), false, 16));
        assert_eq!(ue.pcell().unwrap().cell_id, CellId(1));
    }
}
