//! Handles to fetch and update slice state during one slot's scheduling
//! pass (§4.2 "Candidate retrieval"). Grounded on `ran_slice_candidate.h`.

use super::{RanSliceId, RanSliceInstance, SliceUeRepository};
use crate::config::SliceRrmPolicyConfig;
use crate::ue::UeIndex;
use common::SlotPoint;

/// Direction a slice candidate was generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Dl,
    Ul,
}

/// A RAN slice that is the next candidate for allocation in a given slot.
/// Borrowed from the inter-slice scheduler for the duration of one
/// intra-slice scheduling pass.
pub struct RanSliceCandidate<'a> {
    inst: &'a mut RanSliceInstance,
    max_rbs: u32,
    slot_tx: SlotPoint,
    direction: Direction,
}

impl<'a> RanSliceCandidate<'a> {
    pub fn new(inst: &'a mut RanSliceInstance, slot_tx: SlotPoint, max_rbs: u32, direction: Direction) -> Self {
        let max_rbs = if max_rbs == 0 { inst.cfg.max_rb as u32 } else { max_rbs };
        Self { inst, max_rbs, slot_tx, direction }
    }

    pub fn id(&self) -> RanSliceId {
        self.inst.id
    }

    pub fn cfg(&self) -> &SliceRrmPolicyConfig {
        &self.inst.cfg
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_candidate(&self, ue_idx: UeIndex) -> bool {
        self.inst.get_ues().contains(ue_idx)
    }

    pub fn get_slice_ues(&self) -> &SliceUeRepository {
        self.inst.get_ues()
    }

    pub fn get_slice_ues_mut(&mut self) -> &mut SliceUeRepository {
        self.inst.get_ues_mut()
    }

    /// Registers that a new grant of `nof_rbs` was allocated for this
    /// slice, in this slot.
    pub fn store_grant(&mut self, nof_rbs: u32) {
        match self.direction {
            Direction::Dl => self.inst.store_pdsch_grant(nof_rbs, self.slot_tx),
            Direction::Ul => self.inst.store_pusch_grant(nof_rbs, self.slot_tx),
        }
    }

    pub fn remaining_rbs(&self) -> u32 {
        let used = match self.direction {
            Direction::Dl => self.inst.pdsch_rb_count,
            Direction::Ul => self.inst.nof_pusch_rbs_allocated(self.slot_tx),
        };
        self.max_rbs.saturating_sub(used)
    }

    pub fn slot_tx(&self) -> SlotPoint {
        self.slot_tx
    }
}

pub type DlRanSliceCandidate<'a> = RanSliceCandidate<'a>;
pub type UlRanSliceCandidate<'a> = RanSliceCandidate<'a>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedStrategy;

    #[test]
    fn remaining_rbs_shrinks_after_store_grant() {
        let cfg = SliceRrmPolicyConfig {
            min_rb: 0,
            max_rb: 50,
            dedicated_rb: 0,
            priority: 1,
            member: None,
            strategy: SchedStrategy::TimeRr,
        };
        let mut inst = RanSliceInstance::new(RanSliceId(2), cfg, 80);
        let slot = SlotPoint::new(0, 5);
        let mut candidate = RanSliceCandidate::new(&mut inst, slot, 0, Direction::Dl);
        assert_eq!(candidate.remaining_rbs(), 50);
        candidate.store_grant(20);
        assert_eq!(candidate.remaining_rbs(), 30);
    }
}
