//! Top-level UE repository, owned by the cell-group task (§5 "Shared
//! resources"). Holds every connected UE regardless of slice membership;
//! `slice::SliceUeRepository` holds the per-slice view.

use super::{Ue, UeIndex};
use crate::error::{Result, SchedulerError};
use common::{Rnti, SlotPoint};
use std::collections::HashMap;

#[derive(Default)]
pub struct UeRepository {
    ues: HashMap<UeIndex, Ue>,
    /// UEs whose removal is pending a "safe-after" slot (§5), to avoid a
    /// freshly re-added UE with the same C-RNTI colliding on PUCCH.
    pending_removal: Vec<UeIndex>,
}

impl UeRepository {
    pub fn add(&mut self, ue: Ue) {
        self.ues.insert(ue.index, ue);
    }

    pub fn get(&self, idx: UeIndex) -> Result<&Ue> {
        self.ues.get(&idx).ok_or(SchedulerError::UnknownUe(idx))
    }

    pub fn get_mut(&mut self, idx: UeIndex) -> Result<&mut Ue> {
        self.ues.get_mut(&idx).ok_or(SchedulerError::UnknownUe(idx))
    }

    pub fn contains(&self, idx: UeIndex) -> bool {
        self.ues.contains_key(&idx)
    }

    pub fn find_by_crnti(&self, crnti: Rnti) -> Option<UeIndex> {
        self.ues.values().find(|u| u.crnti == crnti).map(|u| u.index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ue> {
        self.ues.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Ue> {
        self.ues.values_mut()
    }

    pub fn len(&self) -> usize {
        self.ues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ues.is_empty()
    }

    /// Marks a UE for removal, computing its "safe-after" slot as
    /// `last_sl + max_ul_alloc_delay + 1` (§5). The UE stays visible to the
    /// scheduler (and keeps its C-RNTI reserved) until that slot passes.
    pub fn schedule_removal(&mut self, idx: UeIndex, current_slot: SlotPoint, max_ul_alloc_delay: u16) {
        if let Some(ue) = self.ues.get_mut(&idx) {
            ue.pending_removal_safe_after = Some(current_slot.add(max_ul_alloc_delay as u32 + 1));
            self.pending_removal.push(idx);
        }
    }

    /// Ages pending removals, actually dropping any UE whose safe-after slot
    /// has passed. Called once per slot, before sub-scheduler invocation
    /// (§4.1 step 3 / §2 step 3: "UE repository ages state").
    pub fn age_state(&mut self, current_slot: SlotPoint) {
        self.pending_removal.retain(|idx| {
            let Some(ue) = self.ues.get(idx) else { return false };
            let Some(safe_after) = ue.pending_removal_safe_after else { return false };
            if current_slot.sub(&safe_after) >= 0 {
                self.ues.remove(idx);
                false
            } else {
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ue::UeIndex;
    use common::SlotPoint;

    fn sp(n: u32) -> SlotPoint {
        SlotPoint::new(1, n)
    }

    #[test]
    fn removal_is_deferred_until_safe_after_slot() {
        let mut repo = UeRepository::default();
        repo.add(Ue::new(UeIndex(0), Rnti(0x4601)));
        repo.schedule_removal(UeIndex(0), sp(100), 4);
        // safe_after = 100 + 4 + 1 = 105
        repo.age_state(sp(104));
        assert!(repo.contains(UeIndex(0)));
        repo.age_state(sp(105));
        assert!(!repo.contains(UeIndex(0)));
    }

    #[test]
    fn unknown_ue_lookup_errors() {
        let repo = UeRepository::default();
        assert!(repo.get(UeIndex(42)).is_err());
    }
}
