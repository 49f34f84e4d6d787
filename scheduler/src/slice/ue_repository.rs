//! Per-slice view of UEs and their per-LCID/LCG pending bytes (§3 "RAN
//! slice": "per-slice UE repository").

use crate::ue::{Lcg, Lcid, UeIndex};
use std::collections::BTreeMap;

/// `BTreeMap`, not `HashMap`: Stage-0 retx servicing in `intra_slice.rs`
/// walks these indices in order and must do so deterministically (oldest
/// UE first), so iteration order can't be hash-dependent.
#[derive(Debug, Clone, Default)]
pub struct SliceUeRepository {
    dl: BTreeMap<UeIndex, Vec<Lcid>>,
    ul: BTreeMap<UeIndex, Vec<Lcg>>,
}

impl SliceUeRepository {
    pub fn bind_dl_lcid(&mut self, ue: UeIndex, lcid: Lcid) {
        let lcids = self.dl.entry(ue).or_default();
        if !lcids.contains(&lcid) {
            lcids.push(lcid);
        }
    }

    pub fn bind_ul_lcg(&mut self, ue: UeIndex, lcg: Lcg) {
        let lcgs = self.ul.entry(ue).or_default();
        if !lcgs.contains(&lcg) {
            lcgs.push(lcg);
        }
    }

    pub fn unbind_dl_lcid(&mut self, ue: UeIndex, lcid: Lcid) {
        if let Some(lcids) = self.dl.get_mut(&ue) {
            lcids.retain(|&l| l != lcid);
            if lcids.is_empty() {
                self.dl.remove(&ue);
            }
        }
    }

    pub fn unbind_ul_lcg(&mut self, ue: UeIndex, lcg: Lcg) {
        if let Some(lcgs) = self.ul.get_mut(&ue) {
            lcgs.retain(|&l| l != lcg);
            if lcgs.is_empty() {
                self.ul.remove(&ue);
            }
        }
    }

    pub fn remove_ue(&mut self, ue: UeIndex) {
        self.dl.remove(&ue);
        self.ul.remove(&ue);
    }

    pub fn contains(&self, ue: UeIndex) -> bool {
        self.dl.contains_key(&ue) || self.ul.contains_key(&ue)
    }

    pub fn contains_dl_lcid(&self, ue: UeIndex, lcid: Lcid) -> bool {
        self.dl.get(&ue).is_some_and(|v| v.contains(&lcid))
    }

    pub fn contains_ul_lcg(&self, ue: UeIndex, lcg: Lcg) -> bool {
        self.ul.get(&ue).is_some_and(|v| v.contains(&lcg))
    }

    pub fn is_empty(&self) -> bool {
        self.dl.is_empty() && self.ul.is_empty()
    }

    pub fn dl_ue_indices(&self) -> impl Iterator<Item = UeIndex> + '_ {
        self.dl.keys().copied()
    }

    pub fn ul_ue_indices(&self) -> impl Iterator<Item = UeIndex> + '_ {
        self.ul.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_unbind_round_trip_empties_repository() {
        let mut repo = SliceUeRepository::default();
        let ue = UeIndex(3);
        repo.bind_dl_lcid(ue, 4);
        assert!(repo.contains(ue));
        repo.unbind_dl_lcid(ue, 4);
        assert!(!repo.contains(ue));
        assert!(repo.is_empty());
    }
}
