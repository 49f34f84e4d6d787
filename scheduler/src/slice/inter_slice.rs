//! Inter-slice scheduler: produces prioritised slice candidates for PDSCH
//! and PUSCH each slot (§4.2). Grounded on
//! `lib/scheduler/slicing/inter_slice_scheduler.{h,cpp}`.

use super::candidate::{Direction, RanSliceCandidate};
use super::{RanSliceId, RanSliceInstance};
use crate::config::{CellConfiguration, SliceRrmPolicyConfig};
use crate::policy::{make_policy, SchedulerPolicy};
use common::SlotPoint;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub type PriorityType = u32;

/// Priority bit layout (MSB to LSB), 32 bits total (§4.2 "Priority function"):
/// [slot_distance:7][min_rb_gate:1][slice_priority:8][delay_priority:8][rr_tiebreak:7][marker:1]
const SLOT_DISTANCE_SHIFT: u32 = 25;
const MIN_RB_GATE_SHIFT: u32 = 24;
const SLICE_PRIORITY_SHIFT: u32 = 16;
const DELAY_PRIORITY_SHIFT: u32 = 8;
const RR_TIEBREAK_SHIFT: u32 = 1;
const MARKER_BIT: u32 = 1;

const FIELD7_MAX: u32 = 0x7F;
const FIELD8_MAX: u32 = 0xFF;

pub const SKIP_PRIORITY: PriorityType = 0;

fn compute_priority(
    slice: &RanSliceInstance,
    direction: Direction,
    pdcch_slot: SlotPoint,
    pxsch_slot: SlotPoint,
    min_rb_gate: bool,
) -> PriorityType {
    let slot_distance = pxsch_slot.sub(&pdcch_slot).max(0) as u32;
    let slot_distance_field = FIELD7_MAX - slot_distance.min(FIELD7_MAX);

    let slice_priority_field = (slice.cfg.priority as u32).min(FIELD8_MAX);

    let delay = match direction {
        Direction::Dl => slice.nof_slots_since_last_pdsch(pxsch_slot),
        Direction::Ul => slice.nof_slots_since_last_pusch(pxsch_slot),
    };
    let delay_priority_field = delay.min(FIELD8_MAX);

    let avg = match direction {
        Direction::Dl => slice.average_pdsch_rbs_per_slot(),
        Direction::Ul => slice.average_pusch_rbs_per_slot(),
    };
    let rr_field = FIELD7_MAX - (avg.round() as u32).min(FIELD7_MAX);

    (slot_distance_field << SLOT_DISTANCE_SHIFT)
        | ((min_rb_gate as u32) << MIN_RB_GATE_SHIFT)
        | (slice_priority_field << SLICE_PRIORITY_SHIFT)
        | (delay_priority_field << DELAY_PRIORITY_SHIFT)
        | (rr_field << RR_TIEBREAK_SHIFT)
        | MARKER_BIT
}

#[derive(Debug, Clone, Copy)]
struct SliceCandidateContext {
    id: RanSliceId,
    prio: PriorityType,
    rb_lo: u16,
    rb_hi: u16,
    slot_tx: SlotPoint,
    min_rb: u16,
    dedicated_rb: u16,
}

impl PartialEq for SliceCandidateContext {
    fn eq(&self, other: &Self) -> bool {
        self.prio == other.prio
    }
}
impl Eq for SliceCandidateContext {}
impl PartialOrd for SliceCandidateContext {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SliceCandidateContext {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prio.cmp(&other.prio)
    }
}

/// Priority queue of slice candidates with an O(n) `clear()` that keeps the
/// backing allocation (§9 "Priority queues with clearable backing vector").
#[derive(Default)]
struct SlicePrioQueue {
    heap: BinaryHeap<SliceCandidateContext>,
}

impl SlicePrioQueue {
    fn clear(&mut self) {
        self.heap.clear();
    }

    fn push(&mut self, ctx: SliceCandidateContext) {
        if ctx.prio == SKIP_PRIORITY {
            return;
        }
        self.heap.push(ctx);
    }

    fn pop(&mut self) -> Option<SliceCandidateContext> {
        self.heap.pop()
    }

    fn peek(&self) -> Option<&SliceCandidateContext> {
        self.heap.peek()
    }
}

pub struct InterSliceScheduler {
    cell_nof_prbs: u16,
    current_slot: SlotPoint,
    slices: Vec<RanSliceInstance>,
    policies: Vec<Box<dyn SchedulerPolicy>>,
    valid_pdsch_k0_list: Vec<u8>,
    valid_pusch_k2_list: Vec<u8>,
    dl_queue: SlicePrioQueue,
    ul_queue: SlicePrioQueue,
    /// Ring tracking per-slot dedicated-RB totals so the scheduler never
    /// over-commits when multiple dedicated slices coexist (§4.2 "State").
    dedicated_rb_ring: Vec<u32>,
}

impl InterSliceScheduler {
    pub fn new(cell_cfg: &CellConfiguration, ring_size: usize) -> Self {
        let mut slices = Vec::with_capacity(cell_cfg.slices.len() + 2);
        slices.push(RanSliceInstance::new(
            RanSliceId::srb(),
            SliceRrmPolicyConfig {
                min_rb: cell_cfg.nof_prbs,
                max_rb: cell_cfg.nof_prbs,
                dedicated_rb: cell_cfg.nof_prbs,
                priority: 0xFF,
                member: None,
                strategy: crate::config::SchedStrategy::TimeRr,
            },
            ring_size,
        ));
        slices.push(RanSliceInstance::new(
            RanSliceId::default_drb(),
            SliceRrmPolicyConfig {
                min_rb: 0,
                max_rb: cell_cfg.nof_prbs,
                dedicated_rb: 0,
                priority: 0,
                member: None,
                strategy: crate::config::SchedStrategy::TimeRr,
            },
            ring_size,
        ));
        for (i, member_cfg) in cell_cfg.slices.iter().enumerate() {
            let id = RanSliceId((i as u8) + 2);
            slices.push(RanSliceInstance::new(id, member_cfg.clone().clamped(cell_cfg.nof_prbs), ring_size));
        }
        let policies = slices.iter().map(|s| make_policy(s.cfg.strategy)).collect();
        Self {
            cell_nof_prbs: cell_cfg.nof_prbs,
            current_slot: SlotPoint::invalid(),
            slices,
            policies,
            valid_pdsch_k0_list: vec![0],
            valid_pusch_k2_list: vec![4],
            dl_queue: SlicePrioQueue::default(),
            ul_queue: SlicePrioQueue::default(),
            dedicated_rb_ring: vec![0; ring_size.max(1)],
        }
    }

    pub fn set_valid_pdsch_k0_list(&mut self, list: Vec<u8>) {
        self.valid_pdsch_k0_list = list;
    }

    pub fn set_valid_pusch_k2_list(&mut self, list: Vec<u8>) {
        self.valid_pusch_k2_list = list;
    }

    pub fn nof_slices(&self) -> usize {
        self.slices.len()
    }

    pub fn slice_config(&self, id: RanSliceId) -> &SliceRrmPolicyConfig {
        &self.slices[id.value() as usize].cfg
    }

    pub fn slice_mut(&mut self, id: RanSliceId) -> &mut RanSliceInstance {
        &mut self.slices[id.value() as usize]
    }

    pub fn slice(&self, id: RanSliceId) -> &RanSliceInstance {
        &self.slices[id.value() as usize]
    }

    pub fn get_policy_mut(&mut self, id: RanSliceId) -> &mut dyn SchedulerPolicy {
        self.policies[id.value() as usize].as_mut()
    }

    pub fn slices_mut(&mut self) -> impl Iterator<Item = &mut RanSliceInstance> {
        self.slices.iter_mut()
    }

    /// Resets candidate queues for `slot_tx` and regenerates slice
    /// candidates for both directions (§2 step 6, §4.2).
    pub fn slot_indication(&mut self, slot_tx: SlotPoint, csi_rs_present: bool, enable_csi_rs_pdsch_mux: bool) {
        self.current_slot = slot_tx;
        for s in self.slices.iter_mut() {
            s.slot_indication(slot_tx);
        }
        let idx = (slot_tx.count() as usize) % self.dedicated_rb_ring.len();
        self.dedicated_rb_ring[idx] = 0;

        self.dl_queue.clear();
        self.ul_queue.clear();

        let dl_allowed = !csi_rs_present || enable_csi_rs_pdsch_mux;
        if dl_allowed {
            for k0 in self.valid_pdsch_k0_list.clone() {
                let pxsch_slot = slot_tx.add(k0 as u32);
                Self::generate_candidates(&self.slices, &mut self.dl_queue, Direction::Dl, slot_tx, pxsch_slot);
            }
        }
        for k2 in self.valid_pusch_k2_list.clone() {
            let pxsch_slot = slot_tx.add(k2 as u32);
            Self::generate_candidates(&self.slices, &mut self.ul_queue, Direction::Ul, slot_tx, pxsch_slot);
        }
    }

    fn generate_candidates(
        slices: &[RanSliceInstance],
        queue: &mut SlicePrioQueue,
        direction: Direction,
        pdcch_slot: SlotPoint,
        pxsch_slot: SlotPoint,
    ) {
        for slice in slices.iter() {
            if !slice.active() {
                continue;
            }
            let current_rbs = match direction {
                Direction::Dl => slice.pdsch_rb_count,
                Direction::Ul => slice.nof_pusch_rbs_allocated(pxsch_slot),
            } as u16;
            let min_rb = slice.cfg.min_rb;
            let max_rb = slice.cfg.max_rb;
            if current_rbs >= max_rb {
                continue;
            }
            if current_rbs < min_rb && min_rb < max_rb && slice.cfg.dedicated_rb > 0 {
                let gated_prio = compute_priority(slice, direction, pdcch_slot, pxsch_slot, true);
                queue.push(SliceCandidateContext {
                    id: slice.id,
                    prio: gated_prio,
                    rb_lo: current_rbs,
                    rb_hi: min_rb,
                    slot_tx: pxsch_slot,
                    min_rb,
                    dedicated_rb: slice.cfg.dedicated_rb,
                });
                let open_prio = compute_priority(slice, direction, pdcch_slot, pxsch_slot, false);
                queue.push(SliceCandidateContext {
                    id: slice.id,
                    prio: open_prio,
                    rb_lo: min_rb,
                    rb_hi: max_rb,
                    slot_tx: pxsch_slot,
                    min_rb,
                    dedicated_rb: slice.cfg.dedicated_rb,
                });
            } else {
                let prio = compute_priority(slice, direction, pdcch_slot, pxsch_slot, false);
                queue.push(SliceCandidateContext {
                    id: slice.id,
                    prio,
                    rb_lo: current_rbs,
                    rb_hi: max_rb,
                    slot_tx: pxsch_slot,
                    min_rb,
                    dedicated_rb: slice.cfg.dedicated_rb,
                });
            }
        }
    }

    pub fn get_next_dl_candidate(&mut self) -> Option<RanSliceCandidate<'_>> {
        let (id, slot_tx, max_rbs) = self.pop_next_candidate(Direction::Dl)?;
        let inst = &mut self.slices[id.value() as usize];
        Some(RanSliceCandidate::new(inst, slot_tx, max_rbs, Direction::Dl))
    }

    pub fn get_next_ul_candidate(&mut self) -> Option<RanSliceCandidate<'_>> {
        let (id, slot_tx, max_rbs) = self.pop_next_candidate(Direction::Ul)?;
        let inst = &mut self.slices[id.value() as usize];
        Some(RanSliceCandidate::new(inst, slot_tx, max_rbs, Direction::Ul))
    }

    /// Same as [`Self::get_next_dl_candidate`], but also hands back the
    /// slice's policy so the intra-slice scheduler can compute per-UE
    /// priorities and notify completion without a second borrow of `self`
    /// (§4.3 Stage 1 and Stage 4 need both at once).
    pub fn get_next_dl_candidate_with_policy(
        &mut self,
    ) -> Option<(RanSliceCandidate<'_>, &mut dyn SchedulerPolicy)> {
        let (id, slot_tx, max_rbs) = self.pop_next_candidate(Direction::Dl)?;
        let idx = id.value() as usize;
        let inst = &mut self.slices[idx];
        let policy = self.policies[idx].as_mut();
        Some((RanSliceCandidate::new(inst, slot_tx, max_rbs, Direction::Dl), policy))
    }

    pub fn get_next_ul_candidate_with_policy(
        &mut self,
    ) -> Option<(RanSliceCandidate<'_>, &mut dyn SchedulerPolicy)> {
        let (id, slot_tx, max_rbs) = self.pop_next_candidate(Direction::Ul)?;
        let idx = id.value() as usize;
        let inst = &mut self.slices[idx];
        let policy = self.policies[idx].as_mut();
        Some((RanSliceCandidate::new(inst, slot_tx, max_rbs, Direction::Ul), policy))
    }

    /// Pops and merges the next candidate, checking the dedicated-RB budget,
    /// without borrowing `self.slices` or `self.policies` so callers are
    /// free to pick which (or both) to borrow afterwards.
    fn pop_next_candidate(&mut self, direction: Direction) -> Option<(RanSliceId, SlotPoint, u32)> {
        loop {
            let queue = match direction {
                Direction::Dl => &mut self.dl_queue,
                Direction::Ul => &mut self.ul_queue,
            };
            let mut top = queue.pop()?;
            // Two consecutive pops for the same slice-id and pxsch slot are merged.
            while let Some(next) = queue.peek() {
                if next.id == top.id && next.slot_tx == top.slot_tx {
                    let merged = queue.pop().unwrap();
                    top.rb_lo = top.rb_lo.min(merged.rb_lo);
                    top.rb_hi = top.rb_hi.max(merged.rb_hi);
                } else {
                    break;
                }
            }

            let ring_idx = (top.slot_tx.count() as usize) % self.dedicated_rb_ring.len();
            if top.rb_lo < top.min_rb {
                let remaining = self.cell_nof_prbs as u32 - self.dedicated_rb_ring[ring_idx];
                if remaining == 0 {
                    continue;
                }
                self.dedicated_rb_ring[ring_idx] += top.dedicated_rb as u32;
            }

            return Some((top.id, top.slot_tx, top.rb_hi as u32));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CellConfiguration, HarqOperatingMode, PeriodicUciTemplate, PucchResourceSetConfig, SchedStrategy, SchedulerExpertConfig};
    use common::{CellId, SubcarrierSpacing};

    fn cell_cfg(slices: Vec<SliceRrmPolicyConfig>) -> CellConfiguration {
        CellConfiguration {
            cell_id: CellId(1),
            nof_prbs: 106,
            scs: SubcarrierSpacing::Scs30,
            tdd_ul_dl_pattern: None,
            slices,
            expert_cfg: SchedulerExpertConfig::default(),
            harq_mode: HarqOperatingMode::A,
            coresets: Vec::new(),
            search_spaces: Vec::new(),
            periodic_uci_template: PeriodicUciTemplate::default(),
            pucch_resources: PucchResourceSetConfig::default(),
        }
    }

    #[test]
    fn min_rb_gate_sets_priority_bit() {
        let cfg = cell_cfg(vec![SliceRrmPolicyConfig {
            min_rb: 10,
            max_rb: 106,
            dedicated_rb: 10,
            priority: 1,
            member: None,
            strategy: SchedStrategy::TimeRr,
        }]);
        let mut sched = InterSliceScheduler::new(&cfg, 80);
        let slice_id = RanSliceId(2);
        sched.slice_mut(slice_id).get_ues_mut().bind_dl_lcid(crate::ue::UeIndex(0), 4);
        sched.slot_indication(SlotPoint::new(1, 0), false, false);
        let c = sched.get_next_dl_candidate().unwrap();
        assert_eq!(c.id(), slice_id);
    }

    #[test]
    fn slice_at_max_rb_yields_no_candidate() {
        let cfg = cell_cfg(vec![SliceRrmPolicyConfig {
            min_rb: 0,
            max_rb: 10,
            dedicated_rb: 0,
            priority: 1,
            member: None,
            strategy: SchedStrategy::TimeRr,
        }]);
        let mut sched = InterSliceScheduler::new(&cfg, 80);
        let slice_id = RanSliceId(2);
        sched.slice_mut(slice_id).get_ues_mut().bind_dl_lcid(crate::ue::UeIndex(0), 4);
        sched.slice_mut(slice_id).store_pdsch_grant(10, SlotPoint::new(1, 0));
        sched.slot_indication(SlotPoint::new(1, 1), false, false);
        // The slice's own candidate is gone; only SRB/default-DRB remain (both inactive here).
        let mut found = false;
        while let Some(c) = sched.get_next_dl_candidate() {
            if c.id() == slice_id {
                found = true;
            }
        }
        assert!(!found);
    }

    #[test]
    fn srb_slice_outranks_equal_priority_drb_slice() {
        let cfg = cell_cfg(vec![]);
        let mut sched = InterSliceScheduler::new(&cfg, 80);
        sched.slice_mut(RanSliceId::srb()).get_ues_mut().bind_dl_lcid(crate::ue::UeIndex(0), 0);
        sched.slice_mut(RanSliceId::default_drb()).get_ues_mut().bind_dl_lcid(crate::ue::UeIndex(1), 4);
        sched.slot_indication(SlotPoint::new(1, 0), false, false);
        let first = sched.get_next_dl_candidate().unwrap();
        assert_eq!(first.id(), RanSliceId::srb());
    }
}
