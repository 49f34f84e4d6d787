//! Internal bookkeeping for one RAN slice instantiation (§3 "RAN slice"),
//! grounded on `ran_slice_instance.{h,cpp}` in the original scheduler.

use super::{RanSliceId, SliceUeRepository};
use crate::config::SliceRrmPolicyConfig;
use common::SlotPoint;

/// Sentinel distance used when a slice has never been scheduled, so the
/// delay-priority field (§4.2 field 4) still has a well-defined (maximal)
/// value. Matches the original's `MAX_SLOTS_SINCE_LAST_PXSCH`.
const MAX_SLOTS_SINCE_LAST_PXSCH: u32 = 256;

/// New-sample weight for the exponential moving average of RBs/slot.
const EMA_ALPHA: f32 = 0.1;

pub struct RanSliceInstance {
    pub id: RanSliceId,
    pub cfg: SliceRrmPolicyConfig,

    /// RBs scheduled for PDSCH in the current slot for this slice; reset by
    /// `slot_indication`.
    pub pdsch_rb_count: u32,
    /// Ring of RBs scheduled for PUSCH per slot (one bucket per ring slot,
    /// since scenarios interleave DL/UL slots in TDD).
    pusch_rb_count_per_slot: Vec<u32>,

    last_pdsch_alloc_slot: SlotPoint,
    last_pusch_alloc_slot: SlotPoint,

    avg_pdsch_rbs_per_slot: f32,
    avg_pusch_rbs_per_slot: f32,

    ues: SliceUeRepository,
}

impl RanSliceInstance {
    pub fn new(id: RanSliceId, cfg: SliceRrmPolicyConfig, ring_size: usize) -> Self {
        Self {
            id,
            cfg,
            pdsch_rb_count: 0,
            pusch_rb_count_per_slot: vec![0; ring_size.max(1)],
            last_pdsch_alloc_slot: SlotPoint::invalid(),
            last_pusch_alloc_slot: SlotPoint::invalid(),
            avg_pdsch_rbs_per_slot: 0.0,
            avg_pusch_rbs_per_slot: 0.0,
            ues: SliceUeRepository::default(),
        }
    }

    pub fn active(&self) -> bool {
        !self.ues.is_empty()
    }

    pub fn get_ues(&self) -> &SliceUeRepository {
        &self.ues
    }

    pub fn get_ues_mut(&mut self) -> &mut SliceUeRepository {
        &mut self.ues
    }

    /// Resets per-slot counters and updates EMAs; called once per slot for
    /// every configured slice (mirrors the original's `slot_indication`).
    pub fn slot_indication(&mut self, slot_tx: SlotPoint) {
        self.avg_pdsch_rbs_per_slot += EMA_ALPHA * (self.pdsch_rb_count as f32 - self.avg_pdsch_rbs_per_slot);
        self.pdsch_rb_count = 0;
        let idx = (slot_tx.count() as usize) % self.pusch_rb_count_per_slot.len();
        self.avg_pusch_rbs_per_slot +=
            EMA_ALPHA * (self.pusch_rb_count_per_slot[idx] as f32 - self.avg_pusch_rbs_per_slot);
        self.pusch_rb_count_per_slot[idx] = 0;
    }

    pub fn store_pdsch_grant(&mut self, crbs: u32, pdsch_slot: SlotPoint) {
        self.pdsch_rb_count += crbs;
        self.last_pdsch_alloc_slot = pdsch_slot;
    }

    pub fn store_pusch_grant(&mut self, crbs: u32, pusch_slot: SlotPoint) {
        let idx = (pusch_slot.count() as usize) % self.pusch_rb_count_per_slot.len();
        self.pusch_rb_count_per_slot[idx] += crbs;
        self.last_pusch_alloc_slot = pusch_slot;
    }

    pub fn nof_pusch_rbs_allocated(&self, pusch_slot: SlotPoint) -> u32 {
        let idx = (pusch_slot.count() as usize) % self.pusch_rb_count_per_slot.len();
        self.pusch_rb_count_per_slot[idx]
    }

    pub fn nof_slots_since_last_pdsch(&self, pdsch_slot: SlotPoint) -> u32 {
        if !self.last_pdsch_alloc_slot.valid() {
            return MAX_SLOTS_SINCE_LAST_PXSCH;
        }
        let dist = pdsch_slot.sub(&self.last_pdsch_alloc_slot);
        if dist >= 0 {
            dist as u32
        } else {
            0
        }
    }

    pub fn nof_slots_since_last_pusch(&self, pusch_slot: SlotPoint) -> u32 {
        if !self.last_pusch_alloc_slot.valid() {
            return MAX_SLOTS_SINCE_LAST_PXSCH;
        }
        let dist = pusch_slot.sub(&self.last_pusch_alloc_slot);
        if dist >= 0 {
            dist as u32
        } else {
            0
        }
    }

    pub fn average_pdsch_rbs_per_slot(&self) -> f32 {
        self.avg_pdsch_rbs_per_slot
    }

    pub fn average_pusch_rbs_per_slot(&self) -> f32 {
        self.avg_pusch_rbs_per_slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedStrategy;

    fn cfg(min_rb: u16, max_rb: u16, priority: u8) -> SliceRrmPolicyConfig {
        SliceRrmPolicyConfig {
            min_rb,
            max_rb,
            dedicated_rb: 0,
            priority,
            member: None,
            strategy: SchedStrategy::TimeRr,
        }
    }

    #[test]
    fn never_scheduled_slice_reports_sentinel_delay() {
        let inst = RanSliceInstance::new(RanSliceId(2), cfg(0, 106, 1), 80);
        assert_eq!(inst.nof_slots_since_last_pdsch(SlotPoint::new(0, 10)), MAX_SLOTS_SINCE_LAST_PXSCH);
    }

    #[test]
    fn store_grant_updates_delay_and_count() {
        let mut inst = RanSliceInstance::new(RanSliceId(2), cfg(0, 106, 1), 80);
        let slot = SlotPoint::new(0, 10);
        inst.store_pdsch_grant(20, slot);
        assert_eq!(inst.pdsch_rb_count, 20);
        assert_eq!(inst.nof_slots_since_last_pdsch(slot.add(3)), 3);
    }

    #[test]
    fn slot_indication_resets_counter_and_updates_ema() {
        let mut inst = RanSliceInstance::new(RanSliceId(2), cfg(0, 106, 1), 80);
        inst.store_pdsch_grant(40, SlotPoint::new(0, 1));
        inst.slot_indication(SlotPoint::new(0, 2));
        assert_eq!(inst.pdsch_rb_count, 0);
        assert!(inst.average_pdsch_rbs_per_slot() > 0.0);
    }
}
