//! HARQ process state machines (§3 "HARQ process", §4.4 "HARQ Manager").
//!
//! One `DlHarqEntity`/`UlHarqEntity` pair is owned per UE-cell
//! (`ue::UeCell`). Each entity is a fixed-size array of HARQ processes
//! indexed by HARQ id, never growable -- `MAX_NOF_HARQS` bounds it, as the
//! spec requires ("a fixed-size array (<= MAX_NOF_HARQS)").

use crate::rb::RbInterval;
use crate::slice::RanSliceId;
use common::SlotPoint;

pub const MAX_NOF_HARQS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqState {
    Empty,
    WaitingAck,
    PendingRetx,
}

/// Outcome of a DL ack_info update; only the terminal tags propagate to
/// metrics and link adaptation (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlAckUpdate {
    Acked,
    Nacked,
    StillWaiting,
    /// No process was found bound to (ack_slot, harq_bit_index) -- stale or
    /// spurious UCI, ignored.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct DlHarqProcess {
    pub harq_id: u8,
    pub state: HarqState,
    pub ndi: bool,
    pub redundancy_version: u8,
    pub tbs_bytes: u32,
    pub rbs: RbInterval,
    pub slice_id: Option<RanSliceId>,
    pub ack_slot: SlotPoint,
    /// How many PUCCH occasions are still expected to carry an ACK bit for
    /// this process (§3 invariant 1).
    pub pucch_counter: u8,
    pub retx_deadline: Option<SlotPoint>,
}

impl DlHarqProcess {
    fn new(harq_id: u8) -> Self {
        Self {
            harq_id,
            state: HarqState::Empty,
            ndi: false,
            redundancy_version: 0,
            tbs_bytes: 0,
            rbs: RbInterval::empty(),
            slice_id: None,
            ack_slot: SlotPoint::invalid(),
            pucch_counter: 0,
            retx_deadline: None,
        }
    }
}

pub struct DlHarqEntity {
    processes: Vec<DlHarqProcess>,
    retx_timeout_slots: u16,
    ack_timeout_slots: u16,
}

impl DlHarqEntity {
    pub fn new(max_nof_harqs: usize) -> Self {
        assert!(max_nof_harqs <= MAX_NOF_HARQS);
        Self {
            processes: (0..max_nof_harqs).map(|i| DlHarqProcess::new(i as u8)).collect(),
            retx_timeout_slots: 4,
            ack_timeout_slots: 240,
        }
    }

    pub fn configure_timers(&mut self, retx_timeout_slots: u16, ack_timeout_slots: u16) {
        self.retx_timeout_slots = retx_timeout_slots;
        self.ack_timeout_slots = ack_timeout_slots;
    }

    pub fn find_empty(&self) -> Option<u8> {
        self.processes.iter().find(|p| p.state == HarqState::Empty).map(|p| p.harq_id)
    }

    pub fn find_oldest_pending_retx(&self) -> Option<u8> {
        self.processes.iter().find(|p| p.state == HarqState::PendingRetx).map(|p| p.harq_id)
    }

    pub fn has_pending_retx(&self) -> bool {
        self.processes.iter().any(|p| p.state == HarqState::PendingRetx)
    }

    pub fn process(&self, harq_id: u8) -> &DlHarqProcess {
        &self.processes[harq_id as usize]
    }

    /// Allocates an empty process for a new transmission, moving it to
    /// waiting-ack and binding `slice_id` exactly once per attempt (§3
    /// invariant 4: `save_grant_params` is called exactly once per
    /// transmission attempt).
    pub fn alloc_dl_harq(
        &mut self,
        harq_id: u8,
        ack_slot: SlotPoint,
        nof_pucch_occasions: u8,
        tbs_bytes: u32,
        rbs: RbInterval,
        slice_id: RanSliceId,
    ) {
        let p = &mut self.processes[harq_id as usize];
        debug_assert!(matches!(p.state, HarqState::Empty | HarqState::PendingRetx));
        let is_retx = p.state == HarqState::PendingRetx;
        p.state = HarqState::WaitingAck;
        p.ndi = if is_retx { p.ndi } else { !p.ndi };
        p.redundancy_version = if is_retx { (p.redundancy_version + 1) % 4 } else { 0 };
        p.tbs_bytes = tbs_bytes;
        p.rbs = rbs;
        p.slice_id = Some(slice_id);
        p.ack_slot = ack_slot;
        p.pucch_counter = nof_pucch_occasions;
        p.retx_deadline = Some(ack_slot.add(self.retx_timeout_slots as u32));
    }

    /// Processes a received HARQ-ACK/NACK bit for the process bound to
    /// `(ack_slot, harq_bit_index)`. `harq_bit_index` is resolved to a HARQ
    /// id by the caller (the UCI/HARQ bit mapping lives in the UCI
    /// scheduler); here it is taken to already be the HARQ id.
    pub fn dl_ack_info(&mut self, ack_slot: SlotPoint, harq_id: u8, acked: bool) -> DlAckUpdate {
        let Some(p) = self.processes.get_mut(harq_id as usize) else {
            return DlAckUpdate::Unknown;
        };
        if p.state != HarqState::WaitingAck || p.ack_slot != ack_slot {
            return DlAckUpdate::Unknown;
        }
        p.pucch_counter = p.pucch_counter.saturating_sub(1);
        if acked {
            p.state = HarqState::Empty;
            p.retx_deadline = None;
            return DlAckUpdate::Acked;
        }
        if p.pucch_counter == 0 {
            p.state = HarqState::PendingRetx;
            return DlAckUpdate::Nacked;
        }
        DlAckUpdate::StillWaiting
    }

    /// Marks every process bound to `ack_slot` as NACK without updating
    /// link adaptation (§4.4, used by error-indication recovery / UCI
    /// scheduling failure).
    pub fn uci_sched_failed(&mut self, ack_slot: SlotPoint) {
        for p in self.processes.iter_mut() {
            if p.state == HarqState::WaitingAck && p.ack_slot == ack_slot {
                p.state = HarqState::PendingRetx;
            }
        }
    }

    /// Error-indication recovery for a PUSCH/PUCCH discard in `slot` (§7):
    /// every DL HARQ whose ACK was due in `slot` is marked NACK.
    pub fn handle_error_indication(&mut self, slot: SlotPoint) {
        self.uci_sched_failed(slot);
    }

    /// Advances retx timers and the ACK grace window (§4.4). Returns the
    /// HARQ ids that were force-expired as a timeout this slot, for metrics.
    pub fn expire_timers(&mut self, current_slot: SlotPoint) -> Vec<u8> {
        let mut timed_out = Vec::new();
        for p in self.processes.iter_mut() {
            match p.state {
                HarqState::WaitingAck => {
                    if let Some(deadline) = p.retx_deadline {
                        if current_slot.sub(&deadline) >= 0 {
                            p.state = HarqState::PendingRetx;
                        }
                    }
                    let ack_age = current_slot.sub(&p.ack_slot);
                    if ack_age >= self.ack_timeout_slots as i64 {
                        p.state = HarqState::Empty;
                        p.retx_deadline = None;
                        timed_out.push(p.harq_id);
                    }
                }
                _ => {}
            }
        }
        timed_out
    }

    pub fn reset(&mut self, harq_id: u8) {
        let p = &mut self.processes[harq_id as usize];
        p.state = HarqState::Empty;
        p.retx_deadline = None;
        p.slice_id = None;
    }
}

#[derive(Debug, Clone)]
pub struct UlHarqProcess {
    pub harq_id: u8,
    pub state: HarqState,
    pub ndi: bool,
    pub redundancy_version: u8,
    pub tbs_bytes: u32,
    pub rbs: RbInterval,
    pub slice_id: Option<RanSliceId>,
    pub expected_crc_slot: SlotPoint,
    pub retx_deadline: Option<SlotPoint>,
    pub nof_retxs: u8,
}

impl UlHarqProcess {
    fn new(harq_id: u8) -> Self {
        Self {
            harq_id,
            state: HarqState::Empty,
            ndi: false,
            redundancy_version: 0,
            tbs_bytes: 0,
            rbs: RbInterval::empty(),
            slice_id: None,
            expected_crc_slot: SlotPoint::invalid(),
            retx_deadline: None,
            nof_retxs: 0,
        }
    }
}

pub struct UlHarqEntity {
    processes: Vec<UlHarqProcess>,
    retx_timeout_slots: u16,
}

impl UlHarqEntity {
    pub fn new(max_nof_harqs: usize) -> Self {
        assert!(max_nof_harqs <= MAX_NOF_HARQS);
        Self {
            processes: (0..max_nof_harqs).map(|i| UlHarqProcess::new(i as u8)).collect(),
            retx_timeout_slots: 4,
        }
    }

    pub fn configure_timers(&mut self, retx_timeout_slots: u16) {
        self.retx_timeout_slots = retx_timeout_slots;
    }

    pub fn find_empty(&self) -> Option<u8> {
        self.processes.iter().find(|p| p.state == HarqState::Empty).map(|p| p.harq_id)
    }

    pub fn find_oldest_pending_retx(&self) -> Option<u8> {
        self.processes.iter().find(|p| p.state == HarqState::PendingRetx).map(|p| p.harq_id)
    }

    pub fn has_pending_retx(&self) -> bool {
        self.processes.iter().any(|p| p.state == HarqState::PendingRetx)
    }

    pub fn process(&self, harq_id: u8) -> &UlHarqProcess {
        &self.processes[harq_id as usize]
    }

    pub fn alloc_ul_harq(
        &mut self,
        harq_id: u8,
        expected_crc_slot: SlotPoint,
        tbs_bytes: u32,
        rbs: RbInterval,
        slice_id: RanSliceId,
    ) {
        let p = &mut self.processes[harq_id as usize];
        let is_retx = p.state == HarqState::PendingRetx;
        p.state = HarqState::WaitingAck;
        p.ndi = if is_retx { p.ndi } else { !p.ndi };
        p.redundancy_version = if is_retx { (p.redundancy_version + 1) % 4 } else { 0 };
        if !is_retx {
            p.nof_retxs = 0;
        }
        p.tbs_bytes = tbs_bytes;
        p.rbs = rbs;
        p.slice_id = Some(slice_id);
        p.expected_crc_slot = expected_crc_slot;
        p.retx_deadline = Some(expected_crc_slot.add(self.retx_timeout_slots as u32));
    }

    pub fn crc_indication(&mut self, harq_id: u8, success: bool) {
        let Some(p) = self.processes.get_mut(harq_id as usize) else { return };
        if p.state != HarqState::WaitingAck {
            return;
        }
        if success {
            p.state = HarqState::Empty;
            p.retx_deadline = None;
        } else {
            p.state = HarqState::PendingRetx;
            p.nof_retxs += 1;
        }
    }

    /// Error-indication recovery (§7): zero-retx UL HARQs in `slot` are reset
    /// for softbuffer alignment; HARQs with retxs are marked NACK.
    pub fn handle_error_indication(&mut self, slot: SlotPoint) {
        for p in self.processes.iter_mut() {
            if p.state == HarqState::WaitingAck && p.expected_crc_slot == slot {
                if p.nof_retxs == 0 {
                    p.state = HarqState::Empty;
                    p.retx_deadline = None;
                } else {
                    p.state = HarqState::PendingRetx;
                }
            }
        }
    }

    pub fn expire_timers(&mut self, current_slot: SlotPoint) -> Vec<u8> {
        let mut timed_out = Vec::new();
        for p in self.processes.iter_mut() {
            if p.state == HarqState::WaitingAck {
                if let Some(deadline) = p.retx_deadline {
                    if current_slot.sub(&deadline) >= 0 {
                        p.state = HarqState::PendingRetx;
                        timed_out.push(p.harq_id);
                    }
                }
            }
        }
        timed_out
    }
}

/// Convenience bundle of both HARQ entities for one UE-cell.
pub struct HarqEntityPair {
    pub dl: DlHarqEntity,
    pub ul: UlHarqEntity,
}

impl HarqEntityPair {
    pub fn new(max_nof_harqs: usize) -> Self {
        Self {
            dl: DlHarqEntity::new(max_nof_harqs),
            ul: UlHarqEntity::new(max_nof_harqs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::RanSliceId;

    fn sp(n: u32) -> SlotPoint {
        SlotPoint::new(1, n)
    }

    #[test]
    fn dl_harq_ack_frees_process_for_reuse_next_slot() {
        // End-to-end scenario 4: HARQ0 at slot T, k1=4, ACK at T+4 -> empty,
        // reusable at T+5.
        let mut ent = DlHarqEntity::new(8);
        let t = sp(100);
        let ack_slot = t.add(4);
        ent.alloc_dl_harq(0, ack_slot, 1, 1500, RbInterval::new(0, 20), RanSliceId::default_drb());
        assert_eq!(ent.find_empty(), Some(1));
        let update = ent.dl_ack_info(ack_slot, 0, true);
        assert_eq!(update, DlAckUpdate::Acked);
        assert_eq!(ent.process(0).state, HarqState::Empty);
        assert_eq!(ent.find_empty(), Some(0));
    }

    #[test]
    fn dl_harq_pucch_counter_reaching_zero_without_ack_goes_pending_retx() {
        let mut ent = DlHarqEntity::new(8);
        let ack_slot = sp(104);
        ent.alloc_dl_harq(2, ack_slot, 2, 1500, RbInterval::new(0, 20), RanSliceId::default_drb());
        assert_eq!(ent.dl_ack_info(ack_slot, 2, false), DlAckUpdate::StillWaiting);
        assert_eq!(ent.process(2).state, HarqState::WaitingAck);
        assert_eq!(ent.dl_ack_info(ack_slot, 2, false), DlAckUpdate::Nacked);
        assert_eq!(ent.process(2).state, HarqState::PendingRetx);
    }

    #[test]
    fn error_indication_forces_pending_retx_reusing_original_tbs_and_rbs() {
        // End-to-end scenario 5.
        let mut ent = DlHarqEntity::new(8);
        let t = sp(200);
        let ack_slot = t.add(4);
        let rbs = RbInterval::new(5, 25);
        ent.alloc_dl_harq(0, ack_slot, 1, 2000, rbs, RanSliceId::default_drb());
        ent.handle_error_indication(ack_slot);
        assert_eq!(ent.process(0).state, HarqState::PendingRetx);
        assert_eq!(ent.process(0).tbs_bytes, 2000);
        assert_eq!(ent.process(0).rbs, rbs);
    }

    #[test]
    fn retx_timeout_forces_pending_retx_regardless_of_uci() {
        let mut ent = DlHarqEntity::new(4);
        ent.configure_timers(4, 240);
        let ack_slot = sp(10);
        ent.alloc_dl_harq(0, ack_slot, 1, 1000, RbInterval::new(0, 10), RanSliceId::default_drb());
        let timed_out = ent.expire_timers(sp(14));
        assert_eq!(ent.process(0).state, HarqState::PendingRetx);
        assert!(timed_out.is_empty()); // retx deadline != ack timeout
    }

    #[test]
    fn ack_grace_window_force_expires_to_empty() {
        let mut ent = DlHarqEntity::new(4);
        ent.configure_timers(4, 240);
        let ack_slot = sp(0);
        ent.alloc_dl_harq(0, ack_slot, 1, 1000, RbInterval::new(0, 10), RanSliceId::default_drb());
        let timed_out = ent.expire_timers(sp(240));
        assert_eq!(ent.process(0).state, HarqState::Empty);
        assert_eq!(timed_out, vec![0]);
    }

    #[test]
    fn ul_error_indication_resets_zero_retx_marks_nack_otherwise() {
        let mut ent = UlHarqEntity::new(4);
        let slot = sp(50);
        ent.alloc_ul_harq(0, slot, 800, RbInterval::new(0, 10), RanSliceId::srb());
        ent.handle_error_indication(slot);
        assert_eq!(ent.process(0).state, HarqState::Empty);

        ent.alloc_ul_harq(1, slot, 800, RbInterval::new(0, 10), RanSliceId::srb());
        ent.crc_indication(1, false); // first retx
        ent.alloc_ul_harq(1, slot.add(8), 800, RbInterval::new(0, 10), RanSliceId::srb());
        ent.handle_error_indication(slot.add(8));
        assert_eq!(ent.process(1).state, HarqState::PendingRetx);
    }
}
