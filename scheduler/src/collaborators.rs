//! Trait seams for the out-of-scope common-channel sub-schedulers the cell
//! scheduler invokes in fixed order (§1 "Out of scope", §4.1 step 5: "SSB →
//! CSI-RS → SIB1 → PUCCH guardbands → PRACH → RA → paging"). Grounded on
//! `lib/scheduler`'s sub-scheduler interfaces in the original source; the
//! teacher contributes nothing here (its own PHY layer does not model a
//! cell-scheduler pipeline), so every trait below is new and each ships a
//! no-op default so `CellScheduler` is usable before a PHY integrator wires
//! in the real collaborators.

use crate::grid::{PdschBroadcast, PrbBitmap, RarGrant};
use common::SlotPoint;

/// Places the SSB on the grid for slots where it is configured to transmit.
/// Out of scope per §1 ("RACH/SSB/SIB/paging common-channel sub-schedulers");
/// the cell scheduler only needs to know whether this slot carries one, since
/// that gates CSI-RS/PDSCH multiplexing (§4.2 "DL candidates are skipped
/// if... CSI-RS is present").
pub trait SsbScheduler: Send {
    fn schedule_ssb(&mut self, slot_tx: SlotPoint, used_prbs: &mut PrbBitmap) -> bool;
}

/// Places CSI-RS resources and reports whether any were placed this slot.
pub trait CsiRsScheduler: Send {
    fn schedule_csi_rs(&mut self, slot_tx: SlotPoint, used_prbs: &mut PrbBitmap) -> bool;
}

/// Builds and schedules SIB1/other SI messages.
pub trait Sib1Scheduler: Send {
    fn schedule_sib1(&mut self, slot_tx: SlotPoint, used_prbs: &mut PrbBitmap) -> Option<PdschBroadcast>;
}

/// Random-access: RAR + Msg3 grants for preambles the RACH sub-scheduler has
/// already resolved into a contention-resolution plan.
pub trait RandomAccessScheduler: Send {
    fn schedule_ra(&mut self, slot_tx: SlotPoint, used_prbs: &mut PrbBitmap) -> Vec<RarGrant>;
}

/// Paging PDSCH placement.
pub trait PagingScheduler: Send {
    fn schedule_paging(&mut self, slot_tx: SlotPoint, used_prbs: &mut PrbBitmap) -> Vec<PdschBroadcast>;
}

/// Fallback (pre-RRC-setup) scheduler for SRB0/Msg3/ContentionResolution
/// grants (§2 step 5: "Fallback scheduler (external) places SRB0/Msg3/
/// ContentionResolution grants"). The UE scheduler (this crate's core) skips
/// fallback UEs (`Ue::is_fallback`); this collaborator owns them instead.
pub trait FallbackScheduler: Send {
    fn schedule_fallback(&mut self, slot_tx: SlotPoint, used_prbs: &mut PrbBitmap);
}

/// No-op implementations of every collaborator trait, used by `gnb`'s
/// synthetic harness and as the default when a PHY integrator has not yet
/// wired in real sub-schedulers.
#[derive(Debug, Default)]
pub struct NullCollaborators;

impl SsbScheduler for NullCollaborators {
    fn schedule_ssb(&mut self, _slot_tx: SlotPoint, _used_prbs: &mut PrbBitmap) -> bool {
        false
    }
}

impl CsiRsScheduler for NullCollaborators {
    fn schedule_csi_rs(&mut self, _slot_tx: SlotPoint, _used_prbs: &mut PrbBitmap) -> bool {
        false
    }
}

impl RandomAccessScheduler for NullCollaborators {
    fn schedule_ra(&mut self, _slot_tx: SlotPoint, _used_prbs: &mut PrbBitmap) -> Vec<RarGrant> {
        Vec::new()
    }
}

impl PagingScheduler for NullCollaborators {
    fn schedule_paging(&mut self, _slot_tx: SlotPoint, _used_prbs: &mut PrbBitmap) -> Vec<PdschBroadcast> {
        Vec::new()
    }
}

impl FallbackScheduler for NullCollaborators {
    fn schedule_fallback(&mut self, _slot_tx: SlotPoint, _used_prbs: &mut PrbBitmap) {}
}

impl Sib1Scheduler for NullCollaborators {
    fn schedule_sib1(&mut self, _slot_tx: SlotPoint, _used_prbs: &mut PrbBitmap) -> Option<PdschBroadcast> {
        None
    }
}

impl NullCollaborators {
    /// Convenience bundle of no-op collaborators, for callers (tests, the
    /// `gnb` demonstration harness) that have no real PHY integrator wired
    /// in yet.
    pub fn boxed() -> crate::cell_scheduler::CellSchedulerCollaborators {
        crate::cell_scheduler::CellSchedulerCollaborators {
            ssb: Box::new(NullCollaborators),
            csi_rs: Box::new(NullCollaborators),
            sib1: Box::new(NullCollaborators),
            ra: Box::new(NullCollaborators),
            paging: Box::new(NullCollaborators),
            fallback: Box::new(NullCollaborators),
        }
    }
}

/// SIB1 collaborator backed by `layers::mac::sib1::Sib1Generator`, broadcast
/// on a fixed periodicity (default 160ms, §3GPP TS 38.331's SIB1
/// repetition period choice left to the caller via `period_slots`).
pub struct Sib1Collaborator {
    generator: layers::mac::sib1::Sib1Generator,
    period_slots: u32,
    ssb_index: u8,
}

impl Sib1Collaborator {
    pub fn new(cfg: layers::mac::sib1::Sib1Config, period_slots: u32) -> Self {
        Self { generator: layers::mac::sib1::Sib1Generator::new(cfg), period_slots: period_slots.max(1), ssb_index: 0 }
    }
}

impl Sib1Scheduler for Sib1Collaborator {
    fn schedule_sib1(&mut self, slot_tx: SlotPoint, _used_prbs: &mut PrbBitmap) -> Option<PdschBroadcast> {
        if slot_tx.count() % self.period_slots != 0 {
            return None;
        }
        match self.generator.generate_sib1() {
            Ok(payload) => Some(PdschBroadcast { ssb_index: self.ssb_index, payload_bytes: payload.len() as u32 }),
            Err(err) => {
                tracing::warn!(%err, "SIB1 generation failed, skipping this period");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ResourceGrid;

    #[test]
    fn null_collaborators_place_nothing() {
        let mut c = NullCollaborators;
        let mut grid = ResourceGrid::new(106, 4);
        let slot = SlotPoint::new(0, 0);
        grid.slot_indication(slot);
        let alloc = grid.allocator_mut(slot).unwrap();
        assert!(!SsbScheduler::schedule_ssb(&mut c, slot, &mut alloc.dl_prbs));
        assert!(RandomAccessScheduler::schedule_ra(&mut c, slot, &mut alloc.dl_prbs).is_empty());
    }
}
