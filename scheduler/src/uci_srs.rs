//! UCI/SRS scheduler: periodic SR/CSI/SRS placement plus on-demand
//! HARQ-ACK PUCCH allocation (§4.6). Grounded on
//! `lib/scheduler/uci_scheduling` and `lib/scheduler/srs`'s wheel-based
//! periodic-resource placement in the original scheduler.

use crate::config::PucchResourceSetConfig;
use crate::grid::{PucchGrant, SrsGrant};
use common::Rnti;
use std::collections::HashMap;

/// Maximum supported periodic-resource period, in slots (§4.6 "Slot wheel").
pub const MAX_WHEEL_SIZE: usize = 2560;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicResourceKind {
    Sr,
    Csi,
    Srs,
}

#[derive(Debug, Clone, Copy)]
struct PeriodicResource {
    rnti: Rnti,
    kind: PeriodicResourceKind,
    period: u32,
    offset: u32,
}

/// One UE's PUCCH occasion bookkeeping for a given ack slot: whether it
/// already carries other UCI (merge tie-break) and whether it has a
/// colliding PUSCH (multiplex tie-break), per §4.6 "On-demand HARQ-ACK".
#[derive(Debug, Clone, Copy, Default)]
pub struct PucchOccasionState {
    pub already_has_uci: bool,
    pub has_colliding_pusch: bool,
}

/// Places periodic SR/CSI/SRS resources on the grid and allocates on-demand
/// PUCCH HARQ-ACK resources.
#[derive(Default)]
pub struct UciSrsScheduler {
    wheel: Vec<PeriodicResource>,
    /// RNTIs with an active positioning report request (§4.6 "Positioning").
    positioning_requested: HashMap<Rnti, bool>,
}

impl UciSrsScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_periodic(&mut self, rnti: Rnti, kind: PeriodicResourceKind, period: u32, offset: u32) {
        debug_assert!(period as usize <= MAX_WHEEL_SIZE, "periodic resource period exceeds wheel size");
        self.wheel.push(PeriodicResource { rnti, kind, period, offset });
    }

    pub fn unregister_all(&mut self, rnti: Rnti) {
        self.wheel.retain(|r| r.rnti != rnti);
    }

    /// Places every periodic resource whose wheel slot matches `slot_count`
    /// (§4.6: "registered in every wheel slot `w` with `w = O (mod P)`").
    pub fn slot_indication(&self, slot_count: u32, pucch: &mut Vec<PucchGrant>, srs: &mut Vec<SrsGrant>) {
        for r in &self.wheel {
            if slot_count % r.period != r.offset % r.period {
                continue;
            }
            match r.kind {
                PeriodicResourceKind::Sr => pucch.push(PucchGrant {
                    rnti: r.rnti,
                    resource_indicator: 0,
                    harq_ack_bits: 0,
                    sr_bit: true,
                    csi_bits: 0,
                }),
                PeriodicResourceKind::Csi => pucch.push(PucchGrant {
                    rnti: r.rnti,
                    resource_indicator: 1,
                    harq_ack_bits: 0,
                    sr_bit: false,
                    csi_bits: 11,
                }),
                PeriodicResourceKind::Srs => srs.push(SrsGrant {
                    rnti: r.rnti,
                    positioning_report_requested: self.positioning_requested.get(&r.rnti).copied().unwrap_or(false),
                }),
            }
        }
    }

    /// Allocates a HARQ-ACK resource for `rnti`'s PUCCH in the given ack
    /// slot, applying the two tie-breaks: prefer merging into a resource
    /// already carrying other UCI for this UE; otherwise multiplex onto a
    /// colliding PUSCH instead of PUCCH (§4.6 "On-demand HARQ-ACK").
    pub fn alloc_harq_ack(
        &self,
        rnti: Rnti,
        state: PucchOccasionState,
        pucch: &mut Vec<PucchGrant>,
        resources: &PucchResourceSetConfig,
    ) -> HarqAckPlacement {
        if state.has_colliding_pusch {
            return HarqAckPlacement::MultiplexedOnPusch;
        }
        if state.already_has_uci {
            if let Some(existing) = pucch.iter_mut().find(|g| g.rnti == rnti) {
                existing.harq_ack_bits += 1;
                return HarqAckPlacement::Merged;
            }
        }
        let resource_indicator = resources
            .harq_ack_resource_indicators
            .iter()
            .copied()
            .find(|candidate| !pucch.iter().any(|g| g.resource_indicator == *candidate))
            .or_else(|| resources.harq_ack_resource_indicators.first().copied())
            .unwrap_or(2);
        pucch.push(PucchGrant { rnti, resource_indicator, harq_ack_bits: 1, sr_bit: false, csi_bits: 0 });
        HarqAckPlacement::NewPucch
    }

    /// A positioning measurement request installs SRS for `rnti` (which may
    /// not be a connected UE of this cell) and flags every SRS PDU for it
    /// until the matching stop request (§4.6 "Positioning").
    pub fn request_positioning(&mut self, rnti: Rnti, period: u32, offset: u32) {
        self.positioning_requested.insert(rnti, true);
        self.register_periodic(rnti, PeriodicResourceKind::Srs, period, offset);
    }

    pub fn stop_positioning(&mut self, rnti: Rnti) {
        self.positioning_requested.remove(&rnti);
        self.unregister_all(rnti);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqAckPlacement {
    NewPucch,
    Merged,
    MultiplexedOnPusch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_resource_fires_on_matching_wheel_slot() {
        let mut sched = UciSrsScheduler::new();
        sched.register_periodic(Rnti(0x4601), PeriodicResourceKind::Sr, 10, 3);
        let mut pucch = Vec::new();
        let mut srs = Vec::new();
        sched.slot_indication(13, &mut pucch, &mut srs);
        assert_eq!(pucch.len(), 1);
        assert!(pucch[0].sr_bit);
        pucch.clear();
        sched.slot_indication(14, &mut pucch, &mut srs);
        assert!(pucch.is_empty());
    }

    #[test]
    fn colliding_pusch_multiplexes_instead_of_new_pucch() {
        let sched = UciSrsScheduler::new();
        let mut pucch = Vec::new();
        let placement = sched.alloc_harq_ack(
            Rnti(1),
            PucchOccasionState { already_has_uci: false, has_colliding_pusch: true },
            &mut pucch,
            &PucchResourceSetConfig::default(),
        );
        assert_eq!(placement, HarqAckPlacement::MultiplexedOnPusch);
        assert!(pucch.is_empty());
    }

    #[test]
    fn existing_uci_merges_harq_ack_bit() {
        let sched = UciSrsScheduler::new();
        let mut pucch = vec![PucchGrant { rnti: Rnti(1), resource_indicator: 1, harq_ack_bits: 0, sr_bit: true, csi_bits: 0 }];
        let placement = sched.alloc_harq_ack(
            Rnti(1),
            PucchOccasionState { already_has_uci: true, has_colliding_pusch: false },
            &mut pucch,
            &PucchResourceSetConfig::default(),
        );
        assert_eq!(placement, HarqAckPlacement::Merged);
        assert_eq!(pucch.len(), 1);
        assert_eq!(pucch[0].harq_ack_bits, 1);
    }

    #[test]
    fn new_pucch_picks_first_free_resource_indicator() {
        let sched = UciSrsScheduler::new();
        let resources = PucchResourceSetConfig::default();
        let mut pucch = vec![PucchGrant { rnti: Rnti(9), resource_indicator: 2, harq_ack_bits: 1, sr_bit: false, csi_bits: 0 }];
        let placement = sched.alloc_harq_ack(
            Rnti(1),
            PucchOccasionState { already_has_uci: false, has_colliding_pusch: false },
            &mut pucch,
            &resources,
        );
        assert_eq!(placement, HarqAckPlacement::NewPucch);
        let new_grant = pucch.iter().find(|g| g.rnti == Rnti(1)).unwrap();
        assert_eq!(new_grant.resource_indicator, 3);
    }

    #[test]
    fn positioning_request_flags_srs_until_stop() {
        let mut sched = UciSrsScheduler::new();
        sched.request_positioning(Rnti(99), 40, 0);
        let mut pucch = Vec::new();
        let mut srs = Vec::new();
        sched.slot_indication(0, &mut pucch, &mut srs);
        assert!(srs[0].positioning_report_requested);
        sched.stop_positioning(Rnti(99));
        srs.clear();
        sched.slot_indication(40, &mut pucch, &mut srs);
        assert!(srs.is_empty());
    }
}
