//! Intra-slice scheduler: fills a slice candidate's PDSCH/PUSCH grants for
//! the UEs that belong to it (§4.3). Grounded on
//! `lib/scheduler/ue_scheduling/ue_scheduler_impl.cpp`'s newTx/retx split and
//! `scheduler_policy.h`'s priority-then-allocate structure.

use crate::alloc::{AllocOutcome, SlotGrantBudget};
use crate::grid::{OfdmSymbolRange, PdcchGrant, PdschGrant, PrbBitmap, PucchGrant, PuschGrant};
use crate::policy::{SchedulerPolicy, UeSchedContext};
use crate::rb::RbInterval;
use crate::slice::{Direction, RanSliceCandidate};
use crate::ue::{UeIndex, UeRepository};
use common::{Rnti, SlotPoint};
use tracing::{trace, warn};

/// Minimum viable TBS for a newTx grant; used as a fallback MCS/size model
/// since this crate does not own link adaptation (out of scope, §1).
const MIN_GRANT_TBS_BYTES: u32 = 256;

/// One surviving Stage-1 candidate, carried through Stage 2/3.
struct GrantBuilder {
    ue_idx: UeIndex,
    rnti: Rnti,
    harq_id: u8,
    expected_rbs: u32,
    is_retx: bool,
    retx_rbs: RbInterval,
    retx_tbs_bytes: u32,
}

/// Fills DL grants for one slice candidate. Returns the number of RBs
/// actually allocated this call, for the inter-slice scheduler's RB-budget
/// bookkeeping and slice-instance accounting (the caller calls
/// `candidate.store_grant(total)` itself).
pub fn schedule_dl_candidate(
    candidate: &mut RanSliceCandidate<'_>,
    policy: &mut dyn SchedulerPolicy,
    ues: &mut UeRepository,
    budget: &mut SlotGrantBudget,
    symbols: OfdmSymbolRange,
    used_prbs: &mut PrbBitmap,
    pdcch_dl: &mut Vec<PdcchGrant>,
    pdsch_ue: &mut Vec<PdschGrant>,
    pucch: &mut Vec<PucchGrant>,
    k1_slots: u8,
) -> u32 {
    debug_assert_eq!(candidate.direction(), Direction::Dl);
    let slot_tx = candidate.slot_tx();
    let mut builders = Vec::new();
    let mut uci_restricted = false;

    // Stage 0: retransmissions, oldest pending-retx first.
    for ue_idx in candidate.get_slice_ues().dl_ue_indices().collect::<Vec<_>>() {
        if budget.pdsch_exhausted() {
            break;
        }
        let Ok(ue) = ues.get_mut(ue_idx) else { continue };
        let rnti = ue.crnti;
        let Some(cell) = ue.pcell_mut() else { continue };
        let Some(harq_id) = cell.harq.dl.find_oldest_pending_retx() else { continue };
        let proc = cell.harq.dl.process(harq_id);
        if proc.slice_id != Some(candidate.id()) {
            continue;
        }
        let expected_rbs = proc.rbs.len() as u32;
        let retx_rbs = proc.rbs;
        let retx_tbs_bytes = proc.tbs_bytes;
        if budget.try_reserve_pdcch().stops_slice() {
            break;
        }
        builders.push(GrantBuilder { ue_idx, rnti, harq_id, expected_rbs, is_retx: true, retx_rbs, retx_tbs_bytes });
    }

    // Stage 1: newTx candidate selection, round-robin walk from the group
    // offset, policy priority sort.
    let mut newtx_candidates = candidate.get_slice_ues().dl_ue_indices().collect::<Vec<_>>();
    newtx_candidates.sort_by_key(|ue| ue.0);
    let mut scored: Vec<(UeIndex, i64)> = Vec::new();
    for (rr_index, &ue_idx) in newtx_candidates.iter().enumerate() {
        let Ok(ue) = ues.get(ue_idx) else { continue };
        if ue.is_fallback() {
            continue;
        }
        let pending_bytes = ue.dl_lc.total_pending_bytes_for_slice(candidate.id());
        if pending_bytes == 0 {
            continue;
        }
        let Some(cell) = ue.pcell() else { continue };
        let has_empty = cell.harq.dl.find_empty().is_some();
        let has_retx = cell.harq.dl.has_pending_retx();
        if !has_empty && !has_retx {
            warn!(ue = ue_idx.0, "late HARQ: no empty or pending-retx DL process available");
            continue;
        }
        if !has_empty {
            // Its only available process is already claimed by Stage 0 this
            // slot; nothing left to grant a newTx on.
            continue;
        }
        let hol_delay = ue.dl_lc.oldest_hol_toa_for_slice(candidate.id()).map(|toa| slot_tx.count().saturating_sub(toa)).unwrap_or(0);
        let ctx = UeSchedContext { ue_idx, rr_index, pending_bytes, hol_delay_slots: hol_delay };
        let prio = policy.compute_ue_dl_priority(&ctx);
        if prio == crate::policy::FORBID_SCHED_PRIORITY {
            continue;
        }
        scored.push((ue_idx, prio));
    }
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    for (ue_idx, _) in scored {
        if budget.pdsch_exhausted() {
            break;
        }
        let Ok(ue) = ues.get_mut(ue_idx) else { continue };
        if uci_restricted {
            // After a UCI allocation failure, only UEs that already have a
            // PUCCH or a future PUSCH in the window are still eligible
            // (§4.3 Stage 2). Without a live PUSCH schedule to consult here,
            // conservatively skip all further newTx candidates.
            break;
        }
        let Some(cell) = ue.pcell_mut() else { continue };
        let Some(harq_id) = cell.harq.dl.find_empty() else { continue };

        match budget.try_reserve_pdcch() {
            AllocOutcome::SkipSlot => break,
            AllocOutcome::SkipUe | AllocOutcome::InvalidParams => continue,
            AllocOutcome::Success | AllocOutcome::UciAllocFailed => {}
        }
        match budget.try_reserve_pucch() {
            AllocOutcome::UciAllocFailed => {
                uci_restricted = true;
            }
            AllocOutcome::SkipSlot => break,
            _ => {}
        }

        let pending_bytes = ue.dl_lc.total_pending_bytes_for_slice(candidate.id());
        builders.push(GrantBuilder {
            ue_idx,
            rnti: ue.crnti,
            harq_id,
            expected_rbs: estimate_rbs_for_bytes(pending_bytes),
            is_retx: false,
            retx_rbs: RbInterval::empty(),
            retx_tbs_bytes: 0,
        });
    }

    if builders.is_empty() {
        return 0;
    }

    // Stage 3: RB/MCS materialisation with equal split + carried remainder.
    let rb_budget = candidate.remaining_rbs();
    let allocations = materialise_vrbs(&builders, rb_budget, used_prbs, symbols);

    let mut total_allocated = 0u32;
    for (builder, rbs) in builders.iter().zip(allocations.iter()) {
        if rbs.is_empty() {
            // Stage-3 failure: kept in the result with zero RBs so the
            // downstream PDU builder skips it without HARQ state drift.
            pdsch_ue.push(PdschGrant {
                rnti: builder.rnti,
                harq_id: builder.harq_id,
                rbs: RbInterval::empty(),
                symbols,
                mcs: 0,
                tbs_bytes: 0,
                nof_layers: 1,
                new_data: !builder.is_retx,
                alloc_type: crate::grid::FreqAllocType::Type1,
            });
            continue;
        }
        used_prbs.mark_used(*rbs, symbols);
        total_allocated += rbs.len() as u32;

        let ack_slot = slot_tx.add(k1_slots as u32);
        if let Ok(ue) = ues.get_mut(builder.ue_idx) {
            if let Some(cell) = ue.pcell_mut() {
                let tbs = if builder.is_retx { builder.retx_tbs_bytes } else { rbs_to_tbs_bytes(rbs.len()) };
                cell.harq.dl.alloc_dl_harq(builder.harq_id, ack_slot, 1, tbs, *rbs, candidate.id());
            }
        }

        pdsch_ue.push(PdschGrant {
            rnti: builder.rnti,
            harq_id: builder.harq_id,
            rbs: *rbs,
            symbols,
            mcs: 10,
            tbs_bytes: if builder.is_retx { builder.retx_tbs_bytes } else { rbs_to_tbs_bytes(rbs.len()) },
            nof_layers: 1,
            new_data: !builder.is_retx,
            alloc_type: crate::grid::FreqAllocType::Type1,
        });
        pdcch_dl.push(PdcchGrant { rnti: builder.rnti, aggregation_level: 4, cce_index: 0, is_dl: true });
        pucch.push(PucchGrant {
            rnti: builder.rnti,
            resource_indicator: 0,
            harq_ack_bits: 1,
            sr_bit: false,
            csi_bits: 0,
        });

        budget.reserve_pdsch(rbs.len() as u32);
        trace!(ue = builder.ue_idx.0, rbs = rbs.len(), retx = builder.is_retx, "DL grant allocated");
    }

    // Stage 4: policy notification.
    for (builder, rbs) in builders.iter().zip(allocations.iter()) {
        if !rbs.is_empty() {
            policy.dl_sched_ue_done(builder.ue_idx, rbs.len() as u32);
        }
    }

    if total_allocated > 0 {
        candidate.store_grant(total_allocated);
    }
    total_allocated
}

/// Fills UL grants for one slice candidate; mirrors [`schedule_dl_candidate`]
/// without the PUCCH HARQ-ACK pre-allocation (UL has no HARQ-ACK of its
/// own -- CRC indication closes the loop instead).
pub fn schedule_ul_candidate(
    candidate: &mut RanSliceCandidate<'_>,
    policy: &mut dyn SchedulerPolicy,
    ues: &mut UeRepository,
    budget: &mut SlotGrantBudget,
    symbols: OfdmSymbolRange,
    used_prbs: &mut PrbBitmap,
    pdcch_ul: &mut Vec<PdcchGrant>,
    pusch: &mut Vec<PuschGrant>,
) -> u32 {
    debug_assert_eq!(candidate.direction(), Direction::Ul);
    let slot_tx = candidate.slot_tx();
    let mut builders = Vec::new();

    for ue_idx in candidate.get_slice_ues().ul_ue_indices().collect::<Vec<_>>() {
        if budget.pusch_exhausted() {
            break;
        }
        let Ok(ue) = ues.get_mut(ue_idx) else { continue };
        let rnti = ue.crnti;
        let Some(cell) = ue.pcell_mut() else { continue };
        let Some(harq_id) = cell.harq.ul.find_oldest_pending_retx() else { continue };
        let proc = cell.harq.ul.process(harq_id);
        if proc.slice_id != Some(candidate.id()) {
            continue;
        }
        let expected_rbs = proc.rbs.len() as u32;
        let retx_rbs = proc.rbs;
        let retx_tbs_bytes = proc.tbs_bytes;
        if budget.try_reserve_pdcch().stops_slice() {
            break;
        }
        builders.push(GrantBuilder { ue_idx, rnti, harq_id, expected_rbs, is_retx: true, retx_rbs, retx_tbs_bytes });
    }

    let mut newtx_candidates = candidate.get_slice_ues().ul_ue_indices().collect::<Vec<_>>();
    newtx_candidates.sort_by_key(|ue| ue.0);
    let mut scored: Vec<(UeIndex, i64)> = Vec::new();
    for (rr_index, &ue_idx) in newtx_candidates.iter().enumerate() {
        let Ok(ue) = ues.get(ue_idx) else { continue };
        if ue.is_fallback() {
            continue;
        }
        let pending_bytes = ue.ul_lcg.total_pending_bytes_for_slice(candidate.id());
        if pending_bytes == 0 && !ue.sr_pending {
            continue;
        }
        let Some(cell) = ue.pcell() else { continue };
        if cell.harq.ul.find_empty().is_none() {
            continue;
        }
        // SR-only grants (no reported BSR yet) still get the minimum grant
        // size (§8 end-to-end scenario 3: "TBS >= 512 bytes").
        let effective_bytes = pending_bytes.max(if ue.sr_pending { 512 } else { 0 });
        let ctx = UeSchedContext { ue_idx, rr_index, pending_bytes: effective_bytes, hol_delay_slots: 0 };
        let prio = policy.compute_ue_ul_priority(&ctx);
        if prio == crate::policy::FORBID_SCHED_PRIORITY {
            continue;
        }
        scored.push((ue_idx, prio));
    }
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    for (ue_idx, _) in scored {
        if budget.pusch_exhausted() {
            break;
        }
        let Ok(ue) = ues.get_mut(ue_idx) else { continue };
        let Some(cell) = ue.pcell_mut() else { continue };
        let Some(harq_id) = cell.harq.ul.find_empty() else { continue };
        if budget.try_reserve_pdcch().stops_slice() {
            break;
        }
        let pending_bytes = ue.ul_lcg.total_pending_bytes_for_slice(candidate.id()).max(if ue.sr_pending { 512 } else { 0 });
        builders.push(GrantBuilder {
            ue_idx,
            rnti: ue.crnti,
            harq_id,
            expected_rbs: estimate_rbs_for_bytes(pending_bytes),
            is_retx: false,
            retx_rbs: RbInterval::empty(),
            retx_tbs_bytes: 0,
        });
    }

    if builders.is_empty() {
        return 0;
    }

    let rb_budget = candidate.remaining_rbs();
    let allocations = materialise_vrbs(&builders, rb_budget, used_prbs, symbols);

    let mut total_allocated = 0u32;
    for (builder, rbs) in builders.iter().zip(allocations.iter()) {
        if rbs.is_empty() {
            pusch.push(PuschGrant {
                rnti: builder.rnti,
                harq_id: builder.harq_id,
                rbs: RbInterval::empty(),
                symbols,
                mcs: 0,
                tbs_bytes: 0,
                new_data: !builder.is_retx,
                uci_multiplexed: false,
            });
            continue;
        }
        used_prbs.mark_used(*rbs, symbols);
        total_allocated += rbs.len() as u32;

        if let Ok(ue) = ues.get_mut(builder.ue_idx) {
            if let Some(cell) = ue.pcell_mut() {
                let tbs = if builder.is_retx { builder.retx_tbs_bytes } else { rbs_to_tbs_bytes(rbs.len()) };
                cell.harq.ul.alloc_ul_harq(builder.harq_id, slot_tx, tbs, *rbs, candidate.id());
            }
        }

        pusch.push(PuschGrant {
            rnti: builder.rnti,
            harq_id: builder.harq_id,
            rbs: *rbs,
            symbols,
            mcs: 10,
            tbs_bytes: if builder.is_retx { builder.retx_tbs_bytes } else { rbs_to_tbs_bytes(rbs.len()) },
            new_data: !builder.is_retx,
            uci_multiplexed: false,
        });
        pdcch_ul.push(PdcchGrant { rnti: builder.rnti, aggregation_level: 4, cce_index: 0, is_dl: false });

        budget.reserve_pusch(rbs.len() as u32);
        trace!(ue = builder.ue_idx.0, rbs = rbs.len(), retx = builder.is_retx, "UL grant allocated");
    }

    for (builder, rbs) in builders.iter().zip(allocations.iter()) {
        if !rbs.is_empty() {
            policy.ul_sched_ue_done(builder.ue_idx, rbs.len() as u32);
        }
    }

    if total_allocated > 0 {
        candidate.store_grant(total_allocated);
    }
    total_allocated
}

/// Splits `rb_budget` equally across `builders`, carrying the integer
/// remainder forward so earlier under-allocated grants are credited by
/// later ones (§4.3 Stage 3: "rbs_missing" carry). Retransmissions keep
/// their original RB interval outright (mod Ncb is a link-adaptation
/// concern outside this crate's scope).
fn materialise_vrbs(
    builders: &[GrantBuilder],
    rb_budget: u32,
    used_prbs: &PrbBitmap,
    symbols: OfdmSymbolRange,
) -> Vec<RbInterval> {
    let mut out = Vec::with_capacity(builders.len());
    let mut cursor = find_first_free(used_prbs, symbols, 0);
    let mut remaining_budget = rb_budget;
    let nof_newtx = builders.iter().filter(|b| !b.is_retx).count().max(1) as u32;
    let mut rbs_missing = 0u32;

    for builder in builders {
        if builder.is_retx {
            if used_prbs.is_free(builder.retx_rbs, symbols) {
                out.push(builder.retx_rbs);
            } else {
                out.push(RbInterval::empty());
            }
            continue;
        }

        let share = (remaining_budget / nof_newtx) + rbs_missing;
        let wanted = builder.expected_rbs.min(share).min(remaining_budget);
        if wanted == 0 {
            out.push(RbInterval::empty());
            continue;
        }
        let Some(start) = find_first_free(used_prbs, symbols, cursor) else {
            out.push(RbInterval::empty());
            continue;
        };
        let stop = (start as u32 + wanted).min(used_prbs.nof_prbs() as u32) as u16;
        let granted = RbInterval::new(start, stop);
        rbs_missing = share.saturating_sub(granted.len() as u32);
        remaining_budget = remaining_budget.saturating_sub(granted.len() as u32);
        cursor = granted.stop;
        out.push(granted);
    }
    out
}

fn find_first_free(used_prbs: &PrbBitmap, symbols: OfdmSymbolRange, from: u16) -> Option<u16> {
    for rb in from..used_prbs.nof_prbs() {
        if used_prbs.is_free(RbInterval::new(rb, rb + 1), symbols) {
            return Some(rb);
        }
    }
    None
}

/// Placeholder RB estimate from pending bytes. Real MCS/TBS selection is a
/// link-adaptation concern this crate does not own (§1 non-goals).
fn estimate_rbs_for_bytes(pending_bytes: u32) -> u32 {
    (pending_bytes / 150).clamp(1, 50)
}

fn rbs_to_tbs_bytes(nof_rbs: u16) -> u32 {
    (nof_rbs as u32 * 150).max(MIN_GRANT_TBS_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SchedStrategy, SliceRrmPolicyConfig};
    use crate::policy::TimeRrPolicy;
    use crate::slice::{RanSliceId, RanSliceInstance};
    use crate::ue::{Ue, UeCell};
    use common::CellId;

    fn make_ue(idx: u32, rnti: u16, pending_bytes: u32) -> Ue {
        let mut ue = Ue::new(UeIndex(idx), Rnti(rnti));
        ue.apply_config();
        ue.add_cell(UeCell::new(CellId(1), true, 8));
        ue.dl_lc.bind(4, RanSliceId(2));
        ue.dl_lc.handle_dl_buffer_state_update(4, pending_bytes, 0);
        ue
    }

    #[test]
    fn newtx_dl_grant_allocates_rbs_and_harq() {
        let mut ues = UeRepository::default();
        ues.add(make_ue(0, 0x4601, 5000));

        let cfg = SliceRrmPolicyConfig {
            min_rb: 0,
            max_rb: 50,
            dedicated_rb: 0,
            priority: 1,
            member: None,
            strategy: SchedStrategy::TimeRr,
        };
        let mut inst = RanSliceInstance::new(RanSliceId(2), cfg, 40);
        inst.get_ues_mut().bind_dl_lcid(UeIndex(0), 4);
        let slot = SlotPoint::new(1, 10);
        let mut candidate = RanSliceCandidate::new(&mut inst, slot, 50, Direction::Dl);

        let mut policy = TimeRrPolicy::default();
        let mut budget = SlotGrantBudget::new(16, 16, 32, 16, 32, 50);
        let mut used = PrbBitmap::new(50);
        let symbols = OfdmSymbolRange::new(2, 14);
        let mut pdcch = Vec::new();
        let mut pdsch = Vec::new();
        let mut pucch = Vec::new();

        let allocated =
            schedule_dl_candidate(&mut candidate, &mut policy, &mut ues, &mut budget, symbols, &mut used, &mut pdcch, &mut pdsch, &mut pucch, 4);

        assert!(allocated > 0);
        assert_eq!(pdsch.len(), 1);
        assert_eq!(pdcch.len(), 1);
        assert_eq!(pucch.len(), 1);
        let ue = ues.get(UeIndex(0)).unwrap();
        let cell = ue.pcell().unwrap();
        assert!(cell.harq.dl.process(pdsch[0].harq_id).state == crate::harq::HarqState::WaitingAck);
    }

    #[test]
    fn ue_with_no_pending_bytes_gets_no_grant() {
        let mut ues = UeRepository::default();
        ues.add(make_ue(0, 0x4601, 0));

        let cfg = SliceRrmPolicyConfig {
            min_rb: 0,
            max_rb: 50,
            dedicated_rb: 0,
            priority: 1,
            member: None,
            strategy: SchedStrategy::TimeRr,
        };
        let mut inst = RanSliceInstance::new(RanSliceId(2), cfg, 40);
        inst.get_ues_mut().bind_dl_lcid(UeIndex(0), 4);
        let slot = SlotPoint::new(1, 10);
        let mut candidate = RanSliceCandidate::new(&mut inst, slot, 50, Direction::Dl);

        let mut policy = TimeRrPolicy::default();
        let mut budget = SlotGrantBudget::new(16, 16, 32, 16, 32, 50);
        let mut used = PrbBitmap::new(50);
        let symbols = OfdmSymbolRange::new(2, 14);
        let mut pdcch = Vec::new();
        let mut pdsch = Vec::new();
        let mut pucch = Vec::new();

        let allocated =
            schedule_dl_candidate(&mut candidate, &mut policy, &mut ues, &mut budget, symbols, &mut used, &mut pdcch, &mut pdsch, &mut pucch, 4);
        assert_eq!(allocated, 0);
        assert!(pdsch.is_empty());
    }
}
