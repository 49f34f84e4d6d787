//! Per-cell slot orchestration (§4.1). Grounded on
//! `lib/scheduler/cell_scheduler.{h,cpp}`'s fixed sub-scheduler order and
//! the teacher's `gnb`'s start/stop command handling style.

use crate::alloc::SlotGrantBudget;
use crate::collaborators::{CsiRsScheduler, FallbackScheduler, PagingScheduler, RandomAccessScheduler, Sib1Scheduler, SsbScheduler};
use crate::config::{CellConfiguration, SlotDirection};
use crate::event_manager::{EventManager, SchedulerEvent};
use crate::grid::{OfdmSymbolRange, ResourceGrid, SchedResult};
use crate::intra_slice::{schedule_dl_candidate, schedule_ul_candidate};
use crate::metrics::{CellCounters, MetricsHandler, UeLifecycleEvent, UeLifecycleEventKind};
use crate::slice::InterSliceScheduler;
use crate::uci_srs::UciSrsScheduler;
use crate::ue::{Ue, UeIndex, UeRepository};
use common::SlotPoint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// DL ack slot offset (k1). A single fixed value keeps the grant/ack
/// bookkeeping simple; real k1 selection is a link-adaptation/PUCCH-config
/// concern outside this crate's scope (§1).
const DEFAULT_K1_SLOTS: u8 = 4;

/// Default OFDM symbols available to PDSCH/PUSCH after the control region.
fn default_data_symbols() -> OfdmSymbolRange {
    OfdmSymbolRange::new(2, 14)
}

/// One cell's full scheduling pipeline: resource grid, inter/intra-slice
/// schedulers, HARQ-owning UE repository, event ingress, UCI/SRS placement,
/// and metrics. `run_slot` is the sole entry point (§4.1 "Contract").
pub struct CellScheduler {
    cell_cfg: CellConfiguration,
    grid: ResourceGrid,
    inter_slice: InterSliceScheduler,
    ues: UeRepository,
    events: EventManager,
    uci_srs: UciSrsScheduler,
    metrics: MetricsHandler,
    ssb: Box<dyn SsbScheduler>,
    csi_rs: Box<dyn CsiRsScheduler>,
    sib1: Box<dyn Sib1Scheduler>,
    ra: Box<dyn RandomAccessScheduler>,
    paging: Box<dyn PagingScheduler>,
    fallback: Box<dyn FallbackScheduler>,
    last_slot_tx: Option<SlotPoint>,
    active: AtomicBool,
    stop_requested: AtomicBool,
    next_ue_index: u32,
}

pub struct CellSchedulerCollaborators {
    pub ssb: Box<dyn SsbScheduler>,
    pub csi_rs: Box<dyn CsiRsScheduler>,
    pub sib1: Box<dyn Sib1Scheduler>,
    pub ra: Box<dyn RandomAccessScheduler>,
    pub paging: Box<dyn PagingScheduler>,
    pub fallback: Box<dyn FallbackScheduler>,
}

impl CellScheduler {
    pub fn new(cell_cfg: CellConfiguration, ring_size: usize, collaborators: CellSchedulerCollaborators) -> Self {
        let inter_slice = InterSliceScheduler::new(&cell_cfg, ring_size);
        let grid = ResourceGrid::new(cell_cfg.nof_prbs, ring_size);
        let tdd_period = cell_cfg.tdd_ul_dl_pattern.as_ref().map(|p| p.len()).unwrap_or(1);
        let mut metrics = MetricsHandler::new(std::time::Duration::from_millis(1000), crate::metrics::DEFAULT_UE_EVENT_QUEUE_CAPACITY);
        metrics.set_cell_counters(CellCounters::new(32, 100, tdd_period));
        let mut events = EventManager::new(crate::event_manager::DEFAULT_QUEUE_CAPACITY);
        events.add_cell(cell_cfg.cell_id, crate::event_manager::DEFAULT_QUEUE_CAPACITY);
        Self {
            cell_cfg,
            grid,
            inter_slice,
            ues: UeRepository::default(),
            events,
            uci_srs: UciSrsScheduler::new(),
            metrics,
            ssb: collaborators.ssb,
            csi_rs: collaborators.csi_rs,
            sib1: collaborators.sib1,
            ra: collaborators.ra,
            paging: collaborators.paging,
            fallback: collaborators.fallback,
            last_slot_tx: None,
            active: AtomicBool::new(true),
            stop_requested: AtomicBool::new(false),
            next_ue_index: 0,
        }
    }

    pub fn cell_id(&self) -> common::CellId {
        self.cell_cfg.cell_id
    }

    pub fn event_manager(&self) -> &EventManager {
        &self.events
    }

    /// Requests the cell stop at the next slot boundary (§4.1 step 4,
    /// `std::atomic` exchange semantics).
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Runs one slot's scheduling pass and returns a reference to the
    /// assembled result, valid until the next call for this cell (§6).
    pub fn run_slot(&mut self, sl_tx: SlotPoint) -> &SchedResult {
        let t0 = Instant::now();

        // Step 1: inactive cells only advance the grid head.
        if !self.active.load(Ordering::Acquire) {
            self.grid.slot_indication(sl_tx);
            let idx = self.grid_index_for(sl_tx);
            return &self.grid_ring()[idx].result;
        }

        // Step 2: fast-forward on jitter, one slot at a time.
        if let Some(prev) = self.last_slot_tx {
            let expected = prev.add(1);
            if expected != sl_tx {
                let mut cursor = expected;
                while cursor != sl_tx && cursor.sub(&sl_tx) < 0 {
                    warn!(skipped = %cursor, "fast-forwarding resource grid under slot jitter");
                    self.grid.slot_indication(cursor);
                    cursor = cursor.add(1);
                }
            }
        }

        // Step 3: clear new head slot's grid (ResourceGrid::slot_indication
        // zeroes the allocator) and per-slot scheduler state.
        self.grid.slot_indication(sl_tx);
        self.ues.age_state(sl_tx);

        // Step 4: apply pending start/stop commands.
        if self.stop_requested.swap(false, Ordering::AcqRel) {
            self.active.store(false, Ordering::Release);
            info!(cell = self.cell_cfg.cell_id.0, "cell stopped, flushing metrics");
            self.events.stop_cell(self.cell_cfg.cell_id);
            self.last_slot_tx = Some(sl_tx);
            let idx = self.grid_index_for(sl_tx);
            return &self.grid_ring()[idx].result;
        }

        self.apply_events(sl_tx);
        self.expire_harq_timers(sl_tx);

        let tdd_dir = self
            .cell_cfg
            .tdd_ul_dl_pattern
            .as_ref()
            .map(|p| p.direction_of(sl_tx.slot_index()))
            .unwrap_or(SlotDirection::Dl);
        let is_dl_slot = matches!(tdd_dir, SlotDirection::Dl | SlotDirection::Special);
        let is_ul_slot = matches!(tdd_dir, SlotDirection::Ul | SlotDirection::Special);

        let idx = self.grid_index_for(sl_tx);
        let symbols = default_data_symbols();

        // Step 5: fixed sub-scheduler order.
        let alloc = &mut self.grid_ring_mut()[idx];
        alloc.result.csi_rs = self.csi_rs.schedule_csi_rs(sl_tx, &mut alloc.dl_prbs);
        let _ssb_placed = self.ssb.schedule_ssb(sl_tx, &mut alloc.dl_prbs);
        if let Some(bc) = self.sib1.schedule_sib1(sl_tx, &mut alloc.dl_prbs) {
            alloc.result.pdsch_bc.push(bc);
        }
        self.uci_srs.slot_indication(sl_tx.count(), &mut alloc.result.pucch, &mut alloc.result.srs);
        alloc.result.rar = self.ra.schedule_ra(sl_tx, &mut alloc.ul_prbs);
        alloc.result.pdsch_paging = self.paging.schedule_paging(sl_tx, &mut alloc.dl_prbs);
        self.fallback.schedule_fallback(sl_tx, &mut alloc.dl_prbs);

        let mut budget = SlotGrantBudget::from_expert_cfg(&self.cell_cfg.expert_cfg, self.cell_cfg.nof_prbs as u32);
        let enable_csi_rs_mux = self.cell_cfg.expert_cfg.enable_csi_rs_pdsch_multiplexing;
        let csi_rs_present = alloc.result.csi_rs;

        self.inter_slice.slot_indication(sl_tx, csi_rs_present, enable_csi_rs_mux);

        if is_dl_slot {
            while let Some((mut candidate, policy)) = self.inter_slice.get_next_dl_candidate_with_policy() {
                let idx = self.grid_index_for(candidate.slot_tx());
                let alloc = &mut self.grid_ring_mut()[idx];
                schedule_dl_candidate(
                    &mut candidate,
                    policy,
                    &mut self.ues,
                    &mut budget,
                    symbols,
                    &mut alloc.dl_prbs,
                    &mut alloc.result.pdcch_dl,
                    &mut alloc.result.pdsch_ue,
                    &mut alloc.result.pucch,
                    DEFAULT_K1_SLOTS,
                );
                if budget.pdsch_exhausted() || budget.pdcch_attempts_exhausted() {
                    break;
                }
            }
        }

        if is_ul_slot {
            while let Some((mut candidate, policy)) = self.inter_slice.get_next_ul_candidate_with_policy() {
                let idx = self.grid_index_for(candidate.slot_tx());
                let alloc = &mut self.grid_ring_mut()[idx];
                schedule_ul_candidate(
                    &mut candidate,
                    policy,
                    &mut self.ues,
                    &mut budget,
                    symbols,
                    &mut alloc.ul_prbs,
                    &mut alloc.result.pdcch_ul,
                    &mut alloc.result.pusch,
                );
                if budget.pusch_exhausted() || budget.pdcch_attempts_exhausted() {
                    break;
                }
            }
        }

        self.last_slot_tx = Some(sl_tx);

        // Step 6: push latency into the metrics handler.
        let latency_us = t0.elapsed().as_micros().min(u32::MAX as u128) as u32;
        debug!(slot = %sl_tx, latency_us, "slot scheduled");
        if let Some(cell_counters) = self.metrics_cell_counters_mut() {
            cell_counters.record_latency(latency_us);
            let slot_idx = sl_tx.slot_index() as usize;
            let idx = self.grid_index_for(sl_tx);
            let result = &self.grid_ring()[idx].result;
            cell_counters.record_slot_occupancy(
                slot_idx,
                !result.pdsch_ue.is_empty() || !result.pdsch_bc.is_empty(),
                !result.pusch.is_empty(),
                !result.pucch.is_empty(),
            );
        }

        let idx = self.grid_index_for(sl_tx);
        &self.grid_ring()[idx].result
    }

    fn metrics_cell_counters_mut(&mut self) -> Option<&mut CellCounters> {
        self.metrics.current_cell_counters_mut()
    }

    /// Applies queued events in delivery order (§4.5): common events first,
    /// then this cell's events (CRC/UCI/SRS/BSR/PHR/DL-BO/DL-MAC-CE/error
    /// indication/positioning).
    fn apply_events(&mut self, sl_tx: SlotPoint) {
        for event in self.events.drain_for_cell(self.cell_cfg.cell_id) {
            self.apply_event(event, sl_tx);
        }
    }

    fn apply_event(&mut self, event: SchedulerEvent, sl_tx: SlotPoint) {
        match event {
            SchedulerEvent::UeCreate { ue_idx, crnti } => {
                self.ues.add(Ue::new(ue_idx, crnti));
                self.metrics
                    .record_ue_event(UeLifecycleEvent { ue_idx, kind: UeLifecycleEventKind::Add });
            }
            SchedulerEvent::UeReconfigure { ue_idx } => {
                self.metrics
                    .record_ue_event(UeLifecycleEvent { ue_idx, kind: UeLifecycleEventKind::Reconfigure });
            }
            SchedulerEvent::UeDelete { ue_idx } => {
                self.ues.schedule_removal(ue_idx, sl_tx, self.cell_cfg.expert_cfg.max_ul_alloc_delay);
                self.metrics
                    .record_ue_event(UeLifecycleEvent { ue_idx, kind: UeLifecycleEventKind::Remove });
            }
            SchedulerEvent::UeConfigApplied { ue_idx } => {
                if let Ok(ue) = self.ues.get_mut(ue_idx) {
                    ue.apply_config();
                }
            }
            SchedulerEvent::Rach(_) | SchedulerEvent::DlMacCe { .. } => {
                // Routed to the RA/fallback collaborators, out of this
                // crate's core scope (§1); acknowledged here only so the
                // event is not logged as unhandled.
            }
            SchedulerEvent::Crc(crc) => {
                if let Ok(ue) = self.ues.get_mut(crc.ue_idx) {
                    if let Some(cell) = ue.pcell_mut() {
                        cell.harq.ul.crc_indication(crc.harq_id, crc.success);
                    }
                    self.metrics.ue_counters_mut(crc.ue_idx).record_ul_outcome(crc.success);
                } else {
                    warn!(ue = crc.ue_idx.0, "CRC indication for unknown UE");
                }
            }
            SchedulerEvent::Uci(uci) => self.apply_uci(uci),
            SchedulerEvent::Srs(srs) => {
                let _ = srs;
            }
            SchedulerEvent::Bsr { ue_idx, lcg, reported_bytes } => {
                if let Ok(ue) = self.ues.get_mut(ue_idx) {
                    ue.ul_lcg.handle_bsr(lcg, reported_bytes);
                    ue.sr_pending = false;
                }
            }
            SchedulerEvent::Phr { ue_idx, ph_db, p_cmax_dbm } => {
                let counters = self.metrics.ue_counters_mut(ue_idx);
                counters.ta_sum += 0.0;
                let _ = (ph_db, p_cmax_dbm);
            }
            SchedulerEvent::DlBufferOccupancy { ue_idx, lcid, pending_bytes, hol_toa } => {
                if let Ok(ue) = self.ues.get_mut(ue_idx) {
                    ue.dl_lc.handle_dl_buffer_state_update(lcid, pending_bytes, hol_toa);
                    self.metrics.ue_counters_mut(ue_idx).buffer_status_bytes = pending_bytes;
                }
            }
            SchedulerEvent::ErrorIndication { slot_tx, outcome } => self.handle_error_indication(slot_tx, outcome),
            SchedulerEvent::PositioningRequest { rnti } => self.uci_srs.request_positioning(rnti, 40, 0),
            SchedulerEvent::PositioningStop { rnti } => self.uci_srs.stop_positioning(rnti),
        }
    }

    fn apply_uci(&mut self, uci: crate::event_manager::UciIndication) {
        use crate::event_manager::UciIndication;
        let (ack_slot, ue_idx, harq_bits) = match &uci {
            UciIndication::F0F1 { slot_rx, ue_idx, harq_bits, sr_detected, .. } => {
                if *sr_detected {
                    if let Ok(ue) = self.ues.get_mut(*ue_idx) {
                        ue.sr_pending = true;
                    }
                }
                (*slot_rx, *ue_idx, harq_bits.clone())
            }
            UciIndication::F2F3F4 { slot_rx, ue_idx, harq_bits, .. } => (*slot_rx, *ue_idx, harq_bits.clone()),
            UciIndication::Pusch { slot_rx, ue_idx, harq_bits, .. } => (*slot_rx, *ue_idx, harq_bits.clone()),
        };
        let Ok(ue) = self.ues.get_mut(ue_idx) else {
            warn!(ue = ue_idx.0, "UCI indication for unknown UE");
            return;
        };
        let Some(cell) = ue.pcell_mut() else { return };
        for (harq_bit_index, &acked) in harq_bits.iter().enumerate() {
            let update = cell.harq.dl.dl_ack_info(ack_slot, harq_bit_index as u8, acked);
            match update {
                crate::harq::DlAckUpdate::Acked => self.metrics.ue_counters_mut(ue_idx).record_dl_outcome(true),
                crate::harq::DlAckUpdate::Nacked => self.metrics.ue_counters_mut(ue_idx).record_dl_outcome(false),
                _ => {}
            }
        }
    }

    /// Error-indication recovery (§7, §4.1 "Failure semantics"): rolls back
    /// forward-looking HARQ state for the named outcome, no retries at this
    /// layer.
    fn handle_error_indication(&mut self, slot_tx: SlotPoint, outcome: crate::event_manager::ErrorIndicationOutcome) {
        use crate::event_manager::ErrorIndicationOutcome;
        for ue in self.ues.iter_mut() {
            let Some(cell) = ue.pcell_mut() else { continue };
            match outcome {
                ErrorIndicationOutcome::PdschDiscarded => cell.harq.dl.handle_error_indication(slot_tx),
                ErrorIndicationOutcome::PuschAndPucchDiscarded => {
                    cell.harq.dl.uci_sched_failed(slot_tx);
                    cell.harq.ul.handle_error_indication(slot_tx);
                }
                ErrorIndicationOutcome::PdcchDiscarded => {}
            }
        }
    }

    fn expire_harq_timers(&mut self, sl_tx: SlotPoint) {
        for ue in self.ues.iter_mut() {
            let Some(cell) = ue.pcell_mut() else { continue };
            let dl_timed_out = cell.harq.dl.expire_timers(sl_tx);
            let ul_timed_out = cell.harq.ul.expire_timers(sl_tx);
            if !dl_timed_out.is_empty() || !ul_timed_out.is_empty() {
                warn!(ue = ue.index.0, dl = dl_timed_out.len(), ul = ul_timed_out.len(), "HARQ timers expired");
            }
        }
    }

    fn grid_index_for(&self, slot: SlotPoint) -> usize {
        (slot.count() as usize) % self.grid.ring_size()
    }

    fn grid_ring(&self) -> &[crate::grid::SlotAllocator] {
        self.grid_ring_ref()
    }

    fn grid_ring_mut(&mut self) -> &mut [crate::grid::SlotAllocator] {
        self.grid_ring_mut_ref()
    }

    fn grid_ring_ref(&self) -> &[crate::grid::SlotAllocator] {
        self.grid.ring_slice()
    }

    fn grid_ring_mut_ref(&mut self) -> &mut [crate::grid::SlotAllocator] {
        self.grid.ring_slice_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::NullCollaborators;
    use crate::config::{HarqOperatingMode, PeriodicUciTemplate, PucchResourceSetConfig, SchedulerExpertConfig};
    use common::{CellId, SubcarrierSpacing};

    fn null_collaborators() -> CellSchedulerCollaborators {
        CellSchedulerCollaborators {
            ssb: Box::new(NullCollaborators),
            csi_rs: Box::new(NullCollaborators),
            sib1: Box::new(NoSib1),
            ra: Box::new(NullCollaborators),
            paging: Box::new(NullCollaborators),
            fallback: Box::new(NullCollaborators),
        }
    }

    struct NoSib1;
    impl Sib1Scheduler for NoSib1 {
        fn schedule_sib1(&mut self, _slot_tx: SlotPoint, _used_prbs: &mut crate::grid::PrbBitmap) -> Option<crate::grid::PdschBroadcast> {
            None
        }
    }

    fn cell_cfg() -> CellConfiguration {
        CellConfiguration {
            cell_id: CellId(1),
            nof_prbs: 106,
            scs: SubcarrierSpacing::Scs30,
            tdd_ul_dl_pattern: None,
            slices: vec![],
            expert_cfg: SchedulerExpertConfig::default(),
            harq_mode: HarqOperatingMode::A,
            coresets: Vec::new(),
            search_spaces: Vec::new(),
            periodic_uci_template: PeriodicUciTemplate::default(),
            pucch_resources: PucchResourceSetConfig::default(),
        }
    }

    #[test]
    fn inactive_cell_only_advances_grid() {
        let mut sched = CellScheduler::new(cell_cfg(), 80, null_collaborators());
        sched.request_stop();
        let r1 = sched.run_slot(SlotPoint::new(1, 0));
        assert!(r1.pdsch_ue.is_empty());
        let r2 = sched.run_slot(SlotPoint::new(1, 1));
        assert!(r2.pdsch_ue.is_empty());
    }

    #[test]
    fn ue_create_event_adds_ue_before_scheduling() {
        let mut sched = CellScheduler::new(cell_cfg(), 80, null_collaborators());
        let cell_id = sched.cell_id();
        sched.event_manager().enqueue_common(SchedulerEvent::UeCreate { ue_idx: UeIndex(0), crnti: common::Rnti(0x4601) });
        let _ = cell_id;
        sched.run_slot(SlotPoint::new(1, 0));
        assert!(sched.ues.contains(UeIndex(0)));
    }

    #[test]
    fn fast_forward_logs_and_preserves_ring_invariant() {
        let mut sched = CellScheduler::new(cell_cfg(), 10, null_collaborators());
        sched.run_slot(SlotPoint::new(1, 0));
        // Jump 5 slots ahead without intermediate ticks.
        let result = sched.run_slot(SlotPoint::new(1, 5));
        assert!(result.pdsch_ue.is_empty());
    }

    #[test]
    fn uci_event_acks_dl_harq_through_run_slot() {
        // End-to-end scenario 4 driven through the real event path, not
        // `harq.rs`'s direct `dl_ack_info` calls: a PUCCH carrying
        // HARQ-ACK=1 for the slot the grant was actually sent in must free
        // HARQ0, regardless of which slot `run_slot` happens to be called at.
        let mut sched = CellScheduler::new(cell_cfg(), 80, null_collaborators());
        let ue_idx = UeIndex(0);
        sched.event_manager().enqueue_common(SchedulerEvent::UeCreate { ue_idx, crnti: common::Rnti(0x4601) });
        sched.run_slot(SlotPoint::new(1, 0));

        let cell_id = sched.cell_id();
        let ack_slot = SlotPoint::new(1, 4);
        {
            let ue = sched.ues.get_mut(ue_idx).unwrap();
            ue.add_cell(crate::ue::UeCell::new(cell_id, true, 16));
            ue.pcell_mut().unwrap().harq.dl.alloc_dl_harq(
                0,
                ack_slot,
                1,
                1500,
                crate::rb::RbInterval::new(0, 20),
                crate::slice::RanSliceId::default_drb(),
            );
        }

        sched.event_manager().enqueue_cell(
            cell_id,
            SchedulerEvent::Uci(crate::event_manager::UciIndication::F0F1 {
                slot_rx: ack_slot,
                ue_idx,
                harq_bits: vec![true],
                sr_detected: false,
                sinr_db: 20.0,
            }),
        );

        // Jitter between the report and the slot it reports on must not
        // matter: the HARQ bookkeeping keys off `slot_rx`, not `run_slot`'s
        // own argument.
        sched.run_slot(SlotPoint::new(1, 7));

        let ue = sched.ues.get_mut(ue_idx).unwrap();
        assert_eq!(ue.pcell_mut().unwrap().harq.dl.process(0).state, crate::harq::HarqState::Empty);
    }
}
