//! Event ingress: merges PHY and config-manager events into the cell
//! pipeline through bounded, non-blocking queues (§4.5). Grounded on the
//! teacher's `tokio`-free, lock-free-queue usage pattern adapted from
//! `crossbeam-channel`/`crossbeam-queue`, following `open-nexus-OS`'s use of
//! the same crates for its scheduler-adjacent ring buffers.

use crate::ue::UeIndex;
use common::SlotPoint;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Default capacity for per-cell and cell-agnostic event queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// The ten upstream event kinds recognised at the core interface (§4.5, §6).
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    UeCreate { ue_idx: UeIndex, crnti: common::Rnti },
    UeReconfigure { ue_idx: UeIndex },
    UeDelete { ue_idx: UeIndex },
    UeConfigApplied { ue_idx: UeIndex },
    Rach(RachIndication),
    Crc(CrcIndication),
    Uci(UciIndication),
    Srs(SrsIndication),
    Bsr { ue_idx: UeIndex, lcg: crate::ue::Lcg, reported_bytes: u32 },
    Phr { ue_idx: UeIndex, ph_db: i16, p_cmax_dbm: i16 },
    DlBufferOccupancy { ue_idx: UeIndex, lcid: crate::ue::Lcid, pending_bytes: u32, hol_toa: u32 },
    DlMacCe { ue_idx: UeIndex, lcid: crate::ue::Lcid },
    ErrorIndication { slot_tx: SlotPoint, outcome: ErrorIndicationOutcome },
    PositioningRequest { rnti: common::Rnti },
    PositioningStop { rnti: common::Rnti },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorIndicationOutcome {
    PdcchDiscarded,
    PdschDiscarded,
    PuschAndPucchDiscarded,
}

#[derive(Debug, Clone)]
pub struct RachIndication {
    pub slot_rx: SlotPoint,
    pub preambles: Vec<RachPreamble>,
}

#[derive(Debug, Clone, Copy)]
pub struct RachPreamble {
    pub rapid: u8,
    pub tc_rnti: common::Rnti,
    pub timing_advance: i16,
}

#[derive(Debug, Clone)]
pub struct CrcIndication {
    pub slot_rx: SlotPoint,
    pub ue_idx: UeIndex,
    pub harq_id: u8,
    pub success: bool,
    pub ul_sinr_db: f32,
    pub ul_rsrp_dbfs: f32,
    pub ta_offset: i16,
}

#[derive(Debug, Clone)]
pub enum UciIndication {
    F0F1 { slot_rx: SlotPoint, ue_idx: UeIndex, harq_bits: Vec<bool>, sr_detected: bool, sinr_db: f32 },
    F2F3F4 { slot_rx: SlotPoint, ue_idx: UeIndex, harq_bits: Vec<bool>, sr_bits: Vec<bool>, csi_present: bool },
    Pusch { slot_rx: SlotPoint, ue_idx: UeIndex, harq_bits: Vec<bool>, csi_present: bool },
}

#[derive(Debug, Clone)]
pub struct SrsIndication {
    pub ue_idx: UeIndex,
    pub rnti: common::Rnti,
    pub ta_offset: i16,
}

/// Per-(UE, LCID) coalescing table for DL buffer-occupancy reports (§4.5
/// "DL Buffer-Occupancy coalescing"). Multiple reports between slots
/// collapse into the latest value; only the first report since the last
/// drain schedules a work item.
#[derive(Default)]
struct DlBoTable {
    latest: HashMap<(UeIndex, crate::ue::Lcid), (u32, u32)>,
    pending: std::collections::HashSet<(UeIndex, crate::ue::Lcid)>,
}

impl DlBoTable {
    fn report(&mut self, ue_idx: UeIndex, lcid: crate::ue::Lcid, pending_bytes: u32, hol_toa: u32) -> bool {
        self.latest.insert((ue_idx, lcid), (pending_bytes, hol_toa));
        self.pending.insert((ue_idx, lcid))
    }

    fn drain(&mut self) -> Vec<(UeIndex, crate::ue::Lcid, u32, u32)> {
        let mut out = Vec::with_capacity(self.pending.len());
        for key in self.pending.drain() {
            if let Some(&(bytes, toa)) = self.latest.get(&key) {
                out.push((key.0, key.1, bytes, toa));
            }
        }
        out
    }
}

/// One per-cell queue plus its own coalescing table. Cell-agnostic (UE
/// lifecycle) events travel through the `EventManager`'s shared queue
/// instead.
struct CellQueue {
    queue: Arc<ArrayQueue<SchedulerEvent>>,
    dl_bo: Mutex<DlBoTable>,
    stopped: std::sync::atomic::AtomicBool,
    overflow_count: std::sync::atomic::AtomicU64,
}

impl CellQueue {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
            dl_bo: Mutex::new(DlBoTable::default()),
            stopped: std::sync::atomic::AtomicBool::new(false),
            overflow_count: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

/// Merges external events into per-cell pipelines via bounded, lock-free
/// queues (§4.5). The producer side never blocks: a full queue logs a
/// warning and drops the event, and the caller increments its own overflow
/// counter through the returned bool.
pub struct EventManager {
    common_tx: Sender<SchedulerEvent>,
    common_rx: Receiver<SchedulerEvent>,
    cells: HashMap<common::CellId, CellQueue>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (common_tx, common_rx) = bounded(capacity);
        Self { common_tx, common_rx, cells: HashMap::new() }
    }

    pub fn add_cell(&mut self, cell_id: common::CellId, capacity: usize) {
        self.cells.insert(cell_id, CellQueue::new(capacity));
    }

    pub fn remove_cell(&mut self, cell_id: common::CellId) {
        self.cells.remove(&cell_id);
    }

    /// Stops a cell: drains its queue and refuses new enqueues (§4.5
    /// "Cancellation").
    pub fn stop_cell(&self, cell_id: common::CellId) {
        if let Some(cq) = self.cells.get(&cell_id) {
            cq.stopped.store(true, std::sync::atomic::Ordering::Release);
            while cq.queue.pop().is_some() {}
        }
    }

    /// Enqueues a cell-agnostic UE-lifecycle event. Never blocks; returns
    /// `false` (and logs) if the queue is full (§5 "Suspension points").
    pub fn enqueue_common(&self, event: SchedulerEvent) -> bool {
        match self.common_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("common event queue full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Enqueues a per-cell event (CRC, UCI, SRS, BSR, PHR, error indication,
    /// positioning). Refused if the cell is stopped or unknown.
    pub fn enqueue_cell(&self, cell_id: common::CellId, event: SchedulerEvent) -> bool {
        let Some(cq) = self.cells.get(&cell_id) else { return false };
        if cq.stopped.load(std::sync::atomic::Ordering::Acquire) {
            return false;
        }
        if let SchedulerEvent::DlBufferOccupancy { ue_idx, lcid, pending_bytes, hol_toa } = event {
            let first_since_drain = cq.dl_bo.lock().report(ue_idx, lcid, pending_bytes, hol_toa);
            if !first_since_drain {
                // Coalesced: a work item is already pending for this (UE, LCID).
                return true;
            }
        }
        match cq.queue.push(event) {
            Ok(()) => true,
            Err(_) => {
                cq.overflow_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                warn!(cell = cell_id.0, "per-cell event queue full, dropping event");
                false
            }
        }
    }

    pub fn overflow_count(&self, cell_id: common::CellId) -> u64 {
        self.cells.get(&cell_id).map(|cq| cq.overflow_count.load(std::sync::atomic::Ordering::Relaxed)).unwrap_or(0)
    }

    /// Drains common events, then this cell's events, in the delivery order
    /// §4.5 requires. The caller applies each event to scheduler state; this
    /// layer only provides ordering and non-blocking delivery.
    pub fn drain_for_cell(&self, cell_id: common::CellId) -> Vec<SchedulerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.common_rx.try_recv() {
            out.push(event);
        }
        if let Some(cq) = self.cells.get(&cell_id) {
            for (ue_idx, lcid, pending_bytes, hol_toa) in cq.dl_bo.lock().drain() {
                out.push(SchedulerEvent::DlBufferOccupancy { ue_idx, lcid, pending_bytes, hol_toa });
            }
            while let Some(event) = cq.queue.pop() {
                out.push(event);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CellId;

    #[test]
    fn dl_buffer_occupancy_coalesces_before_drain() {
        // End-to-end scenario 6: three reports collapse to one queued event.
        let mut mgr = EventManager::new(16);
        mgr.add_cell(CellId(1), 16);
        assert!(mgr.enqueue_cell(CellId(1), SchedulerEvent::DlBufferOccupancy { ue_idx: UeIndex(0), lcid: 4, pending_bytes: 1000, hol_toa: 10 }));
        assert!(mgr.enqueue_cell(CellId(1), SchedulerEvent::DlBufferOccupancy { ue_idx: UeIndex(0), lcid: 4, pending_bytes: 500, hol_toa: 11 }));
        assert!(mgr.enqueue_cell(CellId(1), SchedulerEvent::DlBufferOccupancy { ue_idx: UeIndex(0), lcid: 4, pending_bytes: 2000, hol_toa: 12 }));

        let drained = mgr.drain_for_cell(CellId(1));
        let bo_events: Vec<_> = drained
            .iter()
            .filter(|e| matches!(e, SchedulerEvent::DlBufferOccupancy { .. }))
            .collect();
        assert_eq!(bo_events.len(), 1);
        match bo_events[0] {
            SchedulerEvent::DlBufferOccupancy { pending_bytes, .. } => assert_eq!(*pending_bytes, 2000),
            _ => unreachable!(),
        }
    }

    #[test]
    fn stopped_cell_refuses_new_events() {
        let mut mgr = EventManager::new(16);
        mgr.add_cell(CellId(2), 16);
        mgr.stop_cell(CellId(2));
        assert!(!mgr.enqueue_cell(CellId(2), SchedulerEvent::UeDelete { ue_idx: UeIndex(0) }));
    }

    #[test]
    fn common_events_are_fifo() {
        let mgr = EventManager::new(16);
        mgr.enqueue_common(SchedulerEvent::UeCreate { ue_idx: UeIndex(0), crnti: common::Rnti(1) });
        mgr.enqueue_common(SchedulerEvent::UeCreate { ue_idx: UeIndex(1), crnti: common::Rnti(2) });
        let drained = mgr.drain_for_cell(CellId(9));
        assert_eq!(drained.len(), 2);
    }
}
