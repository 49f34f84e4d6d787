//! Metrics handler: observes slot results and events, aggregates per-UE and
//! per-cell counters, and emits periodic reports through a pull model
//! (§4.7). Grounded on `lib/scheduler/logging`'s event-sink style in the
//! original scheduler.

use crate::ue::UeIndex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Bounded capacity for the UE-event queue (add/reconf/remove) a report
/// drains from (§4.7: "a bounded queue of UE events").
pub const DEFAULT_UE_EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UeLifecycleEventKind {
    Add,
    Reconfigure,
    Remove,
}

#[derive(Debug, Clone, Copy)]
pub struct UeLifecycleEvent {
    pub ue_idx: UeIndex,
    pub kind: UeLifecycleEventKind,
}

/// Running per-UE counters accumulated into the next report.
#[derive(Debug, Clone, Default)]
pub struct UeCounters {
    pub mcs_sum: u64,
    pub mcs_samples: u32,
    pub cqi_sum: u64,
    pub cqi_samples: u32,
    pub ri_sum: u64,
    pub ri_samples: u32,
    pub dl_ok: u32,
    pub dl_nok: u32,
    pub ul_ok: u32,
    pub ul_nok: u32,
    pub ta_sum: f32,
    pub ta_samples: u32,
    pub buffer_status_bytes: u32,
}

impl UeCounters {
    pub fn record_mcs(&mut self, mcs: u8) {
        self.mcs_sum += mcs as u64;
        self.mcs_samples += 1;
    }

    pub fn record_dl_outcome(&mut self, acked: bool) {
        if acked {
            self.dl_ok += 1;
        } else {
            self.dl_nok += 1;
        }
    }

    pub fn record_ul_outcome(&mut self, success: bool) {
        if success {
            self.ul_ok += 1;
        } else {
            self.ul_nok += 1;
        }
    }
}

/// Per-cell counters, including the fixed-bin-width latency histogram and
/// TDD slot-index occupancy required by §4.7.
#[derive(Debug, Clone)]
pub struct CellCounters {
    pub latency_histogram_bins: Vec<u32>,
    pub latency_bin_width_us: u32,
    pub prach_delay_sum_us: u64,
    pub prach_delay_samples: u32,
    pub late_harq_count: u32,
    pub pdsch_slot_occupancy: Vec<u32>,
    pub pusch_slot_occupancy: Vec<u32>,
    pub pucch_slot_occupancy: Vec<u32>,
}

impl CellCounters {
    pub fn new(nof_latency_bins: usize, latency_bin_width_us: u32, tdd_period_slots: usize) -> Self {
        Self {
            latency_histogram_bins: vec![0; nof_latency_bins],
            latency_bin_width_us,
            prach_delay_sum_us: 0,
            prach_delay_samples: 0,
            late_harq_count: 0,
            pdsch_slot_occupancy: vec![0; tdd_period_slots.max(1)],
            pusch_slot_occupancy: vec![0; tdd_period_slots.max(1)],
            pucch_slot_occupancy: vec![0; tdd_period_slots.max(1)],
        }
    }

    pub fn record_latency(&mut self, latency_us: u32) {
        let bin = (latency_us / self.latency_bin_width_us.max(1)) as usize;
        let last = self.latency_histogram_bins.len() - 1;
        self.latency_histogram_bins[bin.min(last)] += 1;
    }

    pub fn record_late_harq(&mut self) {
        self.late_harq_count += 1;
    }

    pub fn record_slot_occupancy(&mut self, slot_index_in_period: usize, pdsch: bool, pusch: bool, pucch: bool) {
        let n = self.pdsch_slot_occupancy.len();
        let idx = slot_index_in_period % n;
        if pdsch {
            self.pdsch_slot_occupancy[idx] += 1;
        }
        if pusch {
            self.pusch_slot_occupancy[idx] += 1;
        }
        if pucch {
            self.pucch_slot_occupancy[idx] += 1;
        }
    }
}

/// A periodic report, reserved by `get_next()` and published by `commit()`
/// so the scheduler thread never allocates during emission (§4.7 pull
/// model).
#[derive(Debug, Clone, Default)]
pub struct MetricsReport {
    pub ue_counters: HashMap<UeIndex, UeCounters>,
    pub ue_events: Vec<UeLifecycleEvent>,
    pub ue_event_overflow_count: u32,
    pub cell_counters: Option<CellCounters>,
}

pub struct MetricsHandler {
    report_period: Duration,
    next_report: MetricsReport,
    ue_event_queue_capacity: usize,
}

impl MetricsHandler {
    pub fn new(report_period: Duration, ue_event_queue_capacity: usize) -> Self {
        Self { report_period, next_report: MetricsReport::default(), ue_event_queue_capacity }
    }

    pub fn report_period(&self) -> Duration {
        self.report_period
    }

    pub fn ue_counters_mut(&mut self, ue_idx: UeIndex) -> &mut UeCounters {
        self.next_report.ue_counters.entry(ue_idx).or_default()
    }

    pub fn set_cell_counters(&mut self, counters: CellCounters) {
        self.next_report.cell_counters = Some(counters);
    }

    /// Mutable access to the in-flight report's cell counters, for recording
    /// per-slot latency/occupancy samples as they happen (§4.1 step 6).
    pub fn current_cell_counters_mut(&mut self) -> Option<&mut CellCounters> {
        self.next_report.cell_counters.as_mut()
    }

    /// Records a UE lifecycle event, dropping it and incrementing the
    /// overflow counter if the bounded queue is full (§4.7: "When the event
    /// queue overflows, an overflow counter increments and further events
    /// for the period are dropped").
    pub fn record_ue_event(&mut self, event: UeLifecycleEvent) {
        if self.next_report.ue_events.len() >= self.ue_event_queue_capacity {
            self.next_report.ue_event_overflow_count += 1;
            warn!(ue = event.ue_idx.0, "UE event queue overflow, dropping");
            return;
        }
        self.next_report.ue_events.push(event);
    }

    /// Reserves the current accumulated report for emission (pull model:
    /// `get_next()`), leaving an empty report in place for the next period.
    pub fn get_next(&mut self) -> MetricsReport {
        std::mem::take(&mut self.next_report)
    }

    /// No-op publish hook: the report returned by `get_next()` is already
    /// owned by the caller at this point; `commit()` exists to mirror the
    /// notifier contract (§4.7) for callers that reserve before filling.
    pub fn commit(&self, _report: &MetricsReport) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ue_event_queue_overflow_increments_counter_and_drops() {
        let mut handler = MetricsHandler::new(Duration::from_millis(1000), 2);
        handler.record_ue_event(UeLifecycleEvent { ue_idx: UeIndex(0), kind: UeLifecycleEventKind::Add });
        handler.record_ue_event(UeLifecycleEvent { ue_idx: UeIndex(1), kind: UeLifecycleEventKind::Add });
        handler.record_ue_event(UeLifecycleEvent { ue_idx: UeIndex(2), kind: UeLifecycleEventKind::Add });
        let report = handler.get_next();
        assert_eq!(report.ue_events.len(), 2);
        assert_eq!(report.ue_event_overflow_count, 1);
    }

    #[test]
    fn get_next_resets_accumulator() {
        let mut handler = MetricsHandler::new(Duration::from_millis(1000), 16);
        handler.ue_counters_mut(UeIndex(0)).record_dl_outcome(true);
        let first = handler.get_next();
        assert_eq!(first.ue_counters.len(), 1);
        let second = handler.get_next();
        assert!(second.ue_counters.is_empty());
    }

    #[test]
    fn latency_histogram_clamps_to_last_bin() {
        let mut counters = CellCounters::new(4, 50, 10);
        counters.record_latency(1000);
        assert_eq!(counters.latency_histogram_bins[3], 1);
    }
}
