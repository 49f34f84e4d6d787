//! Per-UE scheduling priority computation for a slice's newTx candidates
//! (§4.3 Stage 1, §2 "Policy (round-robin / QoS)"). Grounded on
//! `lib/scheduler/policy/scheduler_policy.h`.

pub mod time_qos;
pub mod time_rr;

pub use time_qos::TimeQosPolicy;
pub use time_rr::TimeRrPolicy;

use crate::ue::UeIndex;

/// Sentinel priority meaning "do not schedule this UE this slot" (§4.3:
/// "`forbid_sched_priority` means skip").
pub const FORBID_SCHED_PRIORITY: i64 = i64::MIN;

/// Per-UE facts a policy needs to assign a newTx priority. Built by the
/// intra-slice scheduler's Stage 1 candidate walk.
#[derive(Debug, Clone, Copy)]
pub struct UeSchedContext {
    pub ue_idx: UeIndex,
    /// Position in the round-robin walk order starting from the rotating
    /// group offset (§4.3 Stage 1).
    pub rr_index: usize,
    pub pending_bytes: u32,
    /// Slots elapsed since the head-of-line byte arrived.
    pub hol_delay_slots: u32,
}

/// Computes per-UE scheduling priority for a slice, and is notified of the
/// final grant list so it can update its own accounting (§4.3 Stage 4).
pub trait SchedulerPolicy: Send {
    fn compute_ue_dl_priority(&self, ctx: &UeSchedContext) -> i64;
    fn compute_ue_ul_priority(&self, ctx: &UeSchedContext) -> i64;

    /// Notifies the policy that `ue_idx` received a DL grant of `nof_rbs`
    /// this slot (e.g. to update a QoS moving average).
    fn dl_sched_ue_done(&mut self, ue_idx: UeIndex, nof_rbs: u32);
    fn ul_sched_ue_done(&mut self, ue_idx: UeIndex, nof_rbs: u32);
}

pub fn make_policy(strategy: crate::config::SchedStrategy) -> Box<dyn SchedulerPolicy> {
    match strategy {
        crate::config::SchedStrategy::TimeRr => Box::new(TimeRrPolicy::default()),
        crate::config::SchedStrategy::TimeQos { alpha, beta, gamma } => {
            Box::new(TimeQosPolicy::new(alpha, beta, gamma))
        }
    }
}
