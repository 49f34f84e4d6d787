//! QoS-weighted policy, loosely modelled on
//! `lib/scheduler/policy/scheduler_time_qos.h`'s weighted combination of
//! queueing delay and buffer occupancy (a simplified proportional-fair-style
//! score rather than the original's full QCI-to-5QI table, which this crate
//! does not own -- that belongs to the RRC/QoS-flow configuration layer).

use super::{SchedulerPolicy, UeSchedContext, FORBID_SCHED_PRIORITY};
use crate::ue::UeIndex;
use std::collections::HashMap;

pub struct TimeQosPolicy {
    alpha: f32,
    beta: f32,
    gamma: f32,
    /// Exponential moving average of RBs served per UE, used to penalise
    /// UEs that have recently been served well (the "proportional" part).
    avg_served_rbs: HashMap<UeIndex, f32>,
}

impl TimeQosPolicy {
    pub fn new(alpha: f32, beta: f32, gamma: f32) -> Self {
        Self { alpha, beta, gamma, avg_served_rbs: HashMap::new() }
    }

    fn priority(&self, ctx: &UeSchedContext) -> i64 {
        if ctx.pending_bytes == 0 {
            return FORBID_SCHED_PRIORITY;
        }
        let avg_rate = self.avg_served_rbs.get(&ctx.ue_idx).copied().unwrap_or(0.0).max(1.0);
        let score = self.alpha * (ctx.pending_bytes as f32).ln_1p()
            + self.beta * ctx.hol_delay_slots as f32
            - self.gamma * avg_rate;
        // Scale to a stable integer ordering key; QoS scores are small
        // floats so a fixed-point shift keeps ties resolved deterministically.
        (score * 1000.0) as i64
    }

    fn update_served(&mut self, ue_idx: UeIndex, nof_rbs: u32) {
        const EMA_ALPHA: f32 = 0.1;
        let entry = self.avg_served_rbs.entry(ue_idx).or_insert(0.0);
        *entry += EMA_ALPHA * (nof_rbs as f32 - *entry);
    }
}

impl SchedulerPolicy for TimeQosPolicy {
    fn compute_ue_dl_priority(&self, ctx: &UeSchedContext) -> i64 {
        self.priority(ctx)
    }

    fn compute_ue_ul_priority(&self, ctx: &UeSchedContext) -> i64 {
        self.priority(ctx)
    }

    fn dl_sched_ue_done(&mut self, ue_idx: UeIndex, nof_rbs: u32) {
        self.update_served(ue_idx, nof_rbs);
    }

    fn ul_sched_ue_done(&mut self, ue_idx: UeIndex, nof_rbs: u32) {
        self.update_served(ue_idx, nof_rbs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serving_a_ue_lowers_its_future_priority() {
        let mut policy = TimeQosPolicy::new(1.0, 0.1, 2.0);
        let ctx = UeSchedContext { ue_idx: UeIndex(0), rr_index: 0, pending_bytes: 5000, hol_delay_slots: 2 };
        let before = policy.compute_ue_dl_priority(&ctx);
        policy.dl_sched_ue_done(UeIndex(0), 50);
        let after = policy.compute_ue_dl_priority(&ctx);
        assert!(after < before);
    }

    #[test]
    fn zero_pending_bytes_is_forbidden() {
        let policy = TimeQosPolicy::new(1.0, 0.1, 2.0);
        let ctx = UeSchedContext { ue_idx: UeIndex(0), rr_index: 0, pending_bytes: 0, hol_delay_slots: 0 };
        assert_eq!(policy.compute_ue_dl_priority(&ctx), FORBID_SCHED_PRIORITY);
    }
}
