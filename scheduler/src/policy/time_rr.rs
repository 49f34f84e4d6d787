//! Plain round-robin policy: priority follows the candidate's position in
//! the rotating walk order, so sorting descending reproduces round-robin
//! order; UEs with no pending bytes are forbidden.

use super::{SchedulerPolicy, UeSchedContext, FORBID_SCHED_PRIORITY};
use crate::ue::UeIndex;

#[derive(Debug, Default)]
pub struct TimeRrPolicy;

impl TimeRrPolicy {
    fn priority(ctx: &UeSchedContext) -> i64 {
        if ctx.pending_bytes == 0 {
            return FORBID_SCHED_PRIORITY;
        }
        i64::MAX - ctx.rr_index as i64
    }
}

impl SchedulerPolicy for TimeRrPolicy {
    fn compute_ue_dl_priority(&self, ctx: &UeSchedContext) -> i64 {
        Self::priority(ctx)
    }

    fn compute_ue_ul_priority(&self, ctx: &UeSchedContext) -> i64 {
        Self::priority(ctx)
    }

    fn dl_sched_ue_done(&mut self, _ue_idx: UeIndex, _nof_rbs: u32) {}
    fn ul_sched_ue_done(&mut self, _ue_idx: UeIndex, _nof_rbs: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_pending_bytes_is_forbidden() {
        let ctx = UeSchedContext { ue_idx: UeIndex(0), rr_index: 0, pending_bytes: 0, hol_delay_slots: 0 };
        assert_eq!(TimeRrPolicy.compute_ue_dl_priority(&ctx), FORBID_SCHED_PRIORITY);
    }

    #[test]
    fn earlier_walk_position_wins() {
        let first = UeSchedContext { ue_idx: UeIndex(0), rr_index: 0, pending_bytes: 100, hol_delay_slots: 0 };
        let second = UeSchedContext { ue_idx: UeIndex(1), rr_index: 1, pending_bytes: 100, hol_delay_slots: 0 };
        let policy = TimeRrPolicy;
        assert!(policy.compute_ue_dl_priority(&first) > policy.compute_ue_dl_priority(&second));
    }
}
