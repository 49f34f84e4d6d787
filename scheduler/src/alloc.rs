//! Allocator failure taxonomy shared by the PDCCH/PUCCH/PUSCH grant
//! allocators (§7 "Allocator failures"). Kept intentionally small: these
//! are recoverable, per-candidate outcomes, distinct from [`crate::error::SchedulerError`]
//! which is reserved for boundary/fatal violations.

/// Outcome of attempting to allocate control or data resources for one
/// candidate UE during intra-slice scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocOutcome {
    Success,
    /// Skip this candidate, keep trying the next one.
    SkipUe,
    /// Abort the rest of intra-slice scheduling for this slice and direction.
    SkipSlot,
    /// Parameters made no sense (e.g. zero RB budget); silently ignored.
    InvalidParams,
    /// The UCI allocator could not find room for a HARQ-ACK resource; DL
    /// candidates after this one are restricted to UEs that already have a
    /// PUCCH or a future PUSCH in the scheduling window (§4.3 Stage 2).
    UciAllocFailed,
}

impl AllocOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, AllocOutcome::Success)
    }

    pub fn stops_slice(self) -> bool {
        matches!(self, AllocOutcome::SkipSlot)
    }
}

/// Tracks the PDCCH candidate budget for one slot: the number of
/// `max_pdcch_alloc_attempts_per_slot` attempts, and the PDSCH/PUSCH/PUCCH
/// per-slot caps (§4.3 Stage 2 stop conditions, §6 recognised options).
#[derive(Debug, Clone, Copy)]
pub struct SlotGrantBudget {
    pub max_pdschs: u32,
    pub max_puschs: u32,
    pub max_pucchs: u32,
    pub max_ul_grants: u32,
    pub max_pdcch_alloc_attempts: u32,
    pub rb_budget: u32,

    pdschs_used: u32,
    puschs_used: u32,
    pucchs_used: u32,
    ul_grants_used: u32,
    pdcch_attempts_used: u32,
    rbs_used: u32,
}

impl SlotGrantBudget {
    pub fn new(
        max_pdschs: u32,
        max_puschs: u32,
        max_pucchs: u32,
        max_ul_grants: u32,
        max_pdcch_alloc_attempts: u32,
        rb_budget: u32,
    ) -> Self {
        Self {
            max_pdschs,
            max_puschs,
            max_pucchs,
            max_ul_grants,
            max_pdcch_alloc_attempts,
            rb_budget,
            pdschs_used: 0,
            puschs_used: 0,
            pucchs_used: 0,
            ul_grants_used: 0,
            pdcch_attempts_used: 0,
            rbs_used: 0,
        }
    }

    pub fn from_expert_cfg(cfg: &crate::config::SchedulerExpertConfig, rb_budget: u32) -> Self {
        Self::new(
            cfg.max_pdschs_per_slot as u32,
            cfg.max_puschs_per_slot as u32,
            cfg.max_pucchs_per_slot as u32,
            cfg.max_ul_grants_per_slot as u32,
            cfg.max_pdcch_alloc_attempts_per_slot as u32,
            rb_budget,
        )
    }

    pub fn pdsch_exhausted(&self) -> bool {
        self.pdschs_used >= self.max_pdschs || self.rbs_used >= self.rb_budget
    }

    pub fn pusch_exhausted(&self) -> bool {
        self.puschs_used >= self.max_puschs
            || self.ul_grants_used >= self.max_ul_grants
            || self.rbs_used >= self.rb_budget
    }

    pub fn pdcch_attempts_exhausted(&self) -> bool {
        self.pdcch_attempts_used >= self.max_pdcch_alloc_attempts
    }

    pub fn pucch_exhausted(&self) -> bool {
        self.pucchs_used >= self.max_pucchs
    }

    /// Attempts to reserve one PDCCH candidate, bumping the attempt
    /// counter regardless of success so a run of failures still exhausts
    /// the budget (§4.3 Stage 2: "the PDCCH allocator signals `skip_slot`").
    pub fn try_reserve_pdcch(&mut self) -> AllocOutcome {
        if self.pdcch_attempts_exhausted() {
            return AllocOutcome::SkipSlot;
        }
        self.pdcch_attempts_used += 1;
        AllocOutcome::Success
    }

    pub fn try_reserve_pucch(&mut self) -> AllocOutcome {
        if self.pucch_exhausted() {
            return AllocOutcome::UciAllocFailed;
        }
        self.pucchs_used += 1;
        AllocOutcome::Success
    }

    pub fn reserve_pdsch(&mut self, nof_rbs: u32) {
        self.pdschs_used += 1;
        self.rbs_used += nof_rbs;
    }

    pub fn reserve_pusch(&mut self, nof_rbs: u32) {
        self.puschs_used += 1;
        self.ul_grants_used += 1;
        self.rbs_used += nof_rbs;
    }

    pub fn remaining_rbs(&self) -> u32 {
        self.rb_budget.saturating_sub(self.rbs_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdcch_budget_exhausts_after_max_attempts() {
        let mut budget = SlotGrantBudget::new(10, 10, 10, 10, 2, 100);
        assert_eq!(budget.try_reserve_pdcch(), AllocOutcome::Success);
        assert_eq!(budget.try_reserve_pdcch(), AllocOutcome::Success);
        assert_eq!(budget.try_reserve_pdcch(), AllocOutcome::SkipSlot);
    }

    #[test]
    fn pucch_exhaustion_reports_uci_alloc_failed() {
        let mut budget = SlotGrantBudget::new(10, 10, 1, 10, 10, 100);
        assert_eq!(budget.try_reserve_pucch(), AllocOutcome::Success);
        assert_eq!(budget.try_reserve_pucch(), AllocOutcome::UciAllocFailed);
    }

    #[test]
    fn rb_budget_exhausts_pdsch() {
        let mut budget = SlotGrantBudget::new(10, 10, 10, 10, 10, 20);
        assert!(!budget.pdsch_exhausted());
        budget.reserve_pdsch(20);
        assert!(budget.pdsch_exhausted());
    }
}
