//! Per-cell and slicing configuration structs.
//!
//! These are injected by the caller at cell-add time (§6: "CLI / config /
//! env. Not part of the core; injected as ... configuration structs at
//! cell-add time"). The scheduler crate never parses a config file itself;
//! `gnb` is responsible for turning CLI/TOML input into these types.

use common::{CellId, SubcarrierSpacing};
use serde::{Deserialize, Serialize};

/// Reserved slice carrying SRB1/SRB2 traffic; always highest priority, always
/// granted the whole cell bandwidth.
pub const SRB_RAN_SLICE_ID: u8 = 0;
/// Catch-all slice for DRBs with no matching RRM policy member.
pub const DEFAULT_DRB_RAN_SLICE_ID: u8 = 1;

/// Scheduling strategy selector for a slice's intra-slice policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SchedStrategy {
    /// Plain round robin over newTx candidates.
    TimeRr,
    /// QoS-weighted proportional-fair style policy.
    TimeQos { alpha: f32, beta: f32, gamma: f32 },
}

impl Default for SchedStrategy {
    fn default() -> Self {
        SchedStrategy::TimeRr
    }
}

/// RRM contract for one RAN slice (§3 "RAN slice").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceRrmPolicyConfig {
    pub min_rb: u16,
    pub max_rb: u16,
    pub dedicated_rb: u16,
    pub priority: u8,
    /// PLMN + S-NSSAI identifying the RRM policy member; `None` for the two
    /// reserved slices.
    pub member: Option<common::SNssai>,
    pub strategy: SchedStrategy,
}

impl SliceRrmPolicyConfig {
    /// Clamp min/max RB to the cell's PRB count, as done at slice construction.
    pub fn clamped(mut self, cell_nof_prbs: u16) -> Self {
        self.min_rb = self.min_rb.min(cell_nof_prbs);
        self.max_rb = self.max_rb.min(cell_nof_prbs);
        self.dedicated_rb = self.dedicated_rb.min(cell_nof_prbs);
        if self.min_rb > self.max_rb {
            self.min_rb = self.max_rb;
        }
        self
    }
}

/// Per-slot budgets and algorithm knobs (§6 recognised options table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerExpertConfig {
    pub max_pdschs_per_slot: u16,
    pub max_puschs_per_slot: u16,
    pub max_pucchs_per_slot: u16,
    pub max_ul_grants_per_slot: u16,
    pub max_pdcch_alloc_attempts_per_slot: u16,
    pub pre_policy_rr_ue_group_size: u16,
    pub dl_harq_retx_timeout_slots: u16,
    pub ul_harq_retx_timeout_slots: u16,
    pub enable_csi_rs_pdsch_multiplexing: bool,
    /// Grace window (in slots) after which a still-waiting-ack HARQ process
    /// is force-expired and reported as a timeout (§4.4).
    pub dl_harq_ack_timeout_slots: u16,
    /// Maximum slots a pending UE removal waits before the repository
    /// destroys the UE, to avoid PUCCH/C-RNTI reuse collisions (§5).
    pub max_ul_alloc_delay: u16,
    /// How far in the future CRC/UCI feedback may lag before the HARQ is
    /// force-resolved and logged as late (§5 ordering guarantees).
    pub max_feedback_window: u16,
}

impl Default for SchedulerExpertConfig {
    fn default() -> Self {
        Self {
            max_pdschs_per_slot: 16,
            max_puschs_per_slot: 16,
            max_pucchs_per_slot: 32,
            max_ul_grants_per_slot: 16,
            max_pdcch_alloc_attempts_per_slot: 32,
            pre_policy_rr_ue_group_size: 4,
            dl_harq_retx_timeout_slots: 4,
            ul_harq_retx_timeout_slots: 4,
            enable_csi_rs_pdsch_multiplexing: false,
            dl_harq_ack_timeout_slots: 240,
            max_ul_alloc_delay: 16,
            max_feedback_window: 32,
        }
    }
}

/// One CORESET's PDCCH candidate shape, as referenced by the search spaces
/// that use it (§3 "Cell configuration": "search-space and CORESET tables").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoresetConfig {
    pub coreset_id: u8,
    pub nof_symbols: u8,
    /// Half-open `[start, stop)` PRB range the CORESET occupies.
    pub prb_start: u16,
    pub prb_stop: u16,
}

/// A search space: which CORESET it searches, on which slots, and at which
/// aggregation levels (§3 "Cell configuration").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpaceConfig {
    pub search_space_id: u8,
    pub coreset_id: u8,
    pub monitoring_slot_period: u16,
    pub monitoring_slot_offset: u16,
    pub aggregation_levels: Vec<u8>,
}

/// Template for a cell's periodic SR/CSI/SRS placement (§3 "Cell
/// configuration": "SR/CSI/SRS templates"); consumed by
/// `UciSrsScheduler::register_periodic` at UE-add time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicUciTemplate {
    pub sr_period_slots: u32,
    pub sr_offset: u32,
    pub csi_period_slots: u32,
    pub csi_offset: u32,
    pub srs_period_slots: u32,
    pub srs_offset: u32,
}

impl Default for PeriodicUciTemplate {
    fn default() -> Self {
        Self {
            sr_period_slots: 20,
            sr_offset: 0,
            csi_period_slots: 40,
            csi_offset: 1,
            srs_period_slots: 40,
            srs_offset: 2,
        }
    }
}

/// The cell's PUCCH resource pool for on-demand HARQ-ACK allocation
/// (§3 "Cell configuration"), consulted by
/// `UciSrsScheduler::alloc_harq_ack` instead of a hardcoded resource index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PucchResourceSetConfig {
    /// Candidate resource indicators, in the order they're tried.
    pub harq_ack_resource_indicators: Vec<u8>,
}

impl Default for PucchResourceSetConfig {
    fn default() -> Self {
        Self { harq_ack_resource_indicators: vec![2, 3, 4, 5, 6, 7] }
    }
}

/// Immutable per-cell configuration (§3 "Cell configuration").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellConfiguration {
    pub cell_id: CellId,
    pub nof_prbs: u16,
    pub scs: SubcarrierSpacing,
    /// `None` for FDD cells; `Some` gives the DL/UL slot pattern for TDD.
    pub tdd_ul_dl_pattern: Option<TddUlDlPattern>,
    pub slices: Vec<SliceRrmPolicyConfig>,
    pub expert_cfg: SchedulerExpertConfig,
    /// HARQ timing/softbuffer behaviour; see the spec's open question on
    /// mode B's retx-timer/PUCCH-counter interaction, left as a knob here.
    pub harq_mode: HarqOperatingMode,
    pub coresets: Vec<CoresetConfig>,
    pub search_spaces: Vec<SearchSpaceConfig>,
    pub periodic_uci_template: PeriodicUciTemplate,
    pub pucch_resources: PucchResourceSetConfig,
}

impl CellConfiguration {
    pub fn nof_prbs(&self) -> u16 {
        self.nof_prbs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarqOperatingMode {
    /// Mode A: retx timer and PUCCH-counter expiry are independent triggers.
    A,
    /// Mode B: the retx timer can also apply across PUCCH-counter expiry;
    /// exact interaction left as a documented knob (open question, §9).
    B,
}

/// TDD DL/UL slot-format pattern, e.g. the DDDSU pattern used in the spec's
/// end-to-end scenario 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TddUlDlPattern {
    pub slots: Vec<SlotDirection>,
}

impl TddUlDlPattern {
    pub fn dddsu() -> Self {
        Self {
            slots: vec![
                SlotDirection::Dl,
                SlotDirection::Dl,
                SlotDirection::Dl,
                SlotDirection::Special,
                SlotDirection::Ul,
            ],
        }
    }

    pub fn direction_of(&self, slot_index_in_period: u32) -> SlotDirection {
        self.slots[(slot_index_in_period as usize) % self.slots.len()]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotDirection {
    Dl,
    Ul,
    Special,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_min_max_to_cell_prbs() {
        let cfg = SliceRrmPolicyConfig {
            min_rb: 200,
            max_rb: 300,
            dedicated_rb: 0,
            priority: 1,
            member: None,
            strategy: SchedStrategy::TimeRr,
        }
        .clamped(106);
        assert_eq!(cfg.min_rb, 106);
        assert_eq!(cfg.max_rb, 106);
    }

    #[test]
    fn dddsu_pattern_cycles() {
        let p = TddUlDlPattern::dddsu();
        assert_eq!(p.direction_of(0), SlotDirection::Dl);
        assert_eq!(p.direction_of(3), SlotDirection::Special);
        assert_eq!(p.direction_of(4), SlotDirection::Ul);
        assert_eq!(p.direction_of(5), SlotDirection::Dl);
    }
}
