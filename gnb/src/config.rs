//! TOML configuration structures for the `gnb` demonstration harness.
//!
//! Narrowed from the teacher's srsRAN-compatible YAML format: the CU-CP/
//! CU-UP/AMF/RU-SDR sections described a whole DU/CU split this crate's
//! scope excludes (§1), so only the cell and slicing parameters that feed
//! [`scheduler::config::CellConfiguration`] remain, in `toml` (the
//! `config`/`toml` crates this workspace actually depends on) rather than
//! `serde_yaml`.

use scheduler::config::{
    CellConfiguration, HarqOperatingMode, PeriodicUciTemplate, PucchResourceSetConfig, SchedStrategy,
    SchedulerExpertConfig, SliceRrmPolicyConfig, TddUlDlPattern,
};
use serde::{Deserialize, Serialize};

/// Root of `config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GnbConfig {
    pub cell: CellTomlConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub slices: Vec<SliceTomlConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CellTomlConfig {
    pub cell_id: u16,
    #[serde(default = "default_nof_prbs")]
    pub nof_prbs: u16,
    #[serde(default = "default_scs_khz")]
    pub scs_khz: u32,
    /// TDD DDDSU pattern if set; an FDD/unpaired-spectrum deployment leaves
    /// this unset and every slot is implicitly `Dl`/`Ul` per the PHY
    /// integrator's own duplex mode (outside this crate's scope, §1).
    #[serde(default)]
    pub tdd_dddsu: bool,
    #[serde(default = "default_ring_size")]
    pub ring_size: usize,
}

fn default_nof_prbs() -> u16 {
    106
}

fn default_scs_khz() -> u32 {
    30
}

fn default_ring_size() -> usize {
    80
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SliceTomlConfig {
    pub min_rb: u16,
    pub max_rb: u16,
    #[serde(default)]
    pub dedicated_rb: u16,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub strategy: SliceStrategyToml,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceStrategyToml {
    #[default]
    TimeRr,
    TimeQos,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GnbConfig {
    pub fn from_toml_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: GnbConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Translates the TOML shape into the scheduler's own configuration
    /// type. A raw `nof_prbs`/`scs`/pattern mismatch is caught here rather
    /// than deep inside the scheduler, per §7 ("fail fast at configuration
    /// boundaries, never mid-slot").
    pub fn to_cell_configuration(&self) -> anyhow::Result<CellConfiguration> {
        let scs = match self.cell.scs_khz {
            15 => common::types::SubcarrierSpacing::Scs15,
            30 => common::types::SubcarrierSpacing::Scs30,
            60 => common::types::SubcarrierSpacing::Scs60,
            120 => common::types::SubcarrierSpacing::Scs120,
            240 => common::types::SubcarrierSpacing::Scs240,
            other => return Err(anyhow::anyhow!("unsupported subcarrier spacing: {other} kHz")),
        };

        let slices = self
            .slices
            .iter()
            .map(|s| SliceRrmPolicyConfig {
                min_rb: s.min_rb,
                max_rb: s.max_rb,
                dedicated_rb: s.dedicated_rb,
                priority: s.priority,
                member: None,
                strategy: match s.strategy {
                    SliceStrategyToml::TimeRr => SchedStrategy::TimeRr,
                    SliceStrategyToml::TimeQos => SchedStrategy::TimeQos { alpha: 1.0, beta: 0.1, gamma: 2.0 },
                },
            })
            .collect();

        Ok(CellConfiguration {
            cell_id: common::types::CellId(self.cell.cell_id),
            nof_prbs: self.cell.nof_prbs,
            scs,
            tdd_ul_dl_pattern: if self.cell.tdd_dddsu { Some(TddUlDlPattern::dddsu()) } else { None },
            slices,
            expert_cfg: SchedulerExpertConfig::default(),
            harq_mode: HarqOperatingMode::A,
            coresets: Vec::new(),
            search_spaces: Vec::new(),
            periodic_uci_template: PeriodicUciTemplate::default(),
            pucch_resources: PucchResourceSetConfig::default(),
        })
    }
}

impl Default for GnbConfig {
    fn default() -> Self {
        Self {
            cell: CellTomlConfig {
                cell_id: 1,
                nof_prbs: default_nof_prbs(),
                scs_khz: default_scs_khz(),
                tdd_dddsu: true,
                ring_size: default_ring_size(),
            },
            log: LogConfig::default(),
            slices: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_converts_to_a_valid_cell_configuration() {
        let cfg = GnbConfig::default();
        let cell_cfg = cfg.to_cell_configuration().unwrap();
        assert_eq!(cell_cfg.nof_prbs, 106);
        assert!(cell_cfg.tdd_ul_dl_pattern.is_some());
    }

    #[test]
    fn unsupported_scs_is_rejected() {
        let mut cfg = GnbConfig::default();
        cfg.cell.scs_khz = 7;
        assert!(cfg.to_cell_configuration().is_err());
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_str = r#"
            [cell]
            cell_id = 3
            nof_prbs = 52
            scs_khz = 15
        "#;
        let cfg: GnbConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.cell.cell_id, 3);
        assert_eq!(cfg.cell.nof_prbs, 52);
    }
}
