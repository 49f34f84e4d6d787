//! Meridian 5G GNodeB demonstration harness.
//!
//! Assembles a [`scheduler::Scheduler`] cell group from a TOML config,
//! feeds it synthetic per-slot events the way a PHY integrator's adapter
//! would translate `interfaces::message_types` wire DTOs into
//! `scheduler::SchedulerEvent`s, and logs the resulting `SchedResult` each
//! slot. It is not a PHY/RF front-end -- that integration point is left to
//! the caller per §1 and §6.

mod config;

use anyhow::Result;
use clap::Parser;
use common::SlotPoint;
use config::GnbConfig;
use interfaces::message_types::CrcPduMsg;
use scheduler::cell_scheduler::CellSchedulerCollaborators;
use scheduler::collaborators::{NullCollaborators, Sib1Collaborator};
use scheduler::event_manager::{CrcIndication, SchedulerEvent};
use scheduler::ue::UeIndex;
use scheduler::Scheduler;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Meridian 5G GNodeB
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file; falls back to built-in defaults
    /// if the file does not exist.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Slot period in milliseconds, for the synthetic slot clock driving
    /// this harness (a real DU derives this from the PHY's timing source).
    #[arg(long, default_value = "1")]
    slot_period_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt().with_env_filter(env_filter).with_target(true).with_thread_ids(true).with_line_number(true).init();

    info!("Starting Meridian GNodeB scheduler harness");

    let gnb_cfg = match GnbConfig::from_toml_file(&args.config) {
        Ok(cfg) => {
            info!(path = %args.config, "loaded configuration");
            cfg
        }
        Err(err) => {
            warn!(path = %args.config, %err, "could not load configuration, using defaults");
            GnbConfig::default()
        }
    };
    let cell_cfg = gnb_cfg.to_cell_configuration()?;
    let cell_id = cell_cfg.cell_id;
    let ring_size = gnb_cfg.cell.ring_size;

    info!(cell = cell_id.0, nof_prbs = cell_cfg.nof_prbs, tdd = cell_cfg.tdd_ul_dl_pattern.is_some(), "cell configuration");

    let scheduler = Scheduler::new();
    let sib1_cfg = layers::mac::default_sib1_config(cell_id);
    let collaborators = CellSchedulerCollaborators {
        ssb: Box::new(NullCollaborators),
        csi_rs: Box::new(NullCollaborators),
        sib1: Box::new(Sib1Collaborator::new(sib1_cfg, 160)),
        ra: Box::new(NullCollaborators),
        paging: Box::new(NullCollaborators),
        fallback: Box::new(NullCollaborators),
    };
    scheduler.add_cell(cell_cfg, ring_size, collaborators);

    // A single synthetic UE joins at startup, sends periodic DL traffic and
    // BSRs, and never leaves -- a stand-in for the RRC/F1AP bearer setup
    // this crate does not own (§1).
    let demo_ue = UeIndex(0);
    scheduler.event_manager_for(cell_id, |events| {
        events.enqueue_common(SchedulerEvent::UeCreate { ue_idx: demo_ue, crnti: common::Rnti(0x4601) });
        events.enqueue_common(SchedulerEvent::UeConfigApplied { ue_idx: demo_ue });
    })?;

    let mut slot = SlotPoint::new(1, 0);
    let mut interval = tokio::time::interval(Duration::from_millis(args.slot_period_ms));
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if ticks % 50 == 0 {
                    // Periodic DL buffer-occupancy report and BSR, so the demo
                    // cell has something to schedule (§4.5 event ingress).
                    scheduler.event_manager_for(cell_id, |events| {
                        events.enqueue_cell(cell_id, SchedulerEvent::DlBufferOccupancy {
                            ue_idx: demo_ue,
                            lcid: 4,
                            pending_bytes: 1500,
                            hol_toa: slot.count(),
                        });
                        events.enqueue_cell(cell_id, SchedulerEvent::Bsr { ue_idx: demo_ue, lcg: 0, reported_bytes: 800 });
                    })?;
                }

                if ticks % 8 == 0 {
                    // Stand-in for a PHY adapter translating a `CrcPduMsg` off
                    // the wire into the scheduler's own `CrcIndication` (§6).
                    let crc_msg = CrcPduMsg {
                        ue_index: demo_ue.0,
                        rnti: common::Rnti(0x4601),
                        harq_id: 0,
                        success: true,
                        ul_sinr_db: 18.5,
                        ul_rsrp_dbfs: -90.0,
                        ta_offset: 2,
                    };
                    scheduler.event_manager_for(cell_id, |events| {
                        events.enqueue_cell(cell_id, SchedulerEvent::Crc(CrcIndication {
                            slot_rx: slot,
                            ue_idx: demo_ue,
                            harq_id: crc_msg.harq_id,
                            success: crc_msg.success,
                            ul_sinr_db: crc_msg.ul_sinr_db,
                            ul_rsrp_dbfs: crc_msg.ul_rsrp_dbfs,
                            ta_offset: crc_msg.ta_offset,
                        }));
                    })?;
                }

                match scheduler.slot_indication(cell_id, slot) {
                    Ok(result) => {
                        if !result.pdsch_ue.is_empty() || !result.pusch.is_empty() {
                            info!(
                                slot = slot.count(),
                                pdsch = result.pdsch_ue.len(),
                                pusch = result.pusch.len(),
                                pucch = result.pucch.len(),
                                "slot scheduled"
                            );
                        }
                    }
                    Err(err) => error!(%err, "slot_indication failed"),
                }

                slot = slot.add(1);
                ticks += 1;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal");
                break;
            }
        }
    }

    scheduler.request_stop(cell_id)?;
    scheduler.slot_indication(cell_id, slot)?;
    info!("GNodeB shutdown complete");
    Ok(())
}
