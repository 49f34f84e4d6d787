//! Wire-level shapes of the upstream events the scheduler core consumes and
//! the downstream PDU descriptors it produces (§6 "External interfaces").
//!
//! These are plain serializable DTOs: the PHY/L1 adapter (or, in tests and
//! the `gnb` demonstration harness, a synthetic generator) fills one of
//! these in and the scheduler integration layer translates it into a
//! `scheduler::event_manager::SchedulerEvent` for `EventManager::enqueue_*`.
//! Keeping the DTO shape separate from the scheduler's internal event enum
//! lets the wire format evolve (e.g. to a real F1AP/FAPI encoding) without
//! touching the scheduler crate's hot-path types.

use common::{CellId, Rnti, SlotPoint};
use serde::{Deserialize, Serialize};

/// UE lifecycle: create, with the dedicated configuration the scheduler
/// will start tracking once `UeConfigApplied` arrives (§3 "UE").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UeCreateMsg {
    pub ue_index: u32,
    pub crnti: Rnti,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UeReconfigureMsg {
    pub ue_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UeDeleteMsg {
    pub ue_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UeConfigAppliedMsg {
    pub ue_index: u32,
}

/// RACH indication: one preamble list per occasion (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RachIndicationMsg {
    pub slot_rx: SlotPoint,
    pub cell_id: CellId,
    pub occasions: Vec<RachOccasionMsg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RachOccasionMsg {
    pub start_symbol: u8,
    pub frequency_index: u16,
    pub preambles: Vec<RachPreambleMsg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RachPreambleMsg {
    pub rapid: u8,
    pub tc_rnti: Rnti,
    pub timing_advance: i16,
}

/// CRC indication: one entry per scheduled PUSCH (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrcIndicationMsg {
    pub slot_rx: SlotPoint,
    pub cell_id: CellId,
    pub pdus: Vec<CrcPduMsg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrcPduMsg {
    pub ue_index: u32,
    pub rnti: Rnti,
    pub harq_id: u8,
    pub success: bool,
    pub ul_sinr_db: f32,
    pub ul_rsrp_dbfs: f32,
    pub ta_offset: i16,
}

/// UCI indication: a tagged union of the three PDU shapes 38.212/38.213
/// define for PUCCH format 0/1, format 2/3/4, and UCI-on-PUSCH (§9 "Tagged
/// unions for UCI PDU variants").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum UciPduMsg {
    F0F1 {
        ue_index: u32,
        harq_bits: Vec<bool>,
        sr_detected: bool,
        sinr_db: f32,
        ta_offset: i16,
    },
    F2F3F4 {
        ue_index: u32,
        harq_bits: Vec<bool>,
        sr_bits: Vec<bool>,
        csi_report: Option<CsiReportMsg>,
        sinr_db: f32,
        ta_offset: i16,
    },
    Pusch {
        ue_index: u32,
        harq_bits: Vec<bool>,
        csi_report: Option<CsiReportMsg>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsiReportMsg {
    pub cqi: u8,
    pub ri: u8,
    pub pmi: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UciIndicationMsg {
    pub slot_rx: SlotPoint,
    pub cell_id: CellId,
    pub pdus: Vec<UciPduMsg>,
}

/// SRS indication: channel matrix kept opaque (PHY-internal representation;
/// the scheduler only needs the TA offset and positioning bookkeeping).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrsIndicationMsg {
    pub ue_index: u32,
    pub rnti: Rnti,
    pub channel_matrix: Vec<f32>,
    pub ta_offset: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BsrMsg {
    pub ue_index: u32,
    pub format: BsrFormat,
    pub lcg_reports: Vec<(u8, u32)>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum BsrFormat {
    Short,
    Long,
    ShortTruncated,
    LongTruncated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhrMsg {
    pub ue_index: u32,
    pub ph_db: i16,
    pub p_cmax_dbm: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlBufferOccupancyMsg {
    pub ue_index: u32,
    pub lcid: u8,
    pub pending_bytes: u32,
    pub hol_toa: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlMacCeMsg {
    pub ue_index: u32,
    pub lcid: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ErrorIndicationOutcomeMsg {
    PdcchDiscarded,
    PdschDiscarded,
    PuschAndPucchDiscarded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorIndicationMsg {
    pub slot_tx: SlotPoint,
    pub cell_id: CellId,
    pub outcome: ErrorIndicationOutcomeMsg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositioningRequestMsg {
    pub rnti: Rnti,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositioningStopMsg {
    pub rnti: Rnti,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uci_pdu_round_trips_through_json() {
        let pdu = UciPduMsg::F0F1 { ue_index: 3, harq_bits: vec![true], sr_detected: true, sinr_db: 12.5, ta_offset: 2 };
        let encoded = serde_json::to_string(&pdu).unwrap();
        let decoded: UciPduMsg = serde_json::from_str(&encoded).unwrap();
        match decoded {
            UciPduMsg::F0F1 { ue_index, sr_detected, .. } => {
                assert_eq!(ue_index, 3);
                assert!(sr_detected);
            }
            _ => panic!("wrong variant decoded"),
        }
    }

    #[test]
    fn rach_indication_round_trips() {
        let msg = RachIndicationMsg {
            slot_rx: SlotPoint::new(0, 100),
            cell_id: CellId(1),
            occasions: vec![RachOccasionMsg {
                start_symbol: 0,
                frequency_index: 0,
                preambles: vec![RachPreambleMsg { rapid: 5, tc_rnti: Rnti(0x4601), timing_advance: 10 }],
            }],
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: RachIndicationMsg = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.occasions[0].preambles[0].rapid, 5);
    }
}
