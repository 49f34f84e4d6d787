//! Out-of-scope collaborator layer (§1: "PHY I/O layer... RACH/SSB/SIB/
//! paging common-channel sub-schedulers... RLC/F1AP bearer layer above the
//! scheduler" — "their data is consumed through the interfaces in §6").
//!
//! The scheduler core (`scheduler` crate) is the deliverable; this crate is
//! reduced to the one collaborator it actually invokes directly, the SIB1
//! generator (§4.1 step 5, `scheduler::collaborators::Sib1Collaborator`).
//! Everything else a DU integrates above/below the scheduler — PHY DSP,
//! RLC/PDCP/RRC/NGAP, the ZMQ UE-simulation RF front-end — has no
//! counterpart in this spec's scope and was dropped at the final trim.

pub mod mac;

use thiserror::Error;

/// Errors surfaced by the collaborators kept in this crate.
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}
