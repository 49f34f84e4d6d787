//! Fatal/boundary errors for the scheduler core.
//!
//! Per-slot recoverable conditions (late HARQ, allocator `skip_ue`, queue
//! overflow, ...) are *not* modelled here: they are expected control flow
//! handled inline by the component that hits them (see `alloc::AllocOutcome`
//! and the counters in `metrics`). `SchedulerError` is reserved for the
//! "fatal conditions" the spec calls out as caller contract violations:
//! out-of-range UE indices, unknown cells, and resource-grid ring
//! invariant violations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("UE index {0:?} is out of range or unknown to this cell")]
    UnknownUe(crate::ue::UeIndex),

    #[error("cell {0} is not registered with the scheduler")]
    UnknownCell(u16),

    #[error("slot {requested} is no longer within the resource grid ring (head={head})")]
    SlotOutOfRing { requested: String, head: String },

    #[error("RAN slice {0:?} is not configured on this cell")]
    UnknownSlice(crate::slice::RanSliceId),

    #[error("invalid cell configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
