//! RAN slicing: reserved + configured slice instances, the per-slice UE
//! view, candidate handles, and the inter-slice priority scheduler
//! (§3 "RAN slice", §4.2).

pub mod candidate;
pub mod id;
pub mod inter_slice;
pub mod instance;
pub mod ue_repository;

pub use candidate::{Direction, DlRanSliceCandidate, RanSliceCandidate, UlRanSliceCandidate};
pub use id::RanSliceId;
pub use inter_slice::InterSliceScheduler;
pub use instance::RanSliceInstance;
pub use ue_repository::SliceUeRepository;
