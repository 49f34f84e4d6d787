//! What remains of the teacher's MAC layer after the final trim: the SIB1
//! generator, reused as the `scheduler::collaborators::Sib1Scheduler`
//! implementation (§4.1 step 5, §6's SIB1 sub-scheduler contract). The
//! teacher's `MacScheduler`/`EnhancedMacLayer` scaffolding is superseded by
//! the `scheduler` crate and was dropped; nothing else in this module has a
//! counterpart in the expanded spec.

pub mod sib1;

pub use sib1::{default_sib1_config, Sib1Config, Sib1Generator};
