//! Wire-level message shapes crossing the PHY↔MAC boundary (§6 "External
//! interfaces"). Narrowed from the teacher's ZMQ UE-simulation transport: no
//! socket handling lives here any more, only the serializable event/PDU DTOs
//! a PHY adapter would fill in and hand to the scheduler's `EventManager`.

pub mod message_types;

use thiserror::Error;

/// Errors constructing or decoding a boundary message.
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
