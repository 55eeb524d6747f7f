use thiserror::Error;

use crate::engine::SenderId;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid control delta {value} for sender {sender}")]
    InvalidDelta { sender: SenderId, value: f64 },

    /// Every sender always has a pending send tick, so running dry means the
    /// event loop lost track of a sender.
    #[error("event queue exhausted at t={time}")]
    EventQueueExhausted { time: f64 },

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown observation feature `{0}`")]
    UnknownFeature(String),

    #[error("expected {expected} actions, got {got}")]
    ActionCountMismatch { expected: usize, got: usize },

    #[error("window mode requires a cwnd delta for sender {0}")]
    MissingWindowDelta(SenderId),
}

pub type Result<T> = std::result::Result<T, SimError>;
