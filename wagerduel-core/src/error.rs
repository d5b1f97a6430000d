use crate::game::{Stage, Transition};
use crate::types::Side;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WagerError>;

#[derive(Error, Debug)]
pub enum WagerError {
    #[error("Illegal bet amount: {0:?}")]
    MalformedBet(String),

    #[error("Bet amount already set for player {side} (pending ${existing})")]
    DuplicateBet { side: Side, existing: u64 },

    #[error("Not in game while placing bet (stage: {0:?})")]
    NotInPlay(Stage),

    #[error("No bet recorded for player {0}")]
    MissingBet(Side),

    #[error("Illegal transition {transition:?} from stage {stage:?}")]
    IllegalTransition { stage: Stage, transition: Transition },

    #[error("Both seats are already taken")]
    SeatsFull,

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WagerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn schedule(msg: impl Into<String>) -> Self {
        Self::InvalidSchedule(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::Telemetry(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for faults a participant caused by submitting a bad bet.
    pub fn is_bet_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedBet(_) | Self::DuplicateBet { .. } | Self::NotInPlay(_)
        )
    }
}
