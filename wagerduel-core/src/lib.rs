//! wagerduel - coordinator for two-player probabilistic betting duels
//!
//! Two participants connect over TCP, are seated as sides A and B, and play
//! two sets of betting rounds against a shared win-probability schedule. The
//! sides swap between sets and the winner is decided on the sum of both set
//! balances.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod game;
pub mod protocol;
pub mod server;
pub mod stopwatch;
pub mod telemetry;
pub mod types;

pub use config::{MatchConfig, ScheduleConfig, ServerConfig};
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::{Result, WagerError};
pub use game::{Game, Schedule, Stage};
pub use server::{Server, Shutdown};
pub use telemetry::{MemorySink, NullSink, TelemetryEvent, TelemetrySink, WebSocketSink};
pub use types::{ParticipantId, Side, SidePair};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_a_schedule() {
        let config = ServerConfig::default();
        let schedule = config.game.schedule.build().unwrap();
        assert_eq!(schedule.len(), 20);
        assert!(schedule
            .probabilities()
            .iter()
            .all(|p| (0.4..=0.7).contains(p)));
    }
}
