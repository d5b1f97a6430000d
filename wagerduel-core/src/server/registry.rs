use crate::coordinator::CoordinatorHandle;
use crate::error::{Result, WagerError};
use crate::game::{Outbox, Participant};
use crate::types::{ParticipantId, Side};
use parking_lot::Mutex;

pub const SEATS: usize = 2;

/// Result of seating one connection.
#[derive(Debug)]
pub enum Seating {
    /// First arrival; waiting for an opponent.
    Waiting { participant: ParticipantId, side: Side },
    /// Second arrival; the pair is handed out to start a match.
    Complete {
        participant: ParticipantId,
        side: Side,
        pair: Box<[Participant; SEATS]>,
    },
}

impl Seating {
    pub fn participant(&self) -> ParticipantId {
        match self {
            Seating::Waiting { participant, .. } | Seating::Complete { participant, .. } => {
                *participant
            }
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Seating::Waiting { side, .. } | Seating::Complete { side, .. } => *side,
        }
    }
}

#[derive(Default)]
struct Seats {
    seated: usize,
    waiting: Vec<Participant>,
    coordinator: Option<CoordinatorHandle>,
}

/// Seats the first two named connections for a single match.
#[derive(Default)]
pub struct SeatRegistry {
    seats: Mutex<Seats>,
}

impl SeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seated(&self) -> usize {
        self.seats.lock().seated
    }

    pub fn is_full(&self) -> bool {
        self.seated() >= SEATS
    }

    pub fn seat(&self, name: String, outbox: Outbox) -> Result<Seating> {
        let mut seats = self.seats.lock();
        if seats.seated >= SEATS {
            return Err(WagerError::SeatsFull);
        }

        let participant = ParticipantId(seats.seated);
        let side = if seats.seated == 0 { Side::A } else { Side::B };
        seats.seated += 1;
        seats
            .waiting
            .push(Participant::new(participant, name, side, outbox));

        if seats.seated < SEATS {
            return Ok(Seating::Waiting { participant, side });
        }

        let mut waiting = std::mem::take(&mut seats.waiting).into_iter();
        match (waiting.next(), waiting.next()) {
            (Some(first), Some(second)) => Ok(Seating::Complete {
                participant,
                side,
                pair: Box::new([first, second]),
            }),
            _ => Err(WagerError::internal("seat registry lost a participant")),
        }
    }

    pub fn install(&self, coordinator: CoordinatorHandle) {
        self.seats.lock().coordinator = Some(coordinator);
    }

    pub fn coordinator(&self) -> Option<CoordinatorHandle> {
        self.seats.lock().coordinator.clone()
    }

    /// Drop anyone still waiting for an opponent, closing their outboxes.
    pub fn release(&self) {
        self.seats.lock().waiting.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_two() {
        let registry = SeatRegistry::new();
        let (first, _) = Outbox::channel();
        let (second, _) = Outbox::channel();
        let (third, _) = Outbox::channel();

        let seating = registry.seat("alice".to_string(), first).unwrap();
        assert!(matches!(seating, Seating::Waiting { side: Side::A, .. }));
        assert!(!registry.is_full());

        let seating = registry.seat("bob".to_string(), second).unwrap();
        assert_eq!(seating.participant(), ParticipantId(1));
        assert_eq!(seating.side(), Side::B);
        let Seating::Complete { pair, .. } = seating else {
            panic!("expected a complete pair");
        };
        assert_eq!(pair[0].name(), "alice");
        assert_eq!(pair[1].name(), "bob");

        assert!(registry.is_full());
        assert!(matches!(
            registry.seat("carol".to_string(), third),
            Err(WagerError::SeatsFull)
        ));
    }

    #[test]
    fn test_release_closes_waiting_outbox() {
        let registry = SeatRegistry::new();
        let (outbox, mut rx) = Outbox::channel();
        registry.seat("alice".to_string(), outbox).unwrap();

        registry.release();
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(registry.coordinator().is_none());
        assert_eq!(registry.seated(), 1);
    }
}
