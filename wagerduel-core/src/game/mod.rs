//! Match state for one two-participant duel.
//!
//! `Game` is a synchronous state machine with no I/O of its own. It is owned
//! by a single [`Coordinator`](crate::coordinator::Coordinator) worker, which
//! serializes every call into it and fans out the resulting messages.

pub mod participant;
pub mod schedule;
pub mod settlement;

pub use participant::{Outbox, Participant};
pub use schedule::Schedule;
pub use settlement::{
    clamp_bet, parse_bet, settle_round, BetAdjustment, RandomSource, ScriptedDraws, Settlement,
    StdRandom,
};

use crate::error::{Result, WagerError};
use crate::types::{ParticipantId, Side, SidePair};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Match stage. Only ever moves forward; `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    NotStarted,
    FirstSet,
    SecondSet,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    CompleteSet,
}

impl Stage {
    /// The full transition table. Anything not listed is illegal.
    pub fn apply(self, transition: Transition) -> Result<Stage> {
        match (self, transition) {
            (Stage::NotStarted, Transition::Start) => Ok(Stage::FirstSet),
            (Stage::FirstSet, Transition::CompleteSet) => Ok(Stage::SecondSet),
            (Stage::SecondSet, Transition::CompleteSet) => Ok(Stage::Ended),
            (stage, transition) => Err(WagerError::IllegalTransition { stage, transition }),
        }
    }

    pub fn in_play(self) -> bool {
        matches!(self, Stage::FirstSet | Stage::SecondSet)
    }

    pub fn set_number(self) -> Option<u8> {
        match self {
            Stage::FirstSet => Some(1),
            Stage::SecondSet => Some(2),
            Stage::NotStarted | Stage::Ended => None,
        }
    }
}

/// An accepted bet, after clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct BetReceipt {
    pub side: Side,
    pub round: usize,
    pub requested: i64,
    pub amount: u64,
    pub adjustment: Option<BetAdjustment>,
    /// Both seats now have a bet; the round is ready to settle.
    pub ready: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub set: u8,
    pub round: usize,
    pub probability: f64,
    pub draw: f64,
    pub winner: Side,
    pub bets: SidePair<u64>,
    pub transferred: u64,
    pub balances: SidePair<u64>,
    pub elapsed: SidePair<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub participant: ParticipantId,
    pub name: String,
    pub first_set: u64,
    pub second_set: u64,
    pub elapsed: f64,
}

impl Standing {
    pub fn aggregate(&self) -> u64 {
        self.first_set + self.second_set
    }
}

/// Cross-set result, with standings in join order.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalScore {
    pub standings: [Standing; 2],
    pub winner: Option<ParticipantId>,
    pub margin: u64,
}

impl FinalScore {
    fn from_standings(standings: [Standing; 2]) -> Self {
        let (first, second) = (standings[0].aggregate(), standings[1].aggregate());
        let winner = match first.cmp(&second) {
            std::cmp::Ordering::Greater => Some(standings[0].participant),
            std::cmp::Ordering::Less => Some(standings[1].participant),
            std::cmp::Ordering::Equal => None,
        };

        Self {
            standings,
            winner,
            margin: first.abs_diff(second),
        }
    }

    pub fn is_draw(&self) -> bool {
        self.winner.is_none()
    }

    /// Winner's name, or an empty string on a draw.
    pub fn winner_name(&self) -> &str {
        self.winner
            .and_then(|id| self.standings.iter().find(|s| s.participant == id))
            .map_or("", |s| s.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetBoundary {
    /// First set finished: balances snapshotted, seats swapped and reset.
    SidesSwitched {
        first_set: SidePair<u64>,
        differential: i64,
    },
    GameOver(FinalScore),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub report: RoundReport,
    pub boundary: Option<SetBoundary>,
}

/// Read-only view of a game, safe to hand out of the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameSnapshot {
    pub id: Uuid,
    pub stage: Stage,
    pub round: usize,
    pub balances: SidePair<u64>,
    pub pending_bets: SidePair<Option<u64>>,
    /// Current side of each participant, in join order.
    pub sides: [Side; 2],
    pub first_set: Option<SidePair<u64>>,
}

pub struct Game {
    id: Uuid,
    participants: [Participant; 2],
    initial_balance: SidePair<u64>,
    schedule: Schedule,
    round: usize,
    stage: Stage,
    first_set: Option<SidePair<u64>>,
}

impl Game {
    /// Seat the pair: the first participant takes side A, the second side B.
    pub fn new(
        participants: [Participant; 2],
        initial_balance: SidePair<u64>,
        schedule: Schedule,
    ) -> Self {
        let mut participants = participants;
        participants[0].assign(Side::A, initial_balance.a);
        participants[1].assign(Side::B, initial_balance.b);

        let game = Self {
            id: Uuid::new_v4(),
            participants,
            initial_balance,
            schedule,
            round: 0,
            stage: Stage::NotStarted,
            first_set: None,
        };

        tracing::info!(
            "Game {} created: {} (A) vs {} (B), balances {} / {}, {} rounds per set",
            game.id,
            game.participants[0].name(),
            game.participants[1].name(),
            initial_balance.a,
            initial_balance.b,
            game.schedule.len()
        );
        game
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn initial_balance(&self) -> SidePair<u64> {
        self.initial_balance
    }

    pub fn first_set(&self) -> Option<SidePair<u64>> {
        self.first_set
    }

    /// Participants in join order.
    pub fn participants(&self) -> &[Participant; 2] {
        &self.participants
    }

    pub fn participant(&self, side: Side) -> &Participant {
        &self.participants[self.seat_index(side)]
    }

    fn participant_mut(&mut self, side: Side) -> &mut Participant {
        let index = self.seat_index(side);
        &mut self.participants[index]
    }

    fn seat_index(&self, side: Side) -> usize {
        if self.participants[0].side() == side {
            0
        } else {
            1
        }
    }

    pub fn side_of(&self, participant: ParticipantId) -> Option<Side> {
        self.participants
            .iter()
            .find(|p| p.id() == participant)
            .map(Participant::side)
    }

    pub fn balances(&self) -> SidePair<u64> {
        SidePair::new(
            self.participant(Side::A).balance(),
            self.participant(Side::B).balance(),
        )
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            id: self.id,
            stage: self.stage,
            round: self.round,
            balances: self.balances(),
            pending_bets: SidePair::new(
                self.participant(Side::A).pending_bet(),
                self.participant(Side::B).pending_bet(),
            ),
            sides: [self.participants[0].side(), self.participants[1].side()],
            first_set: self.first_set,
        }
    }

    /// Enter the first set and start both participants' clocks.
    pub fn start(&mut self) -> Result<()> {
        self.stage = self.stage.apply(Transition::Start)?;
        for participant in self.participants.iter_mut() {
            participant.stopwatch_mut().start();
        }
        Ok(())
    }

    /// Record `side`'s bet for the current round from its raw text.
    ///
    /// Rejections leave the game untouched. An accepted amount is clamped to
    /// `[0, balance]` and that clamped value is what the round uses.
    pub fn set_bet(&mut self, side: Side, raw: &str) -> Result<BetReceipt> {
        if !self.stage.in_play() {
            return Err(WagerError::NotInPlay(self.stage));
        }

        let raw = raw.trim();
        let requested =
            parse_bet(raw).ok_or_else(|| WagerError::MalformedBet(raw.to_string()))?;

        let round = self.round;
        let player = self.participant_mut(side);
        if let Some(existing) = player.pending_bet() {
            return Err(WagerError::DuplicateBet { side, existing });
        }

        let (amount, adjustment) = clamp_bet(requested, player.balance());
        player.stopwatch_mut().stop();
        player.record_bet(amount);

        Ok(BetReceipt {
            side,
            round,
            requested,
            amount,
            adjustment,
            ready: self.participants.iter().all(Participant::has_bet),
        })
    }

    /// Settle the current round. Requires both bets to be present.
    pub fn settle(&mut self, source: &mut dyn RandomSource) -> Result<RoundOutcome> {
        let set = self
            .stage
            .set_number()
            .ok_or(WagerError::NotInPlay(self.stage))?;

        let bets = SidePair::new(self.bet_of(Side::A)?, self.bet_of(Side::B)?);
        let probability = self.schedule.probability(self.round).ok_or_else(|| {
            WagerError::internal(format!("round {} is past the schedule", self.round))
        })?;

        let settlement = settle_round(bets, self.balances(), probability, source.draw());
        self.participant_mut(Side::A).set_balance(settlement.balances.a);
        self.participant_mut(Side::B).set_balance(settlement.balances.b);

        let report = RoundReport {
            set,
            round: self.round,
            probability,
            draw: settlement.draw,
            winner: settlement.winner,
            bets,
            transferred: settlement.transferred,
            balances: settlement.balances,
            elapsed: SidePair::new(
                self.participant(Side::A).stopwatch().elapsed_secs(),
                self.participant(Side::B).stopwatch().elapsed_secs(),
            ),
        };

        for participant in self.participants.iter_mut() {
            participant.stopwatch_mut().start();
            participant.clear_bet();
        }
        self.round += 1;

        let boundary = if self.round == self.schedule.len() {
            Some(self.complete_set()?)
        } else {
            None
        };

        Ok(RoundOutcome { report, boundary })
    }

    fn bet_of(&self, side: Side) -> Result<u64> {
        self.participant(side)
            .pending_bet()
            .ok_or(WagerError::MissingBet(side))
    }

    fn complete_set(&mut self) -> Result<SetBoundary> {
        let next = self.stage.apply(Transition::CompleteSet)?;

        let boundary = match next {
            Stage::SecondSet => {
                let snapshot = self.balances();
                self.first_set = Some(snapshot);
                self.round = 0;

                // Each person takes the other seat and that seat's opening balance.
                for participant in self.participants.iter_mut() {
                    let side = participant.side().opposite();
                    participant.assign(side, self.initial_balance.value(side));
                }

                SetBoundary::SidesSwitched {
                    first_set: snapshot,
                    differential: snapshot.a as i64 - snapshot.b as i64,
                }
            }
            Stage::Ended => {
                for participant in self.participants.iter_mut() {
                    participant.stopwatch_mut().stop();
                }
                SetBoundary::GameOver(self.final_score()?)
            }
            stage => {
                return Err(WagerError::internal(format!(
                    "set completion led to {:?}",
                    stage
                )))
            }
        };

        self.stage = next;
        Ok(boundary)
    }

    /// Each participant scores the balance they ended set one with under
    /// their original seat plus their set-two balance under the swapped seat.
    fn final_score(&self) -> Result<FinalScore> {
        let first_set = self
            .first_set
            .ok_or_else(|| WagerError::internal("first set result missing"))?;

        let standing = |p: &Participant| Standing {
            participant: p.id(),
            name: p.name().to_string(),
            first_set: first_set.value(p.side().opposite()),
            second_set: p.balance(),
            elapsed: p.stopwatch().elapsed_secs(),
        };

        Ok(FinalScore::from_standings([
            standing(&self.participants[0]),
            standing(&self.participants[1]),
        ]))
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .field("round", &self.round)
            .field("participants", &self.participants)
            .field("first_set", &self.first_set)
            .finish()
    }
}
