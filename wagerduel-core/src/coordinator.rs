//! Serialized owner of a running [`Game`].
//!
//! Bets from both connections are funneled through one command queue and
//! applied by a single worker task, so every mutation of the game happens in
//! one place. Settlement is queued as a follow-up command by the worker itself
//! once both bets are in, which is what makes it fire exactly once per round.

use crate::game::{
    BetAdjustment, BetReceipt, FinalScore, Game, GameSnapshot, RandomSource, RoundReport,
    SetBoundary, Stage,
};
use crate::protocol::{frame, OpeningMessage, RoundUpdate};
use crate::telemetry::{emit, TelemetryEvent, TelemetrySink};
use crate::types::{ParticipantId, Side, SidePair};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Invoked once when the match is over, either normally or by disconnect.
pub type EndOfGame = Box<dyn FnOnce() + Send>;

enum Command {
    Start,
    Bet {
        participant: ParticipantId,
        raw: String,
    },
    Settle,
    ConnectionLost {
        participant: ParticipantId,
    },
    Snapshot(oneshot::Sender<GameSnapshot>),
}

/// Cheap, cloneable entry point into a running coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Start => f.write_str("Start"),
            Command::Bet { participant, raw } => write!(f, "Bet({}, {:?})", participant, raw),
            Command::Settle => f.write_str("Settle"),
            Command::ConnectionLost { participant } => write!(f, "ConnectionLost({})", participant),
            Command::Snapshot(_) => f.write_str("Snapshot"),
        }
    }
}

impl CoordinatorHandle {
    fn send(&self, command: Command) -> bool {
        match self.commands.send(command) {
            Ok(()) => true,
            Err(rejected) => {
                tracing::debug!("Coordinator stopped, dropping {:?}", rejected.0);
                false
            }
        }
    }

    pub fn start(&self) -> bool {
        self.send(Command::Start)
    }

    /// Forward a raw bet payload. The participant's current side is resolved
    /// by the worker, so submissions follow the participant across the swap.
    pub fn submit_bet(&self, participant: ParticipantId, raw: impl Into<String>) -> bool {
        self.send(Command::Bet {
            participant,
            raw: raw.into(),
        })
    }

    pub fn connection_lost(&self, participant: ParticipantId) -> bool {
        self.send(Command::ConnectionLost { participant })
    }

    /// Current state as seen from inside the worker. `None` once it has stopped.
    pub async fn snapshot(&self) -> Option<GameSnapshot> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Snapshot(tx)) {
            return None;
        }
        rx.await.ok()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

pub struct Coordinator {
    game: Game,
    telemetry: Arc<dyn TelemetrySink>,
    source: Box<dyn RandomSource>,
    on_end: Option<EndOfGame>,
    commands: mpsc::UnboundedReceiver<Command>,
    deferred: VecDeque<Command>,
}

impl Coordinator {
    /// Build a worker and the handle that feeds it. The worker stops once the
    /// match ends, a connection is lost, or every handle is dropped.
    pub fn new(
        game: Game,
        telemetry: Arc<dyn TelemetrySink>,
        source: Box<dyn RandomSource>,
        on_end: EndOfGame,
    ) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            game,
            telemetry,
            source,
            on_end: Some(on_end),
            commands: rx,
            deferred: VecDeque::new(),
        };
        (coordinator, CoordinatorHandle { commands: tx })
    }

    /// Run the worker on the tokio runtime. The join handle yields the final game.
    pub fn spawn(self) -> JoinHandle<Game> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> Game {
        let game_id = self.game.id();
        tracing::debug!("Coordinator for game {} running", game_id);

        loop {
            let command = match self.deferred.pop_front() {
                Some(command) => command,
                None => match self.commands.recv().await {
                    Some(command) => command,
                    None => {
                        tracing::debug!("All handles to game {} dropped", game_id);
                        break;
                    }
                },
            };

            if !self.apply(command) {
                break;
            }
        }

        tracing::debug!("Coordinator for game {} stopped", game_id);
        self.game
    }

    /// Returns false once the worker should stop.
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Start => self.start(),
            Command::Bet { participant, raw } => self.place_bet(participant, &raw),
            Command::Settle => self.settle(),
            Command::ConnectionLost { participant } => {
                tracing::warn!(
                    "Connection lost for participant {} in game {}, ending match",
                    participant,
                    self.game.id()
                );
                self.finish();
                return false;
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.game.snapshot());
            }
        }

        self.game.stage() != Stage::Ended
    }

    fn start(&mut self) {
        if let Err(e) = self.game.start() {
            tracing::warn!("Cannot start game {}: {}", self.game.id(), e);
            return;
        }

        let balances = self.game.balances();
        let schedule = self.game.schedule().probabilities().to_vec();
        for participant in self.game.participants() {
            let opening = OpeningMessage {
                side: participant.side(),
                balances,
                schedule: schedule.clone(),
            };
            participant.send(frame(opening));
        }

        tracing::info!("== 1st Set Started ==");
    }

    fn place_bet(&mut self, participant: ParticipantId, raw: &str) {
        let Some(side) = self.game.side_of(participant) else {
            tracing::warn!("Bet from unknown participant {}", participant);
            return;
        };

        match self.game.set_bet(side, raw) {
            Ok(receipt) => self.bet_accepted(receipt),
            Err(e) if e.is_bet_rejection() => tracing::warn!("{}", e),
            Err(e) => tracing::error!("Failed to record bet for player {}: {}", side, e),
        }
    }

    fn bet_accepted(&mut self, receipt: BetReceipt) {
        match receipt.adjustment {
            Some(BetAdjustment::CappedAtBalance) => tracing::warn!(
                "Betting more than balance ({}), maximum balance placed as bet",
                receipt.requested
            ),
            Some(BetAdjustment::RaisedToZero) => tracing::warn!(
                "Betting negative amount ({}) is not allowed, amount set to 0",
                receipt.requested
            ),
            None => {}
        }

        tracing::info!(
            "Player {} ({}) put ${}",
            receipt.side,
            self.game.participant(receipt.side).name(),
            receipt.amount
        );

        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::Bet {
                side: receipt.side,
                round: receipt.round,
                amount: receipt.amount,
            },
        );

        if receipt.ready {
            self.deferred.push_back(Command::Settle);
        }
    }

    fn settle(&mut self) {
        let outcome = match self.game.settle(self.source.as_mut()) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Settlement skipped for game {}: {}", self.game.id(), e);
                return;
            }
        };

        self.report_round(&outcome.report);

        match outcome.boundary {
            Some(SetBoundary::SidesSwitched {
                first_set,
                differential,
            }) => self.sides_switched(first_set, differential),
            Some(SetBoundary::GameOver(score)) => self.game_over(&score),
            None => {}
        }
    }

    fn report_round(&self, report: &RoundReport) {
        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::Result {
                set: report.set,
                round: report.round,
                result: report.draw,
                winner: report.winner,
                balance: report.balances.into_array(),
                time: report.elapsed.into_array(),
            },
        );

        // Balances after this round, before any seat reset at a boundary.
        let update = frame(RoundUpdate {
            balances: report.balances,
        });
        for participant in self.game.participants() {
            participant.send(update.clone());
        }

        tracing::info!(
            "Set {} Round {}: Player {} wins ${}. Balance: {} {}",
            report.set,
            report.round + 1,
            report.winner,
            report.transferred,
            report.balances.a,
            report.balances.b
        );
    }

    fn sides_switched(&self, first_set: SidePair<u64>, differential: i64) {
        tracing::info!("== 1st Set Ended ==");
        for (side, lead) in [(Side::A, differential), (Side::B, -differential)] {
            // after the swap the person who held `side` now sits opposite
            let name = self.game.participant(side.opposite()).name();
            if lead > 0 {
                tracing::info!(
                    "{} (Player {}): {} [Lead by {}]",
                    name,
                    side,
                    first_set.value(side),
                    lead
                );
            } else {
                tracing::info!("{} (Player {}): {}", name, side, first_set.value(side));
            }
        }
        tracing::info!("Switching Sides...");

        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::SwitchSides(differential),
        );
        tracing::info!("== 2nd Set Started ==");
    }

    fn game_over(&mut self, score: &FinalScore) {
        tracing::info!("== Game Over ==");
        for standing in &score.standings {
            tracing::info!(
                "{}: {} + {} = {} ({:.3}s)",
                standing.name,
                standing.first_set,
                standing.second_set,
                standing.aggregate(),
                standing.elapsed
            );
        }
        if score.is_draw() {
            tracing::info!("DRAW!");
        } else {
            tracing::info!("{} WINS by {}!", score.winner_name(), score.margin);
        }

        let [first, second] = &score.standings;
        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::GameOver {
                winner: score.winner_name().to_string(),
                lead: score.margin,
                names: [first.name.clone(), second.name.clone()],
                score: [
                    [first.first_set, second.first_set],
                    [first.second_set, second.second_set],
                ],
            },
        );

        self.finish();
    }

    fn finish(&mut self) {
        if let Some(on_end) = self.on_end.take() {
            on_end();
        }
    }
}
