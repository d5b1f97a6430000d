use crate::stopwatch::Stopwatch;
use crate::types::{ParticipantId, Side};
use tokio::sync::mpsc;

/// Outbound half of a participant's connection.
///
/// Messages are queued for that connection's writer task, so pushing never
/// waits on socket I/O or on the other participant.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message. Returns false once the connection has gone away.
    pub fn send(&self, message: impl Into<String>) -> bool {
        self.tx.send(message.into()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A seated participant
pub struct Participant {
    id: ParticipantId,
    name: String,
    outbox: Outbox,
    side: Side,
    balance: u64,
    pending_bet: Option<u64>,
    stopwatch: Stopwatch,
}

impl Participant {
    pub fn new(id: ParticipantId, name: impl Into<String>, side: Side, outbox: Outbox) -> Self {
        Self {
            id,
            name: name.into(),
            outbox,
            side,
            balance: 0,
            pending_bet: None,
            stopwatch: Stopwatch::new(),
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn pending_bet(&self) -> Option<u64> {
        self.pending_bet
    }

    pub fn has_bet(&self) -> bool {
        self.pending_bet.is_some()
    }

    pub fn stopwatch(&self) -> &Stopwatch {
        &self.stopwatch
    }

    pub fn stopwatch_mut(&mut self) -> &mut Stopwatch {
        &mut self.stopwatch
    }

    /// Seat the participant on `side` with a fresh balance.
    pub fn assign(&mut self, side: Side, balance: u64) {
        self.side = side;
        self.balance = balance;
    }

    pub fn set_balance(&mut self, balance: u64) {
        self.balance = balance;
    }

    /// Record an already clamped bet.
    pub fn record_bet(&mut self, amount: u64) {
        debug_assert!(amount <= self.balance, "bet exceeds balance");
        self.pending_bet = Some(amount);
    }

    pub fn clear_bet(&mut self) {
        self.pending_bet = None;
    }

    pub fn send(&self, message: impl Into<String>) {
        if !self.outbox.send(message) {
            tracing::debug!("Dropping message for {} ({}): connection closed", self.side, self.name);
        }
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("side", &self.side)
            .field("balance", &self.balance)
            .field("pending_bet", &self.pending_bet)
            .finish()
    }
}
