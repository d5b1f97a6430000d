//! TCP listener that seats two participants and runs one match between them.

pub mod registry;

pub use registry::{SeatRegistry, Seating};

use crate::config::{MatchConfig, ServerConfig};
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::game::{Game, Outbox, Schedule};
use crate::protocol::{decode_line, display_name};
use crate::telemetry::{emit, TelemetryEvent, TelemetrySink};
use crate::types::ParticipantId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

const READ_BUFFER: usize = 1024;

/// Process-wide stop signal: stops accepting and closes every connection.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(receiver: &mut watch::Receiver<bool>) {
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

struct MatchContext {
    game: MatchConfig,
    schedule: Schedule,
    telemetry: Arc<dyn TelemetrySink>,
    registry: SeatRegistry,
    shutdown: Shutdown,
}

pub struct Server {
    listener: TcpListener,
    context: Arc<MatchContext>,
}

impl Server {
    pub async fn bind(
        config: &ServerConfig,
        schedule: Schedule,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address()).await?;
        tracing::info!("Server started at {}", listener.local_addr()?);

        emit(
            telemetry.as_ref(),
            TelemetryEvent::Info {
                init_balance: config.game.initial_balance.into_array(),
                seq: schedule.probabilities().to_vec(),
            },
        );

        Ok(Self {
            listener,
            context: Arc::new(MatchContext {
                game: config.game.clone(),
                schedule,
                telemetry,
                registry: SeatRegistry::new(),
                shutdown: Shutdown::new(),
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.context.shutdown.clone()
    }

    /// Accept connections until the match ends or shutdown is triggered, then
    /// wait for every connection to close and release the telemetry sink.
    pub async fn run(self) -> Result<()> {
        let mut connections = JoinSet::new();
        let mut shutdown = self.context.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = Shutdown::wait(&mut shutdown) => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if self.context.registry.is_full() {
                            tracing::warn!("Illegal request from {}: match already has two players", peer);
                            continue;
                        }
                        connections.spawn(self.context.clone().handle_connection(stream, peer));
                    }
                    Err(e) => tracing::warn!("Failed to accept connection: {}", e),
                },
            }
        }

        drop(self.listener);
        tracing::info!("Server stopped accepting connections");

        while connections.join_next().await.is_some() {}

        self.context.registry.release();
        self.context.telemetry.close();
        tracing::info!("Server closed");
        Ok(())
    }
}

impl MatchContext {
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        tracing::info!("Connection established from {}", peer);

        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let (outbox, outgoing) = Outbox::channel();
        let writer_task = tokio::spawn(write_outgoing(writer, outgoing, peer));

        let mut shutdown = self.shutdown.subscribe();
        let mut seat: Option<ParticipantId> = None;
        let mut line = Vec::with_capacity(READ_BUFFER);

        loop {
            // bytes of a partial line stay in `line` across reads
            let read = tokio::select! {
                _ = Shutdown::wait(&mut shutdown) => break,
                read = reader.read_until(b'\n', &mut line) => read,
            };

            match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Read from {} failed: {}", peer, e);
                    break;
                }
            }

            let payload = decode_line(&line);
            line.clear();
            let Some(payload) = payload else {
                continue;
            };

            match seat {
                Some(participant) => self.forward_bet(participant, &payload),
                None => match self.register(&payload, &outbox) {
                    Ok(participant) => seat = Some(participant),
                    Err(e) => {
                        tracing::warn!("Illegal request from {}: {}", peer, e);
                        break;
                    }
                },
            }
        }

        drop(outbox);
        if let Some(participant) = seat {
            // a seated participant leaving ends the whole match
            self.shutdown.trigger();
            self.registry.release();
            if let Some(coordinator) = self.registry.coordinator() {
                coordinator.connection_lost(participant);
            }
        }

        let _ = writer_task.await;
        tracing::info!("Connection closed at {}", peer);
    }

    fn register(&self, payload: &str, outbox: &Outbox) -> Result<ParticipantId> {
        let name = display_name(payload);
        let seating = self.registry.seat(name.clone(), outbox.clone())?;
        let participant = seating.participant();

        tracing::info!("Player {} ({}) joined", seating.side(), name);
        emit(
            self.telemetry.as_ref(),
            TelemetryEvent::PlayerJoin {
                side: seating.side(),
                name,
            },
        );

        if let Seating::Complete { pair, .. } = seating {
            let game = Game::new(*pair, self.game.initial_balance, self.schedule.clone());
            let shutdown = self.shutdown.clone();
            let (coordinator, handle) = Coordinator::new(
                game,
                self.telemetry.clone(),
                Box::new(self.game.random_source()),
                Box::new(move || shutdown.trigger()),
            );
            // queue Start before any connection can reach the handle
            handle.start();
            coordinator.spawn();
            self.registry.install(handle);
        }

        Ok(participant)
    }

    fn forward_bet(&self, participant: ParticipantId, payload: &str) {
        match self.registry.coordinator() {
            Some(coordinator) => {
                coordinator.submit_bet(participant, payload);
            }
            None => tracing::warn!(
                "Bet {:?} from participant {} before the match started",
                payload,
                participant
            ),
        }
    }
}

/// Drain a connection's outbox onto its socket until every sender is gone.
async fn write_outgoing(
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    peer: SocketAddr,
) {
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = writer.write_all(message.as_bytes()).await {
            tracing::debug!("Write to {} failed: {}", peer, e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RoundUpdate;
    use crate::telemetry::MemorySink;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, Lines};
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    struct Client {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl Client {
        async fn connect(addr: SocketAddr, name: &str) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (reader, writer) = stream.into_split();
            let mut client = Self {
                lines: BufReader::new(reader).lines(),
                writer,
            };
            client.send(name).await;
            client
        }

        async fn send(&mut self, payload: &str) {
            self.writer
                .write_all(format!("{}\n", payload).as_bytes())
                .await
                .unwrap();
        }

        async fn line(&mut self) -> Option<String> {
            timeout(WAIT, self.lines.next_line()).await.unwrap().unwrap()
        }
    }

    async fn start_server(rounds: usize) -> (SocketAddr, Arc<MemorySink>, tokio::task::JoinHandle<Result<()>>) {
        let mut config = ServerConfig::default();
        config.host = "127.0.0.1".to_string();
        config.port = 0;
        config.game.seed = Some(9);

        let schedule = Schedule::new(vec![0.5; rounds]).unwrap();
        let telemetry = Arc::new(MemorySink::new());
        let server = Server::bind(&config, schedule, telemetry.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();
        (addr, telemetry, tokio::spawn(server.run()))
    }

    async fn wait_for_joins(telemetry: &MemorySink, count: usize) {
        timeout(WAIT, async {
            while telemetry.events_of("playerjoin").len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_full_match_over_tcp() {
        let (addr, telemetry, running) = start_server(2).await;

        let mut alice = Client::connect(addr, "alice").await;
        wait_for_joins(&telemetry, 1).await;
        let mut bob = Client::connect(addr, "bob").await;

        assert_eq!(alice.line().await.unwrap(), "A 6000 6800 0.5 0.5");
        assert_eq!(bob.line().await.unwrap(), "B 6000 6800 0.5 0.5");

        let mut carol = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 8];
        let refused = timeout(WAIT, carol.read(&mut buf)).await.unwrap();
        assert!(matches!(refused, Ok(0) | Err(_)));

        for _ in 0..4 {
            alice.send("100").await;
            bob.send("50").await;
            let seen_by_alice = alice.line().await.unwrap();
            assert_eq!(bob.line().await.unwrap(), seen_by_alice);

            let update: RoundUpdate = seen_by_alice.parse().unwrap();
            assert_eq!(update.balances.a + update.balances.b, 12800);
        }

        timeout(WAIT, running).await.unwrap().unwrap().unwrap();
        assert_eq!(alice.line().await, None);
        assert_eq!(bob.line().await, None);

        let kinds: Vec<_> = telemetry.events().iter().map(TelemetryEvent::kind).collect();
        assert_eq!(kinds.first(), Some(&"info"));
        assert_eq!(kinds.last(), Some(&"gameover"));
        assert_eq!(telemetry.events_of("result").len(), 4);
        assert_eq!(telemetry.events_of("switchsides").len(), 1);
        assert!(telemetry.is_closed());
    }

    #[tokio::test]
    async fn test_lines_split_across_reads_are_reassembled() {
        let (addr, telemetry, running) = start_server(1).await;
        let pause = || tokio::time::sleep(Duration::from_millis(100));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        let mut alice = Client {
            lines: BufReader::new(reader).lines(),
            writer,
        };
        // "zoë" with the two-byte character cut in half
        alice.writer.write_all(b"zo\xc3").await.unwrap();
        pause().await;
        alice.writer.write_all(b"\xab\n").await.unwrap();
        wait_for_joins(&telemetry, 1).await;

        let mut bob = Client::connect(addr, "bob").await;
        assert!(alice.line().await.unwrap().starts_with("A "));
        assert!(bob.line().await.unwrap().starts_with("B "));

        alice.writer.write_all(b"10").await.unwrap();
        pause().await;
        alice.send("0").await;
        bob.send("50").await;
        alice.line().await.unwrap();
        bob.line().await.unwrap();

        // set two, final bet arrives without a terminator before the peer hangs up
        bob.send("5").await;
        pause().await;
        alice.writer.write_all(b"7").await.unwrap();
        alice.writer.shutdown().await.unwrap();

        timeout(WAIT, running).await.unwrap().unwrap().unwrap();

        assert_eq!(
            telemetry.events_of("playerjoin")[0],
            TelemetryEvent::PlayerJoin {
                side: crate::types::Side::A,
                name: "zoë".to_string(),
            }
        );
        let bets = telemetry.events_of("bet");
        assert_eq!(bets.len(), 4);
        assert!(bets.contains(&TelemetryEvent::Bet {
            side: crate::types::Side::A,
            round: 0,
            amount: 100,
        }));
        assert!(bets.contains(&TelemetryEvent::Bet {
            side: crate::types::Side::B,
            round: 0,
            amount: 7,
        }));
        assert_eq!(telemetry.events_of("gameover").len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_ends_match() {
        let (addr, telemetry, running) = start_server(3).await;

        let alice = Client::connect(addr, "alice").await;
        wait_for_joins(&telemetry, 1).await;
        let mut bob = Client::connect(addr, "bob").await;
        assert!(bob.line().await.unwrap().starts_with("B "));

        drop(alice);

        timeout(WAIT, running).await.unwrap().unwrap().unwrap();
        assert_eq!(bob.line().await, None);
        assert!(telemetry.events_of("gameover").is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_opponent_arrives() {
        let (addr, telemetry, running) = start_server(1).await;

        let mut alice = Client::connect(addr, "  alice\n").await;
        wait_for_joins(&telemetry, 1).await;
        // bets before the match exists are ignored
        alice.send("25").await;

        let _ = TcpStream::connect(addr).await.unwrap();
        drop(alice);

        timeout(WAIT, running).await.unwrap().unwrap().unwrap();
        assert_eq!(
            telemetry.events_of("playerjoin"),
            vec![TelemetryEvent::PlayerJoin {
                side: crate::types::Side::A,
                name: "alice".to_string(),
            }]
        );
    }

    #[test]
    fn test_shutdown_signal() {
        let shutdown = Shutdown::new();
        let observer = shutdown.clone();
        assert!(!observer.is_triggered());
        shutdown.trigger();
        assert!(observer.is_triggered());
    }
}
