//! Best-effort structured match events.
//!
//! Delivery never affects the game: [`emit`] swallows and logs every failure.

pub mod websocket;

pub use websocket::WebSocketSink;

use crate::error::{Result, WagerError};
use crate::types::Side;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum TelemetryEvent {
    Info {
        init_balance: [u64; 2],
        seq: Vec<f64>,
    },
    PlayerJoin {
        side: Side,
        name: String,
    },
    Bet {
        side: Side,
        round: usize,
        amount: u64,
    },
    Result {
        set: u8,
        round: usize,
        result: f64,
        winner: Side,
        balance: [u64; 2],
        time: [f64; 2],
    },
    /// Balance of A minus balance of B when the first set ends.
    SwitchSides(i64),
    GameOver {
        /// Empty on a draw.
        winner: String,
        #[serde(rename = "leadsby")]
        lead: u64,
        names: [String; 2],
        score: [[u64; 2]; 2],
    },
}

impl TelemetryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Info { .. } => "info",
            Self::PlayerJoin { .. } => "playerjoin",
            Self::Bet { .. } => "bet",
            Self::Result { .. } => "result",
            Self::SwitchSides(_) => "switchsides",
            Self::GameOver { .. } => "gameover",
        }
    }

    /// `{"type": .., "data": .., "sent_at": ..}`
    pub fn to_json(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        let envelope = value
            .as_object_mut()
            .ok_or_else(|| WagerError::internal("telemetry event is not an object"))?;
        envelope.insert(
            "sent_at".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );
        Ok(value.to_string())
    }
}

pub trait TelemetrySink: Send + Sync {
    fn publish(&self, event: &TelemetryEvent) -> Result<()>;

    /// Release the underlying connection. Later publishes may fail.
    fn close(&self) {}
}

/// Publish and forget. Failures are logged, never returned.
pub fn emit(sink: &dyn TelemetrySink, event: TelemetryEvent) {
    if let Err(e) = sink.publish(&event) {
        tracing::warn!("Failed to sync {} event to telemetry: {}", event.kind(), e);
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish(&self, _event: &TelemetryEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn events_of(&self, kind: &str) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for MemorySink {
    fn publish(&self, event: &TelemetryEvent) -> Result<()> {
        if self.is_closed() {
            return Err(WagerError::telemetry("sink closed"));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_event_wire_shape() {
        let event = TelemetryEvent::Bet {
            side: Side::B,
            round: 3,
            amount: 50,
        };
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "bet");
        assert_eq!(value["data"], json!({"side": "B", "round": 3, "amount": 50}));
        assert!(value["sent_at"].is_string());
    }

    #[test]
    fn test_switchsides_and_gameover_shape() {
        let value = serde_json::to_value(TelemetryEvent::SwitchSides(-400)).unwrap();
        assert_eq!(value, json!({"type": "switchsides", "data": -400}));

        let value = serde_json::to_value(TelemetryEvent::GameOver {
            winner: String::new(),
            lead: 0,
            names: ["alice".to_string(), "bob".to_string()],
            score: [[6200, 6600], [6800, 6000]],
        })
        .unwrap();
        assert_eq!(value["type"], "gameover");
        assert_eq!(value["data"]["leadsby"], 0);
        assert_eq!(value["data"]["winner"], "");
        assert_eq!(value["data"]["score"], json!([[6200, 6600], [6800, 6000]]));
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let events = [
            TelemetryEvent::Info {
                init_balance: [6000, 6800],
                seq: vec![0.5],
            },
            TelemetryEvent::PlayerJoin {
                side: Side::A,
                name: "alice".to_string(),
            },
            TelemetryEvent::SwitchSides(1),
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.kind());
        }
    }

    #[test]
    fn test_closed_memory_sink_rejects_and_emit_absorbs() {
        let sink = MemorySink::new();
        emit(&sink, TelemetryEvent::SwitchSides(5));
        sink.close();
        emit(&sink, TelemetryEvent::SwitchSides(6));

        assert!(sink.is_closed());
        assert_eq!(sink.events(), vec![TelemetryEvent::SwitchSides(5)]);
        assert_eq!(sink.events_of("switchsides").len(), 1);
    }
}
