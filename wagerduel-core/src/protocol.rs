//! Plain-text messages exchanged with participants.
//!
//! Server to participant:
//! - opening: `"{side} {balance_a} {balance_b} {p_1} ... {p_n}"`
//! - after every round: `"{balance_a} {balance_b}"`
//!
//! Participant to server: the display name first, then one integer bet per
//! round. Messages are newline terminated on the way out; inbound reads may
//! carry several newline separated payloads.

use crate::error::{Result, WagerError};
use crate::types::{Side, SidePair};
use std::fmt;
use std::str::FromStr;

pub const MAX_NAME_CHARS: usize = 32;

/// Trim and truncate a requested display name.
pub fn display_name(raw: &str) -> String {
    let name: String = raw.trim().chars().take(MAX_NAME_CHARS).collect();
    if name.is_empty() {
        "anonymous".to_string()
    } else {
        name
    }
}

/// Decode one inbound line, terminator included or not. Blank lines carry
/// no payload.
pub fn decode_line(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let payload = text.trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}

/// Append the line terminator used on the wire.
pub fn frame(message: impl fmt::Display) -> String {
    format!("{}\n", message)
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpeningMessage {
    pub side: Side,
    pub balances: SidePair<u64>,
    pub schedule: Vec<f64>,
}

impl fmt::Display for OpeningMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.balances.a, self.balances.b)?;
        for p in &self.schedule {
            write!(f, " {}", p)?;
        }
        Ok(())
    }
}

impl FromStr for OpeningMessage {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.split_whitespace();
        let side = match fields.next() {
            Some("A") => Side::A,
            Some("B") => Side::B,
            other => {
                return Err(WagerError::protocol(format!(
                    "expected side A or B, got {:?}",
                    other
                )))
            }
        };
        let balances = SidePair::new(parse_field(fields.next())?, parse_field(fields.next())?);
        let schedule = fields
            .map(|p| parse_field::<f64>(Some(p)))
            .collect::<Result<Vec<_>>>()?;

        if schedule.is_empty() {
            return Err(WagerError::protocol("opening message carries no schedule"));
        }

        Ok(Self {
            side,
            balances,
            schedule,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundUpdate {
    pub balances: SidePair<u64>,
}

impl fmt::Display for RoundUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.balances.a, self.balances.b)
    }
}

impl FromStr for RoundUpdate {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.split_whitespace();
        let balances = SidePair::new(parse_field(fields.next())?, parse_field(fields.next())?);
        if let Some(extra) = fields.next() {
            return Err(WagerError::protocol(format!(
                "unexpected trailing field {:?}",
                extra
            )));
        }
        Ok(Self { balances })
    }
}

fn parse_field<T: FromStr>(field: Option<&str>) -> Result<T> {
    let field = field.ok_or_else(|| WagerError::protocol("message is missing a field"))?;
    field
        .parse()
        .map_err(|_| WagerError::protocol(format!("cannot parse field {:?}", field)))
}
