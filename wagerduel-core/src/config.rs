use crate::error::{Result, WagerError};
use crate::game::{Schedule, StdRandom};
use crate::types::SidePair;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Websocket endpoint receiving match events, if any.
    pub telemetry_url: Option<String>,
    pub game: MatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Opening balance of each seat, reused after the side swap.
    pub initial_balance: SidePair<u64>,
    pub schedule: ScheduleConfig,
    /// Seed for the round draws. Entropy when unset.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleConfig {
    Random {
        rounds: usize,
        min_percent: u32,
        max_percent: u32,
        seed: Option<u64>,
    },
    Fixed {
        probabilities: Vec<f64>,
    },
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            telemetry_url: None,
            game: MatchConfig::default(),
        }
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            initial_balance: SidePair::new(6000, 6800),
            schedule: ScheduleConfig::default(),
            seed: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::Random {
            rounds: 20,
            min_percent: 40,
            max_percent: 70,
            seed: None,
        }
    }
}

impl ServerConfig {
    /// Read a JSON config file. Absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(WagerError::config("Host cannot be empty"));
        }

        if let Some(url) = &self.telemetry_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(WagerError::config(format!(
                    "Telemetry URL must be a websocket URL: {}",
                    url
                )));
            }
        }

        self.game.validate()
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        let SidePair { a, b } = self.initial_balance;
        if a.checked_add(b).is_none() {
            return Err(WagerError::config(format!(
                "Initial balances {} and {} overflow their combined total",
                a, b
            )));
        }
        self.schedule.build().map(|_| ())
    }

    pub fn random_source(&self) -> StdRandom {
        match self.seed {
            Some(seed) => StdRandom::seeded(seed),
            None => StdRandom::from_entropy(),
        }
    }
}

impl ScheduleConfig {
    pub fn build(&self) -> Result<Schedule> {
        match self {
            Self::Random {
                rounds,
                min_percent,
                max_percent,
                seed,
            } => {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(*seed),
                    None => StdRng::from_os_rng(),
                };
                Schedule::random(*rounds, *min_percent, *max_percent, &mut rng)
            }
            Self::Fixed { probabilities } => Schedule::new(probabilities.clone()),
        }
    }
}
