use crate::config::load_server_config;
use anyhow::Context;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use std::path::PathBuf;
use std::sync::Arc;
use wagerduel_core::{
    NullSink, Schedule, ScheduleConfig, Server, ServerConfig, TelemetrySink, WebSocketSink,
};

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// JSON config file (defaults to <config_dir>/wagerduel/server.json when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Interface to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Websocket URL receiving match telemetry
    #[arg(long)]
    pub telemetry: Option<String>,

    /// Rounds per set for a random schedule
    #[arg(long)]
    pub rounds: Option<usize>,

    /// Seed for the generated schedule
    #[arg(long)]
    pub schedule_seed: Option<u64>,

    /// Seed for the round draws
    #[arg(long)]
    pub seed: Option<u64>,

    /// Opening balance of side A
    #[arg(long)]
    pub balance_a: Option<u64>,

    /// Opening balance of side B
    #[arg(long)]
    pub balance_b: Option<u64>,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,
}

impl ServeArgs {
    /// Layer command-line flags over a loaded config.
    pub fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = &self.telemetry {
            config.telemetry_url = Some(url.clone());
        }
        if let Some(seed) = self.seed {
            config.game.seed = Some(seed);
        }
        if let Some(balance) = self.balance_a {
            config.game.initial_balance.a = balance;
        }
        if let Some(balance) = self.balance_b {
            config.game.initial_balance.b = balance;
        }

        if self.rounds.is_some() || self.schedule_seed.is_some() {
            if matches!(config.game.schedule, ScheduleConfig::Fixed { .. }) {
                tracing::warn!("Replacing fixed schedule with a random one");
                config.game.schedule = ScheduleConfig::default();
            }
            if let ScheduleConfig::Random { rounds, seed, .. } = &mut config.game.schedule {
                if let Some(n) = self.rounds {
                    *rounds = n;
                }
                if let Some(s) = self.schedule_seed {
                    *seed = Some(s);
                }
            }
        }

        config
    }
}

pub async fn handle_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.apply(load_server_config(args.config.as_deref())?);
    config.validate().context("invalid server configuration")?;

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let schedule = config.game.schedule.build()?;
    print_schedule(&schedule);

    let telemetry = connect_telemetry(config.telemetry_url.as_deref()).await;
    let server = Server::bind(&config, schedule, telemetry).await?;

    println!("Listening on {}", server.local_addr()?);
    println!("Waiting for two players...");

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping server");
            shutdown.trigger();
        }
    });

    server.run().await?;
    println!("Match finished");

    Ok(())
}

async fn connect_telemetry(url: Option<&str>) -> Arc<dyn TelemetrySink> {
    let Some(url) = url else {
        return Arc::new(NullSink);
    };

    match WebSocketSink::connect(url).await {
        Ok(sink) => {
            tracing::info!("Publishing telemetry to {}", url);
            Arc::new(sink)
        }
        Err(e) => {
            tracing::warn!("Telemetry endpoint {} unavailable, continuing without it: {}", url, e);
            Arc::new(NullSink)
        }
    }
}

fn print_schedule(schedule: &Schedule) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Round", "P(A wins)", "P(B wins)"]);

    for (round, p) in schedule.probabilities().iter().enumerate() {
        table.add_row(vec![
            (round + 1).to_string(),
            format!("{:.2}", p),
            format!("{:.2}", 1.0 - p),
        ]);
    }

    println!("{}", table);
}
