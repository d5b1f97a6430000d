use anyhow::{bail, Context};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Input;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use wagerduel_core::protocol::{frame, OpeningMessage, RoundUpdate};
use wagerduel_core::{Side, SidePair};

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Display name announced to the server
    #[arg(short, long)]
    pub name: String,

    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = 4000)]
    pub port: u16,
}

/// One settled round as seen by this player.
#[derive(Debug, Clone, PartialEq)]
struct RoundRow {
    set: u8,
    round: usize,
    side: Side,
    win_chance: f64,
    bet: i64,
    own: u64,
    opponent: u64,
}

impl RoundRow {
    fn cells(&self) -> Vec<String> {
        vec![
            self.set.to_string(),
            (self.round + 1).to_string(),
            self.side.to_string(),
            format!("{:.0}%", self.win_chance * 100.0),
            self.bet.to_string(),
            self.own.to_string(),
            self.opponent.to_string(),
        ]
    }
}

/// Probability that `side` wins a round whose schedule entry is `p`.
fn win_chance(side: Side, p: f64) -> f64 {
    match side {
        Side::A => p,
        Side::B => 1.0 - p,
    }
}

pub async fn handle_play(args: PlayArgs) -> anyhow::Result<()> {
    let address = format!("{}:{}", args.host, args.port);
    let stream = TcpStream::connect(&address)
        .await
        .with_context(|| format!("cannot connect to {}", address))?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    writer.write_all(frame(&args.name).as_bytes()).await?;
    println!("Connected to {} as {}. Waiting for an opponent...", address, args.name);

    let opening: OpeningMessage = next_message(&mut lines).await?.parse()?;
    println!(
        "You play side {} first. Opening balances: A ${}, B ${}",
        opening.side, opening.balances.a, opening.balances.b
    );

    let mut rows = Vec::new();
    let mut set_totals = Vec::with_capacity(2);
    let mut side = opening.side;

    for set in 1..=2u8 {
        let mut balances = opening.balances;
        println!("\n== Set {} as side {} ==", set, side);

        for (round, p) in opening.schedule.iter().copied().enumerate() {
            let chance = win_chance(side, p);
            println!(
                "Round {}: you have ${}, win chance {:.0}%",
                round + 1,
                balances.value(side),
                chance * 100.0
            );

            let bet = prompt_bet(round + 1).await?;
            writer.write_all(frame(bet).as_bytes()).await?;

            let update: RoundUpdate = next_message(&mut lines).await?.parse()?;
            report_round(side, &balances, &update.balances);
            balances = update.balances;

            rows.push(RoundRow {
                set,
                round,
                side,
                win_chance: chance,
                bet,
                own: balances.value(side),
                opponent: balances.value(side.opposite()),
            });
        }

        set_totals.push(balances.value(side));
        side = side.opposite();
    }

    print_summary(&rows, &set_totals);
    Ok(())
}

async fn next_message(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> anyhow::Result<String> {
    loop {
        match lines.next_line().await? {
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Ok(line),
            None => bail!("server closed the connection"),
        }
    }
}

async fn prompt_bet(round: usize) -> anyhow::Result<i64> {
    let bet = tokio::task::spawn_blocking(move || {
        Input::<i64>::new()
            .with_prompt(format!("Bet for round {}", round))
            .interact_text()
    })
    .await??;
    Ok(bet)
}

fn report_round(side: Side, before: &SidePair<u64>, after: &SidePair<u64>) {
    let own_before = before.value(side);
    let own_after = after.value(side);
    if own_after > own_before {
        println!("You won ${}", own_after - own_before);
    } else if own_after < own_before {
        println!("You lost ${}", own_before - own_after);
    } else {
        println!("No money changed hands");
    }
}

fn print_summary(rows: &[RoundRow], set_totals: &[u64]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Set", "Round", "Side", "Win chance", "Bet", "You", "Opponent",
    ]);
    for row in rows {
        table.add_row(row.cells());
    }
    println!("\n{}", table);

    let total: u64 = set_totals.iter().sum();
    println!(
        "Final balances per set: {}. Total ${}",
        set_totals
            .iter()
            .map(|b| format!("${}", b))
            .collect::<Vec<_>>()
            .join(", "),
        total
    );
}
