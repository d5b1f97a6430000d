use crate::types::{Side, SidePair};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::num::IntErrorKind;

/// Uniform draws over `[0, 1)` used to decide each round.
pub trait RandomSource: Send {
    fn draw(&mut self) -> f64;
}

/// Production source backed by a `StdRng`.
pub struct StdRandom(StdRng);

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for StdRandom {
    fn draw(&mut self) -> f64 {
        self.0.random::<f64>()
    }
}

/// Replays a fixed list of draws, then repeats the last one.
#[derive(Debug, Clone)]
pub struct ScriptedDraws {
    draws: VecDeque<f64>,
    last: f64,
}

impl ScriptedDraws {
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
            last: 0.0,
        }
    }
}

impl RandomSource for ScriptedDraws {
    fn draw(&mut self) -> f64 {
        if let Some(next) = self.draws.pop_front() {
            self.last = next;
        }
        self.last
    }
}

/// How a requested bet was altered to fit the bettor's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetAdjustment {
    RaisedToZero,
    CappedAtBalance,
}

/// Parse a bet as a decimal integer of any size. Values past the `i64` range
/// saturate, since clamping maps them to zero or the full balance anyway.
pub fn parse_bet(raw: &str) -> Option<i64> {
    match raw.parse::<i64>() {
        Ok(amount) => Some(amount),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

/// Clamp a requested bet into `[0, balance]`.
pub fn clamp_bet(requested: i64, balance: u64) -> (u64, Option<BetAdjustment>) {
    if requested < 0 {
        return (0, Some(BetAdjustment::RaisedToZero));
    }
    let requested = requested.unsigned_abs();
    if requested > balance {
        (balance, Some(BetAdjustment::CappedAtBalance))
    } else {
        (requested, None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub winner: Side,
    pub stake: u64,
    pub transferred: u64,
    pub balances: SidePair<u64>,
    pub draw: f64,
}

/// Decide one round. Side A wins when `draw < probability_of_a`.
///
/// The winner collects the combined stake, capped at what the loser actually
/// holds, so the balance total is conserved and nothing goes negative.
pub fn settle_round(
    bets: SidePair<u64>,
    balances: SidePair<u64>,
    probability_of_a: f64,
    draw: f64,
) -> Settlement {
    let winner = if draw < probability_of_a { Side::A } else { Side::B };
    let loser = winner.opposite();

    let stake = bets.a.saturating_add(bets.b);
    let transferred = stake.min(balances.value(loser));

    // saturates only when the combined balances exceed u64, which config
    // validation rejects
    let mut next = balances;
    *next.get_mut(winner) = next.value(winner).saturating_add(transferred);
    *next.get_mut(loser) -= transferred;

    Settlement {
        winner,
        stake,
        transferred,
        balances: next,
        draw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_a_wins_below_probability() {
        let outcome = settle_round(
            SidePair::new(100, 100),
            SidePair::new(6000, 6800),
            0.5,
            0.3,
        );

        assert_eq!(outcome.winner, Side::A);
        assert_eq!(outcome.stake, 200);
        assert_eq!(outcome.transferred, 200);
        assert_eq!(outcome.balances, SidePair::new(6200, 6600));
        assert_eq!(outcome.draw, 0.3);
    }

    #[test]
    fn test_draw_equal_to_probability_goes_to_b() {
        let outcome = settle_round(SidePair::new(10, 20), SidePair::new(100, 100), 0.5, 0.5);
        assert_eq!(outcome.winner, Side::B);
        assert_eq!(outcome.balances, SidePair::new(70, 130));
    }

    #[test]
    fn test_transfer_capped_at_loser_balance() {
        // A stakes its whole 5000 against a B holding only 300
        let outcome = settle_round(SidePair::new(5000, 300), SidePair::new(5000, 300), 0.9, 0.1);

        assert_eq!(outcome.stake, 5300);
        assert_eq!(outcome.transferred, 300);
        assert_eq!(outcome.balances, SidePair::new(5300, 0));
    }

    #[test]
    fn test_conservation_over_many_rounds() {
        let mut source = StdRandom::seeded(42);
        let mut balances = SidePair::new(6000u64, 6800u64);
        let total = balances.a + balances.b;

        for round in 0..500u64 {
            let (bet_a, _) = clamp_bet((round * 37 % 900) as i64, balances.a);
            let (bet_b, _) = clamp_bet((round * 53 % 1200) as i64, balances.b);
            let outcome = settle_round(SidePair::new(bet_a, bet_b), balances, 0.55, source.draw());

            assert!(outcome.transferred <= outcome.stake);
            assert_eq!(outcome.balances.a + outcome.balances.b, total);
            balances = outcome.balances;
        }
    }

    #[test]
    fn test_clamp_bet() {
        assert_eq!(clamp_bet(9999, 50), (50, Some(BetAdjustment::CappedAtBalance)));
        assert_eq!(clamp_bet(-5, 50), (0, Some(BetAdjustment::RaisedToZero)));
        assert_eq!(clamp_bet(50, 50), (50, None));
        assert_eq!(clamp_bet(0, 0), (0, None));
    }

    #[test]
    fn test_parse_bet_saturates_huge_integers() {
        assert_eq!(parse_bet("42"), Some(42));
        assert_eq!(parse_bet("-7"), Some(-7));
        assert_eq!(parse_bet("99999999999999999999"), Some(i64::MAX));
        assert_eq!(parse_bet("-99999999999999999999"), Some(i64::MIN));
        assert_eq!(parse_bet("12.5"), None);
        assert_eq!(parse_bet("1e3"), None);
        assert_eq!(parse_bet(""), None);

        assert_eq!(
            clamp_bet(parse_bet("99999999999999999999").unwrap(), 50),
            (50, Some(BetAdjustment::CappedAtBalance))
        );
        assert_eq!(
            clamp_bet(parse_bet("-99999999999999999999").unwrap(), 50),
            (0, Some(BetAdjustment::RaisedToZero))
        );
    }

    #[test]
    fn test_settlement_near_u64_max_does_not_overflow() {
        let outcome = settle_round(
            SidePair::new(10, 10),
            SidePair::new(u64::MAX - 5, 100),
            0.9,
            0.1,
        );

        assert_eq!(outcome.winner, Side::A);
        assert_eq!(outcome.transferred, 20);
        assert_eq!(outcome.balances, SidePair::new(u64::MAX, 80));
    }

    #[test]
    fn test_scripted_draws_repeat_last() {
        let mut draws = ScriptedDraws::new([0.1, 0.9]);
        assert_eq!(draws.draw(), 0.1);
        assert_eq!(draws.draw(), 0.9);
        assert_eq!(draws.draw(), 0.9);
    }

    #[test]
    fn test_std_random_in_unit_interval() {
        let mut source = StdRandom::from_entropy();
        for _ in 0..1000 {
            let r = source.draw();
            assert!((0.0..1.0).contains(&r));
        }
    }
}
