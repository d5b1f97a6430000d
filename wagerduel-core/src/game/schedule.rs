use crate::error::{Result, WagerError};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Per-round probability that side A wins, reused unchanged for both sets.
///
/// The probability belongs to the seat, not to the physical participant, so
/// after the side swap the same values apply to the opposite person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Schedule(Vec<f64>);

impl Schedule {
    pub fn new(probabilities: Vec<f64>) -> Result<Self> {
        if probabilities.is_empty() {
            return Err(WagerError::schedule("at least one round is required"));
        }

        if let Some((round, p)) = probabilities
            .iter()
            .enumerate()
            .find(|(_, p)| !(**p > 0.0 && **p < 1.0))
        {
            return Err(WagerError::schedule(format!(
                "probability {} for round {} is outside (0, 1)",
                p, round
            )));
        }

        Ok(Self(probabilities))
    }

    /// Draw `rounds` probabilities as whole percents in `min_percent..=max_percent`.
    pub fn random<R: Rng>(
        rounds: usize,
        min_percent: u32,
        max_percent: u32,
        rng: &mut R,
    ) -> Result<Self> {
        if min_percent == 0 || max_percent >= 100 || min_percent > max_percent {
            return Err(WagerError::schedule(format!(
                "percent window {}..={} must lie within 1..=99",
                min_percent, max_percent
            )));
        }

        let probabilities = (0..rounds)
            .map(|_| f64::from(rng.random_range(min_percent..=max_percent)) / 100.0)
            .collect();
        Self::new(probabilities)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn probability(&self, round: usize) -> Option<f64> {
        self.0.get(round).copied()
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.0
    }
}

impl TryFrom<Vec<f64>> for Schedule {
    type Error = WagerError;

    fn try_from(probabilities: Vec<f64>) -> Result<Self> {
        Self::new(probabilities)
    }
}

impl From<Schedule> for Vec<f64> {
    fn from(schedule: Schedule) -> Self {
        schedule.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rejects_empty_and_out_of_range() {
        assert!(Schedule::new(vec![]).is_err());
        assert!(Schedule::new(vec![0.5, 1.0]).is_err());
        assert!(Schedule::new(vec![0.0]).is_err());
        assert!(Schedule::new(vec![f64::NAN]).is_err());
        assert_eq!(Schedule::new(vec![0.4, 0.7]).unwrap().len(), 2);
    }

    #[test]
    fn test_random_schedule_stays_in_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let schedule = Schedule::random(20, 40, 70, &mut rng).unwrap();

        assert_eq!(schedule.len(), 20);
        for p in schedule.probabilities() {
            assert!((0.4..=0.7).contains(p));
            let percent = p * 100.0;
            assert!((percent - percent.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_random_schedule_is_reproducible() {
        let first = Schedule::random(10, 40, 70, &mut StdRng::seed_from_u64(3)).unwrap();
        let second = Schedule::random(10, 40, 70, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_window() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(Schedule::random(5, 70, 40, &mut rng).is_err());
        assert!(Schedule::random(5, 0, 40, &mut rng).is_err());
        assert!(Schedule::random(0, 40, 70, &mut rng).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let schedule: Schedule = serde_json::from_str("[0.45, 0.6]").unwrap();
        assert_eq!(schedule.probability(1), Some(0.6));
        assert!(serde_json::from_str::<Schedule>("[1.5]").is_err());
    }
}
