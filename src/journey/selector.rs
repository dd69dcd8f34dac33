//! Weighted journey selection.

use rand::rngs::StdRng;
use rand::Rng;

use super::runner::Journey;
use crate::error::ConfigError;

/// Maps a uniform draw onto the cumulative weight distribution.
#[derive(Debug, Clone)]
pub struct JourneySelector {
    cumulative: Vec<f64>,
    total: f64,
}

impl JourneySelector {
    pub fn new(journeys: &[Journey]) -> Result<Self, ConfigError> {
        Self::from_weights(journeys.iter().map(|j| (j.name.as_str(), j.weight)))
    }

    pub fn from_weights<'a>(
        weights: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<Self, ConfigError> {
        let mut cumulative = Vec::new();
        let mut total = 0.0;

        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    journey: name.to_string(),
                    weight,
                });
            }
            total += weight;
            cumulative.push(total);
        }

        if cumulative.is_empty() {
            return Err(ConfigError::NoJourneys);
        }
        if !total.is_finite() {
            return Err(ConfigError::TotalWeightOverflow);
        }
        if total <= 0.0 {
            return Err(ConfigError::ZeroTotalWeight);
        }

        Ok(Self { cumulative, total })
    }

    /// Index of the drawn journey. Zero-weight journeys are never drawn.
    pub fn pick(&self, rng: &mut StdRng) -> usize {
        let draw = rng.random_range(0.0..self.total);
        self.cumulative
            .partition_point(|&edge| edge <= draw)
            .min(self.cumulative.len() - 1)
    }

    pub fn probability(&self, index: usize) -> f64 {
        let previous = if index == 0 {
            0.0
        } else {
            self.cumulative[index - 1]
        };
        (self.cumulative[index] - previous) / self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_weights_converge_to_expected_split() {
        let selector = JourneySelector::from_weights([("A", 1.0), ("B", 3.0)]).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        let draws = 20_000;
        let mut counts = [0usize; 2];

        for _ in 0..draws {
            counts[selector.pick(&mut rng)] += 1;
        }

        let share_a = counts[0] as f64 / draws as f64;
        assert!((share_a - 0.25).abs() < 0.02, "A share was {}", share_a);
        assert_eq!(selector.probability(1), 0.75);
    }

    #[test]
    fn test_zero_weight_journey_is_never_drawn() {
        let selector =
            JourneySelector::from_weights([("never", 0.0), ("always", 2.0), ("tail", 0.0)])
                .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            assert_eq!(selector.pick(&mut rng), 1);
        }
    }

    #[test]
    fn test_invalid_weights_are_config_errors() {
        assert!(matches!(
            JourneySelector::from_weights([("a", 0.0), ("b", 0.0)]),
            Err(ConfigError::ZeroTotalWeight)
        ));
        assert!(matches!(
            JourneySelector::from_weights([("a", -1.0), ("b", 2.0)]),
            Err(ConfigError::InvalidWeight { .. })
        ));
        assert!(matches!(
            JourneySelector::from_weights([("a", f64::NAN)]),
            Err(ConfigError::InvalidWeight { .. })
        ));
        assert!(matches!(
            JourneySelector::from_weights([("a", 1e308), ("b", 1e308)]),
            Err(ConfigError::TotalWeightOverflow)
        ));
        assert!(matches!(
            JourneySelector::from_weights(Vec::<(&str, f64)>::new()),
            Err(ConfigError::NoJourneys)
        ));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let selector = JourneySelector::from_weights([("a", 4.0), ("b", 3.0), ("c", 2.0)]).unwrap();
        let mut first = StdRng::seed_from_u64(11);
        let mut second = StdRng::seed_from_u64(11);
        let a: Vec<usize> = (0..50).map(|_| selector.pick(&mut first)).collect();
        let b: Vec<usize> = (0..50).map(|_| selector.pick(&mut second)).collect();
        assert_eq!(a, b);
    }
}
