//! Parent selection over a population ranked best-first.
//!
//! Every strategy receives the population's scores in rank order (highest first) and
//! returns the index of the chosen parent.

use crate::error::{EvoError, EvoResult};
use rand::{seq::IndexedRandom, Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Added to every shifted score so that the worst brain keeps a sliver of the wheel
const ROULETTE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SelectionStrategy {
    /// Roulette wheel over scores shifted to be non-negative
    FitnessProportionate,
    /// `floor(u^power * n)` over the ranked population
    Power { power: f64 },
    /// Best-first walk over a random sub-sample, each candidate accepted with `probability`
    Tournament { size: usize, probability: f64 },
}

impl SelectionStrategy {
    pub fn validate(&self, population: usize) -> EvoResult<()> {
        match *self {
            Self::FitnessProportionate => Ok(()),
            Self::Power { power } if !(power.is_finite() && power > 0.) => Err(EvoError::config(
                format!("selection power must be positive, got {power}"),
            )),
            Self::Power { .. } => Ok(()),
            Self::Tournament { size, .. } if size == 0 => {
                Err(EvoError::config("tournament size must be at least 1"))
            }
            Self::Tournament { size, .. } if size > population => {
                Err(EvoError::TournamentTooLarge { size, population })
            }
            Self::Tournament { probability, .. } if !(0. ..=1.).contains(&probability) => {
                Err(EvoError::config(format!(
                    "tournament probability must lie in [0, 1], got {probability}"
                )))
            }
            Self::Tournament { .. } => Ok(()),
        }
    }

    pub fn select(&self, ranked: &[f64], rng: &mut impl RngCore) -> EvoResult<usize> {
        match *self {
            Self::FitnessProportionate => fitness_proportionate(ranked, rng),
            Self::Power { power } => power_rank(ranked.len(), power, rng),
            Self::Tournament { size, probability } => tournament(ranked, size, probability, rng),
        }
    }
}

/// The shift applied to every score (`|min|`) and the resulting roulette weights
pub fn roulette_weights(scores: &[f64]) -> (f64, Vec<f64>) {
    let minimal = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let shift = if minimal.is_finite() { minimal.abs() } else { 0. };
    let weights = scores
        .iter()
        .map(|s| s + shift + ROULETTE_EPSILON)
        .collect();
    (shift, weights)
}

pub fn fitness_proportionate(scores: &[f64], rng: &mut impl RngCore) -> EvoResult<usize> {
    if scores.is_empty() {
        return Err(EvoError::EmptyPopulation);
    }

    let (_, weights) = roulette_weights(scores);
    let total = weights.iter().sum::<f64>();
    let degenerate = scores.windows(2).all(|w| w[0] == w[1]);
    if degenerate || !total.is_finite() || total <= 0. {
        if !degenerate {
            warn!(total, "roulette wheel is degenerate, picking uniformly");
        }
        return Ok(rng.random_range(0..scores.len()));
    }

    let point = rng.random_range(0. ..total);
    let mut acc = 0.;
    for (idx, w) in weights.iter().enumerate() {
        acc += w;
        if acc > point {
            return Ok(idx);
        }
    }

    // floating point residue
    Ok(scores.len() - 1)
}

pub fn power_rank(population: usize, power: f64, rng: &mut impl RngCore) -> EvoResult<usize> {
    if population == 0 {
        return Err(EvoError::EmptyPopulation);
    }

    let u = rng.random::<f64>();
    let idx = (u.powf(power) * population as f64).floor() as usize;
    Ok(idx.min(population - 1))
}

pub fn tournament(
    scores: &[f64],
    size: usize,
    probability: f64,
    rng: &mut impl RngCore,
) -> EvoResult<usize> {
    if scores.is_empty() {
        return Err(EvoError::EmptyPopulation);
    }
    if size > scores.len() {
        return Err(EvoError::TournamentTooLarge {
            size,
            population: scores.len(),
        });
    }
    if size == 0 {
        return Err(EvoError::config("tournament size must be at least 1"));
    }

    let indices = (0..scores.len()).collect::<Vec<_>>();
    let mut entrants = (0..size)
        .filter_map(|_| indices.choose(rng).copied())
        .collect::<Vec<_>>();
    entrants.sort_by(|l, r| scores[*r].total_cmp(&scores[*l]));

    let p = probability.clamp(0., 1.);
    for idx in entrants.iter() {
        if rng.random_bool(p) {
            return Ok(*idx);
        }
    }

    entrants.last().copied().ok_or(EvoError::EmptyPopulation)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_f64_approx;
    use rand::{rngs::StdRng, SeedableRng};

    fn histogram(strategy: SelectionStrategy, scores: &[f64], draws: usize) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(99);
        let mut hist = vec![0; scores.len()];
        for _ in 0..draws {
            hist[strategy.select(scores, &mut rng).unwrap()] += 1;
        }
        hist
    }

    #[test]
    fn test_roulette_shift() {
        let (shift, weights) = roulette_weights(&[10., 0., -5.]);
        assert_f64_approx!(shift, 5.);
        assert!(weights.iter().all(|w| *w > 0.));
        assert_f64_approx!(weights[0], 15. + ROULETTE_EPSILON);
        assert_f64_approx!(weights[1], 5. + ROULETTE_EPSILON);
    }

    #[test]
    fn test_fitness_proportionate_prefers_fitter() {
        let hist = histogram(SelectionStrategy::FitnessProportionate, &[10., 0., -5.], 20_000);
        // weights 15 : 5 : ~0
        assert!(hist[0] > hist[1] * 2, "{hist:?}");
        assert!(hist[2] < 50, "{hist:?}");
    }

    #[test]
    fn test_fitness_proportionate_degenerate() {
        let hist = histogram(SelectionStrategy::FitnessProportionate, &[3., 3., 3., 3.], 8000);
        for count in hist {
            assert!((1500..2500).contains(&count));
        }
    }

    #[test]
    fn test_power_sharpens() {
        let scores = (0..10).rev().map(f64::from).collect::<Vec<_>>();
        let flat = histogram(SelectionStrategy::Power { power: 1. }, &scores, 20_000);
        let sharp = histogram(SelectionStrategy::Power { power: 4. }, &scores, 20_000);
        assert!(sharp[0] > flat[0] * 2, "{flat:?} {sharp:?}");
        assert!(flat.iter().all(|c| *c > 1500));
    }

    #[test]
    fn test_tournament_certain_winner() {
        let scores = [5., 4., 3., 2., 1.];
        let mut rng = StdRng::seed_from_u64(3);
        // full acceptance returns the best entrant, which can never be worse than any drawn
        for _ in 0..1000 {
            let idx = tournament(&scores, 5, 1., &mut rng).unwrap();
            assert!(idx < 5);
        }
        // zero acceptance returns the worst entrant
        let hist = histogram(
            SelectionStrategy::Tournament {
                size: 5,
                probability: 0.,
            },
            &scores,
            5000,
        );
        assert!(hist[4] > hist[0]);
    }

    #[test]
    fn test_tournament_too_large() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            tournament(&[1., 2.], 3, 0.5, &mut rng),
            Err(EvoError::TournamentTooLarge {
                size: 3,
                population: 2
            })
        ));
        assert!(matches!(
            SelectionStrategy::Tournament {
                size: 3,
                probability: 0.5
            }
            .validate(2),
            Err(EvoError::TournamentTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate() {
        assert!(SelectionStrategy::Power { power: 0. }.validate(10).is_err());
        assert!(SelectionStrategy::Power { power: 2. }.validate(10).is_ok());
        assert!(SelectionStrategy::Tournament {
            size: 2,
            probability: 1.5
        }
        .validate(10)
        .is_err());
        assert!(SelectionStrategy::FitnessProportionate.validate(1).is_ok());
    }

    #[test]
    fn test_empty() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            fitness_proportionate(&[], &mut rng),
            Err(EvoError::EmptyPopulation)
        ));
        assert!(matches!(
            power_rank(0, 2., &mut rng),
            Err(EvoError::EmptyPopulation)
        ));
    }
}
