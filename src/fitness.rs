//! Mapping raw game telemetry to a scalar fitness.

use crate::constants::*;
use serde::{Deserialize, Serialize};

/// Everything the game reports about one finished play of a brain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameTelemetry {
    pub score: u64,
    pub level: u32,
    pub invader_kills: u32,
    pub saucer_kills: u32,
    pub shots: u32,
    pub lives: u32,
    pub frames_played: u64,
    pub shields_hit: u32,
    pub kills_avoided: u32,
    pub invaders_reached_bottom: bool,
}

impl GameTelemetry {
    /// Invader kills per shot fired, 0 without shots
    pub fn accuracy(&self) -> f64 {
        if self.shots == 0 {
            0.
        } else {
            f64::from(self.invader_kills) / f64::from(self.shots)
        }
    }
}

/// Multipliers of every fitness term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessWeights {
    pub score: f64,
    pub invader_kill: f64,
    pub saucer_kill: f64,
    pub level: f64,
    pub accuracy: f64,
    pub kills_avoided: f64,
    pub shield_hit: f64,
    pub lives: f64,
    pub bottom_penalty: f64,
    pub failure: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            score: CELLEVO_SCORE_MUL,
            invader_kill: CELLEVO_INVADER_KILL_MUL,
            saucer_kill: CELLEVO_SAUCER_KILL_MUL,
            level: CELLEVO_LEVEL_MUL,
            accuracy: CELLEVO_ACCURACY_MUL,
            kills_avoided: CELLEVO_KILLS_AVOIDED_MUL,
            shield_hit: CELLEVO_SHIELD_HIT_MUL,
            lives: CELLEVO_LIVES_MUL,
            bottom_penalty: CELLEVO_BOTTOM_PENALTY,
            failure: CELLEVO_FAILURE_FITNESS,
        }
    }
}

impl FitnessWeights {
    pub fn is_finite(&self) -> bool {
        [
            self.score,
            self.invader_kill,
            self.saucer_kill,
            self.level,
            self.accuracy,
            self.kills_avoided,
            self.shield_hit,
            self.lives,
            self.bottom_penalty,
            self.failure,
        ]
        .iter()
        .all(|w| w.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub label: &'static str,
    pub value: f64,
    pub multiplier: f64,
    /// signed contribution to the fitness
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitnessReport {
    pub fitness: f64,
    pub terms: Vec<Term>,
}

impl FitnessReport {
    fn failure(fitness: f64) -> Self {
        Self {
            fitness,
            terms: Vec::new(),
        }
    }

    /// One line per term followed by the total. The total is the in-order sum of the listed
    /// contributions.
    pub fn explanation(&self) -> String {
        if self.terms.is_empty() {
            return format!("no score => fitness = {}", self.fitness);
        }

        let mut out = String::new();
        for t in &self.terms {
            out.push_str(&format!(
                "{}: {} x {} = {:+}\n",
                t.label, t.value, t.multiplier, t.contribution
            ));
        }
        out.push_str(&format!("fitness = {}", self.fitness));
        out
    }
}

pub fn fitness(t: &GameTelemetry, w: &FitnessWeights) -> FitnessReport {
    if t.score == 0 {
        return FitnessReport::failure(w.failure);
    }

    let bottom = if t.invaders_reached_bottom { 1. } else { 0. };
    let terms = [
        ("score", t.score as f64, w.score, 1.),
        ("invader kills", f64::from(t.invader_kills), w.invader_kill, 1.),
        ("saucer kills", f64::from(t.saucer_kills), w.saucer_kill, 1.),
        ("levels cleared", f64::from(t.level) - 1., w.level, 1.),
        ("accuracy", t.accuracy(), w.accuracy, 1.),
        ("kills avoided", f64::from(t.kills_avoided), w.kills_avoided, 1.),
        ("shields hit", f64::from(t.shields_hit), w.shield_hit, -1.),
        ("lives", f64::from(t.lives), w.lives, 1.),
        ("reached bottom", bottom, w.bottom_penalty, -1.),
    ]
    .into_iter()
    .map(|(label, value, multiplier, sign)| Term {
        label,
        value,
        multiplier,
        contribution: sign * value * multiplier,
    })
    .collect::<Vec<_>>();

    FitnessReport {
        fitness: terms.iter().fold(0., |acc, t| acc + t.contribution),
        terms,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_f64_approx;

    fn telemetry() -> GameTelemetry {
        GameTelemetry {
            score: 120,
            level: 2,
            invader_kills: 8,
            saucer_kills: 1,
            shots: 16,
            lives: 2,
            frames_played: 4000,
            shields_hit: 3,
            kills_avoided: 4,
            invaders_reached_bottom: true,
        }
    }

    #[test]
    fn test_zero_score_fails() {
        let mut t = telemetry();
        t.score = 0;
        t.invader_kills = 50;
        let report = fitness(&t, &FitnessWeights::default());
        assert_eq!(report.fitness, -1.);
        assert!(report.explanation().contains("-1"));
    }

    #[test]
    fn test_fitness_terms() {
        let w = FitnessWeights::default();
        let report = fitness(&telemetry(), &w);
        let expected = 120. * w.score + 8. * w.invader_kill + 1. * w.saucer_kill
            + 1. * w.level
            + 0.5 * w.accuracy
            + 4. * w.kills_avoided
            - 3. * w.shield_hit
            + 2. * w.lives
            - w.bottom_penalty;
        assert_f64_approx!(report.fitness, expected);
        assert_eq!(report.terms.len(), 9);
    }

    #[test]
    fn test_explanation_matches_value() {
        let report = fitness(&telemetry(), &FitnessWeights::default());
        let text = report.explanation();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), report.terms.len() + 1);

        let sum = lines[..lines.len() - 1]
            .iter()
            .map(|l| l.rsplit("= ").next().unwrap().parse::<f64>().unwrap())
            .fold(0., |acc, v| acc + v);
        assert_eq!(sum, report.fitness);
        assert_eq!(
            lines.last().unwrap(),
            &format!("fitness = {}", report.fitness)
        );
        assert!(text.contains("shields hit: 3 x 2 = -6"));
    }

    #[test]
    fn test_level_zero_counts_below_first() {
        let w = FitnessWeights {
            level: 10.,
            ..FitnessWeights::default()
        };
        let mut t = telemetry();
        let at_one = {
            t.level = 1;
            fitness(&t, &w).fitness
        };
        t.level = 0;
        let report = fitness(&t, &w);
        assert_f64_approx!(report.fitness, at_one - 10.);
        assert!(report.explanation().contains("levels cleared: -1 x 10 = -10"));
    }

    #[test]
    fn test_accuracy_without_shots() {
        let mut t = telemetry();
        t.shots = 0;
        assert_eq!(t.accuracy(), 0.);
        assert!(fitness(&t, &FitnessWeights::default()).fitness.is_finite());
    }
}
