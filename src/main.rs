use cellevo::{
    default_rng, evolve, Brain, EvolutionHooks, FrameworkConfig, Game, GameTelemetry, Inputs,
    LearningFramework, Stats, StopToken,
};
use core::ops::ControlFlow;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{env, error::Error};
use tracing::info;
use tracing_subscriber::EnvFilter;

const GENERATIONS: usize = 200;
const FRAMES: u64 = 2000;
const LIVES: u32 = 3;
const HIT_RANGE: f64 = 0.04;
const SPEED: f64 = 0.02;
const DESCENT: f64 = 0.002;
const SHIELDS: [(f64, f64); 3] = [(0.15, 0.25), (0.45, 0.55), (0.75, 0.85)];

/// A one column shooter. A single invader descends at a random position and now and then
/// drops a bomb. Some kills also bring down a passing saucer.
struct Shooter {
    seed: u64,
}

impl Shooter {
    fn radar(x: f64, invader: (f64, f64), bomb: Option<(f64, f64)>, reloading: bool) -> Inputs {
        let (bomb_dx, bomb_y) = bomb.map_or((0., 1.), |(bx, by)| (bx - x, by));
        [
            ("invader_dx", invader.0 - x),
            ("invader_y", invader.1),
            ("bomb_dx", bomb_dx),
            ("bomb_y", bomb_y),
            ("reloading", if reloading { 1. } else { 0. }),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

impl Game for Shooter {
    fn play(&self, brain: &mut Brain) -> GameTelemetry {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut t = GameTelemetry {
            level: 1,
            lives: LIVES,
            ..GameTelemetry::default()
        };

        let mut x = 0.5;
        let mut invader = (rng.random::<f64>(), 1.);
        let mut bomb: Option<(f64, f64)> = None;
        let mut reload: u32 = 0;
        brain.reset();

        while t.frames_played < FRAMES && t.lives > 0 {
            t.frames_played += 1;
            let out = brain.step(&Self::radar(x, invader, bomb, reload > 0));

            x = (x + out.get("move").copied().unwrap_or(0.).clamp(-1., 1.) * SPEED).clamp(0., 1.);
            reload = reload.saturating_sub(1);
            if reload == 0 && out.get("fire").copied().unwrap_or(0.) > 0.5 {
                reload = 20;
                t.shots += 1;
                if SHIELDS.iter().any(|(l, r)| (*l..*r).contains(&x)) {
                    t.shields_hit += 1;
                } else if (invader.0 - x).abs() < HIT_RANGE {
                    t.invader_kills += 1;
                    t.score += 10 * u64::from(t.level);
                    if rng.random_bool(0.1) {
                        t.saucer_kills += 1;
                        t.score += 50;
                    }
                    if t.invader_kills % 10 == 0 {
                        t.level += 1;
                    }
                    invader = (rng.random::<f64>(), 1.);
                }
            }

            invader.1 -= DESCENT * f64::from(t.level);
            if invader.1 <= 0. {
                t.invaders_reached_bottom = true;
                t.lives = 0;
                break;
            }

            bomb = match bomb {
                None if rng.random_bool(0.02) => Some((invader.0, invader.1)),
                Some((bx, by)) if by <= 0. => {
                    if (bx - x).abs() < HIT_RANGE {
                        t.lives -= 1;
                    } else {
                        t.kills_avoided += 1;
                    }
                    None
                }
                Some((bx, by)) => Some((bx, by - 0.02)),
                None => None,
            };
        }

        t
    }
}

fn report(stats: &mut Stats<'_>) -> ControlFlow<()> {
    if let Some(s) = stats.snapshot {
        info!(
            generation = stats.generation,
            best = s.best_fitness,
            mean = s.mean_fitness,
            cells = s.mean_genome_size,
            "generation scored"
        );
    }

    if stats.generation + 1 >= GENERATIONS {
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match env::args().nth(1) {
        Some(path) => FrameworkConfig::from_file(path)?,
        None => FrameworkConfig {
            inputs: ["invader_dx", "invader_y", "bomb_dx", "bomb_y", "reloading"]
                .map(String::from)
                .to_vec(),
            outputs: vec!["move".into(), "fire".into()],
            ..FrameworkConfig::default()
        },
    };

    let mut framework = LearningFramework::new(config, default_rng())?;
    let played = evolve(
        &mut framework,
        &Shooter { seed: 0x5eed },
        EvolutionHooks::new(vec![Box::new(report)]),
        &StopToken::new(),
    )?;

    if let Some(best) = framework.best() {
        info!(
            generations = played,
            fitness = best.fitness,
            score = best.real_score,
            dna = %best.dna(),
            "best brain"
        );
        println!("{}", best.get_as_template());
    }
    Ok(())
}
