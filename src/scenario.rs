use crate::{
    error::EvoResult,
    fitness::GameTelemetry,
    framework::{LearningFramework, PerformanceSnapshot},
    genome::Brain,
    population::Population,
};
use core::ops::ControlFlow;
use rand::RngCore;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::info;

/// The environment brains are evaluated in
pub trait Game: Sync {
    /// Called once per brain at the start of every generation, before any play
    fn create_player(&self, _id: u64, _brain: &Brain) {}

    /// Play one full game with `brain` in control
    fn play(&self, brain: &mut Brain) -> GameTelemetry;
}

/// What a hook sees after a generation has been scored
pub struct Stats<'a> {
    pub generation: usize,
    pub population: &'a Population,
    pub snapshot: Option<&'a PerformanceSnapshot>,
    pub best_fitness: f64,
    pub best_real_score: f64,
}

impl<'a> Stats<'a> {
    fn new<R: RngCore>(framework: &'a LearningFramework<R>) -> Self {
        Self {
            generation: framework.generation(),
            population: framework.population(),
            snapshot: framework.history().last(),
            best_fitness: framework.best_fitness(),
            best_real_score: framework.best_real_score(),
        }
    }

    pub fn fittest(&self) -> Option<&'a Brain> {
        self.population
            .iter()
            .max_by(|l, r| l.fitness.total_cmp(&r.fitness))
    }

    pub fn any_fitter_than(&self, target: f64) -> bool {
        self.population.iter().any(|b| b.fitness > target)
    }
}

pub type Hook = Box<dyn FnMut(&mut Stats<'_>) -> ControlFlow<()>>;

#[derive(Default)]
pub struct EvolutionHooks {
    hooks: Vec<Hook>,
}

impl EvolutionHooks {
    pub fn new(hooks: Vec<Hook>) -> Self {
        Self { hooks }
    }

    /// Run every hook, breaking if any of them asks to
    fn fire(&mut self, stats: &mut Stats<'_>) -> ControlFlow<()> {
        let mut flow = ControlFlow::Continue(());
        for hook in self.hooks.iter_mut() {
            if hook(stats).is_break() {
                flow = ControlFlow::Break(());
            }
        }
        flow
    }
}

/// Cooperative stop request, honoured between generations
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drive `framework` through `play -> score -> hooks -> next_generation` until a hook breaks
/// or `stop` is set. Returns the number of generations played.
///
/// The stop token is only checked before a generation starts playing, so the population is
/// never left half built. After a hook breaks, the last generation stays scored and ranked.
pub fn evolve<R: RngCore, G: Game>(
    framework: &mut LearningFramework<R>,
    game: &G,
    mut hooks: EvolutionHooks,
    stop: &StopToken,
) -> EvoResult<usize> {
    let mut played = 0;
    loop {
        if stop.is_stopped() {
            info!(generation = framework.generation(), "evolution stopped");
            break Ok(played);
        }

        let telemetry = framework.play(game)?;
        framework.score(&telemetry)?;
        played += 1;

        if hooks.fire(&mut Stats::new(framework)).is_break() {
            info!(generation = framework.generation(), "evolution target met");
            break Ok(played);
        }

        framework.next_generation()?;
    }
}
