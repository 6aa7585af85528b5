//! The generational loop: `Playing -> Scoring -> NextGeneration -> Playing -> ...`
//!
//! [LearningFramework] owns the population and every setting of the run. A host drives it by
//! calling [LearningFramework::play], [LearningFramework::score] and
//! [LearningFramework::next_generation] in that order, or hands it to [crate::evolve].

use crate::{
    config::FrameworkConfig,
    crossover::genes_crossover,
    error::{EvoError, EvoResult},
    fitness::{fitness, GameTelemetry},
    genome::{Brain, BrainIdGen, Provenance},
    population::Population,
    random::chance,
    scenario::Game,
};
use core::{fmt, mem};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Receives every checkpoint line of the loop
pub type LogSink = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopPhase {
    Playing,
    Scoring,
    NextGeneration,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Playing => "playing",
            Self::Scoring => "scoring",
            Self::NextGeneration => "next generation",
        })
    }
}

/// Population statistics of one scored generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub generation: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub best_real_score: f64,
    pub mean_genome_size: f64,
    pub mean_connections_size: f64,
}

pub struct LearningFramework<R: RngCore> {
    config: FrameworkConfig,
    rng: R,
    ids: BrainIdGen,
    population: Population,
    template: Option<Brain>,
    generation: usize,
    phase: LoopPhase,
    best_fitness: f64,
    best_real_score: f64,
    history: Vec<PerformanceSnapshot>,
    log_sink: Option<LogSink>,
}

impl<R: RngCore> LearningFramework<R> {
    /// Validate `config` and build the initial population
    pub fn new(config: FrameworkConfig, mut rng: R) -> EvoResult<Self> {
        config.validate()?;
        let template = Self::load_template(&config)?;

        let mut ids = BrainIdGen::default();
        let population = (0..config.population_size)
            .map(|n| match &template {
                Some(template) => {
                    let mut brain = template.clone_as(ids.fresh());
                    // keep one exact copy of the template
                    if n > 0 {
                        brain.mutate_many(&config, &mut rng);
                    }
                    brain
                }
                None => Brain::random(ids.fresh(), &config, &mut rng),
            })
            .collect::<Population>();

        info!(
            population = population.len(),
            templated = template.is_some(),
            "initialized population"
        );
        Ok(Self::assemble(config, rng, ids, population, template))
    }

    /// Continue a run from a saved population, e.g. one loaded with
    /// [crate::population_from_files]
    pub fn resume(
        config: FrameworkConfig,
        rng: R,
        population: Population,
        id_head: u64,
    ) -> EvoResult<Self> {
        config.validate()?;
        if population.len() != config.population_size {
            return Err(EvoError::config(format!(
                "population of {} brains does not match the configured size {}",
                population.len(),
                config.population_size
            )));
        }
        for brain in population.iter() {
            if brain.inputs() != config.inputs.as_slice()
                || brain.outputs() != config.outputs.as_slice()
            {
                return Err(EvoError::config(format!(
                    "brain {} does not share the configured inputs and outputs",
                    brain.id
                )));
            }
        }
        let template = Self::load_template(&config)?;

        info!(population = population.len(), id_head, "resumed population");
        Ok(Self::assemble(
            config,
            rng,
            BrainIdGen::new(id_head),
            population,
            template,
        ))
    }

    fn load_template(config: &FrameworkConfig) -> EvoResult<Option<Brain>> {
        let Some(text) = &config.template else {
            return Ok(None);
        };
        let template = Brain::from_template(0, text)?;
        if template.inputs() != config.inputs.as_slice()
            || template.outputs() != config.outputs.as_slice()
        {
            return Err(EvoError::config(
                "template inputs and outputs differ from the configured ones",
            ));
        }
        Ok(Some(template))
    }

    fn assemble(
        config: FrameworkConfig,
        rng: R,
        ids: BrainIdGen,
        population: Population,
        template: Option<Brain>,
    ) -> Self {
        Self {
            config,
            rng,
            ids,
            population,
            template,
            generation: 0,
            phase: LoopPhase::Playing,
            best_fitness: f64::NEG_INFINITY,
            best_real_score: 0.,
            history: Vec::new(),
            log_sink: None,
        }
    }

    pub fn with_log_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log_sink = Some(Box::new(sink));
        self
    }

    fn log(&self, line: &str) {
        if let Some(sink) = &self.log_sink {
            sink(line);
        }
    }

    fn expect_phase(&self, phase: LoopPhase, action: &'static str) -> EvoResult<()> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(EvoError::OutOfPhase {
                action,
                phase: self.phase,
            })
        }
    }

    #[inline]
    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    #[inline]
    pub fn population(&self) -> &Population {
        &self.population
    }

    #[inline]
    pub fn generation(&self) -> usize {
        self.generation
    }

    #[inline]
    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    #[inline]
    pub fn history(&self) -> &[PerformanceSnapshot] {
        &self.history
    }

    /// Best fitness of any scored generation so far
    #[inline]
    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    #[inline]
    pub fn best_real_score(&self) -> f64 {
        self.best_real_score
    }

    pub fn template(&self) -> Option<&Brain> {
        self.template.as_ref()
    }

    /// The brain with the highest score
    pub fn best(&self) -> Option<&Brain> {
        self.population
            .iter()
            .max_by(|l, r| l.score.total_cmp(&r.score))
    }

    /// Hand every brain to `game` once, then play them all. Brains are independent, so with
    /// the `parallel` feature they play concurrently; the call returns once all are done.
    pub fn play<G: Game>(&mut self, game: &G) -> EvoResult<Vec<GameTelemetry>> {
        self.expect_phase(LoopPhase::Playing, "play")?;
        for brain in self.population.iter() {
            game.create_player(brain.id, brain);
        }

        #[cfg(feature = "parallel")]
        let telemetry = self
            .population
            .brains_mut()
            .par_iter_mut()
            .map(|brain| game.play(brain))
            .collect::<Vec<_>>();
        #[cfg(not(feature = "parallel"))]
        let telemetry = self
            .population
            .brains_mut()
            .iter_mut()
            .map(|brain| game.play(brain))
            .collect::<Vec<_>>();

        self.phase = LoopPhase::Scoring;
        Ok(telemetry)
    }

    /// Turn telemetry, in population order, into fitness, then rank the population
    pub fn score(&mut self, telemetry: &[GameTelemetry]) -> EvoResult<()> {
        self.expect_phase(LoopPhase::Scoring, "score")?;
        if telemetry.len() != self.population.len() {
            return Err(EvoError::TelemetryMismatch {
                expected: self.population.len(),
                found: telemetry.len(),
            });
        }

        let keep = self.config.performance_history;
        for (brain, t) in self.population.brains_mut().iter_mut().zip(telemetry) {
            let report = fitness(t, &self.config.fitness);
            brain.fitness = report.fitness;
            brain.score = report.fitness;
            brain.real_score = t.score as f64;
            brain.real_best_score = brain.real_best_score.max(brain.real_score);
            brain.record_performance(report.fitness, keep);
            debug!(
                brain = brain.id,
                provenance = %brain.provenance,
                fitness = brain.fitness,
                cells = brain.genome_size(),
                connections = brain.connections_size(),
                "scored\n{}",
                report.explanation()
            );
        }

        self.rank();
        self.phase = LoopPhase::NextGeneration;
        Ok(())
    }

    /// Sort by score and record the generation's statistics. Hosts that adjust `score` by
    /// hand after [LearningFramework::score] may call this again.
    pub fn rank(&mut self) {
        self.population.sort_by_score();

        let n = self.population.len().max(1) as f64;
        let brains = self.population.brains();
        let snapshot = PerformanceSnapshot {
            generation: self.generation,
            best_fitness: brains
                .iter()
                .map(|b| b.fitness)
                .fold(f64::NEG_INFINITY, f64::max),
            mean_fitness: brains.iter().map(|b| b.fitness).sum::<f64>() / n,
            best_real_score: brains.iter().map(|b| b.real_score).fold(0., f64::max),
            mean_genome_size: brains.iter().map(|b| b.genome_size() as f64).sum::<f64>() / n,
            mean_connections_size: brains
                .iter()
                .map(|b| b.connections_size() as f64)
                .sum::<f64>()
                / n,
        };
        self.best_fitness = self.best_fitness.max(snapshot.best_fitness);
        self.best_real_score = self.best_real_score.max(snapshot.best_real_score);
        match self.history.last_mut() {
            Some(last) if last.generation == snapshot.generation => *last = snapshot,
            _ => self.history.push(snapshot),
        }

        let summary = self.population_summary();
        info!("{summary}");
        self.log(&summary);
    }

    pub fn population_summary(&self) -> String {
        let count = |p: Provenance| self.population.iter().filter(|b| b.provenance == p).count();
        let mut out = format!(
            "generation {}: {} brains ({} elite, {} offspring, {} random, {} templated)",
            self.generation,
            self.population.len(),
            count(Provenance::Elite),
            count(Provenance::Offspring),
            count(Provenance::Random),
            count(Provenance::Templated),
        );
        if let Some(s) = self.history.last() {
            out.push_str(&format!(
                ", best fitness {:.3} (ever {:.3}), mean fitness {:.3}, best score {} (ever {}), mean size {:.1} cells / {:.1} connections",
                s.best_fitness,
                self.best_fitness,
                s.mean_fitness,
                s.best_real_score,
                self.best_real_score,
                s.mean_genome_size,
                s.mean_connections_size
            ));
        }
        out
    }

    /// Build the next generation from the ranked one: elites, templated copies, offspring and
    /// random immigrants, then mutate everything but the elites
    pub fn next_generation(&mut self) -> EvoResult<()> {
        self.expect_phase(LoopPhase::NextGeneration, "build the next generation")?;
        let size = self.config.population_size;
        let old = mem::take(&mut self.population).into_vec();

        let elite_cap = (self.config.elite_percent * size as f64 / 100.).ceil() as usize;
        let elites = old
            .iter()
            .enumerate()
            .filter(|(_, b)| b.fitness > 0.)
            .take(elite_cap)
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();

        let templated = match &self.template {
            Some(_) => ((self.config.template_percent * size as f64 / 100.).floor() as usize)
                .min(size - elites.len()),
            None => 0,
        };
        let remaining = size - elites.len() - templated;
        let randoms =
            (self.config.random_immigrant_percent * remaining as f64 / 100.).floor() as usize;
        let offspring = remaining - randoms;

        let mut next = Vec::with_capacity(size);
        if let Some(template) = &self.template {
            for _ in 0..templated {
                let mut brain = template.clone_as(self.ids.fresh());
                brain.provenance = Provenance::Templated;
                next.push(brain);
            }
        }

        let ranked = old.iter().map(|b| b.score).collect::<Vec<_>>();
        for _ in 0..offspring {
            let p1 = self.config.selection.select(&ranked, &mut self.rng)?;
            let p2 = self.config.selection.select(&ranked, &mut self.rng)?;
            next.push(genes_crossover(
                &old[p1],
                &old[p2],
                self.config.crossover_allow_mutation,
                self.ids.fresh(),
                &mut self.rng,
            ));
        }

        for _ in 0..randoms {
            next.push(Brain::random(self.ids.fresh(), &self.config, &mut self.rng));
        }

        for brain in next.iter_mut() {
            if chance(&mut self.rng, self.config.chance_of_mutation_percent) {
                let records = brain.mutate_many(&self.config, &mut self.rng);
                debug!(brain = brain.id, applied = records.len(), "mutation pass");
            }
        }

        let mut population = Vec::with_capacity(size);
        for (idx, mut brain) in old.into_iter().enumerate() {
            if elites.contains(&idx) {
                brain.reset();
                brain.provenance = Provenance::Elite;
                population.push(brain);
            } else {
                brain.dispose();
            }
        }
        population.append(&mut next);
        assert_eq!(
            population.len(),
            size,
            "generation {} holds {} brains instead of {size}",
            self.generation + 1,
            population.len()
        );

        self.population = population.into();
        self.generation += 1;
        self.phase = LoopPhase::Playing;

        let line = format!(
            "generation {} built: {} elite, {templated} templated, {offspring} offspring, {randoms} random",
            self.generation,
            elites.len()
        );
        info!("{line}");
        self.log(&line);
        Ok(())
    }
}
