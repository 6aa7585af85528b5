//! Configuration threaded into [crate::LearningFramework].

use crate::{
    activate::ActivationFunction,
    constants::*,
    error::{EvoError, EvoResult},
    fitness::FitnessWeights,
    genome::{template::is_valid_name, CellKind},
    mutation::MutationMethod,
    selection::SelectionStrategy,
};
use fxhash::FxHashSet;
use rand::{seq::IndexedRandom, RngCore};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Shape of a freshly generated brain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InitialTopology {
    /// `hidden` cells of mixed kinds and up to `connections` random legal connections
    Random { hidden: usize, connections: usize },
    /// Perceptron layers, each fully connected to the previous one
    Layered { layers: Vec<usize> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,

    pub population_size: usize,
    pub elite_percent: f64,
    pub template_percent: f64,
    pub random_immigrant_percent: f64,
    pub performance_history: usize,

    pub chance_of_mutation_percent: f64,
    pub mutation_amount: usize,
    pub bias_delta: (f64, f64),
    pub threshold_delta: (f64, f64),
    pub weight_delta: (f64, f64),
    pub allowed_mutations: Vec<MutationMethod>,
    pub allowed_activations: Vec<ActivationFunction>,
    pub output_activation: ActivationFunction,
    /// relative share of every hidden kind when cells are created or retyped
    pub cell_type_ratios: Vec<(CellKind, f64)>,
    pub crossover_allow_mutation: bool,

    pub maximum_allowed_cells_in_brain: usize,
    pub minimum_number_of_neurons: usize,
    pub maximum_number_of_neurons: usize,
    pub networks_per_brain: usize,
    pub topology: InitialTopology,
    pub initial_param_range: (f64, f64),

    pub selection: SelectionStrategy,
    pub fitness: FitnessWeights,
    /// brain template text used for templated seeding
    pub template: Option<String>,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            inputs: vec!["input".into()],
            outputs: vec!["output".into()],
            population_size: CELLEVO_POPULATION_SIZE,
            elite_percent: CELLEVO_ELITE_PERCENT,
            template_percent: CELLEVO_TEMPLATE_PERCENT,
            random_immigrant_percent: CELLEVO_RANDOM_IMMIGRANT_PERCENT,
            performance_history: CELLEVO_PERFORMANCE_HISTORY,
            chance_of_mutation_percent: CELLEVO_CHANCE_OF_MUTATION_PERCENT,
            mutation_amount: CELLEVO_MUTATION_AMOUNT,
            bias_delta: CELLEVO_BIAS_DELTA,
            threshold_delta: CELLEVO_THRESHOLD_DELTA,
            weight_delta: CELLEVO_WEIGHT_DELTA,
            allowed_mutations: MutationMethod::ALL.to_vec(),
            allowed_activations: vec![
                ActivationFunction::TanH,
                ActivationFunction::Sigmoid,
                ActivationFunction::ReLU,
                ActivationFunction::Identity,
            ],
            output_activation: ActivationFunction::TanH,
            cell_type_ratios: vec![
                (CellKind::Perceptron, 50.),
                (CellKind::Transistor, 10.),
                (CellKind::If, 10.),
                (CellKind::And, 10.),
                (CellKind::Max, 10.),
                (CellKind::Min, 10.),
            ],
            crossover_allow_mutation: CELLEVO_CROSSOVER_ALLOW_MUTATION,
            maximum_allowed_cells_in_brain: CELLEVO_MAXIMUM_ALLOWED_CELLS_IN_BRAIN,
            minimum_number_of_neurons: CELLEVO_MINIMUM_NUMBER_OF_NEURONS,
            maximum_number_of_neurons: CELLEVO_MAXIMUM_NUMBER_OF_NEURONS,
            networks_per_brain: CELLEVO_NETWORKS_PER_BRAIN,
            topology: InitialTopology::Random {
                hidden: CELLEVO_INITIAL_HIDDEN_CELLS,
                connections: CELLEVO_INITIAL_CONNECTIONS,
            },
            initial_param_range: CELLEVO_INITIAL_PARAM_RANGE,
            selection: SelectionStrategy::Tournament {
                size: CELLEVO_TOURNAMENT_SIZE,
                probability: CELLEVO_TOURNAMENT_PROBABILITY,
            },
            fitness: FitnessWeights::default(),
            template: None,
        }
    }
}

fn percent(name: &str, v: f64) -> EvoResult<()> {
    if (0. ..=100.).contains(&v) {
        Ok(())
    } else {
        Err(EvoError::config(format!("{name} must lie in [0, 100], got {v}")))
    }
}

fn magnitude(name: &str, (lo, hi): (f64, f64)) -> EvoResult<()> {
    if lo.is_finite() && hi.is_finite() && 0. <= lo && lo <= hi {
        Ok(())
    } else {
        Err(EvoError::config(format!(
            "{name} must satisfy 0 <= min <= max, got ({lo}, {hi})"
        )))
    }
}

impl FrameworkConfig {
    /// Reject any setting the loop cannot honour. Nothing is clamped.
    pub fn validate(&self) -> EvoResult<()> {
        if self.population_size == 0 {
            return Err(EvoError::config("population size must be at least 1"));
        }
        percent("elite percent", self.elite_percent)?;
        percent("template percent", self.template_percent)?;
        percent("random immigrant percent", self.random_immigrant_percent)?;
        percent("chance of mutation percent", self.chance_of_mutation_percent)?;
        if self.elite_percent + self.template_percent > 100. {
            return Err(EvoError::config(format!(
                "elite ({}%) and template ({}%) shares exceed the population",
                self.elite_percent, self.template_percent
            )));
        }

        magnitude("bias delta", self.bias_delta)?;
        magnitude("threshold delta", self.threshold_delta)?;
        magnitude("weight delta", self.weight_delta)?;
        let (lo, hi) = self.initial_param_range;
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            return Err(EvoError::config(format!(
                "initial parameter range ({lo}, {hi}) is empty"
            )));
        }

        if self.allowed_mutations.is_empty() {
            return Err(EvoError::config("no mutation methods allowed"));
        }
        if self.allowed_activations.is_empty() {
            return Err(EvoError::config("no activation functions allowed"));
        }
        if let Some((kind, _)) = self.cell_type_ratios.iter().find(|(k, _)| !k.is_hidden()) {
            return Err(EvoError::config(format!(
                "{kind} cannot be part of the cell type mix"
            )));
        }
        if self
            .cell_type_ratios
            .iter()
            .any(|(_, w)| !w.is_finite() || *w < 0.)
            || self.cell_type_ratios.iter().map(|(_, w)| w).sum::<f64>() <= 0.
        {
            return Err(EvoError::config(
                "cell type ratios must be non-negative with a positive total",
            ));
        }

        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(EvoError::config("brains need at least one input and output"));
        }
        let mut seen = FxHashSet::default();
        for name in self.inputs.iter().chain(self.outputs.iter()) {
            if !is_valid_name(name) {
                return Err(EvoError::config(format!("invalid input/output name {name:?}")));
            }
            if !seen.insert(name.as_str()) {
                return Err(EvoError::config(format!("duplicate input/output name {name}")));
            }
        }

        if self.networks_per_brain == 0 {
            return Err(EvoError::config("brains need at least one network"));
        }
        if self.minimum_number_of_neurons > self.maximum_number_of_neurons {
            return Err(EvoError::config(format!(
                "minimum number of neurons {} exceeds maximum {}",
                self.minimum_number_of_neurons, self.maximum_number_of_neurons
            )));
        }
        let floor = self.networks_per_brain
            * (self.inputs.len() + self.outputs.len() + self.minimum_number_of_neurons);
        if self.maximum_allowed_cells_in_brain < floor {
            return Err(EvoError::config(format!(
                "maximum of {} cells cannot hold the {floor} every brain needs",
                self.maximum_allowed_cells_in_brain
            )));
        }
        let hidden = match &self.topology {
            InitialTopology::Random { hidden, .. } => *hidden,
            InitialTopology::Layered { layers } => layers.iter().sum(),
        };
        if hidden > self.maximum_number_of_neurons
            || floor + self.networks_per_brain * hidden.saturating_sub(self.minimum_number_of_neurons)
                > self.maximum_allowed_cells_in_brain
        {
            return Err(EvoError::config(format!(
                "initial topology of {hidden} hidden cells exceeds the size limits"
            )));
        }

        self.selection.validate(self.population_size)?;
        if !self.fitness.is_finite() {
            return Err(EvoError::config("fitness multipliers must be finite"));
        }

        Ok(())
    }

    /// A hidden kind drawn from the configured mix
    pub fn random_hidden_kind(&self, rng: &mut impl RngCore) -> Option<CellKind> {
        self.cell_type_ratios
            .choose_weighted(rng, |(_, w)| *w)
            .ok()
            .map(|(k, _)| *k)
    }

    /// Hidden kinds with a positive share of the mix
    pub fn allowed_hidden_kinds(&self) -> impl Iterator<Item = CellKind> + '_ {
        self.cell_type_ratios
            .iter()
            .filter(|(_, w)| *w > 0.)
            .map(|(k, _)| *k)
    }

    pub fn to_string(&self) -> EvoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> EvoResult<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> EvoResult<()> {
        fs::write(path, self.to_string()?)?;
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> EvoResult<Self> {
        Self::from_str(&fs::read_to_string(path)?)
    }
}
