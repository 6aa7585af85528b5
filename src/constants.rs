//! Centralized defaults for cellevo evolution parameters.
//!
//! All configurable parameters are defined here with the `CELLEVO_` prefix and are
//! collected into a [crate::FrameworkConfig] by its `Default` impl.

// ============================================================================
// Population Parameters
// ============================================================================

/// Number of brains alive in every generation
pub const CELLEVO_POPULATION_SIZE: usize = 100;

/// Percentage of the population kept unchanged from the previous generation
pub const CELLEVO_ELITE_PERCENT: f64 = 10.0;

/// Percentage of the population instantiated from the configured template brain
pub const CELLEVO_TEMPLATE_PERCENT: f64 = 0.0;

/// Percentage of the non-elite, non-templated slots filled by random immigrants
pub const CELLEVO_RANDOM_IMMIGRANT_PERCENT: f64 = 10.0;

/// Number of fitness values retained per brain
pub const CELLEVO_PERFORMANCE_HISTORY: usize = 5;

// ============================================================================
// Mutation Parameters
// ============================================================================

/// Chance that a non-elite brain is mutated at all
pub const CELLEVO_CHANCE_OF_MUTATION_PERCENT: f64 = 80.0;

/// Number of mutation attempts applied to a brain selected for mutation
pub const CELLEVO_MUTATION_AMOUNT: usize = 3;

/// Magnitude range of a bias mutation, applied with a random sign
pub const CELLEVO_BIAS_DELTA: (f64, f64) = (0.05, 0.5);

/// Magnitude range of an activation threshold mutation, applied with a random sign
pub const CELLEVO_THRESHOLD_DELTA: (f64, f64) = (0.01, 0.1);

/// Magnitude range of a connection weight mutation, applied with a random sign
pub const CELLEVO_WEIGHT_DELTA: (f64, f64) = (0.05, 0.5);

/// Whether crossover may import genes that only the less fit parent carries
pub const CELLEVO_CROSSOVER_ALLOW_MUTATION: bool = true;

// ============================================================================
// Genome Size Parameters
// ============================================================================

/// Maximum number of cells across every network of a brain
pub const CELLEVO_MAXIMUM_ALLOWED_CELLS_IN_BRAIN: usize = 200;

/// Minimum number of hidden cells a network keeps
pub const CELLEVO_MINIMUM_NUMBER_OF_NEURONS: usize = 0;

/// Maximum number of hidden cells a network may grow to
pub const CELLEVO_MAXIMUM_NUMBER_OF_NEURONS: usize = 64;

/// Number of networks sharing the input and output surface of a brain
pub const CELLEVO_NETWORKS_PER_BRAIN: usize = 1;

/// Hidden cells of a freshly generated random brain
pub const CELLEVO_INITIAL_HIDDEN_CELLS: usize = 4;

/// Connections of a freshly generated random brain
pub const CELLEVO_INITIAL_CONNECTIONS: usize = 8;

/// Range new weights and biases are drawn from
pub const CELLEVO_INITIAL_PARAM_RANGE: (f64, f64) = (-1.0, 1.0);

// ============================================================================
// Selection Parameters
// ============================================================================

/// Exponent of rank based (power) selection
pub const CELLEVO_SELECTION_POWER: f64 = 2.0;

/// Sub-sample size of tournament selection
pub const CELLEVO_TOURNAMENT_SIZE: usize = 5;

/// Chance that the current tournament candidate is accepted
pub const CELLEVO_TOURNAMENT_PROBABILITY: f64 = 0.75;

// ============================================================================
// Fitness Multipliers
// ============================================================================

/// Fitness assigned to any organism that never scored
pub const CELLEVO_FAILURE_FITNESS: f64 = -1.0;

pub const CELLEVO_SCORE_MUL: f64 = 1.0;
pub const CELLEVO_INVADER_KILL_MUL: f64 = 10.0;
pub const CELLEVO_SAUCER_KILL_MUL: f64 = 50.0;
pub const CELLEVO_LEVEL_MUL: f64 = 500.0;
pub const CELLEVO_ACCURACY_MUL: f64 = 100.0;
pub const CELLEVO_KILLS_AVOIDED_MUL: f64 = 5.0;
pub const CELLEVO_SHIELD_HIT_MUL: f64 = 2.0;
pub const CELLEVO_LIVES_MUL: f64 = 50.0;
pub const CELLEVO_BOTTOM_PENALTY: f64 = 250.0;
