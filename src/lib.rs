pub mod config;
pub mod constants;
pub mod crossover;
pub mod error;
pub mod fitness;
pub mod framework;
pub mod genome;
pub mod macros;
pub mod mutation;
pub mod network;
pub mod population;
pub mod random;
pub mod scenario;
pub mod selection;

pub use config::{FrameworkConfig, InitialTopology};
pub use crossover::genes_crossover;
pub use error::{EvoError, EvoResult};
pub use fitness::{fitness, FitnessReport, FitnessWeights, GameTelemetry};
pub use framework::{LearningFramework, LogSink, LoopPhase, PerformanceSnapshot};
pub use genome::{Brain, BrainIdGen, Cell, CellKind, Connection, Outputs, Provenance};
pub use mutation::{MutationMethod, MutationRecord};
pub use network::{activate, Inputs, Network};
pub use population::{population_from_files, population_to_files, Population};
pub use random::{default_rng, WyRng};
pub use scenario::{evolve, EvolutionHooks, Game, Hook, Stats, StopToken};
pub use selection::SelectionStrategy;
