//! Brains: one or more cell networks sharing a named input/output surface.

pub mod cell;
pub mod connection;
pub mod template;

pub use cell::{evaluate, Cell, CellKind};
pub use connection::{connection_key, Connection};

use crate::{
    activate::ActivationFunction,
    config::{FrameworkConfig, InitialTopology},
    error::{EvoError, EvoResult},
    network::{Inputs, Network},
    random::uniform,
};
use core::fmt;
use fxhash::FxHashMap;
use rand::{seq::IndexedRandom, RngCore};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fs, path::Path};
use template::{is_valid_name, tokenize};
use tracing::trace;

/// Named values produced by a brain's output cells, summed across its networks
pub type Outputs = FxHashMap<String, f64>;

/// How a brain entered the current generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    Elite,
    Offspring,
    Random,
    Templated,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Elite => "Elite",
            Self::Offspring => "Offspring",
            Self::Random => "Random",
            Self::Templated => "Templated",
        })
    }
}

/// Monotonic source of brain ids
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrainIdGen {
    pub head: u64,
}

impl BrainIdGen {
    pub fn new(head: u64) -> Self {
        Self { head }
    }

    pub fn fresh(&mut self) -> u64 {
        let id = self.head;
        self.head += 1;
        id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brain {
    pub id: u64,
    inputs: Vec<String>,
    outputs: Vec<String>,
    networks: Vec<Network>,
    /// counter behind fresh hidden cell ids
    next_cell: usize,
    pub fitness: f64,
    /// rank key, normally equal to `fitness`
    pub score: f64,
    pub real_score: f64,
    pub real_best_score: f64,
    pub provenance: Provenance,
    performance: VecDeque<f64>,
}

impl Brain {
    /// Input and output cells only, in `networks` unconnected networks
    pub fn bare(
        id: u64,
        inputs: &[String],
        outputs: &[String],
        networks: usize,
        output_activation: ActivationFunction,
    ) -> Self {
        let networks = (0..networks)
            .map(|n| {
                let mut network = Network::new(format!("N{n}"));
                for name in inputs {
                    network.add_cell(Cell::new(
                        name.as_str(),
                        CellKind::Input,
                        0.,
                        ActivationFunction::Identity,
                        0.,
                    ));
                }
                for name in outputs {
                    network.add_cell(Cell::new(
                        name.as_str(),
                        CellKind::Output,
                        0.,
                        output_activation,
                        0.,
                    ));
                }
                network
            })
            .collect();

        Self {
            id,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            networks,
            next_cell: 0,
            fitness: 0.,
            score: 0.,
            real_score: 0.,
            real_best_score: 0.,
            provenance: Provenance::Random,
            performance: VecDeque::new(),
        }
    }

    /// A fresh brain shaped by the configured topology and cell type mix
    pub fn random(id: u64, config: &FrameworkConfig, rng: &mut impl RngCore) -> Self {
        let mut brain = Self::bare(
            id,
            &config.inputs,
            &config.outputs,
            config.networks_per_brain,
            config.output_activation,
        );

        for n in 0..brain.networks.len() {
            match &config.topology {
                InitialTopology::Random {
                    hidden,
                    connections,
                } => {
                    for _ in 0..*hidden {
                        let kind = config
                            .random_hidden_kind(rng)
                            .unwrap_or(CellKind::Perceptron);
                        if brain.grow(n, kind, config, rng).is_none() {
                            break;
                        }
                    }
                    for _ in 0..*connections {
                        let Some((from, to)) = brain.networks[n].open_path(rng) else {
                            break;
                        };
                        brain.networks[n].connect(from, to, uniform(rng, config.initial_param_range));
                    }
                    brain.feed_outputs(n, config, rng);
                }
                InitialTopology::Layered { layers } => {
                    let mut previous = brain.cell_positions(n, CellKind::Input);
                    for width in layers {
                        let layer = (0..*width)
                            .filter_map(|_| brain.grow(n, CellKind::Perceptron, config, rng))
                            .collect::<Vec<_>>();
                        brain.connect_all(n, &previous, &layer, config, rng);
                        previous = layer;
                    }
                    let outputs = brain.cell_positions(n, CellKind::Output);
                    brain.connect_all(n, &previous, &outputs, config, rng);
                }
            }
        }

        brain
    }

    fn cell_positions(&self, n: usize, kind: CellKind) -> Vec<usize> {
        self.networks[n]
            .cells()
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| (c.kind == kind).then_some(idx))
            .collect()
    }

    fn connect_all(
        &mut self,
        n: usize,
        sources: &[usize],
        targets: &[usize],
        config: &FrameworkConfig,
        rng: &mut impl RngCore,
    ) {
        for to in targets {
            for from in sources {
                self.networks[n].connect(*from, *to, uniform(rng, config.initial_param_range));
            }
        }
    }

    /// Give every unfed output one random source
    fn feed_outputs(&mut self, n: usize, config: &FrameworkConfig, rng: &mut impl RngCore) {
        let sources = (0..self.networks[n].len())
            .filter(|idx| self.networks[n].cells()[*idx].kind != CellKind::Output)
            .collect::<Vec<_>>();
        for to in self.cell_positions(n, CellKind::Output) {
            if !self.networks[n].cells()[to].inbound().is_empty() {
                continue;
            }
            if let Some(from) = sources.choose(rng) {
                self.networks[n].connect(*from, to, uniform(rng, config.initial_param_range));
            }
        }
    }

    /// Whether network `n` may take one more hidden cell under the configured caps
    pub fn can_grow(&self, n: usize, config: &FrameworkConfig) -> bool {
        self.networks.get(n).is_some_and(|network| {
            self.genome_size() < config.maximum_allowed_cells_in_brain
                && network.hidden_count() < config.maximum_number_of_neurons
        })
    }

    /// Append an unconnected hidden cell of `kind` with random genes to network `n`
    pub(crate) fn grow(
        &mut self,
        n: usize,
        kind: CellKind,
        config: &FrameworkConfig,
        rng: &mut impl RngCore,
    ) -> Option<usize> {
        if !self.can_grow(n, config) {
            trace!(brain = self.id, network = n, "cell cap reached");
            return None;
        }

        let activation = config
            .allowed_activations
            .choose(rng)
            .copied()
            .unwrap_or(ActivationFunction::Identity);
        let cell = Cell::new(
            self.fresh_cell_id(),
            kind,
            uniform(rng, config.initial_param_range),
            activation,
            0.,
        );
        self.networks[n].add_cell(cell)
    }

    /// An `H<n>` id not taken in any network
    pub(crate) fn fresh_cell_id(&mut self) -> String {
        loop {
            let id = format!("H{}", self.next_cell);
            self.next_cell += 1;
            if self.networks.iter().all(|n| n.position(&id).is_none()) {
                break id;
            }
        }
    }

    pub(crate) fn reserve_cell_ids(&mut self, next_cell: usize) {
        self.next_cell = self.next_cell.max(next_cell);
    }

    pub(crate) fn next_cell(&self) -> usize {
        self.next_cell
    }

    #[inline]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    #[inline]
    pub fn networks(&self) -> &[Network] {
        &self.networks
    }

    #[inline]
    pub(crate) fn networks_mut(&mut self) -> &mut [Network] {
        &mut self.networks
    }

    /// Run every network once and sum their named outputs
    pub fn step(&mut self, inputs: &Inputs) -> Outputs {
        let mut out = self
            .outputs
            .iter()
            .map(|name| (name.clone(), 0.))
            .collect::<Outputs>();
        for network in self.networks.iter_mut() {
            network.step(inputs);
            for (name, v) in network.outputs() {
                if let Some(total) = out.get_mut(name) {
                    *total += v;
                }
            }
        }
        out
    }

    /// Zero the transient state of every cell, keeping genes and scores
    pub fn reset(&mut self) {
        for network in self.networks.iter_mut() {
            network.reset();
        }
    }

    /// Number of cells over every network
    pub fn genome_size(&self) -> usize {
        self.networks.iter().map(Network::len).sum()
    }

    pub fn connections_size(&self) -> usize {
        self.networks.iter().map(Network::connection_count).sum()
    }

    pub fn hidden_count(&self) -> usize {
        self.networks.iter().map(Network::hidden_count).sum()
    }

    /// Append a fitness value, keeping only the `keep` latest
    pub fn record_performance(&mut self, fitness: f64, keep: usize) {
        self.performance.push_back(fitness);
        while self.performance.len() > keep {
            self.performance.pop_front();
        }
    }

    pub fn performance(&self) -> &VecDeque<f64> {
        &self.performance
    }

    pub(crate) fn forget_performance(&mut self) {
        self.performance.clear();
    }

    /// Same genes and scores under a new id, with zeroed transient state
    pub fn clone_as(&self, id: u64) -> Self {
        let mut brain = self.clone();
        brain.id = id;
        brain.reset();
        brain
    }

    /// Deterministic fingerprint of the genes
    pub fn dna(&self) -> String {
        format!("{:016x}", fxhash::hash64(&self.get_as_template()))
    }

    /// Deregister every connection and drop every cell
    pub fn dispose(mut self) {
        for network in self.networks.iter_mut() {
            network.clear();
            assert_eq!(
                network.connection_count(),
                0,
                "network {} of brain {} leaked connections",
                network.id,
                self.id
            );
        }
        trace!(brain = self.id, "disposed");
    }

    pub fn check_integrity(&self) -> EvoResult<()> {
        for network in &self.networks {
            network.check_integrity()?;
            for (names, kind) in [(&self.inputs, CellKind::Input), (&self.outputs, CellKind::Output)] {
                for name in names {
                    if network.cell_by_id(name).map(|c| c.kind) != Some(kind) {
                        return Err(EvoError::Integrity {
                            network: network.id.clone(),
                            reason: format!("missing {kind} cell {name}"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get_as_template(&self) -> String {
        let mut out = format!(
            "BRAIN INPUTS={} OUTPUTS={} NEXTCELL={}\n",
            self.inputs.join(","),
            self.outputs.join(","),
            self.next_cell
        );
        for network in &self.networks {
            network.write_template(&mut out);
        }
        out
    }

    /// Parse a brain written by [Brain::get_as_template]. Connections are restored exactly as
    /// listed, in order, so that positional inputs keep their meaning.
    pub fn from_template(id: u64, text: &str) -> EvoResult<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(idx, t)| tokenize(idx + 1, t))
            .filter(|line| !line.is_empty());

        let header = lines
            .next()
            .ok_or_else(|| EvoError::template(0, "empty template"))?;
        if !header.starts_with(&["BRAIN"]) {
            return Err(EvoError::template(header.number, "expected a BRAIN header"));
        }
        let names = |key| -> EvoResult<Vec<String>> {
            let names = header.list(key)?;
            match names.iter().find(|n| !is_valid_name(n)) {
                Some(bad) => Err(EvoError::template(header.number, format!("invalid name {bad}"))),
                None => Ok(names.into_iter().map(String::from).collect()),
            }
        };
        let inputs = names("INPUTS")?;
        let outputs = names("OUTPUTS")?;
        let next_cell = header.parse::<usize>("NEXTCELL")?;

        let mut networks: Vec<Network> = Vec::new();
        for line in lines {
            if line.starts_with(&["ADD", "NETWORK"]) {
                networks.push(Network::new(line.required("ID")?));
                continue;
            }

            let network = networks
                .last_mut()
                .ok_or_else(|| EvoError::template(line.number, "line outside of a network"))?;
            if line.starts_with(&["ADD", "CELL"]) {
                let cell = Cell::from_template_line(&line)?;
                if !is_valid_name(&cell.id) {
                    return Err(EvoError::template(line.number, "invalid cell id"));
                }
                let id = cell.id.clone();
                network
                    .add_cell(cell)
                    .ok_or_else(|| EvoError::template(line.number, format!("duplicate cell {id}")))?;
            } else if line.starts_with(&["ADD", "CONNECTION"]) {
                let position = |key| -> EvoResult<usize> {
                    let id = line.required(key)?;
                    network
                        .position(id)
                        .ok_or_else(|| EvoError::template(line.number, format!("unknown cell {id}")))
                };
                let (from, to) = (position("FROM")?, position("TO")?);
                let weight = line.parse::<f64>("WEIGHT")?;
                network
                    .link(from, to, weight)
                    .ok_or_else(|| EvoError::template(line.number, "duplicate connection"))?;
            } else {
                return Err(EvoError::template(
                    line.number,
                    format!("unknown line kind {}", line.keywords.join(" ")),
                ));
            }
        }

        if networks.is_empty() {
            return Err(EvoError::template(0, "brain without networks"));
        }

        let brain = Self {
            inputs,
            outputs,
            networks,
            next_cell,
            provenance: Provenance::Templated,
            ..Self::bare(id, &[], &[], 0, ActivationFunction::Identity)
        };
        brain.check_integrity()?;
        Ok(brain)
    }

    pub fn to_string(&self) -> EvoResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> EvoResult<Self> {
        let brain: Self = serde_json::from_str(s)?;
        brain.check_integrity()?;
        Ok(brain)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> EvoResult<()> {
        fs::write(path, self.to_string()?)?;
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> EvoResult<Self> {
        Self::from_str(&fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assert_f64_approx;
    use rand::{rngs::StdRng, SeedableRng};
    use std::env::temp_dir;

    fn config() -> FrameworkConfig {
        FrameworkConfig {
            inputs: vec!["dx".into(), "dy".into()],
            outputs: vec!["left".into(), "fire".into()],
            population_size: 10,
            ..FrameworkConfig::default()
        }
    }

    fn inputs(pairs: &[(&str, f64)]) -> Inputs {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_bare() {
        let c = config();
        let brain = Brain::bare(3, &c.inputs, &c.outputs, 2, ActivationFunction::TanH);
        assert_eq!(brain.genome_size(), 8);
        assert_eq!(brain.connections_size(), 0);
        assert_eq!(brain.networks()[1].id, "N1");
        brain.check_integrity().unwrap();
    }

    #[test]
    fn test_random_respects_topology() {
        let c = config();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let brain = Brain::random(1, &c, &mut rng);
            brain.check_integrity().unwrap();
            assert_eq!(brain.hidden_count(), 4);
            assert!(brain.connections_size() >= 2);
            assert_eq!(brain.provenance, Provenance::Random);
            // every output is fed
            for name in brain.outputs() {
                let idx = brain.networks()[0].position(name).unwrap();
                assert!(!brain.networks()[0].cells()[idx].inbound().is_empty());
            }
        }
    }

    #[test]
    fn test_random_layered() {
        let c = FrameworkConfig {
            topology: InitialTopology::Layered { layers: vec![3, 2] },
            ..config()
        };
        let brain = Brain::random(1, &c, &mut StdRng::seed_from_u64(0));
        brain.check_integrity().unwrap();
        assert_eq!(brain.hidden_count(), 5);
        // 2x3 + 3x2 + 2x2
        assert_eq!(brain.connections_size(), 16);
        assert!(brain.networks()[0]
            .cells()
            .iter()
            .filter(|c| c.kind.is_hidden())
            .all(|c| c.kind == CellKind::Perceptron));
    }

    #[test]
    fn test_random_caps() {
        let c = FrameworkConfig {
            maximum_number_of_neurons: 2,
            topology: InitialTopology::Random {
                hidden: 2,
                connections: 100,
            },
            ..config()
        };
        let mut brain = Brain::random(1, &c, &mut StdRng::seed_from_u64(0));
        assert_eq!(brain.hidden_count(), 2);
        assert!(!brain.can_grow(0, &c));
        assert_eq!(
            brain.grow(0, CellKind::And, &c, &mut StdRng::seed_from_u64(0)),
            None
        );
    }

    #[test]
    fn test_step_sums_networks() {
        let c = config();
        let mut brain = Brain::bare(0, &c.inputs, &c.outputs, 2, ActivationFunction::Identity);
        for network in brain.networks_mut() {
            let dx = network.position("dx").unwrap();
            let left = network.position("left").unwrap();
            network.connect(dx, left, 0.5).unwrap();
        }
        let out = brain.step(&inputs(&[("dx", 2.)]));
        assert_f64_approx!(out["left"], 2.);
        assert_f64_approx!(out["fire"], 0.);

        brain.reset();
        assert!(brain.networks()[0].cells().iter().all(|c| c.state == 0.));
    }

    #[test]
    fn test_template_round_trip() {
        let c = config();
        let mut rng = StdRng::seed_from_u64(9);
        let brain = Brain::random(4, &c, &mut rng);
        let text = brain.get_as_template();
        let back = Brain::from_template(8, &text).unwrap();
        assert_eq!(back.id, 8);
        assert_eq!(back.provenance, Provenance::Templated);
        assert_eq!(back.get_as_template(), text);
        assert_eq!(back.dna(), brain.dna());

        let mut a = brain.clone();
        let mut b = back;
        let i = inputs(&[("dx", 0.3), ("dy", -0.7)]);
        for _ in 0..5 {
            assert_eq!(a.step(&i), b.step(&i));
        }
    }

    #[test]
    fn test_template_errors() {
        assert!(matches!(
            Brain::from_template(0, ""),
            Err(EvoError::Template { .. })
        ));
        let text = "BRAIN INPUTS=a OUTPUTS=b NEXTCELL=0\n\
            ADD NETWORK ID=N0\n\
            ADD CELL ID=a TYPELABEL=INPUT BIAS=0 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=IDENTITY\n\
            ADD CELL ID=b TYPELABEL=OUTPUT BIAS=0 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=TANH\n";
        Brain::from_template(0, text).unwrap();

        let unknown = format!("{text}REMOVE CELL ID=a\n");
        assert!(matches!(
            Brain::from_template(0, &unknown),
            Err(EvoError::Template { line: 5, .. })
        ));
        let dangling = format!("{text}ADD CONNECTION FROM=a TO=zz WEIGHT=1\n");
        assert!(matches!(
            Brain::from_template(0, &dangling),
            Err(EvoError::Template { line: 5, .. })
        ));
        let missing_output = text.replace("ID=b TYPELABEL=OUTPUT", "ID=c TYPELABEL=OUTPUT");
        assert!(matches!(
            Brain::from_template(0, &missing_output),
            Err(EvoError::Integrity { .. })
        ));
        let commented = format!("# saved brain\n\n{text}");
        Brain::from_template(0, &commented).unwrap();
    }

    #[test]
    fn test_template_rejects_illegal_self_connections() {
        let head = "BRAIN INPUTS=a OUTPUTS=b NEXTCELL=1\n\
            ADD NETWORK ID=N0\n\
            ADD CELL ID=a TYPELABEL=INPUT BIAS=0 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=IDENTITY\n\
            ADD CELL ID=b TYPELABEL=OUTPUT BIAS=0 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=TANH\n";

        let looped_if = format!(
            "{head}ADD CELL ID=H0 TYPELABEL=IF BIAS=0 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=TANH\n\
            ADD CONNECTION FROM=a TO=H0 WEIGHT=1\n\
            ADD CONNECTION FROM=H0 TO=H0 WEIGHT=1\n"
        );
        assert!(matches!(
            Brain::from_template(0, &looped_if),
            Err(EvoError::Integrity { .. })
        ));

        let transistor = format!(
            "{head}ADD CELL ID=H0 TYPELABEL=TRANSISTOR BIAS=0.5 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=TANH\n\
            ADD CONNECTION FROM=H0 TO=H0 WEIGHT=1\n"
        );
        assert!(matches!(
            Brain::from_template(0, &transistor),
            Err(EvoError::Integrity { .. })
        ));

        // a real input makes the transistor loop legal
        let fed = format!("{transistor}ADD CONNECTION FROM=a TO=H0 WEIGHT=1\n");
        Brain::from_template(0, &fed).unwrap();
    }

    #[test]
    fn test_json_keeps_weights_exact() {
        let c = config();
        let mut brain = Brain::bare(0, &c.inputs, &c.outputs, 1, ActivationFunction::TanH);
        let network = &mut brain.networks_mut()[0];
        network.connect(0, 2, -0.9675293457452888).unwrap();
        network.connect(1, 2, 0.1995093685275964).unwrap();
        network.cell_mut(2).unwrap().bias = 0.19950936852759638;

        let back = Brain::from_str(&brain.to_string().unwrap()).unwrap();
        let weights = |b: &Brain| {
            b.networks()[0]
                .connections()
                .map(|(_, c)| c.weight.to_bits())
                .collect::<Vec<_>>()
        };
        assert_eq!(weights(&back), weights(&brain));
        assert_eq!(
            back.networks()[0].cells()[2].bias.to_bits(),
            0.19950936852759638f64.to_bits()
        );
        assert_eq!(back.dna(), brain.dna());
    }

    #[test]
    fn test_fresh_cell_id_skips_taken() {
        let text = "BRAIN INPUTS=a OUTPUTS=b NEXTCELL=0\n\
            ADD NETWORK ID=N0\n\
            ADD CELL ID=a TYPELABEL=INPUT BIAS=0 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=IDENTITY\n\
            ADD CELL ID=b TYPELABEL=OUTPUT BIAS=0 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=TANH\n\
            ADD CELL ID=H0 TYPELABEL=AND BIAS=0 ACTIVATIONTHRESHOLD=0 ACTIVATIONFUNCTION=TANH\n";
        let mut brain = Brain::from_template(0, text).unwrap();
        assert_eq!(brain.fresh_cell_id(), "H1");
    }

    #[test]
    fn test_performance_history() {
        let mut brain = Brain::bare(0, &[], &[], 1, ActivationFunction::Identity);
        for f in 0..8 {
            brain.record_performance(f as f64, 5);
        }
        assert_eq!(brain.performance().iter().copied().collect::<Vec<_>>(), vec![3., 4., 5., 6., 7.]);
    }

    #[test]
    fn test_dispose_and_ids() {
        let mut ids = BrainIdGen::new(10);
        assert_eq!(ids.fresh(), 10);
        assert_eq!(ids.fresh(), 11);
        assert_eq!(ids.head, 12);

        let brain = Brain::random(ids.fresh(), &config(), &mut StdRng::seed_from_u64(2));
        let copy = brain.clone_as(99);
        assert_eq!(copy.id, 99);
        assert_eq!(copy.dna(), brain.dna());
        brain.dispose();
        copy.check_integrity().unwrap();
    }

    #[test]
    fn test_json_file() {
        let brain = Brain::random(2, &config(), &mut StdRng::seed_from_u64(4));
        let path = temp_dir().join(format!("cellevo-brain-{}.json", std::process::id()));
        brain.to_file(&path).unwrap();
        let back = Brain::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(back.get_as_template(), brain.get_as_template());
    }
}
