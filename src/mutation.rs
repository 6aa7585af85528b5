//! Genetic operators applied to a [Brain].
//!
//! Every operator picks one network of the brain at random and edits it in place. Operators
//! that cannot be applied legally leave the brain untouched and return `None`.

use crate::{
    config::FrameworkConfig,
    genome::{Brain, CellKind},
    network::Network,
    random::{signed_magnitude, uniform},
};
use core::fmt;
use rand::{
    seq::{IndexedRandom, IteratorRandom},
    Rng, RngCore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationMethod {
    ModifyBias,
    ModifyActivationFunction,
    ModifyThreshold,
    ModifyWeight,
    ModifyCellType,
    AddConnection,
    RemoveConnection,
    AddCell,
    RemoveCell,
    AddSelfConnection,
    RemoveSelfConnection,
}

impl MutationMethod {
    pub const ALL: [Self; 11] = [
        Self::ModifyBias,
        Self::ModifyActivationFunction,
        Self::ModifyThreshold,
        Self::ModifyWeight,
        Self::ModifyCellType,
        Self::AddConnection,
        Self::RemoveConnection,
        Self::AddCell,
        Self::RemoveCell,
        Self::AddSelfConnection,
        Self::RemoveSelfConnection,
    ];
}

impl fmt::Display for MutationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What an applied mutation changed
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub method: MutationMethod,
    pub network: usize,
    pub detail: String,
}

/// Position of a random cell matching `pred`
fn pick_cell(
    network: &Network,
    rng: &mut impl RngCore,
    pred: impl Fn(usize, CellKind) -> bool,
) -> Option<usize> {
    network
        .cells()
        .iter()
        .enumerate()
        .filter(|(idx, c)| pred(*idx, c.kind))
        .map(|(idx, _)| idx)
        .choose(rng)
}

/// Drop transistor self connections that lost their last real input
fn prune_stranded_self_connections(network: &mut Network) -> usize {
    let stranded = (0..network.len())
        .filter(|idx| {
            network.has_self_connection(*idx)
                && !network.cells()[*idx]
                    .kind
                    .allows_self_connection(network.real_inputs(*idx))
        })
        .collect::<Vec<_>>();
    for idx in &stranded {
        network.disconnect(*idx, *idx);
    }
    stranded.len()
}

impl Brain {
    /// Apply `method` once to a random network. Returns `None` when it is not applicable.
    pub fn mutate(
        &mut self,
        method: MutationMethod,
        config: &FrameworkConfig,
        rng: &mut impl RngCore,
    ) -> Option<MutationRecord> {
        if self.networks().is_empty() {
            return None;
        }
        let n = rng.random_range(0..self.networks().len());
        let detail = match method {
            MutationMethod::AddCell => self.add_cell(n, config, rng),
            MutationMethod::RemoveCell => self.remove_cell(n, config, rng),
            _ => mutate_network(&mut self.networks_mut()[n], method, config, rng),
        };

        match detail {
            Some(detail) => {
                debug!(brain = self.id, %method, network = n, %detail, "mutated");
                debug_assert!(self.check_integrity().is_ok(), "{method} broke brain {}", self.id);
                Some(MutationRecord {
                    method,
                    network: n,
                    detail,
                })
            }
            None => {
                trace!(brain = self.id, %method, network = n, "mutation rejected");
                None
            }
        }
    }

    /// Draw `mutation_amount` methods from the allowed set and apply each if legal
    pub fn mutate_many(
        &mut self,
        config: &FrameworkConfig,
        rng: &mut impl RngCore,
    ) -> Vec<MutationRecord> {
        (0..config.mutation_amount)
            .filter_map(|_| {
                let method = *config.allowed_mutations.choose(rng)?;
                self.mutate(method, config, rng)
            })
            .collect()
    }

    fn add_cell(
        &mut self,
        n: usize,
        config: &FrameworkConfig,
        rng: &mut impl RngCore,
    ) -> Option<String> {
        let kind = config.random_hidden_kind(rng)?;
        let idx = self.grow(n, kind, config, rng)?;
        let network = &mut self.networks_mut()[n];

        let source = pick_cell(network, rng, |from, _| from != idx && network.can_connect(from, idx));
        if let Some(from) = source {
            network.connect(from, idx, uniform(rng, config.initial_param_range));
        }
        let target = pick_cell(network, rng, |to, _| to != idx && network.can_connect(idx, to));
        if let Some(to) = target {
            network.connect(idx, to, uniform(rng, config.initial_param_range));
        }

        let id = |pos: Option<usize>| pos.map_or("-", |p| network.cells()[p].id.as_str());
        Some(format!(
            "{} {} ({} -> {})",
            kind,
            network.cells()[idx].id,
            id(source),
            id(target)
        ))
    }

    fn remove_cell(
        &mut self,
        n: usize,
        config: &FrameworkConfig,
        rng: &mut impl RngCore,
    ) -> Option<String> {
        let network = &mut self.networks_mut()[n];
        if network.hidden_count() <= config.minimum_number_of_neurons {
            return None;
        }

        let idx = pick_cell(network, rng, |_, kind| kind.is_hidden())?;
        let cell = network.remove_cell(idx)?;
        prune_stranded_self_connections(network);
        Some(format!("{} {}", cell.kind, cell.id))
    }
}

fn mutate_network(
    network: &mut Network,
    method: MutationMethod,
    config: &FrameworkConfig,
    rng: &mut impl RngCore,
) -> Option<String> {
    match method {
        MutationMethod::ModifyBias => {
            let idx = pick_cell(network, rng, |_, kind| kind != CellKind::Input)?;
            let delta = signed_magnitude(rng, config.bias_delta);
            let cell = network.cell_mut(idx)?;
            cell.bias += delta;
            Some(format!("{} bias {:+} = {}", cell.id, delta, cell.bias))
        }
        MutationMethod::ModifyThreshold => {
            let idx = pick_cell(network, rng, |_, kind| kind != CellKind::Input)?;
            let delta = signed_magnitude(rng, config.threshold_delta);
            let cell = network.cell_mut(idx)?;
            cell.threshold = (cell.threshold + delta).max(0.);
            Some(format!("{} threshold {:+} = {}", cell.id, delta, cell.threshold))
        }
        MutationMethod::ModifyActivationFunction => {
            let idx = pick_cell(network, rng, |_, kind| kind != CellKind::Input)?;
            let next = *config.allowed_activations.choose(rng)?;
            let cell = network.cell_mut(idx)?;
            let previous = cell.activation;
            cell.activation = next;
            Some(format!("{} {previous} -> {next}", cell.id))
        }
        MutationMethod::ModifyWeight => {
            let (slot, _) = network.connections().choose(rng)?;
            let key = network.key(slot)?;
            let delta = signed_magnitude(rng, config.weight_delta);
            let connection = network.connection_mut(slot)?;
            connection.weight += delta;
            Some(format!("{key} weight {:+} = {}", delta, connection.weight))
        }
        MutationMethod::ModifyCellType => {
            let idx = pick_cell(network, rng, |_, kind| kind.is_hidden())?;
            let cell = network.cell(idx)?;
            let (inbound, has_self, real) = (
                cell.inbound().len(),
                network.has_self_connection(idx),
                network.real_inputs(idx),
            );
            let previous = cell.kind;
            let next = config
                .allowed_hidden_kinds()
                .filter(|kind| {
                    *kind != previous
                        && inbound <= kind.maximum_inputs()
                        && (!has_self || kind.allows_self_connection(real))
                })
                .choose(rng)?;
            let cell = network.cell_mut(idx)?;
            cell.kind = next;
            Some(format!("{} {previous} -> {next}", cell.id))
        }
        MutationMethod::AddConnection => {
            let (from, to) = network.open_path(rng)?;
            let slot = network.connect(from, to, uniform(rng, config.initial_param_range))?;
            network.key(slot)
        }
        MutationMethod::RemoveConnection => {
            let (from, to) = network
                .connections()
                .filter(|(_, c)| !c.is_self())
                .map(|(_, c)| c.path())
                .choose(rng)?;
            let key = network.key(network.find(from, to)?)?;
            network.disconnect(from, to)?;
            prune_stranded_self_connections(network);
            Some(key)
        }
        MutationMethod::AddSelfConnection => {
            let idx = pick_cell(network, rng, |idx, _| network.can_connect(idx, idx))?;
            let slot = network.connect(idx, idx, uniform(rng, config.initial_param_range))?;
            network.key(slot)
        }
        MutationMethod::RemoveSelfConnection => {
            let idx = pick_cell(network, rng, |idx, _| network.has_self_connection(idx))?;
            let key = network.key(network.find(idx, idx)?)?;
            network.disconnect(idx, idx)?;
            Some(key)
        }
        MutationMethod::AddCell | MutationMethod::RemoveCell => None,
    }
}
