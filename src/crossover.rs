//! Heuristic recombination of two brains.
//!
//! Cells are aligned by id within networks of the same index. The fitter parent supplies the
//! structure, matching genes are inherited from either parent with equal odds, and genes
//! present only in the weaker parent may be imported.

use crate::genome::{Brain, Provenance};
use rand::{Rng, RngCore};
use tracing::trace;

pub fn genes_crossover(
    parent1: &Brain,
    parent2: &Brain,
    allow_mutation: bool,
    id: u64,
    rng: &mut impl RngCore,
) -> Brain {
    let (fit, weak) = if parent2.fitness > parent1.fitness {
        (parent2, parent1)
    } else {
        (parent1, parent2)
    };

    let mut child = fit.clone_as(id);
    child.reserve_cell_ids(weak.next_cell());
    child.provenance = Provenance::Offspring;
    child.fitness = (parent1.fitness + parent2.fitness) / 2.;
    child.score = child.fitness;
    child.real_score = 0.;
    child.real_best_score = 0.;
    child.forget_performance();

    let cap = fit.genome_size().max(weak.genome_size());
    let mut total = child.genome_size();
    let mut imported = 0;

    for (n, network) in child.networks_mut().iter_mut().enumerate() {
        let Some(other) = weak.networks().get(n) else {
            continue;
        };

        for idx in 0..network.len() {
            let Some(cell) = network.cell_mut(idx) else {
                continue;
            };
            if let Some(theirs) = other.cell_by_id(&cell.id) {
                if rng.random_bool(0.5) {
                    cell.bias = theirs.bias;
                    cell.activation = theirs.activation;
                    cell.threshold = theirs.threshold;
                }
            }
        }

        let ours = network
            .connections()
            .map(|(slot, c)| {
                let cells = network.cells();
                (slot, cells[c.from].id.clone(), cells[c.to].id.clone())
            })
            .collect::<Vec<_>>();
        for (slot, from, to) in ours {
            let theirs = other
                .position(&from)
                .zip(other.position(&to))
                .and_then(|(f, t)| other.find(f, t))
                .and_then(|slot| other.connection(slot));
            if let Some(theirs) = theirs {
                if rng.random_bool(0.5) {
                    if let Some(c) = network.connection_mut(slot) {
                        c.weight = theirs.weight;
                    }
                }
            }
        }

        if !allow_mutation {
            continue;
        }

        let hidden_cap = network.hidden_count().max(other.hidden_count());
        for cell in other.cells() {
            if total >= cap || network.hidden_count() >= hidden_cap {
                break;
            }
            if cell.kind.is_hidden() && network.position(&cell.id).is_none() && rng.random_bool(0.5)
            {
                network.add_cell(cell.detached());
                total += 1;
                imported += 1;
            }
        }

        // in the weaker parent's inbound order so positional inputs keep their place
        for (to_idx, cell) in other.cells().iter().enumerate() {
            let Some(to) = network.position(&cell.id) else {
                continue;
            };
            for slot in cell.inbound() {
                let Some(c) = other.connection(*slot) else {
                    continue;
                };
                debug_assert_eq!(c.to, to_idx);
                let Some(from) = network.position(&other.cells()[c.from].id) else {
                    continue;
                };
                if network.find(from, to).is_none()
                    && rng.random_bool(0.5)
                    && network.connect(from, to, c.weight).is_some()
                {
                    imported += 1;
                }
            }
        }
    }

    trace!(
        child = id,
        fit = fit.id,
        weak = weak.id,
        imported,
        "crossover"
    );
    debug_assert!(child.check_integrity().is_ok());
    child
}
