//! The cell graph evaluated by a [crate::Brain].
//!
//! Connections live in a single slot arena with stable indices. Each cell keeps its inbound
//! and outbound views as lists of slots into that arena, and the registry maps a `(from, to)`
//! pair of cell positions to its slot. Every mutation goes through [Network::link] or
//! [Network::disconnect] so that the three views never drift apart.

pub mod activate;

use crate::{
    error::{EvoError, EvoResult},
    genome::{connection_key, Cell, CellKind, Connection},
};
use core::mem;
use fxhash::{FxHashMap, FxHashSet};
use rand::{seq::IteratorRandom, RngCore};
use serde::{Deserialize, Serialize};

/// Named external values, keyed by input cell id
pub type Inputs = FxHashMap<String, f64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "NetworkRepr")]
pub struct Network {
    pub id: String,
    cells: Vec<Cell>,
    connections: Vec<Option<Connection>>,
    free: Vec<usize>,
    #[serde(skip)]
    registry: FxHashMap<(usize, usize), usize>,
    #[serde(skip)]
    positions: FxHashMap<String, usize>,
    #[serde(skip)]
    scratch: Vec<f64>,
}

#[derive(Deserialize)]
struct NetworkRepr {
    id: String,
    cells: Vec<Cell>,
    connections: Vec<Option<Connection>>,
    free: Vec<usize>,
}

impl From<NetworkRepr> for Network {
    fn from(repr: NetworkRepr) -> Self {
        let mut network = Self {
            id: repr.id,
            cells: repr.cells,
            connections: repr.connections,
            free: repr.free,
            registry: FxHashMap::default(),
            positions: FxHashMap::default(),
            scratch: Vec::new(),
        };
        network.reindex();
        network
    }
}

impl Network {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cells: Vec::new(),
            connections: Vec::new(),
            free: Vec::new(),
            registry: FxHashMap::default(),
            positions: FxHashMap::default(),
            scratch: Vec::new(),
        }
    }

    fn reindex(&mut self) {
        self.registry = self
            .connections
            .iter()
            .enumerate()
            .filter_map(|(slot, c)| c.as_ref().map(|c| (c.path(), slot)))
            .collect();
        self.positions = self
            .cells
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.id.clone(), idx))
            .collect();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[inline]
    pub fn cell(&self, idx: usize) -> Option<&Cell> {
        self.cells.get(idx)
    }

    #[inline]
    pub fn cell_mut(&mut self, idx: usize) -> Option<&mut Cell> {
        self.cells.get_mut(idx)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn cell_by_id(&self, id: &str) -> Option<&Cell> {
        self.position(id).map(|idx| &self.cells[idx])
    }

    #[inline]
    pub fn connection(&self, slot: usize) -> Option<&Connection> {
        self.connections.get(slot)?.as_ref()
    }

    pub(crate) fn connection_mut(&mut self, slot: usize) -> Option<&mut Connection> {
        self.connections.get_mut(slot)?.as_mut()
    }

    /// Every live connection with its arena slot
    pub fn connections(&self) -> impl Iterator<Item = (usize, &Connection)> {
        self.connections
            .iter()
            .enumerate()
            .filter_map(|(slot, c)| c.as_ref().map(|c| (slot, c)))
    }

    #[inline]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Slot of the connection from -> to, if any
    #[inline]
    pub fn find(&self, from: usize, to: usize) -> Option<usize> {
        self.registry.get(&(from, to)).copied()
    }

    /// Human readable key of the connection in `slot`
    pub fn key(&self, slot: usize) -> Option<String> {
        let c = self.connection(slot)?;
        Some(connection_key(&self.cells[c.from].id, &self.cells[c.to].id))
    }

    pub fn hidden_count(&self) -> usize {
        self.cells.iter().filter(|c| c.kind.is_hidden()).count()
    }

    /// Inbound connections of `idx` coming from other cells
    pub fn real_inputs(&self, idx: usize) -> usize {
        self.cells.get(idx).map_or(0, |cell| {
            cell.inbound
                .iter()
                .filter(|slot| self.connection(**slot).is_some_and(|c| !c.is_self()))
                .count()
        })
    }

    #[inline]
    pub fn has_self_connection(&self, idx: usize) -> bool {
        self.registry.contains_key(&(idx, idx))
    }

    /// Append a cell, dropping any links it carried. Fails when the id is taken.
    pub fn add_cell(&mut self, mut cell: Cell) -> Option<usize> {
        if self.positions.contains_key(&cell.id) {
            return None;
        }
        cell.inbound.clear();
        cell.outbound.clear();
        let idx = self.cells.len();
        self.positions.insert(cell.id.clone(), idx);
        self.cells.push(cell);
        Some(idx)
    }

    /// Whether a new connection from -> to respects both endpoints' structural limits
    pub fn can_connect(&self, from: usize, to: usize) -> bool {
        let (Some(source), Some(target)) = (self.cells.get(from), self.cells.get(to)) else {
            return false;
        };
        if self.registry.contains_key(&(from, to))
            || source.outbound.len() >= source.kind.maximum_outputs()
            || target.inbound.len() >= target.kind.maximum_inputs()
        {
            return false;
        }

        from != to || target.kind.allows_self_connection(self.real_inputs(to))
    }

    /// Connect two cells if legal, returning the new connection's slot
    pub fn connect(&mut self, from: usize, to: usize, weight: f64) -> Option<usize> {
        if self.can_connect(from, to) {
            self.link(from, to, weight)
        } else {
            None
        }
    }

    /// Register a connection in all three views, checking only that both cells exist and
    /// that the pair is not already connected
    pub(crate) fn link(&mut self, from: usize, to: usize, weight: f64) -> Option<usize> {
        if from >= self.cells.len() || to >= self.cells.len() || self.registry.contains_key(&(from, to))
        {
            return None;
        }

        let connection = Connection::new(from, to, weight);
        let slot = match self.free.pop() {
            Some(slot) => {
                self.connections[slot] = Some(connection);
                slot
            }
            None => {
                self.connections.push(Some(connection));
                self.connections.len() - 1
            }
        };
        self.registry.insert((from, to), slot);
        self.cells[from].outbound.push(slot);
        self.cells[to].inbound.push(slot);
        Some(slot)
    }

    /// A random legal, not yet connected pair of distinct cells. Sources without any legal
    /// target are marked saturated and never drawn again.
    pub fn open_path(&self, rng: &mut impl RngCore) -> Option<(usize, usize)> {
        let mut saturated = FxHashSet::default();
        loop {
            let from = (0..self.cells.len())
                .filter(|from| {
                    let cell = &self.cells[*from];
                    cell.outbound.len() < cell.kind.maximum_outputs() && !saturated.contains(from)
                })
                .choose(rng)?;

            if let Some(to) = (0..self.cells.len())
                .filter(|to| *to != from && self.can_connect(from, *to))
                .choose(rng)
            {
                break Some((from, to));
            }

            saturated.insert(from);
        }
    }

    pub fn disconnect(&mut self, from: usize, to: usize) -> Option<Connection> {
        let slot = self.registry.remove(&(from, to))?;
        let connection = self.connections[slot].take()?;
        self.free.push(slot);
        self.cells[from].outbound.retain(|s| *s != slot);
        self.cells[to].inbound.retain(|s| *s != slot);
        Some(connection)
    }

    /// Deregister every connection touching `idx`, then remove the cell and shift the
    /// positions of every later cell down by one
    pub fn remove_cell(&mut self, idx: usize) -> Option<Cell> {
        let cell = self.cells.get(idx)?;
        let paths = cell
            .inbound
            .iter()
            .chain(cell.outbound.iter())
            .filter_map(|slot| self.connection(*slot).map(Connection::path))
            .collect::<Vec<_>>();
        for (from, to) in paths {
            self.disconnect(from, to);
        }

        let cell = self.cells.remove(idx);
        for c in self.connections.iter_mut().flatten() {
            if c.from > idx {
                c.from -= 1;
            }
            if c.to > idx {
                c.to -= 1;
            }
        }
        self.reindex();
        Some(cell)
    }

    /// Evaluate every cell once: inputs first, then hidden cells, then outputs, each group in
    /// array order. Cells read the latest activation of their sources, and self connections
    /// read the state committed at the end of the previous step.
    pub fn step(&mut self, inputs: &Inputs) {
        for cell in self.cells.iter_mut() {
            cell.previous_state = cell.state;
        }

        let mut scratch = mem::take(&mut self.scratch);
        for phase in [Phase::Input, Phase::Hidden, Phase::Output] {
            for idx in 0..self.cells.len() {
                if Phase::of(self.cells[idx].kind) != phase {
                    continue;
                }
                if phase == Phase::Input {
                    let cell = &mut self.cells[idx];
                    cell.state = inputs.get(cell.id.as_str()).copied().unwrap_or(0.);
                }

                scratch.clear();
                for slot in &self.cells[idx].inbound {
                    if let Some(c) = &self.connections[*slot] {
                        let v = if c.is_self() {
                            self.cells[idx].previous_state
                        } else {
                            self.cells[c.from].last_activation
                        };
                        scratch.push(v * c.weight);
                    }
                }
                self.cells[idx].activate(&scratch);
            }
        }
        self.scratch = scratch;
    }

    /// Latest activation of every output cell
    pub fn outputs(&self) -> impl Iterator<Item = (&str, f64)> {
        self.cells
            .iter()
            .filter(|c| c.kind == CellKind::Output)
            .map(|c| (c.id.as_str(), c.last_activation))
    }

    /// Zero the transient state of every cell
    pub fn reset(&mut self) {
        for cell in self.cells.iter_mut() {
            cell.reset();
        }
    }

    /// Remove every cell through [Network::remove_cell], leaving nothing registered
    pub fn clear(&mut self) {
        while let Some(last) = self.cells.len().checked_sub(1) {
            self.remove_cell(last);
        }
        debug_assert!(self.registry.is_empty());
        debug_assert!(self.connections.iter().all(Option::is_none));
        self.connections.clear();
        self.free.clear();
    }

    fn violation(&self, reason: impl Into<String>) -> EvoError {
        EvoError::Integrity {
            network: self.id.clone(),
            reason: reason.into(),
        }
    }

    /// Verify that every connection resolves to live cells and appears exactly in the
    /// registry and both endpoint views
    pub fn check_integrity(&self) -> EvoResult<()> {
        let len = self.cells.len();
        let mut live = 0;
        for (slot, c) in self.connections.iter().enumerate() {
            let Some(c) = c else {
                if !self.free.contains(&slot) {
                    return Err(self.violation(format!("slot {slot} is neither live nor free")));
                }
                continue;
            };
            live += 1;

            if c.from >= len || c.to >= len {
                return Err(self.violation(format!(
                    "connection {slot} ({} -> {}) dangles",
                    c.from, c.to
                )));
            }
            if self.registry.get(&c.path()) != Some(&slot) {
                return Err(self.violation(format!("connection {slot} is not registered")));
            }
            if !self.cells[c.from].outbound.contains(&slot) {
                return Err(self.violation(format!("connection {slot} missing from outbound")));
            }
            if !self.cells[c.to].inbound.contains(&slot) {
                return Err(self.violation(format!("connection {slot} missing from inbound")));
            }
        }
        if live != self.registry.len() {
            return Err(self.violation(format!(
                "{} registered connections but {live} live",
                self.registry.len()
            )));
        }

        for (idx, cell) in self.cells.iter().enumerate() {
            if !cell
                .inbound
                .iter()
                .all(|slot| self.connection(*slot).is_some_and(|c| c.to == idx))
            {
                return Err(self.violation(format!("{} has a stale inbound slot", cell.id)));
            }
            if !cell
                .outbound
                .iter()
                .all(|slot| self.connection(*slot).is_some_and(|c| c.from == idx))
            {
                return Err(self.violation(format!("{} has a stale outbound slot", cell.id)));
            }
            if cell.inbound.len() > cell.kind.maximum_inputs()
                || cell.outbound.len() > cell.kind.maximum_outputs()
            {
                return Err(self.violation(format!("{} exceeds its connection limits", cell.id)));
            }
            if self.has_self_connection(idx)
                && !cell.kind.allows_self_connection(self.real_inputs(idx))
            {
                return Err(self.violation(format!("{} may not feed itself", cell.id)));
            }
            if self.positions.get(&cell.id) != Some(&idx) {
                return Err(self.violation(format!("{} is not indexed at {idx}", cell.id)));
            }
        }
        if self.positions.len() != len {
            return Err(self.violation("duplicate cell ids"));
        }

        Ok(())
    }

    pub fn write_template(&self, out: &mut String) {
        out.push_str(&format!("ADD NETWORK ID={}\n", self.id));
        for cell in &self.cells {
            out.push_str(&cell.to_template_line());
            out.push('\n');
        }
        // per target, in inbound order, so that condition and base inputs keep their place
        for cell in &self.cells {
            for c in cell.inbound.iter().filter_map(|slot| self.connection(*slot)) {
                out.push_str(&c.to_template_line(&self.cells[c.from].id, &cell.id));
                out.push('\n');
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Input,
    Hidden,
    Output,
}

impl Phase {
    fn of(kind: CellKind) -> Self {
        match kind {
            CellKind::Input => Self::Input,
            CellKind::Output => Self::Output,
            _ => Self::Hidden,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{activate::ActivationFunction, assert_f64_approx};

    fn cell(id: &str, kind: CellKind, bias: f64) -> Cell {
        Cell::new(id, kind, bias, ActivationFunction::Identity, 0.)
    }

    /// a -> h -> out, b unconnected
    fn simple() -> Network {
        let mut n = Network::new("N0");
        n.add_cell(cell("a", CellKind::Input, 0.)).unwrap();
        n.add_cell(cell("b", CellKind::Input, 0.)).unwrap();
        n.add_cell(cell("out", CellKind::Output, 0.)).unwrap();
        n.add_cell(cell("h", CellKind::Perceptron, 0.5)).unwrap();
        n.connect(0, 3, 2.).unwrap();
        n.connect(3, 2, 1.).unwrap();
        n
    }

    fn inputs(pairs: &[(&str, f64)]) -> Inputs {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_connect_keeps_views_consistent() {
        let mut n = simple();
        n.check_integrity().unwrap();
        assert_eq!(n.connection_count(), 2);

        let slot = n.find(0, 3).unwrap();
        assert_eq!(n.cells()[0].outbound(), &[slot]);
        assert_eq!(n.cells()[3].inbound(), &[slot]);
        assert_eq!(n.key(slot).unwrap(), "a->h");

        n.disconnect(0, 3).unwrap();
        n.check_integrity().unwrap();
        assert!(n.cells()[0].outbound().is_empty());
        assert!(n.cells()[3].inbound().is_empty());
        assert_eq!(n.find(0, 3), None);

        // freed slots are reused
        assert_eq!(n.connect(1, 3, 1.), Some(slot));
        n.check_integrity().unwrap();
    }

    #[test]
    fn test_illegal_connections() {
        let mut n = simple();
        // inputs cannot be fed, outputs cannot feed
        assert_eq!(n.connect(3, 0, 1.), None);
        assert_eq!(n.connect(2, 3, 1.), None);
        // no duplicates
        assert_eq!(n.connect(0, 3, 1.), None);
        // out of range
        assert_eq!(n.connect(0, 99, 1.), None);
        n.check_integrity().unwrap();
    }

    #[test]
    fn test_if_limits() {
        let mut n = simple();
        let cond = n.add_cell(cell("if", CellKind::If, 0.)).unwrap();
        assert_eq!(n.connect(cond, cond, 1.), None);
        n.connect(0, cond, 1.).unwrap();
        n.connect(1, cond, 1.).unwrap();
        n.connect(3, cond, 1.).unwrap();
        let extra = n.add_cell(cell("p", CellKind::Perceptron, 0.)).unwrap();
        assert_eq!(n.connect(extra, cond, 1.), None);
        assert_eq!(n.connect(cond, cond, 1.), None);
    }

    #[test]
    fn test_transistor_self_needs_real_input() {
        let mut n = simple();
        let t = n.add_cell(cell("t", CellKind::Transistor, 0.5)).unwrap();
        assert!(!n.can_connect(t, t));
        n.connect(0, t, 1.).unwrap();
        assert!(n.can_connect(t, t));
        n.connect(t, t, 1.).unwrap();
        assert!(n.has_self_connection(t));
        assert_eq!(n.real_inputs(t), 1);
    }

    #[test]
    fn test_remove_cell_remaps() {
        let mut n = simple();
        let p = n.add_cell(cell("p", CellKind::Perceptron, 0.)).unwrap();
        n.connect(0, p, 1.).unwrap();
        n.connect(p, 2, 1.).unwrap();
        n.connect(p, p, 1.).unwrap();

        let removed = n.remove_cell(3).unwrap();
        assert_eq!(removed.id, "h");
        assert!(removed.inbound().is_empty());
        n.check_integrity().unwrap();
        assert_eq!(n.len(), 4);
        assert_eq!(n.position("p"), Some(3));
        assert_eq!(n.connection_count(), 3);
        assert!(n.find(0, 3).is_some());
        assert!(n.find(3, 2).is_some());
        assert!(n.has_self_connection(3));
    }

    #[test]
    fn test_step_feeds_forward() {
        let mut n = simple();
        n.step(&inputs(&[("a", 0.25)]));
        // h = 0.5 + 0.25 * 2, out = 1.0 * h
        assert_f64_approx!(n.cells()[3].state, 1.);
        let out = n.outputs().collect::<Vec<_>>();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "out");
        assert_f64_approx!(out[0].1, 1.);
    }

    #[test]
    fn test_self_connection_reads_previous_state() {
        let mut n = simple();
        n.connect(3, 3, 1.).unwrap();
        let i = inputs(&[("a", 0.)]);
        n.step(&i);
        assert_f64_approx!(n.cells()[3].state, 0.5);
        n.step(&i);
        assert_f64_approx!(n.cells()[3].state, 1.0);
        n.step(&i);
        assert_f64_approx!(n.cells()[3].state, 1.5);

        n.reset();
        assert!(n.cells().iter().all(|c| c.state == 0. && c.last_activation == 0.));
    }

    #[test]
    fn test_unconnected_cell_keeps_state() {
        let mut n = simple();
        let m = n.add_cell(cell("m", CellKind::Max, 1.)).unwrap();
        n.connect(0, m, 1.).unwrap();
        n.step(&inputs(&[("a", 3.)]));
        assert_eq!(n.cells()[m].state, 0.);
        assert_eq!(n.cells()[m].last_activation, 0.);
    }

    #[test]
    fn test_open_path() {
        let mut n = simple();
        let mut rng = crate::random::default_rng();
        for _ in 0..100 {
            let (from, to) = n.open_path(&mut rng).unwrap();
            assert_ne!(from, to);
            assert!(n.can_connect(from, to));
        }

        // saturate every source
        n.connect(0, 2, 1.).unwrap();
        n.connect(1, 3, 1.).unwrap();
        n.connect(1, 2, 1.).unwrap();
        assert_eq!(n.open_path(&mut rng), None);
    }

    #[test]
    fn test_clear_deregisters_everything() {
        let mut n = simple();
        n.connect(3, 3, 1.).unwrap();
        n.clear();
        assert!(n.is_empty());
        assert_eq!(n.connection_count(), 0);
        n.check_integrity().unwrap();
    }

    #[test]
    fn test_serde_rebuilds_registry() {
        let mut n = simple();
        n.disconnect(0, 3).unwrap();
        n.connect(1, 3, -1.).unwrap();
        let json = serde_json::to_string(&n).unwrap();
        let back: Network = serde_json::from_str(&json).unwrap();
        back.check_integrity().unwrap();
        assert_eq!(back.find(1, 3), n.find(1, 3));
        assert_eq!(back.position("out"), Some(2));
    }

    #[test]
    fn test_integrity_detects_stale_view() {
        let mut n = simple();
        n.cells[3].inbound.push(42);
        assert!(matches!(
            n.check_integrity(),
            Err(EvoError::Integrity { .. })
        ));
    }

    #[test]
    fn test_integrity_rejects_illegal_self_connections() {
        let mut n = simple();
        let cond = n.add_cell(cell("if", CellKind::If, 0.)).unwrap();
        n.connect(0, cond, 1.).unwrap();
        n.link(cond, cond, 1.).unwrap();
        assert!(matches!(
            n.check_integrity(),
            Err(EvoError::Integrity { .. })
        ));
        n.disconnect(cond, cond).unwrap();
        n.check_integrity().unwrap();

        // no real input yet
        let t = n.add_cell(cell("t", CellKind::Transistor, 0.5)).unwrap();
        n.link(t, t, 1.).unwrap();
        assert!(n.check_integrity().is_err());
        n.connect(0, t, 1.).unwrap();
        n.check_integrity().unwrap();
    }

    #[test]
    fn test_template_keeps_inbound_order() {
        let mut n = simple();
        let t = n.add_cell(cell("t", CellKind::Transistor, 0.5)).unwrap();
        n.connect(3, t, 1.).unwrap();
        n.connect(0, t, 1.).unwrap();
        let mut text = String::new();
        n.write_template(&mut text);
        let h = text.find("FROM=h TO=t").unwrap();
        let a = text.find("FROM=a TO=t").unwrap();
        assert!(h < a);
        assert!(text.starts_with("ADD NETWORK ID=N0\n"));
    }
}
