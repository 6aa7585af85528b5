use serde::{Deserialize, Serialize};

/// A directed, weighted edge between two cells of the same network, addressed by their
/// positions in the network's cell array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
}

impl Connection {
    pub fn new(from: usize, to: usize, weight: f64) -> Self {
        Self { from, to, weight }
    }

    /// A self connection reads its cell's previous state instead of another cell
    pub fn is_self(&self) -> bool {
        self.from == self.to
    }

    pub fn path(&self) -> (usize, usize) {
        (self.from, self.to)
    }

    pub fn to_template_line(&self, from_id: &str, to_id: &str) -> String {
        format!(
            "ADD CONNECTION FROM={from_id} TO={to_id} WEIGHT={}",
            self.weight
        )
    }
}

/// Stable, human readable key of a connection between two cell ids
pub fn connection_key(from_id: &str, to_id: &str) -> String {
    format!("{from_id}->{to_id}")
}
