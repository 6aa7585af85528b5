//! The live collection of brains and its persistence.

use crate::{
    error::{EvoError, EvoResult},
    genome::Brain,
};
use std::{fs::read_dir, path::Path};

/// Brains of one generation, kept in rank order once scored
#[derive(Debug, Clone, Default)]
pub struct Population(Vec<Brain>);

impl Population {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Brain> {
        self.0.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Brain> {
        self.0.iter_mut().find(|b| b.id == id)
    }

    #[inline]
    pub fn brains(&self) -> &[Brain] {
        &self.0
    }

    #[inline]
    pub fn brains_mut(&mut self) -> &mut [Brain] {
        &mut self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Brain> {
        self.0.iter()
    }

    /// Scores in the current order
    pub fn scores(&self) -> Vec<f64> {
        self.0.iter().map(|b| b.score).collect()
    }

    /// Highest score first. Stable, so equal scores keep their order.
    pub fn sort_by_score(&mut self) {
        self.0.sort_by(|l, r| r.score.total_cmp(&l.score));
    }

    pub fn push(&mut self, brain: Brain) {
        self.0.push(brain);
    }

    pub fn into_vec(self) -> Vec<Brain> {
        self.0
    }
}

impl From<Vec<Brain>> for Population {
    fn from(brains: Vec<Brain>) -> Self {
        Self(brains)
    }
}

impl FromIterator<Brain> for Population {
    fn from_iter<T: IntoIterator<Item = Brain>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Write every brain of `population` as `<idx>.json` inside the directory at `path`
pub fn population_to_files<P: AsRef<Path>>(path: P, population: &Population) -> EvoResult<()> {
    for (idx, brain) in population.iter().enumerate() {
        brain.to_file(path.as_ref().join(format!("{idx}.json")))?;
    }

    Ok(())
}

/// Load every brain file inside the directory at `path`, in file name order, along with the
/// next unused brain id
pub fn population_from_files<P: AsRef<Path>>(path: P) -> EvoResult<(Population, u64)> {
    let mut paths = read_dir(path)?
        .map(|entry| Ok::<_, EvoError>(entry?.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();

    let brains = paths
        .into_iter()
        .map(Brain::from_file)
        .collect::<Result<Vec<_>, _>>()?;
    if brains.is_empty() {
        return Err(EvoError::EmptyPopulation);
    }

    let id_head = brains.iter().map(|b| b.id + 1).max().unwrap_or(0);
    Ok((Population(brains), id_head))
}
