//! Discrete search space over variable domain indices.

use serde::{Deserialize, Serialize};

/// A configuration: one domain index per contributing variable.
pub type Point = Vec<usize>;

/// The search space: the domain size of every contributing variable, in
/// the order the objective lists them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    dims: Vec<usize>,
}

impl SearchSpace {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Total number of configurations, `None` on overflow.
    pub fn size(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d.max(1)))
    }

    pub fn contains(&self, point: &[usize]) -> bool {
        point.len() == self.dims.len() && point.iter().zip(&self.dims).all(|(p, d)| p < d)
    }

    /// Round a continuous position to the nearest valid point.
    pub fn snap(&self, position: &[f64]) -> Point {
        position
            .iter()
            .zip(&self.dims)
            .map(|(&x, &d)| {
                let hi = d.saturating_sub(1) as f64;
                x.round().clamp(0.0, hi) as usize
            })
            .collect()
    }

    /// The point at the middle of every dimension.
    pub fn center(&self) -> Point {
        self.dims.iter().map(|d| d.saturating_sub(1) / 2).collect()
    }
}
