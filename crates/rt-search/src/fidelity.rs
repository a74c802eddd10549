//! Convergence tracking across evaluation windows.

use serde::{Deserialize, Serialize};

/// Absolute-tolerance comparison. Equal infinities are within tolerance.
pub fn within(a: f64, b: f64, tolerance: f64) -> bool {
    a == b || (a - b).abs() <= tolerance
}

/// A candidate is confirmed when every neighbouring sample sharing its
/// configuration scores within `tolerance` of it.
pub fn lookup_confirms(candidate: f64, neighbours: &[f64], tolerance: f64) -> bool {
    !candidate.is_nan() && neighbours.iter().all(|&n| within(candidate, n, tolerance))
}

/// Counts consecutive confirmed windows whose winning score stays within
/// tolerance of the previous window's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidelityTracker {
    tolerance: f64,
    window: u32,
    previous: Option<(f64, Option<usize>)>,
    streak: u32,
}

impl FidelityTracker {
    pub fn new(tolerance: f64, window: u32) -> Self {
        Self {
            tolerance: tolerance.max(0.0),
            window: window.max(1),
            previous: None,
            streak: 0,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Record the outcome of one evaluation window. `identity` distinguishes
    /// winners whose scores are not comparable across windows (the winning
    /// function of a selection objective). Returns whether the streak has
    /// reached the fidelity window.
    pub fn record(&mut self, score: f64, identity: Option<usize>, confirmed: bool) -> bool {
        if !confirmed {
            self.streak = 0;
            self.previous = None;
            return false;
        }
        self.streak = match self.previous {
            Some((prev, prev_id)) if prev_id == identity && within(prev, score, self.tolerance) => {
                self.streak + 1
            }
            _ => 1,
        };
        self.previous = Some((score, identity));
        self.streak >= self.window
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.streak = 0;
    }
}
