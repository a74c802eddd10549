//! Gradient-sign bracketing over the sorted domain of the primary variable.
//!
//! Each round samples the midpoint of the current interval plus a number of
//! probes (1, 2, 4 or 8 for the binary, quaternary, octal and hex variants;
//! the single binary probe is the midpoint's right neighbour, the others are
//! symmetric around it), computes finite-difference gradients between
//! adjacent probes and keeps the sub-interval where the score stops
//! improving. Once the interval is small enough every remaining index is
//! probed.

use std::collections::BTreeMap;
use tracing::debug;

use crate::space::Point;
use crate::strategy::{improves, Observation, SearchContext, SearchStrategy};

/// Finite-difference slope between `(x1, f1)` and `(x2, f2)`; `None` when
/// the abscissae coincide.
pub fn gradient(x1: f64, f1: f64, x2: f64, f2: f64) -> Option<f64> {
    if x1 == x2 {
        return None;
    }
    Some((f2 - f1) / (x2 - x1))
}

#[derive(Debug, Clone)]
pub struct GradientSearch {
    probes: usize,
    context: SearchContext,
    lo: usize,
    hi: usize,
    round: Vec<usize>,
    final_round: bool,
    scores: BTreeMap<usize, Observation>,
    best: Option<Observation>,
    proposal: Option<Observation>,
}

impl GradientSearch {
    pub fn new(probes: usize, context: SearchContext) -> Self {
        let hi = context.space.dims().first().map_or(0, |d| d.saturating_sub(1));
        let mut search = Self {
            probes: probes.max(1),
            context,
            lo: 0,
            hi,
            round: Vec::new(),
            final_round: false,
            scores: BTreeMap::new(),
            best: None,
            proposal: None,
        };
        search.plan_round();
        search
    }

    fn plan_round(&mut self) {
        let (lo, hi, p) = (self.lo, self.hi, self.probes);
        if hi - lo <= p + 1 {
            self.round = (lo..=hi).collect();
            self.final_round = true;
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let mut points = if p == 1 {
            vec![mid, mid + 1]
        } else {
            let step = (hi - lo) as f64 / (p + 1) as f64;
            let half = (p / 2) as i64;
            (-half..=half)
                .map(|j| {
                    let x = mid as f64 + j as f64 * step;
                    (x.round() as i64).clamp(lo as i64, hi as i64) as usize
                })
                .collect()
        };
        points.sort_unstable();
        points.dedup();
        self.round = points;
        self.final_round = false;
    }

    fn round_scores(&self) -> Option<Vec<(usize, f64)>> {
        self.round
            .iter()
            .map(|x| self.scores.get(x).map(|o| (*x, o.score)))
            .collect()
    }

    /// Narrow `[lo, hi]` using the sign of the gradients between the scored
    /// probes of the finished round.
    fn narrow(&mut self, scored: &[(usize, f64)]) {
        let gradients: Vec<f64> = scored
            .windows(2)
            .filter_map(|w| gradient(w[0].0 as f64, w[0].1, w[1].0 as f64, w[1].1))
            .collect();
        let last = scored.len() - 1;
        let (lo, hi) = if self.probes == 1 {
            // Slope at the midpoint: negative means continue rightward.
            match gradients.first() {
                Some(&g) if g < 0.0 => (scored[last].0, self.hi),
                _ => (self.lo, scored[0].0),
            }
        } else {
            match gradients.iter().position(|&g| g >= 0.0) {
                Some(k) => {
                    let left = if k == 0 { self.lo } else { scored[k - 1].0 };
                    (left, scored[k + 1].0)
                }
                None => (scored[last.saturating_sub(1)].0, self.hi),
            }
        };
        debug!(from = ?(self.lo, self.hi), to = ?(lo, hi), "gradient narrowing");
        if (lo, hi) == (self.lo, self.hi) {
            // No progress: sweep what is left.
            self.round = (lo..=hi).collect();
            self.final_round = true;
            return;
        }
        self.lo = lo;
        self.hi = hi;
        self.plan_round();
    }

    fn point(&self, index: usize) -> Point {
        let mut point = vec![0; self.context.space.len().max(1)];
        point[0] = index;
        point
    }

    fn advance(&mut self) {
        while self.proposal.is_none() {
            let Some(scored) = self.round_scores() else {
                return;
            };
            if self.final_round || scored.len() < 2 {
                self.proposal = self.best.clone();
                return;
            }
            self.narrow(&scored);
        }
    }
}

impl SearchStrategy for GradientSearch {
    fn next_probe(&mut self) -> Option<Point> {
        if let Some(winner) = &self.proposal {
            return Some(winner.point.clone());
        }
        self.round
            .iter()
            .find(|x| !self.scores.contains_key(x))
            .map(|&x| self.point(x))
    }

    fn observe(&mut self, observation: Observation) {
        if self.proposal.is_some() || observation.score.is_nan() {
            return;
        }
        let Some(index) = observation.primary() else {
            return;
        };
        if improves(&observation, self.best.as_ref(), self.context.prefer_right) {
            self.best = Some(observation.clone());
        }
        self.scores.insert(index, observation);
        self.advance();
    }

    fn best(&self) -> Option<&Observation> {
        self.best.as_ref()
    }

    fn proposal(&self) -> Option<&Observation> {
        self.proposal.as_ref()
    }

    fn reset(&mut self) {
        self.lo = 0;
        self.hi = self
            .context
            .space
            .dims()
            .first()
            .map_or(0, |d| d.saturating_sub(1));
        self.scores.clear();
        self.best = None;
        self.proposal = None;
        self.plan_round();
    }

    fn name(&self) -> &str {
        match self.probes {
            1 => "binary-gradient",
            2 => "quaternary-gradient",
            4 => "octal-gradient",
            _ => "hex-gradient",
        }
    }
}
