//! The strategy seam shared by every traversal order.

use rt_types::SearchKind;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::gradient::GradientSearch;
use crate::passive::{PassiveMode, PassiveSearch};
use crate::simplex::NelderMeadSearch;
use crate::space::{Point, SearchSpace};

/// One scored configuration. Lower scores are better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub point: Point,
    pub score: f64,
    /// Index of the function sample that produced the score.
    pub sample: usize,
}

impl Observation {
    pub fn new(point: Point, score: f64, sample: usize) -> Self {
        Self {
            point,
            score,
            sample,
        }
    }

    /// Domain index of the first contributing variable.
    pub fn primary(&self) -> Option<usize> {
        self.point.first().copied()
    }
}

/// Whether `candidate` should replace `incumbent` in a search cache: strictly
/// lower score, or an exact tie broken toward the greater primary index
/// when `prefer_right` is set.
pub fn improves(candidate: &Observation, incumbent: Option<&Observation>, prefer_right: bool) -> bool {
    if candidate.score.is_nan() {
        return false;
    }
    match incumbent {
        None => true,
        Some(best) => {
            candidate.score < best.score
                || (candidate.score == best.score
                    && prefer_right
                    && candidate.primary() > best.primary())
        }
    }
}

/// Parameters every strategy is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchContext {
    pub space: SearchSpace,
    /// Observations per evaluation pass; `None` derives it from the space.
    pub samples_per_pass: Option<usize>,
    pub prefer_right: bool,
    pub max_iterations: u32,
}

impl SearchContext {
    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            samples_per_pass: None,
            prefer_right: false,
            max_iterations: 32,
        }
    }

    pub fn with_samples_per_pass(mut self, samples: Option<usize>) -> Self {
        self.samples_per_pass = samples;
        self
    }

    pub fn with_prefer_right(mut self, prefer_right: bool) -> Self {
        self.prefer_right = prefer_right;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Common trait for all search strategies.
///
/// A strategy consumes scored observations in arrival order and, once its
/// evaluation pass is complete, proposes a winner. Driving strategies also
/// choose the next configuration to probe.
pub trait SearchStrategy: Send + Debug {
    /// Next configuration the strategy wants sampled, if it drives.
    fn next_probe(&mut self) -> Option<Point> {
        None
    }

    /// Report a scored configuration.
    fn observe(&mut self, observation: Observation);

    /// Best observation of the current pass so far.
    fn best(&self) -> Option<&Observation>;

    /// Winner of the current pass, once the pass is complete.
    fn proposal(&self) -> Option<&Observation>;

    /// Which indices of dimension `dim` the current pass has covered.
    fn visited(&self, _dim: usize) -> Option<&[bool]> {
        None
    }

    /// Start a new pass.
    fn reset(&mut self);

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Build the strategy for `kind`.
pub fn build_strategy(kind: SearchKind, context: SearchContext) -> Box<dyn SearchStrategy> {
    match kind {
        SearchKind::ExhaustiveOnTheFly => {
            Box::new(PassiveSearch::new(PassiveMode::OnTheFly, context))
        }
        SearchKind::ExhaustiveAfterComplete => {
            Box::new(PassiveSearch::new(PassiveMode::AfterComplete, context))
        }
        SearchKind::Random => Box::new(PassiveSearch::new(PassiveMode::Random, context)),
        SearchKind::NelderMead => Box::new(NelderMeadSearch::new(context)),
        SearchKind::BinaryGradient
        | SearchKind::QuaternaryGradient
        | SearchKind::OctalGradient
        | SearchKind::HexGradient => {
            let probes = kind.gradient_probes().unwrap_or(1);
            Box::new(GradientSearch::new(probes, context))
        }
    }
}
