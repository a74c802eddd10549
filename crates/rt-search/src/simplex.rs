//! Nelder–Mead simplex search restricted to a discrete index grid.
//!
//! Every candidate vertex is snapped to the nearest valid point. The search
//! is driven one probe at a time: whenever the next step needs the score of
//! a point not yet observed, that point becomes the pending probe.

use std::collections::HashMap;
use tracing::debug;

use crate::space::Point;
use crate::strategy::{improves, Observation, SearchContext, SearchStrategy};

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Init,
    Reflect,
    Expand { centroid: Vec<f64>, reflected: Point },
    Contract { centroid: Vec<f64>, reflected: Point },
    Shrink,
    Done,
}

#[derive(Debug, Clone)]
pub struct NelderMeadSearch {
    context: SearchContext,
    scores: HashMap<Point, Observation>,
    simplex: Vec<Point>,
    phase: Phase,
    pending: Option<Point>,
    iterations: u32,
    best: Option<Observation>,
    proposal: Option<Observation>,
}

impl NelderMeadSearch {
    pub fn new(context: SearchContext) -> Self {
        let simplex = Self::initial_simplex(&context);
        let mut search = Self {
            context,
            scores: HashMap::new(),
            simplex,
            phase: Phase::Init,
            pending: None,
            iterations: 0,
            best: None,
            proposal: None,
        };
        search.advance();
        search
    }

    fn initial_simplex(context: &SearchContext) -> Vec<Point> {
        let space = &context.space;
        let origin = space.center();
        let mut simplex = vec![origin.clone()];
        for (dim, &size) in space.dims().iter().enumerate() {
            let step = (size / 4).max(1);
            let mut vertex = origin.clone();
            vertex[dim] = if origin[dim] + step < size {
                origin[dim] + step
            } else {
                origin[dim].saturating_sub(step)
            };
            simplex.push(vertex);
        }
        simplex
    }

    fn score(&self, point: &Point) -> Option<f64> {
        self.scores.get(point).map(|o| o.score)
    }

    fn order(&mut self) {
        let scores = &self.scores;
        let prefer_right = self.context.prefer_right;
        self.simplex.sort_by(|a, b| {
            let (sa, sb) = (scores[a].score, scores[b].score);
            sa.partial_cmp(&sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| if prefer_right { b.cmp(a) } else { a.cmp(b) })
        });
    }

    fn centroid(&self) -> Vec<f64> {
        let n = self.simplex.len() - 1;
        let dims = self.context.space.len();
        let mut c = vec![0.0; dims];
        for vertex in &self.simplex[..n] {
            for (acc, &x) in c.iter_mut().zip(vertex) {
                *acc += x as f64;
            }
        }
        c.iter_mut().for_each(|x| *x /= n as f64);
        c
    }

    /// `from + coeff * (to - from)`, snapped to the grid.
    fn towards(&self, from: &[f64], to: &[f64], coeff: f64) -> Point {
        let raw: Vec<f64> = from
            .iter()
            .zip(to)
            .map(|(&a, &b)| a + coeff * (b - a))
            .collect();
        self.context.space.snap(&raw)
    }

    fn as_f64(point: &Point) -> Vec<f64> {
        point.iter().map(|&x| x as f64).collect()
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
        self.pending = None;
        self.proposal = self
            .simplex
            .first()
            .and_then(|p| self.scores.get(p).cloned())
            .or_else(|| self.best.clone());
        debug!(iterations = self.iterations, "nelder-mead pass complete");
    }

    fn replace_worst(&mut self, point: Point) {
        if let Some(worst) = self.simplex.last_mut() {
            *worst = point;
        }
        self.iterations += 1;
        self.phase = Phase::Reflect;
    }

    /// Run the state machine until it needs an unobserved point or is done.
    fn advance(&mut self) {
        if self.context.space.is_empty() {
            if self.best.is_some() {
                self.proposal = self.best.clone();
                self.phase = Phase::Done;
            }
            return;
        }
        loop {
            match self.phase.clone() {
                Phase::Done => return,
                Phase::Init => {
                    if let Some(missing) = self.simplex.iter().find(|p| self.score(p).is_none()) {
                        self.pending = Some(missing.clone());
                        return;
                    }
                    self.phase = Phase::Reflect;
                }
                Phase::Reflect => {
                    self.order();
                    let collapsed = self.simplex.windows(2).all(|w| w[0] == w[1]);
                    if collapsed || self.iterations >= self.context.max_iterations {
                        self.finish();
                        return;
                    }
                    let centroid = self.centroid();
                    let worst = Self::as_f64(&self.simplex[self.simplex.len() - 1]);
                    let reflected = self.towards(&centroid, &worst, -REFLECT);
                    let Some(fr) = self.score(&reflected) else {
                        self.pending = Some(reflected);
                        return;
                    };
                    let best = self.score(&self.simplex[0]).unwrap_or(f64::INFINITY);
                    let second_worst = self
                        .score(&self.simplex[self.simplex.len().saturating_sub(2)])
                        .unwrap_or(f64::INFINITY);
                    if fr < best {
                        self.phase = Phase::Expand {
                            centroid,
                            reflected,
                        };
                    } else if fr < second_worst {
                        self.replace_worst(reflected);
                    } else {
                        self.phase = Phase::Contract {
                            centroid,
                            reflected,
                        };
                    }
                }
                Phase::Expand {
                    centroid,
                    reflected,
                } => {
                    let expanded = self.towards(&centroid, &Self::as_f64(&reflected), EXPAND);
                    let Some(fe) = self.score(&expanded) else {
                        self.pending = Some(expanded);
                        return;
                    };
                    let fr = self.score(&reflected).unwrap_or(f64::INFINITY);
                    if fe < fr {
                        self.replace_worst(expanded);
                    } else {
                        self.replace_worst(reflected);
                    }
                }
                Phase::Contract { centroid, .. } => {
                    let worst_point = self.simplex[self.simplex.len() - 1].clone();
                    let contracted = self.towards(&centroid, &Self::as_f64(&worst_point), CONTRACT);
                    let Some(fc) = self.score(&contracted) else {
                        self.pending = Some(contracted);
                        return;
                    };
                    let fw = self.score(&worst_point).unwrap_or(f64::INFINITY);
                    if fc < fw {
                        self.replace_worst(contracted);
                    } else {
                        self.phase = Phase::Shrink;
                    }
                }
                Phase::Shrink => {
                    let best = Self::as_f64(&self.simplex[0]);
                    let shrunk: Vec<Point> = self
                        .simplex
                        .iter()
                        .map(|v| self.towards(&best, &Self::as_f64(v), SHRINK))
                        .collect();
                    if shrunk == self.simplex {
                        self.finish();
                        return;
                    }
                    if let Some(missing) = shrunk.iter().find(|p| self.score(p).is_none()) {
                        self.pending = Some(missing.clone());
                        return;
                    }
                    self.simplex = shrunk;
                    self.iterations += 1;
                    self.phase = Phase::Reflect;
                }
            }
        }
    }
}

impl SearchStrategy for NelderMeadSearch {
    fn next_probe(&mut self) -> Option<Point> {
        if self.phase == Phase::Done {
            return self.proposal.as_ref().map(|o| o.point.clone());
        }
        self.pending.clone()
    }

    fn observe(&mut self, observation: Observation) {
        if self.phase == Phase::Done && !self.context.space.is_empty() {
            return;
        }
        if observation.score.is_nan() {
            return;
        }
        if improves(&observation, self.best.as_ref(), self.context.prefer_right) {
            self.best = Some(observation.clone());
        }
        if self.context.space.contains(&observation.point) {
            if self.pending.as_ref() == Some(&observation.point) {
                self.pending = None;
            }
            self.scores.insert(observation.point.clone(), observation);
        }
        self.advance();
    }

    fn best(&self) -> Option<&Observation> {
        self.best.as_ref()
    }

    fn proposal(&self) -> Option<&Observation> {
        self.proposal.as_ref()
    }

    fn reset(&mut self) {
        self.scores.clear();
        self.simplex = Self::initial_simplex(&self.context);
        self.phase = Phase::Init;
        self.pending = None;
        self.iterations = 0;
        self.best = None;
        self.proposal = None;
        self.advance();
    }

    fn name(&self) -> &str {
        "nelder-mead"
    }
}
