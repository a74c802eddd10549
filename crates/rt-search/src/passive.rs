//! Strategies that take configurations in whatever order the variables
//! produce them: exhaustive (incremental or deferred) and random.

use crate::space::SearchSpace;
use crate::strategy::{improves, Observation, SearchContext, SearchStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveMode {
    /// Update the cache as each observation arrives.
    OnTheFly,
    /// Hold observations until the pass is complete, then scan once.
    AfterComplete,
    /// Like `OnTheFly`, but a pass is a count of observations rather than
    /// coverage of every index, since random draws may repeat.
    Random,
}

#[derive(Debug, Clone)]
pub struct PassiveSearch {
    mode: PassiveMode,
    context: SearchContext,
    best: Option<Observation>,
    pending: Vec<Observation>,
    covered: Vec<Vec<bool>>,
    observed: usize,
    proposal: Option<Observation>,
}

impl PassiveSearch {
    pub fn new(mode: PassiveMode, context: SearchContext) -> Self {
        let covered = Self::empty_coverage(&context.space);
        Self {
            mode,
            context,
            best: None,
            pending: Vec::new(),
            covered,
            observed: 0,
            proposal: None,
        }
    }

    fn empty_coverage(space: &SearchSpace) -> Vec<Vec<bool>> {
        space.dims().iter().map(|&d| vec![false; d]).collect()
    }

    fn pass_complete(&self) -> bool {
        if let Some(n) = self.context.samples_per_pass {
            return self.observed >= n.max(1);
        }
        if self.context.space.is_empty() {
            return self.observed >= 1;
        }
        match self.mode {
            PassiveMode::Random => {
                let size = self.context.space.size().unwrap_or(usize::MAX);
                self.observed >= size
            }
            PassiveMode::OnTheFly | PassiveMode::AfterComplete => {
                self.covered.iter().all(|dim| dim.iter().all(|&c| c))
            }
        }
    }

    fn consider(&mut self, observation: Observation) {
        if improves(&observation, self.best.as_ref(), self.context.prefer_right) {
            self.best = Some(observation);
        }
    }
}

impl SearchStrategy for PassiveSearch {
    fn observe(&mut self, observation: Observation) {
        if self.proposal.is_some() {
            return;
        }
        self.observed += 1;
        if self.context.space.contains(&observation.point) {
            for (dim, &index) in observation.point.iter().enumerate() {
                self.covered[dim][index] = true;
            }
        }
        match self.mode {
            PassiveMode::AfterComplete => self.pending.push(observation),
            PassiveMode::OnTheFly | PassiveMode::Random => self.consider(observation),
        }
        if self.pass_complete() {
            for pending in std::mem::take(&mut self.pending) {
                self.consider(pending);
            }
            self.proposal = self.best.clone();
        }
    }

    fn best(&self) -> Option<&Observation> {
        self.best.as_ref()
    }

    fn proposal(&self) -> Option<&Observation> {
        self.proposal.as_ref()
    }

    fn visited(&self, dim: usize) -> Option<&[bool]> {
        self.covered.get(dim).map(Vec::as_slice)
    }

    fn reset(&mut self) {
        self.best = None;
        self.pending.clear();
        self.covered = Self::empty_coverage(&self.context.space);
        self.observed = 0;
        self.proposal = None;
    }

    fn name(&self) -> &str {
        match self.mode {
            PassiveMode::OnTheFly => "exhaustive-on-the-fly",
            PassiveMode::AfterComplete => "exhaustive-after-complete",
            PassiveMode::Random => "random",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(search: &mut PassiveSearch, values: &[f64]) {
        for (i, &v) in values.iter().enumerate() {
            search.observe(Observation::new(vec![i], v, i));
        }
    }

    #[test]
    fn on_the_fly_proposes_after_full_coverage() {
        let ctx = SearchContext::new(SearchSpace::new(vec![4]));
        let mut search = PassiveSearch::new(PassiveMode::OnTheFly, ctx);
        feed(&mut search, &[3.0, 1.0, 2.0]);
        assert_eq!(search.best().map(|o| o.sample), Some(1));
        assert!(search.proposal().is_none());
        search.observe(Observation::new(vec![3], 5.0, 3));
        let winner = search.proposal().unwrap();
        assert_eq!(winner.point, vec![1]);
        assert_eq!(winner.score, 1.0);
    }

    #[test]
    fn after_complete_defers_cache_updates() {
        let ctx = SearchContext::new(SearchSpace::new(vec![3]));
        let mut search = PassiveSearch::new(PassiveMode::AfterComplete, ctx);
        feed(&mut search, &[2.0, 0.5]);
        assert!(search.best().is_none());
        search.observe(Observation::new(vec![2], 4.0, 2));
        assert_eq!(search.best().map(|o| o.sample), Some(1));
        assert_eq!(search.proposal().map(|o| o.sample), Some(1));
    }

    #[test]
    fn random_pass_counts_observations() {
        let ctx = SearchContext::new(SearchSpace::new(vec![2]));
        let mut search = PassiveSearch::new(PassiveMode::Random, ctx);
        search.observe(Observation::new(vec![0], 1.0, 0));
        search.observe(Observation::new(vec![0], 1.0, 1));
        assert!(search.proposal().is_some());
        assert_eq!(search.visited(0), Some(&[true, false][..]));
    }

    #[test]
    fn samples_per_pass_overrides_coverage() {
        let ctx = SearchContext::new(SearchSpace::default()).with_samples_per_pass(Some(5));
        let mut search = PassiveSearch::new(PassiveMode::OnTheFly, ctx);
        feed(&mut search, &[5.0, 4.0, 1.0, 1.0]);
        assert!(search.proposal().is_none());
        search.observe(Observation::new(vec![], 3.0, 4));
        assert_eq!(search.proposal().map(|o| o.sample), Some(2));
    }

    #[test]
    fn reset_starts_a_new_pass() {
        let ctx = SearchContext::new(SearchSpace::new(vec![1]));
        let mut search = PassiveSearch::new(PassiveMode::OnTheFly, ctx);
        search.observe(Observation::new(vec![0], 1.0, 0));
        assert!(search.proposal().is_some());
        search.reset();
        assert!(search.proposal().is_none());
        assert!(search.best().is_none());
        assert_eq!(search.visited(0), Some(&[false][..]));
    }
}
