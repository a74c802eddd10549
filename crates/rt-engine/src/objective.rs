//! Objectives: score function samples, drive a search strategy over the
//! contributing variables, and apply the winning configuration once the
//! fidelity rule confirms it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rt_search::{
    build_strategy, lookup_confirms, FidelityTracker, Observation, SearchContext, SearchSpace,
    SearchStrategy,
};
use rt_types::{
    validation_error, ApplyPolicy, EntityKind, Fidelity, Lifecycle, ObjectiveEvent,
    ObjectiveStatus, RtError, RtResult, SearchKind, UpdatePolicy, UpdateSchedule, Value,
};

use crate::events::{TuningEvent, TuningEventKind};
use crate::function::{FunctionId, Input};
use crate::region::Region;
use crate::variable::VariableId;

/// Handle of an objective within its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectiveId(pub(crate) usize);

impl ObjectiveId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectiveKind {
    Min,
    Max,
    /// Minimise `|f1 - f2|` over samples paired by position.
    Intersection,
    SelectMin,
    SelectMax,
    /// Lowest primary index whose value reaches the threshold.
    Threshold,
    ThresholdUp,
    /// Lowest primary index whose value stays at or below the threshold.
    ThresholdDown,
}

impl ObjectiveKind {
    fn is_select(self) -> bool {
        matches!(self, Self::SelectMin | Self::SelectMax)
    }

    fn is_threshold(self) -> bool {
        matches!(self, Self::Threshold | Self::ThresholdUp | Self::ThresholdDown)
    }
}

/// What an objective does after its configuration has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectiveMode {
    /// Retire at the next iteration.
    #[default]
    OneShot,
    /// Return to sampling after `retune_interval` in-action iterations.
    Continuous { retune_interval: u64 },
}

/// One contributing variable of an objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigRow {
    pub variable: VariableId,
    /// Chosen domain index, once met.
    pub index: Option<usize>,
    pub preference_right: bool,
    pub last_applied: Option<u64>,
    /// Overrides the variable's own apply policy.
    pub apply_policy: Option<ApplyPolicy>,
}

/// The configuration an objective settled on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveOutcome {
    pub objective: String,
    pub score: f64,
    /// Position of the winning sample in the objective's input history.
    pub sample: usize,
    pub config: Vec<(String, Value)>,
    /// Winning function of a selection objective.
    pub selected: Option<usize>,
}

pub type MetCallback = Box<dyn FnMut(&ObjectiveOutcome) + Send>;

pub struct Objective {
    name: String,
    kind: ObjectiveKind,
    pub(crate) status: ObjectiveStatus,
    mode: ObjectiveMode,
    requested: SearchKind,
    search: SearchKind,
    strategy: Box<dyn SearchStrategy>,
    inputs: Vec<FunctionId>,
    weights: Vec<f64>,
    threshold: f64,
    config: Vec<ConfigRow>,
    fidelity: Fidelity,
    tracker: FidelityTracker,
    samples_per_pass: Option<usize>,
    callback: Option<MetCallback>,
    /// Every scored sample of the current tuning round, with the winning
    /// function of a selection.
    records: Vec<(Observation, Option<usize>)>,
    consumed: usize,
    outcome: Option<ObjectiveOutcome>,
    applied_at: Option<u64>,
    in_action_for: u64,
}

impl Objective {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ObjectiveKind {
        self.kind
    }

    pub fn status(&self) -> ObjectiveStatus {
        self.status
    }

    pub fn mode(&self) -> ObjectiveMode {
        self.mode
    }

    /// Strategy in effect; a driving strategy requested without tunable
    /// variables falls back to exhaustive search.
    pub fn search(&self) -> SearchKind {
        self.search
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn inputs(&self) -> &[FunctionId] {
        &self.inputs
    }

    pub fn config(&self) -> &[ConfigRow] {
        &self.config
    }

    pub fn fidelity(&self) -> Fidelity {
        self.fidelity
    }

    /// Consecutive confirming windows so far.
    pub fn streak(&self) -> u32 {
        self.tracker.streak()
    }

    pub fn outcome(&self) -> Option<&ObjectiveOutcome> {
        self.outcome.as_ref()
    }

    fn is_evaluating(&self) -> bool {
        matches!(
            self.status,
            ObjectiveStatus::Sampling | ObjectiveStatus::ToBeEvaluated | ObjectiveStatus::Evaluating
        )
    }

    fn row(&self, variable: VariableId) -> Option<&ConfigRow> {
        self.config.iter().find(|row| row.variable == variable)
    }

    fn identity_of(&self, sample: usize) -> Option<usize> {
        self.records
            .iter()
            .find(|(o, _)| o.sample == sample)
            .and_then(|(_, identity)| *identity)
    }

    /// Scores of other samples with the candidate's configuration within
    /// the lookup window.
    fn neighbours(&self, candidate: &Observation) -> Vec<f64> {
        let lookup = self.fidelity.lookup_window as usize;
        self.records
            .iter()
            .map(|(o, _)| o)
            .filter(|o| {
                o.point == candidate.point
                    && o.sample != candidate.sample
                    && o.sample.abs_diff(candidate.sample) <= lookup
            })
            .map(|o| o.score)
            .collect()
    }
}

impl std::fmt::Debug for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Objective")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("search", &self.search)
            .field("inputs", &self.inputs)
            .field("config", &self.config)
            .finish()
    }
}

/// Index of the nearest entry not yet visited, looking on the preferred
/// side first.
fn nearest_unvisited(visited: &[bool], anchor: usize, prefer_right: bool) -> Option<usize> {
    let n = visited.len();
    for d in 0..n {
        let right = anchor.checked_add(d).filter(|&i| i < n);
        let left = anchor.checked_sub(d);
        let order = if prefer_right { [right, left] } else { [left, right] };
        if let Some(i) = order.into_iter().flatten().find(|&i| !visited[i]) {
            return Some(i);
        }
    }
    None
}

/// Objective registration, evaluation and configuration.
impl Region {
    pub fn objective(&self, id: ObjectiveId) -> RtResult<&Objective> {
        self.objectives.get(id.0).ok_or(RtError::InvalidHandle {
            kind: EntityKind::Objective,
            index: id.0,
        })
    }

    fn objective_mut(&mut self, id: ObjectiveId) -> RtResult<&mut Objective> {
        self.objectives.get_mut(id.0).ok_or(RtError::InvalidHandle {
            kind: EntityKind::Objective,
            index: id.0,
        })
    }

    pub fn objectives(&self) -> impl Iterator<Item = (ObjectiveId, &Objective)> {
        self.objectives.iter().enumerate().map(|(i, o)| (ObjectiveId(i), o))
    }

    fn add_objective(
        &mut self,
        name: &str,
        kind: ObjectiveKind,
        inputs: Vec<FunctionId>,
        weights: Vec<f64>,
        threshold: f64,
    ) -> RtResult<ObjectiveId> {
        let limit = self.config.capacities.max_objectives;
        if self.objectives.len() >= limit {
            warn!(region = %self.name, objective = name, limit, "objective capacity exceeded");
            return Err(RtError::CapacityExceeded {
                kind: EntityKind::Objective,
                limit,
            });
        }
        let max_inputs = self.config.capacities.max_inputs;
        if inputs.len() > max_inputs {
            return Err(RtError::CapacityExceeded {
                kind: EntityKind::Input,
                limit: max_inputs,
            });
        }
        for &f in &inputs {
            self.function(f)?;
        }
        let arity_ok = match kind {
            ObjectiveKind::Intersection => inputs.len() == 2,
            ObjectiveKind::SelectMin | ObjectiveKind::SelectMax => !inputs.is_empty(),
            _ => inputs.len() == 1,
        };
        if !arity_ok {
            return Err(validation_error!("{name}: {kind:?} cannot take {} input(s)", inputs.len()));
        }
        if weights.len() != inputs.len() {
            return Err(validation_error!(
                "{name}: {} weights for {} inputs",
                weights.len(),
                inputs.len()
            ));
        }

        let id = ObjectiveId(self.objectives.len());
        let mut contributing = Vec::new();
        let as_inputs: Vec<Input> = inputs.iter().copied().map(Input::from).collect();
        self.input_variables(&as_inputs, &mut contributing);
        let mut config = Vec::new();
        for v in contributing {
            let variable = &mut self.variables[v.0];
            if !variable.kind().is_domain() {
                continue;
            }
            if variable.owner.is_none() {
                variable.owner = Some(id);
            }
            config.push(ConfigRow {
                variable: v,
                index: None,
                preference_right: false,
                last_applied: None,
                apply_policy: None,
            });
        }
        for f in &inputs {
            let consumers = &mut self.functions[f.0].consumers;
            if !consumers.contains(&id) {
                consumers.push(id);
            }
        }

        let fidelity = self.config.fidelity;
        let search = self.config.search;
        debug!(region = %self.name, objective = name, ?kind, variables = config.len(), "objective added");
        self.objectives.push(Objective {
            name: name.to_string(),
            kind,
            status: ObjectiveStatus::Created,
            mode: ObjectiveMode::default(),
            requested: search,
            search,
            strategy: build_strategy(SearchKind::ExhaustiveOnTheFly, SearchContext::new(SearchSpace::default())),
            inputs,
            weights,
            threshold,
            config,
            fidelity,
            tracker: FidelityTracker::new(fidelity.deviation_tolerance, fidelity.fidelity_window),
            samples_per_pass: None,
            callback: None,
            records: Vec::new(),
            consumed: 0,
            outcome: None,
            applied_at: None,
            in_action_for: 0,
        });
        self.rebuild_strategy(id);
        Ok(id)
    }

    pub fn add_min(&mut self, name: &str, f: FunctionId) -> RtResult<ObjectiveId> {
        self.add_objective(name, ObjectiveKind::Min, vec![f], vec![1.0], 0.0)
    }

    pub fn add_max(&mut self, name: &str, f: FunctionId) -> RtResult<ObjectiveId> {
        self.add_objective(name, ObjectiveKind::Max, vec![f], vec![1.0], 0.0)
    }

    pub fn add_intersection(&mut self, name: &str, f1: FunctionId, f2: FunctionId) -> RtResult<ObjectiveId> {
        self.add_objective(name, ObjectiveKind::Intersection, vec![f1, f2], vec![1.0, 1.0], 0.0)
    }

    /// Pick the function with the lowest (`SelectMin`) or highest
    /// (`SelectMax`) weighted latest value.
    pub fn add_select(
        &mut self,
        name: &str,
        kind: ObjectiveKind,
        functions: &[FunctionId],
        weights: &[f64],
    ) -> RtResult<ObjectiveId> {
        if !kind.is_select() {
            return Err(validation_error!("{name}: {kind:?} is not a selection"));
        }
        let weights = if weights.is_empty() {
            vec![1.0; functions.len()]
        } else {
            weights.to_vec()
        };
        self.add_objective(name, kind, functions.to_vec(), weights, 0.0)
    }

    pub fn add_select2(
        &mut self,
        name: &str,
        kind: ObjectiveKind,
        f1: FunctionId,
        f2: FunctionId,
    ) -> RtResult<ObjectiveId> {
        self.add_select(name, kind, &[f1, f2], &[])
    }

    pub fn add_threshold_objective(
        &mut self,
        name: &str,
        kind: ObjectiveKind,
        f: FunctionId,
        threshold: impl Into<Value>,
    ) -> RtResult<ObjectiveId> {
        if !kind.is_threshold() {
            return Err(validation_error!("{name}: {kind:?} is not a threshold"));
        }
        self.add_objective(name, kind, vec![f], vec![1.0], threshold.into().as_f64())
    }

    /// Sampling attributes: first iteration, samples per evaluation pass,
    /// batch size and stride. The schedule is pushed to every variable the
    /// objective configures.
    pub fn set_sample_attr(
        &mut self,
        id: ObjectiveId,
        start: u64,
        count: Option<usize>,
        rate: u32,
        stride: u32,
    ) -> RtResult<()> {
        let schedule = UpdateSchedule::new(start, rate, stride);
        let objective = self.objective_mut(id)?;
        objective.samples_per_pass = count;
        let owned: Vec<VariableId> = objective.config.iter().map(|row| row.variable).collect();
        for v in owned {
            self.variables[v.0].schedule = schedule;
        }
        self.rebuild_strategy(id);
        Ok(())
    }

    pub fn set_fidelity_attr(
        &mut self,
        id: ObjectiveId,
        deviation_tolerance: f64,
        fidelity_window: u32,
        lookup_window: u32,
    ) -> RtResult<()> {
        if !(deviation_tolerance >= 0.0) {
            return Err(validation_error!("deviation tolerance must be non-negative, got {deviation_tolerance}"));
        }
        let objective = self.objective_mut(id)?;
        objective.fidelity = Fidelity {
            deviation_tolerance,
            fidelity_window: fidelity_window.max(1),
            lookup_window,
        };
        objective.tracker = FidelityTracker::new(deviation_tolerance, fidelity_window);
        Ok(())
    }

    pub fn set_search_strategy(&mut self, id: ObjectiveId, search: SearchKind) -> RtResult<()> {
        self.objective_mut(id)?.requested = search;
        self.rebuild_strategy(id);
        Ok(())
    }

    /// Override how the configuration of `variable` is applied when the
    /// objective is met.
    pub fn set_objective_apply_policy(
        &mut self,
        id: ObjectiveId,
        variable: VariableId,
        policy: ApplyPolicy,
    ) -> RtResult<()> {
        let row = self.config_row_mut(id, variable)?;
        row.apply_policy = Some(policy);
        Ok(())
    }

    /// Break exact score ties toward the greater index of `variable`.
    pub fn set_preference(&mut self, id: ObjectiveId, variable: VariableId, right: bool) -> RtResult<()> {
        self.config_row_mut(id, variable)?.preference_right = right;
        self.rebuild_strategy(id);
        Ok(())
    }

    pub fn set_mode(&mut self, id: ObjectiveId, mode: ObjectiveMode) -> RtResult<()> {
        self.objective_mut(id)?.mode = mode;
        Ok(())
    }

    pub fn add_callback(&mut self, id: ObjectiveId, callback: MetCallback) -> RtResult<()> {
        self.objective_mut(id)?.callback = Some(callback);
        Ok(())
    }

    pub fn is_met(&self, id: ObjectiveId) -> RtResult<bool> {
        Ok(self.objective(id)?.status.is_met())
    }

    fn config_row_mut(&mut self, id: ObjectiveId, variable: VariableId) -> RtResult<&mut ConfigRow> {
        let objective = self.objective_mut(id)?;
        let name = objective.name.clone();
        objective
            .config
            .iter_mut()
            .find(|row| row.variable == variable)
            .ok_or_else(|| validation_error!("{name}: variable {} does not contribute", variable.0))
    }

    fn rebuild_strategy(&mut self, id: ObjectiveId) {
        let max_iterations = self.config.nelder_mead_max_iterations;
        let objective = &self.objectives[id.0];
        let dims: Vec<usize> = objective
            .config
            .iter()
            .map(|row| self.variables[row.variable.0].domain_len())
            .collect();
        let owns_any = objective
            .config
            .iter()
            .any(|row| self.variables[row.variable.0].owner == Some(id));
        let search = if objective.requested.is_driving() && !owns_any {
            debug!(objective = %objective.name, "no tunable variables to drive, using exhaustive search");
            SearchKind::ExhaustiveOnTheFly
        } else {
            objective.requested
        };
        let context = SearchContext::new(SearchSpace::new(dims))
            .with_samples_per_pass(objective.samples_per_pass)
            .with_prefer_right(objective.config.first().map_or(false, |row| row.preference_right))
            .with_max_iterations(max_iterations);

        let objective = &mut self.objectives[id.0];
        objective.search = search;
        objective.strategy = build_strategy(search, context);
        objective.tracker.reset();
        objective.records.clear();
        if search.is_driving() {
            for row in &objective.config {
                let variable = &mut self.variables[row.variable.0];
                if variable.owner == Some(id) {
                    variable.policy = UpdatePolicy::FollowObjective;
                }
            }
        }
    }

    pub(crate) fn start_objectives(&mut self) {
        for objective in &mut self.objectives {
            objective.status.advance(ObjectiveEvent::SamplingStarted);
        }
    }

    /// Tell followed variables which index to take this iteration.
    pub(crate) fn request_probes(&mut self) {
        for (index, objective) in self.objectives.iter_mut().enumerate() {
            if !objective.is_evaluating() {
                continue;
            }
            let id = ObjectiveId(index);
            let probe = if objective.search.is_driving() {
                objective.strategy.next_probe()
            } else {
                None
            };
            let prefer_right = objective.config.first().map_or(false, |row| row.preference_right);
            for (k, row) in objective.config.iter().enumerate() {
                let variable = &mut self.variables[row.variable.0];
                if variable.owner != Some(id) || variable.policy != UpdatePolicy::FollowObjective {
                    continue;
                }
                if objective.search.is_driving() {
                    variable.follow = probe.as_ref().and_then(|p| p.get(k).copied());
                    continue;
                }
                let n = variable.domain_len();
                if n == 0 {
                    continue;
                }
                let anchor = objective
                    .strategy
                    .best()
                    .and_then(|best| best.point.get(k).copied())
                    .or_else(|| variable.has_selected().then(|| variable.index()).flatten())
                    .unwrap_or(if prefer_right { n - 1 } else { 0 });
                variable.follow = match objective.strategy.visited(k) {
                    Some(visited) => nearest_unvisited(visited, anchor.min(n - 1), prefer_right),
                    None => Some(anchor.min(n - 1)),
                };
            }
        }
    }

    fn available(&self, inputs: &[FunctionId]) -> usize {
        inputs
            .iter()
            .map(|f| self.functions[f.0].trace.history.len())
            .min()
            .unwrap_or(0)
    }

    /// Domain index of `variable` behind sample `position` of `function`.
    fn resolve_index(&self, function: FunctionId, position: usize, variable: VariableId) -> Option<usize> {
        self.functions[function.0]
            .input_table
            .get(position)?
            .index_of(variable)
    }

    fn score_at(&self, objective: &Objective, position: usize) -> (Observation, Option<usize>) {
        let point: Vec<usize> = objective
            .config
            .iter()
            .map(|row| {
                objective
                    .inputs
                    .iter()
                    .find_map(|&f| self.resolve_index(f, position, row.variable))
                    .or_else(|| self.variables[row.variable.0].index())
                    .unwrap_or(0)
            })
            .collect();
        let value = |f: FunctionId| {
            self.functions[f.0]
                .trace
                .history
                .get(position)
                .map_or(f64::NAN, |v| v.as_f64())
        };
        let primary = point.first().copied().unwrap_or(position) as f64;
        let first = objective.inputs[0];
        let mut identity = None;
        let score = match objective.kind {
            ObjectiveKind::Min => value(first),
            ObjectiveKind::Max => -value(first),
            ObjectiveKind::Intersection => (value(first) - value(objective.inputs[1])).abs(),
            ObjectiveKind::Threshold | ObjectiveKind::ThresholdUp => {
                if value(first) >= objective.threshold {
                    primary
                } else {
                    f64::INFINITY
                }
            }
            ObjectiveKind::ThresholdDown => {
                if value(first) <= objective.threshold {
                    primary
                } else {
                    f64::INFINITY
                }
            }
            ObjectiveKind::SelectMin | ObjectiveKind::SelectMax => {
                let sign = if objective.kind == ObjectiveKind::SelectMin { 1.0 } else { -1.0 };
                let mut best = f64::NAN;
                for (i, (&f, &w)) in objective.inputs.iter().zip(&objective.weights).enumerate() {
                    let s = sign * w * value(f);
                    if identity.is_none() || s < best {
                        best = s;
                        identity = Some(i);
                    }
                }
                best
            }
        };
        (Observation::new(point, score, position), identity)
    }

    pub(crate) fn evaluate_objectives(&mut self) {
        for index in 0..self.objectives.len() {
            self.evaluate_objective(ObjectiveId(index));
        }
    }

    fn evaluate_objective(&mut self, id: ObjectiveId) {
        let objective = &self.objectives[id.0];
        if !objective.is_evaluating() {
            return;
        }
        let available = self.available(&objective.inputs);
        if available <= objective.consumed {
            return;
        }
        let scored: Vec<_> = (objective.consumed..available)
            .map(|position| self.score_at(objective, position))
            .collect();

        let objective = &mut self.objectives[id.0];
        objective.consumed = available;
        objective.status.advance(ObjectiveEvent::InputsUpdated);
        objective.status.advance(ObjectiveEvent::EvaluationStarted);
        let mut winner = None;
        let mut restart = false;
        for (observation, identity) in scored {
            objective.strategy.observe(observation.clone());
            objective.records.push((observation, identity));
            let Some(candidate) = objective.strategy.proposal().cloned() else {
                continue;
            };
            let confirmed = lookup_confirms(
                candidate.score,
                &objective.neighbours(&candidate),
                objective.fidelity.deviation_tolerance,
            );
            let identity = objective.identity_of(candidate.sample);
            if objective.tracker.record(candidate.score, identity, confirmed) {
                winner = Some((candidate, identity));
                break;
            }
            debug!(
                objective = %objective.name,
                score = candidate.score,
                confirmed,
                streak = objective.tracker.streak(),
                "pass complete, not yet met"
            );
            objective.strategy.reset();
            restart = true;
        }
        if let Some((candidate, identity)) = winner {
            self.converge(id, candidate, identity);
        } else if restart {
            let objective = &self.objectives[id.0];
            for row in &objective.config {
                let variable = &mut self.variables[row.variable.0];
                if variable.owner == Some(id) {
                    variable.restart();
                }
            }
        }
    }

    fn converge(&mut self, id: ObjectiveId, candidate: Observation, identity: Option<usize>) {
        let iteration = self.iteration;
        let objective = &mut self.objectives[id.0];
        objective.status.advance(ObjectiveEvent::Converged);
        info!(
            region = %self.name,
            objective = %objective.name,
            score = candidate.score,
            sample = candidate.sample,
            iteration,
            "objective met"
        );
        self.events.emit(TuningEvent::new(
            &self.name,
            iteration,
            TuningEventKind::ObjectiveMet {
                objective: objective.name.clone(),
                score: candidate.score,
                sample: candidate.sample,
            },
        ));

        let mut applied = Vec::new();
        for (k, row) in objective.config.iter_mut().enumerate() {
            let variable = &mut self.variables[row.variable.0];
            let Some(&index) = candidate.point.get(k) else {
                continue;
            };
            row.index = Some(index);
            if variable.owner != Some(id) {
                continue;
            }
            let policy = row.apply_policy.unwrap_or(variable.apply_policy);
            let Some((value, deferred)) = variable.configure(index, policy, iteration) else {
                continue;
            };
            row.last_applied = Some(iteration);
            info!(variable = %variable.name(), %value, index, deferred, "configuration applied");
            self.events.emit(TuningEvent::new(
                &self.name,
                iteration,
                TuningEventKind::ConfigurationApplied {
                    variable: variable.name().to_string(),
                    value,
                    deferred,
                },
            ));
            applied.push((variable.name().to_string(), value));
        }

        objective.status.advance(ObjectiveEvent::Applied);
        objective.applied_at = Some(iteration);
        objective.in_action_for = 0;
        let outcome = ObjectiveOutcome {
            objective: objective.name.clone(),
            score: candidate.score,
            sample: candidate.sample,
            config: applied,
            selected: identity,
        };
        if let Some(callback) = objective.callback.as_mut() {
            callback(&outcome);
        }
        objective.outcome = Some(outcome);
    }

    /// Retire one-shot objectives and count down continuous ones.
    pub(crate) fn advance_in_action(&mut self) {
        let iteration = self.iteration;
        for index in 0..self.objectives.len() {
            let objective = &mut self.objectives[index];
            if objective.status != ObjectiveStatus::InAction || objective.applied_at == Some(iteration) {
                continue;
            }
            match objective.mode {
                ObjectiveMode::OneShot => {
                    objective.status.advance(ObjectiveEvent::Retire);
                    debug!(objective = %objective.name, "objective retired");
                    let kind = TuningEventKind::ObjectiveRetired {
                        objective: objective.name.clone(),
                    };
                    self.events.emit(TuningEvent::new(&self.name, iteration, kind));
                }
                ObjectiveMode::Continuous { retune_interval } => {
                    objective.in_action_for += 1;
                    if objective.in_action_for >= retune_interval.max(1) {
                        self.resume(ObjectiveId(index));
                    }
                }
            }
        }
    }

    fn resume(&mut self, id: ObjectiveId) {
        let available = self.available(&self.objectives[id.0].inputs);
        let objective = &mut self.objectives[id.0];
        objective.status.advance(ObjectiveEvent::Resume);
        objective.strategy.reset();
        objective.tracker.reset();
        objective.records.clear();
        objective.consumed = available;
        objective.in_action_for = 0;
        for row in &objective.config {
            let variable = &mut self.variables[row.variable.0];
            if variable.owner == Some(id) {
                variable.restart();
            }
        }
        info!(region = %self.name, objective = %objective.name, "objective resumed");
        let kind = TuningEventKind::ObjectiveResumed {
            objective: objective.name.clone(),
        };
        self.events.emit(TuningEvent::new(&self.name, self.iteration, kind));
    }

    /// The chosen index of `variable` under objective `id`, once met.
    pub fn chosen_index(&self, id: ObjectiveId, variable: VariableId) -> RtResult<Option<usize>> {
        Ok(self.objective(id)?.row(variable).and_then(|row| row.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_types::{DataType, TuningConfig};

    #[test]
    fn nearest_unvisited_respects_preference() {
        let visited = [false, true, true, false, false];
        assert_eq!(nearest_unvisited(&visited, 2, false), Some(3));
        assert_eq!(nearest_unvisited(&visited, 1, false), Some(0));
        assert_eq!(nearest_unvisited(&visited, 2, true), Some(3));
        assert_eq!(nearest_unvisited(&[true, true], 0, false), None);
    }

    fn region() -> Region {
        Region::new("obj", TuningConfig::default().with_seed(3)).unwrap()
    }

    #[test]
    fn arity_and_kind_are_checked() {
        let mut r = region();
        let x = r.add_range("x", DataType::Int, 8, 0.0, 3.0, 1.0).unwrap();
        let f = r.add_linear("f", DataType::Int, 8, &[x.into()], vec![]).unwrap();
        assert!(r.add_select("s", ObjectiveKind::Min, &[f], &[]).is_err());
        assert!(r.add_threshold_objective("t", ObjectiveKind::Max, f, 1).is_err());
        assert!(r.add_select("s", ObjectiveKind::SelectMin, &[f, f], &[1.0]).is_err());
        assert!(matches!(
            r.add_min("m", FunctionId(4)),
            Err(RtError::InvalidHandle { .. })
        ));
        assert_eq!(r.objectives().count(), 0);
    }

    #[test]
    fn first_objective_owns_shared_variables() {
        let mut r = region();
        let x = r.add_range("x", DataType::Int, 8, 0.0, 3.0, 1.0).unwrap();
        let noise = r.add_random("noise", DataType::Double, 8, 0.0, 1.0).unwrap();
        let f = r.add_linear("f", DataType::Double, 8, &[x.into(), noise.into()], vec![]).unwrap();
        let a = r.add_min("a", f).unwrap();
        let b = r.add_max("b", f).unwrap();
        assert_eq!(r.variable(x).unwrap().owner(), Some(a));
        // Only domain variables are configured.
        assert_eq!(r.objective(a).unwrap().config().len(), 1);
        assert_eq!(r.objective(b).unwrap().config()[0].variable, x);
    }

    #[test]
    fn driving_strategy_needs_an_owned_variable() {
        let mut r = region();
        let x = r.add_range("x", DataType::Int, 8, 0.0, 3.0, 1.0).unwrap();
        let f = r.add_linear("f", DataType::Int, 8, &[x.into()], vec![]).unwrap();
        let g = r.add_counter("c", DataType::Int, 8).unwrap();
        let h = r.add_linear("h", DataType::Int, 8, &[g.into()], vec![]).unwrap();
        let a = r.add_min("a", f).unwrap();
        let b = r.add_min("b", h).unwrap();
        r.set_search_strategy(a, SearchKind::BinaryGradient).unwrap();
        r.set_search_strategy(b, SearchKind::NelderMead).unwrap();
        assert_eq!(r.objective(a).unwrap().search(), SearchKind::BinaryGradient);
        assert_eq!(r.variable(x).unwrap().policy(), UpdatePolicy::FollowObjective);
        assert_eq!(r.objective(b).unwrap().search(), SearchKind::ExhaustiveOnTheFly);
    }

    #[test]
    fn sample_attr_reaches_variables() {
        let mut r = region();
        let x = r.add_range("x", DataType::Int, 8, 0.0, 3.0, 1.0).unwrap();
        let f = r.add_linear("f", DataType::Int, 8, &[x.into()], vec![]).unwrap();
        let o = r.add_min("o", f).unwrap();
        r.set_sample_attr(o, 2, Some(3), 2, 4).unwrap();
        assert_eq!(r.variable(x).unwrap().schedule(), UpdateSchedule::new(2, 2, 4));
        assert!(r.set_preference(o, VariableId(5), true).is_err());
    }

    #[test]
    fn fidelity_attr_validates_tolerance() {
        let mut r = region();
        let x = r.add_range("x", DataType::Int, 8, 0.0, 3.0, 1.0).unwrap();
        let f = r.add_linear("f", DataType::Int, 8, &[x.into()], vec![]).unwrap();
        let o = r.add_min("o", f).unwrap();
        assert!(r.set_fidelity_attr(o, -1.0, 2, 4).is_err());
        r.set_fidelity_attr(o, 0.5, 3, 1).unwrap();
        let fidelity = r.objective(o).unwrap().fidelity();
        assert_eq!(fidelity.fidelity_window, 3);
        assert_eq!(fidelity.lookup_window, 1);
    }
}
