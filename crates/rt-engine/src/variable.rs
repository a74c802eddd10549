//! Independent variables: tunables with a value domain, and measured
//! quantities read from the host.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rt_types::{
    validation_error, Applier, ApplyPolicy, Boundary, DataType, EntityKind, History, Lifecycle,
    Provider, RtError, RtResult, UpdateLocation, UpdatePolicy, UpdateSchedule, Value,
    VariableEvent, VariableStatus,
};

use crate::function::FunctionId;
use crate::objective::ObjectiveId;
use crate::region::Region;
use crate::trace::{Recorded, SampleCallback, Trace};

/// Handle of a variable within its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableId(pub(crate) usize);

impl VariableId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    Constant,
    Boolean,
    /// Two-valued domain {0, 1} in the declared data type.
    Binary,
    /// Counts its own updates.
    Counter,
    /// Uniform draw from a closed interval.
    Random,
    List,
    Range,
    External,
    /// Sampled at begin and end; records the difference.
    ExternalDiff,
}

impl VariableKind {
    /// Kinds with a discrete domain an objective can configure.
    pub fn is_domain(self) -> bool {
        matches!(self, Self::List | Self::Range | Self::Boolean | Self::Binary)
    }

    pub fn is_measured(self) -> bool {
        matches!(self, Self::External | Self::ExternalDiff)
    }
}

/// Discrete value domain of a tunable variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    List {
        values: Vec<Value>,
        names: Option<Vec<String>>,
    },
    Range {
        begin: f64,
        end: f64,
        step: f64,
        values: Vec<Value>,
    },
    Boolean {
        values: Vec<Value>,
    },
}

/// Largest number of values a range domain may enumerate.
pub const MAX_RANGE_VALUES: usize = 1 << 16;

impl Domain {
    /// `floor((end - begin) / |step|) + 1` values, ascending from `begin`
    /// for a positive step and descending from `end` for a negative one.
    pub fn range(data_type: DataType, begin: f64, end: f64, step: f64) -> RtResult<Self> {
        if step == 0.0 || !step.is_finite() {
            return Err(validation_error!("range step must be non-zero and finite, got {step}"));
        }
        if !begin.is_finite() || !end.is_finite() {
            return Err(validation_error!("range bounds [{begin}, {end}] must be finite"));
        }
        if !(begin <= end) {
            return Err(validation_error!("range begin {begin} is past end {end}"));
        }
        if data_type.is_integral() && step.fract() != 0.0 {
            return Err(validation_error!(
                "{data_type:?} range needs a whole step, got {step}"
            ));
        }
        let span = (end - begin) / step.abs();
        if !span.is_finite() || span >= MAX_RANGE_VALUES as f64 {
            return Err(validation_error!(
                "range [{begin}, {end}] step {step} exceeds {MAX_RANGE_VALUES} values"
            ));
        }
        let count = (span + 1e-9).floor() as usize + 1;
        let mut values: Vec<Value> = (0..count)
            .map(|i| {
                let x = if step > 0.0 {
                    begin + i as f64 * step
                } else {
                    end + i as f64 * step
                };
                Value::from_f64(data_type, x)
            })
            .collect();
        // Narrow types can round neighbouring steps onto one value.
        values.dedup();
        Ok(Self::Range {
            begin,
            end,
            step,
            values,
        })
    }

    pub fn values(&self) -> &[Value] {
        match self {
            Self::List { values, .. } | Self::Range { values, .. } | Self::Boolean { values } => {
                values
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    pub fn value(&self, index: usize) -> Option<Value> {
        self.values().get(index).copied()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        match self {
            Self::List {
                names: Some(names), ..
            } => names.get(index).map(String::as_str),
            Self::Boolean { .. } => ["false", "true"].get(index).copied(),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        let listed: Vec<String> = (0..self.len())
            .map(|i| match (self.value(i), self.name(i)) {
                (Some(v), Some(name)) => format!("{name}={v}"),
                (Some(v), None) => v.to_string(),
                _ => String::new(),
            })
            .collect();
        match self {
            Self::Range {
                begin, end, step, ..
            } => format!("range [{begin}, {end}] step {step}: {}", listed.join(", ")),
            Self::List { .. } => format!("list: {}", listed.join(", ")),
            Self::Boolean { .. } => format!("boolean: {}", listed.join(", ")),
        }
    }
}

pub struct Variable {
    pub(crate) trace: Trace,
    kind: VariableKind,
    pub(crate) status: VariableStatus,
    pub(crate) location: UpdateLocation,
    pub(crate) policy: UpdatePolicy,
    pub(crate) schedule: UpdateSchedule,
    pub(crate) apply_policy: ApplyPolicy,
    domain: Option<Domain>,
    index: usize,
    selections: u64,
    count_value: Vec<u64>,
    /// Domain index behind each stored sample.
    sample_indices: Vec<usize>,
    drawn: Vec<bool>,
    constant: Option<Value>,
    bounds: (f64, f64),
    /// Index requested by the owning objective for the next selection.
    pub(crate) follow: Option<usize>,
    pub(crate) owner: Option<ObjectiveId>,
    pub(crate) consumers: Vec<FunctionId>,
    pub(crate) last_batch_start: Option<u64>,
    last_applied: Option<u64>,
    pending_apply: bool,
}

impl Variable {
    fn new(name: &str, kind: VariableKind, data_type: DataType, capacity: usize) -> Self {
        let (location, policy) = match kind {
            VariableKind::List | VariableKind::Range | VariableKind::Boolean | VariableKind::Binary => {
                (UpdateLocation::Begin, UpdatePolicy::Series)
            }
            VariableKind::External => (UpdateLocation::End, UpdatePolicy::Straight),
            VariableKind::ExternalDiff => (UpdateLocation::BeginEndDiff, UpdatePolicy::Straight),
            VariableKind::Constant | VariableKind::Counter | VariableKind::Random => {
                (UpdateLocation::Begin, UpdatePolicy::Straight)
            }
        };
        Self {
            trace: Trace::new(name, data_type, capacity),
            kind,
            status: VariableStatus::Created,
            location,
            policy,
            schedule: UpdateSchedule::default(),
            apply_policy: ApplyPolicy::default(),
            domain: None,
            index: 0,
            selections: 0,
            count_value: Vec::new(),
            sample_indices: Vec::new(),
            drawn: Vec::new(),
            constant: None,
            bounds: (0.0, 0.0),
            follow: None,
            owner: None,
            consumers: Vec::new(),
            last_batch_start: None,
            last_applied: None,
            pending_apply: false,
        }
    }

    fn with_domain(mut self, domain: Domain) -> Self {
        self.count_value = vec![0; domain.len()];
        self.drawn = vec![false; domain.len()];
        if let Some(first) = domain.value(0) {
            self.trace.current = first;
        }
        self.domain = Some(domain);
        self
    }

    pub fn name(&self) -> &str {
        &self.trace.name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn data_type(&self) -> DataType {
        self.trace.data_type
    }

    pub fn status(&self) -> VariableStatus {
        self.status
    }

    /// Current value without triggering appliers.
    pub fn value(&self) -> Value {
        self.trace.current
    }

    /// Current domain index of a domain variable.
    pub fn index(&self) -> Option<usize> {
        self.domain.as_ref().map(|_| self.index)
    }

    pub fn domain(&self) -> Option<&Domain> {
        self.domain.as_ref()
    }

    pub fn domain_len(&self) -> usize {
        self.domain.as_ref().map_or(0, Domain::len)
    }

    /// How often each domain index has been selected.
    pub fn count_value(&self) -> &[u64] {
        &self.count_value
    }

    pub fn sample_indices(&self) -> &[usize] {
        &self.sample_indices
    }

    pub fn history(&self) -> &History {
        &self.trace.history
    }

    pub fn begin_history(&self) -> &History {
        &self.trace.begin_history
    }

    pub fn sample_iterations(&self) -> &[u64] {
        &self.trace.iterations
    }

    pub fn location(&self) -> UpdateLocation {
        self.location
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    pub fn schedule(&self) -> UpdateSchedule {
        self.schedule
    }

    pub fn apply_policy(&self) -> ApplyPolicy {
        self.apply_policy
    }

    pub fn owner(&self) -> Option<ObjectiveId> {
        self.owner
    }

    pub fn consumers(&self) -> &[FunctionId] {
        &self.consumers
    }

    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    pub fn is_apply_pending(&self) -> bool {
        self.pending_apply
    }

    pub(crate) fn has_selected(&self) -> bool {
        self.selections > 0
    }

    pub(crate) fn is_sampling(&self) -> bool {
        matches!(self.status, VariableStatus::Created | VariableStatus::Sampling)
    }

    /// Whether the variable takes part in `iteration`.
    pub(crate) fn is_live(&self, iteration: u64) -> bool {
        self.is_sampling() && self.schedule.phase(iteration).in_batch()
    }

    fn check_schedule(&self, location: UpdateLocation, policy: UpdatePolicy) -> RtResult<()> {
        let name = self.name();
        if self.kind.is_domain() {
            if policy.is_batch() {
                return Err(validation_error!(
                    "{name}: {policy:?} is a batch policy; domain variables select with a traversal policy"
                ));
            }
        } else if policy.is_selection() {
            return Err(validation_error!(
                "{name}: {policy:?} needs a value domain; {:?} variables take Straight or Accumulate",
                self.kind
            ));
        }
        if location == UpdateLocation::BeginEndDiff && !self.kind.is_measured() {
            return Err(validation_error!(
                "{name}: BeginEndDiff requires a provider-backed variable"
            ));
        }
        Ok(())
    }

    fn next_index(&mut self, rng: &mut ChaCha8Rng) -> Option<usize> {
        let n = self.domain_len();
        if n == 0 {
            return None;
        }
        let first = self.selections == 0;
        match self.policy {
            UpdatePolicy::Series => {
                let next = if first { 0 } else { self.index + 1 };
                (next < n).then_some(next)
            }
            UpdatePolicy::SeriesCyclic => Some(if first { 0 } else { (self.index + 1) % n }),
            UpdatePolicy::Random => Some(rng.gen_range(0..n)),
            UpdatePolicy::RandomUnique => {
                if self.drawn.iter().all(|&d| d) {
                    self.drawn.iter_mut().for_each(|d| *d = false);
                }
                let open: Vec<usize> = (0..n).filter(|&i| !self.drawn[i]).collect();
                let pick = *open.choose(rng)?;
                self.drawn[pick] = true;
                Some(pick)
            }
            UpdatePolicy::FollowObjective => {
                let held = if first { 0 } else { self.index };
                Some(self.follow.take().unwrap_or(held).min(n - 1))
            }
            UpdatePolicy::Straight | UpdatePolicy::Accumulate => Some(self.index),
        }
    }

    /// Produce the value of a generated (non-measured) variable.
    fn generate(&mut self, iteration: u64, rng: &mut ChaCha8Rng) -> Recorded {
        let data_type = self.trace.data_type;
        let mut selected = None;
        let value = match self.kind {
            VariableKind::Constant => self.constant.unwrap_or(self.trace.current),
            VariableKind::Counter => Value::from_f64(data_type, self.selections as f64),
            VariableKind::Random => {
                let (lo, hi) = self.bounds;
                let x = if data_type.is_integral() {
                    rng.gen_range(lo.round() as i64..=hi.round() as i64) as f64
                } else if hi > lo {
                    rng.gen_range(lo..hi)
                } else {
                    lo
                };
                Value::from_f64(data_type, x)
            }
            VariableKind::List | VariableKind::Range | VariableKind::Boolean | VariableKind::Binary => {
                let Some(index) = self.next_index(rng) else {
                    if self.status.advance(VariableEvent::DomainExhausted) {
                        debug!(variable = %self.trace.name, "domain exhausted, holding last value");
                    }
                    return Recorded::Nothing;
                };
                let Some(value) = self.domain.as_ref().and_then(|d| d.value(index)) else {
                    return Recorded::Nothing;
                };
                self.index = index;
                self.count_value[index] += 1;
                selected = Some(index);
                value
            }
            VariableKind::External | VariableKind::ExternalDiff => return Recorded::Nothing,
        };
        self.selections += 1;
        let recorded = self.trace.commit(value, iteration);
        if let (Some(index), Recorded::Stored(_)) = (selected, recorded) {
            self.sample_indices.push(index);
        }
        self.status.advance(VariableEvent::Sampled);
        if self.apply_policy == ApplyPolicy::OnUpdate {
            if let Some(applier) = self.trace.applier.as_mut() {
                applier.apply(value);
                self.last_applied = Some(iteration);
            }
        }
        recorded
    }

    /// Run this variable's work for `boundary` of `iteration`.
    pub(crate) fn update(
        &mut self,
        boundary: Boundary,
        iteration: u64,
        rng: &mut ChaCha8Rng,
    ) -> Recorded {
        let phase = self.schedule.phase(iteration);
        if !phase.in_batch() || !self.is_sampling() {
            return Recorded::Nothing;
        }
        if phase.is_first() {
            self.last_batch_start = Some(iteration);
        }
        if self.kind.is_measured() {
            if !self.location.samples_at(boundary) {
                return Recorded::Nothing;
            }
            let Some(provider) = self.trace.provider.as_mut() else {
                return Recorded::Nothing;
            };
            let reading = provider.read();
            let recorded = self
                .trace
                .observe(self.location, self.policy, boundary, phase, reading, iteration);
            if recorded != Recorded::Nothing {
                self.status.advance(VariableEvent::Sampled);
            }
            return recorded;
        }
        if boundary != self.location.selection_boundary() || !phase.is_first() {
            return Recorded::Nothing;
        }
        self.generate(iteration, rng)
    }

    /// Set the configuration chosen by an objective. Returns the value and
    /// whether applying it was deferred to the next host read.
    pub(crate) fn configure(
        &mut self,
        index: usize,
        policy: ApplyPolicy,
        iteration: u64,
    ) -> Option<(Value, bool)> {
        let value = self.domain.as_ref()?.value(index)?;
        self.index = index;
        self.trace.current = value;
        self.status.advance(VariableEvent::ConfigApplied);
        let deferred = match policy {
            ApplyPolicy::OnUpdate => {
                if let Some(applier) = self.trace.applier.as_mut() {
                    applier.apply(value);
                }
                self.last_applied = Some(iteration);
                self.pending_apply = false;
                false
            }
            ApplyPolicy::OnRead => {
                self.pending_apply = true;
                true
            }
        };
        Some((value, deferred))
    }

    /// Hand the variable back to its traversal, starting a fresh pass.
    pub(crate) fn restart(&mut self) {
        self.status.advance(VariableEvent::Released);
        self.selections = 0;
        self.drawn.iter_mut().for_each(|d| *d = false);
    }

    pub(crate) fn read(&mut self, iteration: u64) -> Value {
        let value = self.trace.current;
        if self.pending_apply || self.apply_policy == ApplyPolicy::OnRead {
            if let Some(applier) = self.trace.applier.as_mut() {
                applier.apply(value);
                self.last_applied = Some(iteration);
            }
            self.pending_apply = false;
        }
        value
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("trace", &self.trace)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("location", &self.location)
            .field("policy", &self.policy)
            .field("schedule", &self.schedule)
            .field("index", &self.index)
            .finish()
    }
}

/// Variable registration and host-side access.
impl Region {
    fn push_variable(&mut self, variable: Variable) -> RtResult<VariableId> {
        let limit = self.config.capacities.max_variables;
        if self.variables.len() >= limit {
            warn!(region = %self.name, variable = variable.name(), limit, "variable capacity exceeded");
            return Err(RtError::CapacityExceeded {
                kind: EntityKind::Variable,
                limit,
            });
        }
        let id = VariableId(self.variables.len());
        debug!(region = %self.name, variable = variable.name(), kind = ?variable.kind, "variable added");
        self.variables.push(variable);
        Ok(id)
    }

    fn checked_capacity(capacity: usize) -> RtResult<usize> {
        if capacity == 0 {
            return Err(validation_error!("history capacity must be at least 1"));
        }
        Ok(capacity)
    }

    pub(crate) fn variable_mut(&mut self, id: VariableId) -> RtResult<&mut Variable> {
        self.variables.get_mut(id.0).ok_or(RtError::InvalidHandle {
            kind: EntityKind::Variable,
            index: id.0,
        })
    }

    pub fn variable(&self, id: VariableId) -> RtResult<&Variable> {
        self.variables.get(id.0).ok_or(RtError::InvalidHandle {
            kind: EntityKind::Variable,
            index: id.0,
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = (VariableId, &Variable)> {
        self.variables.iter().enumerate().map(|(i, v)| (VariableId(i), v))
    }

    /// A tunable variable over an explicit list of values, optionally named.
    pub fn add_list(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
        values: Vec<Value>,
        names: Option<Vec<String>>,
    ) -> RtResult<VariableId> {
        let capacity = Self::checked_capacity(capacity)?;
        if values.is_empty() {
            return Err(validation_error!("{name}: list domain is empty"));
        }
        if let Some(bad) = values.iter().find(|v| v.data_type() != data_type) {
            return Err(RtError::TypeMismatch {
                name: name.to_string(),
                expected: data_type,
                actual: bad.data_type(),
            });
        }
        if let Some(names) = &names {
            if names.len() != values.len() {
                return Err(validation_error!(
                    "{name}: {} names for {} values",
                    names.len(),
                    values.len()
                ));
            }
        }
        let variable = Variable::new(name, VariableKind::List, data_type, capacity)
            .with_domain(Domain::List { values, names });
        self.push_variable(variable)
    }

    pub fn add_range(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
        begin: f64,
        end: f64,
        step: f64,
    ) -> RtResult<VariableId> {
        let capacity = Self::checked_capacity(capacity)?;
        let domain = Domain::range(data_type, begin, end, step)?;
        let variable =
            Variable::new(name, VariableKind::Range, data_type, capacity).with_domain(domain);
        self.push_variable(variable)
    }

    pub fn add_boolean(&mut self, name: &str, capacity: usize) -> RtResult<VariableId> {
        let capacity = Self::checked_capacity(capacity)?;
        let domain = Domain::Boolean {
            values: vec![Value::Int(0), Value::Int(1)],
        };
        let variable =
            Variable::new(name, VariableKind::Boolean, DataType::Int, capacity).with_domain(domain);
        self.push_variable(variable)
    }

    pub fn add_binary(&mut self, name: &str, data_type: DataType, capacity: usize) -> RtResult<VariableId> {
        let capacity = Self::checked_capacity(capacity)?;
        let domain = Domain::List {
            values: vec![Value::from_f64(data_type, 0.0), Value::from_f64(data_type, 1.0)],
            names: None,
        };
        let variable =
            Variable::new(name, VariableKind::Binary, data_type, capacity).with_domain(domain);
        self.push_variable(variable)
    }

    pub fn add_external(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
        provider: Provider,
    ) -> RtResult<VariableId> {
        let capacity = Self::checked_capacity(capacity)?;
        let mut variable = Variable::new(name, VariableKind::External, data_type, capacity);
        variable.trace.provider = Some(provider);
        self.push_variable(variable)
    }

    pub fn add_external_diff(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
        provider: Provider,
    ) -> RtResult<VariableId> {
        let capacity = Self::checked_capacity(capacity)?;
        let mut variable = Variable::new(name, VariableKind::ExternalDiff, data_type, capacity);
        variable.trace.provider = Some(provider);
        self.push_variable(variable)
    }

    pub fn add_constant(&mut self, name: &str, capacity: usize, value: Value) -> RtResult<VariableId> {
        let capacity = Self::checked_capacity(capacity)?;
        let mut variable = Variable::new(name, VariableKind::Constant, value.data_type(), capacity);
        variable.constant = Some(value);
        variable.trace.current = value;
        self.push_variable(variable)
    }

    pub fn add_counter(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
    ) -> RtResult<VariableId> {
        let capacity = Self::checked_capacity(capacity)?;
        self.push_variable(Variable::new(name, VariableKind::Counter, data_type, capacity))
    }

    /// Uniform draws from `[begin, end]`.
    pub fn add_random(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
        begin: f64,
        end: f64,
    ) -> RtResult<VariableId> {
        let capacity = Self::checked_capacity(capacity)?;
        if !begin.is_finite() || !end.is_finite() || !(end - begin).is_finite() {
            return Err(validation_error!(
                "{name}: random bounds [{begin}, {end}] must be finite with a finite width"
            ));
        }
        if !(begin <= end) {
            return Err(validation_error!("{name}: random bounds [{begin}, {end}] are empty"));
        }
        let mut variable = Variable::new(name, VariableKind::Random, data_type, capacity);
        variable.bounds = (begin, end);
        self.push_variable(variable)
    }

    pub fn set_update_schedule(
        &mut self,
        id: VariableId,
        location: UpdateLocation,
        policy: UpdatePolicy,
        start: u64,
        batch_size: u32,
        stride: u32,
    ) -> RtResult<()> {
        let variable = self.variable_mut(id)?;
        variable.check_schedule(location, policy)?;
        variable.location = location;
        variable.policy = policy;
        variable.schedule = UpdateSchedule::new(start, batch_size, stride);
        Ok(())
    }

    pub fn set_callback(&mut self, id: VariableId, callback: SampleCallback) -> RtResult<()> {
        self.variable_mut(id)?.trace.callback = Some(callback);
        Ok(())
    }

    pub fn set_applier(
        &mut self,
        id: VariableId,
        applier: Applier,
        policy: ApplyPolicy,
    ) -> RtResult<()> {
        let variable = self.variable_mut(id)?;
        variable.trace.applier = Some(applier);
        variable.apply_policy = policy;
        Ok(())
    }

    pub fn set_apply_policy(&mut self, id: VariableId, policy: ApplyPolicy) -> RtResult<()> {
        self.variable_mut(id)?.apply_policy = policy;
        Ok(())
    }

    /// Host-side read of the current value. Runs the applier for `OnRead`
    /// variables and for configurations whose application was deferred.
    pub fn read_variable(&mut self, id: VariableId) -> RtResult<Value> {
        let iteration = self.iteration;
        Ok(self.variable_mut(id)?.read(iteration))
    }

    pub fn describe_domain(&self, id: VariableId) -> RtResult<String> {
        let variable = self.variable(id)?;
        Ok(match variable.domain() {
            Some(domain) => format!("{}: {}", variable.name(), domain.describe()),
            None => format!("{}: {:?} without a domain", variable.name(), variable.kind()),
        })
    }

    pub fn format_variable_history(&self, id: VariableId) -> RtResult<String> {
        Ok(self.variable(id)?.trace.format_history())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_types::{Slot, TuningConfig};
    use std::sync::{Arc, Mutex};

    fn region() -> Region {
        Region::new("vars", TuningConfig::default().with_seed(7)).unwrap()
    }

    fn run(region: &mut Region, iterations: usize) {
        for _ in 0..iterations {
            region.begin();
            region.end();
        }
    }

    fn indices(region: &Region, id: VariableId) -> Vec<usize> {
        region.variable(id).unwrap().sample_indices().to_vec()
    }

    #[test]
    fn range_domain_layout() {
        let up = Domain::range(DataType::Int, 2.0, 11.0, 3.0).unwrap();
        assert_eq!(up.values(), &[Value::Int(2), Value::Int(5), Value::Int(8), Value::Int(11)]);
        let down = Domain::range(DataType::Int, 2.0, 11.0, -4.0).unwrap();
        assert_eq!(down.values(), &[Value::Int(11), Value::Int(7), Value::Int(3)]);
        let fine = Domain::range(DataType::Double, 0.0, 0.3, 0.1).unwrap();
        assert_eq!(fine.len(), 4);
        assert!(matches!(
            Domain::range(DataType::Int, 0.0, 4.0, 0.0),
            Err(RtError::Validation(_))
        ));
    }

    #[test]
    fn range_rejects_degenerate_bounds() {
        for (ty, begin, end, step) in [
            (DataType::Double, 0.0, f64::INFINITY, 1.0),
            (DataType::Double, f64::NEG_INFINITY, 0.0, 1.0),
            (DataType::Double, f64::NAN, 1.0, 1.0),
            (DataType::Double, -1e308, 1e308, 1.0),
            (DataType::Long, 0.0, 1e12, 1.0),
            (DataType::Int, 0.0, 3.0, 0.5),
        ] {
            assert!(
                matches!(Domain::range(ty, begin, end, step), Err(RtError::Validation(_))),
                "{ty:?} [{begin}, {end}] step {step}"
            );
        }
        let whole = Domain::range(DataType::Int, 0.5, 3.5, 1.0).unwrap();
        assert_eq!(whole.values(), &[Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
        let coarse = Domain::range(DataType::Float, 1e8, 1e8 + 16.0, 1.0).unwrap();
        assert_eq!(coarse.len(), 3);
    }

    #[test]
    fn random_bounds_must_be_finite() {
        let mut r = region();
        for (begin, end) in [(-1e308, 1e308), (0.0, f64::INFINITY), (f64::NAN, 1.0), (2.0, 1.0)] {
            assert!(matches!(
                r.add_random("x", DataType::Double, 8, begin, end),
                Err(RtError::Validation(_))
            ));
        }
        assert_eq!(r.variables().count(), 0);
        let x = r.add_random("x", DataType::Double, 8, -1e300, 1e300).unwrap();
        run(&mut r, 4);
        assert_eq!(r.variable(x).unwrap().history().len(), 4);
    }

    #[test]
    fn series_visits_each_index_once_then_holds() {
        let mut r = region();
        let v = r.add_range("tile", DataType::Int, 32, 8.0, 20.0, 4.0).unwrap();
        run(&mut r, 7);
        assert_eq!(indices(&r, v), vec![0, 1, 2, 3]);
        let var = r.variable(v).unwrap();
        assert_eq!(var.status(), VariableStatus::Exhausted);
        assert_eq!(var.value(), Value::Int(20));
        assert_eq!(var.history().len(), 4);
    }

    #[test]
    fn series_cyclic_wraps() {
        let mut r = region();
        let v = r.add_range("tile", DataType::Int, 32, 0.0, 2.0, 1.0).unwrap();
        r.set_update_schedule(v, UpdateLocation::Begin, UpdatePolicy::SeriesCyclic, 0, 1, 1)
            .unwrap();
        run(&mut r, 8);
        assert_eq!(indices(&r, v), vec![0, 1, 2, 0, 1, 2, 0, 1]);
        assert_eq!(r.variable(v).unwrap().count_value(), &[3, 3, 2]);
    }

    #[test]
    fn random_unique_covers_domain_before_repeating() {
        let mut r = region();
        let values: Vec<Value> = (0..6).map(Value::Int).collect();
        let v = r.add_list("chunk", DataType::Int, 64, values, None).unwrap();
        r.set_update_schedule(v, UpdateLocation::Begin, UpdatePolicy::RandomUnique, 0, 1, 1)
            .unwrap();
        run(&mut r, 18);
        let seen = indices(&r, v);
        for pass in seen.chunks(6) {
            let mut sorted = pass.to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn batch_holds_selection_and_honours_stride() {
        let mut r = region();
        let v = r.add_range("n", DataType::Int, 32, 0.0, 9.0, 1.0).unwrap();
        r.set_update_schedule(v, UpdateLocation::Begin, UpdatePolicy::Series, 2, 2, 3)
            .unwrap();
        run(&mut r, 9);
        // Batches start at iterations 2, 5 and 8.
        assert_eq!(indices(&r, v), vec![0, 1, 2]);
        assert_eq!(r.variable(v).unwrap().sample_iterations(), &[2, 5, 8]);
    }

    #[test]
    fn external_diff_records_difference() {
        let mut r = region();
        let clock = Slot::new(0_i64);
        let v = r
            .add_external_diff("elapsed", DataType::Long, 8, Provider::slot(clock.clone()))
            .unwrap();
        for (b, e) in [(100_i64, 130_i64), (200, 205)] {
            clock.set(b);
            r.begin();
            clock.set(e);
            r.end();
        }
        assert_eq!(r.variable(v).unwrap().history().to_f64_vec(), vec![30.0, 5.0]);
    }

    #[test]
    fn accumulate_sums_a_batch() {
        let mut r = region();
        let mut next = 0_i32;
        let provider = Provider::callable(move || {
            next += 1;
            Value::Int(next)
        });
        let v = r.add_external("events", DataType::Int, 8, provider).unwrap();
        r.set_update_schedule(v, UpdateLocation::End, UpdatePolicy::Accumulate, 0, 3, 3)
            .unwrap();
        run(&mut r, 6);
        assert_eq!(r.variable(v).unwrap().history().to_f64_vec(), vec![6.0, 15.0]);
    }

    #[test]
    fn generated_kinds() {
        let mut r = region();
        let c = r.add_constant("c", 4, Value::Double(2.5)).unwrap();
        let n = r.add_counter("n", DataType::Long, 4).unwrap();
        let x = r.add_random("x", DataType::Int, 4, 3.0, 5.0).unwrap();
        let b = r.add_boolean("flag", 4).unwrap();
        let bit = r.add_binary("bit", DataType::Double, 4).unwrap();
        run(&mut r, 3);
        assert_eq!(r.variable(c).unwrap().history().to_f64_vec(), vec![2.5; 3]);
        assert_eq!(r.variable(n).unwrap().history().to_f64_vec(), vec![0.0, 1.0, 2.0]);
        assert!(r.variable(x).unwrap().history().iter().all(|v| (3.0..=5.0).contains(&v.as_f64())));
        assert_eq!(indices(&r, b), vec![0, 1]);
        assert!(r.describe_domain(b).unwrap().contains("true=1"));
        assert_eq!(r.variable(bit).unwrap().history().to_f64_vec(), vec![0.0, 1.0]);
        assert_eq!(r.variable(bit).unwrap().status(), VariableStatus::Exhausted);
    }

    #[test]
    fn schedule_validation() {
        let mut r = region();
        let list = r.add_list("l", DataType::Int, 4, vec![Value::Int(1)], None).unwrap();
        let ext = r
            .add_external("e", DataType::Int, 4, Provider::slot(Slot::new(0)))
            .unwrap();
        assert!(r
            .set_update_schedule(list, UpdateLocation::Begin, UpdatePolicy::Accumulate, 0, 1, 1)
            .is_err());
        assert!(r
            .set_update_schedule(list, UpdateLocation::BeginEndDiff, UpdatePolicy::Series, 0, 1, 1)
            .is_err());
        assert!(r
            .set_update_schedule(ext, UpdateLocation::End, UpdatePolicy::Random, 0, 1, 1)
            .is_err());
        assert!(r
            .set_update_schedule(ext, UpdateLocation::BeginEndDiff, UpdatePolicy::Straight, 0, 1, 1)
            .is_ok());
    }

    #[test]
    fn list_rejects_mistyped_values() {
        let mut r = region();
        let err = r
            .add_list("l", DataType::Int, 4, vec![Value::Int(1), Value::Double(2.0)], None)
            .unwrap_err();
        assert!(matches!(err, RtError::TypeMismatch { .. }));
        assert_eq!(r.variables().count(), 0);
    }

    #[test]
    fn appliers_follow_apply_policy() {
        let mut r = region();
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&applied);
        let values = vec![Value::Int(1), Value::Int(2)];
        let v = r.add_list("threads", DataType::Int, 8, values, None).unwrap();
        r.set_applier(
            v,
            Applier::callable(move |value| sink.lock().unwrap().push(value)),
            ApplyPolicy::OnUpdate,
        )
        .unwrap();
        run(&mut r, 2);
        assert_eq!(applied.lock().unwrap().as_slice(), &[Value::Int(1), Value::Int(2)]);

        let slot = Slot::new(0);
        r.set_applier(v, Applier::slot(slot.clone()), ApplyPolicy::OnRead).unwrap();
        assert_eq!(r.read_variable(v).unwrap(), Value::Int(2));
        assert_eq!(slot.get(), Value::Int(2));
    }

    #[test]
    fn callbacks_and_history_dump() {
        let mut r = region();
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        let v = r.add_counter("n", DataType::Int, 2).unwrap();
        r.set_callback(v, Box::new(move |_, _| *counter.lock().unwrap() += 1)).unwrap();
        run(&mut r, 3);
        // The callback sees commits past capacity too.
        assert_eq!(*seen.lock().unwrap(), 3);
        let dump = r.format_variable_history(v).unwrap();
        assert!(dump.starts_with("# n"));
        assert_eq!(dump.lines().count(), 3);
    }
}
