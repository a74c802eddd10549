//! Derived quantities: closed-form transforms of variables and functions,
//! and empirical models read from a provider.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rt_search::{fit_polynomial, gradient, PolyFit};
use rt_types::{
    validation_error, BatchPhase, Boundary, DataType, EntityKind, FunctionEvent, FunctionStatus,
    History, Lifecycle, Provider, RtError, RtResult, UpdateLocation, UpdatePolicy, Value,
};

use crate::objective::ObjectiveId;
use crate::region::Region;
use crate::trace::{Recorded, Trace};
use crate::variable::VariableId;

/// Handle of a function within its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub(crate) usize);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What stood behind one stored function sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRow {
    /// Latest value of each input, in input order.
    pub values: Vec<Value>,
    /// Selected domain index of every configurable variable reachable from
    /// the inputs.
    pub indices: Vec<(VariableId, usize)>,
}

impl InputRow {
    pub fn index_of(&self, variable: VariableId) -> Option<usize> {
        self.indices
            .iter()
            .find_map(|&(v, index)| (v == variable).then_some(index))
    }
}

/// A function input: a variable or an earlier function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Input {
    Variable(VariableId),
    Function(FunctionId),
}

impl From<VariableId> for Input {
    fn from(id: VariableId) -> Self {
        Self::Variable(id)
    }
}

impl From<FunctionId> for Input {
    fn from(id: FunctionId) -> Self {
        Self::Function(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Linear,
    Quadratic,
    Unimodal,
    /// Relationship known only through its samples; never fitted.
    Implicit,
}

impl ModelKind {
    pub fn fit_degree(self) -> Option<usize> {
        match self {
            Self::Linear => Some(1),
            Self::Quadratic | Self::Unimodal => Some(2),
            Self::Implicit => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionKind {
    Log,
    Abs,
    Gradient,
    /// `a - b`.
    Diff,
    /// 0 below the operand, 1 at or above it.
    Threshold,
    /// `x - operand`.
    Distance,
    /// `Σ cᵢ·xᵢ`, plus an intercept when one extra coefficient is given.
    Linear,
    Model(ModelKind),
}

impl FunctionKind {
    fn arity(self) -> Option<usize> {
        match self {
            Self::Log | Self::Abs | Self::Gradient | Self::Threshold | Self::Distance => Some(1),
            Self::Diff => Some(2),
            Self::Linear | Self::Model(_) => None,
        }
    }

    fn needs_operand(self) -> bool {
        matches!(self, Self::Threshold | Self::Distance)
    }
}

/// Describes a function before it is added to a region.
///
/// ```ignore
/// let time = region.add_function(
///     FunctionBuilder::new(FunctionKind::Model(ModelKind::Unimodal), "time", DataType::Double, 64)
///         .input(threads)
///         .provider(Provider::slot(elapsed.clone())),
/// )?;
/// ```
pub struct FunctionBuilder {
    kind: FunctionKind,
    name: String,
    data_type: DataType,
    capacity: usize,
    inputs: Vec<Input>,
    coefficients: Vec<f64>,
    operand: Option<f64>,
    provider: Option<Provider>,
    location: UpdateLocation,
    policy: UpdatePolicy,
}

impl FunctionBuilder {
    pub fn new(kind: FunctionKind, name: &str, data_type: DataType, capacity: usize) -> Self {
        Self {
            kind,
            name: name.to_string(),
            data_type,
            capacity,
            inputs: Vec::new(),
            coefficients: Vec::new(),
            operand: None,
            provider: None,
            location: UpdateLocation::End,
            policy: UpdatePolicy::Straight,
        }
    }

    pub fn input(mut self, input: impl Into<Input>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn inputs<I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Input>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn coefficients(mut self, coefficients: Vec<f64>) -> Self {
        self.coefficients = coefficients;
        self
    }

    /// Threshold or target of `Threshold` / `Distance`.
    pub fn operand(mut self, operand: impl Into<Value>) -> Self {
        self.operand = Some(operand.into().as_f64());
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn location(mut self, location: UpdateLocation) -> Self {
        self.location = location;
        self
    }

    pub fn policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn validate(&self, max_inputs: usize) -> RtResult<()> {
        let name = &self.name;
        if self.capacity == 0 {
            return Err(validation_error!("{name}: history capacity must be at least 1"));
        }
        if self.inputs.len() > max_inputs {
            return Err(RtError::CapacityExceeded {
                kind: EntityKind::Input,
                limit: max_inputs,
            });
        }
        if let Some(arity) = self.kind.arity() {
            if self.inputs.len() != arity {
                return Err(validation_error!(
                    "{name}: {:?} takes {arity} input(s), got {}",
                    self.kind,
                    self.inputs.len()
                ));
            }
        }
        if self.kind == FunctionKind::Linear {
            if self.inputs.is_empty() {
                return Err(validation_error!("{name}: linear combination needs inputs"));
            }
            let (n, c) = (self.inputs.len(), self.coefficients.len());
            if c != 0 && c != n && c != n + 1 {
                return Err(validation_error!(
                    "{name}: {c} coefficients for {n} inputs"
                ));
            }
        }
        if self.kind.needs_operand() && self.operand.is_none() {
            return Err(validation_error!("{name}: {:?} needs an operand", self.kind));
        }
        if matches!(self.kind, FunctionKind::Model(_)) && self.provider.is_none() {
            return Err(validation_error!("{name}: models read from a provider"));
        }
        if !self.policy.is_batch() {
            return Err(validation_error!(
                "{name}: functions take Straight or Accumulate, got {:?}",
                self.policy
            ));
        }
        Ok(())
    }
}

pub struct Function {
    pub(crate) trace: Trace,
    kind: FunctionKind,
    pub(crate) status: FunctionStatus,
    location: UpdateLocation,
    policy: UpdatePolicy,
    pub(crate) inputs: Vec<Input>,
    coefficients: Vec<f64>,
    operand: f64,
    /// One row per stored sample.
    pub(crate) input_table: Vec<InputRow>,
    pub(crate) consumers: Vec<ObjectiveId>,
    active_variable: Option<VariableId>,
    fit: Option<PolyFit>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.trace.name
    }

    pub fn kind(&self) -> FunctionKind {
        self.kind
    }

    pub fn status(&self) -> FunctionStatus {
        self.status
    }

    pub fn value(&self) -> Value {
        self.trace.current
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

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn input_table(&self) -> &[InputRow] {
        &self.input_table
    }

    pub fn consumers(&self) -> &[ObjectiveId] {
        &self.consumers
    }

    /// The input variable whose batch drove the latest update.
    pub fn active_variable(&self) -> Option<VariableId> {
        self.active_variable
    }

    pub fn location(&self) -> UpdateLocation {
        self.location
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    pub fn fit(&self) -> Option<&PolyFit> {
        self.fit.as_ref()
    }

    /// Abscissa of the extremum of a fitted unimodal model.
    pub fn vertex(&self) -> Option<f64> {
        match self.kind {
            FunctionKind::Model(ModelKind::Unimodal) => self.fit.as_ref()?.vertex(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("trace", &self.trace)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("inputs", &self.inputs)
            .finish()
    }
}

fn linear(coefficients: &[f64], xs: &[f64]) -> f64 {
    if coefficients.is_empty() {
        return xs.iter().sum();
    }
    let weighted: f64 = coefficients.iter().zip(xs).map(|(c, x)| c * x).sum();
    let intercept = coefficients.get(xs.len()).copied().unwrap_or(0.0);
    weighted + intercept
}

/// Function registration, evaluation and fitting.
impl Region {
    pub fn function(&self, id: FunctionId) -> RtResult<&Function> {
        self.functions.get(id.0).ok_or(RtError::InvalidHandle {
            kind: EntityKind::Function,
            index: id.0,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions.iter().enumerate().map(|(i, f)| (FunctionId(i), f))
    }

    fn check_input(&self, input: Input) -> RtResult<()> {
        match input {
            Input::Variable(v) => self.variable(v).map(|_| ()),
            Input::Function(f) => self.function(f).map(|_| ()),
        }
    }

    pub fn add_function(&mut self, builder: FunctionBuilder) -> RtResult<FunctionId> {
        let limit = self.config.capacities.max_functions;
        if self.functions.len() >= limit {
            warn!(region = %self.name, function = %builder.name, limit, "function capacity exceeded");
            return Err(RtError::CapacityExceeded {
                kind: EntityKind::Function,
                limit,
            });
        }
        builder.validate(self.config.capacities.max_inputs)?;
        for &input in &builder.inputs {
            self.check_input(input)?;
        }

        let id = FunctionId(self.functions.len());
        for input in &builder.inputs {
            if let Input::Variable(v) = input {
                let consumers = &mut self.variables[v.0].consumers;
                if !consumers.contains(&id) {
                    consumers.push(id);
                }
            }
        }
        let mut trace = Trace::new(&builder.name, builder.data_type, builder.capacity);
        trace.provider = builder.provider;
        debug!(region = %self.name, function = %builder.name, kind = ?builder.kind, "function added");
        self.functions.push(Function {
            trace,
            kind: builder.kind,
            status: FunctionStatus::Created,
            location: builder.location,
            policy: builder.policy,
            inputs: builder.inputs,
            coefficients: builder.coefficients,
            operand: builder.operand.unwrap_or(0.0),
            input_table: Vec::new(),
            consumers: Vec::new(),
            active_variable: None,
            fit: None,
        });
        Ok(id)
    }

    pub fn add_log(&mut self, name: &str, data_type: DataType, capacity: usize, x: impl Into<Input>) -> RtResult<FunctionId> {
        self.add_function(FunctionBuilder::new(FunctionKind::Log, name, data_type, capacity).input(x))
    }

    pub fn add_abs(&mut self, name: &str, data_type: DataType, capacity: usize, x: impl Into<Input>) -> RtResult<FunctionId> {
        self.add_function(FunctionBuilder::new(FunctionKind::Abs, name, data_type, capacity).input(x))
    }

    pub fn add_gradient(&mut self, name: &str, data_type: DataType, capacity: usize, x: impl Into<Input>) -> RtResult<FunctionId> {
        self.add_function(FunctionBuilder::new(FunctionKind::Gradient, name, data_type, capacity).input(x))
    }

    pub fn add_diff(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
        a: impl Into<Input>,
        b: impl Into<Input>,
    ) -> RtResult<FunctionId> {
        self.add_function(
            FunctionBuilder::new(FunctionKind::Diff, name, data_type, capacity)
                .input(a)
                .input(b),
        )
    }

    pub fn add_threshold(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
        x: impl Into<Input>,
        threshold: impl Into<Value>,
    ) -> RtResult<FunctionId> {
        self.add_function(
            FunctionBuilder::new(FunctionKind::Threshold, name, data_type, capacity)
                .input(x)
                .operand(threshold),
        )
    }

    pub fn add_distance(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
        x: impl Into<Input>,
        target: impl Into<Value>,
    ) -> RtResult<FunctionId> {
        self.add_function(
            FunctionBuilder::new(FunctionKind::Distance, name, data_type, capacity)
                .input(x)
                .operand(target),
        )
    }

    /// `Σ cᵢ·xᵢ`, plus a trailing intercept; no coefficients sums the inputs.
    pub fn add_linear(
        &mut self,
        name: &str,
        data_type: DataType,
        capacity: usize,
        inputs: &[Input],
        coefficients: Vec<f64>,
    ) -> RtResult<FunctionId> {
        self.add_function(
            FunctionBuilder::new(FunctionKind::Linear, name, data_type, capacity)
                .inputs(inputs.iter().copied())
                .coefficients(coefficients),
        )
    }

    pub fn add_model(
        &mut self,
        kind: ModelKind,
        name: &str,
        data_type: DataType,
        capacity: usize,
        provider: Provider,
        inputs: &[Input],
    ) -> RtResult<FunctionId> {
        self.add_function(
            FunctionBuilder::new(FunctionKind::Model(kind), name, data_type, capacity)
                .inputs(inputs.iter().copied())
                .provider(provider),
        )
    }

    /// Every variable reachable from `inputs`, in first-seen order.
    pub(crate) fn input_variables(&self, inputs: &[Input], out: &mut Vec<VariableId>) {
        for input in inputs {
            match *input {
                Input::Variable(v) => {
                    if !out.contains(&v) {
                        out.push(v);
                    }
                }
                Input::Function(f) => {
                    if let Some(function) = self.functions.get(f.0) {
                        self.input_variables(&function.inputs, out);
                    }
                }
            }
        }
    }

    /// The input variable whose latest batch started most recently.
    fn driver_of(&self, inputs: &[Input]) -> Option<VariableId> {
        let mut candidates = Vec::new();
        self.input_variables(inputs, &mut candidates);
        let mut driver: Option<(VariableId, Option<u64>)> = None;
        for v in candidates {
            let start = self.variables[v.0].last_batch_start;
            if driver.map_or(true, |(_, best)| start > best) {
                driver = Some((v, start));
            }
        }
        driver.map(|(v, _)| v)
    }

    fn trace_of(&self, input: Input) -> &Trace {
        match input {
            Input::Variable(v) => &self.variables[v.0].trace,
            Input::Function(f) => &self.functions[f.0].trace,
        }
    }

    fn input_row(&self, inputs: &[Input]) -> Option<InputRow> {
        let values = inputs
            .iter()
            .map(|&input| self.trace_of(input).latest)
            .collect::<Option<Vec<_>>>()?;
        let mut reachable = Vec::new();
        self.input_variables(inputs, &mut reachable);
        let indices = reachable
            .into_iter()
            .filter_map(|v| {
                let variable = &self.variables[v.0];
                variable
                    .has_selected()
                    .then(|| variable.index())
                    .flatten()
                    .map(|index| (v, index))
            })
            .collect();
        Some(InputRow { values, indices })
    }

    /// Abscissa of every stored sample of `function`: the value of its first
    /// input variable at that sample, or the sample's iteration when it has
    /// no variable input.
    fn abscissae(&self, function: &Function) -> Vec<f64> {
        let first_variable = function.inputs.iter().enumerate().find_map(|(k, input)| match input {
            Input::Variable(v) => Some((k, *v)),
            Input::Function(_) => None,
        });
        match first_variable {
            Some((k, _)) => function
                .input_table
                .iter()
                .map(|row| row.values.get(k).map_or(f64::NAN, |value| value.as_f64()))
                .collect(),
            None => function.trace.iterations.iter().map(|&i| i as f64).collect(),
        }
    }

    /// Slope between the newest sample of `input` and the most recent
    /// earlier sample with a different abscissa.
    fn slope_of(&self, input: Input) -> Option<f64> {
        let (ys, xs) = match input {
            Input::Variable(v) => {
                let trace = &self.variables[v.0].trace;
                let xs = trace.iterations.iter().map(|&i| i as f64).collect::<Vec<_>>();
                (trace.history.to_f64_vec(), xs)
            }
            Input::Function(f) => {
                let function = &self.functions[f.0];
                (function.trace.history.to_f64_vec(), self.abscissae(function))
            }
        };
        let last = ys.len().checked_sub(1)?;
        let x2 = *xs.get(last)?;
        let k = (0..last).rev().find(|&k| xs.get(k).map_or(false, |&x| x != x2))?;
        gradient(xs[k], ys[k], x2, ys[last])
    }

    fn transform(&self, function: &Function) -> Option<f64> {
        let xs: Vec<f64> = function
            .inputs
            .iter()
            .map(|&input| self.trace_of(input).latest.map(|v| v.as_f64()))
            .collect::<Option<_>>()?;
        let x = xs.first().copied()?;
        Some(match function.kind {
            FunctionKind::Log => x.ln(),
            FunctionKind::Abs => x.abs(),
            FunctionKind::Diff => x - xs.get(1).copied()?,
            FunctionKind::Threshold => {
                if x < function.operand {
                    0.0
                } else {
                    1.0
                }
            }
            FunctionKind::Distance => x - function.operand,
            FunctionKind::Gradient => self.slope_of(*function.inputs.first()?)?,
            FunctionKind::Linear => linear(&function.coefficients, &xs),
            FunctionKind::Model(_) => return None,
        })
    }

    pub(crate) fn update_functions(&mut self, boundary: Boundary) {
        for index in 0..self.functions.len() {
            self.update_function(FunctionId(index), boundary);
        }
    }

    fn update_function(&mut self, id: FunctionId, boundary: Boundary) {
        let iteration = self.iteration;
        let function = &self.functions[id.0];
        if !function.location.samples_at(boundary) {
            return;
        }
        let driver = self.driver_of(&function.inputs);
        let phase = match driver {
            Some(v) if !self.variables[v.0].is_live(iteration) => return,
            Some(v) => self.variables[v.0].schedule.phase(iteration),
            None => BatchPhase::InBatch {
                first: true,
                last: true,
            },
        };
        let Some(row) = self.input_row(&function.inputs) else {
            return;
        };
        let reading = match function.kind {
            FunctionKind::Model(_) => None,
            _ => match self.transform(function) {
                Some(x) => Some(Value::from_f64(function.trace.data_type, x)),
                None => return,
            },
        };

        let function = &mut self.functions[id.0];
        let reading = match reading {
            Some(value) => value,
            None => match function.trace.provider.as_mut() {
                Some(provider) => provider.read(),
                None => return,
            },
        };
        function.active_variable = driver;
        let (location, policy) = (function.location, function.policy);
        match function
            .trace
            .observe(location, policy, boundary, phase, reading, iteration)
        {
            Recorded::Stored(_) => {
                function.input_table.push(row);
                function.status.advance(FunctionEvent::Sampled);
            }
            Recorded::Dropped => {
                if function.status.advance(FunctionEvent::Filled) {
                    debug!(function = %function.trace.name, "history full");
                }
            }
            Recorded::Nothing => {}
        }
    }

    /// Least-squares fit of a model's samples against its first input
    /// variable.
    pub fn fit_model(&mut self, id: FunctionId) -> RtResult<PolyFit> {
        let function = self.function(id)?;
        let FunctionKind::Model(kind) = function.kind else {
            return Err(validation_error!("{}: only models can be fitted", function.name()));
        };
        let Some(degree) = kind.fit_degree() else {
            return Err(validation_error!("{}: {kind:?} models are not fitted", function.name()));
        };
        let xs = self.abscissae(function);
        let ys = function.trace.history.to_f64_vec();
        let fit = fit_polynomial(&xs, &ys, degree).ok_or_else(|| {
            validation_error!(
                "{}: {} samples do not determine a degree-{degree} fit",
                function.name(),
                ys.len()
            )
        })?;
        let function = &mut self.functions[id.0];
        function.fit = Some(fit.clone());
        function.status.advance(FunctionEvent::Fitted);
        debug!(function = %function.trace.name, r_squared = fit.r_squared, "model fitted");
        Ok(fit)
    }

    pub fn format_function_history(&self, id: FunctionId) -> RtResult<String> {
        Ok(self.function(id)?.trace.format_history())
    }
}
