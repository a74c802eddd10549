//! The record shared by variables and functions: current value, bounded
//! histories, accumulators and the capabilities connecting it to the host.

use rt_types::{
    Applier, BatchPhase, Boundary, DataType, History, Provider, UpdateLocation, UpdatePolicy,
    Value,
};

/// Called with the entity name and the committed value after every commit.
pub type SampleCallback = Box<dyn FnMut(&str, Value) + Send>;

/// Outcome of feeding a reading into a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recorded {
    /// Nothing committed to the main history (accumulating, begin side, ...).
    Nothing,
    Stored(usize),
    /// A sample was due but the history is full.
    Dropped,
}

pub(crate) struct Trace {
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    pub(crate) current: Value,
    /// Last committed value, kept even once the history is full.
    pub(crate) latest: Option<Value>,
    pub(crate) history: History,
    /// Begin-side samples of a `BeginEnd` entity.
    pub(crate) begin_history: History,
    /// Iteration at which each stored sample was committed.
    pub(crate) iterations: Vec<u64>,
    /// Begin accumulator, or the base of a `BeginEndDiff` pair.
    begin_acc: Option<Value>,
    /// End accumulator, or the accumulated differences.
    end_acc: Option<Value>,
    pub(crate) provider: Option<Provider>,
    pub(crate) applier: Option<Applier>,
    pub(crate) callback: Option<SampleCallback>,
}

impl Trace {
    pub(crate) fn new(name: impl Into<String>, data_type: DataType, capacity: usize) -> Self {
        Self {
            name: name.into(),
            data_type,
            current: Value::zero(data_type),
            latest: None,
            history: History::new(data_type, capacity),
            begin_history: History::new(data_type, capacity),
            iterations: Vec::new(),
            begin_acc: None,
            end_acc: None,
            provider: None,
            applier: None,
            callback: None,
        }
    }

    pub(crate) fn commit(&mut self, value: Value, iteration: u64) -> Recorded {
        let value = value.cast(self.data_type);
        self.current = value;
        self.latest = Some(value);
        if let Some(callback) = self.callback.as_mut() {
            callback(&self.name, value);
        }
        match self.history.push(value) {
            Some(index) => {
                self.iterations.push(iteration);
                Recorded::Stored(index)
            }
            None => Recorded::Dropped,
        }
    }

    /// Feed one reading taken at `boundary` of an in-batch iteration.
    pub(crate) fn observe(
        &mut self,
        location: UpdateLocation,
        policy: UpdatePolicy,
        boundary: Boundary,
        phase: BatchPhase,
        reading: Value,
        iteration: u64,
    ) -> Recorded {
        let reading = reading.cast(self.data_type);
        let accumulate = policy == UpdatePolicy::Accumulate;
        match (location, boundary) {
            (UpdateLocation::BeginEndDiff, Boundary::Begin) => {
                self.begin_acc = Some(reading);
                Recorded::Nothing
            }
            (UpdateLocation::BeginEndDiff, Boundary::End) => {
                let Some(base) = self.begin_acc.take() else {
                    return Recorded::Nothing;
                };
                let diff = reading.sub(base);
                self.current = diff;
                self.fold(diff, accumulate, phase, iteration)
            }
            (UpdateLocation::BeginEnd, Boundary::Begin) => {
                self.current = reading;
                let sum = if accumulate {
                    self.begin_acc.take().map_or(reading, |acc| acc.add(reading))
                } else {
                    reading
                };
                if !accumulate || phase.is_last() {
                    self.begin_history.push(sum);
                } else {
                    self.begin_acc = Some(sum);
                }
                Recorded::Nothing
            }
            _ => {
                self.current = reading;
                self.fold(reading, accumulate, phase, iteration)
            }
        }
    }

    fn fold(&mut self, value: Value, accumulate: bool, phase: BatchPhase, iteration: u64) -> Recorded {
        if !accumulate {
            return self.commit(value, iteration);
        }
        let sum = self.end_acc.take().map_or(value, |acc| acc.add(value));
        if phase.is_last() {
            self.commit(sum, iteration)
        } else {
            self.end_acc = Some(sum);
            Recorded::Nothing
        }
    }

    /// One line per stored sample: `index iteration value`.
    pub(crate) fn format_history(&self) -> String {
        let mut out = format!("# {} ({:?}, {} samples)\n", self.name, self.data_type, self.history.len());
        for (i, value) in self.history.iter().enumerate() {
            let iteration = self.iterations.get(i).copied().unwrap_or_default();
            out.push_str(&format!("{i}\t{iteration}\t{value}\n"));
        }
        out
    }
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("current", &self.current)
            .field("samples", &self.history.len())
            .field("provider", &self.provider)
            .field("applier", &self.applier)
            .finish()
    }
}
