//! Per-kind lifecycles.
//!
//! Variables, functions, objectives and regions each have their own status
//! type with the subset of transitions legal for that kind. A transition
//! either yields the next status or `None` when the event does not apply.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Common shape of every entity lifecycle.
pub trait Lifecycle: Copy + Debug + PartialEq {
    type Event: Copy + Debug;

    /// The status reached from `self` on `event`, if the transition is legal.
    fn transition(self, event: Self::Event) -> Option<Self>;

    /// Apply `event` in place; returns whether the status changed.
    fn advance(&mut self, event: Self::Event) -> bool {
        match self.transition(event) {
            Some(next) if next != *self => {
                *self = next;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableStatus {
    Created,
    Sampling,
    /// A SERIES pass has finished; the last value is held.
    Exhausted,
    /// An objective's configuration has been applied; the value is held.
    Configured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableEvent {
    Sampled,
    DomainExhausted,
    ConfigApplied,
    Released,
}

impl Lifecycle for VariableStatus {
    type Event = VariableEvent;

    fn transition(self, event: VariableEvent) -> Option<Self> {
        use VariableEvent as E;
        use VariableStatus as S;
        match (self, event) {
            (S::Created | S::Sampling, E::Sampled) => Some(S::Sampling),
            (S::Created | S::Sampling, E::DomainExhausted) => Some(S::Exhausted),
            (S::Created | S::Sampling | S::Exhausted | S::Configured, E::ConfigApplied) => {
                Some(S::Configured)
            }
            (S::Configured | S::Exhausted, E::Released) => Some(S::Sampling),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionStatus {
    Created,
    Sampling,
    /// A model has been fitted to the recorded samples.
    Modeled,
    /// The history reached its capacity; no further samples are stored.
    HistoryFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionEvent {
    Sampled,
    Fitted,
    Filled,
}

impl Lifecycle for FunctionStatus {
    type Event = FunctionEvent;

    fn transition(self, event: FunctionEvent) -> Option<Self> {
        use FunctionEvent as E;
        use FunctionStatus as S;
        match (self, event) {
            (S::Created, E::Sampled) => Some(S::Sampling),
            (S::Sampling | S::Modeled, E::Sampled) => Some(self),
            (S::Sampling | S::Modeled, E::Fitted) => Some(S::Modeled),
            (S::HistoryFull, E::Fitted) => Some(S::HistoryFull),
            (S::Created | S::Sampling | S::Modeled, E::Filled) => Some(S::HistoryFull),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveStatus {
    Created,
    Sampling,
    ToBeEvaluated,
    Evaluating,
    Met,
    InAction,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveEvent {
    SamplingStarted,
    InputsUpdated,
    EvaluationStarted,
    Converged,
    Applied,
    Retire,
    Resume,
}

impl ObjectiveStatus {
    /// Met, applied or retired.
    pub fn is_met(self) -> bool {
        matches!(self, Self::Met | Self::InAction | Self::Retired)
    }
}

impl Lifecycle for ObjectiveStatus {
    type Event = ObjectiveEvent;

    fn transition(self, event: ObjectiveEvent) -> Option<Self> {
        use ObjectiveEvent as E;
        use ObjectiveStatus as S;
        match (self, event) {
            (S::Created, E::SamplingStarted) => Some(S::Sampling),
            (S::Sampling | S::Evaluating, E::InputsUpdated) => Some(S::ToBeEvaluated),
            (S::ToBeEvaluated, E::EvaluationStarted) => Some(S::Evaluating),
            (S::Evaluating, E::Converged) => Some(S::Met),
            (S::Met, E::Applied) => Some(S::InAction),
            (S::InAction, E::Retire) => Some(S::Retired),
            (S::InAction, E::Resume) => Some(S::Sampling),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionStatus {
    Created,
    Tuning,
    AllObjectivesMet,
    TuningComplete,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionEvent {
    Began,
    AllObjectivesMet,
    ObjectiveResumed,
    AllObjectivesRetired,
    ConfigurationSettled,
}

impl RegionStatus {
    /// No further sampling or evaluation happens in these states.
    pub fn is_tuning_done(self) -> bool {
        matches!(self, Self::TuningComplete | Self::Complete)
    }
}

impl Lifecycle for RegionStatus {
    type Event = RegionEvent;

    fn transition(self, event: RegionEvent) -> Option<Self> {
        use RegionEvent as E;
        use RegionStatus as S;
        match (self, event) {
            (S::Created, E::Began) => Some(S::Tuning),
            (S::Tuning, E::AllObjectivesMet) => Some(S::AllObjectivesMet),
            (S::AllObjectivesMet, E::ObjectiveResumed) => Some(S::Tuning),
            (S::Tuning | S::AllObjectivesMet, E::AllObjectivesRetired) => Some(S::TuningComplete),
            (S::TuningComplete, E::ConfigurationSettled) => Some(S::Complete),
            _ => None,
        }
    }
}
