//! Update location, update policy and cadence of variables and functions.

use serde::{Deserialize, Serialize};

/// Where in the region an entity is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateLocation {
    Begin,
    End,
    /// Sampled at both points into two independent histories.
    BeginEnd,
    /// Sampled at both points; only `end - begin` is recorded.
    BeginEndDiff,
}

/// One of the two hook points of a region iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Boundary {
    Begin,
    End,
}

impl UpdateLocation {
    /// Whether an entity with this location reads a value at `boundary`.
    pub fn samples_at(self, boundary: Boundary) -> bool {
        match (self, boundary) {
            (Self::Begin, Boundary::Begin) | (Self::End, Boundary::End) => true,
            (Self::BeginEnd | Self::BeginEndDiff, _) => true,
            _ => false,
        }
    }

    /// The boundary at which a value is chosen for entities that select
    /// rather than measure (list, range, counter, ...).
    pub fn selection_boundary(self) -> Boundary {
        match self {
            Self::End => Boundary::End,
            _ => Boundary::Begin,
        }
    }
}

/// How a batch of readings is turned into committed samples, and how list
/// and range domains are traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdatePolicy {
    /// Every in-batch reading is committed as its own sample.
    Straight,
    /// In-batch readings are summed and committed once at the end of the batch.
    Accumulate,
    Random,
    RandomUnique,
    /// Domain order, one pass, then hold the last value.
    Series,
    SeriesCyclic,
    FollowObjective,
}

impl UpdatePolicy {
    pub fn is_batch(self) -> bool {
        matches!(self, Self::Straight | Self::Accumulate)
    }

    pub fn is_selection(self) -> bool {
        !self.is_batch()
    }
}

/// How the value chosen for a variable reaches the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ApplyPolicy {
    /// The applier runs every time the value changes.
    #[default]
    OnUpdate,
    /// The applier runs every time the host reads the value.
    OnRead,
}

/// Position of an iteration within an entity's update cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    InBatch { first: bool, last: bool },
}

impl BatchPhase {
    pub fn in_batch(self) -> bool {
        matches!(self, Self::InBatch { .. })
    }

    pub fn is_first(self) -> bool {
        matches!(self, Self::InBatch { first: true, .. })
    }

    pub fn is_last(self) -> bool {
        matches!(self, Self::InBatch { last: true, .. })
    }
}

/// Iteration cadence: nothing before `start`, then a batch of `batch_size`
/// iterations beginning every `max(stride, batch_size)` iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSchedule {
    pub start: u64,
    pub batch_size: u32,
    pub stride: u32,
}

impl Default for UpdateSchedule {
    fn default() -> Self {
        Self {
            start: 0,
            batch_size: 1,
            stride: 1,
        }
    }
}

impl UpdateSchedule {
    pub fn new(start: u64, batch_size: u32, stride: u32) -> Self {
        Self {
            start,
            batch_size: batch_size.max(1),
            stride: stride.max(1),
        }
    }

    pub fn period(&self) -> u64 {
        u64::from(self.stride.max(self.batch_size).max(1))
    }

    pub fn phase(&self, iteration: u64) -> BatchPhase {
        if iteration < self.start {
            return BatchPhase::Idle;
        }
        let batch = u64::from(self.batch_size.max(1));
        let offset = (iteration - self.start) % self.period();
        if offset < batch {
            BatchPhase::InBatch {
                first: offset == 0,
                last: offset + 1 == batch,
            }
        } else {
            BatchPhase::Idle
        }
    }

    /// Iteration at which the batch containing (or preceding) `iteration`
    /// started, if any.
    pub fn batch_start(&self, iteration: u64) -> Option<u64> {
        if iteration < self.start {
            return None;
        }
        let offset = (iteration - self.start) % self.period();
        Some(iteration - offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_updates_every_iteration() {
        let s = UpdateSchedule::default();
        for i in 0..5 {
            assert_eq!(s.phase(i), BatchPhase::InBatch { first: true, last: true });
        }
    }

    #[test]
    fn start_stride_and_batch() {
        let s = UpdateSchedule::new(2, 2, 4);
        let phases: Vec<_> = (0..10).map(|i| s.phase(i)).collect();
        assert_eq!(phases[0], BatchPhase::Idle);
        assert_eq!(phases[1], BatchPhase::Idle);
        assert_eq!(phases[2], BatchPhase::InBatch { first: true, last: false });
        assert_eq!(phases[3], BatchPhase::InBatch { first: false, last: true });
        assert_eq!(phases[4], BatchPhase::Idle);
        assert_eq!(phases[5], BatchPhase::Idle);
        assert_eq!(phases[6], BatchPhase::InBatch { first: true, last: false });
        assert_eq!(s.batch_start(7), Some(6));
        assert_eq!(s.batch_start(1), None);
    }

    #[test]
    fn batch_longer_than_stride_is_back_to_back() {
        let s = UpdateSchedule::new(0, 3, 1);
        assert!(s.phase(2).is_last());
        assert!(s.phase(3).is_first());
    }

    #[test]
    fn location_sampling_points() {
        assert!(UpdateLocation::Begin.samples_at(Boundary::Begin));
        assert!(!UpdateLocation::Begin.samples_at(Boundary::End));
        assert!(UpdateLocation::BeginEndDiff.samples_at(Boundary::Begin));
        assert!(UpdateLocation::BeginEndDiff.samples_at(Boundary::End));
        assert_eq!(UpdateLocation::End.selection_boundary(), Boundary::End);
        assert_eq!(UpdateLocation::BeginEnd.selection_boundary(), Boundary::Begin);
    }

    #[test]
    fn policy_classes() {
        assert!(UpdatePolicy::Accumulate.is_batch());
        assert!(UpdatePolicy::FollowObjective.is_selection());
    }
}
