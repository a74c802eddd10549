//! Structured tuning events.
//!
//! Regions emit [`TuningEvent`]s on an optional channel supplied by the
//! host. Sending is best-effort: a full or disconnected channel never
//! interrupts tuning.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use rt_types::{Boundary, RegionStatus, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TuningEventKind {
    RegionStatusChanged {
        from: RegionStatus,
        to: RegionStatus,
    },
    ObjectiveMet {
        objective: String,
        score: f64,
        sample: usize,
    },
    /// A configured value reached the application, or was queued for the
    /// next host read when `deferred`.
    ConfigurationApplied {
        variable: String,
        value: Value,
        deferred: bool,
    },
    ObjectiveRetired {
        objective: String,
    },
    ObjectiveResumed {
        objective: String,
    },
    BarrierFailed {
        boundary: Boundary,
        message: String,
    },
}

/// A single event emitted by a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub region: String,
    pub iteration: u64,
    pub kind: TuningEventKind,
}

impl TuningEvent {
    pub fn new(region: impl Into<String>, iteration: u64, kind: TuningEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            region: region.into(),
            iteration,
            kind,
        }
    }
}

/// Optional sending half of the host's event channel.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink(Option<Sender<TuningEvent>>);

impl EventSink {
    pub(crate) fn new(tx: Sender<TuningEvent>) -> Self {
        Self(Some(tx))
    }

    pub(crate) fn emit(&self, event: TuningEvent) {
        let Some(tx) = &self.0 else {
            return;
        };
        // Best-effort send; if the receiver is gone we just log.
        if tx.try_send(event).is_err() {
            debug!("tuning event dropped: receiver full or disconnected");
        }
    }
}
