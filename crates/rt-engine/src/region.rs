//! The region controller: one tuned code section, driven by the host's
//! `begin`/`end` calls.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rt_types::{
    Boundary, Lifecycle, ObjectiveStatus, RegionEvent, RegionStatus, RtError, RtResult,
    TuningConfig,
};

use crate::events::{EventSink, TuningEvent, TuningEventKind};
use crate::function::Function;
use crate::objective::Objective;
use crate::variable::Variable;

/// Handle of a region within its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionId(pub(crate) usize);

impl RegionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Called with the region name and the current iteration.
pub type RegionCallback = Box<dyn FnMut(&str, u64) + Send>;

/// Synchronisation point the host runs before a synced boundary.
pub trait Barrier {
    fn wait(&mut self) -> Result<(), String>;
}

impl<F> Barrier for F
where
    F: FnMut() -> Result<(), String>,
{
    fn wait(&mut self) -> Result<(), String> {
        self()
    }
}

pub struct Region {
    pub(crate) id: RegionId,
    pub(crate) name: String,
    label: Option<String>,
    pub(crate) status: RegionStatus,
    count: u64,
    pub(crate) iteration: u64,
    pub(crate) config: TuningConfig,
    pub(crate) variables: Vec<Variable>,
    pub(crate) functions: Vec<Function>,
    pub(crate) objectives: Vec<Objective>,
    begin_callbacks: Vec<RegionCallback>,
    end_callbacks: Vec<RegionCallback>,
    pub(crate) events: EventSink,
    pub(crate) rng: ChaCha8Rng,
}

impl Region {
    pub fn new(name: &str, config: TuningConfig) -> RtResult<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        debug!(region = name, seed, "region created");
        Ok(Self {
            id: RegionId(0),
            name: name.to_string(),
            label: None,
            status: RegionStatus::Created,
            count: 0,
            iteration: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            variables: Vec::new(),
            functions: Vec::new(),
            objectives: Vec::new(),
            begin_callbacks: Vec::new(),
            end_callbacks: Vec::new(),
            events: EventSink::default(),
        })
    }

    pub fn with_event_sink(mut self, tx: crossbeam_channel::Sender<TuningEvent>) -> Self {
        self.set_event_sink(tx);
        self
    }

    pub fn set_event_sink(&mut self, tx: crossbeam_channel::Sender<TuningEvent>) {
        self.events = EventSink::new(tx);
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = Some(label.to_string());
    }

    pub fn status(&self) -> RegionStatus {
        self.status
    }

    /// Number of `begin` calls so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Zero-based index of the current (or last) iteration.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    pub fn add_begin_callback(&mut self, callback: RegionCallback) {
        self.begin_callbacks.push(callback);
    }

    pub fn add_end_callback(&mut self, callback: RegionCallback) {
        self.end_callbacks.push(callback);
    }

    fn emit(&self, kind: TuningEventKind) {
        self.events.emit(TuningEvent::new(&self.name, self.iteration, kind));
    }

    fn advance_status(&mut self, event: RegionEvent) {
        let from = self.status;
        if self.status.advance(event) {
            info!(region = %self.name, ?from, to = ?self.status, iteration = self.iteration, "region status changed");
            self.emit(TuningEventKind::RegionStatusChanged {
                from,
                to: self.status,
            });
        }
    }

    fn update_variables(&mut self, boundary: Boundary) {
        let iteration = self.iteration;
        for variable in &mut self.variables {
            variable.update(boundary, iteration, &mut self.rng);
        }
    }

    /// Start of one execution of the region.
    pub fn begin(&mut self) {
        self.iteration = self.count;
        self.count += 1;
        if self.status == RegionStatus::Created {
            self.advance_status(RegionEvent::Began);
        }
        if !self.status.is_tuning_done() {
            self.start_objectives();
            self.request_probes();
            self.update_variables(Boundary::Begin);
            self.update_functions(Boundary::Begin);
        }
        let iteration = self.iteration;
        for callback in &mut self.begin_callbacks {
            callback(&self.name, iteration);
        }
    }

    /// End of one execution of the region.
    pub fn end(&mut self) {
        if !self.status.is_tuning_done() {
            self.update_variables(Boundary::End);
            self.update_functions(Boundary::End);
            self.evaluate_objectives();
            self.advance_in_action();
        }
        self.refresh_status();
        let iteration = self.iteration;
        for callback in &mut self.end_callbacks {
            callback(&self.name, iteration);
        }
    }

    fn refresh_status(&mut self) {
        if self.objectives.is_empty() {
            return;
        }
        let retired = self
            .objectives
            .iter()
            .all(|o| o.status == ObjectiveStatus::Retired);
        let met = self.objectives.iter().all(|o| o.status.is_met());
        if retired {
            self.advance_status(RegionEvent::AllObjectivesRetired);
        } else if met {
            self.advance_status(RegionEvent::AllObjectivesMet);
        } else {
            self.advance_status(RegionEvent::ObjectiveResumed);
        }
        if self.status == RegionStatus::TuningComplete
            && !self.variables.iter().any(Variable::is_apply_pending)
        {
            self.advance_status(RegionEvent::ConfigurationSettled);
        }
    }

    fn sync(&mut self, barrier: &mut dyn Barrier, boundary: Boundary) -> RtResult<()> {
        barrier.wait().map_err(|message| {
            warn!(region = %self.name, ?boundary, %message, "barrier failed");
            self.emit(TuningEventKind::BarrierFailed {
                boundary,
                message: message.clone(),
            });
            RtError::Barrier(message)
        })
    }

    /// `begin` after the host's barrier. A failed barrier leaves the region
    /// untouched.
    pub fn begin_synced(&mut self, barrier: &mut dyn Barrier) -> RtResult<()> {
        self.sync(barrier, Boundary::Begin)?;
        self.begin();
        Ok(())
    }

    pub fn end_synced(&mut self, barrier: &mut dyn Barrier) -> RtResult<()> {
        self.sync(barrier, Boundary::End)?;
        self.end();
        Ok(())
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("count", &self.count)
            .field("variables", &self.variables)
            .field("functions", &self.functions)
            .field("objectives", &self.objectives)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn counter_and_callbacks_run_without_objectives() {
        let mut r = Region::new("plain", TuningConfig::default().with_seed(0)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let begin = Arc::clone(&seen);
        let end = Arc::clone(&seen);
        r.add_begin_callback(Box::new(move |name, i| begin.lock().unwrap().push(format!("b {name} {i}"))));
        r.add_end_callback(Box::new(move |name, i| end.lock().unwrap().push(format!("e {name} {i}"))));
        for _ in 0..2 {
            r.begin();
            r.end();
        }
        assert_eq!(r.count(), 2);
        assert_eq!(r.status(), RegionStatus::Tuning);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &["b plain 0", "e plain 0", "b plain 1", "e plain 1"]
        );
    }

    #[test]
    fn failed_barrier_changes_nothing() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut r = Region::new("synced", TuningConfig::default().with_seed(0))
            .unwrap()
            .with_event_sink(tx);
        let mut ok = || -> Result<(), String> { Ok(()) };
        let mut broken = || -> Result<(), String> { Err("peer gone".to_string()) };
        r.begin_synced(&mut ok).unwrap();
        let err = r.end_synced(&mut broken).unwrap_err();
        assert!(matches!(err, RtError::Barrier(ref m) if m == "peer gone"));
        assert_eq!(r.count(), 1);
        let kinds: Vec<_> = rx.try_iter().map(|e| e.kind).collect();
        assert!(kinds.iter().any(|k| matches!(k, TuningEventKind::BarrierFailed { boundary: Boundary::End, .. })));
        r.end_synced(&mut ok).unwrap();
        r.begin_synced(&mut broken).unwrap_err();
        assert_eq!(r.count(), 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = TuningConfig::default();
        config.capacities.max_variables = 0;
        assert!(Region::new("bad", config).is_err());
    }
}
