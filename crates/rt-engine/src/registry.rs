//! Host-owned collection of regions.

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rt_types::{
    EntityKind, ObjectiveStatus, RegionStatus, RtError, RtResult, TuningConfig, Value,
};

use crate::events::TuningEvent;
use crate::objective::ObjectiveKind;
use crate::region::{Region, RegionId};

/// Final state of one objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveSummary {
    pub name: String,
    pub kind: ObjectiveKind,
    pub status: ObjectiveStatus,
    pub score: Option<f64>,
    pub config: Vec<(String, Value)>,
}

/// Final state of one region, returned by [`Registry::teardown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub name: String,
    pub status: RegionStatus,
    pub iterations: u64,
    pub variables: Vec<(String, Value)>,
    pub objectives: Vec<ObjectiveSummary>,
}

impl RegionSummary {
    pub fn of(region: &Region) -> Self {
        Self {
            name: region.name().to_string(),
            status: region.status(),
            iterations: region.count(),
            variables: region
                .variables()
                .map(|(_, v)| (v.name().to_string(), v.value()))
                .collect(),
            objectives: region
                .objectives()
                .map(|(_, o)| ObjectiveSummary {
                    name: o.name().to_string(),
                    kind: o.kind(),
                    status: o.status(),
                    score: o.outcome().map(|out| out.score),
                    config: o.outcome().map(|out| out.config.clone()).unwrap_or_default(),
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct Registry {
    config: TuningConfig,
    regions: Vec<Region>,
    events: Option<Sender<TuningEvent>>,
}

impl Registry {
    pub fn new(config: TuningConfig) -> RtResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            regions: Vec::new(),
            events: None,
        })
    }

    /// Every region created afterwards reports to `tx`.
    pub fn with_event_sink(mut self, tx: Sender<TuningEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Create a region, or return the existing one of the same name.
    pub fn init_region(&mut self, name: &str) -> RtResult<RegionId> {
        if let Some(id) = self.find(name) {
            return Ok(id);
        }
        let limit = self.config.capacities.max_regions;
        if self.regions.len() >= limit {
            warn!(region = name, limit, "region capacity exceeded");
            return Err(RtError::CapacityExceeded {
                kind: EntityKind::Region,
                limit,
            });
        }
        let mut config = self.config.clone();
        // Distinct regions draw distinct random streams from one seed.
        config.seed = config.seed.map(|seed| seed ^ self.regions.len() as u64);
        let mut region = Region::new(name, config)?;
        region.id = RegionId(self.regions.len());
        if let Some(tx) = &self.events {
            region.set_event_sink(tx.clone());
        }
        info!(region = name, id = region.id.0, "region initialised");
        self.regions.push(region);
        Ok(RegionId(self.regions.len() - 1))
    }

    pub fn region(&self, id: RegionId) -> RtResult<&Region> {
        self.regions.get(id.0).ok_or(RtError::InvalidHandle {
            kind: EntityKind::Region,
            index: id.0,
        })
    }

    pub fn region_mut(&mut self, id: RegionId) -> RtResult<&mut Region> {
        self.regions.get_mut(id.0).ok_or(RtError::InvalidHandle {
            kind: EntityKind::Region,
            index: id.0,
        })
    }

    pub fn find(&self, name: &str) -> Option<RegionId> {
        self.regions.iter().position(|r| r.name() == name).map(RegionId)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Consume the registry and report the final state of every region.
    pub fn teardown(self) -> Vec<RegionSummary> {
        let summaries: Vec<_> = self.regions.iter().map(RegionSummary::of).collect();
        info!(regions = summaries.len(), "registry torn down");
        summaries
    }
}
