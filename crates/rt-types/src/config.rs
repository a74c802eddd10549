//! Engine configuration: capacity bounds, fidelity defaults, search defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::RtResult;
use crate::config_error;

/// Traversal order an objective uses over its variables' domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchKind {
    ExhaustiveAfterComplete,
    #[default]
    ExhaustiveOnTheFly,
    Random,
    NelderMead,
    BinaryGradient,
    QuaternaryGradient,
    OctalGradient,
    HexGradient,
}

impl SearchKind {
    /// Strategies that choose the next configuration themselves and so need
    /// their variables to follow the objective.
    pub fn is_driving(self) -> bool {
        matches!(
            self,
            Self::NelderMead
                | Self::BinaryGradient
                | Self::QuaternaryGradient
                | Self::OctalGradient
                | Self::HexGradient
        )
    }

    /// Number of probe points added around the midpoint per gradient round.
    pub fn gradient_probes(self) -> Option<usize> {
        match self {
            Self::BinaryGradient => Some(1),
            Self::QuaternaryGradient => Some(2),
            Self::OctalGradient => Some(4),
            Self::HexGradient => Some(8),
            _ => None,
        }
    }
}

/// Fixed bounds of the bounded collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capacities {
    pub max_regions: usize,
    pub max_variables: usize,
    pub max_functions: usize,
    pub max_objectives: usize,
    /// Inputs per function and per objective.
    pub max_inputs: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            max_regions: 16,
            max_variables: 8,
            max_functions: 8,
            max_objectives: 8,
            max_inputs: 8,
        }
    }
}

/// Convergence parameters applied to new objectives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fidelity {
    /// Absolute deviation tolerance.
    pub deviation_tolerance: f64,
    /// Consecutive confirming windows required.
    pub fidelity_window: u32,
    /// Neighbouring samples checked around a candidate.
    pub lookup_window: u32,
}

impl Default for Fidelity {
    fn default() -> Self {
        Self {
            deviation_tolerance: 0.01,
            fidelity_window: 2,
            lookup_window: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub capacities: Capacities,
    pub fidelity: Fidelity,
    pub search: SearchKind,
    /// Upper bound on simplex iterations per pass.
    pub nelder_mead_max_iterations: u32,
    /// Seed for random selection; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            capacities: Capacities::default(),
            fidelity: Fidelity::default(),
            search: SearchKind::default(),
            nelder_mead_max_iterations: 32,
            seed: None,
        }
    }
}

impl TuningConfig {
    pub fn with_capacities(mut self, capacities: Capacities) -> Self {
        self.capacities = capacities;
        self
    }

    pub fn with_fidelity(mut self, fidelity: Fidelity) -> Self {
        self.fidelity = fidelity;
        self
    }

    pub fn with_search(mut self, search: SearchKind) -> Self {
        self.search = search;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn from_json_str(text: &str) -> RtResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> RtResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> RtResult<()> {
        let c = &self.capacities;
        if c.max_regions == 0 || c.max_variables == 0 || c.max_functions == 0 {
            return Err(config_error!("capacities must be non-zero: {:?}", c));
        }
        if c.max_objectives == 0 || c.max_inputs == 0 {
            return Err(config_error!("capacities must be non-zero: {:?}", c));
        }
        if self.fidelity.fidelity_window == 0 {
            return Err(config_error!("fidelity_window must be at least 1"));
        }
        if !(self.fidelity.deviation_tolerance >= 0.0) {
            return Err(config_error!(
                "deviation_tolerance must be non-negative, got {}",
                self.fidelity.deviation_tolerance
            ));
        }
        Ok(())
    }
}
