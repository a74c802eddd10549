//! # rt-search
//!
//! Search strategies and convergence logic for RTune objectives.
//!
//! Provides the discrete search space over variable domain indices, passive
//! (exhaustive, random) and driving (Nelder–Mead, gradient-sign) strategies,
//! the fidelity tracker that decides when a winner is stable, and
//! least-squares fitting for empirical models.

mod fidelity;
mod fit;
mod gradient;
mod passive;
mod simplex;
mod space;
mod strategy;

pub use fidelity::{lookup_confirms, within, FidelityTracker};
pub use fit::{fit_polynomial, PolyFit};
pub use gradient::{gradient, GradientSearch};
pub use passive::{PassiveMode, PassiveSearch};
pub use simplex::NelderMeadSearch;
pub use space::{Point, SearchSpace};
pub use strategy::{build_strategy, improves, Observation, SearchContext, SearchStrategy};
