//! Sequential-impulse constraint solver.

mod pgs;

pub use pgs::{solve_position_constraints, ConstraintSolver};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the constraint solver
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Number of velocity solver iterations
    pub velocity_iterations: usize,
    /// Number of position solver iterations
    pub position_iterations: usize,
    /// Fraction of the penetration fed back into the velocity bias per step
    pub baumgarte: f32,
    /// Allowed penetration slop
    pub slop: f32,
    /// Closing speed below which contacts do not bounce
    pub restitution_threshold: f32,
    /// Fraction of the remaining penetration removed per position iteration
    pub position_correction: f32,
    /// Scale applied to impulses carried over from the previous step (0-1)
    pub warm_start_factor: f32,
    /// Points separated by more than this are dropped after solving
    pub separation_threshold: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            velocity_iterations: 8,
            position_iterations: 3,
            baumgarte: 0.2,
            slop: 0.01,
            restitution_threshold: 1.0,
            position_correction: 0.8,
            warm_start_factor: 0.8,
            separation_threshold: 0.1,
        }
    }
}
