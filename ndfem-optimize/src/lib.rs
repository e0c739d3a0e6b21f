//! Nonlinear solvers for the local problems that arise in constitutive integration.
use nalgebra::RealField;

/// Calculus helper traits and numerical differentiation
pub mod calculus;
/// Newton's method with pluggable line search strategies
pub mod newton;

pub use nalgebra;

/// Scalar types supported by the solvers in this crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Boxed error returned by user-supplied Jacobian solvers.
pub type SolverError = Box<dyn std::error::Error + Send + Sync>;
