//! Element-level and domain-level assembly of the nonlocal damage formulation.
pub mod global;
pub mod local;

mod integration_point;

pub use integration_point::*;
