//! Nonlocal integration-point damage-plasticity for small-deformation finite element
//! computations.
//!
//! The crate provides per-element assemblers that couple the quadrature points of a mesh
//! through a nonlocal average of a damage-driving variable, together with a
//! [`NonlocalDomain`](assembly::global::NonlocalDomain) that builds the neighbor graph and
//! drives the two-phase assembly of each global iterate. Constitutive models plug in through
//! the traits in [`constitutive`].

pub mod assembly;
pub mod checkpoint;
pub mod config;
pub mod connectivity;
pub mod constitutive;
pub mod element;
pub mod error;
pub mod kelvin;
pub mod mesh;
pub mod nonlocal;
pub mod quadrature;
pub mod spatial;

pub mod optimize {
    pub use ndfem_optimize::*;
}

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
