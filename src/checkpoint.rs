//! Serializable snapshots of the committed quadrature point state.
//!
//! Only committed ("previous") quantities are stored. The neighbor graph is not part of a
//! checkpoint since it is a deterministic function of the mesh and the internal length, and
//! is rebuilt on restore.
use crate::kelvin::KelvinVector;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrationPointCheckpoint<S> {
    pub strain: KelvinVector,
    pub stress: KelvinVector,
    pub damage: f64,
    pub kappa_d: f64,
    pub material_state: S,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementCheckpoint<S> {
    pub element: usize,
    pub integration_order: usize,
    pub points: Vec<IntegrationPointCheckpoint<S>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainCheckpoint<S> {
    pub internal_length: f64,
    pub integration_order: usize,
    pub elements: Vec<ElementCheckpoint<S>>,
}
