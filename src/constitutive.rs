//! The interface between the assemblers and constitutive models.
//!
//! The assemblers treat the material as a black box: [`ConstitutiveModel`] integrates the
//! stress at a single quadrature point, and models that support nonlocal damage additionally
//! implement the [`NonlocalDamageModel`] capability. Assemblers that need damage are only
//! available for models with that capability, so a model without it is rejected at compile
//! time rather than when the first damage update happens.
use crate::kelvin::{KelvinMatrix, KelvinVector, SpatialDim};
use crate::optimize::newton::NewtonError;
use nalgebra::Point3;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};

/// Identifies a quadrature point and its physical coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpatialPosition {
    pub element: usize,
    pub point: usize,
    pub coordinates: Point3<f64>,
}

/// Per-quadrature-point state owned by a constitutive model.
pub trait MaterialState: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    /// Commits the current state as the converged state of the time step.
    ///
    /// Must be idempotent: committing twice without an intervening stress update leaves the
    /// state unchanged.
    fn push_back_state(&mut self);
}

/// The result of a successful stress integration.
#[derive(Clone, Debug)]
pub struct StressUpdate<S> {
    pub stress: KelvinVector,
    pub state: S,
    /// The (consistent) tangent $\partial \sigma / \partial \varepsilon$.
    pub tangent: KelvinMatrix,
}

#[derive(Debug)]
pub enum ConstitutiveError {
    /// The local return mapping did not converge.
    ReturnMapping(NewtonError),
    /// The model was called with inputs it cannot handle.
    InvalidInput(String),
}

impl Display for ConstitutiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstitutiveError::ReturnMapping(err) => write!(f, "Return mapping failed: {}", err),
            ConstitutiveError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl Error for ConstitutiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConstitutiveError::ReturnMapping(err) => Some(err),
            ConstitutiveError::InvalidInput(_) => None,
        }
    }
}

impl From<NewtonError> for ConstitutiveError {
    fn from(err: NewtonError) -> Self {
        ConstitutiveError::ReturnMapping(err)
    }
}

/// A small-strain constitutive model.
///
/// One model instance is shared by all quadrature points of a domain. All mutable per-point
/// data lives in [`ConstitutiveModel::State`].
pub trait ConstitutiveModel: Debug + Send + Sync {
    type State: MaterialState;

    fn create_material_state(&self, dim: SpatialDim) -> Self::State;

    /// Integrates the stress over a time step from `strain_prev` to `strain`.
    ///
    /// The stresses passed in and returned are undamaged (effective) stresses. The returned
    /// state supersedes `state`, which is left untouched, so a failed or discarded trial
    /// iteration never corrupts the committed state.
    #[allow(clippy::too_many_arguments)]
    fn integrate_stress(
        &self,
        t: f64,
        x: &SpatialPosition,
        dt: f64,
        strain_prev: &KelvinVector,
        strain: &KelvinVector,
        stress_prev: &KelvinVector,
        state: &Self::State,
    ) -> Result<StressUpdate<Self::State>, ConstitutiveError>;

    /// Helmholtz free energy density of an undamaged state, used for material forces.
    ///
    /// The default $\frac{1}{2} \vec \sigma : \vec \varepsilon$ is exact for linear elasticity.
    fn free_energy_density(&self, strain: &KelvinVector, stress: &KelvinVector, _state: &Self::State) -> f64 {
        0.5 * stress.dot(strain)
    }
}

/// Material states that carry a plastic strain, exposed for post-processing.
pub trait PlasticStrainOutput {
    /// The plastic strain as a Kelvin vector.
    fn plastic_strain(&self) -> &KelvinVector;
}

/// Capability of constitutive models that drive a nonlocal damage variable.
pub trait NonlocalDamageModel: ConstitutiveModel {
    /// The local contribution to the damage-driving variable accumulated during the
    /// current time step, extracted from a trial state.
    fn damage_driving_increment(&self, state: &Self::State) -> f64;

    /// Evaluates the damage for the given (nonlocal) damage-driving variable.
    fn update_damage(&self, t: f64, x: &SpatialPosition, kappa: f64, state: &Self::State) -> f64;

    /// Blending factor between the local and nonlocal damage-driving variables.
    ///
    /// Expected in [0, 1], where 1 gives a purely nonlocal formulation.
    fn overnonlocal_gamma(&self, _t: f64, _x: &SpatialPosition) -> f64 {
        1.0
    }
}
