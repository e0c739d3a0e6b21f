use crate::materials::{elasticity_tensor, LameParameters};
use ndfem::constitutive::{
    ConstitutiveError, ConstitutiveModel, MaterialState, NonlocalDamageModel, SpatialPosition, StressUpdate,
};
use ndfem::kelvin::{KelvinVector, SpatialDim};
use serde::{Deserialize, Serialize};

/// Linear elasticity in incremental form, $\vec \sigma = \vec \sigma_{prev} + \mathbb{C} \Delta \vec \varepsilon$.
///
/// The model never accumulates damage, so with it the nonlocal assembly reduces to plain
/// linear elasticity.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearElasticModel {
    pub lame: LameParameters<f64>,
}

impl LinearElasticModel {
    pub fn new(lame: impl Into<LameParameters<f64>>) -> Self {
        Self { lame: lame.into() }
    }
}

/// Linear elasticity carries no internal variables.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticState;

impl MaterialState for ElasticState {
    fn push_back_state(&mut self) {}
}

impl ConstitutiveModel for LinearElasticModel {
    type State = ElasticState;

    fn create_material_state(&self, _dim: SpatialDim) -> Self::State {
        ElasticState
    }

    fn integrate_stress(
        &self,
        _t: f64,
        _x: &SpatialPosition,
        _dt: f64,
        strain_prev: &KelvinVector,
        strain: &KelvinVector,
        stress_prev: &KelvinVector,
        state: &Self::State,
    ) -> Result<StressUpdate<Self::State>, ConstitutiveError> {
        let dim = SpatialDim::from_kelvin_size(strain.len())
            .ok_or_else(|| ConstitutiveError::InvalidInput(format!("Kelvin vector of length {}", strain.len())))?;
        let tangent = elasticity_tensor(&self.lame, dim);
        let stress = stress_prev + &tangent * (strain - strain_prev);
        Ok(StressUpdate {
            stress,
            state: *state,
            tangent,
        })
    }
}

impl NonlocalDamageModel for LinearElasticModel {
    fn damage_driving_increment(&self, _state: &Self::State) -> f64 {
        0.0
    }

    fn update_damage(&self, _t: f64, _x: &SpatialPosition, _kappa: f64, _state: &Self::State) -> f64 {
        0.0
    }
}
