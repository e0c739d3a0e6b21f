//! Drucker-Prager plasticity with linear isotropic hardening, coupled to nonlocal damage.
//!
//! The yield function is
//! $$
//! f(\vec \sigma, \kappa_p) = \sqrt{J_2} + b I_1 - (a + h \kappa_p),
//! $$
//! with cohesion $a$, friction coefficient $b$ and hardening modulus $h$. For $b = 0$ this is
//! von Mises plasticity with yield stress $\sqrt{3} a$. The flow rule is associative and the
//! plastic multiplier is used as the effective plastic strain $\kappa_p$.
//!
//! Damage is not part of the return mapping. The effective plastic strain increment, scaled by
//! a stress-dependent brittleness, drives the nonlocal damage variable (see
//! [`DamageProperties`]).
use crate::damage::DamageProperties;
use crate::materials::{elasticity_tensor, LameParameters};
use log::debug;
use ndfem::constitutive::{
    ConstitutiveError, ConstitutiveModel, MaterialState, NonlocalDamageModel, PlasticStrainOutput, SpatialPosition,
    StressUpdate,
};
use ndfem::kelvin::{deviatoric, deviatoric_projection, identity2, trace, KelvinMatrix, KelvinVector, SpatialDim};
use ndfem::nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use ndfem_optimize::calculus::VectorFunctionBuilder;
use ndfem_optimize::newton::{newton, newton_line_search, BacktrackingLineSearch, NewtonError, NewtonSettings};
use ndfem_optimize::SolverError;
use serde::{Deserialize, Serialize};

const FRAC_1_SQRT_3: f64 = 0.577_350_269_189_625_8;

/// Lower bound for $\sqrt{J_2}$ in the flow direction, which is undefined at the apex.
const MIN_EQUIVALENT_STRESS: f64 = 1e-14;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DruckerPragerParameters {
    pub elasticity: LameParameters<f64>,
    /// $a$, in units of stress.
    pub cohesion: f64,
    /// $b$, the coefficient of $I_1$.
    pub friction: f64,
    /// $h$, the linear hardening modulus.
    pub hardening: f64,
}

impl DruckerPragerParameters {
    /// Von Mises plasticity with the given uniaxial yield stress.
    pub fn von_mises(elasticity: LameParameters<f64>, yield_stress: f64, hardening: f64) -> Self {
        Self {
            elasticity,
            cohesion: yield_stress * FRAC_1_SQRT_3,
            friction: 0.0,
            hardening,
        }
    }

    pub fn yield_function(&self, stress: &KelvinVector, eps_p_eff: f64) -> f64 {
        let q = (0.5 * deviatoric(stress).norm_squared()).sqrt();
        q + self.friction * trace(stress) - (self.cohesion + self.hardening * eps_p_eff)
    }

    /// The uniaxial compressive strength $a / (1/\sqrt{3} - b)$ of the initial yield surface.
    pub fn compressive_strength(&self) -> f64 {
        self.cohesion / (FRAC_1_SQRT_3 - self.friction)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.elasticity.is_admissible() {
            return Err(format!("Inadmissible elastic parameters {:?}", self.elasticity));
        }
        if !(self.cohesion.is_finite() && self.cohesion > 0.0) {
            return Err(format!("Cohesion must be positive, got {}", self.cohesion));
        }
        if !(self.friction >= 0.0 && self.friction < FRAC_1_SQRT_3) {
            return Err(format!("Friction must lie in [0, 1/sqrt(3)), got {}", self.friction));
        }
        if !(self.hardening.is_finite() && self.hardening >= 0.0) {
            return Err(format!("Hardening must be non-negative, got {}", self.hardening));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DruckerPragerState {
    pub plastic_strain: KelvinVector,
    pub plastic_strain_prev: KelvinVector,
    /// Accumulated plastic multiplier $\kappa_p$.
    pub eps_p_eff: f64,
    pub eps_p_eff_prev: f64,
    /// Effective stress after the last stress update.
    pub stress: KelvinVector,
}

impl DruckerPragerState {
    pub fn new(dim: SpatialDim) -> Self {
        let n = dim.kelvin_size();
        Self {
            plastic_strain: DVector::zeros(n),
            plastic_strain_prev: DVector::zeros(n),
            eps_p_eff: 0.0,
            eps_p_eff_prev: 0.0,
            stress: DVector::zeros(n),
        }
    }

    /// Effective plastic strain accumulated since the last commit.
    pub fn eps_p_eff_increment(&self) -> f64 {
        self.eps_p_eff - self.eps_p_eff_prev
    }
}

impl PlasticStrainOutput for DruckerPragerState {
    fn plastic_strain(&self) -> &KelvinVector {
        &self.plastic_strain
    }
}

impl MaterialState for DruckerPragerState {
    fn push_back_state(&mut self) {
        self.plastic_strain_prev.copy_from(&self.plastic_strain);
        self.eps_p_eff_prev = self.eps_p_eff;
    }
}

/// Result of a return mapping from a trial stress.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnMapping {
    pub stress: KelvinVector,
    /// Plastic multiplier increment, zero for an elastic step.
    pub plastic_multiplier: f64,
    /// Flow direction $\partial f / \partial \vec \sigma$ at the returned stress.
    pub flow_direction: KelvinVector,
    /// Consistent tangent $\partial \vec \sigma / \partial \vec \varepsilon$.
    pub tangent: KelvinMatrix,
    /// Newton iterations, zero for an elastic step.
    pub iterations: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DruckerPragerDamageModel {
    plasticity: DruckerPragerParameters,
    damage: DamageProperties,
    settings: NewtonSettings<f64>,
    line_search: Option<BacktrackingLineSearch<f64>>,
}

impl DruckerPragerDamageModel {
    pub fn new(plasticity: DruckerPragerParameters, damage: DamageProperties) -> Result<Self, ConstitutiveError> {
        plasticity.validate().map_err(ConstitutiveError::InvalidInput)?;
        damage.validate().map_err(ConstitutiveError::InvalidInput)?;
        Ok(Self {
            plasticity,
            damage,
            settings: NewtonSettings {
                max_iterations: Some(50),
                tolerance: 1e-10,
            },
            line_search: None,
        })
    }

    /// Settings of the local Newton solve. The residual is scaled by the shear modulus.
    pub fn with_newton_settings(self, settings: NewtonSettings<f64>) -> Self {
        Self { settings, ..self }
    }

    /// Globalizes the local Newton solve with a backtracking line search on the residual norm.
    ///
    /// Full Newton steps are taken by default.
    pub fn with_line_search(self, line_search: BacktrackingLineSearch<f64>) -> Self {
        Self {
            line_search: Some(line_search),
            ..self
        }
    }

    pub fn plasticity(&self) -> &DruckerPragerParameters {
        &self.plasticity
    }

    pub fn damage_properties(&self) -> &DamageProperties {
        &self.damage
    }

    /// Returns the trial stress onto the yield surface.
    ///
    /// The unknowns $[\vec \sigma, \Delta \lambda]$ solve
    /// $$
    /// \vec \sigma - \vec \sigma^{trial} + \Delta \lambda \, \mathbb{C} \vec n(\vec \sigma) = 0, \quad
    /// f(\vec \sigma, \kappa_p^{prev} + \Delta \lambda) = 0,
    /// $$
    /// both scaled by $1/G$.
    pub fn return_mapping(
        &self,
        trial_stress: &KelvinVector,
        eps_p_eff_prev: f64,
        dim: SpatialDim,
    ) -> Result<ReturnMapping, ConstitutiveError> {
        let elasticity = elasticity_tensor(&self.plasticity.elasticity, dim);
        let system = LocalSystem {
            parameters: &self.plasticity,
            elasticity: &elasticity,
            trial_stress,
            eps_p_eff_prev,
            scale: 1.0 / self.plasticity.elasticity.shear_modulus(),
            projection: deviatoric_projection(dim),
            identity: identity2(dim),
        };

        if self.plasticity.yield_function(trial_stress, eps_p_eff_prev) <= 0.0 {
            return Ok(ReturnMapping {
                stress: trial_stress.clone(),
                plastic_multiplier: 0.0,
                flow_direction: system.flow_direction(trial_stress).1,
                tangent: elasticity.clone(),
                iterations: 0,
            });
        }

        let k = dim.kelvin_size();
        let mut x = DVector::zeros(k + 1);
        x.rows_mut(0, k).copy_from(trial_stress);
        let mut f = DVector::zeros(k + 1);
        let mut dx = DVector::zeros(k + 1);

        let function = VectorFunctionBuilder::with_dimension(k + 1)
            .with_function(|f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>| system.residual(f, x))
            .with_jacobian_solver(
                |sol: &mut DVectorViewMut<f64>, x: &DVectorView<f64>, rhs: &DVectorView<f64>| {
                    let solution = system
                        .jacobian(x)
                        .lu()
                        .solve(rhs)
                        .ok_or_else(|| SolverError::from("Singular return mapping Jacobian"))?;
                    sol.copy_from(&solution);
                    Ok(())
                },
            );
        let outcome = match &self.line_search {
            Some(line_search) => newton_line_search(
                function,
                &mut x,
                &mut f,
                &mut dx,
                self.settings,
                &mut line_search.clone(),
            )?,
            None => newton(function, &mut x, &mut f, &mut dx, self.settings)?,
        };

        let plastic_multiplier = x[k];
        if plastic_multiplier < 0.0 {
            return Err(ConstitutiveError::InvalidInput(format!(
                "Return mapping produced negative plastic multiplier {}",
                plastic_multiplier
            )));
        }

        // d[sigma, dlambda]/d(strain) = J^{-1} [C / G; 0]
        let jacobian = system.jacobian(&DVectorView::from(&x));
        let mut rhs = DMatrix::zeros(k + 1, k);
        rhs.rows_mut(0, k).copy_from(&(&elasticity * system.scale));
        let sensitivity = jacobian.lu().solve(&rhs).ok_or_else(|| {
            ConstitutiveError::ReturnMapping(NewtonError::JacobianError(SolverError::from(
                "Singular Jacobian at converged return mapping",
            )))
        })?;

        let stress = x.rows(0, k).clone_owned();
        debug!(
            "Return mapping converged in {} iterations with plastic multiplier {}",
            outcome.iterations, plastic_multiplier
        );
        Ok(ReturnMapping {
            flow_direction: system.flow_direction(&stress).1,
            stress,
            plastic_multiplier,
            tangent: sensitivity.rows(0, k).clone_owned(),
            iterations: outcome.iterations,
        })
    }
}

struct LocalSystem<'a> {
    parameters: &'a DruckerPragerParameters,
    elasticity: &'a KelvinMatrix,
    trial_stress: &'a KelvinVector,
    eps_p_eff_prev: f64,
    scale: f64,
    projection: KelvinMatrix,
    identity: KelvinVector,
}

impl LocalSystem<'_> {
    /// Returns the deviator, the flow direction and the (bounded) equivalent stress $\sqrt{J_2}$.
    fn flow_direction(&self, stress: &KelvinVector) -> (KelvinVector, KelvinVector, f64) {
        let s = deviatoric(stress);
        let q = (0.5 * s.norm_squared()).sqrt().max(MIN_EQUIVALENT_STRESS);
        let n = &s / (2.0 * q) + &self.identity * self.parameters.friction;
        (s, n, q)
    }

    fn residual(&self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        let k = self.trial_stress.len();
        let stress = x.rows(0, k).clone_owned();
        let dlambda = x[k];
        let (_, n, _) = self.flow_direction(&stress);

        let r_stress = (&stress - self.trial_stress + self.elasticity * n * dlambda) * self.scale;
        f.rows_mut(0, k).copy_from(&r_stress);
        f[k] = self.parameters.yield_function(&stress, self.eps_p_eff_prev + dlambda) * self.scale;
    }

    fn jacobian(&self, x: &DVectorView<f64>) -> DMatrix<f64> {
        let k = self.trial_stress.len();
        let stress = x.rows(0, k).clone_owned();
        let dlambda = x[k];
        let (s, n, q) = self.flow_direction(&stress);

        let dn_dstress = &self.projection / (2.0 * q) - &s * s.transpose() / (4.0 * q.powi(3));
        let mut jacobian = DMatrix::zeros(k + 1, k + 1);
        jacobian
            .view_mut((0, 0), (k, k))
            .copy_from(&((DMatrix::identity(k, k) + self.elasticity * dn_dstress * dlambda) * self.scale));
        jacobian
            .view_mut((0, k), (k, 1))
            .copy_from(&(self.elasticity * &n * self.scale));
        jacobian
            .view_mut((k, 0), (1, k))
            .copy_from(&(n.transpose() * self.scale));
        jacobian[(k, k)] = -self.parameters.hardening * self.scale;
        jacobian
    }
}

impl ConstitutiveModel for DruckerPragerDamageModel {
    type State = DruckerPragerState;

    fn create_material_state(&self, dim: SpatialDim) -> Self::State {
        DruckerPragerState::new(dim)
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
        let elasticity = elasticity_tensor(&self.plasticity.elasticity, dim);
        let trial_stress = stress_prev + elasticity * (strain - strain_prev);

        let mapping = self.return_mapping(&trial_stress, state.eps_p_eff_prev, dim)?;
        let new_state = DruckerPragerState {
            plastic_strain: &state.plastic_strain_prev + &mapping.flow_direction * mapping.plastic_multiplier,
            plastic_strain_prev: state.plastic_strain_prev.clone(),
            eps_p_eff: state.eps_p_eff_prev + mapping.plastic_multiplier,
            eps_p_eff_prev: state.eps_p_eff_prev,
            stress: mapping.stress.clone(),
        };
        Ok(StressUpdate {
            stress: mapping.stress,
            state: new_state,
            tangent: mapping.tangent,
        })
    }

    /// Elastic energy of the stress plus the energy stored by hardening,
    /// $\psi = \frac{\vec s : \vec s}{4 G} + \frac{I_1^2}{18 K} + \frac{1}{2} h \kappa_p^2$.
    fn free_energy_density(&self, _strain: &KelvinVector, stress: &KelvinVector, state: &Self::State) -> f64 {
        let lame = &self.plasticity.elasticity;
        let s = deviatoric(stress);
        let i1 = trace(stress);
        s.norm_squared() / (4.0 * lame.shear_modulus())
            + i1 * i1 / (18.0 * lame.bulk_modulus())
            + 0.5 * self.plasticity.hardening * state.eps_p_eff * state.eps_p_eff
    }
}

impl NonlocalDamageModel for DruckerPragerDamageModel {
    fn damage_driving_increment(&self, state: &Self::State) -> f64 {
        let x_s = self
            .damage
            .brittleness(&state.stress, self.plasticity.compressive_strength());
        state.eps_p_eff_increment() / x_s
    }

    fn update_damage(&self, _t: f64, _x: &SpatialPosition, kappa: f64, _state: &Self::State) -> f64 {
        self.damage.damage(kappa)
    }

    fn overnonlocal_gamma(&self, _t: f64, _x: &SpatialPosition) -> f64 {
        self.damage.gamma
    }
}
