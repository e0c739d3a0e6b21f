use crate::constitutive::MaterialState;
use crate::kelvin::{KelvinMatrix, KelvinVector};
use nalgebra::{DMatrix, DVector, Point3};

/// State and shape data of a single quadrature point.
///
/// `stress` is the undamaged (effective) stress returned by the constitutive model. The
/// damaged stress entering the residual is `(1 - damage) * stress`, see
/// [`QuadraturePoint::damaged_stress`].
#[derive(Clone, Debug)]
pub struct QuadraturePoint<S> {
    pub(crate) position: Point3<f64>,
    pub(crate) integration_weight: f64,
    pub(crate) basis: DVector<f64>,
    pub(crate) basis_gradients: DMatrix<f64>,
    pub(crate) strain_displacement: DMatrix<f64>,

    pub(crate) strain: KelvinVector,
    pub(crate) strain_prev: KelvinVector,
    pub(crate) stress: KelvinVector,
    pub(crate) stress_prev: KelvinVector,
    pub(crate) tangent: KelvinMatrix,

    pub(crate) damage: f64,
    pub(crate) damage_prev: f64,
    pub(crate) kappa_d: f64,
    pub(crate) kappa_d_prev: f64,
    pub(crate) nonlocal_kappa_d: f64,

    /// Material state of the last pre-assembly.
    pub(crate) material_state: S,
    /// Committed material state, the starting point of every stress integration.
    pub(crate) material_state_prev: S,
    /// Iterate of the last successful pre-assembly, zero if none.
    pub(crate) iterate: u64,
}

impl<S: MaterialState> QuadraturePoint<S> {
    pub(crate) fn new(
        position: Point3<f64>,
        integration_weight: f64,
        basis: DVector<f64>,
        basis_gradients: DMatrix<f64>,
        strain_displacement: DMatrix<f64>,
        material_state: S,
    ) -> Self {
        let n = strain_displacement.nrows();
        Self {
            position,
            integration_weight,
            basis,
            basis_gradients,
            strain_displacement,
            strain: DVector::zeros(n),
            strain_prev: DVector::zeros(n),
            stress: DVector::zeros(n),
            stress_prev: DVector::zeros(n),
            tangent: DMatrix::zeros(n, n),
            damage: 0.0,
            damage_prev: 0.0,
            kappa_d: 0.0,
            kappa_d_prev: 0.0,
            nonlocal_kappa_d: 0.0,
            material_state_prev: material_state.clone(),
            material_state,
            iterate: 0,
        }
    }

    /// Commits the current state as the converged state of the time step.
    pub fn push_back_state(&mut self) {
        self.strain_prev.copy_from(&self.strain);
        self.stress_prev.copy_from(&self.stress);
        self.damage_prev = self.damage;
        self.kappa_d_prev = self.kappa_d;
        self.material_state.push_back_state();
        self.material_state_prev.clone_from(&self.material_state);
    }
}

impl<S> QuadraturePoint<S> {
    pub fn position(&self) -> &Point3<f64> {
        &self.position
    }

    /// Quadrature weight times the absolute determinant of the element Jacobian.
    pub fn integration_weight(&self) -> f64 {
        self.integration_weight
    }

    /// Basis function values of the owning element at this point.
    pub fn basis(&self) -> &DVector<f64> {
        &self.basis
    }

    /// Physical basis gradients, one column per node.
    pub fn basis_gradients(&self) -> &DMatrix<f64> {
        &self.basis_gradients
    }

    pub fn strain_displacement(&self) -> &DMatrix<f64> {
        &self.strain_displacement
    }

    pub fn strain(&self) -> &KelvinVector {
        &self.strain
    }

    pub fn strain_prev(&self) -> &KelvinVector {
        &self.strain_prev
    }

    pub fn stress(&self) -> &KelvinVector {
        &self.stress
    }

    pub fn stress_prev(&self) -> &KelvinVector {
        &self.stress_prev
    }

    pub fn damaged_stress(&self) -> KelvinVector {
        &self.stress * (1.0 - self.damage)
    }

    pub fn tangent(&self) -> &KelvinMatrix {
        &self.tangent
    }

    pub fn damage(&self) -> f64 {
        self.damage
    }

    pub fn damage_prev(&self) -> f64 {
        self.damage_prev
    }

    /// Local damage-driving variable of the current iterate.
    pub fn kappa_d(&self) -> f64 {
        self.kappa_d
    }

    pub fn kappa_d_prev(&self) -> f64 {
        self.kappa_d_prev
    }

    /// The (blended) nonlocal damage-driving variable used in the last damage update.
    pub fn nonlocal_kappa_d(&self) -> f64 {
        self.nonlocal_kappa_d
    }

    pub fn material_state(&self) -> &S {
        &self.material_state
    }

    pub fn material_state_prev(&self) -> &S {
        &self.material_state_prev
    }

    pub fn iterate(&self) -> u64 {
        self.iterate
    }
}
