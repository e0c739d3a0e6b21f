use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use ndfem::constitutive::{
    ConstitutiveModel, MaterialState, NonlocalDamageModel, PlasticStrainOutput, SpatialPosition, StressUpdate,
};
use ndfem::kelvin::{trace, KelvinVector, SpatialDim};
use ndfem::nalgebra::{DVector, DVectorView, DVectorViewMut, Point3};
use ndfem_optimize::calculus::{approximate_jacobian, VectorFunctionBuilder};
use ndfem_optimize::newton::{BacktrackingLineSearch, NewtonSettings};
use ndfem_solid::materials::{elasticity_tensor, LameParameters};
use ndfem_solid::{DamageProperties, DruckerPragerDamageModel, DruckerPragerParameters, DruckerPragerState};
use proptest::prelude::*;

fn position() -> SpatialPosition {
    SpatialPosition {
        element: 0,
        point: 0,
        coordinates: Point3::origin(),
    }
}

fn lame() -> LameParameters<f64> {
    LameParameters { mu: 100.0, lambda: 150.0 }
}

fn von_mises_model() -> DruckerPragerDamageModel {
    let plasticity = DruckerPragerParameters::von_mises(lame(), 1.0, 10.0);
    DruckerPragerDamageModel::new(plasticity, DamageProperties::new(0.01, 0.0, 0.0)).unwrap()
}

fn drucker_prager_model() -> DruckerPragerDamageModel {
    let plasticity = DruckerPragerParameters {
        elasticity: lame(),
        cohesion: 0.5,
        friction: 0.2,
        hardening: 10.0,
    };
    DruckerPragerDamageModel::new(plasticity, DamageProperties::new(0.01, 0.0, 0.0))
        .unwrap()
        .with_newton_settings(NewtonSettings {
            max_iterations: Some(50),
            tolerance: 1e-14,
        })
}

fn integrate(model: &DruckerPragerDamageModel, strain: &KelvinVector) -> StressUpdate<DruckerPragerState> {
    let dim = SpatialDim::from_kelvin_size(strain.len()).unwrap();
    let zero = DVector::zeros(strain.len());
    let state = model.create_material_state(dim);
    model
        .integrate_stress(0.0, &position(), 1.0, &zero, strain, &zero, &state)
        .unwrap()
}

#[test]
fn elastic_below_yield() {
    let model = von_mises_model();
    let strain = DVector::from_column_slice(&[1e-3, -5e-4, 0.0, 2e-4]);
    let update = integrate(&model, &strain);

    let c = elasticity_tensor(&lame(), SpatialDim::Two);
    assert_matrix_eq!(update.stress, &c * &strain, comp = float);
    assert_matrix_eq!(update.tangent, c, comp = float);
    assert_eq!(update.state.eps_p_eff, 0.0);
    assert_eq!(model.damage_driving_increment(&update.state), 0.0);
}

#[test]
fn von_mises_radial_return_matches_closed_form() {
    let model = von_mises_model();
    // Trial stress is purely deviatoric with sqrt(J2) = 2
    let strain = DVector::from_column_slice(&[0.01, -0.01, 0.0, 0.0, 0.0, 0.0]);
    let update = integrate(&model, &strain);

    let cohesion = model.plasticity().cohesion;
    let expected_multiplier = (2.0 - cohesion) / (100.0 + 10.0);
    assert_scalar_eq!(update.state.eps_p_eff, expected_multiplier, comp = abs, tol = 1e-9);

    let q = 2.0 - 100.0 * expected_multiplier;
    let expected_stress = DVector::from_column_slice(&[q, -q, 0.0, 0.0, 0.0, 0.0]);
    assert_matrix_eq!(update.stress, expected_stress, comp = abs, tol = 1e-8);

    let f = model.plasticity().yield_function(&update.stress, update.state.eps_p_eff);
    assert_scalar_eq!(f, 0.0, comp = abs, tol = 1e-8);
}

#[test]
fn drucker_prager_return_is_consistent() {
    let model = drucker_prager_model();
    let strain = DVector::from_column_slice(&[0.004, -0.002, 0.001, 0.003, -0.001, 0.002]);
    let update = integrate(&model, &strain);

    // See the closed form of the return along the flow direction
    assert_scalar_eq!(update.state.eps_p_eff, 0.69 / 188.0, comp = abs, tol = 1e-9);
    let f = model.plasticity().yield_function(&update.stress, update.state.eps_p_eff);
    assert_scalar_eq!(f, 0.0, comp = abs, tol = 1e-10);
}

#[test]
fn line_search_return_matches_full_newton_steps() {
    let strain = DVector::from_column_slice(&[0.004, -0.002, 0.001, 0.003, -0.001, 0.002]);
    let full_steps = integrate(&drucker_prager_model(), &strain);

    let model = drucker_prager_model().with_line_search(BacktrackingLineSearch::default());
    let update = integrate(&model, &strain);
    assert_scalar_eq!(update.state.eps_p_eff, full_steps.state.eps_p_eff, comp = abs, tol = 1e-12);
    assert_matrix_eq!(update.stress, full_steps.stress, comp = abs, tol = 1e-10);
    assert_matrix_eq!(update.tangent, full_steps.tangent, comp = abs, tol = 1e-8);

    let f = model.plasticity().yield_function(&update.stress, update.state.eps_p_eff);
    assert_scalar_eq!(f, 0.0, comp = abs, tol = 1e-10);
}

#[test]
fn line_search_handles_large_strain_increments() {
    let model = von_mises_model().with_line_search(BacktrackingLineSearch::default());
    let strain = DVector::from_column_slice(&[0.5, -0.3, 0.0, 0.4]);
    let update = integrate(&model, &strain);
    assert!(update.state.eps_p_eff > 0.0);
    let f = model.plasticity().yield_function(&update.stress, update.state.eps_p_eff);
    assert_scalar_eq!(f, 0.0, comp = abs, tol = 1e-7);
}

#[test]
fn consistent_tangent_matches_finite_differences() {
    let model = drucker_prager_model();
    let strain = DVector::from_column_slice(&[0.004, -0.002, 0.001, 0.003, -0.001, 0.002]);
    let update = integrate(&model, &strain);
    assert!(update.state.eps_p_eff > 0.0);

    let stress_function = VectorFunctionBuilder::with_dimension(6).with_function(
        |f: &mut DVectorViewMut<f64>, eps: &DVectorView<f64>| {
            let stress = integrate(&model, &eps.clone_owned()).stress;
            f.copy_from(&stress);
        },
    );
    let fd_tangent = approximate_jacobian(stress_function, &strain, 1e-6);

    assert_matrix_eq!(update.tangent, fd_tangent, comp = abs, tol = 1e-4);
}

#[test]
fn consistent_tangent_matches_finite_differences_in_plane_strain() {
    let model = drucker_prager_model();
    let strain = DVector::from_column_slice(&[0.004, -0.003, 0.0, 0.002]);
    let update = integrate(&model, &strain);
    assert!(update.state.eps_p_eff > 0.0);

    let stress_function = VectorFunctionBuilder::with_dimension(4).with_function(
        |f: &mut DVectorViewMut<f64>, eps: &DVectorView<f64>| {
            let stress = integrate(&model, &eps.clone_owned()).stress;
            f.copy_from(&stress);
        },
    );
    let fd_tangent = approximate_jacobian(stress_function, &strain, 1e-6);

    assert_matrix_eq!(update.tangent, fd_tangent, comp = abs, tol = 1e-4);
}

#[test]
fn free_energy_of_elastic_state_is_strain_energy() {
    let model = drucker_prager_model();
    let strain = DVector::from_column_slice(&[5e-4, -2.5e-4, 0.0, 1e-4]);
    let update = integrate(&model, &strain);
    assert_eq!(update.state.eps_p_eff, 0.0);
    assert_eq!(update.state.plastic_strain(), &DVector::zeros(4));

    let psi = model.free_energy_density(&strain, &update.stress, &update.state);
    assert_scalar_eq!(psi, 0.5 * update.stress.dot(&strain), comp = abs, tol = 1e-14);
}

#[test]
fn von_mises_plastic_strain_is_deviatoric() {
    let model = von_mises_model();
    let strain = DVector::from_column_slice(&[0.01, -0.004, 0.0, 0.003]);
    let update = integrate(&model, &strain);
    assert!(update.state.eps_p_eff > 0.0);

    let plastic_strain = update.state.plastic_strain();
    assert!(plastic_strain.norm() > 0.0);
    assert_scalar_eq!(trace(plastic_strain), 0.0, comp = abs, tol = 1e-12);

    // Stored energy of hardening is part of the free energy
    let elastic_strain = &strain - plastic_strain;
    let psi = model.free_energy_density(&strain, &update.stress, &update.state);
    let expected = 0.5 * update.stress.dot(&elastic_strain) + 0.5 * 10.0 * update.state.eps_p_eff.powi(2);
    assert_scalar_eq!(psi, expected, comp = abs, tol = 1e-10);
}

#[test]
fn state_commit_is_idempotent() {
    let model = von_mises_model();
    let strain = DVector::from_column_slice(&[0.01, -0.01, 0.0, 0.0]);
    let mut state = integrate(&model, &strain).state;
    assert!(state.eps_p_eff_increment() > 0.0);

    state.push_back_state();
    let committed = state.clone();
    state.push_back_state();
    assert_eq!(state, committed);
    assert_eq!(state.eps_p_eff_increment(), 0.0);
}

#[test]
fn trial_iterations_start_from_committed_state() {
    let model = von_mises_model();
    let zero = DVector::zeros(4);
    let strain = DVector::from_column_slice(&[0.01, -0.01, 0.0, 0.0]);
    let initial = model.create_material_state(SpatialDim::Two);

    let first = model
        .integrate_stress(0.0, &position(), 1.0, &zero, &strain, &zero, &initial)
        .unwrap();
    // A second trial within the same step must not accumulate on top of the first
    let second = model
        .integrate_stress(0.0, &position(), 1.0, &zero, &strain, &zero, &first.state)
        .unwrap();
    assert_scalar_eq!(first.state.eps_p_eff, second.state.eps_p_eff, comp = float);
    assert_matrix_eq!(first.stress, second.stress, comp = float);
}

#[test]
fn damage_driving_increment_scales_plastic_strain() {
    let damage = DamageProperties::new(0.01, 0.0, 0.0);
    let plasticity = DruckerPragerParameters::von_mises(lame(), 1.0, 10.0);
    let model = DruckerPragerDamageModel::new(plasticity, damage.with_gamma(0.5)).unwrap();
    let strain = DVector::from_column_slice(&[0.01, -0.01, 0.0, 0.0]);
    let state = integrate(&model, &strain).state;

    // Without brittleness sensitivity the increment is the plastic strain increment itself
    assert_scalar_eq!(model.damage_driving_increment(&state), state.eps_p_eff, comp = float);
    assert_scalar_eq!(
        model.update_damage(0.0, &position(), 0.01, &state),
        damage.damage(0.01),
        comp = float
    );
    assert_eq!(model.overnonlocal_gamma(0.0, &position()), 0.5);
}

#[test]
fn rejects_invalid_parameters() {
    let damage = DamageProperties::new(0.01, 0.0, 0.0);
    let mut plasticity = DruckerPragerParameters::von_mises(lame(), 1.0, 0.0);
    assert!(DruckerPragerDamageModel::new(plasticity, damage).is_ok());

    plasticity.friction = 0.6;
    assert!(DruckerPragerDamageModel::new(plasticity, damage).is_err());

    plasticity.friction = 0.0;
    plasticity.cohesion = -1.0;
    assert!(DruckerPragerDamageModel::new(plasticity, damage).is_err());
}

#[test]
fn parameters_from_json() {
    let json = r#"{
        "elasticity": { "mu": 100.0, "lambda": 150.0 },
        "cohesion": 0.5,
        "friction": 0.2,
        "hardening": 10.0
    }"#;
    let parameters: DruckerPragerParameters = serde_json::from_str(json).unwrap();
    assert_eq!(parameters, *drucker_prager_model().plasticity());
}

proptest! {
    #[test]
    fn returned_stress_lies_on_yield_surface(
        components in prop::collection::vec(-0.02..0.02f64, 4)
    ) {
        let model = von_mises_model();
        let strain = DVector::from_vec(components);
        let update = integrate(&model, &strain);
        let f = model.plasticity().yield_function(&update.stress, update.state.eps_p_eff);
        prop_assert!(f <= 1e-7);
        if update.state.eps_p_eff > 0.0 {
            prop_assert!(f.abs() <= 1e-7);
        }
    }
}
