use crate::StrainDamageModel;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use ndfem::assembly::global::NonlocalDomain;
use ndfem::assembly::local::{ElementLocalAssembler, IntegrationPointField, ScalingCoefficients};
use ndfem::config::{DamagePolicy, GammaSource, NonlocalParameters, PartitionOfUnityCheck};
use ndfem::element::{Hex8Element, Quad4Element};
use ndfem::error::NonlocalError;
use ndfem::mesh::procedural::{create_rectangular_uniform_quad_mesh_2d, create_unit_box_uniform_hex_mesh_3d};
use ndfem::mesh::QuadMesh2d;
use ndfem::nalgebra::{DMatrix, DVector, DVectorView, Vector2};
use ndfem::spatial::BruteForcePointIndex;
use ndfem_solid::{LameParameters, LinearElasticModel};
use std::sync::Arc;

type QuadDomain<M> = NonlocalDomain<Quad4Element, M>;

/// Two unit squares side by side. With integration order 1 their quadrature points lie at
/// (0.5, 0.5) and (1.5, 0.5), each with unit weight.
fn two_squares() -> QuadMesh2d {
    create_rectangular_uniform_quad_mesh_2d(1.0, 2, 1, 1, &Vector2::zeros())
}

fn two_point_domain(model: StrainDamageModel, parameters: NonlocalParameters) -> QuadDomain<StrainDamageModel> {
    let mut domain = NonlocalDomain::from_mesh(&two_squares(), Arc::new(model), parameters).unwrap();
    domain.build_neighbor_graph().unwrap();
    domain
}

fn two_point_parameters() -> NonlocalParameters {
    NonlocalParameters::new(1.5).with_integration_order(1)
}

/// Node-interleaved displacements of the linear field u = (a x, 0) on the mesh vertices.
fn stretch<C>(mesh: &ndfem::mesh::Mesh<C>, a: f64) -> DVector<f64> {
    DVector::from_iterator(
        2 * mesh.vertices().len(),
        mesh.vertices().iter().flat_map(|v| [a * v.x, 0.0]),
    )
}

fn nonlocal_error<T>(result: eyre::Result<T>) -> NonlocalError {
    match result {
        Ok(_) => panic!("Expected an error"),
        Err(report) => report
            .downcast::<NonlocalError>()
            .expect("Error should originate from the nonlocal assembly"),
    }
}

#[test]
fn domain_layout() {
    let domain = two_point_domain(StrainDamageModel::default(), two_point_parameters());
    assert_eq!(domain.assemblers().len(), 2);
    assert_eq!(domain.num_nodes(), 6);
    assert_eq!(domain.solution_dim(), 2);
    assert_eq!(domain.num_dofs(), 12);
    assert_eq!(domain.iterate(), 0);

    let statistics = domain.neighbor_statistics().unwrap();
    assert_eq!(statistics.points, 2);
    assert_eq!(statistics.edges, 4);
    assert_eq!(domain.assembler(1).unwrap().nodes(), &[1, 2, 5, 4]);
}

#[test]
fn nonlocal_average_of_two_points() {
    let mut domain = two_point_domain(StrainDamageModel::default(), two_point_parameters());
    domain.assembler_mut(0).unwrap().set_kappa_d(&[1.0]).unwrap();
    let u = DVector::zeros(domain.num_dofs());

    let pre = domain.pre_assemble(0.0, 0.0, &u).unwrap();
    assert_eq!(pre.iterate(), 1);
    let kappa = pre.nonlocal_kappa().unwrap();
    assert_scalar_eq!(kappa[0][0], 81.0 / 106.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(kappa[1][0], 25.0 / 106.0, comp = abs, tol = 1e-14);

    pre.assemble_global(&u, &u, ScalingCoefficients::default()).unwrap();
    let damage = domain.damage_values();
    assert_scalar_eq!(damage[0], 81.0 / 106.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(damage[1], 25.0 / 106.0, comp = abs, tol = 1e-14);
    assert_eq!(domain.kappa_d_values(), vec![1.0, 0.0]);
    assert_eq!(domain.nonlocal_kappa_d_values(), damage);
}

#[test]
fn overnonlocal_blending() {
    let u = DVector::zeros(12);
    let assemble = |model: StrainDamageModel, parameters: NonlocalParameters| {
        let mut domain = two_point_domain(model, parameters);
        domain.assembler_mut(0).unwrap().set_kappa_d(&[1.0]).unwrap();
        domain
            .pre_assemble(0.0, 0.0, &u)
            .unwrap()
            .assemble_global(&u, &u, ScalingCoefficients::default())
            .unwrap();
        domain.nonlocal_kappa_d_values()
    };

    // Purely local
    let local = assemble(
        StrainDamageModel::default(),
        two_point_parameters().with_gamma(GammaSource::Constant(0.0)),
    );
    assert_eq!(local, vec![1.0, 0.0]);

    // Half-way between local and nonlocal, taken from the model
    let model = StrainDamageModel {
        gamma: 0.5,
        ..StrainDamageModel::default()
    };
    let blended = assemble(model, two_point_parameters());
    assert_scalar_eq!(blended[0], 0.5 + 0.5 * 81.0 / 106.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(blended[1], 0.5 * 25.0 / 106.0, comp = abs, tol = 1e-14);

    // Strong over-nonlocal extrapolation is floored at zero
    let model = StrainDamageModel {
        gamma: 5.0,
        ..StrainDamageModel::default()
    };
    let floored = assemble(model, two_point_parameters());
    assert_eq!(floored[0], 0.0);
    assert_scalar_eq!(floored[1], 5.0 * 25.0 / 106.0, comp = abs, tol = 1e-13);
}

#[test]
fn uniform_field_is_reproduced_in_3d() {
    let mesh = create_unit_box_uniform_hex_mesh_3d(2);
    let parameters = NonlocalParameters::new(0.4).with_partition_of_unity(PartitionOfUnityCheck {
        policy: ndfem::config::PartitionOfUnityPolicy::Abort,
        tolerance: 1e-12,
    });
    let mut domain: NonlocalDomain<Hex8Element, _> =
        NonlocalDomain::from_mesh(&mesh, Arc::new(StrainDamageModel::default()), parameters).unwrap();
    domain.build_neighbor_graph().unwrap();
    domain.set_uniform_kappa_d(0.3).unwrap();
    assert_eq!(domain.num_dofs(), 81);

    let u = DVector::zeros(81);
    let pre = domain.pre_assemble(0.0, 0.1, &u).unwrap();
    let kappa = pre.nonlocal_kappa().unwrap();
    assert_eq!(kappa.len(), 8);
    for value in kappa.iter().flatten() {
        assert_scalar_eq!(*value, 0.3, comp = abs, tol = 1e-12);
    }
}

#[test]
fn global_system_is_sum_of_element_systems() {
    let mesh = create_rectangular_uniform_quad_mesh_2d(1.0, 3, 2, 1, &Vector2::zeros());
    let model = LinearElasticModel::new(LameParameters { mu: 100.0, lambda: 150.0 });
    let mut domain = NonlocalDomain::from_mesh(&mesh, Arc::new(model), NonlocalParameters::new(1.0)).unwrap();
    domain.build_neighbor_graph().unwrap();

    let n = domain.num_dofs();
    let u = DVector::from_fn(n, |i, _| 1e-3 * ((i * 7 % 5) as f64 - 2.0));
    let u_dot = DVector::zeros(n);

    let systems = domain
        .pre_assemble(0.0, 1.0, &u)
        .unwrap()
        .assemble_with_jacobian(&u, &u_dot, ScalingCoefficients::default())
        .unwrap();
    assert_eq!(systems.len(), 6);
    let mut expected_residual = DVector::zeros(n);
    let mut expected_jacobian = DMatrix::zeros(n, n);
    for system in &systems {
        for (a, &i) in system.dofs.iter().enumerate() {
            expected_residual[i] += system.residual[a];
            for (b, &j) in system.dofs.iter().enumerate() {
                expected_jacobian[(i, j)] += system.jacobian[(a, b)];
            }
        }
    }

    let global = domain
        .pre_assemble(0.0, 1.0, &u)
        .unwrap()
        .assemble_global(&u, &u_dot, ScalingCoefficients::default())
        .unwrap();
    let jacobian = DMatrix::from(&global.jacobian);
    assert_matrix_eq!(global.residual, expected_residual, comp = abs, tol = 1e-12);
    assert_matrix_eq!(jacobian, expected_jacobian, comp = abs, tol = 1e-12);
    assert_matrix_eq!(jacobian, jacobian.transpose(), comp = abs, tol = 1e-10);
    assert_matrix_eq!(global.residual, -&jacobian * &u, comp = abs, tol = 1e-10);
    assert_matrix_eq!(domain.nodal_forces(), -&global.residual, comp = abs, tol = 1e-12);
    assert_eq!(domain.iterate(), 2);
}

#[test]
fn pre_assembly_validates_input() {
    let mut domain = two_point_domain(StrainDamageModel::default(), two_point_parameters());
    let u = DVector::zeros(12);

    let err = nonlocal_error(domain.pre_assemble(0.0, -1.0, &u));
    assert!(matches!(err, NonlocalError::InvalidParameter { name: "dt", .. }));
    let err = nonlocal_error(domain.pre_assemble(0.0, f64::NAN, &u));
    assert!(matches!(err, NonlocalError::InvalidParameter { name: "dt", .. }));
    let err = nonlocal_error(domain.pre_assemble(0.0, 1.0, &DVector::zeros(10)));
    assert!(matches!(
        err,
        NonlocalError::DimensionMismatch {
            expected: 12,
            actual: 10,
            ..
        }
    ));
    assert_eq!(domain.iterate(), 0);
    assert!(domain.pre_assemble(0.0, 0.0, &u).is_ok());
}

#[test]
fn constitutive_failure_aborts_pre_assembly() {
    let model = StrainDamageModel {
        failure_strain: Some(0.05),
        ..StrainDamageModel::default()
    };
    let mesh = two_squares();
    let mut domain = two_point_domain(model, two_point_parameters());

    let result = domain.pre_assemble(0.0, 1.0, &stretch(&mesh, 0.1));
    let message = match &result {
        Err(report) => format!("{:#}", report),
        Ok(_) => panic!("Expected pre-assembly to fail"),
    };
    assert!(message.contains("Pre-assembly failed"));
    let err = nonlocal_error(result);
    assert!(matches!(err, NonlocalError::ConstitutiveIntegrationFailure { point: 0, .. }));

    // A smaller load succeeds afterwards
    assert!(domain.pre_assemble(0.0, 1.0, &stretch(&mesh, 0.01)).is_ok());
}

#[test]
fn nonlocal_phase_requires_neighbor_graph() {
    let mut domain =
        NonlocalDomain::from_mesh(&two_squares(), Arc::new(StrainDamageModel::default()), two_point_parameters())
            .unwrap();
    assert!(domain.neighbor_statistics().is_none());
    let u = DVector::zeros(12);
    let pre = domain.pre_assemble(0.0, 0.0, &u).unwrap();
    let err = nonlocal_error(pre.nonlocal_kappa());
    assert!(matches!(err, NonlocalError::MissingNeighborGraph { .. }));
}

#[test]
fn stale_neighbors_are_detected() {
    let mut domain = two_point_domain(StrainDamageModel::default(), two_point_parameters());
    let u = DVector::zeros(12);
    domain.pre_assemble(0.0, 0.0, &u).unwrap();

    // Re-integrating a single element behind the domain's back leaves it on another iterate
    let local_u = DVector::zeros(8);
    domain
        .assembler_mut(1)
        .unwrap()
        .pre_assemble(0.0, 0.0, DVectorView::from(&local_u), 99)
        .unwrap();

    let check = domain.parameters().partition_of_unity;
    let result = domain
        .assembler(0)
        .unwrap()
        .compute_nonlocal_kappa(domain.assemblers(), domain.iterate(), &check);
    assert!(matches!(
        result,
        Err(NonlocalError::StalePreAssembly {
            element: 1,
            point: 0,
            expected_iterate: 1,
            found_iterate: 99,
        })
    ));
}

#[test]
fn rejected_damage_unwinds_to_caller() {
    let model = StrainDamageModel {
        kappa_ref: 0.01,
        ..StrainDamageModel::default()
    };
    let parameters = two_point_parameters().with_damage_policy(DamagePolicy::Reject);
    let mesh = two_squares();
    let mut domain = two_point_domain(model, parameters);
    let u = stretch(&mesh, 0.1);

    let result = domain
        .pre_assemble(0.0, 1.0, &u)
        .unwrap()
        .assemble_global(&u, &DVector::zeros(12), ScalingCoefficients::default());
    let err = nonlocal_error(result);
    assert!(matches!(err, NonlocalError::DamageOutOfRange { .. }));
}

#[test]
fn damage_grows_under_loading_and_is_committed() {
    let model = StrainDamageModel {
        kappa_ref: 10.0,
        ..StrainDamageModel::default()
    };
    let mesh = two_squares();
    let mut domain = two_point_domain(model, two_point_parameters());
    let u_dot = DVector::zeros(12);

    let mut previous = vec![0.0; 2];
    for step in 1..=4 {
        let u = stretch(&mesh, 0.05 * step as f64);
        // Repeated iterates within a step do not accumulate
        for _ in 0..2 {
            domain
                .pre_assemble(step as f64, 1.0, &u)
                .unwrap()
                .assemble_global(&u, &u_dot, ScalingCoefficients::default())
                .unwrap();
        }
        domain.push_back_state();

        let damage = domain.damage_values();
        for (d, d_prev) in damage.iter().zip(&previous) {
            assert!(d > d_prev);
        }
        for kappa in domain.kappa_d_values() {
            assert_scalar_eq!(kappa, 0.05 * step as f64, comp = abs, tol = 1e-12);
        }
        previous = damage;
    }
}

#[test]
fn integration_point_data_is_distributed_over_elements() {
    let mut domain = two_point_domain(StrainDamageModel::default(), two_point_parameters());

    domain
        .set_integration_point_data(IntegrationPointField::KappaD, &[0.25, 0.5], 1)
        .unwrap();
    assert_eq!(domain.kappa_d_values(), vec![0.25, 0.5]);

    let stress = [1.0, 2.0, 3.0, 0.5, -1.0, -2.0, -3.0, -0.5];
    domain
        .set_integration_point_data(IntegrationPointField::Stress, &stress, 1)
        .unwrap();
    assert_matrix_eq!(
        DVector::from_vec(domain.stress_values()),
        DVector::from_column_slice(&stress),
        comp = abs,
        tol = 1e-14
    );

    let err = nonlocal_error(domain.set_integration_point_data(IntegrationPointField::KappaD, &[0.0], 1));
    assert!(matches!(err, NonlocalError::DimensionMismatch { .. }));
    let err = nonlocal_error(domain.set_integration_point_data(IntegrationPointField::KappaD, &[0.0; 2], 2));
    assert!(matches!(err, NonlocalError::IntegrationOrderMismatch { .. }));
}

#[test]
fn invalid_setup_is_rejected() {
    let model = Arc::new(StrainDamageModel::default());
    let err = nonlocal_error(NonlocalDomain::from_mesh(&two_squares(), model.clone(), NonlocalParameters::new(-1.0)));
    assert!(matches!(
        err,
        NonlocalError::InvalidParameter {
            name: "internal_length",
            ..
        }
    ));

    let assembler = |index, order| {
        ElementLocalAssembler::new(index, Quad4Element::reference(), vec![0, 1, 2, 3], model.clone(), order).unwrap()
    };
    let err = nonlocal_error(NonlocalDomain::from_assemblers(
        vec![assembler(0, 2), assembler(1, 3)],
        4,
        NonlocalParameters::new(1.0),
    ));
    assert!(matches!(
        err,
        NonlocalError::IntegrationOrderMismatch {
            element: 1,
            expected: 2,
            actual: 3,
        }
    ));

    let unordered = NonlocalDomain::from_assemblers(vec![assembler(1, 2)], 4, NonlocalParameters::new(1.0));
    assert!(unordered.is_err());
    let missing_nodes = NonlocalDomain::from_assemblers(vec![assembler(0, 2)], 3, NonlocalParameters::new(1.0));
    assert!(missing_nodes.is_err());

    // A query that finds nothing leaves every point without neighbors
    let mut domain = two_point_domain(StrainDamageModel::default(), two_point_parameters());
    let err = nonlocal_error(domain.build_neighbor_graph_with(&BruteForcePointIndex::default()));
    assert!(matches!(err, NonlocalError::DegenerateNeighborhood { .. }));
}

#[test]
fn crack_volume_sums_over_elements() {
    let model = StrainDamageModel {
        kappa_ref: 2.0,
        ..StrainDamageModel::default()
    };
    let mesh = two_squares();
    let mut domain = two_point_domain(model, two_point_parameters());
    let u = stretch(&mesh, 0.1);
    domain
        .pre_assemble(0.0, 1.0, &u)
        .unwrap()
        .assemble_global(&u, &DVector::zeros(12), ScalingCoefficients::default())
        .unwrap();

    // Uniform strain 0.1 and damage 0.05 over an area of 2
    let volume = domain.crack_volume(&u).unwrap();
    assert_scalar_eq!(volume, 0.1 * 0.05 * 2.0, comp = abs, tol = 1e-12);
    assert!(domain.crack_volume(&DVector::zeros(3)).is_err());
}

#[test]
fn material_forces_balance_under_homogeneous_deformation() {
    let mesh = create_rectangular_uniform_quad_mesh_2d(1.0, 3, 2, 1, &Vector2::zeros());
    let model = LinearElasticModel::new(LameParameters { mu: 100.0, lambda: 150.0 });
    let mut domain = NonlocalDomain::from_mesh(&mesh, Arc::new(model), NonlocalParameters::new(1.0)).unwrap();
    domain.build_neighbor_graph().unwrap();

    let u = DVector::from_iterator(
        domain.num_dofs(),
        mesh.vertices()
            .iter()
            .flat_map(|v| [2e-3 * v.x + 1e-3 * v.y, -5e-4 * v.x + 1.5e-3 * v.y]),
    );
    domain.pre_assemble(0.0, 1.0, &u).unwrap();
    let forces = domain.material_forces(&u).unwrap();

    // The Eshelby stress is uniform, so only boundary nodes carry material forces
    let mut boundary_force_norm = 0.0;
    for (node, v) in mesh.vertices().iter().enumerate() {
        let force = forces.rows(2 * node, 2);
        let interior = v.x > 0.0 && v.x < 3.0 && v.y > 0.0 && v.y < 2.0;
        if interior {
            assert_matrix_eq!(force.clone_owned(), DVector::zeros(2), comp = abs, tol = 1e-14);
        } else {
            boundary_force_norm += force.norm();
        }
    }
    assert!(boundary_force_norm > 1e-6);
    let total_x: f64 = forces.iter().step_by(2).sum();
    let total_y: f64 = forces.iter().skip(1).step_by(2).sum();
    assert_scalar_eq!(total_x, 0.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(total_y, 0.0, comp = abs, tol = 1e-14);

    assert!(domain.material_forces(&DVector::zeros(4)).is_err());
}
