use crate::{StrainDamageModel, StrainDamageState};
use ndfem::assembly::global::NonlocalDomain;
use ndfem::assembly::local::ScalingCoefficients;
use ndfem::checkpoint::DomainCheckpoint;
use ndfem::config::NonlocalParameters;
use ndfem::element::Quad4Element;
use ndfem::error::NonlocalError;
use ndfem::mesh::procedural::create_rectangular_uniform_quad_mesh_2d;
use ndfem::mesh::QuadMesh2d;
use ndfem::nalgebra::{DVector, Vector2};
use std::sync::Arc;

fn mesh() -> QuadMesh2d {
    create_rectangular_uniform_quad_mesh_2d(1.0, 3, 1, 2, &Vector2::zeros())
}

fn domain(parameters: NonlocalParameters) -> NonlocalDomain<Quad4Element, StrainDamageModel> {
    let model = StrainDamageModel {
        kappa_ref: 4.0,
        ..StrainDamageModel::default()
    };
    NonlocalDomain::from_mesh(&mesh(), Arc::new(model), parameters).unwrap()
}

/// Displacements that stretch the left half of the strip more than the right half.
fn displacement(scale: f64) -> DVector<f64> {
    let vertices = mesh().vertices().to_vec();
    DVector::from_iterator(
        2 * vertices.len(),
        vertices
            .iter()
            .flat_map(|v| [scale * v.x.min(1.5) + 0.2 * scale * v.x, 0.1 * scale * v.y]),
    )
}

fn step(domain: &mut NonlocalDomain<Quad4Element, StrainDamageModel>, scale: f64) {
    let u = displacement(scale);
    let u_dot = DVector::zeros(u.len());
    domain
        .pre_assemble(0.0, 1.0, &u)
        .unwrap()
        .assemble_global(&u, &u_dot, ScalingCoefficients::default())
        .unwrap();
    domain.push_back_state();
}

#[test]
fn restored_domain_continues_identically() {
    let parameters = NonlocalParameters::new(0.6);
    let mut original = domain(parameters.clone());
    original.build_neighbor_graph().unwrap();
    step(&mut original, 0.05);

    let checkpoint = original.checkpoint();
    assert_eq!(checkpoint.elements.len(), mesh().connectivity().len());
    assert_eq!(checkpoint.elements.len(), 12);
    let json = serde_json::to_string(&checkpoint).unwrap();
    let deserialized: DomainCheckpoint<StrainDamageState> = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, checkpoint);

    let mut restored = domain(parameters);
    assert!(restored.neighbor_statistics().is_none());
    restored.restore(&deserialized).unwrap();
    assert_eq!(restored.neighbor_statistics(), original.neighbor_statistics());
    assert_eq!(restored.kappa_d_values(), original.kappa_d_values());
    assert_eq!(restored.damage_values(), original.damage_values());
    assert_eq!(restored.checkpoint(), checkpoint);

    step(&mut original, 0.08);
    step(&mut restored, 0.08);
    assert_eq!(restored.damage_values(), original.damage_values());
    assert_eq!(restored.stress_values(), original.stress_values());
}

#[test]
fn checkpoint_stores_committed_state_only() {
    let mut domain = domain(NonlocalParameters::new(0.6));
    domain.build_neighbor_graph().unwrap();
    step(&mut domain, 0.05);
    let committed = domain.checkpoint();

    // An unconverged iterate does not show up in the checkpoint
    let u = displacement(0.5);
    domain.pre_assemble(0.0, 1.0, &u).unwrap();
    assert_eq!(domain.checkpoint(), committed);
}

#[test]
fn incompatible_checkpoints_are_rejected() {
    let mut source = domain(NonlocalParameters::new(0.6));
    source.build_neighbor_graph().unwrap();
    let checkpoint = source.checkpoint();

    let mut other_length = domain(NonlocalParameters::new(0.7));
    assert!(other_length.restore(&checkpoint).is_err());

    let mut other_order = domain(NonlocalParameters::new(0.6).with_integration_order(3));
    let err = other_order
        .restore(&checkpoint)
        .unwrap_err()
        .downcast::<NonlocalError>()
        .unwrap();
    assert!(matches!(
        err,
        NonlocalError::IntegrationOrderMismatch {
            expected: 3,
            actual: 2,
            ..
        }
    ));

    let mut truncated = checkpoint.clone();
    truncated.elements.pop();
    let mut target = domain(NonlocalParameters::new(0.6));
    assert!(target.restore(&truncated).is_err());

    let mut corrupted = checkpoint;
    corrupted.elements[2].points[1].strain = DVector::zeros(6);
    assert!(target.restore(&corrupted).is_err());
}
