//! The per-element assembler of the nonlocal damage formulation.
//!
//! An [`ElementLocalAssembler`] owns the quadrature points of one element together with their
//! neighbor tables. Assembly of one global iterate happens in two phases:
//!
//! 1. [`pre_assemble`](ElementLocalAssembler::pre_assemble) integrates the constitutive model
//!    at every quadrature point and updates the local damage-driving variable.
//! 2. [`compute_nonlocal_kappa`](ElementLocalAssembler::compute_nonlocal_kappa) averages the
//!    local damage-driving variables of all neighbors (possibly in other elements), after which
//!    [`assemble_with_jacobian`](ElementLocalAssembler::assemble_with_jacobian) updates the
//!    damage and computes the element residual and Jacobian.
//!
//! Every element must complete phase 1 before any element enters phase 2. The
//! [`NonlocalDomain`](crate::assembly::global::NonlocalDomain) enforces this ordering.
use crate::assembly::QuadraturePoint;
use crate::checkpoint::{ElementCheckpoint, IntegrationPointCheckpoint};
use crate::config::{DamagePolicy, GammaSource, NonlocalParameters, PartitionOfUnityCheck, TangentKind};
use crate::constitutive::{ConstitutiveModel, NonlocalDamageModel, PlasticStrainOutput, SpatialPosition};
use crate::element::{compute_shape_data, FiniteElement};
use crate::error::{check_len, NonlocalError};
use crate::kelvin::{self, SpatialDim, TensorComponent};
use crate::nonlocal::{blend_overnonlocal, check_partition_of_unity, nonlocal_average, weight_sum, NeighborTable};
use crate::quadrature::tensor_gauss;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, DVectorView, Point3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Derivatives of the solver's solution vector with respect to its primary unknowns.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalingCoefficients {
    /// $\partial \dot{x} / \partial x$. There are no rate terms in the residual, so this does
    /// not enter the Jacobian.
    pub dxdot_dx: f64,
    /// $\partial x / \partial x$, multiplies the stiffness contribution.
    pub dx_dx: f64,
}

impl Default for ScalingCoefficients {
    fn default() -> Self {
        Self {
            dxdot_dx: 0.0,
            dx_dx: 1.0,
        }
    }
}

/// Residual and Jacobian contribution of a single element.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementSystem {
    pub element: usize,
    /// Global degrees of freedom corresponding to the local rows and columns.
    pub dofs: Vec<usize>,
    pub residual: DVector<f64>,
    pub jacobian: DMatrix<f64>,
}

/// Quadrature point fields that can be initialized from external data.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationPointField {
    /// Initial stress, tensor components in output order (see [`TensorComponent`]).
    Stress,
    /// Initial damage-driving variable.
    KappaD,
}

#[derive(Debug, Clone)]
pub struct ElementLocalAssembler<E, M: ConstitutiveModel> {
    element_index: usize,
    element: E,
    nodes: Vec<usize>,
    model: Arc<M>,
    integration_order: usize,
    points: Vec<QuadraturePoint<M::State>>,
    neighbors: Option<NeighborTable>,
}

impl<E, M> ElementLocalAssembler<E, M>
where
    E: FiniteElement,
    M: ConstitutiveModel,
{
    /// Sets up the quadrature points of the element.
    ///
    /// `nodes` are the global node indices of the element's vertices. Degrees of freedom are
    /// node-interleaved, i.e. component `i` of node `n` has global index `dim * n + i`.
    pub fn new(
        element_index: usize,
        element: E,
        nodes: Vec<usize>,
        model: Arc<M>,
        integration_order: usize,
    ) -> Result<Self, NonlocalError> {
        check_len("element nodes", element.num_nodes(), nodes.len())?;
        let dim = element.spatial_dim();
        let rule = tensor_gauss(element.reference_shape(), integration_order)?;

        let points = rule
            .weights
            .iter()
            .zip(&rule.points)
            .enumerate()
            .map(|(point, (&weight, xi))| {
                let shape = compute_shape_data(&element, xi).ok_or(NonlocalError::SingularJacobian {
                    element: element_index,
                    point,
                })?;
                let b = kelvin::strain_displacement_matrix(&shape.dndx, dim);
                Ok(QuadraturePoint::new(
                    shape.position,
                    weight * shape.det_j.abs(),
                    shape.n,
                    shape.dndx,
                    b,
                    model.create_material_state(dim),
                ))
            })
            .collect::<Result<Vec<_>, NonlocalError>>()?;

        Ok(Self {
            element_index,
            element,
            nodes,
            model,
            integration_order,
            points,
            neighbors: None,
        })
    }

    pub fn element_index(&self) -> usize {
        self.element_index
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn spatial_dim(&self) -> SpatialDim {
        self.element.spatial_dim()
    }

    pub fn integration_order(&self) -> usize {
        self.integration_order
    }

    pub fn num_dofs(&self) -> usize {
        self.spatial_dim().dim() * self.nodes.len()
    }

    /// Global indices of the element's degrees of freedom, in local order.
    pub fn global_dofs(&self) -> Vec<usize> {
        let d = self.spatial_dim().dim();
        self.nodes
            .iter()
            .flat_map(|&node| (0..d).map(move |i| d * node + i))
            .collect()
    }

    pub fn quadrature_points(&self) -> &[QuadraturePoint<M::State>] {
        &self.points
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.points.len()
    }

    pub fn integration_point_positions(&self) -> Vec<Point3<f64>> {
        self.points.iter().map(|qp| qp.position).collect()
    }

    pub fn integration_weights(&self) -> Vec<f64> {
        self.points.iter().map(|qp| qp.integration_weight).collect()
    }

    /// Replaces the neighbor table, one list of edges per quadrature point.
    pub fn set_neighbors(&mut self, table: NeighborTable) -> Result<(), NonlocalError> {
        check_len("neighbor lists", self.points.len(), table.len())?;
        self.neighbors = Some(table);
        Ok(())
    }

    pub fn neighbors(&self) -> Option<&NeighborTable> {
        self.neighbors.as_ref()
    }

    /// Commits the state of all quadrature points.
    ///
    /// Calling this repeatedly without an intervening pre-assembly has no further effect.
    pub fn push_back_state(&mut self) {
        for qp in &mut self.points {
            qp.push_back_state();
        }
    }

    /// Damaged stress of every quadrature point, in output component order.
    pub fn stress_values(&self) -> Vec<f64> {
        let dim = self.spatial_dim();
        let mut values = Vec::with_capacity(self.points.len() * dim.kelvin_size());
        for qp in &self.points {
            kelvin::extend_with_output_components(&mut values, &qp.damaged_stress(), dim);
        }
        values
    }

    /// A single damaged stress component of every quadrature point.
    pub fn stress_component_values(&self, component: TensorComponent) -> Vec<f64> {
        self.points
            .iter()
            .map(|qp| kelvin::tensor_component(&qp.damaged_stress(), component))
            .collect()
    }

    pub fn strain_values(&self) -> Vec<f64> {
        let dim = self.spatial_dim();
        let mut values = Vec::with_capacity(self.points.len() * dim.kelvin_size());
        for qp in &self.points {
            kelvin::extend_with_output_components(&mut values, &qp.strain, dim);
        }
        values
    }

    pub fn damage_values(&self) -> Vec<f64> {
        self.points.iter().map(|qp| qp.damage).collect()
    }

    pub fn kappa_d_values(&self) -> Vec<f64> {
        self.points.iter().map(|qp| qp.kappa_d).collect()
    }

    pub fn nonlocal_kappa_d_values(&self) -> Vec<f64> {
        self.points.iter().map(|qp| qp.nonlocal_kappa_d).collect()
    }

    /// Sets the damage-driving variable of every quadrature point, both current and committed.
    pub fn set_kappa_d(&mut self, values: &[f64]) -> Result<(), NonlocalError> {
        check_len("kappa_d values", self.points.len(), values.len())?;
        if let Some(&invalid) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(NonlocalError::InvalidParameter {
                name: "kappa_d",
                value: invalid,
            });
        }
        for (qp, &value) in self.points.iter_mut().zip(values) {
            qp.kappa_d = value;
            qp.kappa_d_prev = value;
        }
        Ok(())
    }

    pub fn set_uniform_kappa_d(&mut self, value: f64) -> Result<(), NonlocalError> {
        self.set_kappa_d(&vec![value; self.points.len()])
    }

    /// Sets the (undamaged) stress of every quadrature point, both current and committed.
    ///
    /// `values` holds the tensor components of each point in output order.
    pub fn set_initial_stress(&mut self, values: &[f64]) -> Result<(), NonlocalError> {
        let dim = self.spatial_dim();
        let n = TensorComponent::output_components(dim).len();
        check_len("initial stress components", n * self.points.len(), values.len())?;
        for (qp, chunk) in self.points.iter_mut().zip(values.chunks_exact(n)) {
            let stress = kelvin::from_output_components(chunk, dim);
            qp.stress.copy_from(&stress);
            qp.stress_prev.copy_from(&stress);
        }
        Ok(())
    }

    /// Initializes a quadrature point field from data produced with the given integration
    /// order. Returns the number of quadrature points that were set.
    pub fn set_integration_point_data(
        &mut self,
        field: IntegrationPointField,
        values: &[f64],
        integration_order: usize,
    ) -> Result<usize, NonlocalError> {
        if integration_order != self.integration_order {
            return Err(NonlocalError::IntegrationOrderMismatch {
                element: self.element_index,
                expected: self.integration_order,
                actual: integration_order,
            });
        }
        match field {
            IntegrationPointField::Stress => self.set_initial_stress(values)?,
            IntegrationPointField::KappaD => self.set_kappa_d(values)?,
        }
        Ok(self.points.len())
    }

    pub fn checkpoint(&self) -> ElementCheckpoint<M::State> {
        ElementCheckpoint {
            element: self.element_index,
            integration_order: self.integration_order,
            points: self
                .points
                .iter()
                .map(|qp| IntegrationPointCheckpoint {
                    strain: qp.strain_prev.clone(),
                    stress: qp.stress_prev.clone(),
                    damage: qp.damage_prev,
                    kappa_d: qp.kappa_d_prev,
                    material_state: qp.material_state_prev.clone(),
                })
                .collect(),
        }
    }

    /// Restores the committed state from a checkpoint. The current state is reset to the
    /// committed one, and the element must be pre-assembled again before assembly.
    pub fn restore(&mut self, checkpoint: &ElementCheckpoint<M::State>) -> Result<(), NonlocalError> {
        if checkpoint.element != self.element_index {
            return Err(NonlocalError::InvalidParameter {
                name: "checkpoint element index",
                value: checkpoint.element as f64,
            });
        }
        if checkpoint.integration_order != self.integration_order {
            return Err(NonlocalError::IntegrationOrderMismatch {
                element: self.element_index,
                expected: self.integration_order,
                actual: checkpoint.integration_order,
            });
        }
        check_len("checkpoint quadrature points", self.points.len(), checkpoint.points.len())?;
        let kelvin_size = self.spatial_dim().kelvin_size();
        for saved in &checkpoint.points {
            check_len("checkpoint strain components", kelvin_size, saved.strain.len())?;
            check_len("checkpoint stress components", kelvin_size, saved.stress.len())?;
        }

        for (qp, saved) in self.points.iter_mut().zip(&checkpoint.points) {
            qp.strain.copy_from(&saved.strain);
            qp.strain_prev.copy_from(&saved.strain);
            qp.stress.copy_from(&saved.stress);
            qp.stress_prev.copy_from(&saved.stress);
            qp.damage = saved.damage;
            qp.damage_prev = saved.damage;
            qp.kappa_d = saved.kappa_d;
            qp.kappa_d_prev = saved.kappa_d;
            qp.nonlocal_kappa_d = saved.kappa_d;
            qp.material_state = saved.material_state.clone();
            qp.material_state_prev = saved.material_state.clone();
            qp.iterate = 0;
        }
        Ok(())
    }

    /// Internal nodal forces $\sum_q \vec B^T (1 - d) \vec \sigma w$ of the current state.
    pub fn nodal_forces(&self) -> DVector<f64> {
        let mut forces = DVector::zeros(self.num_dofs());
        for qp in &self.points {
            forces.gemv_tr(qp.integration_weight, &qp.strain_displacement, &qp.damaged_stress(), 1.0);
        }
        forces
    }

    /// Material (configurational) forces for the local displacements `local_x`.
    ///
    /// Integrates the Eshelby stress
    /// $\vec \Sigma = \nabla \vec u^T \vec \sigma - \psi \vec I$ against the basis gradients,
    /// $\vec F_a = \sum_q \vec \Sigma \nabla N_a w$, with the damaged stress and the damaged free
    /// energy density $\psi = (1 - d) \psi_0$ of the current state.
    pub fn material_forces(&self, local_x: DVectorView<f64>) -> Result<DVector<f64>, NonlocalError> {
        check_len("local displacements", self.num_dofs(), local_x.len())?;
        let d = self.spatial_dim().dim();
        let num_nodes = self.nodes.len();
        // Column a holds the displacement of node a
        let u = DMatrix::from_iterator(d, num_nodes, local_x.iter().copied());
        let mut forces = DVector::zeros(self.num_dofs());
        for qp in &self.points {
            let grad_u = &u * qp.basis_gradients.transpose();
            let sigma = kelvin::to_tensor(&qp.damaged_stress());
            let sigma = sigma.view((0, 0), (d, d));
            let psi = (1.0 - qp.damage) * self.model.free_energy_density(&qp.strain, &qp.stress, &qp.material_state);

            let mut eshelby = grad_u.transpose() * sigma;
            for i in 0..d {
                eshelby[(i, i)] -= psi;
            }
            let nodal = eshelby * &qp.basis_gradients * qp.integration_weight;
            for (a, column) in nodal.column_iter().enumerate() {
                let mut nodal_force = forces.rows_mut(d * a, d);
                nodal_force += column;
            }
        }
        Ok(forces)
    }

    /// Crack volume $\sum_q \operatorname{tr}(\vec \varepsilon(\vec u)) \, d \, w$ for the given
    /// local displacements.
    pub fn crack_volume(&self, local_x: DVectorView<f64>) -> Result<f64, NonlocalError> {
        check_len("local displacements", self.num_dofs(), local_x.len())?;
        Ok(self
            .points
            .iter()
            .map(|qp| {
                let strain = &qp.strain_displacement * local_x;
                kelvin::trace(&strain) * qp.damage * qp.integration_weight
            })
            .sum())
    }

    fn spatial_position(&self, point: usize) -> SpatialPosition {
        SpatialPosition {
            element: self.element_index,
            point,
            coordinates: self.points[point].position,
        }
    }
}

impl<E, M> ElementLocalAssembler<E, M>
where
    E: FiniteElement,
    M: ConstitutiveModel,
    M::State: PlasticStrainOutput,
{
    /// Volumetric plastic strain $\operatorname{tr} \vec \varepsilon_p$ of every quadrature point.
    pub fn plastic_strain_volumetric_values(&self) -> Vec<f64> {
        self.points
            .iter()
            .map(|qp| kelvin::trace(qp.material_state.plastic_strain()))
            .collect()
    }

    /// Deviatoric plastic strain of every quadrature point, in output component order.
    pub fn plastic_strain_deviatoric_values(&self) -> Vec<f64> {
        let dim = self.spatial_dim();
        let mut values = Vec::with_capacity(self.points.len() * dim.kelvin_size());
        for qp in &self.points {
            let deviator = kelvin::deviatoric(qp.material_state.plastic_strain());
            kelvin::extend_with_output_components(&mut values, &deviator, dim);
        }
        values
    }
}

impl<E, M> ElementLocalAssembler<E, M>
where
    E: FiniteElement,
    M: NonlocalDamageModel,
{
    /// Integrates the constitutive model at every quadrature point for the displacements
    /// `local_x` and caches the local damage-driving variable.
    ///
    /// Any constitutive failure aborts pre-assembly of the element.
    pub fn pre_assemble(
        &mut self,
        t: f64,
        dt: f64,
        local_x: DVectorView<f64>,
        iterate: u64,
    ) -> Result<(), NonlocalError> {
        check_len("local displacements", self.num_dofs(), local_x.len())?;
        for point in 0..self.points.len() {
            let x = self.spatial_position(point);
            let qp = &mut self.points[point];
            let strain = &qp.strain_displacement * local_x;
            let update = self
                .model
                .integrate_stress(t, &x, dt, &qp.strain_prev, &strain, &qp.stress_prev, &qp.material_state_prev)
                .map_err(|source| NonlocalError::ConstitutiveIntegrationFailure {
                    element: self.element_index,
                    point,
                    source,
                })?;

            qp.kappa_d = qp.kappa_d_prev + self.model.damage_driving_increment(&update.state);
            qp.strain = strain;
            qp.stress = update.stress;
            qp.tangent = update.tangent;
            qp.material_state = update.state;
            qp.iterate = iterate;
        }
        Ok(())
    }

    /// Averages the local damage-driving variables of the neighbors of every quadrature point.
    ///
    /// `arena` must contain all elements, indexed by element index, and all of them must have
    /// been pre-assembled for `iterate`.
    pub fn compute_nonlocal_kappa(
        &self,
        arena: &[Self],
        iterate: u64,
        check: &PartitionOfUnityCheck,
    ) -> Result<Vec<f64>, NonlocalError> {
        let table = self.neighbors.as_ref().ok_or(NonlocalError::MissingNeighborGraph {
            element: self.element_index,
        })?;

        let mut values = Vec::with_capacity(table.len());
        for (point, edges) in table.iter().enumerate() {
            for edge in edges {
                let neighbor = arena
                    .get(edge.element)
                    .and_then(|assembler| assembler.points.get(edge.point))
                    .ok_or(NonlocalError::DimensionMismatch {
                        what: "elements in arena",
                        expected: edge.element + 1,
                        actual: arena.len(),
                    })?;
                if neighbor.iterate != iterate {
                    return Err(NonlocalError::StalePreAssembly {
                        element: edge.element,
                        point: edge.point,
                        expected_iterate: iterate,
                        found_iterate: neighbor.iterate,
                    });
                }
            }
            check_partition_of_unity(weight_sum(edges), check, self.element_index, point)?;
            values.push(nonlocal_average(edges, |edge| {
                arena[edge.element].points[edge.point].kappa_d
            }));
        }
        Ok(values)
    }

    /// Updates the damage from the nonlocal damage-driving variables and computes the element
    /// residual and Jacobian.
    ///
    /// The residual is $-\sum_q \vec B^T (1 - d) \vec \sigma w$. The Jacobian is
    /// $\sum_q \vec B^T \mathbb{C} \vec B w$, with $\mathbb{C}$ scaled by $(1 - d)$ if
    /// [`TangentKind::Damaged`] is configured, times `scaling.dx_dx`.
    pub fn assemble_with_jacobian(
        &mut self,
        t: f64,
        local_x: DVectorView<f64>,
        _local_x_dot: DVectorView<f64>,
        scaling: ScalingCoefficients,
        nonlocal_kappa: &[f64],
        parameters: &NonlocalParameters,
    ) -> Result<ElementSystem, NonlocalError> {
        let n = self.num_dofs();
        check_len("local displacements", n, local_x.len())?;
        check_len("nonlocal kappa values", self.points.len(), nonlocal_kappa.len())?;

        let mut residual = DVector::zeros(n);
        let mut jacobian = DMatrix::zeros(n, n);

        for (point, &kappa_nonlocal) in nonlocal_kappa.iter().enumerate() {
            let x = self.spatial_position(point);
            let gamma = match parameters.overnonlocal_gamma {
                GammaSource::Material => self.model.overnonlocal_gamma(t, &x),
                GammaSource::Constant(gamma) => gamma,
            };
            let qp = &mut self.points[point];

            let mut kappa = blend_overnonlocal(qp.kappa_d, kappa_nonlocal, gamma);
            if kappa < 0.0 {
                debug!(
                    "Negative damage-driving variable {} at integration point {} of element {} set to zero",
                    kappa, point, self.element_index
                );
                kappa = 0.0;
            }
            qp.nonlocal_kappa_d = kappa;

            let damage = self.model.update_damage(t, &x, kappa, &qp.material_state);
            qp.damage = apply_damage_policy(damage, parameters.damage_policy, self.element_index, point)?;

            let w = qp.integration_weight;
            let b = &qp.strain_displacement;
            residual.gemv_tr(-w, b, &qp.damaged_stress(), 1.0);

            let tangent_scale = match parameters.tangent {
                TangentKind::Undamaged => 1.0,
                TangentKind::Damaged => 1.0 - qp.damage,
            };
            let cb = &qp.tangent * b;
            jacobian.gemm_tr(w * tangent_scale * scaling.dx_dx, b, &cb, 1.0);
        }

        Ok(ElementSystem {
            element: self.element_index,
            dofs: self.global_dofs(),
            residual,
            jacobian,
        })
    }
}

fn apply_damage_policy(damage: f64, policy: DamagePolicy, element: usize, point: usize) -> Result<f64, NonlocalError> {
    let out_of_range = NonlocalError::DamageOutOfRange { element, point, damage };
    if policy != DamagePolicy::Unchecked && !damage.is_finite() {
        return Err(out_of_range);
    }
    match policy {
        DamagePolicy::Clamp if !(0.0..=1.0).contains(&damage) => {
            warn!("{}, clamped to [0, 1]", out_of_range);
            Ok(damage.clamp(0.0, 1.0))
        }
        DamagePolicy::FloorAtZero => Ok(damage.max(0.0)),
        DamagePolicy::Reject if !(0.0..=1.0).contains(&damage) => Err(out_of_range),
        _ => Ok(damage),
    }
}
