//! Orchestration of the element assemblers over a whole mesh.
use crate::assembly::local::{ElementLocalAssembler, ElementSystem, IntegrationPointField, ScalingCoefficients};
use crate::checkpoint::DomainCheckpoint;
use crate::config::NonlocalParameters;
use crate::connectivity::ElementConnectivity;
use crate::constitutive::{ConstitutiveModel, NonlocalDamageModel, PlasticStrainOutput};
use crate::element::FiniteElement;
use crate::error::NonlocalError;
use crate::kelvin::{SpatialDim, TensorComponent};
use crate::mesh::Mesh;
use crate::nonlocal::{build_neighbor_tables, NeighborStatistics};
use crate::spatial::{PointLocation, RTreePointIndex, SpatialQuery};
use eyre::{bail, eyre, WrapErr};
use log::{debug, info};
use nalgebra::{DVector, DVectorView};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::cell::RefCell;
use std::sync::Arc;
use thread_local::ThreadLocal;

/// Global residual vector and Jacobian matrix.
#[derive(Debug, Clone)]
pub struct GlobalSystem {
    pub residual: DVector<f64>,
    pub jacobian: CsrMatrix<f64>,
}

#[derive(Debug)]
struct GatherWorkspace {
    local_x: DVector<f64>,
    local_x_dot: DVector<f64>,
}

impl Default for GatherWorkspace {
    fn default() -> Self {
        Self {
            local_x: DVector::zeros(0),
            local_x_dot: DVector::zeros(0),
        }
    }
}

/// Copies the node-interleaved values of the given nodes from `global` into `local`.
pub fn gather_global_to_local(global: &DVector<f64>, local: &mut DVector<f64>, nodes: &[usize], solution_dim: usize) {
    let d = solution_dim;
    if local.len() != d * nodes.len() {
        *local = DVector::zeros(d * nodes.len());
    }
    for (i_local, &node) in nodes.iter().enumerate() {
        for i in 0..d {
            local[d * i_local + i] = global[d * node + i];
        }
    }
}

/// Sums element contributions into a global residual and a CSR Jacobian.
///
/// Residuals are accumulated in per-thread vectors that are merged afterwards.
pub fn scatter_element_systems(systems: &[ElementSystem], num_dofs: usize) -> GlobalSystem {
    let residual = systems
        .par_iter()
        .fold(
            || DVector::zeros(num_dofs),
            |mut acc, system| {
                for (i_local, &i) in system.dofs.iter().enumerate() {
                    acc[i] += system.residual[i_local];
                }
                acc
            },
        )
        .reduce(|| DVector::zeros(num_dofs), |a, b| a + b);

    let mut coo = CooMatrix::new(num_dofs, num_dofs);
    for system in systems {
        for (a, &i) in system.dofs.iter().enumerate() {
            for (b, &j) in system.dofs.iter().enumerate() {
                coo.push(i, j, system.jacobian[(a, b)]);
            }
        }
    }

    GlobalSystem {
        residual,
        jacobian: CsrMatrix::from(&coo),
    }
}

/// All element assemblers of a mesh together with the nonlocal neighbor graph between them.
///
/// The domain is the arena that neighbor edges index into. One global iterate is assembled as
/// ```text
/// let pre = domain.pre_assemble(t, dt, &u)?;
/// let system = pre.assemble_global(&u, &u_dot, ScalingCoefficients::default())?;
/// // ... solve, repeat until converged ...
/// domain.push_back_state();
/// ```
/// The nonlocal phase is only reachable through the [`PreAssembled`] token returned by
/// [`NonlocalDomain::pre_assemble`], so every element is pre-assembled for the current
/// iterate before any nonlocal average is evaluated.
pub struct NonlocalDomain<E, M: ConstitutiveModel> {
    assemblers: Vec<ElementLocalAssembler<E, M>>,
    num_nodes: usize,
    parameters: NonlocalParameters,
    iterate: u64,
    neighbor_statistics: Option<NeighborStatistics>,
    workspace: ThreadLocal<RefCell<GatherWorkspace>>,
}

impl<E, M> NonlocalDomain<E, M>
where
    E: FiniteElement,
    M: ConstitutiveModel,
{
    /// Creates one assembler per mesh cell. All cells share the given model.
    pub fn from_mesh<C>(mesh: &Mesh<C>, model: Arc<M>, parameters: NonlocalParameters) -> eyre::Result<Self>
    where
        C: ElementConnectivity<Element = E>,
    {
        parameters.validate().wrap_err("Invalid nonlocal parameters")?;
        let assemblers = mesh
            .connectivity()
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let element = cell
                    .element(mesh.vertices())
                    .ok_or_else(|| eyre!("Cell {} references a vertex that does not exist", i))?;
                ElementLocalAssembler::new(
                    i,
                    element,
                    cell.vertex_indices().to_vec(),
                    model.clone(),
                    parameters.integration_order,
                )
                .wrap_err_with(|| format!("Failed to set up assembler for cell {}", i))
            })
            .collect::<eyre::Result<Vec<_>>>()?;
        Self::from_assemblers(assemblers, mesh.vertices().len(), parameters)
    }

    /// Creates a domain from existing assemblers, which must be ordered by element index.
    pub fn from_assemblers(
        assemblers: Vec<ElementLocalAssembler<E, M>>,
        num_nodes: usize,
        parameters: NonlocalParameters,
    ) -> eyre::Result<Self> {
        parameters.validate().wrap_err("Invalid nonlocal parameters")?;
        let dim = assemblers.first().map(|a| a.spatial_dim());
        for (i, assembler) in assemblers.iter().enumerate() {
            if assembler.element_index() != i {
                bail!("Assembler at position {} has element index {}", i, assembler.element_index());
            }
            if Some(assembler.spatial_dim()) != dim {
                bail!("Element {} has a different spatial dimension than element 0", i);
            }
            if assembler.integration_order() != parameters.integration_order {
                return Err(NonlocalError::IntegrationOrderMismatch {
                    element: i,
                    expected: parameters.integration_order,
                    actual: assembler.integration_order(),
                }
                .into());
            }
            if let Some(&node) = assembler.nodes().iter().find(|&&node| node >= num_nodes) {
                bail!("Element {} references node {}, but the domain has {} nodes", i, node, num_nodes);
            }
        }

        info!(
            "Set up nonlocal domain with {} elements and {} integration points",
            assemblers.len(),
            assemblers.iter().map(|a| a.num_quadrature_points()).sum::<usize>()
        );
        Ok(Self {
            assemblers,
            num_nodes,
            parameters,
            iterate: 0,
            neighbor_statistics: None,
            workspace: ThreadLocal::new(),
        })
    }

    pub fn assemblers(&self) -> &[ElementLocalAssembler<E, M>] {
        &self.assemblers
    }

    pub fn assembler(&self, element: usize) -> Option<&ElementLocalAssembler<E, M>> {
        self.assemblers.get(element)
    }

    pub fn assembler_mut(&mut self, element: usize) -> Option<&mut ElementLocalAssembler<E, M>> {
        self.assemblers.get_mut(element)
    }

    pub fn parameters(&self) -> &NonlocalParameters {
        &self.parameters
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Spatial dimension of the elements, or `None` for an empty domain.
    pub fn spatial_dim(&self) -> Option<SpatialDim> {
        self.assemblers.first().map(|a| a.spatial_dim())
    }

    pub fn solution_dim(&self) -> usize {
        self.spatial_dim().map_or(0, SpatialDim::dim)
    }

    pub fn num_dofs(&self) -> usize {
        self.solution_dim() * self.num_nodes
    }

    /// The global iterate counter, incremented by every pre-assembly.
    pub fn iterate(&self) -> u64 {
        self.iterate
    }

    pub fn neighbor_statistics(&self) -> Option<NeighborStatistics> {
        self.neighbor_statistics
    }

    /// Builds the nonlocal neighbor graph using an R-tree over all quadrature points.
    ///
    /// Any previous graph is discarded.
    pub fn build_neighbor_graph(&mut self) -> eyre::Result<NeighborStatistics> {
        let locations = self.assemblers.iter().flat_map(|assembler| {
            let element = assembler.element_index();
            assembler
                .integration_point_positions()
                .into_iter()
                .enumerate()
                .map(move |(point, position)| PointLocation {
                    element,
                    point,
                    position,
                })
        });
        let index = RTreePointIndex::from_locations(locations);
        self.build_neighbor_graph_with(&index)
    }

    /// Builds the nonlocal neighbor graph with the given spatial query.
    pub fn build_neighbor_graph_with<Q>(&mut self, query: &Q) -> eyre::Result<NeighborStatistics>
    where
        Q: SpatialQuery + Sync,
    {
        let positions: Vec<_> = self
            .assemblers
            .iter()
            .map(|a| a.integration_point_positions())
            .collect();
        let weights: Vec<_> = self.assemblers.iter().map(|a| a.integration_weights()).collect();
        let internal_length = self.parameters.internal_length;

        let tables = build_neighbor_tables(&positions, &weights, internal_length, query)
            .wrap_err("Failed to build nonlocal neighbor graph")?;
        let statistics = NeighborStatistics::from_tables(&tables);
        for (assembler, table) in self.assemblers.iter_mut().zip(tables) {
            assembler.set_neighbors(table)?;
        }

        info!(
            "Built nonlocal neighbor graph with internal length {}: {}",
            internal_length, statistics
        );
        self.neighbor_statistics = Some(statistics);
        Ok(statistics)
    }

    /// Commits the converged state of every quadrature point.
    pub fn push_back_state(&mut self) {
        self.assemblers
            .par_iter_mut()
            .for_each(|assembler| assembler.push_back_state());
        debug!("Committed state after iterate {}", self.iterate);
    }

    /// Sets the damage-driving variable of every quadrature point to `value`.
    pub fn set_uniform_kappa_d(&mut self, value: f64) -> eyre::Result<()> {
        for assembler in &mut self.assemblers {
            assembler.set_uniform_kappa_d(value)?;
        }
        Ok(())
    }

    /// Initializes a quadrature point field from values concatenated over all elements in
    /// element order.
    pub fn set_integration_point_data(
        &mut self,
        field: IntegrationPointField,
        values: &[f64],
        integration_order: usize,
    ) -> eyre::Result<()> {
        let components = match (field, self.spatial_dim()) {
            (IntegrationPointField::Stress, Some(dim)) => TensorComponent::output_components(dim).len(),
            _ => 1,
        };
        let expected: usize = self
            .assemblers
            .iter()
            .map(|a| a.num_quadrature_points() * components)
            .sum();
        if expected != values.len() {
            return Err(NonlocalError::DimensionMismatch {
                what: "integration point values",
                expected,
                actual: values.len(),
            }
            .into());
        }

        let mut offset = 0;
        for assembler in &mut self.assemblers {
            let count = assembler.num_quadrature_points() * components;
            assembler
                .set_integration_point_data(field, &values[offset..offset + count], integration_order)
                .wrap_err_with(|| format!("Failed to set {:?} of element {}", field, assembler.element_index()))?;
            offset += count;
        }
        Ok(())
    }

    /// Damaged stresses of all quadrature points, in element order.
    pub fn stress_values(&self) -> Vec<f64> {
        self.assemblers.iter().flat_map(|a| a.stress_values()).collect()
    }

    pub fn strain_values(&self) -> Vec<f64> {
        self.assemblers.iter().flat_map(|a| a.strain_values()).collect()
    }

    pub fn damage_values(&self) -> Vec<f64> {
        self.assemblers.iter().flat_map(|a| a.damage_values()).collect()
    }

    pub fn kappa_d_values(&self) -> Vec<f64> {
        self.assemblers.iter().flat_map(|a| a.kappa_d_values()).collect()
    }

    pub fn nonlocal_kappa_d_values(&self) -> Vec<f64> {
        self.assemblers
            .iter()
            .flat_map(|a| a.nonlocal_kappa_d_values())
            .collect()
    }

    /// Global internal nodal forces of the current state.
    pub fn nodal_forces(&self) -> DVector<f64> {
        let mut forces = DVector::zeros(self.num_dofs());
        for assembler in &self.assemblers {
            let local = assembler.nodal_forces();
            for (i_local, i) in assembler.global_dofs().into_iter().enumerate() {
                forces[i] += local[i_local];
            }
        }
        forces
    }

    /// Material forces for the global displacement vector `u`, see
    /// [`ElementLocalAssembler::material_forces`].
    pub fn material_forces(&self, u: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        self.check_global_len(u)?;
        let d = self.solution_dim();
        let mut local_x = DVector::zeros(0);
        let mut forces = DVector::zeros(self.num_dofs());
        for assembler in &self.assemblers {
            gather_global_to_local(u, &mut local_x, assembler.nodes(), d);
            let local = assembler
                .material_forces(DVectorView::from(&local_x))
                .wrap_err_with(|| format!("Failed to compute material forces of element {}", assembler.element_index()))?;
            for (i_local, i) in assembler.global_dofs().into_iter().enumerate() {
                forces[i] += local[i_local];
            }
        }
        Ok(forces)
    }

    /// Total crack volume for the global displacement vector `u`.
    pub fn crack_volume(&self, u: &DVector<f64>) -> eyre::Result<f64> {
        self.check_global_len(u)?;
        let d = self.solution_dim();
        let mut local_x = DVector::zeros(0);
        let mut volume = 0.0;
        for assembler in &self.assemblers {
            gather_global_to_local(u, &mut local_x, assembler.nodes(), d);
            volume += assembler.crack_volume(DVectorView::from(&local_x))?;
        }
        Ok(volume)
    }

    pub fn checkpoint(&self) -> DomainCheckpoint<M::State> {
        DomainCheckpoint {
            internal_length: self.parameters.internal_length,
            integration_order: self.parameters.integration_order,
            elements: self.assemblers.iter().map(|a| a.checkpoint()).collect(),
        }
    }

    /// Restores the committed state and rebuilds the neighbor graph.
    pub fn restore(&mut self, checkpoint: &DomainCheckpoint<M::State>) -> eyre::Result<()> {
        if checkpoint.internal_length != self.parameters.internal_length {
            bail!(
                "Checkpoint was written with internal length {}, but the domain uses {}",
                checkpoint.internal_length,
                self.parameters.internal_length
            );
        }
        if checkpoint.integration_order != self.parameters.integration_order {
            return Err(NonlocalError::IntegrationOrderMismatch {
                element: 0,
                expected: self.parameters.integration_order,
                actual: checkpoint.integration_order,
            }
            .into());
        }
        if checkpoint.elements.len() != self.assemblers.len() {
            bail!(
                "Checkpoint contains {} elements, but the domain has {}",
                checkpoint.elements.len(),
                self.assemblers.len()
            );
        }
        for (assembler, element) in self.assemblers.iter_mut().zip(&checkpoint.elements) {
            assembler
                .restore(element)
                .wrap_err_with(|| format!("Failed to restore element {}", element.element))?;
        }
        self.build_neighbor_graph()?;
        Ok(())
    }

    fn check_global_len(&self, x: &DVector<f64>) -> Result<(), NonlocalError> {
        if x.len() == self.num_dofs() {
            Ok(())
        } else {
            Err(NonlocalError::DimensionMismatch {
                what: "global degrees of freedom",
                expected: self.num_dofs(),
                actual: x.len(),
            })
        }
    }
}

impl<E, M> NonlocalDomain<E, M>
where
    E: FiniteElement,
    M: ConstitutiveModel,
    M::State: PlasticStrainOutput,
{
    pub fn plastic_strain_volumetric_values(&self) -> Vec<f64> {
        self.assemblers
            .iter()
            .flat_map(|a| a.plastic_strain_volumetric_values())
            .collect()
    }

    pub fn plastic_strain_deviatoric_values(&self) -> Vec<f64> {
        self.assemblers
            .iter()
            .flat_map(|a| a.plastic_strain_deviatoric_values())
            .collect()
    }
}

impl<E, M> NonlocalDomain<E, M>
where
    E: FiniteElement,
    M: NonlocalDamageModel,
{
    /// Integrates the constitutive model in every element for the global displacements `u`.
    ///
    /// Returns a token through which the nonlocal phase of the same iterate is assembled. If
    /// any element fails, the error is returned and no element may be assembled until a new
    /// pre-assembly succeeds.
    pub fn pre_assemble(&mut self, t: f64, dt: f64, u: &DVector<f64>) -> eyre::Result<PreAssembled<'_, E, M>> {
        if !(dt.is_finite() && dt >= 0.0) {
            return Err(NonlocalError::InvalidParameter { name: "dt", value: dt }.into());
        }
        self.check_global_len(u)?;

        self.iterate += 1;
        let iterate = self.iterate;
        let d = self.solution_dim();
        let workspace = &self.workspace;
        self.assemblers
            .par_iter_mut()
            .try_for_each(|assembler| {
                let mut ws = workspace.get_or_default().borrow_mut();
                gather_global_to_local(u, &mut ws.local_x, assembler.nodes(), d);
                assembler.pre_assemble(t, dt, DVectorView::from(&ws.local_x), iterate)
            })
            .wrap_err_with(|| format!("Pre-assembly failed at t = {}", t))?;

        debug!("Pre-assembled iterate {} at t = {}", iterate, t);
        Ok(PreAssembled { domain: self, t })
    }

    fn assemble_elements(
        &mut self,
        t: f64,
        u: &DVector<f64>,
        u_dot: &DVector<f64>,
        scaling: ScalingCoefficients,
        nonlocal_kappa: &[Vec<f64>],
    ) -> eyre::Result<Vec<ElementSystem>> {
        self.check_global_len(u)?;
        self.check_global_len(u_dot)?;
        let d = self.solution_dim();
        let parameters = &self.parameters;
        let workspace = &self.workspace;
        self.assemblers
            .par_iter_mut()
            .zip(nonlocal_kappa.par_iter())
            .map(|(assembler, kappa)| {
                let mut ws = workspace.get_or_default().borrow_mut();
                let ws = &mut *ws;
                gather_global_to_local(u, &mut ws.local_x, assembler.nodes(), d);
                gather_global_to_local(u_dot, &mut ws.local_x_dot, assembler.nodes(), d);
                assembler.assemble_with_jacobian(
                    t,
                    DVectorView::from(&ws.local_x),
                    DVectorView::from(&ws.local_x_dot),
                    scaling,
                    kappa,
                    parameters,
                )
            })
            .collect::<Result<Vec<_>, _>>()
            .wrap_err_with(|| format!("Assembly failed at t = {}", t))
    }
}

/// A domain whose elements have all been pre-assembled for the current iterate.
pub struct PreAssembled<'a, E, M: ConstitutiveModel> {
    domain: &'a mut NonlocalDomain<E, M>,
    t: f64,
}

impl<'a, E, M> PreAssembled<'a, E, M>
where
    E: FiniteElement,
    M: NonlocalDamageModel,
{
    pub fn domain(&self) -> &NonlocalDomain<E, M> {
        self.domain
    }

    pub fn iterate(&self) -> u64 {
        self.domain.iterate
    }

    /// Nonlocal damage-driving variables of every quadrature point, grouped by element.
    pub fn nonlocal_kappa(&self) -> eyre::Result<Vec<Vec<f64>>> {
        let arena = &self.domain.assemblers;
        let check = &self.domain.parameters.partition_of_unity;
        let iterate = self.domain.iterate;
        arena
            .par_iter()
            .map(|assembler| assembler.compute_nonlocal_kappa(arena, iterate, check))
            .collect::<Result<Vec<_>, _>>()
            .wrap_err("Nonlocal averaging failed")
    }

    /// Updates damage everywhere and returns the contribution of each element.
    pub fn assemble_with_jacobian(
        self,
        u: &DVector<f64>,
        u_dot: &DVector<f64>,
        scaling: ScalingCoefficients,
    ) -> eyre::Result<Vec<ElementSystem>> {
        let nonlocal_kappa = self.nonlocal_kappa()?;
        let PreAssembled { domain, t } = self;
        domain.assemble_elements(t, u, u_dot, scaling, &nonlocal_kappa)
    }

    /// Same as [`assemble_with_jacobian`](Self::assemble_with_jacobian), but sums the
    /// element contributions into a global system.
    pub fn assemble_global(
        self,
        u: &DVector<f64>,
        u_dot: &DVector<f64>,
        scaling: ScalingCoefficients,
    ) -> eyre::Result<GlobalSystem> {
        let num_dofs = self.domain.num_dofs();
        let systems = self.assemble_with_jacobian(u, u_dot, scaling)?;
        Ok(scatter_element_systems(&systems, num_dofs))
    }
}
