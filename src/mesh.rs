use crate::connectivity::{ElementConnectivity, Hex8Connectivity, Quad4Connectivity};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

pub mod procedural;

/// Index-based data structure for conforming meshes.
///
/// Vertices are stored as 3D points. Two-dimensional meshes have zero z-coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mesh<C> {
    vertices: Vec<Point3<f64>>,
    connectivity: Vec<C>,
}

pub type QuadMesh2d = Mesh<Quad4Connectivity>;
pub type HexMesh = Mesh<Hex8Connectivity>;

impl<C> Mesh<C> {
    pub fn from_vertices_and_connectivity(vertices: Vec<Point3<f64>>, connectivity: Vec<C>) -> Self {
        Self { vertices, connectivity }
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn vertices_mut(&mut self) -> &mut [Point3<f64>] {
        &mut self.vertices
    }

    pub fn connectivity(&self) -> &[C] {
        &self.connectivity
    }

    pub fn num_cells(&self) -> usize {
        self.connectivity.len()
    }
}

impl<C: ElementConnectivity> Mesh<C> {
    /// Returns the element for the given cell, or `None` if the index is out of bounds or the
    /// cell references a missing vertex.
    pub fn get_element(&self, cell_index: usize) -> Option<C::Element> {
        self.connectivity.get(cell_index)?.element(&self.vertices)
    }
}
