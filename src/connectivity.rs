//! Cell connectivity: which mesh vertices make up each element.
use crate::element::{FiniteElement, Hex8Element, Quad4Element};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub trait ElementConnectivity: Clone + Debug + Send + Sync {
    type Element: FiniteElement;

    fn vertex_indices(&self) -> &[usize];

    /// Builds the element from mesh vertices, or returns `None` if a vertex index is out of
    /// bounds.
    fn element(&self, vertices: &[Point3<f64>]) -> Option<Self::Element>;
}

/// Counter-clockwise bilinear quadrilateral cell in the xy-plane.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quad4Connectivity(pub [usize; 4]);

impl ElementConnectivity for Quad4Connectivity {
    type Element = Quad4Element;

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }

    fn element(&self, vertices: &[Point3<f64>]) -> Option<Self::Element> {
        let v = |i: usize| vertices.get(self.0[i]).map(|p| p.xy());
        Some(Quad4Element::from_vertices([v(0)?, v(1)?, v(2)?, v(3)?]))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hex8Connectivity(pub [usize; 8]);

impl ElementConnectivity for Hex8Connectivity {
    type Element = Hex8Element;

    fn vertex_indices(&self) -> &[usize] {
        &self.0
    }

    fn element(&self, vertices: &[Point3<f64>]) -> Option<Self::Element> {
        let v = |i: usize| vertices.get(self.0[i]).copied();
        Some(Hex8Element::from_vertices([
            v(0)?,
            v(1)?,
            v(2)?,
            v(3)?,
            v(4)?,
            v(5)?,
            v(6)?,
            v(7)?,
        ]))
    }
}
