//! Finite elements and the geometric data needed at quadrature points.
use crate::kelvin::SpatialDim;
use crate::quadrature::ReferenceShape;
use itertools::Itertools;
use nalgebra::{distance, DMatrix, DVector, Point3};
use std::fmt::Debug;

mod hexahedron;
mod quadrilateral;

pub use hexahedron::*;
pub use quadrilateral::*;

/// An isoparametric finite element with vector-valued (displacement) degrees of freedom.
///
/// Reference coordinates are always passed as 3D points. Two-dimensional elements ignore the
/// last coordinate.
pub trait FiniteElement: Debug + Clone + Send + Sync {
    fn spatial_dim(&self) -> SpatialDim;

    fn reference_shape(&self) -> ReferenceShape;

    fn num_nodes(&self) -> usize;

    /// Evaluates each basis function at the given reference coordinates.
    fn evaluate_basis(&self, xi: &Point3<f64>) -> DVector<f64>;

    /// Reference gradients of the basis functions, one column per node.
    fn gradients(&self, xi: &Point3<f64>) -> DMatrix<f64>;

    /// Node coordinates, one column per node.
    fn node_coordinates(&self) -> DMatrix<f64>;

    /// Maps reference coordinates to physical coordinates. 2D elements lie in the plane z = 0.
    #[allow(non_snake_case)]
    fn map_reference_coords(&self, xi: &Point3<f64>) -> Point3<f64> {
        let X = self.node_coordinates();
        let x = X * self.evaluate_basis(xi);
        let mut p = Point3::origin();
        p.coords.rows_mut(0, x.len()).copy_from(&x);
        p
    }

    /// The Jacobian $\partial x / \partial \xi$ of the reference-to-physical map.
    #[allow(non_snake_case)]
    fn reference_jacobian(&self, xi: &Point3<f64>) -> DMatrix<f64> {
        self.node_coordinates() * self.gradients(xi).transpose()
    }

    /// Largest distance between two nodes.
    #[allow(non_snake_case)]
    fn diameter(&self) -> f64 {
        let X = self.node_coordinates();
        X.column_iter()
            .map(|c| {
                let mut p = Point3::origin();
                p.coords.rows_mut(0, c.len()).copy_from(&c);
                p
            })
            .tuple_combinations()
            .map(|(a, b)| distance(&a, &b))
            .fold(0.0, f64::max)
    }
}

/// Basis data of an element evaluated at a single quadrature point.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeData {
    /// Basis function values.
    pub n: DVector<f64>,
    /// Physical basis gradients, one column per node.
    pub dndx: DMatrix<f64>,
    /// Determinant of the reference Jacobian.
    pub det_j: f64,
    /// Physical coordinates of the point.
    pub position: Point3<f64>,
}

/// Evaluates basis values, physical gradients and the Jacobian determinant at `xi`.
///
/// Returns `None` if the element map is singular at `xi`.
#[allow(non_snake_case)]
pub fn compute_shape_data<E: FiniteElement>(element: &E, xi: &Point3<f64>) -> Option<ShapeData> {
    let J = element.reference_jacobian(xi);
    let det_j = J.determinant();
    let j_inv_t = J.try_inverse()?.transpose();
    if det_j == 0.0 || !det_j.is_finite() {
        return None;
    }
    Some(ShapeData {
        n: element.evaluate_basis(xi),
        dndx: j_inv_t * element.gradients(xi),
        det_j,
        position: element.map_reference_coords(xi),
    })
}

/// Linear basis function on the interval [-1, 1], equal to one at `alpha`.
fn phi_linear_1d(alpha: f64, xi: f64) -> f64 {
    (1.0 + alpha * xi) / 2.0
}

fn phi_linear_1d_grad(alpha: f64) -> f64 {
    alpha / 2.0
}
