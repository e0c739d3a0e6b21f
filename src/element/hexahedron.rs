use crate::element::{phi_linear_1d, phi_linear_1d_grad, FiniteElement};
use crate::kelvin::SpatialDim;
use crate::quadrature::ReferenceShape;
use nalgebra::{DMatrix, DVector, OMatrix, Point3, Vector3, U1, U3, U8};

/// Trilinear hexahedron. The first four vertices form the bottom face (counter-clockwise
/// when seen from above), the last four the top face in the same order.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Hex8Element {
    vertices: [Point3<f64>; 8],
}

impl Hex8Element {
    pub fn from_vertices(vertices: [Point3<f64>; 8]) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point3<f64>; 8] {
        &self.vertices
    }

    pub fn reference() -> Self {
        Self::from_vertices([
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(1.0, -1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
        ])
    }

    #[rustfmt::skip]
    fn basis_fixed(&self, xi: &Point3<f64>) -> OMatrix<f64, U1, U8> {
        let phi = |alpha, beta, gamma|
            phi_linear_1d(alpha, xi[0]) * phi_linear_1d(beta, xi[1]) * phi_linear_1d(gamma, xi[2]);
        OMatrix::<f64, U1, U8>::from_row_slice(&[
            phi(-1.0, -1.0, -1.0),
            phi( 1.0, -1.0, -1.0),
            phi( 1.0,  1.0, -1.0),
            phi(-1.0,  1.0, -1.0),
            phi(-1.0, -1.0,  1.0),
            phi( 1.0, -1.0,  1.0),
            phi( 1.0,  1.0,  1.0),
            phi(-1.0,  1.0,  1.0),
        ])
    }

    #[rustfmt::skip]
    fn gradients_fixed(&self, xi: &Point3<f64>) -> OMatrix<f64, U3, U8> {
        let (phi, grad) = (phi_linear_1d, phi_linear_1d_grad);
        let phi_grad = |alpha, beta, gamma| Vector3::new(
            grad(alpha) * phi(beta, xi[1]) * phi(gamma, xi[2]),
            phi(alpha, xi[0]) * grad(beta) * phi(gamma, xi[2]),
            phi(alpha, xi[0]) * phi(beta, xi[1]) * grad(gamma),
        );
        OMatrix::from_columns(&[
            phi_grad(-1.0, -1.0, -1.0),
            phi_grad( 1.0, -1.0, -1.0),
            phi_grad( 1.0,  1.0, -1.0),
            phi_grad(-1.0,  1.0, -1.0),
            phi_grad(-1.0, -1.0,  1.0),
            phi_grad( 1.0, -1.0,  1.0),
            phi_grad( 1.0,  1.0,  1.0),
            phi_grad(-1.0,  1.0,  1.0),
        ])
    }
}

impl FiniteElement for Hex8Element {
    fn spatial_dim(&self) -> SpatialDim {
        SpatialDim::Three
    }

    fn reference_shape(&self) -> ReferenceShape {
        ReferenceShape::Hexahedron
    }

    fn num_nodes(&self) -> usize {
        8
    }

    fn evaluate_basis(&self, xi: &Point3<f64>) -> DVector<f64> {
        DVector::from_row_slice(self.basis_fixed(xi).as_slice())
    }

    fn gradients(&self, xi: &Point3<f64>) -> DMatrix<f64> {
        let g = self.gradients_fixed(xi);
        DMatrix::from_fn(3, 8, |i, j| g[(i, j)])
    }

    fn node_coordinates(&self) -> DMatrix<f64> {
        DMatrix::from_fn(3, 8, |i, j| self.vertices[j][i])
    }
}
