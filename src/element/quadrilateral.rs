use crate::element::{phi_linear_1d, phi_linear_1d_grad, FiniteElement};
use crate::kelvin::SpatialDim;
use crate::quadrature::ReferenceShape;
use nalgebra::{DMatrix, DVector, Matrix1x4, Matrix2x4, Point2, Point3, Vector2};

/// Bilinear quadrilateral with counter-clockwise vertex ordering.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Quad4Element {
    vertices: [Point2<f64>; 4],
}

impl Quad4Element {
    pub fn from_vertices(vertices: [Point2<f64>; 4]) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Point2<f64>; 4] {
        &self.vertices
    }

    pub fn reference() -> Self {
        Self::from_vertices([
            Point2::new(-1.0, -1.0),
            Point2::new(1.0, -1.0),
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, 1.0),
        ])
    }

    #[rustfmt::skip]
    fn basis_fixed(&self, xi: &Point3<f64>) -> Matrix1x4<f64> {
        // N_{alpha, beta}([alpha, beta]) = 1 with alpha, beta = 1 or -1
        let phi = |alpha, beta| phi_linear_1d(alpha, xi[0]) * phi_linear_1d(beta, xi[1]);
        Matrix1x4::new(
            phi(-1.0, -1.0),
            phi( 1.0, -1.0),
            phi( 1.0,  1.0),
            phi(-1.0,  1.0),
        )
    }

    #[rustfmt::skip]
    fn gradients_fixed(&self, xi: &Point3<f64>) -> Matrix2x4<f64> {
        let grad = |alpha, beta| Vector2::new(
            phi_linear_1d_grad(alpha) * phi_linear_1d(beta, xi[1]),
            phi_linear_1d(alpha, xi[0]) * phi_linear_1d_grad(beta),
        );
        Matrix2x4::from_columns(&[
            grad(-1.0, -1.0),
            grad( 1.0, -1.0),
            grad( 1.0,  1.0),
            grad(-1.0,  1.0),
        ])
    }
}

impl FiniteElement for Quad4Element {
    fn spatial_dim(&self) -> SpatialDim {
        SpatialDim::Two
    }

    fn reference_shape(&self) -> ReferenceShape {
        ReferenceShape::Quadrilateral
    }

    fn num_nodes(&self) -> usize {
        4
    }

    fn evaluate_basis(&self, xi: &Point3<f64>) -> DVector<f64> {
        DVector::from_row_slice(self.basis_fixed(xi).as_slice())
    }

    fn gradients(&self, xi: &Point3<f64>) -> DMatrix<f64> {
        let g = self.gradients_fixed(xi);
        DMatrix::from_fn(2, 4, |i, j| g[(i, j)])
    }

    fn node_coordinates(&self) -> DMatrix<f64> {
        DMatrix::from_fn(2, 4, |i, j| self.vertices[j][i])
    }
}
