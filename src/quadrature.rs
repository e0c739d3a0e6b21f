//! Tensor-product Gauss-Legendre quadrature on reference elements.
use crate::error::NonlocalError;
use fenris_quadrature::{tensor, univariate};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Reference domain of an element, always $[-1, 1]^d$.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceShape {
    Quadrilateral,
    Hexahedron,
}

impl ReferenceShape {
    pub fn reference_dim(self) -> usize {
        match self {
            Self::Quadrilateral => 2,
            Self::Hexahedron => 3,
        }
    }
}

/// Quadrature weights and points. Points of two-dimensional rules have zero z-coordinate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuadratureRule {
    pub weights: Vec<f64>,
    pub points: Vec<Point3<f64>>,
}

impl QuadratureRule {
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Gauss-Legendre rule on [-1, 1] with `num_points` points, returned as `(weights, points)`.
///
/// Exact for polynomials of degree up to `2 num_points - 1`.
pub fn gauss_1d(num_points: usize) -> Result<(Vec<f64>, Vec<f64>), NonlocalError> {
    check_num_points(num_points)?;
    let (weights, points) = univariate::gauss(num_points);
    Ok((weights, points.into_iter().map(|[x]| x).collect()))
}

/// Tensor-product Gauss rule with `points_per_dim` points in each reference direction.
///
/// Points are ordered with the last reference coordinate varying fastest.
pub fn tensor_gauss(shape: ReferenceShape, points_per_dim: usize) -> Result<QuadratureRule, NonlocalError> {
    check_num_points(points_per_dim)?;
    let rule = match shape {
        ReferenceShape::Quadrilateral => {
            let (weights, points) = tensor::quadrilateral_gauss(points_per_dim);
            QuadratureRule {
                weights,
                points: points.into_iter().map(|[x, y]| Point3::new(x, y, 0.0)).collect(),
            }
        }
        ReferenceShape::Hexahedron => {
            let (weights, points) = tensor::hexahedron_gauss(points_per_dim);
            QuadratureRule {
                weights,
                points: points.into_iter().map(Point3::from).collect(),
            }
        }
    };
    Ok(rule)
}

fn check_num_points(num_points: usize) -> Result<(), NonlocalError> {
    if num_points == 0 {
        return Err(NonlocalError::InvalidParameter {
            name: "integration_order",
            value: 0.0,
        });
    }
    Ok(())
}
