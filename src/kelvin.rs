//! Kelvin vector notation for symmetric second-order tensors.
//!
//! A symmetric tensor $\vec A$ is stored as the vector
//! $$
//! [A_{xx}, A_{yy}, A_{zz}, \sqrt{2} A_{xy}, \sqrt{2} A_{yz}, \sqrt{2} A_{xz}]
//! $$
//! in 3D, and as its first four components in 2D plane strain. The $\sqrt{2}$ factor makes the
//! Euclidean inner product of two Kelvin vectors coincide with the double contraction of the
//! tensors, so fourth-order tangent operators become plain (symmetric) matrices.
use nalgebra::{DMatrix, DVector, Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::SQRT_2;

/// Kelvin vector of dynamic size (4 in 2D, 6 in 3D).
pub type KelvinVector = DVector<f64>;
/// Kelvin matrix of dynamic size, e.g. a tangent operator.
pub type KelvinMatrix = DMatrix<f64>;

/// The spatial dimension of a problem.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialDim {
    /// Plane strain: displacements in the xy-plane, $\varepsilon_{zz} = 0$.
    Two,
    Three,
}

impl SpatialDim {
    pub fn from_dim(dim: usize) -> Option<Self> {
        match dim {
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    pub fn dim(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Number of Kelvin vector components.
    pub fn kelvin_size(self) -> usize {
        match self {
            Self::Two => 4,
            Self::Three => 6,
        }
    }

    /// Inverse of [`kelvin_size`](Self::kelvin_size).
    pub fn from_kelvin_size(size: usize) -> Option<Self> {
        match size {
            4 => Some(Self::Two),
            6 => Some(Self::Three),
            _ => None,
        }
    }
}

/// Components of a symmetric tensor in the order used for post-processing output.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorComponent {
    XX,
    YY,
    ZZ,
    XY,
    XZ,
    YZ,
}

impl TensorComponent {
    /// Output components for the given dimension: xx, yy, zz, xy and additionally xz, yz in 3D.
    pub fn output_components(dim: SpatialDim) -> &'static [TensorComponent] {
        use TensorComponent::*;
        match dim {
            SpatialDim::Two => &[XX, YY, ZZ, XY],
            SpatialDim::Three => &[XX, YY, ZZ, XY, XZ, YZ],
        }
    }

    /// Index of the component in a Kelvin vector, or `None` if the component does not exist
    /// in the given dimension.
    pub fn kelvin_index(self, dim: SpatialDim) -> Option<usize> {
        use TensorComponent::*;
        match (self, dim) {
            (XX, _) => Some(0),
            (YY, _) => Some(1),
            (ZZ, _) => Some(2),
            (XY, _) => Some(3),
            (YZ, SpatialDim::Three) => Some(4),
            (XZ, SpatialDim::Three) => Some(5),
            _ => None,
        }
    }

    pub fn is_shear(self) -> bool {
        matches!(self, Self::XY | Self::XZ | Self::YZ)
    }
}

/// Kelvin representation of the second-order identity tensor.
pub fn identity2(dim: SpatialDim) -> KelvinVector {
    DVector::from_fn(dim.kelvin_size(), |i, _| if i < 3 { 1.0 } else { 0.0 })
}

/// Projection onto the deviatoric subspace, $\mathbb{P} = \mathbb{I} - \frac{1}{3} \vec I \otimes \vec I$.
pub fn deviatoric_projection(dim: SpatialDim) -> KelvinMatrix {
    let i2 = identity2(dim);
    DMatrix::identity(dim.kelvin_size(), dim.kelvin_size()) - &i2 * i2.transpose() / 3.0
}

pub fn trace(v: &KelvinVector) -> f64 {
    v[0] + v[1] + v[2]
}

pub fn deviatoric(v: &KelvinVector) -> KelvinVector {
    let mean = trace(v) / 3.0;
    let mut s = v.clone();
    for i in 0..3 {
        s[i] -= mean;
    }
    s
}

/// The second invariant $J_2 = \frac{1}{2} \vec s : \vec s$ of the deviatoric part.
pub fn j2(v: &KelvinVector) -> f64 {
    0.5 * deviatoric(v).norm_squared()
}

/// Converts a Kelvin vector to a full 3x3 tensor. 2D vectors have zero out-of-plane shear.
pub fn to_tensor(v: &KelvinVector) -> Matrix3<f64> {
    let xy = v[3] / SQRT_2;
    let (yz, xz) = if v.len() == 6 {
        (v[4] / SQRT_2, v[5] / SQRT_2)
    } else {
        (0.0, 0.0)
    };
    #[rustfmt::skip]
    let tensor = Matrix3::new(
        v[0], xy,   xz,
        xy,   v[1], yz,
        xz,   yz,   v[2]);
    tensor
}

/// Converts the symmetric part of a 3x3 tensor to a Kelvin vector.
pub fn from_tensor(tensor: &Matrix3<f64>, dim: SpatialDim) -> KelvinVector {
    let a = tensor.symmetric_part();
    let mut v = DVector::zeros(dim.kelvin_size());
    v[0] = a[(0, 0)];
    v[1] = a[(1, 1)];
    v[2] = a[(2, 2)];
    v[3] = SQRT_2 * a[(0, 1)];
    if dim == SpatialDim::Three {
        v[4] = SQRT_2 * a[(1, 2)];
        v[5] = SQRT_2 * a[(0, 2)];
    }
    v
}

/// Principal values of the tensor, sorted in descending order.
pub fn principal_values(v: &KelvinVector) -> Vector3<f64> {
    let eigen = SymmetricEigen::new(to_tensor(v));
    let mut values = eigen.eigenvalues;
    values
        .as_mut_slice()
        .sort_unstable_by(|a, b| b.total_cmp(a));
    values
}

/// Returns the tensor component, converting Kelvin shear components back to tensor form.
///
/// Components that do not exist in the vector's dimension are zero.
pub fn tensor_component(v: &KelvinVector, component: TensorComponent) -> f64 {
    let dim = SpatialDim::from_kelvin_size(v.len()).unwrap_or(SpatialDim::Two);
    match component.kelvin_index(dim) {
        Some(idx) if component.is_shear() => v[idx] / SQRT_2,
        Some(idx) => v[idx],
        None => 0.0,
    }
}

/// Appends the output components of `v` (see [`TensorComponent::output_components`]) to `out`.
pub fn extend_with_output_components(out: &mut Vec<f64>, v: &KelvinVector, dim: SpatialDim) {
    out.extend(
        TensorComponent::output_components(dim)
            .iter()
            .map(|&c| tensor_component(v, c)),
    );
}

/// Builds the strain-displacement operator $\vec B$ mapping node-interleaved displacements
/// `[u_0x, u_0y, (u_0z,) u_1x, ...]` to the Kelvin strain vector.
///
/// `dndx` holds physical basis gradients, one column per node.
#[allow(non_snake_case)]
pub fn strain_displacement_matrix(dndx: &DMatrix<f64>, dim: SpatialDim) -> DMatrix<f64> {
    let d = dim.dim();
    let n = dndx.ncols();
    assert_eq!(dndx.nrows(), d, "Gradient matrix must have one row per spatial dimension");

    let s = 1.0 / SQRT_2;
    let mut B = DMatrix::zeros(dim.kelvin_size(), d * n);
    for node in 0..n {
        let g = dndx.column(node);
        let c = d * node;
        B[(0, c)] = g[0];
        B[(1, c + 1)] = g[1];
        B[(3, c)] = s * g[1];
        B[(3, c + 1)] = s * g[0];
        if dim == SpatialDim::Three {
            B[(2, c + 2)] = g[2];
            // yz
            B[(4, c + 1)] = s * g[2];
            B[(4, c + 2)] = s * g[1];
            // xz
            B[(5, c)] = s * g[2];
            B[(5, c + 2)] = s * g[0];
        }
    }
    B
}

/// Inverse of [`extend_with_output_components`]: builds a Kelvin vector from tensor
/// components given in output order.
pub fn from_output_components(values: &[f64], dim: SpatialDim) -> KelvinVector {
    let mut v = DVector::zeros(dim.kelvin_size());
    for (&component, &value) in TensorComponent::output_components(dim).iter().zip(values) {
        if let Some(idx) = component.kelvin_index(dim) {
            v[idx] = if component.is_shear() { SQRT_2 * value } else { value };
        }
    }
    v
}
