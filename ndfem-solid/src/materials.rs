use ndfem::kelvin::{identity2, KelvinMatrix, SpatialDim};
use ndfem::nalgebra::{DMatrix, RealField};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LameParameters<T> {
    pub mu: T,
    pub lambda: T,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoungPoisson<T> {
    pub young: T,
    pub poisson: T,
}

impl<T> From<YoungPoisson<T>> for LameParameters<T>
where
    T: RealField + Copy,
{
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn from(params: YoungPoisson<T>) -> Self {
        let YoungPoisson { young, poisson } = params;
        let mu = 0.5 * young / (1.0 + poisson);
        let lambda = 2.0 * mu * poisson / (1.0 - 2.0 * poisson);
        Self { mu, lambda }
    }
}

impl<T> LameParameters<T>
where
    T: RealField + Copy,
{
    /// The bulk modulus $K = \lambda + \frac{2}{3} \mu$.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn bulk_modulus(&self) -> T {
        self.lambda + 2.0 / 3.0 * self.mu
    }

    /// The shear modulus, which is $\mu$.
    pub fn shear_modulus(&self) -> T {
        self.mu
    }
}

impl LameParameters<f64> {
    /// Checks that the parameters describe a stable isotropic material, i.e. $\mu > 0$ and
    /// $K > 0$.
    pub fn is_admissible(&self) -> bool {
        self.mu.is_finite() && self.lambda.is_finite() && self.mu > 0.0 && self.bulk_modulus() > 0.0
    }
}

/// The isotropic elasticity tensor $\mathbb{C} = \lambda \vec I \otimes \vec I + 2 \mu \mathbb{I}$
/// in Kelvin notation.
pub fn elasticity_tensor(lame: &LameParameters<f64>, dim: SpatialDim) -> KelvinMatrix {
    let i2 = identity2(dim);
    let n = dim.kelvin_size();
    DMatrix::identity(n, n) * (2.0 * lame.mu) + &i2 * i2.transpose() * lame.lambda
}
