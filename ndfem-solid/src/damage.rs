//! Exponential damage law driven by effective plastic strain.
use ndfem::kelvin::{to_tensor, KelvinVector, SpatialDim};
use serde::{Deserialize, Serialize};

/// Parameters of the damage evolution.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DamageProperties {
    /// Damage-driving variable at which the damage reaches $1 - e^{-1}$ of its maximum.
    pub alpha_d: f64,
    /// Residual stiffness fraction, damage never exceeds $1 - \beta_d$.
    pub beta_d: f64,
    /// Sensitivity of the brittleness to the stress magnitude.
    pub h_d: f64,
    /// Over-nonlocal blending factor.
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

fn default_gamma() -> f64 {
    1.0
}

impl DamageProperties {
    pub fn new(alpha_d: f64, beta_d: f64, h_d: f64) -> Self {
        Self {
            alpha_d,
            beta_d,
            h_d,
            gamma: default_gamma(),
        }
    }

    pub fn with_gamma(self, gamma: f64) -> Self {
        Self { gamma, ..self }
    }

    /// $d(\kappa) = (1 - \beta_d)(1 - e^{-\kappa / \alpha_d})$.
    pub fn damage(&self, kappa: f64) -> f64 {
        (1.0 - self.beta_d) * (1.0 - (-kappa / self.alpha_d).exp())
    }

    /// The brittleness divisor $x_s$ that scales plastic strain increments into increments of
    /// the damage-driving variable.
    ///
    /// With $r_s = |\vec \sigma_{principal}| / f$ for the reference strength $f$,
    /// $x_s = 1$ for $r_s < 1$, $x_s = 1 + h_d (r_s - 1)^2$ for $1 \leq r_s \leq 2$ and
    /// $x_s = 1 - 3 h_d + 4 h_d \sqrt{r_s - 1}$ beyond.
    ///
    /// In two dimensions only the in-plane principal stresses count, so the out-of-plane
    /// stress $\sigma_{zz}$ of a plane strain state does not contribute.
    pub fn brittleness(&self, stress: &KelvinVector, reference_strength: f64) -> f64 {
        let r_s = principal_stress_norm(stress) / reference_strength;
        if r_s < 1.0 {
            1.0
        } else if r_s <= 2.0 {
            1.0 + self.h_d * (r_s - 1.0).powi(2)
        } else {
            1.0 - 3.0 * self.h_d + 4.0 * self.h_d * (r_s - 1.0).sqrt()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.alpha_d.is_finite() && self.alpha_d > 0.0) {
            return Err(format!("alpha_d must be positive, got {}", self.alpha_d));
        }
        if !(0.0..=1.0).contains(&self.beta_d) {
            return Err(format!("beta_d must lie in [0, 1], got {}", self.beta_d));
        }
        if !(self.h_d.is_finite() && self.h_d >= 0.0) {
            return Err(format!("h_d must be non-negative, got {}", self.h_d));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(format!("gamma must lie in [0, 1], got {}", self.gamma));
        }
        Ok(())
    }
}

/// Euclidean norm of the principal stresses within the spatial dimension of `stress`.
///
/// This equals the Frobenius norm of the (in-plane) stress tensor.
fn principal_stress_norm(stress: &KelvinVector) -> f64 {
    let tensor = to_tensor(stress);
    match SpatialDim::from_kelvin_size(stress.len()) {
        Some(SpatialDim::Two) => tensor.fixed_view::<2, 2>(0, 0).norm(),
        _ => tensor.norm(),
    }
}
