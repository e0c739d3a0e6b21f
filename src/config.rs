//! Numerical parameters of the nonlocal formulation.
use crate::error::NonlocalError;
use serde::{Deserialize, Serialize};

/// Where the over-nonlocal blending factor comes from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GammaSource {
    /// Queried from the constitutive model at every quadrature point.
    #[default]
    Material,
    /// The same factor everywhere.
    Constant(f64),
}

/// Reaction to nonlocal weights that do not sum to one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionOfUnityPolicy {
    /// Assertion failure in debug builds, logged error in release builds.
    #[default]
    DebugAssert,
    /// Always return [`NonlocalError::PartitionOfUnityViolation`].
    Abort,
    /// Log a warning and continue.
    Log,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionOfUnityCheck {
    pub policy: PartitionOfUnityPolicy,
    pub tolerance: f64,
}

impl Default for PartitionOfUnityCheck {
    fn default() -> Self {
        Self {
            policy: PartitionOfUnityPolicy::default(),
            tolerance: 1e-12,
        }
    }
}

/// Treatment of damage values returned by the constitutive model.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamagePolicy {
    /// Clamp to [0, 1] and log a warning when clamping changes the value.
    #[default]
    Clamp,
    /// Only clamp negative values to zero.
    FloorAtZero,
    /// Return [`NonlocalError::DamageOutOfRange`].
    Reject,
    /// Use the value as returned by the model.
    Unchecked,
}

/// Tangent operator used for the element Jacobian.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TangentKind {
    /// $\vec B^T \mathbb{C} \vec B$ with the undamaged material tangent.
    #[default]
    Undamaged,
    /// $\vec B^T (1 - d) \mathbb{C} \vec B$, i.e. damage is held fixed in the linearization.
    Damaged,
}

/// Parameters of the nonlocal damage formulation.
///
/// Only `internal_length` is required when deserializing, every other field has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NonlocalParameters {
    /// Radius of the averaging neighborhood.
    pub internal_length: f64,
    /// Number of Gauss points per reference direction.
    #[serde(default = "default_integration_order")]
    pub integration_order: usize,
    #[serde(default)]
    pub overnonlocal_gamma: GammaSource,
    #[serde(default)]
    pub partition_of_unity: PartitionOfUnityCheck,
    #[serde(default)]
    pub damage_policy: DamagePolicy,
    #[serde(default)]
    pub tangent: TangentKind,
}

fn default_integration_order() -> usize {
    2
}

impl NonlocalParameters {
    pub fn new(internal_length: f64) -> Self {
        Self {
            internal_length,
            integration_order: default_integration_order(),
            overnonlocal_gamma: GammaSource::default(),
            partition_of_unity: PartitionOfUnityCheck::default(),
            damage_policy: DamagePolicy::default(),
            tangent: TangentKind::default(),
        }
    }

    pub fn with_integration_order(self, integration_order: usize) -> Self {
        Self {
            integration_order,
            ..self
        }
    }

    pub fn with_gamma(self, overnonlocal_gamma: GammaSource) -> Self {
        Self {
            overnonlocal_gamma,
            ..self
        }
    }

    pub fn with_partition_of_unity(self, partition_of_unity: PartitionOfUnityCheck) -> Self {
        Self {
            partition_of_unity,
            ..self
        }
    }

    pub fn with_damage_policy(self, damage_policy: DamagePolicy) -> Self {
        Self { damage_policy, ..self }
    }

    pub fn with_tangent(self, tangent: TangentKind) -> Self {
        Self { tangent, ..self }
    }

    pub fn validate(&self) -> Result<(), NonlocalError> {
        let invalid = |name, value| Err(NonlocalError::InvalidParameter { name, value });
        if !(self.internal_length.is_finite() && self.internal_length > 0.0) {
            return invalid("internal_length", self.internal_length);
        }
        if self.integration_order == 0 {
            return invalid("integration_order", self.integration_order as f64);
        }
        if let GammaSource::Constant(gamma) = self.overnonlocal_gamma {
            if !(0.0..=1.0).contains(&gamma) {
                return invalid("overnonlocal_gamma", gamma);
            }
        }
        let tol = self.partition_of_unity.tolerance;
        if !(tol.is_finite() && tol > 0.0) {
            return invalid("partition_of_unity.tolerance", tol);
        }
        Ok(())
    }
}
