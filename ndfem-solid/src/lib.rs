//! Constitutive models for `ndfem`.
//!
//! [`LinearElasticModel`] is a damage-free reference model, and [`DruckerPragerDamageModel`]
//! combines Drucker-Prager plasticity with an exponential damage law driven by the nonlocal
//! effective plastic strain.
pub mod damage;
pub mod drucker_prager;
pub mod linear_elastic;
pub mod materials;

pub use damage::DamageProperties;
pub use drucker_prager::{DruckerPragerDamageModel, DruckerPragerParameters, DruckerPragerState};
pub use linear_elastic::{ElasticState, LinearElasticModel};
pub use materials::{LameParameters, YoungPoisson};
