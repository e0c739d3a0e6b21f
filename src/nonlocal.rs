//! Nonlocal averaging of the damage-driving variable over quadrature point neighborhoods.
//!
//! The neighborhood of a quadrature point $k$ consists of every quadrature point $l$ (in any
//! element, $k$ itself included) with $|x_k - x_l|^2 < L^2$, where $L$ is the internal length.
//! The averaged value is
//! $$
//! \bar{\kappa}_k = \sum_l \alpha_{kl} w_l \kappa_l, \qquad
//! \alpha_{kl} = \frac{\alpha_0(|x_k - x_l|^2)}{\sum_m \alpha_0(|x_k - x_m|^2) w_m},
//! $$
//! with integration weights $w_l$ and the quartic kernel $\alpha_0$ from [`alpha_0`].
mod graph;
mod kernel;

pub use graph::*;
pub use kernel::*;
