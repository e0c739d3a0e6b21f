use crate::config::{PartitionOfUnityCheck, PartitionOfUnityPolicy};
use crate::error::NonlocalError;
use crate::nonlocal::NeighborEdge;
use log::{error, warn};

/// The quartic bell kernel $\alpha_0(d^2) = (1 - d^2 / L^2)^2$, zero outside the support.
///
/// Equal to one at zero distance, monotonically decreasing and $C^1$ at the boundary $d^2 = L^2$.
pub fn alpha_0(distance2: f64, internal_length2: f64) -> f64 {
    if distance2 > internal_length2 {
        0.0
    } else {
        let s = 1.0 - distance2 / internal_length2;
        s * s
    }
}

/// Computes the normalized coefficients `alpha` and the pre-multiplied weights
/// `alpha * integration_weight` of all edges of one source point.
///
/// Returns the normalization denominator $\sum_m \alpha_0(d^2_m) w_m$. If it is not positive,
/// the edges are left untouched.
pub fn normalize_edges(
    edges: &mut [NeighborEdge],
    mut integration_weight: impl FnMut(&NeighborEdge) -> f64,
    internal_length2: f64,
) -> f64 {
    let denominator: f64 = edges
        .iter()
        .map(|edge| alpha_0(edge.distance2, internal_length2) * integration_weight(edge))
        .sum();
    if denominator > 0.0 {
        for edge in edges.iter_mut() {
            edge.alpha = alpha_0(edge.distance2, internal_length2) / denominator;
            edge.weight = edge.alpha * integration_weight(edge);
        }
    }
    denominator
}

/// $\sum_l \alpha_{kl} w_l \, v_l$ for local values $v_l$.
pub fn nonlocal_average(edges: &[NeighborEdge], mut local_value: impl FnMut(&NeighborEdge) -> f64) -> f64 {
    edges.iter().map(|edge| edge.weight * local_value(edge)).sum()
}

/// $\sum_l \alpha_{kl} w_l$, which equals one for correctly normalized edges.
pub fn weight_sum(edges: &[NeighborEdge]) -> f64 {
    edges.iter().map(|edge| edge.weight).sum()
}

/// Blends local and nonlocal values, $(1 - \gamma) v_{loc} + \gamma v_{nonloc}$.
pub fn blend_overnonlocal(local: f64, nonlocal: f64, gamma: f64) -> f64 {
    (1.0 - gamma) * local + gamma * nonlocal
}

/// Applies the partition-of-unity policy to the weight sum of a quadrature point.
pub fn check_partition_of_unity(
    sum: f64,
    check: &PartitionOfUnityCheck,
    element: usize,
    point: usize,
) -> Result<(), NonlocalError> {
    if (sum - 1.0).abs() <= check.tolerance {
        return Ok(());
    }
    let violation = NonlocalError::PartitionOfUnityViolation { element, point, sum };
    match check.policy {
        PartitionOfUnityPolicy::Abort => Err(violation),
        PartitionOfUnityPolicy::Log => {
            warn!("{}", violation);
            Ok(())
        }
        PartitionOfUnityPolicy::DebugAssert => {
            debug_assert!(false, "{}", violation);
            error!("{}", violation);
            Ok(())
        }
    }
}
