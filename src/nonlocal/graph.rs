use crate::error::NonlocalError;
use crate::nonlocal::normalize_edges;
use crate::spatial::{PointLocation, SpatialQuery};
use log::debug;
use nalgebra::Point3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;

/// A directed edge from a source quadrature point to one of its neighbors.
///
/// The neighbor is referenced by its element index in the element arena and its local
/// quadrature point index.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborEdge {
    pub element: usize,
    pub point: usize,
    /// Squared distance between the two points.
    pub distance2: f64,
    /// Normalized kernel coefficient $\alpha_{kl}$.
    pub alpha: f64,
    /// $\alpha_{kl} w_l$, the coefficient of the neighbor's local value in the average.
    pub weight: f64,
}

/// Neighbor edges of every quadrature point of one element.
pub type NeighborTable = Vec<Vec<NeighborEdge>>;

/// Builds the neighbor tables of all elements.
///
/// `positions[e][k]` and `integration_weights[e][k]` are the position and integration weight
/// of quadrature point `k` of element `e`. The query only proposes candidates, the inclusion
/// test `d2 < internal_length^2` is evaluated here on the positions given. Edges are sorted by
/// element index, then by local point index.
pub fn build_neighbor_tables<Q>(
    positions: &[Vec<Point3<f64>>],
    integration_weights: &[Vec<f64>],
    internal_length: f64,
    query: &Q,
) -> Result<Vec<NeighborTable>, NonlocalError>
where
    Q: SpatialQuery + Sync,
{
    if positions.len() != integration_weights.len() {
        return Err(NonlocalError::DimensionMismatch {
            what: "integration weights per element",
            expected: positions.len(),
            actual: integration_weights.len(),
        });
    }
    for (element_positions, element_weights) in positions.iter().zip(integration_weights) {
        if element_positions.len() != element_weights.len() {
            return Err(NonlocalError::DimensionMismatch {
                what: "integration weights per quadrature point",
                expected: element_positions.len(),
                actual: element_weights.len(),
            });
        }
    }
    let internal_length2 = internal_length * internal_length;

    positions
        .par_iter()
        .enumerate()
        .map_init(Vec::new, |candidates, (element, element_positions)| {
            let mut table = Vec::with_capacity(element_positions.len());
            for (point, x_k) in element_positions.iter().enumerate() {
                candidates.clear();
                query.query_within_radius(x_k, internal_length, candidates);

                let mut edges = Vec::with_capacity(candidates.len());
                for &PointLocation { element: e, point: l, .. } in candidates.iter() {
                    let x_l = lookup(positions, e, l)?;
                    let distance2 = (x_l - x_k).norm_squared();
                    if distance2 < internal_length2 {
                        edges.push(NeighborEdge {
                            element: e,
                            point: l,
                            distance2,
                            alpha: 0.0,
                            weight: 0.0,
                        });
                    }
                }
                edges.sort_unstable_by_key(|edge| (edge.element, edge.point));
                edges.dedup_by_key(|edge| (edge.element, edge.point));

                let degenerate = NonlocalError::DegenerateNeighborhood {
                    element,
                    point,
                    internal_length,
                };
                if edges.is_empty() {
                    return Err(degenerate);
                }
                let denominator = normalize_edges(
                    &mut edges,
                    |edge| integration_weights[edge.element][edge.point],
                    internal_length2,
                );
                if !(denominator > 0.0 && denominator.is_finite()) {
                    return Err(degenerate);
                }
                table.push(edges);
            }
            debug!(
                "Element {}: {} nonlocal edges",
                element,
                table.iter().map(Vec::len).sum::<usize>()
            );
            Ok(table)
        })
        .collect()
}

fn lookup<T>(values: &[Vec<T>], element: usize, point: usize) -> Result<&T, NonlocalError> {
    let element_values = values.get(element).ok_or(NonlocalError::DimensionMismatch {
        what: "elements referenced by spatial query",
        expected: values.len(),
        actual: element + 1,
    })?;
    element_values.get(point).ok_or(NonlocalError::DimensionMismatch {
        what: "quadrature points referenced by spatial query",
        expected: element_values.len(),
        actual: point + 1,
    })
}

/// Summary of a set of neighbor tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NeighborStatistics {
    pub points: usize,
    pub edges: usize,
    pub min_neighbors: usize,
    pub max_neighbors: usize,
}

impl NeighborStatistics {
    pub fn from_tables(tables: &[NeighborTable]) -> Self {
        let (points, edges, min_neighbors, max_neighbors) = tables.iter().flatten().map(Vec::len).fold(
            (0usize, 0usize, usize::MAX, 0usize),
            |(points, edges, min, max), count| (points + 1, edges + count, min.min(count), max.max(count)),
        );
        Self {
            points,
            edges,
            min_neighbors: if points == 0 { 0 } else { min_neighbors },
            max_neighbors,
        }
    }

    pub fn mean_neighbors(&self) -> f64 {
        if self.points == 0 {
            0.0
        } else {
            self.edges as f64 / self.points as f64
        }
    }
}

impl Display for NeighborStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} points, {} edges, neighbors per point min {} / mean {:.1} / max {}",
            self.points,
            self.edges,
            self.min_neighbors,
            self.mean_neighbors(),
            self.max_neighbors
        )
    }
}
