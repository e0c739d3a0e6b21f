//! Radius queries over quadrature point positions.
use nalgebra::Point3;
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// A quadrature point identified by its element and local index.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointLocation {
    pub element: usize,
    pub point: usize,
    pub position: Point3<f64>,
}

/// Finds quadrature points near a given position.
///
/// Implementations must report at least every point whose distance to `center` is strictly
/// less than `radius`. Reporting additional points is allowed, callers filter by distance.
pub trait SpatialQuery {
    fn query_within_radius(&self, center: &Point3<f64>, radius: f64, result: &mut Vec<PointLocation>);
}

#[derive(Debug, Copy, Clone, PartialEq)]
struct RTreePoint(Point3<f64>);

impl rstar::Point for RTreePoint {
    type Scalar = f64;
    const DIMENSIONS: usize = 3;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        Self(Point3::new(generator(0), generator(1), generator(2)))
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        self.0[index]
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.0[index]
    }
}

/// R-tree over quadrature point positions.
#[derive(Debug, Clone)]
pub struct RTreePointIndex {
    tree: RTree<GeomWithData<RTreePoint, (usize, usize)>>,
}

impl RTreePointIndex {
    pub fn from_locations(locations: impl IntoIterator<Item = PointLocation>) -> Self {
        let geometries = locations
            .into_iter()
            .map(|loc| GeomWithData::new(RTreePoint(loc.position), (loc.element, loc.point)))
            .collect();
        Self {
            tree: RTree::bulk_load(geometries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl SpatialQuery for RTreePointIndex {
    fn query_within_radius(&self, center: &Point3<f64>, radius: f64, result: &mut Vec<PointLocation>) {
        let candidates = self
            .tree
            .locate_within_distance(RTreePoint(*center), radius * radius);
        result.extend(candidates.map(|geom| {
            let (element, point) = geom.data;
            PointLocation {
                element,
                point,
                position: geom.geom().0,
            }
        }));
    }
}

/// Linear scan over all points. Useful as a reference for small problems.
#[derive(Debug, Clone, Default)]
pub struct BruteForcePointIndex {
    locations: Vec<PointLocation>,
}

impl BruteForcePointIndex {
    pub fn from_locations(locations: impl IntoIterator<Item = PointLocation>) -> Self {
        Self {
            locations: locations.into_iter().collect(),
        }
    }
}

impl SpatialQuery for BruteForcePointIndex {
    fn query_within_radius(&self, center: &Point3<f64>, radius: f64, result: &mut Vec<PointLocation>) {
        let r2 = radius * radius;
        result.extend(
            self.locations
                .iter()
                .filter(|loc| (loc.position - center).norm_squared() <= r2)
                .copied(),
        );
    }
}
