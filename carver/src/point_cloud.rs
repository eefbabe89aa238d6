use kiddo::distance::squared_euclidean;
use kiddo::KdTree;
use log::info;
use nalgebra::SymmetricEigen;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::{Matrix3, Point3, Vector3};
use base::defs::{Error, ErrorKind::*, Result};

pub const NORMAL_RADIUS: f64 = 0.05;
pub const MAX_NORMAL_NEIGHBOURS: usize = 30;
const MIN_NORMAL_NEIGHBOURS: usize = 3;
const MAX_SPACING_SAMPLES: usize = 1000;

pub type PointTree = KdTree<f64, usize, 3>;

/// Point set with a unit outward normal per point.
#[derive(Clone, Debug, Default)]
pub struct OrientedPointCloud {
    pub points: Vec<Point3>,
    pub normals: Vec<Vector3>,
}

impl OrientedPointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn kdtree_error<E: std::fmt::Debug>(err: E) -> Error {
    Error::new(GeometryError, format!("kd-tree failure: {:?}", err))
}

pub fn build_kdtree(points: &[Point3]) -> Result<PointTree> {
    let mut kdtree = KdTree::new();
    for (i, p) in points.iter().enumerate() {
        kdtree.add(p.coords.as_ref(), i).map_err(kdtree_error)?;
    }
    Ok(kdtree)
}

/// Returns up to `num` point indices within `radius`, nearest first.
pub fn nearest_within(
    kdtree: &PointTree,
    point: &Point3,
    num: usize,
    radius: f64,
) -> Result<Vec<usize>> {
    let squared_radius = radius * radius;
    Ok(kdtree
        .nearest(point.coords.as_ref(), num, &squared_euclidean)
        .map_err(kdtree_error)?
        .into_iter()
        .filter(|(dist, _)| *dist <= squared_radius)
        .map(|(_, &i)| i)
        .collect())
}

pub fn count_within(
    kdtree: &PointTree,
    point: &Point3,
    radius: f64,
) -> Result<usize> {
    Ok(kdtree
        .within_unsorted(
            point.coords.as_ref(),
            radius * radius,
            &squared_euclidean,
        )
        .map_err(kdtree_error)?
        .len())
}

pub fn centroid(points: &[Point3]) -> Point3 {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum = points.iter().map(|p| p.coords).sum::<Vector3>();
    Point3::from(sum / points.len() as f64)
}

// Partial Fisher-Yates shuffle with a fixed seed, so results repeat.
pub fn select_random_indices(len: usize, num: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    if num >= len {
        return indices;
    }

    let mut rng = StdRng::seed_from_u64(0);
    for i in 0..num {
        let j = rng.gen_range(i..len);
        indices.swap(i, j);
    }

    indices.truncate(num);
    indices
}

/// Mean nearest-neighbour distance over a sample of points.
pub fn estimate_spacing(points: &[Point3], kdtree: &PointTree) -> Result<f64> {
    if points.len() < 2 {
        let desc =
            format!("cannot estimate spacing of {} points", points.len());
        return Err(Error::new(GeometryError, desc));
    }

    let samples = select_random_indices(points.len(), MAX_SPACING_SAMPLES);
    let mut sum = 0.0;
    for &i in samples.iter() {
        let nearest = kdtree
            .nearest(points[i].coords.as_ref(), 2, &squared_euclidean)
            .map_err(kdtree_error)?;
        sum += nearest.get(1).map_or(0.0, |(dist, _)| dist.sqrt());
    }

    Ok(sum / samples.len() as f64)
}

fn pca_normal(points: &[Point3], neighbours: &[usize]) -> Vector3 {
    let mean = neighbours.iter().map(|&i| points[i].coords).sum::<Vector3>()
        / neighbours.len() as f64;

    let mut covariance = Matrix3::zeros();
    for &i in neighbours {
        let d = points[i].coords - mean;
        covariance += d * d.transpose();
    }

    let eigen = SymmetricEigen::new(covariance);
    let smallest = eigen.eigenvalues.imin();
    eigen.eigenvectors.column(smallest).into_owned()
}

fn centroid_direction(point: &Point3, centroid: &Point3) -> Vector3 {
    (point - centroid)
        .try_normalize(0.0)
        .unwrap_or_else(Vector3::z)
}

/// Estimates a normal per point from the principal axes of its
/// neighbourhood and turns it to face away from the point set centroid.
pub fn estimate_normals(points: Vec<Point3>) -> Result<OrientedPointCloud> {
    info!("estimating normals of {} points...", points.len());
    let kdtree = build_kdtree(&points)?;
    let centroid = centroid(&points);

    let normals = points
        .par_iter()
        .map(|point| -> Result<Vector3> {
            let neighbours = nearest_within(
                &kdtree,
                point,
                MAX_NORMAL_NEIGHBOURS,
                NORMAL_RADIUS,
            )?;

            let outward = centroid_direction(point, &centroid);
            if neighbours.len() < MIN_NORMAL_NEIGHBOURS {
                return Ok(outward);
            }

            let normal = pca_normal(&points, &neighbours)
                .try_normalize(0.0)
                .unwrap_or(outward);
            if normal.dot(&(point - centroid)) < 0.0 {
                Ok(-normal)
            } else {
                Ok(normal)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(OrientedPointCloud { points, normals })
}

#[cfg(test)]
mod test {
    use super::*;

    use base::assert_eq_f32;

    fn plane(z: f64, step: f64) -> Vec<Point3> {
        let mut points = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                points.push(Point3::new(i as f64 * step, j as f64 * step, z));
            }
        }
        points
    }

    #[test]
    fn test_select_random_indices() {
        assert_eq!(select_random_indices(3, 5), vec![0, 1, 2]);

        let indices = select_random_indices(100, 10);
        assert_eq!(indices.len(), 10);
        let mut unique = indices.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 10);
        assert!(indices.iter().all(|&i| i < 100));
        assert_eq!(indices, select_random_indices(100, 10));
    }

    #[test]
    fn test_estimate_spacing() {
        let points = plane(0.0, 0.1);
        let kdtree = build_kdtree(&points).unwrap();
        assert_eq_f32!(estimate_spacing(&points, &kdtree).unwrap(), 0.1);

        let points = vec![Point3::origin()];
        let kdtree = build_kdtree(&points).unwrap();
        let err = estimate_spacing(&points, &kdtree).err().unwrap();
        assert_eq!(err.kind, GeometryError);
    }

    #[test]
    fn test_neighbour_queries() {
        let points = plane(0.0, 0.1);
        let kdtree = build_kdtree(&points).unwrap();
        let corner = Point3::origin();
        assert_eq!(
            nearest_within(&kdtree, &corner, 30, 0.05).unwrap(),
            vec![0]
        );
        assert_eq!(nearest_within(&kdtree, &corner, 2, 1.0).unwrap().len(), 2);
        assert_eq!(count_within(&kdtree, &corner, 0.15).unwrap(), 4);
    }

    #[test]
    fn test_estimate_normals_of_planes() {
        let mut points = plane(0.5, 0.01);
        points.extend(plane(-0.5, 0.01));
        let cloud = estimate_normals(points).unwrap();
        assert_eq!(cloud.len(), 200);

        for (point, normal) in cloud.points.iter().zip(cloud.normals.iter()) {
            assert_eq_f32!(normal.norm(), 1.0);
            assert_eq_f32!(normal.z, point.z.signum(), 1e-6);
        }
    }

    #[test]
    fn test_estimate_normals_of_sparse_points() {
        let points =
            vec![Point3::new(1.0, 0.0, 0.0), Point3::new(-1.0, 0.0, 0.0)];
        let cloud = estimate_normals(points).unwrap();
        assert_eq!(cloud.normals[0], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(cloud.normals[1], Vector3::new(-1.0, 0.0, 0.0));
    }
}
