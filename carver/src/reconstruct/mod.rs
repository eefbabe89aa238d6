pub mod surface_nets;
pub mod voxel_faces;

use log::{info, warn};

use crate::mesh::Mesh;
use crate::point_cloud::OrientedPointCloud;
use crate::{Point3, Vector3};
use base::defs::{Error, ErrorKind::*, Result};

pub use surface_nets::SurfaceNets;
pub use voxel_faces::VoxelFaces;

// Keeps lattices within memory for any requested depth.
const MAX_DEPTH: usize = 10;

pub struct Reconstruction {
    pub mesh: Mesh,
    // Per-vertex sampling density, if the method estimates one.
    pub densities: Option<Vec<f64>>,
}

/// Turns an oriented point set into a closed triangle mesh. Running at
/// `depth` means the lattice has at most `2^depth` cells along the
/// longest side of the point set bounds.
pub trait Reconstruct {
    fn name(&self) -> &str;

    fn reconstruct(
        &self,
        cloud: &OrientedPointCloud,
        depth: usize,
    ) -> Result<Reconstruction>;
}

/// Runs `primary` and switches to `fallback` if it fails. Fails only when
/// both methods do.
pub fn reconstruct_with_fallback(
    primary: &dyn Reconstruct,
    fallback: &dyn Reconstruct,
    cloud: &OrientedPointCloud,
    depth: usize,
) -> Result<Reconstruction> {
    info!(
        "reconstructing surface of {} points with {} at depth {}...",
        cloud.len(),
        primary.name(),
        depth
    );

    let reconstruction = match primary.reconstruct(cloud, depth) {
        Ok(reconstruction) => reconstruction,
        Err(err) => {
            warn!(
                "{} failed ({}), falling back to {}",
                primary.name(),
                err,
                fallback.name()
            );
            fallback.reconstruct(cloud, depth).map_err(|e| {
                let desc = format!(
                    "neither {} nor {} could reconstruct {} points",
                    primary.name(),
                    fallback.name(),
                    cloud.len()
                );
                Error::with_source(ReconstructionFailed, desc, e)
            })?
        }
    };

    info!(
        "  got {} vertices and {} faces",
        reconstruction.mesh.vertices.len(),
        reconstruction.mesh.faces.len()
    );
    Ok(reconstruction)
}

/// Regular grid of nodes covering the point set bounds plus padding.
#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    pub origin: Point3,
    pub step: f64,
    pub dims: [usize; 3],
}

pub fn bounds(points: &[Point3]) -> Option<(Point3, Point3)> {
    let first = points.first()?;
    let (mut min, mut max) = (*first, *first);
    for p in points.iter().skip(1) {
        min = min.inf(p);
        max = max.sup(p);
    }
    Some((min, max))
}

impl Lattice {
    /// The step is `extent / 2^depth` unless that is finer than `min_step`.
    pub fn fit(
        points: &[Point3],
        depth: usize,
        min_step: f64,
        pad: f64,
    ) -> Result<Lattice> {
        let (min, max) = bounds(points).ok_or_else(|| {
            Error::new(GeometryError, "no points to fit lattice".to_string())
        })?;

        let extent = (max - min).max();
        let cells = 2f64.powi(depth.min(MAX_DEPTH) as i32);
        let step = (extent / cells).max(min_step);
        if !step.is_finite() || step <= 0.0 || !pad.is_finite() {
            let desc = format!(
                "cannot fit lattice (extent {}, step {}, pad {})",
                extent, step, pad
            );
            return Err(Error::new(GeometryError, desc));
        }

        let origin = min - Vector3::repeat(pad);
        let size = max - min + Vector3::repeat(2.0 * pad);
        let dim = |a: usize| (size[a] / step).ceil() as usize + 1;
        Ok(Lattice {
            origin,
            step,
            dims: [dim(0), dim(1), dim(2)],
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn index(&self, node: [usize; 3]) -> usize {
        node[0] + self.dims[0] * (node[1] + self.dims[1] * node[2])
    }

    pub fn position(&self, node: [usize; 3]) -> Point3 {
        self.origin
            + Vector3::new(node[0] as f64, node[1] as f64, node[2] as f64)
                * self.step
    }

    pub fn nearest_node(&self, point: &Point3) -> [usize; 3] {
        let rel = (point - self.origin) / self.step;
        let coord = |a: usize| {
            (rel[a].round().max(0.0) as usize).min(self.dims[a] - 1)
        };
        [coord(0), coord(1), coord(2)]
    }
}
