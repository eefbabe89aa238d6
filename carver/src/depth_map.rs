use log::info;
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::turntable::Turntable;
use crate::view::View;
use crate::Point3;

/// Per-view orthographic z-buffer of the carved volume, used for
/// occlusion tests only.
#[derive(Clone, Debug)]
pub struct DepthMap {
    // Rows follow image Y, infinity marks pixels no point hit.
    depths: DMatrix<f64>,
}

impl DepthMap {
    pub fn new(width: u32, height: u32) -> DepthMap {
        DepthMap {
            depths: DMatrix::from_element(
                height as usize,
                width as usize,
                f64::INFINITY,
            ),
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f64> {
        self.depths
            .get((y as usize, x as usize))
            .cloned()
            .filter(|d| d.is_finite())
    }

    // Keeps the nearest depth seen at the pixel.
    pub fn update(&mut self, x: u32, y: u32, depth: f64) {
        let d = &mut self.depths[(y as usize, x as usize)];
        if depth < *d {
            *d = depth;
        }
    }

    pub fn num_hits(&self) -> usize {
        self.depths.iter().filter(|d| d.is_finite()).count()
    }
}

pub fn build_depth_map(points: &[Point3], view: &View) -> DepthMap {
    let turntable = Turntable::for_view(view);
    let mut map = DepthMap::new(view.width(), view.height());
    for point in points {
        if let Some(pixel) = turntable.pixel(point) {
            map.update(pixel.x, pixel.y, pixel.depth);
        }
    }
    map
}

/// Builds one depth map per view from the occupied cell positions. Mesh
/// topology plays no part here.
pub fn build_depth_maps(points: &[Point3], views: &[View]) -> Vec<DepthMap> {
    info!("building depth maps from {} voxels...", points.len());
    views
        .par_iter()
        .map(|view| build_depth_map(points, view))
        .collect()
}
