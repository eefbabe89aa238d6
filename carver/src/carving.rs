use std::str::FromStr;

use log::info;
use rayon::prelude::*;
use structopt::StructOpt;

use crate::turntable::Turntable;
use crate::view::View;
use crate::Point3;
use base::defs::{Error, ErrorKind::*, Result};

pub const DEFAULT_GRID_RESOLUTION: usize = 160;

/// What to do with cells projecting outside a view's image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutOfView {
    Carve,
    Keep,
}

impl FromStr for OutOfView {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "carve" => Ok(OutOfView::Carve),
            "keep" => Ok(OutOfView::Keep),
            _ => Err(Error::new(
                MalformedData,
                "unknown out-of-view policy (can be 'carve' or 'keep')"
                    .to_string(),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, StructOpt)]
pub struct CarveParams {
    #[structopt(
        help = "Number of voxel grid cells along each axis",
        long,
        short = "n",
        default_value = "160"
    )]
    pub grid_resolution: usize,

    #[structopt(
        help = "Whether cells outside a view's image are carved or kept",
        long,
        default_value = "carve"
    )]
    pub out_of_view: OutOfView,
}

impl Default for CarveParams {
    fn default() -> Self {
        CarveParams {
            grid_resolution: DEFAULT_GRID_RESOLUTION,
            out_of_view: OutOfView::Carve,
        }
    }
}

/// Dense cubic occupancy volume spanning `[-1, 1]` along each axis.
///
/// Cells are stored flat in `[i, j, k]` order so that an index doubles as
/// a cell identity.
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    resolution: usize,
    occupied: Vec<bool>,
}

impl VoxelGrid {
    pub fn full(resolution: usize) -> VoxelGrid {
        VoxelGrid {
            resolution,
            occupied: vec![true; resolution * resolution * resolution],
        }
    }

    pub fn empty(resolution: usize) -> VoxelGrid {
        VoxelGrid {
            resolution,
            occupied: vec![false; resolution * resolution * resolution],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn num_cells(&self) -> usize {
        self.occupied.len()
    }

    pub fn voxel_size(&self) -> f64 {
        2.0 / self.resolution as f64
    }

    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.resolution + j) * self.resolution + k
    }

    pub fn cell(&self, index: usize) -> [usize; 3] {
        let n = self.resolution;
        [index / (n * n), index / n % n, index % n]
    }

    pub fn is_occupied(&self, i: usize, j: usize, k: usize) -> bool {
        self.occupied[self.index(i, j, k)]
    }

    pub fn set_occupied(&mut self, i: usize, j: usize, k: usize, value: bool) {
        let index = self.index(i, j, k);
        self.occupied[index] = value;
    }

    pub fn count_occupied(&self) -> usize {
        self.occupied.iter().filter(|&&o| o).count()
    }

    pub fn coordinate(&self, i: usize) -> f64 {
        if self.resolution < 2 {
            0.0
        } else {
            -1.0 + 2.0 * i as f64 / (self.resolution - 1) as f64
        }
    }

    pub fn cell_center(&self, index: usize) -> Point3 {
        let [i, j, k] = self.cell(index);
        Point3::new(self.coordinate(i), self.coordinate(j), self.coordinate(k))
    }

    // Occupancy may only ever be cleared here, never set.
    pub fn intersect(&mut self, survivors: &[bool]) {
        assert_eq!(survivors.len(), self.occupied.len());
        for (o, &s) in self.occupied.iter_mut().zip(survivors) {
            *o &= s;
        }
    }

    /// World positions of the occupied cells, in index order.
    pub fn occupied_points(&self) -> Vec<Point3> {
        self.occupied
            .iter()
            .enumerate()
            .filter(|(_, &o)| o)
            .map(|(index, _)| self.cell_center(index))
            .collect()
    }
}

/// Computes which cells of the grid are consistent with a single view's
/// silhouette.
pub fn view_survivors(
    grid: &VoxelGrid,
    view: &View,
    out_of_view: OutOfView,
) -> Vec<bool> {
    let turntable = Turntable::for_view(view);
    (0..grid.num_cells())
        .map(|index| match turntable.pixel(&grid.cell_center(index)) {
            Some(pixel) => view.is_foreground(pixel.x, pixel.y),
            None => out_of_view == OutOfView::Keep,
        })
        .collect()
}

pub fn carve_grid(grid: &mut VoxelGrid, views: &[View], params: &CarveParams) {
    let survivors: Vec<Vec<bool>> = views
        .par_iter()
        .map(|view| view_survivors(grid, view, params.out_of_view))
        .collect();

    for (n, (view, s)) in views.iter().zip(survivors.iter()).enumerate() {
        grid.intersect(s);
        info!(
            "  carved view {}/{} at {}°, remaining voxels: {}",
            n + 1,
            views.len(),
            view.angle_degrees,
            grid.count_occupied()
        );
    }
}

/// Intersects all view silhouettes within a full grid.
///
/// Fails with `EmptyReconstruction` if no cell survives.
pub fn carve(views: &[View], params: &CarveParams) -> Result<VoxelGrid> {
    if params.grid_resolution == 0 {
        return Err(Error::new(
            MalformedData,
            "grid resolution must be positive".to_string(),
        ));
    }

    info!(
        "carving {}^3 voxel grid with {} views...",
        params.grid_resolution,
        views.len()
    );
    let mut grid = VoxelGrid::full(params.grid_resolution);
    carve_grid(&mut grid, views, params);

    let remaining = grid.count_occupied();
    if remaining == 0 {
        let desc = format!(
            "carving left 0 of {} voxels occupied (check masks and angles)",
            grid.num_cells()
        );
        return Err(Error::new(EmptyReconstruction, desc));
    }
    info!("carving finished with {} voxels remaining", remaining);

    Ok(grid)
}
