use derive_more::{Add, AddAssign};
use log::info;
use rayon::prelude::*;
use structopt::StructOpt;

use crate::depth_map::DepthMap;
use crate::mesh::{Mesh, PLACEHOLDER_GRAY};
use crate::turntable::Turntable;
use crate::view::View;
use crate::{Point3, Vector3};
use base::defs::{Error, ErrorKind::*, Result};

pub const FALLBACK_GRAY: f64 = 0.8;
pub const DEFAULT_VISIBILITY_EPSILON_FACTOR: f64 = 1.5;
const MIN_FACING_WEIGHT: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq, StructOpt)]
pub struct ColorParams {
    #[structopt(
        help = "Occlusion tolerance in voxel sizes",
        long,
        default_value = "1.5"
    )]
    pub visibility_epsilon_factor: f64,
}

impl Default for ColorParams {
    fn default() -> Self {
        Self {
            visibility_epsilon_factor: DEFAULT_VISIBILITY_EPSILON_FACTOR,
        }
    }
}

#[derive(Add, AddAssign, Clone, Copy, Debug, Default, PartialEq)]
struct WeightedColor {
    sum: Vector3,
    weight: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum VertexColor {
    Blended(Vector3),
    Unseen,
    Invalid,
}

impl VertexColor {
    fn rgb(&self) -> Vector3 {
        match self {
            VertexColor::Blended(color) => *color,
            VertexColor::Unseen => Vector3::repeat(FALLBACK_GRAY),
            VertexColor::Invalid => Vector3::repeat(PLACEHOLDER_GRAY),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ColoringStats {
    pub num_blended: usize,
    pub num_unseen: usize,
    pub num_invalid: usize,
}

/// Colors mesh vertices by blending the views that see them: front-facing,
/// inside the silhouette and not hidden behind nearer carved volume.
pub struct VertexColorer<'a> {
    views: &'a [View],
    depth_maps: &'a [DepthMap],
    turntables: Vec<Turntable>,
    epsilon: f64,
}

impl<'a> VertexColorer<'a> {
    pub fn new(
        views: &'a [View],
        depth_maps: &'a [DepthMap],
        voxel_size: f64,
        params: &ColorParams,
    ) -> Result<VertexColorer<'a>> {
        if views.len() != depth_maps.len() {
            let desc = format!(
                "got {} depth maps for {} views",
                depth_maps.len(),
                views.len()
            );
            return Err(Error::new(InconsistentState, desc));
        }

        Ok(VertexColorer {
            views,
            depth_maps,
            turntables: views.iter().map(Turntable::for_view).collect(),
            epsilon: voxel_size * params.visibility_epsilon_factor,
        })
    }

    fn sample(
        &self,
        index: usize,
        position: &Point3,
        normal: &Vector3,
    ) -> Option<WeightedColor> {
        let turntable = &self.turntables[index];
        let pixel = turntable.pixel(position)?;

        let view = &self.views[index];
        if !view.is_foreground(pixel.x, pixel.y) {
            return None;
        }

        let depth = self.depth_maps[index].get(pixel.x, pixel.y)?;
        if (pixel.depth - depth).abs() > self.epsilon {
            return None;
        }

        let facing = normal.dot(&turntable.view_direction());
        if facing <= 0.0 {
            return None;
        }

        let weight = facing.max(MIN_FACING_WEIGHT);
        Some(WeightedColor {
            sum: view.color_at(pixel.x, pixel.y) * weight,
            weight,
        })
    }

    fn blend(&self, position: &Point3, normal: &Vector3) -> VertexColor {
        let finite = position
            .coords
            .iter()
            .chain(normal.iter())
            .all(|c| c.is_finite());
        if !finite {
            return VertexColor::Invalid;
        }

        let mut total = WeightedColor::default();
        for index in 0..self.views.len() {
            if let Some(sample) = self.sample(index, position, normal) {
                total += sample;
            }
        }

        if total.weight > 0.0 {
            VertexColor::Blended(total.sum / total.weight)
        } else {
            VertexColor::Unseen
        }
    }

    pub fn color_vertex(&self, position: &Point3, normal: &Vector3) -> Vector3 {
        self.blend(position, normal).rgb()
    }

    /// Overwrites the colors of every mesh vertex.
    pub fn color_mesh(&self, mesh: &mut Mesh) -> ColoringStats {
        info!(
            "coloring {} vertices from {} views...",
            mesh.vertices.len(),
            self.views.len()
        );
        let colors: Vec<VertexColor> = mesh
            .vertices
            .par_iter()
            .zip(mesh.normals.par_iter())
            .map(|(position, normal)| self.blend(position, normal))
            .collect();

        let mut stats = ColoringStats::default();
        for color in colors.iter() {
            match color {
                VertexColor::Blended(_) => stats.num_blended += 1,
                VertexColor::Unseen => stats.num_unseen += 1,
                VertexColor::Invalid => stats.num_invalid += 1,
            }
        }
        mesh.colors = colors.iter().map(VertexColor::rgb).collect();

        info!(
            "  {} vertices colored, {} unseen, {} non-finite",
            stats.num_blended, stats.num_unseen, stats.num_invalid
        );
        stats
    }
}
