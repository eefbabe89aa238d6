use std::io::{self, Write};
use std::path::Path;

use log::info;
use structopt::StructOpt;

use crate::carving::{carve, CarveParams};
use crate::coloring::{ColorParams, VertexColorer};
use crate::depth_map::build_depth_maps;
use crate::export_obj::export_obj;
use crate::export_ply::{export_ply, export_points_ply, PlyFormat};
use crate::mask::MaskParams;
use crate::mesh::Mesh;
use crate::point_cloud::estimate_normals;
use crate::reconstruct::{reconstruct_with_fallback, SurfaceNets, VoxelFaces};
use crate::view::View;
use crate::Point3;
use base::defs::{Error, ErrorKind::*, IntoResult, Result};
use base::util::fs;

pub const DEFAULT_RECONSTRUCTION_DEPTH: usize = 8;
pub const DEFAULT_DENSITY_QUANTILE: f64 = 0.02;
pub const DEFAULT_SMOOTHING_ITERATIONS: usize = 10;

#[derive(Clone, Debug, StructOpt)]
pub struct SurfaceParams {
    #[structopt(
        help = "Surface lattice depth (at most 2^depth cells per side)",
        long,
        short = "d",
        default_value = "8"
    )]
    pub reconstruction_depth: usize,

    #[structopt(
        help = "Quantile of vertex densities below which vertices are removed",
        long,
        default_value = "0.02"
    )]
    pub density_quantile: f64,

    #[structopt(
        help = "Number of Taubin smoothing iterations",
        long,
        short = "s",
        default_value = "10"
    )]
    pub smoothing_iterations: usize,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        SurfaceParams {
            reconstruction_depth: DEFAULT_RECONSTRUCTION_DEPTH,
            density_quantile: DEFAULT_DENSITY_QUANTILE,
            smoothing_iterations: DEFAULT_SMOOTHING_ITERATIONS,
        }
    }
}

#[derive(Clone, Debug, Default, StructOpt)]
pub struct ReconstructionParams {
    #[structopt(flatten)]
    pub mask: MaskParams,

    #[structopt(flatten)]
    pub carve: CarveParams,

    #[structopt(flatten)]
    pub color: ColorParams,

    #[structopt(flatten)]
    pub surface: SurfaceParams,
}

/// Carves the views into a volume, wraps it into a surface and colors the
/// surface from the views.
pub fn reconstruct_mesh(
    views: &[View],
    params: &ReconstructionParams,
) -> Result<Mesh> {
    let grid = carve(views, &params.carve)?;
    let points = grid.occupied_points();
    info!("{} occupied voxel centres left", points.len());

    let cloud = estimate_normals(points)?;
    let reconstruction = reconstruct_with_fallback(
        &SurfaceNets,
        &VoxelFaces,
        &cloud,
        params.surface.reconstruction_depth,
    )?;
    let mut mesh = reconstruction.mesh;

    let mut threshold = None;
    if let Some(densities) = &reconstruction.densities {
        let (t, removed) = mesh.remove_low_density_vertices(
            densities,
            params.surface.density_quantile,
        );
        info!(
            "removed {} vertices with density below {:.3}",
            removed, t
        );
        threshold = Some(t);
    }

    mesh.cleanup();
    info!(
        "cleaned mesh has {} vertices and {} faces",
        mesh.vertices.len(),
        mesh.faces.len()
    );
    if mesh.faces.is_empty() {
        let desc = match threshold {
            Some(t) => {
                format!("no faces left after pruning densities below {}", t)
            }
            None => "no faces left after cleanup".to_string(),
        };
        return Err(Error::new(ReconstructionFailed, desc));
    }

    if params.surface.smoothing_iterations > 0 {
        info!(
            "smoothing mesh ({} iterations)...",
            params.surface.smoothing_iterations
        );
        mesh.smooth_taubin(params.surface.smoothing_iterations);
    }
    mesh.compute_vertex_normals();

    let depth_maps = build_depth_maps(&cloud.points, views);
    let colorer = VertexColorer::new(
        views,
        &depth_maps,
        grid.voxel_size(),
        &params.color,
    )?;
    colorer.color_mesh(&mut mesh);

    Ok(mesh)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MeshFormat {
    Ply(PlyFormat),
    Obj,
}

impl MeshFormat {
    pub fn from_path<P: AsRef<Path>>(path: P, ascii: bool) -> MeshFormat {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("obj") => MeshFormat::Obj,
            _ if ascii => MeshFormat::Ply(PlyFormat::Ascii),
            _ => MeshFormat::Ply(PlyFormat::BinaryLittleEndian),
        }
    }
}

pub fn export_mesh(
    mesh: &Mesh,
    format: MeshFormat,
    writer: &mut dyn io::Write,
) -> Result<()> {
    match format {
        MeshFormat::Ply(ply_format) => export_ply(mesh, ply_format, writer),
        MeshFormat::Obj => export_obj(mesh, writer),
    }
}

pub fn write_mesh<P: AsRef<Path>>(
    mesh: &Mesh,
    path: P,
    format: MeshFormat,
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = io::BufWriter::new(fs::create_file(path)?);
    export_mesh(mesh, format, &mut writer)?;
    writer
        .flush()
        .into_result(|| format!("failed to write file '{}'", path.display()))?;
    info!("written mesh to '{}'", path.display());
    Ok(())
}

pub fn write_points<P: AsRef<Path>>(
    points: &[Point3],
    path: P,
    format: PlyFormat,
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = io::BufWriter::new(fs::create_file(path)?);
    export_points_ply(points, format, &mut writer)?;
    writer
        .flush()
        .into_result(|| format!("failed to write file '{}'", path.display()))?;
    info!("written {} points to '{}'", points.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    use image::Rgb;

    use crate::carving::OutOfView;
    use crate::view::test_util::*;
    use crate::Vector3;

    fn small_params() -> ReconstructionParams {
        let mut params = ReconstructionParams::default();
        params.carve.grid_resolution = 24;
        params.surface.reconstruction_depth = 5;
        params.surface.smoothing_iterations = 2;
        params
    }

    fn sphere_views(color: Rgb<u8>) -> Vec<View> {
        (0..8)
            .map(|i| colored_disc_view(64, 0.6, i as f64 * 45.0, color))
            .collect()
    }

    #[test]
    fn test_default_params() {
        let params = ReconstructionParams::default();
        assert_eq!(params.mask.mask_threshold, 30.0);
        assert_eq!(params.carve.grid_resolution, 160);
        assert_eq!(params.carve.out_of_view, OutOfView::Carve);
        assert_eq!(params.color.visibility_epsilon_factor, 1.5);
        assert_eq!(params.surface.reconstruction_depth, 8);
        assert_eq!(params.surface.density_quantile, 0.02);
        assert_eq!(params.surface.smoothing_iterations, 10);
    }

    #[test]
    fn test_params_from_args() {
        let params = ReconstructionParams::from_iter_safe(vec![
            "carver",
            "-n",
            "64",
            "--out-of-view",
            "keep",
            "--mask-threshold",
            "12.5",
            "--density-quantile",
            "0.1",
        ])
        .unwrap();
        assert_eq!(params.carve.grid_resolution, 64);
        assert_eq!(params.carve.out_of_view, OutOfView::Keep);
        assert_eq!(params.mask.mask_threshold, 12.5);
        assert_eq!(params.surface.density_quantile, 0.1);
        assert_eq!(params.surface.smoothing_iterations, 10);
    }

    #[test]
    fn test_reconstruct_sphere() {
        let views = sphere_views(Rgb([255, 255, 255]));
        let mesh = reconstruct_mesh(&views, &small_params()).unwrap();

        assert!(mesh.faces.len() > 100);
        assert_eq!(mesh.colors.len(), mesh.vertices.len());
        assert_eq!(mesh.normals.len(), mesh.vertices.len());

        for v in mesh.vertices.iter() {
            let r = v.coords.norm();
            assert!(r > 0.4 && r < 0.9, "{}", r);
        }
        for c in mesh.colors.iter() {
            assert!(c.iter().all(|&x| (0.0..=1.0).contains(&x)));
        }
        let num_white = mesh
            .colors
            .iter()
            .filter(|c| (*c - Vector3::repeat(1.0)).norm() < 1e-9)
            .count();
        assert!(num_white > 0);
    }

    #[test]
    fn test_reconstruct_empty_views() {
        let mut views = sphere_views(Rgb([255, 255, 255]));
        views.push(uniform_view(64, 10.0, BACKGROUND, false));
        let err = reconstruct_mesh(&views, &small_params()).err().unwrap();
        assert_eq!(err.kind, EmptyReconstruction);
    }

    #[test]
    fn test_mesh_format_from_path() {
        assert_eq!(MeshFormat::from_path("a/b.OBJ", true), MeshFormat::Obj);
        assert_eq!(
            MeshFormat::from_path("mesh.ply", false),
            MeshFormat::Ply(PlyFormat::BinaryLittleEndian)
        );
        assert_eq!(
            MeshFormat::from_path("mesh", true),
            MeshFormat::Ply(PlyFormat::Ascii)
        );
    }

    #[test]
    fn test_write_mesh() {
        let views = sphere_views(Rgb([200, 100, 50]));
        let mesh = reconstruct_mesh(&views, &small_params()).unwrap();

        let path = std::env::temp_dir()
            .join(format!("carver-pipeline-{}.obj", std::process::id()));
        write_mesh(&mesh, &path, MeshFormat::from_path(&path, false)).unwrap();
        let text = fs::read_file_to_string(&path).unwrap();
        assert_eq!(
            text.lines().filter(|l| l.starts_with("f ")).count(),
            mesh.faces.len()
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_points() {
        let path = std::env::temp_dir()
            .join(format!("carver-points-{}.ply", std::process::id()));
        let points = vec![Point3::origin(), Point3::new(0.5, 0.5, -0.5)];
        write_points(&points, &path, PlyFormat::Ascii).unwrap();
        let text = fs::read_file_to_string(&path).unwrap();
        assert!(text.ends_with("end_header\n0 0 0\n0.5 0.5 -0.5\n"));
        std::fs::remove_file(&path).unwrap();
    }
}
