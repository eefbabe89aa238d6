use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;

use super::{Lattice, Reconstruct, Reconstruction};
use crate::mesh::Mesh;
use crate::point_cloud::{
    build_kdtree, count_within, estimate_spacing, nearest_within,
    OrientedPointCloud,
};
use crate::{Point3, Vector3};
use base::defs::{Error, ErrorKind::*, Result};

const MIN_POINTS: usize = 4;

// A lattice node is inside when a point lies within this many spacings
// (or lattice steps if those are coarser). Slightly above half the cube
// diagonal so that a dense point set leaves no gaps.
const INSIDE_RADIUS_FACTOR: f64 = 0.87;
const DENSITY_RADIUS_FACTOR: f64 = 2.0;

/// Naive surface nets over an inside/outside lattice rasterised from the
/// points. Produces a closed, outward-wound surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct SurfaceNets;

struct Occupancy {
    lattice: Lattice,
    inside: Vec<bool>,
}

impl Occupancy {
    fn rasterise(points: &[Point3], lattice: Lattice, radius: f64) -> Self {
        let mut inside = vec![false; lattice.num_nodes()];
        let reach = (radius / lattice.step).ceil() as usize;
        let squared_radius = radius * radius;

        for point in points {
            let center = lattice.nearest_node(point);
            let lo = |a: usize| center[a].saturating_sub(reach);
            let hi = |a: usize| (center[a] + reach).min(lattice.dims[a] - 1);
            for k in lo(2)..=hi(2) {
                for j in lo(1)..=hi(1) {
                    for i in lo(0)..=hi(0) {
                        let node = [i, j, k];
                        let d = lattice.position(node) - point;
                        if d.norm_squared() <= squared_radius {
                            inside[lattice.index(node)] = true;
                        }
                    }
                }
            }
        }

        Occupancy { lattice, inside }
    }

    fn is_inside(&self, node: [usize; 3]) -> bool {
        self.inside[self.lattice.index(node)]
    }
}

struct CellVertex {
    index: usize,
    sum: Vector3,
    count: usize,
}

fn extract_surface(occupancy: &Occupancy) -> (Vec<Point3>, Vec<[usize; 3]>) {
    let lattice = &occupancy.lattice;
    let dims = lattice.dims;
    let mut cells = HashMap::<usize, CellVertex>::new();
    let mut quads = Vec::new();

    for k in 0..dims[2] {
        for j in 0..dims[1] {
            for i in 0..dims[0] {
                let node = [i, j, k];
                let lower = occupancy.is_inside(node);

                for a in 0..3 {
                    if node[a] + 1 >= dims[a] {
                        continue;
                    }
                    let mut upper_node = node;
                    upper_node[a] += 1;
                    if occupancy.is_inside(upper_node) == lower {
                        continue;
                    }

                    // The padding keeps crossing edges off the border, so
                    // all four cells around the edge exist.
                    let (u, v) = ((a + 1) % 3, (a + 2) % 3);
                    if node[u] == 0 || node[v] == 0 {
                        continue;
                    }

                    let midpoint = (lattice.position(node).coords
                        + lattice.position(upper_node).coords)
                        / 2.0;
                    let mut quad = [0; 4];
                    for (q, (du, dv)) in
                        [(1, 1), (0, 1), (0, 0), (1, 0)].into_iter().enumerate()
                    {
                        let mut cell = node;
                        cell[u] -= du;
                        cell[v] -= dv;
                        let next_index = cells.len();
                        let vertex = cells
                            .entry(lattice.index(cell))
                            .or_insert(CellVertex {
                                index: next_index,
                                sum: Vector3::zeros(),
                                count: 0,
                            });
                        vertex.sum += midpoint;
                        vertex.count += 1;
                        quad[q] = vertex.index;
                    }

                    // Counter-clockwise around +a when inside is below.
                    if !lower {
                        quad.swap(1, 3);
                    }
                    quads.push(quad);
                }
            }
        }
    }

    let mut vertices = vec![Point3::origin(); cells.len()];
    for cell in cells.values() {
        vertices[cell.index] = Point3::from(cell.sum / cell.count as f64);
    }

    let mut faces = Vec::with_capacity(quads.len() * 2);
    for q in quads {
        faces.push([q[0], q[1], q[2]]);
        faces.push([q[0], q[2], q[3]]);
    }

    (vertices, faces)
}

impl Reconstruct for SurfaceNets {
    fn name(&self) -> &str {
        "surface nets"
    }

    fn reconstruct(
        &self,
        cloud: &OrientedPointCloud,
        depth: usize,
    ) -> Result<Reconstruction> {
        if cloud.len() < MIN_POINTS {
            let desc = format!(
                "need at least {} points, got {}",
                MIN_POINTS,
                cloud.len()
            );
            return Err(Error::new(GeometryError, desc));
        }

        let kdtree = build_kdtree(&cloud.points)?;
        let spacing = estimate_spacing(&cloud.points, &kdtree)?;

        let min_step = spacing / 2.0;
        let step = Lattice::fit(&cloud.points, depth, min_step, 0.0)?.step;
        let radius = INSIDE_RADIUS_FACTOR * spacing.max(step);
        let lattice = Lattice::fit(
            &cloud.points,
            depth,
            min_step,
            radius + 2.0 * step,
        )?;
        debug!(
            "  point spacing {:.5}, lattice step {:.5}, {}x{}x{} nodes",
            spacing,
            lattice.step,
            lattice.dims[0],
            lattice.dims[1],
            lattice.dims[2]
        );

        let occupancy = Occupancy::rasterise(&cloud.points, lattice, radius);
        let (vertices, faces) = extract_surface(&occupancy);
        if faces.is_empty() {
            return Err(Error::new(
                GeometryError,
                "extracted surface is empty".to_string(),
            ));
        }

        let normals = vertices
            .par_iter()
            .map(|v| -> Result<Vector3> {
                let nearest = nearest_within(&kdtree, v, 1, f64::INFINITY)?;
                Ok(nearest
                    .first()
                    .map_or_else(Vector3::zeros, |&i| cloud.normals[i]))
            })
            .collect::<Result<Vec<_>>>()?;

        let density_radius = DENSITY_RADIUS_FACTOR * spacing;
        let densities = vertices
            .par_iter()
            .map(|v| -> Result<f64> {
                Ok(count_within(&kdtree, v, density_radius)? as f64)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Reconstruction {
            mesh: Mesh::new(vertices, normals, faces),
            densities: Some(densities),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::mesh::ordered;
    use crate::point_cloud::estimate_normals;

    fn solid_ball(num: usize, radius: f64) -> Vec<Point3> {
        let mut points = Vec::new();
        for k in 0..num {
            for j in 0..num {
                for i in 0..num {
                    let c = |n: usize| 2.0 * n as f64 / (num - 1) as f64 - 1.0;
                    let p = Point3::new(c(i), c(j), c(k));
                    if p.coords.norm() <= radius {
                        points.push(p);
                    }
                }
            }
        }
        points
    }

    fn signed_volume(mesh: &Mesh) -> f64 {
        mesh.faces
            .iter()
            .map(|&[a, b, c]| {
                let [a, b, c] = [a, b, c].map(|i| mesh.vertices[i].coords);
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum()
    }

    #[test]
    fn test_ball_surface_is_closed_and_outward() {
        let cloud = estimate_normals(solid_ball(21, 0.6)).unwrap();
        let r = SurfaceNets.reconstruct(&cloud, 6).unwrap();
        let mesh = &r.mesh;
        assert!(!mesh.faces.is_empty());
        assert_eq!(mesh.normals.len(), mesh.vertices.len());

        // Every edge borders exactly two faces.
        let mut edges = HashMap::<[usize; 2], usize>::new();
        for &[a, b, c] in mesh.faces.iter() {
            for e in [[a, b], [b, c], [c, a]] {
                *edges.entry(ordered(e)).or_default() += 1;
            }
        }
        assert!(edges.values().all(|&n| n == 2));

        // Positive volume close to the ball's, slightly inflated.
        let volume = signed_volume(mesh);
        let ball = 4.0 / 3.0 * std::f64::consts::PI * 0.6f64.powi(3);
        assert!(volume > ball * 0.8 && volume < ball * 1.6, "{}", volume);

        for v in mesh.vertices.iter() {
            let r = v.coords.norm();
            assert!(r > 0.5 && r < 0.8, "{}", r);
        }

        let densities = r.densities.unwrap();
        assert_eq!(densities.len(), mesh.vertices.len());
        assert!(densities.iter().all(|&d| d >= 1.0));
    }

    #[test]
    fn test_too_few_points() {
        let cloud = OrientedPointCloud {
            points: vec![Point3::origin(); 3],
            normals: vec![Vector3::z(); 3],
        };
        let err = SurfaceNets.reconstruct(&cloud, 6).err().unwrap();
        assert_eq!(err.kind, GeometryError);
    }
}
