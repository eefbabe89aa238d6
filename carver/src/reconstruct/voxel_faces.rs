use std::collections::{HashMap, HashSet};

use super::{Lattice, Reconstruct, Reconstruction};
use crate::mesh::Mesh;
use crate::point_cloud::{build_kdtree, estimate_spacing, OrientedPointCloud};
use crate::{Point3, Vector3};
use base::defs::{Error, ErrorKind::*, Result};

/// Blocky fallback: snaps points to a lattice and keeps every cube face
/// not shared with another occupied node. Always closed, never smooth.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoxelFaces;

// Corners live on a lattice of half steps: node `n` spans `2n - 1..2n + 1`.
struct CornerIndex {
    lattice: Lattice,
    indices: HashMap<[usize; 3], usize>,
    vertices: Vec<Point3>,
}

impl CornerIndex {
    fn get(&mut self, corner: [usize; 3]) -> usize {
        if let Some(&index) = self.indices.get(&corner) {
            return index;
        }

        let index = self.vertices.len();
        let offset =
            Vector3::new(corner[0] as f64, corner[1] as f64, corner[2] as f64);
        self.vertices
            .push(self.lattice.origin + offset * self.lattice.step / 2.0);
        self.indices.insert(corner, index);
        index
    }
}

impl Reconstruct for VoxelFaces {
    fn name(&self) -> &str {
        "voxel faces"
    }

    fn reconstruct(
        &self,
        cloud: &OrientedPointCloud,
        depth: usize,
    ) -> Result<Reconstruction> {
        if cloud.is_empty() {
            return Err(Error::new(
                GeometryError,
                "no points to reconstruct".to_string(),
            ));
        }

        // World coordinates span [-1, 1], so a lone point gets a cell of
        // the nominal depth.
        let min_step = if cloud.len() > 1 {
            let kdtree = build_kdtree(&cloud.points)?;
            estimate_spacing(&cloud.points, &kdtree)?
        } else {
            0.0
        };
        let min_step = min_step.max(2.0 / 2f64.powi(depth as i32));
        let step = Lattice::fit(&cloud.points, depth, min_step, 0.0)?.step;
        let lattice = Lattice::fit(&cloud.points, depth, min_step, step)?;

        let occupied: HashSet<[usize; 3]> =
            cloud.points.iter().map(|p| lattice.nearest_node(p)).collect();
        let mut nodes: Vec<[usize; 3]> = occupied.iter().cloned().collect();
        nodes.sort_unstable();

        let mut corners = CornerIndex {
            lattice,
            indices: HashMap::new(),
            vertices: Vec::new(),
        };
        let mut faces = Vec::new();

        for node in nodes {
            for a in 0..3 {
                let (u, v) = ((a + 1) % 3, (a + 2) % 3);
                for positive in [false, true] {
                    let mut neighbour = node;
                    if positive {
                        neighbour[a] += 1;
                    } else {
                        neighbour[a] -= 1;
                    }
                    if occupied.contains(&neighbour) {
                        continue;
                    }

                    let mut quad = [0; 4];
                    for (q, (du, dv)) in
                        [(0, 0), (2, 0), (2, 2), (0, 2)].into_iter().enumerate()
                    {
                        let mut corner = node.map(|c| 2 * c - 1);
                        corner[a] += if positive { 2 } else { 0 };
                        corner[u] += du;
                        corner[v] += dv;
                        quad[q] = corners.get(corner);
                    }

                    // Counter-clockwise seen from outside.
                    if !positive {
                        quad.swap(1, 3);
                    }
                    faces.push([quad[0], quad[1], quad[2]]);
                    faces.push([quad[0], quad[2], quad[3]]);
                }
            }
        }

        let normals = vec![Vector3::zeros(); corners.vertices.len()];
        let mut mesh = Mesh::new(corners.vertices, normals, faces);
        mesh.compute_vertex_normals();

        Ok(Reconstruction {
            mesh,
            densities: None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use base::assert_eq_f32;

    use crate::mesh::ordered;

    fn cloud(points: Vec<Point3>) -> OrientedPointCloud {
        let normals = vec![Vector3::z(); points.len()];
        OrientedPointCloud { points, normals }
    }

    #[test]
    fn test_single_voxel() {
        let cloud = cloud(vec![Point3::origin()]);
        let r = VoxelFaces.reconstruct(&cloud, 2).unwrap();
        assert_eq!(r.densities, None);
        assert_eq!(r.mesh.vertices.len(), 8);
        assert_eq!(r.mesh.faces.len(), 12);

        // A cube of the nominal cell size around the point.
        for (v, n) in r.mesh.vertices.iter().zip(r.mesh.normals.iter()) {
            for c in v.coords.iter() {
                assert_eq_f32!(c.abs(), 0.25);
            }
            assert!(n.dot(&v.coords) > 0.0);
        }
    }

    #[test]
    fn test_adjacent_voxels_share_faces() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.1, 0.1, 0.0),
        ];
        let r = VoxelFaces.reconstruct(&cloud(points), 8).unwrap();
        let mesh = &r.mesh;

        // Three voxels in an L expose 14 of their 18 faces.
        assert_eq!(mesh.faces.len(), 14 * 2);

        let mut edges = HashMap::<[usize; 2], usize>::new();
        for &[a, b, c] in mesh.faces.iter() {
            for e in [[a, b], [b, c], [c, a]] {
                *edges.entry(ordered(e)).or_default() += 1;
            }
        }
        assert!(edges.values().all(|&n| n % 2 == 0));

        let volume: f64 = mesh
            .faces
            .iter()
            .map(|&[a, b, c]| {
                let [a, b, c] = [a, b, c].map(|i| mesh.vertices[i].coords);
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum();
        assert_eq_f32!(volume, 3.0 * 0.001, 1e-9);
    }

    #[test]
    fn test_empty_cloud() {
        let err = VoxelFaces.reconstruct(&cloud(vec![]), 8).err().unwrap();
        assert_eq!(err.kind, GeometryError);
    }
}
