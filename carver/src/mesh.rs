use std::collections::{HashMap, HashSet};

use crate::{Point3, Vector3};

// Color every vertex starts with until it gets colored from the views.
pub const PLACEHOLDER_GRAY: f64 = 0.5;

const TAUBIN_LAMBDA: f64 = 0.5;
const TAUBIN_MU: f64 = -0.53;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Point3>,
    pub normals: Vec<Vector3>,
    // RGB in [0, 1].
    pub colors: Vec<Vector3>,
    pub faces: Vec<[usize; 3]>,
}

pub fn ordered(e: [usize; 2]) -> [usize; 2] {
    if e[0] < e[1] {
        e
    } else {
        [e[1], e[0]]
    }
}

/// Linearly interpolated quantile, `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

impl Mesh {
    pub fn new(
        vertices: Vec<Point3>,
        normals: Vec<Vector3>,
        faces: Vec<[usize; 3]>,
    ) -> Mesh {
        assert_eq!(vertices.len(), normals.len());
        let colors = vec![Vector3::repeat(PLACEHOLDER_GRAY); vertices.len()];
        Mesh {
            vertices,
            normals,
            colors,
            faces,
        }
    }

    fn assert_consistent(&self) {
        assert_eq!(self.vertices.len(), self.normals.len());
        assert_eq!(self.vertices.len(), self.colors.len());
    }

    /// Drops vertices not flagged in `keep` along with every face using
    /// them, preserving the order of the rest.
    pub fn retain_vertices(&mut self, keep: &[bool]) {
        self.assert_consistent();
        assert_eq!(keep.len(), self.vertices.len());
        let mut mappings = vec![None; self.vertices.len()];

        let mut j = 0;
        for i in 0..self.vertices.len() {
            if keep[i] {
                mappings[i] = Some(j);
                self.vertices.swap(i, j);
                self.normals.swap(i, j);
                self.colors.swap(i, j);
                j += 1;
            }
        }
        self.vertices.truncate(j);
        self.normals.truncate(j);
        self.colors.truncate(j);

        let mut j = 0;
        'next: for i in 0..self.faces.len() {
            let mut face = self.faces[i];
            for v in face.iter_mut() {
                if let Some(w) = mappings[*v] {
                    *v = w;
                } else {
                    continue 'next;
                }
            }
            self.faces[j] = face;
            j += 1;
        }
        self.faces.truncate(j);
    }

    /// Removes the vertices whose density falls below the given quantile
    /// of all densities. Returns the threshold and the number removed.
    pub fn remove_low_density_vertices(
        &mut self,
        densities: &[f64],
        density_quantile: f64,
    ) -> (f64, usize) {
        assert_eq!(densities.len(), self.vertices.len());
        let threshold = match quantile(densities, density_quantile) {
            Some(t) => t,
            None => return (0.0, 0),
        };

        let keep: Vec<bool> =
            densities.iter().map(|&d| d >= threshold).collect();
        let removed = keep.iter().filter(|&&k| !k).count();
        self.retain_vertices(&keep);
        (threshold, removed)
    }

    pub fn face_area(&self, face: &[usize; 3]) -> f64 {
        let [v0, v1, v2] = *face;
        let e1 = self.vertices[v1] - self.vertices[v0];
        let e2 = self.vertices[v2] - self.vertices[v0];
        e1.cross(&e2).norm() / 2.0
    }

    /// Removes duplicated vertices, degenerate and duplicated faces,
    /// non-manifold edges and finally unreferenced vertices.
    pub fn cleanup(&mut self) {
        self.merge_duplicated_vertices();
        self.remove_degenerate_faces();
        self.remove_duplicated_faces();
        self.remove_non_manifold_edges();
        self.remove_unreferenced_vertices();
    }

    pub fn merge_duplicated_vertices(&mut self) {
        self.assert_consistent();
        // Adding zero folds -0.0 into 0.0.
        let key = |p: &Point3| p.coords.map(|c| (c + 0.0).to_bits());

        let mut first = HashMap::with_capacity(self.vertices.len());
        let mut mappings = Vec::with_capacity(self.vertices.len());
        let mut keep = vec![false; self.vertices.len()];
        for (i, v) in self.vertices.iter().enumerate() {
            let j = *first.entry(key(v)).or_insert(i);
            keep[i] = i == j;
            mappings.push(j);
        }

        for face in self.faces.iter_mut() {
            for v in face.iter_mut() {
                *v = mappings[*v];
            }
        }
        self.retain_vertices(&keep);
    }

    pub fn remove_degenerate_faces(&mut self) {
        self.faces
            .retain(|&[v0, v1, v2]| v0 != v1 && v0 != v2 && v1 != v2);
    }

    pub fn remove_duplicated_faces(&mut self) {
        let mut seen = HashSet::with_capacity(self.faces.len());
        self.faces.retain(|face| {
            let mut key = *face;
            key.sort_unstable();
            seen.insert(key)
        });
    }

    // Edges shared by more than two faces keep the two largest ones.
    pub fn remove_non_manifold_edges(&mut self) {
        let mut faces_around_edge = HashMap::<[usize; 2], Vec<usize>>::new();
        for (f_idx, &[v0, v1, v2]) in self.faces.iter().enumerate() {
            for e in [[v0, v1], [v0, v2], [v1, v2]] {
                faces_around_edge.entry(ordered(e)).or_default().push(f_idx);
            }
        }

        let mut edges: Vec<[usize; 2]> = faces_around_edge
            .iter()
            .filter(|(_, faces)| faces.len() > 2)
            .map(|(&e, _)| e)
            .collect();
        if edges.is_empty() {
            return;
        }
        edges.sort_unstable();

        let mut removed = vec![false; self.faces.len()];
        for e in edges {
            let mut faces: Vec<usize> = faces_around_edge[&e]
                .iter()
                .cloned()
                .filter(|&f| !removed[f])
                .collect();
            if faces.len() <= 2 {
                continue;
            }
            faces.sort_by(|&a, &b| {
                let area_a = self.face_area(&self.faces[a]);
                let area_b = self.face_area(&self.faces[b]);
                area_b.total_cmp(&area_a).then(a.cmp(&b))
            });
            for &f in &faces[2..] {
                removed[f] = true;
            }
        }

        let mut f_idx = 0;
        self.faces.retain(|_| {
            f_idx += 1;
            !removed[f_idx - 1]
        });
    }

    pub fn remove_unreferenced_vertices(&mut self) {
        let mut referenced = vec![false; self.vertices.len()];
        for face in &self.faces {
            for &v in face {
                referenced[v] = true;
            }
        }
        self.retain_vertices(&referenced);
    }

    fn laplacian_step(&mut self, sums: &mut [(Vector3, usize)], factor: f64) {
        for sum in sums.iter_mut() {
            *sum = (Vector3::zeros(), 0);
        }

        for triangle in self.faces.iter() {
            sums[triangle[0]].0 += self.vertices[triangle[1]].coords;
            sums[triangle[0]].0 += self.vertices[triangle[2]].coords;
            sums[triangle[0]].1 += 2;

            sums[triangle[1]].0 += self.vertices[triangle[0]].coords;
            sums[triangle[1]].0 += self.vertices[triangle[2]].coords;
            sums[triangle[1]].1 += 2;

            sums[triangle[2]].0 += self.vertices[triangle[0]].coords;
            sums[triangle[2]].0 += self.vertices[triangle[1]].coords;
            sums[triangle[2]].1 += 2;
        }

        #[allow(clippy::needless_range_loop)]
        for i in 0..self.vertices.len() {
            let (sum, num) = sums[i];
            if num > 0 {
                let v = &mut self.vertices[i].coords;
                *v += factor * (sum / num as f64 - *v);
            }
        }
    }

    /// Taubin smoothing: each iteration shrinks with `λ` and inflates back
    /// with `μ` so the volume stays roughly the same.
    pub fn smooth_taubin(&mut self, num_iters: usize) {
        let mut sums = vec![(Vector3::zeros(), 0); self.vertices.len()];
        for _ in 0..num_iters {
            self.laplacian_step(&mut sums, TAUBIN_LAMBDA);
            self.laplacian_step(&mut sums, TAUBIN_MU);
        }
    }

    // Area-weighted face normals.
    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for &[v0, v1, v2] in self.faces.iter() {
            let e1 = self.vertices[v1] - self.vertices[v0];
            let e2 = self.vertices[v2] - self.vertices[v0];
            let n = e1.cross(&e2);
            normals[v0] += n;
            normals[v1] += n;
            normals[v2] += n;
        }
        self.normals = normals
            .into_iter()
            .map(|n| n.try_normalize(0.0).unwrap_or_else(Vector3::zeros))
            .collect();
    }
}


#[cfg(test)]
mod test {
    use super::*;

    use base::assert_eq_f32;

    use super::test_util::cube_mesh;

    fn triangle_fan(num: usize) -> Mesh {
        let mut vertices = vec![Point3::origin()];
        for i in 0..num {
            let a = i as f64;
            vertices.push(Point3::new(a.cos(), a.sin(), 0.0));
        }
        let faces = (1..num).map(|i| [0, i, i + 1]).collect();
        let normals = vec![Vector3::z(); vertices.len()];
        Mesh::new(vertices, normals, faces)
    }

    #[test]
    fn test_quantile() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[3.0], 0.9), Some(3.0));
        let values = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(quantile(&values, 0.0), Some(1.0));
        assert_eq!(quantile(&values, 1.0), Some(5.0));
        assert_eq!(quantile(&values, 0.5), Some(3.0));
        assert_eq_f32!(quantile(&values, 0.1).unwrap(), 1.4);
    }

    #[test]
    fn test_new_mesh_has_placeholder_colors() {
        let mesh = triangle_fan(3);
        assert_eq!(mesh.colors.len(), 4);
        assert!(mesh.colors.iter().all(|c| *c == Vector3::repeat(0.5)));
    }

    #[test]
    fn test_retain_vertices() {
        let mut mesh = triangle_fan(4);
        mesh.colors[3] = Vector3::new(1.0, 0.0, 0.0);
        mesh.retain_vertices(&[true, true, false, true, true]);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.normals.len(), 4);
        assert_eq!(mesh.colors[2], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(mesh.faces, vec![[0, 2, 3]]);
    }

    #[test]
    fn test_remove_low_density_vertices() {
        let mut mesh = triangle_fan(4);
        let densities = [5.0, 4.0, 0.5, 6.0, 7.0];
        let (threshold, removed) =
            mesh.remove_low_density_vertices(&densities, 0.1);
        assert_eq_f32!(threshold, 0.5 + 3.5 * 0.4);
        assert_eq!(removed, 1);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.faces, vec![[0, 2, 3]]);
    }

    #[test]
    fn test_cleanup() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(-0.0, 1.0, 0.0), // Duplicate of #2.
            Point3::new(5.0, 5.0, 5.0),  // Unreferenced.
            Point3::new(1.0, 1.0, 0.0),
        ];
        let faces = vec![
            [0, 1, 2],
            [1, 0, 3], // Duplicate once #3 merges into #2.
            [0, 0, 1], // Degenerate.
            [1, 5, 2],
        ];
        let normals = vec![Vector3::z(); vertices.len()];
        let mut mesh = Mesh::new(vertices, normals, faces);
        mesh.cleanup();

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [1, 3, 2]]);
        assert_eq!(mesh.vertices[3], Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_remove_non_manifold_edges() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 2.0, 0.0),
            Point3::new(0.5, -3.0, 0.0),
            Point3::new(0.5, 0.0, 0.1),
        ];
        // Three faces share the edge 0-1; the sliver goes.
        let faces = vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let normals = vec![Vector3::z(); vertices.len()];
        let mut mesh = Mesh::new(vertices, normals, faces);
        mesh.remove_non_manifold_edges();
        assert_eq!(mesh.faces, vec![[0, 1, 2], [1, 0, 3]]);

        let mut cube = cube_mesh();
        let faces = cube.faces.clone();
        cube.remove_non_manifold_edges();
        assert_eq!(cube.faces, faces);
    }

    #[test]
    fn test_compute_vertex_normals() {
        let mesh = cube_mesh();
        let expected = Vector3::new(1.0, 1.0, 1.0).normalize();
        assert_eq_f32!(mesh.normals[7].dot(&expected), 1.0);
        assert_eq_f32!(mesh.normals[0].dot(&-expected), 1.0);
    }

    #[test]
    fn test_smooth_taubin() {
        let mut cube = cube_mesh();
        let center = Vector3::repeat(0.5);
        cube.smooth_taubin(5);

        // Shrinks somewhat but stays centered.
        let dists: Vec<f64> = cube
            .vertices
            .iter()
            .map(|v| (v.coords - center).norm())
            .collect();
        assert!(dists.iter().all(|d| *d > 0.2 && *d < 0.8));
        let centroid = cube.vertices.iter().map(|v| v.coords).sum::<Vector3>()
            / cube.vertices.len() as f64;
        assert_eq_f32!((centroid - center).norm(), 0.0, 0.05);

        let mut fan = triangle_fan(3);
        fan.faces.clear();
        let before = fan.vertices.clone();
        fan.smooth_taubin(3);
        assert_eq!(fan.vertices, before);
    }
}
