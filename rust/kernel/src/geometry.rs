// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Geometric queries on model entities.
//!
//! Lengths, normals, areas, centroids, triangulation and enclosed volume,
//! computed directly from vertex positions and the chain orientations.

use nalgebra::{Matrix4, Point3, Vector3};

use crate::keys::*;
use crate::model::GeometryModel;

impl GeometryModel {
    pub fn vertex_position(&self, key: VertexKey) -> Option<Point3<f64>> {
        self.vertices.get(key).map(|v| v.position)
    }

    /// Euclidean length of an edge.
    pub fn edge_length(&self, key: EdgeKey) -> Option<f64> {
        let edge = self.edges.get(key)?;
        let p0 = self.vertex_position(edge.vertices[0])?;
        let p1 = self.vertex_position(edge.vertices[1])?;
        Some((p1 - p0).norm())
    }

    /// Total length of a loop or polyline.
    pub fn chain_length(&self, chain: ChainKey) -> Option<f64> {
        self.chain_edges(chain)?
            .into_iter()
            .map(|ek| self.edge_length(ek))
            .sum()
    }

    /// Area vector of a loop (Newell's method): its direction follows the
    /// right-hand rule for the traversal order, its length is twice the area.
    fn loop_area_vector(&self, key: EdgeLoopKey) -> Option<Vector3<f64>> {
        let verts = self.chain_vertices_ordered(ChainKey::EdgeLoop(key))?;
        if verts.len() < 3 {
            return None;
        }

        let mut normal = Vector3::zeros();
        let n = verts.len();
        for i in 0..n {
            let curr = self.vertex_position(verts[i])?;
            let next = self.vertex_position(verts[(i + 1) % n])?;

            normal.x += (curr.y - next.y) * (curr.z + next.z);
            normal.y += (curr.z - next.z) * (curr.x + next.x);
            normal.z += (curr.x - next.x) * (curr.y + next.y);
        }
        Some(normal)
    }

    /// Unit normal of a loop following its traversal order.
    pub fn edge_loop_normal(&self, key: EdgeLoopKey) -> Option<Vector3<f64>> {
        let normal = self.loop_area_vector(key)?;
        let len = normal.norm();
        if len < 1e-15 {
            return None;
        }
        Some(normal / len)
    }

    /// Unit normal of a face: the boundary normal, flipped for backward faces.
    pub fn face_normal(&self, key: FaceKey) -> Option<Vector3<f64>> {
        let face = self.faces.get(key)?;
        let normal = self.edge_loop_normal(face.boundary)?;
        Some(normal * f64::from(face.orientation.sign().unwrap_or(1)))
    }

    /// Oriented area vector of a face, holes subtracted.
    fn face_area_vector(&self, key: FaceKey) -> Option<Vector3<f64>> {
        let face = self.faces.get(key)?;
        let mut total = self.loop_area_vector(face.boundary)? / 2.0;
        for &hole in &face.holes {
            let Some(h) = self.loop_area_vector(hole) else {
                continue;
            };
            let h = h / 2.0;
            // Hole windings are free; always remove their area.
            if h.dot(&total) > 0.0 {
                total -= h;
            } else {
                total += h;
            }
        }
        Some(total * f64::from(face.orientation.sign().unwrap_or(1)))
    }

    /// Area of a face minus the area of its holes.
    pub fn face_area(&self, key: FaceKey) -> Option<f64> {
        self.face_area_vector(key).map(|a| a.norm())
    }

    /// Average of the boundary vertex positions.
    pub fn face_centroid(&self, key: FaceKey) -> Option<Point3<f64>> {
        let face = self.faces.get(key)?;
        let verts = self.chain_vertices_ordered(ChainKey::EdgeLoop(face.boundary))?;
        if verts.is_empty() {
            return None;
        }

        let mut sum = Vector3::zeros();
        for &vk in &verts {
            sum += self.vertex_position(vk)?.coords;
        }
        Some(Point3::from(sum / verts.len() as f64))
    }

    /// Triangulates a face, holes included.
    ///
    /// The polygon is projected onto the dominant plane of its normal and
    /// ear-clipped.
    pub fn triangulate_face(&self, key: FaceKey) -> Option<Vec<[VertexKey; 3]>> {
        let face = self.faces.get(key)?;
        let normal = self.edge_loop_normal(face.boundary)?;

        let abs_n = normal.abs();
        let (ax_u, ax_v) = if abs_n.z >= abs_n.x && abs_n.z >= abs_n.y {
            (0, 1)
        } else if abs_n.y >= abs_n.x {
            (0, 2)
        } else {
            (1, 2)
        };

        let mut coords_2d: Vec<f64> = Vec::new();
        let mut all_verts: Vec<VertexKey> = Vec::new();
        let mut hole_indices: Vec<usize> = Vec::new();

        for (i, lk) in face.loops().enumerate() {
            if i > 0 {
                hole_indices.push(all_verts.len());
            }
            for vk in self.chain_vertices_ordered(ChainKey::EdgeLoop(lk))? {
                let p = self.vertex_position(vk)?;
                coords_2d.push(p[ax_u]);
                coords_2d.push(p[ax_v]);
                all_verts.push(vk);
            }
        }

        let indices = earcutr::earcut(&coords_2d, &hole_indices, 2).ok()?;
        Some(
            indices
                .chunks_exact(3)
                .map(|c| [all_verts[c[0]], all_verts[c[1]], all_verts[c[2]]])
                .collect(),
        )
    }

    /// Signed enclosed volume of a volume, using the PFace orientations.
    ///
    /// Positive when the oriented faces point outwards. Only meaningful for
    /// closed, consistently oriented volumes.
    pub fn volume_signed_volume(&self, key: VolumeKey) -> Option<f64> {
        let volume = self.volumes.get(key)?;
        let mut total = 0.0;

        for &pk in &volume.pfaces {
            let pface = self.pfaces.get(pk)?;
            let Some(area) = self.face_area_vector(pface.face) else {
                continue;
            };
            let face = self.faces.get(pface.face)?;
            let verts = self.chain_vertices_ordered(ChainKey::EdgeLoop(face.boundary))?;
            let Some(&first) = verts.first() else {
                continue;
            };
            let p = self.vertex_position(first)?;
            let sign = f64::from(pface.orientation.sign().unwrap_or(1));
            total += sign * p.coords.dot(&area);
        }

        Some(total / 3.0)
    }

    /// Axis-aligned bounds of every vertex of `key`.
    pub fn geometry_bounds(&self, key: GeometryKey) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut verts = self.geometry_vertices(key).into_iter();
        let first = self.vertex_position(verts.next()?)?;
        let (mut min, mut max) = (first, first);
        for vk in verts {
            let p = self.vertex_position(vk)?;
            min = min.inf(&p);
            max = max.sup(&p);
        }
        Some((min, max))
    }

    /// Placement of a proxy geometry: translation to its vertex, then its
    /// rotation, then its size as non-uniform scale.
    pub fn proxy_transform(&self, key: ProxyKey) -> Option<Matrix4<f64>> {
        let proxy = self.proxies.get(key)?;
        let origin = self.vertex_position(proxy.vertex)?;
        Some(
            Matrix4::new_translation(&origin.coords)
                * proxy.rotation.to_homogeneous()
                * Matrix4::new_nonuniform_scaling(&proxy.size),
        )
    }
}
