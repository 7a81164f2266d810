// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Convenience builders composing the primitive constructors.
//!
//! Faces built from vertex lists reuse any edge that already connects two
//! consecutive vertices, so adjacent faces share their edges and volumes built
//! from them can be oriented.

use nalgebra::Point3;

use crate::error::{Error, Result};
use crate::keys::*;
use crate::model::{GeometryModel, Orientation};

/// Corner indices of the six box faces, wound so that normals point outwards.
/// Corner `i` sits at `(x[i & 1], y[(i >> 1) & 1], z[(i >> 2) & 1])`.
const BOX_FACES: [[usize; 4]; 6] = [
    [0, 2, 3, 1], // bottom, -Z
    [4, 5, 7, 6], // top, +Z
    [0, 1, 5, 4], // front, -Y
    [2, 6, 7, 3], // back, +Y
    [0, 4, 6, 2], // left, -X
    [1, 3, 7, 5], // right, +X
];

impl GeometryModel {
    /// Creates a closed edge loop through `vertices`, reusing existing edges.
    pub fn add_edge_loop_by_vertices(
        &mut self,
        layer: LayerKey,
        name: &str,
        vertices: &[VertexKey],
    ) -> Result<EdgeLoopKey> {
        if vertices.len() < 3 {
            return Err(Error::TooFewElements {
                what: "edge loop",
                min: 3,
                found: vertices.len(),
            });
        }
        self.batch(|m| {
            let mut edges = Vec::with_capacity(vertices.len());
            for i in 0..vertices.len() {
                let (a, b) = (vertices[i], vertices[(i + 1) % vertices.len()]);
                let edge = match m.edge_between(a, b) {
                    Some(existing) => existing,
                    None => m.add_edge(layer, "", [a, b])?,
                };
                edges.push(edge);
            }
            m.add_edge_loop(layer, name, &edges)
        })
    }

    /// Creates a forward face bounded by a loop through `vertices`.
    pub fn add_face_by_vertices(
        &mut self,
        layer: LayerKey,
        name: &str,
        vertices: &[VertexKey],
    ) -> Result<FaceKey> {
        self.batch(|m| {
            let boundary = m.add_edge_loop_by_vertices(layer, "", vertices)?;
            m.add_face(layer, name, boundary, &[], Orientation::Forward)
        })
    }

    /// Creates an axis-aligned box volume from its min/max corners.
    ///
    /// The box has 8 vertices, 12 shared edges and 6 outward-wound faces.
    pub fn make_box(
        &mut self,
        layer: LayerKey,
        name: &str,
        min: Point3<f64>,
        max: Point3<f64>,
    ) -> Result<(VolumeKey, [FaceKey; 6])> {
        self.batch(|m| {
            let xs = [min.x, max.x];
            let ys = [min.y, max.y];
            let zs = [min.z, max.z];
            let mut corners = Vec::with_capacity(8);
            for i in 0..8 {
                let p = Point3::new(xs[i & 1], ys[(i >> 1) & 1], zs[(i >> 2) & 1]);
                corners.push(m.add_vertex(layer, "", p)?);
            }

            let mut faces = [FaceKey::default(); 6];
            for (slot, indices) in faces.iter_mut().zip(BOX_FACES) {
                let ring = indices.map(|i| corners[i]);
                *slot = m.add_face_by_vertices(layer, "", &ring)?;
            }

            let volume = m.add_volume(layer, name, &faces)?;
            Ok((volume, faces))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn face_by_vertices_shares_edges() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        let v: Vec<VertexKey> = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [2.0, 0.5]]
            .iter()
            .map(|c| model.add_vertex(layer, "", Point3::new(c[0], c[1], 0.0)).unwrap())
            .collect();

        model.add_face_by_vertices(layer, "a", &v[..4]).unwrap();
        model
            .add_face_by_vertices(layer, "b", &[v[1], v[4], v[2]])
            .unwrap();

        assert_eq!(model.face_count(), 2);
        assert_eq!(model.edge_count(), 6);
        let shared = model.edge_between(v[1], v[2]).unwrap();
        assert_eq!(model.edge_chains(shared).len(), 2);
    }

    #[test]
    fn too_few_vertices() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        let v = model.add_vertex(layer, "", Point3::origin()).unwrap();
        assert!(model.add_face_by_vertices(layer, "", &[v, v]).is_err());
    }

    #[test]
    fn unit_box() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        let (volume, faces) = model
            .make_box(layer, "box", Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();

        assert_eq!(model.vertex_count(), 8);
        assert_eq!(model.edge_count(), 12);
        assert_eq!(model.edge_loop_count(), 6);
        assert_eq!(model.face_count(), 6);
        assert_eq!(model.is_consistent_oriented(volume), Some(true));
        assert_relative_eq!(model.volume_signed_volume(volume).unwrap(), 1.0, epsilon = 1e-12);

        let top = model.face_normal(faces[1]).unwrap();
        assert_relative_eq!(top.z, 1.0, epsilon = 1e-12);
        for &pf in &model.volume(volume).unwrap().pfaces {
            assert_eq!(model.pface(pf).unwrap().orientation, Orientation::Forward);
        }
    }

    #[test]
    fn box_is_added_in_one_batch() {
        use crate::events::tests::Recorder;
        use crate::events::ModelEvent;

        let mut model = GeometryModel::default();
        let recorder = Recorder::attach(&mut model);
        let layer = model.default_layer();
        model
            .make_box(layer, "box", Point3::origin(), Point3::new(2.0, 3.0, 4.0))
            .unwrap();

        let rec = recorder.borrow();
        assert_eq!(rec.added().len(), 1);
        assert_eq!(rec.added()[0].len(), 8 + 12 + 6 + 6 + 1);
        assert_eq!(rec.events.last(), Some(&ModelEvent::BatchOperationFinished));
    }
}
