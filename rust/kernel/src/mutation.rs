// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Edits of positions and topological links.
//!
//! Each edit detaches the old back-reference, attaches the new one and
//! records change notifications for the entity and everything containing it.
//! Outside a batch, chain continuity is checked before the edit takes effect
//! (or the edit is reverted), so a failing call leaves the model unchanged.
//! Inside a batch the check runs when the outermost batch commits.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::error::{Error, Result};
use crate::events::{Property, PropertyTarget};
use crate::keys::*;
use crate::model::*;

impl GeometryModel {
    // --- Vertex ---

    /// Moves a vertex. Every containing entity receives one geometry-changed
    /// notification.
    pub fn set_vertex_position(&mut self, vertex: VertexKey, position: Point3<f64>) -> Result<()> {
        self.ensure_in_model(vertex.into())?;
        if let Some(v) = self.vertices.get_mut(vertex) {
            if v.position == position {
                return Ok(());
            }
            v.position = position;
        }
        self.record_shape_changed(vertex.into());
        self.finish_operation()
    }

    // --- Edge ---

    /// Replaces the start (`slot == 0`) or end (`slot == 1`) vertex of an edge.
    pub fn set_edge_vertex(&mut self, edge: EdgeKey, slot: usize, vertex: VertexKey) -> Result<()> {
        self.ensure_in_model(edge.into())?;
        if slot > 1 {
            return Err(Error::IndexOutOfRange { index: slot, len: 2 });
        }
        self.ensure_reference(vertex.into())?;
        let Some(current) = self.edges.get(edge).map(|e| e.vertices) else {
            return Err(Error::NotFound(edge.into()));
        };
        if current[slot] == vertex {
            return Ok(());
        }
        if current[1 - slot] == vertex {
            return Err(Error::DegenerateEdge);
        }

        let old = current[slot];
        self.swap_edge_vertex(edge, slot, old, vertex);

        let chains = self.edge_chains(edge);
        if let Err(err) = self.refresh_chains(&chains) {
            self.swap_edge_vertex(edge, slot, vertex, old);
            // Re-derives the previous links and orientations. It only fails if
            // a chain was already broken before this edit, which stays as is.
            let _ = self.refresh_chains(&chains);
            return Err(err);
        }

        self.record_structure_changed(edge.into(), true);
        self.finish_operation()
    }

    fn swap_edge_vertex(&mut self, edge: EdgeKey, slot: usize, old: VertexKey, new: VertexKey) {
        self.detach_vertex_edge(old, edge);
        if let Some(e) = self.edges.get_mut(edge) {
            e.vertices[slot] = new;
        }
        self.attach_vertex_edge(new, edge);
    }

    /// Re-derives the given chains. Inside a batch the validation is deferred
    /// to the commit; outside, the first failure is returned.
    fn refresh_chains(&mut self, chains: &[ChainKey]) -> Result<()> {
        let deferred = self.is_batch_running();
        let mut first_error = None;
        for &chain in chains {
            let result = self.refresh_chain(chain);
            if deferred {
                self.defer_chain_validation(chain);
            } else if let Err(err) = result {
                if self.config.handle_consistency && first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // --- Edge loops and polylines ---

    /// Replaces the whole edge sequence of a loop or polyline.
    pub fn set_chain_edges(&mut self, chain: ChainKey, edges: &[EdgeKey]) -> Result<()> {
        self.ensure_in_model(chain.into())?;
        self.apply_chain_edges(chain, edges.to_vec())
    }

    /// Replaces the edge at `index`.
    pub fn replace_chain_edge(&mut self, chain: ChainKey, index: usize, edge: EdgeKey) -> Result<()> {
        let mut edges = self.current_chain_edges(chain)?;
        let len = edges.len();
        let slot = edges
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        *slot = edge;
        self.apply_chain_edges(chain, edges)
    }

    /// Inserts an edge before `index` (`index == len` appends).
    pub fn insert_chain_edge(&mut self, chain: ChainKey, index: usize, edge: EdgeKey) -> Result<()> {
        let mut edges = self.current_chain_edges(chain)?;
        if index > edges.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: edges.len(),
            });
        }
        edges.insert(index, edge);
        self.apply_chain_edges(chain, edges)
    }

    /// Removes the edge at `index`.
    pub fn remove_chain_edge(&mut self, chain: ChainKey, index: usize) -> Result<()> {
        let mut edges = self.current_chain_edges(chain)?;
        if index >= edges.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: edges.len(),
            });
        }
        edges.remove(index);
        self.apply_chain_edges(chain, edges)
    }

    fn current_chain_edges(&self, chain: ChainKey) -> Result<Vec<EdgeKey>> {
        self.ensure_in_model(chain.into())?;
        self.chain_edges(chain).ok_or(Error::NotFound(chain.into()))
    }

    fn apply_chain_edges(&mut self, chain: ChainKey, edges: Vec<EdgeKey>) -> Result<()> {
        for &ek in &edges {
            self.ensure_reference(ek.into())?;
        }
        if !self.is_batch_running() {
            self.check_chain_edges(chain, &edges)?;
        }

        let old = self.chain_pedges(chain).map(<[_]>::to_vec).unwrap_or_default();
        let mut pedges = Vec::with_capacity(edges.len());

        // Existing PEdges are reused position by position.
        for (i, &edge) in edges.iter().enumerate() {
            match old.get(i) {
                Some(&pk) => {
                    if self.pedges.get(pk).is_some_and(|p| p.edge != edge) {
                        self.detach_pedge(pk);
                        if let Some(p) = self.pedges.get_mut(pk) {
                            p.edge = edge;
                        }
                        self.attach_pedge(pk);
                    }
                    pedges.push(pk);
                }
                None => {
                    let pk = self.pedges.insert(PEdgeData {
                        edge,
                        orientation: Orientation::Undefined,
                        parent: chain,
                        next: None,
                        prev: None,
                    });
                    self.attach_pedge(pk);
                    pedges.push(pk);
                }
            }
        }
        for &pk in old.iter().skip(edges.len()) {
            self.detach_pedge(pk);
            self.pedges.remove(pk);
        }
        if let Some(list) = self.chain_pedges_mut(chain) {
            *list = pedges;
        }

        self.refresh_chains(&[chain])?;
        self.record_structure_changed(chain.into(), true);
        self.finish_operation()
    }

    // --- Faces ---

    /// Replaces the boundary loop of a face.
    pub fn set_face_boundary(&mut self, face: FaceKey, boundary: EdgeLoopKey) -> Result<()> {
        self.ensure_in_model(face.into())?;
        self.ensure_reference(boundary.into())?;
        let Some(data) = self.faces.get(face) else {
            return Err(Error::NotFound(face.into()));
        };
        if data.boundary == boundary {
            return Ok(());
        }
        if data.holes.contains(&boundary) {
            return Err(Error::Duplicate(boundary.into()));
        }
        let old = data.boundary;

        self.detach_loop_face(old, face);
        if let Some(f) = self.faces.get_mut(face) {
            f.boundary = boundary;
        }
        self.attach_loop_face(boundary, face);

        self.record_structure_changed(face.into(), true);
        self.finish_operation()
    }

    /// Appends a hole loop to a face.
    pub fn add_face_hole(&mut self, face: FaceKey, hole: EdgeLoopKey) -> Result<()> {
        self.ensure_in_model(face.into())?;
        self.ensure_reference(hole.into())?;
        if self.faces.get(face).is_some_and(|f| f.loops().any(|l| l == hole)) {
            return Err(Error::Duplicate(hole.into()));
        }

        if let Some(f) = self.faces.get_mut(face) {
            f.holes.push(hole);
        }
        self.attach_loop_face(hole, face);

        self.record_structure_changed(face.into(), true);
        self.finish_operation()
    }

    /// Removes the hole at `index` from a face and returns it.
    pub fn remove_face_hole(&mut self, face: FaceKey, index: usize) -> Result<EdgeLoopKey> {
        self.ensure_in_model(face.into())?;
        let len = self.faces.get(face).map_or(0, |f| f.holes.len());
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }

        let Some(hole) = self.faces.get_mut(face).map(|f| f.holes.remove(index)) else {
            return Err(Error::NotFound(face.into()));
        };
        self.detach_loop_face(hole, face);

        self.record_structure_changed(face.into(), true);
        self.finish_operation()?;
        Ok(hole)
    }

    /// Sets the orientation of a face relative to its boundary loop.
    pub fn set_face_orientation(&mut self, face: FaceKey, orientation: Orientation) -> Result<()> {
        self.ensure_in_model(face.into())?;
        if let Some(f) = self.faces.get_mut(face) {
            if f.orientation == orientation {
                return Ok(());
            }
            f.orientation = orientation;
        }
        self.record_structure_changed(face.into(), false);
        self.finish_operation()
    }

    // --- Volumes ---

    /// Adds faces to a volume; orientations are propagated again.
    pub fn add_volume_faces(&mut self, volume: VolumeKey, faces: &[FaceKey]) -> Result<()> {
        self.ensure_in_model(volume.into())?;
        let existing = self.volume_faces(volume).unwrap_or_default();
        for (i, &fk) in faces.iter().enumerate() {
            self.ensure_reference(fk.into())?;
            if existing.contains(&fk) || faces[..i].contains(&fk) {
                return Err(Error::Duplicate(fk.into()));
            }
        }
        if faces.is_empty() {
            return Ok(());
        }

        for &face in faces {
            let pk = self.pfaces.insert(PFaceData {
                face,
                volume,
                orientation: Orientation::Undefined,
            });
            if let Some(v) = self.volumes.get_mut(volume) {
                v.pfaces.push(pk);
            }
            self.attach_pface(pk);
        }

        self.record_structure_changed(volume.into(), true);
        self.finish_operation()
    }

    /// Removes the face at `index` from a volume and returns it. A volume
    /// keeps at least one face.
    pub fn remove_volume_face(&mut self, volume: VolumeKey, index: usize) -> Result<FaceKey> {
        self.ensure_in_model(volume.into())?;
        let len = self.volumes.get(volume).map_or(0, |v| v.pfaces.len());
        if index >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        if len == 1 {
            return Err(Error::TooFewElements {
                what: "volume",
                min: 1,
                found: 0,
            });
        }

        let Some(pk) = self.volumes.get_mut(volume).map(|v| v.pfaces.remove(index)) else {
            return Err(Error::NotFound(volume.into()));
        };
        self.detach_pface(pk);
        let face = self.pfaces.remove(pk).map(|p| p.face);

        self.record_structure_changed(volume.into(), true);
        self.finish_operation()?;
        face.ok_or(Error::NotFound(volume.into()))
    }

    /// Replaces the face at `index` of a volume.
    pub fn replace_volume_face(&mut self, volume: VolumeKey, index: usize, face: FaceKey) -> Result<()> {
        self.ensure_in_model(volume.into())?;
        self.ensure_reference(face.into())?;
        let existing = self.volume_faces(volume).unwrap_or_default();
        if index >= existing.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: existing.len(),
            });
        }
        if existing[index] == face {
            return Ok(());
        }
        if existing.contains(&face) {
            return Err(Error::Duplicate(face.into()));
        }

        let Some(pk) = self.volumes.get(volume).map(|v| v.pfaces[index]) else {
            return Err(Error::NotFound(volume.into()));
        };
        self.detach_pface(pk);
        if let Some(p) = self.pfaces.get_mut(pk) {
            p.face = face;
            p.orientation = Orientation::Undefined;
        }
        self.attach_pface(pk);

        self.record_structure_changed(volume.into(), true);
        self.finish_operation()
    }

    // --- Proxy geometry ---

    /// Attaches a proxy geometry to another vertex.
    pub fn set_proxy_vertex(&mut self, proxy: ProxyKey, vertex: VertexKey) -> Result<()> {
        self.ensure_in_model(proxy.into())?;
        self.ensure_reference(vertex.into())?;
        if self.proxies.get(proxy).is_some_and(|p| p.vertex == vertex) {
            return Ok(());
        }

        self.unlink_proxy(proxy);
        if let Some(p) = self.proxies.get_mut(proxy) {
            p.vertex = vertex;
        }
        self.link_proxy(proxy);

        self.record_structure_changed(proxy.into(), true);
        self.finish_operation()
    }

    /// Sets the size and rotation of a proxy geometry.
    pub fn set_proxy_transform(
        &mut self,
        proxy: ProxyKey,
        size: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
    ) -> Result<()> {
        self.ensure_in_model(proxy.into())?;
        if let Some(p) = self.proxies.get_mut(proxy) {
            p.size = size;
            p.rotation = rotation;
        }
        self.record_shape_changed(proxy.into());
        self.finish_operation()
    }

    pub fn set_proxy_mesh(&mut self, proxy: ProxyKey, mesh: Option<ProxyMesh>) -> Result<()> {
        self.ensure_in_model(proxy.into())?;
        if let Some(p) = self.proxies.get_mut(proxy) {
            p.mesh = mesh;
        }
        self.record_shape_changed(proxy.into());
        self.finish_operation()
    }

    // --- Properties ---

    /// Renames an entity. Emits an immediate property notification.
    pub fn set_geometry_name(&mut self, key: GeometryKey, name: &str) -> Result<()> {
        let common = self.common_mut(key).ok_or(Error::NotFound(key))?;
        if common.name == name {
            return Ok(());
        }
        common.name = name.to_string();
        self.emit_property(PropertyTarget::Geometry(key), Property::Name);
        Ok(())
    }
}
