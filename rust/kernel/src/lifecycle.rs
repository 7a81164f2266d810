// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registration of entities and their back-references.
//!
//! Removing an entity keeps its slot and forward links but detaches every
//! back-reference it contributed to other entities, drops its identifier from
//! the lookup table and takes it out of its layer. Adding it back reverses
//! each of those steps.

use crate::error::{Error, Result};
use crate::keys::*;
use crate::model::GeometryModel;

impl GeometryModel {
    /// Deregisters an entity from the model.
    ///
    /// Returns `Ok(false)` without emitting anything if the entity was already
    /// removed. Entities that still reference the removed one keep their links.
    pub fn remove_from_model(&mut self, key: GeometryKey) -> Result<bool> {
        let common = self.common(key).ok_or(Error::NotFound(key))?;
        if !common.in_model {
            return Ok(false);
        }
        let (id, layer) = (common.id, common.layer);

        let parents = self.parents(key);
        let volumes = self.dependent_volumes(key);

        self.unlink(key);
        if let Some(c) = self.common_mut(key) {
            c.in_model = false;
        }
        self.ids.remove(&id);
        if let Some(l) = self.layers.get_mut(layer) {
            l.elements.retain(|&e| e != key);
        }

        tracing::debug!(model = self.model_id.0, id, kind = %key.kind(), "Removed geometry");

        self.record_removed(key);
        for parent in parents {
            self.record_topology_changed(parent);
        }
        for volume in volumes {
            self.defer_orientation(volume);
        }
        self.finish_operation()?;
        Ok(true)
    }

    /// Registers a previously removed entity again.
    ///
    /// Adding an entity that is already registered is a usage error. The
    /// entity's identifier must still be free and every entity it references
    /// must be registered. If its layer was deleted meanwhile, it is placed on
    /// the default layer.
    pub fn add_to_model(&mut self, key: GeometryKey) -> Result<()> {
        let common = self.common(key).ok_or(Error::NotFound(key))?;
        if common.in_model {
            return Err(Error::AlreadyInModel(key));
        }
        let id = common.id;
        if self.ids.contains_key(&id) {
            return Err(Error::IdInUse(id));
        }
        for child in self.children(key) {
            self.ensure_reference(child)?;
        }
        match key {
            GeometryKey::EdgeLoop(k) => {
                let chain = ChainKey::EdgeLoop(k);
                let edges = self.chain_edges(chain).unwrap_or_default();
                self.check_chain_edges(chain, &edges)?;
            }
            GeometryKey::Polyline(k) => {
                let chain = ChainKey::Polyline(k);
                let edges = self.chain_edges(chain).unwrap_or_default();
                self.check_chain_edges(chain, &edges)?;
            }
            _ => {}
        }

        let layer = match self.common(key).map(|c| c.layer) {
            Some(l) if self.layers.contains_key(l) => l,
            _ => self.default_layer,
        };
        if let Some(c) = self.common_mut(key) {
            c.in_model = true;
            c.layer = layer;
        }
        self.link(key);
        // Continuity was checked above.
        match key {
            GeometryKey::EdgeLoop(k) => {
                let _ = self.refresh_chain(ChainKey::EdgeLoop(k));
            }
            GeometryKey::Polyline(k) => {
                let _ = self.refresh_chain(ChainKey::Polyline(k));
            }
            GeometryKey::Volume(k) => {
                self.update_volume_orientation(k);
            }
            _ => {}
        }

        self.register(key);
        for parent in self.parents(key) {
            self.record_topology_changed(parent);
        }
        for volume in self.dependent_volumes(key) {
            self.defer_orientation(volume);
        }
        self.finish_operation()
    }

    /// Adds `key` to the id table and its layer and records it as added.
    pub(crate) fn register(&mut self, key: GeometryKey) {
        let Some(common) = self.common(key) else {
            return;
        };
        let (id, layer) = (common.id, common.layer);
        self.ids.insert(id, key);
        if let Some(l) = self.layers.get_mut(layer) {
            l.elements.push(key);
        }
        self.record_added(key);
    }

    /// Entities directly referenced by `key`.
    pub(crate) fn children(&self, key: GeometryKey) -> Vec<GeometryKey> {
        match key {
            GeometryKey::Vertex(_) => Vec::new(),
            GeometryKey::Edge(k) => self
                .edges
                .get(k)
                .map(|e| e.vertices.iter().map(|&v| v.into()).collect())
                .unwrap_or_default(),
            GeometryKey::EdgeLoop(k) => self.chain_children(ChainKey::EdgeLoop(k)),
            GeometryKey::Polyline(k) => self.chain_children(ChainKey::Polyline(k)),
            GeometryKey::Face(k) => self
                .faces
                .get(k)
                .map(|f| f.loops().map(Into::into).collect())
                .unwrap_or_default(),
            GeometryKey::Volume(k) => self
                .volume_faces(k)
                .unwrap_or_default()
                .into_iter()
                .map(Into::into)
                .collect(),
            GeometryKey::Proxy(k) => self
                .proxies
                .get(k)
                .map(|p| vec![p.vertex.into()])
                .unwrap_or_default(),
        }
    }

    fn chain_children(&self, chain: ChainKey) -> Vec<GeometryKey> {
        let mut out: Vec<GeometryKey> = Vec::new();
        for ek in self.chain_edges(chain).unwrap_or_default() {
            let key = ek.into();
            if !out.contains(&key) {
                out.push(key);
            }
        }
        out
    }

    /// Registered volumes whose orientation depends on `key`.
    fn dependent_volumes(&self, key: GeometryKey) -> Vec<VolumeKey> {
        if let GeometryKey::Volume(v) = key {
            return vec![v];
        }
        self.dependents(key)
            .into_iter()
            .filter_map(|k| match k {
                GeometryKey::Volume(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    fn link(&mut self, key: GeometryKey) {
        match key {
            GeometryKey::Vertex(_) => {}
            GeometryKey::Edge(k) => self.link_edge(k),
            GeometryKey::EdgeLoop(k) => self.link_chain(ChainKey::EdgeLoop(k)),
            GeometryKey::Polyline(k) => self.link_chain(ChainKey::Polyline(k)),
            GeometryKey::Face(k) => self.link_face(k),
            GeometryKey::Volume(k) => self.link_volume(k),
            GeometryKey::Proxy(k) => self.link_proxy(k),
        }
    }

    fn unlink(&mut self, key: GeometryKey) {
        match key {
            GeometryKey::Vertex(_) => {}
            GeometryKey::Edge(k) => self.unlink_edge(k),
            GeometryKey::EdgeLoop(k) => self.unlink_chain(ChainKey::EdgeLoop(k)),
            GeometryKey::Polyline(k) => self.unlink_chain(ChainKey::Polyline(k)),
            GeometryKey::Face(k) => self.unlink_face(k),
            GeometryKey::Volume(k) => self.unlink_volume(k),
            GeometryKey::Proxy(k) => self.unlink_proxy(k),
        }
    }

    // --- Back-reference maintenance ---

    pub(crate) fn link_edge(&mut self, edge: EdgeKey) {
        let Some(vertices) = self.edges.get(edge).map(|e| e.vertices) else {
            return;
        };
        for v in vertices {
            self.attach_vertex_edge(v, edge);
        }
    }

    pub(crate) fn unlink_edge(&mut self, edge: EdgeKey) {
        let Some(vertices) = self.edges.get(edge).map(|e| e.vertices) else {
            return;
        };
        for v in vertices {
            self.detach_vertex_edge(v, edge);
        }
    }

    pub(crate) fn attach_vertex_edge(&mut self, vertex: VertexKey, edge: EdgeKey) {
        if let Some(v) = self.vertices.get_mut(vertex) {
            if !v.edges.contains(&edge) {
                v.edges.push(edge);
            }
        }
    }

    pub(crate) fn detach_vertex_edge(&mut self, vertex: VertexKey, edge: EdgeKey) {
        if let Some(v) = self.vertices.get_mut(vertex) {
            v.edges.retain(|&e| e != edge);
        }
    }

    pub(crate) fn link_chain(&mut self, chain: ChainKey) {
        let pedges = self.chain_pedges(chain).map(<[_]>::to_vec).unwrap_or_default();
        for pk in pedges {
            self.attach_pedge(pk);
        }
    }

    pub(crate) fn unlink_chain(&mut self, chain: ChainKey) {
        let pedges = self.chain_pedges(chain).map(<[_]>::to_vec).unwrap_or_default();
        for pk in pedges {
            self.detach_pedge(pk);
        }
    }

    /// Adds a PEdge to the placement list of its edge.
    pub(crate) fn attach_pedge(&mut self, pedge: PEdgeKey) {
        let Some(edge) = self.pedges.get(pedge).map(|p| p.edge) else {
            return;
        };
        if let Some(e) = self.edges.get_mut(edge) {
            if !e.pedges.contains(&pedge) {
                e.pedges.push(pedge);
            }
        }
    }

    pub(crate) fn detach_pedge(&mut self, pedge: PEdgeKey) {
        let Some(edge) = self.pedges.get(pedge).map(|p| p.edge) else {
            return;
        };
        if let Some(e) = self.edges.get_mut(edge) {
            e.pedges.retain(|&p| p != pedge);
        }
    }

    pub(crate) fn link_face(&mut self, face: FaceKey) {
        let loops: Vec<EdgeLoopKey> = match self.faces.get(face) {
            Some(f) => f.loops().collect(),
            None => return,
        };
        for lk in loops {
            self.attach_loop_face(lk, face);
        }
    }

    pub(crate) fn unlink_face(&mut self, face: FaceKey) {
        let loops: Vec<EdgeLoopKey> = match self.faces.get(face) {
            Some(f) => f.loops().collect(),
            None => return,
        };
        for lk in loops {
            self.detach_loop_face(lk, face);
        }
    }

    pub(crate) fn attach_loop_face(&mut self, edge_loop: EdgeLoopKey, face: FaceKey) {
        if let Some(l) = self.edge_loops.get_mut(edge_loop) {
            if !l.faces.contains(&face) {
                l.faces.push(face);
            }
        }
    }

    pub(crate) fn detach_loop_face(&mut self, edge_loop: EdgeLoopKey, face: FaceKey) {
        if let Some(l) = self.edge_loops.get_mut(edge_loop) {
            l.faces.retain(|&f| f != face);
        }
    }

    pub(crate) fn link_volume(&mut self, volume: VolumeKey) {
        let pfaces = self
            .volumes
            .get(volume)
            .map(|v| v.pfaces.clone())
            .unwrap_or_default();
        for pk in pfaces {
            self.attach_pface(pk);
        }
    }

    pub(crate) fn unlink_volume(&mut self, volume: VolumeKey) {
        let pfaces = self
            .volumes
            .get(volume)
            .map(|v| v.pfaces.clone())
            .unwrap_or_default();
        for pk in pfaces {
            self.detach_pface(pk);
        }
    }

    pub(crate) fn attach_pface(&mut self, pface: PFaceKey) {
        let Some(face) = self.pfaces.get(pface).map(|p| p.face) else {
            return;
        };
        if let Some(f) = self.faces.get_mut(face) {
            if !f.pfaces.contains(&pface) {
                f.pfaces.push(pface);
            }
        }
    }

    pub(crate) fn detach_pface(&mut self, pface: PFaceKey) {
        let Some(face) = self.pfaces.get(pface).map(|p| p.face) else {
            return;
        };
        if let Some(f) = self.faces.get_mut(face) {
            f.pfaces.retain(|&p| p != pface);
        }
    }

    pub(crate) fn link_proxy(&mut self, proxy: ProxyKey) {
        let Some(vertex) = self.proxies.get(proxy).map(|p| p.vertex) else {
            return;
        };
        if let Some(v) = self.vertices.get_mut(vertex) {
            if !v.proxies.contains(&proxy) {
                v.proxies.push(proxy);
            }
        }
    }

    pub(crate) fn unlink_proxy(&mut self, proxy: ProxyKey) {
        let Some(vertex) = self.proxies.get(proxy).map(|p| p.vertex) else {
            return;
        };
        if let Some(v) = self.vertices.get_mut(vertex) {
            v.proxies.retain(|&p| p != proxy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::Recorder;
    use crate::events::ModelEvent;
    use crate::model::Orientation;
    use nalgebra::Point3;

    fn triangle_face(model: &mut GeometryModel) -> ([VertexKey; 3], [EdgeKey; 3], EdgeLoopKey, FaceKey) {
        let layer = model.default_layer();
        let v = [
            model.add_vertex(layer, "v0", Point3::new(0.0, 0.0, 0.0)).unwrap(),
            model.add_vertex(layer, "v1", Point3::new(1.0, 0.0, 0.0)).unwrap(),
            model.add_vertex(layer, "v2", Point3::new(0.0, 1.0, 0.0)).unwrap(),
        ];
        let e = [
            model.add_edge(layer, "e0", [v[0], v[1]]).unwrap(),
            model.add_edge(layer, "e1", [v[1], v[2]]).unwrap(),
            model.add_edge(layer, "e2", [v[2], v[0]]).unwrap(),
        ];
        let lk = model.add_edge_loop(layer, "loop", &e).unwrap();
        let fk = model.add_face(layer, "face", lk, &[], Orientation::Forward).unwrap();
        (v, e, lk, fk)
    }

    #[test]
    fn removal_is_idempotent() {
        let mut model = GeometryModel::default();
        let (v, ..) = triangle_face(&mut model);
        let recorder = Recorder::attach(&mut model);

        assert!(model.remove_from_model(v[0].into()).unwrap());
        let after_first = recorder.borrow().events.len();
        assert!(after_first > 0);

        assert!(!model.remove_from_model(v[0].into()).unwrap());
        assert_eq!(recorder.borrow().events.len(), after_first);
    }

    #[test]
    fn removed_entity_is_not_found_by_id() {
        let mut model = GeometryModel::default();
        let (_, e, ..) = triangle_face(&mut model);
        let id = model.geometry_id(e[0].into()).unwrap();
        model.remove_from_model(e[0].into()).unwrap();

        assert_eq!(model.geometry_from_id(id), None);
        assert!(!model.contains_geometry(e[0].into()));
        assert!(model.edge(e[0]).is_some());
        assert!(!model
            .layer(model.default_layer())
            .unwrap()
            .elements
            .contains(&e[0].into()));
    }

    #[test]
    fn removing_an_edge_detaches_it_from_its_vertices() {
        let mut model = GeometryModel::default();
        let (v, e, ..) = triangle_face(&mut model);
        model.remove_from_model(e[0].into()).unwrap();
        assert_eq!(model.vertex_edges(v[0]), &[e[2]]);
        assert_eq!(model.vertex_edges(v[1]), &[e[1]]);
        assert_eq!(model.edge_between(v[0], v[1]), None);
    }

    #[test]
    fn removing_a_loop_detaches_its_pedges() {
        let mut model = GeometryModel::default();
        let (_, e, lk, _) = triangle_face(&mut model);
        let recorder = Recorder::attach(&mut model);
        model.remove_from_model(lk.into()).unwrap();
        assert!(model.edge(e[0]).unwrap().pedges.is_empty());
        assert!(model.edge_chains(e[0]).is_empty());
        // The face using the loop sees a topology change.
        let rec = recorder.borrow();
        assert_eq!(rec.events[0], ModelEvent::GeometryRemoved(vec![lk.into()]));
    }

    #[test]
    fn re_adding_restores_back_references() {
        let mut model = GeometryModel::default();
        let (_, _, lk, fk) = triangle_face(&mut model);
        model.remove_from_model(fk.into()).unwrap();
        assert!(model.edge_loop_faces(lk).is_empty());

        model.add_to_model(fk.into()).unwrap();
        assert_eq!(model.edge_loop_faces(lk), &[fk]);
        assert!(model.contains_geometry(fk.into()));
        let id = model.geometry_id(fk.into()).unwrap();
        assert_eq!(model.geometry_from_id(id), Some(fk.into()));
    }

    #[test]
    fn adding_a_registered_entity_is_fatal() {
        let mut model = GeometryModel::default();
        let (v, ..) = triangle_face(&mut model);
        let err = model.add_to_model(v[0].into()).unwrap_err();
        assert!(matches!(err, Error::AlreadyInModel(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Fatal);
    }

    #[test]
    fn re_adding_requires_registered_children() {
        let mut model = GeometryModel::default();
        let (v, e, ..) = triangle_face(&mut model);
        model.remove_from_model(e[0].into()).unwrap();
        model.remove_from_model(v[0].into()).unwrap();
        assert!(matches!(
            model.add_to_model(e[0].into()),
            Err(Error::DetachedReference(_))
        ));
        model.add_to_model(v[0].into()).unwrap();
        model.add_to_model(e[0].into()).unwrap();
        assert_eq!(model.edge_between(v[0], v[1]), Some(e[0]));
    }

    #[test]
    fn re_added_entity_falls_back_to_default_layer() {
        let mut model = GeometryModel::default();
        let layer = model.add_layer("walls", None).unwrap();
        let v = model.add_vertex(layer, "v", Point3::origin()).unwrap();
        model.remove_from_model(v.into()).unwrap();
        model.remove_layer(layer).unwrap();

        model.add_to_model(v.into()).unwrap();
        assert_eq!(model.vertex(v).unwrap().common.layer, model.default_layer());
    }
}
