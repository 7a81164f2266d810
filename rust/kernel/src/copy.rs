// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Whole-model copies and replacement.

use rustc_hash::FxHashMap;

use crate::events::{BatchState, ModelEvent};
use crate::keys::*;
use crate::model::*;

/// Old-key to new-key tables built while copying.
#[derive(Default)]
struct KeyMap {
    layers: FxHashMap<LayerKey, LayerKey>,
    vertices: FxHashMap<VertexKey, VertexKey>,
    edges: FxHashMap<EdgeKey, EdgeKey>,
    edge_loops: FxHashMap<EdgeLoopKey, EdgeLoopKey>,
    polylines: FxHashMap<PolylineKey, PolylineKey>,
    faces: FxHashMap<FaceKey, FaceKey>,
    volumes: FxHashMap<VolumeKey, VolumeKey>,
    proxies: FxHashMap<ProxyKey, ProxyKey>,
}

impl KeyMap {
    fn geometry(&self, key: GeometryKey) -> Option<GeometryKey> {
        Some(match key {
            GeometryKey::Vertex(k) => GeometryKey::Vertex(*self.vertices.get(&k)?),
            GeometryKey::Edge(k) => GeometryKey::Edge(*self.edges.get(&k)?),
            GeometryKey::EdgeLoop(k) => GeometryKey::EdgeLoop(*self.edge_loops.get(&k)?),
            GeometryKey::Polyline(k) => GeometryKey::Polyline(*self.polylines.get(&k)?),
            GeometryKey::Face(k) => GeometryKey::Face(*self.faces.get(&k)?),
            GeometryKey::Volume(k) => GeometryKey::Volume(*self.volumes.get(&k)?),
            GeometryKey::Proxy(k) => GeometryKey::Proxy(*self.proxies.get(&k)?),
        })
    }

    fn chain(&self, key: ChainKey) -> Option<ChainKey> {
        Some(match key {
            ChainKey::EdgeLoop(k) => ChainKey::EdgeLoop(*self.edge_loops.get(&k)?),
            ChainKey::Polyline(k) => ChainKey::Polyline(*self.polylines.get(&k)?),
        })
    }
}

impl GeometryModel {
    /// Creates an independent copy of the whole graph.
    ///
    /// The copy has a new model id and freshly allocated entity identifiers.
    /// Topology, layers, visibility and colors are preserved, removed entities
    /// stay removed. Observers are not copied.
    pub fn clone_model(&self) -> GeometryModel {
        let mut out = GeometryModel::new(self.config.clone());
        out.is_visible = self.is_visible;
        let mut map = KeyMap::default();

        // Layers, parents before children.
        out.layers.clear();
        out.root_layers.clear();
        for &root in &self.root_layers {
            for old in self.layer_subtree(root) {
                let Some(data) = self.layers.get(old) else {
                    continue;
                };
                let parent = data.parent.and_then(|p| map.layers.get(&p).copied());
                let key = out.layers.insert(LayerData {
                    name: data.name.clone(),
                    parent,
                    children: Vec::new(),
                    is_visible: data.is_visible,
                    color: data.color,
                    elements: Vec::new(),
                });
                match parent.and_then(|p| out.layers.get_mut(p)) {
                    Some(p) => p.children.push(key),
                    None => out.root_layers.push(key),
                }
                map.layers.insert(old, key);
            }
        }
        let default_layer = map.layers[&self.default_layer];
        out.default_layer = default_layer;

        let layer_map = map.layers.clone();
        let common = |out: &mut GeometryModel, c: &GeometryCommon| GeometryCommon {
            id: out.next_id_unchecked(),
            name: c.name.clone(),
            layer: layer_map.get(&c.layer).copied().unwrap_or(default_layer),
            is_visible: c.is_visible,
            color: c.color,
            in_model: c.in_model,
        };

        for (old, v) in &self.vertices {
            let data = VertexData {
                common: common(&mut out, &v.common),
                position: v.position,
                edges: Vec::new(),
                proxies: Vec::new(),
            };
            map.vertices.insert(old, out.vertices.insert(data));
        }

        for (old, e) in &self.edges {
            let data = EdgeData {
                common: common(&mut out, &e.common),
                vertices: e.vertices.map(|v| map.vertices[&v]),
                pedges: Vec::new(),
            };
            map.edges.insert(old, out.edges.insert(data));
        }

        for (old, l) in &self.edge_loops {
            let data = EdgeLoopData {
                common: common(&mut out, &l.common),
                pedges: Vec::new(),
                faces: Vec::new(),
            };
            map.edge_loops.insert(old, out.edge_loops.insert(data));
        }

        for (old, p) in &self.polylines {
            let data = PolylineData {
                common: common(&mut out, &p.common),
                pedges: Vec::new(),
            };
            map.polylines.insert(old, out.polylines.insert(data));
        }

        // PEdges, then their next/prev links.
        let mut pedge_map: FxHashMap<PEdgeKey, PEdgeKey> = FxHashMap::default();
        let chains = self
            .edge_loops
            .keys()
            .map(ChainKey::EdgeLoop)
            .chain(self.polylines.keys().map(ChainKey::Polyline));
        for old_chain in chains {
            let Some(new_chain) = map.chain(old_chain) else {
                continue;
            };
            let old_pedges = self.chain_pedges(old_chain).unwrap_or_default();
            let mut new_pedges = Vec::with_capacity(old_pedges.len());
            for &pk in old_pedges {
                let Some(p) = self.pedges.get(pk) else {
                    continue;
                };
                let key = out.pedges.insert(PEdgeData {
                    edge: map.edges[&p.edge],
                    orientation: p.orientation,
                    parent: new_chain,
                    next: None,
                    prev: None,
                });
                pedge_map.insert(pk, key);
                new_pedges.push(key);
            }
            if let Some(list) = out.chain_pedges_mut(new_chain) {
                *list = new_pedges;
            }
        }
        for (&old, &new) in &pedge_map {
            if let (Some(src), Some(dst)) = (self.pedges.get(old), out.pedges.get_mut(new)) {
                dst.next = src.next.and_then(|n| pedge_map.get(&n).copied());
                dst.prev = src.prev.and_then(|p| pedge_map.get(&p).copied());
            }
        }

        for (old, f) in &self.faces {
            let data = FaceData {
                common: common(&mut out, &f.common),
                boundary: map.edge_loops[&f.boundary],
                holes: f.holes.iter().map(|h| map.edge_loops[h]).collect(),
                orientation: f.orientation,
                pfaces: Vec::new(),
            };
            map.faces.insert(old, out.faces.insert(data));
        }

        for (old, v) in &self.volumes {
            let data = VolumeData {
                common: common(&mut out, &v.common),
                pfaces: Vec::new(),
                is_consistent_oriented: v.is_consistent_oriented,
            };
            let key = out.volumes.insert(data);
            map.volumes.insert(old, key);
            let pfaces: Vec<PFaceKey> = v
                .pfaces
                .iter()
                .filter_map(|pk| self.pfaces.get(*pk))
                .map(|p| {
                    out.pfaces.insert(PFaceData {
                        face: map.faces[&p.face],
                        volume: key,
                        orientation: p.orientation,
                    })
                })
                .collect();
            if let Some(data) = out.volumes.get_mut(key) {
                data.pfaces = pfaces;
            }
        }

        for (old, p) in &self.proxies {
            let data = ProxyData {
                common: common(&mut out, &p.common),
                vertex: map.vertices[&p.vertex],
                size: p.size,
                rotation: p.rotation,
                mesh: p.mesh.clone(),
            };
            map.proxies.insert(old, out.proxies.insert(data));
        }

        // Registration and back-references of registered entities, keeping
        // each layer's element order.
        for &root in &self.root_layers {
            for old_layer in self.layer_subtree(root) {
                let elements = self
                    .layers
                    .get(old_layer)
                    .map(|l| l.elements.as_slice())
                    .unwrap_or_default();
                for &old in elements {
                    let Some(key) = map.geometry(old) else {
                        continue;
                    };
                    if let Some(id) = out.common(key).map(|c| c.id) {
                        out.ids.insert(id, key);
                    }
                    if let Some(layer) = out.common(key).map(|c| c.layer) {
                        if let Some(l) = out.layers.get_mut(layer) {
                            l.elements.push(key);
                        }
                    }
                    out.relink(key);
                }
            }
        }

        tracing::debug!(
            source = self.model_id.0,
            model = out.model_id.0,
            geometries = out.geometry_count(),
            "Cloned geometry model"
        );
        out
    }

    /// Swaps the whole graph for `other`'s.
    ///
    /// This model keeps its model id and observers; every key obtained from it
    /// before the call is stale. Observers receive [`ModelEvent::Replaced`].
    pub fn replace(&mut self, other: GeometryModel) {
        let model_id = self.model_id;
        let observers = std::mem::take(&mut self.observers);
        *self = other;
        self.model_id = model_id;
        self.observers = observers;
        self.batch = BatchState::default();
        tracing::debug!(model = model_id.0, "Replaced geometry model");
        self.emit(ModelEvent::Replaced);
    }

    fn next_id_unchecked(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn relink(&mut self, key: GeometryKey) {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Color, DerivedColor};
    use crate::events::tests::Recorder;
    use nalgebra::Point3;

    #[test]
    fn clone_is_independent() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        let (volume, _) = model
            .make_box(layer, "box", Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();

        let mut copy = model.clone_model();
        assert_ne!(copy.model_id(), model.model_id());
        assert_eq!(copy.geometry_count(), model.geometry_count());
        assert_eq!(copy.edge_count(), 12);

        let (copied_volume, _) = copy.volumes().next().unwrap();
        assert_eq!(copy.is_consistent_oriented(copied_volume), Some(true));
        assert_eq!(copy.volume(copied_volume).unwrap().common.name, "box");

        // Editing the copy leaves the original untouched.
        let (v, _) = copy.vertices().next().unwrap();
        copy.set_vertex_position(v, Point3::new(9.0, 9.0, 9.0)).unwrap();
        assert!(model
            .vertices()
            .all(|(_, d)| d.position != Point3::new(9.0, 9.0, 9.0)));

        model.remove_volume_face(volume, 0).unwrap();
        assert_eq!(copy.is_consistent_oriented(copied_volume), Some(true));
    }

    #[test]
    fn clone_preserves_back_references() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        model
            .make_box(layer, "box", Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();
        let copy = model.clone_model();

        for (_, edge) in copy.edges() {
            assert_eq!(edge.pedges.len(), 2);
        }
        for (vk, vertex) in copy.vertices() {
            assert_eq!(vertex.edges.len(), 3);
            for &ek in &vertex.edges {
                assert!(copy.edge(ek).unwrap().contains_vertex(vk));
            }
        }
        for (lk, edge_loop) in copy.edge_loops() {
            assert_eq!(edge_loop.faces.len(), 1);
            let first = edge_loop.pedges[0];
            assert_eq!(copy.pedge(first).unwrap().parent, ChainKey::EdgeLoop(lk));
            assert_eq!(
                copy.pedge(*edge_loop.pedges.last().unwrap()).unwrap().next,
                Some(first)
            );
        }
    }

    #[test]
    fn clone_preserves_layers_and_appearance() {
        let mut model = GeometryModel::default();
        let walls = model.add_layer("walls", None).unwrap();
        let inner = model.add_layer("inner", Some(walls)).unwrap();
        model
            .set_layer_color(walls, DerivedColor::local(Color::rgb(10, 20, 30)))
            .unwrap();
        let v = model.add_vertex(inner, "v", Point3::origin()).unwrap();
        model.set_geometry_visible(v.into(), false).unwrap();
        let gone = model.add_vertex(inner, "gone", Point3::origin()).unwrap();
        model.remove_from_model(gone.into()).unwrap();

        let copy = model.clone_model();
        assert_eq!(copy.layer_count(), 3);
        assert_eq!(copy.vertex_count(), 1);
        let (cv, data) = copy.vertices().next().unwrap();
        assert_eq!(data.common.name, "v");
        assert!(!data.common.is_visible);
        assert_eq!(copy.geometry_color(cv.into()), Some(Color::rgb(10, 20, 30)));
        let layer = copy.layer(data.common.layer).unwrap();
        assert_eq!(layer.name, "inner");
    }

    #[test]
    fn replace_notifies_and_keeps_identity() {
        let mut model = GeometryModel::default();
        let recorder = Recorder::attach(&mut model);
        let id = model.model_id();

        let mut other = GeometryModel::default();
        let layer = other.default_layer();
        other.add_vertex(layer, "v", Point3::origin()).unwrap();

        model.replace(other);
        assert_eq!(model.model_id(), id);
        assert_eq!(model.vertex_count(), 1);
        assert_eq!(recorder.borrow().events.last(), Some(&ModelEvent::Replaced));
    }
}
