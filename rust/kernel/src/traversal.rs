// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Traversal methods for navigating the geometry graph.
//!
//! Supports both downward traversal (volume → faces → loops → edges →
//! vertices) and upward traversal (vertex → edges → chains → faces → volumes)
//! through the back-reference lists. Upward traversal only ever sees
//! registered entities, because removing an entity detaches its
//! back-references.

use rustc_hash::FxHashSet;

use crate::keys::*;
use crate::model::GeometryModel;

// =============================================================================
// Downward traversal: extract sub-topologies
// =============================================================================

impl GeometryModel {
    /// Returns the vertices of a chain in traversal order.
    ///
    /// For a loop this lists each vertex once; for a polyline it includes the
    /// final end vertex. Edges with undefined orientation are read forward.
    pub fn chain_vertices_ordered(&self, chain: ChainKey) -> Option<Vec<VertexKey>> {
        let pedges = self.chain_pedges(chain)?;
        let mut vertices = Vec::with_capacity(pedges.len() + 1);

        for &pk in pedges {
            let p = self.pedges.get(pk)?;
            let edge = self.edges.get(p.edge)?;
            vertices.push(edge.start(p.orientation));
        }

        if !chain.is_closed() {
            let &last = pedges.last()?;
            let p = self.pedges.get(last)?;
            vertices.push(self.edges.get(p.edge)?.end(p.orientation));
        }

        Some(vertices)
    }

    /// Returns all unique vertices referenced by a chain.
    pub fn chain_vertices(&self, chain: ChainKey) -> Option<FxHashSet<VertexKey>> {
        let mut set = FxHashSet::default();
        for ek in self.chain_edges(chain)? {
            let edge = self.edges.get(ek)?;
            set.extend(edge.vertices);
        }
        Some(set)
    }

    /// Returns all unique edges of a face (boundary and holes).
    pub fn face_edges(&self, key: FaceKey) -> Option<FxHashSet<EdgeKey>> {
        let face = self.faces.get(key)?;
        let mut set = FxHashSet::default();
        for lk in face.loops() {
            if let Some(edges) = self.chain_edges(ChainKey::EdgeLoop(lk)) {
                set.extend(edges);
            }
        }
        Some(set)
    }

    /// Returns all unique vertices of a face.
    pub fn face_vertices(&self, key: FaceKey) -> Option<FxHashSet<VertexKey>> {
        let face = self.faces.get(key)?;
        let mut set = FxHashSet::default();
        for lk in face.loops() {
            if let Some(verts) = self.chain_vertices(ChainKey::EdgeLoop(lk)) {
                set.extend(verts);
            }
        }
        Some(set)
    }

    /// Returns the faces of a volume in placement order.
    pub fn volume_faces(&self, key: VolumeKey) -> Option<Vec<FaceKey>> {
        let volume = self.volumes.get(key)?;
        volume
            .pfaces
            .iter()
            .map(|&pk| self.pfaces.get(pk).map(|p| p.face))
            .collect()
    }

    /// Returns all unique edges of a volume.
    pub fn volume_edges(&self, key: VolumeKey) -> Option<FxHashSet<EdgeKey>> {
        let mut set = FxHashSet::default();
        for fk in self.volume_faces(key)? {
            if let Some(edges) = self.face_edges(fk) {
                set.extend(edges);
            }
        }
        Some(set)
    }

    /// Returns all unique vertices of a volume.
    pub fn volume_vertices(&self, key: VolumeKey) -> Option<FxHashSet<VertexKey>> {
        let mut set = FxHashSet::default();
        for fk in self.volume_faces(key)? {
            if let Some(verts) = self.face_vertices(fk) {
                set.extend(verts);
            }
        }
        Some(set)
    }

    /// Returns every vertex an entity is built from.
    pub fn geometry_vertices(&self, key: GeometryKey) -> Vec<VertexKey> {
        match key {
            GeometryKey::Vertex(vk) => vec![vk],
            GeometryKey::Edge(ek) => self
                .edges
                .get(ek)
                .map(|e| e.vertices.to_vec())
                .unwrap_or_default(),
            GeometryKey::EdgeLoop(lk) => self
                .chain_vertices(ChainKey::EdgeLoop(lk))
                .map(|s| s.into_iter().collect())
                .unwrap_or_default(),
            GeometryKey::Polyline(pk) => self
                .chain_vertices(ChainKey::Polyline(pk))
                .map(|s| s.into_iter().collect())
                .unwrap_or_default(),
            GeometryKey::Face(fk) => self
                .face_vertices(fk)
                .map(|s| s.into_iter().collect())
                .unwrap_or_default(),
            GeometryKey::Volume(vk) => self
                .volume_vertices(vk)
                .map(|s| s.into_iter().collect())
                .unwrap_or_default(),
            GeometryKey::Proxy(pk) => self
                .proxies
                .get(pk)
                .map(|p| vec![p.vertex])
                .unwrap_or_default(),
        }
    }
}

// =============================================================================
// Upward traversal: which entities contain this one?
// =============================================================================

impl GeometryModel {
    /// Returns the edges using a vertex.
    pub fn vertex_edges(&self, key: VertexKey) -> &[EdgeKey] {
        self.vertices
            .get(key)
            .map(|v| v.edges.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the loops and polylines an edge is placed in (once per chain).
    pub fn edge_chains(&self, key: EdgeKey) -> Vec<ChainKey> {
        let mut chains = Vec::new();
        if let Some(edge) = self.edges.get(key) {
            for &pk in &edge.pedges {
                if let Some(p) = self.pedges.get(pk) {
                    if !chains.contains(&p.parent) {
                        chains.push(p.parent);
                    }
                }
            }
        }
        chains
    }

    /// Returns the faces using a loop as boundary or hole.
    pub fn edge_loop_faces(&self, key: EdgeLoopKey) -> &[FaceKey] {
        self.edge_loops
            .get(key)
            .map(|l| l.faces.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the volumes a face is placed in (once per volume).
    pub fn face_volumes(&self, key: FaceKey) -> Vec<VolumeKey> {
        let mut volumes = Vec::new();
        if let Some(face) = self.faces.get(key) {
            for &pk in &face.pfaces {
                if let Some(p) = self.pfaces.get(pk) {
                    if !volumes.contains(&p.volume) {
                        volumes.push(p.volume);
                    }
                }
            }
        }
        volumes
    }

    /// Returns a registered edge connecting `a` and `b`, if any.
    pub fn edge_between(&self, a: VertexKey, b: VertexKey) -> Option<EdgeKey> {
        self.vertex_edges(a).iter().copied().find(|&ek| {
            self.edges
                .get(ek)
                .is_some_and(|e| e.common.in_model && e.contains_vertex(b))
        })
    }

    /// Returns the entities directly containing `key`.
    pub fn parents(&self, key: GeometryKey) -> Vec<GeometryKey> {
        match key {
            GeometryKey::Vertex(vk) => {
                let mut out: Vec<GeometryKey> = self
                    .vertex_edges(vk)
                    .iter()
                    .map(|&e| GeometryKey::Edge(e))
                    .collect();
                if let Some(v) = self.vertices.get(vk) {
                    out.extend(v.proxies.iter().map(|&p| GeometryKey::Proxy(p)));
                }
                out
            }
            GeometryKey::Edge(ek) => self.edge_chains(ek).into_iter().map(Into::into).collect(),
            GeometryKey::EdgeLoop(lk) => self
                .edge_loop_faces(lk)
                .iter()
                .map(|&f| GeometryKey::Face(f))
                .collect(),
            GeometryKey::Face(fk) => self
                .face_volumes(fk)
                .into_iter()
                .map(GeometryKey::Volume)
                .collect(),
            GeometryKey::Polyline(_) | GeometryKey::Volume(_) | GeometryKey::Proxy(_) => {
                Vec::new()
            }
        }
    }

    /// Returns every entity that transitively contains `key`, each once,
    /// closest first.
    pub fn dependents(&self, key: GeometryKey) -> Vec<GeometryKey> {
        let mut seen = FxHashSet::default();
        seen.insert(key);
        let mut out = Vec::new();
        let mut frontier = vec![key];

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for k in frontier {
                for parent in self.parents(k) {
                    if seen.insert(parent) {
                        out.push(parent);
                        next.push(parent);
                    }
                }
            }
            frontier = next;
        }

        out
    }
}
