// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Construction methods for geometry entities.
//!
//! Every entity is created through the model, which validates the arguments,
//! allocates (or accepts) an identifier, registers the entity in its layer,
//! links all back-references and records an "added" notification. The
//! `*_with_id` variants take a caller-supplied identifier for loading
//! persisted data.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::color::DerivedColor;
use crate::error::{Error, Result};
use crate::keys::*;
use crate::model::*;

fn new_common(id: u64, layer: LayerKey, name: &str) -> GeometryCommon {
    GeometryCommon {
        id,
        name: name.to_string(),
        layer,
        is_visible: true,
        color: DerivedColor::from_parent(),
        in_model: true,
    }
}

impl GeometryModel {
    // --- Vertex ---

    /// Creates a vertex at `position`.
    pub fn add_vertex(
        &mut self,
        layer: LayerKey,
        name: &str,
        position: Point3<f64>,
    ) -> Result<VertexKey> {
        self.insert_vertex(None, layer, name, position)
    }

    /// Creates a vertex with an explicit identifier.
    pub fn add_vertex_with_id(
        &mut self,
        id: u64,
        layer: LayerKey,
        name: &str,
        position: Point3<f64>,
    ) -> Result<VertexKey> {
        self.insert_vertex(Some(id), layer, name, position)
    }

    fn insert_vertex(
        &mut self,
        id: Option<u64>,
        layer: LayerKey,
        name: &str,
        position: Point3<f64>,
    ) -> Result<VertexKey> {
        self.ensure_layer(layer)?;
        let id = self.allocate_id(id)?;

        let key = self.vertices.insert(VertexData {
            common: new_common(id, layer, name),
            position,
            edges: Vec::new(),
            proxies: Vec::new(),
        });

        self.register(key.into());
        self.finish_operation()?;
        Ok(key)
    }

    // --- Edge ---

    /// Creates an edge between two distinct registered vertices.
    pub fn add_edge(
        &mut self,
        layer: LayerKey,
        name: &str,
        vertices: [VertexKey; 2],
    ) -> Result<EdgeKey> {
        self.insert_edge(None, layer, name, vertices)
    }

    pub fn add_edge_with_id(
        &mut self,
        id: u64,
        layer: LayerKey,
        name: &str,
        vertices: [VertexKey; 2],
    ) -> Result<EdgeKey> {
        self.insert_edge(Some(id), layer, name, vertices)
    }

    fn insert_edge(
        &mut self,
        id: Option<u64>,
        layer: LayerKey,
        name: &str,
        vertices: [VertexKey; 2],
    ) -> Result<EdgeKey> {
        self.ensure_layer(layer)?;
        for v in vertices {
            self.ensure_reference(v.into())?;
        }
        if vertices[0] == vertices[1] {
            return Err(Error::DegenerateEdge);
        }
        let id = self.allocate_id(id)?;

        let key = self.edges.insert(EdgeData {
            common: new_common(id, layer, name),
            vertices,
            pedges: Vec::new(),
        });
        self.link_edge(key);

        self.register(key.into());
        self.finish_operation()?;
        Ok(key)
    }

    // --- Edge loop / polyline ---

    /// Creates a closed loop from at least three edges.
    ///
    /// The edges must form a closed chain: each edge shares a vertex with the
    /// next one and the last edge connects back to the first. Orientations are
    /// derived from the chain.
    pub fn add_edge_loop(
        &mut self,
        layer: LayerKey,
        name: &str,
        edges: &[EdgeKey],
    ) -> Result<EdgeLoopKey> {
        self.insert_edge_loop(None, layer, name, edges)
    }

    pub fn add_edge_loop_with_id(
        &mut self,
        id: u64,
        layer: LayerKey,
        name: &str,
        edges: &[EdgeKey],
    ) -> Result<EdgeLoopKey> {
        self.insert_edge_loop(Some(id), layer, name, edges)
    }

    fn insert_edge_loop(
        &mut self,
        id: Option<u64>,
        layer: LayerKey,
        name: &str,
        edges: &[EdgeKey],
    ) -> Result<EdgeLoopKey> {
        self.validate_chain_arguments(layer, edges, true)?;
        let id = self.allocate_id(id)?;

        let key = self.edge_loops.insert(EdgeLoopData {
            common: new_common(id, layer, name),
            pedges: Vec::new(),
            faces: Vec::new(),
        });
        self.build_chain(ChainKey::EdgeLoop(key), edges);

        self.register(key.into());
        self.finish_operation()?;
        Ok(key)
    }

    /// Creates an open chain from at least one edge.
    pub fn add_polyline(
        &mut self,
        layer: LayerKey,
        name: &str,
        edges: &[EdgeKey],
    ) -> Result<PolylineKey> {
        self.insert_polyline(None, layer, name, edges)
    }

    pub fn add_polyline_with_id(
        &mut self,
        id: u64,
        layer: LayerKey,
        name: &str,
        edges: &[EdgeKey],
    ) -> Result<PolylineKey> {
        self.insert_polyline(Some(id), layer, name, edges)
    }

    fn insert_polyline(
        &mut self,
        id: Option<u64>,
        layer: LayerKey,
        name: &str,
        edges: &[EdgeKey],
    ) -> Result<PolylineKey> {
        self.validate_chain_arguments(layer, edges, false)?;
        let id = self.allocate_id(id)?;

        let key = self.polylines.insert(PolylineData {
            common: new_common(id, layer, name),
            pedges: Vec::new(),
        });
        self.build_chain(ChainKey::Polyline(key), edges);

        self.register(key.into());
        self.finish_operation()?;
        Ok(key)
    }

    fn validate_chain_arguments(
        &self,
        layer: LayerKey,
        edges: &[EdgeKey],
        closed: bool,
    ) -> Result<()> {
        self.ensure_layer(layer)?;
        for &ek in edges {
            self.ensure_reference(ek.into())?;
        }
        let min = if closed { 3 } else { 1 };
        if edges.len() < min {
            return Err(Error::TooFewElements {
                what: if closed { "edge loop" } else { "polyline" },
                min,
                found: edges.len(),
            });
        }
        if self.config.handle_consistency {
            self.orient_chain(edges, closed)?;
        }
        Ok(())
    }

    /// Creates one PEdge per edge and links everything.
    fn build_chain(&mut self, chain: ChainKey, edges: &[EdgeKey]) {
        let pedges: Vec<PEdgeKey> = edges
            .iter()
            .map(|&edge| {
                self.pedges.insert(PEdgeData {
                    edge,
                    orientation: Orientation::Undefined,
                    parent: chain,
                    next: None,
                    prev: None,
                })
            })
            .collect();
        if let Some(list) = self.chain_pedges_mut(chain) {
            *list = pedges;
        }
        self.link_chain(chain);
        // Already validated when consistency handling is on.
        let _ = self.refresh_chain(chain);
    }

    // --- Face ---

    /// Creates a face from a boundary loop and optional hole loops.
    pub fn add_face(
        &mut self,
        layer: LayerKey,
        name: &str,
        boundary: EdgeLoopKey,
        holes: &[EdgeLoopKey],
        orientation: Orientation,
    ) -> Result<FaceKey> {
        self.insert_face(None, layer, name, boundary, holes, orientation)
    }

    pub fn add_face_with_id(
        &mut self,
        id: u64,
        layer: LayerKey,
        name: &str,
        boundary: EdgeLoopKey,
        holes: &[EdgeLoopKey],
        orientation: Orientation,
    ) -> Result<FaceKey> {
        self.insert_face(Some(id), layer, name, boundary, holes, orientation)
    }

    fn insert_face(
        &mut self,
        id: Option<u64>,
        layer: LayerKey,
        name: &str,
        boundary: EdgeLoopKey,
        holes: &[EdgeLoopKey],
        orientation: Orientation,
    ) -> Result<FaceKey> {
        self.ensure_layer(layer)?;
        self.ensure_reference(boundary.into())?;
        for (i, &hole) in holes.iter().enumerate() {
            self.ensure_reference(hole.into())?;
            if hole == boundary || holes[..i].contains(&hole) {
                return Err(Error::Duplicate(hole.into()));
            }
        }
        let id = self.allocate_id(id)?;

        let key = self.faces.insert(FaceData {
            common: new_common(id, layer, name),
            boundary,
            holes: holes.to_vec(),
            orientation,
            pfaces: Vec::new(),
        });
        self.link_face(key);

        self.register(key.into());
        self.finish_operation()?;
        Ok(key)
    }

    // --- Volume ---

    /// Creates a volume from at least one face and propagates a consistent
    /// orientation across the faces.
    pub fn add_volume(&mut self, layer: LayerKey, name: &str, faces: &[FaceKey]) -> Result<VolumeKey> {
        self.insert_volume(None, layer, name, faces)
    }

    pub fn add_volume_with_id(
        &mut self,
        id: u64,
        layer: LayerKey,
        name: &str,
        faces: &[FaceKey],
    ) -> Result<VolumeKey> {
        self.insert_volume(Some(id), layer, name, faces)
    }

    fn insert_volume(
        &mut self,
        id: Option<u64>,
        layer: LayerKey,
        name: &str,
        faces: &[FaceKey],
    ) -> Result<VolumeKey> {
        self.ensure_layer(layer)?;
        if faces.is_empty() {
            return Err(Error::TooFewElements {
                what: "volume",
                min: 1,
                found: 0,
            });
        }
        for (i, &fk) in faces.iter().enumerate() {
            self.ensure_reference(fk.into())?;
            if faces[..i].contains(&fk) {
                return Err(Error::Duplicate(fk.into()));
            }
        }
        let id = self.allocate_id(id)?;

        let key = self.volumes.insert(VolumeData {
            common: new_common(id, layer, name),
            pfaces: Vec::new(),
            is_consistent_oriented: false,
        });
        let pfaces: Vec<PFaceKey> = faces
            .iter()
            .map(|&face| {
                self.pfaces.insert(PFaceData {
                    face,
                    volume: key,
                    orientation: Orientation::Undefined,
                })
            })
            .collect();
        if let Some(volume) = self.volumes.get_mut(key) {
            volume.pfaces = pfaces;
        }
        self.link_volume(key);
        self.update_volume_orientation(key);

        self.register(key.into());
        self.finish_operation()?;
        Ok(key)
    }

    // --- Proxy geometry ---

    /// Creates a proxy geometry attached to `vertex`.
    pub fn add_proxy_geometry(
        &mut self,
        layer: LayerKey,
        name: &str,
        vertex: VertexKey,
        size: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        mesh: Option<ProxyMesh>,
    ) -> Result<ProxyKey> {
        self.insert_proxy(None, layer, name, vertex, size, rotation, mesh)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_proxy_geometry_with_id(
        &mut self,
        id: u64,
        layer: LayerKey,
        name: &str,
        vertex: VertexKey,
        size: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        mesh: Option<ProxyMesh>,
    ) -> Result<ProxyKey> {
        self.insert_proxy(Some(id), layer, name, vertex, size, rotation, mesh)
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_proxy(
        &mut self,
        id: Option<u64>,
        layer: LayerKey,
        name: &str,
        vertex: VertexKey,
        size: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        mesh: Option<ProxyMesh>,
    ) -> Result<ProxyKey> {
        self.ensure_layer(layer)?;
        self.ensure_reference(vertex.into())?;
        let id = self.allocate_id(id)?;

        let key = self.proxies.insert(ProxyData {
            common: new_common(id, layer, name),
            vertex,
            size,
            rotation,
            mesh,
        });
        self.link_proxy(key);

        self.register(key.into());
        self.finish_operation()?;
        Ok(key)
    }
}

/// Helper to build a rectangular face from four corner vertices, reusing
/// edges that already connect two consecutive corners.
///
/// Returns `(face_key, loop_key, edge_keys)`.
pub fn make_rectangle(
    model: &mut GeometryModel,
    layer: LayerKey,
    corners: [VertexKey; 4],
) -> Result<(FaceKey, EdgeLoopKey, [EdgeKey; 4])> {
    let mut edges = [EdgeKey::default(); 4];
    for i in 0..4 {
        let (a, b) = (corners[i], corners[(i + 1) % 4]);
        edges[i] = match model.edge_between(a, b) {
            Some(existing) => existing,
            None => model.add_edge(layer, "", [a, b])?,
        };
    }
    let edge_loop = model.add_edge_loop(layer, "", &edges)?;
    let face = model.add_face(layer, "", edge_loop, &[], Orientation::Forward)?;
    Ok((face, edge_loop, edges))
}
