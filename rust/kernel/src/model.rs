// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Arena-based storage for the geometry graph.
//!
//! The [`GeometryModel`] is the central owner of all geometry. Every entity
//! (vertex, edge, edge loop, polyline, face, volume, proxy geometry), every
//! placement (PEdge, PFace) and every layer lives inside slot maps with stable,
//! generational keys. Forward links (edge → vertices, loop → PEdges, volume →
//! PFaces) are mirrored by back-reference lists (vertex → edges, edge → PEdges,
//! loop → faces, face → PFaces) which are updated in the same step.
//!
//! Removing an entity from the model detaches it from the graph but keeps its
//! slot, so the same instance can be added back later.

use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::color::DerivedColor;
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::events::{BatchState, Observers};
use crate::keys::*;

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a model, used by cross-model references and selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(pub u64);

impl ModelId {
    /// Allocates a process-unique model id.
    pub fn next() -> Self {
        ModelId(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Orientation of a placement relative to its underlying edge or face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Forward,
    Backward,
    Undefined,
}

impl Orientation {
    /// `+1` for forward, `-1` for backward, `None` when undefined.
    pub fn sign(self) -> Option<i8> {
        match self {
            Orientation::Forward => Some(1),
            Orientation::Backward => Some(-1),
            Orientation::Undefined => None,
        }
    }

    pub(crate) fn from_sign(sign: i8) -> Self {
        if sign >= 0 {
            Orientation::Forward
        } else {
            Orientation::Backward
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Orientation::Forward => Orientation::Backward,
            Orientation::Backward => Orientation::Forward,
            Orientation::Undefined => Orientation::Undefined,
        }
    }

    pub fn is_defined(self) -> bool {
        self != Orientation::Undefined
    }
}

/// State shared by every geometry entity.
#[derive(Debug, Clone)]
pub struct GeometryCommon {
    pub id: u64,
    pub name: String,
    pub layer: LayerKey,
    /// Local visibility flag. See [`GeometryModel::is_actually_visible`] for
    /// the cascaded value.
    pub is_visible: bool,
    pub color: DerivedColor,
    pub(crate) in_model: bool,
}

impl GeometryCommon {
    /// Whether the entity is currently registered in its model.
    pub fn in_model(&self) -> bool {
        self.in_model
    }
}

/// A point in 3D space.
#[derive(Debug, Clone)]
pub struct VertexData {
    pub common: GeometryCommon,
    pub position: Point3<f64>,
    /// Edges that use this vertex.
    pub edges: Vec<EdgeKey>,
    /// Proxy geometries attached to this vertex.
    pub proxies: Vec<ProxyKey>,
}

/// A segment between two distinct vertices.
#[derive(Debug, Clone)]
pub struct EdgeData {
    pub common: GeometryCommon,
    pub vertices: [VertexKey; 2],
    /// Placements of this edge in loops and polylines.
    pub pedges: Vec<PEdgeKey>,
}

impl EdgeData {
    /// Start vertex when traversed with `orientation` (forward if undefined).
    pub fn start(&self, orientation: Orientation) -> VertexKey {
        match orientation {
            Orientation::Backward => self.vertices[1],
            _ => self.vertices[0],
        }
    }

    /// End vertex when traversed with `orientation` (forward if undefined).
    pub fn end(&self, orientation: Orientation) -> VertexKey {
        match orientation {
            Orientation::Backward => self.vertices[0],
            _ => self.vertices[1],
        }
    }

    pub fn contains_vertex(&self, v: VertexKey) -> bool {
        self.vertices[0] == v || self.vertices[1] == v
    }
}

/// Placement of an edge inside an edge loop or polyline.
#[derive(Debug, Clone)]
pub struct PEdgeData {
    pub edge: EdgeKey,
    pub orientation: Orientation,
    pub parent: ChainKey,
    pub next: Option<PEdgeKey>,
    pub prev: Option<PEdgeKey>,
}

/// A closed, circular chain of at least three edges.
#[derive(Debug, Clone)]
pub struct EdgeLoopData {
    pub common: GeometryCommon,
    pub pedges: Vec<PEdgeKey>,
    /// Faces using this loop as boundary or hole.
    pub faces: Vec<FaceKey>,
}

/// An open, continuous chain of at least one edge.
#[derive(Debug, Clone)]
pub struct PolylineData {
    pub common: GeometryCommon,
    pub pedges: Vec<PEdgeKey>,
}

/// A face bounded by one loop, with optional hole loops.
#[derive(Debug, Clone)]
pub struct FaceData {
    pub common: GeometryCommon,
    pub boundary: EdgeLoopKey,
    pub holes: Vec<EdgeLoopKey>,
    pub orientation: Orientation,
    /// Placements of this face in volumes.
    pub pfaces: Vec<PFaceKey>,
}

impl FaceData {
    /// Boundary followed by holes.
    pub fn loops(&self) -> impl Iterator<Item = EdgeLoopKey> + '_ {
        std::iter::once(self.boundary).chain(self.holes.iter().copied())
    }
}

/// Placement of a face inside a volume.
#[derive(Debug, Clone)]
pub struct PFaceData {
    pub face: FaceKey,
    pub volume: VolumeKey,
    pub orientation: Orientation,
}

/// A volume bounded by oriented faces.
#[derive(Debug, Clone)]
pub struct VolumeData {
    pub common: GeometryCommon,
    pub pfaces: Vec<PFaceKey>,
    /// Result of the last orientation propagation.
    pub is_consistent_oriented: bool,
}

/// Render mesh carried by a proxy geometry, in proxy-local coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyMesh {
    pub positions: Vec<Point3<f64>>,
    pub normals: Vec<Vector3<f64>>,
    pub indices: Vec<u32>,
}

/// Geometry attached to a single vertex, placed by size and rotation.
#[derive(Debug, Clone)]
pub struct ProxyData {
    pub common: GeometryCommon,
    pub vertex: VertexKey,
    pub size: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub mesh: Option<ProxyMesh>,
}

/// A node of the layer tree.
#[derive(Debug, Clone)]
pub struct LayerData {
    pub name: String,
    pub parent: Option<LayerKey>,
    pub children: Vec<LayerKey>,
    pub is_visible: bool,
    pub color: DerivedColor,
    /// Registered geometry assigned to this layer.
    pub elements: Vec<GeometryKey>,
}

/// The model root owning the whole geometry graph.
///
/// # Example
///
/// ```
/// use brep_kernel::{GeometryModel, ModelConfig};
/// use nalgebra::Point3;
///
/// let mut model = GeometryModel::new(ModelConfig::default());
/// let layer = model.default_layer();
/// let v0 = model.add_vertex(layer, "v0", Point3::new(0.0, 0.0, 0.0)).unwrap();
/// let v1 = model.add_vertex(layer, "v1", Point3::new(1.0, 0.0, 0.0)).unwrap();
/// model.add_edge(layer, "e", [v0, v1]).unwrap();
///
/// assert_eq!(model.vertex_count(), 2);
/// assert_eq!(model.edge_count(), 1);
/// ```
#[derive(Debug)]
pub struct GeometryModel {
    pub(crate) model_id: ModelId,
    pub(crate) config: ModelConfig,
    pub(crate) is_visible: bool,

    // Entity storage
    pub(crate) vertices: SlotMap<VertexKey, VertexData>,
    pub(crate) edges: SlotMap<EdgeKey, EdgeData>,
    pub(crate) edge_loops: SlotMap<EdgeLoopKey, EdgeLoopData>,
    pub(crate) polylines: SlotMap<PolylineKey, PolylineData>,
    pub(crate) faces: SlotMap<FaceKey, FaceData>,
    pub(crate) volumes: SlotMap<VolumeKey, VolumeData>,
    pub(crate) proxies: SlotMap<ProxyKey, ProxyData>,

    // Placements
    pub(crate) pedges: SlotMap<PEdgeKey, PEdgeData>,
    pub(crate) pfaces: SlotMap<PFaceKey, PFaceData>,

    // Layer tree
    pub(crate) layers: SlotMap<LayerKey, LayerData>,
    pub(crate) root_layers: Vec<LayerKey>,
    pub(crate) default_layer: LayerKey,

    // Identity
    pub(crate) ids: FxHashMap<u64, GeometryKey>,
    pub(crate) next_id: u64,

    // Notifications
    pub(crate) batch: BatchState,
    pub(crate) observers: Observers,
}

impl GeometryModel {
    /// Creates an empty model with a fresh model id and one root layer.
    pub fn new(config: ModelConfig) -> Self {
        Self::with_model_id(ModelId::next(), config)
    }

    /// Creates an empty model with a caller-supplied model id.
    pub fn with_model_id(model_id: ModelId, config: ModelConfig) -> Self {
        let mut layers = SlotMap::with_key();
        let default_layer = layers.insert(LayerData {
            name: config.default_layer_name.clone(),
            parent: None,
            children: Vec::new(),
            is_visible: true,
            color: DerivedColor::from_parent(),
            elements: Vec::new(),
        });

        tracing::debug!(model = model_id.0, "Created geometry model");

        Self {
            model_id,
            is_visible: config.is_visible,
            config,

            vertices: SlotMap::with_key(),
            edges: SlotMap::with_key(),
            edge_loops: SlotMap::with_key(),
            polylines: SlotMap::with_key(),
            faces: SlotMap::with_key(),
            volumes: SlotMap::with_key(),
            proxies: SlotMap::with_key(),

            pedges: SlotMap::with_key(),
            pfaces: SlotMap::with_key(),

            layers,
            root_layers: vec![default_layer],
            default_layer,

            ids: FxHashMap::default(),
            next_id: 0,

            batch: BatchState::default(),
            observers: Observers::default(),
        }
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Whether structural validation is active.
    pub fn handle_consistency(&self) -> bool {
        self.config.handle_consistency
    }

    /// Enables or disables structural validation.
    pub fn set_handle_consistency(&mut self, enabled: bool) {
        self.config.handle_consistency = enabled;
    }

    // --- Identity ---

    /// Returns the id the next automatically created entity will receive.
    pub fn free_id(&self) -> u64 {
        self.next_id
    }

    /// Reserves an id, either the explicit one or the next free one.
    pub(crate) fn allocate_id(&mut self, explicit: Option<u64>) -> Result<u64> {
        match explicit {
            Some(id) => {
                if self.ids.contains_key(&id) {
                    return Err(Error::IdInUse(id));
                }
                self.next_id = self.next_id.max(id.saturating_add(1));
                Ok(id)
            }
            None => {
                let id = self.next_id;
                self.next_id += 1;
                Ok(id)
            }
        }
    }

    /// Looks up a registered entity by its identifier.
    pub fn geometry_from_id(&self, id: u64) -> Option<GeometryKey> {
        self.ids.get(&id).copied()
    }

    /// Returns `true` if the key refers to an entity registered in this model.
    pub fn contains_geometry(&self, key: GeometryKey) -> bool {
        self.common(key).is_some_and(|c| c.in_model)
    }

    /// Returns the identifier of an entity (registered or not).
    pub fn geometry_id(&self, key: GeometryKey) -> Option<u64> {
        self.common(key).map(|c| c.id)
    }

    /// Returns the shared state of any entity.
    pub fn common(&self, key: GeometryKey) -> Option<&GeometryCommon> {
        match key {
            GeometryKey::Vertex(k) => self.vertices.get(k).map(|d| &d.common),
            GeometryKey::Edge(k) => self.edges.get(k).map(|d| &d.common),
            GeometryKey::EdgeLoop(k) => self.edge_loops.get(k).map(|d| &d.common),
            GeometryKey::Polyline(k) => self.polylines.get(k).map(|d| &d.common),
            GeometryKey::Face(k) => self.faces.get(k).map(|d| &d.common),
            GeometryKey::Volume(k) => self.volumes.get(k).map(|d| &d.common),
            GeometryKey::Proxy(k) => self.proxies.get(k).map(|d| &d.common),
        }
    }

    pub(crate) fn common_mut(&mut self, key: GeometryKey) -> Option<&mut GeometryCommon> {
        match key {
            GeometryKey::Vertex(k) => self.vertices.get_mut(k).map(|d| &mut d.common),
            GeometryKey::Edge(k) => self.edges.get_mut(k).map(|d| &mut d.common),
            GeometryKey::EdgeLoop(k) => self.edge_loops.get_mut(k).map(|d| &mut d.common),
            GeometryKey::Polyline(k) => self.polylines.get_mut(k).map(|d| &mut d.common),
            GeometryKey::Face(k) => self.faces.get_mut(k).map(|d| &mut d.common),
            GeometryKey::Volume(k) => self.volumes.get_mut(k).map(|d| &mut d.common),
            GeometryKey::Proxy(k) => self.proxies.get_mut(k).map(|d| &mut d.common),
        }
    }

    /// Fails unless `key` is registered; used for the entity being mutated.
    pub(crate) fn ensure_in_model(&self, key: GeometryKey) -> Result<()> {
        match self.common(key) {
            None => Err(Error::NotFound(key)),
            Some(c) if !c.in_model => Err(Error::NotInModel(key)),
            Some(_) => Ok(()),
        }
    }

    /// Fails unless `key` is registered; used for referenced arguments.
    pub(crate) fn ensure_reference(&self, key: GeometryKey) -> Result<()> {
        match self.common(key) {
            None => Err(Error::NotFound(key)),
            Some(c) if !c.in_model => Err(Error::DetachedReference(key)),
            Some(_) => Ok(()),
        }
    }

    pub(crate) fn ensure_layer(&self, layer: LayerKey) -> Result<()> {
        if self.layers.contains_key(layer) {
            Ok(())
        } else {
            Err(Error::LayerNotFound(layer))
        }
    }

    // --- Entity accessors ---

    /// Returns the vertex data, also for removed vertices.
    pub fn vertex(&self, key: VertexKey) -> Option<&VertexData> {
        self.vertices.get(key)
    }

    pub fn edge(&self, key: EdgeKey) -> Option<&EdgeData> {
        self.edges.get(key)
    }

    pub fn edge_loop(&self, key: EdgeLoopKey) -> Option<&EdgeLoopData> {
        self.edge_loops.get(key)
    }

    pub fn polyline(&self, key: PolylineKey) -> Option<&PolylineData> {
        self.polylines.get(key)
    }

    pub fn face(&self, key: FaceKey) -> Option<&FaceData> {
        self.faces.get(key)
    }

    pub fn volume(&self, key: VolumeKey) -> Option<&VolumeData> {
        self.volumes.get(key)
    }

    pub fn proxy(&self, key: ProxyKey) -> Option<&ProxyData> {
        self.proxies.get(key)
    }

    pub fn pedge(&self, key: PEdgeKey) -> Option<&PEdgeData> {
        self.pedges.get(key)
    }

    pub fn pface(&self, key: PFaceKey) -> Option<&PFaceData> {
        self.pfaces.get(key)
    }

    /// Returns the PEdges of a loop or polyline in chain order.
    pub fn chain_pedges(&self, chain: ChainKey) -> Option<&[PEdgeKey]> {
        match chain {
            ChainKey::EdgeLoop(k) => self.edge_loops.get(k).map(|l| l.pedges.as_slice()),
            ChainKey::Polyline(k) => self.polylines.get(k).map(|p| p.pedges.as_slice()),
        }
    }

    pub(crate) fn chain_pedges_mut(&mut self, chain: ChainKey) -> Option<&mut Vec<PEdgeKey>> {
        match chain {
            ChainKey::EdgeLoop(k) => self.edge_loops.get_mut(k).map(|l| &mut l.pedges),
            ChainKey::Polyline(k) => self.polylines.get_mut(k).map(|p| &mut p.pedges),
        }
    }

    /// Returns `true` if the volume's faces form a consistently oriented,
    /// closed shell.
    pub fn is_consistent_oriented(&self, key: VolumeKey) -> Option<bool> {
        self.volumes.get(key).map(|v| v.is_consistent_oriented)
    }

    // --- Registered collections ---

    pub fn vertices(&self) -> impl Iterator<Item = (VertexKey, &VertexData)> + '_ {
        self.vertices.iter().filter(|(_, d)| d.common.in_model)
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeKey, &EdgeData)> + '_ {
        self.edges.iter().filter(|(_, d)| d.common.in_model)
    }

    pub fn edge_loops(&self) -> impl Iterator<Item = (EdgeLoopKey, &EdgeLoopData)> + '_ {
        self.edge_loops.iter().filter(|(_, d)| d.common.in_model)
    }

    pub fn polylines(&self) -> impl Iterator<Item = (PolylineKey, &PolylineData)> + '_ {
        self.polylines.iter().filter(|(_, d)| d.common.in_model)
    }

    pub fn faces(&self) -> impl Iterator<Item = (FaceKey, &FaceData)> + '_ {
        self.faces.iter().filter(|(_, d)| d.common.in_model)
    }

    pub fn volumes(&self) -> impl Iterator<Item = (VolumeKey, &VolumeData)> + '_ {
        self.volumes.iter().filter(|(_, d)| d.common.in_model)
    }

    pub fn proxies(&self) -> impl Iterator<Item = (ProxyKey, &ProxyData)> + '_ {
        self.proxies.iter().filter(|(_, d)| d.common.in_model)
    }

    /// All registered entities, leaves first.
    pub fn geometries(&self) -> Vec<GeometryKey> {
        let mut keys = Vec::with_capacity(self.ids.len());
        keys.extend(self.vertices().map(|(k, _)| GeometryKey::Vertex(k)));
        keys.extend(self.edges().map(|(k, _)| GeometryKey::Edge(k)));
        keys.extend(self.edge_loops().map(|(k, _)| GeometryKey::EdgeLoop(k)));
        keys.extend(self.polylines().map(|(k, _)| GeometryKey::Polyline(k)));
        keys.extend(self.faces().map(|(k, _)| GeometryKey::Face(k)));
        keys.extend(self.volumes().map(|(k, _)| GeometryKey::Volume(k)));
        keys.extend(self.proxies().map(|(k, _)| GeometryKey::Proxy(k)));
        keys
    }

    // --- Counts (registered entities only) ---

    pub fn vertex_count(&self) -> usize {
        self.vertices().count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    pub fn edge_loop_count(&self) -> usize {
        self.edge_loops().count()
    }

    pub fn polyline_count(&self) -> usize {
        self.polylines().count()
    }

    pub fn face_count(&self) -> usize {
        self.faces().count()
    }

    pub fn volume_count(&self) -> usize {
        self.volumes().count()
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies().count()
    }

    /// Total number of registered entities.
    pub fn geometry_count(&self) -> usize {
        self.ids.len()
    }

    // --- Layers ---

    pub fn layer(&self, key: LayerKey) -> Option<&LayerData> {
        self.layers.get(key)
    }

    /// The layer created together with the model.
    pub fn default_layer(&self) -> LayerKey {
        self.default_layer
    }

    /// Layers without a parent, in creation order.
    pub fn root_layers(&self) -> &[LayerKey] {
        &self.root_layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

impl Default for GeometryModel {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_model_is_empty() {
        let model = GeometryModel::default();
        assert_eq!(model.vertex_count(), 0);
        assert_eq!(model.edge_count(), 0);
        assert_eq!(model.edge_loop_count(), 0);
        assert_eq!(model.polyline_count(), 0);
        assert_eq!(model.face_count(), 0);
        assert_eq!(model.volume_count(), 0);
        assert_eq!(model.proxy_count(), 0);
        assert_eq!(model.layer_count(), 1);
        assert_eq!(model.root_layers(), &[model.default_layer()]);
    }

    #[test]
    fn model_ids_are_unique() {
        let a = GeometryModel::default();
        let b = GeometryModel::default();
        assert_ne!(a.model_id(), b.model_id());
    }

    #[test]
    fn explicit_ids_bump_free_id() {
        let mut model = GeometryModel::default();
        assert_eq!(model.allocate_id(None).unwrap(), 0);
        assert_eq!(model.allocate_id(Some(41)).unwrap(), 41);
        assert_eq!(model.free_id(), 42);
        // Lower explicit ids do not move the counter back.
        assert_eq!(model.allocate_id(Some(7)).unwrap(), 7);
        assert_eq!(model.free_id(), 42);
    }

    #[test]
    fn explicit_id_in_use_is_rejected() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        model
            .add_vertex_with_id(5, layer, "v", Point3::origin())
            .unwrap();
        let err = model
            .add_vertex_with_id(5, layer, "w", Point3::origin())
            .unwrap_err();
        assert!(matches!(err, Error::IdInUse(5)));
        assert_eq!(model.vertex_count(), 1);
    }

    #[test]
    fn lookup_by_id() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        let v = model.add_vertex(layer, "v", Point3::origin()).unwrap();
        let id = model.geometry_id(v.into()).unwrap();
        assert_eq!(model.geometry_from_id(id), Some(GeometryKey::Vertex(v)));
        assert!(model.contains_geometry(v.into()));
        assert_eq!(model.geometry_from_id(id + 100), None);
    }

    #[test]
    fn orientation_signs() {
        assert_eq!(Orientation::Forward.sign(), Some(1));
        assert_eq!(Orientation::Backward.sign(), Some(-1));
        assert_eq!(Orientation::Undefined.sign(), None);
        assert_eq!(Orientation::from_sign(-1), Orientation::Backward);
        assert_eq!(Orientation::Forward.reversed(), Orientation::Backward);
        assert!(!Orientation::Undefined.is_defined());
    }
}
