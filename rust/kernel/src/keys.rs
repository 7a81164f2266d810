// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Key types for arena-based storage.
//!
//! Every geometry entity, placement and layer gets a type-safe key for O(1)
//! lookup in the model. Keys are created by `slotmap::SlotMap` and stay valid
//! while the entity is detached from the model (removed entities keep their
//! slot so they can be re-added).

use slotmap::new_key_type;

new_key_type! {
    /// Key for a vertex (point in 3D space).
    pub struct VertexKey;

    /// Key for an edge (segment between two vertices).
    pub struct EdgeKey;

    /// Key for an edge loop (closed chain of edges).
    pub struct EdgeLoopKey;

    /// Key for a polyline (open chain of edges).
    pub struct PolylineKey;

    /// Key for a face (boundary loop plus holes).
    pub struct FaceKey;

    /// Key for a volume (set of oriented faces).
    pub struct VolumeKey;

    /// Key for a proxy geometry (mesh attached to a vertex).
    pub struct ProxyKey;

    /// Key for an edge placement inside a loop or polyline.
    pub struct PEdgeKey;

    /// Key for a face placement inside a volume.
    pub struct PFaceKey;

    /// Key for a layer.
    pub struct LayerKey;
}

/// A key that can reference any geometry entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKey {
    Vertex(VertexKey),
    Edge(EdgeKey),
    EdgeLoop(EdgeLoopKey),
    Polyline(PolylineKey),
    Face(FaceKey),
    Volume(VolumeKey),
    Proxy(ProxyKey),
}

impl GeometryKey {
    /// Returns the kind of entity this key refers to.
    pub fn kind(&self) -> GeometryKind {
        match self {
            GeometryKey::Vertex(_) => GeometryKind::Vertex,
            GeometryKey::Edge(_) => GeometryKind::Edge,
            GeometryKey::EdgeLoop(_) => GeometryKind::EdgeLoop,
            GeometryKey::Polyline(_) => GeometryKind::Polyline,
            GeometryKey::Face(_) => GeometryKind::Face,
            GeometryKey::Volume(_) => GeometryKind::Volume,
            GeometryKey::Proxy(_) => GeometryKind::Proxy,
        }
    }
}

/// The ordered chain that owns a PEdge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKey {
    EdgeLoop(EdgeLoopKey),
    Polyline(PolylineKey),
}

impl ChainKey {
    /// Whether the chain must close on itself.
    pub fn is_closed(&self) -> bool {
        matches!(self, ChainKey::EdgeLoop(_))
    }

    /// Minimum number of edges the chain needs to be valid.
    pub fn min_edges(&self) -> usize {
        match self {
            ChainKey::EdgeLoop(_) => 3,
            ChainKey::Polyline(_) => 1,
        }
    }
}

impl From<ChainKey> for GeometryKey {
    fn from(k: ChainKey) -> Self {
        match k {
            ChainKey::EdgeLoop(l) => GeometryKey::EdgeLoop(l),
            ChainKey::Polyline(p) => GeometryKey::Polyline(p),
        }
    }
}

/// Discriminant for geometry entity kinds, ordered leaves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeometryKind {
    Vertex = 0,
    Edge = 1,
    EdgeLoop = 2,
    Polyline = 3,
    Face = 4,
    Volume = 5,
    Proxy = 6,
}

impl GeometryKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Vertex => "Vertex",
            GeometryKind::Edge => "Edge",
            GeometryKind::EdgeLoop => "EdgeLoop",
            GeometryKind::Polyline => "Polyline",
            GeometryKind::Face => "Face",
            GeometryKind::Volume => "Volume",
            GeometryKind::Proxy => "ProxyGeometry",
        }
    }
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Conversion impls from specific keys to GeometryKey
impl From<VertexKey> for GeometryKey {
    fn from(k: VertexKey) -> Self {
        GeometryKey::Vertex(k)
    }
}

impl From<EdgeKey> for GeometryKey {
    fn from(k: EdgeKey) -> Self {
        GeometryKey::Edge(k)
    }
}

impl From<EdgeLoopKey> for GeometryKey {
    fn from(k: EdgeLoopKey) -> Self {
        GeometryKey::EdgeLoop(k)
    }
}

impl From<PolylineKey> for GeometryKey {
    fn from(k: PolylineKey) -> Self {
        GeometryKey::Polyline(k)
    }
}

impl From<FaceKey> for GeometryKey {
    fn from(k: FaceKey) -> Self {
        GeometryKey::Face(k)
    }
}

impl From<VolumeKey> for GeometryKey {
    fn from(k: VolumeKey) -> Self {
        GeometryKey::Volume(k)
    }
}

impl From<ProxyKey> for GeometryKey {
    fn from(k: ProxyKey) -> Self {
        GeometryKey::Proxy(k)
    }
}

impl From<EdgeLoopKey> for ChainKey {
    fn from(k: EdgeLoopKey) -> Self {
        ChainKey::EdgeLoop(k)
    }
}

impl From<PolylineKey> for ChainKey {
    fn from(k: PolylineKey) -> Self {
        ChainKey::Polyline(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn kind_names() {
        assert_eq!(GeometryKind::Vertex.as_str(), "Vertex");
        assert_eq!(GeometryKind::EdgeLoop.as_str(), "EdgeLoop");
        assert_eq!(GeometryKind::Proxy.to_string(), "ProxyGeometry");
    }

    #[test]
    fn kind_ordering_is_leaves_first() {
        assert!(GeometryKind::Vertex < GeometryKind::Edge);
        assert!(GeometryKind::Edge < GeometryKind::EdgeLoop);
        assert!(GeometryKind::Face < GeometryKind::Volume);
    }

    #[test]
    fn chain_key_conversions() {
        let mut loops: SlotMap<EdgeLoopKey, ()> = SlotMap::with_key();
        let lk = loops.insert(());
        let chain = ChainKey::from(lk);
        assert!(chain.is_closed());
        assert_eq!(chain.min_edges(), 3);
        assert_eq!(GeometryKey::from(chain), GeometryKey::EdgeLoop(lk));
        assert_eq!(GeometryKey::from(chain).kind(), GeometryKind::EdgeLoop);
    }
}
