// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # B-Rep Kernel
//!
//! Boundary-representation topology kernel for CAD/BIM models.
//!
//! A [`GeometryModel`] owns vertices, edges, edge loops, polylines, faces,
//! volumes and proxy geometries in slot maps, together with a layer tree that
//! cascades visibility and colors. Forward links (an edge's vertices, a loop's
//! edges) are mirrored by back-reference lists, so upward queries never scan
//! the model.
//!
//! Every mutation goes through the model. Observers registered with
//! [`GeometryModel::subscribe`] receive [`ModelEvent`]s; inside a batch
//! operation the structural notifications are deduplicated and delivered at
//! commit, after the deferred loop closure checks and volume orientation
//! propagation have run.

pub mod builders;
pub mod color;
pub mod config;
pub mod construction;
mod copy;
pub mod error;
pub mod events;
pub mod geometry;
pub mod keys;
pub mod layer;
mod lifecycle;
pub mod model;
pub mod mutation;
mod orientation;
pub mod reference;
pub mod selection;
pub mod serialization;
pub mod transform;
pub mod traversal;
pub mod validation;

pub use color::{Color, ColorSource, DerivedColor};
pub use config::ModelConfig;
pub use construction::make_rectangle;
pub use error::{Error, ErrorKind, Result};
pub use events::{ModelEvent, ModelObserver, ObserverId, Property, PropertyTarget};
pub use keys::{
    ChainKey, EdgeKey, EdgeLoopKey, FaceKey, GeometryKey, GeometryKind, LayerKey, PEdgeKey,
    PFaceKey, PolylineKey, ProxyKey, VertexKey, VolumeKey,
};
pub use model::{
    EdgeData, EdgeLoopData, FaceData, GeometryCommon, GeometryModel, LayerData, ModelId,
    Orientation, PEdgeData, PFaceData, PolylineData, ProxyData, ProxyMesh, VertexData, VolumeData,
};
pub use reference::{GeometryReference, ReferenceProperty};
pub use selection::GeometrySelection;
pub use serialization::ModelSnapshot;
