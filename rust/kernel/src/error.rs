// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for kernel operations.

use crate::keys::{ChainKey, GeometryKey, LayerKey};

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The call was rejected up front and had no effect.
    InvalidArgument,
    /// A structural invariant was violated or the API was misused. The model
    /// may be left mutated and should be discarded or rebuilt.
    Fatal,
}

/// Errors that can occur during kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced entity does not exist in this model's arena.
    #[error("geometry not found: {0:?}")]
    NotFound(GeometryKey),

    /// An argument references an entity that is currently removed from the
    /// model.
    #[error("referenced geometry is not part of the model: {0:?}")]
    DetachedReference(GeometryKey),

    /// The entity being mutated is currently removed from the model.
    #[error("geometry is not part of the model: {0:?}")]
    NotInModel(GeometryKey),

    /// `add_to_model` was called on an entity that is already registered.
    #[error("geometry is already part of the model: {0:?}")]
    AlreadyInModel(GeometryKey),

    /// A referenced layer does not exist.
    #[error("layer not found: {0:?}")]
    LayerNotFound(LayerKey),

    /// A layer still contains geometry or sub-layers.
    #[error("layer is not empty: {0:?}")]
    LayerNotEmpty(LayerKey),

    /// The model's default layer cannot be deleted.
    #[error("the default layer cannot be removed")]
    DefaultLayer,

    /// Re-parenting a layer below itself.
    #[error("layer {0:?} cannot become a descendant of itself")]
    LayerCycle(LayerKey),

    /// An explicit identifier is already used by a registered entity.
    #[error("identifier {0} is already in use")]
    IdInUse(u64),

    /// An edge needs two distinct vertices.
    #[error("edge vertices must be distinct")]
    DegenerateEdge,

    /// A chain or volume has fewer elements than required.
    #[error("{what} needs at least {min} elements, got {found}")]
    TooFewElements {
        what: &'static str,
        min: usize,
        found: usize,
    },

    /// An element index is out of range.
    #[error("index {index} out of range for {len} elements")]
    IndexOutOfRange { index: usize, len: usize },

    /// The same loop or face appears twice where uniqueness is required.
    #[error("duplicate element: {0:?}")]
    Duplicate(GeometryKey),

    /// Consecutive edges of a chain do not share a vertex.
    #[error("chain {chain:?} is not continuous: edge {from} does not connect to edge {to}")]
    DisconnectedChain {
        chain: Option<ChainKey>,
        from: usize,
        to: usize,
    },

    /// The last edge of a loop does not connect back to the first one.
    #[error("edge loop {0:?} is not closed")]
    OpenLoop(Option<ChainKey>),

    /// `end_batch_operation` without a matching start.
    #[error("no batch operation is running")]
    NoBatchRunning,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Classifies the error following the kernel's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyInModel(_)
            | Error::DisconnectedChain { .. }
            | Error::OpenLoop(_)
            | Error::NotInModel(_) => ErrorKind::Fatal,
            _ => ErrorKind::InvalidArgument,
        }
    }

    /// Attaches the offending chain to a continuity error.
    pub(crate) fn in_chain(self, chain: ChainKey) -> Self {
        match self {
            Error::DisconnectedChain { from, to, .. } => Error::DisconnectedChain {
                chain: Some(chain),
                from,
                to,
            },
            Error::OpenLoop(_) => Error::OpenLoop(Some(chain)),
            other => other,
        }
    }
}
