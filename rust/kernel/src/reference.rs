// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistent references to geometry by identifier.
//!
//! A [`GeometryReference`] names an entity by model id and geometry id, the
//! only cross-reference that survives saving and reloading. The resolved key
//! is cached while the model is loaded and dropped when it is unloaded.

use crate::keys::GeometryKey;
use crate::model::{GeometryModel, ModelId};

/// Properties of a [`GeometryReference`] reported as changed by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceProperty {
    Name,
    Target,
    Loaded,
}

/// A reference to a geometry entity that can outlive the loaded model.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryReference {
    model_id: ModelId,
    geometry_id: u64,
    target: Option<GeometryKey>,
    name: Option<String>,
    loaded: bool,
}

impl GeometryReference {
    /// Creates an unresolved reference.
    pub fn new(model_id: ModelId, geometry_id: u64) -> Self {
        Self {
            model_id,
            geometry_id,
            target: None,
            name: None,
            loaded: false,
        }
    }

    /// Creates a resolved reference to a registered entity of `model`.
    pub fn to(model: &GeometryModel, key: GeometryKey) -> Option<Self> {
        let id = model.geometry_id(key)?;
        let mut reference = Self::new(model.model_id(), id);
        reference.model_loaded(model);
        Some(reference)
    }

    pub fn model_id(&self) -> ModelId {
        self.model_id
    }

    pub fn geometry_id(&self) -> u64 {
        self.geometry_id
    }

    /// The resolved key, if the model is loaded and the entity exists.
    pub fn target(&self) -> Option<GeometryKey> {
        self.target
    }

    /// Name of the referenced entity, cached at the last resolution.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Looks the referenced entity up in `model` without caching it.
    pub fn resolve(&self, model: &GeometryModel) -> Option<GeometryKey> {
        if model.model_id() != self.model_id {
            return None;
        }
        model.geometry_from_id(self.geometry_id)
    }

    /// Re-resolves against a freshly loaded model.
    ///
    /// Returns the properties whose value changed. A model with another id
    /// leaves the reference untouched.
    pub fn model_loaded(&mut self, model: &GeometryModel) -> Vec<ReferenceProperty> {
        if model.model_id() != self.model_id {
            return Vec::new();
        }
        let target = self.resolve(model);
        let name = target
            .and_then(|key| model.common(key))
            .map(|c| c.name.clone());
        self.apply(target, name, true)
    }

    /// Drops the resolution because the model went away.
    pub fn model_unloaded(&mut self, model_id: ModelId) -> Vec<ReferenceProperty> {
        if model_id != self.model_id {
            return Vec::new();
        }
        self.apply(None, None, false)
    }

    fn apply(
        &mut self,
        target: Option<GeometryKey>,
        name: Option<String>,
        loaded: bool,
    ) -> Vec<ReferenceProperty> {
        let mut changed = Vec::new();
        if self.name != name {
            self.name = name;
            changed.push(ReferenceProperty::Name);
        }
        if self.target != target {
            self.target = target;
            changed.push(ReferenceProperty::Target);
        }
        if self.loaded != loaded {
            self.loaded = loaded;
            changed.push(ReferenceProperty::Loaded);
        }
        changed
    }
}
