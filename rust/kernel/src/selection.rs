// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Selection state spanning several models.
//!
//! A [`GeometrySelection`] is an observer: subscribe a shared handle to every
//! model whose entities can be selected and removed or replaced entities drop
//! out of the selection automatically.

use rustc_hash::FxHashSet;

use crate::events::{ModelEvent, ModelObserver};
use crate::keys::GeometryKey;
use crate::model::ModelId;

/// An ordered, duplicate-free set of selected entities.
#[derive(Debug, Default, Clone)]
pub struct GeometrySelection {
    items: Vec<(ModelId, GeometryKey)>,
    index: FxHashSet<(ModelId, GeometryKey)>,
}

impl GeometrySelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity. Returns `false` if it was already selected.
    pub fn select(&mut self, model: ModelId, key: GeometryKey) -> bool {
        if self.index.insert((model, key)) {
            self.items.push((model, key));
            true
        } else {
            false
        }
    }

    /// Removes an entity. Returns `false` if it was not selected.
    pub fn deselect(&mut self, model: ModelId, key: GeometryKey) -> bool {
        if self.index.remove(&(model, key)) {
            self.items.retain(|&item| item != (model, key));
            true
        } else {
            false
        }
    }

    /// Flips the selection state of an entity and returns the new state.
    pub fn toggle(&mut self, model: ModelId, key: GeometryKey) -> bool {
        if self.deselect(model, key) {
            false
        } else {
            self.select(model, key)
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
    }

    pub fn contains(&self, model: ModelId, key: GeometryKey) -> bool {
        self.index.contains(&(model, key))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Selected entities in selection order.
    pub fn iter(&self) -> impl Iterator<Item = (ModelId, GeometryKey)> + '_ {
        self.items.iter().copied()
    }

    /// Selected entities of one model.
    pub fn in_model(&self, model: ModelId) -> Vec<GeometryKey> {
        self.items
            .iter()
            .filter(|(m, _)| *m == model)
            .map(|&(_, key)| key)
            .collect()
    }

    fn purge(&mut self, keep: impl Fn(&(ModelId, GeometryKey)) -> bool) {
        let before = self.items.len();
        self.items.retain(|item| keep(item));
        if self.items.len() != before {
            self.index = self.items.iter().copied().collect();
        }
    }
}

impl ModelObserver for GeometrySelection {
    fn notify(&mut self, model: ModelId, event: &ModelEvent) {
        match event {
            ModelEvent::GeometryRemoved(keys) => {
                let removed: FxHashSet<GeometryKey> = keys.iter().copied().collect();
                self.purge(|(m, key)| *m != model || !removed.contains(key));
            }
            ModelEvent::Replaced => self.purge(|(m, _)| *m != model),
            _ => {}
        }
    }
}
