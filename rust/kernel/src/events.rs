// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Change notifications and batch operations.
//!
//! Mutations never notify observers directly. They record the affected
//! entities into four deduplicated categories (added, removed, geometry
//! changed, topology changed) and finish by calling
//! [`GeometryModel::finish_operation`]. Outside a batch that flushes right
//! away; inside a batch the sets keep growing until the outermost
//! [`GeometryModel::end_batch_operation`], which first runs the deferred chain
//! validation and then emits one event per non-empty category, in the order
//! added, removed, geometry changed, topology changed, followed by any volume
//! orientation flag changes and finally batch finished.
//!
//! Property notifications (names, visibility, colors, layers) are not batched.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::keys::*;
use crate::model::{GeometryModel, ModelId};

/// What a [`ModelEvent::PropertyChanged`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyTarget {
    Geometry(GeometryKey),
    Layer(LayerKey),
    Model,
}

/// Non-structural properties that raise immediate notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Name,
    IsVisible,
    IsActuallyVisible,
    Color,
    /// The layer a geometry belongs to.
    Layer,
    /// The parent of a layer.
    Parent,
    /// The model's layer tree gained or lost a layer.
    Layers,
    IsConsistentOriented,
}

/// A notification emitted by a [`GeometryModel`].
///
/// Entity sets are deduplicated; their order carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    GeometryAdded(Vec<GeometryKey>),
    GeometryRemoved(Vec<GeometryKey>),
    GeometryChanged(Vec<GeometryKey>),
    TopologyChanged(Vec<GeometryKey>),
    /// The outermost batch operation committed.
    BatchOperationFinished,
    /// A collaborator finished a multi-entity operation outside the batch
    /// mechanism.
    OperationFinished(Vec<GeometryKey>),
    PropertyChanged {
        target: PropertyTarget,
        property: Property,
    },
    /// The whole graph was swapped out; cached keys of this model are stale.
    Replaced,
}

/// Receiver of model notifications.
pub trait ModelObserver {
    fn notify(&mut self, model: ModelId, event: &ModelEvent);
}

impl<T: ModelObserver + ?Sized> ModelObserver for Rc<RefCell<T>> {
    fn notify(&mut self, model: ModelId, event: &ModelEvent) {
        self.borrow_mut().notify(model, event);
    }
}

/// Handle returned by [`GeometryModel::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub(crate) struct Observers {
    entries: Vec<(ObserverId, Box<dyn ModelObserver>)>,
    next: u64,
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.entries.len())
            .finish()
    }
}

/// Insertion-ordered set of entities.
#[derive(Debug, Default, Clone)]
pub(crate) struct EventSet {
    order: Vec<GeometryKey>,
    seen: FxHashSet<GeometryKey>,
}

impl EventSet {
    pub(crate) fn insert(&mut self, key: GeometryKey) -> bool {
        if self.seen.insert(key) {
            self.order.push(key);
            true
        } else {
            false
        }
    }

    pub(crate) fn contains(&self, key: &GeometryKey) -> bool {
        self.seen.contains(key)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn into_vec(self) -> Vec<GeometryKey> {
        self.order
    }
}

/// Pending notifications and deferred validations.
#[derive(Debug, Default)]
pub(crate) struct BatchState {
    pub(crate) depth: u32,
    pub(crate) added: EventSet,
    pub(crate) removed: EventSet,
    pub(crate) geometry_changed: EventSet,
    pub(crate) topology_changed: EventSet,
    /// Chains edited inside a batch whose continuity is checked at commit.
    pub(crate) pending_chains: Vec<ChainKey>,
    /// Volumes whose orientation must be propagated again.
    pub(crate) pending_volumes: Vec<VolumeKey>,
}

impl GeometryModel {
    /// Registers an observer for all notifications of this model.
    pub fn subscribe(&mut self, observer: Box<dyn ModelObserver>) -> ObserverId {
        let id = ObserverId(self.observers.next);
        self.observers.next += 1;
        self.observers.entries.push((id, observer));
        id
    }

    /// Removes an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.entries.len();
        self.observers.entries.retain(|(oid, _)| *oid != id);
        self.observers.entries.len() != before
    }

    pub(crate) fn emit(&mut self, event: ModelEvent) {
        tracing::trace!(model = self.model_id.0, ?event, "Dispatching model event");
        let model = self.model_id;
        for (_, observer) in self.observers.entries.iter_mut() {
            observer.notify(model, &event);
        }
    }

    pub(crate) fn emit_property(&mut self, target: PropertyTarget, property: Property) {
        self.emit(ModelEvent::PropertyChanged { target, property });
    }

    // --- Batch operations ---

    /// Opens a batch operation. Batches nest; only the outermost
    /// [`end_batch_operation`](Self::end_batch_operation) commits.
    pub fn start_batch_operation(&mut self) {
        self.batch.depth += 1;
    }

    /// Closes a batch operation and commits it if it was the outermost one.
    ///
    /// A failed deferred validation aborts the commit: the pending
    /// notifications are dropped and the graph keeps the offending edits.
    pub fn end_batch_operation(&mut self) -> Result<()> {
        if self.batch.depth == 0 {
            return Err(Error::NoBatchRunning);
        }
        self.batch.depth -= 1;
        if self.batch.depth == 0 {
            self.commit(true)
        } else {
            Ok(())
        }
    }

    /// Returns `true` while at least one batch operation is open.
    pub fn is_batch_running(&self) -> bool {
        self.batch.depth > 0
    }

    /// Runs `f` inside a batch operation and commits it.
    ///
    /// The batch is closed even if `f` fails; an error from `f` takes
    /// precedence over a commit error.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.start_batch_operation();
        let result = f(self);
        let committed = self.end_batch_operation();
        let value = result?;
        committed?;
        Ok(value)
    }

    /// Emits a single [`ModelEvent::OperationFinished`] for `affected`.
    /// Does nothing for an empty set.
    pub fn on_operation_finished(&mut self, affected: &[GeometryKey]) {
        if affected.is_empty() {
            return;
        }
        let mut set = EventSet::default();
        for &key in affected {
            set.insert(key);
        }
        self.emit(ModelEvent::OperationFinished(set.into_vec()));
    }

    // --- Recording ---

    pub(crate) fn record_added(&mut self, key: GeometryKey) {
        self.batch.added.insert(key);
    }

    pub(crate) fn record_removed(&mut self, key: GeometryKey) {
        self.batch.removed.insert(key);
    }

    pub(crate) fn record_geometry_changed(&mut self, key: GeometryKey) {
        self.batch.geometry_changed.insert(key);
    }

    pub(crate) fn record_topology_changed(&mut self, key: GeometryKey) {
        self.batch.topology_changed.insert(key);
    }

    pub(crate) fn defer_chain_validation(&mut self, chain: ChainKey) {
        if !self.batch.pending_chains.contains(&chain) {
            self.batch.pending_chains.push(chain);
        }
    }

    pub(crate) fn defer_orientation(&mut self, volume: VolumeKey) {
        if !self.batch.pending_volumes.contains(&volume) {
            self.batch.pending_volumes.push(volume);
        }
    }

    /// Records a structural edit of `key`: topology (and optionally geometry)
    /// changed for the entity and every aggregate that contains it.
    pub(crate) fn record_structure_changed(&mut self, key: GeometryKey, shape_changed: bool) {
        let mut affected = vec![key];
        affected.extend(self.dependents(key));
        for k in affected {
            self.record_topology_changed(k);
            if shape_changed {
                self.record_geometry_changed(k);
            }
            if let GeometryKey::Volume(v) = k {
                self.defer_orientation(v);
            }
        }
    }

    /// Records a shape edit of `key` that leaves the topology untouched.
    pub(crate) fn record_shape_changed(&mut self, key: GeometryKey) {
        self.record_geometry_changed(key);
        for k in self.dependents(key) {
            self.record_geometry_changed(k);
        }
    }

    /// Ends a single mutation: flushes immediately when no batch is open.
    pub(crate) fn finish_operation(&mut self) -> Result<()> {
        if self.batch.depth == 0 {
            self.commit(false)
        } else {
            Ok(())
        }
    }

    fn commit(&mut self, batch_finished: bool) -> Result<()> {
        let state = std::mem::take(&mut self.batch);

        for &chain in &state.pending_chains {
            if !self.contains_geometry(chain.into()) {
                continue;
            }
            let validated = self.refresh_chain(chain);
            if let Err(err) = validated {
                if self.config.handle_consistency {
                    tracing::warn!(
                        model = self.model_id.0,
                        error = %err,
                        "Deferred validation failed, batch commit aborted"
                    );
                    return Err(err.in_chain(chain));
                }
            }
        }

        let mut reoriented = Vec::new();
        for &volume in &state.pending_volumes {
            if !self.contains_geometry(volume.into()) {
                continue;
            }
            let key = GeometryKey::Volume(volume);
            if self.update_volume_orientation(volume) && !state.added.contains(&key) {
                reoriented.push(key);
            }
        }

        if batch_finished {
            tracing::debug!(
                model = self.model_id.0,
                added = state.added.len(),
                removed = state.removed.len(),
                geometry_changed = state.geometry_changed.len(),
                topology_changed = state.topology_changed.len(),
                "Batch operation committed"
            );
        }

        if !state.added.is_empty() {
            self.emit(ModelEvent::GeometryAdded(state.added.into_vec()));
        }
        if !state.removed.is_empty() {
            self.emit(ModelEvent::GeometryRemoved(state.removed.into_vec()));
        }
        if !state.geometry_changed.is_empty() {
            self.emit(ModelEvent::GeometryChanged(state.geometry_changed.into_vec()));
        }
        if !state.topology_changed.is_empty() {
            self.emit(ModelEvent::TopologyChanged(state.topology_changed.into_vec()));
        }
        for key in reoriented {
            self.emit_property(PropertyTarget::Geometry(key), Property::IsConsistentOriented);
        }
        if batch_finished {
            self.emit(ModelEvent::BatchOperationFinished);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::GeometryModel;
    use nalgebra::Point3;

    /// Observer that stores every event it receives.
    #[derive(Debug, Default)]
    pub(crate) struct Recorder {
        pub(crate) events: Vec<ModelEvent>,
    }

    impl ModelObserver for Recorder {
        fn notify(&mut self, _model: ModelId, event: &ModelEvent) {
            self.events.push(event.clone());
        }
    }

    impl Recorder {
        pub(crate) fn attach(model: &mut GeometryModel) -> Rc<RefCell<Recorder>> {
            let recorder = Rc::new(RefCell::new(Recorder::default()));
            model.subscribe(Box::new(recorder.clone()));
            recorder
        }

        pub(crate) fn added(&self) -> Vec<&Vec<GeometryKey>> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    ModelEvent::GeometryAdded(keys) => Some(keys),
                    _ => None,
                })
                .collect()
        }

        /// How often `key` appeared in geometry-changed events.
        pub(crate) fn geometry_changed_count(&self, key: GeometryKey) -> usize {
            self.events
                .iter()
                .filter(|e| matches!(e, ModelEvent::GeometryChanged(keys) if keys.contains(&key)))
                .count()
        }

        pub(crate) fn topology_changed_count(&self, key: GeometryKey) -> usize {
            self.events
                .iter()
                .filter(|e| matches!(e, ModelEvent::TopologyChanged(keys) if keys.contains(&key)))
                .count()
        }

        pub(crate) fn property_count(&self, target: PropertyTarget, property: Property) -> usize {
            self.events
                .iter()
                .filter(|e| {
                    **e == ModelEvent::PropertyChanged { target, property }
                })
                .count()
        }

        pub(crate) fn clear(&mut self) {
            self.events.clear();
        }
    }

    #[test]
    fn add_outside_batch_notifies_immediately() {
        let mut model = GeometryModel::default();
        let recorder = Recorder::attach(&mut model);
        let layer = model.default_layer();

        let v = model.add_vertex(layer, "v", Point3::origin()).unwrap();

        let rec = recorder.borrow();
        assert_eq!(rec.events, vec![ModelEvent::GeometryAdded(vec![v.into()])]);
    }

    #[test]
    fn batch_coalesces_added_events() {
        let mut model = GeometryModel::default();
        let recorder = Recorder::attach(&mut model);
        let layer = model.default_layer();

        model.start_batch_operation();
        for i in 0..5 {
            model
                .add_vertex(layer, "v", Point3::new(i as f64, 0.0, 0.0))
                .unwrap();
        }
        assert!(recorder.borrow().events.is_empty());
        model.end_batch_operation().unwrap();

        let rec = recorder.borrow();
        assert_eq!(rec.added().len(), 1);
        assert_eq!(rec.added()[0].len(), 5);
        assert_eq!(rec.events.last(), Some(&ModelEvent::BatchOperationFinished));
    }

    #[test]
    fn nested_batches_commit_once() {
        let mut model = GeometryModel::default();
        let recorder = Recorder::attach(&mut model);
        let layer = model.default_layer();

        model.start_batch_operation();
        model.start_batch_operation();
        model.add_vertex(layer, "a", Point3::origin()).unwrap();
        model.end_batch_operation().unwrap();
        assert!(recorder.borrow().events.is_empty());
        model.add_vertex(layer, "b", Point3::origin()).unwrap();
        model.end_batch_operation().unwrap();

        let rec = recorder.borrow();
        assert_eq!(rec.added().len(), 1);
        assert_eq!(rec.added()[0].len(), 2);
        let finished = rec
            .events
            .iter()
            .filter(|e| **e == ModelEvent::BatchOperationFinished)
            .count();
        assert_eq!(finished, 1);
    }

    #[test]
    fn end_without_start_fails() {
        let mut model = GeometryModel::default();
        assert!(matches!(model.end_batch_operation(), Err(Error::NoBatchRunning)));
    }

    #[test]
    fn commit_emits_in_category_order() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        let v0 = model.add_vertex(layer, "v0", Point3::origin()).unwrap();
        let v1 = model.add_vertex(layer, "v1", Point3::new(1.0, 0.0, 0.0)).unwrap();
        let gone = model.add_vertex(layer, "gone", Point3::origin()).unwrap();
        let edge = model.add_edge(layer, "e", [v0, v1]).unwrap();
        let recorder = Recorder::attach(&mut model);

        model
            .batch(|m| {
                m.add_vertex(layer, "new", Point3::origin())?;
                m.remove_from_model(gone.into())?;
                m.set_vertex_position(v1, Point3::new(2.0, 0.0, 0.0))?;
                let v2 = m.add_vertex(layer, "v2", Point3::new(0.0, 1.0, 0.0))?;
                m.set_edge_vertex(edge, 1, v2)?;
                Ok(())
            })
            .unwrap();

        let rec = recorder.borrow();
        let order: Vec<&str> = rec
            .events
            .iter()
            .map(|e| match e {
                ModelEvent::GeometryAdded(_) => "added",
                ModelEvent::GeometryRemoved(_) => "removed",
                ModelEvent::GeometryChanged(_) => "geometry",
                ModelEvent::TopologyChanged(_) => "topology",
                ModelEvent::BatchOperationFinished => "finished",
                _ => "other",
            })
            .collect();
        assert_eq!(order, vec!["added", "removed", "geometry", "topology", "finished"]);
    }

    #[test]
    fn orientation_flag_follows_topology_change() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        let (volume, _) = model
            .make_box(layer, "box", Point3::origin(), Point3::new(1.0, 1.0, 1.0))
            .unwrap();
        let recorder = Recorder::attach(&mut model);

        model.batch(|m| m.remove_volume_face(volume, 0)).unwrap();

        let rec = recorder.borrow();
        let position =
            |wanted: &dyn Fn(&ModelEvent) -> bool| rec.events.iter().position(|e| wanted(e));
        let topology = position(&|e| matches!(e, ModelEvent::TopologyChanged(_))).unwrap();
        let flag = position(&|e| {
            *e == ModelEvent::PropertyChanged {
                target: PropertyTarget::Geometry(volume.into()),
                property: Property::IsConsistentOriented,
            }
        })
        .unwrap();
        let finished = position(&|e| *e == ModelEvent::BatchOperationFinished).unwrap();
        assert!(topology < flag);
        assert!(flag < finished);
    }

    #[test]
    fn batch_closure_error_still_closes_batch() {
        let mut model = GeometryModel::default();
        let result: Result<()> = model.batch(|_| Err(Error::DegenerateEdge));
        assert!(matches!(result, Err(Error::DegenerateEdge)));
        assert!(!model.is_batch_running());
    }

    #[test]
    fn operation_finished_ignores_empty_sets() {
        let mut model = GeometryModel::default();
        let recorder = Recorder::attach(&mut model);
        let layer = model.default_layer();
        model.on_operation_finished(&[]);
        assert!(recorder.borrow().events.is_empty());

        let v = model.add_vertex(layer, "v", Point3::origin()).unwrap();
        recorder.borrow_mut().clear();
        model.on_operation_finished(&[v.into(), v.into()]);
        assert_eq!(
            recorder.borrow().events,
            vec![ModelEvent::OperationFinished(vec![v.into()])]
        );
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let mut model = GeometryModel::default();
        let recorder = Rc::new(RefCell::new(Recorder::default()));
        let id = model.subscribe(Box::new(recorder.clone()));
        assert!(model.unsubscribe(id));
        assert!(!model.unsubscribe(id));
        let layer = model.default_layer();
        model.add_vertex(layer, "v", Point3::origin()).unwrap();
        assert!(recorder.borrow().events.is_empty());
    }
}
