// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layer tree, visibility and color cascades.
//!
//! A geometry is actually visible when the model, every layer from its own
//! layer up to the root and the geometry itself are visible. Colors set to
//! [`DerivedColor::from_parent`] resolve through the layer chain; root layers
//! inherit the configured default color.
//!
//! Property notifications are immediate. A change high up in the tree emits
//! at most one notification per property for each layer and geometry whose
//! effective value actually changed.

use rustc_hash::FxHashSet;

use crate::color::{Color, DerivedColor};
use crate::error::{Error, Result};
use crate::events::{Property, PropertyTarget};
use crate::keys::*;
use crate::model::{GeometryModel, LayerData};

/// Effective visibility and color of a layer or geometry.
type Appearance = (bool, Color);

impl GeometryModel {
    // --- Tree structure ---

    /// Creates a layer below `parent`, or a root layer.
    pub fn add_layer(&mut self, name: &str, parent: Option<LayerKey>) -> Result<LayerKey> {
        if let Some(p) = parent {
            self.ensure_layer(p)?;
        }
        let key = self.layers.insert(LayerData {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            is_visible: true,
            color: DerivedColor::from_parent(),
            elements: Vec::new(),
        });
        match parent {
            Some(p) => {
                if let Some(l) = self.layers.get_mut(p) {
                    l.children.push(key);
                }
            }
            None => self.root_layers.push(key),
        }
        tracing::debug!(model = self.model_id.0, name, "Added layer");
        self.emit_property(PropertyTarget::Model, Property::Layers);
        Ok(key)
    }

    /// Deletes an empty layer. Layers holding geometry or sub-layers, and the
    /// default layer, cannot be removed.
    pub fn remove_layer(&mut self, layer: LayerKey) -> Result<()> {
        self.ensure_layer(layer)?;
        if layer == self.default_layer {
            return Err(Error::DefaultLayer);
        }
        if self
            .layers
            .get(layer)
            .is_some_and(|l| !l.elements.is_empty() || !l.children.is_empty())
        {
            return Err(Error::LayerNotEmpty(layer));
        }

        self.detach_layer(layer);
        self.layers.remove(layer);
        self.emit_property(PropertyTarget::Model, Property::Layers);
        Ok(())
    }

    /// Moves a layer below another one, or to the root.
    pub fn set_layer_parent(&mut self, layer: LayerKey, parent: Option<LayerKey>) -> Result<()> {
        self.ensure_layer(layer)?;
        if let Some(p) = parent {
            self.ensure_layer(p)?;
            if self.layer_ancestors(p).any(|a| a == layer) {
                return Err(Error::LayerCycle(layer));
            }
        }
        if self.layers.get(layer).is_some_and(|l| l.parent == parent) {
            return Ok(());
        }

        let before = self.capture_appearance(&[layer]);
        self.detach_layer(layer);
        if let Some(l) = self.layers.get_mut(layer) {
            l.parent = parent;
        }
        match parent {
            Some(p) => {
                if let Some(l) = self.layers.get_mut(p) {
                    l.children.push(layer);
                }
            }
            None => self.root_layers.push(layer),
        }

        self.emit_property(PropertyTarget::Layer(layer), Property::Parent);
        self.emit_appearance_changes(before, None);
        Ok(())
    }

    fn detach_layer(&mut self, layer: LayerKey) {
        match self.layers.get(layer).and_then(|l| l.parent) {
            Some(p) => {
                if let Some(l) = self.layers.get_mut(p) {
                    l.children.retain(|&c| c != layer);
                }
            }
            None => self.root_layers.retain(|&c| c != layer),
        }
    }

    /// `layer` followed by its ancestors up to the root.
    pub fn layer_ancestors(&self, layer: LayerKey) -> impl Iterator<Item = LayerKey> + '_ {
        std::iter::successors(Some(layer), move |&l| {
            self.layers.get(l).and_then(|d| d.parent)
        })
    }

    /// `layer` and every layer below it, breadth-first.
    pub fn layer_subtree(&self, layer: LayerKey) -> Vec<LayerKey> {
        let mut out = vec![layer];
        let mut i = 0;
        while i < out.len() {
            if let Some(l) = self.layers.get(out[i]) {
                out.extend(l.children.iter().copied());
            }
            i += 1;
        }
        out
    }

    pub fn set_layer_name(&mut self, layer: LayerKey, name: &str) -> Result<()> {
        let data = self.layers.get_mut(layer).ok_or(Error::LayerNotFound(layer))?;
        if data.name == name {
            return Ok(());
        }
        data.name = name.to_string();
        self.emit_property(PropertyTarget::Layer(layer), Property::Name);
        Ok(())
    }

    // --- Visibility ---

    /// Sets the local visibility flag of a layer.
    pub fn set_layer_visible(&mut self, layer: LayerKey, visible: bool) -> Result<()> {
        self.ensure_layer(layer)?;
        if self.layers.get(layer).is_some_and(|l| l.is_visible == visible) {
            return Ok(());
        }
        let before = self.capture_appearance(&[layer]);
        if let Some(l) = self.layers.get_mut(layer) {
            l.is_visible = visible;
        }
        self.emit_property(PropertyTarget::Layer(layer), Property::IsVisible);
        self.emit_appearance_changes(before, None);
        Ok(())
    }

    /// Sets the visibility of the whole model.
    pub fn set_model_visible(&mut self, visible: bool) {
        if self.is_visible == visible {
            return;
        }
        let roots = self.root_layers.clone();
        let before = self.capture_appearance(&roots);
        self.is_visible = visible;
        self.emit_property(PropertyTarget::Model, Property::IsVisible);
        self.emit_appearance_changes(before, None);
    }

    pub fn is_model_visible(&self) -> bool {
        self.is_visible
    }

    /// Sets the local visibility flag of a geometry.
    pub fn set_geometry_visible(&mut self, key: GeometryKey, visible: bool) -> Result<()> {
        let common = self.common(key).ok_or(Error::NotFound(key))?;
        if common.is_visible == visible {
            return Ok(());
        }
        let before = vec![(PropertyTarget::Geometry(key), self.appearance(PropertyTarget::Geometry(key)))];
        if let Some(c) = self.common_mut(key) {
            c.is_visible = visible;
        }
        self.emit_property(PropertyTarget::Geometry(key), Property::IsVisible);
        self.emit_appearance_changes(before, None);
        Ok(())
    }

    /// Whether the layer and all its ancestors (and the model) are visible.
    pub fn layer_actually_visible(&self, layer: LayerKey) -> bool {
        self.is_visible
            && self
                .layer_ancestors(layer)
                .all(|l| self.layers.get(l).is_some_and(|d| d.is_visible))
    }

    /// Whether a geometry is drawn: its own flag, its layer chain and the
    /// model must all be visible.
    pub fn is_actually_visible(&self, key: GeometryKey) -> bool {
        self.common(key)
            .is_some_and(|c| c.is_visible && self.layer_actually_visible(c.layer))
    }

    // --- Colors ---

    pub fn set_layer_color(&mut self, layer: LayerKey, color: DerivedColor) -> Result<()> {
        self.ensure_layer(layer)?;
        if self.layers.get(layer).is_some_and(|l| l.color == color) {
            return Ok(());
        }
        let before = self.capture_appearance(&[layer]);
        if let Some(l) = self.layers.get_mut(layer) {
            l.color = color;
        }
        let target = PropertyTarget::Layer(layer);
        self.emit_property(target, Property::Color);
        self.emit_appearance_changes(before, Some(target));
        Ok(())
    }

    pub fn set_geometry_color(&mut self, key: GeometryKey, color: DerivedColor) -> Result<()> {
        let common = self.common_mut(key).ok_or(Error::NotFound(key))?;
        if common.color == color {
            return Ok(());
        }
        common.color = color;
        self.emit_property(PropertyTarget::Geometry(key), Property::Color);
        Ok(())
    }

    /// Effective color of a layer.
    pub fn layer_color(&self, layer: LayerKey) -> Color {
        let chain: Vec<LayerKey> = self.layer_ancestors(layer).collect();
        chain
            .iter()
            .rev()
            .filter_map(|&l| self.layers.get(l))
            .fold(self.config.default_color, |parent, l| l.color.resolve(parent))
    }

    /// Effective color of a geometry.
    pub fn geometry_color(&self, key: GeometryKey) -> Option<Color> {
        let common = self.common(key)?;
        Some(common.color.resolve(self.layer_color(common.layer)))
    }

    // --- Layer assignment ---

    /// Moves a geometry to another layer.
    pub fn set_geometry_layer(&mut self, key: GeometryKey, layer: LayerKey) -> Result<()> {
        self.ensure_layer(layer)?;
        let common = self.common(key).ok_or(Error::NotFound(key))?;
        let (old, in_model) = (common.layer, common.in_model);
        if old == layer {
            return Ok(());
        }

        let target = PropertyTarget::Geometry(key);
        let before = vec![(target, self.appearance(target))];
        if in_model {
            if let Some(l) = self.layers.get_mut(old) {
                l.elements.retain(|&e| e != key);
            }
            if let Some(l) = self.layers.get_mut(layer) {
                l.elements.push(key);
            }
        }
        if let Some(c) = self.common_mut(key) {
            c.layer = layer;
        }

        self.emit_property(target, Property::Layer);
        self.emit_appearance_changes(before, None);
        Ok(())
    }

    // --- Cascade bookkeeping ---

    fn appearance(&self, target: PropertyTarget) -> Appearance {
        match target {
            PropertyTarget::Geometry(key) => (
                self.is_actually_visible(key),
                self.geometry_color(key).unwrap_or(self.config.default_color),
            ),
            PropertyTarget::Layer(layer) => {
                (self.layer_actually_visible(layer), self.layer_color(layer))
            }
            PropertyTarget::Model => (self.is_visible, self.config.default_color),
        }
    }

    /// Effective values of every layer below `roots` and of their geometry.
    fn capture_appearance(&self, roots: &[LayerKey]) -> Vec<(PropertyTarget, Appearance)> {
        let mut out = Vec::new();
        for &root in roots {
            for layer in self.layer_subtree(root) {
                let target = PropertyTarget::Layer(layer);
                out.push((target, self.appearance(target)));
                if let Some(l) = self.layers.get(layer) {
                    for &key in &l.elements {
                        let target = PropertyTarget::Geometry(key);
                        out.push((target, self.appearance(target)));
                    }
                }
            }
        }
        out
    }

    /// Emits visibility and color notifications for captured targets whose
    /// effective value changed. `already_notified` suppresses a second color
    /// notification for the target that was edited directly.
    fn emit_appearance_changes(
        &mut self,
        before: Vec<(PropertyTarget, Appearance)>,
        already_notified: Option<PropertyTarget>,
    ) {
        let mut seen = FxHashSet::default();
        for (target, (was_visible, old_color)) in before {
            if !seen.insert(target) {
                continue;
            }
            let (visible, color) = self.appearance(target);
            if visible != was_visible {
                self.emit_property(target, Property::IsActuallyVisible);
            }
            if color != old_color && already_notified != Some(target) {
                self.emit_property(target, Property::Color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::Recorder;
    use crate::events::ModelEvent;
    use nalgebra::Point3;

    #[test]
    fn nested_visibility_cascades_once_per_entity() {
        let mut model = GeometryModel::default();
        let root = model.add_layer("root", None).unwrap();
        let child = model.add_layer("child", Some(root)).unwrap();
        let grandchild = model.add_layer("grandchild", Some(child)).unwrap();
        let a = model.add_vertex(child, "a", Point3::origin()).unwrap();
        let b = model.add_vertex(grandchild, "b", Point3::origin()).unwrap();
        let recorder = Recorder::attach(&mut model);

        model.set_layer_visible(root, false).unwrap();

        assert!(!model.is_actually_visible(a.into()));
        assert!(!model.is_actually_visible(b.into()));
        assert!(!model.layer_actually_visible(grandchild));
        // Local flags are untouched.
        assert!(model.vertex(b).unwrap().common.is_visible);

        let rec = recorder.borrow();
        for target in [
            PropertyTarget::Layer(root),
            PropertyTarget::Layer(child),
            PropertyTarget::Layer(grandchild),
            PropertyTarget::Geometry(a.into()),
            PropertyTarget::Geometry(b.into()),
        ] {
            assert_eq!(rec.property_count(target, Property::IsActuallyVisible), 1);
        }
        assert_eq!(
            rec.property_count(PropertyTarget::Layer(root), Property::IsVisible),
            1
        );
    }

    #[test]
    fn hidden_geometry_is_not_notified_again() {
        let mut model = GeometryModel::default();
        let layer = model.add_layer("l", None).unwrap();
        let v = model.add_vertex(layer, "v", Point3::origin()).unwrap();
        model.set_geometry_visible(v.into(), false).unwrap();
        let recorder = Recorder::attach(&mut model);

        model.set_layer_visible(layer, false).unwrap();
        assert_eq!(
            recorder
                .borrow()
                .property_count(PropertyTarget::Geometry(v.into()), Property::IsActuallyVisible),
            0
        );
    }

    #[test]
    fn model_visibility_hides_everything() {
        let mut model = GeometryModel::default();
        let layer = model.default_layer();
        let v = model.add_vertex(layer, "v", Point3::origin()).unwrap();
        model.set_model_visible(false);
        assert!(!model.is_actually_visible(v.into()));
        model.set_model_visible(true);
        assert!(model.is_actually_visible(v.into()));
    }

    #[test]
    fn colors_resolve_through_layers() {
        let mut model = GeometryModel::default();
        let root = model.add_layer("root", None).unwrap();
        let child = model.add_layer("child", Some(root)).unwrap();
        let v = model.add_vertex(child, "v", Point3::origin()).unwrap();
        let red = Color::rgb(255, 0, 0);
        let blue = Color::rgb(0, 0, 255);

        assert_eq!(model.geometry_color(v.into()), Some(model.config().default_color));

        let recorder = Recorder::attach(&mut model);
        model.set_layer_color(root, DerivedColor::local(red)).unwrap();
        assert_eq!(model.layer_color(child), red);
        assert_eq!(model.geometry_color(v.into()), Some(red));
        {
            let rec = recorder.borrow();
            assert_eq!(rec.property_count(PropertyTarget::Layer(root), Property::Color), 1);
            assert_eq!(rec.property_count(PropertyTarget::Layer(child), Property::Color), 1);
            assert_eq!(
                rec.property_count(PropertyTarget::Geometry(v.into()), Property::Color),
                1
            );
        }

        model.set_geometry_color(v.into(), DerivedColor::local(blue)).unwrap();
        assert_eq!(model.geometry_color(v.into()), Some(blue));
        assert_eq!(model.layer_color(child), red);
    }

    #[test]
    fn reparenting_into_own_subtree_fails() {
        let mut model = GeometryModel::default();
        let root = model.add_layer("root", None).unwrap();
        let child = model.add_layer("child", Some(root)).unwrap();
        assert!(matches!(
            model.set_layer_parent(root, Some(child)),
            Err(Error::LayerCycle(_))
        ));
        assert!(matches!(
            model.set_layer_parent(root, Some(root)),
            Err(Error::LayerCycle(_))
        ));
    }

    #[test]
    fn reparenting_moves_between_lists() {
        let mut model = GeometryModel::default();
        let a = model.add_layer("a", None).unwrap();
        let b = model.add_layer("b", Some(a)).unwrap();
        model.set_layer_parent(b, None).unwrap();
        assert!(model.layer(a).unwrap().children.is_empty());
        assert!(model.root_layers().contains(&b));
        assert_eq!(model.layer(b).unwrap().parent, None);
    }

    #[test]
    fn remove_layer_rules() {
        let mut model = GeometryModel::default();
        let recorder = Recorder::attach(&mut model);
        let a = model.add_layer("a", None).unwrap();
        let b = model.add_layer("b", Some(a)).unwrap();
        assert!(matches!(model.remove_layer(a), Err(Error::LayerNotEmpty(_))));
        assert!(matches!(
            model.remove_layer(model.default_layer()),
            Err(Error::DefaultLayer)
        ));
        let v = model.add_vertex(b, "v", Point3::origin()).unwrap();
        assert!(matches!(model.remove_layer(b), Err(Error::LayerNotEmpty(_))));
        model.set_geometry_layer(v.into(), a).unwrap();
        model.remove_layer(b).unwrap();
        assert!(model.layer(b).is_none());
        assert_eq!(model.layer(a).unwrap().elements, vec![v.into()]);
        assert_eq!(
            recorder
                .borrow()
                .property_count(PropertyTarget::Model, Property::Layers),
            3
        );
    }

    #[test]
    fn moving_geometry_to_a_hidden_layer() {
        let mut model = GeometryModel::default();
        let hidden = model.add_layer("hidden", None).unwrap();
        model.set_layer_visible(hidden, false).unwrap();
        let v = model
            .add_vertex(model.default_layer(), "v", Point3::origin())
            .unwrap();
        let recorder = Recorder::attach(&mut model);

        model.set_geometry_layer(v.into(), hidden).unwrap();

        let rec = recorder.borrow();
        assert_eq!(
            rec.events,
            vec![
                ModelEvent::PropertyChanged {
                    target: PropertyTarget::Geometry(v.into()),
                    property: Property::Layer,
                },
                ModelEvent::PropertyChanged {
                    target: PropertyTarget::Geometry(v.into()),
                    property: Property::IsActuallyVisible,
                },
            ]
        );
    }
}
