// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Affine transformations of geometry.
//!
//! Transforms move the vertices an entity is built from. Everything referencing
//! those vertices moves with them. Each call runs as one batch operation, so
//! observers see a single geometry-changed set no matter how many vertices
//! moved.

use nalgebra::{Matrix4, Point3, Rotation3, Unit, UnitQuaternion, Vector3};

use crate::error::Result;
use crate::keys::*;
use crate::model::GeometryModel;

impl GeometryModel {
    /// Translates every vertex of `key` by `offset`.
    pub fn translate(&mut self, key: GeometryKey, offset: Vector3<f64>) -> Result<()> {
        self.map_vertices(key, |p| p + offset)
    }

    /// Rotates every vertex of `key` around the axis through `origin`.
    ///
    /// A degenerate axis leaves the geometry untouched. Proxy geometries
    /// also have their own rotation updated.
    pub fn rotate(
        &mut self,
        key: GeometryKey,
        origin: Point3<f64>,
        axis: Vector3<f64>,
        angle: f64,
    ) -> Result<()> {
        let Some(unit_axis) = Unit::try_new(axis, 1e-15) else {
            return Ok(());
        };
        let rotation = Rotation3::from_axis_angle(&unit_axis, angle);

        self.batch(|m| {
            m.map_vertices(key, |p| origin + rotation * (p - origin))?;
            if let GeometryKey::Proxy(pk) = key {
                if let Some(proxy) = m.proxy(pk) {
                    let size = proxy.size;
                    let turned = UnitQuaternion::from_rotation_matrix(&rotation) * proxy.rotation;
                    m.set_proxy_transform(pk, size, turned)?;
                }
            }
            Ok(())
        })
    }

    /// Scales every vertex of `key` relative to `origin`.
    pub fn scale(&mut self, key: GeometryKey, origin: Point3<f64>, factors: Vector3<f64>) -> Result<()> {
        self.map_vertices(key, |p| origin + (p - origin).component_mul(&factors))
    }

    /// Applies a homogeneous transformation to every vertex of `key`.
    pub fn transform(&mut self, key: GeometryKey, matrix: &Matrix4<f64>) -> Result<()> {
        self.map_vertices(key, |p| matrix.transform_point(&p))
    }

    fn map_vertices(&mut self, key: GeometryKey, f: impl Fn(Point3<f64>) -> Point3<f64>) -> Result<()> {
        self.ensure_in_model(key)?;
        let vertex_keys = self.geometry_vertices(key);
        self.batch(|m| {
            for vk in vertex_keys {
                if let Some(p) = m.vertex_position(vk) {
                    m.set_vertex_position(vk, f(p))?;
                }
            }
            Ok(())
        })
    }
}
