// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Orientation propagation across the faces of a volume.
//!
//! Two faces sharing an edge are consistently oriented when they traverse
//! that edge in opposite directions. Starting from the first face of each
//! connected component (taken as forward), the PFace orientations are
//! propagated breadth-first over shared edges.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::keys::*;
use crate::model::{GeometryModel, Orientation};

/// One traversal of an edge by a face of the volume.
#[derive(Debug, Clone, Copy)]
struct EdgeUse {
    /// Index into the active PFace list.
    pface: usize,
    /// `+1` if the face runs along the edge direction, `-1` otherwise.
    direction: i8,
}

impl GeometryModel {
    /// Recomputes PFace orientations and the consistency flag of `volume`.
    ///
    /// Returns `true` if the consistency flag changed.
    pub(crate) fn update_volume_orientation(&mut self, volume: VolumeKey) -> bool {
        let Some(pface_keys) = self.volumes.get(volume).map(|v| v.pfaces.clone()) else {
            return false;
        };

        // PFaces whose face is still registered take part in the propagation.
        let active: Vec<PFaceKey> = pface_keys
            .iter()
            .copied()
            .filter(|&pk| {
                self.pfaces
                    .get(pk)
                    .and_then(|p| self.faces.get(p.face))
                    .is_some_and(|f| f.common.in_model)
            })
            .collect();

        let mut uses: FxHashMap<EdgeKey, Vec<EdgeUse>> = FxHashMap::default();
        let mut incomplete = false;
        for (index, &pk) in active.iter().enumerate() {
            let Some(face) = self.pfaces.get(pk).and_then(|p| self.faces.get(p.face)) else {
                continue;
            };
            let face_sign = face.orientation.sign().unwrap_or(1);
            for lk in face.loops() {
                let Some(edge_loop) = self.edge_loops.get(lk) else {
                    incomplete = true;
                    continue;
                };
                for &pe in &edge_loop.pedges {
                    let Some(p) = self.pedges.get(pe) else {
                        continue;
                    };
                    match p.orientation.sign() {
                        Some(sign) => uses.entry(p.edge).or_default().push(EdgeUse {
                            pface: index,
                            direction: sign * face_sign,
                        }),
                        None => incomplete = true,
                    }
                }
            }
        }

        // Adjacency: for each PFace, the (edge, direction) pairs it uses.
        let mut by_pface: Vec<Vec<(EdgeKey, i8)>> = vec![Vec::new(); active.len()];
        for (&edge, list) in &uses {
            for u in list {
                by_pface[u.pface].push((edge, u.direction));
            }
        }

        let mut signs: Vec<Option<i8>> = vec![None; active.len()];
        let mut conflict = false;

        for seed in 0..active.len() {
            if signs[seed].is_some() {
                continue;
            }
            let has_neighbour = by_pface[seed]
                .iter()
                .any(|(edge, _)| uses[edge].iter().any(|u| u.pface != seed));
            if !has_neighbour {
                continue;
            }

            signs[seed] = Some(1);
            let mut queue = VecDeque::from([seed]);
            while let Some(current) = queue.pop_front() {
                let Some(current_sign) = signs[current] else {
                    continue;
                };
                for &(edge, direction) in &by_pface[current] {
                    for other in &uses[&edge] {
                        if other.pface == current {
                            continue;
                        }
                        // Neighbours must run the shared edge the other way.
                        let required = -current_sign * direction * other.direction;
                        match signs[other.pface] {
                            None => {
                                signs[other.pface] = Some(required);
                                queue.push_back(other.pface);
                            }
                            Some(existing) if existing != required => conflict = true,
                            Some(_) => {}
                        }
                    }
                }
            }
        }

        let open = uses.values().any(|list| list.len() == 1);
        let all_defined = signs.iter().all(Option::is_some);
        let consistent =
            !active.is_empty() && all_defined && !conflict && !open && !incomplete;

        for pk in &pface_keys {
            if let Some(p) = self.pfaces.get_mut(*pk) {
                p.orientation = Orientation::Undefined;
            }
        }
        for (index, &pk) in active.iter().enumerate() {
            if let (Some(p), Some(sign)) = (self.pfaces.get_mut(pk), signs[index]) {
                p.orientation = Orientation::from_sign(sign);
            }
        }

        let Some(data) = self.volumes.get_mut(volume) else {
            return false;
        };
        let changed = data.is_consistent_oriented != consistent;
        data.is_consistent_oriented = consistent;
        if changed && !consistent {
            tracing::warn!(
                model = self.model_id.0,
                id = data.common.id,
                conflict,
                open,
                "Volume is no longer consistently oriented"
            );
        } else if changed {
            tracing::debug!(model = self.model_id.0, id = data.common.id, "Volume orientation restored");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    /// Builds a unit square face in the z = 0 plane with the given winding.
    fn square(model: &mut GeometryModel, v: [VertexKey; 4]) -> FaceKey {
        let layer = model.default_layer();
        crate::construction::make_rectangle(model, layer, v).unwrap().0
    }

    fn grid(model: &mut GeometryModel) -> Vec<VertexKey> {
        let layer = model.default_layer();
        [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 1.0]]
            .iter()
            .map(|c| model.add_vertex(layer, "", Point3::new(c[0], c[1], 0.0)).unwrap())
            .collect()
    }

    #[test]
    fn opposite_windings_are_aligned() {
        let mut model = GeometryModel::default();
        let v = grid(&mut model);
        let left = square(&mut model, [v[0], v[1], v[4], v[3]]);
        // Same winding sense as `left`: shared edge v1-v4 is traversed the
        // other way, so both PFaces stay forward.
        let right = square(&mut model, [v[1], v[2], v[5], v[4]]);
        let layer = model.default_layer();
        let vol = model.add_volume(layer, "sheet", &[left, right]).unwrap();

        let pfaces = model.volume(vol).unwrap().pfaces.clone();
        assert_eq!(model.pface(pfaces[0]).unwrap().orientation, Orientation::Forward);
        assert_eq!(model.pface(pfaces[1]).unwrap().orientation, Orientation::Forward);
        // Open sheet: boundary edges are used once.
        assert_eq!(model.is_consistent_oriented(vol), Some(false));
    }

    #[test]
    fn flipped_neighbour_is_reversed() {
        let mut model = GeometryModel::default();
        let v = grid(&mut model);
        let left = square(&mut model, [v[0], v[1], v[4], v[3]]);
        let right = square(&mut model, [v[1], v[4], v[5], v[2]]);
        let layer = model.default_layer();
        let vol = model.add_volume(layer, "sheet", &[left, right]).unwrap();

        let pfaces = model.volume(vol).unwrap().pfaces.clone();
        assert_eq!(model.pface(pfaces[0]).unwrap().orientation, Orientation::Forward);
        assert_eq!(model.pface(pfaces[1]).unwrap().orientation, Orientation::Backward);
    }

    #[test]
    fn isolated_face_stays_undefined() {
        let mut model = GeometryModel::default();
        let v = grid(&mut model);
        let face = square(&mut model, [v[0], v[1], v[4], v[3]]);
        let layer = model.default_layer();
        let vol = model.add_volume(layer, "single", &[face]).unwrap();

        let pf = model.volume(vol).unwrap().pfaces[0];
        assert_eq!(model.pface(pf).unwrap().orientation, Orientation::Undefined);
        assert_eq!(model.is_consistent_oriented(vol), Some(false));
    }
}
