// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Continuity and closure of edge chains.
//!
//! An edge loop or polyline is valid when every edge shares a vertex with its
//! successor (and, for loops, the last edge connects back to the first). The
//! orientation of each PEdge falls out of the same walk: the first edge is
//! oriented towards its successor and every following edge starts where the
//! previous one ended.

use crate::error::{Error, Result};
use crate::keys::*;
use crate::model::{GeometryModel, Orientation};

impl GeometryModel {
    /// Derives the PEdge orientations for an ordered edge sequence.
    ///
    /// Fails if the sequence is shorter than the chain minimum, if two
    /// consecutive edges do not share a vertex, or if a closed chain does not
    /// end where it started.
    pub fn orient_chain(&self, edge_keys: &[EdgeKey], closed: bool) -> Result<Vec<Orientation>> {
        let (what, min) = if closed {
            ("edge loop", 3)
        } else {
            ("polyline", 1)
        };
        if edge_keys.len() < min {
            return Err(Error::TooFewElements {
                what,
                min,
                found: edge_keys.len(),
            });
        }

        let edge = |i: usize| {
            self.edges
                .get(edge_keys[i])
                .ok_or(Error::NotFound(GeometryKey::Edge(edge_keys[i])))
        };

        let mut orientations = Vec::with_capacity(edge_keys.len());

        if edge_keys.len() == 1 {
            orientations.push(Orientation::Forward);
        } else {
            // Orient the first edge towards the second one
            let first = edge(0)?;
            let second = edge(1)?;
            if second.contains_vertex(first.vertices[1]) {
                orientations.push(Orientation::Forward);
            } else if second.contains_vertex(first.vertices[0]) {
                orientations.push(Orientation::Backward);
            } else {
                return Err(Error::DisconnectedChain {
                    chain: None,
                    from: 0,
                    to: 1,
                });
            }

            for i in 1..edge_keys.len() {
                let prev_end = edge(i - 1)?.end(orientations[i - 1]);
                let curr = edge(i)?;

                if curr.vertices[0] == prev_end {
                    orientations.push(Orientation::Forward);
                } else if curr.vertices[1] == prev_end {
                    orientations.push(Orientation::Backward);
                } else {
                    return Err(Error::DisconnectedChain {
                        chain: None,
                        from: i - 1,
                        to: i,
                    });
                }
            }
        }

        if closed {
            let n = edge_keys.len();
            let last_end = edge(n - 1)?.end(orientations[n - 1]);
            let first_start = edge(0)?.start(orientations[0]);
            if last_end != first_start {
                return Err(Error::OpenLoop(None));
            }
        }

        Ok(orientations)
    }

    /// Checks a prospective edge sequence for `chain` when validation is
    /// enabled.
    pub(crate) fn check_chain_edges(&self, chain: ChainKey, edge_keys: &[EdgeKey]) -> Result<()> {
        if !self.config.handle_consistency {
            return Ok(());
        }
        self.orient_chain(edge_keys, chain.is_closed())
            .map(|_| ())
            .map_err(|e| e.in_chain(chain))
    }

    /// Returns the edges of a chain in order.
    pub fn chain_edges(&self, chain: ChainKey) -> Option<Vec<EdgeKey>> {
        let pedges = self.chain_pedges(chain)?;
        pedges
            .iter()
            .map(|&pk| self.pedges.get(pk).map(|p| p.edge))
            .collect()
    }

    /// Re-derives orientations and next/prev links of every PEdge in `chain`.
    ///
    /// When the chain is not valid the links are still rebuilt, the
    /// orientations become [`Orientation::Undefined`] and the validation error
    /// is returned.
    pub(crate) fn refresh_chain(&mut self, chain: ChainKey) -> Result<()> {
        let pedges = self
            .chain_pedges(chain)
            .ok_or(Error::NotFound(chain.into()))?
            .to_vec();
        let edge_keys = self
            .chain_edges(chain)
            .ok_or(Error::NotFound(chain.into()))?;
        let oriented = self.orient_chain(&edge_keys, chain.is_closed());

        let n = pedges.len();
        for (i, &pk) in pedges.iter().enumerate() {
            let (next, prev) = if chain.is_closed() {
                (Some(pedges[(i + 1) % n]), Some(pedges[(i + n - 1) % n]))
            } else {
                (
                    pedges.get(i + 1).copied(),
                    i.checked_sub(1).map(|j| pedges[j]),
                )
            };
            let orientation = match &oriented {
                Ok(o) => o[i],
                Err(_) => Orientation::Undefined,
            };
            if let Some(p) = self.pedges.get_mut(pk) {
                p.next = next;
                p.prev = prev;
                p.orientation = orientation;
            }
        }

        oriented.map(|_| ()).map_err(|e| e.in_chain(chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn vertices(model: &mut GeometryModel, n: usize) -> Vec<VertexKey> {
        let layer = model.default_layer();
        (0..n)
            .map(|i| {
                let angle = i as f64 / n as f64 * std::f64::consts::TAU;
                model
                    .add_vertex(layer, "v", Point3::new(angle.cos(), angle.sin(), 0.0))
                    .unwrap()
            })
            .collect()
    }

    fn edge(model: &mut GeometryModel, a: VertexKey, b: VertexKey) -> EdgeKey {
        let layer = model.default_layer();
        model.add_edge(layer, "e", [a, b]).unwrap()
    }

    #[test]
    fn triangle_is_forward() {
        let mut model = GeometryModel::default();
        let v = vertices(&mut model, 3);
        let e = [
            edge(&mut model, v[0], v[1]),
            edge(&mut model, v[1], v[2]),
            edge(&mut model, v[2], v[0]),
        ];
        let o = model.orient_chain(&e, true).unwrap();
        assert_eq!(o, vec![Orientation::Forward; 3]);
    }

    #[test]
    fn reversed_edges_are_detected() {
        let mut model = GeometryModel::default();
        let v = vertices(&mut model, 3);
        let e = [
            edge(&mut model, v[1], v[0]),
            edge(&mut model, v[2], v[1]),
            edge(&mut model, v[2], v[0]),
        ];
        let o = model.orient_chain(&e, true).unwrap();
        assert_eq!(
            o,
            vec![Orientation::Backward, Orientation::Backward, Orientation::Forward]
        );
    }

    #[test]
    fn two_edges_are_too_few_for_a_loop() {
        let mut model = GeometryModel::default();
        let v = vertices(&mut model, 3);
        let e = [edge(&mut model, v[0], v[1]), edge(&mut model, v[1], v[2])];
        let err = model.orient_chain(&e, true).unwrap_err();
        assert!(matches!(err, Error::TooFewElements { min: 3, found: 2, .. }));
        // The same edges make a valid polyline.
        assert!(model.orient_chain(&e, false).is_ok());
    }

    #[test]
    fn open_sequence_is_rejected_for_loops() {
        let mut model = GeometryModel::default();
        let v = vertices(&mut model, 4);
        let e = [
            edge(&mut model, v[0], v[1]),
            edge(&mut model, v[1], v[2]),
            edge(&mut model, v[2], v[3]),
        ];
        assert!(matches!(model.orient_chain(&e, true), Err(Error::OpenLoop(None))));
        assert!(model.orient_chain(&e, false).is_ok());
    }

    #[test]
    fn gap_is_reported_with_position() {
        let mut model = GeometryModel::default();
        let v = vertices(&mut model, 4);
        let e = [
            edge(&mut model, v[0], v[1]),
            edge(&mut model, v[1], v[2]),
            edge(&mut model, v[0], v[3]),
        ];
        let err = model.orient_chain(&e, true).unwrap_err();
        assert!(matches!(err, Error::DisconnectedChain { from: 1, to: 2, .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Fatal);
    }

    #[test]
    fn single_edge_polyline() {
        let mut model = GeometryModel::default();
        let v = vertices(&mut model, 2);
        let e = [edge(&mut model, v[0], v[1])];
        assert_eq!(
            model.orient_chain(&e, false).unwrap(),
            vec![Orientation::Forward]
        );
        assert!(model.orient_chain(&[], false).is_err());
    }
}
