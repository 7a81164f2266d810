// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Colors and parent-derived colors.
//!
//! A [`DerivedColor`] either carries its own color or borrows the effective
//! color of its parent: the owning layer for geometry, the parent layer for a
//! layer, and the model's default color for a root layer. Resolution happens
//! in the model, so a parent change is visible immediately.

use serde::{Deserialize, Serialize};

/// An RGBA color with 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    /// Creates an opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Creates a color with alpha.
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parses `#rrggbb` or `#rrggbbaa` (the leading `#` is optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// Where a [`DerivedColor`] takes its effective value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorSource {
    /// The locally stored color.
    Local,
    /// The parent's effective color.
    FromParent,
}

/// A color that is either local or inherited from the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedColor {
    /// Stored color, used when `source` is [`ColorSource::Local`].
    pub local: Color,
    pub source: ColorSource,
}

impl DerivedColor {
    /// A color that always resolves to `color`.
    pub fn local(color: Color) -> Self {
        Self {
            local: color,
            source: ColorSource::Local,
        }
    }

    /// A color that follows the parent.
    pub fn from_parent() -> Self {
        Self {
            local: Color::default(),
            source: ColorSource::FromParent,
        }
    }

    pub fn is_from_parent(&self) -> bool {
        self.source == ColorSource::FromParent
    }

    /// Resolves the effective color given the parent's effective color.
    pub fn resolve(&self, parent: Color) -> Color {
        match self.source {
            ColorSource::Local => self.local,
            ColorSource::FromParent => parent,
        }
    }
}

impl Default for DerivedColor {
    fn default() -> Self {
        Self::from_parent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex() {
        assert_eq!(Color::from_hex("#ff8000"), Some(Color::rgb(255, 128, 0)));
        assert_eq!(
            Color::from_hex("10203040"),
            Some(Color::rgba(0x10, 0x20, 0x30, 0x40))
        );
        assert_eq!(Color::from_hex("#fff"), None);
        assert_eq!(Color::from_hex("#gg0000"), None);
    }

    #[test]
    fn display_round_trips_through_hex() {
        let c = Color::rgba(1, 2, 3, 4);
        assert_eq!(Color::from_hex(&c.to_string()), Some(c));
    }

    #[test]
    fn resolve_follows_source() {
        let parent = Color::rgb(9, 9, 9);
        assert_eq!(DerivedColor::local(Color::WHITE).resolve(parent), Color::WHITE);
        assert_eq!(DerivedColor::from_parent().resolve(parent), parent);
        assert!(DerivedColor::default().is_from_parent());
    }
}
