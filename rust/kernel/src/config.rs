// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model configuration, optionally loaded from environment variables.

use crate::color::Color;

/// Settings applied when a [`GeometryModel`](crate::GeometryModel) is created.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Validate chain continuity and closure. Only disable this while loading
    /// data that is known to be valid.
    pub handle_consistency: bool,
    /// Name of the layer every new model starts with.
    pub default_layer_name: String,
    /// Color root layers inherit when their color follows the parent.
    pub default_color: Color,
    /// Initial value of the model-wide visibility flag.
    pub is_visible: bool,
}

impl ModelConfig {
    /// Load configuration from environment variables, falling back to
    /// [`ModelConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            handle_consistency: std::env::var("BREP_HANDLE_CONSISTENCY")
                .ok()
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.handle_consistency),
            default_layer_name: std::env::var("BREP_DEFAULT_LAYER")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.default_layer_name),
            default_color: std::env::var("BREP_DEFAULT_COLOR")
                .ok()
                .and_then(|v| Color::from_hex(v.trim()))
                .unwrap_or(defaults.default_color),
            is_visible: defaults.is_visible,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            handle_consistency: true,
            default_layer_name: "Default".into(),
            default_color: Color::BLACK,
            is_visible: true,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
