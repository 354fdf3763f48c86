// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Renderer configuration.
//!
//! A [`RendererConfig`] is built by the host (usually with
//! [`RendererConfig::default`] or from a JSON document) and handed to the
//! backend context at startup. Values are validated once, up front.

use crate::renderer::api::backend::BackendKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The hard upper bound on frames in flight, whatever the platform reports.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 4;

/// Global settings for the rendering pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Which backend the factory instantiates.
    pub backend: BackendKind,
    /// Desired number of frames whose GPU work may overlap CPU recording.
    /// The surface clamps it to what the platform supports.
    pub frames_in_flight: u32,
    /// Initial surface width in pixels.
    pub width: u32,
    /// Initial surface height in pixels.
    pub height: u32,
    /// Enables vertical synchronisation on the presentation surface.
    pub vsync: bool,
    /// Treat attachment mismatches as fatal errors instead of skipping the pass.
    pub strict_validation: bool,
    /// Upper bound for a frame-slot fence wait, in milliseconds.
    pub fence_timeout_ms: u64,
    /// Size in bytes of each per-frame uniform ring buffer.
    pub uniform_ring_size: u64,
    /// Shadow atlas settings.
    pub shadow: ShadowConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Explicit,
            frames_in_flight: 2,
            width: 1280,
            height: 720,
            vsync: true,
            strict_validation: cfg!(debug_assertions),
            fence_timeout_ms: 1000,
            uniform_ring_size: 4 * 1024 * 1024,
            shadow: ShadowConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Parses and validates a configuration from a JSON document.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::InvalidValue {
                field: "frames_in_flight",
                reason: format!("must be within 1..={MAX_FRAMES_IN_FLIGHT}"),
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "width/height",
                reason: "surface size must be non-zero".to_string(),
            });
        }
        if self.uniform_ring_size < 256 {
            return Err(ConfigError::InvalidValue {
                field: "uniform_ring_size",
                reason: "must hold at least one 256 byte block".to_string(),
            });
        }
        self.shadow.validate()
    }

    /// The fence wait bound as a [`Duration`].
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }
}

/// Shadow atlas settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Width and height of the shared shadow atlas in pixels.
    pub atlas_size: u32,
    /// Resolution of a LOD 0 tile. LOD `n` tiles use `tile_resolution >> n`.
    pub tile_resolution: u32,
    /// Number of cascades for directional lights.
    pub max_lods: u32,
    /// Tiles not requested for this many frames are returned to the atlas.
    pub max_tile_age: u64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            atlas_size: 4096,
            tile_resolution: 1024,
            max_lods: 4,
            max_tile_age: 8,
        }
    }
}

impl ShadowConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_resolution == 0 || self.atlas_size < self.tile_resolution {
            return Err(ConfigError::InvalidValue {
                field: "shadow.tile_resolution",
                reason: "must be non-zero and fit inside the atlas".to_string(),
            });
        }
        if self.atlas_size % self.tile_resolution != 0 {
            return Err(ConfigError::InvalidValue {
                field: "shadow.atlas_size",
                reason: "must be a multiple of the tile resolution".to_string(),
            });
        }
        if self.max_lods == 0 || self.max_lods > self.lod_limit() {
            return Err(ConfigError::InvalidValue {
                field: "shadow.max_lods",
                reason: format!(
                    "must be between 1 and {} so every LOD keeps at least one pixel",
                    self.lod_limit()
                ),
            });
        }
        Ok(())
    }

    /// Most LODs the tile resolution can be halved into.
    fn lod_limit(&self) -> u32 {
        u32::BITS - self.tile_resolution.max(1).leading_zeros()
    }

    /// `max_lods` clamped to what the tile resolution allows, at least one.
    pub fn lod_count(&self) -> u32 {
        self.max_lods.clamp(1, self.lod_limit())
    }

    /// Number of tile cells along one side of the atlas.
    pub fn cells_per_side(&self) -> u32 {
        self.atlas_size / self.tile_resolution.max(1)
    }
}

/// An error raised while loading or validating a [`RendererConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The document could not be parsed.
    Parse(String),
    /// A field holds an unusable value.
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "Failed to parse renderer config: {msg}"),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid renderer config value for '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RendererConfig::default().validate().is_ok());
        assert_eq!(ShadowConfig::default().cells_per_side(), 4);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            RendererConfig::from_json_str(r#"{ "backend": "immediate", "frames_in_flight": 3 }"#)
                .unwrap();
        assert_eq!(config.backend, BackendKind::Immediate);
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.shadow, ShadowConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = RendererConfig::from_json_str(r#"{ "frames_in_flight": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "frames_in_flight",
                ..
            }
        ));

        let err =
            RendererConfig::from_json_str(r#"{ "shadow": { "atlas_size": 1000 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        assert!(matches!(
            RendererConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn out_of_range_lod_counts_are_rejected() {
        for max_lods in [0, 12, 33, 40, u32::MAX] {
            let config = RendererConfig {
                shadow: ShadowConfig {
                    max_lods,
                    ..ShadowConfig::default()
                },
                ..RendererConfig::default()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::InvalidValue {
                        field: "shadow.max_lods",
                        ..
                    })
                ),
                "max_lods {max_lods} was accepted"
            );
        }

        // 1024 halves down to a single pixel at LOD 10.
        let deepest = ShadowConfig {
            max_lods: 11,
            ..ShadowConfig::default()
        };
        assert_eq!(deepest.lod_count(), 11);
        assert_eq!(
            ShadowConfig {
                max_lods: 40,
                ..ShadowConfig::default()
            }
            .lod_count(),
            11
        );
    }
}
