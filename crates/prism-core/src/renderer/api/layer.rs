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

//! Render layers and the rule table deciding which materials may draw in them.

use super::shader::FragmentVariant;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Selects the render phase a draw belongs to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LayerMask: u32 {
        /// Opaque geometry written to the G-buffer.
        const DEFAULT = 1 << 0;
        /// Object-id picking.
        const RAYCAST = 1 << 1;
        /// Depth-only shadow casters.
        const SHADOWCAST = 1 << 2;
        /// Light volumes accumulated into the emissive buffer.
        const LIGHT = 1 << 3;
        /// Blended geometry drawn after lighting.
        const TRANSLUCENT = 1 << 4;
        /// Screen-space overlays.
        const UI = 1 << 5;
    }
}

/// How a material combines its output with the render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending; writes replace the target.
    #[default]
    Opaque,
    /// Alpha blending (`src * a + dst * (1 - a)`).
    Translucent,
    /// Additive blending (`src + dst`).
    Additive,
}

impl BlendMode {
    /// Returns `true` for every mode that reads back the target.
    pub fn is_blending(&self) -> bool {
        !matches!(self, BlendMode::Opaque)
    }

    /// The layers a material with this blend mode accepts by default.
    pub fn default_layers(&self) -> LayerMask {
        if self.is_blending() {
            LayerMask::TRANSLUCENT | LayerMask::RAYCAST
        } else {
            LayerMask::DEFAULT | LayerMask::RAYCAST | LayerMask::SHADOWCAST
        }
    }
}

/// Why a material was refused for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerRejection {
    /// A blended material was bound for an opaque or shadow pass.
    BlendedInOpaquePass,
    /// An opaque material was bound for the translucent pass.
    OpaqueInTranslucentPass,
}

impl fmt::Display for LayerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerRejection::BlendedInOpaquePass => {
                write!(f, "blended material in an opaque or shadow pass")
            }
            LayerRejection::OpaqueInTranslucentPass => {
                write!(f, "opaque material in the translucent pass")
            }
        }
    }
}

/// The single rule table every backend uses to gate draws by layer.
///
/// It runs before any pipeline lookup, so a rejected draw costs nothing but
/// the check itself.
#[derive(Debug, Clone, Copy)]
pub struct LayerRule;

impl LayerRule {
    /// Decides whether a material with `blend` may draw in `layer`, and with
    /// which fragment variant.
    ///
    /// | blend    | layer intersects       | result                      |
    /// |----------|------------------------|-----------------------------|
    /// | blending | DEFAULT or SHADOWCAST  | `BlendedInOpaquePass`       |
    /// | opaque   | TRANSLUCENT            | `OpaqueInTranslucentPass`   |
    /// | any      | RAYCAST or SHADOWCAST  | `Visibility` fragment       |
    /// | any      | otherwise              | `Default` fragment          |
    pub fn resolve(blend: BlendMode, layer: LayerMask) -> Result<FragmentVariant, LayerRejection> {
        if blend.is_blending() && layer.intersects(LayerMask::DEFAULT | LayerMask::SHADOWCAST) {
            return Err(LayerRejection::BlendedInOpaquePass);
        }
        if !blend.is_blending() && layer.intersects(LayerMask::TRANSLUCENT) {
            return Err(LayerRejection::OpaqueInTranslucentPass);
        }
        if layer.intersects(LayerMask::RAYCAST | LayerMask::SHADOWCAST) {
            Ok(FragmentVariant::Visibility)
        } else {
            Ok(FragmentVariant::Default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_material_rejected_for_translucent_layer() {
        assert_eq!(
            LayerRule::resolve(BlendMode::Opaque, LayerMask::TRANSLUCENT),
            Err(LayerRejection::OpaqueInTranslucentPass)
        );
    }

    #[test]
    fn blended_materials_rejected_for_default_and_shadow() {
        for blend in [BlendMode::Translucent, BlendMode::Additive] {
            assert_eq!(
                LayerRule::resolve(blend, LayerMask::DEFAULT),
                Err(LayerRejection::BlendedInOpaquePass)
            );
            assert_eq!(
                LayerRule::resolve(blend, LayerMask::SHADOWCAST),
                Err(LayerRejection::BlendedInOpaquePass)
            );
        }
    }

    #[test]
    fn fragment_variant_follows_layer() {
        assert_eq!(
            LayerRule::resolve(BlendMode::Opaque, LayerMask::DEFAULT),
            Ok(FragmentVariant::Default)
        );
        assert_eq!(
            LayerRule::resolve(BlendMode::Opaque, LayerMask::SHADOWCAST),
            Ok(FragmentVariant::Visibility)
        );
        assert_eq!(
            LayerRule::resolve(BlendMode::Translucent, LayerMask::RAYCAST),
            Ok(FragmentVariant::Visibility)
        );
        assert_eq!(
            LayerRule::resolve(BlendMode::Additive, LayerMask::LIGHT),
            Ok(FragmentVariant::Default)
        );
        assert_eq!(
            LayerRule::resolve(BlendMode::Translucent, LayerMask::UI),
            Ok(FragmentVariant::Default)
        );
    }

    #[test]
    fn default_layers_agree_with_the_rule_table() {
        for blend in [BlendMode::Opaque, BlendMode::Translucent, BlendMode::Additive] {
            for layer in blend.default_layers().iter() {
                assert!(LayerRule::resolve(blend, layer).is_ok(), "{blend:?} {layer:?}");
            }
        }
    }
}
