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

//! Names of the built-in shader programs.
//!
//! Lanes do not carry shader code. They ask the host's
//! [`ShaderLibrary`](prism_core::renderer::ShaderLibrary) for these names
//! and fall back to passing their input through when a name is missing.
//!
//! Every screen program reads its input through the `rgbMap` sampler and is
//! drawn on the clip-space quad with the `vs_main` / `fs_main` convention of
//! the library.

/// Copies `rgbMap` to the target. Used by composite, translucent and UI.
pub const BLIT: &str = "Blit";
/// Additive point light volume.
pub const LIGHT_POINT: &str = "PointLight";
/// Additive spot light volume.
pub const LIGHT_SPOT: &str = "SpotLight";
/// Additive area light volume.
pub const LIGHT_AREA: &str = "AreaLight";
/// Fullscreen directional light.
pub const LIGHT_DIRECTIONAL: &str = "DirectLight";
/// Hemisphere occlusion sampling.
pub const SSAO: &str = "SSAO";
/// Blurs the raw occlusion term.
pub const BLUR_OCCLUSION: &str = "BlurOcclusion";
/// Multiplies the scene colour by the occlusion term.
pub const APPLY_OCCLUSION: &str = "ApplyOcclusion";
/// Thresholded downsample.
pub const DOWNSAMPLE: &str = "Downsample";
/// Separable gaussian blur along `direction`.
pub const BLUR: &str = "Blur";
/// Adds the bloom levels to the scene colour.
pub const BLOOM_COMBINE: &str = "BloomCombine";
/// Screen-space reflection trace.
pub const SSLR: &str = "SSLR";
/// Blends the traced reflections into the scene colour.
pub const REFLECTIONS_COMBINE: &str = "ReflectionsCombine";
/// Fast approximate antialiasing.
pub const FXAA: &str = "FXAA";
/// Depth of field from a sharp and a blurred image.
pub const DOF: &str = "DOF";
/// Exposure and tone curve, HDR to display range.
pub const TONEMAP: &str = "Tonemap";

/// Every program name the built-in lanes request.
pub const ALL: [&str; 16] = [
    BLIT,
    LIGHT_POINT,
    LIGHT_SPOT,
    LIGHT_AREA,
    LIGHT_DIRECTIONAL,
    SSAO,
    BLUR_OCCLUSION,
    APPLY_OCCLUSION,
    DOWNSAMPLE,
    BLUR,
    BLOOM_COMBINE,
    SSLR,
    REFLECTIONS_COMBINE,
    FXAA,
    DOF,
    TONEMAP,
];

/// The sampler every screen program reads its input from.
pub const INPUT_SAMPLER: &str = "rgbMap";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn program_names_are_unique() {
        let unique: HashSet<&str> = ALL.iter().copied().collect();
        assert_eq!(unique.len(), ALL.len());
    }

    #[test]
    fn program_names_are_not_empty() {
        assert!(ALL.iter().all(|name| !name.trim().is_empty()));
    }
}
