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

//! CPU-side description of textures.

use std::sync::Arc;

/// Defines the memory format of pixels in a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureFormat {
    /// One 8-bit unsigned normalized component.
    R8Unorm,
    /// Four 8-bit unsigned normalized components (RGBA).
    Rgba8Unorm,
    /// Four 8-bit unsigned normalized components (RGBA) in the sRGB color space.
    Rgba8UnormSrgb,
    /// Four 8-bit unsigned normalized components (BGRA) in the sRGB color space. This is a common swapchain format.
    Bgra8UnormSrgb,
    /// Packed 10-bit RGB with 2-bit alpha, used for normals.
    Rgb10A2Unorm,
    /// Packed unsigned float RGB, used for HDR colour.
    Rg11B10Float,
    /// Four 16-bit float components.
    Rgba16Float,
    /// One 32-bit float component.
    R32Float,
    /// A 24-bit unsigned normalized depth format.
    Depth24Plus,
    /// A 32-bit float depth format.
    Depth32Float,
}

impl TextureFormat {
    /// Returns the size in bytes of a single pixel for this format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Rgb10A2Unorm
            | TextureFormat::Rg11B10Float
            | TextureFormat::R32Float
            | TextureFormat::Depth24Plus
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }

    /// Returns `true` for depth formats.
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth24Plus | TextureFormat::Depth32Float)
    }
}

/// The shape of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureKind {
    /// A single 2D image.
    #[default]
    D2,
    /// Six square 2D faces.
    Cube,
}

impl TextureKind {
    /// Number of array layers the native object needs.
    pub fn layers(&self) -> u32 {
        match self {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        }
    }
}

/// Defines the filtering mode for texture sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Point sampling.
    Nearest,
    /// Linear interpolation.
    #[default]
    Linear,
}

/// A texture as declared by its owner.
///
/// `data`, when present, holds tightly packed pixels for mip 0 of every
/// layer. Render textures carry no data.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    /// Debug label.
    pub label: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: TextureFormat,
    /// 2D or cube.
    pub kind: TextureKind,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Filtering used when sampled.
    pub filter: FilterMode,
    /// The texture may be bound as a render attachment.
    pub render_target: bool,
    /// Initial pixel data.
    pub data: Option<Arc<[u8]>>,
}

impl Texture {
    /// A sampled 2D texture with the given pixels.
    pub fn with_data(
        label: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            kind: TextureKind::D2,
            mip_levels: 1,
            filter: FilterMode::Linear,
            render_target: false,
            data: Some(data.into()),
        }
    }

    /// A 2D texture usable as a render attachment.
    pub fn render(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            kind: TextureKind::D2,
            mip_levels: 1,
            filter: FilterMode::Linear,
            render_target: true,
            data: None,
        }
    }

    /// Size of `mip` along each axis, never below one pixel.
    pub fn mip_size(&self, mip: u32) -> (u32, u32) {
        ((self.width >> mip).max(1), (self.height >> mip).max(1))
    }

    /// Number of bytes the initial data must have.
    pub fn expected_data_len(&self) -> usize {
        self.width as usize
            * self.height as usize
            * self.format.bytes_per_pixel() as usize
            * self.kind.layers() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_size_never_collapses() {
        let texture = Texture::render("t", 1920, 1080, TextureFormat::Rgba8Unorm);
        assert_eq!(texture.mip_size(0), (1920, 1080));
        assert_eq!(texture.mip_size(3), (240, 135));
        assert_eq!(texture.mip_size(12), (1, 1));
    }

    #[test]
    fn cube_data_covers_six_faces() {
        let mut texture = Texture::with_data("sky", 4, 4, TextureFormat::Rgba8Unorm, vec![0u8; 64]);
        assert_eq!(texture.expected_data_len(), 64);
        texture.kind = TextureKind::Cube;
        assert_eq!(texture.expected_data_len(), 384);
    }
}
