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

//! Render targets: named attachment sets bound as one framebuffer.

use super::ids::TextureId;
use super::texture::TextureFormat;

/// An ordered set of color attachments plus an optional depth attachment.
///
/// Attachments are non-owning references to registry textures. A `native`
/// target wraps the presentation surface: it has no attachments of its own
/// and binds to the framebuffer of the currently acquired image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderTarget {
    /// Debug label.
    pub label: String,
    /// Color attachments by index. Holes are allowed while building.
    pub colors: Vec<Option<TextureId>>,
    /// Depth attachment.
    pub depth: Option<TextureId>,
    /// Wraps the presentation surface.
    pub native: bool,
}

impl RenderTarget {
    /// An empty offscreen target.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// The target wrapping the presentation surface.
    pub fn native(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            native: true,
            ..Self::default()
        }
    }

    /// Builder form of [`RenderTarget::set_color`].
    pub fn with_color(mut self, index: usize, texture: TextureId) -> Self {
        self.set_color(index, Some(texture));
        self
    }

    /// Builder form of [`RenderTarget::set_depth`].
    pub fn with_depth(mut self, texture: TextureId) -> Self {
        self.depth = Some(texture);
        self
    }

    /// Attaches (or detaches with `None`) a color texture at `index`.
    pub fn set_color(&mut self, index: usize, texture: Option<TextureId>) {
        if self.colors.len() <= index {
            if texture.is_none() {
                return;
            }
            self.colors.resize(index + 1, None);
        }
        self.colors[index] = texture;
        while matches!(self.colors.last(), Some(None)) {
            self.colors.pop();
        }
    }

    /// Attaches or detaches the depth texture.
    pub fn set_depth(&mut self, texture: Option<TextureId>) {
        self.depth = texture;
    }

    /// The color attachment at `index`.
    pub fn color(&self, index: usize) -> Option<TextureId> {
        self.colors.get(index).copied().flatten()
    }

    /// Every attached texture, colors first.
    pub fn attachments(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.colors.iter().flatten().copied().chain(self.depth)
    }
}

/// The formats a pipeline must be compatible with to draw into a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TargetSignature {
    /// Color formats, in attachment order.
    pub colors: Vec<TextureFormat>,
    /// Depth format.
    pub depth: Option<TextureFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detaching_trailing_colors_shrinks_the_list() {
        let mut target = RenderTarget::new("gbuffer")
            .with_color(0, TextureId(1))
            .with_color(2, TextureId(3));
        assert_eq!(target.colors, vec![Some(TextureId(1)), None, Some(TextureId(3))]);

        target.set_color(2, None);
        assert_eq!(target.colors, vec![Some(TextureId(1))]);
        target.set_color(5, None);
        assert_eq!(target.colors.len(), 1);
    }

    #[test]
    fn attachments_list_depth_last() {
        let target = RenderTarget::new("t")
            .with_color(0, TextureId(1))
            .with_depth(TextureId(2));
        let all: Vec<_> = target.attachments().collect();
        assert_eq!(all, vec![TextureId(1), TextureId(2)]);
    }
}
