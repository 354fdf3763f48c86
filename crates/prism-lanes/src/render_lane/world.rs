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

//! Defines the per-frame `RenderWorld`.
//!
//! The `RenderWorld` is the culled, partitioned and sorted view of the scene
//! that lanes consume. It borrows the renderables from the scene for the
//! duration of one frame and is rebuilt by [`super::ExtractLane`] every frame.

use prism_core::renderer::{CommandBuffer, LayerMask};
use prism_core::scene::{Camera, Light, PostProcessSettings, Renderable};

/// The layers lanes draw, in the order lists are kept.
pub const DRAW_LAYERS: [LayerMask; 6] = [
    LayerMask::DEFAULT,
    LayerMask::RAYCAST,
    LayerMask::SHADOWCAST,
    LayerMask::LIGHT,
    LayerMask::TRANSLUCENT,
    LayerMask::UI,
];

/// Everything extracted from the scene for one frame.
pub struct RenderWorld<'a> {
    /// The camera the frame is rendered from.
    pub camera: Camera,
    /// Lights that may affect the view.
    pub lights: Vec<Light>,
    /// Post-process settings mixed from the volumes around the camera.
    pub settings: PostProcessSettings,
    /// Viewport size in pixels.
    pub viewport: (u32, u32),
    lists: [Vec<&'a dyn Renderable>; 6],
}

impl<'a> RenderWorld<'a> {
    /// An empty world seen from `camera`.
    pub fn new(camera: Camera, viewport: (u32, u32)) -> Self {
        Self {
            camera,
            lights: Vec::new(),
            settings: PostProcessSettings::default(),
            viewport,
            lists: Default::default(),
        }
    }

    fn index(layer: LayerMask) -> Option<usize> {
        DRAW_LAYERS.iter().position(|l| *l == layer)
    }

    /// Appends a renderable to the list of a single layer.
    pub fn push(&mut self, layer: LayerMask, renderable: &'a dyn Renderable) {
        match Self::index(layer) {
            Some(i) => self.lists[i].push(renderable),
            None => log::warn!("Ignoring renderable pushed for composite layer {layer:?}"),
        }
    }

    /// The sorted renderables of a single layer.
    pub fn renderables(&self, layer: LayerMask) -> &[&'a dyn Renderable] {
        Self::index(layer)
            .map(|i| self.lists[i].as_slice())
            .unwrap_or(&[])
    }

    /// Mutable access to a layer list, used while sorting.
    pub(crate) fn list_mut(&mut self, layer: LayerMask) -> Option<&mut Vec<&'a dyn Renderable>> {
        Self::index(layer).map(move |i| &mut self.lists[i])
    }

    /// Draws every renderable of `layer`. Returns how many were issued.
    pub fn draw_layer(&self, buffer: &mut dyn CommandBuffer, layer: LayerMask) -> usize {
        let list = self.renderables(layer);
        for renderable in list {
            renderable.draw(buffer, layer);
        }
        list.len()
    }

    /// Clears every list and light.
    pub fn clear(&mut self) {
        self.lights.clear();
        for list in &mut self.lists {
            list.clear();
        }
    }
}

impl std::fmt::Debug for RenderWorld<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("RenderWorld");
        for (layer, list) in DRAW_LAYERS.iter().zip(&self.lists) {
            s.field(&format!("{layer:?}"), &list.len());
        }
        s.field("lights", &self.lights.len()).finish()
    }
}
