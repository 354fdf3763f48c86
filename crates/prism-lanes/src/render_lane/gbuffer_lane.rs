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

//! The G-buffer lane: the opaque pass.

use super::error::TaskError;
use super::resources::TaskResources;
use super::slots::{self, TaskSlots};
use super::{PipelineTask, TaskFrame};
use prism_core::renderer::{
    LayerMask, RenderTarget, RenderTargetId, SharedRegistry, TextureFormat, TextureId,
};

/// Renders the DEFAULT layer into the surface attributes consumed by
/// lighting and the screen-space effects.
///
/// | slot          | format          |
/// |---------------|-----------------|
/// | `normalsMap`  | `Rgb10A2Unorm`  |
/// | `diffuseMap`  | `Rgba8Unorm`    |
/// | `paramsMap`   | `Rgba8Unorm`    |
/// | `emissiveMap` | `Rg11B10Float`  |
/// | `depthMap`    | `Depth32Float`  |
///
/// The emissive buffer doubles as the start of the colour chain and is also
/// published as `sceneColor`.
#[derive(Debug)]
pub struct GBufferLane {
    slots: TaskSlots,
    resources: TaskResources,
    target: RenderTargetId,
    maps: [(&'static str, TextureId); 5],
}

impl GBufferLane {
    /// Declares the G-buffer textures and their target.
    pub fn new(registry: &SharedRegistry) -> Self {
        let mut resources = TaskResources::new(registry);
        let normals = resources.render_texture(slots::NORMALS_MAP, TextureFormat::Rgb10A2Unorm, 0);
        let diffuse = resources.render_texture(slots::DIFFUSE_MAP, TextureFormat::Rgba8Unorm, 0);
        let params = resources.render_texture(slots::PARAMS_MAP, TextureFormat::Rgba8Unorm, 0);
        let emissive = resources.render_texture(slots::EMISSIVE_MAP, TextureFormat::Rg11B10Float, 0);
        let depth = resources.render_texture(slots::DEPTH_MAP, TextureFormat::Depth32Float, 0);
        let target = resources.target(
            RenderTarget::new("gBuffer")
                .with_color(0, normals)
                .with_color(1, diffuse)
                .with_color(2, params)
                .with_color(3, emissive)
                .with_depth(depth),
        );

        let maps = [
            (slots::NORMALS_MAP, normals),
            (slots::DIFFUSE_MAP, diffuse),
            (slots::PARAMS_MAP, params),
            (slots::EMISSIVE_MAP, emissive),
            (slots::DEPTH_MAP, depth),
        ];
        let slots = maps
            .iter()
            .fold(TaskSlots::new(), |slots, (name, _)| slots.with_output(*name))
            .with_output(slots::SCENE_COLOR);

        Self {
            slots,
            resources,
            target,
            maps,
        }
    }

    /// The G-buffer render target.
    pub fn target(&self) -> RenderTargetId {
        self.target
    }
}

impl PipelineTask for GBufferLane {
    fn name(&self) -> &'static str {
        "GBuffer"
    }

    fn slots(&self) -> &TaskSlots {
        &self.slots
    }

    fn slots_mut(&mut self) -> &mut TaskSlots {
        &mut self.slots
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), TaskError> {
        self.resources.resize(width, height).map(|_| ())
    }

    fn exec(&mut self, frame: &mut TaskFrame<'_>) -> Result<(), TaskError> {
        let world = frame.world;
        frame.buffer.set_render_target(self.target, 0)?;
        frame
            .buffer
            .clear_render_target(true, world.camera.clear_color, true, 1.0);
        frame.reset_camera();
        let drawn = world.draw_layer(frame.buffer, LayerMask::DEFAULT);
        log::trace!("G-buffer drew {drawn} renderables");

        for (name, texture) in self.maps {
            frame.buffer.set_global_texture(name, texture);
            self.slots.set_output(name, Some(texture));
        }
        self.slots
            .set_output(slots::SCENE_COLOR, Some(self.maps[3].1));
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::ResourceRegistry;

    #[test]
    fn gbuffer_declares_every_map_at_viewport_size() {
        let registry = ResourceRegistry::shared();
        let mut lane = GBufferLane::new(&registry);
        lane.resize(640, 360).unwrap();

        let names: Vec<_> = lane.slots().outputs().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            [
                slots::NORMALS_MAP,
                slots::DIFFUSE_MAP,
                slots::PARAMS_MAP,
                slots::EMISSIVE_MAP,
                slots::DEPTH_MAP,
                slots::SCENE_COLOR
            ]
        );

        let registry = registry.read();
        for (_, id) in lane.maps {
            let texture = registry.texture(id).unwrap();
            assert_eq!((texture.width, texture.height), (640, 360));
        }
        assert_eq!(
            registry.texture(lane.maps[0].1).unwrap().format,
            TextureFormat::Rgb10A2Unorm
        );
        assert!(registry.texture(lane.maps[4].1).unwrap().format.is_depth());
    }
}
