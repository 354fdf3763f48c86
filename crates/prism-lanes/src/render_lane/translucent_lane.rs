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

//! The translucent lane: blended geometry on top of the lit scene.

use super::error::TaskError;
use super::resources::TaskResources;
use super::screen::{ScreenLayout, ScreenPass};
use super::shaders;
use super::slots::{self, TaskSlots};
use super::{PipelineTask, TaskFrame};
use prism_core::renderer::{
    LayerMask, RenderTargetId, ShaderLibrary, SharedRegistry, TextureFormat,
};

/// Copies the scene colour into its own buffer, then draws the TRANSLUCENT
/// layer over it, depth tested against the G-buffer depth.
#[derive(Debug)]
pub struct TranslucentLane {
    slots: TaskSlots,
    resources: TaskResources,
    blit: ScreenPass,
}

impl TranslucentLane {
    /// Declares the result texture and the copy material.
    pub fn new(registry: &SharedRegistry, library: &dyn ShaderLibrary) -> Self {
        let mut resources = TaskResources::new(registry);
        let blit = ScreenPass::new(
            &mut resources,
            library,
            "translucent",
            shaders::BLIT,
            TextureFormat::Rgba8Unorm,
            0,
            ScreenLayout::INPUT_ONLY,
        );
        Self {
            slots: TaskSlots::new()
                .with_input(slots::SCENE_COLOR)
                .with_input(slots::DEPTH_MAP)
                .with_output(slots::SCENE_COLOR),
            resources,
            blit,
        }
    }
}

impl PipelineTask for TranslucentLane {
    fn name(&self) -> &'static str {
        "Translucent"
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
        let Some(input) = self.slots.input(slots::SCENE_COLOR) else {
            self.slots.pass_through(slots::SCENE_COLOR);
            return Ok(());
        };
        let depth = self.slots.input(slots::DEPTH_MAP);
        self.resources
            .attach(self.blit.target(), Some(self.blit.output()), depth)?;

        self.blit.bind(&self.resources, input, &[])?;
        if !self.blit.draw(frame)? {
            self.slots.pass_through(slots::SCENE_COLOR);
            frame.reset_camera();
            return Ok(());
        }

        let world = frame.world;
        frame.reset_camera();
        world.draw_layer(frame.buffer, LayerMask::TRANSLUCENT);
        self.slots
            .set_output(slots::SCENE_COLOR, Some(self.blit.output()));
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }
}
