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

//! Fast approximate antialiasing.

use super::{publish, texel_size, HDR_FORMAT};
use crate::render_lane::error::TaskError;
use crate::render_lane::resources::TaskResources;
use crate::render_lane::screen::{ScreenLayout, ScreenPass};
use crate::render_lane::shaders;
use crate::render_lane::slots::{self, TaskSlots};
use crate::render_lane::{PipelineTask, TaskFrame};
use prism_core::math::Vec2;
use prism_core::renderer::{RenderTargetId, ShaderLibrary, SharedRegistry, UniformValue};

/// Smooths geometric edges with one FXAA pass.
#[derive(Debug)]
pub struct AntialiasingLane {
    slots: TaskSlots,
    resources: TaskResources,
    pass: ScreenPass,
}

impl AntialiasingLane {
    /// Declares the result texture and the FXAA material.
    pub fn new(registry: &SharedRegistry, library: &dyn ShaderLibrary) -> Self {
        let mut resources = TaskResources::new(registry);
        let pass = ScreenPass::new(
            &mut resources,
            library,
            "antiAliasing",
            shaders::FXAA,
            HDR_FORMAT,
            0,
            ScreenLayout {
                textures: &[],
                params: &[("size", UniformValue::Vec2(Vec2::ONE))],
            },
        );
        Self {
            slots: TaskSlots::new()
                .with_input(slots::SCENE_COLOR)
                .with_output(slots::SCENE_COLOR),
            resources,
            pass,
        }
    }
}

impl PipelineTask for AntialiasingLane {
    fn name(&self) -> &'static str {
        "Antialiasing"
    }

    fn slots(&self) -> &TaskSlots {
        &self.slots
    }

    fn slots_mut(&mut self) -> &mut TaskSlots {
        &mut self.slots
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), TaskError> {
        if self.resources.resize(width, height)? {
            let texel = texel_size(self.resources.size(), 0);
            self.pass
                .set_params(&self.resources, &[("size", UniformValue::Vec2(texel))])?;
        }
        Ok(())
    }

    fn exec(&mut self, frame: &mut TaskFrame<'_>) -> Result<(), TaskError> {
        let Some(input) = self.slots.input(slots::SCENE_COLOR) else {
            self.slots.pass_through(slots::SCENE_COLOR);
            return Ok(());
        };
        self.pass.bind(&self.resources, input, &[])?;
        let drawn = self.pass.draw(frame)?;
        publish(&mut self.slots, drawn, self.pass.output());
        frame.reset_camera();
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }
}
