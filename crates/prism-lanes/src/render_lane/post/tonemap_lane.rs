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

//! Tonemapping: HDR to display range.

use super::publish;
use crate::render_lane::error::TaskError;
use crate::render_lane::resources::TaskResources;
use crate::render_lane::screen::{ScreenLayout, ScreenPass};
use crate::render_lane::shaders;
use crate::render_lane::slots::{self, TaskSlots};
use crate::render_lane::{PipelineTask, TaskFrame};
use prism_core::renderer::{
    RenderTargetId, ShaderLibrary, SharedRegistry, TextureFormat, TextureId, UniformValue,
};
use prism_core::scene::PostProcessSettings;

/// Applies exposure and the tone curve, writing an 8-bit result.
#[derive(Debug)]
pub struct TonemapLane {
    slots: TaskSlots,
    resources: TaskResources,
    pass: ScreenPass,
    exposure: f32,
}

impl TonemapLane {
    /// Declares the display range result and the tonemap material.
    pub fn new(registry: &SharedRegistry, library: &dyn ShaderLibrary) -> Self {
        let mut resources = TaskResources::new(registry);
        let exposure = PostProcessSettings::default().exposure;
        let pass = ScreenPass::new(
            &mut resources,
            library,
            "tonemap",
            shaders::TONEMAP,
            TextureFormat::Rgba8Unorm,
            0,
            ScreenLayout {
                textures: &[],
                params: &[("exposure", UniformValue::Float(exposure))],
            },
        );
        Self {
            slots: TaskSlots::new()
                .with_input(slots::SCENE_COLOR)
                .with_output(slots::SCENE_COLOR),
            resources,
            pass,
            exposure,
        }
    }

    /// The texture the lane renders into.
    pub fn result(&self) -> TextureId {
        self.pass.output()
    }
}

impl PipelineTask for TonemapLane {
    fn name(&self) -> &'static str {
        "Tonemap"
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
        self.pass.bind(&self.resources, input, &[])?;
        self.pass
            .set_params(&self.resources, &[("exposure", self.exposure.into())])?;
        let drawn = self.pass.draw(frame)?;
        publish(&mut self.slots, drawn, self.pass.output());
        frame.reset_camera();
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }

    fn apply_settings(&mut self, settings: &PostProcessSettings) {
        self.exposure = settings.exposure;
    }
}
