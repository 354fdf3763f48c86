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

//! Screen-space reflections.

use super::{publish, HDR_FORMAT};
use crate::render_lane::error::TaskError;
use crate::render_lane::resources::TaskResources;
use crate::render_lane::screen::{ScreenLayout, ScreenPass};
use crate::render_lane::shaders;
use crate::render_lane::slots::{self, TaskSlots};
use crate::render_lane::{PipelineTask, TaskFrame};
use prism_core::renderer::{RenderTargetId, ShaderLibrary, SharedRegistry, TextureId};

/// Traces reflections against the depth buffer into `sslrMap`, then blends
/// them into the scene colour weighted by the G-buffer surface parameters.
#[derive(Debug)]
pub struct ReflectionsLane {
    slots: TaskSlots,
    resources: TaskResources,
    trace: ScreenPass,
    combine: ScreenPass,
}

impl ReflectionsLane {
    /// Declares the trace buffer and the result.
    pub fn new(registry: &SharedRegistry, library: &dyn ShaderLibrary) -> Self {
        let mut resources = TaskResources::new(registry);
        let trace = ScreenPass::new(
            &mut resources,
            library,
            slots::SSLR_MAP,
            shaders::SSLR,
            HDR_FORMAT,
            0,
            ScreenLayout {
                textures: &[slots::NORMALS_MAP, slots::PARAMS_MAP, slots::DEPTH_MAP],
                params: &[],
            },
        );
        let combine = ScreenPass::new(
            &mut resources,
            library,
            "reflectionsResult",
            shaders::REFLECTIONS_COMBINE,
            HDR_FORMAT,
            0,
            ScreenLayout {
                textures: &[slots::SSLR_MAP, slots::PARAMS_MAP],
                params: &[],
            },
        );
        Self {
            slots: TaskSlots::new()
                .with_input(slots::SCENE_COLOR)
                .with_output(slots::SCENE_COLOR)
                .with_output(slots::SSLR_MAP),
            resources,
            trace,
            combine,
        }
    }

    fn run(&mut self, frame: &mut TaskFrame<'_>, input: TextureId) -> Result<bool, TaskError> {
        if !(self.trace.is_ready() && self.combine.is_ready()) {
            return Ok(false);
        }
        self.trace.bind(&self.resources, input, &[])?;
        if !self.trace.draw(frame)? {
            return Ok(false);
        }
        let reflections = self.trace.output();
        self.slots.set_output(slots::SSLR_MAP, Some(reflections));
        self.combine
            .bind(&self.resources, input, &[(slots::SSLR_MAP, reflections)])?;
        self.combine.draw(frame)
    }
}

impl PipelineTask for ReflectionsLane {
    fn name(&self) -> &'static str {
        "Reflections"
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
        let drawn = self.run(frame, input)?;
        publish(&mut self.slots, drawn, self.combine.output());
        frame.reset_camera();
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }
}
