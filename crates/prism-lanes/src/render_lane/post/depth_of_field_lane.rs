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

//! Depth of field.

use super::{publish, HDR_FORMAT};
use crate::render_lane::error::TaskError;
use crate::render_lane::resources::TaskResources;
use crate::render_lane::screen::{ScreenLayout, ScreenPass};
use crate::render_lane::shaders;
use crate::render_lane::slots::{self, TaskSlots};
use crate::render_lane::{PipelineTask, TaskFrame};
use prism_core::renderer::{RenderTargetId, ShaderLibrary, SharedRegistry, UniformValue};
use prism_core::scene::PostProcessSettings;

const LOW_MAP: &str = "lowMap";

fn dof_params(settings: &PostProcessSettings) -> [(&'static str, UniformValue); 4] {
    let scale = if settings.dof_focus_scale.abs() > f32::EPSILON {
        1.0 / settings.dof_focus_scale
    } else {
        0.0
    };
    [
        ("focusDistance", settings.dof_focus_distance.into()),
        ("focusScale", scale.into()),
        ("blurSize", settings.dof_blur_size.into()),
        ("skyDistance", settings.dof_sky_distance.into()),
    ]
}

/// Mixes the sharp scene colour with the blurred half resolution copy that
/// bloom publishes, by distance from the focus plane.
///
/// Off by default. Without a `downsampleMap` the sharp image is used for
/// both sources.
#[derive(Debug)]
pub struct DepthOfFieldLane {
    slots: TaskSlots,
    resources: TaskResources,
    pass: ScreenPass,
    settings: PostProcessSettings,
}

impl DepthOfFieldLane {
    /// Declares the result texture and the DOF material.
    pub fn new(registry: &SharedRegistry, library: &dyn ShaderLibrary) -> Self {
        let mut resources = TaskResources::new(registry);
        let settings = PostProcessSettings::default();
        let params = dof_params(&settings);
        let pass = ScreenPass::new(
            &mut resources,
            library,
            "depthOfField",
            shaders::DOF,
            HDR_FORMAT,
            0,
            ScreenLayout {
                textures: &[LOW_MAP, slots::DEPTH_MAP],
                params: &params,
            },
        );
        let mut slots = TaskSlots::new()
            .with_input(slots::SCENE_COLOR)
            .with_input(slots::DOWNSAMPLE_MAP)
            .with_input(slots::DEPTH_MAP)
            .with_output(slots::SCENE_COLOR);
        slots.set_enabled(false);
        Self {
            slots,
            resources,
            pass,
            settings,
        }
    }
}

impl PipelineTask for DepthOfFieldLane {
    fn name(&self) -> &'static str {
        "DepthOfField"
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
        let low = self.slots.input(slots::DOWNSAMPLE_MAP).unwrap_or(input);
        let mut extra = vec![(LOW_MAP, low)];
        if let Some(depth) = self.slots.input(slots::DEPTH_MAP) {
            extra.push((slots::DEPTH_MAP, depth));
        }
        self.pass.bind(&self.resources, input, &extra)?;
        self.pass
            .set_params(&self.resources, &dof_params(&self.settings))?;
        let drawn = self.pass.draw(frame)?;
        publish(&mut self.slots, drawn, self.pass.output());
        frame.reset_camera();
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }

    fn apply_settings(&mut self, settings: &PostProcessSettings) {
        self.settings = *settings;
    }
}
