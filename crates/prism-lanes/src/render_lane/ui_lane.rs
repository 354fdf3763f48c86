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

//! The UI lane: screen-space overlays.

use super::error::TaskError;
use super::resources::TaskResources;
use super::screen::{ScreenLayout, ScreenPass};
use super::shaders;
use super::slots::{self, TaskSlots};
use super::{PipelineTask, TaskFrame};
use prism_core::math::Mat4;
use prism_core::renderer::{
    LayerMask, RenderTargetId, ShaderLibrary, SharedRegistry, TextureFormat,
};

/// Pixel-space projection with the origin at the top left corner.
pub fn ui_projection(width: u32, height: u32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width.max(1) as f32, height.max(1) as f32, 0.0, -1.0, 1.0)
}

/// Copies the scene colour into its own buffer and draws the UI layer over
/// it in pixel coordinates.
#[derive(Debug)]
pub struct UiLane {
    slots: TaskSlots,
    resources: TaskResources,
    blit: ScreenPass,
}

impl UiLane {
    /// Declares the result texture and the copy material.
    pub fn new(registry: &SharedRegistry, library: &dyn ShaderLibrary) -> Self {
        let mut resources = TaskResources::new(registry);
        let blit = ScreenPass::new(
            &mut resources,
            library,
            "ui",
            shaders::BLIT,
            TextureFormat::Rgba8Unorm,
            0,
            ScreenLayout::INPUT_ONLY,
        );
        Self {
            slots: TaskSlots::new()
                .with_input(slots::SCENE_COLOR)
                .with_output(slots::SCENE_COLOR),
            resources,
            blit,
        }
    }
}

impl PipelineTask for UiLane {
    fn name(&self) -> &'static str {
        "UI"
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
        self.blit.bind(&self.resources, input, &[])?;
        if !self.blit.draw(frame)? {
            self.slots.pass_through(slots::SCENE_COLOR);
            frame.reset_camera();
            return Ok(());
        }

        let world = frame.world;
        let (width, height) = self.resources.size();
        frame
            .buffer
            .set_view_projection(Mat4::IDENTITY, ui_projection(width, height));
        world.draw_layer(frame.buffer, LayerMask::UI);
        frame.reset_camera();
        self.slots
            .set_output(slots::SCENE_COLOR, Some(self.blit.output()));
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use prism_core::math::Vec3;

    #[test]
    fn ui_projection_maps_pixels_to_clip_space() {
        let projection = ui_projection(800, 600);
        let top_left = projection.project_point3(Vec3::ZERO);
        let bottom_right = projection.project_point3(Vec3::new(800.0, 600.0, 0.0));
        assert_relative_eq!(top_left.x, -1.0);
        assert_relative_eq!(top_left.y, 1.0);
        assert_relative_eq!(bottom_right.x, 1.0);
        assert_relative_eq!(bottom_right.y, -1.0);
    }
}
