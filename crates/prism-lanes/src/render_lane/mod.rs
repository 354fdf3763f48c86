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

//! Rendering lanes: the tasks of the deferred pipeline.
//!
//! A lane is one stage of the frame. Lanes exchange textures through named
//! slots; the chained colour slot is [`slots::SCENE_COLOR`], so a lane can be
//! inserted before or after another without renumbering anything.

use prism_core::math::Mat4;
use prism_core::renderer::{CommandBuffer, MeshId, RenderTargetId, TextureId};
use prism_core::scene::PostProcessSettings;

mod deferred_lighting_lane;
mod error;
mod extract_lane;
mod gbuffer_lane;
pub mod post;
mod resources;
mod screen;
pub mod shaders;
mod shadow_atlas;
mod shadow_map_lane;
pub mod slots;
mod translucent_lane;
mod ui_lane;
mod world;

pub use deferred_lighting_lane::*;
pub use error::*;
pub use extract_lane::*;
pub use gbuffer_lane::*;
pub use post::*;
pub use shadow_atlas::*;
pub use shadow_map_lane::*;
pub use slots::TaskSlots;
pub use translucent_lane::*;
pub use ui_lane::*;
pub use world::*;

/// Everything a lane may touch while it executes.
pub struct TaskFrame<'a> {
    /// The active command buffer.
    pub buffer: &'a mut dyn CommandBuffer,
    /// Culled and sorted scene data for this frame.
    pub world: &'a RenderWorld<'a>,
    /// The shared shadow atlas.
    pub atlas: &'a mut ShadowAtlas,
    /// The clip-space quad drawn by screen passes.
    pub quad: MeshId,
    /// The unit cube drawn for light volumes.
    pub cube: MeshId,
}

impl TaskFrame<'_> {
    /// Restores the camera matrices of the frame after a screen pass.
    pub fn reset_camera(&mut self) {
        let camera = self.world.camera;
        self.buffer.set_view_projection(camera.view, camera.projection);
    }

    /// Switches to clip-space matrices for fullscreen quads.
    pub fn screen_projection(&mut self) {
        self.buffer.set_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
    }
}

/// A stage of the rendering pipeline.
///
/// Lanes are built once per render configuration and persist across frames.
/// The context calls [`PipelineTask::resize`] whenever the viewport changes,
/// before the next [`PipelineTask::exec`].
pub trait PipelineTask: Send {
    /// Stable name used for insertion, logging and debug markers.
    fn name(&self) -> &'static str;

    /// The named inputs and outputs of the lane.
    fn slots(&self) -> &TaskSlots;

    /// Mutable access to the slots.
    fn slots_mut(&mut self) -> &mut TaskSlots;

    /// Resizes every render texture the lane owns.
    ///
    /// ## Errors
    /// * `TaskError::Resource` - An owned texture vanished from the registry.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), TaskError>;

    /// Records the lane's work and publishes its outputs in the slots.
    ///
    /// A lane whose material could not be resolved publishes its input
    /// unchanged.
    ///
    /// ## Errors
    /// * `TaskError::Render` - A render target failed strict validation or
    ///   the device is lost.
    fn exec(&mut self, frame: &mut TaskFrame<'_>) -> Result<(), TaskError>;

    /// Every render target the lane owns.
    fn owned_targets(&self) -> Vec<RenderTargetId>;

    /// Feeds the post-process settings mixed from the active volumes.
    fn apply_settings(&mut self, settings: &PostProcessSettings) {
        let _ = settings;
    }

    /// Binds the texture wired to input `index`.
    fn set_input(&mut self, index: usize, texture: Option<TextureId>) {
        self.slots_mut().set_input(index, texture);
    }

    /// Returns `false` when the lane is switched off.
    fn is_enabled(&self) -> bool {
        self.slots().is_enabled()
    }

    /// Switches the lane on or off. A disabled lane keeps its slots and
    /// resources but is skipped by the context.
    fn set_enabled(&mut self, enabled: bool) {
        log::debug!("{} {}", self.name(), if enabled { "enabled" } else { "disabled" });
        self.slots_mut().set_enabled(enabled);
    }
}
