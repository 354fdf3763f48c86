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

use crate::math::{Mat4, Rect, Vec4};
use crate::renderer::api::*;
use crate::renderer::error::RenderError;
use std::fmt;

/// Why a draw or dispatch did not reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No render target is bound.
    NoRenderTarget,
    /// The bound render target failed validation.
    TargetInvalid,
    /// A referenced resource is missing or failed to realize.
    ResourceUnavailable(ResourceId),
    /// No pipeline could be built for the material and target.
    PipelineUnavailable,
    /// The requested submesh does not exist.
    MissingSubmesh,
    /// The frame ran out of space for uniform data.
    UniformSpaceExhausted,
    /// The device is lost.
    DeviceLost,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoRenderTarget => write!(f, "no render target bound"),
            SkipReason::TargetInvalid => write!(f, "render target is invalid"),
            SkipReason::ResourceUnavailable(id) => write!(f, "{id} is unavailable"),
            SkipReason::PipelineUnavailable => write!(f, "no pipeline available"),
            SkipReason::MissingSubmesh => write!(f, "submesh out of range"),
            SkipReason::UniformSpaceExhausted => write!(f, "uniform ring exhausted"),
            SkipReason::DeviceLost => write!(f, "device lost"),
        }
    }
}

/// The outcome of a draw or dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The work was recorded with `pipeline`.
    Drawn {
        /// The pipeline object used.
        pipeline: NativeHandle,
    },
    /// The layer rule table refused the material.
    Rejected(LayerRejection),
    /// The work was skipped and logged.
    Skipped(SkipReason),
}

impl DrawOutcome {
    /// Returns `true` if the work reached the device.
    pub fn is_drawn(&self) -> bool {
        matches!(self, DrawOutcome::Drawn { .. })
    }

    /// The pipeline used, if the work was recorded.
    pub fn pipeline(&self) -> Option<NativeHandle> {
        match self {
            DrawOutcome::Drawn { pipeline } => Some(*pipeline),
            _ => None,
        }
    }
}

/// The backend-neutral per-frame recorder.
///
/// A command buffer holds exactly one current render target, persistent
/// frame-global uniforms and textures, the view and projection matrices, the
/// viewport and scissor, and a debug marker stack. Global state persists
/// across draws until overwritten; per-draw data is rebound on every call.
///
/// No method panics. Failures are logged and reported through
/// [`DrawOutcome::Skipped`]; only device loss and strict attachment
/// validation surface as errors.
pub trait CommandBuffer: Send {
    /// Binds `target` at `mip_level`, realizing its framebuffer if needed.
    ///
    /// The viewport and scissor are reset to the target's full size.
    /// ## Errors
    /// * `RenderError::AttachmentMismatch` - The target failed validation
    ///   and strict validation is on.
    /// * `RenderError::DeviceLost` - The device is gone.
    fn set_render_target(&mut self, target: RenderTargetId, mip_level: u32)
        -> Result<(), RenderError>;

    /// The currently bound target.
    fn render_target(&self) -> Option<RenderTargetId>;

    /// Clears the current target inside the current viewport.
    fn clear_render_target(&mut self, clear_color: bool, color: Vec4, clear_depth: bool, depth: f32);

    /// Sets the viewport and resets the scissor to it.
    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    /// The current viewport.
    fn viewport(&self) -> Rect;

    /// Restricts rendering to a rectangle, clipped to the viewport.
    fn enable_scissor(&mut self, x: i32, y: i32, width: u32, height: u32);

    /// Restores the scissor to the viewport.
    fn disable_scissor(&mut self);

    /// Sets the camera matrices used by subsequent draws.
    fn set_view_projection(&mut self, view: Mat4, projection: Mat4);

    /// Sets a frame-global uniform.
    fn set_global_value(&mut self, name: &str, value: UniformValue);

    /// A frame-global uniform.
    fn global_value(&self, name: &str) -> Option<UniformValue>;

    /// Sets a frame-global texture, visible to every material slot of the
    /// same name that the instance does not override.
    fn set_global_texture(&mut self, name: &str, texture: TextureId);

    /// A frame-global texture.
    fn global_texture(&self, name: &str) -> Option<TextureId>;

    /// Draws one submesh with a material instance in `layer`.
    fn draw_mesh(
        &mut self,
        model: Mat4,
        mesh: MeshId,
        submesh: usize,
        layer: LayerMask,
        instance: MaterialInstanceId,
    ) -> DrawOutcome;

    /// Draws one submesh once per model matrix.
    fn draw_mesh_instanced(
        &mut self,
        models: &[Mat4],
        mesh: MeshId,
        submesh: usize,
        layer: LayerMask,
        instance: MaterialInstanceId,
    ) -> DrawOutcome;

    /// Runs a compute instance over `x * y * z` work groups.
    fn dispatch_compute(&mut self, instance: ComputeInstanceId, x: u32, y: u32, z: u32)
        -> DrawOutcome;

    /// Opens a named debug group.
    fn begin_debug_marker(&mut self, name: &str);

    /// Closes the innermost debug group. Unbalanced calls are ignored.
    fn end_debug_marker(&mut self);
}
