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

use super::command_buffer::CommandBuffer;
use crate::renderer::api::*;
use crate::renderer::error::RenderError;
use crate::renderer::registry::SharedRegistry;

/// The frame lifecycle of one concrete backend.
///
/// A backend is created by the factory from a backend context, owns every
/// native object it realizes, and is driven from a single render thread.
/// Recording goes through the [`CommandBuffer`] half of the backend.
pub trait RenderBackend: CommandBuffer + std::fmt::Debug {
    /// Which family this backend belongs to.
    fn kind(&self) -> BackendKind;

    /// Starts a frame.
    ///
    /// Returns [`FrameStatus::Dropped`] when the frame cannot be recorded
    /// (stale surface, fence timeout); the host skips rendering and calls
    /// `begin_frame` again next frame.
    /// ## Errors
    /// * `RenderError::DeviceLost` - The device is gone. Every later call
    ///   fails the same way.
    fn begin_frame(&mut self) -> Result<FrameStatus, RenderError>;

    /// Submits and presents the frame.
    /// ## Errors
    /// * `RenderError::AttachmentMismatch` - A target failed strict
    ///   validation during the frame.
    /// * `RenderError::DeviceLost` - The device is gone.
    fn end_frame(&mut self) -> Result<(), RenderError>;

    /// Requests a new presentation size. The surface is rebuilt at the next
    /// `begin_frame`.
    fn resize_surface(&mut self, width: u32, height: u32);

    /// The size of the presentation surface.
    fn surface_size(&self) -> (u32, u32);

    /// The target wrapping the presentation surface.
    fn native_target(&self) -> RenderTargetId;

    /// The native handle of a resource, realizing it if needed.
    ///
    /// Returns `None` (after logging) when the resource cannot be realized.
    fn native_handle(&mut self, id: ResourceId) -> Option<NativeHandle>;

    /// Releases the native objects of resources whose destruction was
    /// requested.
    fn collect_garbage(&mut self);

    /// Counters for the current frame.
    fn stats(&self) -> BackendStats;

    /// The registry this backend realizes resources from.
    fn registry(&self) -> &SharedRegistry;

    /// Returns `true` once the device has been lost.
    fn is_device_lost(&self) -> bool;

    /// The recording half of the backend.
    fn command_buffer(&mut self) -> &mut dyn CommandBuffer;
}
