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

use crate::renderer::api::*;
use crate::renderer::error::{ResourceError, SurfaceError};
use std::fmt::Debug;
use std::time::Duration;

/// The driver-level contract every backend is built on.
///
/// Methods take `&self`; implementations keep their object tables behind
/// interior mutability so one device can be shared by the backend, its
/// surface and its caches. Every creation call may fail with
/// [`ResourceError::DeviceLost`] once the device is gone.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Compiles a shader module.
    /// ## Errors
    /// * `ResourceError::Shader` - If the source does not compile.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor<'_>,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Destroys a shader module.
    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    /// Creates a graphics pipeline.
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError>;

    /// Destroys a graphics pipeline.
    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError>;

    /// Creates a compute pipeline.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError>;

    /// Destroys a compute pipeline.
    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError>;

    /// Creates a texture.
    /// ## Errors
    /// * `ResourceError::OutOfMemory` - If the device cannot hold it.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTextureId, ResourceError>;

    /// Uploads mip 0 of every layer of a texture.
    fn write_texture(&self, id: GpuTextureId, data: &[u8]) -> Result<(), ResourceError>;

    /// Destroys a texture.
    fn destroy_texture(&self, id: GpuTextureId) -> Result<(), ResourceError>;

    /// Creates a buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBufferId, ResourceError>;

    /// Writes bytes into a buffer at `offset`.
    fn write_buffer(&self, id: GpuBufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Destroys a buffer.
    fn destroy_buffer(&self, id: GpuBufferId) -> Result<(), ResourceError>;

    /// Creates a bind group.
    fn create_bind_group(&self, descriptor: &BindGroupDescriptor)
        -> Result<BindGroupId, ResourceError>;

    /// Destroys a bind group.
    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError>;

    /// Creates a framebuffer over existing textures.
    fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, ResourceError>;

    /// Destroys a framebuffer.
    fn destroy_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError>;

    /// Creates a fence, optionally already signalled.
    fn create_fence(&self, signaled: bool) -> Result<FenceId, ResourceError>;

    /// Blocks until the fence signals or `timeout` elapses.
    fn wait_for_fence(&self, id: FenceId, timeout: Duration) -> Result<FenceWait, ResourceError>;

    /// Returns a fence to the unsignalled state.
    fn reset_fence(&self, id: FenceId) -> Result<(), ResourceError>;

    /// Destroys a fence.
    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError>;

    /// Creates a semaphore.
    fn create_semaphore(&self) -> Result<SemaphoreId, ResourceError>;

    /// Destroys a semaphore.
    fn destroy_semaphore(&self, id: SemaphoreId) -> Result<(), ResourceError>;

    /// Queues a command list for execution.
    fn submit(&self, commands: &CommandList, info: SubmitInfo) -> Result<(), ResourceError>;

    /// Blocks until every submitted list has completed.
    fn wait_idle(&self) -> Result<(), ResourceError>;

    /// What the presentation surface supports right now.
    fn surface_capabilities(&self) -> SurfaceCapabilities;

    /// Creates a swapchain for the presentation surface.
    fn create_swapchain(&self, descriptor: &SwapchainDescriptor)
        -> Result<SwapchainId, ResourceError>;

    /// The images owned by a swapchain, in index order.
    fn swapchain_images(&self, id: SwapchainId) -> Result<Vec<GpuTextureId>, ResourceError>;

    /// Acquires the next presentable image, signalling `signal` when it is
    /// ready to be rendered to.
    /// ## Errors
    /// * `SurfaceError::OutOfDate` - The swapchain must be rebuilt.
    fn acquire_next_image(
        &self,
        swapchain: SwapchainId,
        signal: Option<SemaphoreId>,
    ) -> Result<u32, SurfaceError>;

    /// Presents an acquired image after `wait` signals.
    fn present(
        &self,
        swapchain: SwapchainId,
        image_index: u32,
        wait: Option<SemaphoreId>,
    ) -> Result<(), SurfaceError>;

    /// Destroys a swapchain and its images.
    fn destroy_swapchain(&self, id: SwapchainId) -> Result<(), ResourceError>;

    /// Returns `true` once the device has been lost.
    fn is_lost(&self) -> bool;
}
