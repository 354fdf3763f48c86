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

//! Device-level identifiers, descriptors and the recorded command stream.
//!
//! These types sit one level below the registry: they describe native
//! objects as the [`GraphicsDevice`](crate::renderer::traits::GraphicsDevice)
//! sees them. Backends translate registry resources into them.

use super::layer::BlendMode;
use super::mesh::Topology;
use super::shader::{ShaderSource, ShaderStage, VertexVariant};
use super::texture::TextureFormat;
use crate::math::Rect;
use bitflags::bitflags;
use std::ops::Range;

macro_rules! device_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Wraps the id into an opaque handle.
            pub const fn handle(&self) -> super::ids::NativeHandle {
                super::ids::NativeHandle::new(self.0)
            }
        }
    };
}

device_id!(
    /// An opaque handle to a compiled shader module.
    ShaderModuleId
);
device_id!(
    /// An opaque handle to a graphics pipeline state object.
    RenderPipelineId
);
device_id!(
    /// An opaque handle to a compute pipeline.
    ComputePipelineId
);
device_id!(
    /// An opaque handle to a device texture.
    GpuTextureId
);
device_id!(
    /// An opaque handle to a device buffer.
    GpuBufferId
);
device_id!(
    /// An opaque handle to a bind group (descriptor set).
    BindGroupId
);
device_id!(
    /// An opaque handle to a framebuffer.
    FramebufferId
);
device_id!(
    /// An opaque handle to a CPU-waitable fence.
    FenceId
);
device_id!(
    /// An opaque handle to a GPU-GPU semaphore.
    SemaphoreId
);
device_id!(
    /// An opaque handle to a swapchain.
    SwapchainId
);

bitflags! {
    /// How a device texture will be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Read by shaders.
        const SAMPLED = 1 << 0;
        /// Bound as a framebuffer attachment.
        const RENDER_ATTACHMENT = 1 << 1;
        /// Written by uploads.
        const COPY_DST = 1 << 2;
        /// Owned by a swapchain.
        const PRESENT = 1 << 3;
    }
}

bitflags! {
    /// How a device buffer will be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Vertex stream.
        const VERTEX = 1 << 0;
        /// Index stream.
        const INDEX = 1 << 1;
        /// Uniform block.
        const UNIFORM = 1 << 2;
        /// Read/write storage.
        const STORAGE = 1 << 3;
        /// Written by uploads.
        const COPY_DST = 1 << 4;
    }
}

/// Describes a shader module to compile.
#[derive(Debug, Clone, Copy)]
pub struct ShaderModuleDescriptor<'a> {
    /// Debug label.
    pub label: &'a str,
    /// The stage the blob targets.
    pub stage: ShaderStage,
    /// The blob and its entry point.
    pub source: &'a ShaderSource,
}

/// Describes a graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPipelineDescriptor {
    /// Debug label.
    pub label: String,
    /// Vertex module.
    pub vertex: ShaderModuleId,
    /// Vertex entry point.
    pub vertex_entry: String,
    /// Fragment module.
    pub fragment: ShaderModuleId,
    /// Fragment entry point.
    pub fragment_entry: String,
    /// The vertex layout the pipeline consumes.
    pub vertex_variant: VertexVariant,
    /// Color target formats, in attachment order.
    pub color_formats: Vec<TextureFormat>,
    /// Depth target format.
    pub depth_format: Option<TextureFormat>,
    /// Color blending.
    pub blend: BlendMode,
    /// Depth testing.
    pub depth_test: bool,
    /// Depth writes.
    pub depth_write: bool,
    /// Back-face culling.
    pub cull_back_faces: bool,
    /// Primitive assembly.
    pub topology: Topology,
}

/// Describes a compute pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputePipelineDescriptor {
    /// Debug label.
    pub label: String,
    /// Compute module.
    pub module: ShaderModuleId,
    /// Entry point.
    pub entry_point: String,
}

/// Describes a device texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    /// Debug label.
    pub label: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Array layers (6 for cube maps).
    pub layers: u32,
    /// Mip levels.
    pub mip_levels: u32,
    /// Pixel format.
    pub format: TextureFormat,
    /// Allowed usages.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Bytes the texture occupies, all mips and layers included.
    pub fn byte_size(&self) -> u64 {
        let bpp = self.format.bytes_per_pixel() as u64;
        (0..self.mip_levels.max(1))
            .map(|mip| {
                let w = (self.width >> mip).max(1) as u64;
                let h = (self.height >> mip).max(1) as u64;
                w * h * bpp
            })
            .sum::<u64>()
            * self.layers.max(1) as u64
    }
}

/// Describes a device buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDescriptor {
    /// Debug label.
    pub label: String,
    /// Size in bytes.
    pub size: u64,
    /// Allowed usages.
    pub usage: BufferUsage,
}

/// What a bind group entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingResource {
    /// A buffer range. A `dynamic` binding takes its offset at bind time.
    Buffer {
        /// The buffer.
        buffer: GpuBufferId,
        /// Start of the range.
        offset: u64,
        /// Length of the range.
        size: u64,
        /// The offset is supplied by each `BindGroup` command.
        dynamic: bool,
    },
    /// A sampled texture.
    Texture(GpuTextureId),
}

/// Describes a bind group.
#[derive(Debug, Clone, PartialEq)]
pub struct BindGroupDescriptor {
    /// Debug label.
    pub label: String,
    /// Entries, by binding index.
    pub entries: Vec<BindingResource>,
}

/// One framebuffer attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferAttachment {
    /// The attached texture.
    pub texture: GpuTextureId,
    /// The mip level rendered to.
    pub mip_level: u32,
}

/// Describes a framebuffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferDescriptor {
    /// Debug label.
    pub label: String,
    /// Color attachments, in order.
    pub colors: Vec<FramebufferAttachment>,
    /// Depth attachment.
    pub depth: Option<FramebufferAttachment>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// What the platform allows for a presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    /// Fewest swapchain images.
    pub min_images: u32,
    /// Most swapchain images.
    pub max_images: u32,
    /// Preferred presentation format.
    pub format: TextureFormat,
    /// Current surface width.
    pub width: u32,
    /// Current surface height.
    pub height: u32,
}

/// Describes a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDescriptor {
    /// Image width.
    pub width: u32,
    /// Image height.
    pub height: u32,
    /// Number of images.
    pub image_count: u32,
    /// Image format.
    pub format: TextureFormat,
    /// Wait for vertical blank on present.
    pub vsync: bool,
}

/// The outcome of a bounded fence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceWait {
    /// The fence is signalled.
    Signaled,
    /// The timeout elapsed first.
    TimedOut,
}

/// One recorded device command.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Starts rendering into a framebuffer.
    BeginRenderPass {
        /// Target framebuffer.
        framebuffer: FramebufferId,
    },
    /// Clears part of the current framebuffer.
    Clear {
        /// Color to clear to, if the color attachments are cleared.
        color: Option<[f32; 4]>,
        /// Depth to clear to, if the depth attachment is cleared.
        depth: Option<f32>,
        /// Pixel rectangle the clear is scoped to.
        rect: Rect,
    },
    /// Sets the viewport.
    SetViewport(Rect),
    /// Sets the scissor rectangle.
    SetScissor(Rect),
    /// Binds a graphics pipeline.
    BindPipeline(RenderPipelineId),
    /// Binds a bind group at `index`.
    BindGroup {
        /// Set index.
        index: u32,
        /// The group.
        group: BindGroupId,
        /// Offset into the group's dynamic buffer, if it has one.
        dynamic_offset: Option<u32>,
    },
    /// Binds a vertex stream.
    SetVertexBuffer {
        /// Vertex buffer slot.
        slot: u32,
        /// The buffer.
        buffer: GpuBufferId,
    },
    /// Binds the index stream.
    SetIndexBuffer(GpuBufferId),
    /// Draws indexed primitives.
    DrawIndexed {
        /// Index range.
        indices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// Draws non-indexed primitives.
    Draw {
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// Ends the current render pass.
    EndRenderPass,
    /// Binds a compute pipeline.
    BindComputePipeline(ComputePipelineId),
    /// Launches compute work groups.
    Dispatch {
        /// Groups along x.
        x: u32,
        /// Groups along y.
        y: u32,
        /// Groups along z.
        z: u32,
    },
    /// Opens a named debug group.
    PushDebugGroup(String),
    /// Closes the innermost debug group.
    PopDebugGroup,
    /// Writes bytes into a buffer in stream order.
    UpdateBuffer {
        /// Destination buffer.
        buffer: GpuBufferId,
        /// Destination offset.
        offset: u64,
        /// Bytes to write.
        data: Vec<u8>,
    },
}

/// An ordered stream of device commands, submitted as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<DeviceCommand>,
}

impl CommandList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    pub fn push(&mut self, command: DeviceCommand) {
        self.commands.push(command);
    }

    /// Removes every command, keeping the allocation.
    pub fn reset(&mut self) {
        self.commands.clear();
    }

    /// The recorded commands.
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Synchronization attached to a submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitInfo {
    /// Semaphore the GPU waits on before running the list.
    pub wait: Option<SemaphoreId>,
    /// Semaphore signalled when the list completes.
    pub signal: Option<SemaphoreId>,
    /// Fence signalled when the list completes.
    pub fence: Option<FenceId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_byte_size_counts_mips_and_layers() {
        let descriptor = TextureDescriptor {
            label: "t".into(),
            width: 4,
            height: 4,
            layers: 6,
            mip_levels: 3,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::SAMPLED,
        };
        // (16 + 4 + 1) pixels * 4 bytes * 6 layers
        assert_eq!(descriptor.byte_size(), 21 * 4 * 6);
    }
}
