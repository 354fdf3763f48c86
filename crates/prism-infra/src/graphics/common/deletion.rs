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

//! Deferred destruction of native objects.

use prism_core::renderer::{
    BindGroupId, ComputePipelineId, FramebufferId, GpuBufferId, GpuTextureId, GraphicsDevice,
    RenderPipelineId, ResourceError, ShaderModuleId,
};

/// A native object owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum GpuObject {
    ShaderModule(ShaderModuleId),
    RenderPipeline(RenderPipelineId),
    ComputePipeline(ComputePipelineId),
    Texture(GpuTextureId),
    Buffer(GpuBufferId),
    BindGroup(BindGroupId),
    Framebuffer(FramebufferId),
}

impl GpuObject {
    pub(crate) fn destroy(self, device: &dyn GraphicsDevice) -> Result<(), ResourceError> {
        match self {
            GpuObject::ShaderModule(id) => device.destroy_shader_module(id),
            GpuObject::RenderPipeline(id) => device.destroy_render_pipeline(id),
            GpuObject::ComputePipeline(id) => device.destroy_compute_pipeline(id),
            GpuObject::Texture(id) => device.destroy_texture(id),
            GpuObject::Buffer(id) => device.destroy_buffer(id),
            GpuObject::BindGroup(id) => device.destroy_bind_group(id),
            GpuObject::Framebuffer(id) => device.destroy_framebuffer(id),
        }
    }
}

/// Objects waiting for the GPU work that may still use them to complete.
#[derive(Debug, Default)]
pub(crate) struct DeletionQueue {
    objects: Vec<GpuObject>,
}

impl DeletionQueue {
    pub(crate) fn extend(&mut self, objects: impl IntoIterator<Item = GpuObject>) {
        self.objects.extend(objects);
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    /// Destroys everything queued. The caller guarantees the GPU is done
    /// with them. Returns how many objects were destroyed.
    pub(crate) fn flush(&mut self, device: &dyn GraphicsDevice) -> u32 {
        let mut destroyed = 0;
        // Dependent objects (framebuffers, bind groups) were queued after
        // the textures and buffers they reference, so go in reverse.
        for object in self.objects.drain(..).rev() {
            match object.destroy(device) {
                Ok(()) => destroyed += 1,
                Err(e) => log::warn!("Failed to destroy {object:?}: {e}"),
            }
        }
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::{HeadlessDevice, ObjectKind};
    use prism_core::renderer::{BufferDescriptor, BufferUsage};

    #[test]
    fn flush_destroys_everything_once() {
        let device = HeadlessDevice::default();
        let mut queue = DeletionQueue::default();
        for _ in 0..3 {
            let buffer = device
                .create_buffer(&BufferDescriptor {
                    label: "b".into(),
                    size: 4,
                    usage: BufferUsage::VERTEX,
                })
                .unwrap();
            queue.extend([GpuObject::Buffer(buffer)]);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.flush(&device), 3);
        assert_eq!(queue.flush(&device), 0);
        assert_eq!(device.live(ObjectKind::Buffer), 0);
    }
}
