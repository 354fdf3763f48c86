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

//! Per-slot uniform storage.

use crate::graphics::common::binding::UNIFORM_BINDING_SIZE;
use crate::graphics::common::deletion::GpuObject;
use prism_core::renderer::{
    align_to, BindGroupDescriptor, BindGroupId, BindingResource, BufferDescriptor, BufferUsage,
    GpuBufferId, GraphicsDevice, ResourceError, UNIFORM_OFFSET_ALIGNMENT,
};

/// A linear allocator over one uniform buffer, reset when its frame slot
/// comes around again.
///
/// Every block is bound through the same dynamic-offset group, so a draw
/// only changes the offset it passes to `BindGroup`.
#[derive(Debug)]
pub(crate) struct UniformRing {
    buffer: GpuBufferId,
    size: u64,
    cursor: u64,
    group: BindGroupId,
}

impl UniformRing {
    pub(crate) fn new(device: &dyn GraphicsDevice, size: u64, slot: usize) -> Result<Self, ResourceError> {
        let buffer = device.create_buffer(&BufferDescriptor {
            label: format!("uniform ring {slot}"),
            size,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        let group = device.create_bind_group(&BindGroupDescriptor {
            label: format!("uniform ring {slot} group"),
            entries: vec![BindingResource::Buffer {
                buffer,
                offset: 0,
                size: UNIFORM_BINDING_SIZE.min(size),
                dynamic: true,
            }],
        });
        match group {
            Ok(group) => Ok(Self {
                buffer,
                size,
                cursor: 0,
                group,
            }),
            Err(e) => {
                let _ = device.destroy_buffer(buffer);
                Err(e)
            }
        }
    }

    /// The group every block of this ring is bound through.
    pub(crate) fn group(&self) -> BindGroupId {
        self.group
    }

    /// Copies `data` into the ring and returns its offset, or `None` once
    /// the ring is full.
    pub(crate) fn push(&mut self, device: &dyn GraphicsDevice, data: &[u8]) -> Option<u32> {
        let binding = UNIFORM_BINDING_SIZE.min(self.size);
        if data.len() as u64 > binding {
            log::warn!(
                "Uniform block of {} bytes exceeds the {binding} byte binding",
                data.len()
            );
            return None;
        }
        let offset = align_to(self.cursor, UNIFORM_OFFSET_ALIGNMENT);
        // The whole binding window must stay inside the buffer.
        if offset + binding > self.size {
            return None;
        }
        if let Err(e) = device.write_buffer(self.buffer, offset, data) {
            log::error!("Uniform upload failed: {e}");
            return None;
        }
        self.cursor = offset + data.len().max(1) as u64;
        u32::try_from(offset).ok()
    }

    /// Bytes handed out since the last reset.
    pub(crate) fn used(&self) -> u64 {
        self.cursor
    }

    pub(crate) fn reset(&mut self) {
        self.cursor = 0;
    }

    pub(crate) fn into_objects(self) -> [GpuObject; 2] {
        [GpuObject::BindGroup(self.group), GpuObject::Buffer(self.buffer)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::HeadlessDevice;

    #[test]
    fn blocks_are_aligned_and_the_ring_runs_out() {
        let device = HeadlessDevice::new(64, 64);
        let mut ring = UniformRing::new(&device, UNIFORM_BINDING_SIZE + 512, 0).unwrap();

        assert_eq!(ring.push(&device, &[1; 64]), Some(0));
        assert_eq!(ring.push(&device, &[2; 8]), Some(256));
        assert_eq!(ring.push(&device, &[3; 8]), Some(512));
        // A fourth block would leave less than a binding window behind it.
        assert_eq!(ring.push(&device, &[4; 8]), None);

        ring.reset();
        assert_eq!(ring.used(), 0);
        assert_eq!(ring.push(&device, &[5; 8]), Some(0));
    }

    #[test]
    fn oversized_blocks_are_refused() {
        let device = HeadlessDevice::new(64, 64);
        let mut ring = UniformRing::new(&device, 1 << 20, 0).unwrap();
        let block = vec![0u8; UNIFORM_BINDING_SIZE as usize + 1];
        assert_eq!(ring.push(&device, &block), None);
    }
}
