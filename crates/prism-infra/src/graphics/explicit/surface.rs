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

//! The presentation surface and the frame slots that pace it.

use crate::graphics::common::deletion::DeletionQueue;
use crate::graphics::common::resources::TargetBinding;
use crate::graphics::common::swapchain::Swapchain;
use prism_core::renderer::{
    CommandList, FenceId, GraphicsDevice, ResourceError, SemaphoreId, SwapchainId,
};

/// Everything one in-flight frame owns.
///
/// A slot is recorded only after its fence reports that the GPU finished
/// the slot's previous submission. Objects retired while recording the
/// slot are destroyed at that same point.
#[derive(Debug)]
pub(crate) struct FrameSlot {
    pub fence: FenceId,
    pub image_available: SemaphoreId,
    pub render_finished: SemaphoreId,
    pub list: CommandList,
    pub deletions: DeletionQueue,
}

impl FrameSlot {
    fn new(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        // Created signalled so the first wait on it returns at once.
        let fence = device.create_fence(true)?;
        let image_available = device.create_semaphore()?;
        let render_finished = device.create_semaphore()?;
        Ok(Self {
            fence,
            image_available,
            render_finished,
            list: CommandList::new(),
            deletions: DeletionQueue::default(),
        })
    }

    /// Destroys the sync objects and whatever is still queued for deletion.
    /// Returns how many queued objects were destroyed.
    fn destroy(mut self, device: &dyn GraphicsDevice) -> u32 {
        let destroyed = self.deletions.flush(device);
        let results = [
            device.destroy_fence(self.fence),
            device.destroy_semaphore(self.image_available),
            device.destroy_semaphore(self.render_finished),
        ];
        for e in results.into_iter().filter_map(Result::err) {
            log::warn!("Failed to destroy frame slot sync object: {e}");
        }
        destroyed
    }
}

/// The swapchain plus `N` frame slots.
#[derive(Debug)]
pub(crate) struct Surface {
    swapchain: Option<Swapchain>,
    slots: Vec<FrameSlot>,
    current: usize,
}

impl Surface {
    pub(crate) fn new(
        device: &dyn GraphicsDevice,
        (width, height): (u32, u32),
        frames: u32,
        vsync: bool,
    ) -> Result<Self, ResourceError> {
        let mut surface = Self {
            swapchain: None,
            slots: Vec::new(),
            current: 0,
        };
        if let Err(e) = surface.create(device, (width, height), frames, vsync) {
            surface.destroy(device);
            return Err(e);
        }
        Ok(surface)
    }

    fn create(
        &mut self,
        device: &dyn GraphicsDevice,
        (width, height): (u32, u32),
        frames: u32,
        vsync: bool,
    ) -> Result<(), ResourceError> {
        self.swapchain = Some(Swapchain::create(device, width, height, frames, vsync)?);
        for _ in 0..frames {
            self.slots.push(FrameSlot::new(device)?);
        }
        self.current = 0;
        Ok(())
    }

    /// Recreates the swapchain and every slot. The caller has waited for the
    /// device to go idle.
    pub(crate) fn rebuild(
        &mut self,
        device: &dyn GraphicsDevice,
        size: (u32, u32),
        frames: u32,
        vsync: bool,
    ) -> Result<u32, ResourceError> {
        let destroyed = self.destroy(device);
        self.create(device, size, frames, vsync)?;
        Ok(destroyed)
    }

    /// Destroys everything. Returns how many queued objects were destroyed.
    pub(crate) fn destroy(&mut self, device: &dyn GraphicsDevice) -> u32 {
        let destroyed: u32 = self.slots.drain(..).map(|slot| slot.destroy(device)).sum();
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(device);
        }
        destroyed
    }

    pub(crate) fn swapchain_id(&self) -> Option<SwapchainId> {
        self.swapchain.as_ref().map(Swapchain::id)
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        self.swapchain.as_ref().map_or((0, 0), Swapchain::size)
    }

    pub(crate) fn image_count(&self) -> usize {
        self.swapchain.as_ref().map_or(0, Swapchain::image_count)
    }

    pub(crate) fn binding(&self, image: u32) -> Option<TargetBinding> {
        self.swapchain.as_ref().and_then(|s| s.binding(image))
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn current_index(&self) -> usize {
        self.current
    }

    pub(crate) fn current(&mut self) -> Option<&mut FrameSlot> {
        self.slots.get_mut(self.current)
    }

    /// Moves on to the next slot in round-robin order.
    pub(crate) fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len().max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::{HeadlessDevice, ObjectKind};

    #[test]
    fn slots_rotate_and_rebuild_replaces_everything() {
        let device = HeadlessDevice::new(320, 200);
        let mut surface = Surface::new(&device, (320, 200), 3, true).unwrap();
        assert_eq!(surface.slot_count(), 3);
        assert_eq!(surface.image_count(), 3);
        assert_eq!(device.live(ObjectKind::Fence), 3);

        surface.advance();
        surface.advance();
        assert_eq!(surface.current_index(), 2);
        surface.advance();
        assert_eq!(surface.current_index(), 0);

        let old = surface.swapchain_id();
        surface.rebuild(&device, (640, 400), 2, true).unwrap();
        assert_ne!(surface.swapchain_id(), old);
        assert_eq!(surface.size(), (640, 400));
        assert_eq!(device.live(ObjectKind::Fence), 2);
        assert_eq!(device.live(ObjectKind::Swapchain), 1);

        surface.destroy(&device);
        assert_eq!(device.live(ObjectKind::Fence), 0);
        assert_eq!(device.live(ObjectKind::Framebuffer), 0);
    }
}
