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

//! The explicit-API backend.
//!
//! Pipelines and resource descriptor sets are cached across frames. Up to
//! `frames_in_flight` frames overlap: each [`FrameSlot`](surface::FrameSlot)
//! has its own fence, command list, uniform ring and deletion queue, and is
//! only reused after its fence signals. Replaced native objects wait in the
//! deletion queue of the slot that retired them.

mod descriptors;
mod surface;
mod uniforms;

use self::descriptors::DescriptorCache;
use self::surface::Surface;
use self::uniforms::UniformRing;
use crate::graphics::common::binding::{
    BindContext, DrawBinder, DrawBindings, DRAW_GROUP, GLOBALS_GROUP, RESOURCES_GROUP,
};
use crate::graphics::common::deletion::{DeletionQueue, GpuObject};
use crate::graphics::common::delegate_command_buffer;
use crate::graphics::common::state::BackendState;
use crate::graphics::common::swapchain::clamp_image_count;
use crate::graphics::context::BackendContext;
use prism_core::renderer::{
    BackendKind, BackendStats, CommandBuffer, CommandList, DeviceCommand, FenceWait,
    FrameStatus, GraphicsDevice, NativeHandle, RenderBackend, RenderError, RenderTargetId,
    ResourceError, ResourceId, SharedRegistry, SkipReason, SubmitInfo, SurfaceError,
};
use std::sync::Arc;

/// Binds uniforms from per-slot rings and resources from cached groups.
#[derive(Debug)]
pub(crate) struct ExplicitBinder {
    rings: Vec<UniformRing>,
    current: usize,
    ring_size: u64,
    /// Version and ring offset of the globals uploaded this frame.
    globals: Option<(u64, u32)>,
    descriptors: DescriptorCache,
}

impl ExplicitBinder {
    fn new(ring_size: u64) -> Self {
        Self {
            rings: Vec::new(),
            current: 0,
            ring_size,
            globals: None,
            descriptors: DescriptorCache::default(),
        }
    }

    /// Makes one ring per slot. Returns the rings it replaced; the device is
    /// idle, so they can be destroyed right away.
    fn set_slot_count(
        &mut self,
        device: &dyn GraphicsDevice,
        slots: usize,
    ) -> Result<Vec<GpuObject>, ResourceError> {
        if self.rings.len() == slots {
            return Ok(Vec::new());
        }
        let old = self
            .rings
            .drain(..)
            .flat_map(UniformRing::into_objects)
            .collect();
        for slot in 0..slots {
            self.rings.push(UniformRing::new(device, self.ring_size, slot)?);
        }
        self.current = 0;
        self.globals = None;
        Ok(old)
    }

    /// Starts recording into `slot`, whose previous work has completed.
    fn begin_slot(&mut self, slot: usize) {
        self.current = slot;
        self.globals = None;
        if let Some(ring) = self.rings.get_mut(slot) {
            ring.reset();
        }
    }
}

impl DrawBinder for ExplicitBinder {
    fn bind(&mut self, ctx: BindContext<'_>, bindings: &DrawBindings<'_>) -> Result<(), SkipReason> {
        let ring = self
            .rings
            .get_mut(self.current)
            .ok_or(SkipReason::UniformSpaceExhausted)?;
        let globals = match self.globals {
            Some((version, offset)) if version == bindings.globals_version => offset,
            _ => {
                let offset = ring
                    .push(ctx.device, bindings.globals)
                    .ok_or(SkipReason::UniformSpaceExhausted)?;
                self.globals = Some((bindings.globals_version, offset));
                offset
            }
        };
        let block = ring
            .push(ctx.device, bindings.block)
            .ok_or(SkipReason::UniformSpaceExhausted)?;

        ctx.list.push(DeviceCommand::BindGroup {
            index: GLOBALS_GROUP,
            group: ring.group(),
            dynamic_offset: Some(globals),
        });
        if !bindings.resources.is_empty() {
            let group = self
                .descriptors
                .get_or_create(
                    ctx.device,
                    bindings.owner,
                    bindings.generation,
                    bindings.resources,
                    ctx.retired,
                    ctx.stats,
                )
                .map_err(|e| {
                    log::error!("Failed to build the descriptor set of {}: {e}", bindings.owner);
                    SkipReason::ResourceUnavailable(bindings.owner)
                })?;
            ctx.list.push(DeviceCommand::BindGroup {
                index: RESOURCES_GROUP,
                group,
                dynamic_offset: None,
            });
        }
        ctx.list.push(DeviceCommand::BindGroup {
            index: DRAW_GROUP,
            group: ring.group(),
            dynamic_offset: Some(block),
        });
        Ok(())
    }

    fn evict(&mut self, owner: ResourceId, retired: &mut Vec<GpuObject>) {
        self.descriptors.evict(owner, retired);
    }

    fn drain(&mut self) -> Vec<GpuObject> {
        let mut objects: Vec<GpuObject> = self.descriptors.drain().collect();
        objects.extend(self.rings.drain(..).flat_map(UniformRing::into_objects));
        objects
    }
}

/// The explicit-API backend. See the module documentation.
#[derive(Debug)]
pub struct ExplicitBackend {
    state: BackendState<ExplicitBinder>,
    surface: Surface,
    requested_size: (u32, u32),
    rebuild_pending: bool,
    image_index: Option<u32>,
}

impl ExplicitBackend {
    /// Creates the surface, its frame slots and their uniform rings.
    /// ## Errors
    /// * `RenderError::InitializationFailed` - The surface could not be
    ///   created.
    pub fn new(context: BackendContext) -> Result<Self, RenderError> {
        let device = Arc::clone(&context.device);
        let config = &context.config;
        let size = (config.width, config.height);
        let frames = clamp_image_count(&*device, config.frames_in_flight);
        let surface = Surface::new(&*device, size, frames, config.vsync)
            .map_err(|e| RenderError::InitializationFailed(format!("surface: {e}")))?;

        let mut binder = ExplicitBinder::new(config.uniform_ring_size);
        if let Err(e) = binder.set_slot_count(&*device, surface.slot_count()) {
            let mut surface = surface;
            surface.destroy(&*device);
            return Err(RenderError::InitializationFailed(format!("uniform rings: {e}")));
        }
        let handle = NativeHandle::new(surface.swapchain_id().map_or(0, |id| id.0));
        log::info!(
            "Explicit backend ready: {}x{}, {} frame(s) in flight",
            size.0,
            size.1,
            surface.slot_count()
        );
        Ok(Self {
            state: BackendState::new(context, binder, handle),
            surface,
            requested_size: size,
            rebuild_pending: false,
            image_index: None,
        })
    }

    /// Number of frame slots, which is also the number of swapchain images.
    pub fn frames_in_flight(&self) -> usize {
        self.surface.slot_count()
    }

    /// The slot the next frame records into.
    pub fn current_slot(&self) -> usize {
        self.surface.current_index()
    }

    /// Number of cached graphics pipelines.
    pub fn pipeline_count(&self) -> usize {
        self.state.pipelines.len()
    }

    fn rebuild(&mut self) -> Result<(), RenderError> {
        let device = Arc::clone(&self.state.device);
        device.wait_idle().map_err(|e| self.state.note_error(e))?;
        let frames = clamp_image_count(&*device, self.state.config.frames_in_flight);
        let destroyed = self
            .surface
            .rebuild(&*device, self.requested_size, frames, self.state.config.vsync)
            .map_err(|e| self.state.note_error(e))?;
        let old = self
            .state
            .binder
            .set_slot_count(&*device, self.surface.slot_count())
            .map_err(|e| self.state.note_error(e))?;
        let mut queue = DeletionQueue::default();
        queue.extend(old);
        self.state.stats.destroyed += destroyed + queue.flush(&*device);
        self.rebuild_pending = false;
        log::info!(
            "Surface rebuilt at {}x{} with {} frame slot(s)",
            self.requested_size.0,
            self.requested_size.1,
            self.surface.slot_count()
        );
        Ok(())
    }

    /// Follows the surface to its current size after it went stale.
    fn rebuild_to_surface(&mut self) -> Result<(), RenderError> {
        let caps = self.state.device.surface_capabilities();
        self.requested_size = (caps.width, caps.height);
        if caps.width == 0 || caps.height == 0 {
            self.rebuild_pending = true;
            return Ok(());
        }
        self.rebuild()
    }
}

impl RenderBackend for ExplicitBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Explicit
    }

    fn begin_frame(&mut self) -> Result<FrameStatus, RenderError> {
        if self.state.check_lost() {
            return Err(RenderError::DeviceLost);
        }
        if self.state.frame_open {
            log::warn!("begin_frame called with a frame in progress; submitting it first");
            self.end_frame()?;
        }
        self.state.stats = BackendStats::default();

        let (width, height) = self.requested_size;
        if width == 0 || height == 0 {
            return Ok(FrameStatus::Dropped);
        }
        if self.rebuild_pending || self.surface.size() != self.requested_size {
            self.rebuild()?;
        }
        let Some(swapchain) = self.surface.swapchain_id() else {
            return Ok(FrameStatus::Dropped);
        };

        let device = Arc::clone(&self.state.device);
        let timeout = self.state.config.fence_timeout();
        let slot_index = self.surface.current_index();
        let Some(slot) = self.surface.current() else {
            return Ok(FrameStatus::Dropped);
        };
        match device.wait_for_fence(slot.fence, timeout) {
            Ok(FenceWait::Signaled) => {}
            Ok(FenceWait::TimedOut) => {
                log::warn!("Frame slot {slot_index} still busy after {timeout:?}; dropping the frame");
                return Ok(FrameStatus::Dropped);
            }
            Err(e) => return Err(self.state.note_error(e)),
        }
        // The slot's previous submission is complete.
        self.state.stats.destroyed += slot.deletions.flush(&*device);

        let image = match device.acquire_next_image(swapchain, Some(slot.image_available)) {
            Ok(image) => image,
            Err(SurfaceError::OutOfDate) => {
                log::info!("Surface out of date; rebuilding and dropping the frame");
                self.rebuild_to_surface()?;
                return Ok(FrameStatus::Dropped);
            }
            Err(SurfaceError::Timeout) => {
                log::warn!("No presentation image available; dropping the frame");
                return Ok(FrameStatus::Dropped);
            }
            Err(SurfaceError::Lost) => {
                if self.state.check_lost() {
                    return Err(RenderError::DeviceLost);
                }
                log::error!("Presentation surface lost");
                self.rebuild_pending = true;
                return Err(RenderError::Surface(SurfaceError::Lost));
            }
        };
        // Reset only once the frame is certain to be submitted.
        if let Err(e) = device.reset_fence(slot.fence) {
            return Err(self.state.note_error(e));
        }

        std::mem::swap(&mut slot.list, &mut self.state.list);
        self.state.binder.begin_slot(slot_index);
        self.state.start_frame(self.surface.binding(image));
        self.image_index = Some(image);
        log::trace!("Frame started on slot {slot_index}, image {image}");
        Ok(FrameStatus::Ready { image_index: image })
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        if self.state.check_lost() {
            return Err(RenderError::DeviceLost);
        }
        if !self.state.frame_open {
            return Err(RenderError::NoFrameInProgress);
        }
        self.state.finish_frame();
        let image = self.image_index.take().unwrap_or_default();
        let device = Arc::clone(&self.state.device);
        let swapchain = self.surface.swapchain_id();
        let Some(slot) = self.surface.current() else {
            return Err(RenderError::Internal("no frame slot".to_owned()));
        };

        let submitted = device.submit(
            &self.state.list,
            SubmitInfo {
                wait: Some(slot.image_available),
                signal: Some(slot.render_finished),
                fence: Some(slot.fence),
            },
        );
        std::mem::swap(&mut slot.list, &mut self.state.list);
        slot.deletions.extend(self.state.retired.drain(..));
        let render_finished = slot.render_finished;
        let fence = slot.fence;

        if let Err(e) = submitted {
            let error = self.state.note_error(e);
            if !self.state.lost {
                // The slot's fence must still signal or the slot is stuck.
                let empty = SubmitInfo {
                    fence: Some(fence),
                    ..SubmitInfo::default()
                };
                if let Err(e) = device.submit(&CommandList::new(), empty) {
                    log::error!("Could not release frame slot: {e}");
                }
            }
            self.surface.advance();
            return Err(error);
        }

        if let Some(swapchain) = swapchain {
            match device.present(swapchain, image, Some(render_finished)) {
                Ok(()) => {}
                Err(SurfaceError::OutOfDate) => {
                    log::info!("Surface out of date at present; rebuilding next frame");
                    self.rebuild_pending = true;
                    let caps = device.surface_capabilities();
                    self.requested_size = (caps.width, caps.height);
                }
                Err(SurfaceError::Timeout) => log::warn!("Present timed out"),
                Err(SurfaceError::Lost) => {
                    if self.state.check_lost() {
                        return Err(RenderError::DeviceLost);
                    }
                    self.rebuild_pending = true;
                }
            }
        }
        self.surface.advance();
        match self.state.pending_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if (width, height) != self.requested_size {
            log::debug!("Surface resize requested: {width}x{height}");
            self.requested_size = (width, height);
            self.rebuild_pending = true;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface.size()
    }

    fn native_target(&self) -> RenderTargetId {
        self.state.native_target
    }

    fn native_handle(&mut self, id: ResourceId) -> Option<NativeHandle> {
        self.state.native_handle(id)
    }

    fn collect_garbage(&mut self) {
        self.state.collect_garbage();
    }

    fn stats(&self) -> BackendStats {
        self.state.stats
    }

    fn registry(&self) -> &SharedRegistry {
        &self.state.registry
    }

    fn is_device_lost(&self) -> bool {
        self.state.lost || self.state.device.is_lost()
    }

    fn command_buffer(&mut self) -> &mut dyn CommandBuffer {
        self
    }
}

delegate_command_buffer!(ExplicitBackend);

impl Drop for ExplicitBackend {
    fn drop(&mut self) {
        self.state.teardown();
        let device = Arc::clone(&self.state.device);
        let destroyed = self.surface.destroy(&*device);
        log::debug!("Explicit backend shut down ({destroyed} deferred object(s) released)");
    }
}
