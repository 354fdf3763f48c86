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

//! The immediate-mode backend.
//!
//! Mirrors how legacy APIs behave: one frame in flight, uniform blocks
//! rewritten in the command stream before every draw, and a transient
//! resource group per draw. Presentation waits for the GPU, so everything
//! retired during a frame is destroyed as soon as the frame ends.

use crate::graphics::common::binding::{
    BindContext, DrawBinder, DrawBindings, DRAW_GROUP, GLOBALS_GROUP, RESOURCES_GROUP,
    UNIFORM_BINDING_SIZE,
};
use crate::graphics::common::deletion::{DeletionQueue, GpuObject};
use crate::graphics::common::delegate_command_buffer;
use crate::graphics::common::state::BackendState;
use crate::graphics::common::swapchain::Swapchain;
use crate::graphics::context::BackendContext;
use prism_core::renderer::{
    BackendKind, BackendStats, BindGroupDescriptor, BindGroupId, BindingResource,
    BufferDescriptor, BufferUsage, CommandBuffer, DeviceCommand, FrameStatus, GpuBufferId,
    GraphicsDevice, NativeHandle, RenderBackend, RenderError, RenderTargetId, ResourceError,
    ResourceId, SharedRegistry, SkipReason, SubmitInfo, SurfaceError,
};
use std::sync::Arc;

/// One uniform buffer and the group that binds it.
#[derive(Debug, Clone, Copy)]
struct UniformSlot {
    buffer: GpuBufferId,
    group: BindGroupId,
}

impl UniformSlot {
    fn new(device: &dyn GraphicsDevice, label: &str) -> Result<Self, ResourceError> {
        let buffer = device.create_buffer(&BufferDescriptor {
            label: label.to_owned(),
            size: UNIFORM_BINDING_SIZE,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        })?;
        let group = device
            .create_bind_group(&BindGroupDescriptor {
                label: format!("{label} group"),
                entries: vec![BindingResource::Buffer {
                    buffer,
                    offset: 0,
                    size: UNIFORM_BINDING_SIZE,
                    dynamic: false,
                }],
            })
            .inspect_err(|_| {
                let _ = device.destroy_buffer(buffer);
            })?;
        Ok(Self { buffer, group })
    }

    fn objects(self) -> [GpuObject; 2] {
        [GpuObject::BindGroup(self.group), GpuObject::Buffer(self.buffer)]
    }
}

/// Rewrites two fixed uniform buffers in the command stream.
#[derive(Debug)]
pub(crate) struct ImmediateBinder {
    globals: Option<UniformSlot>,
    draw: Option<UniformSlot>,
    /// Globals version last written this frame.
    uploaded: Option<u64>,
}

impl ImmediateBinder {
    fn new(device: &dyn GraphicsDevice) -> Result<Self, ResourceError> {
        let globals = UniformSlot::new(device, "globals")?;
        let draw = UniformSlot::new(device, "draw uniforms").inspect_err(|_| {
            let mut queue = DeletionQueue::default();
            queue.extend(globals.objects());
            queue.flush(device);
        })?;
        Ok(Self {
            globals: Some(globals),
            draw: Some(draw),
            uploaded: None,
        })
    }
}

impl DrawBinder for ImmediateBinder {
    fn bind(&mut self, ctx: BindContext<'_>, bindings: &DrawBindings<'_>) -> Result<(), SkipReason> {
        let (Some(globals), Some(draw)) = (self.globals, self.draw) else {
            return Err(SkipReason::UniformSpaceExhausted);
        };
        if bindings.block.len() as u64 > UNIFORM_BINDING_SIZE
            || bindings.globals.len() as u64 > UNIFORM_BINDING_SIZE
        {
            return Err(SkipReason::UniformSpaceExhausted);
        }
        if self.uploaded != Some(bindings.globals_version) {
            ctx.list.push(DeviceCommand::UpdateBuffer {
                buffer: globals.buffer,
                offset: 0,
                data: bindings.globals.to_vec(),
            });
            self.uploaded = Some(bindings.globals_version);
        }
        ctx.list.push(DeviceCommand::UpdateBuffer {
            buffer: draw.buffer,
            offset: 0,
            data: bindings.block.to_vec(),
        });
        ctx.list.push(DeviceCommand::BindGroup {
            index: GLOBALS_GROUP,
            group: globals.group,
            dynamic_offset: None,
        });
        if !bindings.resources.is_empty() {
            let group = ctx
                .device
                .create_bind_group(&BindGroupDescriptor {
                    label: format!("{} transient", bindings.owner),
                    entries: bindings.resources.to_vec(),
                })
                .map_err(|e| {
                    log::error!("Failed to bind the resources of {}: {e}", bindings.owner);
                    SkipReason::ResourceUnavailable(bindings.owner)
                })?;
            ctx.stats.descriptors_created += 1;
            // Lives until the frame's work has completed.
            ctx.retired.push(GpuObject::BindGroup(group));
            ctx.list.push(DeviceCommand::BindGroup {
                index: RESOURCES_GROUP,
                group,
                dynamic_offset: None,
            });
        }
        ctx.list.push(DeviceCommand::BindGroup {
            index: DRAW_GROUP,
            group: draw.group,
            dynamic_offset: None,
        });
        Ok(())
    }

    fn evict(&mut self, _owner: ResourceId, _retired: &mut Vec<GpuObject>) {}

    fn drain(&mut self) -> Vec<GpuObject> {
        [self.globals.take(), self.draw.take()]
            .into_iter()
            .flatten()
            .flat_map(UniformSlot::objects)
            .collect()
    }
}

/// The immediate-mode backend. See the module documentation.
#[derive(Debug)]
pub struct ImmediateBackend {
    state: BackendState<ImmediateBinder>,
    swapchain: Option<Swapchain>,
    requested_size: (u32, u32),
    rebuild_pending: bool,
    image_index: Option<u32>,
}

impl ImmediateBackend {
    /// Creates the swapchain and the two uniform buffers.
    /// ## Errors
    /// * `RenderError::InitializationFailed` - The device refused one of them.
    pub fn new(context: BackendContext) -> Result<Self, RenderError> {
        let device = Arc::clone(&context.device);
        let size = (context.config.width, context.config.height);
        let images = device.surface_capabilities().min_images.max(1);
        let swapchain = Swapchain::create(&*device, size.0, size.1, images, context.config.vsync)
            .map_err(|e| RenderError::InitializationFailed(format!("swapchain: {e}")))?;
        let binder = match ImmediateBinder::new(&*device) {
            Ok(binder) => binder,
            Err(e) => {
                swapchain.destroy(&*device);
                return Err(RenderError::InitializationFailed(format!("uniforms: {e}")));
            }
        };
        let handle = NativeHandle::new(swapchain.id().0);
        if context.config.frames_in_flight > 1 {
            log::debug!("The immediate backend keeps a single frame in flight");
        }
        log::info!("Immediate backend ready: {}x{}", size.0, size.1);
        Ok(Self {
            state: BackendState::new(context, binder, handle),
            swapchain: Some(swapchain),
            requested_size: size,
            rebuild_pending: false,
            image_index: None,
        })
    }

    fn rebuild(&mut self) -> Result<(), RenderError> {
        let device = Arc::clone(&self.state.device);
        device.wait_idle().map_err(|e| self.state.note_error(e))?;
        if let Some(old) = self.swapchain.take() {
            old.destroy(&*device);
        }
        let (width, height) = self.requested_size;
        let images = device.surface_capabilities().min_images.max(1);
        let swapchain = Swapchain::create(&*device, width, height, images, self.state.config.vsync)
            .map_err(|e| self.state.note_error(e))?;
        self.swapchain = Some(swapchain);
        self.rebuild_pending = false;
        Ok(())
    }

    /// Destroys everything retired during the frame. The GPU is idle.
    fn release_retired(&mut self) {
        let mut queue = DeletionQueue::default();
        queue.extend(self.state.retired.drain(..));
        self.state.stats.destroyed += queue.flush(&*self.state.device);
    }
}

impl RenderBackend for ImmediateBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Immediate
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
        self.state.binder.uploaded = None;

        let (width, height) = self.requested_size;
        if width == 0 || height == 0 {
            return Ok(FrameStatus::Dropped);
        }
        let stale = self
            .swapchain
            .as_ref()
            .map_or(true, |s| s.size() != self.requested_size);
        if self.rebuild_pending || stale {
            self.rebuild()?;
        }
        let Some(swapchain) = self.swapchain.as_ref().map(Swapchain::id) else {
            return Ok(FrameStatus::Dropped);
        };
        let image = match self.state.device.acquire_next_image(swapchain, None) {
            Ok(image) => image,
            Err(SurfaceError::OutOfDate) => {
                let caps = self.state.device.surface_capabilities();
                self.requested_size = (caps.width, caps.height);
                self.rebuild_pending = true;
                log::info!("Surface out of date; dropping the frame");
                return Ok(FrameStatus::Dropped);
            }
            Err(SurfaceError::Timeout) => return Ok(FrameStatus::Dropped),
            Err(SurfaceError::Lost) => {
                if self.state.check_lost() {
                    return Err(RenderError::DeviceLost);
                }
                self.rebuild_pending = true;
                return Err(RenderError::Surface(SurfaceError::Lost));
            }
        };
        let binding = self.swapchain.as_ref().and_then(|s| s.binding(image));
        self.state.start_frame(binding);
        self.image_index = Some(image);
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

        let submitted = device
            .submit(&self.state.list, SubmitInfo::default())
            .and_then(|()| device.wait_idle());
        if let Err(e) = submitted {
            let error = self.state.note_error(e);
            if !self.state.lost {
                self.release_retired();
            }
            return Err(error);
        }
        if let Some(swapchain) = self.swapchain.as_ref().map(Swapchain::id) {
            match device.present(swapchain, image, None) {
                Ok(()) => {}
                Err(SurfaceError::OutOfDate) | Err(SurfaceError::Lost) => {
                    let caps = device.surface_capabilities();
                    self.requested_size = (caps.width, caps.height);
                    self.rebuild_pending = true;
                }
                Err(SurfaceError::Timeout) => log::warn!("Present timed out"),
            }
        }
        self.release_retired();
        match self.state.pending_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if (width, height) != self.requested_size {
            self.requested_size = (width, height);
            self.rebuild_pending = true;
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.swapchain.as_ref().map_or((0, 0), Swapchain::size)
    }

    fn native_target(&self) -> RenderTargetId {
        self.state.native_target
    }

    fn native_handle(&mut self, id: ResourceId) -> Option<NativeHandle> {
        self.state.native_handle(id)
    }

    fn collect_garbage(&mut self) {
        self.state.collect_garbage();
        // Outside a frame nothing in flight can still use them.
        if !self.state.frame_open && !self.state.lost {
            self.release_retired();
        }
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

delegate_command_buffer!(ImmediateBackend);

impl Drop for ImmediateBackend {
    fn drop(&mut self) {
        self.state.teardown();
        if let Some(swapchain) = self.swapchain.take() {
            swapchain.destroy(&*self.state.device);
        }
        log::debug!("Immediate backend shut down");
    }
}
