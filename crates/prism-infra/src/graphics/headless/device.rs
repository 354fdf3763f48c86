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

//! An in-memory [`GraphicsDevice`].
//!
//! The headless device keeps object tables like a real driver would, runs
//! submitted lists lazily (work "completes" when a fence is waited on or the
//! device idles), and exposes hooks to inject the failures backends must
//! survive: shader compile errors, memory exhaustion, stale surfaces, device
//! loss and GPUs that never signal.
//!
//! It also checks the one rule explicit APIs never forgive: an object must
//! not be destroyed while a submission that references it is still pending.
//! Violations are counted instead of crashing.

use parking_lot::Mutex;
use prism_core::renderer::{
    BindGroupDescriptor, BindGroupId, BindingResource, BufferDescriptor, CommandList,
    ComputePipelineDescriptor, ComputePipelineId, DeviceCommand, FenceId, FenceWait,
    FramebufferDescriptor, FramebufferId, GpuBufferId, GpuTextureId, GraphicsDevice,
    PipelineError, RenderPipelineDescriptor, RenderPipelineId, ResourceError, SemaphoreId,
    ShaderCode, ShaderError, ShaderModuleDescriptor, ShaderModuleId, SubmitInfo,
    SurfaceCapabilities, SurfaceError, SwapchainDescriptor, SwapchainId, TextureDescriptor,
    TextureFormat, TextureUsage,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// The kinds of native object the device tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ObjectKind {
    ShaderModule,
    RenderPipeline,
    ComputePipeline,
    Texture,
    Buffer,
    BindGroup,
    Framebuffer,
    Fence,
    Semaphore,
    Swapchain,
}

/// Something the device observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A command list was queued.
    Submitted {
        /// Monotonic submission number, starting at 1.
        index: u64,
        /// Fence signalled on completion.
        fence: Option<FenceId>,
        /// Number of commands in the list.
        commands: usize,
    },
    /// A fence wait returned.
    FenceWaited {
        /// The fence.
        fence: FenceId,
        /// How the wait ended.
        outcome: FenceWait,
    },
    /// A fence was reset.
    FenceReset(FenceId),
    /// The device drained its queue.
    WaitIdle,
    /// A swapchain was created.
    SwapchainCreated {
        /// The swapchain.
        id: SwapchainId,
        /// Its image count.
        images: u32,
        /// Its width.
        width: u32,
        /// Its height.
        height: u32,
    },
    /// A swapchain image was acquired.
    Acquired {
        /// Image index.
        image: u32,
    },
    /// A swapchain image was presented.
    Presented {
        /// Image index.
        image: u32,
    },
    /// An object was destroyed while pending work referenced it.
    DestroyedInUse {
        /// Raw id of the object.
        raw: u64,
        /// Its kind.
        kind: ObjectKind,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    created: usize,
    destroyed: usize,
}

#[derive(Debug)]
struct FenceState {
    signaled: bool,
    pending: Option<u64>,
}

#[derive(Debug)]
struct SwapchainEntry {
    images: Vec<GpuTextureId>,
    next_image: u32,
}

#[derive(Debug)]
struct PendingSubmission {
    index: u64,
    references: HashSet<u64>,
}

#[derive(Debug)]
struct HeadlessState {
    shaders: HashSet<ShaderModuleId>,
    render_pipelines: HashMap<RenderPipelineId, RenderPipelineDescriptor>,
    compute_pipelines: HashSet<ComputePipelineId>,
    textures: HashMap<GpuTextureId, TextureDescriptor>,
    buffers: HashMap<GpuBufferId, Vec<u8>>,
    bind_groups: HashMap<BindGroupId, BindGroupDescriptor>,
    framebuffers: HashMap<FramebufferId, FramebufferDescriptor>,
    fences: HashMap<FenceId, FenceState>,
    semaphores: HashSet<SemaphoreId>,
    swapchains: HashMap<SwapchainId, SwapchainEntry>,

    pending: Vec<PendingSubmission>,
    submissions: u64,
    submitted: Vec<CommandList>,

    allocated_bytes: u64,
    memory_budget: Option<u64>,
    gpu_stalled: bool,

    surface: SurfaceCapabilities,
    surface_out_of_date: bool,

    counts: HashMap<ObjectKind, Counts>,
    events: Vec<DeviceEvent>,
}

/// A [`GraphicsDevice`] that keeps everything in memory.
#[derive(Debug)]
pub struct HeadlessDevice {
    state: Mutex<HeadlessState>,
    next_id: AtomicU64,
    lost: AtomicBool,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl HeadlessDevice {
    /// A device presenting to a virtual `width` x `height` surface that
    /// supports two or three swapchain images.
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("Created headless device with a {width}x{height} surface");
        Self {
            state: Mutex::new(HeadlessState {
                shaders: HashSet::new(),
                render_pipelines: HashMap::new(),
                compute_pipelines: HashSet::new(),
                textures: HashMap::new(),
                buffers: HashMap::new(),
                bind_groups: HashMap::new(),
                framebuffers: HashMap::new(),
                fences: HashMap::new(),
                semaphores: HashSet::new(),
                swapchains: HashMap::new(),
                pending: Vec::new(),
                submissions: 0,
                submitted: Vec::new(),
                allocated_bytes: 0,
                memory_budget: None,
                gpu_stalled: false,
                surface: SurfaceCapabilities {
                    min_images: 2,
                    max_images: 3,
                    format: TextureFormat::Bgra8UnormSrgb,
                    width,
                    height,
                },
                surface_out_of_date: false,
                counts: HashMap::new(),
                events: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
            lost: AtomicBool::new(false),
        }
    }

    // --- Failure injection ---

    /// Limits the bytes textures and buffers may occupy.
    pub fn set_memory_budget(&self, budget: Option<u64>) {
        self.state.lock().memory_budget = budget;
    }

    /// Makes the next acquire or present report an out-of-date swapchain.
    /// Cleared when a swapchain is created.
    pub fn invalidate_surface(&self) {
        self.state.lock().surface_out_of_date = true;
    }

    /// Resizes the virtual window and invalidates the surface.
    pub fn resize_window(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.surface.width = width;
        state.surface.height = height;
        state.surface_out_of_date = true;
    }

    /// Changes the image counts the platform reports.
    pub fn set_image_limits(&self, min_images: u32, max_images: u32) {
        let mut state = self.state.lock();
        state.surface.min_images = min_images;
        state.surface.max_images = max_images;
    }

    /// Stops (or resumes) GPU progress: fence waits on pending work time out.
    pub fn stall_gpu(&self, stalled: bool) {
        self.state.lock().gpu_stalled = stalled;
    }

    /// Loses the device. Every later call fails.
    pub fn lose_device(&self) {
        log::error!("Headless device lost");
        self.lost.store(true, Ordering::SeqCst);
    }

    // --- Inspection ---

    /// Objects of `kind` currently alive.
    pub fn live(&self, kind: ObjectKind) -> usize {
        let counts = self.counts(kind);
        counts.created - counts.destroyed
    }

    /// Objects of `kind` ever created.
    pub fn created(&self, kind: ObjectKind) -> usize {
        self.counts(kind).created
    }

    /// Objects of `kind` ever destroyed.
    pub fn destroyed(&self, kind: ObjectKind) -> usize {
        self.counts(kind).destroyed
    }

    fn counts(&self, kind: ObjectKind) -> Counts {
        self.state
            .lock()
            .counts
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }

    /// Every event so far.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.state.lock().events.clone()
    }

    /// Clears the event log.
    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Number of objects destroyed while pending work referenced them.
    pub fn use_after_free_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::DestroyedInUse { .. }))
            .count()
    }

    /// Every submitted command list, in order.
    pub fn submitted_lists(&self) -> Vec<CommandList> {
        self.state.lock().submitted.clone()
    }

    /// Number of submissions so far.
    pub fn submission_count(&self) -> u64 {
        self.state.lock().submissions
    }

    /// Bytes currently held by textures and buffers.
    pub fn allocated_bytes(&self) -> u64 {
        self.state.lock().allocated_bytes
    }

    /// The descriptor a framebuffer was created with.
    pub fn framebuffer(&self, id: FramebufferId) -> Option<FramebufferDescriptor> {
        self.state.lock().framebuffers.get(&id).cloned()
    }

    /// The descriptor a texture was created with.
    pub fn texture(&self, id: GpuTextureId) -> Option<TextureDescriptor> {
        self.state.lock().textures.get(&id).cloned()
    }

    /// The descriptor a render pipeline was created with.
    pub fn render_pipeline(&self, id: RenderPipelineId) -> Option<RenderPipelineDescriptor> {
        self.state.lock().render_pipelines.get(&id).cloned()
    }

    /// The current contents of a buffer.
    pub fn buffer_contents(&self, id: GpuBufferId) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&id).cloned()
    }

    // --- Helpers ---

    fn next_raw(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_alive(&self) -> Result<(), ResourceError> {
        if self.lost.load(Ordering::SeqCst) {
            Err(ResourceError::DeviceLost)
        } else {
            Ok(())
        }
    }

    fn created_one(state: &mut HeadlessState, kind: ObjectKind) {
        state.counts.entry(kind).or_default().created += 1;
    }

    fn destroyed_one(state: &mut HeadlessState, kind: ObjectKind, raw: u64) {
        state.counts.entry(kind).or_default().destroyed += 1;
        if state.pending.iter().any(|p| p.references.contains(&raw)) {
            log::error!("{kind:?} #{raw} destroyed while in use by pending work");
            state.events.push(DeviceEvent::DestroyedInUse { raw, kind });
        }
    }

    fn allocate(state: &mut HeadlessState, bytes: u64) -> Result<(), ResourceError> {
        if let Some(budget) = state.memory_budget {
            if state.allocated_bytes + bytes > budget {
                return Err(ResourceError::OutOfMemory { requested: bytes });
            }
        }
        state.allocated_bytes += bytes;
        Ok(())
    }

    fn remove<K: std::hash::Hash + Eq, V>(
        map: &mut HashMap<K, V>,
        id: &K,
    ) -> Result<V, ResourceError> {
        map.remove(id).ok_or(ResourceError::InvalidHandle)
    }

    /// Completes every submission up to and including `index`.
    fn complete_through(state: &mut HeadlessState, index: u64) {
        state.pending.retain(|p| p.index > index);
        for fence in state.fences.values_mut() {
            if matches!(fence.pending, Some(i) if i <= index) {
                fence.pending = None;
                fence.signaled = true;
            }
        }
    }

    fn create_texture_locked(
        &self,
        state: &mut HeadlessState,
        descriptor: &TextureDescriptor,
    ) -> Result<GpuTextureId, ResourceError> {
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(ResourceError::InvalidDescription(format!(
                "texture '{}' has a zero extent",
                descriptor.label
            )));
        }
        Self::allocate(state, descriptor.byte_size())?;
        let id = GpuTextureId(self.next_raw());
        state.textures.insert(id, descriptor.clone());
        Self::created_one(state, ObjectKind::Texture);
        Ok(id)
    }

    fn destroy_texture_locked(state: &mut HeadlessState, id: GpuTextureId) -> Result<(), ResourceError> {
        let descriptor = Self::remove(&mut state.textures, &id)?;
        state.allocated_bytes = state.allocated_bytes.saturating_sub(descriptor.byte_size());
        Self::destroyed_one(state, ObjectKind::Texture, id.0);
        Ok(())
    }

    fn validate_framebuffer(
        state: &HeadlessState,
        descriptor: &FramebufferDescriptor,
    ) -> Result<(), ResourceError> {
        let attachments = descriptor.colors.iter().chain(descriptor.depth.iter());
        for attachment in attachments {
            let texture = state
                .textures
                .get(&attachment.texture)
                .ok_or(ResourceError::InvalidHandle)?;
            let (w, h) = (
                (texture.width >> attachment.mip_level).max(1),
                (texture.height >> attachment.mip_level).max(1),
            );
            if (w, h) != (descriptor.width, descriptor.height) {
                return Err(ResourceError::InvalidDescription(format!(
                    "framebuffer '{}' is {}x{} but an attachment is {w}x{h}",
                    descriptor.label, descriptor.width, descriptor.height
                )));
            }
            if !texture.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
                return Err(ResourceError::InvalidDescription(format!(
                    "texture '{}' is not a render attachment",
                    texture.label
                )));
            }
        }
        Ok(())
    }
}

/// Raw ids of every object a command touches.
fn command_references(command: &DeviceCommand, out: &mut HashSet<u64>) {
    match command {
        DeviceCommand::BeginRenderPass { framebuffer } => {
            out.insert(framebuffer.0);
        }
        DeviceCommand::BindPipeline(id) => {
            out.insert(id.0);
        }
        DeviceCommand::BindGroup { group, .. } => {
            out.insert(group.0);
        }
        DeviceCommand::SetVertexBuffer { buffer, .. } | DeviceCommand::SetIndexBuffer(buffer) => {
            out.insert(buffer.0);
        }
        DeviceCommand::UpdateBuffer { buffer, .. } => {
            out.insert(buffer.0);
        }
        DeviceCommand::BindComputePipeline(id) => {
            out.insert(id.0);
        }
        _ => {}
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor<'_>,
    ) -> Result<ShaderModuleId, ResourceError> {
        self.check_alive()?;
        let source = descriptor.source;
        let broken = match &source.code {
            ShaderCode::Text(text) => text.contains("#error"),
            ShaderCode::Binary(_) => false,
        };
        if source.code.is_empty() || broken {
            return Err(ShaderError::CompilationError {
                label: descriptor.label.to_owned(),
                details: format!("{:?} stage failed to compile", descriptor.stage),
            }
            .into());
        }
        let id = ShaderModuleId(self.next_raw());
        let mut state = self.state.lock();
        state.shaders.insert(id);
        Self::created_one(&mut state, ObjectKind::ShaderModule);
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        if !state.shaders.remove(&id) {
            return Err(ResourceError::InvalidHandle);
        }
        Self::destroyed_one(&mut state, ObjectKind::ShaderModule, id.0);
        Ok(())
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        for module in [descriptor.vertex, descriptor.fragment] {
            if !state.shaders.contains(&module) {
                return Err(ShaderError::NotFound { id: module }.into());
            }
        }
        if let Some(format) = descriptor.color_formats.iter().find(|f| f.is_depth()) {
            return Err(PipelineError::IncompatibleColorTarget(format!(
                "{format:?} used as a color target by '{}'",
                descriptor.label
            ))
            .into());
        }
        let id = RenderPipelineId(self.next_raw());
        state.render_pipelines.insert(id, descriptor.clone());
        Self::created_one(&mut state, ObjectKind::RenderPipeline);
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        Self::remove(&mut state.render_pipelines, &id)?;
        Self::destroyed_one(&mut state, ObjectKind::RenderPipeline, id.0);
        Ok(())
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        if !state.shaders.contains(&descriptor.module) {
            return Err(ShaderError::NotFound {
                id: descriptor.module,
            }
            .into());
        }
        let id = ComputePipelineId(self.next_raw());
        state.compute_pipelines.insert(id);
        Self::created_one(&mut state, ObjectKind::ComputePipeline);
        Ok(id)
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        if !state.compute_pipelines.remove(&id) {
            return Err(ResourceError::InvalidHandle);
        }
        Self::destroyed_one(&mut state, ObjectKind::ComputePipeline, id.0);
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTextureId, ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        self.create_texture_locked(&mut state, descriptor)
    }

    fn write_texture(&self, id: GpuTextureId, data: &[u8]) -> Result<(), ResourceError> {
        self.check_alive()?;
        let state = self.state.lock();
        let texture = state.textures.get(&id).ok_or(ResourceError::InvalidHandle)?;
        let expected = texture.width as usize
            * texture.height as usize
            * texture.format.bytes_per_pixel() as usize
            * texture.layers.max(1) as usize;
        if data.len() != expected {
            return Err(ResourceError::OutOfBounds);
        }
        Ok(())
    }

    fn destroy_texture(&self, id: GpuTextureId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        Self::destroy_texture_locked(&mut state, id)
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBufferId, ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        Self::allocate(&mut state, descriptor.size)?;
        let id = GpuBufferId(self.next_raw());
        state.buffers.insert(id, vec![0; descriptor.size as usize]);
        Self::created_one(&mut state, ObjectKind::Buffer);
        Ok(id)
    }

    fn write_buffer(&self, id: GpuBufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        let buffer = state.buffers.get_mut(&id).ok_or(ResourceError::InvalidHandle)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.len() {
            return Err(ResourceError::OutOfBounds);
        }
        buffer[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, id: GpuBufferId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        let buffer = Self::remove(&mut state.buffers, &id)?;
        state.allocated_bytes = state.allocated_bytes.saturating_sub(buffer.len() as u64);
        Self::destroyed_one(&mut state, ObjectKind::Buffer, id.0);
        Ok(())
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        for entry in &descriptor.entries {
            let known = match entry {
                BindingResource::Buffer { buffer, .. } => state.buffers.contains_key(buffer),
                BindingResource::Texture(texture) => state.textures.contains_key(texture),
            };
            if !known {
                return Err(ResourceError::InvalidHandle);
            }
        }
        let id = BindGroupId(self.next_raw());
        state.bind_groups.insert(id, descriptor.clone());
        Self::created_one(&mut state, ObjectKind::BindGroup);
        Ok(id)
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        Self::remove(&mut state.bind_groups, &id)?;
        Self::destroyed_one(&mut state, ObjectKind::BindGroup, id.0);
        Ok(())
    }

    fn create_framebuffer(
        &self,
        descriptor: &FramebufferDescriptor,
    ) -> Result<FramebufferId, ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        Self::validate_framebuffer(&state, descriptor)?;
        let id = FramebufferId(self.next_raw());
        state.framebuffers.insert(id, descriptor.clone());
        Self::created_one(&mut state, ObjectKind::Framebuffer);
        Ok(id)
    }

    fn destroy_framebuffer(&self, id: FramebufferId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        Self::remove(&mut state.framebuffers, &id)?;
        Self::destroyed_one(&mut state, ObjectKind::Framebuffer, id.0);
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceId, ResourceError> {
        self.check_alive()?;
        let id = FenceId(self.next_raw());
        let mut state = self.state.lock();
        state.fences.insert(
            id,
            FenceState {
                signaled,
                pending: None,
            },
        );
        Self::created_one(&mut state, ObjectKind::Fence);
        Ok(id)
    }

    fn wait_for_fence(&self, id: FenceId, timeout: Duration) -> Result<FenceWait, ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        let fence = state.fences.get(&id).ok_or(ResourceError::InvalidHandle)?;
        let outcome = match (fence.signaled, fence.pending) {
            (true, _) => FenceWait::Signaled,
            (false, Some(index)) if !state.gpu_stalled => {
                Self::complete_through(&mut state, index);
                FenceWait::Signaled
            }
            // Nothing will ever signal it, or the GPU is stuck.
            _ => FenceWait::TimedOut,
        };
        if outcome == FenceWait::TimedOut {
            log::trace!("Fence {id:?} wait timed out after {timeout:?}");
        }
        state.events.push(DeviceEvent::FenceWaited { fence: id, outcome });
        Ok(outcome)
    }

    fn reset_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        let fence = state.fences.get_mut(&id).ok_or(ResourceError::InvalidHandle)?;
        if fence.pending.is_some() {
            return Err(ResourceError::BackendError(format!(
                "fence {id:?} reset while its work is pending"
            )));
        }
        fence.signaled = false;
        state.events.push(DeviceEvent::FenceReset(id));
        Ok(())
    }

    fn destroy_fence(&self, id: FenceId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        Self::remove(&mut state.fences, &id)?;
        Self::destroyed_one(&mut state, ObjectKind::Fence, id.0);
        Ok(())
    }

    fn create_semaphore(&self) -> Result<SemaphoreId, ResourceError> {
        self.check_alive()?;
        let id = SemaphoreId(self.next_raw());
        let mut state = self.state.lock();
        state.semaphores.insert(id);
        Self::created_one(&mut state, ObjectKind::Semaphore);
        Ok(id)
    }

    fn destroy_semaphore(&self, id: SemaphoreId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        if !state.semaphores.remove(&id) {
            return Err(ResourceError::InvalidHandle);
        }
        Self::destroyed_one(&mut state, ObjectKind::Semaphore, id.0);
        Ok(())
    }

    fn submit(&self, commands: &CommandList, info: SubmitInfo) -> Result<(), ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();

        let mut references = HashSet::new();
        for command in commands.commands() {
            command_references(command, &mut references);
        }
        let live = |raw: &u64| {
            state.framebuffers.contains_key(&FramebufferId(*raw))
                || state.render_pipelines.contains_key(&RenderPipelineId(*raw))
                || state.compute_pipelines.contains(&ComputePipelineId(*raw))
                || state.bind_groups.contains_key(&BindGroupId(*raw))
                || state.buffers.contains_key(&GpuBufferId(*raw))
        };
        if let Some(dead) = references.iter().find(|raw| !live(raw)) {
            return Err(ResourceError::BackendError(format!(
                "submitted list references destroyed object #{dead}"
            )));
        }

        if let Some(fence) = info.fence {
            let fence = state.fences.get_mut(&fence).ok_or(ResourceError::InvalidHandle)?;
            if fence.signaled || fence.pending.is_some() {
                return Err(ResourceError::BackendError(
                    "submitted with a fence that was not reset".to_owned(),
                ));
            }
        }

        for command in commands.commands() {
            if let DeviceCommand::UpdateBuffer {
                buffer,
                offset,
                data,
            } = command
            {
                if let Some(contents) = state.buffers.get_mut(buffer) {
                    let start = *offset as usize;
                    let end = (start + data.len()).min(contents.len());
                    contents[start..end].copy_from_slice(&data[..end - start]);
                }
            }
        }

        state.submissions += 1;
        let index = state.submissions;
        if let Some(fence) = info.fence.and_then(|f| state.fences.get_mut(&f)) {
            fence.pending = Some(index);
        }
        state.pending.push(PendingSubmission { index, references });
        state.submitted.push(commands.clone());
        state.events.push(DeviceEvent::Submitted {
            index,
            fence: info.fence,
            commands: commands.len(),
        });
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        let last = state.submissions;
        Self::complete_through(&mut state, last);
        state.events.push(DeviceEvent::WaitIdle);
        Ok(())
    }

    fn surface_capabilities(&self) -> SurfaceCapabilities {
        self.state.lock().surface
    }

    fn create_swapchain(
        &self,
        descriptor: &SwapchainDescriptor,
    ) -> Result<SwapchainId, ResourceError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        let caps = state.surface;
        if descriptor.image_count < caps.min_images || descriptor.image_count > caps.max_images {
            return Err(ResourceError::InvalidDescription(format!(
                "{} swapchain images requested, platform allows {}..={}",
                descriptor.image_count, caps.min_images, caps.max_images
            )));
        }
        let image_descriptor = TextureDescriptor {
            label: "swapchain image".to_owned(),
            width: descriptor.width,
            height: descriptor.height,
            layers: 1,
            mip_levels: 1,
            format: descriptor.format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::PRESENT,
        };
        let mut images = Vec::with_capacity(descriptor.image_count as usize);
        for _ in 0..descriptor.image_count {
            images.push(self.create_texture_locked(&mut state, &image_descriptor)?);
        }
        let id = SwapchainId(self.next_raw());
        state.swapchains.insert(
            id,
            SwapchainEntry {
                images,
                next_image: 0,
            },
        );
        state.surface_out_of_date = false;
        Self::created_one(&mut state, ObjectKind::Swapchain);
        state.events.push(DeviceEvent::SwapchainCreated {
            id,
            images: descriptor.image_count,
            width: descriptor.width,
            height: descriptor.height,
        });
        Ok(id)
    }

    fn swapchain_images(&self, id: SwapchainId) -> Result<Vec<GpuTextureId>, ResourceError> {
        let state = self.state.lock();
        state
            .swapchains
            .get(&id)
            .map(|s| s.images.clone())
            .ok_or(ResourceError::InvalidHandle)
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainId,
        _signal: Option<SemaphoreId>,
    ) -> Result<u32, SurfaceError> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(SurfaceError::Lost);
        }
        let mut state = self.state.lock();
        if state.surface_out_of_date {
            return Err(SurfaceError::OutOfDate);
        }
        let entry = state.swapchains.get_mut(&swapchain).ok_or(SurfaceError::Lost)?;
        let image = entry.next_image;
        entry.next_image = (entry.next_image + 1) % entry.images.len().max(1) as u32;
        state.events.push(DeviceEvent::Acquired { image });
        Ok(image)
    }

    fn present(
        &self,
        swapchain: SwapchainId,
        image_index: u32,
        _wait: Option<SemaphoreId>,
    ) -> Result<(), SurfaceError> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(SurfaceError::Lost);
        }
        let mut state = self.state.lock();
        if !state.swapchains.contains_key(&swapchain) {
            return Err(SurfaceError::Lost);
        }
        if state.surface_out_of_date {
            return Err(SurfaceError::OutOfDate);
        }
        state.events.push(DeviceEvent::Presented { image: image_index });
        Ok(())
    }

    fn destroy_swapchain(&self, id: SwapchainId) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        let entry = Self::remove(&mut state.swapchains, &id)?;
        for image in entry.images {
            Self::destroy_texture_locked(&mut state, image)?;
        }
        Self::destroyed_one(&mut state, ObjectKind::Swapchain, id.0);
        Ok(())
    }

    fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::{ShaderSource, ShaderStage};

    fn compile(device: &HeadlessDevice, text: &str) -> Result<ShaderModuleId, ResourceError> {
        let source = ShaderSource::text(text, "main");
        device.create_shader_module(&ShaderModuleDescriptor {
            label: "test",
            stage: ShaderStage::Vertex,
            source: &source,
        })
    }

    fn buffer(device: &HeadlessDevice, size: u64) -> Result<GpuBufferId, ResourceError> {
        device.create_buffer(&BufferDescriptor {
            label: "b".into(),
            size,
            usage: prism_core::renderer::BufferUsage::UNIFORM,
        })
    }

    #[test]
    fn error_directive_fails_compilation() {
        let device = HeadlessDevice::default();
        assert!(compile(&device, "void main() {}").is_ok());
        assert!(matches!(
            compile(&device, "#error broken"),
            Err(ResourceError::Shader(ShaderError::CompilationError { .. }))
        ));
        assert!(compile(&device, "   ").is_err());
    }

    #[test]
    fn memory_budget_is_enforced_and_released() {
        let device = HeadlessDevice::default();
        device.set_memory_budget(Some(1024));
        let a = buffer(&device, 1000).unwrap();
        assert!(matches!(
            buffer(&device, 100),
            Err(ResourceError::OutOfMemory { requested: 100 })
        ));
        device.destroy_buffer(a).unwrap();
        assert!(buffer(&device, 100).is_ok());
    }

    #[test]
    fn fences_signal_lazily_and_in_order() {
        let device = HeadlessDevice::default();
        let first = device.create_fence(false).unwrap();
        let second = device.create_fence(false).unwrap();
        let list = CommandList::new();
        for fence in [first, second] {
            device
                .submit(
                    &list,
                    SubmitInfo {
                        fence: Some(fence),
                        ..SubmitInfo::default()
                    },
                )
                .unwrap();
        }
        let wait = Duration::from_millis(1);
        assert_eq!(device.wait_for_fence(second, wait).unwrap(), FenceWait::Signaled);
        // Completing the second submission completed the first.
        device.stall_gpu(true);
        assert_eq!(device.wait_for_fence(first, wait).unwrap(), FenceWait::Signaled);
    }

    #[test]
    fn stalled_gpu_times_out_and_unsubmitted_fences_never_signal() {
        let device = HeadlessDevice::default();
        let fence = device.create_fence(false).unwrap();
        let wait = Duration::from_millis(1);
        assert_eq!(device.wait_for_fence(fence, wait).unwrap(), FenceWait::TimedOut);

        device.stall_gpu(true);
        device
            .submit(
                &CommandList::new(),
                SubmitInfo {
                    fence: Some(fence),
                    ..SubmitInfo::default()
                },
            )
            .unwrap();
        assert_eq!(device.wait_for_fence(fence, wait).unwrap(), FenceWait::TimedOut);
        device.stall_gpu(false);
        assert_eq!(device.wait_for_fence(fence, wait).unwrap(), FenceWait::Signaled);
    }

    #[test]
    fn destroying_referenced_objects_is_detected() {
        let device = HeadlessDevice::default();
        let uniforms = buffer(&device, 16).unwrap();
        let mut list = CommandList::new();
        list.push(DeviceCommand::UpdateBuffer {
            buffer: uniforms,
            offset: 0,
            data: vec![1; 16],
        });
        device.submit(&list, SubmitInfo::default()).unwrap();
        assert_eq!(device.buffer_contents(uniforms).unwrap(), vec![1; 16]);

        device.destroy_buffer(uniforms).unwrap();
        assert_eq!(device.use_after_free_count(), 1);
        assert!(device.submit(&list, SubmitInfo::default()).is_err());
    }

    #[test]
    fn stale_surface_is_cleared_by_a_new_swapchain() {
        let device = HeadlessDevice::new(64, 64);
        let descriptor = SwapchainDescriptor {
            width: 64,
            height: 64,
            image_count: 2,
            format: TextureFormat::Bgra8UnormSrgb,
            vsync: true,
        };
        let swapchain = device.create_swapchain(&descriptor).unwrap();
        assert_eq!(device.acquire_next_image(swapchain, None), Ok(0));
        assert_eq!(device.acquire_next_image(swapchain, None), Ok(1));

        device.invalidate_surface();
        assert_eq!(
            device.acquire_next_image(swapchain, None),
            Err(SurfaceError::OutOfDate)
        );
        device.destroy_swapchain(swapchain).unwrap();
        let swapchain = device.create_swapchain(&descriptor).unwrap();
        assert_eq!(device.acquire_next_image(swapchain, None), Ok(0));
        assert_eq!(device.live(ObjectKind::Texture), 2);
    }

    #[test]
    fn lost_device_refuses_work() {
        let device = HeadlessDevice::default();
        device.lose_device();
        assert!(device.is_lost());
        assert_eq!(compile(&device, "ok").unwrap_err(), ResourceError::DeviceLost);
        assert_eq!(device.wait_idle(), Err(ResourceError::DeviceLost));
    }
}
