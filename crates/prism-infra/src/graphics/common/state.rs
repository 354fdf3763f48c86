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

//! The backend-neutral half of every backend.
//!
//! [`BackendState`] owns the caches, the recorder and the command list and
//! implements every [`CommandBuffer`] operation. Backends wrap it, add
//! their own frame lifecycle, and plug their binding strategy in through
//! the `B: DrawBinder` parameter.

use super::binding::{BindContext, DrawBinder, DrawBindings};
use super::deletion::{DeletionQueue, GpuObject};
use super::pipeline_cache::PipelineCache;
use super::recorder::RecorderState;
use super::resources::{Realizer, ResourceCache, TargetBinding, TargetFailure};
use crate::graphics::context::BackendContext;
use prism_core::math::{Mat4, Rect, Vec4};
use prism_core::renderer::{
    pack_std140, BackendStats, BindingResource, CommandBuffer, CommandList, ComputeInstanceId,
    ComputePipelineId,
    DeviceCommand, DrawOutcome, GraphicsDevice, LayerMask, LayerRule, MaterialInstanceId,
    MeshId, NativeHandle, RenderError, RenderTarget, RenderTargetId, ResourceId, ResourceState,
    SharedRegistry, SkipReason, TextureId, UniformValue,
};
use prism_core::RendererConfig;
use std::sync::Arc;

macro_rules! realizer {
    ($state:ident) => {
        Realizer {
            device: &*$state.device,
            registry: &$state.registry,
            retired: &mut $state.retired,
            stats: &mut $state.stats,
        }
    };
}

#[derive(Debug)]
pub(crate) struct BackendState<B: DrawBinder> {
    pub device: Arc<dyn GraphicsDevice>,
    pub registry: SharedRegistry,
    pub config: RendererConfig,
    pub resources: ResourceCache,
    pub pipelines: PipelineCache,
    pub binder: B,
    pub recorder: RecorderState,
    pub list: CommandList,
    pub stats: BackendStats,
    /// Objects replaced or released since the last frame was submitted.
    pub retired: Vec<GpuObject>,
    /// An error to report from the next `end_frame`.
    pub pending_error: Option<RenderError>,
    pub lost: bool,
    pub frame_open: bool,
    pub native_target: RenderTargetId,
    /// The framebuffer of the presentation image acquired this frame.
    pub native_binding: Option<TargetBinding>,
}

impl<B: DrawBinder> BackendState<B> {
    /// Declares the native target and wraps the context.
    pub fn new(context: BackendContext, binder: B, native_handle: NativeHandle) -> Self {
        let BackendContext {
            device,
            registry,
            config,
        } = context;
        let native_target = {
            let mut registry = registry.write();
            let id = registry.add_render_target(RenderTarget::native("surface"));
            let generation = registry.lifecycle(id).map_or(0, |l| l.generation());
            if let Err(e) = registry.mark_realized(id, generation, native_handle) {
                log::warn!("Could not mark the native target ready: {e}");
            }
            id
        };
        Self {
            device,
            registry,
            config,
            resources: ResourceCache::default(),
            pipelines: PipelineCache::default(),
            binder,
            recorder: RecorderState::default(),
            list: CommandList::new(),
            stats: BackendStats::default(),
            retired: Vec::new(),
            pending_error: None,
            lost: false,
            frame_open: false,
            native_target,
            native_binding: None,
        }
    }

    /// Returns `true` once the device is lost, noticing it the first time.
    pub fn check_lost(&mut self) -> bool {
        if !self.lost && self.device.is_lost() {
            log::error!("Graphics device lost; the backend is now disabled");
            self.lost = true;
            self.frame_open = false;
        }
        self.lost
    }

    /// Passes an error through, disabling the backend if it reports loss.
    pub fn note_error(&mut self, error: impl Into<RenderError>) -> RenderError {
        let error = error.into();
        if error == RenderError::DeviceLost && !self.lost {
            log::error!("Graphics device lost; the backend is now disabled");
            self.lost = true;
            self.frame_open = false;
        }
        error
    }

    /// Starts recording a frame presented through `native`.
    pub fn start_frame(&mut self, native: Option<TargetBinding>) {
        self.list.reset();
        self.recorder.reset_frame();
        self.native_binding = native;
        self.frame_open = true;
    }

    /// Closes the frame's recording.
    pub fn finish_frame(&mut self) {
        self.recorder.finish(&mut self.list);
        self.native_binding = None;
        self.frame_open = false;
    }

    /// Releases the native objects of resources whose destruction was
    /// requested. The objects are retired, not destroyed: the caller decides
    /// when the GPU is done with them.
    pub fn collect_garbage(&mut self) {
        let pending = self.registry.write().take_pending_destruction();
        for id in &pending {
            self.resources.evict(*id, &mut self.retired);
            self.pipelines.evict(*id, &mut self.retired);
            self.binder.evict(*id, &mut self.retired);
            if let Err(e) = self.registry.write().mark_destroyed(*id) {
                log::warn!("Could not record destruction of {id}: {e}");
            }
        }
        let purged = self.registry.write().purge_deleted();
        if !pending.is_empty() || purged > 0 {
            log::debug!(
                "Released {} resource(s), purged {purged} description(s)",
                pending.len()
            );
        }
    }

    /// Waits for the device and destroys everything this state owns.
    pub fn teardown(&mut self) {
        if !self.lost {
            if let Err(e) = self.device.wait_idle() {
                log::warn!("wait_idle failed during teardown: {e}");
            }
        }
        let mut queue = DeletionQueue::default();
        queue.extend(self.retired.drain(..));
        queue.extend(self.resources.drain());
        queue.extend(self.pipelines.drain());
        queue.extend(self.binder.drain());
        let destroyed = queue.flush(&*self.device);
        log::debug!("Destroyed {destroyed} native object(s) at teardown");
    }

    /// Realizes `id` if needed and returns its handle while it is `Ready`.
    pub fn native_handle(&mut self, id: ResourceId) -> Option<NativeHandle> {
        if self.check_lost() {
            return None;
        }
        let outcome = match id {
            ResourceId::Texture(t) => self.resources.texture(&mut realizer!(self), t).map(drop),
            ResourceId::Mesh(m) => self.resources.realize_mesh(&mut realizer!(self), m),
            ResourceId::Material(m) => {
                let material = self.registry.read().material(m).cloned();
                match material {
                    Some(material) => {
                        self.pipelines
                            .ensure_material(&mut realizer!(self), m, &material)
                    }
                    None => Err(SkipReason::ResourceUnavailable(id)),
                }
            }
            ResourceId::MaterialInstance(i) => self.realize_instance(i).map(drop),
            ResourceId::RenderTarget(t) if t == self.native_target => Ok(()),
            ResourceId::RenderTarget(t) => self
                .resources
                .target(&mut realizer!(self), t, 0)
                .map(drop)
                .map_err(|failure| match failure {
                    TargetFailure::Unavailable(reason) => reason,
                    TargetFailure::Mismatch(e) => {
                        log::warn!("{e}");
                        SkipReason::TargetInvalid
                    }
                }),
            ResourceId::ComputeBuffer(b) => self
                .resources
                .compute_buffer(&mut realizer!(self), b)
                .map(drop),
            ResourceId::ComputeShader(s) => self
                .pipelines
                .compute_pipeline(&mut realizer!(self), s)
                .map(drop),
            ResourceId::ComputeInstance(c) => self.realize_compute(c).map(drop),
        };
        if let Err(reason) = outcome {
            log::warn!("No native handle for {id}: {reason}");
            return None;
        }
        self.registry
            .read()
            .lifecycle(id)
            .and_then(|lifecycle| lifecycle.native_handle())
    }

    /// Makes an instance's material and textures ready.
    fn realize_instance(
        &mut self,
        id: MaterialInstanceId,
    ) -> Result<Vec<BindingResource>, SkipReason> {
        let rid = ResourceId::from(id);
        let (instance, material, state, generation) = {
            let registry = self.registry.read();
            let instance = registry
                .instance(id)
                .cloned()
                .ok_or(SkipReason::ResourceUnavailable(rid))?;
            let material = registry
                .material(instance.material)
                .cloned()
                .ok_or(SkipReason::ResourceUnavailable(instance.material.into()))?;
            let lifecycle = registry
                .lifecycle(rid)
                .ok_or(SkipReason::ResourceUnavailable(rid))?;
            (instance, material, lifecycle.state(), lifecycle.generation())
        };
        if state.is_dying() {
            return Err(SkipReason::ResourceUnavailable(rid));
        }
        self.pipelines
            .ensure_material(&mut realizer!(self), instance.material, &material)?;

        let mut resources = Vec::with_capacity(material.textures.len());
        for slot in &material.textures {
            let texture = instance
                .textures
                .get(&slot.name)
                .copied()
                .or_else(|| self.recorder.global_texture(&slot.name))
                .or(slot.default);
            let texture = match texture {
                Some(texture) => self.resources.texture(&mut realizer!(self), texture)?.texture,
                None => self.resources.white(&*self.device)?,
            };
            resources.push(BindingResource::Texture(texture));
        }

        if state != ResourceState::Ready {
            let handle = self
                .registry
                .read()
                .lifecycle(instance.material)
                .and_then(|l| l.native_handle());
            if let Some(handle) = handle {
                realizer!(self).realized(rid, generation, handle);
            }
        }
        Ok(resources)
    }

    /// Makes a compute instance's program and bindings ready.
    fn realize_compute(
        &mut self,
        id: ComputeInstanceId,
    ) -> Result<ComputeDispatch, SkipReason> {
        let rid = ResourceId::from(id);
        let unavailable = SkipReason::ResourceUnavailable(rid);
        let (instance, state, generation) = {
            let registry = self.registry.read();
            let lifecycle = registry.lifecycle(rid).ok_or(unavailable)?;
            (
                registry.compute_instance(id).cloned().ok_or(unavailable)?,
                lifecycle.state(),
                lifecycle.generation(),
            )
        };
        if state.is_dying() {
            return Err(unavailable);
        }
        let pipeline = self
            .pipelines
            .compute_pipeline(&mut realizer!(self), instance.shader)?;
        let mut resources = Vec::new();
        for buffer in instance.buffers.values() {
            let (buffer, size) = self
                .resources
                .compute_buffer(&mut realizer!(self), *buffer)?;
            resources.push(BindingResource::Buffer {
                buffer,
                offset: 0,
                size,
                dynamic: false,
            });
        }
        for texture in instance.textures.values() {
            let info = self.resources.texture(&mut realizer!(self), *texture)?;
            resources.push(BindingResource::Texture(info.texture));
        }
        if state != ResourceState::Ready {
            realizer!(self).realized(rid, generation, NativeHandle::new(pipeline.0));
        }
        Ok(ComputeDispatch {
            pipeline,
            generation,
            resources,
            block: pack_std140(instance.params.iter().map(|(_, value)| value)),
        })
    }

    fn record_draw(
        &mut self,
        models: &[Mat4],
        mesh: MeshId,
        submesh: usize,
        layer: LayerMask,
        instance: MaterialInstanceId,
    ) -> Result<DrawOutcome, SkipReason> {
        if self.check_lost() {
            return Err(SkipReason::DeviceLost);
        }
        if !self.frame_open || self.recorder.target.is_none() {
            return Err(SkipReason::NoRenderTarget);
        }
        let target = self.recorder.bound.clone().ok_or(SkipReason::TargetInvalid)?;

        let rid = ResourceId::from(instance);
        let (material_id, material, description, generation) = {
            let registry = self.registry.read();
            let description = registry
                .instance(instance)
                .cloned()
                .ok_or(SkipReason::ResourceUnavailable(rid))?;
            let material = registry
                .material(description.material)
                .cloned()
                .ok_or(SkipReason::ResourceUnavailable(description.material.into()))?;
            let generation = registry.lifecycle(rid).map_or(0, |l| l.generation());
            (description.material, material, description, generation)
        };

        // The rule table runs before anything is realized.
        let fragment = match LayerRule::resolve(material.blend, layer) {
            Ok(fragment) => fragment,
            Err(rejection) => return Ok(DrawOutcome::Rejected(rejection)),
        };

        let geometry = self.resources.mesh(&mut realizer!(self), mesh, submesh)?;
        let pipeline = self.pipelines.pipeline(
            &mut realizer!(self),
            material_id,
            &material,
            description.vertex,
            fragment,
            &target.signature,
            geometry.topology,
        )?;
        let resources = self.realize_instance(instance)?;
        let handle = NativeHandle::new(pipeline.0);
        if models.is_empty() {
            return Ok(DrawOutcome::Drawn { pipeline: handle });
        }

        let mut values = vec![
            UniformValue::Mat4(self.recorder.view),
            UniformValue::Mat4(self.recorder.projection),
        ];
        values.extend(models.iter().copied().map(UniformValue::Mat4));
        let mut block = pack_std140(&values);
        block.extend_from_slice(&description.param_block(&material));

        self.recorder.ensure_pass(&mut self.list);
        self.list.push(DeviceCommand::BindPipeline(pipeline));
        self.bind(rid, generation, &block, &resources)?;
        self.list.push(DeviceCommand::SetVertexBuffer {
            slot: 0,
            buffer: geometry.vertex,
        });
        if let Some(skin) = geometry.skin {
            self.list
                .push(DeviceCommand::SetVertexBuffer { slot: 1, buffer: skin });
        }
        self.list.push(DeviceCommand::SetIndexBuffer(geometry.index));
        self.list.push(DeviceCommand::DrawIndexed {
            indices: geometry.indices,
            instances: 0..models.len() as u32,
        });
        Ok(DrawOutcome::Drawn { pipeline: handle })
    }

    fn record_dispatch(
        &mut self,
        instance: ComputeInstanceId,
        [x, y, z]: [u32; 3],
    ) -> Result<DrawOutcome, SkipReason> {
        if self.check_lost() {
            return Err(SkipReason::DeviceLost);
        }
        if !self.frame_open {
            return Err(SkipReason::NoRenderTarget);
        }
        let dispatch = self.realize_compute(instance)?;
        self.recorder.end_pass(&mut self.list);
        self.list
            .push(DeviceCommand::BindComputePipeline(dispatch.pipeline));
        self.bind(
            instance.into(),
            dispatch.generation,
            &dispatch.block,
            &dispatch.resources,
        )?;
        self.list.push(DeviceCommand::Dispatch { x, y, z });
        Ok(DrawOutcome::Drawn {
            pipeline: NativeHandle::new(dispatch.pipeline.0),
        })
    }

    fn bind(
        &mut self,
        owner: ResourceId,
        generation: u64,
        block: &[u8],
        resources: &[BindingResource],
    ) -> Result<(), SkipReason> {
        let globals_version = self.recorder.globals_version();
        let globals = self.recorder.packed_globals().to_vec();
        let bindings = DrawBindings {
            owner,
            generation,
            globals: &globals,
            globals_version,
            block,
            resources,
        };
        let ctx = BindContext {
            device: &*self.device,
            list: &mut self.list,
            retired: &mut self.retired,
            stats: &mut self.stats,
        };
        self.binder.bind(ctx, &bindings)
    }

    fn count(&mut self, outcome: DrawOutcome, what: &str) -> DrawOutcome {
        match outcome {
            DrawOutcome::Drawn { .. } => {}
            DrawOutcome::Rejected(rejection) => {
                self.stats.rejected_draws += 1;
                log::debug!("{what} rejected: {rejection}");
            }
            DrawOutcome::Skipped(reason) => {
                self.stats.skipped_draws += 1;
                log::warn!("{what} skipped: {reason}");
            }
        }
        outcome
    }
}

/// A compute instance ready to dispatch.
#[derive(Debug)]
struct ComputeDispatch {
    pipeline: ComputePipelineId,
    generation: u64,
    resources: Vec<BindingResource>,
    block: Vec<u8>,
}

impl<B: DrawBinder> CommandBuffer for BackendState<B> {
    fn set_render_target(
        &mut self,
        target: RenderTargetId,
        mip_level: u32,
    ) -> Result<(), RenderError> {
        if self.check_lost() {
            return Err(RenderError::DeviceLost);
        }
        self.recorder.end_pass(&mut self.list);

        let binding = if target == self.native_target {
            if self.native_binding.is_none() {
                log::warn!("The surface target was bound outside of a frame");
            }
            self.native_binding.clone()
        } else {
            match self
                .resources
                .target(&mut realizer!(self), target, mip_level)
            {
                Ok(binding) => Some(binding),
                Err(TargetFailure::Unavailable(reason)) => {
                    log::warn!("target#{} cannot be bound: {reason}", target.0);
                    None
                }
                Err(TargetFailure::Mismatch(error)) => {
                    self.recorder.bind_target(target, mip_level, None);
                    if self.config.strict_validation {
                        log::error!("{error}");
                        let error = RenderError::AttachmentMismatch(error);
                        self.pending_error.get_or_insert_with(|| error.clone());
                        return Err(error);
                    }
                    log::warn!("{error}; its passes are skipped");
                    None
                }
            }
        };
        self.recorder.bind_target(target, mip_level, binding);
        Ok(())
    }

    fn render_target(&self) -> Option<RenderTargetId> {
        self.recorder.target
    }

    fn clear_render_target(&mut self, clear_color: bool, color: Vec4, clear_depth: bool, depth: f32) {
        if self.check_lost() || !self.recorder.ensure_pass(&mut self.list) {
            log::debug!("Clear ignored: no valid render target");
            return;
        }
        let has_depth = self
            .recorder
            .bound
            .as_ref()
            .is_some_and(|b| b.signature.depth.is_some());
        let rect = self.recorder.viewport.intersect(&self.recorder.target_rect());
        self.list.push(DeviceCommand::Clear {
            color: clear_color.then(|| color.to_array()),
            depth: (clear_depth && has_depth).then_some(depth),
            rect,
        });
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.recorder
            .set_viewport(Rect::new(x, y, width, height), &mut self.list);
    }

    fn viewport(&self) -> Rect {
        self.recorder.viewport
    }

    fn enable_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.recorder
            .set_scissor(Rect::new(x, y, width, height), &mut self.list);
    }

    fn disable_scissor(&mut self) {
        let viewport = self.recorder.viewport;
        self.recorder.set_scissor(viewport, &mut self.list);
    }

    fn set_view_projection(&mut self, view: Mat4, projection: Mat4) {
        self.recorder.view = view;
        self.recorder.projection = projection;
    }

    fn set_global_value(&mut self, name: &str, value: UniformValue) {
        self.recorder.set_global(name, value);
    }

    fn global_value(&self, name: &str) -> Option<UniformValue> {
        self.recorder.global(name)
    }

    fn set_global_texture(&mut self, name: &str, texture: TextureId) {
        self.recorder.set_global_texture(name, texture);
    }

    fn global_texture(&self, name: &str) -> Option<TextureId> {
        self.recorder.global_texture(name)
    }

    fn draw_mesh(
        &mut self,
        model: Mat4,
        mesh: MeshId,
        submesh: usize,
        layer: LayerMask,
        instance: MaterialInstanceId,
    ) -> DrawOutcome {
        self.draw_mesh_instanced(&[model], mesh, submesh, layer, instance)
    }

    fn draw_mesh_instanced(
        &mut self,
        models: &[Mat4],
        mesh: MeshId,
        submesh: usize,
        layer: LayerMask,
        instance: MaterialInstanceId,
    ) -> DrawOutcome {
        let outcome = self
            .record_draw(models, mesh, submesh, layer, instance)
            .unwrap_or_else(DrawOutcome::Skipped);
        if outcome.is_drawn() {
            self.stats.draws += 1;
        }
        self.count(outcome, "Draw")
    }

    fn dispatch_compute(&mut self, instance: ComputeInstanceId, x: u32, y: u32, z: u32) -> DrawOutcome {
        let outcome = self
            .record_dispatch(instance, [x, y, z])
            .unwrap_or_else(DrawOutcome::Skipped);
        if outcome.is_drawn() {
            self.stats.dispatches += 1;
        }
        self.count(outcome, "Dispatch")
    }

    fn begin_debug_marker(&mut self, name: &str) {
        self.recorder.push_marker(name, &mut self.list);
    }

    fn end_debug_marker(&mut self) {
        self.recorder.pop_marker(&mut self.list);
    }
}
