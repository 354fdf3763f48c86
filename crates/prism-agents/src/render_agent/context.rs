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

//! The pipeline context: runs the lanes of one view.

use crate::render_agent::deferred_tasks;
use prism_core::config::ShadowConfig;
use prism_core::math::{Mat4, Vec4};
use prism_core::renderer::{
    CommandBuffer, LayerMask, Material, MaterialId, MaterialInstanceId, Mesh, MeshId,
    RenderBackend, RenderError, RenderTarget, RenderTargetId, ResourceError, ResourceId,
    ShaderLibrary, SharedRegistry, Texture, TextureFormat, TextureId, UniformValue,
};
use prism_core::scene::{Camera, PostProcessSettings, SceneView};
use prism_lanes::render_lane::shaders::{self, INPUT_SAMPLER};
use prism_lanes::render_lane::{slots, ExtractLane, RenderWorld, ShadowAtlas};
use prism_lanes::{PipelineTask, TaskFrame};
use std::collections::HashMap;
use std::fmt;

/// Owns the lanes of one view and runs them every frame.
///
/// The context keeps a name to texture map of everything the lanes
/// published during the current frame. Before a lane runs, each of its input
/// slots is looked up in that map by name; after it runs, its outputs are
/// written back. The last `sceneColor` (or the debug texture, when one is
/// selected) is drawn into the default target.
///
/// Only device loss escapes [`PipelineContext::draw`]. Any other lane
/// failure is logged and the lane passes its input through.
pub struct PipelineContext {
    registry: SharedRegistry,
    tasks: Vec<Box<dyn PipelineTask>>,
    buffers: HashMap<String, TextureId>,
    extract: ExtractLane,
    atlas: ShadowAtlas,
    quad: MeshId,
    cube: MeshId,
    final_color: TextureId,
    final_target: RenderTargetId,
    external_target: Option<RenderTargetId>,
    composite_material: Option<(MaterialId, MaterialInstanceId)>,
    debug_texture: Option<String>,
    settings: PostProcessSettings,
    size: (u32, u32),
}

impl PipelineContext {
    /// An empty context rendering a `width` x `height` view.
    pub fn new(
        registry: &SharedRegistry,
        library: &dyn ShaderLibrary,
        shadow: &ShadowConfig,
        width: u32,
        height: u32,
    ) -> Self {
        let size = (width.max(1), height.max(1));
        let (quad, cube, final_color, final_target, composite) = {
            let mut reg = registry.write();
            let quad = reg.add_mesh(Mesh::fullscreen_quad());
            let cube = reg.add_mesh(Mesh::unit_cube());
            let final_color = reg.add_texture(Texture::render(
                "finalColor",
                size.0,
                size.1,
                TextureFormat::Rgba8Unorm,
            ));
            let final_target =
                reg.add_render_target(RenderTarget::new("defaultTarget").with_color(0, final_color));
            let composite = match library.sources(shaders::BLIT) {
                Some(sources) => {
                    let material = reg.add_material(
                        Material::screen("composite", sources).with_texture(INPUT_SAMPLER, None),
                    );
                    match reg.instantiate(material) {
                        Ok(instance) => Some((material, instance)),
                        Err(err) => {
                            log::error!("Could not instantiate the composite material: {err}");
                            None
                        }
                    }
                }
                None => {
                    log::warn!("Shader program '{}' is missing, nothing will be composited", shaders::BLIT);
                    None
                }
            };
            (quad, cube, final_color, final_target, composite)
        };

        Self {
            registry: registry.clone(),
            tasks: Vec::new(),
            buffers: HashMap::new(),
            extract: ExtractLane::new(),
            atlas: ShadowAtlas::new(shadow.clone()),
            quad,
            cube,
            final_color,
            final_target,
            external_target: None,
            composite_material: composite,
            debug_texture: None,
            settings: PostProcessSettings::default(),
            size,
        }
    }

    /// A context running the deferred preset.
    pub fn deferred(
        registry: &SharedRegistry,
        library: &dyn ShaderLibrary,
        shadow: &ShadowConfig,
        width: u32,
        height: u32,
    ) -> Self {
        let mut context = Self::new(registry, library, shadow, width, height);
        for task in deferred_tasks(registry, library, shadow) {
            context.insert_task(task, None);
        }
        context
    }

    /// Registers a lane before the lane named `before`, or at the end.
    ///
    /// The lane is resized to the current view right away.
    pub fn insert_task(&mut self, mut task: Box<dyn PipelineTask>, before: Option<&str>) {
        if let Err(err) = task.resize(self.size.0, self.size.1) {
            log::error!("Resizing task '{}': {err}", task.name());
        }
        let index = match before {
            Some(name) => self.position(name).unwrap_or_else(|| {
                log::warn!("No task named '{name}', appending '{}'", task.name());
                self.tasks.len()
            }),
            None => self.tasks.len(),
        };
        log::debug!("Task '{}' registered at position {index}", task.name());
        self.tasks.insert(index, task);
    }

    /// Unregisters and returns the lane named `name`.
    pub fn remove_task(&mut self, name: &str) -> Option<Box<dyn PipelineTask>> {
        let index = self.position(name)?;
        Some(self.tasks.remove(index))
    }

    /// The lane named `name`.
    pub fn task(&self, name: &str) -> Option<&dyn PipelineTask> {
        self.tasks.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Mutable access to the lane named `name`, e.g. to switch it off.
    pub fn task_mut(&mut self, name: &str) -> Option<&mut Box<dyn PipelineTask>> {
        self.tasks.iter_mut().find(|t| t.name() == name)
    }

    /// Lane names in execution order.
    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.name() == name)
    }

    /// A texture published under `name` during the last frame.
    pub fn texture(&self, name: &str) -> Option<TextureId> {
        self.buffers.get(name).copied()
    }

    /// Composites the texture published as `name` instead of `sceneColor`.
    /// `None` restores the normal output.
    pub fn set_debug_texture(&mut self, name: Option<&str>) {
        self.debug_texture = name.map(str::to_owned);
    }

    /// Composites into `target` instead of the context's own colour
    /// texture, typically the backend's native target.
    pub fn set_default_target(&mut self, target: Option<RenderTargetId>) {
        self.external_target = target;
    }

    /// The target the final image is composited into.
    pub fn default_target(&self) -> RenderTargetId {
        self.external_target.unwrap_or(self.final_target)
    }

    /// The shadow atlas shared by the lanes.
    pub fn atlas(&self) -> &ShadowAtlas {
        &self.atlas
    }

    /// Settings mixed from the post-process volumes on the last frame.
    pub fn settings(&self) -> &PostProcessSettings {
        &self.settings
    }

    /// The current view size.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Resizes the view and every lane.
    pub fn resize(&mut self, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        if size == self.size {
            return;
        }
        log::debug!("Pipeline resized to {}x{}", size.0, size.1);
        self.size = size;
        if let Err(err) = self
            .registry
            .write()
            .resize_texture(self.final_color, size.0, size.1)
        {
            log::error!("Resizing the final colour texture: {err}");
        }
        for task in &mut self.tasks {
            if let Err(err) = task.resize(size.0, size.1) {
                log::error!("Resizing task '{}': {err}", task.name());
            }
        }
    }

    /// Renders one frame of `scene` seen from `camera`.
    ///
    /// Call between the backend's `begin_frame` and `end_frame`.
    ///
    /// ## Errors
    /// * `RenderError::DeviceLost` - The device is gone. Nothing was
    ///   recorded.
    pub fn draw(
        &mut self,
        scene: &dyn SceneView,
        camera: &Camera,
        backend: &mut dyn RenderBackend,
    ) -> Result<(), RenderError> {
        if backend.is_device_lost() {
            return Err(RenderError::DeviceLost);
        }

        let world = {
            let registry = self.registry.read();
            self.extract.extract(scene, camera, &registry, self.size)
        };
        self.settings = world.settings;
        for task in &mut self.tasks {
            task.apply_settings(&world.settings);
        }
        self.buffers.clear();

        let buffer = backend.command_buffer();
        self.set_globals(buffer, &world);
        {
            let mut frame = TaskFrame {
                buffer: &mut *buffer,
                world: &world,
                atlas: &mut self.atlas,
                quad: self.quad,
                cube: self.cube,
            };
            for task in self.tasks.iter_mut().filter(|t| t.is_enabled()) {
                run_task(task.as_mut(), &mut frame, &mut self.buffers)?;
            }
        }
        self.composite(buffer, &world.camera)
    }

    fn set_globals(&self, buffer: &mut dyn CommandBuffer, world: &RenderWorld<'_>) {
        let camera = &world.camera;
        let (width, height) = (self.size.0 as f32, self.size.1 as f32);
        let view_projection = camera.view_projection();
        let direction = (camera.target - camera.position).normalize_or_zero();
        let page = self.atlas.size() as f32;

        let globals: [(&str, UniformValue); 10] = [
            ("camera.position", camera.position.extend(camera.near).into()),
            ("camera.target", direction.extend(camera.far).into()),
            ("camera.view", camera.view.into()),
            ("camera.projection", camera.projection.into()),
            ("camera.projectionInv", camera.projection.inverse().into()),
            ("camera.screenToWorld", view_projection.inverse().into()),
            ("camera.worldToScreen", view_projection.into()),
            (
                "camera.screen",
                Vec4::new(1.0 / width, 1.0 / height, width, height).into(),
            ),
            ("light.pageSize", Vec4::new(1.0 / page, 1.0 / page, page, page).into()),
            ("light.ambient", world.settings.ambient_intensity.into()),
        ];
        for (name, value) in globals {
            buffer.set_global_value(name, value);
        }
        buffer.set_view_projection(camera.view, camera.projection);
    }

    fn composite(&self, buffer: &mut dyn CommandBuffer, camera: &Camera) -> Result<(), RenderError> {
        let debug = self.debug_texture.as_deref().and_then(|name| {
            let texture = self.buffers.get(name).copied();
            if texture.is_none() {
                log::debug!("Debug texture '{name}' was not published this frame");
            }
            texture
        });
        let source = debug.or_else(|| self.buffers.get(slots::SCENE_COLOR).copied());

        match buffer.set_render_target(self.default_target(), 0) {
            Ok(()) => {}
            Err(RenderError::DeviceLost) => return Err(RenderError::DeviceLost),
            Err(err) => {
                log::warn!("Composite skipped: {err}");
                return Ok(());
            }
        }
        buffer.clear_render_target(true, camera.clear_color, true, 1.0);

        let (Some(source), Some((_, instance))) = (source, self.composite_material) else {
            return Ok(());
        };
        self.bind_composite(instance, source)?;
        buffer.set_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
        let outcome = buffer.draw_mesh(Mat4::IDENTITY, self.quad, 0, LayerMask::UI, instance);
        if !outcome.is_drawn() {
            log::debug!("Composite did not draw: {outcome:?}");
        }
        buffer.set_view_projection(camera.view, camera.projection);
        Ok(())
    }

    fn bind_composite(&self, instance: MaterialInstanceId, source: TextureId) -> Result<(), ResourceError> {
        let bound = self
            .registry
            .read()
            .instance(instance)
            .and_then(|i| i.textures.get(INPUT_SAMPLER).copied());
        if bound != Some(source) {
            self.registry.write().update_instance(instance, |i| {
                i.textures.insert(INPUT_SAMPLER.to_string(), source);
            })?;
        }
        Ok(())
    }
}

/// Wires, runs and publishes one lane.
fn run_task(
    task: &mut dyn PipelineTask,
    frame: &mut TaskFrame<'_>,
    buffers: &mut HashMap<String, TextureId>,
) -> Result<(), RenderError> {
    let inputs: Vec<&'static str> = task.slots().input_names().collect();
    for (index, name) in inputs.into_iter().enumerate() {
        task.set_input(index, buffers.get(name).copied());
    }

    frame.buffer.begin_debug_marker(task.name());
    let result = task.exec(frame);
    frame.buffer.end_debug_marker();

    if let Err(err) = result {
        if err.is_device_lost() {
            log::error!("Device lost while running task '{}'", task.name());
            return Err(RenderError::DeviceLost);
        }
        log::warn!("Task '{}' failed, passing its input through: {err}", task.name());
        task.slots_mut().pass_through(slots::SCENE_COLOR);
    }

    for (name, texture) in task.slots().outputs() {
        match texture {
            Some(texture) => {
                buffers.insert(name.to_string(), texture);
            }
            None => {
                buffers.remove(name);
            }
        }
    }
    Ok(())
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("tasks", &self.task_names())
            .field("buffers", &self.buffers)
            .field("size", &self.size)
            .field("default_target", &self.default_target())
            .finish_non_exhaustive()
    }
}

impl Drop for PipelineContext {
    fn drop(&mut self) {
        // Lanes release their own resources.
        self.tasks.clear();
        let mut ids: Vec<ResourceId> = Vec::with_capacity(6);
        if let Some((material, instance)) = self.composite_material.take() {
            ids.push(instance.into());
            ids.push(material.into());
        }
        ids.extend([
            ResourceId::from(self.final_target),
            self.final_color.into(),
            self.quad.into(),
            self.cube.into(),
        ]);
        let mut registry = self.registry.write();
        for id in ids {
            if let Err(err) = registry.request_destroy(id) {
                log::debug!("Releasing {id}: {err}");
            }
        }
    }
}
