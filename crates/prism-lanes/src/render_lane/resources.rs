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

//! Registry resources owned by a lane.

use super::error::TaskError;
use prism_core::renderer::{
    Material, MaterialId, MaterialInstanceId, RenderTarget, RenderTargetId, ResourceError, ResourceId,
    ShaderLibrary, ShaderSources, SharedRegistry, Texture, TextureFormat, TextureId, UniformValue,
};

/// How an owned texture follows the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sizing {
    /// `viewport >> shift` on each axis, never below one pixel.
    Viewport { shift: u32 },
    /// Never resized.
    Fixed,
}

/// Tracks what a lane declared in the registry and releases it on drop.
#[derive(Debug)]
pub(crate) struct TaskResources {
    registry: SharedRegistry,
    textures: Vec<(TextureId, Sizing)>,
    targets: Vec<RenderTargetId>,
    materials: Vec<MaterialId>,
    instances: Vec<MaterialInstanceId>,
    size: (u32, u32),
}

impl TaskResources {
    pub fn new(registry: &SharedRegistry) -> Self {
        Self {
            registry: registry.clone(),
            textures: Vec::new(),
            targets: Vec::new(),
            materials: Vec::new(),
            instances: Vec::new(),
            size: (1, 1),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// The viewport size of the last resize.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Declares a render texture that follows the viewport.
    pub fn render_texture(&mut self, label: &str, format: TextureFormat, shift: u32) -> TextureId {
        let (width, height) = scaled(self.size, shift);
        let id = self
            .registry
            .write()
            .add_texture(Texture::render(label, width, height, format));
        self.textures.push((id, Sizing::Viewport { shift }));
        id
    }

    /// Declares a texture that keeps its declared size.
    pub fn fixed_texture(&mut self, texture: Texture) -> TextureId {
        let id = self.registry.write().add_texture(texture);
        self.textures.push((id, Sizing::Fixed));
        id
    }

    pub fn target(&mut self, target: RenderTarget) -> RenderTargetId {
        let id = self.registry.write().add_render_target(target);
        self.targets.push(id);
        id
    }

    pub fn targets(&self) -> &[RenderTargetId] {
        &self.targets
    }

    /// Declares a material built from the library program `program` and one
    /// instance of it.
    ///
    /// Returns `None`, after a warning, when the library lacks the program.
    pub fn material(
        &mut self,
        library: &dyn ShaderLibrary,
        program: &str,
        build: impl FnOnce(ShaderSources) -> Material,
    ) -> Option<(MaterialId, MaterialInstanceId)> {
        let material = self.declare_material(library, program, build)?;
        let instance = self.instance(material)?;
        Some((material, instance))
    }

    /// Declares a material without instancing it.
    pub fn declare_material(
        &mut self,
        library: &dyn ShaderLibrary,
        program: &str,
        build: impl FnOnce(ShaderSources) -> Material,
    ) -> Option<MaterialId> {
        let Some(sources) = library.sources(program) else {
            log::warn!("Shader program '{program}' is missing, its pass will be skipped");
            return None;
        };
        let material = self.registry.write().add_material(build(sources));
        self.materials.push(material);
        Some(material)
    }

    /// Declares one more instance of an owned material.
    pub fn instance(&mut self, material: MaterialId) -> Option<MaterialInstanceId> {
        match self.registry.write().instantiate(material) {
            Ok(id) => {
                self.instances.push(id);
                Some(id)
            }
            Err(err) => {
                log::error!("Could not instantiate material {material:?}: {err}");
                None
            }
        }
    }

    /// Releases an instance declared by [`TaskResources::instance`].
    pub fn release_instance(&mut self, id: MaterialInstanceId) {
        self.instances.retain(|i| *i != id);
        release(&self.registry, id.into());
    }

    /// Resizes every viewport-sized texture. Returns `false` if nothing
    /// changed.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool, TaskError> {
        let size = (width.max(1), height.max(1));
        if size == self.size {
            return Ok(false);
        }
        self.size = size;
        let mut registry = self.registry.write();
        for (id, sizing) in &self.textures {
            if let Sizing::Viewport { shift } = sizing {
                let (w, h) = scaled(size, *shift);
                registry.resize_texture(*id, w, h)?;
            }
        }
        Ok(true)
    }

    /// Sets instance parameters. The instance is only invalidated when a
    /// value actually changes.
    pub fn set_params(
        &self,
        instance: MaterialInstanceId,
        params: &[(&str, UniformValue)],
    ) -> Result<(), TaskError> {
        let dirty = {
            let registry = self.registry.read();
            let current = registry
                .instance(instance)
                .ok_or(ResourceError::NotFound(instance.into()))?;
            params
                .iter()
                .any(|(name, value)| current.params.get(*name) != Some(value))
        };
        if dirty {
            self.registry.write().update_instance(instance, |i| {
                for (name, value) in params {
                    i.params.insert((*name).to_string(), *value);
                }
            })?;
        }
        Ok(())
    }

    /// Binds instance textures, with the same change detection as
    /// [`TaskResources::set_params`].
    pub fn set_textures(
        &self,
        instance: MaterialInstanceId,
        textures: &[(&str, TextureId)],
    ) -> Result<(), TaskError> {
        let dirty = {
            let registry = self.registry.read();
            let current = registry
                .instance(instance)
                .ok_or(ResourceError::NotFound(instance.into()))?;
            textures
                .iter()
                .any(|(name, texture)| current.textures.get(*name) != Some(texture))
        };
        if dirty {
            self.registry.write().update_instance(instance, |i| {
                for (name, texture) in textures {
                    i.textures.insert((*name).to_string(), *texture);
                }
            })?;
        }
        Ok(())
    }

    /// Points an owned target at new attachments. A no-op when nothing
    /// changes.
    pub fn attach(
        &self,
        target: RenderTargetId,
        color: Option<TextureId>,
        depth: Option<TextureId>,
    ) -> Result<(), TaskError> {
        let mut registry = self.registry.write();
        registry.set_color_attachment(target, 0, color)?;
        registry.set_depth_attachment(target, depth)?;
        Ok(())
    }
}

impl Drop for TaskResources {
    fn drop(&mut self) {
        let ids = self
            .instances
            .drain(..)
            .map(ResourceId::from)
            .chain(self.materials.drain(..).map(ResourceId::from))
            .chain(self.targets.drain(..).map(ResourceId::from))
            .chain(self.textures.drain(..).map(|(id, _)| ResourceId::from(id)))
            .collect::<Vec<_>>();
        for id in ids {
            release(&self.registry, id);
        }
    }
}

fn release(registry: &SharedRegistry, id: ResourceId) {
    if let Err(err) = registry.write().request_destroy(id) {
        log::debug!("Releasing {id}: {err}");
    }
}

fn scaled((width, height): (u32, u32), shift: u32) -> (u32, u32) {
    ((width >> shift).max(1), (height >> shift).max(1))
}
