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

//! The owning resource registry.
//!
//! The registry owns the CPU-side description and the lifecycle of every
//! resource. Relationships between resources are kept as id lists in both
//! directions (references and dependents), and invalidation is broadcast
//! through them with a worklist. No resource holds a pointer to another.
//!
//! Hosts declare and mutate resources from any thread through a
//! [`SharedRegistry`]; the render thread realizes them and reports back with
//! [`ResourceRegistry::mark_realized`] and friends.

use super::api::*;
use super::error::ResourceError;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The registry as shared between the host and the render thread.
pub type SharedRegistry = Arc<RwLock<ResourceRegistry>>;

/// Owns every declared resource and its lifecycle.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    next_id: u64,
    lifecycles: HashMap<ResourceId, Lifecycle>,
    textures: HashMap<TextureId, Texture>,
    meshes: HashMap<MeshId, Mesh>,
    materials: HashMap<MaterialId, Material>,
    instances: HashMap<MaterialInstanceId, MaterialInstance>,
    targets: HashMap<RenderTargetId, RenderTarget>,
    compute_buffers: HashMap<ComputeBufferId, ComputeBuffer>,
    compute_shaders: HashMap<ComputeShaderId, ComputeShader>,
    compute_instances: HashMap<ComputeInstanceId, ComputeInstance>,
    references: HashMap<ResourceId, Vec<ResourceId>>,
    dependents: HashMap<ResourceId, HashSet<ResourceId>>,
    pending_destruction: Vec<ResourceId>,
}

impl ResourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry ready to be shared across threads.
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    fn allocate(&mut self, kind: ResourceKind) -> u64 {
        let raw = self.next_id;
        self.next_id += 1;
        log::trace!("Declared {kind:?} #{raw}");
        raw
    }

    fn declare(&mut self, id: ResourceId, kind: ResourceKind) {
        self.lifecycles.insert(id, Lifecycle::new(kind));
    }

    // --- Declarations ---

    /// Declares a texture.
    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        let id = TextureId(self.allocate(ResourceKind::Texture));
        self.textures.insert(id, texture);
        self.declare(id.into(), ResourceKind::Texture);
        id
    }

    /// Declares a mesh.
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let id = MeshId(self.allocate(ResourceKind::Mesh));
        self.meshes.insert(id, mesh);
        self.declare(id.into(), ResourceKind::Mesh);
        id
    }

    /// Declares a material.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.allocate(ResourceKind::Material));
        self.materials.insert(id, material);
        self.declare(id.into(), ResourceKind::Material);
        id
    }

    /// Declares an instance of an existing material.
    pub fn add_instance(
        &mut self,
        instance: MaterialInstance,
    ) -> Result<MaterialInstanceId, ResourceError> {
        let material = ResourceId::Material(instance.material);
        if !self.materials.contains_key(&instance.material) {
            return Err(ResourceError::NotFound(material));
        }
        let id = MaterialInstanceId(self.allocate(ResourceKind::MaterialInstance));
        self.instances.insert(id, instance);
        self.declare(id.into(), ResourceKind::MaterialInstance);
        self.refresh_instance_references(id);
        Ok(id)
    }

    /// Declares an instance of `material` with no overrides.
    pub fn instantiate(&mut self, material: MaterialId) -> Result<MaterialInstanceId, ResourceError> {
        self.add_instance(MaterialInstance::new(material))
    }

    /// Declares a render target.
    pub fn add_render_target(&mut self, target: RenderTarget) -> RenderTargetId {
        let kind = if target.native {
            ResourceKind::NativeRenderTarget
        } else {
            ResourceKind::RenderTarget
        };
        let id = RenderTargetId(self.allocate(kind));
        let refs: Vec<ResourceId> = target.attachments().map(ResourceId::from).collect();
        self.targets.insert(id, target);
        self.declare(id.into(), kind);
        self.set_references(id.into(), refs);
        id
    }

    /// Declares a compute buffer.
    pub fn add_compute_buffer(&mut self, buffer: ComputeBuffer) -> ComputeBufferId {
        let id = ComputeBufferId(self.allocate(ResourceKind::ComputeBuffer));
        self.compute_buffers.insert(id, buffer);
        self.declare(id.into(), ResourceKind::ComputeBuffer);
        id
    }

    /// Declares a compute shader.
    pub fn add_compute_shader(&mut self, shader: ComputeShader) -> ComputeShaderId {
        let id = ComputeShaderId(self.allocate(ResourceKind::ComputeShader));
        self.compute_shaders.insert(id, shader);
        self.declare(id.into(), ResourceKind::ComputeShader);
        id
    }

    /// Declares a compute instance.
    pub fn add_compute_instance(&mut self, instance: ComputeInstance) -> ComputeInstanceId {
        let id = ComputeInstanceId(self.allocate(ResourceKind::ComputeInstance));
        let refs = Self::compute_references(&instance);
        self.compute_instances.insert(id, instance);
        self.declare(id.into(), ResourceKind::ComputeInstance);
        self.set_references(id.into(), refs);
        id
    }

    // --- Descriptions ---

    /// The description of a texture.
    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(&id)
    }

    /// The description of a mesh.
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(&id)
    }

    /// The description of a material.
    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    /// The description of a material instance.
    pub fn instance(&self, id: MaterialInstanceId) -> Option<&MaterialInstance> {
        self.instances.get(&id)
    }

    /// The description of a render target.
    pub fn render_target(&self, id: RenderTargetId) -> Option<&RenderTarget> {
        self.targets.get(&id)
    }

    /// The description of a compute buffer.
    pub fn compute_buffer(&self, id: ComputeBufferId) -> Option<&ComputeBuffer> {
        self.compute_buffers.get(&id)
    }

    /// The description of a compute shader.
    pub fn compute_shader(&self, id: ComputeShaderId) -> Option<&ComputeShader> {
        self.compute_shaders.get(&id)
    }

    /// The description of a compute instance.
    pub fn compute_instance(&self, id: ComputeInstanceId) -> Option<&ComputeInstance> {
        self.compute_instances.get(&id)
    }

    /// Every instance of `material`.
    pub fn instances_of(&self, material: MaterialId) -> Vec<MaterialInstanceId> {
        let mut ids: Vec<_> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.material == material)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    // --- Mutations ---
    //
    // Every mutation flips the resource back to ToBeUpdated and broadcasts
    // to its dependents. Nothing is allocated here.

    /// Mutates a texture's description.
    pub fn update_texture(
        &mut self,
        id: TextureId,
        f: impl FnOnce(&mut Texture),
    ) -> Result<(), ResourceError> {
        let texture = self
            .textures
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id.into()))?;
        f(texture);
        self.invalidate(id.into());
        Ok(())
    }

    /// Resizes a texture. A no-op if the size is unchanged.
    pub fn resize_texture(
        &mut self,
        id: TextureId,
        width: u32,
        height: u32,
    ) -> Result<(), ResourceError> {
        match self.textures.get(&id) {
            Some(t) if t.width == width && t.height == height => Ok(()),
            Some(_) => self.update_texture(id, |t| {
                t.width = width;
                t.height = height;
            }),
            None => Err(ResourceError::NotFound(id.into())),
        }
    }

    /// Mutates a mesh's description.
    pub fn update_mesh(&mut self, id: MeshId, f: impl FnOnce(&mut Mesh)) -> Result<(), ResourceError> {
        let mesh = self
            .meshes
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id.into()))?;
        f(mesh);
        self.invalidate(id.into());
        Ok(())
    }

    /// Mutates a material's description.
    pub fn update_material(
        &mut self,
        id: MaterialId,
        f: impl FnOnce(&mut Material),
    ) -> Result<(), ResourceError> {
        let material = self
            .materials
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id.into()))?;
        f(material);
        for instance in self.instances_of(id) {
            self.refresh_instance_references(instance);
        }
        self.invalidate(id.into());
        Ok(())
    }

    /// Replaces a material's shader sources.
    ///
    /// Every instance of the material is invalidated with it, so the next
    /// bind rebuilds pipelines and descriptors from the new sources.
    pub fn reload_material(
        &mut self,
        id: MaterialId,
        sources: ShaderSources,
    ) -> Result<(), ResourceError> {
        log::debug!("Reloading shader sources of material {id:?}");
        self.update_material(id, |m| m.sources = sources)
    }

    /// Mutates a material instance's description.
    pub fn update_instance(
        &mut self,
        id: MaterialInstanceId,
        f: impl FnOnce(&mut MaterialInstance),
    ) -> Result<(), ResourceError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id.into()))?;
        let material = instance.material;
        f(instance);
        // The owning material is fixed for the life of the instance.
        instance.material = material;
        self.refresh_instance_references(id);
        self.invalidate(id.into());
        Ok(())
    }

    /// Attaches (or detaches with `None`) a color texture.
    pub fn set_color_attachment(
        &mut self,
        id: RenderTargetId,
        index: usize,
        texture: Option<TextureId>,
    ) -> Result<(), ResourceError> {
        self.update_target(id, |t| t.set_color(index, texture))
    }

    /// Attaches or detaches the depth texture.
    pub fn set_depth_attachment(
        &mut self,
        id: RenderTargetId,
        texture: Option<TextureId>,
    ) -> Result<(), ResourceError> {
        self.update_target(id, |t| t.set_depth(texture))
    }

    fn update_target(
        &mut self,
        id: RenderTargetId,
        f: impl FnOnce(&mut RenderTarget),
    ) -> Result<(), ResourceError> {
        let target = self
            .targets
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id.into()))?;
        let before = target.clone();
        f(target);
        // Native targets stay what they were declared as.
        target.native = before.native;
        if *target == before {
            return Ok(());
        }
        let refs = target.attachments().map(ResourceId::from).collect();
        self.set_references(id.into(), refs);
        self.invalidate(id.into());
        Ok(())
    }

    /// Mutates a compute buffer's description.
    pub fn update_compute_buffer(
        &mut self,
        id: ComputeBufferId,
        f: impl FnOnce(&mut ComputeBuffer),
    ) -> Result<(), ResourceError> {
        let buffer = self
            .compute_buffers
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id.into()))?;
        f(buffer);
        self.invalidate(id.into());
        Ok(())
    }

    /// Mutates a compute instance's description.
    pub fn update_compute_instance(
        &mut self,
        id: ComputeInstanceId,
        f: impl FnOnce(&mut ComputeInstance),
    ) -> Result<(), ResourceError> {
        let instance = self
            .compute_instances
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id.into()))?;
        f(instance);
        let refs = Self::compute_references(instance);
        self.set_references(id.into(), refs);
        self.invalidate(id.into());
        Ok(())
    }

    // --- Lifecycle ---

    /// The lifecycle of a resource.
    pub fn lifecycle(&self, id: impl Into<ResourceId>) -> Option<&Lifecycle> {
        self.lifecycles.get(&id.into())
    }

    /// The state of a resource, `None` once purged.
    pub fn state(&self, id: impl Into<ResourceId>) -> Option<ResourceState> {
        self.lifecycle(id).map(Lifecycle::state)
    }

    /// The resources that must be invalidated when `id` is.
    pub fn dependents(&self, id: impl Into<ResourceId>) -> Vec<ResourceId> {
        let mut ids: Vec<_> = self
            .dependents
            .get(&id.into())
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// The resources `id` points at.
    pub fn references(&self, id: impl Into<ResourceId>) -> &[ResourceId] {
        self.references
            .get(&id.into())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Invalidates `id` and everything depending on it.
    ///
    /// Returns every resource whose state changed, `id` first.
    pub fn invalidate(&mut self, id: ResourceId) -> Vec<ResourceId> {
        let mut changed = Vec::new();
        let mut visited = HashSet::new();
        let mut worklist = vec![(id, true)];
        while let Some((current, is_root)) = worklist.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(lifecycle) = self.lifecycles.get_mut(&current) else {
                continue;
            };
            let before = lifecycle.state();
            let effects = match lifecycle.apply(LifecycleEvent::Invalidate) {
                Ok(effects) => effects,
                Err(err) => {
                    log::warn!("{err}");
                    continue;
                }
            };
            if lifecycle.state() != before {
                changed.push(current);
            }
            // The root always reaches its dependents, even if it was still
            // waiting to be realized.
            if is_root || effects.contains(Effects::INVALIDATE_DEPENDENTS) {
                if let Some(dependents) = self.dependents.get(&current) {
                    worklist.extend(dependents.iter().map(|d| (*d, false)));
                }
            }
        }
        changed
    }

    /// Requests destruction of `id`.
    ///
    /// The native object is released by the backend during its next garbage
    /// collection. Repeated requests are no-ops.
    pub fn request_destroy(&mut self, id: impl Into<ResourceId>) -> Result<(), ResourceError> {
        let id = id.into();
        let lifecycle = self
            .lifecycles
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id))?;
        match lifecycle.apply(LifecycleEvent::RequestDestroy) {
            Ok(effects) => {
                if effects.contains(Effects::SCHEDULE_DESTROY) {
                    self.pending_destruction.push(id);
                }
                if effects.contains(Effects::INVALIDATE_DEPENDENTS) {
                    for dependent in self.dependents(id) {
                        self.invalidate(dependent);
                    }
                }
                Ok(())
            }
            Err(err) => {
                log::warn!("{err}");
                Ok(())
            }
        }
    }

    /// Adds a reference to `id`.
    pub fn retain(&mut self, id: impl Into<ResourceId>) -> Result<(), ResourceError> {
        let id = id.into();
        self.lifecycles
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id))?
            .retain();
        Ok(())
    }

    /// Drops a reference to `id`, requesting destruction with the last one.
    pub fn release(&mut self, id: impl Into<ResourceId>) -> Result<(), ResourceError> {
        let id = id.into();
        let last = self
            .lifecycles
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id))?
            .release();
        if last {
            self.request_destroy(id)?;
        }
        Ok(())
    }

    // --- Backend reporting ---

    /// Records a successful realization made from the description at
    /// `generation`.
    ///
    /// Returns `false` when the resource changed while it was being
    /// realized; it then stays `ToBeUpdated` and is realized again on the
    /// next bind.
    pub fn mark_realized(
        &mut self,
        id: impl Into<ResourceId>,
        generation: u64,
        handle: NativeHandle,
    ) -> Result<bool, ResourceError> {
        let id = id.into();
        let lifecycle = self
            .lifecycles
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id))?;
        if lifecycle.generation() != generation {
            log::debug!("{id} changed while being realized");
            return Ok(false);
        }
        match lifecycle.realize(handle) {
            Ok(()) => Ok(true),
            Err(err) => {
                log::warn!("{err}");
                Ok(false)
            }
        }
    }

    /// Records a failed realization.
    pub fn mark_failed(&mut self, id: impl Into<ResourceId>) -> Result<(), ResourceError> {
        self.apply_backend_event(id.into(), LifecycleEvent::RealizationFailed)
    }

    /// Records that the backend released the native object.
    pub fn mark_destroyed(&mut self, id: impl Into<ResourceId>) -> Result<(), ResourceError> {
        self.apply_backend_event(id.into(), LifecycleEvent::Destroyed)
    }

    fn apply_backend_event(
        &mut self,
        id: ResourceId,
        event: LifecycleEvent,
    ) -> Result<(), ResourceError> {
        let lifecycle = self
            .lifecycles
            .get_mut(&id)
            .ok_or(ResourceError::NotFound(id))?;
        if let Err(err) = lifecycle.apply(event) {
            log::warn!("{err}");
        }
        Ok(())
    }

    /// Takes the resources whose native objects must be destroyed.
    pub fn take_pending_destruction(&mut self) -> Vec<ResourceId> {
        std::mem::take(&mut self.pending_destruction)
    }

    /// Forgets every resource in `ToBeDeleted`. Returns how many were removed.
    pub fn purge_deleted(&mut self) -> usize {
        let dead: Vec<ResourceId> = self
            .lifecycles
            .iter()
            .filter(|(_, l)| l.state() == ResourceState::ToBeDeleted)
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            self.lifecycles.remove(id);
            self.set_references(*id, Vec::new());
            for dependent in self.dependents.remove(id).unwrap_or_default() {
                if let Some(refs) = self.references.get_mut(&dependent) {
                    refs.retain(|r| r != id);
                }
            }
            match *id {
                ResourceId::Texture(i) => drop(self.textures.remove(&i)),
                ResourceId::Mesh(i) => drop(self.meshes.remove(&i)),
                ResourceId::Material(i) => drop(self.materials.remove(&i)),
                ResourceId::MaterialInstance(i) => drop(self.instances.remove(&i)),
                ResourceId::RenderTarget(i) => drop(self.targets.remove(&i)),
                ResourceId::ComputeBuffer(i) => drop(self.compute_buffers.remove(&i)),
                ResourceId::ComputeShader(i) => drop(self.compute_shaders.remove(&i)),
                ResourceId::ComputeInstance(i) => drop(self.compute_instances.remove(&i)),
            }
        }
        dead.len()
    }

    // --- Edges ---

    fn set_references(&mut self, id: ResourceId, refs: Vec<ResourceId>) {
        if let Some(old) = self.references.remove(&id) {
            for r in old {
                if let Some(set) = self.dependents.get_mut(&r) {
                    set.remove(&id);
                }
            }
        }
        if refs.is_empty() {
            return;
        }
        for r in &refs {
            self.dependents.entry(*r).or_default().insert(id);
        }
        self.references.insert(id, refs);
    }

    fn refresh_instance_references(&mut self, id: MaterialInstanceId) {
        let Some(instance) = self.instances.get(&id) else {
            return;
        };
        let mut refs = vec![ResourceId::Material(instance.material)];
        refs.extend(instance.textures.values().map(|t| ResourceId::Texture(*t)));
        if let Some(material) = self.materials.get(&instance.material) {
            refs.extend(
                material
                    .textures
                    .iter()
                    .filter_map(|slot| slot.default)
                    .map(ResourceId::Texture),
            );
        }
        refs.sort();
        refs.dedup();
        self.set_references(id.into(), refs);
    }

    fn compute_references(instance: &ComputeInstance) -> Vec<ResourceId> {
        let mut refs = vec![ResourceId::ComputeShader(instance.shader)];
        refs.extend(instance.buffers.values().map(|b| ResourceId::ComputeBuffer(*b)));
        refs.extend(instance.textures.values().map(|t| ResourceId::Texture(*t)));
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(registry: &mut ResourceRegistry, id: impl Into<ResourceId>) {
        let id = id.into();
        let generation = registry.lifecycle(id).unwrap().generation();
        assert!(registry
            .mark_realized(id, generation, NativeHandle::new(id.raw() + 100))
            .unwrap());
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let mut registry = ResourceRegistry::new();
        let t = registry.add_texture(Texture::render("t", 4, 4, TextureFormat::Rgba8Unorm));
        let m = registry.add_mesh(Mesh::fullscreen_quad());
        assert_ne!(t.0, m.0);
    }

    #[test]
    fn material_reload_invalidates_every_instance() {
        let mut registry = ResourceRegistry::new();
        let material = registry.add_material(Material::new(
            "m",
            ShaderSources::default(),
            BlendMode::Opaque,
        ));
        let a = registry.instantiate(material).unwrap();
        let b = registry.instantiate(material).unwrap();
        for id in [ResourceId::from(material), a.into(), b.into()] {
            ready(&mut registry, id);
        }

        registry
            .reload_material(material, ShaderSources::default())
            .unwrap();
        for id in [ResourceId::from(material), a.into(), b.into()] {
            assert_eq!(registry.state(id), Some(ResourceState::ToBeUpdated));
        }
    }

    #[test]
    fn attachment_swap_invalidates_offscreen_targets_only() {
        let mut registry = ResourceRegistry::new();
        let color = registry.add_texture(Texture::render("c", 8, 8, TextureFormat::Rgba8Unorm));
        let other = registry.add_texture(Texture::render("o", 8, 8, TextureFormat::Rgba8Unorm));
        let offscreen = registry.add_render_target(RenderTarget::new("off").with_color(0, color));
        let native = registry.add_render_target(RenderTarget::native("screen"));
        ready(&mut registry, offscreen);
        ready(&mut registry, native);

        registry
            .set_color_attachment(offscreen, 0, Some(other))
            .unwrap();
        registry.set_color_attachment(native, 0, Some(other)).unwrap();
        assert_eq!(registry.state(offscreen), Some(ResourceState::ToBeUpdated));
        assert_eq!(registry.state(native), Some(ResourceState::Ready));
        assert_eq!(registry.dependents(other), vec![offscreen.into(), native.into()]);
    }

    #[test]
    fn resizing_a_texture_reaches_its_targets() {
        let mut registry = ResourceRegistry::new();
        let color = registry.add_texture(Texture::render("c", 8, 8, TextureFormat::Rgba8Unorm));
        let target = registry.add_render_target(RenderTarget::new("t").with_color(0, color));
        ready(&mut registry, color);
        ready(&mut registry, target);

        registry.resize_texture(color, 8, 8).unwrap();
        assert_eq!(registry.state(target), Some(ResourceState::Ready));
        registry.resize_texture(color, 16, 16).unwrap();
        assert_eq!(registry.state(target), Some(ResourceState::ToBeUpdated));
    }

    #[test]
    fn destruction_is_scheduled_once_and_native_targets_never() {
        let mut registry = ResourceRegistry::new();
        let texture = registry.add_texture(Texture::render("t", 4, 4, TextureFormat::Rgba8Unorm));
        let native = registry.add_render_target(RenderTarget::native("screen"));
        ready(&mut registry, texture);
        ready(&mut registry, native);

        registry.request_destroy(texture).unwrap();
        registry.request_destroy(texture).unwrap();
        registry.request_destroy(native).unwrap();
        assert_eq!(registry.take_pending_destruction(), vec![texture.into()]);
        assert_eq!(registry.state(native), Some(ResourceState::ToBeDeleted));

        registry.mark_destroyed(texture).unwrap();
        assert_eq!(registry.purge_deleted(), 2);
        assert_eq!(registry.state(texture), None);
    }

    #[test]
    fn purged_resources_leave_no_edges_behind() {
        let mut registry = ResourceRegistry::new();
        let color = registry.add_texture(Texture::render("c", 8, 8, TextureFormat::Rgba8Unorm));
        let depth = registry.add_texture(Texture::render("d", 8, 8, TextureFormat::Depth32Float));
        let target = registry.add_render_target(
            RenderTarget::new("off")
                .with_color(0, color)
                .with_depth(depth),
        );
        ready(&mut registry, color);
        ready(&mut registry, target);
        assert_eq!(
            registry.references(target),
            [ResourceId::from(color), ResourceId::from(depth)]
        );

        registry.request_destroy(color).unwrap();
        registry.take_pending_destruction();
        registry.mark_destroyed(color).unwrap();
        assert_eq!(registry.purge_deleted(), 1);

        assert_eq!(registry.references(target), [ResourceId::from(depth)]);
        assert!(registry.dependents(color).is_empty());
        assert_eq!(registry.dependents(depth), vec![target.into()]);
    }

    #[test]
    fn releasing_the_last_reference_requests_destruction() {
        let mut registry = ResourceRegistry::new();
        let mesh = registry.add_mesh(Mesh::unit_cube());
        registry.retain(mesh).unwrap();
        registry.release(mesh).unwrap();
        assert!(registry.take_pending_destruction().is_empty());
        registry.release(mesh).unwrap();
        assert_eq!(registry.state(mesh), Some(ResourceState::Unloading));
    }

    #[test]
    fn stale_realizations_are_discarded() {
        let mut registry = ResourceRegistry::new();
        let texture = registry.add_texture(Texture::render("t", 4, 4, TextureFormat::Rgba8Unorm));
        ready(&mut registry, texture);
        registry.resize_texture(texture, 8, 8).unwrap();
        assert!(!registry
            .mark_realized(texture, 0, NativeHandle::new(1))
            .unwrap());
        assert_eq!(registry.state(texture), Some(ResourceState::ToBeUpdated));
    }

    #[test]
    fn unknown_materials_cannot_be_instantiated() {
        let mut registry = ResourceRegistry::new();
        assert!(matches!(
            registry.instantiate(MaterialId(42)),
            Err(ResourceError::NotFound(_))
        ));
    }
}
