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

//! Realize-on-bind for textures, meshes, render targets and compute buffers.
//!
//! Every `realize_*` call reads the resource's lifecycle under the registry
//! read lock, builds native objects without holding any lock, then reports
//! the outcome under the write lock. The generation read at the start is
//! handed back with the report, so a description that changed in between
//! stays `ToBeUpdated` and is rebuilt on the next bind.

use super::deletion::GpuObject;
use prism_core::renderer::{
    AttachmentError, BackendStats, BufferDescriptor, BufferUsage, ComputeBuffer,
    ComputeBufferId, ComputeBufferUsage, FramebufferAttachment, FramebufferDescriptor,
    FramebufferId, GpuBufferId, GpuTextureId, GraphicsDevice, Mesh, MeshId, NativeHandle,
    RenderTarget, RenderTargetId, ResourceError, ResourceId, ResourceState, SharedRegistry,
    SkipReason, TargetSignature, Texture, TextureDescriptor, TextureFormat, TextureId,
    TextureUsage, Topology,
};
use std::collections::HashMap;
use std::ops::Range;

/// Borrowed backend state every realization needs.
pub(crate) struct Realizer<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub registry: &'a SharedRegistry,
    pub retired: &'a mut Vec<GpuObject>,
    pub stats: &'a mut BackendStats,
}

impl Realizer<'_> {
    /// Reads the state and generation of `id`.
    fn snapshot(&self, id: ResourceId) -> Option<(ResourceState, u64)> {
        let registry = self.registry.read();
        registry
            .lifecycle(id)
            .map(|lifecycle| (lifecycle.state(), lifecycle.generation()))
    }

    pub(crate) fn realized(&mut self, id: ResourceId, generation: u64, handle: NativeHandle) {
        match self.registry.write().mark_realized(id, generation, handle) {
            Ok(true) => {
                log::debug!("Realized {id}");
                self.stats.realized += 1;
            }
            Ok(false) => {}
            Err(e) => log::warn!("Could not record realization of {id}: {e}"),
        }
    }

    pub(crate) fn failed(&mut self, id: ResourceId, error: &dyn std::fmt::Display) {
        log::error!("Failed to realize {id}: {error}");
        if let Err(e) = self.registry.write().mark_failed(id) {
            log::warn!("Could not record failure of {id}: {e}");
        }
    }
}

/// A texture as the device sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TextureInfo {
    pub texture: GpuTextureId,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub render_target: bool,
}

impl TextureInfo {
    fn mip_size(&self, mip: u32) -> (u32, u32) {
        ((self.width >> mip).max(1), (self.height >> mip).max(1))
    }
}

/// The buffers and range a submesh draw needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MeshBinding {
    pub vertex: GpuBufferId,
    pub skin: Option<GpuBufferId>,
    pub index: GpuBufferId,
    pub indices: Range<u32>,
    pub topology: Topology,
}

/// A bound framebuffer and the formats pipelines must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TargetBinding {
    pub framebuffer: FramebufferId,
    pub width: u32,
    pub height: u32,
    pub signature: TargetSignature,
}

/// Why a target could not be bound.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TargetFailure {
    Unavailable(SkipReason),
    Mismatch(AttachmentError),
}

#[derive(Debug)]
struct RealizedMesh {
    vertex: GpuBufferId,
    skin: Option<GpuBufferId>,
    index: GpuBufferId,
    submeshes: Vec<Range<u32>>,
    topology: Topology,
}

#[derive(Debug)]
struct RealizedTarget {
    colors: Vec<TextureInfo>,
    depth: Option<TextureInfo>,
    signature: TargetSignature,
    framebuffers: HashMap<u32, TargetBinding>,
}

impl RealizedTarget {
    fn objects(&self) -> impl Iterator<Item = GpuObject> + '_ {
        self.framebuffers
            .values()
            .map(|binding| GpuObject::Framebuffer(binding.framebuffer))
    }
}

/// Native objects realized from registry descriptions.
#[derive(Debug, Default)]
pub(crate) struct ResourceCache {
    textures: HashMap<TextureId, TextureInfo>,
    meshes: HashMap<MeshId, RealizedMesh>,
    targets: HashMap<RenderTargetId, RealizedTarget>,
    compute_buffers: HashMap<ComputeBufferId, (GpuBufferId, u64)>,
    white: Option<GpuTextureId>,
}

impl ResourceCache {
    /// Realizes a texture if needed.
    pub(crate) fn texture(
        &mut self,
        r: &mut Realizer<'_>,
        id: TextureId,
    ) -> Result<TextureInfo, SkipReason> {
        let rid = ResourceId::from(id);
        let unavailable = SkipReason::ResourceUnavailable(rid);
        let (state, generation) = r.snapshot(rid).ok_or(unavailable)?;
        match state {
            ResourceState::Ready => {
                if let Some(info) = self.textures.get(&id) {
                    return Ok(*info);
                }
            }
            ResourceState::ToBeUpdated => {}
            _ => return Err(unavailable),
        }
        let description = r.registry.read().texture(id).cloned().ok_or(unavailable)?;
        match create_texture(r.device, &description) {
            Ok(texture) => {
                let info = TextureInfo {
                    texture,
                    width: description.width,
                    height: description.height,
                    format: description.format,
                    mip_levels: description.mip_levels.max(1),
                    render_target: description.render_target,
                };
                if let Some(old) = self.textures.insert(id, info) {
                    r.retired.push(GpuObject::Texture(old.texture));
                }
                r.realized(rid, generation, NativeHandle::new(texture.0));
                Ok(info)
            }
            Err(e) => {
                r.failed(rid, &e);
                Err(unavailable)
            }
        }
    }

    /// Realizes a mesh if needed.
    pub(crate) fn realize_mesh(&mut self, r: &mut Realizer<'_>, id: MeshId) -> Result<(), SkipReason> {
        let rid = ResourceId::from(id);
        let unavailable = SkipReason::ResourceUnavailable(rid);
        let (state, generation) = r.snapshot(rid).ok_or(unavailable)?;
        match state {
            ResourceState::Ready if self.meshes.contains_key(&id) => return Ok(()),
            ResourceState::Ready | ResourceState::ToBeUpdated => {}
            _ => return Err(unavailable),
        }
        let description = r.registry.read().mesh(id).cloned().ok_or(unavailable)?;
        match create_mesh(r.device, &description) {
            Ok(mesh) => {
                let handle = NativeHandle::new(mesh.vertex.0);
                if let Some(old) = self.meshes.insert(id, mesh) {
                    r.retired.extend(mesh_objects(&old));
                }
                r.realized(rid, generation, handle);
                Ok(())
            }
            Err(e) => {
                r.failed(rid, &e);
                Err(unavailable)
            }
        }
    }

    /// Realizes a mesh if needed and returns the buffers for `submesh`.
    pub(crate) fn mesh(
        &mut self,
        r: &mut Realizer<'_>,
        id: MeshId,
        submesh: usize,
    ) -> Result<MeshBinding, SkipReason> {
        self.realize_mesh(r, id)?;
        let unavailable = SkipReason::ResourceUnavailable(id.into());
        let mesh = self.meshes.get(&id).ok_or(unavailable)?;
        let indices = mesh
            .submeshes
            .get(submesh)
            .cloned()
            .ok_or(SkipReason::MissingSubmesh)?;
        Ok(MeshBinding {
            vertex: mesh.vertex,
            skin: mesh.skin,
            index: mesh.index,
            indices,
            topology: mesh.topology,
        })
    }

    /// Realizes a render target's framebuffer for `mip_level`.
    pub(crate) fn target(
        &mut self,
        r: &mut Realizer<'_>,
        id: RenderTargetId,
        mip_level: u32,
    ) -> Result<TargetBinding, TargetFailure> {
        let rid = ResourceId::from(id);
        let unavailable = TargetFailure::Unavailable(SkipReason::TargetInvalid);
        let (state, generation) = r.snapshot(rid).ok_or(unavailable.clone())?;
        match state {
            ResourceState::Ready if self.targets.contains_key(&id) => {
                return self.target_mip(r, id, mip_level);
            }
            ResourceState::Ready | ResourceState::ToBeUpdated => {}
            _ => return Err(unavailable),
        }

        if let Some(old) = self.targets.remove(&id) {
            r.retired.extend(old.objects());
        }
        let description = r
            .registry
            .read()
            .render_target(id)
            .cloned()
            .ok_or(unavailable.clone())?;

        let mut colors = Vec::with_capacity(description.colors.len());
        for texture in description.colors.iter() {
            let Some(texture) = texture else {
                let error = mismatch(id, "a color attachment slot is empty");
                r.failed(rid, &error);
                return Err(TargetFailure::Mismatch(error));
            };
            colors.push(self.attachment(r, rid, *texture)?);
        }
        let depth = match description.depth {
            Some(texture) => Some(self.attachment(r, rid, texture)?),
            None => None,
        };

        if let Err(error) = validate_attachments(id, &description, &colors, depth.as_ref()) {
            r.failed(rid, &error);
            return Err(TargetFailure::Mismatch(error));
        }

        let entry = RealizedTarget {
            signature: TargetSignature {
                colors: colors.iter().map(|c| c.format).collect(),
                depth: depth.map(|d| d.format),
            },
            colors,
            depth,
            framebuffers: HashMap::new(),
        };
        self.targets.insert(id, entry);
        let binding = self.target_mip(r, id, mip_level)?;
        r.realized(rid, generation, NativeHandle::new(binding.framebuffer.0));
        Ok(binding)
    }

    fn attachment(
        &mut self,
        r: &mut Realizer<'_>,
        target: ResourceId,
        texture: TextureId,
    ) -> Result<TextureInfo, TargetFailure> {
        self.texture(r, texture).map_err(|reason| {
            r.failed(target, &reason);
            TargetFailure::Unavailable(reason)
        })
    }

    fn target_mip(
        &mut self,
        r: &mut Realizer<'_>,
        id: RenderTargetId,
        mip_level: u32,
    ) -> Result<TargetBinding, TargetFailure> {
        let entry = self
            .targets
            .get_mut(&id)
            .ok_or(TargetFailure::Unavailable(SkipReason::TargetInvalid))?;
        if let Some(binding) = entry.framebuffers.get(&mip_level) {
            return Ok(binding.clone());
        }

        let first = entry
            .colors
            .first()
            .or(entry.depth.as_ref())
            .copied()
            .ok_or(TargetFailure::Unavailable(SkipReason::TargetInvalid))?;
        let all = entry.colors.iter().chain(entry.depth.iter());
        if all.clone().any(|a| mip_level >= a.mip_levels) {
            return Err(TargetFailure::Mismatch(mismatch(
                id,
                &format!("mip level {mip_level} exceeds an attachment's mip count"),
            )));
        }
        let (width, height) = first.mip_size(mip_level);
        let attach = |info: &TextureInfo| FramebufferAttachment {
            texture: info.texture,
            mip_level,
        };
        let descriptor = FramebufferDescriptor {
            label: format!("target#{} mip {mip_level}", id.0),
            colors: entry.colors.iter().map(attach).collect(),
            depth: entry.depth.as_ref().map(attach),
            width,
            height,
        };
        let framebuffer = r.device.create_framebuffer(&descriptor).map_err(|e| {
            log::error!("Failed to create framebuffer for target#{}: {e}", id.0);
            TargetFailure::Unavailable(SkipReason::TargetInvalid)
        })?;
        let binding = TargetBinding {
            framebuffer,
            width,
            height,
            signature: entry.signature.clone(),
        };
        entry.framebuffers.insert(mip_level, binding.clone());
        Ok(binding)
    }

    /// Realizes a compute buffer if needed, returning it with its size.
    pub(crate) fn compute_buffer(
        &mut self,
        r: &mut Realizer<'_>,
        id: ComputeBufferId,
    ) -> Result<(GpuBufferId, u64), SkipReason> {
        let rid = ResourceId::from(id);
        let unavailable = SkipReason::ResourceUnavailable(rid);
        let (state, generation) = r.snapshot(rid).ok_or(unavailable)?;
        match state {
            ResourceState::Ready => {
                if let Some(buffer) = self.compute_buffers.get(&id) {
                    return Ok(*buffer);
                }
            }
            ResourceState::ToBeUpdated => {}
            _ => return Err(unavailable),
        }
        let description = r
            .registry
            .read()
            .compute_buffer(id)
            .cloned()
            .ok_or(unavailable)?;
        match create_compute_buffer(r.device, &description) {
            Ok(buffer) => {
                let entry = (buffer, description.size);
                if let Some((old, _)) = self.compute_buffers.insert(id, entry) {
                    r.retired.push(GpuObject::Buffer(old));
                }
                r.realized(rid, generation, NativeHandle::new(buffer.0));
                Ok(entry)
            }
            Err(e) => {
                r.failed(rid, &e);
                Err(unavailable)
            }
        }
    }

    /// The 1x1 white texture bound to empty slots.
    pub(crate) fn white(&mut self, device: &dyn GraphicsDevice) -> Result<GpuTextureId, SkipReason> {
        if let Some(white) = self.white {
            return Ok(white);
        }
        let texture = Texture::with_data("white", 1, 1, TextureFormat::Rgba8Unorm, vec![255u8; 4]);
        let white = create_texture(device, &texture).map_err(|e| {
            log::error!("Failed to create the default texture: {e}");
            SkipReason::PipelineUnavailable
        })?;
        self.white = Some(white);
        Ok(white)
    }

    /// Forgets `id`, handing back its native objects.
    pub(crate) fn evict(&mut self, id: ResourceId, retired: &mut Vec<GpuObject>) {
        match id {
            ResourceId::Texture(id) => {
                retired.extend(self.textures.remove(&id).map(|t| GpuObject::Texture(t.texture)))
            }
            ResourceId::Mesh(id) => {
                if let Some(mesh) = self.meshes.remove(&id) {
                    retired.extend(mesh_objects(&mesh));
                }
            }
            ResourceId::RenderTarget(id) => {
                if let Some(target) = self.targets.remove(&id) {
                    retired.extend(target.objects());
                }
            }
            ResourceId::ComputeBuffer(id) => {
                retired.extend(self.compute_buffers.remove(&id).map(|(b, _)| GpuObject::Buffer(b)))
            }
            _ => {}
        }
    }

    /// Hands back every native object. Used at teardown.
    pub(crate) fn drain(&mut self) -> Vec<GpuObject> {
        let mut objects = Vec::new();
        for target in std::mem::take(&mut self.targets).into_values() {
            objects.extend(target.objects());
        }
        for mesh in std::mem::take(&mut self.meshes).into_values() {
            objects.extend(mesh_objects(&mesh));
        }
        objects.extend(self.textures.drain().map(|(_, t)| GpuObject::Texture(t.texture)));
        objects.extend(self.compute_buffers.drain().map(|(_, (b, _))| GpuObject::Buffer(b)));
        objects.extend(self.white.take().map(GpuObject::Texture));
        objects
    }
}

fn mismatch(target: RenderTargetId, reason: &str) -> AttachmentError {
    AttachmentError {
        target,
        reason: reason.to_owned(),
    }
}

fn validate_attachments(
    id: RenderTargetId,
    description: &RenderTarget,
    colors: &[TextureInfo],
    depth: Option<&TextureInfo>,
) -> Result<(), AttachmentError> {
    let Some(first) = colors.first().or(depth) else {
        return Err(mismatch(id, "the target has no attachments"));
    };
    if let Some(bad) = colors.iter().find(|c| c.format.is_depth()) {
        return Err(mismatch(
            id,
            &format!("{:?} cannot be a color attachment", bad.format),
        ));
    }
    if let Some(depth) = depth {
        if !depth.format.is_depth() {
            return Err(mismatch(
                id,
                &format!("{:?} cannot be a depth attachment", depth.format),
            ));
        }
    }
    for attachment in colors.iter().chain(depth) {
        if !attachment.render_target {
            return Err(mismatch(id, "an attachment is not a render texture"));
        }
        if (attachment.width, attachment.height) != (first.width, first.height) {
            return Err(mismatch(
                id,
                &format!(
                    "'{}' mixes {}x{} and {}x{} attachments",
                    description.label,
                    first.width,
                    first.height,
                    attachment.width,
                    attachment.height
                ),
            ));
        }
    }
    Ok(())
}

fn create_texture(
    device: &dyn GraphicsDevice,
    texture: &Texture,
) -> Result<GpuTextureId, ResourceError> {
    if let Some(data) = &texture.data {
        if data.len() != texture.expected_data_len() {
            return Err(ResourceError::InvalidDescription(format!(
                "texture '{}' has {} bytes of data, expected {}",
                texture.label,
                data.len(),
                texture.expected_data_len()
            )));
        }
    }
    let mut usage = TextureUsage::SAMPLED | TextureUsage::COPY_DST;
    if texture.render_target {
        usage |= TextureUsage::RENDER_ATTACHMENT;
    }
    let id = device.create_texture(&TextureDescriptor {
        label: texture.label.clone(),
        width: texture.width,
        height: texture.height,
        layers: texture.kind.layers(),
        mip_levels: texture.mip_levels.max(1),
        format: texture.format,
        usage,
    })?;
    if let Some(data) = &texture.data {
        if let Err(e) = device.write_texture(id, data) {
            let _ = device.destroy_texture(id);
            return Err(e);
        }
    }
    Ok(id)
}

fn create_buffer(
    device: &dyn GraphicsDevice,
    label: String,
    usage: BufferUsage,
    data: &[u8],
    size: u64,
) -> Result<GpuBufferId, ResourceError> {
    // Zero-sized buffers are not portable.
    let size = size.max(data.len() as u64).max(4);
    let id = device.create_buffer(&BufferDescriptor {
        label,
        size,
        usage: usage | BufferUsage::COPY_DST,
    })?;
    if !data.is_empty() {
        if let Err(e) = device.write_buffer(id, 0, data) {
            let _ = device.destroy_buffer(id);
            return Err(e);
        }
    }
    Ok(id)
}

fn create_mesh(device: &dyn GraphicsDevice, mesh: &Mesh) -> Result<RealizedMesh, ResourceError> {
    mesh.validate().map_err(ResourceError::InvalidDescription)?;
    let bytes = mesh.vertex_bytes();
    let vertex = create_buffer(
        device,
        format!("{} vertices", mesh.label),
        BufferUsage::VERTEX,
        bytes,
        bytes.len() as u64,
    )?;
    let mut created = vec![GpuObject::Buffer(vertex)];
    let result = (|| -> Result<RealizedMesh, ResourceError> {
        let skin = match &mesh.skin {
            Some(skin) => {
                let bytes: &[u8] = bytemuck::cast_slice(skin);
                let buffer = create_buffer(
                    device,
                    format!("{} skin", mesh.label),
                    BufferUsage::VERTEX,
                    bytes,
                    bytes.len() as u64,
                )?;
                created.push(GpuObject::Buffer(buffer));
                Some(buffer)
            }
            None => None,
        };
        let bytes = mesh.index_bytes();
        let index = create_buffer(
            device,
            format!("{} indices", mesh.label),
            BufferUsage::INDEX,
            bytes,
            bytes.len() as u64,
        )?;
        Ok(RealizedMesh {
            vertex,
            skin,
            index,
            submeshes: mesh.submeshes.iter().map(|s| s.indices.clone()).collect(),
            topology: mesh.topology,
        })
    })();
    if result.is_err() {
        for object in created {
            let _ = object.destroy(device);
        }
    }
    result
}

fn mesh_objects(mesh: &RealizedMesh) -> Vec<GpuObject> {
    let mut objects = vec![GpuObject::Buffer(mesh.vertex), GpuObject::Buffer(mesh.index)];
    objects.extend(mesh.skin.map(GpuObject::Buffer));
    objects
}

fn create_compute_buffer(
    device: &dyn GraphicsDevice,
    buffer: &ComputeBuffer,
) -> Result<GpuBufferId, ResourceError> {
    let data = buffer.data.as_deref().unwrap_or(&[]);
    if data.len() as u64 > buffer.size {
        return Err(ResourceError::InvalidDescription(format!(
            "compute buffer '{}' holds {} bytes of data but is {} bytes long",
            buffer.label,
            data.len(),
            buffer.size
        )));
    }
    let usage = match buffer.usage {
        ComputeBufferUsage::Storage => BufferUsage::STORAGE,
        ComputeBufferUsage::Uniform => BufferUsage::UNIFORM,
    };
    create_buffer(device, buffer.label.clone(), usage, data, buffer.size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::{HeadlessDevice, ObjectKind};
    use prism_core::renderer::{ResourceRegistry, Vertex};

    struct Fixture {
        device: HeadlessDevice,
        registry: SharedRegistry,
        retired: Vec<GpuObject>,
        stats: BackendStats,
        cache: ResourceCache,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                device: HeadlessDevice::default(),
                registry: ResourceRegistry::shared(),
                retired: Vec::new(),
                stats: BackendStats::default(),
                cache: ResourceCache::default(),
            }
        }

        fn split(&mut self) -> (Realizer<'_>, &mut ResourceCache) {
            (
                Realizer {
                    device: &self.device,
                    registry: &self.registry,
                    retired: &mut self.retired,
                    stats: &mut self.stats,
                },
                &mut self.cache,
            )
        }
    }

    #[test]
    fn first_bind_realizes_and_later_binds_reuse() {
        let mut f = Fixture::new();
        let id = f
            .registry
            .write()
            .add_texture(Texture::render("color", 64, 64, TextureFormat::Rgba8Unorm));
        let (mut r, cache) = f.split();
        let first = cache.texture(&mut r, id).unwrap();
        let second = cache.texture(&mut r, id).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.registry.read().state(id), Some(ResourceState::Ready));
        assert_eq!(f.device.created(ObjectKind::Texture), 1);
        assert_eq!(f.stats.realized, 1);
    }

    #[test]
    fn bad_pixel_data_fails_the_texture() {
        let mut f = Fixture::new();
        let id = f.registry.write().add_texture(Texture::with_data(
            "short",
            4,
            4,
            TextureFormat::Rgba8Unorm,
            vec![0u8; 3],
        ));
        let (mut r, cache) = f.split();
        assert_eq!(
            cache.texture(&mut r, id),
            Err(SkipReason::ResourceUnavailable(id.into()))
        );
        assert_eq!(f.registry.read().state(id), Some(ResourceState::Failed));
    }

    #[test]
    fn resize_rebuilds_texture_and_target() {
        let mut f = Fixture::new();
        let (color, target) = {
            let mut registry = f.registry.write();
            let color = registry.add_texture(Texture::render("c", 32, 32, TextureFormat::Rgba8Unorm));
            let target = registry.add_render_target(RenderTarget::new("t").with_color(0, color));
            (color, target)
        };
        let (mut r, cache) = f.split();
        let before = cache.target(&mut r, target, 0).unwrap();
        assert_eq!((before.width, before.height), (32, 32));

        f.registry.write().resize_texture(color, 64, 64).unwrap();
        assert_eq!(f.registry.read().state(target), Some(ResourceState::ToBeUpdated));
        let (mut r, cache) = f.split();
        let after = cache.target(&mut r, target, 1).unwrap();
        assert_eq!((after.width, after.height), (32, 32));
        assert_ne!(before.framebuffer, after.framebuffer);
        assert!(f.retired.contains(&GpuObject::Framebuffer(before.framebuffer)));
    }

    #[test]
    fn mismatched_attachment_sizes_fail_the_target() {
        let mut f = Fixture::new();
        let target = {
            let mut registry = f.registry.write();
            let a = registry.add_texture(Texture::render("a", 32, 32, TextureFormat::Rgba8Unorm));
            let b = registry.add_texture(Texture::render("b", 16, 16, TextureFormat::Depth32Float));
            registry.add_render_target(RenderTarget::new("t").with_color(0, a).with_depth(b))
        };
        let (mut r, cache) = f.split();
        assert!(matches!(
            cache.target(&mut r, target, 0),
            Err(TargetFailure::Mismatch(AttachmentError { .. }))
        ));
        assert_eq!(f.registry.read().state(target), Some(ResourceState::Failed));
    }

    #[test]
    fn missing_submesh_is_reported() {
        let mut f = Fixture::new();
        let vertices = vec![Vertex::new([0.0; 3], [0.0, 0.0, 1.0], [0.0; 2]); 3];
        let mesh = f.registry.write().add_mesh(Mesh::new("tri", vertices, vec![0, 1, 2]));
        let (mut r, cache) = f.split();
        assert_eq!(cache.mesh(&mut r, mesh, 0).unwrap().indices, 0..3);
        assert_eq!(cache.mesh(&mut r, mesh, 1), Err(SkipReason::MissingSubmesh));
        assert_eq!(f.device.live(ObjectKind::Buffer), 2);
    }
}
