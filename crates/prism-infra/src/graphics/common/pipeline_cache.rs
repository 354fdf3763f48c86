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

//! The per-backend material and pipeline cache.
//!
//! Shader modules are compiled per material, all declared variants at once,
//! the first time a material is bound after (re)declaration. Pipelines are
//! created per `(material, vertex variant, fragment variant, target
//! signature, topology)` and found again with a single hash lookup.
//!
//! A reloaded material is back in `ToBeUpdated` when it is next bound; its
//! modules and every pipeline built from them are retired before anything
//! is recompiled, so a stale pipeline can never be handed out.

use super::deletion::GpuObject;
use super::resources::Realizer;
use prism_core::renderer::{
    ComputePipelineDescriptor, ComputePipelineId, ComputeShaderId, FragmentVariant, Material,
    MaterialId, NativeHandle, RenderPipelineDescriptor, RenderPipelineId, ResourceError,
    ResourceId, ResourceState, ShaderError, ShaderModuleDescriptor, ShaderModuleId, ShaderSource,
    ShaderStage, SkipReason, TargetSignature, Topology, VertexVariant,
};
use std::collections::{BTreeMap, HashMap};

/// Identifies one pipeline object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub material: MaterialId,
    pub vertex: VertexVariant,
    pub fragment: FragmentVariant,
    pub signature: TargetSignature,
    pub topology: Topology,
}

#[derive(Debug, Default)]
struct MaterialPrograms {
    vertex: BTreeMap<VertexVariant, (ShaderModuleId, String)>,
    fragment: BTreeMap<FragmentVariant, (ShaderModuleId, String)>,
    pipelines: Vec<PipelineKey>,
}

impl MaterialPrograms {
    fn modules(&self) -> impl Iterator<Item = ShaderModuleId> + '_ {
        self.vertex
            .values()
            .chain(self.fragment.values())
            .map(|(module, _)| *module)
    }
}

#[derive(Debug, Default)]
pub(crate) struct PipelineCache {
    materials: HashMap<MaterialId, MaterialPrograms>,
    pipelines: HashMap<PipelineKey, RenderPipelineId>,
    compute: HashMap<ComputeShaderId, (ShaderModuleId, ComputePipelineId)>,
}

impl PipelineCache {
    /// Number of cached graphics pipelines.
    pub(crate) fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Compiles the material's modules if it is not `Ready`.
    pub(crate) fn ensure_material(
        &mut self,
        r: &mut Realizer<'_>,
        id: MaterialId,
        material: &Material,
    ) -> Result<(), SkipReason> {
        let rid = ResourceId::from(id);
        let (state, generation) = {
            let registry = r.registry.read();
            let lifecycle = registry.lifecycle(rid).ok_or(SkipReason::PipelineUnavailable)?;
            (lifecycle.state(), lifecycle.generation())
        };
        match state {
            ResourceState::Ready if self.materials.contains_key(&id) => return Ok(()),
            ResourceState::Ready | ResourceState::ToBeUpdated => {}
            _ => return Err(SkipReason::PipelineUnavailable),
        }

        self.evict(rid, r.retired);
        match compile_material(r, material) {
            Ok(programs) => {
                let handle = programs.modules().next().map(|m| NativeHandle::new(m.0));
                self.materials.insert(id, programs);
                log::debug!("Compiled shader modules of material '{}'", material.label);
                match handle {
                    Some(handle) => r.realized(rid, generation, handle),
                    None => {
                        r.failed(rid, &"the material declares no shader sources");
                        return Err(SkipReason::PipelineUnavailable);
                    }
                }
                Ok(())
            }
            Err(e) => {
                r.failed(rid, &e);
                Err(SkipReason::PipelineUnavailable)
            }
        }
    }

    /// Returns the pipeline for a draw, creating it on first use.
    pub(crate) fn pipeline(
        &mut self,
        r: &mut Realizer<'_>,
        id: MaterialId,
        material: &Material,
        vertex: VertexVariant,
        fragment: FragmentVariant,
        signature: &TargetSignature,
        topology: Topology,
    ) -> Result<RenderPipelineId, SkipReason> {
        self.ensure_material(r, id, material)?;
        let programs = self
            .materials
            .get_mut(&id)
            .ok_or(SkipReason::PipelineUnavailable)?;

        // Materials without a visibility program draw their regular one.
        let fragment = if programs.fragment.contains_key(&fragment) {
            fragment
        } else {
            FragmentVariant::Default
        };
        let key = PipelineKey {
            material: id,
            vertex,
            fragment,
            signature: signature.clone(),
            topology,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(*pipeline);
        }

        let (Some(vs), Some(fs)) = (programs.vertex.get(&vertex), programs.fragment.get(&fragment))
        else {
            let variant = if programs.vertex.contains_key(&vertex) {
                format!("{fragment:?} fragment")
            } else {
                format!("{vertex:?} vertex")
            };
            log::warn!(
                "{}",
                ShaderError::MissingVariant {
                    label: material.label.clone(),
                    variant,
                }
            );
            return Err(SkipReason::PipelineUnavailable);
        };

        let visibility = fragment == FragmentVariant::Visibility;
        let descriptor = RenderPipelineDescriptor {
            label: format!("{} {vertex:?}/{fragment:?}", material.label),
            vertex: vs.0,
            vertex_entry: vs.1.clone(),
            fragment: fs.0,
            fragment_entry: fs.1.clone(),
            vertex_variant: vertex,
            color_formats: signature.colors.clone(),
            depth_format: signature.depth,
            blend: if visibility {
                Default::default()
            } else {
                material.blend
            },
            depth_test: material.depth_test && signature.depth.is_some(),
            depth_write: (material.depth_write || visibility) && signature.depth.is_some(),
            cull_back_faces: !material.double_sided,
            topology,
        };
        match r.device.create_render_pipeline(&descriptor) {
            Ok(pipeline) => {
                log::debug!("Created pipeline '{}'", descriptor.label);
                r.stats.pipelines_created += 1;
                programs.pipelines.push(key.clone());
                self.pipelines.insert(key, pipeline);
                Ok(pipeline)
            }
            Err(e) => {
                log::error!("Failed to create pipeline '{}': {e}", descriptor.label);
                Err(SkipReason::PipelineUnavailable)
            }
        }
    }

    /// Returns the compute pipeline of a shader, compiling it if needed.
    pub(crate) fn compute_pipeline(
        &mut self,
        r: &mut Realizer<'_>,
        id: ComputeShaderId,
    ) -> Result<ComputePipelineId, SkipReason> {
        let rid = ResourceId::from(id);
        let unavailable = SkipReason::ResourceUnavailable(rid);
        let (state, generation, shader) = {
            let registry = r.registry.read();
            let lifecycle = registry.lifecycle(rid).ok_or(unavailable)?;
            (
                lifecycle.state(),
                lifecycle.generation(),
                registry.compute_shader(id).cloned(),
            )
        };
        match state {
            ResourceState::Ready => {
                if let Some((_, pipeline)) = self.compute.get(&id) {
                    return Ok(*pipeline);
                }
            }
            ResourceState::ToBeUpdated => {}
            _ => return Err(unavailable),
        }
        let shader = shader.ok_or(unavailable)?;
        self.evict(rid, r.retired);

        let module = match compile(r, &shader.label, ShaderStage::Compute, &shader.source) {
            Ok(module) => module,
            Err(e) => {
                r.failed(rid, &e);
                return Err(unavailable);
            }
        };
        let descriptor = ComputePipelineDescriptor {
            label: shader.label.clone(),
            module,
            entry_point: shader.source.entry_point.to_string(),
        };
        match r.device.create_compute_pipeline(&descriptor) {
            Ok(pipeline) => {
                r.stats.pipelines_created += 1;
                self.compute.insert(id, (module, pipeline));
                r.realized(rid, generation, NativeHandle::new(pipeline.0));
                Ok(pipeline)
            }
            Err(e) => {
                let _ = r.device.destroy_shader_module(module);
                r.failed(rid, &e);
                Err(unavailable)
            }
        }
    }

    /// Retires every module and pipeline built for `id`.
    pub(crate) fn evict(&mut self, id: ResourceId, retired: &mut Vec<GpuObject>) {
        match id {
            ResourceId::Material(id) => {
                let Some(programs) = self.materials.remove(&id) else {
                    return;
                };
                retired.extend(programs.modules().map(GpuObject::ShaderModule));
                for key in &programs.pipelines {
                    if let Some(pipeline) = self.pipelines.remove(key) {
                        retired.push(GpuObject::RenderPipeline(pipeline));
                    }
                }
                log::debug!(
                    "Evicted {} pipeline(s) of material#{}",
                    programs.pipelines.len(),
                    id.0
                );
            }
            ResourceId::ComputeShader(id) => {
                if let Some((module, pipeline)) = self.compute.remove(&id) {
                    retired.push(GpuObject::ShaderModule(module));
                    retired.push(GpuObject::ComputePipeline(pipeline));
                }
            }
            _ => {}
        }
    }

    /// Hands back every native object. Used at teardown.
    pub(crate) fn drain(&mut self) -> Vec<GpuObject> {
        let mut objects = Vec::new();
        let materials: Vec<MaterialId> = self.materials.keys().copied().collect();
        for material in materials {
            self.evict(material.into(), &mut objects);
        }
        let shaders: Vec<ComputeShaderId> = self.compute.keys().copied().collect();
        for shader in shaders {
            self.evict(shader.into(), &mut objects);
        }
        objects
    }
}

fn compile(
    r: &Realizer<'_>,
    label: &str,
    stage: ShaderStage,
    source: &ShaderSource,
) -> Result<ShaderModuleId, ResourceError> {
    r.device.create_shader_module(&ShaderModuleDescriptor {
        label,
        stage,
        source,
    })
}

fn compile_material(
    r: &Realizer<'_>,
    material: &Material,
) -> Result<MaterialPrograms, ResourceError> {
    let mut programs = MaterialPrograms::default();
    let result = (|| -> Result<(), ResourceError> {
        for (variant, source) in &material.sources.vertex {
            let module = compile(r, &material.label, ShaderStage::Vertex, source)?;
            programs
                .vertex
                .insert(*variant, (module, source.entry_point.to_string()));
        }
        for (variant, source) in &material.sources.fragment {
            let module = compile(r, &material.label, ShaderStage::Fragment, source)?;
            programs
                .fragment
                .insert(*variant, (module, source.entry_point.to_string()));
        }
        Ok(())
    })();
    match result {
        Ok(()) => Ok(programs),
        Err(e) => {
            // Nothing has used these yet.
            for module in programs.modules() {
                let _ = r.device.destroy_shader_module(module);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::{HeadlessDevice, ObjectKind};
    use prism_core::renderer::{
        BackendStats, BlendMode, ResourceRegistry, SharedRegistry, ShaderSources, TextureFormat,
    };

    fn sources(fragment: &str) -> ShaderSources {
        ShaderSources::simple(
            ShaderSource::text("vs", "vs_main"),
            ShaderSource::text(fragment, "fs_main"),
        )
    }

    fn signature() -> TargetSignature {
        TargetSignature {
            colors: vec![TextureFormat::Rgba8Unorm],
            depth: Some(TextureFormat::Depth32Float),
        }
    }

    fn lookup(
        cache: &mut PipelineCache,
        device: &HeadlessDevice,
        registry: &SharedRegistry,
        retired: &mut Vec<GpuObject>,
        id: MaterialId,
    ) -> Result<RenderPipelineId, SkipReason> {
        lookup_with(cache, device, registry, retired, id, Topology::Triangles)
    }

    fn lookup_with(
        cache: &mut PipelineCache,
        device: &HeadlessDevice,
        registry: &SharedRegistry,
        retired: &mut Vec<GpuObject>,
        id: MaterialId,
        topology: Topology,
    ) -> Result<RenderPipelineId, SkipReason> {
        let material = registry.read().material(id).cloned().unwrap();
        let mut stats = BackendStats::default();
        let mut r = Realizer {
            device,
            registry,
            retired,
            stats: &mut stats,
        };
        cache.pipeline(
            &mut r,
            id,
            &material,
            VertexVariant::Static,
            FragmentVariant::Default,
            &signature(),
            topology,
        )
    }

    #[test]
    fn identical_keys_share_a_pipeline_until_reload() {
        let device = HeadlessDevice::default();
        let registry = ResourceRegistry::shared();
        let mut retired = Vec::new();
        let mut cache = PipelineCache::default();
        let id = registry
            .write()
            .add_material(Material::new("lit", sources("fs"), BlendMode::Opaque));

        let first = lookup(&mut cache, &device, &registry, &mut retired, id).unwrap();
        let again = lookup(&mut cache, &device, &registry, &mut retired, id).unwrap();
        assert_eq!(first, again);
        assert_eq!(device.created(ObjectKind::RenderPipeline), 1);

        registry.write().reload_material(id, sources("fs v2")).unwrap();
        let reloaded = lookup(&mut cache, &device, &registry, &mut retired, id).unwrap();
        assert_ne!(first, reloaded);
        assert!(retired.contains(&GpuObject::RenderPipeline(first)));
        assert_eq!(retired.len(), 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn topology_selects_its_own_pipeline() {
        let device = HeadlessDevice::default();
        let registry = ResourceRegistry::shared();
        let mut retired = Vec::new();
        let mut cache = PipelineCache::default();
        let id = registry
            .write()
            .add_material(Material::new("wire", sources("fs"), BlendMode::Opaque));

        let triangles = lookup_with(
            &mut cache,
            &device,
            &registry,
            &mut retired,
            id,
            Topology::Triangles,
        )
        .unwrap();
        let lines =
            lookup_with(&mut cache, &device, &registry, &mut retired, id, Topology::Lines).unwrap();
        assert_ne!(triangles, lines);
        assert_eq!(device.created(ObjectKind::RenderPipeline), 2);
        assert_eq!(cache.len(), 2);

        let lines_again =
            lookup_with(&mut cache, &device, &registry, &mut retired, id, Topology::Lines).unwrap();
        assert_eq!(lines, lines_again);
    }

    #[test]
    fn compile_error_fails_the_material() {
        let device = HeadlessDevice::default();
        let registry = ResourceRegistry::shared();
        let mut retired = Vec::new();
        let mut cache = PipelineCache::default();
        let id = registry
            .write()
            .add_material(Material::new("broken", sources("#error"), BlendMode::Opaque));

        assert_eq!(
            lookup(&mut cache, &device, &registry, &mut retired, id),
            Err(SkipReason::PipelineUnavailable)
        );
        assert_eq!(registry.read().state(id), Some(ResourceState::Failed));
        // The vertex module compiled before the failure was released.
        assert_eq!(device.live(ObjectKind::ShaderModule), 0);

        registry.write().reload_material(id, sources("fixed")).unwrap();
        assert!(lookup(&mut cache, &device, &registry, &mut retired, id).is_ok());
    }
}
