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

//! The deferred lighting lane: accumulates every light into the emissive
//! buffer.

use super::error::TaskError;
use super::resources::TaskResources;
use super::shaders;
use super::slots::{self, TaskSlots};
use super::{PipelineTask, TaskFrame};
use prism_core::math::{Mat4, Quat, Vec3, Vec4};
use prism_core::renderer::{
    BlendMode, DrawOutcome, LayerMask, Material, MaterialId, MaterialInstanceId, RenderTarget,
    RenderTargetId, ShaderLibrary, ShaderSources, SharedRegistry, UniformValue,
};
use prism_core::scene::{Light, LightKind};
use std::collections::{HashMap, HashSet};

const MATRIX_PARAMS: [&str; 6] = ["matrix0", "matrix1", "matrix2", "matrix3", "matrix4", "matrix5"];
const TILE_PARAMS: [&str; 6] = ["tile0", "tile1", "tile2", "tile3", "tile4", "tile5"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LightClass {
    Directional,
    Point,
    Spot,
    Area,
}

impl LightClass {
    const ALL: [LightClass; 4] = [
        LightClass::Directional,
        LightClass::Point,
        LightClass::Spot,
        LightClass::Area,
    ];

    fn of(kind: &LightKind) -> Self {
        match kind {
            LightKind::Directional { .. } => LightClass::Directional,
            LightKind::Point { .. } => LightClass::Point,
            LightKind::Spot { .. } => LightClass::Spot,
            LightKind::Area { .. } => LightClass::Area,
        }
    }

    fn program(self) -> &'static str {
        match self {
            LightClass::Directional => shaders::LIGHT_DIRECTIONAL,
            LightClass::Point => shaders::LIGHT_POINT,
            LightClass::Spot => shaders::LIGHT_SPOT,
            LightClass::Area => shaders::LIGHT_AREA,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

fn light_material(label: &str, sources: ShaderSources) -> Material {
    let mut material = Material::new(label, sources, BlendMode::Additive).with_layers(LayerMask::LIGHT);
    material.double_sided = true;
    material.depth_write = false;
    let material = material
        .with_param("position", Vec4::ZERO)
        .with_param("direction", Vec4::ZERO)
        .with_param("color", Vec4::ONE)
        .with_param("params", Vec4::ZERO)
        .with_param("planeDistance", Vec4::ZERO)
        .with_param("shadows", 0);
    let material = MATRIX_PARAMS
        .iter()
        .fold(material, |m, name| m.with_param(*name, Mat4::IDENTITY));
    TILE_PARAMS
        .iter()
        .fold(material, |m, name| m.with_param(*name, Vec4::ZERO))
        .with_texture(slots::NORMALS_MAP, None)
        .with_texture(slots::DIFFUSE_MAP, None)
        .with_texture(slots::PARAMS_MAP, None)
        .with_texture(slots::DEPTH_MAP, None)
        .with_texture(slots::SHADOW_MAP, None)
}

/// Draws one additive volume per light into the emissive buffer, then the
/// LIGHT layer of the scene.
///
/// Directional lights cover the screen with the quad. Point, spot and area
/// lights draw the unit cube scaled to their radius. Each light keeps its
/// own material instance for as long as it stays visible.
#[derive(Debug)]
pub struct DeferredLightingLane {
    slots: TaskSlots,
    resources: TaskResources,
    target: RenderTargetId,
    materials: [Option<MaterialId>; 4],
    instances: HashMap<u64, (LightClass, MaterialInstanceId)>,
}

impl DeferredLightingLane {
    /// Declares one material per light kind the library has a program for.
    pub fn new(registry: &SharedRegistry, library: &dyn ShaderLibrary) -> Self {
        let mut resources = TaskResources::new(registry);
        let target = resources.target(RenderTarget::new("lightAccumulation"));
        let materials = LightClass::ALL.map(|class| {
            resources.declare_material(library, class.program(), |sources| {
                light_material(class.program(), sources)
            })
        });
        Self {
            slots: TaskSlots::new()
                .with_input(slots::EMISSIVE_MAP)
                .with_input(slots::DEPTH_MAP)
                .with_output(slots::EMISSIVE_MAP)
                .with_output(slots::SCENE_COLOR),
            resources,
            target,
            materials,
            instances: HashMap::new(),
        }
    }

    /// Number of lights holding a material instance.
    pub fn cached_lights(&self) -> usize {
        self.instances.len()
    }

    fn instance_for(&mut self, light: &Light) -> Option<MaterialInstanceId> {
        let class = LightClass::of(&light.kind);
        match self.instances.get(&light.id) {
            Some((cached, instance)) if *cached == class => return Some(*instance),
            Some((_, instance)) => {
                let instance = *instance;
                self.resources.release_instance(instance);
                self.instances.remove(&light.id);
            }
            None => {}
        }
        let material = self.materials[class.index()]?;
        let instance = self.resources.instance(material)?;
        self.instances.insert(light.id, (class, instance));
        Some(instance)
    }

    fn release_unseen(&mut self, seen: &HashSet<u64>) {
        let stale: Vec<_> = self
            .instances
            .iter()
            .filter(|(id, _)| !seen.contains(id))
            .map(|(id, (_, instance))| (*id, *instance))
            .collect();
        for (id, instance) in stale {
            self.instances.remove(&id);
            self.resources.release_instance(instance);
        }
    }
}

fn light_params(light: &Light, frame: &TaskFrame<'_>) -> Vec<(&'static str, UniformValue)> {
    let (direction, radius, cone) = match light.kind {
        LightKind::Directional { direction } => (direction, 0.0, 0.0),
        LightKind::Point { radius } => (Vec3::ZERO, radius, 0.0),
        LightKind::Spot {
            direction,
            radius,
            angle,
        } => (direction, radius, (angle * 0.5).cos()),
        LightKind::Area { radius, size } => (size, radius, 0.0),
    };
    let mut params = vec![
        ("position", UniformValue::from(light.position.extend(1.0))),
        ("direction", UniformValue::from(direction.extend(0.0))),
        ("color", UniformValue::from(light.color)),
        (
            "params",
            UniformValue::from(Vec4::new(radius, light.intensity, cone, 0.0)),
        ),
    ];

    let projection = light
        .casts_shadows
        .then(|| frame.atlas.projection(light.id))
        .flatten();
    let count = projection.map_or(0, |p| p.matrices.len());
    params.push(("shadows", UniformValue::Int(count as i32)));
    if let Some(projection) = projection {
        params.push(("planeDistance", projection.plane_distance.into()));
        for (name, matrix) in MATRIX_PARAMS.iter().zip(&projection.matrices) {
            params.push((*name, (*matrix).into()));
        }
        for (name, tile) in TILE_PARAMS.iter().zip(&projection.tiles) {
            params.push((*name, (*tile).into()));
        }
    }
    params
}

impl PipelineTask for DeferredLightingLane {
    fn name(&self) -> &'static str {
        "DeferredLighting"
    }

    fn slots(&self) -> &TaskSlots {
        &self.slots
    }

    fn slots_mut(&mut self) -> &mut TaskSlots {
        &mut self.slots
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), TaskError> {
        // The target follows its inputs, which the G-buffer resizes.
        self.resources.resize(width, height).map(|_| ())
    }

    fn exec(&mut self, frame: &mut TaskFrame<'_>) -> Result<(), TaskError> {
        let Some(emissive) = self.slots.input(slots::EMISSIVE_MAP) else {
            log::debug!("No emissive buffer wired, lighting passes through");
            self.slots.pass_through(slots::EMISSIVE_MAP);
            self.slots.set_output(slots::SCENE_COLOR, None);
            return Ok(());
        };
        let depth = self.slots.input(slots::DEPTH_MAP);
        self.resources.attach(self.target, Some(emissive), depth)?;

        let world = frame.world;
        frame.buffer.set_render_target(self.target, 0)?;
        frame.reset_camera();

        let mut seen = HashSet::with_capacity(world.lights.len());
        for light in &world.lights {
            seen.insert(light.id);
            let Some(instance) = self.instance_for(light) else {
                continue;
            };
            self.resources.set_params(instance, &light_params(light, frame))?;

            let outcome = match light.kind {
                LightKind::Directional { .. } => {
                    frame.screen_projection();
                    let outcome =
                        frame
                            .buffer
                            .draw_mesh(Mat4::IDENTITY, frame.quad, 0, LayerMask::LIGHT, instance);
                    frame.reset_camera();
                    outcome
                }
                LightKind::Point { radius }
                | LightKind::Spot { radius, .. }
                | LightKind::Area { radius, .. } => {
                    let model = Mat4::from_scale_rotation_translation(
                        Vec3::splat(radius * 2.0),
                        Quat::IDENTITY,
                        light.position,
                    );
                    frame
                        .buffer
                        .draw_mesh(model, frame.cube, 0, LayerMask::LIGHT, instance)
                }
            };
            if let DrawOutcome::Skipped(reason) = outcome {
                log::trace!("Light {} skipped: {reason}", light.id);
            }
        }
        self.release_unseen(&seen);

        world.draw_layer(frame.buffer, LayerMask::LIGHT);

        self.slots.set_output(slots::EMISSIVE_MAP, Some(emissive));
        self.slots.set_output(slots::SCENE_COLOR, Some(emissive));
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::{InMemoryShaderLibrary, ResourceRegistry, ResourceState, ShaderSource};

    fn library() -> InMemoryShaderLibrary {
        let sources = ShaderSources::simple(
            ShaderSource::text("light vs", "vs_main"),
            ShaderSource::text("light fs", "fs_main"),
        );
        let mut library = InMemoryShaderLibrary::new();
        library
            .insert(shaders::LIGHT_POINT, sources.clone())
            .insert(shaders::LIGHT_DIRECTIONAL, sources);
        library
    }

    #[test]
    fn light_materials_are_additive_in_the_light_layer() {
        let registry = ResourceRegistry::shared();
        let lane = DeferredLightingLane::new(&registry, &library());

        let point = lane.materials[LightClass::Point.index()].unwrap();
        let registry = registry.read();
        let material = registry.material(point).unwrap();
        assert_eq!(material.blend, BlendMode::Additive);
        assert_eq!(material.layers, LayerMask::LIGHT);
        assert!(!material.depth_write);
        assert!(material.param_index("matrix5").is_some());
        // Spot and area programs are missing from the library.
        assert!(lane.materials[LightClass::Spot.index()].is_none());
        assert!(lane.materials[LightClass::Area.index()].is_none());
    }

    #[test]
    fn instances_follow_the_visible_lights() {
        let registry = ResourceRegistry::shared();
        let mut lane = DeferredLightingLane::new(&registry, &library());

        let first = lane.instance_for(&Light::point(1, Vec3::ZERO, 2.0)).unwrap();
        let again = lane.instance_for(&Light::point(1, Vec3::ONE, 2.0)).unwrap();
        assert_eq!(first, again);
        lane.instance_for(&Light::directional(2, Vec3::NEG_Y)).unwrap();
        assert_eq!(lane.cached_lights(), 2);

        lane.release_unseen(&HashSet::from([2]));
        assert_eq!(lane.cached_lights(), 1);
        let state = registry.read().lifecycle(first).map(|l| l.state());
        assert!(matches!(
            state,
            Some(ResourceState::Unloading | ResourceState::ToBeDeleted)
        ));
    }
}
