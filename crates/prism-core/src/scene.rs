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

//! The scene interface the pipeline renders from.
//!
//! The scene graph itself belongs to the host. The pipeline only needs a
//! [`SceneView`]: something that can list renderables, lights and
//! post-process volumes for one frame. [`Scene`] is a plain implementation
//! for hosts without a scene graph of their own, and for tests.

use crate::math::{Aabb, Frustum, Mat4, Vec3, Vec4};
use crate::renderer::api::{LayerMask, MaterialInstanceId, MeshId};
use crate::renderer::traits::{CommandBuffer, DrawOutcome};

/// The viewpoint a frame is rendered from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World-to-view transform.
    pub view: Mat4,
    /// View-to-clip transform, `[0, 1]` depth range.
    pub projection: Mat4,
    /// Eye position in world space.
    pub position: Vec3,
    /// Point the camera looks at.
    pub target: Vec3,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
    /// Color the scene buffers are cleared to.
    pub clear_color: Vec4,
}

impl Camera {
    /// A right-handed perspective camera looking from `position` at `target`.
    pub fn perspective(
        position: Vec3,
        target: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            view: Mat4::look_at_rh(position, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
            position,
            target,
            near,
            far,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
        }
    }

    /// Projection followed by view.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// The culling volume of the camera.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// Rebuilds the projection for a new aspect ratio, keeping the vertical
    /// field of view encoded in the current matrix.
    pub fn set_aspect(&mut self, aspect: f32) {
        let fov_y = 2.0 * (1.0 / self.projection.y_axis.y).atan();
        self.projection = Mat4::perspective_rh(fov_y, aspect, self.near, self.far);
    }
}

/// Anything that can draw itself into the pipeline.
pub trait Renderable: Send + Sync {
    /// World-space bounds, used for culling and sorting.
    fn bounds(&self) -> Aabb;

    /// The material instances the renderable draws with. Their materials'
    /// layer masks decide which passes see the renderable.
    fn materials(&self) -> &[MaterialInstanceId];

    /// Sort key, lower draws first.
    fn priority(&self) -> i32 {
        0
    }

    /// Issues the draws of this renderable for `layer`.
    fn draw(&self, buffer: &mut dyn CommandBuffer, layer: LayerMask);
}

/// A mesh drawn with one material instance per submesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRenderable {
    /// Object-to-world transform.
    pub transform: Mat4,
    /// The mesh.
    pub mesh: MeshId,
    /// Object-space bounds of the mesh.
    pub local_bounds: Aabb,
    /// Instances by submesh. The last one is reused for extra submeshes.
    pub materials: Vec<MaterialInstanceId>,
    /// Submeshes to draw.
    pub submeshes: usize,
    /// Sort key.
    pub priority: i32,
}

impl MeshRenderable {
    /// A single-submesh renderable.
    pub fn new(mesh: MeshId, local_bounds: Aabb, material: MaterialInstanceId) -> Self {
        Self {
            transform: Mat4::IDENTITY,
            mesh,
            local_bounds,
            materials: vec![material],
            submeshes: 1,
            priority: 0,
        }
    }

    /// Moves the renderable.
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

impl Renderable for MeshRenderable {
    fn bounds(&self) -> Aabb {
        self.local_bounds.transform(&self.transform)
    }

    fn materials(&self) -> &[MaterialInstanceId] {
        &self.materials
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn draw(&self, buffer: &mut dyn CommandBuffer, layer: LayerMask) {
        for submesh in 0..self.submeshes {
            let Some(instance) = self
                .materials
                .get(submesh)
                .or_else(|| self.materials.last())
            else {
                return;
            };
            if let DrawOutcome::Skipped(reason) =
                buffer.draw_mesh(self.transform, self.mesh, submesh, layer, *instance)
            {
                log::trace!("Submesh {submesh} of {:?} skipped: {reason}", self.mesh);
            }
        }
    }
}

/// The shape of a light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Infinitely distant, parallel rays along `direction`.
    Directional {
        /// Direction the light travels.
        direction: Vec3,
    },
    /// Omnidirectional within `radius`.
    Point {
        /// Range of influence.
        radius: f32,
    },
    /// A cone along `direction`.
    Spot {
        /// Direction the cone opens towards.
        direction: Vec3,
        /// Range of influence.
        radius: f32,
        /// Full opening angle in radians.
        angle: f32,
    },
    /// An emitting rectangle, shadowed like a point light.
    Area {
        /// Range of influence.
        radius: f32,
        /// Half extents of the rectangle.
        size: Vec3,
    },
}

/// A light source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Stable identity, used to key shadow atlas tiles across frames.
    pub id: u64,
    /// Shape.
    pub kind: LightKind,
    /// World position (ignored for directional lights).
    pub position: Vec3,
    /// Linear RGB color, alpha unused.
    pub color: Vec4,
    /// Brightness multiplier.
    pub intensity: f32,
    /// Whether the light requests shadow tiles.
    pub casts_shadows: bool,
}

impl Light {
    /// A shadow-casting directional light.
    pub fn directional(id: u64, direction: Vec3) -> Self {
        Self {
            id,
            kind: LightKind::Directional {
                direction: direction.normalize_or_zero(),
            },
            position: Vec3::ZERO,
            color: Vec4::ONE,
            intensity: 1.0,
            casts_shadows: true,
        }
    }

    /// A shadow-casting point light.
    pub fn point(id: u64, position: Vec3, radius: f32) -> Self {
        Self {
            id,
            kind: LightKind::Point { radius },
            position,
            color: Vec4::ONE,
            intensity: 1.0,
            casts_shadows: true,
        }
    }

    /// Shadow tiles the light needs: six cube faces for point and area
    /// lights, one per cascade for directional lights, one for spots.
    pub fn shadow_tile_count(&self) -> u32 {
        match self.kind {
            LightKind::Directional { .. } => 4,
            LightKind::Point { .. } | LightKind::Area { .. } => 6,
            LightKind::Spot { .. } => 1,
        }
    }

    /// World-space bounds of the lit volume. `None` for unbounded lights.
    pub fn bounds(&self) -> Option<Aabb> {
        match self.kind {
            LightKind::Directional { .. } => None,
            LightKind::Point { radius }
            | LightKind::Spot { radius, .. }
            | LightKind::Area { radius, .. } => Some(Aabb::from_center_half_extents(
                self.position,
                Vec3::splat(radius),
            )),
        }
    }
}

/// Tunable values of the post-process chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessSettings {
    /// Ambient light intensity fed to the lighting pass.
    pub ambient_intensity: f32,
    /// Sampling radius of ambient occlusion.
    pub ao_radius: f32,
    /// Depth bias of ambient occlusion.
    pub ao_bias: f32,
    /// Contrast exponent of ambient occlusion.
    pub ao_power: f32,
    /// Luminance above which pixels bloom.
    pub bloom_threshold: f32,
    /// Depth-of-field focus distance.
    pub dof_focus_distance: f32,
    /// Depth-of-field focus falloff.
    pub dof_focus_scale: f32,
    /// Depth-of-field blur radius in pixels.
    pub dof_blur_size: f32,
    /// Depth beyond which pixels count as sky.
    pub dof_sky_distance: f32,
    /// Exposure applied before tonemapping.
    pub exposure: f32,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            ambient_intensity: 0.1,
            ao_radius: 0.2,
            ao_bias: 0.025,
            ao_power: 2.0,
            bloom_threshold: 1.0,
            dof_focus_distance: 1.0,
            dof_focus_scale: 10.0,
            dof_blur_size: 20.0,
            dof_sky_distance: 100_000.0,
            exposure: 1.0,
        }
    }
}

impl PostProcessSettings {
    /// Moves every value towards `other` by `weight` in `[0, 1]`.
    pub fn lerp(&mut self, other: &PostProcessSettings, weight: f32) {
        let t = weight.clamp(0.0, 1.0);
        let mix = |a: &mut f32, b: f32| *a += (b - *a) * t;
        mix(&mut self.ambient_intensity, other.ambient_intensity);
        mix(&mut self.ao_radius, other.ao_radius);
        mix(&mut self.ao_bias, other.ao_bias);
        mix(&mut self.ao_power, other.ao_power);
        mix(&mut self.bloom_threshold, other.bloom_threshold);
        mix(&mut self.dof_focus_distance, other.dof_focus_distance);
        mix(&mut self.dof_focus_scale, other.dof_focus_scale);
        mix(&mut self.dof_blur_size, other.dof_blur_size);
        mix(&mut self.dof_sky_distance, other.dof_sky_distance);
        mix(&mut self.exposure, other.exposure);
    }
}

/// A region of space that overrides post-process settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcessVolume {
    /// The region. Ignored when `unbound`.
    pub bounds: Aabb,
    /// Applies everywhere.
    pub unbound: bool,
    /// How strongly the settings are mixed in.
    pub blend_weight: f32,
    /// Volumes are mixed in ascending priority.
    pub priority: i32,
    /// The settings mixed in.
    pub settings: PostProcessSettings,
}

impl PostProcessVolume {
    /// Returns `true` if a camera at `position` with the given near plane
    /// is affected by the volume.
    pub fn affects(&self, position: Vec3, near: f32) -> bool {
        if self.unbound {
            return true;
        }
        let closest = position.clamp(self.bounds.min, self.bounds.max);
        closest.distance_squared(position) <= near * near
    }
}

/// What the pipeline reads from the scene each frame.
pub trait SceneView {
    /// Every renderable, before culling.
    fn renderables(&self) -> Vec<&dyn Renderable>;

    /// Every light, before culling.
    fn lights(&self) -> &[Light];

    /// Every post-process volume.
    fn post_process_volumes(&self) -> &[PostProcessVolume] {
        &[]
    }
}

/// A flat list scene.
#[derive(Default)]
pub struct Scene {
    /// Renderables.
    pub renderables: Vec<Box<dyn Renderable>>,
    /// Lights.
    pub lights: Vec<Light>,
    /// Post-process volumes.
    pub volumes: Vec<PostProcessVolume>,
}

impl Scene {
    /// An empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a renderable.
    pub fn add(&mut self, renderable: impl Renderable + 'static) -> &mut Self {
        self.renderables.push(Box::new(renderable));
        self
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("renderables", &self.renderables.len())
            .field("lights", &self.lights)
            .field("volumes", &self.volumes)
            .finish()
    }
}

impl SceneView for Scene {
    fn renderables(&self) -> Vec<&dyn Renderable> {
        self.renderables.iter().map(|r| r.as_ref()).collect()
    }

    fn lights(&self) -> &[Light] {
        &self.lights
    }

    fn post_process_volumes(&self) -> &[PostProcessVolume] {
        &self.volumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lerp_moves_halfway() {
        let mut base = PostProcessSettings::default();
        let target = PostProcessSettings {
            exposure: 3.0,
            ..PostProcessSettings::default()
        };
        base.lerp(&target, 0.5);
        assert_relative_eq!(base.exposure, 2.0);
        assert_relative_eq!(base.ao_radius, 0.2);
    }

    #[test]
    fn bounded_volumes_require_proximity() {
        let volume = PostProcessVolume {
            bounds: Aabb::from_min_max(Vec3::ZERO, Vec3::ONE),
            unbound: false,
            blend_weight: 1.0,
            priority: 0,
            settings: PostProcessSettings::default(),
        };
        assert!(volume.affects(Vec3::splat(0.5), 0.1));
        assert!(volume.affects(Vec3::new(1.05, 0.5, 0.5), 0.1));
        assert!(!volume.affects(Vec3::new(5.0, 0.5, 0.5), 0.1));
    }

    #[test]
    fn shadow_tiles_per_light_kind() {
        assert_eq!(Light::directional(1, Vec3::NEG_Y).shadow_tile_count(), 4);
        assert_eq!(Light::point(2, Vec3::ZERO, 5.0).shadow_tile_count(), 6);
    }

    #[test]
    fn camera_aspect_keeps_field_of_view() {
        let mut camera = Camera::perspective(Vec3::Z * 5.0, Vec3::ZERO, 1.0, 1.0, 0.1, 100.0);
        camera.set_aspect(2.0);
        let expected = Mat4::perspective_rh(1.0, 2.0, 0.1, 100.0);
        assert_relative_eq!(camera.projection.x_axis.x, expected.x_axis.x, epsilon = 1e-5);
    }
}
