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

//! The shadow map lane: renders shadow casters into the atlas tiles of
//! every shadow casting light.

use super::error::TaskError;
use super::resources::TaskResources;
use super::shadow_atlas::ShadowProjection;
use super::slots::{self, TaskSlots};
use super::{PipelineTask, TaskFrame};
use prism_core::config::ShadowConfig;
use prism_core::math::{Frustum, Mat4, Vec3, Vec4};
use prism_core::renderer::{
    LayerMask, RenderTarget, RenderTargetId, SharedRegistry, Texture, TextureFormat, TextureId,
};
use prism_core::scene::{Camera, Light, LightKind};
use std::f32::consts::{FRAC_PI_2, PI};

/// Blend between uniform and logarithmic cascade splits.
const SPLIT_WEIGHT: f32 = 0.95;
/// Near plane of local light projections.
const LOCAL_NEAR: f32 = 0.1;

/// Cube face directions and up vectors, in cube map order.
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

#[derive(Debug, Clone, Copy)]
struct LightView {
    view: Mat4,
    projection: Mat4,
}

#[derive(Debug, Clone)]
struct ShadowPlan {
    lod: u32,
    views: Vec<LightView>,
    plane_distance: Vec4,
}

/// Renders the depth of shadow casters from each light into the atlas.
///
/// Directional lights get one LOD 0 tile per cascade. Point and area lights
/// get six cube faces and spot lights one tile, at a LOD that grows with the
/// distance to the camera.
#[derive(Debug)]
pub struct ShadowMapLane {
    slots: TaskSlots,
    resources: TaskResources,
    depth: TextureId,
    target: RenderTargetId,
    max_lods: u32,
}

impl ShadowMapLane {
    /// Declares the atlas depth surface.
    pub fn new(registry: &SharedRegistry, config: &ShadowConfig) -> Self {
        let mut resources = TaskResources::new(registry);
        let depth = resources.fixed_texture(Texture::render(
            slots::SHADOW_MAP,
            config.atlas_size,
            config.atlas_size,
            TextureFormat::Depth32Float,
        ));
        let target = resources.target(RenderTarget::new("shadowAtlas").with_depth(depth));
        Self {
            slots: TaskSlots::new().with_output(slots::SHADOW_MAP),
            resources,
            depth,
            target,
            max_lods: config.lod_count(),
        }
    }

    /// The atlas depth texture.
    pub fn depth_texture(&self) -> TextureId {
        self.depth
    }

    fn plan(&self, light: &Light, camera: &Camera) -> ShadowPlan {
        match light.kind {
            LightKind::Directional { direction } => directional_plan(direction, camera, light.shadow_tile_count()),
            LightKind::Point { radius } | LightKind::Area { radius, .. } => {
                let projection = Mat4::perspective_rh(FRAC_PI_2, 1.0, LOCAL_NEAR, far_plane(radius));
                let views = CUBE_FACES
                    .iter()
                    .map(|(dir, up)| LightView {
                        view: Mat4::look_at_rh(light.position, light.position + *dir, *up),
                        projection,
                    })
                    .collect();
                ShadowPlan {
                    lod: self.local_lod(light.position, radius, camera),
                    views,
                    plane_distance: Vec4::ZERO,
                }
            }
            LightKind::Spot {
                direction,
                radius,
                angle,
            } => {
                let dir = direction.normalize_or(Vec3::NEG_Z);
                ShadowPlan {
                    lod: self.local_lod(light.position, radius, camera),
                    views: vec![LightView {
                        view: Mat4::look_at_rh(light.position, light.position + dir, up_for(dir)),
                        projection: Mat4::perspective_rh(
                            angle.clamp(0.01, PI - 0.01),
                            1.0,
                            LOCAL_NEAR,
                            far_plane(radius),
                        ),
                    }],
                    plane_distance: Vec4::ZERO,
                }
            }
        }
    }

    /// LOD 1 up close, one level coarser per doubling of distance.
    fn local_lod(&self, position: Vec3, radius: f32, camera: &Camera) -> u32 {
        let distance = position.distance(camera.position);
        let mut lod = 1;
        let mut reach = radius.max(LOCAL_NEAR) * 4.0;
        while distance > reach && lod + 1 < self.max_lods {
            lod += 1;
            reach *= 2.0;
        }
        lod.min(self.max_lods - 1)
    }
}

fn far_plane(radius: f32) -> f32 {
    radius.max(LOCAL_NEAR * 2.0)
}

fn up_for(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

/// Splits the camera frustum into `cascades` slices and fits an
/// orthographic light view around each.
fn directional_plan(direction: Vec3, camera: &Camera, cascades: u32) -> ShadowPlan {
    let dir = direction.normalize_or(Vec3::NEG_Y);
    let up = up_for(dir);
    let p = camera.projection;
    let fov_y = 2.0 * (1.0 / p.y_axis.y).atan();
    let aspect = if p.x_axis.x.abs() > f32::EPSILON {
        p.y_axis.y / p.x_axis.x
    } else {
        1.0
    };
    let (near, far) = (camera.near.max(f32::EPSILON), camera.far.max(camera.near + 1.0));
    let ratio = far / near;

    let mut plane_distance = Vec4::ZERO;
    let mut views = Vec::with_capacity(cascades as usize);
    let mut slice_near = near;
    for i in 0..cascades {
        let f = (i + 1) as f32 / cascades as f32;
        let log = near * ratio.powf(f);
        let uniform = near + (far - near) * f;
        let split = uniform + (log - uniform) * SPLIT_WEIGHT;
        if i < 4 {
            let clip = p * Vec4::new(0.0, 0.0, -split, 1.0);
            plane_distance[i as usize] = clip.z / clip.w;
        }

        let slice = Mat4::perspective_rh(fov_y, aspect, slice_near, split);
        let inverse = (slice * camera.view).inverse();
        let corners: Vec<Vec3> = [
            (-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0),
        ]
        .iter()
        .flat_map(|(x, y)| [0.0, 1.0].map(|z| inverse.project_point3(Vec3::new(*x, *y, z))))
        .collect();
        let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
        let radius = corners
            .iter()
            .map(|c| c.distance(center))
            .fold(0.0_f32, f32::max)
            .max(LOCAL_NEAR);

        views.push(LightView {
            view: Mat4::look_at_rh(center - dir * radius, center, up),
            projection: Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 2.0),
        });
        slice_near = split;
    }

    ShadowPlan {
        lod: 0,
        views,
        plane_distance,
    }
}

/// Maps shadow clip space to atlas texture space.
fn clip_to_texture() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0)) * Mat4::from_scale(Vec3::new(0.5, -0.5, 1.0))
}

impl PipelineTask for ShadowMapLane {
    fn name(&self) -> &'static str {
        "ShadowMap"
    }

    fn slots(&self) -> &TaskSlots {
        &self.slots
    }

    fn slots_mut(&mut self) -> &mut TaskSlots {
        &mut self.slots
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), TaskError> {
        // The atlas keeps its size whatever the viewport.
        self.resources.resize(width, height).map(|_| ())
    }

    fn exec(&mut self, frame: &mut TaskFrame<'_>) -> Result<(), TaskError> {
        let world = frame.world;
        frame.atlas.begin_frame();
        frame.buffer.set_render_target(self.target, 0)?;

        let atlas_size = frame.atlas.size();
        let to_texture = clip_to_texture();
        for light in world.lights.iter().filter(|l| l.casts_shadows) {
            let plan = self.plan(light, &world.camera);
            let Some(tiles) = frame.atlas.request(light.id, plan.lod, plan.views.len() as u32) else {
                log::warn!("No room in the shadow atlas for light {}, drawing it unshadowed", light.id);
                continue;
            };

            let mut projection = ShadowProjection {
                matrices: Vec::with_capacity(tiles.len()),
                tiles: Vec::with_capacity(tiles.len()),
                plane_distance: plan.plane_distance,
            };
            for (tile, view) in tiles.iter().zip(&plan.views) {
                let rect = tile.rect();
                frame.buffer.set_viewport(rect.x, rect.y, rect.width, rect.height);
                frame.buffer.clear_render_target(false, Vec4::ZERO, true, 1.0);
                frame.buffer.set_view_projection(view.view, view.projection);

                let view_projection = view.projection * view.view;
                let frustum = Frustum::from_view_projection(&view_projection);
                for caster in world.renderables(LayerMask::SHADOWCAST) {
                    if frustum.intersects_aabb(&caster.bounds()) {
                        caster.draw(frame.buffer, LayerMask::SHADOWCAST);
                    }
                }
                projection.matrices.push(to_texture * view_projection);
                projection.tiles.push(tile.uv(atlas_size));
            }
            frame.atlas.publish(light.id, projection);
        }

        frame.buffer.set_global_texture(slots::SHADOW_MAP, self.depth);
        frame.reset_camera();
        self.slots.set_output(slots::SHADOW_MAP, Some(self.depth));
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::ResourceRegistry;

    fn camera() -> Camera {
        Camera::perspective(Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO, 1.0, 16.0 / 9.0, 0.1, 100.0)
    }

    #[test]
    fn directional_light_gets_one_view_per_cascade() {
        let plan = directional_plan(Vec3::new(0.3, -1.0, 0.2), &camera(), 4);
        assert_eq!(plan.lod, 0);
        assert_eq!(plan.views.len(), 4);
        // Splits grow with distance.
        let d = plan.plane_distance;
        assert!(d.x < d.y && d.y < d.z && d.z < d.w, "{d:?}");
    }

    #[test]
    fn local_lights_coarsen_with_distance() {
        let registry = ResourceRegistry::shared();
        let lane = ShadowMapLane::new(&registry, &ShadowConfig::default());
        let cam = camera();

        let near = Light::point(1, cam.position + Vec3::X, 1.0);
        let far = Light::point(2, cam.position + Vec3::X * 60.0, 1.0);
        let near_plan = lane.plan(&near, &cam);
        let far_plan = lane.plan(&far, &cam);

        assert_eq!(near_plan.views.len(), 6);
        assert_eq!(near_plan.lod, 1);
        assert!(far_plan.lod > near_plan.lod);
        assert!(far_plan.lod < ShadowConfig::default().max_lods);
    }

    #[test]
    fn atlas_surface_is_fixed_size() {
        let registry = ResourceRegistry::shared();
        let mut lane = ShadowMapLane::new(&registry, &ShadowConfig::default());
        lane.resize(1920, 1080).unwrap();

        let depth = lane.depth_texture();
        let texture = registry.read().texture(depth).cloned().unwrap();
        assert_eq!((texture.width, texture.height), (4096, 4096));
        assert!(texture.format.is_depth());
    }
}
