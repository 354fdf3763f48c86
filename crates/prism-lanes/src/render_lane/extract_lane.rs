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

//! The lane that turns a scene into a [`RenderWorld`].

use super::world::{RenderWorld, DRAW_LAYERS};
use prism_core::math::{Aabb, Vec3};
use prism_core::renderer::{LayerMask, ResourceRegistry};
use prism_core::scene::{Camera, PostProcessSettings, PostProcessVolume, Renderable, SceneView};

/// Culls, partitions and sorts the scene for one frame.
///
/// Renderables land in the list of every layer their material instances
/// accept. Opaque, translucent, light and picking lists are frustum culled;
/// shadow casters are kept whole since they may shade what is visible, and
/// UI is screen-space. Every list is sorted by priority, then by distance to
/// the camera.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractLane;

impl ExtractLane {
    /// Creates the lane.
    pub fn new() -> Self {
        Self
    }

    /// Builds the world of the current frame.
    pub fn extract<'a>(
        &self,
        scene: &'a dyn SceneView,
        camera: &Camera,
        registry: &ResourceRegistry,
        viewport: (u32, u32),
    ) -> RenderWorld<'a> {
        let mut world = RenderWorld::new(*camera, viewport);
        let frustum = camera.frustum();

        for renderable in scene.renderables() {
            let layers = Self::layers_of(renderable, registry);
            if layers.is_empty() {
                continue;
            }
            let visible = frustum.intersects_aabb(&renderable.bounds());
            for layer in DRAW_LAYERS {
                if !layers.contains(layer) {
                    continue;
                }
                let culled = !matches!(layer, LayerMask::SHADOWCAST | LayerMask::UI);
                if culled && !visible {
                    continue;
                }
                world.push(layer, renderable);
            }
        }

        for light in scene.lights() {
            let visible = light
                .bounds()
                .map_or(true, |bounds| frustum.intersects_aabb(&bounds));
            if visible {
                world.lights.push(*light);
            }
        }

        let origin = camera.position;
        for layer in DRAW_LAYERS {
            if let Some(list) = world.list_mut(layer) {
                list.sort_by(|a, b| {
                    a.priority().cmp(&b.priority()).then_with(|| {
                        distance(&a.bounds(), origin).total_cmp(&distance(&b.bounds(), origin))
                    })
                });
            }
        }

        world.settings = Self::mix_settings(scene.post_process_volumes(), camera);
        log::trace!("Extracted {world:?}");
        world
    }

    /// Mixes the volumes affecting the camera into the default settings,
    /// in ascending priority.
    pub fn mix_settings(volumes: &[PostProcessVolume], camera: &Camera) -> PostProcessSettings {
        let mut active: Vec<&PostProcessVolume> = volumes
            .iter()
            .filter(|v| v.affects(camera.position, camera.near))
            .collect();
        active.sort_by_key(|v| v.priority);

        let mut settings = PostProcessSettings::default();
        for volume in active {
            settings.lerp(&volume.settings, volume.blend_weight);
        }
        settings
    }

    fn layers_of(renderable: &dyn Renderable, registry: &ResourceRegistry) -> LayerMask {
        renderable
            .materials()
            .iter()
            .filter_map(|id| registry.instance(*id))
            .filter_map(|instance| registry.material(instance.material))
            .fold(LayerMask::empty(), |acc, material| acc | material.layers)
    }
}

fn distance(bounds: &Aabb, origin: Vec3) -> f32 {
    bounds.center().distance_squared(origin)
}
