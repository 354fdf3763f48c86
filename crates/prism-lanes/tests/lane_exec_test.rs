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

use prism_core::config::ShadowConfig;
use prism_core::math::Vec3;
use prism_core::renderer::{
    BackendKind, GraphicsDevice, InMemoryShaderLibrary, Mesh, RenderBackend, ResourceRegistry,
    ShaderSource, ShaderSources, SharedRegistry, Texture, TextureFormat, TextureId,
};
use prism_core::scene::{Camera, Light};
use prism_core::RendererConfig;
use prism_infra::{create_backend, BackendContext, HeadlessDevice};
use prism_lanes::render_lane::{
    shaders, slots, RenderWorld, ShadowAtlas, ShadowMapLane, TonemapLane,
};
use prism_lanes::{PipelineTask, TaskFrame};
use std::sync::Arc;

const SIZE: (u32, u32) = (256, 128);

fn backend() -> (SharedRegistry, Box<dyn RenderBackend>) {
    prism_infra::logging::init_for_tests();
    let config = RendererConfig {
        width: SIZE.0,
        height: SIZE.1,
        strict_validation: false,
        ..RendererConfig::default()
    };
    let device: Arc<dyn GraphicsDevice> = Arc::new(HeadlessDevice::new(SIZE.0, SIZE.1));
    let registry = ResourceRegistry::shared();
    let backend = create_backend(
        BackendKind::Explicit,
        BackendContext::new(device, registry.clone(), config),
    )
    .expect("headless backends always initialize");
    (registry, backend)
}

fn library(programs: &[&str]) -> InMemoryShaderLibrary {
    let mut library = InMemoryShaderLibrary::new();
    for name in programs {
        library.insert(
            *name,
            ShaderSources::simple(
                ShaderSource::text(format!("// {name}"), "vs_main"),
                ShaderSource::text(format!("// {name}"), "fs_main"),
            ),
        );
    }
    library
}

fn hdr_input(registry: &SharedRegistry) -> TextureId {
    registry.write().add_texture(Texture::render(
        "hdrInput",
        SIZE.0,
        SIZE.1,
        TextureFormat::Rgba16Float,
    ))
}

/// Runs `task` once inside a frame.
fn exec(registry: &SharedRegistry, backend: &mut dyn RenderBackend, task: &mut dyn PipelineTask) {
    let mut atlas = ShadowAtlas::new(ShadowConfig::default());
    exec_lit(registry, backend, task, Vec::new(), &mut atlas);
}

/// Runs `task` once inside a frame lit by `lights`.
fn exec_lit(
    registry: &SharedRegistry,
    backend: &mut dyn RenderBackend,
    task: &mut dyn PipelineTask,
    lights: Vec<Light>,
    atlas: &mut ShadowAtlas,
) {
    let camera = Camera::perspective(Vec3::Z * 3.0, Vec3::ZERO, 1.0, 2.0, 0.1, 50.0);
    let mut world = RenderWorld::new(camera, SIZE);
    world.lights = lights;
    let (quad, cube) = {
        let mut registry = registry.write();
        (
            registry.add_mesh(Mesh::fullscreen_quad()),
            registry.add_mesh(Mesh::unit_cube()),
        )
    };

    backend.begin_frame().unwrap();
    {
        let mut frame = TaskFrame {
            buffer: backend.command_buffer(),
            world: &world,
            atlas,
            quad,
            cube,
        };
        task.exec(&mut frame).unwrap();
    }
    backend.end_frame().unwrap();
}

#[test]
fn test_tonemap_writes_its_own_result() {
    // --- 1. ARRANGE ---
    let (registry, mut backend) = backend();
    let input = hdr_input(&registry);
    let mut lane = TonemapLane::new(&registry, &library(&[shaders::TONEMAP]));
    lane.resize(SIZE.0, SIZE.1).unwrap();
    lane.set_input(0, Some(input));

    // --- 2. ACT ---
    exec(&registry, backend.as_mut(), &mut lane);

    // --- 3. ASSERT ---
    let output = lane.slots().output(slots::SCENE_COLOR).unwrap();
    assert_eq!(output, lane.result());
    assert_ne!(output, input);
    let registry = registry.read();
    let result = registry.texture(output).unwrap();
    assert_eq!(result.format, TextureFormat::Rgba8Unorm);
    assert_eq!((result.width, result.height), SIZE);
}

#[test]
fn test_missing_program_passes_input_through() {
    // --- 1. ARRANGE ---
    let (registry, mut backend) = backend();
    let input = hdr_input(&registry);
    let mut lane = TonemapLane::new(&registry, &library(&[]));
    lane.resize(SIZE.0, SIZE.1).unwrap();
    lane.set_input(0, Some(input));

    // --- 2. ACT ---
    exec(&registry, backend.as_mut(), &mut lane);

    // --- 3. ASSERT ---
    assert_eq!(lane.slots().output(slots::SCENE_COLOR), Some(input));
}

#[test]
fn test_unwired_input_publishes_nothing() {
    // --- 1. ARRANGE ---
    let (registry, mut backend) = backend();
    let mut lane = TonemapLane::new(&registry, &library(&[shaders::TONEMAP]));
    lane.resize(SIZE.0, SIZE.1).unwrap();

    // --- 2. ACT ---
    exec(&registry, backend.as_mut(), &mut lane);

    // --- 3. ASSERT ---
    assert_eq!(lane.slots().output(slots::SCENE_COLOR), None);
}

#[test]
fn test_light_without_atlas_room_is_left_unshadowed() {
    // --- 1. ARRANGE ---
    // Room for exactly one directional light's four cascades.
    let config = ShadowConfig {
        atlas_size: 2048,
        tile_resolution: 1024,
        max_lods: 1,
        max_tile_age: 8,
    };
    let (registry, mut backend) = backend();
    let mut lane = ShadowMapLane::new(&registry, &config);
    lane.resize(SIZE.0, SIZE.1).unwrap();
    let mut atlas = ShadowAtlas::new(config);
    let lights = vec![
        Light::directional(1, Vec3::new(0.3, -1.0, 0.2)),
        Light::directional(2, Vec3::new(-0.3, -1.0, 0.1)),
    ];

    // --- 2. ACT ---
    exec_lit(&registry, backend.as_mut(), &mut lane, lights, &mut atlas);

    // --- 3. ASSERT ---
    assert_eq!(atlas.tiles(1, 0).map(|t| t.len()), Some(4));
    assert!(atlas.projection(1).is_some());
    // Same-frame keys are not evicted, so the second light gets nothing.
    assert!(atlas.tiles(2, 0).is_none());
    assert!(atlas.projection(2).is_none());
    assert_eq!(
        lane.slots().output(slots::SHADOW_MAP),
        Some(lane.depth_texture())
    );
}

#[test]
fn test_dropping_a_lane_releases_its_resources() {
    // --- 1. ARRANGE ---
    let (registry, _backend) = backend();
    let lane = TonemapLane::new(&registry, &library(&[shaders::TONEMAP]));
    let result = lane.result();
    let targets = lane.owned_targets();

    // --- 2. ACT ---
    drop(lane);

    // --- 3. ASSERT ---
    let registry = registry.read();
    assert!(registry.state(result).is_some_and(|s| s.is_dying()));
    for target in targets {
        assert!(registry.state(target).is_some_and(|s| s.is_dying()));
    }
}
