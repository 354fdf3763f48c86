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

use prism_agents::PipelineContext;
use prism_core::config::ShadowConfig;
use prism_core::math::{Aabb, Vec3};
use prism_core::renderer::{
    BackendKind, BlendMode, GraphicsDevice, InMemoryShaderLibrary, Material, Mesh,
    RenderBackend, RenderError, ResourceRegistry, ShaderSource, ShaderSources, SharedRegistry,
};
use prism_core::scene::{Camera, Light, MeshRenderable, Scene};
use prism_core::RendererConfig;
use prism_infra::{create_backend, BackendContext, HeadlessDevice};
use prism_lanes::render_lane::{
    shaders, slots, AntialiasingLane, DeferredLightingLane, GBufferLane, TonemapLane, UiLane,
};
use std::sync::Arc;

struct Fixture {
    device: Arc<HeadlessDevice>,
    registry: SharedRegistry,
    backend: Box<dyn RenderBackend>,
}

fn fixture(kind: BackendKind) -> Fixture {
    prism_infra::logging::init_for_tests();
    let config = RendererConfig {
        width: 320,
        height: 200,
        strict_validation: false,
        ..RendererConfig::default()
    };
    let device = Arc::new(HeadlessDevice::new(config.width, config.height));
    let registry = ResourceRegistry::shared();
    let shared: Arc<dyn GraphicsDevice> = device.clone();
    let backend = create_backend(kind, BackendContext::new(shared, registry.clone(), config))
        .expect("headless backends always initialize");
    Fixture {
        device,
        registry,
        backend,
    }
}

fn sources(tag: &str) -> ShaderSources {
    ShaderSources::simple(
        ShaderSource::text(format!("// {tag}\nfn vs_main() {{}}"), "vs_main"),
        ShaderSource::text(format!("// {tag}\nfn fs_main() {{}}"), "fs_main"),
    )
}

/// A library with every built-in program except `missing`.
fn library_without(missing: &[&str]) -> InMemoryShaderLibrary {
    let mut library = InMemoryShaderLibrary::new();
    for name in shaders::ALL.iter().filter(|name| !missing.contains(name)) {
        library.insert(*name, sources(name));
    }
    library
}

fn camera() -> Camera {
    Camera::perspective(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, 1.0, 16.0 / 9.0, 0.1, 100.0)
}

fn scene(registry: &SharedRegistry) -> Scene {
    let (mesh, instance) = {
        let mut registry = registry.write();
        let mesh = registry.add_mesh(Mesh::unit_cube());
        let material = registry.add_material(Material::new("lit", sources("lit"), BlendMode::Opaque));
        let instance = registry.instantiate(material).unwrap();
        (mesh, instance)
    };
    let mut scene = Scene::new();
    scene.add(MeshRenderable::new(
        mesh,
        Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5)),
        instance,
    ));
    scene.lights.push(Light::directional(1, Vec3::new(0.2, -1.0, -0.3)));
    scene.lights.push(Light::point(2, Vec3::new(1.0, 1.0, 0.0), 3.0));
    scene
}

fn minimal_context(registry: &SharedRegistry, library: &InMemoryShaderLibrary) -> PipelineContext {
    let mut context = PipelineContext::new(registry, library, &ShadowConfig::default(), 320, 200);
    context.insert_task(Box::new(GBufferLane::new(registry)), None);
    context.insert_task(Box::new(DeferredLightingLane::new(registry, library)), None);
    context.insert_task(Box::new(TonemapLane::new(registry, library)), None);
    context.insert_task(Box::new(UiLane::new(registry, library)), None);
    context
}

fn run_frame(f: &mut Fixture, context: &mut PipelineContext, scene: &Scene) -> Result<(), RenderError> {
    f.backend.begin_frame()?;
    context.draw(scene, &camera(), f.backend.as_mut())?;
    f.backend.end_frame()
}

#[test]
fn test_minimal_pipeline_end_to_end() {
    for kind in [BackendKind::Immediate, BackendKind::Explicit] {
        // --- 1. ARRANGE ---
        let mut f = fixture(kind);
        let library = library_without(&[]);
        let scene = scene(&f.registry);
        let mut context = minimal_context(&f.registry, &library);

        // --- 2. ACT ---
        context.resize(1920, 1080);

        // --- 3. ASSERT ---
        {
            let registry = f.registry.read();
            for name in context.task_names() {
                let task = context.task(name).unwrap();
                for target in task.owned_targets() {
                    let target = registry.render_target(target).unwrap();
                    for texture in target.attachments() {
                        let texture = registry.texture(texture).unwrap();
                        assert_eq!((texture.width, texture.height), (1920, 1080), "{name}");
                    }
                }
            }
        }

        run_frame(&mut f, &mut context, &scene).unwrap();

        let final_color = f
            .registry
            .read()
            .render_target(context.default_target())
            .and_then(|t| t.color(0))
            .expect("the default target has a colour attachment");
        let emissive = context.texture(slots::EMISSIVE_MAP).unwrap();
        assert_ne!(final_color, emissive, "{kind}");
        assert_ne!(context.texture(slots::SCENE_COLOR), Some(emissive));
    }
}

#[test]
fn test_missing_program_passes_input_through() {
    // --- 1. ARRANGE ---
    let mut f = fixture(BackendKind::Explicit);
    let library = library_without(&[shaders::TONEMAP]);
    let scene = scene(&f.registry);
    let mut context = PipelineContext::new(&f.registry, &library, &ShadowConfig::default(), 320, 200);
    context.insert_task(Box::new(GBufferLane::new(&f.registry)), None);
    context.insert_task(Box::new(DeferredLightingLane::new(&f.registry, &library)), None);
    context.insert_task(Box::new(TonemapLane::new(&f.registry, &library)), None);

    // --- 2. ACT ---
    run_frame(&mut f, &mut context, &scene).unwrap();

    // --- 3. ASSERT ---
    assert_eq!(
        context.texture(slots::SCENE_COLOR),
        context.texture(slots::EMISSIVE_MAP)
    );
}

#[test]
fn test_uncompilable_program_passes_input_through() {
    for kind in [BackendKind::Immediate, BackendKind::Explicit] {
        // --- 1. ARRANGE ---
        let mut f = fixture(kind);
        let mut library = library_without(&[]);
        library.insert(
            shaders::TONEMAP,
            ShaderSources::simple(
                ShaderSource::text("fn vs_main() {}", "vs_main"),
                ShaderSource::text("#error tonemap does not build", "fs_main"),
            ),
        );
        let scene = scene(&f.registry);
        let mut context =
            PipelineContext::new(&f.registry, &library, &ShadowConfig::default(), 320, 200);
        context.insert_task(Box::new(GBufferLane::new(&f.registry)), None);
        context.insert_task(Box::new(DeferredLightingLane::new(&f.registry, &library)), None);
        context.insert_task(Box::new(TonemapLane::new(&f.registry, &library)), None);

        // --- 2. ACT ---
        run_frame(&mut f, &mut context, &scene).unwrap();

        // --- 3. ASSERT ---
        let lit = context.texture(slots::EMISSIVE_MAP);
        assert!(lit.is_some(), "{kind}");
        assert_eq!(context.texture(slots::SCENE_COLOR), lit, "{kind}");
        let tonemap = context
            .task("Tonemap")
            .and_then(|t| t.slots().output(slots::SCENE_COLOR));
        assert_eq!(tonemap, lit, "{kind}");
    }
}

#[test]
fn test_insert_task_by_name_keeps_wiring() {
    // --- 1. ARRANGE ---
    let mut f = fixture(BackendKind::Immediate);
    let library = library_without(&[]);
    let scene = scene(&f.registry);
    let mut context = minimal_context(&f.registry, &library);

    // --- 2. ACT ---
    context.insert_task(
        Box::new(AntialiasingLane::new(&f.registry, &library)),
        Some("Tonemap"),
    );
    run_frame(&mut f, &mut context, &scene).unwrap();

    // --- 3. ASSERT ---
    assert_eq!(
        context.task_names(),
        ["GBuffer", "DeferredLighting", "Antialiasing", "Tonemap", "UI"]
    );
    let antialiased = context
        .task("Antialiasing")
        .and_then(|t| t.slots().output(slots::SCENE_COLOR))
        .unwrap();
    let tonemap_input = context
        .task("Tonemap")
        .and_then(|t| t.slots().input(slots::SCENE_COLOR))
        .unwrap();
    assert_eq!(antialiased, tonemap_input);
    assert_ne!(Some(antialiased), context.texture(slots::EMISSIVE_MAP));
}

#[test]
fn test_deferred_preset_fills_the_shadow_atlas() {
    // --- 1. ARRANGE ---
    let mut f = fixture(BackendKind::Explicit);
    let library = library_without(&[]);
    let scene = scene(&f.registry);
    let mut context =
        PipelineContext::deferred(&f.registry, &library, &ShadowConfig::default(), 320, 200);

    // --- 2. ACT ---
    run_frame(&mut f, &mut context, &scene).unwrap();

    // --- 3. ASSERT ---
    let directional = context.atlas().projection(1).expect("directional light shadowed");
    assert_eq!(directional.matrices.len(), 4);
    let point = context.atlas().projection(2).expect("point light shadowed");
    assert_eq!(point.matrices.len(), 6);
    assert_eq!(point.tiles.len(), 6);
    assert!(context.texture(slots::SHADOW_MAP).is_some());
    assert!(context.texture(slots::SSAO_MAP).is_some());
}

#[test]
fn test_disabled_task_is_skipped() {
    // --- 1. ARRANGE ---
    let mut f = fixture(BackendKind::Immediate);
    let library = library_without(&[]);
    let scene = scene(&f.registry);
    let mut context = minimal_context(&f.registry, &library);
    context.task_mut("Tonemap").unwrap().set_enabled(false);

    // --- 2. ACT ---
    run_frame(&mut f, &mut context, &scene).unwrap();

    // --- 3. ASSERT ---
    let ui_input = context
        .task("UI")
        .and_then(|t| t.slots().input(slots::SCENE_COLOR));
    assert_eq!(ui_input, context.texture(slots::EMISSIVE_MAP));
}

#[test]
fn test_device_loss_reaches_the_host() {
    // --- 1. ARRANGE ---
    let mut f = fixture(BackendKind::Explicit);
    let library = library_without(&[]);
    let scene = scene(&f.registry);
    let mut context = minimal_context(&f.registry, &library);
    run_frame(&mut f, &mut context, &scene).unwrap();

    // --- 2. ACT ---
    f.backend.begin_frame().unwrap();
    f.device.lose_device();
    let result = context.draw(&scene, &camera(), f.backend.as_mut());

    // --- 3. ASSERT ---
    assert_eq!(result, Err(RenderError::DeviceLost));
    assert_eq!(
        context.draw(&scene, &camera(), f.backend.as_mut()),
        Err(RenderError::DeviceLost)
    );
}
