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

//! Shared fixtures for the backend integration tests.

#![allow(dead_code)]

use prism_core::math::{Mat4, Vec4};
use prism_core::renderer::{
    BackendKind, BlendMode, DrawOutcome, GraphicsDevice, LayerMask, Material,
    MaterialInstanceId, Mesh, MeshId, RenderBackend, ResourceRegistry, ShaderSource,
    ShaderSources, SharedRegistry,
};
use prism_core::RendererConfig;
use prism_infra::{create_backend, BackendContext, HeadlessDevice};
use std::sync::Arc;

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 200;

/// A backend driving a headless device the test can inspect.
pub struct Harness {
    pub device: Arc<HeadlessDevice>,
    pub registry: SharedRegistry,
    pub backend: Box<dyn RenderBackend>,
}

pub fn config() -> RendererConfig {
    RendererConfig {
        width: WIDTH,
        height: HEIGHT,
        strict_validation: false,
        ..RendererConfig::default()
    }
}

pub fn context(config: RendererConfig) -> (Arc<HeadlessDevice>, SharedRegistry, BackendContext) {
    prism_infra::logging::init_for_tests();
    let device = Arc::new(HeadlessDevice::new(config.width, config.height));
    let registry = ResourceRegistry::shared();
    let shared: Arc<dyn GraphicsDevice> = device.clone();
    let context = BackendContext::new(shared, registry.clone(), config);
    (device, registry, context)
}

pub fn harness_with(kind: BackendKind, config: RendererConfig) -> Harness {
    let (device, registry, context) = context(config);
    let backend = create_backend(kind, context).expect("backend creation should succeed");
    Harness {
        device,
        registry,
        backend,
    }
}

pub fn harness(kind: BackendKind) -> Harness {
    harness_with(kind, config())
}

pub fn sources(tag: &str) -> ShaderSources {
    ShaderSources::simple(
        ShaderSource::text(format!("// {tag}\nfn vs_main() {{}}"), "vs_main"),
        ShaderSource::text(format!("// {tag}\nfn fs_main() {{}}"), "fs_main"),
    )
}

pub fn opaque_material(label: &str) -> Material {
    Material::new(label, sources(label), BlendMode::Opaque).with_param("tint", Vec4::ONE)
}

pub fn translucent_material(label: &str) -> Material {
    Material::new(label, sources(label), BlendMode::Translucent)
}

/// Declares a cube and an instance of `material`.
pub fn scene(registry: &SharedRegistry, material: Material) -> (MeshId, MaterialInstanceId) {
    let mut registry = registry.write();
    let mesh = registry.add_mesh(Mesh::unit_cube());
    let material = registry.add_material(material);
    let instance = registry
        .instantiate(material)
        .expect("material was just declared");
    (mesh, instance)
}

impl Harness {
    /// Runs one frame drawing `instance` into the surface.
    pub fn frame(&mut self, mesh: MeshId, instance: MaterialInstanceId) -> DrawOutcome {
        let status = self.backend.begin_frame().expect("begin_frame should succeed");
        assert!(status.is_ready(), "frame unexpectedly dropped");
        let native = self.backend.native_target();
        self.backend
            .set_render_target(native, 0)
            .expect("the surface is always bindable");
        self.backend
            .clear_render_target(true, Vec4::ZERO, true, 1.0);
        let outcome = self
            .backend
            .draw_mesh(Mat4::IDENTITY, mesh, 0, LayerMask::DEFAULT, instance);
        self.backend.end_frame().expect("end_frame should succeed");
        outcome
    }
}

pub const BACKENDS: [BackendKind; 2] = [BackendKind::Immediate, BackendKind::Explicit];
