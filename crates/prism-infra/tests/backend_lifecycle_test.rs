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

mod common;

use common::*;
use prism_core::math::{Mat4, Vec4};
use prism_core::renderer::{
    BackendKind, ComputeBuffer, ComputeInstance, ComputeShader, DeviceCommand, DrawOutcome,
    LayerMask, ResourceState, ShaderSource, SkipReason,
};
use prism_infra::ObjectKind;

#[test]
fn test_first_bind_realizes_and_later_frames_reuse() {
    for kind in BACKENDS {
        // --- 1. ARRANGE ---
        let mut h = harness(kind);
        let (mesh, instance) = scene(&h.registry, opaque_material("lit"));
        assert_eq!(
            h.registry.read().state(mesh),
            Some(ResourceState::ToBeUpdated),
            "declaring a resource must not touch the device"
        );

        // --- 2. ACT ---
        let first = h.frame(mesh, instance);
        let first_stats = h.backend.stats();
        let second = h.frame(mesh, instance);

        // --- 3. ASSERT ---
        assert!(first.is_drawn(), "{kind}: {first:?}");
        assert_eq!(first.pipeline(), second.pipeline());
        let registry = h.registry.read();
        assert_eq!(registry.state(mesh), Some(ResourceState::Ready));
        assert_eq!(registry.state(instance), Some(ResourceState::Ready));
        assert!(first_stats.realized >= 3, "{kind}: {first_stats:?}");
        assert_eq!(first_stats.pipelines_created, 1);
        assert_eq!(h.backend.stats().realized, 0);
        assert_eq!(h.backend.stats().pipelines_created, 0);
    }
}

#[test]
fn test_instances_of_one_material_share_a_pipeline() {
    let mut h = harness(BackendKind::Explicit);
    let (mesh, first) = scene(&h.registry, opaque_material("shared"));
    let second = {
        let mut registry = h.registry.write();
        let material = registry.instance(first).unwrap().material;
        registry.instantiate(material).unwrap()
    };

    h.backend.begin_frame().unwrap();
    let native = h.backend.native_target();
    h.backend.set_render_target(native, 0).unwrap();
    let a = h
        .backend
        .draw_mesh(Mat4::IDENTITY, mesh, 0, LayerMask::DEFAULT, first);
    let b = h
        .backend
        .draw_mesh(Mat4::IDENTITY, mesh, 0, LayerMask::DEFAULT, second);
    h.backend.end_frame().unwrap();

    assert!(a.is_drawn() && b.is_drawn());
    assert_eq!(a.pipeline(), b.pipeline());
    assert_eq!(h.backend.stats().pipelines_created, 1);
    assert_eq!(h.device.live(ObjectKind::RenderPipeline), 1);
}

#[test]
fn test_reload_rebuilds_every_instance_once() {
    for kind in BACKENDS {
        let mut h = harness(kind);
        let (mesh, first) = scene(&h.registry, opaque_material("reloaded"));
        let (material, second) = {
            let mut registry = h.registry.write();
            let material = registry.instance(first).unwrap().material;
            (material, registry.instantiate(material).unwrap())
        };
        let before = h.frame(mesh, first).pipeline();

        h.registry
            .write()
            .reload_material(material, sources("reloaded v2"))
            .unwrap();
        assert_eq!(h.registry.read().state(second), Some(ResourceState::ToBeUpdated));

        h.backend.begin_frame().unwrap();
        let native = h.backend.native_target();
        h.backend.set_render_target(native, 0).unwrap();
        let a = h
            .backend
            .draw_mesh(Mat4::IDENTITY, mesh, 0, LayerMask::DEFAULT, first);
        let b = h
            .backend
            .draw_mesh(Mat4::IDENTITY, mesh, 0, LayerMask::DEFAULT, second);
        let stats = h.backend.stats();
        h.backend.end_frame().unwrap();

        assert_ne!(a.pipeline(), before, "{kind}: the old pipeline survived a reload");
        assert_eq!(a.pipeline(), b.pipeline());
        assert_eq!(stats.pipelines_created, 1);
        assert_eq!(h.registry.read().state(second), Some(ResourceState::Ready));
    }
}

#[test]
fn test_broken_shader_skips_draws_until_fixed() {
    let mut h = harness(BackendKind::Explicit);
    let mut broken = opaque_material("broken");
    broken.sources = sources("#error does not compile");
    let (mesh, instance) = scene(&h.registry, broken);

    let outcome = h.frame(mesh, instance);
    assert!(!outcome.is_drawn());
    let material = h.registry.read().instance(instance).unwrap().material;
    assert_eq!(h.registry.read().state(material), Some(ResourceState::Failed));
    assert_eq!(h.backend.stats().skipped_draws, 1);

    h.registry
        .write()
        .reload_material(material, sources("fixed"))
        .unwrap();
    assert!(h.frame(mesh, instance).is_drawn());
}

#[test]
fn test_destroyed_resources_are_released_without_use_after_free() {
    for kind in BACKENDS {
        let mut h = harness(kind);
        let (mesh, instance) = scene(&h.registry, opaque_material("churn"));
        let (spare, _) = scene(&h.registry, opaque_material("spare"));

        for frame in 0..8 {
            let mesh_in_use = if frame < 3 { spare } else { mesh };
            h.frame(mesh_in_use, instance);
            if frame == 2 {
                h.registry.write().request_destroy(spare).unwrap();
            }
            h.backend.collect_garbage();
        }

        assert_eq!(h.registry.read().state(spare), None, "{kind}: not purged");
        assert_eq!(h.device.use_after_free_count(), 0, "{kind}");
        assert!(h.device.destroyed(ObjectKind::Buffer) >= 2, "{kind}");
    }
}

#[test]
fn test_native_target_survives_a_destroy_request() {
    let mut h = harness(BackendKind::Explicit);
    let (mesh, instance) = scene(&h.registry, opaque_material("lit"));
    let native = h.backend.native_target();
    let swapchains = h.device.live(ObjectKind::Swapchain);

    h.registry.write().request_destroy(native).unwrap();
    h.backend.collect_garbage();

    assert!(h.frame(mesh, instance).is_drawn());
    assert_eq!(h.device.live(ObjectKind::Swapchain), swapchains);
    assert_eq!(h.device.live(ObjectKind::Framebuffer), 2);
}

#[test]
fn test_native_handles_are_only_handed_out_when_ready() {
    let mut h = harness(BackendKind::Explicit);
    let (mesh, instance) = scene(&h.registry, opaque_material("lit"));
    let mut broken = opaque_material("broken");
    broken.sources = sources("#error");
    let (_, broken) = scene(&h.registry, broken);

    assert!(h.backend.native_handle(mesh.into()).is_some());
    assert!(h.backend.native_handle(instance.into()).is_some());
    assert_eq!(h.backend.native_handle(broken.into()), None);
}

#[test]
fn test_compute_dispatch_reaches_the_device() {
    let mut h = harness(BackendKind::Explicit);
    let dispatch = {
        let mut registry = h.registry.write();
        let buffer = registry.add_compute_buffer(ComputeBuffer::storage("particles", 1024));
        let shader = registry.add_compute_shader(ComputeShader {
            label: "simulate".into(),
            source: ShaderSource::text("fn cs_main() {}", "cs_main"),
        });
        let mut instance = ComputeInstance::new(shader).with_buffer("particles", buffer);
        instance.set_param("dt", 0.016f32);
        registry.add_compute_instance(instance)
    };

    h.backend.begin_frame().unwrap();
    let outcome = h.backend.dispatch_compute(dispatch, 4, 1, 1);
    h.backend.end_frame().unwrap();

    assert!(outcome.is_drawn(), "{outcome:?}");
    assert_eq!(h.backend.stats().dispatches, 1);
    let submitted = h.device.submitted_lists();
    let last = submitted.last().unwrap();
    assert!(last
        .commands()
        .iter()
        .any(|c| *c == DeviceCommand::Dispatch { x: 4, y: 1, z: 1 }));
}

#[test]
fn test_draw_outside_a_frame_is_skipped() {
    let mut h = harness(BackendKind::Immediate);
    let (mesh, instance) = scene(&h.registry, opaque_material("lit"));
    let outcome = h
        .backend
        .draw_mesh(Mat4::IDENTITY, mesh, 0, LayerMask::DEFAULT, instance);
    assert_eq!(outcome, DrawOutcome::Skipped(SkipReason::NoRenderTarget));
    h.backend.clear_render_target(true, Vec4::ONE, false, 1.0);
    assert_eq!(h.device.submission_count(), 0);
}
