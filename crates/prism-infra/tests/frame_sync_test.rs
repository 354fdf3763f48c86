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
use prism_core::math::Mat4;
use prism_core::renderer::{
    BackendKind, DeviceCommand, DrawOutcome, FenceWait, FrameStatus, LayerMask, RenderBackend,
    RenderError, SharedRegistry, SkipReason,
};
use prism_core::RendererConfig;
use prism_infra::{DeviceEvent, ExplicitBackend, HeadlessDevice, ObjectKind};
use std::collections::HashSet;
use std::sync::Arc;

fn explicit(frames_in_flight: u32) -> (Arc<HeadlessDevice>, SharedRegistry, ExplicitBackend) {
    let (device, registry, context) = context(RendererConfig {
        frames_in_flight,
        ..config()
    });
    let backend = ExplicitBackend::new(context).unwrap();
    (device, registry, backend)
}

#[test]
fn test_frames_in_flight_are_clamped_to_the_platform() {
    let (_, _, wide) = explicit(4);
    assert_eq!(wide.frames_in_flight(), 3);
    let (_, _, narrow) = explicit(1);
    assert_eq!(narrow.frames_in_flight(), 2);
}

#[test]
fn test_a_slot_is_never_recorded_before_its_fence_signals() {
    // --- 1. ARRANGE ---
    let (device, registry, backend) = explicit(3);
    let mut h = Harness {
        device,
        registry,
        backend: Box::new(backend),
    };
    let (mesh, instance) = scene(&h.registry, opaque_material("churn"));
    let material = h.registry.read().instance(instance).unwrap().material;

    // --- 2. ACT ---
    // Reloading every frame retires a pipeline and its modules each time.
    for frame in 0..12 {
        assert!(h.frame(mesh, instance).is_drawn());
        h.registry
            .write()
            .reload_material(material, sources(&format!("v{frame}")))
            .unwrap();
    }

    // --- 3. ASSERT ---
    let mut in_flight = HashSet::new();
    let mut most_in_flight = 0;
    for event in h.device.events() {
        match event {
            DeviceEvent::Submitted {
                fence: Some(fence), ..
            } => {
                assert!(in_flight.insert(fence), "fence reused while pending");
                most_in_flight = most_in_flight.max(in_flight.len());
            }
            DeviceEvent::FenceWaited {
                fence,
                outcome: FenceWait::Signaled,
            } => {
                in_flight.remove(&fence);
            }
            DeviceEvent::FenceReset(fence) => {
                assert!(!in_flight.contains(&fence), "slot reset before its fence");
            }
            _ => {}
        }
    }
    assert_eq!(most_in_flight, 3, "frames should overlap");
    assert_eq!(h.device.use_after_free_count(), 0);
    // Retired in frames 1..=8 and released once their slot came around.
    assert!(h.device.destroyed(ObjectKind::RenderPipeline) >= 8);
}

#[test]
fn test_slots_rotate_round_robin() {
    let (_device, _registry, mut backend) = explicit(3);
    let mut seen = Vec::new();
    for _ in 0..6 {
        seen.push(backend.current_slot());
        backend.begin_frame().unwrap();
        backend.end_frame().unwrap();
    }
    assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
}

#[test]
fn test_fence_timeout_drops_the_frame() {
    let (device, _, mut backend) = explicit(2);
    for _ in 0..2 {
        assert!(backend.begin_frame().unwrap().is_ready());
        backend.end_frame().unwrap();
    }

    device.stall_gpu(true);
    assert_eq!(backend.begin_frame().unwrap(), FrameStatus::Dropped);
    assert_eq!(backend.end_frame(), Err(RenderError::NoFrameInProgress));

    device.stall_gpu(false);
    assert!(backend.begin_frame().unwrap().is_ready());
    backend.end_frame().unwrap();
}

#[test]
fn test_stale_surface_is_rebuilt_and_the_frame_dropped() {
    for kind in BACKENDS {
        let mut h = harness(kind);
        let (mesh, instance) = scene(&h.registry, opaque_material("lit"));
        h.frame(mesh, instance);

        h.device.resize_window(640, 480);
        assert_eq!(
            h.backend.begin_frame().unwrap(),
            FrameStatus::Dropped,
            "{kind}"
        );
        assert!(h.frame(mesh, instance).is_drawn(), "{kind}");
        assert_eq!(h.backend.surface_size(), (640, 480));
        assert_eq!(h.device.live(ObjectKind::Swapchain), 1);
        assert_eq!(h.device.use_after_free_count(), 0);
    }
}

#[test]
fn test_host_resize_rebuilds_at_the_next_frame() {
    for kind in BACKENDS {
        let mut h = harness(kind);
        let (mesh, instance) = scene(&h.registry, opaque_material("lit"));
        h.frame(mesh, instance);
        h.backend.resize_surface(800, 600);
        assert_eq!(h.backend.surface_size(), (WIDTH, HEIGHT));
        assert!(h.frame(mesh, instance).is_drawn());
        assert_eq!(h.backend.surface_size(), (800, 600), "{kind}");
    }
}

#[test]
fn test_zero_sized_surface_drops_frames() {
    let mut h = harness(BackendKind::Explicit);
    h.backend.resize_surface(0, 0);
    assert_eq!(h.backend.begin_frame().unwrap(), FrameStatus::Dropped);
}

#[test]
fn test_immediate_backend_rewrites_uniforms_and_frees_transient_groups() {
    let mut h = harness(BackendKind::Immediate);
    let material = opaque_material("textured").with_texture("albedo", None);
    let (mesh, instance) = scene(&h.registry, material);
    let persistent = h.device.live(ObjectKind::BindGroup);

    for _ in 0..3 {
        assert!(h.frame(mesh, instance).is_drawn());
        assert_eq!(h.device.live(ObjectKind::BindGroup), persistent);
    }

    let last = h.device.submitted_lists().pop().unwrap();
    let updates = last
        .commands()
        .iter()
        .filter(|c| matches!(c, DeviceCommand::UpdateBuffer { .. }))
        .count();
    assert_eq!(updates, 2, "globals and draw block are written inline");
    let idles = h
        .device
        .events()
        .iter()
        .filter(|e| **e == DeviceEvent::WaitIdle)
        .count();
    assert!(idles >= 3);
}

#[test]
fn test_explicit_backend_caches_descriptor_sets() {
    let mut h = harness(BackendKind::Explicit);
    let material = opaque_material("textured").with_texture("albedo", None);
    let (mesh, instance) = scene(&h.registry, material);

    h.frame(mesh, instance);
    assert_eq!(h.backend.stats().descriptors_created, 1);
    h.frame(mesh, instance);
    h.frame(mesh, instance);
    assert_eq!(h.backend.stats().descriptors_created, 0);
    assert_eq!(h.backend.stats().pipelines_created, 0);
}

#[test]
fn test_exhausted_uniform_ring_skips_the_draw() {
    let (device, registry, context) = context(RendererConfig {
        uniform_ring_size: 16 * 1024 + 256,
        ..config()
    });
    let mut backend = prism_infra::create_backend(BackendKind::Explicit, context).unwrap();
    let (mesh, instance) = scene(&registry, opaque_material("lit"));

    backend.begin_frame().unwrap();
    let native = backend.native_target();
    backend.set_render_target(native, 0).unwrap();
    let outcomes: Vec<_> = (0..3)
        .map(|_| {
            backend.draw_mesh(Mat4::IDENTITY, mesh, 0, LayerMask::DEFAULT, instance)
        })
        .collect();
    backend.end_frame().unwrap();

    assert!(outcomes[0].is_drawn());
    assert_eq!(
        outcomes[2],
        DrawOutcome::Skipped(SkipReason::UniformSpaceExhausted)
    );
    assert_eq!(device.use_after_free_count(), 0);
}
