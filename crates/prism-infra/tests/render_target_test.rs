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
    BackendKind, DrawOutcome, LayerMask, RenderError, RenderTarget, RenderTargetId,
    ResourceState, SkipReason, Texture, TextureFormat,
};
use prism_core::RendererConfig;

fn mismatched_target(h: &Harness) -> RenderTargetId {
    let mut registry = h.registry.write();
    let color = registry.add_texture(Texture::render("color", 64, 64, TextureFormat::Rgba16Float));
    let depth = registry.add_texture(Texture::render("depth", 32, 32, TextureFormat::Depth32Float));
    registry.add_render_target(RenderTarget::new("broken").with_color(0, color).with_depth(depth))
}

#[test]
fn test_strict_validation_fails_the_frame() {
    let mut h = harness_with(
        BackendKind::Explicit,
        RendererConfig {
            strict_validation: true,
            ..config()
        },
    );
    let target = mismatched_target(&h);

    h.backend.begin_frame().unwrap();
    let bound = h.backend.set_render_target(target, 0);
    assert!(matches!(bound, Err(RenderError::AttachmentMismatch(_))));
    let result = h.backend.end_frame();

    assert!(matches!(result, Err(RenderError::AttachmentMismatch(_))));
    assert_eq!(h.registry.read().state(target), Some(ResourceState::Failed));
    // The next frame is unaffected.
    h.backend.begin_frame().unwrap();
    h.backend.end_frame().unwrap();
}

#[test]
fn test_lenient_validation_skips_the_pass() {
    for kind in BACKENDS {
        let mut h = harness(kind);
        let target = mismatched_target(&h);
        let (mesh, instance) = scene(&h.registry, opaque_material("lit"));

        h.backend.begin_frame().unwrap();
        h.backend.set_render_target(target, 0).unwrap();
        h.backend.clear_render_target(true, Vec4::ONE, true, 1.0);
        let outcome = h
            .backend
            .draw_mesh(Mat4::IDENTITY, mesh, 0, LayerMask::DEFAULT, instance);
        assert_eq!(outcome, DrawOutcome::Skipped(SkipReason::TargetInvalid));

        // Rendering to the surface still works in the same frame.
        let native = h.backend.native_target();
        h.backend.set_render_target(native, 0).unwrap();
        let outcome = h
            .backend
            .draw_mesh(Mat4::IDENTITY, mesh, 0, LayerMask::DEFAULT, instance);
        assert!(outcome.is_drawn(), "{kind}");
        h.backend.end_frame().unwrap();
    }
}

#[test]
fn test_offscreen_target_follows_texture_resizes() {
    let mut h = harness(BackendKind::Explicit);
    let (color, target) = {
        let mut registry = h.registry.write();
        let color = registry.add_texture(Texture::render("hdr", 320, 200, TextureFormat::Rgba16Float));
        let target = registry.add_render_target(RenderTarget::new("hdr").with_color(0, color));
        (color, target)
    };

    h.backend.begin_frame().unwrap();
    h.backend.set_render_target(target, 0).unwrap();
    assert_eq!(h.backend.viewport().width, 320);
    h.backend.end_frame().unwrap();

    h.registry.write().resize_texture(color, 640, 400).unwrap();
    assert_eq!(h.registry.read().state(target), Some(ResourceState::ToBeUpdated));

    h.backend.begin_frame().unwrap();
    h.backend.set_render_target(target, 0).unwrap();
    assert_eq!(h.backend.viewport().width, 640);
    assert_eq!(h.backend.viewport().height, 400);
    h.backend.end_frame().unwrap();
    assert_eq!(h.registry.read().state(target), Some(ResourceState::Ready));
    assert_eq!(h.device.use_after_free_count(), 0);
}

#[test]
fn test_mip_levels_bind_at_their_own_size() {
    let mut h = harness(BackendKind::Explicit);
    let target = {
        let mut registry = h.registry.write();
        let mut texture = Texture::render("bloom", 256, 128, TextureFormat::Rgba16Float);
        texture.mip_levels = 4;
        let color = registry.add_texture(texture);
        registry.add_render_target(RenderTarget::new("bloom").with_color(0, color))
    };

    h.backend.begin_frame().unwrap();
    h.backend.set_render_target(target, 2).unwrap();
    let viewport = h.backend.viewport();
    h.backend.end_frame().unwrap();

    assert_eq!((viewport.width, viewport.height), (64, 32));
}

#[test]
fn test_scissor_is_clipped_to_the_viewport() {
    let mut h = harness(BackendKind::Immediate);
    h.backend.begin_frame().unwrap();
    let native = h.backend.native_target();
    h.backend.set_render_target(native, 0).unwrap();
    h.backend.set_viewport(10, 10, 100, 100);
    h.backend.enable_scissor(50, 50, 500, 500);
    h.backend.clear_render_target(true, Vec4::ZERO, false, 1.0);
    h.backend.end_frame().unwrap();

    let list = h.device.submitted_lists().pop().unwrap();
    let scissor = list
        .commands()
        .iter()
        .rev()
        .find_map(|c| match c {
            prism_core::renderer::DeviceCommand::SetScissor(rect) => Some(*rect),
            _ => None,
        })
        .unwrap();
    assert_eq!(scissor, prism_core::math::Rect::new(50, 50, 60, 60));
}
