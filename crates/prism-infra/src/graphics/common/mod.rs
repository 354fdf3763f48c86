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

//! Machinery shared by the immediate and explicit backends.

pub(crate) mod binding;
pub(crate) mod deletion;
pub(crate) mod pipeline_cache;
pub(crate) mod recorder;
pub(crate) mod resources;
pub(crate) mod state;
pub(crate) mod swapchain;

/// Implements `CommandBuffer` for a backend by forwarding to its `state`.
macro_rules! delegate_command_buffer {
    ($backend:ty) => {
        impl prism_core::renderer::CommandBuffer for $backend {
            fn set_render_target(
                &mut self,
                target: prism_core::renderer::RenderTargetId,
                mip_level: u32,
            ) -> Result<(), prism_core::renderer::RenderError> {
                self.state.set_render_target(target, mip_level)
            }

            fn render_target(&self) -> Option<prism_core::renderer::RenderTargetId> {
                self.state.render_target()
            }

            fn clear_render_target(
                &mut self,
                clear_color: bool,
                color: prism_core::math::Vec4,
                clear_depth: bool,
                depth: f32,
            ) {
                self.state
                    .clear_render_target(clear_color, color, clear_depth, depth)
            }

            fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
                self.state.set_viewport(x, y, width, height)
            }

            fn viewport(&self) -> prism_core::math::Rect {
                self.state.viewport()
            }

            fn enable_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
                self.state.enable_scissor(x, y, width, height)
            }

            fn disable_scissor(&mut self) {
                self.state.disable_scissor()
            }

            fn set_view_projection(
                &mut self,
                view: prism_core::math::Mat4,
                projection: prism_core::math::Mat4,
            ) {
                self.state.set_view_projection(view, projection)
            }

            fn set_global_value(&mut self, name: &str, value: prism_core::renderer::UniformValue) {
                self.state.set_global_value(name, value)
            }

            fn global_value(&self, name: &str) -> Option<prism_core::renderer::UniformValue> {
                self.state.global_value(name)
            }

            fn set_global_texture(&mut self, name: &str, texture: prism_core::renderer::TextureId) {
                self.state.set_global_texture(name, texture)
            }

            fn global_texture(&self, name: &str) -> Option<prism_core::renderer::TextureId> {
                self.state.global_texture(name)
            }

            fn draw_mesh(
                &mut self,
                model: prism_core::math::Mat4,
                mesh: prism_core::renderer::MeshId,
                submesh: usize,
                layer: prism_core::renderer::LayerMask,
                instance: prism_core::renderer::MaterialInstanceId,
            ) -> prism_core::renderer::DrawOutcome {
                self.state.draw_mesh(model, mesh, submesh, layer, instance)
            }

            fn draw_mesh_instanced(
                &mut self,
                models: &[prism_core::math::Mat4],
                mesh: prism_core::renderer::MeshId,
                submesh: usize,
                layer: prism_core::renderer::LayerMask,
                instance: prism_core::renderer::MaterialInstanceId,
            ) -> prism_core::renderer::DrawOutcome {
                self.state
                    .draw_mesh_instanced(models, mesh, submesh, layer, instance)
            }

            fn dispatch_compute(
                &mut self,
                instance: prism_core::renderer::ComputeInstanceId,
                x: u32,
                y: u32,
                z: u32,
            ) -> prism_core::renderer::DrawOutcome {
                self.state.dispatch_compute(instance, x, y, z)
            }

            fn begin_debug_marker(&mut self, name: &str) {
                self.state.begin_debug_marker(name)
            }

            fn end_debug_marker(&mut self) {
                self.state.end_debug_marker()
            }
        }
    };
}

pub(crate) use delegate_command_buffer;
