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

//! Recording state shared by every backend's command buffer.

use super::resources::TargetBinding;
use prism_core::math::{Mat4, Rect};
use prism_core::renderer::{
    pack_std140, CommandList, DeviceCommand, RenderTargetId, TextureId, UniformValue,
};
use std::collections::BTreeMap;

/// What the command buffer currently has bound.
#[derive(Debug)]
pub(crate) struct RecorderState {
    pub target: Option<RenderTargetId>,
    pub mip_level: u32,
    /// `None` while the bound target is invalid.
    pub bound: Option<TargetBinding>,
    pub pass_open: bool,
    pub viewport: Rect,
    pub scissor: Rect,
    pub view: Mat4,
    pub projection: Mat4,
    globals: BTreeMap<String, UniformValue>,
    global_textures: BTreeMap<String, TextureId>,
    globals_version: u64,
    packed: Vec<u8>,
    packed_version: Option<u64>,
    markers: Vec<String>,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self {
            target: None,
            mip_level: 0,
            bound: None,
            pass_open: false,
            viewport: Rect::default(),
            scissor: Rect::default(),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            globals: BTreeMap::new(),
            global_textures: BTreeMap::new(),
            globals_version: 0,
            packed: Vec::new(),
            packed_version: None,
            markers: Vec::new(),
        }
    }
}

impl RecorderState {
    /// Forgets the bound target at a frame boundary. Globals survive.
    pub fn reset_frame(&mut self) {
        self.target = None;
        self.mip_level = 0;
        self.bound = None;
        self.pass_open = false;
        self.viewport = Rect::default();
        self.scissor = Rect::default();
        self.markers.clear();
        // Uniform storage is per frame, so the block must be uploaded again.
        self.globals_version += 1;
    }

    /// Records a new target binding and resets viewport and scissor to it.
    pub fn bind_target(
        &mut self,
        target: RenderTargetId,
        mip_level: u32,
        binding: Option<TargetBinding>,
    ) {
        self.target = Some(target);
        self.mip_level = mip_level;
        self.viewport = binding
            .as_ref()
            .map(|b| Rect::sized(b.width, b.height))
            .unwrap_or_default();
        self.scissor = self.viewport;
        self.bound = binding;
    }

    /// The full extent of the bound target.
    pub fn target_rect(&self) -> Rect {
        self.bound
            .as_ref()
            .map(|b| Rect::sized(b.width, b.height))
            .unwrap_or_default()
    }

    /// Opens the render pass of the bound target if needed.
    ///
    /// Returns `false` when no valid target is bound.
    pub fn ensure_pass(&mut self, list: &mut CommandList) -> bool {
        let Some(bound) = &self.bound else {
            return false;
        };
        if !self.pass_open {
            list.push(DeviceCommand::BeginRenderPass {
                framebuffer: bound.framebuffer,
            });
            list.push(DeviceCommand::SetViewport(self.viewport));
            list.push(DeviceCommand::SetScissor(self.scissor));
            self.pass_open = true;
        }
        true
    }

    pub fn end_pass(&mut self, list: &mut CommandList) {
        if self.pass_open {
            list.push(DeviceCommand::EndRenderPass);
            self.pass_open = false;
        }
    }

    pub fn set_viewport(&mut self, viewport: Rect, list: &mut CommandList) {
        self.viewport = viewport;
        self.scissor = viewport;
        if self.pass_open {
            list.push(DeviceCommand::SetViewport(self.viewport));
            list.push(DeviceCommand::SetScissor(self.scissor));
        }
    }

    pub fn set_scissor(&mut self, scissor: Rect, list: &mut CommandList) {
        self.scissor = scissor.intersect(&self.viewport);
        if self.pass_open {
            list.push(DeviceCommand::SetScissor(self.scissor));
        }
    }

    pub fn set_global(&mut self, name: &str, value: UniformValue) {
        if self.globals.get(name) != Some(&value) {
            self.globals.insert(name.to_owned(), value);
            self.globals_version += 1;
        }
    }

    pub fn global(&self, name: &str) -> Option<UniformValue> {
        self.globals.get(name).copied()
    }

    pub fn set_global_texture(&mut self, name: &str, texture: TextureId) {
        self.global_textures.insert(name.to_owned(), texture);
    }

    pub fn global_texture(&self, name: &str) -> Option<TextureId> {
        self.global_textures.get(name).copied()
    }

    pub fn globals_version(&self) -> u64 {
        self.globals_version
    }

    /// The std140 block of every global, in name order.
    pub fn packed_globals(&mut self) -> &[u8] {
        if self.packed_version != Some(self.globals_version) {
            self.packed = pack_std140(self.globals.values());
            self.packed_version = Some(self.globals_version);
        }
        &self.packed
    }

    pub fn push_marker(&mut self, name: &str, list: &mut CommandList) {
        self.markers.push(name.to_owned());
        list.push(DeviceCommand::PushDebugGroup(name.to_owned()));
    }

    pub fn pop_marker(&mut self, list: &mut CommandList) {
        if self.markers.pop().is_some() {
            list.push(DeviceCommand::PopDebugGroup);
        } else {
            log::debug!("Ignoring an unbalanced end_debug_marker");
        }
    }

    /// Closes the pass and every open marker at the end of a frame.
    pub fn finish(&mut self, list: &mut CommandList) {
        self.end_pass(list);
        if !self.markers.is_empty() {
            log::warn!("{} debug marker(s) left open at end of frame", self.markers.len());
        }
        while self.markers.pop().is_some() {
            list.push(DeviceCommand::PopDebugGroup);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::{FramebufferId, TargetSignature};

    fn binding(width: u32, height: u32) -> TargetBinding {
        TargetBinding {
            framebuffer: FramebufferId(7),
            width,
            height,
            signature: TargetSignature::default(),
        }
    }

    #[test]
    fn binding_a_target_resets_viewport_and_scissor() {
        let mut state = RecorderState::default();
        let mut list = CommandList::new();
        state.bind_target(RenderTargetId(1), 0, Some(binding(800, 600)));
        state.set_viewport(Rect::new(10, 10, 100, 100), &mut list);
        state.set_scissor(Rect::new(0, 0, 50, 50), &mut list);
        assert_eq!(state.scissor, Rect::new(10, 10, 40, 40));
        assert!(list.is_empty());

        state.bind_target(RenderTargetId(2), 0, Some(binding(320, 240)));
        assert_eq!(state.viewport, Rect::sized(320, 240));
        assert_eq!(state.scissor, state.viewport);
    }

    #[test]
    fn pass_opens_lazily_once() {
        let mut state = RecorderState::default();
        let mut list = CommandList::new();
        assert!(!state.ensure_pass(&mut list));
        state.bind_target(RenderTargetId(1), 0, Some(binding(4, 4)));
        assert!(state.ensure_pass(&mut list));
        assert!(state.ensure_pass(&mut list));
        assert_eq!(list.len(), 3);
        state.finish(&mut list);
        assert_eq!(list.commands().last(), Some(&DeviceCommand::EndRenderPass));
    }

    #[test]
    fn unchanged_globals_keep_their_version() {
        let mut state = RecorderState::default();
        state.set_global("exposure", UniformValue::Float(1.0));
        let version = state.globals_version();
        state.set_global("exposure", UniformValue::Float(1.0));
        assert_eq!(state.globals_version(), version);
        state.set_global("exposure", UniformValue::Float(2.0));
        assert_ne!(state.globals_version(), version);
        assert_eq!(state.packed_globals().len(), 16);
    }

    #[test]
    fn open_markers_are_closed_at_frame_end() {
        let mut state = RecorderState::default();
        let mut list = CommandList::new();
        state.push_marker("gbuffer", &mut list);
        state.push_marker("opaque", &mut list);
        state.pop_marker(&mut list);
        state.finish(&mut list);
        state.pop_marker(&mut list);
        let pops = list
            .commands()
            .iter()
            .filter(|c| **c == DeviceCommand::PopDebugGroup)
            .count();
        assert_eq!(pops, 2);
    }
}
