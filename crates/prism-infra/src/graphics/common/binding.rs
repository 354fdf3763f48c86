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

//! The seam where backends differ: how uniforms and resources reach a draw.

use super::deletion::GpuObject;
use prism_core::renderer::{
    BackendStats, BindingResource, CommandList, GraphicsDevice, ResourceId, SkipReason,
};
use std::fmt::Debug;

/// Bind group index of the frame-global uniform block.
pub(crate) const GLOBALS_GROUP: u32 = 0;
/// Bind group index of the textures and buffers of an instance.
pub(crate) const RESOURCES_GROUP: u32 = 1;
/// Bind group index of the per-draw uniform block.
pub(crate) const DRAW_GROUP: u32 = 2;

/// Largest uniform block a single draw may bind.
pub(crate) const UNIFORM_BINDING_SIZE: u64 = 16 * 1024;

/// Everything a draw or dispatch binds besides its pipeline.
#[derive(Debug)]
pub(crate) struct DrawBindings<'a> {
    /// The instance the resources belong to. Cached descriptors are keyed
    /// by it.
    pub owner: ResourceId,
    /// Lifecycle generation of `owner`.
    pub generation: u64,
    /// Packed frame-global block.
    pub globals: &'a [u8],
    /// Changes whenever `globals` does.
    pub globals_version: u64,
    /// Packed per-draw block.
    pub block: &'a [u8],
    /// Textures and buffers, in binding order.
    pub resources: &'a [BindingResource],
}

/// Borrowed backend state a binder records into.
pub(crate) struct BindContext<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub list: &'a mut CommandList,
    pub retired: &'a mut Vec<GpuObject>,
    pub stats: &'a mut BackendStats,
}

/// Binds uniforms and resources for one draw or dispatch.
pub(crate) trait DrawBinder: Send + Debug {
    /// Records the bind commands for `bindings`.
    fn bind(&mut self, ctx: BindContext<'_>, bindings: &DrawBindings<'_>) -> Result<(), SkipReason>;

    /// Forgets cached state belonging to `owner`.
    fn evict(&mut self, owner: ResourceId, retired: &mut Vec<GpuObject>);

    /// Hands back every native object. Used at teardown.
    fn drain(&mut self) -> Vec<GpuObject>;
}
