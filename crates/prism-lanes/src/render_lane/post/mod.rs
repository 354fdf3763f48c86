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

//! The post-process chain.
//!
//! Every lane here reads `sceneColor`, renders into a texture it owns and
//! publishes that texture as the new `sceneColor`. A lane that cannot run
//! publishes its input unchanged.

mod ambient_occlusion_lane;
mod antialiasing_lane;
mod bloom_lane;
mod depth_of_field_lane;
mod reflections_lane;
mod tonemap_lane;

pub use ambient_occlusion_lane::*;
pub use antialiasing_lane::*;
pub use bloom_lane::*;
pub use depth_of_field_lane::*;
pub use reflections_lane::*;
pub use tonemap_lane::*;

use super::slots::{self, TaskSlots};
use prism_core::math::Vec2;
use prism_core::renderer::{TextureFormat, TextureId};

/// Format of the intermediate HDR colour chain.
pub(crate) const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Publishes `result` as the new scene colour when every pass drew, the
/// input otherwise.
pub(crate) fn publish(slots: &mut TaskSlots, drawn: bool, result: TextureId) {
    if drawn {
        slots.set_output(slots::SCENE_COLOR, Some(result));
    } else {
        slots.pass_through(slots::SCENE_COLOR);
    }
}

/// One over the size of a texture `shift` levels below the viewport.
pub(crate) fn texel_size((width, height): (u32, u32), shift: u32) -> Vec2 {
    let w = (width >> shift).max(1) as f32;
    let h = (height >> shift).max(1) as f32;
    Vec2::new(1.0 / w, 1.0 / h)
}
