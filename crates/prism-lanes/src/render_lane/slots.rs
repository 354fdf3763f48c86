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

//! Named input and output slots.
//!
//! Slots are matched by name, never by position across lanes. The names
//! below are the ones the built-in lanes agree on.

use prism_core::renderer::TextureId;

/// The colour chain every post-process lane reads and writes.
pub const SCENE_COLOR: &str = "sceneColor";
/// G-buffer world-space normals.
pub const NORMALS_MAP: &str = "normalsMap";
/// G-buffer albedo.
pub const DIFFUSE_MAP: &str = "diffuseMap";
/// G-buffer roughness, metalness and occlusion.
pub const PARAMS_MAP: &str = "paramsMap";
/// G-buffer emission, also the light accumulation buffer.
pub const EMISSIVE_MAP: &str = "emissiveMap";
/// Scene depth.
pub const DEPTH_MAP: &str = "depthMap";
/// The shadow atlas depth surface.
pub const SHADOW_MAP: &str = "shadowMap";
/// Screen-space ambient occlusion.
pub const SSAO_MAP: &str = "ssaoMap";
/// Screen-space reflections.
pub const SSLR_MAP: &str = "sslrMap";
/// Half resolution colour produced by bloom.
pub const DOWNSAMPLE_MAP: &str = "downsampleMap";

#[derive(Debug, Clone)]
struct Slot {
    name: &'static str,
    texture: Option<TextureId>,
}

/// The named, ordered inputs and outputs of a lane, and its on/off switch.
#[derive(Debug, Clone)]
pub struct TaskSlots {
    inputs: Vec<Slot>,
    outputs: Vec<Slot>,
    enabled: bool,
}

impl Default for TaskSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskSlots {
    /// No slots, enabled.
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            enabled: true,
        }
    }

    /// Declares the next input.
    pub fn with_input(mut self, name: &'static str) -> Self {
        self.inputs.push(Slot { name, texture: None });
        self
    }

    /// Declares the next output.
    pub fn with_output(mut self, name: &'static str) -> Self {
        self.outputs.push(Slot { name, texture: None });
        self
    }

    /// Input names in order.
    pub fn input_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.inputs.iter().map(|slot| slot.name)
    }

    /// Output names and their current textures, in order.
    pub fn outputs(&self) -> impl Iterator<Item = (&'static str, Option<TextureId>)> + '_ {
        self.outputs.iter().map(|slot| (slot.name, slot.texture))
    }

    /// Binds input `index`. Out of range indices are ignored.
    pub fn set_input(&mut self, index: usize, texture: Option<TextureId>) {
        if let Some(slot) = self.inputs.get_mut(index) {
            slot.texture = texture;
        }
    }

    /// The texture bound to the named input.
    pub fn input(&self, name: &str) -> Option<TextureId> {
        self.inputs
            .iter()
            .find(|slot| slot.name == name)
            .and_then(|slot| slot.texture)
    }

    /// Publishes `texture` under the named output.
    pub fn set_output(&mut self, name: &str, texture: Option<TextureId>) {
        match self.outputs.iter_mut().find(|slot| slot.name == name) {
            Some(slot) => slot.texture = texture,
            None => log::warn!("Output slot '{name}' is not declared"),
        }
    }

    /// The texture published under the named output.
    pub fn output(&self, name: &str) -> Option<TextureId> {
        self.outputs
            .iter()
            .find(|slot| slot.name == name)
            .and_then(|slot| slot.texture)
    }

    /// Publishes the named input under the output of the same name.
    ///
    /// This is what a lane does when it cannot run its material.
    pub fn pass_through(&mut self, name: &str) {
        let input = self.input(name);
        self.set_output(name, input);
    }

    /// Returns `false` when the lane is switched off.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Switches the lane on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> TaskSlots {
        TaskSlots::new()
            .with_input(SCENE_COLOR)
            .with_input(DEPTH_MAP)
            .with_output(SCENE_COLOR)
    }

    #[test]
    fn inputs_are_bound_by_position_and_read_by_name() {
        let mut slots = chain();
        slots.set_input(1, Some(TextureId(4)));
        slots.set_input(9, Some(TextureId(5)));

        assert_eq!(slots.input(DEPTH_MAP), Some(TextureId(4)));
        assert_eq!(slots.input(SCENE_COLOR), None);
        assert_eq!(
            slots.input_names().collect::<Vec<_>>(),
            vec![SCENE_COLOR, DEPTH_MAP]
        );
    }

    #[test]
    fn pass_through_publishes_the_input() {
        let mut slots = chain();
        slots.set_input(0, Some(TextureId(2)));
        slots.set_output(SCENE_COLOR, Some(TextureId(3)));

        slots.pass_through(SCENE_COLOR);

        assert_eq!(slots.output(SCENE_COLOR), Some(TextureId(2)));
    }

    #[test]
    fn undeclared_outputs_are_ignored() {
        let mut slots = chain();
        slots.set_output("missing", Some(TextureId(1)));
        assert_eq!(slots.outputs().count(), 1);
        assert_eq!(slots.output("missing"), None);
    }
}
