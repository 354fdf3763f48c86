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

//! Materials and their instances.
//!
//! A [`Material`] owns the shader sources and the fixed-function state; a
//! [`MaterialInstance`] belongs to exactly one material and overrides
//! parameter values and texture bindings. Instances are registered as
//! dependents of their material, so reloading the material's sources
//! invalidates every instance's backend descriptor state.

use super::ids::{MaterialId, TextureId};
use super::layer::{BlendMode, LayerMask};
use super::shader::{ShaderSources, VertexVariant};
use super::uniform::{pack_std140, UniformValue};
use std::collections::HashMap;

/// A declared material parameter and its default value.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialParam {
    /// Uniform name.
    pub name: String,
    /// Value used when an instance does not override it.
    pub default: UniformValue,
}

/// A declared texture slot and its default binding.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSlot {
    /// Sampler name.
    pub name: String,
    /// Texture bound when neither the instance nor a frame-global texture
    /// provides one.
    pub default: Option<TextureId>,
}

/// A material as declared by its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Debug label.
    pub label: String,
    /// Shader blobs per variant.
    pub sources: ShaderSources,
    /// Blend configuration, gating which layers may use the material.
    pub blend: BlendMode,
    /// Layers the material takes part in (used to partition culled lists).
    pub layers: LayerMask,
    /// Disables back-face culling.
    pub double_sided: bool,
    /// Depth testing against the current depth attachment.
    pub depth_test: bool,
    /// Depth writes.
    pub depth_write: bool,
    /// Sort key, lower draws first.
    pub priority: i32,
    /// Parameters, in block order.
    pub params: Vec<MaterialParam>,
    /// Texture slots, in binding order.
    pub textures: Vec<TextureSlot>,
}

impl Material {
    /// A material with default state for the given blend mode.
    pub fn new(label: impl Into<String>, sources: ShaderSources, blend: BlendMode) -> Self {
        Self {
            label: label.into(),
            sources,
            blend,
            layers: blend.default_layers(),
            double_sided: false,
            depth_test: !blend.is_blending(),
            depth_write: !blend.is_blending(),
            priority: 0,
            params: Vec::new(),
            textures: Vec::new(),
        }
    }

    /// A material for screen-space passes: no depth, drawn in the UI layer.
    pub fn screen(label: impl Into<String>, sources: ShaderSources) -> Self {
        Self {
            layers: LayerMask::UI,
            double_sided: true,
            depth_test: false,
            depth_write: false,
            ..Self::new(label, sources, BlendMode::Opaque)
        }
    }

    /// Declares a parameter.
    pub fn with_param(mut self, name: impl Into<String>, default: impl Into<UniformValue>) -> Self {
        self.params.push(MaterialParam {
            name: name.into(),
            default: default.into(),
        });
        self
    }

    /// Declares a texture slot.
    pub fn with_texture(mut self, name: impl Into<String>, default: Option<TextureId>) -> Self {
        self.textures.push(TextureSlot {
            name: name.into(),
            default,
        });
        self
    }

    /// Overrides the layer mask.
    pub fn with_layers(mut self, layers: LayerMask) -> Self {
        self.layers = layers;
        self
    }

    /// Index of the named texture slot.
    pub fn texture_slot(&self, name: &str) -> Option<usize> {
        self.textures.iter().position(|slot| slot.name == name)
    }

    /// Index of the named parameter.
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|param| param.name == name)
    }
}

/// One use of a material with its own parameter values and textures.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialInstance {
    /// The owning material.
    pub material: MaterialId,
    /// Vertex variant used when drawing with this instance.
    pub vertex: VertexVariant,
    /// Parameter overrides.
    pub params: HashMap<String, UniformValue>,
    /// Texture overrides by slot name.
    pub textures: HashMap<String, TextureId>,
    /// Sort key override.
    pub priority: Option<i32>,
}

impl MaterialInstance {
    /// A static-geometry instance with no overrides.
    pub fn new(material: MaterialId) -> Self {
        Self {
            material,
            vertex: VertexVariant::Static,
            params: HashMap::new(),
            textures: HashMap::new(),
            priority: None,
        }
    }

    /// The parameter block for `material`: declared order, instance
    /// overrides applied when their type matches the declaration.
    pub fn param_block(&self, material: &Material) -> Vec<u8> {
        let values: Vec<UniformValue> = material
            .params
            .iter()
            .map(|param| match self.params.get(&param.name) {
                Some(value) if value.same_type(&param.default) => *value,
                _ => param.default,
            })
            .collect();
        pack_std140(&values)
    }

    /// The texture bound to slot `name` by the instance or the material.
    pub fn texture(&self, material: &Material, name: &str) -> Option<TextureId> {
        self.textures.get(name).copied().or_else(|| {
            material
                .textures
                .iter()
                .find(|slot| slot.name == name)
                .and_then(|slot| slot.default)
        })
    }

    /// Effective sort key.
    pub fn priority(&self, material: &Material) -> i32 {
        self.priority.unwrap_or(material.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec4;

    fn material() -> Material {
        Material::new("m", ShaderSources::default(), BlendMode::Opaque)
            .with_param("tint", Vec4::ONE)
            .with_param("roughness", 0.5f32)
            .with_texture("albedo", Some(TextureId(1)))
            .with_texture("normals", None)
    }

    #[test]
    fn instance_overrides_take_precedence() {
        let material = material();
        let mut instance = MaterialInstance::new(MaterialId(0));
        assert_eq!(instance.texture(&material, "albedo"), Some(TextureId(1)));
        assert_eq!(instance.texture(&material, "normals"), None);

        instance.textures.insert("albedo".into(), TextureId(9));
        assert_eq!(instance.texture(&material, "albedo"), Some(TextureId(9)));
    }

    #[test]
    fn param_block_ignores_mistyped_overrides() {
        let material = material();
        let mut instance = MaterialInstance::new(MaterialId(0));
        let defaults = instance.param_block(&material);

        instance
            .params
            .insert("roughness".into(), UniformValue::Int(3));
        assert_eq!(instance.param_block(&material), defaults);

        instance
            .params
            .insert("roughness".into(), UniformValue::Float(0.25));
        assert_ne!(instance.param_block(&material), defaults);
    }

    #[test]
    fn blended_materials_skip_depth_writes() {
        let m = Material::new("glass", ShaderSources::default(), BlendMode::Translucent);
        assert!(!m.depth_write);
        assert!(m.layers.contains(LayerMask::TRANSLUCENT));
    }
}
