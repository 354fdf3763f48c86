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

//! Fullscreen passes shared by the post-process lanes.

use super::error::TaskError;
use super::resources::TaskResources;
use super::shaders::INPUT_SAMPLER;
use super::TaskFrame;
use prism_core::math::Mat4;
use prism_core::renderer::{
    BlendMode, DrawOutcome, LayerMask, Material, MaterialInstanceId, RenderTarget, RenderTargetId,
    ShaderLibrary, TextureFormat, TextureId, UniformValue,
};

/// One quad drawn with one material into one owned texture.
#[derive(Debug, Clone)]
pub(crate) struct ScreenPass {
    label: &'static str,
    instance: Option<MaterialInstanceId>,
    target: RenderTargetId,
    output: TextureId,
}

/// What a [`ScreenPass`] samples and which parameters it declares.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScreenLayout<'a> {
    /// Texture slots besides the input sampler. Unbound slots resolve to
    /// the frame-global texture of the same name.
    pub textures: &'a [&'a str],
    /// Parameters with their defaults.
    pub params: &'a [(&'a str, UniformValue)],
}

impl ScreenLayout<'static> {
    pub const INPUT_ONLY: Self = Self {
        textures: &[],
        params: &[],
    };
}

impl ScreenPass {
    /// Declares the output texture, its target and the material.
    pub fn new(
        resources: &mut TaskResources,
        library: &dyn ShaderLibrary,
        label: &'static str,
        program: &str,
        format: TextureFormat,
        shift: u32,
        layout: ScreenLayout<'_>,
    ) -> Self {
        let output = resources.render_texture(label, format, shift);
        let target = resources.target(RenderTarget::new(label).with_color(0, output));
        Self::into_target(
            resources,
            library,
            label,
            program,
            (target, output),
            BlendMode::Opaque,
            layout,
        )
    }

    /// Declares only the material, drawing into a target declared by
    /// another pass. Blended passes accumulate onto what is already there.
    pub fn into_target(
        resources: &mut TaskResources,
        library: &dyn ShaderLibrary,
        label: &'static str,
        program: &str,
        (target, output): (RenderTargetId, TextureId),
        blend: BlendMode,
        layout: ScreenLayout<'_>,
    ) -> Self {
        let instance = resources
            .material(library, program, |sources| {
                let mut material = Material::screen(label, sources).with_texture(INPUT_SAMPLER, None);
                material.blend = blend;
                for name in layout.textures {
                    material = material.with_texture(*name, None);
                }
                for (name, value) in layout.params {
                    material = material.with_param(*name, *value);
                }
                material
            })
            .map(|(_, instance)| instance);
        Self {
            label,
            instance,
            target,
            output,
        }
    }

    pub fn output(&self) -> TextureId {
        self.output
    }

    pub fn target(&self) -> RenderTargetId {
        self.target
    }

    /// Returns `false` when the program was missing from the library.
    pub fn is_ready(&self) -> bool {
        self.instance.is_some()
    }

    /// Binds the input sampler and any extra textures.
    pub fn bind(
        &self,
        resources: &TaskResources,
        input: TextureId,
        extra: &[(&str, TextureId)],
    ) -> Result<(), TaskError> {
        let Some(instance) = self.instance else {
            return Ok(());
        };
        let mut textures = Vec::with_capacity(extra.len() + 1);
        textures.push((INPUT_SAMPLER, input));
        textures.extend_from_slice(extra);
        resources.set_textures(instance, &textures)
    }

    pub fn set_params(
        &self,
        resources: &TaskResources,
        params: &[(&str, UniformValue)],
    ) -> Result<(), TaskError> {
        match self.instance {
            Some(instance) => resources.set_params(instance, params),
            None => Ok(()),
        }
    }

    /// Draws the quad into the output. Returns `true` only if the draw
    /// reached the device.
    pub fn draw(&self, frame: &mut TaskFrame<'_>) -> Result<bool, TaskError> {
        let Some(instance) = self.instance else {
            return Ok(false);
        };
        frame.buffer.set_render_target(self.target, 0)?;
        frame.screen_projection();
        let outcome = frame
            .buffer
            .draw_mesh(Mat4::IDENTITY, frame.quad, 0, LayerMask::UI, instance);
        match outcome {
            DrawOutcome::Drawn { .. } => Ok(true),
            other => {
                log::debug!("Screen pass '{}' did not draw: {other:?}", self.label);
                Ok(false)
            }
        }
    }
}
