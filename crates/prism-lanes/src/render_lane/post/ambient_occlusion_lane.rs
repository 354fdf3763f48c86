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

//! Screen-space ambient occlusion.

use super::{publish, HDR_FORMAT};
use crate::render_lane::error::TaskError;
use crate::render_lane::resources::TaskResources;
use crate::render_lane::screen::{ScreenLayout, ScreenPass};
use crate::render_lane::shaders;
use crate::render_lane::slots::{self, TaskSlots};
use crate::render_lane::{PipelineTask, TaskFrame};
use prism_core::math::{Vec3, Vec4};
use prism_core::renderer::{
    FilterMode, RenderTargetId, ShaderLibrary, SharedRegistry, Texture, TextureFormat, TextureId,
    UniformValue,
};
use prism_core::scene::PostProcessSettings;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

/// Number of hemisphere samples.
pub const KERNEL_SIZE: usize = 16;
/// Side of the tiling rotation noise texture.
const NOISE_SIZE: u32 = 4;
const NOISE_MAP: &str = "noiseMap";

const KERNEL_PARAMS: [&str; KERNEL_SIZE] = [
    "kernel0", "kernel1", "kernel2", "kernel3", "kernel4", "kernel5", "kernel6", "kernel7",
    "kernel8", "kernel9", "kernel10", "kernel11", "kernel12", "kernel13", "kernel14", "kernel15",
];

/// Samples in the positive Z hemisphere, denser towards the origin.
///
/// The generator is seeded so every run produces the same kernel.
pub fn occlusion_kernel() -> [Vec4; KERNEL_SIZE] {
    let mut rng = StdRng::seed_from_u64(42);
    std::array::from_fn(|i| {
        let direction = Vec3::new(
            rng.random_range(-1.0..1.0),
            rng.random_range(-1.0..1.0),
            rng.random_range(0.01..1.0),
        )
        .normalize();
        let t = i as f32 / KERNEL_SIZE as f32;
        let scale = 0.1 + (1.0 - 0.1) * t * t;
        (direction * rng.random_range(0.0..1.0f32) * scale).extend(0.0)
    })
}

/// A 4x4 tile of random XY rotations, packed as RGBA8.
pub fn rotation_noise() -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(12345);
    (0..NOISE_SIZE * NOISE_SIZE)
        .flat_map(|_| {
            let xy = Vec3::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0), 0.0)
                .normalize_or(Vec3::X);
            [
                ((xy.x * 0.5 + 0.5) * 255.0) as u8,
                ((xy.y * 0.5 + 0.5) * 255.0) as u8,
                0,
                255,
            ]
        })
        .collect()
}

/// Darkens creases and contact points using the G-buffer normals and depth.
///
/// Three passes: raw occlusion into `ssaoMap`, a blur of that term, and the
/// multiplication of the scene colour by the blurred term.
#[derive(Debug)]
pub struct AmbientOcclusionLane {
    slots: TaskSlots,
    resources: TaskResources,
    noise: TextureId,
    occlusion: ScreenPass,
    blur: ScreenPass,
    apply: ScreenPass,
    settings: PostProcessSettings,
}

impl AmbientOcclusionLane {
    /// Declares the occlusion buffers, the noise texture and the three
    /// materials.
    pub fn new(registry: &SharedRegistry, library: &dyn ShaderLibrary) -> Self {
        let mut resources = TaskResources::new(registry);
        let mut noise = Texture::with_data(
            "aoNoise",
            NOISE_SIZE,
            NOISE_SIZE,
            TextureFormat::Rgba8Unorm,
            rotation_noise(),
        );
        noise.filter = FilterMode::Nearest;
        let noise = resources.fixed_texture(noise);

        let settings = PostProcessSettings::default();
        let mut params: Vec<(&str, UniformValue)> = vec![
            ("radius", settings.ao_radius.into()),
            ("bias", settings.ao_bias.into()),
            ("power", settings.ao_power.into()),
        ];
        params.extend(
            KERNEL_PARAMS
                .iter()
                .zip(occlusion_kernel())
                .map(|(name, sample)| (*name, UniformValue::from(sample))),
        );
        let occlusion = ScreenPass::new(
            &mut resources,
            library,
            "aoOcclusion",
            shaders::SSAO,
            TextureFormat::R8Unorm,
            0,
            ScreenLayout {
                textures: &[slots::NORMALS_MAP, slots::DEPTH_MAP, NOISE_MAP],
                params: &params,
            },
        );
        let blur = ScreenPass::new(
            &mut resources,
            library,
            "aoBlur",
            shaders::BLUR_OCCLUSION,
            TextureFormat::R8Unorm,
            0,
            ScreenLayout::INPUT_ONLY,
        );
        let apply = ScreenPass::new(
            &mut resources,
            library,
            "aoResult",
            shaders::APPLY_OCCLUSION,
            HDR_FORMAT,
            0,
            ScreenLayout {
                textures: &[slots::SSAO_MAP],
                params: &[],
            },
        );

        Self {
            slots: TaskSlots::new()
                .with_input(slots::SCENE_COLOR)
                .with_output(slots::SCENE_COLOR)
                .with_output(slots::SSAO_MAP),
            resources,
            noise,
            occlusion,
            blur,
            apply,
            settings,
        }
    }

    fn run(&mut self, frame: &mut TaskFrame<'_>, input: TextureId) -> Result<bool, TaskError> {
        if !(self.occlusion.is_ready() && self.blur.is_ready() && self.apply.is_ready()) {
            return Ok(false);
        }
        self.occlusion
            .bind(&self.resources, input, &[(NOISE_MAP, self.noise)])?;
        self.occlusion.set_params(
            &self.resources,
            &[
                ("radius", self.settings.ao_radius.into()),
                ("bias", self.settings.ao_bias.into()),
                ("power", self.settings.ao_power.into()),
            ],
        )?;
        if !self.occlusion.draw(frame)? {
            return Ok(false);
        }

        self.blur
            .bind(&self.resources, self.occlusion.output(), &[])?;
        if !self.blur.draw(frame)? {
            return Ok(false);
        }

        let occlusion = self.blur.output();
        frame.buffer.set_global_texture(slots::SSAO_MAP, occlusion);
        self.slots.set_output(slots::SSAO_MAP, Some(occlusion));
        self.apply
            .bind(&self.resources, input, &[(slots::SSAO_MAP, occlusion)])?;
        self.apply.draw(frame)
    }
}

impl PipelineTask for AmbientOcclusionLane {
    fn name(&self) -> &'static str {
        "AmbientOcclusion"
    }

    fn slots(&self) -> &TaskSlots {
        &self.slots
    }

    fn slots_mut(&mut self) -> &mut TaskSlots {
        &mut self.slots
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), TaskError> {
        self.resources.resize(width, height).map(|_| ())
    }

    fn exec(&mut self, frame: &mut TaskFrame<'_>) -> Result<(), TaskError> {
        let Some(input) = self.slots.input(slots::SCENE_COLOR) else {
            self.slots.pass_through(slots::SCENE_COLOR);
            return Ok(());
        };
        let drawn = self.run(frame, input)?;
        publish(&mut self.slots, drawn, self.apply.output());
        frame.reset_camera();
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }

    fn apply_settings(&mut self, settings: &PostProcessSettings) {
        self.settings = *settings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_stays_in_the_upper_unit_hemisphere() {
        let kernel = occlusion_kernel();
        for sample in kernel {
            assert!(sample.z >= 0.0);
            assert!(sample.truncate().length() <= 1.0 + f32::EPSILON);
            assert_eq!(sample.w, 0.0);
        }
        assert_eq!(kernel, occlusion_kernel());
    }

    #[test]
    fn noise_is_one_rgba_texel_per_cell() {
        let noise = rotation_noise();
        assert_eq!(noise.len(), (NOISE_SIZE * NOISE_SIZE * 4) as usize);
        assert!(noise.chunks(4).all(|texel| texel[2] == 0 && texel[3] == 255));
    }
}
