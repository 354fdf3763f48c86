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

//! Bloom: bright areas bleed into their surroundings.

use super::{publish, texel_size, HDR_FORMAT};
use crate::render_lane::error::TaskError;
use crate::render_lane::resources::TaskResources;
use crate::render_lane::screen::{ScreenLayout, ScreenPass};
use crate::render_lane::shaders;
use crate::render_lane::slots::{self, TaskSlots};
use crate::render_lane::{PipelineTask, TaskFrame};
use prism_core::math::{Vec2, Vec4};
use prism_core::renderer::{
    BlendMode, RenderTarget, RenderTargetId, ShaderLibrary, SharedRegistry, TextureFormat, TextureId,
    UniformValue,
};
use prism_core::scene::PostProcessSettings;

/// Number of downsampled levels.
pub const BLOOM_PASSES: usize = 5;
/// Maximum taps of one blur direction.
pub const MAX_SAMPLES: usize = 32;
/// Blur size of each level, in percent of the level width.
const BLUR_SIZES: [f32; BLOOM_PASSES] = [1.0, 4.0, 16.0, 32.0, 64.0];
const LEVEL_LABELS: [&str; BLOOM_PASSES] =
    ["bloomDown0", "bloomDown1", "bloomDown2", "bloomDown3", "bloomDown4"];
const CURVE_PARAMS: [&str; MAX_SAMPLES / 4] = [
    "curve0", "curve1", "curve2", "curve3", "curve4", "curve5", "curve6", "curve7",
];

/// Gaussian weights for `steps` taps, normalized so they sum to one half.
/// Unused taps are zero.
pub fn generate_kernel(radius: f32, steps: usize) -> [f32; MAX_SAMPLES] {
    let mut points = [0.0; MAX_SAMPLES];
    let steps = steps.min(MAX_SAMPLES);
    if steps == 0 || radius <= 0.0 {
        return points;
    }
    for (p, point) in points.iter_mut().enumerate().take(steps) {
        *point = (-((p * p) as f32) / (2.0 * radius)).exp();
    }
    let total: f32 = points.iter().sum();
    for point in points.iter_mut().take(steps) {
        *point *= 0.5 / total;
    }
    points
}

/// Radius and tap count of the blur of `level` for a given viewport width.
fn blur_shape(width: u32, level: usize) -> (f32, usize) {
    let level_width = (width >> level).max(1) as f32;
    let radius = level_width * BLUR_SIZES[level] * 2.0 * 0.01;
    (radius, (radius as usize).min(MAX_SAMPLES))
}

fn curve_params(points: &[f32; MAX_SAMPLES]) -> impl Iterator<Item = (&'static str, UniformValue)> + '_ {
    CURVE_PARAMS
        .iter()
        .zip(points.chunks_exact(4))
        .map(|(name, c)| (*name, UniformValue::from(Vec4::new(c[0], c[1], c[2], c[3]))))
}

#[derive(Debug)]
struct BloomLevel {
    down: ScreenPass,
    horizontal: ScreenPass,
    vertical: ScreenPass,
}

/// Thresholds the scene colour into a chain of downsampled levels, blurs
/// every level and adds the blurred levels back on top of the scene.
///
/// The half resolution level is also published as `downsampleMap`, which
/// depth of field uses as its blurred source.
#[derive(Debug)]
pub struct BloomLane {
    slots: TaskSlots,
    resources: TaskResources,
    levels: Vec<BloomLevel>,
    combine: ScreenPass,
    threshold: f32,
}

impl BloomLane {
    /// Declares the level chain, the blur scratch buffer and the result.
    pub fn new(registry: &SharedRegistry, library: &dyn ShaderLibrary) -> Self {
        let mut resources = TaskResources::new(registry);
        let threshold = PostProcessSettings::default().bloom_threshold;

        let combine = ScreenPass::new(
            &mut resources,
            library,
            "bloomResult",
            shaders::BLOOM_COMBINE,
            HDR_FORMAT,
            0,
            ScreenLayout::INPUT_ONLY,
        );
        let scratch = resources.render_texture("bloomScratch", TextureFormat::Rg11B10Float, 0);
        let scratch_target = resources.target(RenderTarget::new("bloomScratch").with_color(0, scratch));

        let blur_params: &[(&str, UniformValue)] = &[
            ("direction", UniformValue::Vec2(Vec2::X)),
            ("steps", UniformValue::Int(0)),
            ("size", UniformValue::Vec2(Vec2::ONE)),
            ("curve0", UniformValue::Vec4(Vec4::ZERO)),
            ("curve1", UniformValue::Vec4(Vec4::ZERO)),
            ("curve2", UniformValue::Vec4(Vec4::ZERO)),
            ("curve3", UniformValue::Vec4(Vec4::ZERO)),
            ("curve4", UniformValue::Vec4(Vec4::ZERO)),
            ("curve5", UniformValue::Vec4(Vec4::ZERO)),
            ("curve6", UniformValue::Vec4(Vec4::ZERO)),
            ("curve7", UniformValue::Vec4(Vec4::ZERO)),
        ];
        let blur_layout = ScreenLayout {
            textures: &[],
            params: blur_params,
        };

        let levels = LEVEL_LABELS
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let down = ScreenPass::new(
                    &mut resources,
                    library,
                    *label,
                    shaders::DOWNSAMPLE,
                    TextureFormat::Rg11B10Float,
                    i as u32,
                    ScreenLayout {
                        textures: &[],
                        params: &[("threshold", UniformValue::Float(threshold))],
                    },
                );
                let horizontal = ScreenPass::into_target(
                    &mut resources,
                    library,
                    "bloomBlurH",
                    shaders::BLUR,
                    (scratch_target, scratch),
                    BlendMode::Opaque,
                    blur_layout,
                );
                let vertical = ScreenPass::into_target(
                    &mut resources,
                    library,
                    "bloomBlurV",
                    shaders::BLUR,
                    (combine.target(), combine.output()),
                    BlendMode::Additive,
                    blur_layout,
                );
                BloomLevel {
                    down,
                    horizontal,
                    vertical,
                }
            })
            .collect();

        Self {
            slots: TaskSlots::new()
                .with_input(slots::SCENE_COLOR)
                .with_output(slots::SCENE_COLOR)
                .with_output(slots::DOWNSAMPLE_MAP),
            resources,
            levels,
            combine,
            threshold,
        }
    }

    fn is_ready(&self) -> bool {
        self.combine.is_ready()
            && self
                .levels
                .iter()
                .all(|l| l.down.is_ready() && l.horizontal.is_ready() && l.vertical.is_ready())
    }

    /// Recomputes the blur kernels for the current viewport.
    fn update_kernels(&self) -> Result<(), TaskError> {
        let size = self.resources.size();
        let texel = texel_size(size, 0);
        for (i, level) in self.levels.iter().enumerate() {
            let (radius, steps) = blur_shape(size.0, i);
            let points = generate_kernel(radius, steps);
            for (pass, direction) in [(&level.horizontal, Vec2::X), (&level.vertical, Vec2::Y)] {
                let mut params = vec![
                    ("direction", UniformValue::Vec2(direction)),
                    ("steps", UniformValue::Int(steps as i32)),
                    ("size", UniformValue::Vec2(texel)),
                ];
                params.extend(curve_params(&points));
                pass.set_params(&self.resources, &params)?;
            }
        }
        Ok(())
    }

    fn run(&mut self, frame: &mut TaskFrame<'_>, input: TextureId) -> Result<bool, TaskError> {
        if !self.is_ready() {
            return Ok(false);
        }

        frame.buffer.begin_debug_marker("Downsample");
        let mut source = input;
        for level in &self.levels {
            level.down.bind(&self.resources, source, &[])?;
            level
                .down
                .set_params(&self.resources, &[("threshold", self.threshold.into())])?;
            if !level.down.draw(frame)? {
                frame.buffer.end_debug_marker();
                return Ok(false);
            }
            source = level.down.output();
        }
        frame.buffer.end_debug_marker();

        self.combine.bind(&self.resources, input, &[])?;
        if !self.combine.draw(frame)? {
            return Ok(false);
        }

        frame.buffer.begin_debug_marker("Blur");
        for level in &self.levels {
            level
                .horizontal
                .bind(&self.resources, level.down.output(), &[])?;
            level
                .vertical
                .bind(&self.resources, level.horizontal.output(), &[])?;
            // A level that fails to blur only loses its own contribution.
            if level.horizontal.draw(frame)? {
                level.vertical.draw(frame)?;
            }
        }
        frame.buffer.end_debug_marker();
        Ok(true)
    }
}

impl PipelineTask for BloomLane {
    fn name(&self) -> &'static str {
        "Bloom"
    }

    fn slots(&self) -> &TaskSlots {
        &self.slots
    }

    fn slots_mut(&mut self) -> &mut TaskSlots {
        &mut self.slots
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), TaskError> {
        if self.resources.resize(width, height)? {
            self.update_kernels()?;
        }
        Ok(())
    }

    fn exec(&mut self, frame: &mut TaskFrame<'_>) -> Result<(), TaskError> {
        let Some(input) = self.slots.input(slots::SCENE_COLOR) else {
            self.slots.pass_through(slots::SCENE_COLOR);
            return Ok(());
        };
        let drawn = self.run(frame, input)?;
        publish(&mut self.slots, drawn, self.combine.output());
        let downsample = drawn.then(|| self.levels[1].down.output());
        self.slots.set_output(slots::DOWNSAMPLE_MAP, downsample);
        frame.reset_camera();
        Ok(())
    }

    fn owned_targets(&self) -> Vec<RenderTargetId> {
        self.resources.targets().to_vec()
    }

    fn apply_settings(&mut self, settings: &PostProcessSettings) {
        self.threshold = settings.bloom_threshold;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn kernel_sums_to_one_half() {
        let points = generate_kernel(12.0, 12);
        let total: f32 = points.iter().sum();
        assert_relative_eq!(total, 0.5, epsilon = 1e-5);
        assert!(points[..12].windows(2).all(|w| w[0] >= w[1]));
        assert!(points[12..].iter().all(|p| *p == 0.0));
    }

    #[test]
    fn degenerate_kernel_is_empty() {
        assert!(generate_kernel(0.0, 8).iter().all(|p| *p == 0.0));
        assert!(generate_kernel(4.0, 0).iter().all(|p| *p == 0.0));
    }

    #[test]
    fn wide_levels_clamp_their_taps() {
        let (radius, steps) = blur_shape(1920, 0);
        assert_relative_eq!(radius, 38.4, epsilon = 1e-3);
        assert_eq!(steps, MAX_SAMPLES);

        let (_, steps) = blur_shape(1920, 4);
        assert_eq!(steps, MAX_SAMPLES);
        let (_, steps) = blur_shape(64, 0);
        assert_eq!(steps, 1);
    }
}
