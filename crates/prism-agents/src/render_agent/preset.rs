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

//! Ready-made lane lists.

use prism_core::config::ShadowConfig;
use prism_core::renderer::{ShaderLibrary, SharedRegistry};
use prism_lanes::render_lane::{
    AmbientOcclusionLane, AntialiasingLane, BloomLane, DeferredLightingLane, DepthOfFieldLane,
    GBufferLane, ReflectionsLane, ShadowMapLane, TonemapLane, TranslucentLane, UiLane,
};
use prism_lanes::PipelineTask;

/// The deferred pipeline, in execution order: shadows, G-buffer, lighting,
/// ambient occlusion, bloom, reflections, antialiasing, depth of field,
/// tonemap, translucent and UI.
///
/// Depth of field is registered but disabled.
pub fn deferred_tasks(
    registry: &SharedRegistry,
    library: &dyn ShaderLibrary,
    shadow: &ShadowConfig,
) -> Vec<Box<dyn PipelineTask>> {
    vec![
        Box::new(ShadowMapLane::new(registry, shadow)),
        Box::new(GBufferLane::new(registry)),
        Box::new(DeferredLightingLane::new(registry, library)),
        Box::new(AmbientOcclusionLane::new(registry, library)),
        Box::new(BloomLane::new(registry, library)),
        Box::new(ReflectionsLane::new(registry, library)),
        Box::new(AntialiasingLane::new(registry, library)),
        Box::new(DepthOfFieldLane::new(registry, library)),
        Box::new(TonemapLane::new(registry, library)),
        Box::new(TranslucentLane::new(registry, library)),
        Box::new(UiLane::new(registry, library)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::{InMemoryShaderLibrary, ResourceRegistry};

    #[test]
    fn deferred_preset_runs_in_pipeline_order() {
        let registry = ResourceRegistry::shared();
        let tasks = deferred_tasks(&registry, &InMemoryShaderLibrary::new(), &ShadowConfig::default());
        let names: Vec<_> = tasks.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            [
                "ShadowMap",
                "GBuffer",
                "DeferredLighting",
                "AmbientOcclusion",
                "Bloom",
                "Reflections",
                "Antialiasing",
                "DepthOfField",
                "Tonemap",
                "Translucent",
                "UI"
            ]
        );
        let disabled: Vec<_> = tasks.iter().filter(|t| !t.is_enabled()).map(|t| t.name()).collect();
        assert_eq!(disabled, ["DepthOfField"]);
    }
}
