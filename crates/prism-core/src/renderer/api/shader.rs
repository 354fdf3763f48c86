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

//! Shader sources and variants.
//!
//! Shader text is authored and compiled elsewhere. The pipeline only
//! carries opaque source blobs per stage and variant, and hands them to the
//! device's module-creation call.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The vertex-processing variant of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum VertexVariant {
    /// Rigid geometry.
    #[default]
    Static,
    /// Geometry deformed by a joint palette.
    Skinned,
    /// Camera-facing particle quads.
    Particle,
}

/// The fragment-processing variant of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum FragmentVariant {
    /// Regular lit output.
    #[default]
    Default,
    /// Visibility-only output used for picking and shadow casting.
    Visibility,
}

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
    /// Compute stage.
    Compute,
}

/// The payload of a shader module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderCode {
    /// Source text in whatever language the device understands.
    Text(Arc<str>),
    /// Pre-compiled words (for example SPIR-V).
    Binary(Arc<[u32]>),
}

impl ShaderCode {
    /// Returns `true` if the blob carries nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            ShaderCode::Text(text) => text.trim().is_empty(),
            ShaderCode::Binary(words) => words.is_empty(),
        }
    }
}

/// One shader blob with its entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    /// The blob handed to the device.
    pub code: ShaderCode,
    /// The function the stage starts in.
    pub entry_point: Arc<str>,
}

impl ShaderSource {
    /// A text source with the given entry point.
    pub fn text(code: impl Into<Arc<str>>, entry_point: impl Into<Arc<str>>) -> Self {
        Self {
            code: ShaderCode::Text(code.into()),
            entry_point: entry_point.into(),
        }
    }
}

/// All shader blobs of a material, keyed by variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderSources {
    /// Vertex stage blobs.
    pub vertex: BTreeMap<VertexVariant, ShaderSource>,
    /// Fragment stage blobs.
    pub fragment: BTreeMap<FragmentVariant, ShaderSource>,
}

impl ShaderSources {
    /// A source set with one static vertex and one default fragment blob.
    pub fn simple(vertex: ShaderSource, fragment: ShaderSource) -> Self {
        let mut sources = Self::default();
        sources.vertex.insert(VertexVariant::Static, vertex);
        sources.fragment.insert(FragmentVariant::Default, fragment);
        sources
    }

    /// Adds or replaces a vertex variant.
    pub fn with_vertex(mut self, variant: VertexVariant, source: ShaderSource) -> Self {
        self.vertex.insert(variant, source);
        self
    }

    /// Adds or replaces a fragment variant.
    pub fn with_fragment(mut self, variant: FragmentVariant, source: ShaderSource) -> Self {
        self.fragment.insert(variant, source);
        self
    }

    /// Returns `true` when no stage has a blob.
    pub fn is_empty(&self) -> bool {
        self.vertex.is_empty() && self.fragment.is_empty()
    }
}

/// Provides shader sources by name.
///
/// This is the seam to the asset collaborator that owns shader authoring.
pub trait ShaderLibrary: Send + Sync {
    /// Returns the sources registered under `name`.
    fn sources(&self, name: &str) -> Option<ShaderSources>;

    /// Returns the compute blob registered under `name`.
    fn compute_source(&self, name: &str) -> Option<ShaderSource> {
        let _ = name;
        None
    }
}

/// A [`ShaderLibrary`] backed by a hash map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryShaderLibrary {
    graphics: HashMap<String, ShaderSources>,
    compute: HashMap<String, ShaderSource>,
}

impl InMemoryShaderLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers graphics sources under `name`.
    pub fn insert(&mut self, name: impl Into<String>, sources: ShaderSources) -> &mut Self {
        self.graphics.insert(name.into(), sources);
        self
    }

    /// Registers a compute blob under `name`.
    pub fn insert_compute(&mut self, name: impl Into<String>, source: ShaderSource) -> &mut Self {
        self.compute.insert(name.into(), source);
        self
    }
}

impl ShaderLibrary for InMemoryShaderLibrary {
    fn sources(&self, name: &str) -> Option<ShaderSources> {
        self.graphics.get(name).cloned()
    }

    fn compute_source(&self, name: &str) -> Option<ShaderSource> {
        self.compute.get(name).cloned()
    }
}
