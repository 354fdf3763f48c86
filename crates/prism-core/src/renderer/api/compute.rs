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

//! Compute buffers, shaders and instances.

use super::ids::{ComputeBufferId, ComputeShaderId, TextureId};
use super::shader::ShaderSource;
use super::uniform::UniformValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a compute buffer is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComputeBufferUsage {
    /// Read-write storage.
    #[default]
    Storage,
    /// Read-only uniform data.
    Uniform,
}

/// A buffer read or written by compute work.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeBuffer {
    /// Debug label.
    pub label: String,
    /// Size in bytes.
    pub size: u64,
    /// Access pattern.
    pub usage: ComputeBufferUsage,
    /// Initial contents, at most `size` bytes.
    pub data: Option<Arc<[u8]>>,
}

impl ComputeBuffer {
    /// A zero-initialized storage buffer.
    pub fn storage(label: impl Into<String>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            usage: ComputeBufferUsage::Storage,
            data: None,
        }
    }
}

/// A compute program.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeShader {
    /// Debug label.
    pub label: String,
    /// The blob and its entry point.
    pub source: ShaderSource,
}

/// A compute shader bound to concrete parameters and resources.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeInstance {
    /// The program.
    pub shader: ComputeShaderId,
    /// Parameter block, in declaration order.
    pub params: Vec<(String, UniformValue)>,
    /// Buffers by binding name.
    pub buffers: BTreeMap<String, ComputeBufferId>,
    /// Textures by binding name.
    pub textures: BTreeMap<String, TextureId>,
}

impl ComputeInstance {
    /// An instance with no bindings.
    pub fn new(shader: ComputeShaderId) -> Self {
        Self {
            shader,
            params: Vec::new(),
            buffers: BTreeMap::new(),
            textures: BTreeMap::new(),
        }
    }

    /// Binds a buffer by name.
    pub fn with_buffer(mut self, name: impl Into<String>, buffer: ComputeBufferId) -> Self {
        self.buffers.insert(name.into(), buffer);
        self
    }

    /// Sets a parameter, replacing any previous value of the same name.
    pub fn set_param(&mut self, name: &str, value: impl Into<UniformValue>) {
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.params.push((name.to_owned(), value)),
        }
    }
}
