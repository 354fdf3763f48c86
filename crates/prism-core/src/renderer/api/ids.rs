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

//! Typed identifiers for registry-owned resources.
//!
//! Every id is allocated from a single registry counter, so two resources
//! never share a raw value even across kinds. Ids are never reused.

use std::fmt;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $variant:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl From<$name> for ResourceId {
            fn from(id: $name) -> Self {
                ResourceId::$variant(id)
            }
        }
    };
}

resource_id!(
    /// A handle to a texture declared in the registry.
    TextureId,
    Texture
);
resource_id!(
    /// A handle to a mesh declared in the registry.
    MeshId,
    Mesh
);
resource_id!(
    /// A handle to a material declared in the registry.
    MaterialId,
    Material
);
resource_id!(
    /// A handle to a material instance declared in the registry.
    MaterialInstanceId,
    MaterialInstance
);
resource_id!(
    /// A handle to a render target declared in the registry.
    RenderTargetId,
    RenderTarget
);
resource_id!(
    /// A handle to a compute buffer declared in the registry.
    ComputeBufferId,
    ComputeBuffer
);
resource_id!(
    /// A handle to a compute shader declared in the registry.
    ComputeShaderId,
    ComputeShader
);
resource_id!(
    /// A handle to a compute shader instance declared in the registry.
    ComputeInstanceId,
    ComputeInstance
);

/// Any registry-owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum ResourceId {
    Texture(TextureId),
    Mesh(MeshId),
    Material(MaterialId),
    MaterialInstance(MaterialInstanceId),
    RenderTarget(RenderTargetId),
    ComputeBuffer(ComputeBufferId),
    ComputeShader(ComputeShaderId),
    ComputeInstance(ComputeInstanceId),
}

impl ResourceId {
    /// The raw registry value.
    pub fn raw(&self) -> u64 {
        match *self {
            ResourceId::Texture(id) => id.0,
            ResourceId::Mesh(id) => id.0,
            ResourceId::Material(id) => id.0,
            ResourceId::MaterialInstance(id) => id.0,
            ResourceId::RenderTarget(id) => id.0,
            ResourceId::ComputeBuffer(id) => id.0,
            ResourceId::ComputeShader(id) => id.0,
            ResourceId::ComputeInstance(id) => id.0,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Texture(id) => write!(f, "texture#{}", id.0),
            ResourceId::Mesh(id) => write!(f, "mesh#{}", id.0),
            ResourceId::Material(id) => write!(f, "material#{}", id.0),
            ResourceId::MaterialInstance(id) => write!(f, "instance#{}", id.0),
            ResourceId::RenderTarget(id) => write!(f, "target#{}", id.0),
            ResourceId::ComputeBuffer(id) => write!(f, "compute-buffer#{}", id.0),
            ResourceId::ComputeShader(id) => write!(f, "compute-shader#{}", id.0),
            ResourceId::ComputeInstance(id) => write!(f, "compute-instance#{}", id.0),
        }
    }
}

/// The kind of a resource, as seen by the lifecycle transition table.
///
/// Native render targets get their own kind because their table differs:
/// they are never rebuilt by attachment changes and never destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ResourceKind {
    Texture,
    Mesh,
    Material,
    MaterialInstance,
    RenderTarget,
    NativeRenderTarget,
    ComputeBuffer,
    ComputeShader,
    ComputeInstance,
}

impl ResourceKind {
    /// Every kind, for table enumeration.
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Texture,
        ResourceKind::Mesh,
        ResourceKind::Material,
        ResourceKind::MaterialInstance,
        ResourceKind::RenderTarget,
        ResourceKind::NativeRenderTarget,
        ResourceKind::ComputeBuffer,
        ResourceKind::ComputeShader,
        ResourceKind::ComputeInstance,
    ];
}

/// An opaque, backend-owned handle to the native object behind a resource.
///
/// Backends encode their own device identifiers into it. It is only handed
/// out while the resource is `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// Wraps a raw backend value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw backend value.
    pub const fn raw(&self) -> u64 {
        self.0
    }
}
