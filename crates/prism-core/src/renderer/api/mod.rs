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

//! Backend-neutral data types of the rendering pipeline.

pub mod backend;
pub mod compute;
pub mod device;
pub mod ids;
pub mod layer;
pub mod lifecycle;
pub mod material;
pub mod mesh;
pub mod shader;
pub mod target;
pub mod texture;
pub mod uniform;

pub use self::backend::*;
pub use self::compute::*;
pub use self::device::*;
pub use self::ids::*;
pub use self::layer::*;
pub use self::lifecycle::*;
pub use self::material::*;
pub use self::mesh::*;
pub use self::shader::*;
pub use self::target::*;
pub use self::texture::*;
pub use self::uniform::*;
