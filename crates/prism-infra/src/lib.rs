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

//! Concrete backends for the Prism rendering contracts.
//!
//! This crate implements the traits defined in `prism-core` on top of a
//! [`GraphicsDevice`](prism_core::renderer::GraphicsDevice): the in-memory
//! headless device, the legacy immediate backend, the explicit backend with
//! its frame-slot presentation surface, and the factory choosing between
//! them.

#![warn(missing_docs)]

pub mod graphics;
pub mod logging;

pub use graphics::{
    create_backend, BackendContext, DeviceEvent, ExplicitBackend, HeadlessDevice, ImmediateBackend,
    ObjectKind,
};
