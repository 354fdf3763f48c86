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

use prism_core::renderer::{GraphicsDevice, SharedRegistry};
use prism_core::RendererConfig;
use std::sync::Arc;

/// Everything a backend is built from.
///
/// The device is shared: a backend never owns it exclusively, so a host can
/// keep a handle for diagnostics, and tests can inspect a headless device
/// while the backend drives it.
#[derive(Debug, Clone)]
pub struct BackendContext {
    /// The driver the backend records into.
    pub device: Arc<dyn GraphicsDevice>,
    /// Resource descriptions the backend realizes on first bind.
    pub registry: SharedRegistry,
    /// Validated renderer settings.
    pub config: RendererConfig,
}

impl BackendContext {
    /// Bundles a device, a registry and a configuration.
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        registry: SharedRegistry,
        config: RendererConfig,
    ) -> Self {
        Self {
            device,
            registry,
            config,
        }
    }
}
