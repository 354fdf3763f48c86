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

//! Concrete graphics backends and the factory that picks one.

mod common;
mod context;
mod explicit;
mod headless;
mod immediate;

pub use self::context::BackendContext;
pub use self::explicit::ExplicitBackend;
pub use self::headless::{DeviceEvent, HeadlessDevice, ObjectKind};
pub use self::immediate::ImmediateBackend;

use prism_core::renderer::{BackendKind, RenderBackend, RenderError};

/// Instantiates the backend family `kind` over `context`.
///
/// # Errors
/// * `RenderError::InitializationFailed` - The configuration is invalid or
///   the device refused to create the surface.
/// * `RenderError::DeviceLost` - The device was lost before creation.
pub fn create_backend(
    kind: BackendKind,
    context: BackendContext,
) -> Result<Box<dyn RenderBackend>, RenderError> {
    context
        .config
        .validate()
        .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
    if context.device.is_lost() {
        return Err(RenderError::DeviceLost);
    }
    log::info!("Creating {kind} backend");
    Ok(match kind {
        BackendKind::Immediate => Box::new(ImmediateBackend::new(context)?),
        BackendKind::Explicit => Box::new(ExplicitBackend::new(context)?),
    })
}
