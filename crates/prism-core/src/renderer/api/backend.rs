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

//! Backend selection and per-frame reporting types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The family of backend the factory instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Legacy immediate-mode backend: one frame in flight, per-draw uniform
    /// updates and transient bindings, synchronous presentation.
    Immediate,
    /// Explicit-API backend: cached pipelines and descriptors, frame slots
    /// guarded by fences.
    #[default]
    Explicit,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Immediate => write!(f, "Immediate"),
            BackendKind::Explicit => write!(f, "Explicit"),
        }
    }
}

/// The result of starting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame may be recorded. `image_index` is the acquired swapchain image.
    Ready {
        /// Index of the acquired presentation image.
        image_index: u32,
    },
    /// The frame was dropped (stale surface, fence timeout). The host simply
    /// skips rendering and tries again next frame.
    Dropped,
}

impl FrameStatus {
    /// Returns `true` if the frame can be recorded.
    pub fn is_ready(&self) -> bool {
        matches!(self, FrameStatus::Ready { .. })
    }
}

/// Counters accumulated by a backend, reset at every `begin_frame`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Draws that reached the device.
    pub draws: u32,
    /// Draws refused by the layer rule table.
    pub rejected_draws: u32,
    /// Draws skipped because a resource was unavailable.
    pub skipped_draws: u32,
    /// Compute dispatches that reached the device.
    pub dispatches: u32,
    /// Pipelines created this frame.
    pub pipelines_created: u32,
    /// Descriptor sets (bind groups) created this frame.
    pub descriptors_created: u32,
    /// Resources realized this frame.
    pub realized: u32,
    /// Native objects destroyed this frame.
    pub destroyed: u32,
}
