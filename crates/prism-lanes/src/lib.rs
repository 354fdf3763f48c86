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

//! # Prism Lanes
//!
//! The stages of the rendering pipeline. Every stage is a
//! [`render_lane::PipelineTask`]: it owns its render textures and materials,
//! declares named input and output slots, and records its work through the
//! backend-neutral command buffer.
//!
//! Lanes never decide the frame order. The pipeline context in
//! `prism-agents` wires them by slot name and runs them in registration
//! order.

#![warn(missing_docs)]

pub mod render_lane;

pub use render_lane::{PipelineTask, TaskError, TaskFrame, TaskSlots};
