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

//! # Prism Core
//!
//! Foundational crate containing the contracts of the rendering pipeline:
//! the resource lifecycle state machine, the owning resource registry, the
//! canonical layer rules, and the traits every backend implements.
//!
//! Nothing in this crate talks to a GPU. Concrete devices and backends live
//! in `prism-infra`.

#![warn(missing_docs)]

pub mod config;
pub mod math;
pub mod renderer;
pub mod scene;

pub use config::{ConfigError, RendererConfig, ShadowConfig};
