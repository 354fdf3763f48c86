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

//! Defines the hierarchy of error types for the rendering subsystem.

use crate::renderer::api::device::ShaderModuleId;
use crate::renderer::api::ids::{RenderTargetId, ResourceId, ResourceKind};
use crate::renderer::api::lifecycle::{LifecycleEvent, ResourceState};
use std::fmt;

/// An error related to the creation or compilation of a shader module.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderError {
    /// The material declares no blob for the requested variant.
    MissingVariant {
        /// Label of the material.
        label: String,
        /// The missing variant, as text.
        variant: String,
    },
    /// The shader source failed to compile into a backend-specific module.
    CompilationError {
        /// A descriptive label for the shader, if available.
        label: String,
        /// Detailed error messages from the shader compiler.
        details: String,
    },
    /// The requested shader module could not be found.
    NotFound {
        /// The ID of the shader module that was not found.
        id: ShaderModuleId,
    },
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::MissingVariant { label, variant } => {
                write!(f, "Material '{label}' has no {variant} shader variant")
            }
            ShaderError::CompilationError { label, details } => {
                write!(f, "Shader compilation failed for '{label}': {details}")
            }
            ShaderError::NotFound { id } => {
                write!(f, "Shader module not found for ID: {id:?}")
            }
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation of a graphics or compute pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A shader stage could not be built.
    Shader(ShaderError),
    /// The backend failed to compile the full pipeline state object.
    CompilationFailed {
        /// A descriptive label for the pipeline, if available.
        label: Option<String>,
        /// Detailed error messages from the backend.
        details: String,
    },
    /// The color target format is not compatible with the pipeline or device.
    IncompatibleColorTarget(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Shader(err) => write!(f, "Pipeline shader stage failed: {err}"),
            PipelineError::CompilationFailed { label, details } => {
                write!(
                    f,
                    "Pipeline compilation failed for '{}': {}",
                    label.as_deref().unwrap_or("Unknown"),
                    details
                )
            }
            PipelineError::IncompatibleColorTarget(msg) => {
                write!(f, "Incompatible color target format: {msg}")
            }
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Shader(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for PipelineError {
    fn from(err: ShaderError) -> Self {
        PipelineError::Shader(err)
    }
}

/// An error related to the creation or use of a GPU resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// A shader-specific error occurred.
    Shader(ShaderError),
    /// A pipeline-specific error occurred.
    Pipeline(PipelineError),
    /// The resource id is not (or no longer) registered.
    NotFound(ResourceId),
    /// The handle or ID used to reference a native object is invalid.
    InvalidHandle,
    /// The declared data is inconsistent (sizes, ranges, formats).
    InvalidDescription(String),
    /// The device could not allocate the requested memory.
    OutOfMemory {
        /// Bytes requested.
        requested: u64,
    },
    /// The device was lost while creating the resource.
    DeviceLost,
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
    /// An attempt was made to access a resource out of its bounds.
    OutOfBounds,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "Shader resource error: {err}"),
            ResourceError::Pipeline(err) => write!(f, "Pipeline resource error: {err}"),
            ResourceError::NotFound(id) => write!(f, "Resource not found with ID {id}."),
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::InvalidDescription(msg) => {
                write!(f, "Invalid resource description: {msg}")
            }
            ResourceError::OutOfMemory { requested } => {
                write!(f, "Out of device memory ({requested} bytes requested).")
            }
            ResourceError::DeviceLost => write!(f, "The device was lost."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
            ResourceError::OutOfBounds => {
                write!(f, "Resource access out of bounds.")
            }
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            ResourceError::Pipeline(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

impl From<PipelineError> for ResourceError {
    fn from(err: PipelineError) -> Self {
        ResourceError::Pipeline(err)
    }
}

/// An error reported by the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceError {
    /// The swapchain no longer matches the surface and must be rebuilt.
    OutOfDate,
    /// The surface itself is gone.
    Lost,
    /// No image became available in time.
    Timeout,
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::OutOfDate => write!(f, "The swapchain is out of date."),
            SurfaceError::Lost => write!(f, "The presentation surface was lost."),
            SurfaceError::Timeout => write!(f, "Timed out acquiring a swapchain image."),
        }
    }
}

impl std::error::Error for SurfaceError {}

/// A render target whose attachments cannot form a framebuffer.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentError {
    /// The offending target.
    pub target: RenderTargetId,
    /// What is wrong with it.
    pub reason: String,
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Render target {:?} is incomplete: {}", self.target, self.reason)
    }
}

impl std::error::Error for AttachmentError {}

/// An event the lifecycle table rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleError {
    /// The resource kind whose table was consulted.
    pub kind: ResourceKind,
    /// The state the resource was in.
    pub state: ResourceState,
    /// The rejected event.
    pub event: LifecycleEvent,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Illegal lifecycle event {:?} for {:?} in state {:?}",
            self.event, self.kind, self.state
        )
    }
}

impl std::error::Error for LifecycleError {}

/// A high-level error that reaches the host.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A failure occurred during the initialization of the graphics backend.
    InitializationFailed(String),
    /// The presentation surface failed in a way a rebuild cannot fix.
    Surface(SurfaceError),
    /// A render target failed strict attachment validation.
    AttachmentMismatch(AttachmentError),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// `end_frame` was called without a matching `begin_frame`.
    NoFrameInProgress,
    /// The graphics device was lost. The backend is disabled for good.
    DeviceLost,
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::InitializationFailed(msg) => {
                write!(f, "Failed to initialize graphics backend: {msg}")
            }
            RenderError::Surface(err) => write!(f, "Presentation failed: {err}"),
            RenderError::AttachmentMismatch(err) => {
                write!(f, "Attachment validation failed: {err}")
            }
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::NoFrameInProgress => write!(f, "No frame is being recorded."),
            RenderError::DeviceLost => write!(
                f,
                "The graphics device was lost and needs to be reinitialized."
            ),
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Surface(err) => Some(err),
            RenderError::AttachmentMismatch(err) => Some(err),
            RenderError::ResourceError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::DeviceLost => RenderError::DeviceLost,
            other => RenderError::ResourceError(other),
        }
    }
}

impl From<AttachmentError> for RenderError {
    fn from(err: AttachmentError) -> Self {
        RenderError::AttachmentMismatch(err)
    }
}

impl From<SurfaceError> for RenderError {
    fn from(err: SurfaceError) -> Self {
        RenderError::Surface(err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn shader_error_display() {
        let err = ShaderError::CompilationError {
            label: "MyShader".to_string(),
            details: "Syntax error at line 5".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Shader compilation failed for 'MyShader': Syntax error at line 5"
        );
    }

    #[test]
    fn render_error_display_wrapping_resource_error() {
        let shader_err = ShaderError::NotFound {
            id: ShaderModuleId(101),
        };
        let res_err: ResourceError = shader_err.into();
        let render_err: RenderError = res_err.into();
        assert_eq!(
            format!("{render_err}"),
            "Graphics resource operation failed: Shader resource error: Shader module not found for ID: ShaderModuleId(101)"
        );
        assert!(render_err.source().is_some());
        assert!(render_err.source().unwrap().source().is_some());
    }

    #[test]
    fn device_loss_is_not_wrapped() {
        let err: RenderError = ResourceError::DeviceLost.into();
        assert_eq!(err, RenderError::DeviceLost);
    }

    #[test]
    fn attachment_mismatch_keeps_its_source() {
        let err: RenderError = AttachmentError {
            target: RenderTargetId(4),
            reason: "depth is 64x64, color is 32x32".into(),
        }
        .into();
        assert!(matches!(err, RenderError::AttachmentMismatch(_)));
        assert!(err.source().is_some());
    }
}
