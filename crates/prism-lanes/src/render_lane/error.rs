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

use prism_core::renderer::{RenderError, ResourceError};
use thiserror::Error;

/// An error raised by a lane.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// The command buffer refused the work: strict attachment validation
    /// failed or the device is lost.
    #[error("Render error: {0}")]
    Render(#[source] RenderError),
    /// A resource owned by the lane could not be updated.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
}

impl TaskError {
    /// Returns `true` if the device behind the command buffer is gone.
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            TaskError::Render(RenderError::DeviceLost)
                | TaskError::Resource(ResourceError::DeviceLost)
        )
    }
}

impl From<RenderError> for TaskError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::ResourceError(inner) => TaskError::Resource(inner),
            other => TaskError::Render(other),
        }
    }
}

impl From<TaskError> for RenderError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Render(inner) => inner,
            TaskError::Resource(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::{AttachmentError, RenderTargetId};

    #[test]
    fn device_loss_is_recognised_from_both_sources() {
        assert!(TaskError::from(RenderError::DeviceLost).is_device_lost());
        assert!(TaskError::Resource(ResourceError::DeviceLost).is_device_lost());
        assert!(!TaskError::from(RenderError::NoFrameInProgress).is_device_lost());
    }

    #[test]
    fn attachment_mismatch_survives_the_round_trip() {
        let mismatch = RenderError::AttachmentMismatch(AttachmentError {
            target: RenderTargetId(7),
            reason: "attachment sizes differ".to_string(),
        });
        let task = TaskError::from(mismatch.clone());
        assert_eq!(RenderError::from(task), mismatch);
    }
}
