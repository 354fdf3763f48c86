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

//! The presentation images and the framebuffers drawn into them.

use super::resources::TargetBinding;
use prism_core::renderer::{
    FramebufferAttachment, FramebufferDescriptor, FramebufferId, GpuTextureId, GraphicsDevice,
    ResourceError, SwapchainDescriptor, SwapchainId, TargetSignature, TextureDescriptor,
    TextureFormat, TextureUsage,
};

/// Depth format paired with every presentation image.
pub(crate) const SURFACE_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// A swapchain with one depth buffer and one framebuffer per image.
#[derive(Debug)]
pub(crate) struct Swapchain {
    id: SwapchainId,
    width: u32,
    height: u32,
    depth: Option<GpuTextureId>,
    framebuffers: Vec<TargetBinding>,
}

impl Swapchain {
    /// Creates `image_count` images of the current surface size.
    pub(crate) fn create(
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
        image_count: u32,
        vsync: bool,
    ) -> Result<Self, ResourceError> {
        let caps = device.surface_capabilities();
        let id = device.create_swapchain(&SwapchainDescriptor {
            width,
            height,
            image_count,
            format: caps.format,
            vsync,
        })?;
        let mut swapchain = Self {
            id,
            width,
            height,
            depth: None,
            framebuffers: Vec::new(),
        };
        // On failure the partial chain is torn down before returning.
        if let Err(e) = swapchain.attach(device, caps.format) {
            swapchain.destroy(device);
            return Err(e);
        }
        log::info!("Created a {width}x{height} swapchain with {image_count} image(s)");
        Ok(swapchain)
    }

    fn attach(&mut self, device: &dyn GraphicsDevice, format: TextureFormat) -> Result<(), ResourceError> {
        let depth = device.create_texture(&TextureDescriptor {
            label: "surface depth".to_owned(),
            width: self.width,
            height: self.height,
            layers: 1,
            mip_levels: 1,
            format: SURFACE_DEPTH_FORMAT,
            usage: TextureUsage::RENDER_ATTACHMENT,
        })?;
        self.depth = Some(depth);
        let signature = TargetSignature {
            colors: vec![format],
            depth: Some(SURFACE_DEPTH_FORMAT),
        };
        for (index, image) in device.swapchain_images(self.id)?.into_iter().enumerate() {
            let framebuffer = device.create_framebuffer(&FramebufferDescriptor {
                label: format!("surface image {index}"),
                colors: vec![FramebufferAttachment {
                    texture: image,
                    mip_level: 0,
                }],
                depth: Some(FramebufferAttachment {
                    texture: depth,
                    mip_level: 0,
                }),
                width: self.width,
                height: self.height,
            })?;
            self.framebuffers.push(TargetBinding {
                framebuffer,
                width: self.width,
                height: self.height,
                signature: signature.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn id(&self) -> SwapchainId {
        self.id
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn image_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// The binding for an acquired image.
    pub(crate) fn binding(&self, image: u32) -> Option<TargetBinding> {
        self.framebuffers.get(image as usize).cloned()
    }

    /// Framebuffers of every image, in index order.
    pub(crate) fn framebuffers(&self) -> impl Iterator<Item = FramebufferId> + '_ {
        self.framebuffers.iter().map(|b| b.framebuffer)
    }

    /// Destroys the chain. The caller guarantees the GPU is idle.
    pub(crate) fn destroy(self, device: &dyn GraphicsDevice) {
        for binding in &self.framebuffers {
            if let Err(e) = device.destroy_framebuffer(binding.framebuffer) {
                log::warn!("Failed to destroy a surface framebuffer: {e}");
            }
        }
        if let Some(depth) = self.depth {
            if let Err(e) = device.destroy_texture(depth) {
                log::warn!("Failed to destroy the surface depth buffer: {e}");
            }
        }
        if let Err(e) = device.destroy_swapchain(self.id) {
            log::warn!("Failed to destroy the swapchain: {e}");
        }
    }
}

/// Clamps a requested image count to what the platform supports.
pub(crate) fn clamp_image_count(device: &dyn GraphicsDevice, requested: u32) -> u32 {
    let caps = device.surface_capabilities();
    let count = requested.clamp(caps.min_images, caps.max_images.max(caps.min_images));
    if count != requested {
        log::warn!(
            "{requested} frame(s) in flight requested, platform allows {}..={}; using {count}",
            caps.min_images,
            caps.max_images
        );
    }
    count
}
