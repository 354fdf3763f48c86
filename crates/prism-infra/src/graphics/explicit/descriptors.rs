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

//! Bind groups cached per owning resource.

use crate::graphics::common::deletion::GpuObject;
use prism_core::renderer::{
    BackendStats, BindGroupDescriptor, BindGroupId, BindingResource, GraphicsDevice,
    ResourceError, ResourceId,
};
use std::collections::HashMap;

#[derive(Debug)]
struct CachedGroup {
    generation: u64,
    resources: Vec<BindingResource>,
    group: BindGroupId,
}

/// Long-lived resource bind groups.
///
/// A group is rebuilt when its owner's generation changes or when it must
/// point at different native objects (a global texture was swapped, a
/// texture was resized). The old group is retired, never destroyed in
/// place.
#[derive(Debug, Default)]
pub(crate) struct DescriptorCache {
    groups: HashMap<ResourceId, CachedGroup>,
}

impl DescriptorCache {
    pub(crate) fn get_or_create(
        &mut self,
        device: &dyn GraphicsDevice,
        owner: ResourceId,
        generation: u64,
        resources: &[BindingResource],
        retired: &mut Vec<GpuObject>,
        stats: &mut BackendStats,
    ) -> Result<BindGroupId, ResourceError> {
        if let Some(cached) = self.groups.get(&owner) {
            if cached.generation == generation && cached.resources == resources {
                return Ok(cached.group);
            }
        }
        let group = device.create_bind_group(&BindGroupDescriptor {
            label: format!("{owner} resources"),
            entries: resources.to_vec(),
        })?;
        stats.descriptors_created += 1;
        let previous = self.groups.insert(
            owner,
            CachedGroup {
                generation,
                resources: resources.to_vec(),
                group,
            },
        );
        if let Some(previous) = previous {
            log::trace!("Rebuilt descriptor set of {owner}");
            retired.push(GpuObject::BindGroup(previous.group));
        }
        Ok(group)
    }

    pub(crate) fn evict(&mut self, owner: ResourceId, retired: &mut Vec<GpuObject>) {
        if let Some(cached) = self.groups.remove(&owner) {
            retired.push(GpuObject::BindGroup(cached.group));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = GpuObject> + '_ {
        self.groups
            .drain()
            .map(|(_, cached)| GpuObject::BindGroup(cached.group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::headless::HeadlessDevice;
    use prism_core::renderer::{
        GpuTextureId, MaterialInstanceId, TextureDescriptor, TextureFormat, TextureUsage,
    };

    fn texture(device: &HeadlessDevice) -> GpuTextureId {
        device
            .create_texture(&TextureDescriptor {
                label: "t".into(),
                width: 4,
                height: 4,
                layers: 1,
                mip_levels: 1,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsage::SAMPLED,
            })
            .unwrap()
    }

    #[test]
    fn groups_are_reused_until_their_inputs_change() {
        let device = HeadlessDevice::new(64, 64);
        let mut cache = DescriptorCache::default();
        let mut retired = Vec::new();
        let mut stats = BackendStats::default();
        let owner = ResourceId::from(MaterialInstanceId(7));
        let a = [BindingResource::Texture(texture(&device))];
        let b = [BindingResource::Texture(texture(&device))];

        let first = cache
            .get_or_create(&device, owner, 1, &a, &mut retired, &mut stats)
            .unwrap();
        let again = cache
            .get_or_create(&device, owner, 1, &a, &mut retired, &mut stats)
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(stats.descriptors_created, 1);

        let swapped = cache
            .get_or_create(&device, owner, 1, &b, &mut retired, &mut stats)
            .unwrap();
        assert_ne!(first, swapped);
        assert_eq!(retired.len(), 1);

        let bumped = cache
            .get_or_create(&device, owner, 2, &b, &mut retired, &mut stats)
            .unwrap();
        assert_ne!(swapped, bumped);
        assert_eq!(stats.descriptors_created, 3);
        assert_eq!(cache.len(), 1);
    }
}
