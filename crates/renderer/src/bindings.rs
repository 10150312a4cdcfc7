//! Descriptor resources for the scene: one uniform buffer and one descriptor
//! set per frame in flight, all sharing the model texture.
//!
//! Set `k` always points at uniform buffer `k` (binding 0) and the texture
//! (binding 1). The sets are written once and never change, so they survive
//! swapchain recreation untouched.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use viewer_rhi::RhiResult;
use viewer_rhi::buffer::{Buffer, BufferUsage};
use viewer_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, buffer_info, combined_image_sampler_binding, image_info,
    pool_sizes_for, uniform_buffer_binding, update_descriptor_sets,
};
use viewer_rhi::device::Device;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::texture::Texture;
use crate::ubo::ModelViewProjection;

pub const UNIFORM_BINDING: u32 = 0;
pub const TEXTURE_BINDING: u32 = 1;

/// Bindings of the single descriptor set layout used by the scene pipeline.
pub fn scene_layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        uniform_buffer_binding(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX),
        combined_image_sampler_binding(TEXTURE_BINDING, vk::ShaderStageFlags::FRAGMENT),
    ]
}

pub struct SceneBindings {
    // Sets are freed with the pool
    sets: Vec<vk::DescriptorSet>,
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
    uniform_buffers: Vec<Buffer>,
}

impl SceneBindings {
    pub fn new(device: Arc<Device>, texture: &Texture) -> RhiResult<Self> {
        let bindings = scene_layout_bindings();
        let layout = DescriptorSetLayout::new(device.clone(), &bindings)?;

        let set_count = MAX_FRAMES_IN_FLIGHT as u32;
        let pool = DescriptorPool::new(
            device.clone(),
            set_count,
            &pool_sizes_for(&bindings, set_count),
        )?;

        let uniform_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                Buffer::new(
                    device.clone(),
                    BufferUsage::Uniform,
                    ModelViewProjection::SIZE as vk::DeviceSize,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let layouts = [layout.handle(); MAX_FRAMES_IN_FLIGHT];
        let sets = pool.allocate(&layouts)?;

        let image_infos = [image_info(
            texture.sampler(),
            texture.image_view(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )];
        for (slot, (&set, buffer)) in sets.iter().zip(&uniform_buffers).enumerate() {
            let buffer_infos = [buffer_info(
                buffer.handle(),
                0,
                ModelViewProjection::SIZE as vk::DeviceSize,
            )];
            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(UNIFORM_BINDING)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_infos),
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(TEXTURE_BINDING)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos),
            ];
            update_descriptor_sets(&device, &writes);
            debug!("Descriptor set {} bound to uniform buffer {}", slot, slot);
        }

        info!(
            "Scene bindings created: {} descriptor sets, {} uniform buffers",
            sets.len(),
            uniform_buffers.len()
        );

        Ok(Self {
            sets,
            pool,
            layout,
            uniform_buffers,
        })
    }

    /// Overwrite uniform buffer `slot`.
    ///
    /// The caller must have waited on whichever frame last read it.
    pub fn write_uniform(&self, slot: usize, ubo: &ModelViewProjection) -> RhiResult<()> {
        self.uniform_buffers[slot].write_data(0, ubo.as_bytes())
    }

    #[inline]
    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    #[inline]
    pub fn layout(&self) -> &DescriptorSetLayout {
        &self.layout
    }

    #[inline]
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_layout_bindings() {
        let [ubo, sampler] = scene_layout_bindings();

        assert_eq!(ubo.binding, UNIFORM_BINDING);
        assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(ubo.stage_flags, vk::ShaderStageFlags::VERTEX);

        assert_eq!(sampler.binding, TEXTURE_BINDING);
        assert_eq!(
            sampler.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(sampler.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_pool_holds_one_of_each_per_frame() {
        let sizes = pool_sizes_for(&scene_layout_bindings(), MAX_FRAMES_IN_FLIGHT as u32);
        assert_eq!(sizes.len(), 2);
        for size in sizes {
            assert_eq!(size.descriptor_count, MAX_FRAMES_IN_FLIGHT as u32);
        }
    }

    #[test]
    fn test_scene_bindings_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SceneBindings>();
    }
}
