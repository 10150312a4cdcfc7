//! Device memory selection and allocation.
//!
//! Every buffer and image in the viewer gets its own `VkDeviceMemory`
//! allocation. The memory type is chosen by scanning the device's type table
//! for the first entry allowed by the resource's requirements whose property
//! flags contain everything the caller asked for.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Find the first memory type allowed by `type_bits` whose flags contain `required`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableMemoryType`] when no type matches.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1u32 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(index, _)| index as u32)
        .ok_or(RhiError::NoSuitableMemoryType {
            type_bits,
            properties: required,
        })
}

/// A single `VkDeviceMemory` allocation, freed on drop.
pub struct DeviceMemory {
    device: Arc<Device>,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    properties: vk::MemoryPropertyFlags,
}

impl DeviceMemory {
    /// Allocate memory that satisfies `requirements` with the given properties.
    pub fn allocate(
        device: Arc<Device>,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<Self> {
        let memory_type_index = find_memory_type(
            device.memory_properties(),
            requirements.memory_type_bits,
            properties,
        )?;

        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.handle().allocate_memory(&allocate_info, None)? };

        debug!(
            "Allocated {} bytes from memory type {} ({:?})",
            requirements.size, memory_type_index, properties
        );

        Ok(Self {
            device,
            memory,
            size: requirements.size,
            properties,
        })
    }

    /// Map the whole allocation. Only valid for host-visible memory.
    pub fn map(&self) -> RhiResult<*mut u8> {
        if !self
            .properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
        {
            return Err(RhiError::InvalidHandle(
                "Cannot map memory that is not host-visible".to_string(),
            ));
        }

        let ptr = unsafe {
            self.device.handle().map_memory(
                self.memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )?
        };
        Ok(ptr.cast())
    }

    #[inline]
    pub fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        // Freeing implicitly unmaps
        unsafe {
            self.device.handle().free_memory(self.memory, None);
        }
        debug!("Freed {} bytes of device memory", self.size);
    }
}
