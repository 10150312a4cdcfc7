//! GPU buffer management.
//!
//! Buffers own a dedicated [`DeviceMemory`] allocation chosen through
//! [`crate::memory::find_memory_type`].
//!
//! - [`BufferUsage`] decides usage flags and memory properties
//! - [`Buffer::new`] creates a handle, allocates matching memory and binds it
//! - [`Buffer::upload`] fills a device-local buffer through a staging copy
//!
//! Host-visible buffers (staging and uniform) stay persistently mapped for
//! their whole lifetime.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use viewer_rhi::device::Device;
//! use viewer_rhi::buffer::{Buffer, BufferUsage};
//! use viewer_rhi::command::CommandPool;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), viewer_rhi::RhiError> {
//! let indices: [u32; 3] = [0, 1, 2];
//! let index_buffer = Buffer::upload(
//!     device,
//!     pool,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! # let _ = index_buffer;
//! # Ok(())
//! # }
//! ```

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::DeviceMemory;

/// What a buffer is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data, filled by a transfer
    Vertex,
    /// Device-local index data, filled by a transfer
    Index,
    /// Host-visible uniform data, rewritten by the CPU
    Uniform,
    /// Host-visible transfer source
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn memory_properties(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            BufferUsage::Uniform | BufferUsage::Staging => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Whether buffers of this usage are mapped for CPU writes.
    #[inline]
    pub fn is_host_visible(self) -> bool {
        self.memory_properties()
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// A `VkBuffer` bound to its own memory allocation.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    // Freed after `buffer` is destroyed in `Drop`
    memory: DeviceMemory,
    mapped: Option<NonNull<u8>>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it.
    ///
    /// Host-visible usages are mapped immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero size and
    /// [`RhiError::NoSuitableMemoryType`] when the device has no matching memory.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let bound = DeviceMemory::allocate(device.clone(), requirements, usage.memory_properties())
            .and_then(|memory| {
                unsafe {
                    device
                        .handle()
                        .bind_buffer_memory(buffer, memory.handle(), 0)?;
                }
                let mapped = if usage.is_host_visible() {
                    NonNull::new(memory.map()?)
                } else {
                    None
                };
                Ok((memory, mapped))
            });

        let (memory, mapped) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            memory,
            mapped,
            size,
            usage,
        })
    }

    /// Create a host-visible buffer initialized with `data`.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Create a device-local buffer and fill it through a staging buffer.
    ///
    /// Blocks until the transfer has completed; the staging buffer is
    /// released before returning.
    pub fn upload(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device, usage, staging.size())?;
        copy_buffer(pool, &staging, &buffer, staging.size())?;
        Ok(buffer)
    }

    /// Write `data` at `offset` into mapped memory.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] when the buffer is not mapped or
    /// the write would run past its end.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped = self.mapped.ok_or_else(|| {
            RhiError::InvalidHandle(format!("{} buffer is not mapped", self.usage.name()))
        })?;

        unsafe {
            let dst = mapped.as_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    #[inline]
    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        debug!("Destroyed {} buffer", self.usage.name());
    }
}

// Safety: the mapped pointer refers to memory owned by this buffer and is
// only written through `&self` methods that copy whole slices.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

/// Copy `size` bytes from `src` to `dst` with a blocking one-shot submission.
pub fn copy_buffer(
    pool: &CommandPool,
    src: &Buffer,
    dst: &Buffer,
    size: vk::DeviceSize,
) -> RhiResult<()> {
    if size > src.size() || size > dst.size() {
        return Err(RhiError::InvalidHandle(format!(
            "Copy of {} bytes exceeds source ({}) or destination ({})",
            size,
            src.size(),
            dst.size()
        )));
    }

    pool.submit_blocking(|cmd| {
        let region = vk::BufferCopy::default().size(size);
        cmd.copy_buffer(src.handle(), dst.handle(), std::slice::from_ref(&region));
        Ok(())
    })?;

    debug!(
        "Copied {} bytes from {} to {} buffer",
        size,
        src.usage().name(),
        dst.usage().name()
    );
    Ok(())
}
