//! GPU buffer management
//!
//! RAII buffer wrappers with automatic memory allocation and cleanup.
//! [`StagingBuffer`] covers the host-visible upload path used by texture and
//! cubemap construction.

use ash::{vk, Device};
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// GPU buffer wrapper with automatic memory management
///
/// Owns the buffer and its backing memory; construction creates and binds
/// both or fails entirely. Move-only, like every wrapper in this backend.
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    name: String,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
        name: &str,
    ) -> VulkanResult<Self> {
        assert!(size > 0);
        assert!(!name.is_empty());

        let device = ctx.raw_device();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device.create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = match ctx.allocator().find_memory_type(
            mem_requirements.memory_type_bits,
            properties,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        log::debug!("Created buffer '{}' ({} bytes)", name, size);

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            name: name.to_string(),
        })
    }

    /// Copy bytes into the buffer's memory
    ///
    /// The buffer must have been created with host-visible, host-coherent
    /// memory.
    pub fn write(&self, data: &[u8]) -> VulkanResult<()> {
        assert!(data.len() as vk::DeviceSize <= self.size);

        unsafe {
            let ptr = self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)? as *mut u8;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get the buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Get the internal debug name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if self.buffer != vk::Buffer::null() {
                self.device.destroy_buffer(self.buffer, None);
                self.device.free_memory(self.memory, None);
            }
        }
    }
}

/// Host-visible staging buffer pre-filled with caller data
///
/// Exists only long enough to source a GPU transfer; drop it after the
/// one-shot copy completes.
pub struct StagingBuffer {
    buffer: Buffer,
}

impl StagingBuffer {
    /// Create a transfer-source buffer and copy `data` into it
    pub fn new(ctx: &DeviceContext, data: &[u8], name: &str) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            ctx,
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            name,
        )?;

        buffer.write(data)?;

        Ok(Self { buffer })
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get the buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}
