use std::{marker::PhantomData, ops::Deref, sync::Arc};

use ash::{self, vk};

use crate::error::GlintError;

use super::context::Context;

/// A typed device buffer with its own memory allocation.
///
/// Every buffer is allocated with the device-address flag because vertex,
/// index, instance and scratch buffers are all consumed by the
/// acceleration-structure build through their device addresses.
pub struct Buffer<T> {
    pub inner: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    context: Arc<Context>,
    _marker: PhantomData<T>,
}

impl<T> Buffer<T> {
    pub fn new(
        context: Arc<Context>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_property_flags: vk::MemoryPropertyFlags,
    ) -> Result<Buffer<T>, GlintError> {
        let device = &context.device;

        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&create_info, None) }?;

        let memory_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memorytype_index = context
            .find_memorytype_index(&memory_requirements, memory_property_flags)
            .ok_or_else(|| {
                GlintError::Internal("no suitable memory type for buffer".to_string())
            })?;

        let mut allocate_flags_info =
            vk::MemoryAllocateFlagsInfo::builder().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(memory_requirements.size)
            .memory_type_index(memorytype_index)
            .push_next(&mut allocate_flags_info);

        let memory = unsafe { device.allocate_memory(&allocate_info, None) }?;

        unsafe { device.bind_buffer_memory(buffer, memory, 0) }?;

        Ok(Buffer {
            inner: buffer,
            memory,
            size,
            context,
            _marker: PhantomData,
        })
    }

    /// Host-visible buffer with its contents copied in before returning.
    pub fn with_data(
        context: Arc<Context>,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Buffer<T>, GlintError> {
        let size = (std::mem::size_of::<T>() * data.len()) as vk::DeviceSize;
        let buffer = Buffer::new(
            context,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.copy_data(data);
        Ok(buffer)
    }

    pub fn copy_data(&self, data: &[T]) {
        let device = &self.context.device;

        let buffer_ptr = unsafe {
            device.map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
        }
        .expect("Could not map buffer memory") as *mut T;

        unsafe { buffer_ptr.copy_from_nonoverlapping(data.as_ptr(), data.len()) };

        unsafe { device.unmap_memory(self.memory) };
    }

    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::builder().buffer(self.inner);
        unsafe {
            self.context
                .buffer_device_address
                .get_buffer_device_address(&info)
        }
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.inner,
            offset: 0,
            range: self.size,
        }
    }
}

impl<T> Drop for Buffer<T> {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe { device.destroy_buffer(self.inner, None) };
        unsafe { device.free_memory(self.memory, None) };
    }
}

impl<T> Deref for Buffer<T> {
    type Target = vk::Buffer;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
