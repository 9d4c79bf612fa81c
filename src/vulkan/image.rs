use std::sync::Arc;

use ash::vk;

use crate::error::GlintError;

use super::{buffer::Buffer, context::Context};

pub struct Image {
    pub inner: vk::Image,
    pub memory: vk::DeviceMemory,

    pub format: vk::Format,
    pub extent: vk::Extent3D,

    context: Arc<Context>,
}

impl Image {
    pub fn new(
        context: Arc<Context>,
        create_info: &vk::ImageCreateInfo,
    ) -> Result<Image, GlintError> {
        let device = &context.device;

        let format = create_info.format;
        let extent = create_info.extent;

        let image = unsafe { device.create_image(create_info, None) }?;

        let memory_requirements = unsafe { device.get_image_memory_requirements(image) };

        let memorytype_index = context
            .find_memorytype_index(&memory_requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .ok_or_else(|| GlintError::Internal("no suitable memory type for image".to_string()))?;

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(memory_requirements.size)
            .memory_type_index(memorytype_index);

        let memory = unsafe { device.allocate_memory(&allocate_info, None) }?;

        unsafe { device.bind_image_memory(image, memory, 0) }?;

        Ok(Self {
            inner: image,
            memory,
            format,
            extent,
            context,
        })
    }

    pub fn full_subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    /// Records a staged upload: transition to TRANSFER_DST, copy the staging
    /// buffer, transition to SHADER_READ_ONLY. The staging buffer must stay
    /// alive until the recorded commands have executed.
    pub fn record_upload(&self, command_buffer: vk::CommandBuffer, staging: &Buffer<u8>) {
        self.record_layout_transition(
            command_buffer,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        );

        let buffer_image_copy = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: self.extent,
        };

        unsafe {
            self.context.device.cmd_copy_buffer_to_image(
                command_buffer,
                staging.inner,
                self.inner,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&buffer_image_copy),
            )
        };

        self.record_layout_transition(
            command_buffer,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        );
    }

    fn record_layout_transition(
        &self,
        command_buffer: vk::CommandBuffer,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access_mask: vk::AccessFlags,
        dst_access_mask: vk::AccessFlags,
    ) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .src_access_mask(src_access_mask)
            .dst_access_mask(dst_access_mask)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.inner)
            .subresource_range(self.full_subresource_range())
            .build();

        unsafe {
            self.context.device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(&barrier),
            )
        };
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe { device.destroy_image(self.inner, None) };
        unsafe { device.free_memory(self.memory, None) };
    }
}
