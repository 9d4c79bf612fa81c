use std::sync::Arc;

use ash::vk;

use crate::error::GlintError;

use super::{buffer::Buffer, context::Context};

/// A created (not necessarily built) acceleration structure together with
/// its backing buffer and the device address that instance records embed.
///
/// Creation only allocates the structure's storage, sized by the
/// object-size half of the build-sizes query; the actual build is recorded
/// later on a command buffer. The address is only meaningful to the
/// hardware once that build command has executed.
pub struct AccelerationStructure {
    pub inner: vk::AccelerationStructureKHR,
    pub buffer: Buffer<u8>,
    pub device_address: vk::DeviceAddress,
    context: Arc<Context>,
}

impl AccelerationStructure {
    pub fn new(
        context: Arc<Context>,
        structure_type: vk::AccelerationStructureTypeKHR,
        build_size_info: vk::AccelerationStructureBuildSizesInfoKHR,
    ) -> Result<Self, GlintError> {
        let buffer: Buffer<u8> = Buffer::new(
            context.clone(),
            build_size_info.acceleration_structure_size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::builder()
            .buffer(buffer.inner)
            .size(build_size_info.acceleration_structure_size)
            .ty(structure_type);

        let inner = unsafe {
            context
                .raytracing
                .acceleration_structure
                .create_acceleration_structure(&create_info, None)
        }?;

        let device_address = {
            let address_info =
                vk::AccelerationStructureDeviceAddressInfoKHR::builder().acceleration_structure(inner);

            unsafe {
                context
                    .raytracing
                    .acceleration_structure
                    .get_acceleration_structure_device_address(&address_info)
            }
        };

        Ok(Self {
            inner,
            buffer,
            device_address,
            context,
        })
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        unsafe {
            self.context
                .raytracing
                .acceleration_structure
                .destroy_acceleration_structure(self.inner, None);
        }
    }
}
