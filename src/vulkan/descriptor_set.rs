use std::sync::Arc;

use ash::vk;

use super::{
    acceleration_structure::AccelerationStructure, buffer::Buffer, context::Context,
    image_view::ImageView, sampler::Sampler,
};

pub struct DescriptorSet {
    pub inner: vk::DescriptorSet,
}

impl DescriptorSet {
    pub fn new(
        context: Arc<Context>,
        descriptor_pool: vk::DescriptorPool,
        set_layout: vk::DescriptorSetLayout,
        writes: Vec<WriteDescriptorSet>,
    ) -> Self {
        Self::with_variable_count(context, descriptor_pool, set_layout, None, writes)
    }

    /// `variable_count` is the actual element count for a layout whose last
    /// binding was created with VARIABLE_DESCRIPTOR_COUNT (the per-instance
    /// attribute-buffer arrays).
    pub fn with_variable_count(
        context: Arc<Context>,
        descriptor_pool: vk::DescriptorPool,
        set_layout: vk::DescriptorSetLayout,
        variable_count: Option<u32>,
        writes: Vec<WriteDescriptorSet>,
    ) -> Self {
        let device = &context.device;

        let counts = variable_count.map(|c| [c]);
        let mut variable_count_info = counts.as_ref().map(|counts| {
            vk::DescriptorSetVariableDescriptorCountAllocateInfo::builder()
                .descriptor_counts(counts)
                .build()
        });

        let mut allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(descriptor_pool)
            .set_layouts(std::slice::from_ref(&set_layout));
        if let Some(info) = variable_count_info.as_mut() {
            allocate_info = allocate_info.push_next(info);
        }

        let descriptor_set = unsafe {
            device
                .allocate_descriptor_sets(&allocate_info)
                .expect("Could not create descriptor set")
        }[0];

        // The p_next chains of acceleration-structure writes point into
        // these vectors, which must outlive update_descriptor_sets.
        let accel_handles: Vec<vk::AccelerationStructureKHR> = writes
            .iter()
            .filter_map(|write| match &write.info {
                DescriptorInfo::AccelerationStructure(handle) => Some(*handle),
                _ => None,
            })
            .collect();
        let mut accel_infos: Vec<vk::WriteDescriptorSetAccelerationStructureKHR> = accel_handles
            .iter()
            .map(|handle| {
                vk::WriteDescriptorSetAccelerationStructureKHR::builder()
                    .acceleration_structures(std::slice::from_ref(handle))
                    .build()
            })
            .collect();
        let mut accel_info_iter = accel_infos.iter_mut();

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .map(|write| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_binding(write.binding)
                    .descriptor_type(write.info.descriptor_type())
                    .dst_set(descriptor_set);

                match &write.info {
                    DescriptorInfo::UniformBuffer(info) | DescriptorInfo::StorageBuffer(info) => {
                        builder.buffer_info(std::slice::from_ref(info)).build()
                    }
                    DescriptorInfo::StorageBufferArray(infos) => {
                        builder.buffer_info(infos).build()
                    }
                    DescriptorInfo::StorageImage(info) | DescriptorInfo::Sampler(info) => {
                        builder.image_info(std::slice::from_ref(info)).build()
                    }
                    DescriptorInfo::SampledImageArray(infos) => {
                        builder.image_info(infos).build()
                    }
                    DescriptorInfo::AccelerationStructure(_) => {
                        let info = accel_info_iter
                            .next()
                            .expect("acceleration structure write without info");
                        let mut vk_write = builder.push_next(info).build();
                        vk_write.descriptor_count = 1;
                        vk_write
                    }
                }
            })
            .collect();

        unsafe { device.update_descriptor_sets(&vk_writes, &[]) };

        Self {
            inner: descriptor_set,
        }
    }
}

pub struct WriteDescriptorSet {
    binding: u32,
    info: DescriptorInfo,
}

enum DescriptorInfo {
    UniformBuffer(vk::DescriptorBufferInfo),
    StorageBuffer(vk::DescriptorBufferInfo),
    StorageBufferArray(Vec<vk::DescriptorBufferInfo>),
    StorageImage(vk::DescriptorImageInfo),
    Sampler(vk::DescriptorImageInfo),
    SampledImageArray(Vec<vk::DescriptorImageInfo>),
    AccelerationStructure(vk::AccelerationStructureKHR),
}

impl DescriptorInfo {
    fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorInfo::UniformBuffer(_) => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorInfo::StorageBuffer(_) | DescriptorInfo::StorageBufferArray(_) => {
                vk::DescriptorType::STORAGE_BUFFER
            }
            DescriptorInfo::StorageImage(_) => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorInfo::Sampler(_) => vk::DescriptorType::SAMPLER,
            DescriptorInfo::SampledImageArray(_) => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorInfo::AccelerationStructure(_) => {
                vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
            }
        }
    }
}

impl WriteDescriptorSet {
    pub fn uniform_buffer<T>(binding: u32, buffer: &Buffer<T>) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::UniformBuffer(buffer.descriptor_info()),
        }
    }

    pub fn storage_buffer<T>(binding: u32, buffer: &Buffer<T>) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::StorageBuffer(buffer.descriptor_info()),
        }
    }

    pub fn storage_buffer_array(
        binding: u32,
        infos: Vec<vk::DescriptorBufferInfo>,
    ) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::StorageBufferArray(infos),
        }
    }

    pub fn storage_image(binding: u32, image_view: &ImageView) -> WriteDescriptorSet {
        let info = vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: image_view.inner,
            image_layout: vk::ImageLayout::GENERAL,
        };

        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::StorageImage(info),
        }
    }

    pub fn sampler(binding: u32, sampler: &Sampler) -> WriteDescriptorSet {
        let info = vk::DescriptorImageInfo {
            sampler: sampler.inner,
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::UNDEFINED,
        };

        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::Sampler(info),
        }
    }

    pub fn sampled_image_array(
        binding: u32,
        infos: Vec<vk::DescriptorImageInfo>,
    ) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::SampledImageArray(infos),
        }
    }

    pub fn acceleration_structure(
        binding: u32,
        acceleration_structure: &AccelerationStructure,
    ) -> WriteDescriptorSet {
        WriteDescriptorSet {
            binding,
            info: DescriptorInfo::AccelerationStructure(acceleration_structure.inner),
        }
    }
}
