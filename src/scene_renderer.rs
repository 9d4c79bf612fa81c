use std::{ffi::CStr, sync::Arc};

use ash::vk;

use crate::{
    camera::{Camera, CameraUniformData},
    error::GlintError,
    scene::Scene,
    utility::aligned_size,
    vulkan::{
        buffer::Buffer,
        context::Context,
        descriptor_set::{DescriptorSet, WriteDescriptorSet},
        image::Image,
        image_view::ImageView,
        shader::ShaderModule,
    },
};

const SHADER_ENTRY_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

// Shader group indices in pipeline creation order.
const GROUP_RAYGEN: usize = 0;
const GROUP_HIT: usize = 1;
const GROUP_SHADOW_HIT: usize = 2;
const GROUP_MISS: usize = 3;
const GROUP_SHADOW_MISS: usize = 4;
const GROUP_COUNT: usize = 5;

/// Binds the built scene to the ray-tracing pipeline and records the
/// per-frame trace-and-present work.
///
/// Descriptor layout, mirrored by the shaders:
///   set 0: top-level structure, output image, camera, per-instance
///          material lookup, material array
///   set 1..3: per-instance normal / uv / index buffer arrays, in instance
///          order
///   set 4 (only when the scene has textures): sampler + texture array
pub struct SceneRenderer {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,

    descriptor_pool: vk::DescriptorPool,
    descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    descriptor_sets: Vec<DescriptorSet>,

    shader_binding_tables: ShaderBindingTables,

    offscreen_view: ImageView,
    camera_buffer: Buffer<CameraUniformData>,

    extent: vk::Extent2D,
    context: Arc<Context>,
}

struct ShaderBindingTable {
    _buffer: Buffer<u8>,
    strided_region: vk::StridedDeviceAddressRegionKHR,
}

impl ShaderBindingTable {
    /// One table region holding `handles` back to back at the aligned
    /// handle stride.
    fn new(context: Arc<Context>, handles: &[&[u8]]) -> Result<Self, GlintError> {
        let properties = &context.raytracing.ray_tracing_pipeline_properties;
        let handle_size = properties.shader_group_handle_size;
        let handle_size_aligned =
            aligned_size(handle_size, properties.shader_group_handle_alignment);

        let mut table_data = vec![0u8; (handle_size_aligned as usize) * handles.len()];
        for (i, handle) in handles.iter().enumerate() {
            let offset = i * handle_size_aligned as usize;
            table_data[offset..offset + handle.len()].copy_from_slice(handle);
        }

        let buffer: Buffer<u8> = Buffer::with_data(
            context,
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR,
            &table_data,
        )?;

        let strided_region = vk::StridedDeviceAddressRegionKHR {
            device_address: buffer.device_address(),
            stride: handle_size_aligned as u64,
            size: (handle_size_aligned as u64) * handles.len() as u64,
        };

        Ok(ShaderBindingTable {
            _buffer: buffer,
            strided_region,
        })
    }
}

struct ShaderBindingTables {
    raygen: ShaderBindingTable,
    miss: ShaderBindingTable,
    hit: ShaderBindingTable,
}

impl SceneRenderer {
    pub fn new(
        context: Arc<Context>,
        scene: &Scene,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<Self, GlintError> {
        let device = &context.device;
        let instance_count = scene.nodes.len() as u32;
        let texture_count = scene.textures.len() as u32;

        let offscreen_view = {
            let create_info = vk::ImageCreateInfo::builder()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            let image = Image::new(context.clone(), &create_info)?;
            ImageView::new_default(context.clone(), Arc::new(image))
        };

        let camera_buffer: Buffer<CameraUniformData> = Buffer::new(
            context.clone(),
            std::mem::size_of::<CameraUniformData>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let descriptor_set_layouts =
            create_descriptor_set_layouts(&context, instance_count, texture_count)?;

        let pipeline_layout = {
            let create_info =
                vk::PipelineLayoutCreateInfo::builder().set_layouts(&descriptor_set_layouts);
            unsafe { device.create_pipeline_layout(&create_info, None) }?
        };

        let pipeline = create_pipeline(&context, pipeline_layout)?;

        let shader_binding_tables = {
            let properties = &context.raytracing.ray_tracing_pipeline_properties;
            let handle_size = properties.shader_group_handle_size as usize;

            let handle_data = unsafe {
                context
                    .raytracing
                    .ray_tracing_pipeline
                    .get_ray_tracing_shader_group_handles(
                        pipeline,
                        0,
                        GROUP_COUNT as u32,
                        GROUP_COUNT * handle_size,
                    )
            }?;
            let handle = |group: usize| &handle_data[group * handle_size..(group + 1) * handle_size];

            ShaderBindingTables {
                raygen: ShaderBindingTable::new(context.clone(), &[handle(GROUP_RAYGEN)])?,
                miss: ShaderBindingTable::new(
                    context.clone(),
                    &[handle(GROUP_MISS), handle(GROUP_SHADOW_MISS)],
                )?,
                hit: ShaderBindingTable::new(
                    context.clone(),
                    &[handle(GROUP_HIT), handle(GROUP_SHADOW_HIT)],
                )?,
            }
        };

        let descriptor_pool = {
            let pool_sizes = [
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                    descriptor_count: 1,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_IMAGE,
                    descriptor_count: 1,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 1,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_BUFFER,
                    // material lookup + material array + three per-instance
                    // attribute arrays
                    descriptor_count: 2 + 3 * instance_count.max(1),
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::SAMPLER,
                    descriptor_count: 1,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::SAMPLED_IMAGE,
                    descriptor_count: texture_count.max(1),
                },
            ];

            let create_info = vk::DescriptorPoolCreateInfo::builder()
                .max_sets(descriptor_set_layouts.len() as u32)
                .pool_sizes(&pool_sizes);

            unsafe { device.create_descriptor_pool(&create_info, None) }?
        };

        let descriptor_sets = {
            let mut sets = vec![
                DescriptorSet::new(
                    context.clone(),
                    descriptor_pool,
                    descriptor_set_layouts[0],
                    vec![
                        WriteDescriptorSet::acceleration_structure(0, &scene.top_level),
                        WriteDescriptorSet::storage_image(1, &offscreen_view),
                        WriteDescriptorSet::uniform_buffer(2, &camera_buffer),
                        WriteDescriptorSet::storage_buffer(3, &scene.mesh_instance_data_buffer),
                        WriteDescriptorSet::storage_buffer(4, &scene.materials_buffer),
                    ],
                ),
                DescriptorSet::with_variable_count(
                    context.clone(),
                    descriptor_pool,
                    descriptor_set_layouts[1],
                    Some(instance_count),
                    vec![WriteDescriptorSet::storage_buffer_array(
                        0,
                        scene.attributes.normals.clone(),
                    )],
                ),
                DescriptorSet::with_variable_count(
                    context.clone(),
                    descriptor_pool,
                    descriptor_set_layouts[2],
                    Some(instance_count),
                    vec![WriteDescriptorSet::storage_buffer_array(
                        0,
                        scene.attributes.uvs.clone(),
                    )],
                ),
                DescriptorSet::with_variable_count(
                    context.clone(),
                    descriptor_pool,
                    descriptor_set_layouts[3],
                    Some(instance_count),
                    vec![WriteDescriptorSet::storage_buffer_array(
                        0,
                        scene.attributes.indices.clone(),
                    )],
                ),
            ];

            if texture_count > 0 {
                sets.push(DescriptorSet::with_variable_count(
                    context.clone(),
                    descriptor_pool,
                    descriptor_set_layouts[4],
                    Some(texture_count),
                    vec![
                        WriteDescriptorSet::sampler(0, &scene.linear_sampler),
                        WriteDescriptorSet::sampled_image_array(1, scene.texture_infos.clone()),
                    ],
                ));
            }

            sets
        };

        Ok(Self {
            pipeline,
            pipeline_layout,

            descriptor_pool,
            descriptor_set_layouts,
            descriptor_sets,

            shader_binding_tables,

            offscreen_view,
            camera_buffer,

            extent,
            context,
        })
    }

    pub fn update_camera(&self, camera: &Camera) {
        self.camera_buffer.copy_data(&[camera.uniform_data()]);
    }

    /// Traces the scene into the offscreen image and copies it onto the
    /// given swapchain image, leaving it ready for present.
    pub fn render(&self, command_buffer: vk::CommandBuffer, swapchain_image: vk::Image) {
        let device = &self.context.device;
        let offscreen_image = self.offscreen_view.image.inner;

        record_image_barrier(
            device,
            command_buffer,
            offscreen_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::SHADER_WRITE,
        );

        unsafe {
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                self.pipeline,
            )
        };

        let descriptor_sets: Vec<vk::DescriptorSet> =
            self.descriptor_sets.iter().map(|set| set.inner).collect();
        unsafe {
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                self.pipeline_layout,
                0,
                &descriptor_sets,
                &[],
            )
        };

        let empty_sbt_entry = vk::StridedDeviceAddressRegionKHR::default();
        unsafe {
            self.context.raytracing.ray_tracing_pipeline.cmd_trace_rays(
                command_buffer,
                &self.shader_binding_tables.raygen.strided_region,
                &self.shader_binding_tables.miss.strided_region,
                &self.shader_binding_tables.hit.strided_region,
                &empty_sbt_entry,
                self.extent.width,
                self.extent.height,
                1,
            )
        };

        record_image_barrier(
            device,
            command_buffer,
            swapchain_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        );
        record_image_barrier(
            device,
            command_buffer,
            offscreen_image,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::SHADER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
        );

        let copy_region = vk::ImageCopy {
            src_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            src_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            dst_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            dst_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            extent: vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            },
        };
        unsafe {
            device.cmd_copy_image(
                command_buffer,
                offscreen_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                swapchain_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&copy_region),
            )
        };

        record_image_barrier(
            device,
            command_buffer,
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::empty(),
        );
    }
}

impl Drop for SceneRenderer {
    fn drop(&mut self) {
        let device = &self.context.device;

        unsafe { device.destroy_pipeline(self.pipeline, None) };
        unsafe { device.destroy_pipeline_layout(self.pipeline_layout, None) };
        unsafe { device.destroy_descriptor_pool(self.descriptor_pool, None) };
        for &layout in &self.descriptor_set_layouts {
            unsafe { device.destroy_descriptor_set_layout(layout, None) };
        }
    }
}

fn create_descriptor_set_layouts(
    context: &Arc<Context>,
    instance_count: u32,
    texture_count: u32,
) -> Result<Vec<vk::DescriptorSetLayout>, GlintError> {
    let device = &context.device;

    let scene_set_layout = {
        let bindings = [
            vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(2)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(3)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(4)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR)
                .build(),
        ];
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        unsafe { device.create_descriptor_set_layout(&create_info, None) }?
    };

    let mut layouts = vec![scene_set_layout];

    // Three identical layouts for the normal, uv and index attribute sets.
    // The binding is variable-count so the layout is independent of the
    // scene size.
    for _ in 0..3 {
        let attribute_set_layout = {
            let binding_flags = [vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT];
            let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder()
                .binding_flags(&binding_flags);

            let bindings = [vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(instance_count.max(1))
                .stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR)
                .build()];

            let create_info = vk::DescriptorSetLayoutCreateInfo::builder()
                .bindings(&bindings)
                .push_next(&mut flags_info);
            unsafe { device.create_descriptor_set_layout(&create_info, None) }?
        };
        layouts.push(attribute_set_layout);
    }

    if texture_count > 0 {
        let texture_set_layout = {
            let binding_flags = [
                vk::DescriptorBindingFlags::empty(),
                vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
            ];
            let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder()
                .binding_flags(&binding_flags);

            let bindings = [
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(0)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR)
                    .build(),
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(1)
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .descriptor_count(texture_count)
                    .stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR)
                    .build(),
            ];

            let create_info = vk::DescriptorSetLayoutCreateInfo::builder()
                .bindings(&bindings)
                .push_next(&mut flags_info);
            unsafe { device.create_descriptor_set_layout(&create_info, None) }?
        };
        layouts.push(texture_set_layout);
    }

    Ok(layouts)
}

fn create_pipeline(
    context: &Arc<Context>,
    pipeline_layout: vk::PipelineLayout,
) -> Result<vk::Pipeline, GlintError> {
    let raygen = ShaderModule::from_file(context.clone(), "shaders/raygen.rgen.spv")?;
    let closest_hit = ShaderModule::from_file(context.clone(), "shaders/closest-hit.rchit.spv")?;
    let shadow_hit = ShaderModule::from_file(context.clone(), "shaders/shadow-hit.rchit.spv")?;
    let miss = ShaderModule::from_file(context.clone(), "shaders/miss.rmiss.spv")?;
    let shadow_miss = ShaderModule::from_file(context.clone(), "shaders/shadow-miss.rmiss.spv")?;

    let stage = |module: &ShaderModule, stage_flags| {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage_flags)
            .module(module.inner)
            .name(SHADER_ENTRY_NAME)
            .build()
    };

    let stages = [
        stage(&raygen, vk::ShaderStageFlags::RAYGEN_KHR),
        stage(&closest_hit, vk::ShaderStageFlags::CLOSEST_HIT_KHR),
        stage(&shadow_hit, vk::ShaderStageFlags::CLOSEST_HIT_KHR),
        stage(&miss, vk::ShaderStageFlags::MISS_KHR),
        stage(&shadow_miss, vk::ShaderStageFlags::MISS_KHR),
    ];

    let general_group = |shader: u32| {
        vk::RayTracingShaderGroupCreateInfoKHR::builder()
            .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
            .general_shader(shader)
            .closest_hit_shader(vk::SHADER_UNUSED_KHR)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR)
            .build()
    };
    let hit_group = |closest_hit_shader: u32| {
        vk::RayTracingShaderGroupCreateInfoKHR::builder()
            .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
            .general_shader(vk::SHADER_UNUSED_KHR)
            .closest_hit_shader(closest_hit_shader)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR)
            .build()
    };

    let groups = [
        general_group(0),
        hit_group(1),
        hit_group(2),
        general_group(3),
        general_group(4),
    ];

    let create_info = vk::RayTracingPipelineCreateInfoKHR::builder()
        .stages(&stages)
        .groups(&groups)
        .max_pipeline_ray_recursion_depth(1)
        .layout(pipeline_layout)
        .build();

    let pipelines = unsafe {
        context
            .raytracing
            .ray_tracing_pipeline
            .create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
                vk::PipelineCache::null(),
                std::slice::from_ref(&create_info),
                None,
            )
    }?;

    Ok(pipelines[0])
}

fn record_image_barrier(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
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
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
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
