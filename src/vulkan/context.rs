use std::ffi::CStr;

use ash::{
    extensions::khr::{AccelerationStructure, BufferDeviceAddress, RayTracingPipeline},
    vk::{self, ApplicationInfo, DeviceCreateInfo, DeviceQueueCreateInfo, InstanceCreateInfo},
};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use winit::{event_loop::EventLoop, window::Window};

/// Owns the Vulkan instance, surface, logical device and the one graphics
/// queue everything in this program runs on. Also carries the ray-tracing
/// extension entry points and a transient command pool for one-shot work.
pub struct Context {
    _entry: ash::Entry,
    pub instance: ash::Instance,

    pub surface_loader: ash::extensions::khr::Surface,
    pub surface: vk::SurfaceKHR,

    pub raytracing: ContextRaytracing,

    pub physical_device: vk::PhysicalDevice,
    pub queue_family_index: u32,

    pub device: ash::Device,
    pub queue: vk::Queue,
    pub command_pool: vk::CommandPool,

    pub buffer_device_address: BufferDeviceAddress,
    pub device_memory_properties: vk::PhysicalDeviceMemoryProperties,
}

pub struct ContextRaytracing {
    pub ray_tracing_pipeline: RayTracingPipeline,
    pub ray_tracing_pipeline_properties: vk::PhysicalDeviceRayTracingPipelinePropertiesKHR,

    pub acceleration_structure: AccelerationStructure,
    pub acceleration_structure_properties: vk::PhysicalDeviceAccelerationStructurePropertiesKHR,
}

impl Context {
    pub fn new(event_loop: &EventLoop<()>, window: &Window) -> Self {
        let entry = unsafe { ash::Entry::load() }.expect("Could not load vulkan library");

        let instance = {
            let surface_extensions =
                ash_window::enumerate_required_extensions(event_loop.raw_display_handle()).unwrap();

            let app_info = ApplicationInfo::builder().api_version(vk::API_VERSION_1_2);
            let create_info = InstanceCreateInfo::builder()
                .application_info(&app_info)
                .enabled_extension_names(surface_extensions);
            unsafe { entry.create_instance(&create_info, None) }.expect("Could not create instance")
        };

        let (surface, surface_loader) = {
            let surface = unsafe {
                ash_window::create_surface(
                    &entry,
                    &instance,
                    window.raw_display_handle(),
                    window.raw_window_handle(),
                    None,
                )
            }
            .expect("Could not create surface");

            let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);

            (surface, surface_loader)
        };

        let (physical_device, queue_family_index) =
            find_physical_device(&instance, &surface, &surface_loader);

        let device = create_logical_device(&instance, &physical_device, queue_family_index);

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let command_pool = {
            let create_info = vk::CommandPoolCreateInfo::builder()
                .queue_family_index(queue_family_index)
                .flags(
                    vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                        | vk::CommandPoolCreateFlags::TRANSIENT,
                );

            unsafe { device.create_command_pool(&create_info, None) }
                .expect("Could not create command pool")
        };

        let ray_tracing_pipeline = RayTracingPipeline::new(&instance, &device);
        let ray_tracing_pipeline_properties =
            unsafe { RayTracingPipeline::get_properties(&instance, physical_device) };

        let acceleration_structure = AccelerationStructure::new(&instance, &device);
        let acceleration_structure_properties =
            unsafe { AccelerationStructure::get_properties(&instance, physical_device) };

        let buffer_device_address = BufferDeviceAddress::new(&instance, &device);

        let raytracing = ContextRaytracing {
            ray_tracing_pipeline,
            ray_tracing_pipeline_properties,
            acceleration_structure,
            acceleration_structure_properties,
        };

        let device_memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        Self {
            _entry: entry,
            instance,

            surface,
            surface_loader,

            raytracing,

            physical_device,
            queue_family_index,

            device,
            queue,
            command_pool,

            buffer_device_address,
            device_memory_properties,
        }
    }

    pub fn find_memorytype_index(
        &self,
        memory_req: &vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        let memory_prop = &self.device_memory_properties;
        memory_prop.memory_types[..memory_prop.memory_type_count as usize]
            .iter()
            .enumerate()
            .find(|(index, memory_type)| {
                (memory_req.memory_type_bits & (1 << index)) != 0
                    && memory_type.property_flags & flags == flags
            })
            .map(|(index, _memory_type)| index as u32)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.command_pool, None) };

        unsafe { self.device.destroy_device(None) };

        unsafe { self.surface_loader.destroy_surface(self.surface, None) };

        unsafe { self.instance.destroy_instance(None) };
    }
}

fn find_physical_device(
    instance: &ash::Instance,
    surface: &vk::SurfaceKHR,
    surface_loader: &ash::extensions::khr::Surface,
) -> (vk::PhysicalDevice, u32) {
    let required_extensions = [
        ash::extensions::khr::Swapchain::name(),
        ash::extensions::khr::AccelerationStructure::name(),
        ash::extensions::khr::RayTracingPipeline::name(),
    ];

    let (physical_device, queue_family_index) = {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .expect("Could not enumerate physical devices");

        physical_devices
            .into_iter()
            .filter(|pd| {
                let extension_properties =
                    unsafe { instance.enumerate_device_extension_properties(*pd) }
                        .expect("Could not enumerate device extension properties");
                let supported_extensions: Vec<&CStr> = extension_properties
                    .iter()
                    .map(|property| unsafe { CStr::from_ptr(property.extension_name.as_ptr()) })
                    .collect();

                required_extensions
                    .iter()
                    .all(|required| supported_extensions.contains(required))
            })
            .filter_map(|pd| {
                unsafe { instance.get_physical_device_queue_family_properties(pd) }
                    .iter()
                    .enumerate()
                    .position(|(index, info)| {
                        let supports_graphics = info.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                        let supports_surface = unsafe {
                            surface_loader.get_physical_device_surface_support(
                                pd,
                                index as u32,
                                *surface,
                            )
                        }
                        .unwrap();

                        supports_graphics && supports_surface
                    })
                    .map(|i| (pd, i as u32))
            })
            .min_by_key(|(pd, _)| {
                let device_type =
                    unsafe { instance.get_physical_device_properties(*pd) }.device_type;

                match device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    vk::PhysicalDeviceType::CPU => 3,
                    vk::PhysicalDeviceType::OTHER => 4,
                    _ => 5,
                }
            })
            .expect("Could not find a ray-tracing capable device")
    };

    (physical_device, queue_family_index)
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: &vk::PhysicalDevice,
    queue_family_index: u32,
) -> ash::Device {
    let device_extensions = [
        ash::extensions::khr::Swapchain::name().as_ptr(),
        ash::extensions::khr::AccelerationStructure::name().as_ptr(),
        ash::extensions::khr::RayTracingPipeline::name().as_ptr(),
        ash::extensions::khr::DeferredHostOperations::name().as_ptr(),
        ash::extensions::khr::BufferDeviceAddress::name().as_ptr(),
    ];

    let queue_priorities = [1.0];
    let queue_create_info = DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family_index)
        .queue_priorities(&queue_priorities);

    // Variable-count descriptor arrays hold the per-instance attribute
    // buffers, so descriptor indexing is needed alongside the ray-tracing
    // feature structs.
    let mut vulkan12_features = vk::PhysicalDeviceVulkan12Features {
        buffer_device_address: vk::TRUE,
        descriptor_indexing: vk::TRUE,
        runtime_descriptor_array: vk::TRUE,
        descriptor_binding_variable_descriptor_count: vk::TRUE,
        shader_sampled_image_array_non_uniform_indexing: vk::TRUE,
        ..vk::PhysicalDeviceVulkan12Features::default()
    };

    let mut enabled_ray_tracing_pipeline_features =
        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR {
            ray_tracing_pipeline: vk::TRUE,
            ..vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default()
        };

    let mut enabled_acceleration_structure_features =
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR {
            acceleration_structure: vk::TRUE,
            ..vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
        };

    let create_info = DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&device_extensions)
        .push_next(&mut vulkan12_features)
        .push_next(&mut enabled_ray_tracing_pipeline_features)
        .push_next(&mut enabled_acceleration_structure_features)
        .build();

    unsafe { instance.create_device(*physical_device, &create_info, None) }
        .expect("Could not create logical device")
}
