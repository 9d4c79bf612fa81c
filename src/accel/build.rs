use std::sync::Arc;

use ash::vk;
use log::debug;

use crate::{
    error::GlintError,
    vulkan::{
        acceleration_structure::AccelerationStructure, buffer::Buffer,
        command_buffer::submit_one_time, context::Context,
    },
};

use super::{geometry::GeometryRegistry, instances::InstanceRecord};

/// One recorded command of the scene build. Bottom-level builds come first,
/// each fenced off by a full acceleration-structure barrier, and the
/// top-level build is recorded strictly after every bottom-level structure
/// it references: the top-level build reads the device addresses baked by
/// the bottom-level builds, and all builds share one scratch region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStep {
    BottomLevel(usize),
    Barrier,
    TopLevel,
}

/// The command sequence for a scene with `mesh_count` bottom-level
/// structures.
pub fn build_steps(mesh_count: usize) -> Vec<BuildStep> {
    let mut steps = Vec::with_capacity(mesh_count * 2 + 2);
    for mesh in 0..mesh_count {
        steps.push(BuildStep::BottomLevel(mesh));
        steps.push(BuildStep::Barrier);
    }
    steps.push(BuildStep::TopLevel);
    steps.push(BuildStep::Barrier);
    steps
}

/// Builds run one after another reusing the same scratch buffer, so it is
/// sized to the largest single requirement, not the total.
pub fn scratch_buffer_size(sizes: impl IntoIterator<Item = vk::DeviceSize>) -> vk::DeviceSize {
    sizes.into_iter().max().unwrap_or(0)
}

/// Created-but-not-yet-built structures: backing memory is allocated and
/// device addresses can be handed to the instance builder, but no GPU build
/// work has run.
pub struct DeclaredStructures {
    bottom_levels: Vec<AccelerationStructure>,
    bottom_scratch_sizes: Vec<vk::DeviceSize>,
    top_level: AccelerationStructure,
    top_scratch_size: vk::DeviceSize,
    instance_count: u32,
}

/// The finished two-level index, ready for descriptor binding.
pub struct BuiltStructures {
    pub bottom_levels: Vec<AccelerationStructure>,
    pub top_level: AccelerationStructure,
}

/// Creates every bottom-level structure plus the one top-level structure,
/// sized through the device's build-sizes query.
pub fn declare(
    context: &Arc<Context>,
    registry: &GeometryRegistry,
    instance_count: u32,
) -> Result<DeclaredStructures, GlintError> {
    let accel = &context.raytracing.acceleration_structure;

    let mut bottom_levels = Vec::with_capacity(registry.len());
    let mut bottom_scratch_sizes = Vec::with_capacity(registry.len());

    for (index, entry) in registry.geometries().iter().enumerate() {
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&entry.geometry))
            .build();

        let sizes = unsafe {
            accel.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_info,
                &[entry.primitive_count],
            )
        };
        debug!(
            "blas {index}: {} triangles, object {} bytes, scratch {} bytes",
            entry.primitive_count, sizes.acceleration_structure_size, sizes.build_scratch_size
        );

        bottom_levels.push(AccelerationStructure::new(
            context.clone(),
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            sizes,
        )?);
        bottom_scratch_sizes.push(sizes.build_scratch_size);
    }

    let (top_level, top_scratch_size) = {
        // The instance buffer address is only known at record time; sizing
        // needs just the instance count.
        let geometry = instances_geometry(0);
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&geometry))
            .build();

        let sizes = unsafe {
            accel.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_info,
                &[instance_count],
            )
        };
        debug!(
            "tlas: {instance_count} instances, object {} bytes, scratch {} bytes",
            sizes.acceleration_structure_size, sizes.build_scratch_size
        );

        (
            AccelerationStructure::new(
                context.clone(),
                vk::AccelerationStructureTypeKHR::TOP_LEVEL,
                sizes,
            )?,
            sizes.build_scratch_size,
        )
    };

    Ok(DeclaredStructures {
        bottom_levels,
        bottom_scratch_sizes,
        top_level,
        top_scratch_size,
        instance_count,
    })
}

impl DeclaredStructures {
    /// Device addresses of the bottom-level structures, indexed by mesh.
    /// These are what instance records embed; the hardware must not chase
    /// them before the builds recorded in [`Self::build`] have executed.
    pub fn bottom_level_addresses(&self) -> Vec<vk::DeviceAddress> {
        self.bottom_levels
            .iter()
            .map(|blas| blas.device_address)
            .collect()
    }

    pub fn scratch_size(&self) -> vk::DeviceSize {
        scratch_buffer_size(
            self.bottom_scratch_sizes
                .iter()
                .copied()
                .chain(std::iter::once(self.top_scratch_size)),
        )
    }

    /// Records every build command with its barrier, submits once and waits
    /// for the device to go idle. The scratch buffer lives exactly as long
    /// as this call.
    pub fn build(
        self,
        context: &Arc<Context>,
        registry: &GeometryRegistry,
        instance_buffer: &Buffer<InstanceRecord>,
    ) -> Result<BuiltStructures, GlintError> {
        let scratch_size = self.scratch_size();
        let scratch_buffer: Buffer<u8> = Buffer::new(
            context.clone(),
            scratch_size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let scratch_address = scratch_buffer.device_address();
        debug!("scene build: scratch buffer of {scratch_size} bytes");

        let accel = &context.raytracing.acceleration_structure;
        let instance_data = instance_buffer.device_address();

        submit_one_time(context, |command_buffer| {
            for step in build_steps(self.bottom_levels.len()) {
                match step {
                    BuildStep::BottomLevel(mesh) => {
                        let entry = &registry.geometries()[mesh];
                        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
                            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
                            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
                            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
                            .dst_acceleration_structure(self.bottom_levels[mesh].inner)
                            .geometries(std::slice::from_ref(&entry.geometry))
                            .scratch_data(vk::DeviceOrHostAddressKHR {
                                device_address: scratch_address,
                            })
                            .build();
                        let range_info = vk::AccelerationStructureBuildRangeInfoKHR::builder()
                            .primitive_count(entry.primitive_count)
                            .build();

                        unsafe {
                            accel.cmd_build_acceleration_structures(
                                command_buffer,
                                std::slice::from_ref(&build_info),
                                &[std::slice::from_ref(&range_info)],
                            )
                        };
                    }
                    BuildStep::Barrier => {
                        record_acceleration_structure_barrier(&context.device, command_buffer);
                    }
                    BuildStep::TopLevel => {
                        let geometry = instances_geometry(instance_data);
                        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
                            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
                            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
                            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
                            .dst_acceleration_structure(self.top_level.inner)
                            .geometries(std::slice::from_ref(&geometry))
                            .scratch_data(vk::DeviceOrHostAddressKHR {
                                device_address: scratch_address,
                            })
                            .build();
                        let range_info = vk::AccelerationStructureBuildRangeInfoKHR::builder()
                            .primitive_count(self.instance_count)
                            .build();

                        unsafe {
                            accel.cmd_build_acceleration_structures(
                                command_buffer,
                                std::slice::from_ref(&build_info),
                                &[std::slice::from_ref(&range_info)],
                            )
                        };
                    }
                }
            }
            Ok(())
        })?;

        Ok(BuiltStructures {
            bottom_levels: self.bottom_levels,
            top_level: self.top_level,
        })
    }
}

fn instances_geometry(instance_data: vk::DeviceAddress) -> vk::AccelerationStructureGeometryKHR {
    let instances = vk::AccelerationStructureGeometryInstancesDataKHR::builder()
        .array_of_pointers(false)
        .data(vk::DeviceOrHostAddressConstKHR {
            device_address: instance_data,
        })
        .build();

    vk::AccelerationStructureGeometryKHR::builder()
        .geometry_type(vk::GeometryTypeKHR::INSTANCES)
        .geometry(vk::AccelerationStructureGeometryDataKHR { instances })
        .build()
}

/// Full read/write barrier between acceleration-structure builds. Later
/// builds both read earlier structures and overwrite the shared scratch
/// region, so both access directions are covered.
fn record_acceleration_structure_barrier(device: &ash::Device, command_buffer: vk::CommandBuffer) {
    let barrier = vk::MemoryBarrier::builder()
        .src_access_mask(
            vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR
                | vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR,
        )
        .dst_access_mask(
            vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR
                | vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR,
        )
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR,
            vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR,
            vk::DependencyFlags::empty(),
            std::slice::from_ref(&barrier),
            &[],
            &[],
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_is_the_maximum_not_the_sum() {
        let blas_sizes = [100u64, 4096, 512];
        let tlas_size = 2048u64;

        let size = scratch_buffer_size(blas_sizes.iter().copied().chain([tlas_size]));

        assert_eq!(size, 4096);
        assert_ne!(size, blas_sizes.iter().sum::<u64>() + tlas_size);
    }

    #[test]
    fn tlas_can_dominate_scratch_size() {
        let size = scratch_buffer_size([64u64, 128].into_iter().chain([65536]));
        assert_eq!(size, 65536);
    }

    #[test]
    fn scratch_of_nothing_is_zero() {
        assert_eq!(scratch_buffer_size(std::iter::empty()), 0);
    }

    #[test]
    fn every_bottom_level_build_and_barrier_precedes_the_top_level_build() {
        for mesh_count in 1..=8 {
            let steps = build_steps(mesh_count);

            let top_position = steps
                .iter()
                .position(|step| *step == BuildStep::TopLevel)
                .expect("plan must contain a top-level build");

            for mesh in 0..mesh_count {
                let build_position = steps
                    .iter()
                    .position(|step| *step == BuildStep::BottomLevel(mesh))
                    .expect("every mesh must be built");
                assert!(build_position < top_position);
                // The very next step flushes the build before anything
                // reads the structure or reuses the scratch region.
                assert_eq!(steps[build_position + 1], BuildStep::Barrier);
            }

            assert_eq!(steps[top_position + 1], BuildStep::Barrier);
            assert_eq!(steps.len(), mesh_count * 2 + 2);
        }
    }

    #[test]
    fn bottom_level_builds_are_recorded_in_mesh_order() {
        let steps = build_steps(4);
        let built: Vec<usize> = steps
            .iter()
            .filter_map(|step| match step {
                BuildStep::BottomLevel(mesh) => Some(*mesh),
                _ => None,
            })
            .collect();
        assert_eq!(built, vec![0, 1, 2, 3]);
    }
}
