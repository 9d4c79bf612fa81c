mod material;
mod mesh;
mod node;

pub use material::*;
pub use mesh::*;
pub use node::*;

use ash::vk;

use crate::{
    accel::{AttributeBindings, InstanceRecord},
    vulkan::{
        acceleration_structure::AccelerationStructure, buffer::Buffer, image_view::ImageView,
        sampler::Sampler,
    },
};

/// Everything the ray-tracing pipeline binds, built once at load time.
/// A scene change means rebuilding the whole thing; there is no incremental
/// update path.
pub struct Scene {
    pub meshes: Vec<Mesh>,
    pub nodes: Vec<SceneNode>,

    pub top_level: AccelerationStructure,
    pub instances_buffer: Buffer<InstanceRecord>,

    /// Attribute-buffer descriptors in instance order, parallel to the
    /// records in `instances_buffer`.
    pub attributes: AttributeBindings,

    pub materials_buffer: Buffer<GpuMaterial>,
    pub mesh_instance_data_buffer: Buffer<MeshInstanceData>,

    pub textures: Vec<ImageView>,
    pub texture_infos: Vec<vk::DescriptorImageInfo>,
    pub linear_sampler: Sampler,
}
