use crate::vulkan::{acceleration_structure::AccelerationStructure, buffer::Buffer};

/// One mesh's geometry on the device, plus the bottom-level structure built
/// over it. Created once at scene load and immutable afterwards.
pub struct Mesh {
    pub vertex_count: u32,
    pub index_count: u32,
    pub material_id: Option<u32>,

    pub positions: Buffer<[f32; 3]>,
    pub normals: Buffer<[f32; 3]>,
    pub uvs: Buffer<[f32; 2]>,
    pub indices: Buffer<u32>,

    pub blas: AccelerationStructure,
}
