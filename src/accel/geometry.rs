use ash::vk;

use crate::error::GlintError;

/// Index of a registered mesh, also the index of its bottom-level structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshHandle(pub usize);

/// Triangle geometry description for one mesh: positions as tightly packed
/// 3x32-bit floats, indices as 32-bit unsigned. The descriptor is stored
/// here unmodified from registration until the build commands that
/// reference it have been recorded.
pub struct TriangleGeometry {
    pub geometry: vk::AccelerationStructureGeometryKHR,
    pub primitive_count: u32,
}

/// Collects per-mesh geometry descriptors for the scene build. One geometry
/// per bottom-level structure; multi-primitive meshes are rejected upstream
/// by the importer.
#[derive(Default)]
pub struct GeometryRegistry {
    geometries: Vec<TriangleGeometry>,
}

impl GeometryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_mesh(
        &mut self,
        vertex_buffer: vk::DeviceAddress,
        vertex_count: u32,
        index_buffer: vk::DeviceAddress,
        index_count: u32,
    ) -> Result<MeshHandle, GlintError> {
        if vertex_count == 0 || index_count == 0 {
            return Err(GlintError::malformed(format!(
                "mesh {} has no geometry ({vertex_count} vertices, {index_count} indices)",
                self.geometries.len()
            )));
        }
        if index_count % 3 != 0 {
            return Err(GlintError::malformed(format!(
                "mesh {} is not a triangle list ({index_count} indices)",
                self.geometries.len()
            )));
        }

        let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
            .vertex_format(vk::Format::R32G32B32_SFLOAT)
            .vertex_data(vk::DeviceOrHostAddressConstKHR {
                device_address: vertex_buffer,
            })
            .vertex_stride((std::mem::size_of::<f32>() * 3) as vk::DeviceSize)
            .max_vertex(vertex_count - 1)
            .index_type(vk::IndexType::UINT32)
            .index_data(vk::DeviceOrHostAddressConstKHR {
                device_address: index_buffer,
            })
            .build();

        let geometry = vk::AccelerationStructureGeometryKHR::builder()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .build();

        let handle = MeshHandle(self.geometries.len());
        self.geometries.push(TriangleGeometry {
            geometry,
            primitive_count: index_count / 3,
        });
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn geometries(&self) -> &[TriangleGeometry] {
        &self.geometries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_hands_out_sequential_handles() {
        let mut registry = GeometryRegistry::new();

        let a = registry.register_mesh(0x1000, 3, 0x2000, 3).unwrap();
        let b = registry.register_mesh(0x3000, 8, 0x4000, 36).unwrap();

        assert_eq!(a, MeshHandle(0));
        assert_eq!(b, MeshHandle(1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.geometries()[0].primitive_count, 1);
        assert_eq!(registry.geometries()[1].primitive_count, 12);
    }

    #[test]
    fn rejects_empty_meshes() {
        let mut registry = GeometryRegistry::new();

        assert!(matches!(
            registry.register_mesh(0x1000, 0, 0x2000, 3),
            Err(GlintError::MalformedScene(_))
        ));
        assert!(matches!(
            registry.register_mesh(0x1000, 3, 0x2000, 0),
            Err(GlintError::MalformedScene(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_non_triangle_index_counts() {
        let mut registry = GeometryRegistry::new();

        assert!(matches!(
            registry.register_mesh(0x1000, 4, 0x2000, 7),
            Err(GlintError::MalformedScene(_))
        ));
    }
}
