use ash::vk;

use crate::{
    error::GlintError,
    scene::SceneNode,
    transform::instance_transform,
};

/// One entry of the top-level structure's input buffer, in the exact 64-byte
/// layout the intersection hardware consumes: a row-major 3x4 world
/// transform, two packed 24+8-bit words, and the bottom-level structure's
/// device address.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct InstanceRecord {
    pub transform: [f32; 12],
    pub instance_custom_index_and_mask: u32,
    pub instance_sbt_offset_and_flags: u32,
    pub acceleration_structure_reference: u64,
}

/// All rays test against every instance.
pub const VISIBILITY_MASK_ALL: u8 = 0xFF;

/// Packs a 24-bit value and an 8-bit value into one word, low bits first.
/// Overflowing the 24-bit field would silently corrupt the adjacent byte,
/// so it is checked here.
pub fn pack_24_8(low: u32, high: u8) -> u32 {
    assert!(low < (1 << 24), "value {low:#x} does not fit in 24 bits");
    low | (u32::from(high) << 24)
}

fn cull_disable_flags() -> u8 {
    vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8
}

/// What the instance builder needs to know about one registered mesh: where
/// its bottom-level structure lives and which buffers hold the attributes
/// the closest-hit shader reads.
#[derive(Clone, Copy)]
pub struct MeshBinding {
    pub blas_address: vk::DeviceAddress,
    pub normals: vk::DescriptorBufferInfo,
    pub uvs: vk::DescriptorBufferInfo,
    pub indices: vk::DescriptorBufferInfo,
}

/// Attribute-buffer descriptors in instance order. `normals[i]`, `uvs[i]`
/// and `indices[i]` belong to the mesh instanced by record `i`, so a shader
/// indexing these arrays by instance id lands on the right buffers.
#[derive(Default)]
pub struct AttributeBindings {
    pub normals: Vec<vk::DescriptorBufferInfo>,
    pub uvs: Vec<vk::DescriptorBufferInfo>,
    pub indices: Vec<vk::DescriptorBufferInfo>,
}

/// Materializes the instance records for every scene node, in node order,
/// along with the matching attribute-buffer descriptors.
///
/// A node referencing a mesh outside `meshes` is a malformed scene, not a
/// recoverable condition.
pub fn build_instances(
    nodes: &[SceneNode],
    meshes: &[MeshBinding],
) -> Result<(Vec<InstanceRecord>, AttributeBindings), GlintError> {
    let mut instances = Vec::with_capacity(nodes.len());
    let mut attributes = AttributeBindings::default();

    for node in nodes {
        let mesh = meshes.get(node.mesh_index).ok_or_else(|| {
            GlintError::malformed(format!(
                "node {:?} references mesh {} of {}",
                node.name,
                node.mesh_index,
                meshes.len()
            ))
        })?;

        instances.push(InstanceRecord {
            transform: instance_transform(&node.transform.to_matrix()),
            instance_custom_index_and_mask: pack_24_8(0, VISIBILITY_MASK_ALL),
            instance_sbt_offset_and_flags: pack_24_8(0, cull_disable_flags()),
            acceleration_structure_reference: mesh.blas_address,
        });

        attributes.normals.push(mesh.normals);
        attributes.uvs.push(mesh.uvs);
        attributes.indices.push(mesh.indices);
    }

    Ok((instances, attributes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::NodeTransform;
    use ash::vk::Handle;
    use ultraviolet::{Rotor3, Vec3};

    fn buffer_info(raw: u64) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: vk::Buffer::from_raw(raw),
            offset: 0,
            range: 64,
        }
    }

    fn binding(tag: u64) -> MeshBinding {
        MeshBinding {
            blas_address: tag,
            normals: buffer_info(tag * 10 + 1),
            uvs: buffer_info(tag * 10 + 2),
            indices: buffer_info(tag * 10 + 3),
        }
    }

    fn node(mesh_index: usize, translation: Vec3) -> SceneNode {
        SceneNode {
            name: None,
            mesh_index,
            transform: NodeTransform::Decomposed {
                translation,
                rotation: Rotor3::identity(),
                scale: Vec3::one(),
            },
        }
    }

    #[test]
    fn record_is_the_hardware_layout() {
        assert_eq!(std::mem::size_of::<InstanceRecord>(), 64);
        assert_eq!(crate::offset_of!(InstanceRecord, transform), 0);
        assert_eq!(
            crate::offset_of!(InstanceRecord, instance_custom_index_and_mask),
            48
        );
        assert_eq!(
            crate::offset_of!(InstanceRecord, instance_sbt_offset_and_flags),
            52
        );
        assert_eq!(
            crate::offset_of!(InstanceRecord, acceleration_structure_reference),
            56
        );
    }

    #[test]
    fn pack_splits_at_bit_24() {
        assert_eq!(pack_24_8(0, 0xFF), 0xFF00_0000);
        assert_eq!(pack_24_8(0x00AB_CDEF, 0x12), 0x12AB_CDEF);
        assert_eq!(pack_24_8((1 << 24) - 1, 0), 0x00FF_FFFF);
    }

    #[test]
    #[should_panic(expected = "does not fit in 24 bits")]
    fn pack_rejects_oversized_index() {
        pack_24_8(1 << 24, 0);
    }

    #[test]
    fn single_identity_instance() {
        let meshes = [binding(0xAAAA)];
        let nodes = [node(0, Vec3::zero())];

        let (instances, _) = build_instances(&nodes, &meshes).unwrap();

        assert_eq!(instances.len(), 1);
        let record = &instances[0];
        #[rustfmt::skip]
        let identity = [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
        ];
        assert_eq!(record.transform, identity);
        assert_eq!(record.acceleration_structure_reference, 0xAAAA);
        assert_eq!(record.instance_custom_index_and_mask, 0xFF00_0000);
        assert_eq!(record.instance_sbt_offset_and_flags >> 24, 0x1);
    }

    #[test]
    fn shared_mesh_keeps_one_handle_and_per_node_translations() {
        let meshes = [binding(0xBEEF)];
        let translations = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.0, 0.0, 3.0),
            Vec3::new(-1.0, -2.0, -3.0),
        ];
        let nodes: Vec<SceneNode> = translations.iter().map(|&t| node(0, t)).collect();

        let (instances, _) = build_instances(&nodes, &meshes).unwrap();

        assert_eq!(instances.len(), 5);
        for (record, translation) in instances.iter().zip(&translations) {
            assert_eq!(record.acceleration_structure_reference, 0xBEEF);
            assert_eq!(record.transform[3], translation.x);
            assert_eq!(record.transform[7], translation.y);
            assert_eq!(record.transform[11], translation.z);
        }
    }

    #[test]
    fn attribute_order_matches_instance_order() {
        let meshes = [binding(1), binding(2), binding(3)];
        let nodes = [
            node(2, Vec3::zero()),
            node(0, Vec3::zero()),
            node(1, Vec3::zero()),
            node(2, Vec3::zero()),
        ];

        let (instances, attributes) = build_instances(&nodes, &meshes).unwrap();

        assert_eq!(attributes.normals.len(), instances.len());
        assert_eq!(attributes.uvs.len(), instances.len());
        assert_eq!(attributes.indices.len(), instances.len());

        for (i, node) in nodes.iter().enumerate() {
            let mesh = &meshes[node.mesh_index];
            assert_eq!(
                instances[i].acceleration_structure_reference,
                mesh.blas_address
            );
            assert_eq!(attributes.normals[i].buffer, mesh.normals.buffer);
            assert_eq!(attributes.uvs[i].buffer, mesh.uvs.buffer);
            assert_eq!(attributes.indices[i].buffer, mesh.indices.buffer);
        }
    }

    #[test]
    fn out_of_bounds_mesh_reference_is_fatal() {
        let meshes = [binding(1)];
        let nodes = [node(1, Vec3::zero())];

        assert!(matches!(
            build_instances(&nodes, &meshes),
            Err(GlintError::MalformedScene(_))
        ));
    }
}
