use std::sync::Arc;

use ash::vk;
use log::{debug, info};

use crate::{
    accel::{self, build_instances, GeometryRegistry, MeshBinding},
    error::GlintError,
    loader::{LoadedImage, LoadedScene},
    scene::{GpuMaterial, Mesh, MeshInstanceData, Scene},
    vulkan::{
        buffer::Buffer, command_buffer::submit_one_time, context::Context, image::Image,
        image_view::ImageView, sampler::Sampler,
    },
};

struct UploadedMesh {
    vertex_count: u32,
    index_count: u32,
    material_id: Option<u32>,
    positions: Buffer<[f32; 3]>,
    normals: Buffer<[f32; 3]>,
    uvs: Buffer<[f32; 2]>,
    indices: Buffer<u32>,
}

/// Turns a parsed scene into its GPU form: uploads geometry, builds the
/// two-level acceleration structure, and fills the buffers the descriptor
/// sets will bind. Runs once at startup; any failure abandons the scene.
pub fn setup(loaded: LoadedScene, context: Arc<Context>) -> Result<Scene, GlintError> {
    // Geometry upload and registration. Positions and indices feed the
    // bottom-level builds, all four buffers are read by the closest-hit
    // shader as storage buffers.
    let mut registry = GeometryRegistry::new();
    let mut uploaded = Vec::with_capacity(loaded.meshes.len());
    for mesh in &loaded.meshes {
        debug!(
            "uploading mesh {:?}: {} vertices, {} triangles",
            mesh.name,
            mesh.positions.len(),
            mesh.indices.len() / 3
        );
        let positions = Buffer::with_data(
            context.clone(),
            vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            &mesh.positions,
        )?;
        let normals = Buffer::with_data(
            context.clone(),
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &mesh.normals,
        )?;
        let uvs = Buffer::with_data(
            context.clone(),
            vk::BufferUsageFlags::STORAGE_BUFFER,
            &mesh.uvs,
        )?;
        let indices = Buffer::with_data(
            context.clone(),
            vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            &mesh.indices,
        )?;

        registry.register_mesh(
            positions.device_address(),
            mesh.positions.len() as u32,
            indices.device_address(),
            mesh.indices.len() as u32,
        )?;

        uploaded.push(UploadedMesh {
            vertex_count: mesh.positions.len() as u32,
            index_count: mesh.indices.len() as u32,
            material_id: mesh.material_id,
            positions,
            normals,
            uvs,
            indices,
        });
    }

    let declared = accel::declare(&context, &registry, loaded.nodes.len() as u32)?;

    let blas_addresses = declared.bottom_level_addresses();
    let bindings: Vec<MeshBinding> = uploaded
        .iter()
        .zip(&blas_addresses)
        .map(|(mesh, &blas_address)| MeshBinding {
            blas_address,
            normals: mesh.normals.descriptor_info(),
            uvs: mesh.uvs.descriptor_info(),
            indices: mesh.indices.descriptor_info(),
        })
        .collect();

    let (instance_records, attributes) = build_instances(&loaded.nodes, &bindings)?;
    let instances_buffer = Buffer::with_data(
        context.clone(),
        vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
        &instance_records,
    )?;

    let built = declared.build(&context, &registry, &instances_buffer)?;
    info!(
        "built {} bottom-level structures and a top-level structure over {} instances",
        built.bottom_levels.len(),
        instance_records.len()
    );

    let meshes: Vec<Mesh> = uploaded
        .into_iter()
        .zip(built.bottom_levels)
        .map(|(mesh, blas)| Mesh {
            vertex_count: mesh.vertex_count,
            index_count: mesh.index_count,
            material_id: mesh.material_id,
            positions: mesh.positions,
            normals: mesh.normals,
            uvs: mesh.uvs,
            indices: mesh.indices,
            blas,
        })
        .collect();
    let total_triangles: u32 = meshes.iter().map(|mesh| mesh.index_count / 3).sum();
    let total_vertices: u32 = meshes.iter().map(|mesh| mesh.vertex_count).sum();
    debug!("scene totals: {total_vertices} vertices, {total_triangles} triangles");

    let materials: Vec<GpuMaterial> = if loaded.materials.is_empty() {
        // A zero-sized storage buffer cannot be bound.
        vec![GpuMaterial::default()]
    } else {
        loaded
            .materials
            .iter()
            .map(|material| GpuMaterial::new(material.base_color, material.base_color_texture))
            .collect()
    };
    let materials_buffer = Buffer::with_data(
        context.clone(),
        vk::BufferUsageFlags::STORAGE_BUFFER,
        &materials,
    )?;

    // Instance-to-material lookup, node order like everything else the
    // shader indexes by instance id.
    let mesh_instance_data: Vec<MeshInstanceData> = loaded
        .nodes
        .iter()
        .map(|node| MeshInstanceData {
            material_id: meshes[node.mesh_index]
                .material_id
                .map(|id| id as i32)
                .unwrap_or(-1),
        })
        .collect();
    let mesh_instance_data_buffer = Buffer::with_data(
        context.clone(),
        vk::BufferUsageFlags::STORAGE_BUFFER,
        &mesh_instance_data,
    )?;

    let (textures, texture_infos) = upload_textures(&context, &loaded.images)?;
    let linear_sampler = Sampler::new_linear(context.clone());

    Ok(Scene {
        meshes,
        nodes: loaded.nodes,
        top_level: built.top_level,
        instances_buffer,
        attributes,
        materials_buffer,
        mesh_instance_data_buffer,
        textures,
        texture_infos,
        linear_sampler,
    })
}

fn upload_textures(
    context: &Arc<Context>,
    images: &[LoadedImage],
) -> Result<(Vec<ImageView>, Vec<vk::DescriptorImageInfo>), GlintError> {
    if images.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut views = Vec::with_capacity(images.len());
    // Staging buffers must survive until the copies below have executed;
    // submit_one_time waits for the queue to drain before returning.
    let mut staging_buffers = Vec::with_capacity(images.len());

    submit_one_time(context, |command_buffer| {
        for image in images {
            let create_info = vk::ImageCreateInfo::builder()
                .image_type(vk::ImageType::TYPE_2D)
                .format(vk::Format::R8G8B8A8_UNORM)
                .extent(vk::Extent3D {
                    width: image.width,
                    height: image.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let device_image = Image::new(context.clone(), &create_info)?;

            let staging: Buffer<u8> = Buffer::with_data(
                context.clone(),
                vk::BufferUsageFlags::TRANSFER_SRC,
                &image.rgba8,
            )?;
            device_image.record_upload(command_buffer, &staging);
            staging_buffers.push(staging);

            views.push(ImageView::new_default(
                context.clone(),
                Arc::new(device_image),
            ));
        }
        Ok(())
    })?;

    let infos = views
        .iter()
        .map(|view| vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: view.inner,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
        .collect();

    Ok((views, infos))
}
