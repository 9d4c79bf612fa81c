use std::path::Path;

use log::{info, warn};
use ultraviolet::{Mat4, Rotor3, Vec3, Vec4};

use crate::{error::GlintError, scene::SceneNode, transform::NodeTransform};

use super::{LoadedImage, LoadedMaterial, LoadedMesh, LoadedScene};

/// Parses a glTF file into host-side mesh, node, material and image lists.
///
/// Only the default scene's root nodes are considered; nodes without a mesh
/// (camera and light carriers) are skipped. A node with children is a hard
/// error, matching the flat-scene assumption everywhere downstream.
pub fn load_gltf(path: impl AsRef<Path>) -> Result<LoadedScene, GlintError> {
    let path = path.as_ref();
    let (document, buffers, images) = gltf::import(path)?;

    let mut scene = LoadedScene::default();

    if document.meshes().len() == 0 {
        return Err(GlintError::malformed(format!(
            "{} contains no meshes",
            path.display()
        )));
    }
    for mesh in document.meshes() {
        scene.meshes.push(load_mesh(&mesh, &buffers)?);
    }

    let gltf_scene = document
        .default_scene()
        .ok_or_else(|| GlintError::malformed(format!("{} has no default scene", path.display())))?;

    for node in gltf_scene.nodes() {
        let Some(mesh) = node.mesh() else {
            // Cameras and lights ride on mesh-less nodes.
            continue;
        };

        if node.children().len() != 0 {
            return Err(GlintError::malformed(format!(
                "node {:?} has child nodes; only flat scenes are supported",
                node.name().unwrap_or("<unnamed>")
            )));
        }

        scene.nodes.push(SceneNode {
            name: node.name().map(str::to_owned),
            mesh_index: mesh.index(),
            transform: convert_transform(node.transform()),
        });
    }

    if scene.nodes.is_empty() {
        return Err(GlintError::malformed(format!(
            "{} places no meshes in its default scene",
            path.display()
        )));
    }

    for material in document.materials() {
        let pbr = material.pbr_metallic_roughness();
        scene.materials.push(LoadedMaterial {
            base_color: pbr.base_color_factor(),
            base_color_texture: pbr.base_color_texture().map(|info| info.texture().source().index()),
        });
    }

    for image in &images {
        scene.images.push(LoadedImage {
            rgba8: convert_rgba8(image)?,
            width: image.width,
            height: image.height,
        });
    }

    info!(
        "loaded {}: {} meshes, {} nodes, {} materials, {} images",
        path.display(),
        scene.meshes.len(),
        scene.nodes.len(),
        scene.materials.len(),
        scene.images.len()
    );

    Ok(scene)
}

fn load_mesh(
    mesh: &gltf::Mesh<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<LoadedMesh, GlintError> {
    let name = mesh.name().unwrap_or("<unnamed>");

    // One geometry per bottom-level structure; multi-primitive meshes have
    // no representation in the rest of the pipeline.
    if mesh.primitives().len() != 1 {
        return Err(GlintError::malformed(format!(
            "mesh {:?} has {} primitive groups, expected exactly one",
            name,
            mesh.primitives().len()
        )));
    }
    let primitive = mesh.primitives().next().unwrap();

    if primitive.mode() != gltf::mesh::Mode::Triangles {
        return Err(GlintError::malformed(format!(
            "mesh {:?} is not a triangle list",
            name
        )));
    }

    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| GlintError::malformed(format!("mesh {:?} has no positions", name)))?
        .collect();
    if positions.is_empty() {
        return Err(GlintError::malformed(format!(
            "mesh {:?} has no vertices",
            name
        )));
    }

    let normals: Vec<[f32; 3]> = reader
        .read_normals()
        .ok_or_else(|| GlintError::malformed(format!("mesh {:?} has no normals", name)))?
        .collect();
    if normals.len() != positions.len() {
        return Err(GlintError::malformed(format!(
            "mesh {:?}: {} normals for {} positions",
            name,
            normals.len(),
            positions.len()
        )));
    }

    let uvs: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
        Some(tex_coords) => tex_coords.into_f32().collect(),
        None => {
            warn!("mesh {:?} has no texture coordinates, substituting zeros", name);
            vec![[0.0, 0.0]; positions.len()]
        }
    };

    let indices = widen_indices(
        reader
            .read_indices()
            .ok_or_else(|| GlintError::malformed(format!("mesh {:?} has no indices", name)))?,
    );
    check_indices(&indices, positions.len())
        .map_err(|reason| GlintError::malformed(format!("mesh {:?}: {reason}", name)))?;

    Ok(LoadedMesh {
        name: mesh.name().map(str::to_owned),
        positions,
        normals,
        uvs,
        indices,
        material_id: primitive.material().index().map(|id| id as u32),
    })
}

fn convert_transform(transform: gltf::scene::Transform) -> NodeTransform {
    match transform {
        gltf::scene::Transform::Matrix { matrix } => NodeTransform::Matrix(Mat4::new(
            Vec4::from(matrix[0]),
            Vec4::from(matrix[1]),
            Vec4::from(matrix[2]),
            Vec4::from(matrix[3]),
        )),
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => NodeTransform::Decomposed {
            translation: Vec3::from(translation),
            rotation: Rotor3::from_quaternion_array(rotation),
            scale: Vec3::from(scale),
        },
    }
}

/// Index source data is commonly 16-bit; the geometry registry only accepts
/// 32-bit indices, so narrower formats are promoted, never truncated.
fn widen_indices(indices: gltf::mesh::util::ReadIndices) -> Vec<u32> {
    use gltf::mesh::util::ReadIndices;
    match indices {
        ReadIndices::U8(iter) => widen(iter),
        ReadIndices::U16(iter) => widen(iter),
        ReadIndices::U32(iter) => iter.collect(),
    }
}

fn widen<T: Into<u32>>(values: impl Iterator<Item = T>) -> Vec<u32> {
    values.map(Into::into).collect()
}

fn check_indices(indices: &[u32], vertex_count: usize) -> Result<(), String> {
    if indices.is_empty() {
        return Err("empty index buffer".to_string());
    }
    if indices.len() % 3 != 0 {
        return Err(format!("{} indices do not form triangles", indices.len()));
    }
    if let Some(&out_of_range) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(format!(
            "index {out_of_range} exceeds vertex count {vertex_count}"
        ));
    }
    Ok(())
}

fn convert_rgba8(image: &gltf::image::Data) -> Result<Vec<u8>, GlintError> {
    use gltf::image::Format;
    match image.format {
        Format::R8G8B8A8 => Ok(image.pixels.clone()),
        Format::R8G8B8 => Ok(rgb_to_rgba(&image.pixels)),
        other => Err(GlintError::malformed(format!(
            "unsupported image format {other:?}"
        ))),
    }
}

fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
    for pixel in rgb.chunks_exact(3) {
        rgba.extend_from_slice(pixel);
        rgba.push(0xFF);
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_bit_indices_widen_losslessly() {
        let source: [u16; 6] = [0, 1, 2, 2, 1, 3];

        let widened = widen(source.into_iter());

        assert_eq!(widened.len(), 6);
        assert_eq!(widened, vec![0u32, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn widening_preserves_the_full_u16_range() {
        let widened = widen([u16::MAX, 0].into_iter());
        assert_eq!(widened, vec![65535u32, 0]);
    }

    #[test]
    fn index_validation_catches_truncated_and_dangling_buffers() {
        assert!(check_indices(&[0, 1, 2], 3).is_ok());
        assert!(check_indices(&[], 3).is_err());
        assert!(check_indices(&[0, 1], 3).is_err());
        assert!(check_indices(&[0, 1, 3], 3).is_err());
    }

    #[test]
    fn rgb_pixels_gain_an_opaque_alpha() {
        let rgb = [10u8, 20, 30, 40, 50, 60];

        let rgba = rgb_to_rgba(&rgb);

        assert_eq!(rgba, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }
}
