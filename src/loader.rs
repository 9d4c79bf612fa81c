mod scene_loader;

pub use scene_loader::load_gltf;

use crate::scene::SceneNode;

/// A parsed scene file, still on the host. Geometry is ready for upload:
/// indices are already widened to 32 bits and images to RGBA8.
#[derive(Default)]
pub struct LoadedScene {
    pub meshes: Vec<LoadedMesh>,
    pub nodes: Vec<SceneNode>,
    pub materials: Vec<LoadedMaterial>,
    pub images: Vec<LoadedImage>,
}

pub struct LoadedMesh {
    pub name: Option<String>,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub material_id: Option<u32>,
}

pub struct LoadedMaterial {
    pub base_color: [f32; 4],
    pub base_color_texture: Option<usize>,
}

pub struct LoadedImage {
    pub rgba8: Vec<u8>,
    pub width: u32,
    pub height: u32,
}
