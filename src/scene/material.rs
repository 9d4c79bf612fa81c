/// Material record as the closest-hit shader reads it from a raw storage
/// buffer. The stride must stay 16-byte aligned: a mismatch silently shifts
/// every following array element.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct GpuMaterial {
    pub base_color: [f32; 4],
    /// Index into the texture array, -1 when untextured.
    pub base_color_texture_id: i32,
    pub _pad: [u32; 3],
}

impl GpuMaterial {
    pub fn new(base_color: [f32; 4], base_color_texture: Option<usize>) -> Self {
        Self {
            base_color,
            base_color_texture_id: base_color_texture.map(|id| id as i32).unwrap_or(-1),
            _pad: [0; 3],
        }
    }
}

impl Default for GpuMaterial {
    fn default() -> Self {
        Self::new([1.0, 1.0, 1.0, 1.0], None)
    }
}

/// Per-instance record resolving an instance id to its material, in the
/// same order as the instance buffer.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MeshInstanceData {
    pub material_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_stride_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<GpuMaterial>(), 32);
        assert_eq!(std::mem::size_of::<GpuMaterial>() % 16, 0);
        assert_eq!(crate::offset_of!(GpuMaterial, base_color), 0);
        assert_eq!(crate::offset_of!(GpuMaterial, base_color_texture_id), 16);
    }

    #[test]
    fn untextured_material_points_nowhere() {
        let material = GpuMaterial::new([0.5, 0.5, 0.5, 1.0], None);
        assert_eq!(material.base_color_texture_id, -1);

        let textured = GpuMaterial::new([1.0, 1.0, 1.0, 1.0], Some(3));
        assert_eq!(textured.base_color_texture_id, 3);
    }
}
