use ultraviolet::{Isometry3, Mat4, Rotor3, Vec3};

/// A node's placement, stored exactly as glTF presents it: either an explicit
/// world matrix or a decomposed translation/rotation/scale triple. The two
/// forms are mutually exclusive.
#[derive(Clone, Copy, Debug)]
pub enum NodeTransform {
    /// An explicit column-major world matrix.
    Matrix(Mat4),
    /// A decomposed transform; resolved as translation * rotation * scale.
    Decomposed {
        translation: Vec3,
        rotation: Rotor3,
        scale: Vec3,
    },
}

impl NodeTransform {
    /// Resolves this placement to a single world matrix. The decomposed form
    /// composes `Translation * Rotation * Scale`, matching glTF's TRS order.
    pub fn to_matrix(&self) -> Mat4 {
        match *self {
            NodeTransform::Matrix(matrix) => matrix,
            NodeTransform::Decomposed {
                translation,
                rotation,
                scale,
            } => {
                Isometry3::new(translation, rotation).into_homogeneous_matrix()
                    * Mat4::from_nonuniform_scale(scale)
            }
        }
    }
}

/// Truncates a column-major world matrix to the row-major 3x4 layout the
/// intersection hardware consumes for each instance: the first three rows of
/// the transpose, laid out contiguously.
pub fn instance_transform(matrix: &Mat4) -> [f32; 12] {
    let c = matrix.cols;
    #[rustfmt::skip]
    let rows = [
        c[0].x, c[1].x, c[2].x, c[3].x,
        c[0].y, c[1].y, c[2].y, c[3].y,
        c[0].z, c[1].z, c[2].z, c[3].z,
    ];
    rows
}
