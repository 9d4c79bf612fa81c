use crate::transform::NodeTransform;

/// A placed mesh. Scene graphs are flat: nodes with children are rejected
/// at import, so no transform chaining happens anywhere downstream.
#[derive(Clone, Debug)]
pub struct SceneNode {
    /// Diagnostic only.
    pub name: Option<String>,
    pub mesh_index: usize,
    pub transform: NodeTransform,
}
