use thiserror::Error;

/// Everything that can abort loading or building a scene.
///
/// Malformed scenes and device failures abandon the whole scene build;
/// nothing retries and nothing renders a partial scene. The low-level
/// `vulkan/` setup keeps the teacher's `expect(...)` style, while the
/// scene-build path propagates this `Result` so a device loss reports
/// instead of aborting the process.
#[derive(Debug, Error)]
pub enum GlintError {
    /// A glTF file could not be imported.
    #[error("failed to import glTF: {0}")]
    Import(#[from] gltf::Error),

    /// Reading an asset from disk failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The scene violates an invariant the rest of the pipeline relies on.
    #[error("malformed scene: {0}")]
    MalformedScene(String),

    /// A Vulkan command reported failure.
    #[error("device error: {0:?}")]
    Device(#[from] ash::vk::Result),

    /// An invariant internal to the renderer was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GlintError {
    /// Builds a [`GlintError::MalformedScene`] from any string-like message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedScene(message.into())
    }
}
