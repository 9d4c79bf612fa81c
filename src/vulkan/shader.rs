use std::{io::Cursor, path::Path, sync::Arc};

use ash::vk;

use crate::error::GlintError;

use super::context::Context;

/// A shader module loaded from a compiled SPIR-V file on disk.
pub struct ShaderModule {
    pub inner: vk::ShaderModule,
    context: Arc<Context>,
}

impl ShaderModule {
    pub fn from_file(context: Arc<Context>, path: impl AsRef<Path>) -> Result<Self, GlintError> {
        let bytes = std::fs::read(path.as_ref())?;

        let shader_code = ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|_| {
            GlintError::Internal(format!(
                "{} is not a valid SPIR-V module",
                path.as_ref().display()
            ))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&shader_code);
        let shader_module = unsafe { context.device.create_shader_module(&create_info, None) }?;

        Ok(Self {
            inner: shader_module,
            context,
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.context
                .device
                .destroy_shader_module(self.inner, None);
        }
    }
}
