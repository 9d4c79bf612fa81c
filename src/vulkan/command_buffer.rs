use std::sync::Arc;

use ash::vk;

use crate::error::GlintError;

use super::context::Context;

/// Records one-shot GPU work and waits for it to finish.
///
/// Both texture upload and the acceleration-structure build use the same
/// submit-and-wait shape: allocate a transient command buffer, record,
/// submit, block until the queue drains, free. The command buffer is freed
/// on every exit path, including when recording fails.
pub fn submit_one_time<R>(
    context: &Arc<Context>,
    record: impl FnOnce(vk::CommandBuffer) -> Result<R, GlintError>,
) -> Result<R, GlintError> {
    let device = &context.device;

    let command_buffer = {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_buffer_count(1)
            .command_pool(context.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY);

        unsafe { device.allocate_command_buffers(&allocate_info) }?[0]
    };
    let _guard = CommandBufferGuard {
        context,
        command_buffer,
    };

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.begin_command_buffer(command_buffer, &begin_info) }?;

    let result = record(command_buffer)?;

    unsafe { device.end_command_buffer(command_buffer) }?;

    let submit_info =
        vk::SubmitInfo::builder().command_buffers(std::slice::from_ref(&command_buffer));
    unsafe { device.queue_submit(context.queue, std::slice::from_ref(&submit_info), vk::Fence::null()) }?;
    unsafe { device.queue_wait_idle(context.queue) }?;

    Ok(result)
}

struct CommandBufferGuard<'a> {
    context: &'a Arc<Context>,
    command_buffer: vk::CommandBuffer,
}

impl Drop for CommandBufferGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            self.context.device.free_command_buffers(
                self.context.command_pool,
                std::slice::from_ref(&self.command_buffer),
            )
        }
    }
}
