use std::sync::Arc;

use ash::vk;

use super::{context::Context, image::Image};

pub struct ImageView {
    pub inner: vk::ImageView,

    pub image: Arc<Image>,
    context: Arc<Context>,
}

impl ImageView {
    pub fn new_default(context: Arc<Context>, image: Arc<Image>) -> Self {
        let create_info = vk::ImageViewCreateInfo::builder()
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(image.full_subresource_range())
            .image(image.inner);

        let imageview = unsafe { context.device.create_image_view(&create_info, None) }
            .expect("Could not create image view");

        Self {
            inner: imageview,
            image,
            context,
        }
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_image_view(self.inner, None) };
    }
}
