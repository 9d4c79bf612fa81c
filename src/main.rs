mod accel;
mod camera;
mod config_loader;
mod error;
mod input_map;
mod loader;
mod scene;
mod scene_renderer;
mod scene_uploader;
mod transform;
mod utility;
mod vulkan;

use std::{sync::Arc, time::Instant};

use ash::vk;
use log::info;
use ultraviolet::{Vec2, Vec3};
use winit::{
    dpi,
    event::{DeviceEvent, ElementState, Event, KeyboardInput, MouseButton, VirtualKeyCode, WindowEvent},
    event_loop::EventLoop,
    window::{Window, WindowBuilder},
};

use camera::Camera;
use config_loader::{CameraPosition, Config, ConfigFileLoader};
use input_map::InputMap;
use scene::Scene;
use scene_renderer::SceneRenderer;
use vulkan::{context::Context, swapchain::SwapchainContainer};

const CAMERA_MOVE_SPEED: f32 = 2.0;
const CAMERA_FAST_SPEED: f32 = 8.0;
const CAMERA_ROTATION_SPEED: f32 = 0.005;

// Rust will drop these fields in the order they are declared
struct GlintApp {
    renderer: SceneRenderer,
    /// Owns every buffer, texture and acceleration structure the renderer's
    /// descriptor sets reference; must outlive all rendering.
    _scene: Scene,

    camera: Camera,
    input_map: InputMap,
    last_frame: Instant,
    config_loader: ConfigFileLoader,

    command_buffers: Vec<vk::CommandBuffer>,

    /// wait semaphore
    present_complete_semaphore: vk::Semaphore,
    /// signal semaphore
    rendering_complete_semaphore: vk::Semaphore,
    draw_fence: vk::Fence,

    swapchain: SwapchainContainer,
    context: Arc<Context>,

    /// Application window
    window: Window,
}

impl GlintApp {
    pub fn new(
        event_loop: &EventLoop<()>,
        config: &Config,
        config_loader: ConfigFileLoader,
    ) -> anyhow::Result<Self> {
        let window = WindowBuilder::new()
            .with_title("Glint")
            .with_inner_size(dpi::LogicalSize {
                width: config.window_width,
                height: config.window_height,
            })
            .with_resizable(false)
            .build(event_loop)?;

        let loaded_scene = loader::load_gltf(&config.scene_path)?;

        let context = Arc::new(Context::new(event_loop, &window));
        let device = &context.device;

        let swapchain = SwapchainContainer::new(
            context.clone(),
            window.inner_size(),
            config.present_mode.to_vk(),
        );

        let scene = scene_uploader::setup(loaded_scene, context.clone())?;

        let renderer = SceneRenderer::new(
            context.clone(),
            &scene,
            swapchain.extent,
            swapchain.surface_format.format,
        )?;

        let camera = {
            let mut camera =
                Camera::new(swapchain.extent.width as f32 / swapchain.extent.height as f32);
            if let Some(cached) = &config.cached.camera_position {
                camera.position = cached.position;
                camera.yaw = cached.yaw;
                camera.pitch = cached.pitch;
            }
            camera
        };

        let command_buffers = {
            let allocate_info = vk::CommandBufferAllocateInfo::builder()
                .command_buffer_count(swapchain.images.len() as u32)
                .command_pool(context.command_pool)
                .level(vk::CommandBufferLevel::PRIMARY);

            unsafe { device.allocate_command_buffers(&allocate_info) }
                .expect("Could not allocate command buffers")
        };

        let (present_complete_semaphore, rendering_complete_semaphore) = {
            let create_info = vk::SemaphoreCreateInfo::builder();

            let present_complete_semaphore = unsafe { device.create_semaphore(&create_info, None) }
                .expect("Could not create present semaphore");

            let rendering_complete_semaphore =
                unsafe { device.create_semaphore(&create_info, None) }
                    .expect("Could not create rendering complete semaphore");

            (present_complete_semaphore, rendering_complete_semaphore)
        };

        let draw_fence = {
            let create_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

            unsafe { device.create_fence(&create_info, None) }.expect("Could not create fence")
        };

        info!("scene ready, entering main loop");

        Ok(Self {
            renderer,
            _scene: scene,

            camera,
            input_map: InputMap::new(),
            last_frame: Instant::now(),
            config_loader,

            command_buffers,

            present_complete_semaphore,
            rendering_complete_semaphore,
            draw_fence,

            swapchain,
            context,

            window,
        })
    }

    pub fn main_loop(mut self, event_loop: EventLoop<()>) {
        event_loop.run(move |event, _, control_flow| {
            control_flow.set_poll();

            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => {
                        self.save_camera();
                        control_flow.set_exit();
                    }
                    WindowEvent::KeyboardInput {
                        input:
                            KeyboardInput {
                                virtual_keycode,
                                state,
                                ..
                            },
                        ..
                    } => {
                        match (virtual_keycode, state) {
                            (Some(VirtualKeyCode::Escape), ElementState::Pressed) => {
                                self.save_camera();
                                control_flow.set_exit();
                            }
                            (Some(keycode), ElementState::Pressed) => {
                                self.input_map.update_key_press(keycode)
                            }
                            (Some(keycode), ElementState::Released) => {
                                self.input_map.update_key_release(keycode)
                            }
                            (None, _) => (),
                        };
                    }
                    WindowEvent::MouseInput { button, state, .. } => {
                        match state {
                            ElementState::Pressed => self.input_map.update_mouse_press(button),
                            ElementState::Released => self.input_map.update_mouse_release(button),
                        };
                    }
                    _ => {}
                },
                Event::DeviceEvent { event, .. } => match event {
                    DeviceEvent::MouseMotion { delta: (dx, dy) } => {
                        self.input_map
                            .accumulate_mouse_delta(Vec2::new(dx as f32, dy as f32));
                    }
                    _ => (),
                },
                Event::MainEventsCleared => {
                    self.window.request_redraw();
                }
                Event::RedrawRequested(_window_id) => {
                    self.update();
                    self.draw_frame();
                }
                _ => (),
            }
        });
    }

    fn save_camera(&mut self) {
        self.config_loader.update_cached_camera(CameraPosition {
            position: self.camera.position,
            yaw: self.camera.yaw,
            pitch: self.camera.pitch,
        });
    }

    fn update(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32().min(2.0);
        self.last_frame = now;

        let mut movement = Vec3::zero();
        if self.input_map.is_key_down(VirtualKeyCode::W) {
            movement.z += 1.0;
        }
        if self.input_map.is_key_down(VirtualKeyCode::S) {
            movement.z -= 1.0;
        }
        if self.input_map.is_key_down(VirtualKeyCode::A) {
            movement.x -= 1.0;
        }
        if self.input_map.is_key_down(VirtualKeyCode::D) {
            movement.x += 1.0;
        }
        if self.input_map.is_key_down(VirtualKeyCode::Q) {
            movement.y -= 1.0;
        }
        if self.input_map.is_key_down(VirtualKeyCode::E) {
            movement.y += 1.0;
        }

        let speed = if self.input_map.is_key_down(VirtualKeyCode::LShift)
            || self.input_map.is_key_down(VirtualKeyCode::RShift)
        {
            CAMERA_FAST_SPEED
        } else {
            CAMERA_MOVE_SPEED
        };
        self.camera.advance(movement * speed * dt);

        let mouse_delta = self.input_map.take_mouse_delta();
        if self.input_map.is_mouse_down(MouseButton::Right) {
            self.camera.rotate(
                mouse_delta.x * CAMERA_ROTATION_SPEED,
                mouse_delta.y * CAMERA_ROTATION_SPEED,
            );
        }
    }

    fn draw_frame(&mut self) {
        let device = &self.context.device;

        unsafe {
            device.wait_for_fences(std::slice::from_ref(&self.draw_fence), true, u64::MAX)
        }
        .expect("Could not wait for fences");
        unsafe { device.reset_fences(std::slice::from_ref(&self.draw_fence)) }
            .expect("Could not reset fences");

        let (present_index, _suboptimal) = unsafe {
            self.swapchain.loader.acquire_next_image(
                self.swapchain.inner,
                u64::MAX,
                self.present_complete_semaphore,
                vk::Fence::null(),
            )
        }
        .expect("Could not acquire next image");

        self.renderer.update_camera(&self.camera);

        let command_buffer = self.command_buffers[present_index as usize];
        unsafe {
            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .expect("Could not reset command buffer");

        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe { device.begin_command_buffer(command_buffer, &begin_info) }
            .expect("Could not begin command buffer");

        self.renderer.render(
            command_buffer,
            self.swapchain.images[present_index as usize],
        );

        unsafe { device.end_command_buffer(command_buffer) }
            .expect("Could not end command buffer");

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(std::slice::from_ref(&self.present_complete_semaphore))
            .wait_dst_stage_mask(std::slice::from_ref(
                &vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ))
            .command_buffers(std::slice::from_ref(&command_buffer))
            .signal_semaphores(std::slice::from_ref(&self.rendering_complete_semaphore))
            .build();

        unsafe {
            device.queue_submit(
                self.context.queue,
                std::slice::from_ref(&submit_info),
                self.draw_fence,
            )
        }
        .expect("Could not submit to queue");

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(std::slice::from_ref(&self.rendering_complete_semaphore))
            .swapchains(std::slice::from_ref(&self.swapchain.inner))
            .image_indices(std::slice::from_ref(&present_index));

        unsafe {
            self.swapchain
                .loader
                .queue_present(self.context.queue, &present_info)
        }
        .expect("Could not present queue");
    }
}

impl Drop for GlintApp {
    fn drop(&mut self) {
        let device = &self.context.device;

        unsafe { device.device_wait_idle() }.expect("Could not wait for device idle");

        unsafe { device.destroy_semaphore(self.present_complete_semaphore, None) };
        unsafe { device.destroy_semaphore(self.rendering_complete_semaphore, None) };
        unsafe { device.destroy_fence(self.draw_fence, None) };

        unsafe { device.free_command_buffers(self.context.command_pool, &self.command_buffers) };
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut config_loader = ConfigFileLoader::new("glint.json");
    let config = config_loader.load_config().clone();

    let event_loop = EventLoop::new();
    let app = GlintApp::new(&event_loop, &config, config_loader)?;
    app.main_loop(event_loop);

    Ok(())
}
