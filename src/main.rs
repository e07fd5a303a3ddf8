// Hello-triangle Vulkan renderer
//
// Draws one hard-coded triangle to a fixed-size window, frame after frame,
// until the window is closed.
//
// FRAME FLOW (one frame in flight):
// 1. Wait for the previous submission's fence, reset it
// 2. Acquire the next swapchain image
// 3. Re-record the single command buffer for that image
// 4. Submit to the graphics queue
// 5. Present on the presentation queue

mod backend;
mod config;
mod error;

use anyhow::Result;
use ash::vk;
use backend::shader::{self, DirShaderSource, ShaderSource};
use backend::sync::FrameSync;
use backend::teardown::{self, BuiltResources, DestroyStep};
use backend::{pipeline, Swapchain, VulkanDevice};
use config::Config;
use error::RenderError;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!("Starting triangle renderer");
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(err) = app.fatal_error.take() {
        return Err(err.into());
    }
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

/// Application state holding all Vulkan resources.
///
/// Construction stores every resource as soon as it exists, so a failure at
/// any step leaves `Drop` able to tear down exactly the prefix that was
/// built, in the order `teardown_plan` dictates.
struct App {
    config: Config,

    window: Option<Arc<Window>>,
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain>,

    render_pass: Option<vk::RenderPass>,
    pipeline_layout: Option<vk::PipelineLayout>,
    pipeline: Option<vk::Pipeline>,
    framebuffers: Vec<vk::Framebuffer>,

    command_pool: Option<vk::CommandPool>,
    command_buffer: Option<vk::CommandBuffer>,

    frame_sync: Option<FrameSync>,

    wait_stages: [vk::PipelineStageFlags; 1],

    is_minimized: bool,
    fatal_error: Option<RenderError>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            device: None,
            swapchain: None,
            render_pass: None,
            pipeline_layout: None,
            pipeline: None,
            framebuffers: Vec::new(),
            command_pool: None,
            command_buffer: None,
            frame_sync: None,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            is_minimized: false,
            fatal_error: None,
        }
    }

    fn init_vulkan(&mut self, window: &Window) -> Result<(), RenderError> {
        log::info!("Initializing Vulkan...");

        let enable_validation =
            cfg!(debug_assertions) && self.config.debug.validation_layers;

        let device = VulkanDevice::new(window, &self.config.window.title, enable_validation)?;
        self.device = Some(device.clone());

        let size = window.inner_size();
        let swapchain = Swapchain::new(device.clone(), size.width, size.height)?;
        let format = swapchain.format;
        let extent = swapchain.extent;
        let image_views = swapchain.image_views.clone();
        self.swapchain = Some(swapchain);

        let render_pass = pipeline::create_render_pass(&device, format)?;
        self.render_pass = Some(render_pass);

        let shaders = DirShaderSource::new(&self.config.graphics.shader_dir);
        let vert_code = shaders.load(shader::VERTEX_SHADER)?;
        let frag_code = shaders.load(shader::FRAGMENT_SHADER)?;

        let vert_module = shader::create_shader_module(&device, shader::VERTEX_SHADER, &vert_code)?;
        let frag_module =
            match shader::create_shader_module(&device, shader::FRAGMENT_SHADER, &frag_code) {
                Ok(module) => module,
                Err(err) => {
                    unsafe { device.device.destroy_shader_module(vert_module, None) };
                    return Err(err);
                }
            };

        let built = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            extent,
            vert_module,
            frag_module,
        );

        // Modules are only needed during pipeline creation.
        unsafe {
            device.device.destroy_shader_module(frag_module, None);
            device.device.destroy_shader_module(vert_module, None);
        }

        let (graphics_pipeline, pipeline_layout) = built?;
        self.pipeline_layout = Some(pipeline_layout);
        self.pipeline = Some(graphics_pipeline);

        self.framebuffers =
            pipeline::create_framebuffers(&device, &image_views, render_pass, extent)?;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .map_err(RenderError::CommandPoolCreationFailed)?;
        self.command_pool = Some(command_pool);

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .map_err(RenderError::CommandBufferAllocationFailed)?;
        self.command_buffer = Some(command_buffers[0]);

        self.frame_sync = Some(FrameSync::new(&device.device)?);

        log::info!("Vulkan initialized");
        Ok(())
    }

    /// One iteration of the frame protocol:
    /// WaitPrevious -> Acquire -> Record -> Submit -> Present.
    fn render_frame(&mut self) -> Result<(), RenderError> {
        if self.is_minimized {
            return Ok(());
        }

        let (Some(device), Some(swapchain), Some(sync), Some(cmd), Some(render_pass), Some(graphics_pipeline)) = (
            self.device.as_ref(),
            self.swapchain.as_ref(),
            self.frame_sync.as_ref(),
            self.command_buffer,
            self.render_pass,
            self.pipeline,
        ) else {
            return Ok(());
        };

        // WaitPrevious: the sole backpressure bounding the CPU to one
        // outstanding submission.
        unsafe {
            device
                .device
                .wait_for_fences(&[sync.in_flight], true, u64::MAX)
                .map_err(RenderError::FenceWaitFailed)?;
            device
                .device
                .reset_fences(&[sync.in_flight])
                .map_err(RenderError::FenceWaitFailed)?;
        }

        // Acquire
        let (image_index, suboptimal) = swapchain.acquire_next_image(sync.image_available)?;
        if suboptimal {
            log::warn!("Acquired suboptimal swapchain image");
        }

        // Record
        let framebuffer = self.framebuffers[image_index as usize];
        Self::record_commands(
            &device.device,
            cmd,
            render_pass,
            framebuffer,
            swapchain.extent,
            graphics_pipeline,
            self.config.graphics.clear_color,
        )?;

        // Submit: wait for image-available at color-attachment output so
        // earlier pipeline stages can start immediately.
        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], sync.in_flight)
        }
        .map_err(RenderError::QueueSubmitFailed)?;

        // Present: non-success is soft here, the fixed-size window never
        // invalidates the swapchain in practice.
        match swapchain.present(device.present_queue, image_index, &signal_semaphores) {
            Ok(true) => log::warn!("Swapchain suboptimal on present"),
            Ok(false) => {}
            Err(result) => log::warn!("Present returned {}, continuing", result),
        }

        Ok(())
    }

    fn record_commands(
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        graphics_pipeline: vk::Pipeline,
        clear_color: [f32; 4],
    ) -> Result<(), RenderError> {
        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(RenderError::CommandBufferBeginFailed)?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            device
                .begin_command_buffer(cmd, &begin_info)
                .map_err(RenderError::CommandBufferBeginFailed)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            }];

            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, graphics_pipeline);

            // Dynamic state, supplied per recording.
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_line_width(cmd, 1.0);

            device.cmd_draw(cmd, 3, 1, 0, 0);

            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .map_err(RenderError::CommandBufferRecordFailed)?;
        }

        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RenderError) {
        log::error!("{}", err);
        self.fatal_error = Some(err);
        if let Some(ref device) = self.device {
            let _ = device.wait_idle();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // The swapchain is never recreated, so resizing stays disabled.
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, RenderError::NoWindow(e.to_string()));
                return;
            }
        };

        if let Err(err) = self.init_vulkan(&window) {
            self.fail(event_loop, err);
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref device) = self.device {
                    let _ = device.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                // Only minimize can get here; the window is non-resizable.
                self.is_minimized = size.width == 0 || size.height == 0;
            }

            WindowEvent::RedrawRequested => {
                if let Err(err) = self.render_frame() {
                    self.fail(event_loop, err);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };

        log::info!("Cleaning up Vulkan resources...");

        // No GPU work may still be reading objects about to be destroyed.
        let _ = device.wait_idle();

        let built = BuiltResources {
            swapchain: self.swapchain.is_some(),
            render_pass: self.render_pass.is_some(),
            pipeline_layout: self.pipeline_layout.is_some(),
            pipeline: self.pipeline.is_some(),
            framebuffers: !self.framebuffers.is_empty(),
            command_pool: self.command_pool.is_some(),
            sync_objects: self.frame_sync.is_some(),
        };

        for step in teardown::teardown_plan(&built) {
            match step {
                DestroyStep::SyncObjects => {
                    if let Some(sync) = self.frame_sync.take() {
                        sync.destroy(&device.device);
                    }
                }
                DestroyStep::CommandPool => {
                    // Also frees the command buffer allocated from it.
                    if let Some(pool) = self.command_pool.take() {
                        self.command_buffer = None;
                        unsafe { device.device.destroy_command_pool(pool, None) };
                    }
                }
                DestroyStep::Framebuffers => {
                    for framebuffer in self.framebuffers.drain(..) {
                        unsafe { device.device.destroy_framebuffer(framebuffer, None) };
                    }
                }
                DestroyStep::RenderPass => {
                    if let Some(render_pass) = self.render_pass.take() {
                        unsafe { device.device.destroy_render_pass(render_pass, None) };
                    }
                }
                DestroyStep::Pipeline => {
                    if let Some(graphics_pipeline) = self.pipeline.take() {
                        unsafe { device.device.destroy_pipeline(graphics_pipeline, None) };
                    }
                }
                DestroyStep::PipelineLayout => {
                    if let Some(layout) = self.pipeline_layout.take() {
                        unsafe { device.device.destroy_pipeline_layout(layout, None) };
                    }
                }
                DestroyStep::Swapchain => {
                    // Image views, then the swapchain handle (wrapper Drop).
                    self.swapchain = None;
                }
            }
        }

        // Device drop destroys device -> debug messenger -> surface ->
        // instance; the window closes when winit drops it after this.
        drop(device);

        log::info!("Cleanup complete");
    }
}
