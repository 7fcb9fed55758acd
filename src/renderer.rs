// =============================================================================
// TRIANGLE RENDERER - every Vulkan object the demo needs, created once
// =============================================================================
//
// INITIALIZATION ORDER:
// 1. Core context (instance, surface, GPU, device, queue)
// 2. Swapchain + image views
// 3. Command pool, one command buffer per image, one copy command buffer
// 4. Render pass
// 5. Framebuffers
// 6. Vertex buffer (staged upload)
// 7. Shader modules
// 8. Graphics pipeline
// 9. Semaphores (+ fence)
// 10. Pre-recorded draw commands
//
// Image i, view i, framebuffer i and command buffer i always belong together.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use winit::window::Window;

use crate::backend::buffer::{self, GpuBuffer};
use crate::backend::swapchain::SwapchainRequest;
use crate::backend::sync::FrameSync;
use crate::backend::{pipeline, shader, Swapchain, VulkanDevice};
use crate::config::Config;
use crate::geometry::TRIANGLE;

/// Stage at which the submit waits for the acquired image
const WAIT_STAGES: [vk::PipelineStageFlags; 1] = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

pub struct TriangleRenderer {
    device: Arc<VulkanDevice>,
    queue: vk::Queue,
    swapchain: Swapchain,

    command_pool: vk::CommandPool,
    /// One per swapchain image, recorded once
    command_buffers: Vec<vk::CommandBuffer>,

    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    vertex_buffer: GpuBuffer,

    vs_module: vk::ShaderModule,
    fs_module: vk::ShaderModule,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,

    sync: FrameSync,
}

impl TriangleRenderer {
    pub fn new(config: &Config, window: &Window) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let display_handle = window.display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window.window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let device = VulkanDevice::new(
            &config.window.title,
            enable_validation,
            display_handle,
            window_handle,
        )?;
        let queue = device.graphics_queue;

        let size = window.inner_size();
        let swapchain = Swapchain::new(device.clone(), SwapchainRequest {
            width: size.width,
            height: size.height,
            image_count: config.graphics.swapchain_images,
            present_mode: config.present_mode(),
        })?;

        let (command_pool, command_buffers, copy_command_buffer) =
            Self::create_command_buffers(&device, swapchain.images.len() as u32)?;

        let render_pass = pipeline::create_render_pass(&device, swapchain.format)?;
        let framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
        )?;

        let vertex_buffer = buffer::create_device_local_buffer(
            &device,
            queue,
            copy_command_buffer,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &TRIANGLE,
        )?;

        let vs_module = shader::load_shader_module(&device, &config.shaders.vertex)?;
        let fs_module = shader::load_shader_module(&device, &config.shaders.fragment)?;

        let (pipeline, pipeline_layout) = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            swapchain.extent,
            vs_module,
            fs_module,
        )?;

        let sync = FrameSync::new(&device)?;

        let renderer = Self {
            device,
            queue,
            swapchain,
            command_pool,
            command_buffers,
            render_pass,
            framebuffers,
            vertex_buffer,
            vs_module,
            fs_module,
            pipeline,
            pipeline_layout,
            sync,
        };

        check_per_image_lengths(
            renderer.swapchain.images.len(),
            renderer.swapchain.image_views.len(),
            renderer.framebuffers.len(),
            renderer.command_buffers.len(),
        )?;
        renderer.record_command_buffers(config.graphics.clear_color)?;

        log::info!("Vulkan initialized successfully!");
        Ok(renderer)
    }

    fn create_command_buffers(
        device: &VulkanDevice,
        image_count: u32,
    ) -> Result<(vk::CommandPool, Vec<vk::CommandBuffer>, vk::CommandBuffer)> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family);

        let command_pool = unsafe {
            device.device.create_command_pool(&pool_info, None)
                .context("Failed to create command pool")?
        };
        log::info!("Command buffer pool created");

        let command_buffers = Self::allocate_command_buffers(device, command_pool, image_count)?;
        let copy_command_buffer = Self::allocate_command_buffers(device, command_pool, 1)?
            .pop()
            .context("Driver returned no copy command buffer")?;

        Ok((command_pool, command_buffers, copy_command_buffer))
    }

    fn allocate_command_buffers(
        device: &VulkanDevice,
        command_pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let command_buffers = unsafe {
            device.device.allocate_command_buffers(&alloc_info)
                .context("Failed to allocate command buffers")?
        };
        log::info!("Created {} command buffers", count);

        Ok(command_buffers)
    }

    /// Record the whole frame for every swapchain image: clear, draw 3 vertices.
    fn record_command_buffers(&self, clear_color: [f32; 4]) -> Result<()> {
        let device = &self.device.device;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.swapchain.extent,
        };

        for (&cmd, &framebuffer) in self.command_buffers.iter().zip(&self.framebuffers) {
            unsafe {
                let begin_info = vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
                device.begin_command_buffer(cmd, &begin_info)
                    .context("Failed to begin command buffer")?;

                let render_pass_info = vk::RenderPassBeginInfo::builder()
                    .render_pass(self.render_pass)
                    .framebuffer(framebuffer)
                    .render_area(render_area)
                    .clear_values(&clear_values);

                device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
                device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
                device.cmd_draw(cmd, TRIANGLE.len() as u32, 1, 0, 0);
                device.cmd_end_render_pass(cmd);

                device.end_command_buffer(cmd)
                    .context("Failed to end command buffer")?;
            }
        }

        log::info!("Command buffers recorded");
        Ok(())
    }

    /// Render a single frame: acquire, submit the matching pre-recorded buffer, present.
    pub fn render_scene(&self) -> Result<()> {
        let device = &self.device.device;

        self.sync.wait_and_reset(device)?;

        let image_index = self.swapchain.acquire_next_image(self.sync.present_complete)?;
        log::trace!("Acquired swapchain image {}", image_index);

        let cmd = *self.command_buffers
            .get(image_index as usize)
            .with_context(|| format!("No command buffer for image {}", image_index))?;

        let wait_semaphores = [self.sync.present_complete];
        let signal_semaphores = [self.sync.render_complete];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&WAIT_STAGES)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.queue_submit(self.queue, &[submit_info.build()], self.sync.in_flight_fence)
                .context("Failed to submit draw commands")?;
        }

        self.swapchain.present(self.queue, image_index, &signal_semaphores)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for TriangleRenderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        let _ = self.device.wait_idle();
        let device = &self.device.device;

        unsafe {
            self.sync.destroy(device);

            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_shader_module(self.vs_module, None);
            device.destroy_shader_module(self.fs_module, None);

            self.vertex_buffer.destroy(device);

            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_render_pass(self.render_pass, None);

            // Also frees the per-image and copy command buffers
            device.destroy_command_pool(self.command_pool, None);
        }

        // Swapchain and device drop after this, in field order
    }
}

/// Per-image arrays are indexed by the acquired image index and must line up
fn check_per_image_lengths(
    images: usize,
    views: usize,
    framebuffers: usize,
    command_buffers: usize,
) -> Result<()> {
    if views != images || framebuffers != images || command_buffers != images {
        anyhow::bail!(
            "Per-image resources out of step: {} images, {} views, {} framebuffers, {} command buffers",
            images,
            views,
            framebuffers,
            command_buffers
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_lengths_pass() {
        assert!(check_per_image_lengths(2, 2, 2, 2).is_ok());
        assert!(check_per_image_lengths(3, 3, 3, 3).is_ok());
    }

    #[test]
    fn any_mismatch_fails() {
        assert!(check_per_image_lengths(2, 1, 2, 2).is_err());
        assert!(check_per_image_lengths(2, 2, 3, 2).is_err());
        assert!(check_per_image_lengths(3, 3, 3, 2).is_err());
    }
}
