//! Command buffer management
//!
//! A [`CommandPool`] hands out named, cached command buffers for per-frame
//! recording; [`OnceCommandBuffer`] covers the pervasive setup-time pattern
//! of recording a handful of commands, submitting them and blocking until
//! the GPU is done.

use ash::{vk, Device};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};
use crate::render::vulkan::sync::{Fence, DEFAULT_FENCE_TIMEOUT};

/// Lifecycle state of a command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// Freshly allocated, nothing recorded
    Initial,
    /// Between `begin` and `end`; recording methods are legal
    Recording,
    /// `end` has been called; the buffer may be submitted
    Executable,
    /// Submitted to a queue; must not be re-recorded until the submission
    /// completes
    Submitted,
}

/// Command buffer wrapper tracking its recording state
///
/// Commands may only be recorded between [`begin`](Self::begin) and
/// [`end`](Self::end); recording methods outside that bracket are programmer
/// errors and panic immediately rather than producing GPU-side corruption.
pub struct CommandBuffer {
    device: Device,
    command_buffer: vk::CommandBuffer,
    name: String,
    state: RecordingState,
}

impl CommandBuffer {
    fn new(device: Device, command_buffer: vk::CommandBuffer, name: String) -> Self {
        Self {
            device,
            command_buffer,
            name,
            state: RecordingState::Initial,
        }
    }

    /// Begin a recording session
    pub fn begin(&mut self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<()> {
        if self.state == RecordingState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Command buffer '{}' already recording", self.name),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);

        unsafe {
            self.device.begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.state = RecordingState::Recording;
        Ok(())
    }

    /// End the recording session, making the buffer submittable
    pub fn end(&mut self) -> VulkanResult<()> {
        if self.state != RecordingState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Command buffer '{}' not recording", self.name),
            });
        }

        unsafe {
            self.device.end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        self.state = RecordingState::Executable;
        Ok(())
    }

    fn assert_recording(&self) {
        assert!(
            self.state == RecordingState::Recording,
            "command buffer '{}' used outside begin/end (state: {:?})",
            self.name,
            self.state
        );
    }

    /// Call `vkCmdBeginRenderPass` with inline subpass contents
    pub fn begin_render_pass(&mut self, render_pass_begin: &vk::RenderPassBeginInfo) {
        self.assert_recording();
        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }
    }

    /// Call `vkCmdEndRenderPass`
    pub fn end_render_pass(&mut self) {
        self.assert_recording();
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
        }
    }

    /// Bind a graphics pipeline
    pub fn bind_graphics_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.assert_recording();
        unsafe {
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Bind a single descriptor set at set index 0 of a graphics pipeline
    pub fn bind_descriptor_set(&mut self, descriptor_set: vk::DescriptorSet, layout: vk::PipelineLayout) {
        self.assert_recording();
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[descriptor_set],
                &[],
            );
        }
    }

    /// Bind vertex buffers starting at binding 0
    pub fn bind_vertex_buffers(&mut self, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        self.assert_recording();
        unsafe {
            self.device.cmd_bind_vertex_buffers(self.command_buffer, 0, buffers, offsets);
        }
    }

    /// Bind an index buffer
    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.assert_recording();
        unsafe {
            self.device.cmd_bind_index_buffer(self.command_buffer, buffer, offset, index_type);
        }
    }

    /// Draw non-indexed geometry
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.assert_recording();
        unsafe {
            self.device.cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    /// Draw indexed geometry
    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        self.assert_recording();
        unsafe {
            self.device.cmd_draw_indexed(self.command_buffer, index_count, instance_count, first_index, vertex_offset, first_instance);
        }
    }

    /// Set the viewport
    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        self.assert_recording();
        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
        }
    }

    /// Set the scissor rectangle
    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        self.assert_recording();
        unsafe {
            self.device.cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
    }

    /// Push a typed constant block to the bound pipeline layout
    pub fn push_constants<T: bytemuck::Pod>(
        &mut self,
        data: &T,
        layout: vk::PipelineLayout,
        stage_flags: vk::ShaderStageFlags,
    ) {
        self.assert_recording();
        unsafe {
            self.device.cmd_push_constants(
                self.command_buffer,
                layout,
                stage_flags,
                0,
                bytemuck::bytes_of(data),
            );
        }
    }

    /// Record an image memory barrier
    pub fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier,
    ) {
        self.assert_recording();
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    /// Record an image-to-image copy
    pub fn copy_image(
        &mut self,
        src_image: vk::Image,
        src_layout: vk::ImageLayout,
        dst_image: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy],
    ) {
        self.assert_recording();
        unsafe {
            self.device.cmd_copy_image(
                self.command_buffer,
                src_image,
                src_layout,
                dst_image,
                dst_layout,
                regions,
            );
        }
    }

    /// Record a buffer-to-image copy
    pub fn copy_buffer_to_image(
        &mut self,
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.assert_recording();
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                src_buffer,
                dst_image,
                dst_layout,
                regions,
            );
        }
    }

    /// Record a buffer-to-buffer copy
    pub fn copy_buffer(&mut self, src_buffer: vk::Buffer, dst_buffer: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.assert_recording();
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src_buffer, dst_buffer, regions);
        }
    }

    /// Get the command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Get the current lifecycle state
    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.state = RecordingState::Submitted;
    }
}

/// Command pool wrapper with RAII cleanup and a per-name buffer cache
///
/// Buffers are allocated lazily on first request per debug name and reused on
/// subsequent requests. Destroying the pool frees every buffer allocated from
/// it.
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
    buffers: HashMap<String, CommandBuffer>,
}

impl CommandPool {
    /// Create a new resettable command pool on the graphics queue family
    pub fn new(ctx: &DeviceContext) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(ctx.graphics_queue_family());

        let command_pool = unsafe {
            ctx.device().create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: ctx.raw_device(),
            command_pool,
            buffers: HashMap::new(),
        })
    }

    /// Request a command buffer by debug name
    ///
    /// The first request for a name allocates a primary command buffer; later
    /// requests with the same name return that same buffer instead of
    /// allocating again.
    pub fn request_command_buffer(&mut self, name: &str) -> VulkanResult<&mut CommandBuffer> {
        match self.buffers.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let alloc_info = vk::CommandBufferAllocateInfo::builder()
                    .command_pool(self.command_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);

                let command_buffers = unsafe {
                    self.device.allocate_command_buffers(&alloc_info)
                        .map_err(VulkanError::Api)?
                };

                log::debug!("Allocated command buffer '{}'", name);

                Ok(entry.insert(CommandBuffer::new(
                    self.device.clone(),
                    command_buffers[0],
                    name.to_string(),
                )))
            }
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to be idle to ensure all command buffers are finished
            let _ = self.device.device_wait_idle();

            // Destroy command pool (automatically frees all command buffers)
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// One-shot command sequence: record, submit, block until GPU completion
///
/// Allocates a transient pool and buffer, runs the caller's recording closure
/// inside an open `begin`/`end` bracket, submits to the graphics queue and
/// waits on a dedicated fence. Blocking is intentional: setup-time operations
/// are infrequent and correctness matters more than throughput here.
pub struct OnceCommandBuffer {
    device: Device,
    pool: vk::CommandPool,
}

impl OnceCommandBuffer {
    /// Record and synchronously execute a unit of GPU work
    pub fn run<F>(ctx: &DeviceContext, name: &str, work: F) -> VulkanResult<()>
    where
        F: FnOnce(&mut CommandBuffer) -> VulkanResult<()>,
    {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(ctx.graphics_queue_family());

        let pool = unsafe {
            ctx.device().create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        // Pool destruction on every exit path, including recording errors.
        let guard = Self {
            device: ctx.raw_device(),
            pool,
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(guard.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let raw_buffers = unsafe {
            ctx.device().allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        let mut cmd = CommandBuffer::new(ctx.raw_device(), raw_buffers[0], name.to_string());

        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        work(&mut cmd)?;
        cmd.end()?;

        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers);

        Fence::for_submission(ctx, name, DEFAULT_FENCE_TIMEOUT, |fence| unsafe {
            ctx.device()
                .queue_submit(ctx.graphics_queue(), &[submit_info.build()], fence)
                .map_err(VulkanError::Api)
        })?;

        cmd.mark_submitted();
        drop(guard);
        Ok(())
    }
}

impl Drop for OnceCommandBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_state_transitions_are_distinct() {
        assert_ne!(RecordingState::Initial, RecordingState::Recording);
        assert_ne!(RecordingState::Recording, RecordingState::Executable);
        assert_ne!(RecordingState::Executable, RecordingState::Submitted);
    }

    /// Compile-time validation of the one-shot API shape; running it needs a
    /// live device.
    #[test]
    fn test_once_command_buffer_signature() {
        let _run: fn(&DeviceContext, &str, fn(&mut CommandBuffer) -> VulkanResult<()>) -> VulkanResult<()> =
            OnceCommandBuffer::run;
    }
}
