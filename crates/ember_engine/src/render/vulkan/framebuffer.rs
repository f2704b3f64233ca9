//! Framebuffer management
//!
//! [`Framebuffer`] wraps a plain `VkFramebuffer`. [`OffscreenFramebuffer`]
//! composes a color [`Image`] with a framebuffer over it for render-to-copy
//! workloads: render a pass into it, flip it to transfer-source, copy the
//! pixels out, flip it back and reuse it next iteration.

use ash::{vk, Device};
use std::cell::Cell;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};
use crate::render::vulkan::commands::{CommandBuffer, OnceCommandBuffer};
use crate::render::vulkan::image::Image;

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a new framebuffer over the given attachments
    ///
    /// The framebuffer references the render pass and must be destroyed
    /// before it.
    pub fn new(
        ctx: &DeviceContext,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        name: &str,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            ctx.device().create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!("Created framebuffer '{}' ({}x{})", name, extent.width, extent.height);

        Ok(Self {
            device: ctx.raw_device(),
            framebuffer,
        })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Offscreen color target composed of an image and a framebuffer over it
///
/// Construction creates the color image first, then the framebuffer
/// referencing its view; teardown runs the other way around (field order is
/// load-bearing: the framebuffer must be destroyed before the view it
/// references). On creation the image is moved to color-attachment layout
/// once; afterwards it cycles between color-attachment and transfer-source
/// through [`transition_layout`](Self::transition_layout).
pub struct OffscreenFramebuffer {
    framebuffer: Framebuffer,
    image: Image,
    current_layout: Cell<vk::ImageLayout>,
}

impl OffscreenFramebuffer {
    /// Create the color image and framebuffer and move the image to
    /// color-attachment layout
    pub fn new(
        ctx: &DeviceContext,
        format: vk::Format,
        width: u32,
        height: u32,
        render_pass: vk::RenderPass,
        name: &str,
    ) -> VulkanResult<Self> {
        let image = Image::new_2d(
            ctx,
            format,
            width,
            height,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            vk::ImageAspectFlags::COLOR,
            name,
        )?;

        let framebuffer = Framebuffer::new(
            ctx,
            render_pass,
            &[image.view()],
            vk::Extent2D { width, height },
            name,
        )?;

        OnceCommandBuffer::run(ctx, "offscreen framebuffer setup", |cmd| {
            image.place_pipeline_barrier(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                image.subresource_range(),
            );
            Ok(())
        })?;

        Ok(Self {
            framebuffer,
            image,
            current_layout: Cell::new(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        })
    }

    /// Record a transition of the color image into the given layout
    ///
    /// Only the attachment/transfer-source round trip is supported; the
    /// barrier is composed into the caller's recording, submission stays with
    /// the caller.
    pub fn transition_layout(&self, cmd: &mut CommandBuffer, new_layout: vk::ImageLayout) -> VulkanResult<()> {
        let old_layout = self.current_layout.get();

        let (src_access, dst_access) = match (old_layout, new_layout) {
            (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL) => (
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            ),
            (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => (
                vk::AccessFlags::TRANSFER_READ,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            (old, new) => return Err(VulkanError::UnsupportedLayoutTransition { old, new }),
        };

        self.image.place_pipeline_barrier(
            cmd,
            old_layout,
            new_layout,
            src_access,
            dst_access,
            self.image.subresource_range(),
        );

        self.current_layout.set(new_layout);
        Ok(())
    }

    /// Get the color image
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer.handle()
    }

    /// Layout the color image is currently in
    pub fn current_layout(&self) -> vk::ImageLayout {
        self.current_layout.get()
    }
}
