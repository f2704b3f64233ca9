//! 2D sampled textures
//!
//! Builds shader-readable textures from decoded [`ImageData`] via the
//! staging-upload path: the image moves through the two supported standalone
//! layout transitions (undefined to transfer-destination before the copy,
//! transfer-destination to shader-read-only after it).

use ash::vk;
use crate::assets::ImageData;
use crate::render::cubemap::gpu_cubemap::{SampledImage, Sampler};
use crate::render::vulkan::buffer::StagingBuffer;
use crate::render::vulkan::commands::OnceCommandBuffer;
use crate::render::vulkan::image::Image;
use crate::render::vulkan::{DeviceContext, VulkanResult};

/// 2D sampled texture: image plus sampler
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    fn sampler_create_info() -> vk::SamplerCreateInfo {
        vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(16.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(0.0)
            .build()
    }

    /// Create a texture from decoded RGBA image data
    pub fn from_image_data(ctx: &DeviceContext, image_data: &ImageData, name: &str) -> VulkanResult<Self> {
        let image = Image::new_2d(
            ctx,
            vk::Format::R8G8B8A8_UNORM,
            image_data.width,
            image_data.height,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
            name,
        )?;

        let staging = StagingBuffer::new(ctx, &image_data.data, name)?;

        image.transition_layout(
            ctx,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        OnceCommandBuffer::run(ctx, name, |cmd| {
            image.copy_from_buffer(cmd, staging.handle(), image_data.width, image_data.height);
            Ok(())
        })?;

        image.transition_layout(
            ctx,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        let sampler = Sampler::new(ctx, &Self::sampler_create_info(), name)?;

        log::debug!(
            "Created texture '{}' ({}x{})",
            name, image_data.width, image_data.height
        );

        Ok(Self { image, sampler })
    }

    /// Get the underlying image
    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl SampledImage for Texture {
    fn image_view(&self) -> vk::ImageView {
        self.image.view()
    }

    fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }
}
