//! GPU cubemap textures
//!
//! A [`GpuCubemap`] is a cube-compatible image with exactly six array layers
//! (one per face) and a cube view, plus an owned sampler. It is both the
//! destination the bake loop copies rendered faces into and, once
//! transitioned to shader-read-only, a sampled texture for shading.

use ash::{vk, Device};
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};
use crate::render::vulkan::buffer::StagingBuffer;
use crate::render::vulkan::commands::{CommandBuffer, OnceCommandBuffer};
use crate::render::vulkan::framebuffer::OffscreenFramebuffer;
use crate::render::vulkan::image::{Image, ImageDesc};

/// Number of faces in a cubemap
pub const CUBE_FACE_COUNT: u32 = 6;

/// Number of mip levels for a full image pyramid over the given base size
pub fn miplevel_count(width: u32, height: u32) -> u32 {
    ((width.max(height) as f32).log2().floor() as u32) + 1
}

/// A sampled image that can be bound into a combined-image-sampler descriptor
pub trait SampledImage {
    /// The image view covering the sampled subresource range
    fn image_view(&self) -> vk::ImageView;
    /// The sampler to bind alongside the view
    fn sampler(&self) -> vk::Sampler;
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create a sampler from a fully populated creation-info struct
    pub fn new(ctx: &DeviceContext, create_info: &vk::SamplerCreateInfo, name: &str) -> VulkanResult<Self> {
        let sampler = unsafe {
            ctx.device().create_sampler(create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!("Created sampler '{}'", name);

        Ok(Self {
            device: ctx.raw_device(),
            sampler,
        })
    }

    /// Get the sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Cubemap texture: six-layer cube-compatible image plus sampler
///
/// Invariants: the face count is always six and the mip count is at least
/// one; the cube view covers all faces and all mips.
pub struct GpuCubemap {
    image: Image,
    sampler: Sampler,
}

impl GpuCubemap {
    fn sampler_create_info(miplevel_count: u32) -> vk::SamplerCreateInfo {
        vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .min_lod(0.0)
            .max_lod(miplevel_count as f32)
            .anisotropy_enable(true)
            .max_anisotropy(16.0)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .build()
    }

    /// Allocate an empty cubemap to be filled by transfer writes
    pub fn new(
        ctx: &DeviceContext,
        format: vk::Format,
        width: u32,
        height: u32,
        miplevel_count: u32,
        name: &str,
    ) -> VulkanResult<Self> {
        assert!(miplevel_count > 0);

        let image = Image::new(ctx, &ImageDesc {
            flags: vk::ImageCreateFlags::CUBE_COMPATIBLE,
            format,
            width,
            height,
            mip_levels: miplevel_count,
            array_layers: CUBE_FACE_COUNT,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            view_type: vk::ImageViewType::CUBE,
            aspect_mask: vk::ImageAspectFlags::COLOR,
            name,
        })?;

        let sampler = Sampler::new(ctx, &Self::sampler_create_info(miplevel_count), name)?;

        Ok(Self { image, sampler })
    }

    /// Build a single-mip cubemap from tightly packed face-major pixel data
    ///
    /// `pixels` holds the six faces back to back (+X, -X, +Y, -Y, +Z, -Z),
    /// each face `width * height` texels of `format`. The upload is one
    /// bracketed one-shot recording: transition to transfer-destination, copy
    /// all faces, transition to shader-read-only.
    pub fn from_pixels(
        ctx: &DeviceContext,
        format: vk::Format,
        width: u32,
        height: u32,
        pixels: &[u8],
        name: &str,
    ) -> VulkanResult<Self> {
        if pixels.is_empty() || pixels.len() % CUBE_FACE_COUNT as usize != 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "cubemap '{}' pixel data ({} bytes) is not six equally sized faces",
                    name,
                    pixels.len()
                ),
            });
        }

        let cubemap = Self::new(ctx, format, width, height, 1, name)?;

        let staging = StagingBuffer::new(ctx, pixels, name)?;
        let face_size = (pixels.len() / CUBE_FACE_COUNT as usize) as vk::DeviceSize;

        let copy_regions: Vec<vk::BufferImageCopy> = (0..CUBE_FACE_COUNT)
            .map(|face| {
                vk::BufferImageCopy::builder()
                    .buffer_offset(face as vk::DeviceSize * face_size)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: face,
                        layer_count: 1,
                    })
                    .image_extent(vk::Extent3D {
                        width,
                        height,
                        depth: 1,
                    })
                    .build()
            })
            .collect();

        OnceCommandBuffer::run(ctx, name, |cmd| {
            cubemap.image.place_pipeline_barrier(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                cubemap.image.subresource_range(),
            );

            cmd.copy_buffer_to_image(
                staging.handle(),
                cubemap.image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &copy_regions,
            );

            cubemap.image.place_pipeline_barrier(
                cmd,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                cubemap.image.subresource_range(),
            );

            Ok(())
        })?;

        log::info!("Uploaded cubemap '{}' ({}x{} per face)", name, width, height);

        Ok(cubemap)
    }

    /// Copy one rendered face out of an offscreen framebuffer into the
    /// `(face, mip_level)` subresource
    ///
    /// One bracketed operation: the offscreen attachment is transitioned to
    /// transfer-source, the copy is recorded, and the attachment is
    /// transitioned back to color-attachment layout for the next iteration.
    /// The destination cubemap must already be in transfer-destination
    /// layout.
    pub fn copy_face_from(
        &self,
        cmd: &mut CommandBuffer,
        source: &OffscreenFramebuffer,
        face: u32,
        mip_level: u32,
        width: u32,
        height: u32,
    ) -> VulkanResult<()> {
        assert!(face < CUBE_FACE_COUNT);
        assert!(mip_level < self.image.mip_levels());

        source.transition_layout(cmd, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;

        let region = vk::ImageCopy::builder()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level,
                base_array_layer: face,
                layer_count: 1,
            })
            .dst_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .build();

        self.image.copy_from_image(cmd, source.image().handle(), region);

        source.transition_layout(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)?;

        Ok(())
    }

    /// Standalone blocking transition of the full subresource range (all six
    /// faces, all mips)
    pub fn transition_layout(
        &self,
        ctx: &DeviceContext,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        self.image.transition_layout(ctx, old_layout, new_layout)
    }

    /// Get the underlying image
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Number of faces (always six)
    pub fn face_count(&self) -> u32 {
        CUBE_FACE_COUNT
    }

    /// Number of mip levels
    pub fn miplevel_count(&self) -> u32 {
        self.image.mip_levels()
    }

    /// Base face extent
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

impl SampledImage for GpuCubemap {
    fn image_view(&self) -> vk::ImageView {
        self.image.view()
    }

    fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miplevel_count_for_bake_resolutions() {
        assert_eq!(miplevel_count(64, 64), 7);
        assert_eq!(miplevel_count(512, 512), 10);
    }

    #[test]
    fn test_miplevel_count_general() {
        assert_eq!(miplevel_count(1, 1), 1);
        assert_eq!(miplevel_count(2, 2), 2);
        assert_eq!(miplevel_count(3, 3), 2);
        assert_eq!(miplevel_count(256, 128), 9);
        assert_eq!(miplevel_count(1024, 1024), 11);
    }

    #[test]
    fn test_face_count_is_six() {
        assert_eq!(CUBE_FACE_COUNT, 6);
    }
}
