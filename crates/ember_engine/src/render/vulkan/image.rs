//! GPU image management
//!
//! [`Image`] owns one allocated image, its backing device memory and a
//! matching view as a single unit: construction allocates all three or fails
//! entirely, destruction releases the view before the memory.
//!
//! Layout transitions come in two deliberately distinct flavors. The
//! standalone [`Image::transition_layout`] records and submits a one-shot
//! barrier and blocks until it completes; it supports only the fixed set of
//! transitions used by setup-time uploads. [`Image::place_pipeline_barrier`]
//! records into a caller-owned command buffer and leaves submission to the
//! caller, which is what the cubemap bake loop uses for its per-iteration
//! attachment round trips.

use ash::{vk, Device};
use std::cell::Cell;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};
use crate::render::vulkan::commands::{CommandBuffer, OnceCommandBuffer};

/// Access and stage masks for a supported standalone layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Source access mask
    pub src_access: vk::AccessFlags,
    /// Destination access mask
    pub dst_access: vk::AccessFlags,
    /// Source pipeline stage
    pub src_stage: vk::PipelineStageFlags,
    /// Destination pipeline stage
    pub dst_stage: vk::PipelineStageFlags,
}

/// Classify a layout pair for the standalone transition path
///
/// Exactly two transitions are supported: undefined to transfer-destination
/// (before an upload) and transfer-destination to shader-read-only (after
/// one). Every other pair fails with
/// [`VulkanError::UnsupportedLayoutTransition`]; composed transitions go
/// through [`Image::place_pipeline_barrier`] instead.
pub fn barrier_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> VulkanResult<TransitionMasks> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok(TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        }),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        (old, new) => Err(VulkanError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Creation description for an [`Image`]
pub struct ImageDesc<'a> {
    /// Image creation flags (e.g. cube compatibility)
    pub flags: vk::ImageCreateFlags,
    /// Texel format
    pub format: vk::Format,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Number of mip levels (at least 1)
    pub mip_levels: u32,
    /// Number of array layers (at least 1)
    pub array_layers: u32,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// View type matching the layer configuration
    pub view_type: vk::ImageViewType,
    /// Aspect covered by the view
    pub aspect_mask: vk::ImageAspectFlags,
    /// Internal debug name
    pub name: &'a str,
}

/// GPU image wrapper owning image, memory and view
///
/// Move-only: the wrapper cannot be cloned, and Rust's destructive moves
/// guarantee that exactly one instance releases the handles. The view is
/// always consistent with the image's declared subresource range.
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
    array_layers: u32,
    aspect_mask: vk::ImageAspectFlags,
    name: String,
    // Last layout applied through this wrapper; safety net for the standalone
    // transition path, not a substitute for caller sequencing.
    tracked_layout: Cell<vk::ImageLayout>,
}

impl Image {
    /// Create an image, allocate and bind its memory and create the view
    ///
    /// Either all three objects are created or the constructor fails and
    /// releases whatever it had already created; no partially constructed
    /// resource is observable.
    pub fn new(ctx: &DeviceContext, desc: &ImageDesc) -> VulkanResult<Self> {
        assert!(desc.width > 0 && desc.height > 0);
        assert!(desc.mip_levels > 0);
        assert!(desc.array_layers > 0);
        assert!(!desc.name.is_empty());

        let device = ctx.raw_device();

        let image_create_info = vk::ImageCreateInfo::builder()
            .flags(desc.flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe {
            device.create_image(&image_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory_requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = match ctx.allocator().find_memory_type(
            memory_requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(memory_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(VulkanError::Api(e));
            }
        };

        if let Err(e) = unsafe { device.bind_image_memory(image, memory, 0) } {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        let view_create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(desc.view_type)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect_mask,
                base_mip_level: 0,
                level_count: desc.mip_levels,
                base_array_layer: 0,
                layer_count: desc.array_layers,
            });

        let view = match unsafe { device.create_image_view(&view_create_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(VulkanError::Api(e));
            }
        };

        log::debug!(
            "Created image '{}' ({}x{}, {:?}, {} mips, {} layers)",
            desc.name, desc.width, desc.height, desc.format, desc.mip_levels, desc.array_layers
        );

        Ok(Self {
            device,
            image,
            memory,
            view,
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,
            aspect_mask: desc.aspect_mask,
            name: desc.name.to_string(),
            tracked_layout: Cell::new(vk::ImageLayout::UNDEFINED),
        })
    }

    /// Create a single-mip, single-layer 2D image
    pub fn new_2d(
        ctx: &DeviceContext,
        format: vk::Format,
        width: u32,
        height: u32,
        usage: vk::ImageUsageFlags,
        aspect_mask: vk::ImageAspectFlags,
        name: &str,
    ) -> VulkanResult<Self> {
        Self::new(ctx, &ImageDesc {
            flags: vk::ImageCreateFlags::empty(),
            format,
            width,
            height,
            mip_levels: 1,
            array_layers: 1,
            usage,
            view_type: vk::ImageViewType::TYPE_2D,
            aspect_mask,
            name,
        })
    }

    /// Standalone blocking layout transition over the image's full
    /// subresource range
    ///
    /// Records a one-shot pipeline barrier, submits it and waits for
    /// completion. Expensive, intended for one-off setup transitions only;
    /// supported layout pairs are fixed (see [`barrier_masks`]).
    pub fn transition_layout(
        &self,
        ctx: &DeviceContext,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let masks = barrier_masks(old_layout, new_layout)?;

        debug_assert_eq!(
            self.tracked_layout.get(),
            old_layout,
            "image '{}': transition from {:?} but last known layout is {:?}",
            self.name,
            old_layout,
            self.tracked_layout.get(),
        );

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.subresource_range())
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access)
            .build();

        log::debug!(
            "Transitioning image '{}' {:?} -> {:?}",
            self.name, old_layout, new_layout
        );

        OnceCommandBuffer::run(ctx, "image layout transition", |cmd| {
            cmd.pipeline_barrier(masks.src_stage, masks.dst_stage, barrier);
            Ok(())
        })?;

        self.tracked_layout.set(new_layout);
        Ok(())
    }

    /// Record a layout-transition barrier into an existing command recording
    ///
    /// Non-blocking; the caller controls submission and is responsible for
    /// sequencing transitions correctly across commands.
    pub fn place_pipeline_barrier(
        &self,
        cmd: &mut CommandBuffer,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        subresource_range: vk::ImageSubresourceRange,
    ) {
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(subresource_range)
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();

        cmd.pipeline_barrier(
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
            barrier,
        );

        self.tracked_layout.set(new_layout);
    }

    /// Record a copy from another image into this one
    ///
    /// Assumes the caller has placed the source in transfer-source layout and
    /// this image in transfer-destination layout.
    pub fn copy_from_image(&self, cmd: &mut CommandBuffer, src_image: vk::Image, region: vk::ImageCopy) {
        cmd.copy_image(
            src_image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            self.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }

    /// Record a copy of tightly packed pixel data from a buffer into mip 0
    ///
    /// Assumes the caller has placed this image in transfer-destination
    /// layout.
    pub fn copy_from_buffer(&self, cmd: &mut CommandBuffer, src_buffer: vk::Buffer, width: u32, height: u32) {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .build();

        cmd.copy_buffer_to_image(
            src_buffer,
            self.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }

    /// The full subresource range declared at construction
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect_mask,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    /// Get the image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Get the image view handle
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Get the texel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Get the base extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the mip level count
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Get the array layer count
    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    /// Get the internal debug name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            // View before memory: the view references the image.
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            if self.image != vk::Image::null() {
                self.device.destroy_image(self.image, None);
                self.device.free_memory(self.memory, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_transition_undefined_to_transfer_dst() {
        let masks = barrier_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();

        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_supported_transition_transfer_dst_to_shader_read() {
        let masks = barrier_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();

        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_unsupported_transitions_are_rejected() {
        let unsupported = [
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::UNDEFINED),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::UNDEFINED),
        ];

        for (old, new) in unsupported {
            let result = barrier_masks(old, new);
            match result {
                Err(VulkanError::UnsupportedLayoutTransition { old: o, new: n }) => {
                    assert_eq!(o, old);
                    assert_eq!(n, new);
                }
                other => panic!("expected UnsupportedLayoutTransition for {:?} -> {:?}, got {:?}", old, new, other.map(|_| ())),
            }
        }
    }

    #[test]
    fn test_supported_set_is_exactly_two_pairs() {
        // Sweep a handful of common layouts; only the two documented pairs
        // may classify successfully.
        let layouts = [
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ];

        let mut supported = Vec::new();
        for old in layouts {
            for new in layouts {
                if barrier_masks(old, new).is_ok() {
                    supported.push((old, new));
                }
            }
        }

        assert_eq!(
            supported,
            vec![
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            ]
        );
    }
}
