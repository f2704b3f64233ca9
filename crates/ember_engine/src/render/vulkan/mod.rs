//! Vulkan backend implementation
//!
//! RAII wrappers over the raw API: every wrapper owns exactly one handle
//! kind, releases it deterministically on drop (dependents before
//! dependencies) and is move-only so ownership transfer is explicit.

/// Instance, device context and memory allocation
pub mod context;

/// GPU image resources and layout transitions
pub mod image;

/// GPU buffer resources
pub mod buffer;

/// Command pools, command buffers and one-shot recording
pub mod commands;

/// Fences for GPU/CPU synchronization
pub mod sync;

/// Descriptor layouts, pools and writers
pub mod descriptor;

/// Shader modules, pipeline layouts, render passes and pipelines
pub mod pipeline;

/// Framebuffers and offscreen render targets
pub mod framebuffer;

pub use context::{
    DeviceContext, MemoryAllocator, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult,
};
pub use image::{barrier_masks, Image, ImageDesc, TransitionMasks};
pub use buffer::{Buffer, StagingBuffer};
pub use commands::{CommandBuffer, CommandPool, OnceCommandBuffer, RecordingState};
pub use sync::{Fence, DEFAULT_FENCE_TIMEOUT};
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter};
pub use pipeline::{GraphicsPipeline, PipelineLayout, RenderPass, ShaderModule};
pub use framebuffer::{Framebuffer, OffscreenFramebuffer};
