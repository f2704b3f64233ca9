//! Rendering system
//!
//! The Vulkan backend supplies RAII wrappers for every GPU object kind; the
//! cubemap module drives them to precompute image-based-lighting environment
//! maps. All GPU work in this core goes to a single graphics queue, and
//! setup-time operations block on dedicated fences by design.

/// Vulkan backend: device context and resource wrappers
pub mod vulkan;

/// Cubemap textures and environment map baking
pub mod cubemap;

/// 2D sampled textures
pub mod texture;

pub use vulkan::{DeviceContext, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult};
pub use cubemap::{CubemapGenerator, CubemapTarget, GpuCubemap, SampledImage};
pub use texture::Texture;
