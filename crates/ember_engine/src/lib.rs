//! # Ember Engine
//!
//! A Vulkan rendering engine core with image-based lighting precomputation.
//!
//! ## Features
//!
//! - **RAII Resource Wrappers**: Move-only, deterministic-teardown wrappers
//!   for images, buffers, pipelines, command buffers and fences
//! - **One-Shot Command Recording**: Record, submit and wait in one call for
//!   setup-time GPU work
//! - **Cubemap Baking**: Irradiance and prefiltered environment map
//!   generation for physically based shading
//! - **Headless**: No window required; the bake pipeline renders offscreen
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ember_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     ember_engine::foundation::logging::init();
//!
//!     let instance = VulkanInstance::new("bake", true)?;
//!     let physical = PhysicalDeviceInfo::select(&instance.instance)?;
//!     let ctx = DeviceContext::new(&instance.instance, &physical)?;
//!
//!     let settings = RenderSettings::default();
//!     let pixels = ImageData::solid_color(256, 256, [120, 150, 255, 255]);
//!     let environment = Texture::from_image_data(&ctx, &pixels, "environment")?;
//!
//!     let maps = CubemapGenerator::bake(&ctx, &environment, &settings, |_cmd| {
//!         // Draw the environment geometry (e.g. a skybox cube) here.
//!     })?;
//!
//!     log::info!("Prefiltered mips: {}", maps.prefiltered_miplevel_count());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;

pub use config::{ConfigError, RenderSettings};
pub use render::vulkan::{VulkanError, VulkanResult};

/// Common imports for engine users
pub mod prelude {
    pub use crate::assets::ImageData;
    pub use crate::config::RenderSettings;
    pub use crate::render::cubemap::{CubemapGenerator, CubemapTarget, GpuCubemap, SampledImage};
    pub use crate::render::texture::Texture;
    pub use crate::render::vulkan::{
        Buffer, CommandBuffer, CommandPool, DeviceContext, Fence, Image, OnceCommandBuffer,
        PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult,
    };
}
