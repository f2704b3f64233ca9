//! Cubemap textures and image-based-lighting precomputation

/// GPU cubemap texture resources
pub mod gpu_cubemap;

/// Irradiance and prefiltered environment map baking
pub mod generator;

pub use gpu_cubemap::{miplevel_count, GpuCubemap, SampledImage, Sampler, CUBE_FACE_COUNT};
pub use generator::{
    bake_iterations, face_matrices, face_view_projection, roughness_for_mip, CubemapGenerator,
    CubemapTarget, EnvironmentVertex, IrradiancePushBlock, PrefilterPushBlock,
};
