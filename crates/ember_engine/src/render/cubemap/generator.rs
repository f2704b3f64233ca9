//! Cubemap generation for image-based lighting
//!
//! Bakes two environment cubemaps from a source texture: an irradiance
//! convolution for diffuse lighting and a prefiltered environment map whose
//! mip chain encodes increasing roughness. Each target is rendered offscreen
//! face by face, mip by mip, and copied into the destination cubemap, with
//! every iteration running as its own blocking one-shot command sequence.

use ash::vk;
use nalgebra::{Matrix4, Vector3};
use std::f32::consts::{FRAC_PI_2, PI};
use std::mem;

use crate::config::RenderSettings;
use crate::render::cubemap::gpu_cubemap::{miplevel_count, GpuCubemap, SampledImage, CUBE_FACE_COUNT};
use crate::render::vulkan::commands::{CommandBuffer, OnceCommandBuffer};
use crate::render::vulkan::descriptor::{DescriptorPool, DescriptorSetLayoutBuilder, DescriptorSetWriter};
use crate::render::vulkan::framebuffer::OffscreenFramebuffer;
use crate::render::vulkan::pipeline::{GraphicsPipeline, PipelineLayout, RenderPass, ShaderModule};
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Which environment map a bake pass produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubemapTarget {
    /// Diffuse irradiance convolution
    Irradiance,
    /// Specular prefiltered environment map (roughness per mip)
    PrefilteredEnv,
}

impl CubemapTarget {
    /// Texel format of the destination cubemap
    pub fn format(self) -> vk::Format {
        match self {
            Self::Irradiance => vk::Format::R32G32B32A32_SFLOAT,
            Self::PrefilteredEnv => vk::Format::R16G16B16A16_SFLOAT,
        }
    }

    /// Base face resolution of the destination cubemap
    pub fn dimension(self, settings: &RenderSettings) -> u32 {
        match self {
            Self::Irradiance => settings.irradiance_dimension,
            Self::PrefilteredEnv => settings.prefiltered_dimension,
        }
    }

    fn fragment_shader(self) -> &'static str {
        match self {
            Self::Irradiance => "irradiancecube.frag.spv",
            Self::PrefilteredEnv => "prefilterenvmap.frag.spv",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Irradiance => "irradiance cubemap",
            Self::PrefilteredEnv => "prefiltered environment cubemap",
        }
    }
}

/// Push constant block for the irradiance convolution pass
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct IrradiancePushBlock {
    /// View-projection matrix for the current face
    pub mvp: [[f32; 4]; 4],
    /// Sampling step around the azimuth
    pub delta_phi: f32,
    /// Sampling step along the zenith
    pub delta_theta: f32,
}

impl IrradiancePushBlock {
    /// Build the block for one cube face
    pub fn for_face(face: usize) -> Self {
        Self {
            mvp: face_view_projection(face).into(),
            delta_phi: (2.0 * PI) / 180.0,
            delta_theta: (0.5 * PI) / 64.0,
        }
    }
}

/// Push constant block for the prefiltered environment pass
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PrefilterPushBlock {
    /// View-projection matrix for the current face
    pub mvp: [[f32; 4]; 4],
    /// Roughness encoded by the current mip level
    pub roughness: f32,
    /// Number of importance samples per texel
    pub num_samples: u32,
}

impl PrefilterPushBlock {
    /// Build the block for one cube face at one mip level
    pub fn for_face(face: usize, mip_level: u32, miplevel_count: u32, num_samples: u32) -> Self {
        Self {
            mvp: face_view_projection(face).into(),
            roughness: roughness_for_mip(mip_level, miplevel_count),
            num_samples,
        }
    }
}

/// Roughness encoded by mip level `mip_level` of `miplevel_count` total levels
///
/// Runs from 0.0 at the base level to 1.0 at the last level. Callers must
/// guarantee at least two mip levels (base resolution >= 2).
pub fn roughness_for_mip(mip_level: u32, miplevel_count: u32) -> f32 {
    debug_assert!(miplevel_count >= 2);
    mip_level as f32 / (miplevel_count - 1) as f32
}

/// View matrices for the six cube faces: +X, -X, +Y, -Y, +Z, -Z
///
/// Each entry is a product of 90-degree-multiple rotations matching the
/// standard cube face conventions.
pub fn face_matrices() -> [Matrix4<f32>; 6] {
    let x_axis = Vector3::x_axis();
    let y_axis = Vector3::y_axis();
    let z_axis = Vector3::z_axis();

    [
        Matrix4::from_axis_angle(&y_axis, 90.0_f32.to_radians())
            * Matrix4::from_axis_angle(&x_axis, 180.0_f32.to_radians()),
        Matrix4::from_axis_angle(&y_axis, (-90.0_f32).to_radians())
            * Matrix4::from_axis_angle(&x_axis, 180.0_f32.to_radians()),
        Matrix4::from_axis_angle(&x_axis, (-90.0_f32).to_radians()),
        Matrix4::from_axis_angle(&x_axis, 90.0_f32.to_radians()),
        Matrix4::from_axis_angle(&x_axis, 180.0_f32.to_radians()),
        Matrix4::from_axis_angle(&z_axis, 180.0_f32.to_radians()),
    ]
}

/// View-projection matrix for one cube face: a 90-degree perspective over a
/// square viewport times the face rotation
pub fn face_view_projection(face: usize) -> Matrix4<f32> {
    Matrix4::new_perspective(1.0, FRAC_PI_2, 0.1, 512.0) * face_matrices()[face]
}

/// Iteration order of the bake: every face of every mip level, mips outermost
pub fn bake_iterations(miplevel_count: u32) -> impl Iterator<Item = (u32, u32)> {
    (0..miplevel_count).flat_map(|mip| (0..CUBE_FACE_COUNT).map(move |face| (mip, face)))
}

/// Vertex layout the bake pipeline expects from environment geometry
///
/// Matches the engine's mesh vertex layout; only the position attribute is
/// consumed by the filtering shaders.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EnvironmentVertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Vertex normal
    pub normal: [f32; 3],
    /// First texture coordinate set
    pub uv0: [f32; 2],
    /// Second texture coordinate set
    pub uv1: [f32; 2],
    /// Skinning joint indices
    pub joint0: [f32; 4],
    /// Skinning joint weights
    pub weight0: [f32; 4],
}

/// Generates the irradiance and prefiltered-environment cubemaps
///
/// Drives the full chain: destination cubemap, offscreen framebuffer, render
/// pass, pipeline, descriptor set, then the double loop over mips and faces.
/// All GPU work goes to the single graphics queue and every iteration blocks
/// until its one-shot submission completes. Failure at any creation step
/// aborts the whole bake; no partial cubemap is exposed.
pub struct CubemapGenerator {
    irradiance: GpuCubemap,
    prefiltered: GpuCubemap,
    prefiltered_miplevel_count: u32,
}

impl CubemapGenerator {
    /// Bake both targets from the given source environment texture
    ///
    /// `draw_scene` is invoked once per (mip, face) iteration inside an open
    /// render pass with the pipeline and descriptor set already bound; it
    /// must only issue draw-level commands (no render pass bracketing, no
    /// submission) against the bound pipeline's vertex layout
    /// ([`EnvironmentVertex`]).
    pub fn bake<F>(
        ctx: &DeviceContext,
        source: &dyn SampledImage,
        settings: &RenderSettings,
        mut draw_scene: F,
    ) -> VulkanResult<Self>
    where
        F: FnMut(&mut CommandBuffer),
    {
        let irradiance = Self::bake_target(ctx, source, settings, CubemapTarget::Irradiance, &mut draw_scene)?;
        let prefiltered = Self::bake_target(ctx, source, settings, CubemapTarget::PrefilteredEnv, &mut draw_scene)?;
        let prefiltered_miplevel_count = prefiltered.miplevel_count();

        Ok(Self {
            irradiance,
            prefiltered,
            prefiltered_miplevel_count,
        })
    }

    fn bake_target<F>(
        ctx: &DeviceContext,
        source: &dyn SampledImage,
        settings: &RenderSettings,
        target: CubemapTarget,
        draw_scene: &mut F,
    ) -> VulkanResult<GpuCubemap>
    where
        F: FnMut(&mut CommandBuffer),
    {
        let format = target.format();
        let dim = target.dimension(settings);

        if dim < 2 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{} resolution must be at least 2, got {}", target.name(), dim),
            });
        }

        let mips = miplevel_count(dim, dim);

        log::info!("Baking {} ({}x{}, {} mips)", target.name(), dim, dim, mips);

        let cubemap = GpuCubemap::new(ctx, format, dim, dim, mips, target.name())?;

        // One color attachment, cleared on load and stored, left in
        // color-attachment layout for the transfer-out that follows the pass.
        let attachments = [vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build()];

        let color_refs = [vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build()];

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .build()];

        // External dependencies bracket the write on both sides: wait for
        // prior readers before writing, block subsequent readers until the
        // write completes.
        let dependencies = [
            vk::SubpassDependency::builder()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::MEMORY_READ)
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
                .dependency_flags(vk::DependencyFlags::BY_REGION)
                .build(),
            vk::SubpassDependency::builder()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
                .src_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
                .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                .dependency_flags(vk::DependencyFlags::BY_REGION)
                .build(),
        ];

        let render_pass_ci = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = RenderPass::new(ctx, &render_pass_ci, target.name())?;

        let offscreen = OffscreenFramebuffer::new(ctx, format, dim, dim, render_pass.handle(), "offscreen face target")?;

        // The source environment texture is the only shader resource.
        let set_layout = DescriptorSetLayoutBuilder::new()
            .add_combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .build(ctx)?;

        let descriptor_pool = DescriptorPool::new(ctx, 1)?;
        let descriptor_set = descriptor_pool.allocate(&[set_layout.handle()])?[0];

        DescriptorSetWriter::new()
            .write_image(
                descriptor_set,
                0,
                source.image_view(),
                source.sampler(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
            .update(ctx);

        let push_constant_size = match target {
            CubemapTarget::Irradiance => mem::size_of::<IrradiancePushBlock>(),
            CubemapTarget::PrefilteredEnv => mem::size_of::<PrefilterPushBlock>(),
        } as u32;

        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: push_constant_size,
        }];

        let set_layouts = [set_layout.handle()];
        let pipeline_layout = PipelineLayout::new(ctx, &set_layouts, &push_constant_ranges, target.name())?;

        let vertex_shader = ShaderModule::from_file(
            ctx,
            vk::ShaderStageFlags::VERTEX,
            settings.shader_dir.join("filtercube.vert.spv"),
        )?;
        let fragment_shader = ShaderModule::from_file(
            ctx,
            vk::ShaderStageFlags::FRAGMENT,
            settings.shader_dir.join(target.fragment_shader()),
        )?;

        let shader_stages = [vertex_shader.stage_info(), fragment_shader.stage_info()];

        let vertex_bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: mem::size_of::<EnvironmentVertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }];

        let vertex_attributes = [vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        }];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // The cube is rendered inside-out; depth plays no role.
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(false)
            .depth_write_enable(false)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];

        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&dynamic_states);

        let pipeline_ci = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(pipeline_layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipeline = GraphicsPipeline::new(ctx, &pipeline_ci, target.name())?;

        // All faces and mips move to transfer-destination once, up front.
        cubemap.transition_layout(
            ctx,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.2, 0.0],
            },
        }];

        for (mip_level, face) in bake_iterations(mips) {
            let face_dim = dim >> mip_level;

            OnceCommandBuffer::run(ctx, "cubemap face pass", |cmd| {
                cmd.set_viewport(vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: face_dim as f32,
                    height: face_dim as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                });
                cmd.set_scissor(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: vk::Extent2D {
                        width: face_dim,
                        height: face_dim,
                    },
                });

                let render_pass_begin = vk::RenderPassBeginInfo::builder()
                    .render_pass(render_pass.handle())
                    .framebuffer(offscreen.handle())
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: vk::Extent2D {
                            width: dim,
                            height: dim,
                        },
                    })
                    .clear_values(&clear_values);

                cmd.begin_render_pass(&render_pass_begin);

                match target {
                    CubemapTarget::Irradiance => {
                        let push_block = IrradiancePushBlock::for_face(face as usize);
                        cmd.push_constants(
                            &push_block,
                            pipeline_layout.handle(),
                            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                        );
                    }
                    CubemapTarget::PrefilteredEnv => {
                        let push_block = PrefilterPushBlock::for_face(
                            face as usize,
                            mip_level,
                            mips,
                            settings.prefilter_sample_count,
                        );
                        cmd.push_constants(
                            &push_block,
                            pipeline_layout.handle(),
                            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                        );
                    }
                }

                cmd.bind_graphics_pipeline(pipeline.handle());
                cmd.bind_descriptor_set(descriptor_set, pipeline_layout.handle());

                draw_scene(cmd);

                cmd.end_render_pass();

                cubemap.copy_face_from(cmd, &offscreen, face, mip_level, face_dim, face_dim)?;

                Ok(())
            })?;
        }

        cubemap.transition_layout(
            ctx,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        log::info!("Finished baking {}", target.name());

        Ok(cubemap)
    }

    /// The baked irradiance cubemap
    pub fn irradiance(&self) -> &GpuCubemap {
        &self.irradiance
    }

    /// The baked prefiltered environment cubemap
    pub fn prefiltered(&self) -> &GpuCubemap {
        &self.prefiltered
    }

    /// Mip level count of the prefiltered map, needed by shading code to
    /// map roughness back to a level-of-detail
    pub fn prefiltered_miplevel_count(&self) -> u32 {
        self.prefiltered_miplevel_count
    }

    /// Consume the generator, moving out both baked cubemaps
    /// (irradiance first)
    pub fn into_cubemaps(self) -> (GpuCubemap, GpuCubemap) {
        (self.irradiance, self.prefiltered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bake_iterations_cover_every_face_of_every_mip() {
        let iterations: Vec<_> = bake_iterations(7).collect();
        assert_eq!(iterations.len(), 7 * 6);

        // Mips are outermost and faces cycle within each mip.
        assert_eq!(iterations[0], (0, 0));
        assert_eq!(iterations[5], (0, 5));
        assert_eq!(iterations[6], (1, 0));
        assert_eq!(iterations[41], (6, 5));
    }

    #[test]
    fn test_roughness_series_spans_zero_to_one() {
        let mips = 10;
        assert_relative_eq!(roughness_for_mip(0, mips), 0.0);
        assert_relative_eq!(roughness_for_mip(mips - 1, mips), 1.0);
        assert_relative_eq!(roughness_for_mip(3, mips), 3.0 / 9.0);

        // Strictly increasing across the chain.
        for mip in 1..mips {
            assert!(roughness_for_mip(mip, mips) > roughness_for_mip(mip - 1, mips));
        }
    }

    #[test]
    fn test_push_block_sizes_match_shader_interface() {
        // mat4 + two scalars, tightly packed.
        assert_eq!(mem::size_of::<IrradiancePushBlock>(), 72);
        assert_eq!(mem::size_of::<PrefilterPushBlock>(), 72);
    }

    #[test]
    fn test_environment_vertex_stride() {
        assert_eq!(mem::size_of::<EnvironmentVertex>(), 72);
    }

    #[test]
    fn test_face_matrices_are_rotations() {
        for matrix in &face_matrices() {
            // Rotation matrices are orthonormal: M * M^T == I.
            let product = matrix * matrix.transpose();
            assert_relative_eq!(product, Matrix4::identity(), epsilon = 1e-5);

            // And volume preserving.
            let rotation: nalgebra::Matrix3<f32> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
            assert_relative_eq!(rotation.determinant(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_face_matrices_are_distinct() {
        let matrices = face_matrices();
        for i in 0..matrices.len() {
            for j in (i + 1)..matrices.len() {
                let difference = (matrices[i] - matrices[j]).norm();
                assert!(
                    difference > 1e-3,
                    "face matrices {} and {} coincide",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn test_irradiance_push_block_constants() {
        let block = IrradiancePushBlock::for_face(0);
        assert_relative_eq!(block.delta_phi, 2.0 * PI / 180.0);
        assert_relative_eq!(block.delta_theta, 0.5 * PI / 64.0);
    }

    #[test]
    fn test_prefilter_push_block_roughness_per_mip() {
        let block = PrefilterPushBlock::for_face(2, 0, 10, 32);
        assert_relative_eq!(block.roughness, 0.0);
        assert_eq!(block.num_samples, 32);

        let block = PrefilterPushBlock::for_face(2, 9, 10, 32);
        assert_relative_eq!(block.roughness, 1.0);
    }

    #[test]
    fn test_target_configuration() {
        assert_eq!(CubemapTarget::Irradiance.format(), vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(CubemapTarget::PrefilteredEnv.format(), vk::Format::R16G16B16A16_SFLOAT);

        let settings = RenderSettings::default();
        assert_eq!(CubemapTarget::Irradiance.dimension(&settings), 64);
        assert_eq!(CubemapTarget::PrefilteredEnv.dimension(&settings), 512);
    }

    #[test]
    fn test_viewport_halves_per_mip() {
        let dim = 512u32;
        let mut expected = 512;
        for mip in 0..miplevel_count(dim, dim) {
            assert_eq!(dim >> mip, expected);
            expected /= 2;
        }
    }
}
