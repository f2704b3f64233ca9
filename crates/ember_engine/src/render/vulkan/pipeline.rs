//! Shader and pipeline state management
//!
//! SPIR-V shader loading plus RAII wrappers for pipeline layouts, render
//! passes and graphics pipelines. Pipelines and render passes are declarative
//! and immutable once built from their creation-info structs; teardown runs
//! in reverse dependency order, so keep a pipeline in a narrower scope than
//! the render pass it references.

use ash::{vk, Device};
use std::ffi::CStr;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Shader entry point used by every pipeline in this engine
pub const SHADER_ENTRY_POINT: &CStr = unsafe {
    CStr::from_bytes_with_nul_unchecked(b"main\0")
};

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(ctx: &DeviceContext, stage: vk::ShaderStageFlags, bytes: &[u8]) -> VulkanResult<Self> {
        // SPIR-V words are u32-aligned
        let (prefix, u32_slice, suffix) = unsafe { bytes.align_to::<u32>() };
        if !prefix.is_empty() || !suffix.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "SPIR-V bytecode is not properly aligned".to_string()
            ));
        }

        let create_info = vk::ShaderModuleCreateInfo::builder()
            .code(u32_slice);

        let module = unsafe {
            ctx.device().create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: ctx.raw_device(),
            module,
            stage,
        })
    }

    /// Load shader from a SPIR-V file
    pub fn from_file<P: AsRef<Path>>(ctx: &DeviceContext, stage: vk::ShaderStageFlags, path: P) -> VulkanResult<Self> {
        let mut file = File::open(path.as_ref())
            .map_err(|e| VulkanError::InitializationFailed(
                format!("Failed to open shader file {:?}: {}", path.as_ref(), e)
            ))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to read shader file: {}", e)))?;

        log::debug!("Loaded shader {:?} ({} bytes)", path.as_ref(), bytes.len());

        Self::from_bytes(ctx, stage, &bytes)
    }

    /// Get the shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Create the shader stage create info for pipeline assembly
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage)
            .module(self.module)
            .name(SHADER_ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Pipeline layout wrapper with RAII cleanup
///
/// Owned separately from the pipeline so command recording can push
/// constants against the layout while the pipeline itself stays opaque.
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Create a pipeline layout from descriptor set layouts and push constant
    /// ranges
    pub fn new(
        ctx: &DeviceContext,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        name: &str,
    ) -> VulkanResult<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            ctx.device().create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!("Created pipeline layout '{}'", name);

        Ok(Self {
            device: ctx.raw_device(),
            layout,
        })
    }

    /// Get the layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Create a render pass from a fully populated creation-info struct
    pub fn new(ctx: &DeviceContext, create_info: &vk::RenderPassCreateInfo, name: &str) -> VulkanResult<Self> {
        let render_pass = unsafe {
            ctx.device().create_render_pass(create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!("Created render pass '{}'", name);

        Ok(Self {
            device: ctx.raw_device(),
            render_pass,
        })
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline from a fully populated creation-info struct
    pub fn new(
        ctx: &DeviceContext,
        create_info: &vk::GraphicsPipelineCreateInfo,
        name: &str,
    ) -> VulkanResult<Self> {
        let pipelines = unsafe {
            ctx.device().create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(create_info),
                None,
            ).map_err(|(_, err)| VulkanError::Api(err))?
        };

        log::debug!("Created graphics pipeline '{}'", name);

        Ok(Self {
            device: ctx.raw_device(),
            pipeline: pipelines[0],
        })
    }

    /// Get the pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_entry_point_is_main() {
        assert_eq!(SHADER_ENTRY_POINT.to_str().unwrap(), "main");
    }
}
