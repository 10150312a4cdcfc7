//! Graphics pipeline construction.
//!
//! The fixed-function state is described by one immutable
//! [`GraphicsPipelineConfig`] value; [`GraphicsPipeline::new`] turns it plus the
//! two shader stages into a `VkPipeline` bound to subpass 0 of a render pass.
//! Viewport and scissor are baked in from the swapchain extent, so the
//! pipeline is rebuilt whenever the swapchain is.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use viewer_rhi::device::Device;
//! use viewer_rhi::pipeline::{GraphicsPipeline, GraphicsPipelineConfig, PipelineLayout};
//! use viewer_rhi::render_pass::RenderPass;
//! use viewer_rhi::shader::Shader;
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     vertex: &Shader,
//! #     fragment: &Shader,
//! #     set_layout: vk::DescriptorSetLayout,
//! #     render_pass: &RenderPass,
//! # ) -> Result<(), viewer_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone(), &[set_layout])?;
//! let extent = vk::Extent2D { width: 800, height: 600 };
//! let pipeline = GraphicsPipeline::new(
//!     device,
//!     &GraphicsPipelineConfig::default(),
//!     vertex,
//!     fragment,
//!     &layout,
//!     render_pass,
//!     extent,
//! )?;
//! # let _ = pipeline;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::{Shader, ShaderStage};
use crate::vertex::Vertex;

/// Pipeline layout with descriptor set layouts and no push constants.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Self> {
        let create_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(descriptor_set_layouts);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    /// Wireframe; needs the `fillModeNonSolid` feature.
    Line,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
        }
    }
}

/// Depth test settings. `None` in the config disables depth entirely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub write: bool,
    pub compare_op: vk::CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            write: true,
            compare_op: vk::CompareOp::LESS,
        }
    }
}

/// Fixed-function state of the viewer's graphics pipeline.
///
/// Topology is always a triangle list and there is one color attachment
/// with blending disabled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GraphicsPipelineConfig {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub line_width: f32,
    pub depth: Option<DepthState>,
    pub color_write_mask: vk::ColorComponentFlags,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            line_width: 1.0,
            depth: Some(DepthState::default()),
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

/// Full-extent viewport with depth range 0..1.
pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

pub struct GraphicsPipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    extent: vk::Extent2D,
}

impl GraphicsPipeline {
    /// Build the pipeline for subpass 0 of `render_pass`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] when the shader stages are swapped
    /// and a Vulkan error when creation fails.
    pub fn new(
        device: Arc<Device>,
        config: &GraphicsPipelineConfig,
        vertex_shader: &Shader,
        fragment_shader: &Shader,
        layout: &PipelineLayout,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        if vertex_shader.stage() != ShaderStage::Vertex
            || fragment_shader.stage() != ShaderStage::Fragment
        {
            return Err(RhiError::PipelineError(format!(
                "Expected vertex and fragment shaders, got {} and {}",
                vertex_shader.stage(),
                fragment_shader.stage()
            )));
        }

        let stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [viewport_for(extent)];
        let scissors = [scissor_for(extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode.to_vk())
            .line_width(config.line_width)
            .cull_mode(config.cull_mode.to_vk())
            .front_face(config.front_face.to_vk())
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth = config.depth.unwrap_or(DepthState {
            write: false,
            compare_op: vk::CompareOp::ALWAYS,
        });
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth.is_some())
            .depth_write_enable(config.depth.is_some() && depth.write)
            .depth_compare_op(depth.compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(config.color_write_mask)
            .blend_enable(false)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("Driver returned no pipeline".to_string())
        })?;

        info!(
            "Graphics pipeline created for {}x{}",
            extent.width, extent.height
        );

        Ok(Self {
            device,
            pipeline,
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// The extent baked into the viewport and scissor.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}
