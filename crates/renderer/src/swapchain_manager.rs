//! Everything that depends on the swapchain, built and torn down as one unit.
//!
//! The unit covers the swapchain with its image views, the shared depth
//! buffer, the render pass, the graphics pipeline (its viewport is static),
//! one framebuffer per image and one pre-recorded command buffer per image.
//! [`BUILD_ORDER`] and [`TEARDOWN_ORDER`] spell out the sequence; teardown is
//! always the exact reverse of construction.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use viewer_rhi::command::{CommandBuffer, CommandPool};
use viewer_rhi::device::Device;
use viewer_rhi::pipeline::{GraphicsPipeline, GraphicsPipelineConfig, PipelineLayout};
use viewer_rhi::render_pass::{Framebuffer, RenderPass};
use viewer_rhi::shader::Shader;
use viewer_rhi::swapchain::{SurfaceContract, Swapchain, SwapchainSupportDetails};
use viewer_rhi::{RhiError, RhiResult};

use crate::bindings::SceneBindings;
use crate::command_recorder::{DrawTargets, record_draw_commands};
use crate::depth_buffer::DepthBuffer;
use crate::frame_manager::ImageIndex;
use crate::mesh::Mesh;

/// One step of building the swapchain-dependent unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwapchainStage {
    /// Swapchain plus one color view per image
    Swapchain,
    DepthBuffer,
    RenderPass,
    Pipeline,
    Framebuffers,
    CommandBuffers,
}

pub const BUILD_ORDER: [SwapchainStage; 6] = [
    SwapchainStage::Swapchain,
    SwapchainStage::DepthBuffer,
    SwapchainStage::RenderPass,
    SwapchainStage::Pipeline,
    SwapchainStage::Framebuffers,
    SwapchainStage::CommandBuffers,
];

pub const TEARDOWN_ORDER: [SwapchainStage; 6] = [
    SwapchainStage::CommandBuffers,
    SwapchainStage::Framebuffers,
    SwapchainStage::Pipeline,
    SwapchainStage::RenderPass,
    SwapchainStage::DepthBuffer,
    SwapchainStage::Swapchain,
];

/// Long-lived objects the unit is built from. None of them depend on the
/// swapchain, so they survive recreation.
pub struct SceneContext<'a> {
    pub pipeline_layout: &'a PipelineLayout,
    pub vertex_shader: &'a Shader,
    pub fragment_shader: &'a Shader,
    pub pipeline_config: &'a GraphicsPipelineConfig,
    pub mesh: &'a Mesh,
    pub bindings: &'a SceneBindings,
}

/// Owns the swapchain-dependent unit and the command pool its command
/// buffers come from.
pub struct SwapchainManager {
    device: Arc<Device>,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    command_pool: CommandPool,

    command_buffers: Vec<CommandBuffer>,
    framebuffers: Vec<Framebuffer>,
    pipeline: Option<GraphicsPipeline>,
    render_pass: Option<RenderPass>,
    depth_buffer: Option<DepthBuffer>,
    swapchain: Option<Swapchain>,
}

impl SwapchainManager {
    /// Build the unit for a window of `window_size` pixels.
    ///
    /// A surface with zero area (a window that starts minimized) leaves the
    /// unit unbuilt; [`is_built`](Self::is_built) is then false and
    /// [`recreate`](Self::recreate) builds it once the window has a size.
    /// The surface must outlive the manager.
    pub fn new(
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        command_pool: CommandPool,
        window_size: (u32, u32),
        ctx: &SceneContext<'_>,
    ) -> RhiResult<Self> {
        let mut manager = Self {
            device,
            surface,
            surface_loader: surface_loader.clone(),
            command_pool,
            command_buffers: Vec::new(),
            framebuffers: Vec::new(),
            pipeline: None,
            render_pass: None,
            depth_buffer: None,
            swapchain: None,
        };

        let contract = manager.negotiate(window_size)?;
        if !has_area(contract.extent) {
            warn!("Surface has zero area at start-up, deferring swapchain creation");
            return Ok(manager);
        }
        manager.build(&contract, ctx)?;

        Ok(manager)
    }

    /// Wait for the device to go idle, tear the unit down and build it again
    /// for the current surface.
    ///
    /// Returns `false`, leaving the unit torn down, when the surface currently
    /// has zero area; call again once it has been resized.
    pub fn recreate(&mut self, window_size: (u32, u32), ctx: &SceneContext<'_>) -> RhiResult<bool> {
        self.device.wait_idle()?;
        self.release();

        let contract = self.negotiate(window_size)?;
        if !has_area(contract.extent) {
            warn!("Surface has zero area, deferring swapchain recreation");
            return Ok(false);
        }

        self.build(&contract, ctx)?;
        info!(
            "Swapchain recreated: {}x{}",
            contract.extent.width, contract.extent.height
        );
        Ok(true)
    }

    fn negotiate(&self, window_size: (u32, u32)) -> RhiResult<SurfaceContract> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;
        SurfaceContract::negotiate(&support, window_size)
    }

    fn build(&mut self, contract: &SurfaceContract, ctx: &SceneContext<'_>) -> RhiResult<()> {
        for stage in BUILD_ORDER {
            debug!("Building {:?}", stage);
            self.build_stage(stage, contract, ctx)?;
        }
        Ok(())
    }

    fn build_stage(
        &mut self,
        stage: SwapchainStage,
        contract: &SurfaceContract,
        ctx: &SceneContext<'_>,
    ) -> RhiResult<()> {
        let device = self.device.clone();
        let extent = contract.extent;

        match stage {
            SwapchainStage::Swapchain => {
                self.swapchain = Some(Swapchain::new(device, self.surface, contract)?);
            }
            SwapchainStage::DepthBuffer => {
                self.depth_buffer = Some(DepthBuffer::new(device, &self.command_pool, extent)?);
            }
            SwapchainStage::RenderPass => {
                let depth_format = built(&self.depth_buffer, "depth buffer")?.format();
                self.render_pass = Some(RenderPass::new(device, contract.format, depth_format)?);
            }
            SwapchainStage::Pipeline => {
                let render_pass = built(&self.render_pass, "render pass")?;
                self.pipeline = Some(GraphicsPipeline::new(
                    device,
                    ctx.pipeline_config,
                    ctx.vertex_shader,
                    ctx.fragment_shader,
                    ctx.pipeline_layout,
                    render_pass,
                    extent,
                )?);
            }
            SwapchainStage::Framebuffers => {
                let swapchain = built(&self.swapchain, "swapchain")?;
                let render_pass = built(&self.render_pass, "render pass")?;
                let depth_view = built(&self.depth_buffer, "depth buffer")?.image_view();

                self.framebuffers = swapchain
                    .image_views()
                    .iter()
                    .map(|view| {
                        Framebuffer::new(
                            device.clone(),
                            render_pass,
                            &[view.handle(), depth_view],
                            extent,
                        )
                    })
                    .collect::<RhiResult<Vec<_>>>()?;
            }
            SwapchainStage::CommandBuffers => {
                let targets = DrawTargets {
                    render_pass: built(&self.render_pass, "render pass")?,
                    framebuffers: &self.framebuffers,
                    extent,
                    pipeline: built(&self.pipeline, "pipeline")?,
                    layout: ctx.pipeline_layout,
                    mesh: ctx.mesh,
                    bindings: ctx.bindings,
                };
                self.command_buffers = record_draw_commands(&self.command_pool, &targets)?;
            }
        }
        Ok(())
    }

    /// Destroy the unit in [`TEARDOWN_ORDER`]. The GPU must be idle.
    fn release(&mut self) {
        for stage in TEARDOWN_ORDER {
            match stage {
                SwapchainStage::CommandBuffers => {
                    let buffers = std::mem::take(&mut self.command_buffers);
                    if !buffers.is_empty() {
                        self.command_pool.free_command_buffers(buffers);
                    }
                }
                SwapchainStage::Framebuffers => self.framebuffers.clear(),
                SwapchainStage::Pipeline => self.pipeline = None,
                SwapchainStage::RenderPass => self.render_pass = None,
                SwapchainStage::DepthBuffer => self.depth_buffer = None,
                SwapchainStage::Swapchain => self.swapchain = None,
            }
        }
    }

    /// Whether the unit is currently built.
    #[inline]
    pub fn is_built(&self) -> bool {
        self.swapchain.is_some()
    }

    pub fn swapchain(&self) -> RhiResult<&Swapchain> {
        built(&self.swapchain, "swapchain")
    }

    /// Extent of the current swapchain, zero when torn down.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map(Swapchain::extent)
            .unwrap_or_default()
    }

    /// Command buffer pre-recorded for `image`.
    pub fn command_buffer(&self, image: ImageIndex) -> RhiResult<vk::CommandBuffer> {
        self.command_buffers
            .get(image.as_usize())
            .map(CommandBuffer::handle)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "No command buffer for swapchain image {}",
                    image.get()
                ))
            })
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        self.release();
        debug!("Swapchain manager destroyed");
    }
}

fn has_area(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}

fn built<'a, T>(slot: &'a Option<T>, what: &str) -> RhiResult<&'a T> {
    slot.as_ref()
        .ok_or_else(|| RhiError::InvalidHandle(format!("{} has not been built", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_is_reverse_of_build() {
        let mut reversed = BUILD_ORDER;
        reversed.reverse();
        assert_eq!(reversed, TEARDOWN_ORDER);
    }

    #[test]
    fn test_every_stage_is_built_once() {
        for stage in BUILD_ORDER {
            assert_eq!(BUILD_ORDER.iter().filter(|&&s| s == stage).count(), 1);
        }
    }

    #[test]
    fn test_dependencies_are_built_first() {
        let position = |stage| BUILD_ORDER.iter().position(|&s| s == stage);
        let before = |a, b| position(a) < position(b);

        assert!(before(SwapchainStage::DepthBuffer, SwapchainStage::RenderPass));
        assert!(before(SwapchainStage::RenderPass, SwapchainStage::Pipeline));
        assert!(before(SwapchainStage::Swapchain, SwapchainStage::Framebuffers));
        assert!(before(SwapchainStage::RenderPass, SwapchainStage::Framebuffers));
        assert!(before(SwapchainStage::Framebuffers, SwapchainStage::CommandBuffers));
        assert!(before(SwapchainStage::Pipeline, SwapchainStage::CommandBuffers));
    }

    #[test]
    fn test_built_reports_missing_stage() {
        let missing: Option<u32> = None;
        assert!(matches!(
            built(&missing, "render pass"),
            Err(RhiError::InvalidHandle(msg)) if msg.contains("render pass")
        ));
        assert_eq!(built(&Some(7u32), "x").ok(), Some(&7));
    }

    #[test]
    fn test_zero_area_defers_build() {
        assert!(!has_area(vk::Extent2D::default()));
        assert!(!has_area(vk::Extent2D {
            width: 800,
            height: 0,
        }));
        assert!(has_area(vk::Extent2D {
            width: 1,
            height: 1,
        }));
    }

    #[test]
    fn test_swapchain_manager_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SwapchainManager>();
    }
}
