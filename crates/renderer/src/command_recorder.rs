//! Pre-recorded draw commands, one command buffer per swapchain image.
//!
//! Every command buffer is recorded once after the swapchain is built and
//! replayed each frame until the next recreation. Nothing inside changes per
//! frame: the uniform data changes through the mapped buffer that the bound
//! descriptor set points at.

use ash::vk;
use tracing::info;

use viewer_rhi::RhiResult;
use viewer_rhi::command::{CommandBuffer, CommandPool};
use viewer_rhi::pipeline::{GraphicsPipeline, PipelineLayout};
use viewer_rhi::render_pass::{Framebuffer, RenderPass};

use crate::bindings::SceneBindings;
use crate::frame_manager::ImageIndex;
use crate::mesh::Mesh;

pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
pub const CLEAR_DEPTH: f32 = 1.0;

/// Clear values in render pass attachment order: color, then depth.
pub fn clear_values() -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: CLEAR_DEPTH,
                stencil: 0,
            },
        },
    ]
}

/// Everything a draw command buffer refers to.
pub struct DrawTargets<'a> {
    pub render_pass: &'a RenderPass,
    pub framebuffers: &'a [Framebuffer],
    pub extent: vk::Extent2D,
    pub pipeline: &'a GraphicsPipeline,
    pub layout: &'a PipelineLayout,
    pub mesh: &'a Mesh,
    pub bindings: &'a SceneBindings,
}

/// Allocate and record one command buffer per framebuffer.
///
/// The buffer for image `i` binds descriptor set `i % MAX_FRAMES_IN_FLIGHT`.
pub fn record_draw_commands(
    pool: &CommandPool,
    targets: &DrawTargets<'_>,
) -> RhiResult<Vec<CommandBuffer>> {
    let command_buffers = pool.allocate_command_buffers(targets.framebuffers.len() as u32)?;

    let recorded = command_buffers
        .iter()
        .zip(targets.framebuffers)
        .enumerate()
        .try_for_each(|(i, (cmd, framebuffer))| {
            record_one(cmd, framebuffer, ImageIndex(i as u32), targets)
        });

    if let Err(e) = recorded {
        pool.free_command_buffers(command_buffers);
        return Err(e);
    }

    info!("Recorded {} draw command buffers", command_buffers.len());
    Ok(command_buffers)
}

fn record_one(
    cmd: &CommandBuffer,
    framebuffer: &Framebuffer,
    image: ImageIndex,
    targets: &DrawTargets<'_>,
) -> RhiResult<()> {
    // The same buffer may be pending for one image while resubmitted for
    // another frame slot
    cmd.begin_simultaneous()?;

    let clear_values = clear_values();
    let begin_info = vk::RenderPassBeginInfo::default()
        .render_pass(targets.render_pass.handle())
        .framebuffer(framebuffer.handle())
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: targets.extent,
        })
        .clear_values(&clear_values);

    cmd.begin_render_pass(&begin_info);

    cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, targets.pipeline.handle());
    cmd.bind_vertex_buffers(0, &[targets.mesh.vertex_buffer().handle()], &[0]);
    cmd.bind_index_buffer(
        targets.mesh.index_buffer().handle(),
        0,
        vk::IndexType::UINT32,
    );
    cmd.bind_descriptor_sets(
        vk::PipelineBindPoint::GRAPHICS,
        targets.layout.handle(),
        0,
        &[targets.bindings.set(image.uniform_slot())],
    );
    cmd.draw_indexed(targets.mesh.index_count(), 1, 0, 0, 0);

    cmd.end_render_pass();
    cmd.end()
}
