//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`], which owns every Vulkan object of
//! the viewer and runs the per-frame protocol described in
//! [`frame_manager`](crate::frame_manager).

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, trace};

use viewer_core::{FrameClock, ViewerConfig};
use viewer_platform::{ResizeFlag, Surface, Window};
use viewer_resources::{Model, TextureData};
use viewer_rhi::command::CommandPool;
use viewer_rhi::device::Device;
use viewer_rhi::image::SamplerDesc;
use viewer_rhi::instance::Instance;
use viewer_rhi::physical_device::select_physical_device;
use viewer_rhi::pipeline::{GraphicsPipelineConfig, PipelineLayout};
use viewer_rhi::shader::{Shader, ShaderStage};
use viewer_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::bindings::SceneBindings;
use crate::error::RendererResult;
use crate::frame_manager::{FrameSlot, FrameSynchronizer, ImageIndex};
use crate::mesh::Mesh;
use crate::swapchain_manager::{SceneContext, SwapchainManager};
use crate::texture::Texture;
use crate::ubo::ModelViewProjection;

/// Where the frame loop currently is. Only used for tracing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FramePhase {
    #[default]
    Idle,
    Acquiring,
    RecordingSubmitting,
    Presenting,
}

/// What [`Renderer::draw_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented
    Rendered,
    /// Nothing was drawn, usually because the window has zero area
    Skipped,
    /// The swapchain was rebuilt; the next call draws again
    Recreated,
}

/// First decision of a frame, made before touching the GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameStart {
    Skip,
    Recreate,
    Draw,
}

fn frame_start(framebuffer_size: (u32, u32), recreate_pending: bool) -> FrameStart {
    if framebuffer_size.0 == 0 || framebuffer_size.1 == 0 {
        FrameStart::Skip
    } else if recreate_pending {
        FrameStart::Recreate
    } else {
        FrameStart::Draw
    }
}

/// What the frame does once acquire has returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AcquireStep {
    /// Reset the slot fence, then update, submit and present `image`
    Draw(ImageIndex),
    /// Rebuild without resetting the fence, so the slot's next wait returns
    Recreate,
}

fn acquire_step(outcome: AcquireOutcome) -> AcquireStep {
    match outcome {
        AcquireOutcome::Acquired { image_index, .. } => AcquireStep::Draw(ImageIndex(image_index)),
        AcquireOutcome::OutOfDate => AcquireStep::Recreate,
    }
}

/// Whether the swapchain must be rebuilt after a present.
fn needs_recreation(presented: PresentOutcome, resized: bool) -> bool {
    presented.needs_recreation() || resized
}

/// Frame outcome and the new `recreate_pending` after a recreation attempt.
fn after_recreation(built: bool) -> (FrameOutcome, bool) {
    if built {
        (FrameOutcome::Recreated, false)
    } else {
        (FrameOutcome::Skipped, true)
    }
}

/// Owns all Vulkan resources and drives the frame loop.
///
/// # Resource Destruction Order
///
/// 1. Wait for the device to go idle
/// 2. Frame sync objects
/// 3. Swapchain-dependent unit (command buffers, framebuffers, pipeline,
///    render pass, depth buffer, swapchain) and the command pool
/// 4. Pipeline layout and shader modules
/// 5. Descriptor sets, pool, layout and uniform buffers
/// 6. Texture and mesh
/// 7. Device
/// 8. Surface
/// 9. Instance
///
/// ManuallyDrop is used to ensure correct destruction order.
pub struct Renderer {
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,

    mesh: ManuallyDrop<Mesh>,
    texture: ManuallyDrop<Texture>,
    bindings: ManuallyDrop<SceneBindings>,

    vertex_shader: ManuallyDrop<Shader>,
    fragment_shader: ManuallyDrop<Shader>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    pipeline_config: GraphicsPipelineConfig,

    swapchain: ManuallyDrop<SwapchainManager>,
    frames: ManuallyDrop<FrameSynchronizer>,

    resize: ResizeFlag,
    clock: FrameClock,
    phase: FramePhase,
    /// Set when recreation was deferred because the surface had zero area.
    recreate_pending: bool,
}

impl Renderer {
    /// Create the renderer for `window`, loading the assets named in `config`.
    ///
    /// `resize` is raised by the window event handler and consumed after
    /// each present.
    ///
    /// # Errors
    ///
    /// Returns an error if an asset cannot be loaded or any Vulkan object
    /// cannot be created. Whatever was created so far is released.
    pub fn new(window: &Window, config: &ViewerConfig, resize: ResizeFlag) -> RendererResult<Self> {
        let window_size = window.framebuffer_size();
        info!(
            "Initializing Vulkan renderer ({}x{})",
            window_size.0, window_size.1
        );

        let extensions = window.required_extensions()?;
        let instance = Instance::new(&extensions, config.debug.validation)?;
        let surface = window.create_surface(&instance)?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        // Used for start-up transfers, then handed to the swapchain manager
        let command_pool = CommandPool::new(device.clone(), device.queue_families().graphics)?;

        info!("Loading model {}", config.assets.model.display());
        let model = Model::load_obj(&config.assets.model)?;
        info!("Loading texture {}", config.assets.texture.display());
        let texture_data = TextureData::load(&config.assets.texture)?;

        let mesh = Mesh::upload(device.clone(), &command_pool, &model)?;
        let texture = Texture::upload(
            device.clone(),
            &command_pool,
            &texture_data,
            &SamplerDesc::default(),
        )?;

        let bindings = SceneBindings::new(device.clone(), &texture)?;
        let pipeline_layout = PipelineLayout::new(device.clone(), &[bindings.layout().handle()])?;

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &config.assets.vertex_shader,
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &config.assets.fragment_shader,
            ShaderStage::Fragment,
        )?;
        let pipeline_config = GraphicsPipelineConfig::default();

        let swapchain = SwapchainManager::new(
            device.clone(),
            surface.handle(),
            surface.loader(),
            command_pool,
            window_size,
            &SceneContext {
                pipeline_layout: &pipeline_layout,
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                pipeline_config: &pipeline_config,
                mesh: &mesh,
                bindings: &bindings,
            },
        )?;

        let frames = FrameSynchronizer::new(device.clone())?;
        let recreate_pending = !swapchain.is_built();

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight, {} triangles",
            swapchain.swapchain().map_or(0, |s| s.image_count()),
            MAX_FRAMES_IN_FLIGHT,
            model.triangle_count()
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            mesh: ManuallyDrop::new(mesh),
            texture: ManuallyDrop::new(texture),
            bindings: ManuallyDrop::new(bindings),
            vertex_shader: ManuallyDrop::new(vertex_shader),
            fragment_shader: ManuallyDrop::new(fragment_shader),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline_config,
            swapchain: ManuallyDrop::new(swapchain),
            frames: ManuallyDrop::new(frames),
            resize,
            clock: FrameClock::new(),
            phase: FramePhase::Idle,
            recreate_pending,
        })
    }

    /// Draw one frame for a window whose framebuffer is `framebuffer_size`.
    ///
    /// # Errors
    ///
    /// Any Vulkan failure other than an out-of-date or suboptimal swapchain
    /// is returned and should end the program.
    pub fn draw_frame(&mut self, framebuffer_size: (u32, u32)) -> RendererResult<FrameOutcome> {
        match frame_start(framebuffer_size, self.recreate_pending) {
            FrameStart::Skip => {
                trace!("Framebuffer has zero area, skipping frame");
                return Ok(FrameOutcome::Skipped);
            }
            FrameStart::Recreate => return self.recreate_swapchain(framebuffer_size),
            FrameStart::Draw => {}
        }

        self.set_phase(FramePhase::Acquiring);
        self.frames.wait_for_current()?;

        let acquired = self.frames.acquire(self.swapchain.swapchain()?)?;
        let image = match acquire_step(acquired) {
            AcquireStep::Draw(image) => image,
            AcquireStep::Recreate => {
                debug!("Swapchain out of date on acquire, recreating");
                self.set_phase(FramePhase::Idle);
                return self.recreate_swapchain(framebuffer_size);
            }
        };

        self.set_phase(FramePhase::RecordingSubmitting);
        self.frames.wait_for_uniform(image)?;
        self.frames.reset_current_fence()?;

        self.update_uniform_buffer(image)?;

        let command_buffer = self.swapchain.command_buffer(image)?;
        self.frames.submit(command_buffer, image)?;

        self.set_phase(FramePhase::Presenting);
        let presented = self.frames.present(self.swapchain.swapchain()?, image)?;
        self.frames.advance();
        self.clock.tick();

        let resized = self.resize.take();
        self.set_phase(FramePhase::Idle);

        if needs_recreation(presented, resized) {
            debug!(
                "Recreating swapchain after present ({:?}, resized: {})",
                presented, resized
            );
            return self.recreate_swapchain(framebuffer_size);
        }

        Ok(FrameOutcome::Rendered)
    }

    /// Write the matrices for the current time into the uniform buffer that
    /// `image`'s command buffer reads.
    fn update_uniform_buffer(&self, image: ImageIndex) -> RendererResult<()> {
        let aspect = self.swapchain.swapchain()?.contract().aspect_ratio();
        let ubo = ModelViewProjection::at_time(self.clock.elapsed_secs(), aspect);
        self.bindings.write_uniform(image.uniform_slot(), &ubo)?;
        Ok(())
    }

    fn recreate_swapchain(&mut self, framebuffer_size: (u32, u32)) -> RendererResult<FrameOutcome> {
        let ctx = SceneContext {
            pipeline_layout: &self.pipeline_layout,
            vertex_shader: &self.vertex_shader,
            fragment_shader: &self.fragment_shader,
            pipeline_config: &self.pipeline_config,
            mesh: &self.mesh,
            bindings: &self.bindings,
        };
        let built = self.swapchain.recreate(framebuffer_size, &ctx)?;

        // The device was idle, so no uniform buffer is being read
        self.frames.on_device_idle();
        // The new swapchain already matches the latest size
        self.resize.take();
        let (outcome, pending) = after_recreation(built);
        self.recreate_pending = pending;
        Ok(outcome)
    }

    fn set_phase(&mut self, phase: FramePhase) {
        trace!(
            "Frame slot {}: {:?} -> {:?}",
            self.frames.current_slot().index(),
            self.phase,
            phase
        );
        self.phase = phase;
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    #[inline]
    pub fn current_slot(&self) -> FrameSlot {
        self.frames.current_slot()
    }

    /// Returns the current swapchain extent, zero while recreation is deferred.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.clock.total_frames()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Wait for all GPU work to complete before destroying resources
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }

        // SAFETY: each field is dropped exactly once and never used afterwards.
        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.fragment_shader);
            ManuallyDrop::drop(&mut self.vertex_shader);
            ManuallyDrop::drop(&mut self.bindings);
            ManuallyDrop::drop(&mut self.texture);
            ManuallyDrop::drop(&mut self.mesh);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed after {} frames", self.clock.total_frames());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_phase_starts_idle() {
        assert_eq!(FramePhase::default(), FramePhase::Idle);
    }

    #[test]
    fn test_frame_outcome_variants_differ() {
        assert_ne!(FrameOutcome::Rendered, FrameOutcome::Skipped);
        assert_ne!(FrameOutcome::Skipped, FrameOutcome::Recreated);
    }

    #[test]
    fn test_zero_area_frame_is_skipped() {
        assert_eq!(frame_start((0, 600), false), FrameStart::Skip);
        assert_eq!(frame_start((800, 0), false), FrameStart::Skip);
        // Skipping wins over a pending rebuild while still minimized
        assert_eq!(frame_start((0, 0), true), FrameStart::Skip);
        assert_eq!(frame_start((800, 600), false), FrameStart::Draw);
    }

    #[test]
    fn test_pending_recreation_waits_for_non_zero_area() {
        // Rebuild deferred at zero area: stays pending and the frame is skipped
        let (outcome, pending) = after_recreation(false);
        assert_eq!(outcome, FrameOutcome::Skipped);
        assert!(pending);

        assert_eq!(frame_start((0, 0), pending), FrameStart::Skip);
        assert_eq!(frame_start((1024, 768), pending), FrameStart::Recreate);

        let (outcome, pending) = after_recreation(true);
        assert_eq!(outcome, FrameOutcome::Recreated);
        assert!(!pending);
        assert_eq!(frame_start((1024, 768), pending), FrameStart::Draw);
    }

    #[test]
    fn test_out_of_date_acquire_skips_fence_reset() {
        assert_eq!(acquire_step(AcquireOutcome::OutOfDate), AcquireStep::Recreate);
    }

    #[test]
    fn test_suboptimal_acquire_still_draws() {
        let outcome = AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: true,
        };
        assert_eq!(acquire_step(outcome), AcquireStep::Draw(ImageIndex(2)));
    }

    /// Replay acquires against one slot's fence. Only the draw path resets
    /// it (and submits, which signals it again), so an out-of-date acquire
    /// never leaves the slot with an unsignaled fence and no work queued.
    #[test]
    fn test_fence_stays_signaled_across_out_of_date() {
        let acquired = |image_index| AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        };
        let acquires = [
            acquired(0),
            AcquireOutcome::OutOfDate,
            AcquireOutcome::OutOfDate,
            acquired(1),
        ];

        let mut fence_signaled = true;
        let mut work_queued = false;
        let mut resets = 0;
        for outcome in acquires {
            // wait_for_current must be able to return
            assert!(fence_signaled || work_queued);
            fence_signaled = true;
            work_queued = false;

            if let AcquireStep::Draw(_) = acquire_step(outcome) {
                fence_signaled = false;
                resets += 1;
                work_queued = true;
            }
        }
        assert_eq!(resets, 2);
    }

    #[test]
    fn test_suboptimal_or_out_of_date_present_recreates() {
        assert!(!needs_recreation(PresentOutcome::Presented, false));
        assert!(needs_recreation(PresentOutcome::Suboptimal, false));
        assert!(needs_recreation(PresentOutcome::OutOfDate, false));
    }

    #[test]
    fn test_resize_flag_recreates_once() {
        let resize = ResizeFlag::new();
        resize.raise();

        assert!(needs_recreation(PresentOutcome::Presented, resize.take()));
        // Consumed by the first frame
        assert!(!needs_recreation(PresentOutcome::Presented, resize.take()));
    }
}
