//! Frame slots and their synchronization.
//!
//! The renderer keeps [`MAX_FRAMES_IN_FLIGHT`] frame slots, each with its own
//! pair of semaphores and an in-flight fence. Two different indices are in
//! play every frame and they are kept apart by type:
//!
//! - [`FrameSlot`] picks the sync objects and cycles `0, 1, 2, 0, ...`.
//! - [`ImageIndex`] is whatever the swapchain hands back from acquire and
//!   picks the framebuffer, command buffer and uniform buffer.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on the slot's in-flight fence (CPU waits for the slot's last submit)
//! 2. Acquire an image (signals image_available)
//! 3. Wait until the uniform buffer for that image is no longer read
//! 4. Reset the in-flight fence (only now, so an out-of-date acquire cannot
//!    leave it unsignaled forever)
//! 5. Submit the image's command buffer:
//!    - wait on image_available at COLOR_ATTACHMENT_OUTPUT
//!    - signal render_finished and the in-flight fence
//! 6. Present, waiting on render_finished
//! 7. Advance the slot
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, trace};

use viewer_rhi::RhiResult;
use viewer_rhi::device::Device;
use viewer_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use viewer_rhi::sync::{Fence, Semaphore};

use crate::MAX_FRAMES_IN_FLIGHT;

/// Index of a frame slot, always below [`MAX_FRAMES_IN_FLIGHT`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FrameSlot(usize);

impl FrameSlot {
    pub const FIRST: Self = Self(0);

    /// The slot used by the following frame.
    #[inline]
    pub fn next(self) -> Self {
        Self((self.0 + 1) % MAX_FRAMES_IN_FLIGHT)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a swapchain image as returned by acquire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageIndex(pub u32);

impl ImageIndex {
    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Uniform buffer and descriptor set read by this image's command buffer.
    #[inline]
    pub fn uniform_slot(self) -> usize {
        self.as_usize() % MAX_FRAMES_IN_FLIGHT
    }
}

/// Remembers which frame slot last submitted work reading each uniform buffer.
///
/// A uniform buffer may only be rewritten once that slot's fence has signaled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniformUsage {
    last_user: [Option<FrameSlot>; MAX_FRAMES_IN_FLIGHT],
}

impl UniformUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot whose fence guards `uniform_slot`, if it has been used yet.
    #[inline]
    pub fn last_user(&self, uniform_slot: usize) -> Option<FrameSlot> {
        self.last_user[uniform_slot]
    }

    #[inline]
    pub fn record(&mut self, uniform_slot: usize, slot: FrameSlot) {
        self.last_user[uniform_slot] = Some(slot);
    }

    /// Forget every user; valid only after the device has gone idle.
    pub fn clear(&mut self) {
        self.last_user = Default::default();
    }
}

/// Sync objects of one frame slot.
pub struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            // Signaled so the first wait on each slot returns immediately
            in_flight: Fence::new(device, true)?,
        })
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

/// Owns every frame slot and drives the per-frame protocol.
///
/// Not thread-safe; only the event-loop thread touches it.
pub struct FrameSynchronizer {
    device: Arc<Device>,
    frames: Vec<FrameSync>,
    current: FrameSlot,
    uniform_usage: UniformUsage,
}

impl FrameSynchronizer {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        info!(
            "Frame synchronizer created with {} frames in flight",
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            device,
            frames,
            current: FrameSlot::FIRST,
            uniform_usage: UniformUsage::new(),
        })
    }

    #[inline]
    pub fn current_slot(&self) -> FrameSlot {
        self.current
    }

    #[inline]
    pub fn current(&self) -> &FrameSync {
        &self.frames[self.current.index()]
    }

    /// Block until the current slot's previous submission has finished.
    pub fn wait_for_current(&self) -> RhiResult<()> {
        trace!("Waiting on frame slot {}", self.current.index());
        self.current().in_flight.wait(u64::MAX)
    }

    /// Acquire the next image, signalling the current slot's image-available semaphore.
    pub fn acquire(&self, swapchain: &Swapchain) -> RhiResult<AcquireOutcome> {
        let outcome = swapchain.acquire_next_image(self.current().image_available.handle())?;
        if let AcquireOutcome::Acquired {
            image_index,
            suboptimal: true,
        } = outcome
        {
            debug!("Acquired image {} from a suboptimal swapchain", image_index);
        }
        Ok(outcome)
    }

    /// Make sure nothing still reads the uniform buffer used by `image`.
    ///
    /// Must run before [`reset_current_fence`](Self::reset_current_fence),
    /// since the guarding slot may be the current one.
    pub fn wait_for_uniform(&self, image: ImageIndex) -> RhiResult<()> {
        let uniform_slot = image.uniform_slot();
        let Some(slot) = self.uniform_usage.last_user(uniform_slot) else {
            return Ok(());
        };

        let fence = &self.frames[slot.index()].in_flight;
        fence.wait(u64::MAX)?;
        debug_assert!(
            fence.is_signaled().unwrap_or(false),
            "uniform buffer {} rewritten while slot {} may still read it",
            uniform_slot,
            slot.index()
        );
        Ok(())
    }

    /// Unsignal the current fence; call only once a submit is certain to follow.
    pub fn reset_current_fence(&self) -> RhiResult<()> {
        self.current().in_flight.reset()
    }

    /// Submit `command_buffer` for `image` on the graphics queue.
    pub fn submit(&mut self, command_buffer: vk::CommandBuffer, image: ImageIndex) -> RhiResult<()> {
        let frame = &self.frames[self.current.index()];

        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished.handle()];
        let command_buffers = [command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: every handle belongs to live objects owned by the renderer.
        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit_info), frame.in_flight.handle())?;
        }

        self.uniform_usage.record(image.uniform_slot(), self.current);
        Ok(())
    }

    /// Present `image` once the current slot's rendering has finished.
    pub fn present(&self, swapchain: &Swapchain, image: ImageIndex) -> RhiResult<PresentOutcome> {
        swapchain.present(
            self.device.present_queue(),
            image.get(),
            self.current().render_finished.handle(),
        )
    }

    /// Move on to the next frame slot.
    pub fn advance(&mut self) {
        self.current = self.current.next();
    }

    /// Called after the device went idle for swapchain recreation.
    pub fn on_device_idle(&mut self) {
        self.uniform_usage.clear();
    }

    #[inline]
    pub fn uniform_usage(&self) -> &UniformUsage {
        &self.uniform_usage
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 3);
    }

    #[test]
    fn test_frame_slot_cycles() {
        let mut slot = FrameSlot::FIRST;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(slot.index());
            slot = slot.next();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_frame_slot_stays_in_range() {
        let mut slot = FrameSlot::FIRST;
        for _ in 0..100 {
            assert!(slot.index() < MAX_FRAMES_IN_FLIGHT);
            slot = slot.next();
        }
    }

    #[test]
    fn test_image_index_uniform_slot() {
        assert_eq!(ImageIndex(0).uniform_slot(), 0);
        assert_eq!(ImageIndex(2).uniform_slot(), 2);
        assert_eq!(ImageIndex(3).uniform_slot(), 0);
        assert_eq!(ImageIndex(4).uniform_slot(), 1);
    }

    #[test]
    fn test_uniform_usage_tracks_last_slot() {
        let mut usage = UniformUsage::new();
        assert_eq!(usage.last_user(1), None);

        let slot_a = FrameSlot::FIRST;
        let slot_b = slot_a.next();
        usage.record(1, slot_a);
        usage.record(1, slot_b);
        usage.record(0, slot_a);

        assert_eq!(usage.last_user(1), Some(slot_b));
        assert_eq!(usage.last_user(0), Some(slot_a));
        assert_eq!(usage.last_user(2), None);

        usage.clear();
        assert_eq!(usage, UniformUsage::new());
    }

    /// Replay the protocol without a GPU: a slot is "pending" between submit
    /// and the next wait on it. With three slots there are never more than
    /// three pending submissions, and a uniform buffer's guarding slot is
    /// always waited before the buffer is reused.
    #[test]
    fn test_simulated_frames_respect_fences() {
        let mut pending = [false; MAX_FRAMES_IN_FLIGHT];
        let mut usage = UniformUsage::new();
        let mut slot = FrameSlot::FIRST;
        // A two-image swapchain interleaves images differently from slots
        let images = [0u32, 1, 0, 1, 1, 0, 0, 1];

        for &image in &images {
            let image = ImageIndex(image);

            pending[slot.index()] = false;

            if let Some(guard) = usage.last_user(image.uniform_slot()) {
                pending[guard.index()] = false;
            }
            assert!(
                usage
                    .last_user(image.uniform_slot())
                    .is_none_or(|guard| !pending[guard.index()])
            );

            pending[slot.index()] = true;
            usage.record(image.uniform_slot(), slot);
            assert!(pending.iter().filter(|&&p| p).count() <= MAX_FRAMES_IN_FLIGHT);

            slot = slot.next();
        }
    }

    #[test]
    fn test_frame_synchronizer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameSynchronizer>();
        assert_send::<FrameSync>();
    }
}
