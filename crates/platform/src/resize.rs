//! Resize notification shared between the event handler and the renderer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A flag raised when the window's framebuffer size changes.
///
/// The event handler calls [`ResizeFlag::raise`]; the frame loop calls
/// [`ResizeFlag::take`] once per frame, which reads and clears the flag in a
/// single step so a resize arriving mid-frame is never lost.
#[derive(Clone, Debug, Default)]
pub struct ResizeFlag(Arc<AtomicBool>);

impl ResizeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Return whether the flag was raised, clearing it.
    #[inline]
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
