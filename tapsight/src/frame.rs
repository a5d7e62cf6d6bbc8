//! Shared store for the most recent screen capture.
//!
//! The frame is written by an external capture task and read by the locators,
//! possibly from blocking threads. Publishing swaps a whole `Arc<Frame>` under
//! a short-lived lock, so a reader can never observe a partially written
//! image; CV work happens on the cloned handle, outside the lock.

use image::DynamicImage;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// One captured screen image.
pub struct Frame {
    pub image: DynamicImage,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }
}

#[derive(Default)]
struct Slots {
    current: Option<Arc<Frame>>,
    previous: Option<Arc<Frame>>,
}

/// Double-buffered frame store with atomic replacement.
#[derive(Default)]
pub struct FrameStore {
    slots: RwLock<Slots>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly captured frame. The prior frame is demoted to the
    /// secondary slot so readers still have something during a capture gap.
    pub fn publish(&self, image: DynamicImage) {
        let frame = Arc::new(Frame::new(image));
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.previous = slots.current.take();
        slots.current = Some(frame);
    }

    /// Drop the current frame, e.g. after a failed capture cycle. The
    /// secondary buffer keeps serving readers until the next publish.
    pub fn invalidate_current(&self) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.current.take().is_some() {
            debug!("current frame invalidated, falling back to buffered frame");
        }
    }

    /// The most recent readable frame: current, else the buffered previous
    /// one. `None` only when nothing was ever published.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.current.clone().or_else(|| slots.previous.clone())
    }
}
