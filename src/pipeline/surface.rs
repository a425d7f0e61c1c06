use std::sync::{Arc, Mutex};

use crate::foundation::core::FrameRgba;

/// Single-slot frame handoff between the decode and composite stages.
///
/// The phase barrier guarantees at most one publisher and one consumer are
/// ever active, so the slot holds at most one frame. The mutex only protects
/// the slot itself.
#[derive(Clone, Default)]
pub struct SharedSurface {
    slot: Arc<Mutex<Option<FrameRgba>>>,
}

impl SharedSurface {
    /// An empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a decoded frame. The previous content, if any, is dropped.
    pub fn publish(&self, frame: FrameRgba) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(frame);
        }
    }

    /// Take the published frame, leaving the slot empty.
    pub fn take(&self) -> Option<FrameRgba> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_empties_the_slot() {
        let s = SharedSurface::new();
        assert!(s.take().is_none());
        s.publish(FrameRgba::black(2, 2));
        assert!(s.take().is_some());
        assert!(s.take().is_none());
    }
}
