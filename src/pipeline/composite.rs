use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use kurbo::Affine;

use crate::compose::blend::Compositor;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{SkyError, SkyResult};
use crate::pipeline::coordinator::StageEvent;
use crate::pipeline::phase::{Gate, Phase, PhaseBarrier};
use crate::pipeline::registry::ContextHandle;
use crate::pipeline::surface::SharedSurface;

/// Composite worker loop.
///
/// Under the render phase permit: take the decoded frame, blend it against
/// the layers, publish the result to the encoder input surface, then apply
/// the context's pacing policy. The context handle is dropped on exit, which
/// releases its bundle (and the display with the last bundle).
pub(crate) fn run(
    compositor: &Compositor,
    mut context: ContextHandle,
    texture_transform: Affine,
    barrier: &PhaseBarrier,
    decoded: &SharedSurface,
    rendered: &SharedSurface,
    stop: &AtomicBool,
    events: &Sender<StageEvent>,
) -> SkyResult<()> {
    let mut index = 0u64;
    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        match barrier.await_phase(Phase::Render)? {
            Gate::Open => {}
            Gate::Shutdown => return Ok(()),
        }
        let Some(frame) = decoded.take() else {
            // The decode phase always publishes before advancing.
            return Err(SkyError::validation("no decoded frame at render phase"));
        };
        let out = compositor.composite(&frame, texture_transform);
        rendered.publish(out);
        context.throttle();
        let _ = events.send(StageEvent::FrameRendered(FrameIndex(index)));
        index += 1;
        barrier.advance();
    }
}
