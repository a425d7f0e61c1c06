use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use tracing::debug;

use crate::foundation::core::FrameIndex;
use crate::foundation::error::SkyResult;
use crate::media::decode::FrameDecoder;
use crate::pipeline::coordinator::StageEvent;
use crate::pipeline::phase::{Gate, Phase, PhaseBarrier};
use crate::pipeline::surface::SharedSurface;

/// Decode worker loop.
///
/// Pulls frames from the decoder; each one is published to the decoded-frame
/// surface under the decode phase permit. On end of stream the loop waits for
/// the in-flight frame to drain fully, then marks the barrier finished so the
/// downstream stages exit their gates cleanly. The decoder is released on
/// every exit path.
pub(crate) fn run(
    mut decoder: Box<dyn FrameDecoder>,
    barrier: &PhaseBarrier,
    decoded: &SharedSurface,
    stop: &AtomicBool,
    events: &Sender<StageEvent>,
) -> SkyResult<()> {
    let result = worker(decoder.as_mut(), barrier, decoded, stop, events);
    let released = decoder.release();
    result.and(released)
}

fn worker(
    decoder: &mut dyn FrameDecoder,
    barrier: &PhaseBarrier,
    decoded: &SharedSurface,
    stop: &AtomicBool,
    events: &Sender<StageEvent>,
) -> SkyResult<()> {
    let mut index = 0u64;
    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        let Some(frame) = decoder.next_frame()? else {
            debug!(frames = index, "decoder reached end of stream");
            let _ = events.send(StageEvent::DecodingFinished { frames: index });
            // Let the last frame clear the render and encode phases before
            // signalling shutdown, otherwise it would be dropped mid-flight.
            barrier.await_drain_complete()?;
            barrier.finish();
            return Ok(());
        };

        match barrier.await_phase(Phase::Decode)? {
            Gate::Open => {}
            Gate::Shutdown => return Ok(()),
        }
        decoded.publish(frame);
        let _ = events.send(StageEvent::FrameDecoded(FrameIndex(index)));
        index += 1;
        barrier.advance();
    }
}
