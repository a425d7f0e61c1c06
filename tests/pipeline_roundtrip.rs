use std::path::{Path, PathBuf};

use skycomp::{Affine, PacingMode, PipelineOpts, run_pipeline};

mod common;
use common::{
    EncoderScript, MockEncoder, MockMuxer, RecordingObserver, ScriptedDecoder, new_trace,
    passthrough_compositor,
};

fn opts(frame_rate: u32, hint: Option<u64>) -> PipelineOpts {
    PipelineOpts {
        output: PathBuf::from("out/test.mp4"),
        frame_rate,
        pacing: PacingMode::Unpaced,
        frame_count_hint: hint,
        texture_transform: Affine::IDENTITY,
    }
}

#[test]
fn frames_flow_through_in_order_and_finalize() {
    common::init_tracing();
    let trace = new_trace();
    let (decoder, dec_released) = ScriptedDecoder::new(5, trace.clone());
    let (encoder, enc_released) = MockEncoder::new(EncoderScript::Immediate, 10, trace.clone());
    let (muxer, log) = MockMuxer::new();
    let mut obs = RecordingObserver::default();

    let out = run_pipeline(
        Box::new(decoder),
        passthrough_compositor(),
        Box::new(encoder),
        Box::new(muxer),
        opts(10, Some(5)),
        &mut obs,
    )
    .unwrap();
    assert_eq!(out, PathBuf::from("out/test.mp4"));

    let log = log.lock().unwrap();
    assert_eq!(log.starts, 1, "muxer starts exactly once");
    assert!(log.stopped);
    assert_eq!(log.samples.len(), 5, "five frames in, five samples out");
    for (i, sample) in log.samples.iter().enumerate() {
        // The frame marker survives the opaque-mask blend unchanged, and the
        // encoder's bogus timestamps are replaced with the 10 fps CFR grid.
        assert_eq!(sample.data, vec![i as u8]);
        assert_eq!(sample.pts_us, i as u64 * 100_000);
    }
    assert!(log.samples[0].key_frame);

    assert!(*dec_released.lock().unwrap());
    assert!(*enc_released.lock().unwrap());

    assert_eq!(obs.started, 1);
    assert!(obs.failed.is_empty());
    assert_eq!(obs.finished.as_deref(), Some(Path::new("out/test.mp4")));
}

#[test]
fn at_most_one_frame_is_in_flight() {
    let trace = new_trace();
    let (decoder, _) = ScriptedDecoder::new(6, trace.clone());
    let (encoder, _) = MockEncoder::new(EncoderScript::Immediate, 30, trace.clone());
    let (muxer, _) = MockMuxer::new();
    let mut obs = RecordingObserver::default();

    run_pipeline(
        Box::new(decoder),
        passthrough_compositor(),
        Box::new(encoder),
        Box::new(muxer),
        opts(30, None),
        &mut obs,
    )
    .unwrap();

    let trace = trace.lock().unwrap();
    let pos = |who: &str, n: u64| {
        trace
            .iter()
            .position(|&(w, i)| w == who && i == n)
            .unwrap_or_else(|| panic!("missing {who}({n})"))
    };
    for n in 0..6u64 {
        assert!(pos("decode", n) < pos("encode", n), "frame {n} decoded first");
        // The decoder may pull one frame ahead of its phase, never two.
        if n + 2 < 6 {
            assert!(
                pos("encode", n) < pos("decode", n + 2),
                "frame {} pulled before frame {n} was encoded",
                n + 2
            );
        }
    }
}

#[test]
fn buffering_encoder_starts_the_muxer_at_flush_time() {
    let trace = new_trace();
    let (decoder, _) = ScriptedDecoder::new(3, trace.clone());
    let (encoder, _) = MockEncoder::new(EncoderScript::BufferUntilFinish, 25, trace);
    let (muxer, log) = MockMuxer::new();
    let mut obs = RecordingObserver::default();

    run_pipeline(
        Box::new(decoder),
        passthrough_compositor(),
        Box::new(encoder),
        Box::new(muxer),
        opts(25, None),
        &mut obs,
    )
    .unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.starts, 1);
    assert!(log.stopped);
    assert_eq!(log.samples.len(), 3);
    assert_eq!(log.samples[2].pts_us, 2 * 1_000_000 / 25);
}

#[test]
fn progress_is_monotone_and_ends_at_one() {
    let trace = new_trace();
    let (decoder, _) = ScriptedDecoder::new(4, trace.clone());
    let (encoder, _) = MockEncoder::new(EncoderScript::Immediate, 30, trace);
    let (muxer, _) = MockMuxer::new();
    let mut obs = RecordingObserver::default();

    run_pipeline(
        Box::new(decoder),
        passthrough_compositor(),
        Box::new(encoder),
        Box::new(muxer),
        opts(30, Some(4)),
        &mut obs,
    )
    .unwrap();

    assert!(!obs.progress.is_empty());
    for pair in obs.progress.windows(2) {
        assert!(pair[0] <= pair[1], "progress went backwards: {pair:?}");
    }
    let last = *obs.progress.last().unwrap();
    assert_eq!(last, 1.0);
    for &p in &obs.progress[..obs.progress.len() - 1] {
        assert!((0.0..1.0).contains(&p));
    }
}
