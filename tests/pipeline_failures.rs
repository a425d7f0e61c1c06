use std::path::PathBuf;

use skycomp::{Affine, PacingMode, PipelineOpts, SkyError, run_pipeline};

mod common;
use common::{
    EncoderScript, MockEncoder, MockMuxer, RecordingObserver, ScriptedDecoder, new_trace,
    passthrough_compositor,
};

fn opts(frame_rate: u32) -> PipelineOpts {
    PipelineOpts {
        output: PathBuf::from("out/test.mp4"),
        frame_rate,
        pacing: PacingMode::Unpaced,
        frame_count_hint: None,
        texture_transform: Affine::IDENTITY,
    }
}

#[test]
fn empty_source_fails_with_zero_frames_encoded() {
    common::init_tracing();
    let trace = new_trace();
    let (decoder, dec_released) = ScriptedDecoder::new(0, trace.clone());
    let (encoder, enc_released) = MockEncoder::new(EncoderScript::Immediate, 30, trace);
    let (muxer, log) = MockMuxer::new();
    let mut obs = RecordingObserver::default();

    let err = run_pipeline(
        Box::new(decoder),
        passthrough_compositor(),
        Box::new(encoder),
        Box::new(muxer),
        opts(30),
        &mut obs,
    )
    .unwrap_err();
    assert!(matches!(err, SkyError::ZeroFramesEncoded));

    let log = log.lock().unwrap();
    assert_eq!(log.starts, 0, "no format, no muxer start");
    assert!(!log.stopped, "a zero-frame container is never finalized");

    assert!(*dec_released.lock().unwrap());
    assert!(*enc_released.lock().unwrap());
    assert_eq!(obs.failed.len(), 1, "on_failed fires exactly once");
    assert!(obs.finished.is_none());
}

#[test]
fn decoder_fault_tears_the_pipeline_down() {
    let trace = new_trace();
    let (decoder, dec_released) = ScriptedDecoder::new(5, trace.clone());
    let decoder = decoder.failing_at(2);
    let (encoder, enc_released) = MockEncoder::new(EncoderScript::Immediate, 30, trace);
    let (muxer, log) = MockMuxer::new();
    let mut obs = RecordingObserver::default();

    let err = run_pipeline(
        Box::new(decoder),
        passthrough_compositor(),
        Box::new(encoder),
        Box::new(muxer),
        opts(30),
        &mut obs,
    )
    .unwrap_err();
    assert!(matches!(err, SkyError::DecodingFailed(_)));

    // Peers unwound through the barrier abort without reporting themselves.
    assert_eq!(obs.failed.len(), 1);
    assert!(obs.finished.is_none());
    assert!(*dec_released.lock().unwrap());
    assert!(*enc_released.lock().unwrap());
    assert!(!log.lock().unwrap().stopped);
}

#[test]
fn second_format_report_is_fatal() {
    let trace = new_trace();
    let (decoder, _) = ScriptedDecoder::new(4, trace.clone());
    let (encoder, enc_released) = MockEncoder::new(EncoderScript::RepeatFormat, 30, trace);
    let (muxer, log) = MockMuxer::new();
    let mut obs = RecordingObserver::default();

    let err = run_pipeline(
        Box::new(decoder),
        passthrough_compositor(),
        Box::new(encoder),
        Box::new(muxer),
        opts(30),
        &mut obs,
    )
    .unwrap_err();
    assert!(matches!(err, SkyError::FormatChangedTwice));

    let log = log.lock().unwrap();
    assert_eq!(log.starts, 1, "only the first format starts the muxer");
    assert!(!log.stopped);
    assert!(*enc_released.lock().unwrap());
    assert_eq!(obs.failed.len(), 1);
}
